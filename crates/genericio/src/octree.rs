//! Octree Side-Index
//!
//! An optional spatial index over the particle data. Each writer subdivides
//! its physical sub-box into `8^(L-1)` leaves by uniform refinement
//! (`2^(L-1)` cells per axis), routes every particle to a leaf by
//! coordinate, and reorders all of its variable buffers so rows of the same
//! leaf are contiguous, leaves in leaf-index order. The per-leaf occupancy
//! and bounding boxes are then gathered across the sub-group that shares a
//! data file, and that sub-group's leader serializes the leaf table into the
//! file's header; a leaf row's writer rank therefore indexes the same rank
//! set as the file's rank headers.
//!
//! ## Routing
//!
//! A particle exactly on a face shared by two leaves belongs to the
//! lower-indexed leaf. Leaf indices are x-major row-major over the
//! per-writer grid.
//!
//! ## Reordering
//!
//! All variables of one writer must be permuted identically; the permutation
//! is computed once from the coordinate columns and applied polymorphically
//! to every buffer by record size. When the shuffle option is on, rows are
//! randomly permuted within each leaf.
//!
//! ## Serialized Form
//!
//! The blob carries its own endian tag mirroring the global magic:
//!
//! ```text
//! magic (8) | shuffled (u64) | levels (u64) | entry count (u64)
//! then per leaf: id, extents[6] (rounded), particle count,
//!                row offset within writer, writer rank   (10 x u64)
//! ```

use bytes::BytesMut;
use rand::seq::SliceRandom;

use genericio_core::records::{Endianness, MAGIC_SIZE};
use genericio_core::{Error, Result};

/// Octree parameters carried by a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OctreeOptions {
    /// Refinement level count; at least 2 for the index to be built.
    pub levels: u32,
    /// Shuffle rows within each leaf after reordering.
    pub shuffle: bool,
}

/// The uniform leaf grid over one writer's sub-box.
#[derive(Debug, Clone)]
pub(crate) struct LeafGrid {
    per_axis: u64,
    lo: [f64; 3],
    cell: [f64; 3],
}

impl LeafGrid {
    /// Build the grid for a writer's extents (`[xlo, xhi, ylo, yhi, zlo,
    /// zhi]`) at the given level count.
    pub(crate) fn new(extents: [f64; 6], levels: u32) -> LeafGrid {
        let per_axis = 1u64 << (levels - 1);
        let lo = [extents[0], extents[2], extents[4]];
        let cell = [
            (extents[1] - extents[0]) / per_axis as f64,
            (extents[3] - extents[2]) / per_axis as f64,
            (extents[5] - extents[4]) / per_axis as f64,
        ];
        LeafGrid { per_axis, lo, cell }
    }

    pub(crate) fn num_leaves(&self) -> usize {
        (self.per_axis * self.per_axis * self.per_axis) as usize
    }

    /// Bounding boxes of every leaf, in leaf-index order.
    pub(crate) fn leaf_extents(&self) -> Vec<[f32; 6]> {
        let n = self.per_axis;
        let mut out = Vec::with_capacity(self.num_leaves());
        for ix in 0..n {
            for iy in 0..n {
                for iz in 0..n {
                    let cell = [ix, iy, iz];
                    let mut aabb = [0.0f32; 6];
                    for axis in 0..3 {
                        let a = self.lo[axis] + cell[axis] as f64 * self.cell[axis];
                        aabb[axis * 2] = a as f32;
                        aabb[axis * 2 + 1] = (a + self.cell[axis]) as f32;
                    }
                    out.push(aabb);
                }
            }
        }
        out
    }

    fn axis_cell(&self, axis: usize, p: f64) -> u64 {
        let t = (p - self.lo[axis]) / self.cell[axis];
        let mut c = t.floor() as i64;
        if c < 0 {
            c = 0;
        }
        if c as u64 >= self.per_axis {
            c = self.per_axis as i64 - 1;
        }
        // A particle exactly on a shared face belongs to the lower-indexed
        // leaf.
        let boundary = self.lo[axis] + c as f64 * self.cell[axis];
        if c > 0 && p == boundary {
            c -= 1;
        }
        c as u64
    }

    /// Leaf index of a particle.
    pub(crate) fn leaf_of(&self, x: f32, y: f32, z: f32) -> usize {
        let ix = self.axis_cell(0, x as f64);
        let iy = self.axis_cell(1, y as f64);
        let iz = self.axis_cell(2, z as f64);
        ((ix * self.per_axis + iy) * self.per_axis + iz) as usize
    }
}

/// Route every particle to its leaf. Returns the per-particle leaf index and
/// the per-leaf occupancy.
pub(crate) fn assign_leaves(
    grid: &LeafGrid,
    xs: &[f32],
    ys: &[f32],
    zs: &[f32],
) -> (Vec<u32>, Vec<u64>) {
    let mut positions = Vec::with_capacity(xs.len());
    let mut counts = vec![0u64; grid.num_leaves()];
    for i in 0..xs.len() {
        let leaf = grid.leaf_of(xs[i], ys[i], zs[i]);
        positions.push(leaf as u32);
        counts[leaf] += 1;
    }
    (positions, counts)
}

/// Build the row permutation that groups rows by leaf, leaves in index
/// order. `perm[dst] = src`. With `shuffle`, rows are randomly permuted
/// within each leaf.
pub(crate) fn build_permutation(positions: &[u32], num_leaves: usize, shuffle: bool) -> Vec<u32> {
    let mut by_leaf: Vec<Vec<u32>> = vec![Vec::new(); num_leaves];
    for (row, &leaf) in positions.iter().enumerate() {
        by_leaf[leaf as usize].push(row as u32);
    }
    if shuffle {
        let mut rng = rand::thread_rng();
        for rows in &mut by_leaf {
            rows.shuffle(&mut rng);
        }
    }
    by_leaf.into_iter().flatten().collect()
}

/// Apply a row permutation to a variable buffer of `record_size`-byte rows.
/// Only the first `perm.len()` rows are touched; trailing extra space is
/// preserved.
pub(crate) fn apply_permutation(data: &mut [u8], record_size: usize, perm: &[u32]) {
    let n = perm.len();
    let mut scratch = vec![0u8; n * record_size];
    for (dst, &src) in perm.iter().enumerate() {
        let s = src as usize * record_size;
        scratch[dst * record_size..(dst + 1) * record_size]
            .copy_from_slice(&data[s..s + record_size]);
    }
    data[..n * record_size].copy_from_slice(&scratch);
}

/// One row of the global leaf table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OctreeLeaf {
    pub block_id: u64,
    /// Rounded AABB: xlo, xhi, ylo, yhi, zlo, zhi.
    pub extents: [u64; 6],
    pub num_particles: u64,
    /// Row offset of this leaf within its writer's rows.
    pub offset_in_rank: u64,
    /// The writer that owns the leaf.
    pub writer_rank: u64,
}

/// The gathered, serializable octree index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OctreeIndex {
    pub shuffled: bool,
    pub levels: u64,
    pub leaves: Vec<OctreeLeaf>,
}

impl OctreeIndex {
    /// Assemble the leaf table from per-writer gathers, writers in rank
    /// order.
    pub(crate) fn from_gathered(
        levels: u64,
        shuffled: bool,
        counts_per_rank: &[Vec<u64>],
        extents_per_rank: &[Vec<[f32; 6]>],
    ) -> OctreeIndex {
        let mut leaves = Vec::new();
        let mut leaf_id = 0u64;
        for (rank, (counts, extents)) in counts_per_rank
            .iter()
            .zip(extents_per_rank.iter())
            .enumerate()
        {
            let mut offset_in_rank = 0u64;
            for (count, aabb) in counts.iter().zip(extents.iter()) {
                let mut rounded = [0u64; 6];
                for (r, v) in rounded.iter_mut().zip(aabb.iter()) {
                    *r = v.round() as u64;
                }
                leaves.push(OctreeLeaf {
                    block_id: leaf_id,
                    extents: rounded,
                    num_particles: *count,
                    offset_in_rank,
                    writer_rank: rank as u64,
                });
                offset_in_rank += count;
                leaf_id += 1;
            }
        }
        OctreeIndex {
            shuffled,
            levels,
            leaves,
        }
    }

    /// Total particle count across the table.
    pub fn total_particles(&self) -> u64 {
        self.leaves.iter().map(|l| l.num_particles).sum()
    }

    pub fn serialize(&self, e: Endianness) -> Vec<u8> {
        let mut buf = BytesMut::new();
        buf.extend_from_slice(e.magic());
        e.put_u64(&mut buf, self.shuffled as u64);
        e.put_u64(&mut buf, self.levels);
        e.put_u64(&mut buf, self.leaves.len() as u64);
        for leaf in &self.leaves {
            e.put_u64(&mut buf, leaf.block_id);
            for v in leaf.extents {
                e.put_u64(&mut buf, v);
            }
            e.put_u64(&mut buf, leaf.num_particles);
            e.put_u64(&mut buf, leaf.offset_in_rank);
            e.put_u64(&mut buf, leaf.writer_rank);
        }
        buf.to_vec()
    }

    pub fn deserialize(bytes: &[u8]) -> Result<OctreeIndex> {
        if bytes.len() < MAGIC_SIZE + 24 {
            return Err(Error::InvalidOctree("blob too small".to_string()));
        }
        let e = Endianness::from_magic(bytes)
            .ok_or_else(|| Error::InvalidOctree("unrecognized endian tag".to_string()))?;

        let at = |off: usize| e.read_u64(&bytes[off..off + 8]);
        let shuffled = at(MAGIC_SIZE) != 0;
        let levels = at(MAGIC_SIZE + 8);
        let count = at(MAGIC_SIZE + 16) as usize;

        let rows_start = MAGIC_SIZE + 24;
        let row_size = 10 * 8;
        if bytes.len() < rows_start + count * row_size {
            return Err(Error::InvalidOctree(format!(
                "blob truncated: {} rows expected",
                count
            )));
        }

        let mut leaves = Vec::with_capacity(count);
        for i in 0..count {
            let base = rows_start + i * row_size;
            let mut extents = [0u64; 6];
            for (j, v) in extents.iter_mut().enumerate() {
                *v = at(base + 8 + j * 8);
            }
            leaves.push(OctreeLeaf {
                block_id: at(base),
                extents,
                num_particles: at(base + 56),
                offset_in_rank: at(base + 64),
                writer_rank: at(base + 72),
            });
        }

        Ok(OctreeIndex {
            shuffled,
            levels,
            leaves,
        })
    }
}
