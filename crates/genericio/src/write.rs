//! Write Coordinator
//!
//! The collective write protocol, executed by every writer of one
//! communicator:
//!
//! 1. **Split.** Partition the group by partition id. When sub-groups are in
//!    effect, rank 0 of the full group writes the rank-map artifact and each
//!    sub-group targets its own `"{filename}#{partition}"` sub-file.
//! 2. **Local prep.** Build this writer's rank header; when blocks are in
//!    effect, build per-variable block headers and try to compress each
//!    payload.
//! 3. **Leader assembly.** The sub-group leader gathers every writer's rank
//!    and block headers, computes the absolute start offset of every block
//!    in lexicographic (writer, variable) order, and accumulates the global
//!    element sum.
//! 4. **Scatter.** Each writer receives its updated headers and caches its
//!    start offset.
//! 5. **Header persistence.** The leader stamps the header CRC footer, sizes
//!    the file, and writes the whole header at offset zero through a
//!    process-local capability.
//! 6. **Bulk phase.** All writers reopen through the group capability and
//!    stream their payloads, each followed by its 8-byte CRC footer.
//!
//! Writing errors are not recoverable: one writer may fail while the others
//! proceed, leaving the artifact truncated.

use std::time::Instant;

use bytes::BytesMut;
use tracing::{debug, info, warn};

use genericio_core::compress::{compress_block, FILTER_NAME};
use genericio_core::crc::{crc64, crc64_invert, CRC_SIZE};
use genericio_core::records::{
    BlockHeader, Endianness, GlobalHeader, RankHeader, BLOCK_HEADER_SIZE, GLOBAL_HEADER_SIZE,
    RANK_HEADER_SIZE, VARIABLE_HEADER_SIZE,
};
use genericio_core::types::VarFlags;
use genericio_core::Result;

use crate::comm::{cart_coords, CommRef, SelfComm};
use crate::fileio::{group_file, local_file};
use crate::octree::{
    apply_permutation, assign_leaves, build_permutation, LeafGrid, OctreeIndex,
};
use crate::session::GenericIo;

fn f32s_from_bytes(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_ne_bytes(c.try_into().unwrap()))
        .collect()
}

impl<'a> GenericIo<'a> {
    /// Commit the registered variables to the artifact. Collective across
    /// the session's communicator; callable once per session.
    ///
    /// Failures are not recoverable: a writer that errors may leave the
    /// artifact truncated while other writers complete.
    pub fn write(&mut self) -> Result<()> {
        self.write_with_endianness(Endianness::host())
    }

    pub(crate) fn write_with_endianness(&mut self, e: Endianness) -> Result<()> {
        let start_time = Instant::now();
        let rank = self.comm.rank();
        let nranks = self.comm.size();
        let nelems = self.nelems;
        let nvars = self.vars.len();

        let split = self.comm.split(self.partition);
        let split_rank = split.rank();
        let split_nranks = split.size();

        // In split mode the configured file becomes the rank map and the
        // real data is partitioned into sub-files.
        let local_file_name = if split_nranks != nranks {
            let gathered = self.comm.gather(0, &self.partition.to_le_bytes());
            if rank == 0 {
                let partitions: Vec<i32> = gathered
                    .unwrap_or_default()
                    .iter()
                    .map(|b| u64::from_le_bytes(b[..8].try_into().unwrap()) as i32)
                    .collect();
                self.write_rank_map(&partitions)?;
            }
            format!("{}#{}", self.file_name, self.partition)
        } else {
            self.file_name.clone()
        };

        let (dims, coords) = match self.comm.cart_dims() {
            Some(d) => (d, cart_coords(d, rank)),
            None => ([nranks as u64, 1, 1], [rank as u64, 0, 0]),
        };

        let mut rh_local = RankHeader {
            coords,
            nelems,
            start: 0,
            global_rank: rank as u64,
        };

        let should_compress = self.config.should_compress;
        let needs_blocks = should_compress || self.config.force_blocks;

        let octree_index = self.build_octree_and_reorder(dims, coords, &split)?;

        // Per-variable block headers, compressing where it pays off. The
        // start offsets stay zero until the leader computes them.
        let mut local_blocks: Vec<BlockHeader> = Vec::new();
        let mut compressed: Vec<Option<Vec<u8>>> = Vec::new();
        if needs_blocks {
            for var in &self.vars {
                let payload = var.payload(nelems);
                let mut bh = BlockHeader::default();
                let mut cdata = None;
                if should_compress {
                    if let Some(block) = compress_block(e, payload) {
                        bh.set_filter(0, FILTER_NAME);
                        bh.size = block.len() as u64;
                        cdata = Some(block);
                    }
                }
                if cdata.is_none() {
                    bh.size = payload.len() as u64;
                }
                local_blocks.push(bh);
                compressed.push(cdata);
            }
        }

        // Leader assembly: gather headers, compute offsets, scatter back.
        let mut rh_bytes = BytesMut::new();
        rh_local.encode(e, &mut rh_bytes);
        let gathered_rh = split.gather(0, &rh_bytes);

        let gathered_bh = if needs_blocks {
            let mut buf = BytesMut::new();
            for bh in &local_blocks {
                bh.encode(e, &mut buf);
            }
            split.gather(0, &buf)
        } else {
            None
        };

        let mut file_size = 0u64;
        if split_rank == 0 {
            let mut all_ranks: Vec<RankHeader> = gathered_rh
                .unwrap_or_default()
                .iter()
                .enumerate()
                .map(|(i, b)| RankHeader::decode(e, b, RANK_HEADER_SIZE as u64, i as u64))
                .collect();

            let mut all_blocks: Vec<Vec<BlockHeader>> = gathered_bh
                .map(|parts| {
                    parts
                        .iter()
                        .map(|b| {
                            b.chunks_exact(BLOCK_HEADER_SIZE)
                                .map(|c| BlockHeader::decode(e, c, BLOCK_HEADER_SIZE as u64))
                                .collect()
                        })
                        .collect()
                })
                .unwrap_or_default();

            let octree_blob = octree_index.as_ref().map(|oi| oi.serialize(e));
            let octree_size = octree_blob.as_ref().map_or(0, |b| b.len() as u64);

            let mut header_size = (GLOBAL_HEADER_SIZE
                + nvars * VARIABLE_HEADER_SIZE
                + split_nranks * RANK_HEADER_SIZE
                + CRC_SIZE) as u64
                + octree_size;
            if needs_blocks {
                header_size += (split_nranks * nvars * BLOCK_HEADER_SIZE) as u64;
            }

            let record_size: u64 = self.vars.iter().map(|v| v.size).sum();

            if needs_blocks {
                let mut prev_end = header_size;
                for bhs in all_blocks.iter_mut() {
                    for bh in bhs.iter_mut() {
                        bh.start = prev_end;
                        prev_end = bh.start + bh.size + CRC_SIZE as u64;
                    }
                }
                for (rh, bhs) in all_ranks.iter_mut().zip(all_blocks.iter()) {
                    rh.start = bhs[0].start;
                }
                file_size = prev_end;
            } else {
                let mut start = header_size;
                for rh in all_ranks.iter_mut() {
                    rh.start = start;
                    start += rh.nelems * record_size + (CRC_SIZE * nvars) as u64;
                }
                file_size = start;
            }

            let total_nelems: u64 = all_ranks.iter().map(|rh| rh.nelems).sum();

            // Send every writer its computed offsets.
            let rh_parts: Vec<Vec<u8>> = all_ranks
                .iter()
                .map(|rh| {
                    let mut b = BytesMut::new();
                    rh.encode(e, &mut b);
                    b.to_vec()
                })
                .collect();
            let mine = split.scatter(0, Some(rh_parts));
            rh_local = RankHeader::decode(e, &mine, RANK_HEADER_SIZE as u64, rank as u64);

            if needs_blocks {
                let bh_parts: Vec<Vec<u8>> = all_blocks
                    .iter()
                    .map(|bhs| {
                        let mut b = BytesMut::new();
                        for bh in bhs {
                            bh.encode(e, &mut b);
                        }
                        b.to_vec()
                    })
                    .collect();
                let mine = split.scatter(0, Some(bh_parts));
                local_blocks = mine
                    .chunks_exact(BLOCK_HEADER_SIZE)
                    .map(|c| BlockHeader::decode(e, c, BLOCK_HEADER_SIZE as u64))
                    .collect();
            }

            let vars_start = GLOBAL_HEADER_SIZE as u64 + octree_size;
            let ranks_start = vars_start + (nvars * VARIABLE_HEADER_SIZE) as u64;
            let gh = GlobalHeader {
                header_size: header_size - CRC_SIZE as u64,
                nelems: total_nelems,
                dims,
                nvars: nvars as u64,
                vars_size: VARIABLE_HEADER_SIZE as u64,
                vars_start,
                nranks: split_nranks as u64,
                ranks_size: RANK_HEADER_SIZE as u64,
                ranks_start,
                global_header_size: GLOBAL_HEADER_SIZE as u64,
                phys_origin: self.phys_origin,
                phys_scale: self.phys_scale,
                blocks_size: if needs_blocks {
                    BLOCK_HEADER_SIZE as u64
                } else {
                    0
                },
                blocks_start: if needs_blocks {
                    ranks_start + (split_nranks * RANK_HEADER_SIZE) as u64
                } else {
                    0
                },
                octree_size,
                octree_start: if octree_size > 0 {
                    GLOBAL_HEADER_SIZE as u64
                } else {
                    0
                },
            };

            let mut header = BytesMut::with_capacity(header_size as usize);
            gh.encode(e, &mut header);
            if let Some(blob) = &octree_blob {
                header.extend_from_slice(blob);
            }
            for var in &self.vars {
                var.header().encode(e, &mut header)?;
            }
            for rh in &all_ranks {
                rh.encode(e, &mut header);
            }
            for bhs in &all_blocks {
                for bh in bhs {
                    bh.encode(e, &mut header);
                }
            }
            debug_assert_eq!(header.len() as u64, header_size - CRC_SIZE as u64);

            let footer = crc64_invert(crc64(&header));
            header.extend_from_slice(&footer);

            let mut fh = local_file();
            fh.open(&local_file_name, false)?;
            fh.set_size(file_size)?;
            fh.write_at(&header, 0, "header")?;
            debug!(file = %local_file_name, header_size, file_size, "header written");
        } else {
            let mine = split.scatter(0, None);
            rh_local = RankHeader::decode(e, &mine, RANK_HEADER_SIZE as u64, rank as u64);
            if needs_blocks {
                let mine = split.scatter(0, None);
                local_blocks = mine
                    .chunks_exact(BLOCK_HEADER_SIZE)
                    .map(|c| BlockHeader::decode(e, c, BLOCK_HEADER_SIZE as u64))
                    .collect();
            }
        }

        split.barrier();

        // Bulk phase: every writer streams its variable blocks.
        let mut fh = group_file(self.io_mode, split.clone());
        fh.open(&local_file_name, false)?;

        let mut offset = rh_local.start;
        for (i, var) in self.vars.iter_mut().enumerate() {
            let write_size = if needs_blocks {
                local_blocks[i].size
            } else {
                nelems * var.size
            };
            if needs_blocks {
                offset = local_blocks[i].start;
            }

            match compressed.get_mut(i).and_then(|c| c.as_mut()) {
                Some(cdata) => {
                    // The compressed buffer is owned, so the footer can be
                    // appended and trimmed without a stash.
                    let footer = crc64_invert(crc64(cdata));
                    cdata.extend_from_slice(&footer);
                    fh.write_at(cdata, offset, &format!("{} with CRC", var.name))?;
                    cdata.truncate(write_size as usize);
                }
                None => {
                    // The group-collective capability reduces after every
                    // call, so each variable must issue exactly one write on
                    // every member.
                    let payload_len = write_size as usize;
                    let footer = crc64_invert(crc64(&var.data[..payload_len]));
                    if var.flags.extra_space && var.data.len() >= payload_len + CRC_SIZE {
                        // Stamp the footer in place, write once, restore.
                        let mut stash = [0u8; CRC_SIZE];
                        stash.copy_from_slice(&var.data[payload_len..payload_len + CRC_SIZE]);
                        var.data[payload_len..payload_len + CRC_SIZE].copy_from_slice(&footer);
                        fh.write_at(
                            &var.data[..payload_len + CRC_SIZE],
                            offset,
                            &format!("{} with CRC", var.name),
                        )?;
                        var.data[payload_len..payload_len + CRC_SIZE].copy_from_slice(&stash);
                    } else {
                        let mut block = Vec::with_capacity(payload_len + CRC_SIZE);
                        block.extend_from_slice(&var.data[..payload_len]);
                        block.extend_from_slice(&footer);
                        fh.write_at(&block, offset, &format!("{} with CRC", var.name))?;
                    }
                }
            }

            offset += write_size + CRC_SIZE as u64;
        }

        drop(fh);
        self.comm.barrier();

        let total_bytes = self
            .comm
            .all_reduce_sum(if split_rank == 0 { file_size } else { 0 });
        if rank == 0 {
            let elapsed = start_time.elapsed().as_secs_f64();
            let rate = total_bytes as f64 / elapsed / (1024.0 * 1024.0);
            info!(
                vars = nvars,
                file = %self.file_name,
                bytes = total_bytes,
                seconds = elapsed,
                mb_per_s = rate,
                "wrote variables"
            );
        }

        Ok(())
    }

    /// Write the rank-map artifact: a one-writer file mapping writer index
    /// to partition id, written by rank 0 through a process-local session.
    fn write_rank_map(&self, partitions: &[i32]) -> Result<()> {
        let nranks = partitions.len();
        let mut map_rank: Vec<i32> = (0..nranks as i32).collect();
        let mut map_partition = partitions.to_vec();

        let (mut cx, mut cy, mut cz) = (Vec::new(), Vec::new(), Vec::new());
        if let Some(dims) = self.comm.cart_dims() {
            for i in 0..nranks {
                let c = cart_coords(dims, i);
                cx.push(c[0] as i32);
                cy.push(c[1] as i32);
                cz.push(c[2] as i32);
            }
        }

        let mut gio = GenericIo::with_config(
            SelfComm::new(),
            self.file_name.clone(),
            self.io_mode,
            self.config.clone(),
            0,
        );
        gio.set_num_elems(nranks as u64);
        // The reading code assumes the partitions are in rank order; $rank
        // is for human consumption.
        gio.add_variable("$rank", &mut map_rank, VarFlags::default());
        gio.add_variable("$partition", &mut map_partition, VarFlags::default());
        if !cx.is_empty() {
            gio.add_variable("$x", &mut cx, VarFlags::default());
            gio.add_variable("$y", &mut cy, VarFlags::default());
            gio.add_variable("$z", &mut cz, VarFlags::default());
        }
        gio.write()
    }

    /// Build the per-writer octree, reorder every variable buffer by the
    /// shared permutation, and gather the sub-group's leaf table. The table
    /// is embedded in the sub-file's header, so its rows index sub-group
    /// writers only. Returns `None` when the octree is not applicable.
    fn build_octree_and_reorder(
        &mut self,
        dims: [u64; 3],
        coords: [u64; 3],
        split: &CommRef,
    ) -> Result<Option<OctreeIndex>> {
        let Some(opts) = self.octree else {
            return Ok(None);
        };

        if opts.levels < 2 {
            warn!(levels = opts.levels, "octree disabled: needs at least two levels");
            return Ok(None);
        }

        let coord_var = |pick: fn(&VarFlags) -> bool| {
            self.vars
                .iter()
                .find(|v| pick(&v.flags) && v.is_float && v.size == 4 && v.element_size == 4)
        };
        let (Some(vx), Some(vy), Some(vz)) = (
            coord_var(|f| f.phys_coord_x),
            coord_var(|f| f.phys_coord_y),
            coord_var(|f| f.phys_coord_z),
        ) else {
            warn!("octree disabled: no float32 coordinate variables registered");
            return Ok(None);
        };

        let nelems = self.nelems;
        let xs = f32s_from_bytes(vx.payload(nelems));
        let ys = f32s_from_bytes(vy.payload(nelems));
        let zs = f32s_from_bytes(vz.payload(nelems));

        // This writer's sub-box of the simulation volume.
        let mut extents = [0.0f64; 6];
        for axis in 0..3 {
            let cell = (self.phys_scale[axis] - self.phys_origin[axis]) / dims[axis] as f64;
            extents[axis * 2] = coords[axis] as f64 * cell;
            extents[axis * 2 + 1] = extents[axis * 2] + cell;
        }

        let grid = LeafGrid::new(extents, opts.levels);
        let (positions, counts) = assign_leaves(&grid, &xs, &ys, &zs);
        let perm = build_permutation(&positions, grid.num_leaves(), opts.shuffle);

        // One permutation, applied to every buffer.
        for var in &mut self.vars {
            let record_size = var.size as usize;
            apply_permutation(var.data, record_size, &perm);
        }

        // Gather per-leaf occupancy, then extents, across the sub-group.
        let counts_bytes: Vec<u8> = counts.iter().flat_map(|c| c.to_le_bytes()).collect();
        let gathered_counts = split.all_gather(&counts_bytes);

        let extents_bytes: Vec<u8> = grid
            .leaf_extents()
            .iter()
            .flat_map(|aabb| aabb.iter().flat_map(|v| v.to_le_bytes()).collect::<Vec<u8>>())
            .collect();
        let gathered_extents = split.all_gather(&extents_bytes);

        let counts_per_rank: Vec<Vec<u64>> = gathered_counts
            .iter()
            .map(|b| {
                b.chunks_exact(8)
                    .map(|c| u64::from_le_bytes(c.try_into().unwrap()))
                    .collect()
            })
            .collect();
        let extents_per_rank: Vec<Vec<[f32; 6]>> = gathered_extents
            .iter()
            .map(|b| {
                b.chunks_exact(24)
                    .map(|c| {
                        let mut aabb = [0.0f32; 6];
                        for (j, v) in aabb.iter_mut().enumerate() {
                            *v = f32::from_le_bytes(c[j * 4..j * 4 + 4].try_into().unwrap());
                        }
                        aabb
                    })
                    .collect()
            })
            .collect();

        Ok(Some(OctreeIndex::from_gathered(
            opts.levels as u64,
            opts.shuffle,
            &counts_per_rank,
            &extents_per_rank,
        )))
    }
}
