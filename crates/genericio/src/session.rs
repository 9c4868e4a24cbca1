//! Session Front Door
//!
//! A [`GenericIo`] session binds a communicator, a filename, a partition id,
//! an I/O mode, and a variable list, and is then either committed exactly
//! once for writing or opened for reading. While reading, the session caches
//! the header bytes of the currently open sub-file; the cache is invalidated
//! when a different sub-file is selected.
//!
//! ## Writing
//!
//! ```ignore
//! let mut gio = GenericIo::new(comm, "checkpoint.gio");
//! gio.set_num_elems(n);
//! gio.set_phys_origin([0.0; 3]);
//! gio.set_phys_scale([256.0; 3]);
//! gio.add_variable("x", &mut xs, VarFlags::coord_x());
//! gio.add_variable("mask", &mut mask, VarFlags::with_extra_space());
//! gio.write()?;
//! ```
//!
//! ## Reading
//!
//! ```ignore
//! let mut gio = GenericIo::new(comm, "checkpoint.gio");
//! gio.open_and_read_header(MismatchBehavior::Allowed)?;
//! let n = gio.read_num_elems(None)?;
//! gio.add_variable("x", &mut xs, VarFlags::with_extra_space());
//! gio.read_data(None)?;
//! ```

use genericio_core::records::{
    BlockHeader, Endianness, GlobalHeader, RankHeader, VariableHeader,
};
use genericio_core::types::{Element, VarFlags};
use genericio_core::{Config, Error, Result};

use crate::comm::{CommRef, SelfComm};
use crate::fileio::{FileIo, IoMode};
use crate::octree::{OctreeIndex, OctreeOptions};
use crate::partition::natural_default_partition;
use crate::variable::{Variable, VariableInfo};

/// Policy applied when the reader group does not match the file's writer
/// count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MismatchBehavior {
    /// The group must match the file's writer count and decomposition.
    Disallowed,
    /// No enforcement; callers address file writers explicitly.
    Allowed,
    /// Remap the file's writers onto this group near-evenly.
    Redistribute,
}

/// The cached header of the currently open sub-file.
pub(crate) struct HeaderCache {
    pub(crate) bytes: Vec<u8>,
    pub(crate) endianness: Endianness,
    pub(crate) global: GlobalHeader,
}

impl HeaderCache {
    fn record(&self, start: u64, size: u64) -> &[u8] {
        let start = (start as usize).min(self.bytes.len());
        let end = (start + size as usize).min(self.bytes.len());
        &self.bytes[start..end]
    }

    pub(crate) fn variable_header(&self, j: u64) -> VariableHeader {
        let gh = &self.global;
        let record = self.record(gh.vars_start + j * gh.vars_size, gh.vars_size);
        VariableHeader::decode(self.endianness, record, gh.vars_size)
    }

    pub(crate) fn rank_header(&self, i: u64) -> RankHeader {
        let gh = &self.global;
        let record = self.record(gh.ranks_start + i * gh.ranks_size, gh.ranks_size);
        RankHeader::decode(self.endianness, record, gh.ranks_size, i)
    }

    pub(crate) fn block_header(&self, rank_index: u64, var_index: u64) -> BlockHeader {
        let gh = &self.global;
        let idx = rank_index * gh.nvars + var_index;
        let record = self.record(gh.blocks_start + idx * gh.blocks_size, gh.blocks_size);
        BlockHeader::decode(self.endianness, record, gh.blocks_size)
    }
}

/// A write-or-read session over one artifact.
pub struct GenericIo<'a> {
    pub(crate) comm: CommRef,
    pub(crate) file_name: String,
    pub(crate) io_mode: IoMode,
    pub(crate) partition: u64,
    pub(crate) config: Config,

    pub(crate) nelems: u64,
    pub(crate) phys_origin: [f64; 3],
    pub(crate) phys_scale: [f64; 3],
    pub(crate) vars: Vec<Variable<'a>>,
    pub(crate) octree: Option<OctreeOptions>,

    pub(crate) fh: Option<Box<dyn FileIo>>,
    pub(crate) header: Option<HeaderCache>,
    pub(crate) open_file_name: Option<String>,
    pub(crate) rank_map: Vec<u64>,
    pub(crate) redistributing: bool,
    pub(crate) source_ranks: Vec<usize>,
    pub(crate) disable_coll_err_checking: bool,
    pub(crate) octree_index: Option<OctreeIndex>,
}

impl<'a> GenericIo<'a> {
    /// A session over a communicator, with knobs captured from the process
    /// environment and the natural default partition id.
    pub fn new(comm: CommRef, file_name: impl Into<String>) -> GenericIo<'a> {
        Self::with_io_mode(comm, file_name, IoMode::default())
    }

    pub fn with_io_mode(
        comm: CommRef,
        file_name: impl Into<String>,
        io_mode: IoMode,
    ) -> GenericIo<'a> {
        let config = Config::from_env();
        let partition = natural_default_partition(&config, comm.rank());
        Self::with_config(comm, file_name, io_mode, config, partition)
    }

    /// A stand-alone session (singleton communicator).
    pub fn standalone(file_name: impl Into<String>) -> GenericIo<'a> {
        Self::new(SelfComm::new(), file_name)
    }

    pub(crate) fn with_config(
        comm: CommRef,
        file_name: impl Into<String>,
        io_mode: IoMode,
        config: Config,
        partition: u64,
    ) -> GenericIo<'a> {
        GenericIo {
            comm,
            file_name: file_name.into(),
            io_mode,
            partition,
            config,
            nelems: 0,
            phys_origin: [0.0; 3],
            phys_scale: [0.0; 3],
            vars: Vec::new(),
            octree: None,
            fh: None,
            header: None,
            open_file_name: None,
            rank_map: Vec::new(),
            redistributing: false,
            source_ranks: Vec::new(),
            disable_coll_err_checking: false,
            octree_index: None,
        }
    }

    // -----------------------------------------------------------------
    // Session options
    // -----------------------------------------------------------------

    pub fn set_num_elems(&mut self, nelems: u64) {
        self.nelems = nelems;
    }

    pub fn set_phys_origin(&mut self, origin: [f64; 3]) {
        self.phys_origin = origin;
    }

    pub fn set_phys_scale(&mut self, scale: [f64; 3]) {
        self.phys_scale = scale;
    }

    pub fn set_partition(&mut self, partition: u64) {
        self.partition = partition;
    }

    /// Enable the octree side-index for the coming write.
    pub fn set_octree(&mut self, levels: u32, shuffle: bool) {
        self.octree = Some(OctreeOptions { levels, shuffle });
    }

    /// Programmatic access to the captured knobs; overrides whatever the
    /// environment supplied at construction.
    pub fn config_mut(&mut self) -> &mut Config {
        &mut self.config
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Trailing bytes a caller should over-allocate per variable buffer so
    /// the library can stamp CRC footers in place.
    pub fn requested_extra_space(&self) -> usize {
        genericio_core::crc::CRC_SIZE
    }

    // -----------------------------------------------------------------
    // Variable registry
    // -----------------------------------------------------------------

    /// Register a typed column by reference. No data is copied; the buffer
    /// is read by `write` and filled by `read_data`.
    pub fn add_variable<T: Element>(&mut self, name: &str, data: &'a mut [T], flags: VarFlags) {
        self.vars.push(Variable::new(name, data, flags));
    }

    /// Register a raw byte column (multi-component records).
    #[allow(clippy::too_many_arguments)]
    pub fn add_variable_raw(
        &mut self,
        name: &str,
        size: u64,
        element_size: u64,
        is_float: bool,
        is_signed: bool,
        flags: VarFlags,
        data: &'a mut [u8],
    ) {
        self.vars.push(Variable::from_bytes(
            name,
            size,
            element_size,
            is_float,
            is_signed,
            flags,
            data,
        ));
    }

    pub fn clear_variables(&mut self) {
        self.vars.clear();
    }

    pub fn num_variables(&self) -> usize {
        self.vars.len()
    }

    // -----------------------------------------------------------------
    // Header-cache accessors
    // -----------------------------------------------------------------

    pub(crate) fn cached_header(&self) -> Result<&HeaderCache> {
        self.header.as_ref().ok_or(Error::HeaderNotCached)
    }

    pub(crate) fn open_path(&self) -> String {
        self.open_file_name
            .clone()
            .unwrap_or_else(|| self.file_name.clone())
    }

    /// The rank-header index backing an effective rank: the identity without
    /// a rank map, otherwise a lookup by recorded global rank.
    pub(crate) fn rank_index_of(&self, eff_rank: usize) -> Result<u64> {
        let cache = self.cached_header()?;
        if self.rank_map.is_empty() {
            if eff_rank as u64 >= cache.global.nranks {
                return Err(Error::RankNotFound {
                    rank: eff_rank,
                    path: self.open_path(),
                });
            }
            return Ok(eff_rank as u64);
        }
        if !RankHeader::carries_global_rank(cache.global.ranks_size) {
            return Ok(eff_rank as u64);
        }
        for i in 0..cache.global.nranks {
            if cache.rank_header(i).global_rank == eff_rank as u64 {
                return Ok(i);
            }
        }
        Err(Error::RankNotFound {
            rank: eff_rank,
            path: self.open_path(),
        })
    }

    /// Number of writers recorded in the artifact (the rank-map size when
    /// the artifact is partitioned).
    pub fn read_nranks(&self) -> Result<u64> {
        if !self.rank_map.is_empty() {
            return Ok(self.rank_map.len() as u64);
        }
        Ok(self.cached_header()?.global.nranks)
    }

    pub fn read_dims(&self) -> Result<[u64; 3]> {
        Ok(self.cached_header()?.global.dims)
    }

    /// The global element sum, or `None` when the open artifact is a
    /// partitioned rank map and no single sub-file knows the total.
    pub fn read_total_num_elems(&self) -> Result<Option<u64>> {
        if !self.rank_map.is_empty() {
            return Ok(None);
        }
        Ok(Some(self.cached_header()?.global.nelems))
    }

    pub fn read_phys_origin(&self) -> Result<[f64; 3]> {
        Ok(self.cached_header()?.global.phys_origin)
    }

    pub fn read_phys_scale(&self) -> Result<[f64; 3]> {
        Ok(self.cached_header()?.global.phys_scale)
    }

    /// Descriptions of every variable in the open sub-file.
    pub fn get_variable_info(&self) -> Result<Vec<VariableInfo>> {
        let cache = self.cached_header()?;
        Ok((0..cache.global.nvars)
            .map(|j| VariableInfo::from_header(&cache.variable_header(j)))
            .collect())
    }

    /// The octree index of the open sub-file, when one is present.
    pub fn octree_index(&self) -> Option<&OctreeIndex> {
        self.octree_index.as_ref()
    }

    /// The file ranks this reader is assigned: the redistribution source set
    /// when redistributing, otherwise the reader's own rank.
    pub fn get_source_ranks(&self) -> Vec<usize> {
        if self.redistributing {
            self.source_ranks.clone()
        } else {
            vec![self.comm.rank()]
        }
    }
}
