//! Read Coordinator
//!
//! The read side of the protocol:
//!
//! 1. **Rank-map detection.** The group leader speculatively opens the
//!    configured filename as a one-writer artifact and reads its
//!    `$partition` column; success marks the artifact as partitioned and the
//!    map is broadcast to the group.
//! 2. **Header phase.** Each sub-group leader reads the global header,
//!    recognizes the magic, verifies the whole-header CRC, and broadcasts
//!    the header bytes; every member caches them until a different sub-file
//!    is opened.
//! 3. **Mismatch policy.** Under *disallowed* the group must match the
//!    file's writer count and Cartesian decomposition. Under *redistribute*
//!    the file's writers are distributed near-evenly across the readers,
//!    remainder on the highest-indexed readers, and each reader runs on a
//!    singleton sub-communicator from then on.
//! 4. **Variable reads.** Locate by name, validate the schema, read with
//!    bounded retries, verify the block CRC, decompress and verify the inner
//!    CRC, and byte-swap when the artifact's byte order differs from the
//!    host's. Block-CRC and decompression failures are counted, dumped to
//!    the `gio_crc_errors/` side channel, and rolled up into one aggregate
//!    error after the variable loop.
//!
//! Section reads fetch a row range of each variable. They bypass the block
//! CRC (there is no footer covering an arbitrary range) and refuse
//! compressed or force-blocked artifacts outright.

use std::fs;
use std::io::Write as _;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::time::Instant;

use tracing::{debug, info, warn};

use genericio_core::compress::{decompress_block, InnerCrc, FILTER_NAME};
use genericio_core::crc::{self, CRC_SIZE};
use genericio_core::records::{
    BlockHeader, Endianness, GlobalHeader, RankHeader, swap_elements_in_place,
    GLOBAL_HEADER_SIZE, PRE_OCTREE_GLOBAL_HEADER_SIZE,
};
use genericio_core::{Error, Result};

use crate::comm::{CommRef, SelfComm};
use crate::fileio::{group_file, local_file};
use crate::octree::OctreeIndex;
use crate::session::{GenericIo, MismatchBehavior};
use crate::variable::Variable;

/// Distribute `n_file_ranks` writers across `n_readers`, remainder on the
/// highest-indexed readers so reader 0 is not overloaded.
pub(crate) fn plan_redistribution(
    n_file_ranks: usize,
    n_readers: usize,
    reader: usize,
) -> Vec<usize> {
    let per = n_file_ranks / n_readers;
    let rem = n_file_ranks % n_readers;

    let mut out = Vec::new();
    if per == 0 {
        // Only the remainder: the last `rem` readers get one file rank each.
        if rem > 0 && n_readers - reader <= rem {
            out.push(n_readers - (reader + 1));
        }
    } else {
        let mut first = 0usize;
        let mut last = per - 1;
        for i in 1..=reader {
            first = last + 1;
            last = first + per - 1;
            if rem > 0 && n_readers - i <= rem {
                last += 1;
            }
        }
        out.extend(first..=last);
    }
    out
}

/// Best-effort side channel for block-CRC failures: a raw dump of the block
/// and an appended diagnostic report, keyed by rank and a random tag.
fn dump_crc_error(
    rank: usize,
    var_name: &str,
    path: &str,
    retries: u32,
    data: &[u8],
    offset: u64,
) {
    let dir = Path::new("gio_crc_errors");
    let _ = fs::create_dir_all(dir);
    let _ = fs::set_permissions(dir, fs::Permissions::from_mode(0o777));

    let tag: u32 = rand::random();
    let dump_path = dir.join(format!("gio_crc_error_dump.{}.{}.bin", rank, tag));
    let log_path = dir.join(format!("gio_crc_error_log.{}.txt", rank));

    let report = format!(
        "On-Disk CRC Error Report:\n\
         Variable: {}\n\
         File: {}\n\
         I/O Retries: {}\n\
         Size: {} bytes\n\
         Offset: {} bytes\n\
         Dump file: {}\n\n",
        var_name,
        path,
        retries,
        data.len(),
        offset,
        dump_path.display()
    );
    let _ = fs::OpenOptions::new()
        .append(true)
        .create(true)
        .open(&log_path)
        .and_then(|mut f| f.write_all(report.as_bytes()));
    let _ = fs::write(&dump_path, data);

    warn!(
        rank,
        variable = var_name,
        file = path,
        dump = %dump_path.display(),
        "block CRC check failed"
    );
}

/// Per-rank header values the variable loop needs, copied out of the cache
/// so the variable buffers can be borrowed mutably alongside the file
/// handle.
struct RankView {
    endianness: Endianness,
    rank_header: RankHeader,
    var_headers: Vec<genericio_core::records::VariableHeader>,
    blocks: Vec<BlockHeader>,
}

impl<'a> GenericIo<'a> {
    /// Open the artifact (or this rank's sub-file) and cache its header.
    /// Collective across the session's communicator.
    pub fn open_and_read_header(&mut self, mb: MismatchBehavior) -> Result<()> {
        self.open_and_read_header_for(mb, None, true)
    }

    pub(crate) fn open_and_read_header_for(
        &mut self,
        mb: MismatchBehavior,
        eff_rank: Option<usize>,
        check_part_map: bool,
    ) -> Result<()> {
        let rank = self.comm.rank();
        let nranks = self.comm.size();
        let eff = eff_rank.unwrap_or(if mb == MismatchBehavior::Redistribute {
            0
        } else {
            rank
        });

        if self.rank_map.is_empty() && check_part_map {
            self.probe_rank_map(rank)?;
        }

        let local_file_name = if self.rank_map.is_empty() {
            self.file_name.clone()
        } else {
            format!("{}#{}", self.file_name, self.rank_map[eff])
        };

        // The sub-group this open participates in. Redistribution runs every
        // reader on its own singleton so members can proceed alone.
        let split: CommRef = if mb == MismatchBehavior::Redistribute {
            SelfComm::new()
        } else if self.rank_map.is_empty() {
            self.comm.clone()
        } else {
            self.comm.split(self.rank_map[eff])
        };

        if self.open_file_name.as_deref() == Some(local_file_name.as_str()) {
            return Ok(());
        }
        self.fh = None;
        self.header = None;
        self.octree_index = None;
        self.open_file_name = None;

        let split_rank = split.rank();
        let split_nranks = split.size();

        let mut header_bytes: Vec<u8>;
        if split_rank == 0 {
            match self.read_header_leader(mb, rank, nranks, split_nranks, &local_file_name) {
                Ok(bytes) => {
                    header_bytes = bytes;
                    let mut ok = vec![1u8];
                    split.broadcast(0, &mut ok);
                }
                Err(err) => {
                    let mut ok = vec![0u8];
                    split.broadcast(0, &mut ok);
                    return Err(err);
                }
            }
        } else {
            let mut ok = vec![0u8];
            split.broadcast(0, &mut ok);
            if ok[0] == 0 {
                return Err(Error::LeaderFailure {
                    path: local_file_name,
                });
            }
            header_bytes = Vec::new();
        }

        split.broadcast(0, &mut header_bytes);

        let endianness =
            Endianness::from_magic(&header_bytes).ok_or_else(|| Error::InvalidMagic {
                path: local_file_name.clone(),
            })?;
        let gh = GlobalHeader::decode(endianness, &header_bytes)?;

        // Octree blob, when one is present. Files whose variables start
        // right at the pre-octree header size predate the index entirely.
        if gh.vars_start != PRE_OCTREE_GLOBAL_HEADER_SIZE && gh.octree_size > 0 {
            let start = gh.octree_start as usize;
            let end = start + gh.octree_size as usize;
            if end > header_bytes.len() {
                return Err(Error::TruncatedHeader {
                    path: local_file_name,
                });
            }
            self.octree_index = Some(OctreeIndex::deserialize(&header_bytes[start..end])?);
        }

        self.header = Some(crate::session::HeaderCache {
            bytes: header_bytes,
            endianness,
            global: gh,
        });
        self.open_file_name = Some(local_file_name.clone());

        if !self.disable_coll_err_checking {
            self.comm.barrier();
        }

        // Reopen through the group capability for the bulk reads.
        let mut fh = group_file(self.io_mode, split.clone());
        let open_result = fh.open(&local_file_name, true);
        let failed = open_result.is_err() as u64;
        let total_failed = if self.disable_coll_err_checking {
            failed
        } else {
            self.comm.all_reduce_sum(failed)
        };
        open_result?;
        if total_failed > 0 {
            return Err(Error::CollectiveOpen {
                count: total_failed,
                path: local_file_name,
            });
        }
        self.fh = Some(fh);

        Ok(())
    }

    /// Leader-side header phase: probe the magic, apply the mismatch
    /// policy, read the full header, and verify its CRC.
    fn read_header_leader(
        &mut self,
        mb: MismatchBehavior,
        rank: usize,
        nranks: usize,
        split_nranks: usize,
        path: &str,
    ) -> Result<Vec<u8>> {
        let mut fh = local_file();
        fh.open(path, true)?;

        let mut probe = vec![0xFEu8; GLOBAL_HEADER_SIZE];
        fh.read_at(&mut probe, 0, "global header")?;

        let endianness = Endianness::from_magic(&probe).ok_or_else(|| Error::InvalidMagic {
            path: path.to_string(),
        })?;
        let gh = GlobalHeader::decode(endianness, &probe)?;

        match mb {
            MismatchBehavior::Disallowed => {
                if split_nranks as u64 != gh.nranks {
                    return Err(Error::CommSizeMismatch {
                        path: path.to_string(),
                        current: split_nranks,
                        file: gh.nranks,
                    });
                }
                if let Some(dims) = self.comm.cart_dims() {
                    if dims != gh.dims {
                        return Err(Error::DecompositionMismatch {
                            path: path.to_string(),
                            current: dims,
                            file: gh.dims,
                        });
                    }
                }
            }
            MismatchBehavior::Redistribute if !self.redistributing => {
                self.redistributing = true;
                let n_file_ranks = if self.rank_map.is_empty() {
                    gh.nranks as usize
                } else {
                    self.rank_map.len()
                };
                self.source_ranks = plan_redistribution(n_file_ranks, nranks, rank);
                debug!(sources = ?self.source_ranks, "redistribution plan");
            }
            _ => {}
        }

        let mut header = vec![0xFEu8; gh.header_size as usize + CRC_SIZE];
        fh.read_at(&mut header, 0, "header")?;

        if !crc::verify(&header) {
            return Err(Error::HeaderCrc {
                path: path.to_string(),
            });
        }
        Ok(header)
    }

    /// Leader probes the configured filename as a rank map; the result is
    /// broadcast to the group. Any failure simply means the file is not a
    /// rank map.
    fn probe_rank_map(&mut self, rank: usize) -> Result<()> {
        let mut map: Vec<u64> = Vec::new();
        if rank == 0 {
            if let Ok(m) = self.try_read_rank_map() {
                map = m;
            }
        }

        let mut count_bytes = (map.len() as u64).to_le_bytes().to_vec();
        self.comm.broadcast(0, &mut count_bytes);
        let count = u64::from_le_bytes(count_bytes[..8].try_into().unwrap());

        if count > 0 {
            let mut map_bytes: Vec<u8> = map.iter().flat_map(|p| p.to_le_bytes()).collect();
            self.comm.broadcast(0, &mut map_bytes);
            self.rank_map = map_bytes
                .chunks_exact(8)
                .map(|c| u64::from_le_bytes(c.try_into().unwrap()))
                .collect();
        }
        Ok(())
    }

    fn try_read_rank_map(&self) -> Result<Vec<u64>> {
        let ranks_in_map = {
            let mut probe = GenericIo::with_config(
                SelfComm::new(),
                self.file_name.clone(),
                self.io_mode,
                self.config.clone(),
                0,
            );
            probe.open_and_read_header_for(MismatchBehavior::Disallowed, Some(0), false)?;
            probe.read_num_elems(Some(0))? as usize
        };

        let mut partitions =
            vec![0i32; ranks_in_map + self.requested_extra_space() / std::mem::size_of::<i32>()];
        let mut probe = GenericIo::with_config(
            SelfComm::new(),
            self.file_name.clone(),
            self.io_mode,
            self.config.clone(),
            0,
        );
        probe.open_and_read_header_for(MismatchBehavior::Disallowed, Some(0), false)?;
        probe.add_variable(
            "$partition",
            &mut partitions,
            genericio_core::VarFlags::with_extra_space(),
        );
        probe.read_data(None)?;
        drop(probe);

        Ok(partitions[..ranks_in_map].iter().map(|&p| p as u64).collect())
    }

    // -----------------------------------------------------------------
    // Header-backed accessors that (re)open on demand
    // -----------------------------------------------------------------

    /// Row count of one writer; with `None`, this reader's own writer, or
    /// the sum over its assigned source set when redistributing.
    pub fn read_num_elems(&mut self, eff_rank: Option<usize>) -> Result<u64> {
        if eff_rank.is_none() && self.redistributing {
            self.disable_coll_err_checking = true;
            let mut total = 0;
            let sources = self.source_ranks.clone();
            for s in sources {
                total += self.read_num_elems(Some(s))?;
            }
            self.disable_coll_err_checking = false;
            return Ok(total);
        }

        let eff = eff_rank.unwrap_or(self.comm.rank());
        let mb = if self.redistributing {
            MismatchBehavior::Redistribute
        } else {
            MismatchBehavior::Allowed
        };
        self.open_and_read_header_for(mb, Some(eff), false)?;
        let idx = self.rank_index_of(eff)?;
        Ok(self.cached_header()?.rank_header(idx).nelems)
    }

    /// Cartesian coordinates of one writer. Zero when redistributing
    /// without an explicit rank, since the notion no longer applies.
    pub fn read_coords(&mut self, eff_rank: Option<usize>) -> Result<[u64; 3]> {
        if eff_rank.is_none() && self.redistributing {
            return Ok([0, 0, 0]);
        }
        let eff = eff_rank.unwrap_or(self.comm.rank());
        self.open_and_read_header_for(MismatchBehavior::Allowed, Some(eff), false)?;
        let idx = self.rank_index_of(eff)?;
        Ok(self.cached_header()?.rank_header(idx).coords)
    }

    /// The global rank recorded for one writer.
    pub fn read_global_rank_number(&mut self, eff_rank: Option<usize>) -> Result<u64> {
        let eff = eff_rank.unwrap_or(self.comm.rank());
        self.open_and_read_header_for(MismatchBehavior::Allowed, Some(eff), false)?;
        let idx = self.rank_index_of(eff)?;
        let cache = self.cached_header()?;
        if !RankHeader::carries_global_rank(cache.global.ranks_size) {
            return Ok(eff as u64);
        }
        Ok(cache.rank_header(idx).global_rank)
    }

    // -----------------------------------------------------------------
    // Bulk reads
    // -----------------------------------------------------------------

    /// Read every registered variable into its buffer. With `None` and
    /// redistribution in effect, concatenate this reader's assigned writers
    /// in file order; otherwise read the given writer (defaulting to this
    /// reader's own rank).
    pub fn read_data(&mut self, eff_rank: Option<usize>) -> Result<()> {
        let start_time = Instant::now();
        let rank = self.comm.rank();
        let mut nerrs = [0u64; 3];
        let mut total_read = 0u64;

        if eff_rank.is_none() && self.redistributing {
            self.disable_coll_err_checking = true;
            let mut row_offset = 0u64;
            let sources = self.source_ranks.clone();
            for s in sources {
                self.read_rank_data(s, row_offset, &mut total_read, &mut nerrs)?;
                row_offset += self.read_num_elems(Some(s))?;
            }
            self.disable_coll_err_checking = false;
        } else {
            self.read_rank_data(eff_rank.unwrap_or(rank), 0, &mut total_read, &mut nerrs)?;
        }

        self.finish_read(rank, start_time, total_read, nerrs)
    }

    /// Read a row range of every registered variable. The block-CRC check
    /// does not apply to partial ranges and is skipped; compressed or
    /// force-blocked artifacts are rejected.
    pub fn read_data_section(
        &mut self,
        read_offset: u64,
        read_num_rows: u64,
        eff_rank: Option<usize>,
    ) -> Result<()> {
        let start_time = Instant::now();
        let rank = self.comm.rank();
        let mut nerrs = [0u64; 3];
        let mut total_read = 0u64;

        if eff_rank.is_none() && self.redistributing {
            self.disable_coll_err_checking = true;
            let mut row_offset = 0u64;
            let sources = self.source_ranks.clone();
            for s in sources {
                self.read_section_rank_data(
                    read_offset,
                    read_num_rows,
                    s,
                    row_offset,
                    &mut total_read,
                    &mut nerrs,
                )?;
                row_offset += self.read_num_elems(Some(s))?;
            }
            self.disable_coll_err_checking = false;
        } else {
            self.read_section_rank_data(
                read_offset,
                read_num_rows,
                eff_rank.unwrap_or(rank),
                0,
                &mut total_read,
                &mut nerrs,
            )?;
        }

        self.finish_read(rank, start_time, total_read, nerrs)
    }

    /// Reduce the error counters across the group and raise the aggregate
    /// error, then report throughput.
    fn finish_read(
        &mut self,
        rank: usize,
        start_time: Instant,
        total_read: u64,
        nerrs: [u64; 3],
    ) -> Result<()> {
        let all_io = self.comm.all_reduce_sum(nerrs[0]);
        let all_crc = self.comm.all_reduce_sum(nerrs[1]);
        let all_decompress = self.comm.all_reduce_sum(nerrs[2]);

        if all_io > 0 || all_crc > 0 || all_decompress > 0 {
            return Err(Error::ReadErrors {
                io: all_io,
                crc: all_crc,
                decompress: all_decompress,
                path: self.open_path(),
            });
        }

        self.comm.barrier();

        let all_bytes = self.comm.all_reduce_sum(total_read);
        if rank == 0 {
            let elapsed = start_time.elapsed().as_secs_f64();
            let rate = all_bytes as f64 / elapsed.max(f64::EPSILON) / (1024.0 * 1024.0);
            info!(
                vars = self.vars.len(),
                file = %self.file_name,
                bytes = all_bytes,
                seconds = elapsed,
                mb_per_s = rate,
                "read variables"
            );
        }
        Ok(())
    }

    /// Copy the header-derived values the variable loop needs so the file
    /// handle and the variable buffers can be borrowed side by side.
    fn rank_view(&self, rank_index: u64) -> Result<RankView> {
        let cache = self.cached_header()?;
        let gh = cache.global.clone();
        let var_headers = (0..gh.nvars).map(|j| cache.variable_header(j)).collect();
        let blocks = if gh.has_blocks() {
            (0..gh.nvars)
                .map(|j| cache.block_header(rank_index, j))
                .collect()
        } else {
            Vec::new()
        };
        Ok(RankView {
            endianness: cache.endianness,
            rank_header: cache.rank_header(rank_index),
            var_headers,
            blocks,
        })
    }

    /// The full per-writer read: locate, validate, read with retries,
    /// verify, decompress, swap.
    fn read_rank_data(
        &mut self,
        eff_rank: usize,
        row_offset: u64,
        total_read: &mut u64,
        nerrs: &mut [u64; 3],
    ) -> Result<()> {
        let mb = if self.redistributing {
            MismatchBehavior::Redistribute
        } else {
            MismatchBehavior::Allowed
        };
        self.open_and_read_header_for(mb, Some(eff_rank), false)?;

        let rank_index = self.rank_index_of(eff_rank)?;
        let view = self.rank_view(rank_index)?;
        let path = self.open_path();
        let world_rank = self.comm.rank();
        let retry_count = self.config.retry_count;
        let retry_sleep = self.config.retry_sleep_ms;
        let verbose = self.config.verbose;
        let host = Endianness::host();
        let rh = view.rank_header;

        let fh = self.fh.as_mut().ok_or(Error::HeaderNotCached)?;

        'vars: for vi in 0..self.vars.len() {
            let (j, mut offset) = match locate_variable(&view, &rh, &self.vars[vi].name) {
                Some(found) => found,
                None => {
                    return Err(Error::VariableNotFound {
                        name: self.vars[vi].name.clone(),
                        path: path.clone(),
                    })
                }
            };
            let vh = &view.var_headers[j];
            validate_variable(vh, &self.vars[vi], &path)?;

            let mut read_size = rh.nelems * vh.size + CRC_SIZE as u64;
            let mut is_compressed = false;
            if !view.blocks.is_empty() {
                let bh = &view.blocks[j];
                read_size = bh.size + CRC_SIZE as u64;
                offset = bh.start;
                match bh.first_filter() {
                    Some(f) if f == FILTER_NAME => is_compressed = true,
                    Some(f) => {
                        return Err(Error::UnknownFilter {
                            filter: f,
                            name: self.vars[vi].name.clone(),
                        })
                    }
                    None => {}
                }
            }

            let var_name = self.vars[vi].name.clone();
            let var = &mut self.vars[vi];
            let element_size = var.element_size as usize;
            let mut temp = Vec::new();
            let dest: &mut [u8] = if is_compressed {
                temp = vec![0u8; read_size as usize];
                &mut temp
            } else {
                var.payload_mut(row_offset, rh.nelems, CRC_SIZE)?
            };

            // Preserve the caller's trailing bytes that will transiently
            // hold the on-disk footer.
            let dlen = dest.len();
            let mut stash = [0u8; CRC_SIZE];
            stash.copy_from_slice(&dest[dlen - CRC_SIZE..]);

            let mut attempt = 0u32;
            let ok = loop {
                if attempt >= retry_count {
                    break false;
                }
                match fh.read_at(dest, offset, &var_name) {
                    Ok(()) => break true,
                    Err(err) => {
                        debug!(variable = %var_name, attempt, error = %err, "read attempt failed");
                        attempt += 1;
                        if attempt < retry_count {
                            std::thread::sleep(std::time::Duration::from_millis(retry_sleep));
                        }
                    }
                }
            };
            if !ok {
                nerrs[0] += 1;
                break 'vars;
            }
            if attempt > 0 && verbose {
                warn!(
                    rank = world_rank,
                    retries = attempt,
                    variable = %var_name,
                    file = %path,
                    "I/O retries were necessary"
                );
            }

            *total_read += read_size;

            if !crc::verify(dest) {
                nerrs[1] += 1;
                dump_crc_error(world_rank, &var_name, &path, attempt, dest, offset);
                break 'vars;
            }

            if is_compressed {
                let var_dest = var.payload_mut(row_offset, rh.nelems, 0)?;
                let block = &temp[..read_size as usize - CRC_SIZE];
                match decompress_block(view.endianness, block, var_dest) {
                    Ok(InnerCrc::Ok) => {}
                    Ok(InnerCrc::Mismatch) => {
                        nerrs[2] += 1;
                        break 'vars;
                    }
                    Err(err) => {
                        debug!(variable = %var_name, error = %err, "decompression failed");
                        nerrs[2] += 1;
                        break 'vars;
                    }
                }
            } else {
                let restore_at = dlen - CRC_SIZE;
                let dest = var.payload_mut(row_offset, rh.nelems, CRC_SIZE)?;
                dest[restore_at..].copy_from_slice(&stash);
            }

            if view.endianness != host {
                let span = var.payload_mut(row_offset, rh.nelems, 0)?;
                swap_elements_in_place(span, element_size);
            }
        }

        Ok(())
    }

    /// The section read: a row range of each variable, no CRC coverage.
    fn read_section_rank_data(
        &mut self,
        read_offset: u64,
        read_num_rows: u64,
        eff_rank: usize,
        row_offset: u64,
        total_read: &mut u64,
        nerrs: &mut [u64; 3],
    ) -> Result<()> {
        let mb = if self.redistributing {
            MismatchBehavior::Redistribute
        } else {
            MismatchBehavior::Allowed
        };
        self.open_and_read_header_for(mb, Some(eff_rank), false)?;

        let rank_index = self.rank_index_of(eff_rank)?;
        let view = self.rank_view(rank_index)?;
        let path = self.open_path();
        let retry_count = self.config.retry_count;
        let retry_sleep = self.config.retry_sleep_ms;
        let host = Endianness::host();
        let rh = view.rank_header;

        let fh = self.fh.as_mut().ok_or(Error::HeaderNotCached)?;

        'vars: for vi in 0..self.vars.len() {
            let (j, var_offset) = match locate_variable(&view, &rh, &self.vars[vi].name) {
                Some(found) => found,
                None => {
                    return Err(Error::VariableNotFound {
                        name: self.vars[vi].name.clone(),
                        path: path.clone(),
                    })
                }
            };
            let vh = &view.var_headers[j];
            validate_variable_section(vh, &self.vars[vi], &path)?;

            if !view.blocks.is_empty() {
                return Err(Error::SectionUnsupported {
                    name: self.vars[vi].name.clone(),
                });
            }

            let read_size = read_num_rows * vh.size;
            let offset = var_offset + read_offset * vh.size;

            let var_name = self.vars[vi].name.clone();
            let var = &mut self.vars[vi];
            let element_size = var.element_size as usize;
            let dest = var.payload_mut(row_offset, read_num_rows, 0)?;

            let mut attempt = 0u32;
            let ok = loop {
                if attempt >= retry_count {
                    break false;
                }
                match fh.read_at(dest, offset, &var_name) {
                    Ok(()) => break true,
                    Err(err) => {
                        debug!(variable = %var_name, attempt, error = %err, "read attempt failed");
                        attempt += 1;
                        if attempt < retry_count {
                            std::thread::sleep(std::time::Duration::from_millis(retry_sleep));
                        }
                    }
                }
            };
            if !ok {
                nerrs[0] += 1;
                break 'vars;
            }

            *total_read += read_size;

            if view.endianness != host {
                let span = var.payload_mut(row_offset, read_num_rows, 0)?;
                swap_elements_in_place(span, element_size);
            }
        }

        Ok(())
    }
}

/// Scan the variable headers for a name, accumulating the offset of each
/// preceding block. Returns the variable index and this writer's offset for
/// it.
fn locate_variable(view: &RankView, rh: &RankHeader, name: &str) -> Option<(usize, u64)> {
    let mut offset = rh.start;
    for (j, vh) in view.var_headers.iter().enumerate() {
        if vh.name == name {
            return Some((j, offset));
        }
        offset += rh.nelems * vh.size + CRC_SIZE as u64;
    }
    None
}

fn validate_variable(
    vh: &genericio_core::records::VariableHeader,
    var: &Variable<'_>,
    path: &str,
) -> Result<()> {
    if vh.size != var.size {
        return Err(Error::SizeMismatch {
            name: var.name.clone(),
            path: path.to_string(),
            current: var.size,
            file: vh.size,
        });
    }
    if vh.element_size != var.element_size {
        return Err(Error::ElementSizeMismatch {
            name: var.name.clone(),
            path: path.to_string(),
            current: var.element_size,
            file: vh.element_size,
        });
    }
    check_type_flags(vh, var, path)
}

/// Section reads predate the element-size field and only validate the
/// record size and type flags.
fn validate_variable_section(
    vh: &genericio_core::records::VariableHeader,
    var: &Variable<'_>,
    path: &str,
) -> Result<()> {
    if vh.size != var.size {
        return Err(Error::SizeMismatch {
            name: var.name.clone(),
            path: path.to_string(),
            current: var.size,
            file: vh.size,
        });
    }
    check_type_flags(vh, var, path)
}

fn check_type_flags(
    vh: &genericio_core::records::VariableHeader,
    var: &Variable<'_>,
    path: &str,
) -> Result<()> {
    if vh.is_float() != var.is_float {
        return Err(Error::TypeMismatch {
            name: var.name.clone(),
            path: path.to_string(),
            current: if var.is_float { "float" } else { "integer" },
            file: if vh.is_float() { "float" } else { "integer" },
        });
    }
    if vh.is_signed() != var.is_signed {
        return Err(Error::TypeMismatch {
            name: var.name.clone(),
            path: path.to_string(),
            current: if var.is_signed { "signed" } else { "unsigned" },
            file: if vh.is_signed() { "signed" } else { "unsigned" },
        });
    }
    Ok(())
}
