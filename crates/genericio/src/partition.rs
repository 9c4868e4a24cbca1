//! Partition Planning
//!
//! Writers may be routed into sub-groups, each producing an independent data
//! sub-file `"{filename}#{partition}"` while the configured filename becomes
//! a rank-map artifact tying them together. The default partition id is a
//! heuristic that lands the writers of one host in the same bucket: the
//! byte-sum of the host name, giving ~256 partitions.
//!
//! `GENERICIO_RANK_PARTITIONS` adds `rank % K` on top for debugging. The sum
//! can collide distinct partitions in pathological layouts; the behavior is
//! kept for compatibility with existing artifacts.

use genericio_core::Config;

/// Byte-sum of a host name, wrapped to a single byte.
pub(crate) fn name_color(name: &[u8]) -> u64 {
    let mut color = 0u8;
    for &b in name {
        color = color.wrapping_add(b);
    }
    color as u64
}

/// The partition id a session starts out with, before any explicit
/// `set_partition` override.
pub fn natural_default_partition(config: &Config, rank: usize) -> u64 {
    let mut partition = 0u64;

    if config.partitions_use_name {
        if let Ok(name) = hostname::get() {
            partition = name_color(name.to_string_lossy().as_bytes());
        }
    }

    if let Some(k) = config.rank_partitions {
        partition += rank as u64 % k;
    }

    partition
}
