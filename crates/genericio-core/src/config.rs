//! Runtime Configuration
//!
//! Knobs are captured once when a session is created and never consulted
//! again from inner loops. Parsing goes through an injectable lookup
//! function so tests can exercise it without mutating the process
//! environment; `from_env` is the production entry point.
//!
//! ## Knobs
//!
//! - `GENERICIO_COMPRESS`: compress data blocks (implies block headers)
//! - `GENERICIO_FORCE_BLOCKS`: emit block headers even without compression
//! - `GENERICIO_PARTITIONS_USE_NAME`: derive the default partition id from
//!   the host name (default: true)
//! - `GENERICIO_RANK_PARTITIONS`: add `rank % K` to the partition id
//! - `GENERICIO_RETRY_COUNT`: read retry attempts (default: 300)
//! - `GENERICIO_RETRY_SLEEP`: milliseconds between retries (default: 100)
//! - `GENERICIO_VERBOSE`: per-retry and per-error diagnostics

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Compress data blocks through the recognized filter.
    pub should_compress: bool,

    /// Emit per-(writer, variable) block headers even when not compressing.
    pub force_blocks: bool,

    /// Derive the default partition id from the host name.
    pub partitions_use_name: bool,

    /// Debug override: add `rank % K` to the partition id.
    pub rank_partitions: Option<u64>,

    /// Read retry attempts before counting an I/O error.
    pub retry_count: u32,

    /// Sleep between read retries, in milliseconds.
    pub retry_sleep_ms: u64,

    /// Emit per-retry and per-error diagnostics.
    pub verbose: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            should_compress: false,
            force_blocks: false,
            partitions_use_name: true,
            rank_partitions: None,
            retry_count: 300,
            retry_sleep_ms: 100,
            verbose: false,
        }
    }
}

fn parse_i64(value: &str) -> i64 {
    // atoi semantics: leading integer prefix, 0 on garbage.
    let trimmed = value.trim();
    let end = trimmed
        .char_indices()
        .take_while(|(i, c)| c.is_ascii_digit() || (*i == 0 && (*c == '-' || *c == '+')))
        .map(|(i, c)| i + c.len_utf8())
        .last()
        .unwrap_or(0);
    trimmed[..end].parse().unwrap_or(0)
}

impl Config {
    /// Capture the knobs from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Capture the knobs through an arbitrary lookup function.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut cfg = Config::default();

        if let Some(v) = lookup("GENERICIO_COMPRESS") {
            cfg.should_compress = parse_i64(&v) > 0;
        }
        if let Some(v) = lookup("GENERICIO_FORCE_BLOCKS") {
            cfg.force_blocks = parse_i64(&v) > 0;
        }
        if let Some(v) = lookup("GENERICIO_PARTITIONS_USE_NAME") {
            cfg.partitions_use_name = parse_i64(&v) != 0;
        }
        if let Some(v) = lookup("GENERICIO_RANK_PARTITIONS") {
            let k = parse_i64(&v);
            if k > 0 {
                cfg.rank_partitions = Some(k as u64);
            }
        }
        if let Some(v) = lookup("GENERICIO_RETRY_COUNT") {
            cfg.retry_count = parse_i64(&v).max(0) as u32;
        }
        if let Some(v) = lookup("GENERICIO_RETRY_SLEEP") {
            cfg.retry_sleep_ms = parse_i64(&v).max(0) as u64;
        }
        if let Some(v) = lookup("GENERICIO_VERBOSE") {
            cfg.verbose = parse_i64(&v) > 0;
        }

        cfg
    }
}
