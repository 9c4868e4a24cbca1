//! Error Types for GenericIO
//!
//! All failures surfaced by the library flow through a single [`Error`] enum.
//!
//! ## Error Categories
//!
//! ### I/O Errors
//! - `FileIo`: an open/set-size/read/write primitive failed, with the file
//!   path and the operation that was in flight
//! - `CollectiveOpen`: one or more group members failed to open the file
//! - `LeaderFailure`: the sub-group leader signalled a failure during the
//!   collective header phase
//!
//! ### Data Integrity Errors
//! - `InvalidMagic`: the file does not start with a recognized magic
//! - `HeaderCrc`: the whole-header CRC invariant does not hold
//! - `ReadErrors`: the aggregate rollup of per-variable I/O, block-CRC and
//!   decompression-CRC counters after a read pass
//!
//! ### Schema Errors
//! - `SizeMismatch` / `ElementSizeMismatch` / `TypeMismatch`: a registered
//!   variable disagrees with the on-disk variable header
//! - `VariableNotFound`: a requested variable is absent from the file
//! - `UnknownFilter`: a block header names a filter this build does not know
//!
//! ### Topology Errors
//! - `CommSizeMismatch` / `DecompositionMismatch`: the reader group does not
//!   match the file under the *disallowed* mismatch policy
//!
//! All functions return `Result<T>`, aliased below, so `?` propagation works
//! throughout the crate.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("unable to {action} {what} for file: {path}: {source}")]
    FileIo {
        action: &'static str,
        what: String,
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("won't read {path}: invalid file-type identifier")]
    InvalidMagic { path: String },

    #[error("header CRC check failed: {path}")]
    HeaderCrc { path: String },

    #[error("truncated header in: {path}")]
    TruncatedHeader { path: String },

    #[error("won't read {path}: communicator-size mismatch: current: {current}, file: {file}")]
    CommSizeMismatch {
        path: String,
        current: usize,
        file: u64,
    },

    #[error("won't read {path}: communicator-decomposition mismatch: current: {current:?}, file: {file:?}")]
    DecompositionMismatch {
        path: String,
        current: [u64; 3],
        file: [u64; 3],
    },

    #[error("size mismatch for variable {name} in: {path}: current: {current}, file: {file}")]
    SizeMismatch {
        name: String,
        path: String,
        current: u64,
        file: u64,
    },

    #[error("element size mismatch for variable {name} in: {path}: current: {current}, file: {file}")]
    ElementSizeMismatch {
        name: String,
        path: String,
        current: u64,
        file: u64,
    },

    #[error("type mismatch for variable {name} in: {path}: current: {current}, file: {file}")]
    TypeMismatch {
        name: String,
        path: String,
        current: &'static str,
        file: &'static str,
    },

    #[error("variable {name} not found in: {path}")]
    VariableNotFound { name: String, path: String },

    #[error("rank {rank} not found in: {path}")]
    RankNotFound { rank: usize, path: String },

    #[error("unknown filter {filter:?} on variable {name}")]
    UnknownFilter { filter: String, name: String },

    #[error("extra space required for reading variable {name}")]
    ExtraSpaceRequired { name: String },

    #[error("section reads do not support blocked or compressed variables: {name}")]
    SectionUnsupported { name: String },

    #[error("variable name too long: {name}")]
    NameTooLong { name: String },

    #[error("decompression failed: {0}")]
    Decompression(String),

    #[error("{count} ranks failed to open file: {path}")]
    CollectiveOpen { count: u64, path: String },

    #[error("failure broadcast from rank 0 while opening: {path}")]
    LeaderFailure { path: String },

    #[error("experienced {io} I/O error(s), {crc} CRC error(s) and {decompress} decompression CRC error(s) reading: {path}")]
    ReadErrors {
        io: u64,
        crc: u64,
        decompress: u64,
        path: String,
    },

    #[error("invalid octree index: {0}")]
    InvalidOctree(String),

    #[error("header has not been read; call open_and_read_header first")]
    HeaderNotCached,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
