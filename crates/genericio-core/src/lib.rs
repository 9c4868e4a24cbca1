//! Format-level primitives for the GenericIO particle checkpoint container.
//!
//! This crate holds everything that can be reasoned about without a
//! communicator or a file descriptor:
//!
//! - [`records`]: the five on-disk header records and the endianness layer
//! - [`crc`]: CRC64 checksums and the inverted trailing footer
//! - [`compress`]: the block compression filter and its inner-CRC header
//! - [`types`]: element type tags and variable flags
//! - [`config`]: runtime knobs captured once per session
//! - [`error`]: the shared error type
//!
//! The coordination layer (communicators, file I/O, the write and read
//! protocols) lives in the `genericio` crate.

pub mod compress;
pub mod config;
pub mod crc;
pub mod error;
pub mod records;
pub mod types;

pub use config::Config;
pub use error::{Error, Result};
pub use records::Endianness;
pub use types::{Element, ElementType, VarFlags};
