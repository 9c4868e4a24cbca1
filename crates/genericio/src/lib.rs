//! GenericIO — parallel self-describing I/O for N-body particle checkpoints.
//!
//! A fixed set of cooperating writers, one per partition of a 3-D Cartesian
//! decomposition, jointly produces a single endian-tagged binary artifact
//! recording named typed variable columns per writer, the writers'
//! coordinates, and the global simulation bounds. Readers may later open the
//! artifact with an arbitrary group size and reconstitute any subset of
//! variables column-wise, row-range-wise, or redistributed across a
//! different number of readers.
//!
//! ## Architecture
//!
//! ```text
//! caller ──► GenericIo (session)
//!               │  variables, bounds, options
//!               ▼
//!        write / read coordinators ──► Comm (collectives)
//!               │                        barrier, gather, scatter, ...
//!               ▼
//!        records + CRC + compression (genericio-core)
//!               │
//!               ▼
//!        FileIo (positional / collective / local)
//! ```
//!
//! The write path assembles the header collectively: the sub-group leader
//! gathers every writer's rank and block headers, computes all absolute data
//! offsets, scatters them back, and persists the CRC-stamped header before
//! the writers stream their payloads in parallel. The read path caches the
//! header per sub-file and runs a verify-decompress-swap pipeline per
//! variable.
//!
//! Partitioned writes produce one sub-file per partition plus a rank-map
//! artifact tying them together; readers discover the map transparently.

pub mod comm;
pub mod fileio;
pub mod octree;
pub mod partition;
pub mod session;
pub mod variable;

mod read;
mod write;

pub use comm::{cart_coords, Comm, CommRef, LocalComm, SelfComm};
pub use fileio::{FileIo, IoMode};
pub use octree::{OctreeIndex, OctreeLeaf, OctreeOptions};
pub use partition::natural_default_partition;
pub use session::{GenericIo, MismatchBehavior};
pub use variable::{Variable, VariableInfo};

pub use genericio_core::{Config, Element, ElementType, Endianness, Error, Result, VarFlags};
