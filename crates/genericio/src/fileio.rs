//! File I/O Capability
//!
//! A thin abstraction over a byte-addressed file: `open`, `set_size`,
//! `read_at`, `write_at`. Three variants back it:
//!
//! - **positional** ([`PosixFile`]): independent per-process offsets over
//!   pread/pwrite, looping on short counts and absorbing EINTR
//! - **group-collective** ([`CollectiveFile`]): the same call participates
//!   across every member of a sub-group; after each I/O round the members
//!   reduce-sum their residual byte counts to decide whether another round
//!   is needed
//! - **process-local**: a positional file used by a single process (the
//!   leader's header round-trip and the rank-map artifact); constructed via
//!   [`local_file`]
//!
//! Short reads at end-of-file surface as I/O errors rather than spinning.

use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::fs::{FileExt, OpenOptionsExt};

use genericio_core::error::{Error, Result};

use crate::comm::CommRef;

/// A byte-addressed file capability.
pub trait FileIo: Send {
    fn open(&mut self, path: &str, for_reading: bool) -> Result<()>;
    fn set_size(&mut self, size: u64) -> Result<()>;
    fn read_at(&mut self, buf: &mut [u8], offset: u64, what: &str) -> Result<()>;
    fn write_at(&mut self, buf: &[u8], offset: u64, what: &str) -> Result<()>;
    fn path(&self) -> &str;
}

fn io_err(action: &'static str, what: &str, path: &str, source: io::Error) -> Error {
    Error::FileIo {
        action,
        what: what.to_string(),
        path: path.to_string(),
        source,
    }
}

/// Positional file over pread/pwrite.
pub struct PosixFile {
    file: Option<File>,
    path: String,
}

impl PosixFile {
    pub fn new() -> Self {
        PosixFile {
            file: None,
            path: String::new(),
        }
    }

    fn file(&self, what: &str) -> Result<&File> {
        self.file
            .as_ref()
            .ok_or_else(|| io_err("access", what, &self.path, io::Error::from(io::ErrorKind::NotConnected)))
    }

    /// One read attempt, EINTR absorbed. Returns the byte count.
    fn read_some(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        let file = self.file.as_ref().ok_or(io::ErrorKind::NotConnected)?;
        loop {
            match file.read_at(buf, offset) {
                Ok(0) if !buf.is_empty() => {
                    return Err(io::Error::from(io::ErrorKind::UnexpectedEof))
                }
                Ok(n) => return Ok(n),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }

    /// One write attempt, EINTR absorbed. Returns the byte count.
    fn write_some(&self, buf: &[u8], offset: u64) -> io::Result<usize> {
        let file = self.file.as_ref().ok_or(io::ErrorKind::NotConnected)?;
        loop {
            match file.write_at(buf, offset) {
                Ok(n) => return Ok(n),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }
}

impl Default for PosixFile {
    fn default() -> Self {
        Self::new()
    }
}

impl FileIo for PosixFile {
    fn open(&mut self, path: &str, for_reading: bool) -> Result<()> {
        self.path = path.to_string();
        let file = if for_reading {
            File::open(path)
        } else {
            OpenOptions::new()
                .write(true)
                .create(true)
                .mode(0o640)
                .open(path)
        };
        match file {
            Ok(f) => {
                self.file = Some(f);
                Ok(())
            }
            Err(e) => Err(io_err(
                if for_reading { "open" } else { "create" },
                "the file",
                path,
                e,
            )),
        }
    }

    fn set_size(&mut self, size: u64) -> Result<()> {
        self.file("size")?
            .set_len(size)
            .map_err(|e| io_err("set size for", "the file", &self.path, e))
    }

    fn read_at(&mut self, mut buf: &mut [u8], mut offset: u64, what: &str) -> Result<()> {
        while !buf.is_empty() {
            let n = self
                .read_some(buf, offset)
                .map_err(|e| io_err("read", what, &self.path, e))?;
            buf = &mut buf[n..];
            offset += n as u64;
        }
        Ok(())
    }

    fn write_at(&mut self, mut buf: &[u8], mut offset: u64, what: &str) -> Result<()> {
        while !buf.is_empty() {
            let n = self
                .write_some(buf, offset)
                .map_err(|e| io_err("write", what, &self.path, e))?;
            buf = &buf[n..];
            offset += n as u64;
        }
        Ok(())
    }

    fn path(&self) -> &str {
        &self.path
    }
}

/// Group-collective file: every call participates across the sub-group, and
/// members keep issuing rounds until the group-wide residual reaches zero.
pub struct CollectiveFile {
    inner: PosixFile,
    comm: CommRef,
}

impl CollectiveFile {
    pub fn new(comm: CommRef) -> Self {
        CollectiveFile {
            inner: PosixFile::new(),
            comm,
        }
    }
}

impl FileIo for CollectiveFile {
    fn open(&mut self, path: &str, for_reading: bool) -> Result<()> {
        self.inner.open(path, for_reading)
    }

    fn set_size(&mut self, size: u64) -> Result<()> {
        self.inner.set_size(size)
    }

    fn read_at(&mut self, buf: &mut [u8], offset: u64, what: &str) -> Result<()> {
        let mut filled = 0usize;
        loop {
            if filled < buf.len() {
                let n = self
                    .inner
                    .read_some(&mut buf[filled..], offset + filled as u64)
                    .map_err(|e| io_err("read", what, &self.inner.path, e))?;
                filled += n;
            }
            let residual = (buf.len() - filled) as u64;
            if self.comm.all_reduce_sum(residual) == 0 {
                return Ok(());
            }
        }
    }

    fn write_at(&mut self, buf: &[u8], offset: u64, what: &str) -> Result<()> {
        let mut written = 0usize;
        loop {
            if written < buf.len() {
                let n = self
                    .inner
                    .write_some(&buf[written..], offset + written as u64)
                    .map_err(|e| io_err("write", what, &self.inner.path, e))?;
                written += n;
            }
            let residual = (buf.len() - written) as u64;
            if self.comm.all_reduce_sum(residual) == 0 {
                return Ok(());
            }
        }
    }

    fn path(&self) -> &str {
        self.inner.path()
    }
}

/// Which capability a session opens its data files through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IoMode {
    /// Independent positional access per process.
    #[default]
    Posix,
    /// Group-collective rounds across the sub-group.
    Collective,
}

/// Instantiate the group capability for a sub-group.
pub fn group_file(mode: IoMode, comm: CommRef) -> Box<dyn FileIo> {
    match mode {
        IoMode::Posix => Box::new(PosixFile::new()),
        IoMode::Collective => Box::new(CollectiveFile::new(comm)),
    }
}

/// Instantiate the process-local capability (leader round-trips, rank-map
/// artifact).
pub fn local_file() -> Box<dyn FileIo> {
    Box::new(PosixFile::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::SelfComm;
    use tempfile::TempDir;

    #[test]
    fn test_posix_write_read_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.bin");
        let path = path.to_str().unwrap();

        let mut f = PosixFile::new();
        f.open(path, false).unwrap();
        f.set_size(16).unwrap();
        f.write_at(b"abcdefgh", 4, "payload").unwrap();
        drop(f);

        let mut f = PosixFile::new();
        f.open(path, true).unwrap();
        let mut buf = [0u8; 8];
        f.read_at(&mut buf, 4, "payload").unwrap();
        assert_eq!(&buf, b"abcdefgh");
    }

    #[test]
    fn test_posix_set_size_extends() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sized.bin");
        let path = path.to_str().unwrap();

        let mut f = PosixFile::new();
        f.open(path, false).unwrap();
        f.set_size(1024).unwrap();
        drop(f);

        assert_eq!(std::fs::metadata(path).unwrap().len(), 1024);
    }

    #[test]
    fn test_posix_read_past_eof_is_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("short.bin");
        let path = path.to_str().unwrap();
        std::fs::write(path, b"xy").unwrap();

        let mut f = PosixFile::new();
        f.open(path, true).unwrap();
        let mut buf = [0u8; 8];
        assert!(f.read_at(&mut buf, 0, "payload").is_err());
    }

    #[test]
    fn test_open_missing_file_is_error() {
        let mut f = PosixFile::new();
        assert!(f.open("/nonexistent/dir/file.bin", true).is_err());
    }

    #[test]
    fn test_collective_singleton_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("coll.bin");
        let path = path.to_str().unwrap();

        let mut f = CollectiveFile::new(SelfComm::new());
        f.open(path, false).unwrap();
        f.set_size(8).unwrap();
        f.write_at(b"12345678", 0, "payload").unwrap();
        drop(f);

        let mut f = CollectiveFile::new(SelfComm::new());
        f.open(path, true).unwrap();
        let mut buf = [0u8; 8];
        f.read_at(&mut buf, 0, "payload").unwrap();
        assert_eq!(&buf, b"12345678");
    }
}
