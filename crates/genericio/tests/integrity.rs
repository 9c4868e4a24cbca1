//! Corruption handling: block-CRC failures are counted, dumped to the side
//! channel, and rolled up into one aggregate error; header corruption is
//! fatal on open.

use genericio::{Config, Endianness, GenericIo, MismatchBehavior, VarFlags};
use genericio_core::records::{GlobalHeader, RankHeader};
use tempfile::TempDir;

const N: usize = 500;
const EXTRA_F32: usize = 2;

fn column(v: f32) -> Vec<f32> {
    (0..N).map(|i| v + i as f32).collect()
}

fn write_single(path: &str) {
    let mut rho = column(3.0);
    rho.extend([0.0; EXTRA_F32]);
    let mut phi = column(7.0);
    phi.extend([0.0; EXTRA_F32]);

    let mut gio = GenericIo::standalone(path);
    *gio.config_mut() = Config::default();
    gio.set_partition(0);
    gio.set_num_elems(N as u64);
    gio.add_variable("rho", &mut rho[..], VarFlags::with_extra_space());
    gio.add_variable("phi", &mut phi[..], VarFlags::with_extra_space());
    gio.write().unwrap();
}

/// Byte offset of the first data payload.
fn first_block_offset(bytes: &[u8]) -> usize {
    let e = Endianness::from_magic(bytes).unwrap();
    let gh = GlobalHeader::decode(e, bytes).unwrap();
    let off = gh.ranks_start as usize;
    let rh = RankHeader::decode(e, &bytes[off..off + gh.ranks_size as usize], gh.ranks_size, 0);
    rh.start as usize
}

#[test]
fn test_corrupt_data_block_raises_aggregate_error() {
    let dir = TempDir::new().unwrap();
    // The CRC side channel lands in the working directory.
    std::env::set_current_dir(dir.path()).unwrap();

    let path = dir.path().join("corrupt.gio");
    let path = path.to_str().unwrap();
    write_single(path);

    // Flip one payload byte of the first variable.
    let mut bytes = std::fs::read(path).unwrap();
    let target = first_block_offset(&bytes) + 17;
    bytes[target] ^= 0x40;
    std::fs::write(path, &bytes).unwrap();

    let mut rho = vec![0.0f32; N + EXTRA_F32];
    let mut phi = vec![0.0f32; N + EXTRA_F32];
    let mut gio = GenericIo::standalone(path);
    *gio.config_mut() = Config::default();
    gio.config_mut().retry_count = 1;
    gio.config_mut().retry_sleep_ms = 1;
    gio.open_and_read_header(MismatchBehavior::Allowed).unwrap();
    gio.add_variable("rho", &mut rho[..], VarFlags::with_extra_space());
    gio.add_variable("phi", &mut phi[..], VarFlags::with_extra_space());

    match gio.read_data(None) {
        Err(genericio::Error::ReadErrors {
            io,
            crc,
            decompress,
            ..
        }) => {
            assert_eq!(io, 0);
            assert_eq!(crc, 1);
            assert_eq!(decompress, 0);
        }
        other => panic!("expected aggregate CRC error, got {:?}", other.err()),
    }
    drop(gio);

    // The side channel recorded a dump and a diagnostic log.
    let entries: Vec<String> = std::fs::read_dir(dir.path().join("gio_crc_errors"))
        .unwrap()
        .map(|d| d.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert!(entries
        .iter()
        .any(|n| n.starts_with("gio_crc_error_dump.0.") && n.ends_with(".bin")));
    assert!(entries.iter().any(|n| n == "gio_crc_error_log.0.txt"));

    let log = std::fs::read_to_string(dir.path().join("gio_crc_errors/gio_crc_error_log.0.txt"))
        .unwrap();
    assert!(log.contains("On-Disk CRC Error Report"));
    assert!(log.contains("Variable: rho"));
}

#[test]
fn test_corrupt_header_is_fatal_on_open() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("header.gio");
    let path = path.to_str().unwrap();
    write_single(path);

    // Flip a byte inside the header region, past the global header so the
    // magic still parses.
    let mut bytes = std::fs::read(path).unwrap();
    bytes[300] ^= 0x01;
    std::fs::write(path, &bytes).unwrap();

    let mut gio = GenericIo::standalone(path);
    *gio.config_mut() = Config::default();
    assert!(matches!(
        gio.open_and_read_header(MismatchBehavior::Allowed),
        Err(genericio::Error::HeaderCrc { .. })
    ));
}

#[test]
fn test_bad_magic_is_fatal_on_open() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("magic.gio");
    let path = path.to_str().unwrap();
    write_single(path);

    let mut bytes = std::fs::read(path).unwrap();
    bytes[0] = b'X';
    std::fs::write(path, &bytes).unwrap();

    let mut gio = GenericIo::standalone(path);
    *gio.config_mut() = Config::default();
    assert!(matches!(
        gio.open_and_read_header(MismatchBehavior::Allowed),
        Err(genericio::Error::InvalidMagic { .. })
    ));
}

#[test]
fn test_truncated_artifact_counts_io_errors() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("truncated.gio");
    let path = path.to_str().unwrap();
    write_single(path);

    // Drop the tail of the file: the header survives but the second
    // variable's block is gone.
    let bytes = std::fs::read(path).unwrap();
    let keep = bytes.len() - (N * 4 + 8) - 4;
    std::fs::write(path, &bytes[..keep]).unwrap();

    let mut rho = vec![0.0f32; N + EXTRA_F32];
    let mut phi = vec![0.0f32; N + EXTRA_F32];
    let mut gio = GenericIo::standalone(path);
    *gio.config_mut() = Config::default();
    gio.config_mut().retry_count = 2;
    gio.config_mut().retry_sleep_ms = 1;
    gio.open_and_read_header(MismatchBehavior::Allowed).unwrap();
    gio.add_variable("rho", &mut rho[..], VarFlags::with_extra_space());
    gio.add_variable("phi", &mut phi[..], VarFlags::with_extra_space());

    match gio.read_data(None) {
        Err(genericio::Error::ReadErrors { io, .. }) => assert_eq!(io, 1),
        other => panic!("expected aggregate I/O error, got {:?}", other.err()),
    }
    drop(gio);

    // The first variable still arrived intact.
    assert_eq!(&rho[..N], &column(3.0)[..]);
}
