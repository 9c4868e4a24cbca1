//! Section reads: a row range of each variable, addressed without CRC
//! coverage, and refused outright on blocked artifacts.

use std::thread;

use genericio::{Config, GenericIo, LocalComm, MismatchBehavior, VarFlags};
use tempfile::TempDir;

const N: usize = 400;
const NRANKS: usize = 2;
const EXTRA_F32: usize = 2;

fn column(rank: usize) -> Vec<f32> {
    (0..N).map(|i| (rank * 10_000 + i) as f32).collect()
}

fn mass_column(rank: usize) -> Vec<u32> {
    (0..N).map(|i| (rank * N + i) as u32).collect()
}

fn write_artifact(path: &str, compress: bool) {
    let comms = LocalComm::group(NRANKS);
    let handles: Vec<_> = comms
        .into_iter()
        .map(|comm| {
            let path = path.to_string();
            thread::spawn(move || {
                let rank = comm.rank();
                let mut rho = column(rank);
                rho.extend([0.0; EXTRA_F32]);
                let mut mass = mass_column(rank);
                mass.extend([0; EXTRA_F32]);

                let mut gio = GenericIo::new(comm, path);
                *gio.config_mut() = Config::default();
                gio.config_mut().should_compress = compress;
                gio.set_partition(0);
                gio.set_num_elems(N as u64);
                gio.add_variable("rho", &mut rho[..], VarFlags::with_extra_space());
                gio.add_variable("mass", &mut mass[..], VarFlags::with_extra_space());
                gio.write().unwrap();
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }
}

#[test]
fn test_section_read_row_range() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("section.gio");
    let path = path.to_str().unwrap();
    write_artifact(path, false);

    let read_offset = 100u64;
    let read_rows = 50usize;

    let comms = LocalComm::group(NRANKS);
    let handles: Vec<_> = comms
        .into_iter()
        .map(|comm| {
            let path = path.to_string();
            thread::spawn(move || {
                let rank = comm.rank();
                let mut rho = vec![0.0f32; read_rows];
                let mut mass = vec![0u32; read_rows];

                let mut gio = GenericIo::new(comm, path);
                *gio.config_mut() = Config::default();
                gio.open_and_read_header(MismatchBehavior::Allowed).unwrap();
                gio.add_variable("rho", &mut rho[..], VarFlags::default());
                gio.add_variable("mass", &mut mass[..], VarFlags::default());
                gio.read_data_section(read_offset, read_rows as u64, None)
                    .unwrap();
                drop(gio);

                let lo = read_offset as usize;
                assert_eq!(&rho[..], &column(rank)[lo..lo + read_rows]);
                assert_eq!(&mass[..], &mass_column(rank)[lo..lo + read_rows]);
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }
}

#[test]
fn test_section_read_full_range_equals_bulk() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("fullsection.gio");
    let path = path.to_str().unwrap();
    write_artifact(path, false);

    let mut rho = vec![0.0f32; N];
    let mut gio = GenericIo::standalone(path);
    *gio.config_mut() = Config::default();
    gio.open_and_read_header(MismatchBehavior::Allowed).unwrap();
    gio.add_variable("rho", &mut rho[..], VarFlags::default());
    gio.read_data_section(0, N as u64, Some(1)).unwrap();
    drop(gio);

    assert_eq!(&rho[..], &column(1)[..]);
}

#[test]
fn test_section_read_rejects_blocked_artifacts() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("blockedsection.gio");
    let path = path.to_str().unwrap();
    write_artifact(path, true);

    let mut rho = vec![0.0f32; 10];
    let mut gio = GenericIo::standalone(path);
    *gio.config_mut() = Config::default();
    gio.open_and_read_header(MismatchBehavior::Allowed).unwrap();
    gio.add_variable("rho", &mut rho[..], VarFlags::default());
    assert!(matches!(
        gio.read_data_section(0, 10, Some(0)),
        Err(genericio::Error::SectionUnsupported { .. })
    ));
}
