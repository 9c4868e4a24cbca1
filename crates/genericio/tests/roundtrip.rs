//! End-to-end round-trip scenarios: eight writers on a 2x2x2 Cartesian
//! decomposition produce one artifact, which is then validated at the byte
//! level and read back by an equally-sized group.

use std::thread;

use genericio::{
    cart_coords, Config, Endianness, GenericIo, LocalComm, MismatchBehavior, VarFlags,
};
use genericio_core::crc;
use genericio_core::records::{GlobalHeader, RankHeader, VariableHeader};
use tempfile::TempDir;

const N: usize = 1000;
const NRANKS: usize = 8;
const EXTRA_F32: usize = 2;
const EXTRA_U16: usize = 4;

const FLOAT_VARS: [&str; 7] = ["x", "y", "z", "vx", "vy", "vz", "phi"];

fn float_column(rank: usize, tag: usize) -> Vec<f32> {
    (0..N)
        .map(|i| (tag * 100_000 + rank * 1000 + i) as f32 * 0.5)
        .collect()
}

fn mask_column(rank: usize) -> Vec<u16> {
    (0..N).map(|i| ((rank * 31 + i * 7) % 65536) as u16).collect()
}

fn flags_for(tag: usize) -> VarFlags {
    match tag {
        0 => VarFlags::coord_x(),
        1 => VarFlags::coord_y(),
        2 => VarFlags::coord_z(),
        _ => VarFlags::with_extra_space(),
    }
}

fn write_artifact(path: &str) {
    let comms = LocalComm::cart_group([2, 2, 2]);
    let handles: Vec<_> = comms
        .into_iter()
        .map(|comm| {
            let path = path.to_string();
            thread::spawn(move || {
                let rank = comm.rank();

                let mut columns: Vec<Vec<f32>> = (0..FLOAT_VARS.len())
                    .map(|tag| {
                        let mut c = float_column(rank, tag);
                        c.extend([0.0; EXTRA_F32]);
                        c
                    })
                    .collect();
                let mut mask = mask_column(rank);
                mask.extend([0; EXTRA_U16]);

                let mut gio = GenericIo::new(comm, path);
                *gio.config_mut() = Config::default();
                gio.set_partition(0);
                gio.set_num_elems(N as u64);
                gio.set_phys_origin([0.0; 3]);
                gio.set_phys_scale([256.0; 3]);

                for (tag, (name, column)) in
                    FLOAT_VARS.iter().zip(columns.iter_mut()).enumerate()
                {
                    gio.add_variable(name, &mut column[..], flags_for(tag));
                }
                gio.add_variable("mask", &mut mask, VarFlags::with_extra_space());

                gio.write().unwrap();
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }
}

#[test]
fn test_container_layout_and_crcs() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("layout.gio");
    let path = path.to_str().unwrap();
    write_artifact(path);

    let bytes = std::fs::read(path).unwrap();

    // 184 global + 8*280 variable + 8*48 rank + 8 footer, then per writer
    // 7 float columns and one u16 column, each with an 8-byte footer.
    let header_size = 184 + 8 * 280 + 8 * 48 + 8;
    let per_writer = 7 * (N * 4 + 8) + (N * 2 + 8);
    assert_eq!(bytes.len(), header_size + NRANKS * per_writer);

    let e = Endianness::from_magic(&bytes).unwrap();
    assert_eq!(e, Endianness::host());
    let gh = GlobalHeader::decode(e, &bytes).unwrap();
    assert_eq!(gh.header_size as usize, header_size - 8);
    assert_eq!(gh.nelems, (NRANKS * N) as u64);
    assert_eq!(gh.dims, [2, 2, 2]);
    assert_eq!(gh.nvars, 8);
    assert_eq!(gh.nranks, NRANKS as u64);
    assert_eq!(gh.phys_scale, [256.0; 3]);
    assert_eq!(gh.octree_size, 0);
    assert_eq!(gh.blocks_size, 0);

    // Whole-header CRC invariant.
    assert!(crc::verify(&bytes[..header_size]));

    // Offset monotonicity and per-block CRC invariant, in lexicographic
    // (writer, variable) order.
    let var_headers: Vec<VariableHeader> = (0..8)
        .map(|j| {
            let off = (gh.vars_start + j * gh.vars_size) as usize;
            VariableHeader::decode(e, &bytes[off..off + gh.vars_size as usize], gh.vars_size)
        })
        .collect();
    assert_eq!(var_headers[0].name, "x");
    assert_eq!(var_headers[7].name, "mask");

    let mut expected_start = header_size as u64;
    for i in 0..NRANKS as u64 {
        let off = (gh.ranks_start + i * gh.ranks_size) as usize;
        let rh = RankHeader::decode(e, &bytes[off..off + gh.ranks_size as usize], gh.ranks_size, i);
        assert_eq!(rh.start, expected_start);
        assert_eq!(rh.nelems, N as u64);
        assert_eq!(rh.global_rank, i);
        assert_eq!(rh.coords, cart_coords([2, 2, 2], i as usize));

        let mut block_start = rh.start;
        for vh in &var_headers {
            let block_len = (N as u64 * vh.size + 8) as usize;
            let block = &bytes[block_start as usize..block_start as usize + block_len];
            assert!(crc::verify(block), "block CRC failed for {}", vh.name);
            block_start += block_len as u64;
        }
        expected_start = block_start;
    }
    assert_eq!(expected_start as usize, bytes.len());
}

#[test]
fn test_eight_writer_roundtrip() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let dir = TempDir::new().unwrap();
    let path = dir.path().join("roundtrip.gio");
    let path = path.to_str().unwrap();
    write_artifact(path);

    let comms = LocalComm::cart_group([2, 2, 2]);
    let handles: Vec<_> = comms
        .into_iter()
        .map(|comm| {
            let path = path.to_string();
            thread::spawn(move || {
                let rank = comm.rank();

                let mut columns: Vec<Vec<f32>> =
                    vec![vec![0.0f32; N + EXTRA_F32]; FLOAT_VARS.len()];
                let mut mask = vec![0u16; N + EXTRA_U16];

                let mut gio = GenericIo::new(comm, path);
                *gio.config_mut() = Config::default();
                gio.open_and_read_header(MismatchBehavior::Disallowed).unwrap();

                assert_eq!(gio.read_nranks().unwrap(), NRANKS as u64);
                assert_eq!(gio.read_dims().unwrap(), [2, 2, 2]);
                assert_eq!(
                    gio.read_total_num_elems().unwrap(),
                    Some((NRANKS * N) as u64)
                );
                assert_eq!(gio.read_phys_scale().unwrap(), [256.0; 3]);
                assert_eq!(gio.read_num_elems(None).unwrap(), N as u64);
                assert_eq!(
                    gio.read_coords(None).unwrap(),
                    cart_coords([2, 2, 2], rank)
                );
                assert_eq!(gio.read_global_rank_number(None).unwrap(), rank as u64);
                assert_eq!(gio.get_source_ranks(), vec![rank]);

                let info = gio.get_variable_info().unwrap();
                assert_eq!(info.len(), 8);
                assert!(info[0].is_float && info[0].is_phys_coord_x);
                assert!(!info[7].is_float && !info[7].is_signed);

                for (name, column) in FLOAT_VARS.iter().zip(columns.iter_mut()) {
                    gio.add_variable(name, &mut column[..], VarFlags::with_extra_space());
                }
                gio.add_variable("mask", &mut mask, VarFlags::with_extra_space());
                gio.read_data(None).unwrap();
                drop(gio);

                for (tag, column) in columns.iter().enumerate() {
                    assert_eq!(&column[..N], &float_column(rank, tag)[..], "column {}", tag);
                }
                assert_eq!(&mask[..N], &mask_column(rank)[..]);
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }
}

#[test]
fn test_subset_read_by_standalone_reader() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("subset.gio");
    let path = path.to_str().unwrap();
    write_artifact(path);

    // A single reader picks one variable of one writer, out of order.
    let mut phi = vec![0.0f32; N + EXTRA_F32];
    let mut gio = GenericIo::standalone(path);
    *gio.config_mut() = Config::default();
    gio.open_and_read_header(MismatchBehavior::Allowed).unwrap();
    assert_eq!(gio.read_num_elems(Some(5)).unwrap(), N as u64);
    gio.add_variable("phi", &mut phi, VarFlags::with_extra_space());
    gio.read_data(Some(5)).unwrap();
    drop(gio);

    assert_eq!(&phi[..N], &float_column(5, 6)[..]);
}

#[test]
fn test_missing_variable_is_fatal() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("missing.gio");
    let path = path.to_str().unwrap();
    write_artifact(path);

    let mut ghost = vec![0.0f32; N + EXTRA_F32];
    let mut gio = GenericIo::standalone(path);
    *gio.config_mut() = Config::default();
    gio.open_and_read_header(MismatchBehavior::Allowed).unwrap();
    gio.add_variable("does-not-exist", &mut ghost, VarFlags::with_extra_space());
    assert!(matches!(
        gio.read_data(Some(0)),
        Err(genericio::Error::VariableNotFound { .. })
    ));
}

#[test]
fn test_type_mismatch_is_fatal() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("mismatch.gio");
    let path = path.to_str().unwrap();
    write_artifact(path);

    // "phi" is a float column; registering it as u32 must fail.
    let mut phi = vec![0u32; N + EXTRA_F32];
    let mut gio = GenericIo::standalone(path);
    *gio.config_mut() = Config::default();
    gio.open_and_read_header(MismatchBehavior::Allowed).unwrap();
    gio.add_variable("phi", &mut phi, VarFlags::with_extra_space());
    assert!(matches!(
        gio.read_data(Some(0)),
        Err(genericio::Error::TypeMismatch { .. })
    ));
}

#[test]
fn test_comm_size_mismatch_disallowed() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("disallow.gio");
    let path = path.to_str().unwrap();
    write_artifact(path);

    // A singleton reader under the disallowed policy must be refused.
    let mut gio = GenericIo::standalone(path);
    *gio.config_mut() = Config::default();
    assert!(matches!(
        gio.open_and_read_header(MismatchBehavior::Disallowed),
        Err(genericio::Error::CommSizeMismatch { .. })
    ));
}
