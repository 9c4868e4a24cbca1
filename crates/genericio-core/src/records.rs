//! On-Disk Header Records
//!
//! This module implements the binary layout of the GenericIO container
//! headers. The byte order of every integer and double in the file is chosen
//! at write time and advertised by the leading magic; readers decode through
//! an explicit [`Endianness`] value instead of assuming the host order.
//!
//! ## File Structure
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │ GlobalHeader (184 bytes)                                    │
//! │ - Magic: "HACC01L" / "HACC01B", NUL-padded to 8             │
//! │ - HeaderSize, NElems, Dims[3], NVars, VarsSize, VarsStart,  │
//! │   NRanks, RanksSize, RanksStart, GlobalHeaderSize (u64)     │
//! │ - PhysOrigin[3], PhysScale[3] (f64)                         │
//! │ - BlocksSize, BlocksStart, OctreeSize, OctreeStart (u64)    │
//! ├─────────────────────────────────────────────────────────────┤
//! │ Octree blob (OctreeSize bytes, optional)                    │
//! ├─────────────────────────────────────────────────────────────┤
//! │ VariableHeader[NVars] (280 bytes each)                      │
//! │ - Name (256 bytes, NUL-padded), Flags, Size, ElementSize    │
//! ├─────────────────────────────────────────────────────────────┤
//! │ RankHeader[NRanks] (48 bytes each)                          │
//! │ - Coords[3], NElems, Start, GlobalRank                      │
//! ├─────────────────────────────────────────────────────────────┤
//! │ BlockHeader[NRanks * NVars] (48 bytes each, optional)       │
//! │ - Filters[4][8], Start, Size                                │
//! ├─────────────────────────────────────────────────────────────┤
//! │ Header CRC footer (8 bytes)                                 │
//! ├─────────────────────────────────────────────────────────────┤
//! │ Data blocks, each followed by an 8-byte CRC footer          │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Forward Compatibility
//!
//! The advertised record sizes (`GlobalHeaderSize`, `VarsSize`, `RanksSize`)
//! may be smaller than the sizes this build knows about when reading files
//! produced by older writers. Decoding therefore guards every field by its
//! offset: a field that falls outside the advertised record takes a
//! documented default (`ElementSize` falls back to `Size`, `GlobalRank`
//! falls back to the rank index, everything else to zero).

use bytes::{BufMut, BytesMut};

use crate::error::{Error, Result};

pub const MAGIC_SIZE: usize = 8;
pub const MAGIC_BE: &[u8; MAGIC_SIZE] = b"HACC01B\0";
pub const MAGIC_LE: &[u8; MAGIC_SIZE] = b"HACC01L\0";

pub const NAME_SIZE: usize = 256;
pub const FILTER_NAME_SIZE: usize = 8;
pub const MAX_FILTERS: usize = 4;

pub const GLOBAL_HEADER_SIZE: usize = 184;
pub const VARIABLE_HEADER_SIZE: usize = 280;
pub const RANK_HEADER_SIZE: usize = 48;
pub const BLOCK_HEADER_SIZE: usize = 48;
pub const COMPRESS_HEADER_SIZE: usize = 8;

/// Global header size before the octree fields were appended. Files whose
/// `VarsStart` equals this value predate the octree index.
pub const PRE_OCTREE_GLOBAL_HEADER_SIZE: u64 = 168;

/// Variable header flag bits.
pub mod var_flag_bits {
    pub const FLOAT: u64 = 1 << 0;
    pub const SIGNED: u64 = 1 << 1;
    pub const PHYS_COORD_X: u64 = 1 << 2;
    pub const PHYS_COORD_Y: u64 = 1 << 3;
    pub const PHYS_COORD_Z: u64 = 1 << 4;
    pub const MAYBE_PHYS_GHOST: u64 = 1 << 5;
}

/// Byte order of an artifact, as advertised by its magic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endianness {
    Little,
    Big,
}

impl Endianness {
    /// The byte order of the machine we are running on.
    pub fn host() -> Self {
        if cfg!(target_endian = "big") {
            Endianness::Big
        } else {
            Endianness::Little
        }
    }

    /// The magic this byte order is advertised with.
    pub fn magic(&self) -> &'static [u8; MAGIC_SIZE] {
        match self {
            Endianness::Little => MAGIC_LE,
            Endianness::Big => MAGIC_BE,
        }
    }

    /// Recognize a magic prefix. Only the seven significant characters are
    /// compared; the eighth byte is reserved padding.
    pub fn from_magic(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < MAGIC_SIZE {
            return None;
        }
        if bytes[..MAGIC_SIZE - 1] == MAGIC_LE[..MAGIC_SIZE - 1] {
            Some(Endianness::Little)
        } else if bytes[..MAGIC_SIZE - 1] == MAGIC_BE[..MAGIC_SIZE - 1] {
            Some(Endianness::Big)
        } else {
            None
        }
    }

    pub fn put_u64(&self, buf: &mut BytesMut, v: u64) {
        match self {
            Endianness::Little => buf.put_u64_le(v),
            Endianness::Big => buf.put_u64(v),
        }
    }

    pub fn put_f64(&self, buf: &mut BytesMut, v: f64) {
        match self {
            Endianness::Little => buf.put_f64_le(v),
            Endianness::Big => buf.put_f64(v),
        }
    }

    pub fn read_u64(&self, bytes: &[u8]) -> u64 {
        let mut raw = [0u8; 8];
        let n = bytes.len().min(8);
        raw[..n].copy_from_slice(&bytes[..n]);
        match self {
            Endianness::Little => u64::from_le_bytes(raw),
            Endianness::Big => u64::from_be_bytes(raw),
        }
    }

    pub fn read_f64(&self, bytes: &[u8]) -> f64 {
        f64::from_bits(self.read_u64(bytes))
    }
}

/// Reverse each `element_size`-wide chunk of `data` in place. This is the
/// element-wise byte swap applied when the artifact's byte order differs
/// from the host's.
pub fn swap_elements_in_place(data: &mut [u8], element_size: usize) {
    if element_size <= 1 {
        return;
    }
    for chunk in data.chunks_exact_mut(element_size) {
        chunk.reverse();
    }
}

fn guarded_u64(e: Endianness, record: &[u8], offset: usize, limit: usize) -> Option<u64> {
    if offset + 8 <= limit && offset + 8 <= record.len() {
        Some(e.read_u64(&record[offset..offset + 8]))
    } else {
        None
    }
}

fn guarded_f64(e: Endianness, record: &[u8], offset: usize, limit: usize) -> Option<f64> {
    guarded_u64(e, record, offset, limit).map(f64::from_bits)
}

/// Fixed leading record of every artifact.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GlobalHeader {
    pub header_size: u64,
    pub nelems: u64,
    pub dims: [u64; 3],
    pub nvars: u64,
    pub vars_size: u64,
    pub vars_start: u64,
    pub nranks: u64,
    pub ranks_size: u64,
    pub ranks_start: u64,
    pub global_header_size: u64,
    pub phys_origin: [f64; 3],
    pub phys_scale: [f64; 3],
    pub blocks_size: u64,
    pub blocks_start: u64,
    pub octree_size: u64,
    pub octree_start: u64,
}

impl GlobalHeader {
    pub fn encode(&self, e: Endianness, buf: &mut BytesMut) {
        buf.put_slice(e.magic());
        e.put_u64(buf, self.header_size);
        e.put_u64(buf, self.nelems);
        for d in self.dims {
            e.put_u64(buf, d);
        }
        e.put_u64(buf, self.nvars);
        e.put_u64(buf, self.vars_size);
        e.put_u64(buf, self.vars_start);
        e.put_u64(buf, self.nranks);
        e.put_u64(buf, self.ranks_size);
        e.put_u64(buf, self.ranks_start);
        e.put_u64(buf, self.global_header_size);
        for v in self.phys_origin {
            e.put_f64(buf, v);
        }
        for v in self.phys_scale {
            e.put_f64(buf, v);
        }
        e.put_u64(buf, self.blocks_size);
        e.put_u64(buf, self.blocks_start);
        e.put_u64(buf, self.octree_size);
        e.put_u64(buf, self.octree_start);
    }

    /// Decode from the start of a header byte vector. The magic must have
    /// been recognized by the caller. Fields beyond the advertised
    /// `GlobalHeaderSize` default to zero.
    pub fn decode(e: Endianness, bytes: &[u8]) -> Result<Self> {
        // Everything up to and including GlobalHeaderSize must be present.
        if bytes.len() < 104 {
            return Err(Error::TruncatedHeader {
                path: String::new(),
            });
        }

        let at = |off: usize| e.read_u64(&bytes[off..off + 8]);
        let global_header_size = at(96);
        let limit = global_header_size as usize;

        Ok(GlobalHeader {
            header_size: at(8),
            nelems: at(16),
            dims: [at(24), at(32), at(40)],
            nvars: at(48),
            vars_size: at(56),
            vars_start: at(64),
            nranks: at(72),
            ranks_size: at(80),
            ranks_start: at(88),
            global_header_size,
            phys_origin: [
                guarded_f64(e, bytes, 104, limit).unwrap_or(0.0),
                guarded_f64(e, bytes, 112, limit).unwrap_or(0.0),
                guarded_f64(e, bytes, 120, limit).unwrap_or(0.0),
            ],
            phys_scale: [
                guarded_f64(e, bytes, 128, limit).unwrap_or(0.0),
                guarded_f64(e, bytes, 136, limit).unwrap_or(0.0),
                guarded_f64(e, bytes, 144, limit).unwrap_or(0.0),
            ],
            blocks_size: guarded_u64(e, bytes, 152, limit).unwrap_or(0),
            blocks_start: guarded_u64(e, bytes, 160, limit).unwrap_or(0),
            octree_size: guarded_u64(e, bytes, 168, limit).unwrap_or(0),
            octree_start: guarded_u64(e, bytes, 176, limit).unwrap_or(0),
        })
    }

    /// Whether the file carries block headers.
    pub fn has_blocks(&self) -> bool {
        self.blocks_size > 0 && (160 + 8) <= self.global_header_size as usize
    }
}

/// One per named column.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VariableHeader {
    pub name: String,
    pub flags: u64,
    pub size: u64,
    pub element_size: u64,
}

impl VariableHeader {
    pub fn encode(&self, e: Endianness, buf: &mut BytesMut) -> Result<()> {
        if self.name.len() >= NAME_SIZE {
            return Err(Error::NameTooLong {
                name: self.name.clone(),
            });
        }
        buf.put_slice(self.name.as_bytes());
        buf.put_bytes(0, NAME_SIZE - self.name.len());
        e.put_u64(buf, self.flags);
        e.put_u64(buf, self.size);
        e.put_u64(buf, self.element_size);
        Ok(())
    }

    /// Decode one variable record of the advertised `record_size`.
    pub fn decode(e: Endianness, record: &[u8], record_size: u64) -> Self {
        let limit = record_size as usize;
        let name_len = record[..NAME_SIZE.min(record.len())]
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(NAME_SIZE.min(record.len()));
        let name = String::from_utf8_lossy(&record[..name_len]).into_owned();
        let size = guarded_u64(e, record, NAME_SIZE + 8, limit).unwrap_or(0);
        VariableHeader {
            name,
            flags: guarded_u64(e, record, NAME_SIZE, limit).unwrap_or(0),
            size,
            // Older writers did not record the element size.
            element_size: guarded_u64(e, record, NAME_SIZE + 16, limit).unwrap_or(size),
        }
    }

    pub fn is_float(&self) -> bool {
        self.flags & var_flag_bits::FLOAT != 0
    }

    pub fn is_signed(&self) -> bool {
        self.flags & var_flag_bits::SIGNED != 0
    }
}

/// One per writer.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RankHeader {
    pub coords: [u64; 3],
    pub nelems: u64,
    pub start: u64,
    pub global_rank: u64,
}

impl RankHeader {
    pub fn encode(&self, e: Endianness, buf: &mut BytesMut) {
        for c in self.coords {
            e.put_u64(buf, c);
        }
        e.put_u64(buf, self.nelems);
        e.put_u64(buf, self.start);
        e.put_u64(buf, self.global_rank);
    }

    /// Decode one rank record. `default_global_rank` stands in when the
    /// record predates the `GlobalRank` field.
    pub fn decode(e: Endianness, record: &[u8], record_size: u64, default_global_rank: u64) -> Self {
        let limit = record_size as usize;
        RankHeader {
            coords: [
                guarded_u64(e, record, 0, limit).unwrap_or(0),
                guarded_u64(e, record, 8, limit).unwrap_or(0),
                guarded_u64(e, record, 16, limit).unwrap_or(0),
            ],
            nelems: guarded_u64(e, record, 24, limit).unwrap_or(0),
            start: guarded_u64(e, record, 32, limit).unwrap_or(0),
            global_rank: guarded_u64(e, record, 40, limit).unwrap_or(default_global_rank),
        }
    }

    /// Whether the record actually carries a `GlobalRank` field.
    pub fn carries_global_rank(record_size: u64) -> bool {
        48 <= record_size
    }
}

/// One per (writer, variable) pair when block headers are in effect.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlockHeader {
    pub filters: [[u8; FILTER_NAME_SIZE]; MAX_FILTERS],
    pub start: u64,
    pub size: u64,
}

impl Default for BlockHeader {
    fn default() -> Self {
        BlockHeader {
            filters: [[0; FILTER_NAME_SIZE]; MAX_FILTERS],
            start: 0,
            size: 0,
        }
    }
}

impl BlockHeader {
    pub fn encode(&self, e: Endianness, buf: &mut BytesMut) {
        for f in &self.filters {
            buf.put_slice(f);
        }
        e.put_u64(buf, self.start);
        e.put_u64(buf, self.size);
    }

    pub fn decode(e: Endianness, record: &[u8], record_size: u64) -> Self {
        let limit = record_size as usize;
        let mut filters = [[0u8; FILTER_NAME_SIZE]; MAX_FILTERS];
        for (i, f) in filters.iter_mut().enumerate() {
            let off = i * FILTER_NAME_SIZE;
            if off + FILTER_NAME_SIZE <= limit.min(record.len()) {
                f.copy_from_slice(&record[off..off + FILTER_NAME_SIZE]);
            }
        }
        BlockHeader {
            filters,
            start: guarded_u64(e, record, 32, limit).unwrap_or(0),
            size: guarded_u64(e, record, 40, limit).unwrap_or(0),
        }
    }

    /// Install a filter name into slot `idx`, NUL-padded.
    pub fn set_filter(&mut self, idx: usize, name: &str) {
        let slot = &mut self.filters[idx];
        *slot = [0; FILTER_NAME_SIZE];
        let n = name.len().min(FILTER_NAME_SIZE);
        slot[..n].copy_from_slice(&name.as_bytes()[..n]);
    }

    /// The first filter slot, `None` when empty.
    pub fn first_filter(&self) -> Option<String> {
        if self.filters[0][0] == 0 {
            return None;
        }
        let len = self.filters[0]
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(FILTER_NAME_SIZE);
        Some(String::from_utf8_lossy(&self.filters[0][..len]).into_owned())
    }
}

/// Prefix of every compressed data block: the CRC64 of the *uncompressed*
/// payload.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CompressHeader {
    pub orig_crc: u64,
}

impl CompressHeader {
    pub fn encode(&self, e: Endianness, buf: &mut BytesMut) {
        e.put_u64(buf, self.orig_crc);
    }

    pub fn decode(e: Endianness, record: &[u8]) -> Self {
        CompressHeader {
            orig_crc: e.read_u64(record),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_global() -> GlobalHeader {
        GlobalHeader {
            header_size: 2808,
            nelems: 8000,
            dims: [2, 2, 2],
            nvars: 8,
            vars_size: VARIABLE_HEADER_SIZE as u64,
            vars_start: GLOBAL_HEADER_SIZE as u64,
            nranks: 8,
            ranks_size: RANK_HEADER_SIZE as u64,
            ranks_start: GLOBAL_HEADER_SIZE as u64 + 8 * VARIABLE_HEADER_SIZE as u64,
            global_header_size: GLOBAL_HEADER_SIZE as u64,
            phys_origin: [0.0, 0.0, 0.0],
            phys_scale: [256.0, 256.0, 256.0],
            blocks_size: 0,
            blocks_start: 0,
            octree_size: 0,
            octree_start: 0,
        }
    }

    // ---------------------------------------------------------------
    // Magic recognition
    // ---------------------------------------------------------------

    #[test]
    fn test_magic_roundtrip_little() {
        assert_eq!(
            Endianness::from_magic(MAGIC_LE),
            Some(Endianness::Little)
        );
    }

    #[test]
    fn test_magic_roundtrip_big() {
        assert_eq!(Endianness::from_magic(MAGIC_BE), Some(Endianness::Big));
    }

    #[test]
    fn test_magic_ignores_reserved_byte() {
        let mut m = *MAGIC_LE;
        m[7] = 0xFF;
        assert_eq!(Endianness::from_magic(&m), Some(Endianness::Little));
    }

    #[test]
    fn test_magic_rejects_garbage() {
        assert_eq!(Endianness::from_magic(b"NOTHACC\0"), None);
        assert_eq!(Endianness::from_magic(b"HA"), None);
    }

    // ---------------------------------------------------------------
    // GlobalHeader
    // ---------------------------------------------------------------

    #[test]
    fn test_global_header_encoded_size() {
        let mut buf = BytesMut::new();
        sample_global().encode(Endianness::Little, &mut buf);
        assert_eq!(buf.len(), GLOBAL_HEADER_SIZE);
    }

    #[test]
    fn test_global_header_roundtrip_little() {
        let gh = sample_global();
        let mut buf = BytesMut::new();
        gh.encode(Endianness::Little, &mut buf);
        let decoded = GlobalHeader::decode(Endianness::Little, &buf).unwrap();
        assert_eq!(gh, decoded);
    }

    #[test]
    fn test_global_header_roundtrip_big() {
        let gh = sample_global();
        let mut buf = BytesMut::new();
        gh.encode(Endianness::Big, &mut buf);
        assert_eq!(&buf[..MAGIC_SIZE], MAGIC_BE);
        let decoded = GlobalHeader::decode(Endianness::Big, &buf).unwrap();
        assert_eq!(gh, decoded);
    }

    #[test]
    fn test_global_header_big_differs_from_little_bytes() {
        let gh = sample_global();
        let mut le = BytesMut::new();
        let mut be = BytesMut::new();
        gh.encode(Endianness::Little, &mut le);
        gh.encode(Endianness::Big, &mut be);
        assert_ne!(&le[8..], &be[8..]);
    }

    #[test]
    fn test_global_header_pre_octree_defaults() {
        // A 168-byte global header: the octree fields fall outside the
        // advertised size and must decode to zero.
        let mut gh = sample_global();
        gh.global_header_size = PRE_OCTREE_GLOBAL_HEADER_SIZE;
        gh.octree_size = 12345;
        gh.octree_start = 184;
        let mut buf = BytesMut::new();
        gh.encode(Endianness::Little, &mut buf);
        let decoded = GlobalHeader::decode(Endianness::Little, &buf).unwrap();
        assert_eq!(decoded.octree_size, 0);
        assert_eq!(decoded.octree_start, 0);
        assert_eq!(decoded.phys_scale, gh.phys_scale);
    }

    #[test]
    fn test_global_header_truncated_is_error() {
        assert!(GlobalHeader::decode(Endianness::Little, &[0u8; 32]).is_err());
    }

    // ---------------------------------------------------------------
    // VariableHeader
    // ---------------------------------------------------------------

    #[test]
    fn test_variable_header_roundtrip() {
        let vh = VariableHeader {
            name: "phi".to_string(),
            flags: var_flag_bits::FLOAT,
            size: 4,
            element_size: 4,
        };
        let mut buf = BytesMut::new();
        vh.encode(Endianness::Little, &mut buf).unwrap();
        assert_eq!(buf.len(), VARIABLE_HEADER_SIZE);
        let decoded =
            VariableHeader::decode(Endianness::Little, &buf, VARIABLE_HEADER_SIZE as u64);
        assert_eq!(vh, decoded);
        assert!(decoded.is_float());
        assert!(!decoded.is_signed());
    }

    #[test]
    fn test_variable_header_name_nul_padded() {
        let vh = VariableHeader {
            name: "x".to_string(),
            flags: 0,
            size: 4,
            element_size: 4,
        };
        let mut buf = BytesMut::new();
        vh.encode(Endianness::Little, &mut buf).unwrap();
        assert_eq!(buf[1], 0);
        assert_eq!(buf[NAME_SIZE - 1], 0);
    }

    #[test]
    fn test_variable_header_name_too_long() {
        let vh = VariableHeader {
            name: "a".repeat(NAME_SIZE),
            flags: 0,
            size: 4,
            element_size: 4,
        };
        let mut buf = BytesMut::new();
        assert!(vh.encode(Endianness::Little, &mut buf).is_err());
    }

    #[test]
    fn test_variable_header_element_size_default() {
        // A record whose advertised size stops before ElementSize: the
        // element size must fall back to the record size.
        let vh = VariableHeader {
            name: "mask".to_string(),
            flags: 0,
            size: 2,
            element_size: 2,
        };
        let mut buf = BytesMut::new();
        vh.encode(Endianness::Little, &mut buf).unwrap();
        let decoded = VariableHeader::decode(Endianness::Little, &buf, (NAME_SIZE + 16) as u64);
        assert_eq!(decoded.element_size, decoded.size);
    }

    // ---------------------------------------------------------------
    // RankHeader
    // ---------------------------------------------------------------

    #[test]
    fn test_rank_header_roundtrip_both_endians() {
        let rh = RankHeader {
            coords: [1, 0, 1],
            nelems: 1000,
            start: 2816,
            global_rank: 5,
        };
        for e in [Endianness::Little, Endianness::Big] {
            let mut buf = BytesMut::new();
            rh.encode(e, &mut buf);
            assert_eq!(buf.len(), RANK_HEADER_SIZE);
            assert_eq!(RankHeader::decode(e, &buf, RANK_HEADER_SIZE as u64, 0), rh);
        }
    }

    #[test]
    fn test_rank_header_global_rank_default() {
        let rh = RankHeader {
            coords: [0, 0, 0],
            nelems: 10,
            start: 100,
            global_rank: 3,
        };
        let mut buf = BytesMut::new();
        rh.encode(Endianness::Little, &mut buf);
        // Advertised size without the GlobalRank field.
        let decoded = RankHeader::decode(Endianness::Little, &buf, 40, 7);
        assert_eq!(decoded.global_rank, 7);
    }

    // ---------------------------------------------------------------
    // BlockHeader
    // ---------------------------------------------------------------

    #[test]
    fn test_block_header_roundtrip() {
        let mut bh = BlockHeader {
            start: 4096,
            size: 512,
            ..Default::default()
        };
        bh.set_filter(0, "BLOSC");
        let mut buf = BytesMut::new();
        bh.encode(Endianness::Little, &mut buf);
        assert_eq!(buf.len(), BLOCK_HEADER_SIZE);
        let decoded = BlockHeader::decode(Endianness::Little, &buf, BLOCK_HEADER_SIZE as u64);
        assert_eq!(decoded, bh);
        assert_eq!(decoded.first_filter().as_deref(), Some("BLOSC"));
    }

    #[test]
    fn test_block_header_empty_filter() {
        let bh = BlockHeader::default();
        assert_eq!(bh.first_filter(), None);
    }

    // ---------------------------------------------------------------
    // Element swap
    // ---------------------------------------------------------------

    #[test]
    fn test_swap_elements_u32() {
        let mut data = vec![1u8, 2, 3, 4, 5, 6, 7, 8];
        swap_elements_in_place(&mut data, 4);
        assert_eq!(data, vec![4, 3, 2, 1, 8, 7, 6, 5]);
    }

    #[test]
    fn test_swap_elements_single_byte_is_noop() {
        let mut data = vec![1u8, 2, 3];
        swap_elements_in_place(&mut data, 1);
        assert_eq!(data, vec![1, 2, 3]);
    }

    #[test]
    fn test_swap_roundtrip_f32() {
        let vals = [1.5f32, -2.25, 1.0e-6];
        let mut bytes: Vec<u8> = vals.iter().flat_map(|v| v.to_le_bytes()).collect();
        swap_elements_in_place(&mut bytes, 4);
        let swapped: Vec<f32> = bytes
            .chunks_exact(4)
            .map(|c| f32::from_be_bytes(c.try_into().unwrap()))
            .collect();
        assert_eq!(&vals[..], &swapped[..]);
    }
}
