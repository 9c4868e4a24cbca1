//! Variable Registry
//!
//! A session accumulates variable descriptors during a write or read
//! session. Registration borrows the caller's column buffer (no copy) and
//! records the element type alongside it; the buffer is only touched by
//! `write`, `read_data`, and the octree reorder.
//!
//! ## Extra Space
//!
//! A buffer registered with `extra_space` carries at least
//! [`requested_extra_space`](crate::GenericIo::requested_extra_space) bytes
//! past the last row. The write path uses them to stamp the CRC footer in
//! place and issue a single contiguous write; the read path uses them to
//! receive the on-disk footer. The bytes are restored afterwards.

use genericio_core::records::VariableHeader;
use genericio_core::types::{Element, VarFlags};
use genericio_core::{Error, Result};

/// A registered column, borrowed from the caller for the session's lifetime.
pub struct Variable<'a> {
    pub(crate) name: String,
    /// Record size in bytes (all components of one row).
    pub(crate) size: u64,
    /// Primitive element size in bytes; divides `size`.
    pub(crate) element_size: u64,
    pub(crate) is_float: bool,
    pub(crate) is_signed: bool,
    pub(crate) flags: VarFlags,
    pub(crate) data: &'a mut [u8],
}

impl<'a> Variable<'a> {
    pub fn new<T: Element>(name: &str, data: &'a mut [T], flags: VarFlags) -> Variable<'a> {
        let ty = T::TYPE;
        Variable {
            name: name.to_string(),
            size: ty.size() as u64,
            element_size: ty.size() as u64,
            is_float: ty.is_float(),
            is_signed: ty.is_signed(),
            flags,
            data: bytemuck::cast_slice_mut(data),
        }
    }

    /// Register a raw byte column, e.g. a multi-component record where
    /// `size` is a multiple of `element_size`.
    pub fn from_bytes(
        name: &str,
        size: u64,
        element_size: u64,
        is_float: bool,
        is_signed: bool,
        flags: VarFlags,
        data: &'a mut [u8],
    ) -> Variable<'a> {
        debug_assert!(element_size > 0 && size % element_size == 0);
        Variable {
            name: name.to_string(),
            size,
            element_size,
            is_float,
            is_signed,
            flags,
            data,
        }
    }

    pub(crate) fn header(&self) -> VariableHeader {
        VariableHeader {
            name: self.name.clone(),
            flags: self.flags.header_bits(self.is_float, self.is_signed),
            size: self.size,
            element_size: self.element_size,
        }
    }

    /// The payload slice for `nelems` rows starting at `row_offset`, with
    /// `extra` additional trailing bytes. Errors when the registered buffer
    /// is too small.
    pub(crate) fn payload_mut(
        &mut self,
        row_offset: u64,
        nelems: u64,
        extra: usize,
    ) -> Result<&mut [u8]> {
        let begin = (row_offset * self.size) as usize;
        let end = begin + (nelems * self.size) as usize + extra;
        if end > self.data.len() {
            return Err(Error::ExtraSpaceRequired {
                name: self.name.clone(),
            });
        }
        Ok(&mut self.data[begin..end])
    }

    pub(crate) fn payload(&self, nelems: u64) -> &[u8] {
        &self.data[..(nelems * self.size) as usize]
    }
}

/// Reader-facing description of a variable found in a file header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableInfo {
    pub name: String,
    pub size: u64,
    pub element_size: u64,
    pub is_float: bool,
    pub is_signed: bool,
    pub is_phys_coord_x: bool,
    pub is_phys_coord_y: bool,
    pub is_phys_coord_z: bool,
    pub maybe_phys_ghost: bool,
}

impl VariableInfo {
    pub(crate) fn from_header(vh: &VariableHeader) -> Self {
        use genericio_core::records::var_flag_bits as bits;
        VariableInfo {
            name: vh.name.clone(),
            size: vh.size,
            element_size: vh.element_size,
            is_float: vh.flags & bits::FLOAT != 0,
            is_signed: vh.flags & bits::SIGNED != 0,
            is_phys_coord_x: vh.flags & bits::PHYS_COORD_X != 0,
            is_phys_coord_y: vh.flags & bits::PHYS_COORD_Y != 0,
            is_phys_coord_z: vh.flags & bits::PHYS_COORD_Z != 0,
            maybe_phys_ghost: vh.flags & bits::MAYBE_PHYS_GHOST != 0,
        }
    }
}
