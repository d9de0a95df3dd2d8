// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! The blob walker: header decoding, the bounds-checked tag stream, the
//! strings block and the memory reservation block.
//!
//! This module provides the [`Fdt`] handle. All traversal and lookup
//! operations live in `impl` blocks here and in the [`node`] and
//! [`property`] submodules; every one of them identifies nodes and
//! properties by the offset of their tag relative to the start of the
//! structure block. Offsets are always multiples of 4.

use core::ffi::CStr;
use core::{fmt, ptr};

use zerocopy::byteorder::big_endian;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::Result;
use crate::error::Error;
use crate::memreserve::MemoryReservation;

mod node;
mod property;

pub use node::FdtNode;
pub use property::{FdtProperty, PropertyEntry, stringlist_contains};

/// First header version this library accepts.
const FDT_FIRST_SUPPORTED_VERSION: u32 = 0x10;
/// Largest `last_comp_version` this library accepts.
const FDT_LAST_SUPPORTED_VERSION: u32 = 0x11;

pub(crate) const FDT_TAGSIZE: usize = size_of::<u32>();
pub(crate) const FDT_MAGIC: u32 = 0xd00d_feed;
pub(crate) const FDT_BEGIN_NODE: u32 = 0x1;
pub(crate) const FDT_END_NODE: u32 = 0x2;
pub(crate) const FDT_PROP: u32 = 0x3;
pub(crate) const FDT_NOP: u32 = 0x4;
pub(crate) const FDT_END: u32 = 0x9;

/// Maximum value for `#address-cells`, `#size-cells` and similar
/// properties. IEEE 1275 requires implementations to handle values up to
/// 4; larger values do not occur in practice.
pub const FDT_MAX_NCELLS: u32 = 4;

#[repr(C, packed)]
#[derive(Debug, Copy, Clone, FromBytes, IntoBytes, Unaligned, Immutable, KnownLayout)]
pub(crate) struct FdtHeader {
    /// Magic number of the device tree.
    pub(crate) magic: big_endian::U32,
    /// Total size of the device tree blob.
    pub(crate) totalsize: big_endian::U32,
    /// Offset of the structure block.
    pub(crate) off_dt_struct: big_endian::U32,
    /// Offset of the strings block.
    pub(crate) off_dt_strings: big_endian::U32,
    /// Offset of the memory reservation block.
    pub(crate) off_mem_rsvmap: big_endian::U32,
    /// Format version of the blob.
    pub(crate) version: big_endian::U32,
    /// Oldest version this blob is backwards compatible with.
    pub(crate) last_comp_version: big_endian::U32,
    /// Physical ID of the boot CPU.
    pub(crate) boot_cpuid_phys: big_endian::U32,
    /// Size of the strings block.
    pub(crate) size_dt_strings: big_endian::U32,
    /// Size of the structure block.
    pub(crate) size_dt_struct: big_endian::U32,
}

impl FdtHeader {
    pub(crate) fn magic(&self) -> u32 {
        self.magic.get()
    }

    pub(crate) fn totalsize(&self) -> u32 {
        self.totalsize.get()
    }

    pub(crate) fn off_dt_struct(&self) -> u32 {
        self.off_dt_struct.get()
    }

    pub(crate) fn off_dt_strings(&self) -> u32 {
        self.off_dt_strings.get()
    }

    pub(crate) fn off_mem_rsvmap(&self) -> u32 {
        self.off_mem_rsvmap.get()
    }

    pub(crate) fn version(&self) -> u32 {
        self.version.get()
    }

    pub(crate) fn last_comp_version(&self) -> u32 {
        self.last_comp_version.get()
    }

    pub(crate) fn boot_cpuid_phys(&self) -> u32 {
        self.boot_cpuid_phys.get()
    }

    pub(crate) fn size_dt_strings(&self) -> u32 {
        self.size_dt_strings.get()
    }
}

/// One property record in the structure block: the PROP tag word, the
/// value length, and the strings block offset of the property name. The
/// value bytes follow the record.
#[repr(C, packed)]
#[derive(Debug, Copy, Clone, FromBytes, IntoBytes, Unaligned, Immutable, KnownLayout)]
pub(crate) struct PropHeader {
    pub(crate) tag: big_endian::U32,
    pub(crate) len: big_endian::U32,
    pub(crate) nameoff: big_endian::U32,
}

/// One entry of the memory reservation block, as stored in the blob.
#[repr(C, packed)]
#[derive(Debug, Copy, Clone, FromBytes, IntoBytes, Unaligned, Immutable, KnownLayout)]
pub(crate) struct ReserveEntry {
    pub(crate) address: big_endian::U64,
    pub(crate) size: big_endian::U64,
}

/// A flattened device tree, borrowed from an externally owned byte buffer.
///
/// The handle is `Copy` and holds no state besides the borrowed bytes;
/// all queries decode the blob in place. A handle can only be obtained
/// through [`Fdt::new`] (or [`Fdt::from_raw`]), which validates the
/// header, so every method runs against a blob whose magic and version
/// have already been accepted.
#[derive(Debug, Clone, Copy)]
pub struct Fdt<'a> {
    data: &'a [u8],
}

/// A token in the device tree structure block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FdtToken {
    /// Start of a node. Followed by the NUL-terminated node name.
    BeginNode,
    /// End of a node.
    EndNode,
    /// A property record.
    Prop,
    /// Padding; skipped by all traversals.
    Nop,
    /// End of the structure block.
    End,
}

impl TryFrom<u32> for FdtToken {
    type Error = u32;

    fn try_from(value: u32) -> core::result::Result<Self, Self::Error> {
        match value {
            FDT_BEGIN_NODE => Ok(FdtToken::BeginNode),
            FDT_END_NODE => Ok(FdtToken::EndNode),
            FDT_PROP => Ok(FdtToken::Prop),
            FDT_NOP => Ok(FdtToken::Nop),
            FDT_END => Ok(FdtToken::End),
            _ => Err(value),
        }
    }
}

impl<'a> Fdt<'a> {
    /// Creates a new `Fdt` from the given byte slice.
    ///
    /// This is the `check_header` validation: the magic number must be
    /// present, the version range must be supported, and the slice must
    /// cover the `totalsize` the header declares.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Truncated`] if `data` is too short to contain a
    /// header or the declared `totalsize`, [`Error::BadMagic`] if the
    /// magic number is wrong, and [`Error::BadVersion`] if the version
    /// range is unsupported.
    pub fn new(data: &'a [u8]) -> Result<Self> {
        let Ok((header, _)) = FdtHeader::ref_from_prefix(data) else {
            return Err(Error::Truncated);
        };

        if header.magic() != FDT_MAGIC {
            return Err(Error::BadMagic);
        }
        if header.version() < FDT_FIRST_SUPPORTED_VERSION
            || header.last_comp_version() > FDT_LAST_SUPPORTED_VERSION
        {
            return Err(Error::BadVersion);
        }
        if data.len() < header.totalsize() as usize {
            return Err(Error::Truncated);
        }

        Ok(Self { data })
    }

    /// Checks that `data` carries a supported device tree header, without
    /// keeping a handle.
    ///
    /// # Errors
    ///
    /// The same errors as [`Fdt::new`].
    pub fn check(data: &'a [u8]) -> Result<()> {
        Self::new(data).map(|_| ())
    }

    /// Creates a new `Fdt` from a raw pointer to a blob.
    ///
    /// # Safety
    ///
    /// `data` must point to readable memory holding a complete FDT blob:
    /// at least the fixed-size header, and at least as many bytes as the
    /// header's `totalsize` field declares. The region must not be
    /// mutated for the lifetime `'a`.
    ///
    /// # Errors
    ///
    /// The same errors as [`Fdt::new`].
    pub unsafe fn from_raw(data: *const u8) -> Result<Self> {
        // SAFETY: The caller guarantees that at least a full header is
        // readable at `data`.
        let header = unsafe { ptr::read_unaligned(data.cast::<FdtHeader>()) };
        let size = header.totalsize() as usize;
        // SAFETY: The caller guarantees `totalsize` readable bytes at
        // `data`, immutable for 'a.
        let slice = unsafe { core::slice::from_raw_parts(data, size) };
        Self::new(slice)
    }

    pub(crate) fn header(&self) -> &FdtHeader {
        let (header, _) = FdtHeader::ref_from_prefix(self.data)
            .expect("new() checks that the slice is at least as big as the header");
        header
    }

    /// Returns the underlying bytes of the blob.
    #[must_use]
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// Returns the total size of the blob in bytes.
    #[must_use]
    pub fn totalsize(&self) -> u32 {
        self.header().totalsize()
    }

    /// Returns the format version of the blob.
    #[must_use]
    pub fn version(&self) -> u32 {
        self.header().version()
    }

    /// Returns the oldest version this blob is backwards compatible with.
    #[must_use]
    pub fn last_comp_version(&self) -> u32 {
        self.header().last_comp_version()
    }

    /// Returns the physical ID of the boot CPU.
    #[must_use]
    pub fn boot_cpuid_phys(&self) -> u32 {
        self.header().boot_cpuid_phys()
    }

    /// Copies the blob into `buf`.
    ///
    /// This is the only sanctioned way to relocate a blob; the copy
    /// carries `totalsize` bytes and leaves any tail of `buf` untouched.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoSpace`] if `buf` is smaller than the blob.
    pub fn move_to(&self, buf: &mut [u8]) -> Result<()> {
        let size = self.totalsize() as usize;
        if buf.len() < size {
            return Err(Error::NoSpace);
        }
        buf[..size].copy_from_slice(&self.data[..size]);
        Ok(())
    }

    /// Projects `len` bytes at structure block offset `offset`.
    ///
    /// Returns `None` if the requested range is not wholly inside the
    /// blob's declared `totalsize`, including when the offset arithmetic
    /// would overflow.
    #[must_use]
    pub fn offset_to_slice(&self, offset: usize, len: usize) -> Option<&'a [u8]> {
        let totalsize = self.totalsize() as usize;
        let end = offset.checked_add(len)?;
        if end > totalsize {
            return None;
        }
        let abs = offset.checked_add(self.header().off_dt_struct() as usize)?;
        let abs_end = abs.checked_add(len)?;
        if abs_end > totalsize {
            return None;
        }
        self.data.get(abs..abs_end)
    }

    fn read_u32(&self, offset: usize) -> Option<u32> {
        let bytes = self.offset_to_slice(offset, FDT_TAGSIZE)?;
        big_endian::U32::read_from_bytes(bytes)
            .ok()
            .map(|word| word.get())
    }

    /// Decodes the token at `offset` and computes the 4-byte-aligned
    /// offset of the token after it.
    ///
    /// The second element of the pair is the successor offset. A read
    /// past the end of the blob while decoding yields
    /// `(FdtToken::End, Err(Error::Truncated))`; an unrecognized token
    /// word yields `(FdtToken::End, Err(Error::BadStructure))`.
    pub fn next_tag(&self, offset: usize) -> (FdtToken, Result<usize>) {
        let Some(word) = self.read_u32(offset) else {
            return (FdtToken::End, Err(Error::Truncated));
        };
        let Ok(token) = FdtToken::try_from(word) else {
            return (FdtToken::End, Err(Error::BadStructure));
        };

        let mut next = offset + FDT_TAGSIZE;
        match token {
            FdtToken::BeginNode => {
                // Consume the NUL-terminated node name, one bounds-checked
                // byte at a time.
                loop {
                    let Some(bytes) = self.offset_to_slice(next, 1) else {
                        return (FdtToken::End, Err(Error::Truncated));
                    };
                    next += 1;
                    if bytes[0] == 0 {
                        break;
                    }
                }
            }
            FdtToken::Prop => {
                let Some(len) = self.read_u32(next) else {
                    return (FdtToken::End, Err(Error::Truncated));
                };
                // Length word, name offset word, then the value itself.
                let skip = (len as usize).checked_add(2 * FDT_TAGSIZE);
                match skip.and_then(|skip| next.checked_add(skip)) {
                    Some(n) => next = n,
                    None => return (FdtToken::End, Err(Error::Truncated)),
                }
            }
            FdtToken::EndNode | FdtToken::Nop | FdtToken::End => {}
        }

        match next.checked_next_multiple_of(FDT_TAGSIZE) {
            Some(aligned) => (token, Ok(aligned)),
            None => (token, Err(Error::Truncated)),
        }
    }

    /// Asserts that `offset` points at a BEGIN_NODE tag and returns the
    /// offset of the first tag of the node's body.
    pub(crate) fn node_body_offset(&self, offset: usize) -> Result<usize> {
        if !offset.is_multiple_of(FDT_TAGSIZE) {
            return Err(Error::BadOffset);
        }
        match self.next_tag(offset) {
            (FdtToken::BeginNode, Ok(next)) => Ok(next),
            _ => Err(Error::BadOffset),
        }
    }

    /// Asserts that `offset` points at a PROP tag and returns the offset
    /// just past the whole property record.
    pub(crate) fn skip_property(&self, offset: usize) -> Result<usize> {
        if !offset.is_multiple_of(FDT_TAGSIZE) {
            return Err(Error::BadOffset);
        }
        match self.next_tag(offset) {
            (FdtToken::Prop, Ok(next)) => Ok(next),
            _ => Err(Error::BadOffset),
        }
    }

    /// Returns the NUL-terminated string at `offset` into the strings
    /// block.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BadOffset`] if `offset` lies outside the strings
    /// block and [`Error::BadStructure`] if no terminator is found or the
    /// string is not valid UTF-8.
    pub fn string_at(&self, offset: usize) -> Result<&'a str> {
        let header = self.header();
        let block_start = header.off_dt_strings() as usize;
        let block_end = block_start
            .checked_add(header.size_dt_strings() as usize)
            .ok_or(Error::BadOffset)?
            .min(self.totalsize() as usize);
        let start = block_start.checked_add(offset).ok_or(Error::BadOffset)?;
        if start >= block_end {
            return Err(Error::BadOffset);
        }
        let bytes = self.data.get(start..block_end).ok_or(Error::BadOffset)?;
        str_from_nul_bytes(bytes)
    }

    /// Returns a view of the root node.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BadOffset`] if the structure block does not start
    /// with a BEGIN_NODE tag.
    pub fn root(&self) -> Result<FdtNode<'a>> {
        self.node_at(0)
    }

    /// Returns a view of the node whose BEGIN_NODE tag is at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BadOffset`] if `offset` does not point at a
    /// BEGIN_NODE tag.
    pub fn node_at(&self, offset: usize) -> Result<FdtNode<'a>> {
        self.node_body_offset(offset)?;
        Ok(FdtNode { fdt: *self, offset })
    }

    fn rsv_entry(&self, n: usize) -> Result<ReserveEntry> {
        let size = size_of::<ReserveEntry>();
        let start = n
            .checked_mul(size)
            .and_then(|off| off.checked_add(self.header().off_mem_rsvmap() as usize))
            .ok_or(Error::Truncated)?;
        let end = start.checked_add(size).ok_or(Error::Truncated)?;
        if end > self.totalsize() as usize {
            return Err(Error::Truncated);
        }
        ReserveEntry::read_from_bytes(&self.data[start..end]).map_err(|_| Error::Internal)
    }

    /// Returns the number of entries in the memory reservation block, not
    /// counting the terminating sentinel.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Truncated`] if the block runs past the end of the
    /// blob without a sentinel.
    pub fn num_mem_rsv(&self) -> Result<usize> {
        let mut n = 0;
        while self.rsv_entry(n)?.size.get() != 0 {
            n += 1;
        }
        Ok(n)
    }

    /// Returns the `n`-th entry of the memory reservation block, decoded
    /// to native endianness.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Truncated`] if entry `n` lies outside the blob.
    pub fn mem_rsv(&self, n: usize) -> Result<MemoryReservation> {
        let entry = self.rsv_entry(n)?;
        Ok(MemoryReservation::new(entry.address.get(), entry.size.get()))
    }

    /// Returns an iterator over the memory reservation block.
    ///
    /// Iteration ends at the terminating sentinel entry, or at the end of
    /// the blob if the sentinel is missing.
    pub fn memory_reservations(&self) -> impl Iterator<Item = MemoryReservation> + use<'a> {
        let fdt = *self;
        let mut n = 0;
        core::iter::from_fn(move || {
            let entry = fdt.mem_rsv(n).ok()?;
            if entry.size() == 0 {
                return None;
            }
            n += 1;
            Some(entry)
        })
    }
}

impl fmt::Display for Fdt<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "/dts-v1/;")?;
        for reservation in self.memory_reservations() {
            writeln!(
                f,
                "/memreserve/ {:#x} {:#x};",
                reservation.address(),
                reservation.size()
            )?;
        }
        writeln!(f)?;
        let root = self.root().map_err(|_| fmt::Error)?;
        root.fmt_recursive(f, 0)
    }
}

pub(crate) fn str_from_nul_bytes(bytes: &[u8]) -> Result<&str> {
    let cstr = CStr::from_bytes_until_nul(bytes).map_err(|_| Error::BadStructure)?;
    cstr.to_str().map_err(|_| Error::BadStructure)
}
