// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Property traversal, lookup and string-list queries.

use core::ffi::CStr;
use core::fmt;

use zerocopy::FromBytes;
use zerocopy::byteorder::big_endian;

use super::{FDT_MAX_NCELLS, Fdt, FdtToken, PropHeader};
use crate::Result;
use crate::error::Error;

impl<'a> Fdt<'a> {
    /// Returns the offset of the first property of the node at `offset`.
    ///
    /// NOP tags between the node header and the property are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the node has no properties,
    /// [`Error::BadOffset`] if `offset` does not point at a BEGIN_NODE
    /// tag, and [`Error::BadStructure`] if the structure block ends
    /// inside the node.
    pub fn first_property(&self, offset: usize) -> Result<usize> {
        let body = self.node_body_offset(offset)?;
        self.scan_property(body)
    }

    /// Returns the offset of the property following the one at `offset`,
    /// within the same node.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the property at `offset` is the
    /// last one of its node and [`Error::BadOffset`] if `offset` does not
    /// point at a PROP tag.
    pub fn next_property(&self, offset: usize) -> Result<usize> {
        let next = self.skip_property(offset)?;
        self.scan_property(next)
    }

    /// Skips NOP tags up to the next PROP tag. Properties precede child
    /// nodes, so a BEGIN_NODE or END_NODE means there are no more.
    fn scan_property(&self, mut offset: usize) -> Result<usize> {
        loop {
            let (token, next) = self.next_tag(offset);
            match token {
                FdtToken::Prop => return Ok(offset),
                FdtToken::Nop => offset = next?,
                FdtToken::BeginNode | FdtToken::EndNode => return Err(Error::NotFound),
                FdtToken::End if offset > 0 => return Err(Error::BadStructure),
                FdtToken::End => return Ok(offset),
            }
        }
    }

    /// Returns the raw property record at `offset`, without resolving the
    /// name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BadOffset`] if `offset` does not point at a PROP
    /// tag and [`Error::Truncated`] if the declared value runs past the
    /// end of the blob.
    pub fn property_entry(&self, offset: usize) -> Result<PropertyEntry<'a>> {
        self.skip_property(offset)?;
        let bytes = self
            .offset_to_slice(offset, size_of::<PropHeader>())
            .ok_or(Error::Truncated)?;
        let header = PropHeader::read_from_bytes(bytes).map_err(|_| Error::Internal)?;
        let value_offset = offset
            .checked_add(size_of::<PropHeader>())
            .ok_or(Error::Truncated)?;
        let value = self
            .offset_to_slice(value_offset, header.len.get() as usize)
            .ok_or(Error::Truncated)?;
        Ok(PropertyEntry {
            nameoff: header.nameoff.get(),
            value,
        })
    }

    /// Returns the property at `offset` with its name resolved through
    /// the strings block.
    ///
    /// # Errors
    ///
    /// The errors of [`Fdt::property_entry`] and [`Fdt::string_at`].
    pub fn property_at(&self, offset: usize) -> Result<FdtProperty<'a>> {
        let entry = self.property_entry(offset)?;
        let name = self.string_at(entry.name_offset())?;
        Ok(FdtProperty {
            name,
            value: entry.value,
        })
    }

    /// Finds the property of the node at `offset` with the given name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the node has no such property.
    pub fn property_by_name(&self, offset: usize, name: &str) -> Result<FdtProperty<'a>> {
        let mut prop_offset = self.first_property(offset)?;
        loop {
            // The offset came from first_property/next_property, so a
            // record that no longer decodes is an internal inconsistency.
            let entry = self
                .property_entry(prop_offset)
                .map_err(|_| Error::Internal)?;
            let prop_name = self.string_at(entry.name_offset())?;
            if prop_name == name {
                return Ok(FdtProperty {
                    name: prop_name,
                    value: entry.value,
                });
            }
            prop_offset = self.next_property(prop_offset)?;
        }
    }

    /// Returns the value of the property of the node at `offset` with the
    /// given name.
    ///
    /// # Errors
    ///
    /// The errors of [`Fdt::property_by_name`].
    pub fn property_value_by_name(&self, offset: usize, name: &str) -> Result<&'a [u8]> {
        self.property_by_name(offset, name)
            .map(|property| property.value)
    }

    /// Returns the expansion of the alias `name`: the value of the
    /// property of that name in the `/aliases` node.
    ///
    /// Returns `None` if there is no `/aliases` node, no such property,
    /// or the value is not a NUL-terminated string.
    #[must_use]
    pub fn alias_value(&self, name: &str) -> Option<&'a str> {
        let aliases = self.node_by_path("/aliases").ok()?;
        let value = self.property_value_by_name(aliases, name).ok()?;
        let cstr = CStr::from_bytes_until_nul(value).ok()?;
        cstr.to_str().ok()
    }

    /// Returns the phandle of the node at `offset`, or 0 if the node has
    /// no valid `phandle` (or legacy `linux,phandle`) property. A valid
    /// phandle property is exactly 4 bytes long.
    #[must_use]
    pub fn node_phandle(&self, offset: usize) -> u32 {
        for name in ["phandle", "linux,phandle"] {
            if let Ok(value) = self.property_value_by_name(offset, name)
                && let Ok(phandle) = big_endian::U32::read_from_bytes(value)
            {
                return phandle.get();
            }
        }
        0
    }

    /// Returns the `#address-cells` value of the node at `offset`, or 2
    /// if the property is absent.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BadNCells`] if the property is present but not 4
    /// bytes long, or its value exceeds [`FDT_MAX_NCELLS`].
    pub fn address_cells(&self, offset: usize) -> Result<u32> {
        self.cells_value(offset, "#address-cells")
    }

    /// Returns the `#size-cells` value of the node at `offset`, or 2 if
    /// the property is absent.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BadNCells`] if the property is present but not 4
    /// bytes long, or its value exceeds [`FDT_MAX_NCELLS`].
    pub fn size_cells(&self, offset: usize) -> Result<u32> {
        self.cells_value(offset, "#size-cells")
    }

    fn cells_value(&self, offset: usize, name: &str) -> Result<u32> {
        let value = match self.property_value_by_name(offset, name) {
            Ok(value) => value,
            Err(Error::NotFound) => return Ok(2),
            Err(e) => return Err(e),
        };
        let cells = big_endian::U32::read_from_bytes(value)
            .map_err(|_| Error::BadNCells)?
            .get();
        if cells > FDT_MAX_NCELLS {
            return Err(Error::BadNCells);
        }
        Ok(cells)
    }

    /// Counts the strings in the list-valued property `name` of the node
    /// at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BadValue`] if the last string is not
    /// NUL-terminated within the property value and [`Error::NotFound`]
    /// if the property does not exist.
    pub fn stringlist_count(&self, offset: usize, name: &str) -> Result<usize> {
        let value = self.property_value_by_name(offset, name)?;
        let mut count = 0;
        let mut rest = value;
        while !rest.is_empty() {
            let nul = rest
                .iter()
                .position(|&byte| byte == 0)
                .ok_or(Error::BadValue)?;
            rest = &rest[nul + 1..];
            count += 1;
        }
        Ok(count)
    }

    /// Finds `s` in the list-valued property `name` of the node at
    /// `offset` and returns its zero-based index.
    ///
    /// The search stops at the first match, so it can succeed on a value
    /// whose tail is not NUL-terminated.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the property does not exist or does
    /// not contain `s`, and [`Error::BadValue`] if an unterminated tail
    /// is reached before a match.
    pub fn stringlist_search(&self, offset: usize, name: &str, s: &str) -> Result<usize> {
        let value = self.property_value_by_name(offset, name)?;
        let mut index = 0;
        let mut rest = value;
        while !rest.is_empty() {
            let nul = rest
                .iter()
                .position(|&byte| byte == 0)
                .ok_or(Error::BadValue)?;
            if &rest[..nul] == s.as_bytes() {
                return Ok(index);
            }
            rest = &rest[nul + 1..];
            index += 1;
        }
        Err(Error::NotFound)
    }

    /// Returns the string at `index` in the list-valued property `name`
    /// of the node at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the property does not exist or
    /// holds fewer than `index + 1` strings, and [`Error::BadValue`] if
    /// an unterminated tail is reached first.
    pub fn stringlist_get(&self, offset: usize, name: &str, index: usize) -> Result<&'a str> {
        let value = self.property_value_by_name(offset, name)?;
        let mut remaining = index;
        let mut rest = value;
        loop {
            if rest.is_empty() {
                return Err(Error::NotFound);
            }
            let nul = rest
                .iter()
                .position(|&byte| byte == 0)
                .ok_or(Error::BadValue)?;
            if remaining == 0 {
                return core::str::from_utf8(&rest[..nul]).map_err(|_| Error::BadValue);
            }
            rest = &rest[nul + 1..];
            remaining -= 1;
        }
    }
}

/// Checks whether the NUL-separated string list in `list` contains `s`,
/// comparing whole entries only.
///
/// An entry that is not NUL-terminated within `list` never matches.
#[must_use]
pub fn stringlist_contains(list: &[u8], s: &str) -> bool {
    let needle = s.as_bytes();
    let mut rest = list;
    while rest.len() > needle.len() {
        if &rest[..needle.len()] == needle && rest[needle.len()] == 0 {
            return true;
        }
        match rest.iter().position(|&byte| byte == 0) {
            Some(nul) => rest = &rest[nul + 1..],
            None => return false,
        }
    }
    false
}

/// A raw property record: the value bytes and the strings block offset of
/// the not-yet-resolved property name.
#[derive(Debug, Clone, Copy)]
pub struct PropertyEntry<'a> {
    nameoff: u32,
    value: &'a [u8],
}

impl<'a> PropertyEntry<'a> {
    /// Returns the strings block offset of the property name.
    #[must_use]
    pub fn name_offset(&self) -> usize {
        self.nameoff as usize
    }

    /// Returns the value bytes of the property.
    #[must_use]
    pub fn value(&self) -> &'a [u8] {
        self.value
    }

    /// Returns the length of the value in bytes.
    #[must_use]
    pub fn value_len(&self) -> usize {
        self.value.len()
    }
}

/// A property of a device tree node, with its name resolved through the
/// strings block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FdtProperty<'a> {
    pub(crate) name: &'a str,
    pub(crate) value: &'a [u8],
}

impl<'a> FdtProperty<'a> {
    /// Returns the name of this property.
    #[must_use]
    pub fn name(&self) -> &'a str {
        self.name
    }

    /// Returns the value of this property.
    #[must_use]
    pub fn value(&self) -> &'a [u8] {
        self.value
    }

    /// Returns the value of this property as a big-endian `u32`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BadValue`] if the value is not exactly 4 bytes
    /// long.
    pub fn as_u32(&self) -> Result<u32> {
        big_endian::U32::read_from_bytes(self.value)
            .map(|value| value.get())
            .map_err(|_| Error::BadValue)
    }

    /// Returns the value of this property as a big-endian `u64`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BadValue`] if the value is not exactly 8 bytes
    /// long.
    pub fn as_u64(&self) -> Result<u64> {
        big_endian::U64::read_from_bytes(self.value)
            .map(|value| value.get())
            .map_err(|_| Error::BadValue)
    }

    /// Returns the value of this property as a string.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BadValue`] if the value is not a single
    /// NUL-terminated UTF-8 string.
    pub fn as_str(&self) -> Result<&'a str> {
        let cstr = CStr::from_bytes_with_nul(self.value).map_err(|_| Error::BadValue)?;
        cstr.to_str().map_err(|_| Error::BadValue)
    }

    /// Returns an iterator over the strings in this property's value.
    pub fn as_str_list(&self) -> impl Iterator<Item = &'a str> + use<'a> {
        FdtStringListIterator { value: self.value }
    }

    pub(crate) fn fmt(&self, f: &mut fmt::Formatter<'_>, indent: usize) -> fmt::Result {
        write!(f, "{:indent$}{}", "", self.name, indent = indent)?;

        if self.value.is_empty() {
            writeln!(f, ";")?;
            return Ok(());
        }

        let is_printable = self
            .value
            .iter()
            .all(|&ch| ch.is_ascii_graphic() || ch == b' ' || ch == 0);
        let has_empty = self.value.windows(2).any(|window| window == [0, 0]);
        if is_printable && self.value.ends_with(&[0]) && !has_empty {
            let mut strings = self.as_str_list();
            if let Some(first) = strings.next() {
                write!(f, " = \"{first}\"")?;
                for s in strings {
                    write!(f, ", \"{s}\"")?;
                }
                writeln!(f, ";")?;
                return Ok(());
            }
        }

        if self.value.len().is_multiple_of(4) {
            write!(f, " = <")?;
            for (i, chunk) in self.value.chunks_exact(4).enumerate() {
                if i > 0 {
                    write!(f, " ")?;
                }
                let val = u32::from_be_bytes(
                    chunk
                        .try_into()
                        .expect("chunks_exact(4) always yields 4 bytes"),
                );
                write!(f, "0x{val:02x}")?;
            }
            writeln!(f, ">;")?;
        } else {
            write!(f, " = [")?;
            for (i, byte) in self.value.iter().enumerate() {
                if i > 0 {
                    write!(f, " ")?;
                }
                write!(f, "{byte:02x}")?;
            }
            writeln!(f, "];")?;
        }

        Ok(())
    }
}

/// An iterator over the properties of a device tree node.
pub(crate) struct FdtPropIter<'a> {
    fdt: Fdt<'a>,
    state: PropIterState,
}

enum PropIterState {
    AtNode(usize),
    AtProp(usize),
    Done,
}

impl<'a> FdtPropIter<'a> {
    pub(crate) fn new(fdt: Fdt<'a>, offset: usize) -> Self {
        Self {
            fdt,
            state: PropIterState::AtNode(offset),
        }
    }
}

impl<'a> Iterator for FdtPropIter<'a> {
    type Item = Result<FdtProperty<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        let next = match self.state {
            PropIterState::AtNode(node) => self.fdt.first_property(node),
            PropIterState::AtProp(property) => self.fdt.next_property(property),
            PropIterState::Done => return None,
        };
        match next {
            Ok(offset) => {
                self.state = PropIterState::AtProp(offset);
                match self.fdt.property_at(offset) {
                    Ok(property) => Some(Ok(property)),
                    Err(e) => {
                        self.state = PropIterState::Done;
                        Some(Err(e))
                    }
                }
            }
            Err(Error::NotFound) => {
                self.state = PropIterState::Done;
                None
            }
            Err(e) => {
                self.state = PropIterState::Done;
                Some(Err(e))
            }
        }
    }
}

/// An iterator over the NUL-separated strings of a property value.
struct FdtStringListIterator<'a> {
    value: &'a [u8],
}

impl<'a> Iterator for FdtStringListIterator<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<Self::Item> {
        if self.value.is_empty() {
            return None;
        }
        let cstr = CStr::from_bytes_until_nul(self.value).ok()?;
        let s = cstr.to_str().ok()?;
        self.value = &self.value[s.len() + 1..];
        Some(s)
    }
}
