// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Error types for the `dtwalk` crate.

use core::fmt;

/// An error that can occur when decoding or querying a device tree blob.
///
/// Each variant carries a stable numeric code compatible with the classic
/// libfdt numbering, available through [`Error::code`]. APIs that
/// traditionally return negated codes in place of offsets map onto
/// `Result<usize, Error>` here; `-err.code()` recovers the C-style value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The requested node or property does not exist.
    NotFound = 1,
    /// The node or property to be created already exists.
    Exists = 2,
    /// A destination buffer is too small for the operation.
    NoSpace = 3,
    /// A structure block offset is out of bounds, or points to an
    /// unsuitable part of the structure for the operation.
    BadOffset = 4,
    /// A badly formatted path, e.g. missing a leading '/' where an
    /// absolute path is required.
    BadPath = 5,
    /// An invalid phandle value. Phandles of 0 and 0xffff_ffff are not
    /// permitted.
    BadPhandle = 6,
    /// The blob is not sufficiently complete for the requested operation.
    BadState = 7,
    /// The structure block ends without an END tag.
    Truncated = 8,
    /// The blob is missing the flattened device tree magic number.
    BadMagic = 9,
    /// The blob has a version that cannot be handled.
    BadVersion = 10,
    /// The blob has a corrupt structure block, e.g. misnested nodes.
    BadStructure = 11,
    /// The blob has its sub-blocks in an order that cannot be handled.
    BadLayout = 12,
    /// An internal assertion failed. Indicates a bug in this library.
    Internal = 13,
    /// A `#address-cells` or `#size-cells` style property has a bad
    /// format or value.
    BadNCells = 14,
    /// A property has an unexpected value, e.g. a string list that is not
    /// NUL-terminated within the length of its value.
    BadValue = 15,
}

impl Error {
    /// The largest code returned by [`Error::code`].
    pub const MAX_CODE: i32 = 15;

    /// Returns the stable numeric code of this error.
    #[must_use]
    pub const fn code(self) -> i32 {
        self as i32
    }

    /// Returns the error with the given numeric code, if there is one.
    #[must_use]
    pub const fn from_code(code: i32) -> Option<Self> {
        match code {
            1 => Some(Self::NotFound),
            2 => Some(Self::Exists),
            3 => Some(Self::NoSpace),
            4 => Some(Self::BadOffset),
            5 => Some(Self::BadPath),
            6 => Some(Self::BadPhandle),
            7 => Some(Self::BadState),
            8 => Some(Self::Truncated),
            9 => Some(Self::BadMagic),
            10 => Some(Self::BadVersion),
            11 => Some(Self::BadStructure),
            12 => Some(Self::BadLayout),
            13 => Some(Self::Internal),
            14 => Some(Self::BadNCells),
            15 => Some(Self::BadValue),
            _ => None,
        }
    }

    /// Returns a fixed diagnostic string for this error.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotFound => "node or property not found",
            Self::Exists => "node or property already exists",
            Self::NoSpace => "buffer too small",
            Self::BadOffset => "bad structure block offset",
            Self::BadPath => "badly formatted path",
            Self::BadPhandle => "invalid phandle value",
            Self::BadState => "incomplete device tree",
            Self::Truncated => "structure block ends without an END tag",
            Self::BadMagic => "missing device tree magic number",
            Self::BadVersion => "unsupported device tree version",
            Self::BadStructure => "corrupt structure block",
            Self::BadLayout => "unsupported sub-block layout",
            Self::Internal => "internal library error",
            Self::BadNCells => "bad #address-cells or #size-cells value",
            Self::BadValue => "unexpected property value",
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::error::Error for Error {}
