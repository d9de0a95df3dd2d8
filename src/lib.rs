// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! A read-only, zero-copy decoder for [Flattened Device Tree (FDT)] blobs.
//!
//! The entry point is [`Fdt`], a `Copy` handle over an externally owned
//! byte buffer. No part of the blob is ever copied or allocated: every
//! returned name, property value and view borrows directly from the input
//! buffer, and stays valid for as long as that buffer does.
//!
//! Two levels of API are provided. The offset-based engine on [`Fdt`]
//! identifies nodes and properties by their structure block offsets and
//! mirrors the classic libfdt operations (`next_node`, `first_child`,
//! `node_by_path`, `node_by_phandle`, string-list queries, …). On top of
//! it, the [`FdtNode`] and [`FdtProperty`] views offer ergonomic child and
//! property iteration.
//!
//! The blob is treated as untrusted: every access is bounds-checked
//! against the extents declared in the header, and offset arithmetic that
//! would overflow is rejected rather than wrapped.
//!
//! [Flattened Device Tree (FDT)]: https://devicetree-specification.readthedocs.io/en/latest/chapter5-flattened-format.html

#![no_std]

#[cfg(test)]
extern crate std;

pub type Result<T> = core::result::Result<T, Error>;

pub mod error;
pub mod fdt;
pub mod memreserve;

pub use error::Error;
pub use fdt::{Fdt, FdtNode, FdtProperty, FdtToken, PropertyEntry, stringlist_contains};
pub use memreserve::MemoryReservation;
