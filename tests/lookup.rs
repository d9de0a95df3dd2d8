// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use dtwalk::{Error, Fdt};

mod common;

use common::BlobBuilder;

/// root { aliases; soc { uart@9000000 }; cpus { cpu@0 }; badcells }
fn lookup_blob() -> Vec<u8> {
    BlobBuilder::new()
        .begin_node("")
        .prop_u32("#address-cells", 2)
        .prop_u32("#size-cells", 1)
        .prop("status", b"okay\0")
        .begin_node("aliases")
        .prop_str("serial0", "/soc/uart@9000000")
        .prop_str("soc0", "/soc")
        .end_node()
        .begin_node("soc")
        .begin_node("uart@9000000")
        .nop()
        .prop("compatible", b"arm,pl011\0arm,primecell\0")
        .nop()
        .prop_u32("phandle", 7)
        .end_node()
        .end_node()
        .begin_node("cpus")
        .begin_node("cpu@0")
        .prop_u32("linux,phandle", 9)
        .prop("status", b"okay\0")
        .end_node()
        .end_node()
        .begin_node("badcells")
        .prop_u32("#address-cells", 5)
        .prop("#size-cells", &[0x00, 0x01])
        .end_node()
        .end_node()
        .end()
        .build()
}

#[test]
fn absolute_path_lookup() {
    let blob = lookup_blob();
    let fdt = Fdt::new(&blob).unwrap();

    assert_eq!(fdt.node_by_path("/"), Ok(0));

    let soc = fdt.node_by_path("/soc").unwrap();
    assert_eq!(fdt.node_name(soc).unwrap(), "soc");

    let uart = fdt.node_by_path("/soc/uart@9000000").unwrap();
    assert_eq!(fdt.node_name(uart).unwrap(), "uart@9000000");

    // Path components may omit the unit address, but a dangling '@'
    // matches nothing.
    assert_eq!(fdt.node_by_path("/soc/uart"), Ok(uart));
    assert_eq!(fdt.node_by_path("/soc/uart@"), Err(Error::NotFound));
    assert_eq!(fdt.node_by_path("/nonexistent"), Err(Error::NotFound));
    assert_eq!(-Error::NotFound.code(), -1);

    // Consecutive and trailing slashes are skipped.
    assert_eq!(fdt.node_by_path("//soc//uart@9000000"), Ok(uart));
    assert_eq!(fdt.node_by_path("/soc/"), Ok(soc));
}

#[test]
fn path_lookup_composes_with_child_lookup() {
    let blob = lookup_blob();
    let fdt = Fdt::new(&blob).unwrap();

    let soc = fdt.node_by_path("/soc").unwrap();
    assert_eq!(
        fdt.node_by_path("/soc/uart@9000000").unwrap(),
        fdt.child_by_name(soc, "uart@9000000").unwrap()
    );
}

#[test]
fn alias_resolution() {
    let blob = lookup_blob();
    let fdt = Fdt::new(&blob).unwrap();

    let uart = fdt.node_by_path("/soc/uart@9000000").unwrap();

    assert_eq!(fdt.alias_value("serial0"), Some("/soc/uart@9000000"));
    assert_eq!(fdt.alias_value("missing"), None);

    // A whole-path alias and an alias followed by more components.
    assert_eq!(fdt.node_by_path("serial0"), Ok(uart));
    assert_eq!(fdt.node_by_path("soc0/uart@9000000"), Ok(uart));

    assert_eq!(fdt.node_by_path("nope0"), Err(Error::BadPath));
    assert_eq!(fdt.node_by_path(""), Err(Error::BadPath));
}

#[test]
fn lookup_by_phandle() {
    let blob = lookup_blob();
    let fdt = Fdt::new(&blob).unwrap();

    let uart = fdt.node_by_path("/soc/uart@9000000").unwrap();
    let cpu0 = fdt.node_by_path("/cpus/cpu@0").unwrap();

    assert_eq!(fdt.node_by_phandle(7), Ok(uart));
    // The legacy linux,phandle spelling works too.
    assert_eq!(fdt.node_by_phandle(9), Ok(cpu0));
    assert_eq!(fdt.node_by_phandle(8), Err(Error::NotFound));

    assert_eq!(fdt.node_by_phandle(0), Err(Error::BadPhandle));
    assert_eq!(fdt.node_by_phandle(u32::MAX), Err(Error::BadPhandle));
    assert_eq!(-Error::BadPhandle.code(), -6);

    assert_eq!(fdt.node_phandle(uart), 7);
    assert_eq!(fdt.node_phandle(cpu0), 9);
    assert_eq!(fdt.node_phandle(0), 0);
}

#[test]
fn lookup_by_compatible() {
    let blob = lookup_blob();
    let fdt = Fdt::new(&blob).unwrap();

    let uart = fdt.node_by_path("/soc/uart@9000000").unwrap();

    assert_eq!(fdt.node_by_compatible(None, "arm,pl011"), Ok(uart));
    assert_eq!(fdt.node_by_compatible(None, "arm,primecell"), Ok(uart));
    assert_eq!(
        fdt.node_by_compatible(Some(uart), "arm,pl011"),
        Err(Error::NotFound)
    );
    assert_eq!(
        fdt.node_by_compatible(None, "brcm,bcm2835"),
        Err(Error::NotFound)
    );

    assert_eq!(fdt.node_is_compatible(uart, "arm,primecell"), Ok(true));
    assert_eq!(fdt.node_is_compatible(uart, "arm,foo"), Ok(false));
    // No compatible property at all.
    assert_eq!(
        fdt.node_is_compatible(0, "arm,pl011"),
        Err(Error::NotFound)
    );
}

#[test]
fn lookup_by_property_value() {
    let blob = lookup_blob();
    let fdt = Fdt::new(&blob).unwrap();

    let cpu0 = fdt.node_by_path("/cpus/cpu@0").unwrap();

    // `None` includes the root, which carries the property as well.
    assert_eq!(fdt.node_by_prop_value(None, "status", b"okay\0"), Ok(0));
    // `Some(0)` starts after the root and finds the next match.
    assert_eq!(
        fdt.node_by_prop_value(Some(0), "status", b"okay\0"),
        Ok(cpu0)
    );
    assert_eq!(
        fdt.node_by_prop_value(Some(cpu0), "status", b"okay\0"),
        Err(Error::NotFound)
    );

    // The value must match in length as well as content.
    assert_eq!(
        fdt.node_by_prop_value(None, "status", b"okay"),
        Err(Error::NotFound)
    );
}

#[test]
fn property_traversal_skips_nops() {
    let blob = lookup_blob();
    let fdt = Fdt::new(&blob).unwrap();

    let uart = fdt.node_by_path("/soc/uart@9000000").unwrap();

    let first = fdt.first_property(uart).unwrap();
    assert_eq!(fdt.property_at(first).unwrap().name(), "compatible");

    let second = fdt.next_property(first).unwrap();
    let property = fdt.property_at(second).unwrap();
    assert_eq!(property.name(), "phandle");
    assert_eq!(property.as_u32(), Ok(7));

    assert_eq!(fdt.next_property(second), Err(Error::NotFound));

    let entry = fdt.property_entry(second).unwrap();
    assert_eq!(entry.value_len(), 4);
    assert_eq!(entry.value(), 7_u32.to_be_bytes());
    assert_eq!(fdt.string_at(entry.name_offset()).unwrap(), "phandle");
}

#[test]
fn property_lookup_by_name() {
    let blob = lookup_blob();
    let fdt = Fdt::new(&blob).unwrap();

    let uart = fdt.node_by_path("/soc/uart@9000000").unwrap();
    let soc = fdt.node_by_path("/soc").unwrap();

    let property = fdt.property_by_name(uart, "compatible").unwrap();
    assert_eq!(property.name(), "compatible");
    assert_eq!(property.value(), b"arm,pl011\0arm,primecell\0");

    assert_eq!(
        fdt.property_value_by_name(uart, "phandle").unwrap(),
        7_u32.to_be_bytes()
    );

    assert_eq!(
        fdt.property_by_name(uart, "missing").unwrap_err(),
        Error::NotFound
    );
    // A node with no properties at all.
    assert_eq!(fdt.first_property(soc), Err(Error::NotFound));
    // An offset that is not a node.
    assert_eq!(
        fdt.property_by_name(2, "compatible").unwrap_err(),
        Error::BadOffset
    );
}

#[test]
fn property_views() {
    let blob = lookup_blob();
    let fdt = Fdt::new(&blob).unwrap();

    let uart = fdt
        .root()
        .unwrap()
        .child("soc")
        .unwrap()
        .child("uart")
        .unwrap();

    let names: Vec<_> = uart
        .properties()
        .map(|property| property.unwrap().name())
        .collect();
    assert_eq!(names, ["compatible", "phandle"]);

    let phandle = uart.property("phandle").unwrap().unwrap();
    assert_eq!(phandle.as_u32(), Ok(7));
    assert!(uart.property("missing").unwrap().is_none());
}

#[test]
fn address_and_size_cells() {
    let blob = lookup_blob();
    let fdt = Fdt::new(&blob).unwrap();

    assert_eq!(fdt.address_cells(0), Ok(2));
    assert_eq!(fdt.size_cells(0), Ok(1));

    // Absent properties default to 2.
    let cpu0 = fdt.node_by_path("/cpus/cpu@0").unwrap();
    assert_eq!(fdt.address_cells(cpu0), Ok(2));
    assert_eq!(fdt.size_cells(cpu0), Ok(2));

    let badcells = fdt.node_by_path("/badcells").unwrap();
    // Value out of range.
    assert_eq!(fdt.address_cells(badcells), Err(Error::BadNCells));
    // Value not 4 bytes long.
    assert_eq!(fdt.size_cells(badcells), Err(Error::BadNCells));
    assert_eq!(Error::BadNCells.code(), 14);
}
