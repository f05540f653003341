// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Matthias Bilger <matthias@bilger.info>

mod common;

use ambit_hid::device::enumerate_matching;
use ambit_hid::*;
use common::{candidate, SimulatedOpener, SimulatedWatch, StaticDiscovery};

#[test]
fn test_parse_hid_id() {
    assert_eq!(parse_hid_id("0003:00001493:0000001A"), Some((3, 0x1493, 0x001a)));
    assert_eq!(parse_hid_id("0003:1493:1a"), Some((3, 0x1493, 0x001a)));
    assert_eq!(parse_hid_id("0003:00001493"), None);
    assert_eq!(parse_hid_id("0003:0001493G:0000001A"), None);
    assert_eq!(parse_hid_id("0003:00011493:0000001A"), None);
    assert_eq!(parse_hid_id("0003:00001493:0000001A:01"), None);
}

#[test]
fn test_identify_rejects_without_opening() {
    common::init_logging();
    let opener = SimulatedOpener::new(SimulatedWatch::new());

    let mut not_hidraw = candidate("/dev/hidraw0", 0x001a);
    not_hidraw.subsystem = "usb".to_string();

    let mut no_hid_id = candidate("/dev/hidraw0", 0x001a);
    no_hid_id.hid_id = None;

    let mut no_node = candidate("/dev/hidraw0", 0x001a);
    no_node.devnode = None;

    let mut garbled = candidate("/dev/hidraw0", 0x001a);
    garbled.hid_id = Some("not-an-id".to_string());

    let unknown_pid = candidate("/dev/hidraw0", 0x0001);

    for c in [not_hidraw, no_hid_id, no_node, garbled, unknown_pid] {
        assert_eq!(identify(&c, &opener), None);
    }
    assert!(opener.opened().is_empty());
}

#[test]
fn test_identify_supported_watch() {
    let watch = SimulatedWatch::new();
    watch.set_device_info("Colibri", "FW-SERIAL", [2, 0, 4, 0], [64, 0, 0, 0]);
    let opener = SimulatedOpener::new(watch.clone());

    let device = identify(&candidate("/dev/hidraw3", 0x001a), &opener).unwrap();

    assert_eq!(device.path, "/dev/hidraw3");
    assert_eq!((device.vendor_id, device.product_id), (0x1493, 0x001a));
    assert_eq!(device.name, "Suunto Ambit2 S");
    // firmware serial wins over the transport one
    assert_eq!(device.serial, "FW-SERIAL");
    assert_eq!(device.model, "Colibri");
    assert_eq!(device.fw_version, FirmwareVersion([2, 0, 4, 0]));
    assert_eq!(device.access_status, 0);
    assert!(device.is_supported);
    assert_eq!(device.chunk_size, 0x0400);
    assert_eq!(opener.opened(), vec!["/dev/hidraw3".to_string()]);
    assert_eq!(watch.commands(), vec![Command::DeviceInfo]);
}

#[test]
fn test_identify_old_firmware_is_unsupported() {
    let watch = SimulatedWatch::new();
    watch.set_device_info("Colibri", "ABC123", [0, 2, 3, 0], [64, 0, 0, 0]);

    let device = identify(&candidate("/dev/hidraw3", 0x001a), &SimulatedOpener::new(watch)).unwrap();

    assert!(!device.is_supported);
}

#[test]
fn test_identify_unknown_model_is_unsupported() {
    let watch = SimulatedWatch::new();
    watch.set_device_info("Mystery", "ABC123", [9, 9, 9, 9], [64, 0, 0, 0]);

    let device = identify(&candidate("/dev/hidraw3", 0x001a), &SimulatedOpener::new(watch)).unwrap();

    assert!(!device.is_supported);
    assert_eq!(device.model, "Mystery");
    assert_eq!(device.chunk_size, 0);
}

#[test]
fn test_identify_device_info_failure_keeps_descriptor() {
    let watch = SimulatedWatch::new();
    watch.fail(Command::DeviceInfo);

    let device = identify(&candidate("/dev/hidraw3", 0x001a), &SimulatedOpener::new(watch)).unwrap();

    assert!(!device.is_supported);
    assert_eq!(device.access_status, 0);
    assert_eq!(device.serial, "ABC123");
    assert!(device.model.is_empty());
}

#[test]
fn test_identify_inaccessible_node() {
    let opener = SimulatedOpener::failing(SimulatedWatch::new(), 13);

    let device = identify(&candidate("/dev/hidraw3", 0x001a), &opener).unwrap();

    assert_eq!(device.access_status, 13);
    assert!(!device.is_supported);
}

#[test]
fn test_enumerate_keeps_discovery_order() {
    let discovery = StaticDiscovery(vec![
        candidate("/dev/hidraw4", 0x001a),
        candidate("/dev/hidraw1", 0x0001),
        candidate("/dev/hidraw2", 0x0019),
    ]);
    let opener = SimulatedOpener::new(SimulatedWatch::new());

    let devices = enumerate_with(&discovery, &opener);

    let paths: Vec<_> = devices.iter().map(|d| d.path.as_str()).collect();
    assert_eq!(paths, vec!["/dev/hidraw4", "/dev/hidraw2"]);
}

#[test]
fn test_enumerate_without_candidates() {
    let opener = SimulatedOpener::new(SimulatedWatch::new());
    assert!(enumerate_with(&StaticDiscovery(Vec::new()), &opener).is_empty());
}

#[test]
fn test_enumerate_matching_filters_by_node() {
    let discovery = StaticDiscovery(vec![
        candidate("/dev/hidraw4", 0x001a),
        candidate("/dev/hidraw5", 0x001a),
    ]);
    let opener = SimulatedOpener::new(SimulatedWatch::new());

    let devices = enumerate_matching(
        &discovery,
        &opener,
        &DiscoveryFilter::DevNode("/dev/hidraw5".to_string()),
    );

    assert_eq!(devices.len(), 1);
    assert_eq!(devices[0].path, "/dev/hidraw5");
    assert_eq!(opener.opened(), vec!["/dev/hidraw5".to_string()]);
}

#[test]
fn test_descriptor_serializes_to_json() {
    let device = SimulatedWatch::new().descriptor(0x0400);
    let json = serde_json::to_value(&device).unwrap();

    assert_eq!(json["path"], "/dev/hidraw7");
    assert_eq!(json["model"], "Colibri");
    assert_eq!(json["is_supported"], true);
}
