// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Matthias Bilger <matthias@bilger.info>

use crate::constants::SUUNTO_USB_VENDOR_ID;
use crate::device::DeviceDescriptor;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Four byte firmware/hardware version as reported by the watch.
///
/// The last two bytes form a little-endian 16 bit patch level, so versions
/// compare as `(major, minor, patch16)` and not byte by byte.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FirmwareVersion(pub [u8; 4]);

impl FirmwareVersion {
    pub const fn new(major: u8, minor: u8, patch: u16) -> Self {
        Self([major, minor, (patch & 0xff) as u8, (patch >> 8) as u8])
    }

    /// Weighted comparison key: `b0<<24 | b1<<16 | b2 | b3<<8`
    pub fn number(&self) -> u32 {
        let v = self.0;
        (u32::from(v[0]) << 24) | (u32::from(v[1]) << 16) | u32::from(v[2]) | (u32::from(v[3]) << 8)
    }

    pub fn major(&self) -> u8 {
        self.0[0]
    }

    pub fn minor(&self) -> u8 {
        self.0[1]
    }

    pub fn patch(&self) -> u16 {
        u16::from_le_bytes([self.0[2], self.0[3]])
    }
}

impl Ord for FirmwareVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.number().cmp(&other.number())
    }
}

impl PartialOrd for FirmwareVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for FirmwareVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major(), self.minor(), self.patch())
    }
}

/// One row of the capability table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KnownDevice {
    pub vendor_id: u16,
    pub product_id: u16,
    pub model: &'static str,
    pub min_fw_version: FirmwareVersion,
    pub name: &'static str,
    pub supported: bool,
    /// PMEM20 transfer unit, 0 when log transfer is not possible
    pub pmem20_chunk_size: u16,
}

impl KnownDevice {
    const fn new(
        product_id: u16,
        model: &'static str,
        min_fw_version: [u8; 4],
        name: &'static str,
        supported: bool,
        pmem20_chunk_size: u16,
    ) -> Self {
        Self {
            vendor_id: SUUNTO_USB_VENDOR_ID,
            product_id,
            model,
            min_fw_version: FirmwareVersion(min_fw_version),
            name,
            supported,
            pmem20_chunk_size,
        }
    }

    fn same_signature(&self, other: &KnownDevice) -> bool {
        self.vendor_id == other.vendor_id
            && self.product_id == other.product_id
            && self.name == other.name
            && self.model == other.model
    }
}

/// Known watches.
///
/// Rows sharing vendor id, product id, name and model MUST be listed with
/// decreasing minimum firmware version: lookups take the first row whose
/// minimum version is satisfied.
pub static KNOWN_DEVICES: &[KnownDevice] = &[
    KnownDevice::new(0x001c, "Finch", [0x00, 0x00, 0x00, 0x00], "Suunto Ambit3 Sport", false, 0x0400),
    KnownDevice::new(0x001b, "Emu", [0x00, 0x00, 0x00, 0x00], "Suunto Ambit3 Peak", false, 0x0400),
    KnownDevice::new(0x001d, "Greentit", [0x00, 0x00, 0x00, 0x00], "Suunto Ambit2 R", true, 0x0400),
    KnownDevice::new(0x001a, "Colibri", [0x01, 0x01, 0x02, 0x00], "Suunto Ambit2 S", true, 0x0400),
    KnownDevice::new(0x0019, "Duck", [0x01, 0x01, 0x02, 0x00], "Suunto Ambit2", true, 0x0400),
    KnownDevice::new(0x001a, "Colibri", [0x00, 0x02, 0x03, 0x00], "Suunto Ambit2 S", false, 0x0400),
    KnownDevice::new(0x0019, "Duck", [0x00, 0x02, 0x03, 0x00], "Suunto Ambit2", false, 0x0400),
    KnownDevice::new(0x001a, "Colibri", [0x00, 0x02, 0x02, 0x00], "Suunto Ambit2 S (up to 0.2.2)", false, 0x0200),
    KnownDevice::new(0x0019, "Duck", [0x00, 0x02, 0x02, 0x00], "Suunto Ambit2 (up to 0.2.2)", false, 0x0200),
    KnownDevice::new(0x0010, "Bluebird", [0x02, 0x01, 0x00, 0x00], "Suunto Ambit", true, 0x0200),
    // first firmware with PMEM 2.0
    KnownDevice::new(0x0010, "Bluebird", [0x01, 0x09, 0x00, 0x00], "Suunto Ambit", false, 0x0200),
    KnownDevice::new(0x0010, "Bluebird", [0x01, 0x06, 0x00, 0x00], "Suunto Ambit", false, 0),
    KnownDevice::new(0x0010, "Bluebird", [0x01, 0x01, 0x00, 0x00], "Suunto Ambit", false, 0),
    KnownDevice::new(0x0010, "Bluebird", [0x00, 0x00, 0x00, 0x00], "Suunto Ambit", false, 0),
];

/// Coarse filter applied before any I/O with a candidate
pub fn is_known_vid_pid(vendor_id: u16, product_id: u16) -> bool {
    KNOWN_DEVICES
        .iter()
        .any(|d| d.vendor_id == vendor_id && d.product_id == product_id)
}

/// Index of the first row in [`KNOWN_DEVICES`] matching `descriptor`
pub fn find_known_device(descriptor: &DeviceDescriptor) -> Option<usize> {
    find_known_device_in(KNOWN_DEVICES, descriptor)
}

/// Index of the first row in `table` matching `descriptor`.
///
/// A row matches when vendor id, product id, name and model are equal and
/// its minimum firmware version does not exceed the descriptor's.
pub fn find_known_device_in(table: &[KnownDevice], descriptor: &DeviceDescriptor) -> Option<usize> {
    table.iter().position(|d| {
        d.vendor_id == descriptor.vendor_id
            && d.product_id == descriptor.product_id
            && d.name == descriptor.name
            && d.model == descriptor.model
            && d.min_fw_version <= descriptor.fw_version
    })
}

/// Checks the ordering precondition of a capability table.
///
/// Returns the index of the first row whose minimum firmware version is
/// not below that of an earlier row with the same signature.
pub fn check_table_order(table: &[KnownDevice]) -> Result<(), usize> {
    for (i, row) in table.iter().enumerate() {
        let violates = table[..i]
            .iter()
            .any(|earlier| earlier.same_signature(row) && earlier.min_fw_version <= row.min_fw_version);
        if violates {
            return Err(i);
        }
    }
    Ok(())
}
