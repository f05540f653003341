// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Matthias Bilger <matthias@bilger.info>

use crate::error::{AmbitError, Result};
use crate::known_devices::{find_known_device, is_known_vid_pid, FirmwareVersion, KNOWN_DEVICES};
use crate::protocol::Link;
use crate::transport::{DeviceCandidate, DeviceDiscovery, DeviceOpener, DiscoveryFilter, HidApiBackend};
use log::{error, info, warn};
use serde::{Deserialize, Serialize};

/// Everything known about a watch after identification
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    /// Device node used to open the watch
    pub path: String,
    pub vendor_id: u16,
    pub product_id: u16,
    /// Product name reported by the transport
    pub name: String,
    pub serial: String,
    /// Firmware codename, e.g. "Colibri"
    pub model: String,
    pub fw_version: FirmwareVersion,
    pub hw_version: FirmwareVersion,
    /// OS error number from opening the node, 0 when it can be opened
    pub access_status: i32,
    pub is_supported: bool,
    pub chunk_size: u16,
}

/// Identity fields answered by the device info command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceIdentity {
    pub model: String,
    pub serial: String,
    pub fw_version: FirmwareVersion,
    pub hw_version: FirmwareVersion,
}

/// Parse a `bus:vid:pid` identity string (three hex fields)
pub fn parse_hid_id(id: &str) -> Option<(u16, u16, u16)> {
    let mut fields = id.split(':').map(|f| u32::from_str_radix(f.trim(), 16).ok());
    let bus = fields.next()??;
    let vid = fields.next()??;
    let pid = fields.next()??;
    if fields.next().is_some() {
        return None;
    }
    Some((
        u16::try_from(bus).ok()?,
        u16::try_from(vid).ok()?,
        u16::try_from(pid).ok()?,
    ))
}

/// Turn a discovered candidate into a descriptor.
///
/// Returns `None` for candidates that are not hidraw nodes of a known
/// watch. Devices that cannot be opened or queried are still returned, with
/// `access_status` set or `is_supported` false.
pub fn identify<O: DeviceOpener>(candidate: &DeviceCandidate, opener: &O) -> Option<DeviceDescriptor> {
    if candidate.subsystem != "hidraw" {
        error!("internal error: expecting hidraw device, got {:?}", candidate.subsystem);
        return None;
    }

    let Some(id) = candidate.hid_id.as_deref() else {
        error!("hidraw device w/o hid parent device");
        return None;
    };

    let Some(path) = candidate.devnode.as_deref() else {
        error!("hidraw device w/o device path");
        return None;
    };

    let Some((_bus, vendor_id, product_id)) = parse_hid_id(id) else {
        error!("cannot parse HID ID ({})", id);
        return None;
    };

    if !is_known_vid_pid(vendor_id, product_id) {
        warn!("unknown device (VID/PID: {:04x}/{:04x})", vendor_id, product_id);
        return None;
    }

    let mut device = DeviceDescriptor {
        path: path.to_string(),
        vendor_id,
        product_id,
        name: candidate.name.clone().unwrap_or_default(),
        serial: candidate.serial.clone().unwrap_or_default(),
        ..Default::default()
    };

    info!(
        "udev : {}: '{}' (serial: {}, VID/PID: {:04x}/{:04x})",
        device.path, device.name, device.serial, device.vendor_id, device.product_id
    );

    match opener.open(&device.path) {
        Ok(transport) => {
            // the link, and with it the handle, is dropped at the end of this arm
            let mut link = Link::new(transport);
            match link.device_info() {
                Ok(identity) => apply_identity(&mut device, identity),
                Err(e) => error!("cannot get device info from {}: {}", device.path, e),
            }
        }
        Err(e) => {
            device.access_status = opener.access_status(&device.path);
            if device.access_status != 0 {
                error!(
                    "cannot open HID device ({}): {} (os error {})",
                    device.path, e, device.access_status
                );
            } else {
                warn!("have read/write access to {} but cannot open HID device", device.path);
            }
        }
    }

    Some(device)
}

fn apply_identity(device: &mut DeviceDescriptor, identity: DeviceIdentity) {
    if !device.serial.is_empty() && device.serial != identity.serial {
        info!("preferring F/W serial number over '{}'", device.serial);
    }
    device.serial = identity.serial;
    device.model = identity.model;
    device.fw_version = identity.fw_version;
    device.hw_version = identity.hw_version;

    if let Some(index) = find_known_device(device) {
        device.is_supported = KNOWN_DEVICES[index].supported;
        device.chunk_size = KNOWN_DEVICES[index].pmem20_chunk_size;
    }

    info!(
        "ambit: {}: '{}' (serial: {}, VID/PID: {:04x}/{:04x}, nick: {}, F/W: {}, H/W: {}, supported: {})",
        device.path,
        device.name,
        device.serial,
        device.vendor_id,
        device.product_id,
        device.model,
        device.fw_version,
        device.hw_version,
        if device.is_supported { "YES" } else { "NO" }
    );
}

/// Identify every candidate matching `filter`, in discovery order
pub fn enumerate_matching<D, O>(discovery: &D, opener: &O, filter: &DiscoveryFilter) -> Vec<DeviceDescriptor>
where
    D: DeviceDiscovery,
    O: DeviceOpener,
{
    match discovery.candidates(filter) {
        Ok(candidates) => candidates
            .iter()
            .filter_map(|candidate| identify(candidate, opener))
            .collect(),
        Err(e) => {
            error!("Failed to enumerate devices: {}", e);
            Vec::new()
        }
    }
}

/// Identify all attached watches using the given backend
pub fn enumerate_with<D, O>(discovery: &D, opener: &O) -> Vec<DeviceDescriptor>
where
    D: DeviceDiscovery,
    O: DeviceOpener,
{
    enumerate_matching(discovery, opener, &DiscoveryFilter::All)
}

/// Identify all attached watches through `hidapi`
pub fn enumerate() -> Result<Vec<DeviceDescriptor>> {
    let backend = HidApiBackend::new()
        .map_err(|e| AmbitError::Transport(format!("Failed to obtain HID context: {}", e)))?;
    Ok(enumerate_with(&backend, &backend))
}
