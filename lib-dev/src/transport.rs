// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Matthias Bilger <matthias@bilger.info>

//! Seams towards the HID transport and the OS device discovery.
//!
//! The protocol layers only ever see these traits; [`HidApiBackend`] is the
//! production implementation on top of `hidapi`.

use crate::error::{AmbitError, Result};
use hidapi::{BusType, HidApi, HidDevice as RawHidDevice};
use log::{debug, warn};
use std::collections::HashSet;
use std::ffi::CString;
use std::fs::OpenOptions;
use std::path::Path;

/// An open HID handle. Dropping it releases the handle.
pub trait HidTransport {
    /// Write one complete report, report id included
    fn write_report(&mut self, report: &[u8]) -> Result<usize>;

    /// Read one report into `buffer`, waiting at most `timeout_ms`.
    /// Returns 0 if nothing arrived in time.
    fn read_report(&mut self, buffer: &mut [u8], timeout_ms: i32) -> Result<usize>;

    fn set_nonblocking(&mut self, nonblocking: bool) -> Result<()>;
}

/// Opens transports by device node path
pub trait DeviceOpener {
    type Transport: HidTransport;

    fn open(&self, path: &str) -> Result<Self::Transport>;

    /// OS error number explaining why `path` cannot be used, 0 if a plain
    /// read/write open succeeds.
    fn access_status(&self, path: &str) -> i32 {
        match OpenOptions::new().read(true).write(true).open(path) {
            Ok(_) => 0,
            Err(e) => e.raw_os_error().unwrap_or(-1),
        }
    }
}

/// Restricts which candidates discovery reports
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryFilter {
    All,
    /// Exact device node, e.g. `/dev/hidraw3`
    DevNode(String),
    /// Exact kernel device path without the `/sys` prefix
    DevPath(String),
}

/// A device reported by OS discovery, before identification
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceCandidate {
    pub subsystem: String,
    pub devnode: Option<String>,
    pub devpath: Option<String>,
    /// Identity of the parent HID device, `bus:vid:pid` in hex
    pub hid_id: Option<String>,
    pub name: Option<String>,
    pub serial: Option<String>,
}

impl DeviceCandidate {
    pub fn matches(&self, filter: &DiscoveryFilter) -> bool {
        match filter {
            DiscoveryFilter::All => true,
            DiscoveryFilter::DevNode(node) => self.devnode.as_deref() == Some(node.as_str()),
            DiscoveryFilter::DevPath(path) => self.devpath.as_deref() == Some(path.as_str()),
        }
    }
}

/// Lists candidate devices
pub trait DeviceDiscovery {
    fn candidates(&self, filter: &DiscoveryFilter) -> Result<Vec<DeviceCandidate>>;
}

impl HidTransport for RawHidDevice {
    fn write_report(&mut self, report: &[u8]) -> Result<usize> {
        debug!("HID TX: {:02x?}", report);
        self.write(report).map_err(|e| AmbitError::Transport(format!("write failed: {}", e)))
    }

    fn read_report(&mut self, buffer: &mut [u8], timeout_ms: i32) -> Result<usize> {
        let size = self
            .read_timeout(buffer, timeout_ms)
            .map_err(|e| AmbitError::Transport(format!("read failed: {}", e)))?;
        if size > 0 {
            debug!("HID RX: {:02x?}", &buffer[..size]);
        }
        Ok(size)
    }

    fn set_nonblocking(&mut self, nonblocking: bool) -> Result<()> {
        self.set_blocking_mode(!nonblocking)?;
        Ok(())
    }
}

/// `hidapi` backed discovery and opener
pub struct HidApiBackend {
    api: HidApi,
}

impl HidApiBackend {
    pub fn new() -> Result<Self> {
        let api = HidApi::new()?;
        Ok(Self { api })
    }
}

impl DeviceOpener for HidApiBackend {
    type Transport = RawHidDevice;

    fn open(&self, path: &str) -> Result<RawHidDevice> {
        let c_path = CString::new(path)
            .map_err(|_| AmbitError::InvalidArgument(format!("bad device path {:?}", path)))?;
        Ok(self.api.open_path(&c_path)?)
    }
}

impl DeviceDiscovery for HidApiBackend {
    fn candidates(&self, filter: &DiscoveryFilter) -> Result<Vec<DeviceCandidate>> {
        let mut seen = HashSet::new();
        let mut candidates = Vec::new();

        // hidapi lists one entry per usage, the node is what identifies a device
        for info in self.api.device_list() {
            let Ok(devnode) = info.path().to_str() else {
                warn!("skipping HID device with non UTF-8 path");
                continue;
            };
            if !seen.insert(devnode.to_string()) {
                continue;
            }

            let candidate = DeviceCandidate {
                subsystem: "hidraw".to_string(),
                devnode: Some(devnode.to_string()),
                devpath: kernel_devpath(devnode),
                hid_id: Some(format!(
                    "{:04X}:{:08X}:{:08X}",
                    bus_number(info.bus_type()),
                    info.vendor_id(),
                    info.product_id()
                )),
                name: info.product_string().map(str::to_string),
                serial: info.serial_number().map(str::to_string),
            };

            if candidate.matches(filter) {
                candidates.push(candidate);
            }
        }

        Ok(candidates)
    }
}

fn bus_number(bus: BusType) -> u16 {
    match bus {
        BusType::Usb => 0x03,
        BusType::Bluetooth => 0x05,
        BusType::I2c => 0x18,
        BusType::Spi => 0x1c,
        _ => 0x00,
    }
}

/// Kernel device path of a hidraw node, relative to `/sys`
fn kernel_devpath(devnode: &str) -> Option<String> {
    let node = Path::new(devnode).file_name()?;
    let resolved = std::fs::canonicalize(Path::new("/sys/class/hidraw").join(node)).ok()?;
    let resolved = resolved.to_str()?;
    resolved.strip_prefix("/sys").map(str::to_string)
}
