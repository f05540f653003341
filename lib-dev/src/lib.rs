// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Matthias Bilger <matthias@bilger.info>

//! # Ambit HID Communication Library
//!
//! Host side of the Suunto Ambit USB HID protocol:
//! - Device discovery and identification against a capability table
//! - Sequence-numbered command/response sessions
//! - PMEM20 chunked memory access for the activity log and GPS orbit data
//! - Differential log download with skip/push/progress callbacks

pub mod constants;
pub mod device;
pub mod error;
pub mod known_devices;
pub mod log_entry;
pub mod log_sync;
pub mod pmem20;
pub mod protocol;
pub mod session;
pub mod settings;
pub mod transport;

// Re-export commonly used types
pub use constants::*;
pub use device::{enumerate, enumerate_with, identify, parse_hid_id, DeviceDescriptor, DeviceIdentity};
pub use error::{AmbitError, Result};
pub use known_devices::{
    check_table_order, find_known_device, find_known_device_in, is_known_vid_pid, FirmwareVersion,
    KnownDevice, KNOWN_DEVICES,
};
pub use log_entry::{LogEntry, LogHeader, PeriodicValue, Sample, Satellite};
pub use log_sync::{LogCallbacks, Progress};
pub use pmem20::LogDirectory;
pub use protocol::{Command, Link};
pub use session::Session;
pub use settings::{DeviceStatus, PersonalSettings};
pub use transport::{
    DeviceCandidate, DeviceDiscovery, DeviceOpener, DiscoveryFilter, HidApiBackend, HidTransport,
};
