// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Matthias Bilger <matthias@bilger.info>

/// USB vendor id of every supported watch
pub const SUUNTO_USB_VENDOR_ID: u16 = 0x1493;

/// Size of a single HID report, report id included
pub const REPORT_SIZE: usize = 64;

/// HID report id used for both directions
pub const HID_REPORT_ID: u8 = 0x3f;

/// Reply wait for ordinary commands in milliseconds
pub const REPLY_TIMEOUT_MS: u64 = 1000;

/// Reply wait for commands flagged as slow on-device
pub const LONG_REPLY_TIMEOUT_MS: u64 = 5000;

/// Protocol version announced with the device info request
pub const KOMPOSTI_VERSION: [u8; 4] = [0x01, 0x08, 0x01, 0x00];

/// Continuation marker returned while more log headers remain
pub const PMEM20_MORE_HEADERS: u32 = 0x0000_0400;

/// Start address of the log ring in PMEM20 memory
pub const PMEM20_LOG_START: u32 = 0x000f_4240;

/// Size of the log ring, directory included
pub const PMEM20_LOG_SIZE: u32 = 0x0029_f630;

/// Offset from the ring start where wrapped log data continues
pub const PMEM20_LOG_WRAP_START_OFFSET: u32 = 0x0000_0030;

/// Length of the log directory at the ring start
pub const PMEM20_LOG_DIRECTORY_LEN: usize = 16;

/// Start address of GPS orbit storage
pub const PMEM20_GPS_ORBIT_START: u32 = 0x0007_04f0;

/// Bytes preceding the header data in a `log_head` reply
pub const LOG_HEAD_REPLY_OFFSET: usize = 8;

/// Smallest candidate orbit payload covering the signature bytes
pub const GPS_ORBIT_MIN_LEN: usize = 14;

/// Payload offsets forming the orbit signature, in device order
pub const GPS_ORBIT_SIGNATURE_MAP: [usize; 8] = [7, 6, 8, 9, 13, 12, 11, 10];
