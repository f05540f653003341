// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Matthias Bilger <matthias@bilger.info>

//! Command/response framing.
//!
//! A message is a 10 byte header followed by the payload, split over as many
//! 64 byte HID reports as needed:
//!
//! ```text
//! report:  [0x3f][len][marker][n][u16 parts|index][data; n][crc16]
//! message: [command u16 BE][direction][status][sequence u16][length u32][payload]
//! ```
//!
//! `marker` is 0x5d on the first report of a message (which carries the
//! total report count) and 0x5e on continuation reports (which carry their
//! index). All multi-byte report and header fields except the command code
//! are little endian.

use crate::constants::{
    HID_REPORT_ID, KOMPOSTI_VERSION, LONG_REPLY_TIMEOUT_MS, REPLY_TIMEOUT_MS, REPORT_SIZE,
};
use crate::device::DeviceIdentity;
use crate::error::{AmbitError, Result};
use crate::known_devices::FirmwareVersion;
use crate::transport::HidTransport;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use log::{debug, info, warn};
use std::time::{Duration, Instant};

const FIRST_PART: u8 = 0x5d;
const NEXT_PART: u8 = 0x5e;

/// Bytes of part header following the report id and length byte
const PART_HEADER_LEN: usize = 4;
const PART_CRC_LEN: usize = 2;

/// Maximum message bytes carried by one report
pub const MAX_PART_DATA: usize = REPORT_SIZE - 2 - PART_HEADER_LEN - PART_CRC_LEN;

pub const MESSAGE_HEADER_LEN: usize = 10;

/// Length of the device info reply layout
const DEVICE_INFO_LEN: usize = 40;

/// Command codes understood by the watch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum Command {
    DeviceInfo = 0x0000,
    Time = 0x0300,
    Date = 0x0302,
    Status = 0x0306,
    PersonalSettings = 0x0b00,
    LogCount = 0x0b06,
    LogHeadFirst = 0x0b07,
    LogHeadStep = 0x0b08,
    LogHeadPeek = 0x0b0a,
    LogHead = 0x0b0b,
    WriteStart = 0x0b15,
    DataWrite = 0x0b16,
    LogRead = 0x0b17,
    DataTailLen = 0x0b18,
    LockCheck = 0x0b19,
    LockSet = 0x0b1a,
    GpsOrbitHead = 0x1015,
}

impl From<Command> for u16 {
    fn from(val: Command) -> Self {
        val as u16
    }
}

impl TryFrom<u16> for Command {
    type Error = AmbitError;

    fn try_from(val: u16) -> Result<Self> {
        let command = match val {
            0x0000 => Command::DeviceInfo,
            0x0300 => Command::Time,
            0x0302 => Command::Date,
            0x0306 => Command::Status,
            0x0b00 => Command::PersonalSettings,
            0x0b06 => Command::LogCount,
            0x0b07 => Command::LogHeadFirst,
            0x0b08 => Command::LogHeadStep,
            0x0b0a => Command::LogHeadPeek,
            0x0b0b => Command::LogHead,
            0x0b15 => Command::WriteStart,
            0x0b16 => Command::DataWrite,
            0x0b17 => Command::LogRead,
            0x0b18 => Command::DataTailLen,
            0x0b19 => Command::LockCheck,
            0x0b1a => Command::LockSet,
            0x1015 => Command::GpsOrbitHead,
            other => return Err(AmbitError::Parse(format!("unknown command {:#06x}", other))),
        };
        Ok(command)
    }
}

/// Message direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Direction {
    Request = 0x01,
    Reply = 0x02,
}

/// Fixed header in front of every message payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader {
    pub command: u16,
    pub direction: Direction,
    /// 0 on success, only meaningful in replies
    pub status: u8,
    pub sequence: u16,
    pub length: u32,
}

impl MessageHeader {
    pub fn request(command: Command, sequence: u16, length: usize) -> Self {
        Self {
            command: command.into(),
            direction: Direction::Request,
            status: 0,
            sequence,
            length: length as u32,
        }
    }

    pub fn reply(command: u16, sequence: u16, status: u8, length: usize) -> Self {
        Self {
            command,
            direction: Direction::Reply,
            status,
            sequence,
            length: length as u32,
        }
    }

    fn put(&self, buf: &mut BytesMut) {
        buf.put_u16(self.command);
        buf.put_u8(self.direction as u8);
        buf.put_u8(self.status);
        buf.put_u16_le(self.sequence);
        buf.put_u32_le(self.length);
    }

    fn parse(mut buf: &[u8]) -> Result<Self> {
        if buf.len() < MESSAGE_HEADER_LEN {
            return Err(AmbitError::Transport(format!(
                "message too short: {} bytes",
                buf.len()
            )));
        }
        let command = buf.get_u16();
        let direction = match buf.get_u8() {
            0x01 => Direction::Request,
            0x02 => Direction::Reply,
            other => {
                return Err(AmbitError::Transport(format!("bad message direction {:#04x}", other)))
            }
        };
        Ok(Self {
            command,
            direction,
            status: buf.get_u8(),
            sequence: buf.get_u16_le(),
            length: buf.get_u32_le(),
        })
    }
}

/// CRC-16/CCITT-FALSE
pub fn crc16(bytes: &[u8]) -> u16 {
    let mut crc: u16 = 0xFFFF;
    for &b in bytes {
        crc ^= (b as u16) << 8;
        for _ in 0..8 {
            if (crc & 0x8000) != 0 {
                crc = (crc << 1) ^ 0x1021;
            } else {
                crc <<= 1;
            }
        }
    }
    crc
}

/// Split a message into HID reports
pub fn encode_message(header: &MessageHeader, payload: &[u8]) -> Vec<[u8; REPORT_SIZE]> {
    let mut message = BytesMut::with_capacity(MESSAGE_HEADER_LEN + payload.len());
    header.put(&mut message);
    message.put_slice(payload);

    let parts: Vec<&[u8]> = message.chunks(MAX_PART_DATA).collect();
    let total = parts.len() as u16;

    parts
        .iter()
        .enumerate()
        .map(|(index, data)| {
            let mut report = [0u8; REPORT_SIZE];
            let (marker, counter) = if index == 0 {
                (FIRST_PART, total)
            } else {
                (NEXT_PART, index as u16)
            };
            report[0] = HID_REPORT_ID;
            report[1] = (PART_HEADER_LEN + data.len() + PART_CRC_LEN) as u8;
            report[2] = marker;
            report[3] = data.len() as u8;
            report[4..6].copy_from_slice(&counter.to_le_bytes());
            report[6..6 + data.len()].copy_from_slice(data);
            let crc = crc16(&report[2..6 + data.len()]);
            report[6 + data.len()..8 + data.len()].copy_from_slice(&crc.to_le_bytes());
            report
        })
        .collect()
}

/// Collects reports until a complete message is available
#[derive(Debug, Default)]
pub struct MessageAssembler {
    buffer: BytesMut,
    expected_parts: u16,
    received_parts: u16,
}

impl MessageAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one report; returns the message once its last report arrived
    pub fn push(&mut self, report: &[u8]) -> Result<Option<(MessageHeader, Bytes)>> {
        if report.len() < 2 + PART_HEADER_LEN + PART_CRC_LEN || report[0] != HID_REPORT_ID {
            return Err(AmbitError::Transport(format!(
                "malformed report ({} bytes)",
                report.len()
            )));
        }

        let data_len = report[3] as usize;
        let end = 6 + data_len;
        if data_len > MAX_PART_DATA || report.len() < end + PART_CRC_LEN {
            return Err(AmbitError::Transport(format!("bad report length {}", data_len)));
        }

        let crc = u16::from_le_bytes([report[end], report[end + 1]]);
        if crc != crc16(&report[2..end]) {
            return Err(AmbitError::Transport("report checksum mismatch".to_string()));
        }

        let counter = u16::from_le_bytes([report[4], report[5]]);
        match report[2] {
            FIRST_PART => {
                if counter == 0 {
                    return Err(AmbitError::Transport("message without parts".to_string()));
                }
                self.buffer.clear();
                self.expected_parts = counter;
                self.received_parts = 0;
            }
            NEXT_PART => {
                if self.expected_parts == 0 || counter != self.received_parts {
                    return Err(AmbitError::Transport(format!(
                        "unexpected continuation report {}",
                        counter
                    )));
                }
            }
            other => {
                return Err(AmbitError::Transport(format!("bad report marker {:#04x}", other)));
            }
        }

        self.buffer.put_slice(&report[6..end]);
        self.received_parts += 1;

        if self.received_parts < self.expected_parts {
            return Ok(None);
        }

        self.expected_parts = 0;
        let mut message = self.buffer.split().freeze();
        let header = MessageHeader::parse(&message)?;
        message.advance(MESSAGE_HEADER_LEN);
        if message.len() != header.length as usize {
            return Err(AmbitError::Transport(format!(
                "size mismatch: header says {} bytes, got {}",
                header.length,
                message.len()
            )));
        }
        Ok(Some((header, message)))
    }
}

/// Minimal protocol state: an open handle and its sequence counter.
///
/// This is all identification needs; a [`crate::Session`] wraps one.
pub struct Link<T: HidTransport> {
    transport: T,
    sequence_no: u16,
}

impl<T: HidTransport> Link<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            sequence_no: 0,
        }
    }

    pub fn sequence_no(&self) -> u16 {
        self.sequence_no
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Send one command and wait for its reply payload.
    ///
    /// Only one request is ever in flight; the reply must carry the same
    /// command and sequence number.
    pub fn command(&mut self, command: Command, payload: &[u8], long_timeout: bool) -> Result<Bytes> {
        let sequence = self.sequence_no;
        self.sequence_no = self.sequence_no.wrapping_add(1);

        let header = MessageHeader::request(command, sequence, payload.len());
        for report in encode_message(&header, payload) {
            self.transport.write_report(&report)?;
        }

        let timeout = if long_timeout {
            LONG_REPLY_TIMEOUT_MS
        } else {
            REPLY_TIMEOUT_MS
        };
        let deadline = Instant::now() + Duration::from_millis(timeout);
        let mut assembler = MessageAssembler::new();

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(AmbitError::Transport(format!(
                    "no reply to {:?} within {} ms",
                    command, timeout
                )));
            }

            let mut report = [0u8; REPORT_SIZE];
            let size = self
                .transport
                .read_report(&mut report, remaining.as_millis() as i32)?;
            if size == 0 {
                continue;
            }

            let Some((reply, data)) = assembler.push(&report[..size])? else {
                continue;
            };

            if reply.direction != Direction::Reply || reply.command != u16::from(command) {
                return Err(AmbitError::Transport(format!(
                    "reply to {:#06x} while waiting for {:?}",
                    reply.command, command
                )));
            }
            if reply.sequence != sequence {
                return Err(AmbitError::Transport(format!(
                    "sequence mismatch: sent {}, got {}",
                    sequence, reply.sequence
                )));
            }
            if reply.status != 0 {
                return Err(AmbitError::Transport(format!(
                    "{:?} failed with status {:#04x}",
                    command, reply.status
                )));
            }

            debug!("{:?} replied with {} bytes", command, data.len());
            return Ok(data);
        }
    }

    /// Model, serial and versions straight from the firmware
    pub fn device_info(&mut self) -> Result<DeviceIdentity> {
        info!("Reading device info");

        let reply = self
            .command(Command::DeviceInfo, &KOMPOSTI_VERSION, true)
            .inspect_err(|e| warn!("Failed to read device info: {}", e))?;

        if reply.len() < DEVICE_INFO_LEN {
            return Err(AmbitError::Parse(format!(
                "device info reply too short: {} bytes",
                reply.len()
            )));
        }

        let mut fw_version = [0u8; 4];
        let mut hw_version = [0u8; 4];
        fw_version.copy_from_slice(&reply[32..36]);
        hw_version.copy_from_slice(&reply[36..40]);

        Ok(DeviceIdentity {
            model: fixed_string(&reply[0..16]),
            serial: fixed_string(&reply[16..32]),
            fw_version: FirmwareVersion(fw_version),
            hw_version: FirmwareVersion(hw_version),
        })
    }
}

/// Decode a NUL padded fixed-width string field
pub(crate) fn fixed_string(raw: &[u8]) -> String {
    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    String::from_utf8_lossy(&raw[..end]).trim_end().to_string()
}
