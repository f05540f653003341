// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Matthias Bilger <matthias@bilger.info>

//! PMEM20, the paged memory access used for the activity log and GPS orbit
//! storage.
//!
//! The log lives in a ring at [`PMEM20_LOG_START`]. Its first bytes form a
//! directory (`last, first, entries, next_free`); entries are linked through
//! `prev/next` addresses and laid out as
//!
//! ```text
//! [prev u32][next u32][lead-in len u16][lead-in][header len u16][header][samples...]
//! ```
//!
//! where every sample is a `u16` length followed by that many bytes. Data
//! running past the ring end continues at `start + PMEM20_LOG_WRAP_START_OFFSET`.
//! All memory reads go through a single cached chunk.

use crate::constants::{
    GPS_ORBIT_MIN_LEN, GPS_ORBIT_SIGNATURE_MAP, LOG_HEAD_REPLY_OFFSET, PMEM20_GPS_ORBIT_START,
    PMEM20_LOG_DIRECTORY_LEN, PMEM20_LOG_SIZE, PMEM20_LOG_START, PMEM20_LOG_WRAP_START_OFFSET,
    PMEM20_MORE_HEADERS,
};
use crate::error::{AmbitError, Result};
use crate::log_entry::{LogEntry, LogHeader, Sample};
use crate::protocol::Command;
use crate::session::Session;
use crate::transport::HidTransport;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use log::{debug, info, warn};

const PMEM20_LOG_END: u32 = PMEM20_LOG_START + PMEM20_LOG_SIZE;

/// Length of the address/length echo in front of read data
const READ_REPLY_PREFIX: usize = 8;

/// Log directory stored at the ring start
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LogDirectory {
    pub last_entry: u32,
    pub first_entry: u32,
    pub entries: u32,
    pub next_free: u32,
}

/// Position of the entry-by-entry log walk
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct LogCursor {
    current: u32,
    next: u32,
}

#[derive(Debug)]
struct CachedChunk {
    address: u32,
    data: Bytes,
}

/// Per-session PMEM20 state
#[derive(Debug, Default)]
pub struct Pmem20 {
    chunk_size: u16,
    directory: Option<LogDirectory>,
    cursor: LogCursor,
    /// Header of the entry under the cursor and where its samples start
    selected: Option<(LogHeader, u32)>,
    cache: Option<CachedChunk>,
}

impl Pmem20 {
    pub fn new(chunk_size: u16) -> Self {
        Self {
            chunk_size,
            ..Default::default()
        }
    }

    /// Drop the log walk and cached memory
    pub fn reset(&mut self) {
        self.directory = None;
        self.cursor = LogCursor::default();
        self.selected = None;
        self.cache = None;
    }
}

/// Continue an address inside the log ring
fn ring_address(address: u32) -> u32 {
    if address >= PMEM20_LOG_END {
        PMEM20_LOG_START + PMEM20_LOG_WRAP_START_OFFSET + (address - PMEM20_LOG_END)
    } else {
        address
    }
}

fn read_marker(reply: &[u8], what: &str) -> Result<u32> {
    if reply.len() < 4 {
        return Err(AmbitError::Parse(format!(
            "{} reply too short: {} bytes",
            what,
            reply.len()
        )));
    }
    Ok((&reply[..4]).get_u32_le())
}

impl<T: HidTransport> Session<T> {
    /// Number of log entries stored on the watch
    pub fn log_count(&mut self) -> Result<u16> {
        let reply = self.link.command(Command::LogCount, &[], false)?;
        if reply.len() < 4 {
            return Err(AmbitError::Parse(format!(
                "log count reply too short: {} bytes",
                reply.len()
            )));
        }
        Ok(u16::from_le_bytes([reply[2], reply[3]]))
    }

    /// Reset the header walk; returns the continuation marker
    pub fn rewind_headers(&mut self) -> Result<u32> {
        let reply = self.link.command(Command::LogHeadFirst, &[], false)?;
        read_marker(&reply, "header rewind")
    }

    /// Step the header walk to the next entry and read its header.
    ///
    /// Both header parts are fetched in order, the lead-in is discarded.
    pub fn step_header(&mut self) -> Result<LogHeader> {
        self.link.command(Command::LogHeadStep, &[], false)?;
        self.link.command(Command::LogHead, &[], false)?;
        let reply = self.link.command(Command::LogHead, &[], false)?;

        if reply.len() <= LOG_HEAD_REPLY_OFFSET {
            return Err(AmbitError::Parse(format!(
                "log header reply too short: {} bytes",
                reply.len()
            )));
        }
        LogHeader::parse(&reply[LOG_HEAD_REPLY_OFFSET..])
    }

    /// Whether the header walk has more entries
    pub fn peek_more(&mut self) -> Result<bool> {
        let reply = self.link.command(Command::LogHeadPeek, &[], false)?;
        Ok(read_marker(&reply, "header peek")? == PMEM20_MORE_HEADERS)
    }

    fn require_chunk_size(&self) -> Result<u32> {
        match self.pmem20.chunk_size {
            0 => Err(AmbitError::Unsupported(format!(
                "{} does not support PMEM20 transfers",
                self.descriptor.name
            ))),
            size => Ok(u32::from(size)),
        }
    }

    fn fetch_chunk(&mut self, address: u32) -> Result<()> {
        let chunk_size = self.require_chunk_size()?;
        let length = chunk_size.min(PMEM20_LOG_END - address);

        let mut request = BytesMut::with_capacity(8);
        request.put_u32_le(address);
        request.put_u32_le(length);

        debug!("Reading {} bytes of log memory at {:#010x}", length, address);
        let mut reply = self.link.command(Command::LogRead, &request, false)?;
        if reply.len() < READ_REPLY_PREFIX + length as usize {
            return Err(AmbitError::Parse(format!(
                "log read of {} bytes at {:#010x} returned {} bytes",
                length,
                address,
                reply.len()
            )));
        }
        let echoed = (&reply[..4]).get_u32_le();
        if echoed != address {
            return Err(AmbitError::Parse(format!(
                "log read at {:#010x} answered for {:#010x}",
                address, echoed
            )));
        }
        reply.advance(READ_REPLY_PREFIX);
        reply.truncate(length as usize);

        self.pmem20.cache = Some(CachedChunk { address, data: reply });
        Ok(())
    }

    /// Read `len` bytes of log memory at `address`, following the ring.
    /// Returns the bytes and the address right after them.
    fn read_memory(&mut self, address: u32, len: usize) -> Result<(Vec<u8>, u32)> {
        let chunk_size = self.require_chunk_size()?;
        let mut out = Vec::with_capacity(len);
        let mut address = ring_address(address);

        while out.len() < len {
            if !(PMEM20_LOG_START..PMEM20_LOG_END).contains(&address) {
                return Err(AmbitError::Parse(format!(
                    "log address {:#010x} outside log memory",
                    address
                )));
            }

            let base = PMEM20_LOG_START + (address - PMEM20_LOG_START) / chunk_size * chunk_size;
            let cached = matches!(&self.pmem20.cache, Some(c) if c.address == base);
            if !cached {
                self.fetch_chunk(base)?;
            }
            let Some(chunk) = self.pmem20.cache.as_ref() else {
                return Err(AmbitError::Transport("log chunk missing after read".to_string()));
            };

            let offset = (address - base) as usize;
            let take = (len - out.len()).min(chunk.data.len() - offset);
            out.extend_from_slice(&chunk.data[offset..offset + take]);
            address = ring_address(address + take as u32);
        }

        Ok((out, address))
    }

    fn read_u16(&mut self, address: u32) -> Result<(u16, u32)> {
        let (raw, next) = self.read_memory(address, 2)?;
        Ok((u16::from_le_bytes([raw[0], raw[1]]), next))
    }

    fn read_u32(&mut self, address: u32) -> Result<(u32, u32)> {
        let (raw, next) = self.read_memory(address, 4)?;
        Ok((u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]), next))
    }

    /// Load the log directory and place the cursor before the first entry
    pub fn init_log_read(&mut self) -> Result<LogDirectory> {
        self.pmem20.reset();
        let (raw, _) = self.read_memory(PMEM20_LOG_START, PMEM20_LOG_DIRECTORY_LEN)?;
        let mut buf = &raw[..];
        let directory = LogDirectory {
            last_entry: buf.get_u32_le(),
            first_entry: buf.get_u32_le(),
            entries: buf.get_u32_le(),
            next_free: buf.get_u32_le(),
        };
        debug!("Log directory: {:?}", directory);

        self.pmem20.directory = Some(directory);
        self.pmem20.cursor = LogCursor {
            current: PMEM20_LOG_START,
            next: if directory.entries == 0 { 0 } else { directory.first_entry },
        };
        Ok(directory)
    }

    /// Move to the next entry and decode its header; `None` when the log
    /// is exhausted.
    pub fn next_header(&mut self) -> Result<Option<LogHeader>> {
        if self.pmem20.directory.is_none() {
            return Err(AmbitError::InvalidArgument(
                "log read not initialised".to_string(),
            ));
        }

        let cursor = self.pmem20.cursor;
        if cursor.next == 0 || cursor.next == cursor.current {
            return Ok(None);
        }

        self.pmem20.selected = None;
        let current = cursor.next;
        let (_prev, address) = self.read_u32(current)?;
        let (next, address) = self.read_u32(address)?;

        let (lead_in_len, address) = self.read_u16(address)?;
        let address = ring_address(address + u32::from(lead_in_len));

        let (header_len, address) = self.read_u16(address)?;
        let (raw_header, samples_address) = self.read_memory(address, usize::from(header_len))?;
        let header = LogHeader::parse(&raw_header)?;

        self.pmem20.cursor = LogCursor { current, next };
        self.pmem20.selected = Some((header.clone(), samples_address));
        Ok(Some(header))
    }

    /// Read all samples of the entry whose header was last returned by
    /// [`Session::next_header`]. Any decoding failure discards the entry.
    pub fn read_entry(&mut self) -> Result<LogEntry> {
        let Some((header, mut address)) = self.pmem20.selected.take() else {
            return Err(AmbitError::InvalidArgument(
                "no log entry selected".to_string(),
            ));
        };

        // the count comes from device memory, samples are only stored as they decode
        let mut samples = Vec::new();
        for index in 0..header.samples_count {
            let (len, body) = self.read_u16(address)?;
            if len == 0 {
                return Err(AmbitError::Parse(format!("sample {} has zero length", index)));
            }
            let (raw, next) = self.read_memory(body, usize::from(len))?;
            samples.push(Sample::parse(&raw)?);
            address = next;
        }

        Ok(LogEntry { header, samples })
    }

    /// Signature of the orbit data currently stored on the watch
    pub fn gps_orbit_header(&mut self) -> Result<[u8; 8]> {
        let reply = self
            .link
            .command(Command::GpsOrbitHead, &[], false)
            .inspect_err(|e| warn!("Failed to read GPS orbit header: {}", e))?;
        if reply.len() < 9 {
            warn!("Failed to read GPS orbit header");
            return Err(AmbitError::Parse(format!(
                "GPS orbit header reply too short: {} bytes",
                reply.len()
            )));
        }
        let mut header = [0u8; 8];
        header.copy_from_slice(&reply[1..9]);
        Ok(header)
    }

    /// Store orbit data, one chunk per write command
    pub fn gps_orbit_write(&mut self, data: &[u8]) -> Result<()> {
        let chunk_size = self.require_chunk_size()? as usize;

        info!("Writing GPS orbit data ({} bytes)", data.len());
        self.link.command(Command::WriteStart, &[], false)?;

        let mut address = PMEM20_GPS_ORBIT_START;
        for chunk in data.chunks(chunk_size) {
            let mut request = BytesMut::with_capacity(8 + chunk.len());
            request.put_u32_le(address);
            request.put_u32_le(chunk.len() as u32);
            request.put_slice(chunk);
            self.link.command(Command::DataWrite, &request, false)?;
            address += chunk.len() as u32;
        }

        self.link
            .command(Command::DataTailLen, &(data.len() as u32).to_le_bytes(), false)?;
        Ok(())
    }

    /// Upload orbit data unless the watch already holds the same data
    pub fn sync_gps_orbit(&mut self, data: &[u8]) -> Result<()> {
        if data.len() < GPS_ORBIT_MIN_LEN {
            return Err(AmbitError::InvalidArgument(format!(
                "GPS orbit data too short: {} bytes",
                data.len()
            )));
        }

        let current = self.gps_orbit_header()?;
        let candidate = GPS_ORBIT_SIGNATURE_MAP.map(|i| data[i]);

        if current == candidate {
            info!("Current GPS orbit data is already up to date, skipping");
            return Ok(());
        }
        self.gps_orbit_write(data)
    }
}
