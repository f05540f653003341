// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Matthias Bilger <matthias@bilger.info>

//! A simulated watch speaking the report protocol, for driving sessions in
//! tests without hardware.

#![allow(dead_code)]

use ambit_hid::protocol::{encode_message, MessageAssembler, MessageHeader};
use ambit_hid::{
    AmbitError, Command, DeviceCandidate, DeviceDescriptor, DeviceDiscovery, DeviceOpener,
    DiscoveryFilter, FirmwareVersion, HidTransport, Result, Session, PMEM20_LOG_SIZE,
    PMEM20_LOG_START, PMEM20_LOG_WRAP_START_OFFSET, PMEM20_MORE_HEADERS, REPORT_SIZE,
};
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

pub const LOG_END: u32 = PMEM20_LOG_START + PMEM20_LOG_SIZE;

/// First entry address used by [`SimulatedWatch::install_logs`]
pub const FIRST_ENTRY: u32 = PMEM20_LOG_START + PMEM20_LOG_WRAP_START_OFFSET;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// One stored activity as the watch keeps it
#[derive(Debug, Clone)]
pub struct StoredLog {
    pub lead_in: Vec<u8>,
    pub header: Vec<u8>,
    /// Sample bodies, type byte first
    pub samples: Vec<Vec<u8>>,
}

impl StoredLog {
    /// A log starting at the given day of January 2024 with periodic samples
    pub fn on_day(day: u8, samples: usize) -> Self {
        let bodies: Vec<Vec<u8>> = (0..samples)
            .map(|i| periodic_sample(&[(0x0001, 100 + i as u32), (0x0002, 60 + i as u32)]))
            .collect();
        Self {
            lead_in: vec![0xaa; 12],
            header: header_bytes(2024, 1, day, 8, 30, bodies.len() as u32, "Running"),
            samples: bodies,
        }
    }

    pub fn with_samples(mut self, samples: Vec<Vec<u8>>) -> Self {
        self.header[39..43].copy_from_slice(&(samples.len() as u32).to_le_bytes());
        self.samples = samples;
        self
    }

    fn encoded_len(&self) -> usize {
        8 + 2
            + self.lead_in.len()
            + 2
            + self.header.len()
            + self.samples.iter().map(|s| 2 + s.len()).sum::<usize>()
    }
}

/// Encode a log header in the watch layout
pub fn header_bytes(year: u16, month: u8, day: u8, hour: u8, minute: u8, samples: u32, name: &str) -> Vec<u8> {
    let mut h = Vec::with_capacity(43);
    h.extend_from_slice(&year.to_le_bytes());
    h.extend_from_slice(&[month, day, hour, minute]);
    h.extend_from_slice(&12_000u16.to_le_bytes());
    h.extend_from_slice(&3_600_000u32.to_le_bytes());
    h.extend_from_slice(&120u16.to_le_bytes());
    h.extend_from_slice(&115u16.to_le_bytes());
    h.extend_from_slice(&10_500u32.to_le_bytes());
    h.extend_from_slice(&[142, 171, 3]);
    let mut raw_name = [0u8; 16];
    raw_name[..name.len()].copy_from_slice(name.as_bytes());
    h.extend_from_slice(&raw_name);
    h.extend_from_slice(&samples.to_le_bytes());
    h
}

pub fn periodic_sample(values: &[(u16, u32)]) -> Vec<u8> {
    let mut s = vec![0x02];
    for (kind, value) in values {
        s.extend_from_slice(&kind.to_le_bytes());
        s.extend_from_slice(&value.to_le_bytes());
    }
    s
}

pub fn gps_base_sample(satellites: &[(u8, u8, u8)]) -> Vec<u8> {
    let mut s = vec![0x0a];
    s.extend_from_slice(&601_234_567i32.to_le_bytes());
    s.extend_from_slice(&249_876_543i32.to_le_bytes());
    s.extend_from_slice(&1_500i32.to_le_bytes());
    s.push(satellites.len() as u8);
    for (sv, state, snr) in satellites {
        s.extend_from_slice(&[*sv, *state, *snr]);
    }
    s
}

#[derive(Default)]
struct WatchState {
    assembler: MessageAssembler,
    outgoing: VecDeque<[u8; REPORT_SIZE]>,
    commands: Vec<(Command, Vec<u8>)>,
    failing: HashSet<Command>,
    sequence_offset: u16,
    nonblocking: bool,

    device_info: Vec<u8>,
    charge: u8,
    personal_settings: Vec<u8>,
    lock: u32,

    log_count: u16,
    logs: Vec<StoredLog>,
    head_pos: usize,
    head_part: usize,
    memory: Vec<u8>,

    orbit_header: [u8; 8],
}

/// Cloneable handle to one simulated watch
#[derive(Clone, Default)]
pub struct SimulatedWatch {
    state: Arc<Mutex<WatchState>>,
}

impl SimulatedWatch {
    pub fn new() -> Self {
        let watch = Self::default();
        watch.set_device_info("Colibri", "ABC123", [1, 1, 2, 0], [64, 0, 0, 0]);
        watch.state().charge = 87;
        watch
    }

    fn state(&self) -> MutexGuard<'_, WatchState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set_device_info(&self, model: &str, serial: &str, fw: [u8; 4], hw: [u8; 4]) {
        let mut reply = vec![0u8; 40];
        reply[..model.len()].copy_from_slice(model.as_bytes());
        reply[16..16 + serial.len()].copy_from_slice(serial.as_bytes());
        reply[32..36].copy_from_slice(&fw);
        reply[36..40].copy_from_slice(&hw);
        self.state().device_info = reply;
    }

    pub fn set_raw_device_info(&self, reply: Vec<u8>) {
        self.state().device_info = reply;
    }

    pub fn set_personal_settings(&self, raw: Vec<u8>) {
        self.state().personal_settings = raw;
    }

    pub fn set_lock(&self, lock: u32) {
        self.state().lock = lock;
    }

    pub fn lock(&self) -> u32 {
        self.state().lock
    }

    pub fn set_orbit_header(&self, header: [u8; 8]) {
        self.state().orbit_header = header;
    }

    pub fn set_log_count(&self, count: u16) {
        self.state().log_count = count;
    }

    /// Reply to `command` with a failure status from now on
    pub fn fail(&self, command: Command) {
        self.state().failing.insert(command);
    }

    /// Answer with sequence numbers shifted by `offset`
    pub fn shift_sequence(&self, offset: u16) {
        self.state().sequence_offset = offset;
    }

    pub fn is_nonblocking(&self) -> bool {
        self.state().nonblocking
    }

    pub fn commands(&self) -> Vec<Command> {
        self.state().commands.iter().map(|(c, _)| *c).collect()
    }

    pub fn payloads(&self, command: Command) -> Vec<Vec<u8>> {
        self.state()
            .commands
            .iter()
            .filter(|(c, _)| *c == command)
            .map(|(_, p)| p.clone())
            .collect()
    }

    pub fn count(&self, command: Command) -> usize {
        self.commands().iter().filter(|c| **c == command).count()
    }

    /// Store `logs` linked one after another, starting at `first`
    pub fn install_logs(&self, logs: Vec<StoredLog>, first: u32) {
        let mut state = self.state();
        state.memory = vec![0u8; PMEM20_LOG_SIZE as usize];

        let mut address = first;
        let mut previous = PMEM20_LOG_START;
        let mut last = first;
        for (i, log) in logs.iter().enumerate() {
            let next = if i + 1 == logs.len() {
                0
            } else {
                ring(address + log.encoded_len() as u32)
            };

            let mut raw = Vec::with_capacity(log.encoded_len());
            raw.extend_from_slice(&previous.to_le_bytes());
            raw.extend_from_slice(&next.to_le_bytes());
            raw.extend_from_slice(&(log.lead_in.len() as u16).to_le_bytes());
            raw.extend_from_slice(&log.lead_in);
            raw.extend_from_slice(&(log.header.len() as u16).to_le_bytes());
            raw.extend_from_slice(&log.header);
            for sample in &log.samples {
                raw.extend_from_slice(&(sample.len() as u16).to_le_bytes());
                raw.extend_from_slice(sample);
            }
            write_ring(&mut state.memory, address, &raw);

            last = address;
            previous = address;
            address = ring(address + raw.len() as u32);
        }

        let mut directory = Vec::new();
        directory.extend_from_slice(&last.to_le_bytes());
        directory.extend_from_slice(&first.to_le_bytes());
        directory.extend_from_slice(&(logs.len() as u32).to_le_bytes());
        directory.extend_from_slice(&address.to_le_bytes());
        state.memory[..16].copy_from_slice(&directory);

        state.log_count = logs.len() as u16;
        state.logs = logs;
    }

    pub fn descriptor(&self, chunk_size: u16) -> DeviceDescriptor {
        DeviceDescriptor {
            path: "/dev/hidraw7".to_string(),
            vendor_id: 0x1493,
            product_id: 0x001a,
            name: "Suunto Ambit2 S".to_string(),
            serial: "ABC123".to_string(),
            model: "Colibri".to_string(),
            fw_version: FirmwareVersion([1, 1, 2, 0]),
            hw_version: FirmwareVersion([64, 0, 0, 0]),
            access_status: 0,
            is_supported: true,
            chunk_size,
        }
    }

    /// Open a session on this watch
    pub fn session(&self, chunk_size: u16) -> Session<SimulatedWatch> {
        let opener = SimulatedOpener::new(self.clone());
        match Session::open(&opener, &self.descriptor(chunk_size)) {
            Ok(Some(session)) => session,
            Ok(None) => panic!("session refused"),
            Err(e) => panic!("session failed: {}", e),
        }
    }

    fn respond(state: &mut WatchState, header: MessageHeader, payload: &[u8]) {
        let command = match Command::try_from(header.command) {
            Ok(command) => command,
            Err(_) => return,
        };
        state.commands.push((command, payload.to_vec()));

        let sequence = header.sequence.wrapping_add(state.sequence_offset);
        if state.failing.contains(&command) {
            let reply = MessageHeader::reply(header.command, sequence, 1, 0);
            state.outgoing.extend(encode_message(&reply, &[]));
            return;
        }

        let data = Self::reply_data(state, command, payload);
        let reply = MessageHeader::reply(header.command, sequence, 0, data.len());
        state.outgoing.extend(encode_message(&reply, &data));
    }

    fn reply_data(state: &mut WatchState, command: Command, payload: &[u8]) -> Vec<u8> {
        match command {
            Command::DeviceInfo => state.device_info.clone(),
            Command::Status => vec![0x00, state.charge, 0x00, 0x00],
            Command::PersonalSettings => state.personal_settings.clone(),
            Command::LockCheck => state.lock.to_le_bytes().to_vec(),
            Command::LockSet => {
                state.lock = u32::from(payload.first().copied().unwrap_or(0));
                Vec::new()
            }
            Command::LogCount => {
                let mut reply = vec![0u8, 0u8];
                reply.extend_from_slice(&state.log_count.to_le_bytes());
                reply
            }
            Command::LogHeadFirst => {
                state.head_pos = 0;
                let more = if state.logs.is_empty() { 0 } else { PMEM20_MORE_HEADERS };
                more.to_le_bytes().to_vec()
            }
            Command::LogHeadStep => {
                state.head_pos += 1;
                state.head_part = 0;
                vec![0u8; 4]
            }
            Command::LogHead => {
                let Some(log) = state.head_pos.checked_sub(1).and_then(|i| state.logs.get(i)) else {
                    return vec![0u8; 8];
                };
                let part = if state.head_part == 0 {
                    log.lead_in.clone()
                } else {
                    log.header.clone()
                };
                state.head_part += 1;
                let mut reply = vec![0u8; 8];
                reply.extend_from_slice(&part);
                reply
            }
            Command::LogHeadPeek => {
                let more = if state.head_pos < state.logs.len() { PMEM20_MORE_HEADERS } else { 0 };
                more.to_le_bytes().to_vec()
            }
            Command::LogRead => {
                let address = u32::from_le_bytes([payload[0], payload[1], payload[2], payload[3]]);
                let length = u32::from_le_bytes([payload[4], payload[5], payload[6], payload[7]]);
                let offset = (address - PMEM20_LOG_START) as usize;
                let mut reply = payload[..8].to_vec();
                reply.extend_from_slice(&state.memory[offset..offset + length as usize]);
                reply
            }
            Command::GpsOrbitHead => {
                let mut reply = vec![0u8];
                reply.extend_from_slice(&state.orbit_header);
                reply
            }
            Command::Date
            | Command::Time
            | Command::WriteStart
            | Command::DataWrite
            | Command::DataTailLen => Vec::new(),
        }
    }
}

fn ring(address: u32) -> u32 {
    if address >= LOG_END {
        FIRST_ENTRY + (address - LOG_END)
    } else {
        address
    }
}

fn write_ring(memory: &mut [u8], address: u32, bytes: &[u8]) {
    let mut address = address;
    for &b in bytes {
        memory[(address - PMEM20_LOG_START) as usize] = b;
        address = ring(address + 1);
    }
}

impl HidTransport for SimulatedWatch {
    fn write_report(&mut self, report: &[u8]) -> Result<usize> {
        let mut state = self.state();
        if let Some((header, payload)) = state.assembler.push(report)? {
            Self::respond(&mut state, header, &payload);
        }
        Ok(report.len())
    }

    fn read_report(&mut self, buffer: &mut [u8], _timeout_ms: i32) -> Result<usize> {
        match self.state().outgoing.pop_front() {
            Some(report) => {
                buffer[..REPORT_SIZE].copy_from_slice(&report);
                Ok(REPORT_SIZE)
            }
            None => Ok(0),
        }
    }

    fn set_nonblocking(&mut self, nonblocking: bool) -> Result<()> {
        self.state().nonblocking = nonblocking;
        Ok(())
    }
}

/// Opens the simulated watch, or fails with a configured OS error
#[derive(Clone, Default)]
pub struct SimulatedOpener {
    pub watch: SimulatedWatch,
    pub open_error: Option<i32>,
    pub opened: Arc<Mutex<Vec<String>>>,
}

impl SimulatedOpener {
    pub fn new(watch: SimulatedWatch) -> Self {
        Self {
            watch,
            open_error: None,
            opened: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn failing(watch: SimulatedWatch, errno: i32) -> Self {
        Self {
            open_error: Some(errno),
            ..Self::new(watch)
        }
    }

    pub fn opened(&self) -> Vec<String> {
        self.opened.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl DeviceOpener for SimulatedOpener {
    type Transport = SimulatedWatch;

    fn open(&self, path: &str) -> Result<SimulatedWatch> {
        self.opened
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(path.to_string());
        match self.open_error {
            Some(errno) => Err(AmbitError::Transport(format!("open failed (errno {})", errno))),
            None => Ok(self.watch.clone()),
        }
    }

    fn access_status(&self, _path: &str) -> i32 {
        self.open_error.unwrap_or(0)
    }
}

/// Discovery over a fixed candidate list
pub struct StaticDiscovery(pub Vec<DeviceCandidate>);

impl DeviceDiscovery for StaticDiscovery {
    fn candidates(&self, filter: &DiscoveryFilter) -> Result<Vec<DeviceCandidate>> {
        Ok(self.0.iter().filter(|c| c.matches(filter)).cloned().collect())
    }
}

/// A hidraw candidate for a Suunto product id
pub fn candidate(node: &str, product_id: u16) -> DeviceCandidate {
    DeviceCandidate {
        subsystem: "hidraw".to_string(),
        devnode: Some(node.to_string()),
        devpath: Some(format!("/devices/usb1/1-2/{}", node.trim_start_matches("/dev/"))),
        hid_id: Some(format!("0003:00001493:{:08X}", product_id)),
        name: Some("Suunto Ambit2 S".to_string()),
        serial: Some("ABC123".to_string()),
    }
}
