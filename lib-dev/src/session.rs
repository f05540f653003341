// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Matthias Bilger <matthias@bilger.info>

use crate::device::{identify, DeviceDescriptor, DeviceIdentity};
use crate::error::{AmbitError, Result};
use crate::pmem20::Pmem20;
use crate::protocol::{Command, Link};
use crate::settings::{DeviceStatus, PersonalSettings};
use crate::transport::{DeviceDiscovery, DeviceOpener, DiscoveryFilter, HidTransport};
use bytes::Buf;
use chrono::{Datelike, NaiveDateTime, Timelike};
use hidapi::HidDevice as RawHidDevice;
use log::{error, info, warn};

/// An open connection to one supported watch.
///
/// A session is a strictly sequential request/reply channel and must not
/// be shared between threads without external locking.
pub struct Session<T: HidTransport = RawHidDevice> {
    pub(crate) link: Link<T>,
    pub(crate) descriptor: DeviceDescriptor,
    pub(crate) pmem20: Pmem20,
    closed: bool,
}

impl<T: HidTransport> Session<T> {
    /// Open a session for an identified device.
    ///
    /// Returns `Ok(None)` for devices that are inaccessible or unsupported.
    pub fn open<O>(opener: &O, descriptor: &DeviceDescriptor) -> Result<Option<Self>>
    where
        O: DeviceOpener<Transport = T>,
    {
        if descriptor.path.is_empty() {
            error!("cannot open device without path");
            return Err(AmbitError::InvalidArgument("device has no path".to_string()));
        }

        if descriptor.access_status != 0 || !descriptor.is_supported {
            info!(
                "not opening {} (access status: {}, supported: {})",
                descriptor.path, descriptor.access_status, descriptor.is_supported
            );
            return Ok(None);
        }

        let mut transport = opener.open(&descriptor.path)?;
        transport.set_nonblocking(true)?;

        Ok(Some(Self {
            link: Link::new(transport),
            descriptor: descriptor.clone(),
            pmem20: Pmem20::new(descriptor.chunk_size),
            closed: false,
        }))
    }

    /// Open the watch behind a device node such as `/dev/hidraw2`
    pub fn open_from_devname<D, O>(discovery: &D, opener: &O, devname: &str) -> Result<Option<Self>>
    where
        D: DeviceDiscovery,
        O: DeviceOpener<Transport = T>,
    {
        Self::open_matching(discovery, opener, DiscoveryFilter::DevNode(devname.to_string()), devname)
    }

    /// Open the watch behind a kernel device path starting with `/sys/`
    pub fn open_from_syspath<D, O>(discovery: &D, opener: &O, syspath: &str) -> Result<Option<Self>>
    where
        D: DeviceDiscovery,
        O: DeviceOpener<Transport = T>,
    {
        info!("syspath: '{}'", syspath);
        let Some(devpath) = syspath.strip_prefix("/sys").filter(|p| p.starts_with('/')) else {
            error!("{}: not a /sys/ path", syspath);
            return Err(AmbitError::InvalidArgument(format!("{}: not a /sys/ path", syspath)));
        };
        Self::open_matching(discovery, opener, DiscoveryFilter::DevPath(devpath.to_string()), syspath)
    }

    fn open_matching<D, O>(discovery: &D, opener: &O, filter: DiscoveryFilter, what: &str) -> Result<Option<Self>>
    where
        D: DeviceDiscovery,
        O: DeviceOpener<Transport = T>,
    {
        let candidates = discovery.candidates(&filter)?;
        let Some(candidate) = candidates.first() else {
            error!("{}: not a hidraw device", what);
            return Err(AmbitError::InvalidArgument(format!("{}: not a hidraw device", what)));
        };

        let Some(descriptor) = identify(candidate, opener) else {
            return Err(AmbitError::Unsupported(format!("{}: cannot identify device", what)));
        };

        Self::open(opener, &descriptor)
    }

    pub fn descriptor(&self) -> &DeviceDescriptor {
        &self.descriptor
    }

    /// Send a raw command and return the reply payload
    pub fn command(&mut self, command: Command, payload: &[u8], long_timeout: bool) -> Result<bytes::Bytes> {
        self.link.command(command, payload, long_timeout)
    }

    pub fn device_info(&mut self) -> Result<DeviceIdentity> {
        self.link.device_info()
    }

    /// Show or clear the "syncing" indicator, only writing on change.
    ///
    /// The indicator is only written when the watch reports the opposite
    /// state (0 or 1); unknown state values are left untouched.
    ///
    /// If the current state cannot be read nothing is written and the
    /// read error is returned.
    pub fn set_display_lock(&mut self, locked: bool) -> Result<()> {
        let reply = self.link.command(Command::LockCheck, &[], false)?;
        if reply.len() < 4 {
            return Err(AmbitError::Parse(format!(
                "lock state reply too short: {} bytes",
                reply.len()
            )));
        }
        let current = (&reply[..]).get_u32_le();

        let wanted = u32::from(locked);
        if current != 1 - wanted {
            return Ok(());
        }

        if locked {
            info!("Setting Sync message to device display");
        } else {
            info!("Clearing Sync message to device display");
        }
        self.link.command(Command::LockSet, &[wanted as u8, 0, 0, 0], false)?;
        Ok(())
    }

    pub fn sync_display_show(&mut self) -> Result<()> {
        self.set_display_lock(true)
    }

    pub fn sync_display_clear(&mut self) -> Result<()> {
        self.set_display_lock(false)
    }

    /// Write date and time to the watch clock
    pub fn set_date_time(&mut self, date_time: &NaiveDateTime) -> Result<()> {
        info!("Writing date and time to clock");

        let year = u16::try_from(date_time.year())
            .map_err(|_| AmbitError::InvalidArgument(format!("year {} out of range", date_time.year())))?
            .to_le_bytes();
        let month = date_time.month() as u8;
        let day = date_time.day() as u8;

        // bytes 4..8 are unknown, moveslink sends 0x28000000
        let date_data = [year[0], year[1], month, day, 0x28, 0x00, 0x00, 0x00];

        let msec = (1000 * date_time.second().min(59) as u16).to_le_bytes();
        let time_data = [
            year[0],
            year[1],
            month,
            day,
            date_time.hour() as u8,
            date_time.minute() as u8,
            msec[0],
            msec[1],
        ];

        self.link
            .command(Command::Date, &date_data, false)
            .and_then(|_| self.link.command(Command::Time, &time_data, false))
            .inspect_err(|e| warn!("Failed to write date and time: {}", e))?;
        Ok(())
    }

    pub fn device_status(&mut self) -> Result<DeviceStatus> {
        info!("Reading device status");
        let reply = self
            .link
            .command(Command::Status, &[], false)
            .inspect_err(|e| warn!("Failed to read device status: {}", e))?;
        DeviceStatus::parse(&reply)
    }

    pub fn personal_settings(&mut self) -> Result<PersonalSettings> {
        info!("Reading personal settings");
        let reply = self
            .link
            .command(Command::PersonalSettings, &[], false)
            .inspect_err(|e| warn!("Failed to read personal settings: {}", e))?;
        PersonalSettings::parse(&reply)
    }

    /// Release the device, clearing the "syncing" indicator if possible
    pub fn close(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        info!("Closing");
        if let Err(e) = self.set_display_lock(false) {
            warn!("Failed to clear display lock on close: {}", e);
        }
        self.pmem20.reset();
    }
}

impl<T: HidTransport> Drop for Session<T> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
