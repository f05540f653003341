// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Matthias Bilger <matthias@bilger.info>

use crate::config::{Config, DeviceSelector};
use crate::store::LogStore;
use ambit_hid::{enumerate_with, DeviceDescriptor, HidApiBackend, LogCallbacks, Session};
use anyhow::{bail, Context, Result};
use chrono::Local;
use log::{error, info, warn};
use std::cell::Cell;
use std::fs;
use std::io::Write;
use std::path::Path;

/// How to pick the watch to talk to
pub struct Target<'a> {
    pub devname: Option<&'a str>,
    pub syspath: Option<&'a str>,
    pub configured: &'a [DeviceSelector],
}

pub fn list(backend: &HidApiBackend) -> Result<()> {
    let devices = enumerate_with(backend, backend);
    if devices.is_empty() {
        println!("No Ambit watches found.");
        return Ok(());
    }

    println!(
        "{:<16} {:<10} {:<10} {:<24} {:<12} {:<10} Status",
        "Path", "VID/PID", "Model", "Name", "Serial", "Firmware"
    );
    println!("{}", "-".repeat(100));
    for device in &devices {
        println!(
            "{:<16} {:<10} {:<10} {:<24} {:<12} {:<10} {}",
            device.path,
            format!("{:04x}/{:04x}", device.vendor_id, device.product_id),
            device.model,
            device.name,
            device.serial,
            device.fw_version.to_string(),
            status(device)
        );
    }
    Ok(())
}

fn status(device: &DeviceDescriptor) -> String {
    if device.access_status != 0 {
        format!("no access ({})", std::io::Error::from_raw_os_error(device.access_status))
    } else if device.is_supported {
        "supported".to_string()
    } else {
        "unsupported".to_string()
    }
}

/// Open the selected watch, or the first usable one
pub fn open_session(backend: &HidApiBackend, target: &Target<'_>) -> Result<Session> {
    if let Some(devname) = target.devname {
        return Session::open_from_devname(backend, backend, devname)?
            .with_context(|| format!("{} is not a usable watch", devname));
    }
    if let Some(syspath) = target.syspath {
        return Session::open_from_syspath(backend, backend, syspath)?
            .with_context(|| format!("{} is not a usable watch", syspath));
    }

    for selector in target.configured {
        let opened = match (&selector.devname, &selector.syspath) {
            (Some(devname), _) => Session::open_from_devname(backend, backend, devname),
            (None, Some(syspath)) => Session::open_from_syspath(backend, backend, syspath),
            (None, None) => continue,
        };
        match opened {
            Ok(Some(session)) => return Ok(session),
            Ok(None) => info!("Configured device {:?} is not usable", selector),
            Err(e) => warn!("Cannot open configured device {:?}: {}", selector, e),
        }
    }
    if !target.configured.is_empty() {
        bail!("None of the configured devices could be opened");
    }

    for device in enumerate_with(backend, backend) {
        if let Some(session) = Session::open(backend, &device)? {
            return Ok(session);
        }
    }
    bail!("No usable Ambit watch found")
}

pub fn info(session: &mut Session) -> Result<()> {
    let descriptor = session.descriptor().clone();
    println!("Device:   {} ({})", descriptor.name, descriptor.path);
    println!("Model:    {}", descriptor.model);
    println!("Serial:   {}", descriptor.serial);
    println!("Firmware: {}", descriptor.fw_version);
    println!("Hardware: {}", descriptor.hw_version);

    let status = session.device_status().context("Failed to read device status")?;
    println!("Battery:  {}%", status.charge);

    match session.personal_settings() {
        Ok(settings) => println!("Settings: {}", serde_json::to_string_pretty(&settings)?),
        Err(e) => warn!("Personal settings unavailable: {}", e),
    }
    Ok(())
}

pub fn set_time(session: &mut Session) -> Result<()> {
    let now = Local::now().naive_local();
    session.set_date_time(&now).context("Failed to set watch clock")?;
    println!("Clock set to {}", now.format("%Y-%m-%d %H:%M:%S"));
    Ok(())
}

pub fn orbit(session: &mut Session, file: &Path) -> Result<()> {
    let data = fs::read(file).with_context(|| format!("Failed to read orbit file: {:?}", file))?;
    session.sync_display_show()?;
    let result = session.sync_gps_orbit(&data);
    let result = after_cleanup(result, session.sync_display_clear());
    result.context("Failed to update GPS orbit data")?;
    println!("GPS orbit data up to date ({} bytes)", data.len());
    Ok(())
}

/// Keep the outcome of the main operation, a failed cleanup is only logged
fn after_cleanup<T>(result: ambit_hid::Result<T>, cleanup: ambit_hid::Result<()>) -> ambit_hid::Result<T> {
    if let Err(e) = cleanup {
        warn!("Failed to clear sync indicator: {}", e);
    }
    result
}

pub fn sync(session: &mut Session, config: &Config, store: &LogStore) -> Result<()> {
    if config.display_lock {
        session.sync_display_show()?;
    }
    if config.sync_time {
        set_time(session)?;
    }

    let failed = Cell::new(0usize);
    let result = session.read_logs(
        LogCallbacks::new()
            .with_skip(|header| store.contains(header))
            .with_push(|entry| match store.save(&entry) {
                Ok(path) => info!("Stored {:?}", path),
                Err(e) => {
                    error!("{:#}", e);
                    failed.set(failed.get() + 1);
                }
            })
            .with_progress(|p| {
                print!("\rReading log {}/{} ({}%)", p.walked, p.total, p.percent);
                let _ = std::io::stdout().flush();
            }),
    );
    println!();

    let result = if config.display_lock {
        after_cleanup(result, session.sync_display_clear())
    } else {
        result
    };

    let read = result.context("Failed to read logs")?;
    if failed.get() > 0 {
        bail!("{} of {} logs could not be stored", failed.get(), read);
    }
    println!("{} new logs stored in {:?}", read, store.dir());
    Ok(())
}
