// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Matthias Bilger <matthias@bilger.info>

use ambit_hid::{enumerate, HidApiBackend, LogCallbacks, Session};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let devices = enumerate()?;
    let Some(device) = devices.iter().find(|d| d.is_supported && d.access_status == 0) else {
        println!("No usable watch found ({} candidates)", devices.len());
        return Ok(());
    };
    println!("Found {} ({}), firmware {}", device.name, device.serial, device.fw_version);

    let backend = HidApiBackend::new()?;
    let Some(mut session) = Session::open(&backend, device)? else {
        println!("Watch refused the session");
        return Ok(());
    };

    session.sync_display_show()?;
    println!("Battery: {}%", session.device_status()?.charge);

    let read = session.read_logs(
        LogCallbacks::new()
            .with_push(|entry| {
                println!(
                    "{} {:>8} m {:>5} samples",
                    entry.header.date_time,
                    entry.header.distance,
                    entry.samples.len()
                )
            })
            .with_progress(|p| log::info!("{}/{} ({}%)", p.walked, p.total, p.percent)),
    )?;
    println!("Downloaded {} logs", read);

    session.close();
    Ok(())
}
