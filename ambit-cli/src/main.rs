// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Matthias Bilger <matthias@bilger.info>

mod commands;
mod config;
mod store;

use ambit_hid::HidApiBackend;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use commands::Target;
use config::Config;
use std::path::PathBuf;
use store::LogStore;

/// Talk to Suunto Ambit watches over USB.
#[derive(Parser)]
#[command(name = "ambit", version, about = "Suunto Ambit sync tool")]
struct Cli {
    /// Configuration file (YAML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
    /// Use the watch behind this device node, e.g. /dev/hidraw2
    #[arg(long, global = true, conflicts_with = "syspath")]
    devname: Option<String>,
    /// Use the watch behind this sysfs path
    #[arg(long, global = true)]
    syspath: Option<String>,
    /// More logging output (repeat for more)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List attached watches
    List,
    /// Show identity, battery and personal settings
    Info,
    /// Set the watch clock to the local time
    SetTime,
    /// Upload GPS orbit data unless the watch already has it
    Orbit {
        /// Orbit data file
        file: PathBuf,
    },
    /// Download new activity logs
    Sync {
        /// Store logs here instead of the configured directory
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

fn init_logging(config: &Config, verbose: u8) {
    let level = match verbose {
        0 => config.logging.level.as_str(),
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;
    init_logging(&config, cli.verbose);

    let backend = HidApiBackend::new().context("Failed to initialise HID access")?;
    let target = Target {
        devname: cli.devname.as_deref(),
        syspath: cli.syspath.as_deref(),
        configured: &config.devices,
    };

    match &cli.command {
        Commands::List => commands::list(&backend),
        Commands::Info => {
            let mut session = commands::open_session(&backend, &target)?;
            commands::info(&mut session)
        }
        Commands::SetTime => {
            let mut session = commands::open_session(&backend, &target)?;
            commands::set_time(&mut session)
        }
        Commands::Orbit { file } => {
            let mut session = commands::open_session(&backend, &target)?;
            commands::orbit(&mut session, file)
        }
        Commands::Sync { output } => {
            let dir = match output {
                Some(dir) => dir.clone(),
                None => config.output_dir()?,
            };
            let store = LogStore::open(dir)?;
            let mut session = commands::open_session(&backend, &target)?;
            let result = commands::sync(&mut session, &config, &store);
            session.close();
            result
        }
    }
}
