// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Matthias Bilger <matthias@bilger.info>

//! Downloaded logs, one JSON file per activity named after its start time.

use ambit_hid::{LogEntry, LogHeader};
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

pub struct LogStore {
    dir: PathBuf,
}

impl LogStore {
    /// Open the store, creating the directory if needed
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create log directory: {:?}", dir))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, header: &LogHeader) -> PathBuf {
        self.dir
            .join(format!("log-{}.json", header.date_time.format("%Y%m%dT%H%M%S")))
    }

    /// Whether the entry behind `header` was stored before
    pub fn contains(&self, header: &LogHeader) -> bool {
        self.path_for(header).exists()
    }

    pub fn save(&self, entry: &LogEntry) -> Result<PathBuf> {
        let path = self.path_for(&entry.header);
        let json = serde_json::to_string_pretty(entry).context("Failed to serialize log entry")?;
        fs::write(&path, json).with_context(|| format!("Failed to write log file: {:?}", path))?;
        Ok(path)
    }
}
