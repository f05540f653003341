// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Matthias Bilger <matthias@bilger.info>

//! Differential download of the activity log.
//!
//! Headers are cheap, entries are not: when the caller can tell which
//! entries it already holds, a header walk decides whether any bulk reading
//! is needed at all, and the bulk read then only fetches the missing entries.

use crate::constants::PMEM20_MORE_HEADERS;
use crate::error::Result;
use crate::log_entry::{LogEntry, LogHeader};
use crate::session::Session;
use crate::transport::HidTransport;
use log::{info, warn};

/// Decides whether an entry is already held by the caller (`true` = skip)
pub type SkipCallback<'a> = Box<dyn FnMut(&LogHeader) -> bool + 'a>;

/// Receives every downloaded entry
pub type PushCallback<'a> = Box<dyn FnMut(LogEntry) + 'a>;

/// Observes download progress
pub type ProgressCallback<'a> = Box<dyn FnMut(Progress) + 'a>;

/// Download progress report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub total: u16,
    pub walked: u16,
    pub percent: u8,
}

impl Progress {
    fn new(total: u16, walked: u16, done: u16) -> Self {
        Self {
            total,
            walked,
            percent: (100 * u32::from(done) / u32::from(total.max(1))) as u8,
        }
    }
}

/// The three optional consumers of [`Session::read_logs`]
#[derive(Default)]
pub struct LogCallbacks<'a> {
    skip: Option<SkipCallback<'a>>,
    push: Option<PushCallback<'a>>,
    progress: Option<ProgressCallback<'a>>,
}

impl<'a> LogCallbacks<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_skip<F>(mut self, skip: F) -> Self
    where
        F: FnMut(&LogHeader) -> bool + 'a,
    {
        self.skip = Some(Box::new(skip));
        self
    }

    pub fn with_push<F>(mut self, push: F) -> Self
    where
        F: FnMut(LogEntry) + 'a,
    {
        self.push = Some(Box::new(push));
        self
    }

    pub fn with_progress<F>(mut self, progress: F) -> Self
    where
        F: FnMut(Progress) + 'a,
    {
        self.progress = Some(Box::new(progress));
        self
    }

    /// Whether the entry behind `header` has to be downloaded
    fn wants(&mut self, header: &LogHeader) -> bool {
        match self.skip.as_mut() {
            Some(skip) => !skip(header),
            None => true,
        }
    }

    fn report(&mut self, progress: Progress) {
        if let Some(cb) = self.progress.as_mut() {
            cb(progress);
        }
    }
}

impl<T: HidTransport> Session<T> {
    /// Download the log entries the caller does not have yet.
    ///
    /// Without a skip callback every entry is downloaded. With one, the
    /// headers are walked first and the download only starts if at least one
    /// entry is not skipped; the download then walks the whole log again
    /// and fetches every entry the callback does not skip.
    ///
    /// Returns the number of entries passed to the push callback. A failing
    /// entry aborts the whole read with an error, but entries pushed before
    /// the failure stay delivered: consumers have to cope with seeing the
    /// same entries again on the next attempt.
    pub fn read_logs(&mut self, mut callbacks: LogCallbacks<'_>) -> Result<usize> {
        info!("Reading number of logs");
        let total = self
            .log_count()
            .inspect_err(|e| warn!("Failed to read number of log entries: {}", e))?;
        info!("Number of logs={}", total);

        if total == 0 {
            info!("0 entries read");
            return Ok(0);
        }

        let read_pmem = if callbacks.skip.is_some() {
            info!("Look in headers for new logs");
            self.scan_for_new_entry(&mut callbacks)?
        } else {
            info!("No skip callback defined, reading log data");
            true
        };

        let mut entries_read = 0;
        if read_pmem {
            self.init_log_read()?;

            let mut walked: u16 = 0;
            while walked < total {
                let Some(header) = self.next_header()? else {
                    break;
                };

                info!("Reading header of log {} of {}", walked + 1, total);
                callbacks.report(Progress::new(total, walked + 1, walked));

                if callbacks.wants(&header) {
                    info!("Reading data of log {} of {}", walked + 1, total);
                    let entry = self
                        .read_entry()
                        .inspect_err(|e| warn!("Failed to read log {} of {}: {}", walked + 1, total, e))?;
                    if let Some(push) = callbacks.push.as_mut() {
                        push(entry);
                    }
                    entries_read += 1;
                } else {
                    info!("Log {} of {} already exists, skip reading data", walked + 1, total);
                }

                walked += 1;
                callbacks.report(Progress::new(total, walked, walked));
            }
        }

        info!("{} entries read", entries_read);
        Ok(entries_read)
    }

    /// Walk the headers until one is not skipped
    fn scan_for_new_entry(&mut self, callbacks: &mut LogCallbacks<'_>) -> Result<bool> {
        let mut more = self
            .rewind_headers()
            .inspect_err(|e| warn!("Failed to rewind header pointer: {}", e))?
            == PMEM20_MORE_HEADERS;

        while more {
            info!("Reading next header");
            let header = self
                .step_header()
                .inspect_err(|e| warn!("Failed to read log header: {}", e))?;

            if callbacks.wants(&header) {
                info!("Found new entry, start reading log data");
                return Ok(true);
            }

            more = self
                .peek_more()
                .inspect_err(|e| warn!("Failed to check for more headers: {}", e))?;
        }

        Ok(false)
    }
}
