// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Matthias Bilger <matthias@bilger.info>

//! Decoded activity log records.
//!
//! Everything here owns its data; dropping a [`LogEntry`] releases every
//! sample buffer with it.

use crate::error::{AmbitError, Result};
use crate::protocol::fixed_string;
use bytes::Buf;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Encoded length of a log header
pub const LOG_HEADER_LEN: usize = 43;

pub const SAMPLE_TYPE_PERIODIC: u8 = 0x02;
pub const SAMPLE_TYPE_GPS_BASE: u8 = 0x0a;

const PERIODIC_VALUE_LEN: usize = 6;
const SATELLITE_LEN: usize = 3;
const GPS_BASE_FIXED_LEN: usize = 13;

/// Summary of one stored activity
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogHeader {
    pub date_time: NaiveDateTime,
    pub duration_ms: u32,
    pub ascent: u16,
    pub descent: u16,
    pub distance: u32,
    pub heartrate_avg: u8,
    pub heartrate_max: u8,
    pub activity_type: u8,
    pub activity_name: String,
    pub samples_count: u32,
}

impl LogHeader {
    /// Decode the fixed header layout
    pub fn parse(mut buf: &[u8]) -> Result<Self> {
        if buf.len() < LOG_HEADER_LEN {
            return Err(AmbitError::Parse(format!(
                "log header too short: {} bytes",
                buf.len()
            )));
        }

        let year = buf.get_u16_le();
        let month = buf.get_u8();
        let day = buf.get_u8();
        let hour = buf.get_u8();
        let minute = buf.get_u8();
        let msec = buf.get_u16_le();

        let date_time = NaiveDate::from_ymd_opt(i32::from(year), u32::from(month), u32::from(day))
            .and_then(|d| {
                d.and_hms_milli_opt(
                    u32::from(hour),
                    u32::from(minute),
                    u32::from(msec / 1000),
                    u32::from(msec % 1000),
                )
            })
            .ok_or_else(|| {
                AmbitError::Parse(format!(
                    "invalid log date {}-{}-{} {}:{}",
                    year, month, day, hour, minute
                ))
            })?;

        let duration_ms = buf.get_u32_le();
        let ascent = buf.get_u16_le();
        let descent = buf.get_u16_le();
        let distance = buf.get_u32_le();
        let heartrate_avg = buf.get_u8();
        let heartrate_max = buf.get_u8();
        let activity_type = buf.get_u8();
        let activity_name = fixed_string(&buf[..16]);
        buf.advance(16);
        let samples_count = buf.get_u32_le();

        Ok(Self {
            date_time,
            duration_ms,
            ascent,
            descent,
            distance,
            heartrate_avg,
            heartrate_max,
            activity_type,
            activity_name,
            samples_count,
        })
    }
}

/// One channel reading of a periodic sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodicValue {
    pub kind: u16,
    pub value: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Satellite {
    pub sv: u8,
    pub state: u8,
    pub snr: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Sample {
    Periodic(Vec<PeriodicValue>),
    GpsBase {
        latitude: i32,
        longitude: i32,
        altitude: i32,
        satellites: Vec<Satellite>,
    },
    Unknown {
        sample_type: u8,
        data: Vec<u8>,
    },
}

impl Sample {
    /// Decode a sample body: a type byte followed by its payload
    pub fn parse(raw: &[u8]) -> Result<Self> {
        let Some((&sample_type, mut payload)) = raw.split_first() else {
            return Err(AmbitError::Parse("empty sample".to_string()));
        };

        match sample_type {
            SAMPLE_TYPE_PERIODIC => {
                if payload.len() % PERIODIC_VALUE_LEN != 0 {
                    return Err(AmbitError::Parse(format!(
                        "periodic sample of {} bytes",
                        payload.len()
                    )));
                }
                let mut values = Vec::with_capacity(payload.len() / PERIODIC_VALUE_LEN);
                while payload.has_remaining() {
                    values.push(PeriodicValue {
                        kind: payload.get_u16_le(),
                        value: payload.get_u32_le(),
                    });
                }
                Ok(Sample::Periodic(values))
            }
            SAMPLE_TYPE_GPS_BASE => {
                if payload.len() < GPS_BASE_FIXED_LEN {
                    return Err(AmbitError::Parse(format!(
                        "GPS base sample of {} bytes",
                        payload.len()
                    )));
                }
                let latitude = payload.get_i32_le();
                let longitude = payload.get_i32_le();
                let altitude = payload.get_i32_le();
                let count = payload.get_u8() as usize;
                if payload.len() < count * SATELLITE_LEN {
                    return Err(AmbitError::Parse(format!(
                        "GPS base sample truncated: {} satellites announced",
                        count
                    )));
                }
                let satellites = payload
                    .chunks_exact(SATELLITE_LEN)
                    .take(count)
                    .map(|s| Satellite {
                        sv: s[0],
                        state: s[1],
                        snr: s[2],
                    })
                    .collect();
                Ok(Sample::GpsBase {
                    latitude,
                    longitude,
                    altitude,
                    satellites,
                })
            }
            other => Ok(Sample::Unknown {
                sample_type: other,
                data: payload.to_vec(),
            }),
        }
    }
}

/// A fully downloaded activity
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub header: LogHeader,
    pub samples: Vec<Sample>,
}
