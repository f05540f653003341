// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Matthias Bilger <matthias@bilger.info>

use crate::error::{AmbitError, Result};
use bytes::Buf;
use serde::{Deserialize, Serialize};

/// Encoded length of the personal settings record
pub const PERSONAL_SETTINGS_LEN: usize = 24;

/// Device status reply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceStatus {
    /// Battery charge in percent
    pub charge: u8,
}

impl DeviceStatus {
    pub fn parse(buf: &[u8]) -> Result<Self> {
        if buf.len() < 2 {
            return Err(AmbitError::Parse(format!(
                "status reply too short: {} bytes",
                buf.len()
            )));
        }
        Ok(Self { charge: buf[1] })
    }
}

/// User settings stored on the watch
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonalSettings {
    pub sportmode_button_lock: bool,
    pub timemode_button_lock: bool,
    /// Tenths of a degree
    pub compass_declination: i16,
    pub units_mode: u8,
    pub gps_position_format: u8,
    pub language: u8,
    pub time_format: u8,
    pub date_format: u8,
    pub tones_mode: u8,
    pub backlight_mode: u8,
    pub backlight_brightness: u8,
    pub display_brightness: u8,
    pub display_is_negative: bool,
    /// Hundredths of a kilogram
    pub weight: u16,
    pub birthyear: u16,
    pub max_hr: u8,
    pub rest_hr: u8,
    pub fitness_level: u8,
    pub is_male: bool,
    /// Centimetres
    pub length: u8,
    pub alti_baro_mode: u8,
}

impl PersonalSettings {
    pub fn parse(mut buf: &[u8]) -> Result<Self> {
        if buf.len() < PERSONAL_SETTINGS_LEN {
            return Err(AmbitError::Parse(format!(
                "personal settings too short: {} bytes",
                buf.len()
            )));
        }

        Ok(Self {
            sportmode_button_lock: buf.get_u8() != 0,
            timemode_button_lock: buf.get_u8() != 0,
            compass_declination: buf.get_i16_le(),
            units_mode: buf.get_u8(),
            gps_position_format: buf.get_u8(),
            language: buf.get_u8(),
            time_format: buf.get_u8(),
            date_format: buf.get_u8(),
            tones_mode: buf.get_u8(),
            backlight_mode: buf.get_u8(),
            backlight_brightness: buf.get_u8(),
            display_brightness: buf.get_u8(),
            display_is_negative: buf.get_u8() != 0,
            weight: buf.get_u16_le(),
            birthyear: buf.get_u16_le(),
            max_hr: buf.get_u8(),
            rest_hr: buf.get_u8(),
            fitness_level: buf.get_u8(),
            is_male: buf.get_u8() != 0,
            length: buf.get_u8(),
            alti_baro_mode: buf.get_u8(),
        })
    }
}
