// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Matthias Bilger <matthias@bilger.info>

/// Errors that can occur while talking to a watch
#[derive(Debug, thiserror::Error)]
pub enum AmbitError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Unsupported device: {0}")]
    Unsupported(String),
}

impl From<hidapi::HidError> for AmbitError {
    fn from(err: hidapi::HidError) -> Self {
        AmbitError::Transport(err.to_string())
    }
}

impl From<std::io::Error> for AmbitError {
    fn from(err: std::io::Error) -> Self {
        AmbitError::Transport(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AmbitError>;
