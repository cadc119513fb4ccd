// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! HAL error types

use core::fmt;

/// HAL error type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HalError {
    /// Hardware not initialized
    NotInitialized,
    /// RNG failure (health test failed or seed error)
    RngError,
    /// Hardware busy
    Busy,
    /// Operation timeout
    Timeout,
    /// Operation not supported
    NotSupported,
}

impl HalError {
    /// Get error code
    #[must_use]
    pub const fn code(&self) -> u16 {
        match self {
            Self::NotInitialized => 0x0801,
            Self::RngError => 0x0820,
            Self::Busy => 0x08F2,
            Self::Timeout => 0x08F1,
            Self::NotSupported => 0x08FF,
        }
    }

    /// Get error description
    #[must_use]
    pub const fn description(&self) -> &'static str {
        match self {
            Self::NotInitialized => "not initialized",
            Self::RngError => "RNG error",
            Self::Busy => "busy",
            Self::Timeout => "timeout",
            Self::NotSupported => "not supported",
        }
    }
}

impl fmt::Display for HalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[0x{:04X}] {}", self.code(), self.description())
    }
}

impl From<HalError> for q_common::Error {
    fn from(e: HalError) -> Self {
        match e {
            HalError::NotInitialized => Self::InvalidState,
            HalError::RngError => Self::InternalError,
            HalError::Busy => Self::Busy,
            HalError::Timeout => Self::Timeout,
            HalError::NotSupported => Self::NotPermitted,
        }
    }
}

/// HAL Result type
pub type HalResult<T> = Result<T, HalError>;
