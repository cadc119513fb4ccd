// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Qbitel ZigBee NWK Common Library
//!
//! This crate provides the types, error definitions, configuration
//! structures, logging and time utilities shared by the kernel substrate and
//! the NWK engine.
//!
//! # Features
//!
//! - `std`: Enable standard library support (disabled by default for embedded)
//! - `defmt`: Enable defmt formatting of errors for embedded debugging
//!
//! # Memory
//!
//! No heap allocations are performed - all buffers use fixed-size arrays or
//! heapless collections. Network keys implement `Zeroize`.

#![no_std]
#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

#[cfg(any(test, feature = "std"))]
extern crate std;

pub mod types;
pub mod errors;
pub mod config;
pub mod log;
pub mod constants;
pub mod time;

// Re-export commonly used items
pub use errors::{Error, Result};
pub use types::*;
pub use config::{AddressingMode, NwkConfig};
pub use time::{Instant, Millis};
