// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Hardware Abstraction Layer for the Qbitel ZigBee NWK stack
//!
//! The NWK engine is hardware independent. Radio, timers and storage are
//! reached through the MAC layer and the persistence hook; the only
//! peripheral the engine consumes directly is a random number source, used
//! for stochastic address selection, PAN id selection and broadcast jitter.
//!
//! 1. **Traits**: Platform-agnostic interfaces (`traits` module)
//! 2. **Software fallback**: [`SoftwareRng`] for parts without a TRNG

#![no_std]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod traits;
pub mod error;

// Re-export main traits
pub use traits::*;
pub use error::{HalError, HalResult};
