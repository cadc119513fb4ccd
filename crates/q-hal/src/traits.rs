// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! HAL trait definitions
//!
//! This module defines the platform-agnostic hardware abstraction traits
//! that must be implemented for each target platform.

use crate::error::{HalError, HalResult};

/// Random number generator interface
pub trait RngInterface {
    /// Fill buffer with random bytes
    fn fill_bytes(&mut self, buffer: &mut [u8]) -> HalResult<()>;

    /// Generate a random u16
    fn next_u16(&mut self) -> HalResult<u16> {
        let mut buf = [0u8; 2];
        self.fill_bytes(&mut buf)?;
        Ok(u16::from_le_bytes(buf))
    }

    /// Generate a random u32
    fn next_u32(&mut self) -> HalResult<u32> {
        let mut buf = [0u8; 4];
        self.fill_bytes(&mut buf)?;
        Ok(u32::from_le_bytes(buf))
    }

    /// Uniform-ish value in `0..=max` (modulo bias is acceptable for jitter)
    fn next_up_to(&mut self, max: u32) -> HalResult<u32> {
        if max == 0 {
            return Ok(0);
        }
        Ok(self.next_u32()? % (max + 1))
    }

    /// Check if RNG is ready
    fn is_ready(&self) -> bool;
}

/// Software xorshift generator
///
/// Not cryptographic. Intended for parts without a TRNG, seeded from the
/// device's IEEE address so neighbouring devices diverge.
#[derive(Debug, Clone)]
pub struct SoftwareRng {
    state: u32,
}

impl SoftwareRng {
    /// Create a generator from a seed (a zero seed is remapped)
    #[must_use]
    pub const fn new(seed: u64) -> Self {
        let folded = (seed as u32) ^ ((seed >> 32) as u32);
        Self {
            state: if folded == 0 { 0x9E37_79B9 } else { folded },
        }
    }

    fn step(&mut self) -> u32 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.state = x;
        x
    }
}

impl RngInterface for SoftwareRng {
    fn fill_bytes(&mut self, buffer: &mut [u8]) -> HalResult<()> {
        if self.state == 0 {
            return Err(HalError::RngError);
        }
        for chunk in buffer.chunks_mut(4) {
            let bytes = self.step().to_le_bytes();
            chunk.copy_from_slice(&bytes[..chunk.len()]);
        }
        Ok(())
    }

    fn is_ready(&self) -> bool {
        self.state != 0
    }
}
