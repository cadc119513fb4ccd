// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Time utilities for the NWK stack
//!
//! The engine runs on a free-running 32-bit millisecond counter supplied by
//! the platform. It wraps roughly every 49 days, so every comparison is done
//! with wrapping arithmetic.

use core::ops::{Add, Sub};

/// Point in time on the 32-bit millisecond clock
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Instant(u32);

impl Instant {
    /// Clock origin
    pub const ZERO: Self = Self(0);

    /// Create from a raw millisecond count
    #[must_use]
    pub const fn from_millis(ms: u32) -> Self {
        Self(ms)
    }

    /// Raw millisecond count
    #[must_use]
    pub const fn as_millis(&self) -> u32 {
        self.0
    }

    /// Milliseconds elapsed since `earlier` (wrapping)
    #[must_use]
    pub const fn since(&self, earlier: Self) -> u32 {
        self.0.wrapping_sub(earlier.0)
    }

    /// Check whether this instant is at or past `deadline`
    ///
    /// Valid as long as the two instants are less than half the clock range
    /// apart.
    #[must_use]
    pub const fn has_reached(&self, deadline: Self) -> bool {
        (self.0.wrapping_sub(deadline.0) as i32) >= 0
    }
}

impl Add<Millis> for Instant {
    type Output = Self;

    fn add(self, rhs: Millis) -> Self::Output {
        Self(self.0.wrapping_add(rhs.0))
    }
}

impl Sub<Instant> for Instant {
    type Output = Millis;

    fn sub(self, rhs: Instant) -> Self::Output {
        Millis(self.since(rhs))
    }
}

/// Duration in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Millis(u32);

impl Millis {
    /// Zero duration
    pub const ZERO: Self = Self(0);

    /// Create from milliseconds
    #[must_use]
    pub const fn new(ms: u32) -> Self {
        Self(ms)
    }

    /// Create from seconds
    #[must_use]
    pub const fn from_secs(secs: u32) -> Self {
        Self(secs.saturating_mul(1000))
    }

    /// Get as milliseconds
    #[must_use]
    pub const fn as_millis(&self) -> u32 {
        self.0
    }

    /// Get as seconds (truncated)
    #[must_use]
    pub const fn as_secs(&self) -> u32 {
        self.0 / 1000
    }
}

impl From<u32> for Millis {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl Add for Millis {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0.saturating_add(rhs.0))
    }
}

/// IEEE 802.15.4 scan duration for one channel, in milliseconds
///
/// `aBaseSuperframeDuration * (2^n + 1)` symbols at 16 us per symbol.
#[must_use]
pub const fn scan_duration_ms(exponent: u8) -> u32 {
    let exponent = if exponent > 14 { 14 } else { exponent };
    let symbols = 960u32 * ((1u32 << exponent) + 1);
    symbols * 16 / 1000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrapping_deadline() {
        let start = Instant::from_millis(u32::MAX - 5);
        let deadline = start + Millis::new(10);
        assert!(!start.has_reached(deadline));
        assert!(Instant::from_millis(4).has_reached(deadline));
        assert!(Instant::from_millis(100).has_reached(deadline));
    }

    #[test]
    fn test_elapsed() {
        let a = Instant::from_millis(1000);
        let b = Instant::from_millis(1250);
        assert_eq!((b - a).as_millis(), 250);
    }

    #[test]
    fn test_scan_duration() {
        // Exponent 3: 960 * 9 symbols = 138.24 ms
        assert_eq!(scan_duration_ms(3), 138);
        assert_eq!(scan_duration_ms(0), 30);
    }
}
