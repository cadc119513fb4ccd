// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Broadcast transaction table

use q_common::constants::BTT_SIZE;
use q_common::{Error, Instant, Millis, Result, ShortAddr};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct BttRecord {
    src: ShortAddr,
    sequence: u8,
    expires: Instant,
}

/// Records of recently seen broadcasts
#[derive(Debug, Clone)]
pub struct BroadcastTable {
    records: [Option<BttRecord>; BTT_SIZE],
}

impl BroadcastTable {
    /// Empty table
    #[must_use]
    pub const fn new() -> Self {
        Self {
            records: [None; BTT_SIZE],
        }
    }

    /// Record a broadcast; returns `true` the first time it is seen
    ///
    /// # Errors
    /// `BroadcastTableFull` when a new broadcast cannot be tracked.
    pub fn record(&mut self, src: ShortAddr, sequence: u8, now: Instant, lifetime: Millis) -> Result<bool> {
        let live = |r: &BttRecord| !now.has_reached(r.expires);
        if self
            .records
            .iter()
            .flatten()
            .any(|r| r.src == src && r.sequence == sequence && live(r))
        {
            return Ok(false);
        }
        let slot = self
            .records
            .iter_mut()
            .find(|r| r.map_or(true, |r| !live(&r)))
            .ok_or(Error::BroadcastTableFull)?;
        *slot = Some(BttRecord {
            src,
            sequence,
            expires: now + lifetime,
        });
        Ok(true)
    }

    /// Drop expired records
    pub fn expire(&mut self, now: Instant) {
        for slot in &mut self.records {
            if slot.is_some_and(|r| now.has_reached(r.expires)) {
                *slot = None;
            }
        }
    }

    /// Number of live records
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.iter().flatten().count()
    }

    /// Check for an empty table
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove every record
    pub fn clear(&mut self) {
        self.records = [None; BTT_SIZE];
    }
}

impl Default for BroadcastTable {
    fn default() -> Self {
        Self::new()
    }
}
