// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Route discovery table
//!
//! One entry per (originator, request id) seen during a discovery. The
//! entry suppresses duplicate relays, remembers the best forward cost and
//! the neighbor the reply must go back through.

use q_common::constants::ROUTE_DISCOVERY_TABLE_SIZE;
use q_common::{Error, Instant, Result, ShortAddr};

/// Route discovery table entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiscoveryEntry {
    /// Route request identifier
    pub id: u8,
    /// Originator of the route request
    pub originator: ShortAddr,
    /// Neighbor we received the best request from (reply goes back here)
    pub sender: ShortAddr,
    /// Destination being discovered
    pub dst: ShortAddr,
    /// Best path cost from the originator to us
    pub forward_cost: u8,
    /// Best path cost from us to the destination (from replies)
    pub residual_cost: u8,
    /// Entry lifetime
    pub expires: Instant,
    /// Packet slot of our still-queued relay, if any
    pub relay_slot: Option<u8>,
}

/// What to do with a received route request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestVerdict {
    /// First copy: an entry was created
    New,
    /// Cheaper duplicate: the entry was updated
    Better,
    /// Duplicate at equal or higher cost
    Duplicate,
}

/// Fixed-size route discovery table
#[derive(Debug, Clone)]
pub struct DiscoveryTable {
    entries: [Option<DiscoveryEntry>; ROUTE_DISCOVERY_TABLE_SIZE],
}

impl DiscoveryTable {
    /// Empty table
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: [None; ROUTE_DISCOVERY_TABLE_SIZE],
        }
    }

    /// Entry for a request
    #[must_use]
    pub fn find(&self, originator: ShortAddr, id: u8) -> Option<&DiscoveryEntry> {
        self.iter().find(|e| e.originator == originator && e.id == id)
    }

    /// Mutable entry for a request
    pub fn find_mut(&mut self, originator: ShortAddr, id: u8) -> Option<&mut DiscoveryEntry> {
        self.entries
            .iter_mut()
            .flatten()
            .find(|e| e.originator == originator && e.id == id)
    }

    /// Record a received route request
    ///
    /// Lowest cost wins; on equal cost the first copy is kept.
    ///
    /// # Errors
    /// `DiscoveryTableFull` if the request is new and no slot is free.
    pub fn record_request(
        &mut self,
        originator: ShortAddr,
        id: u8,
        sender: ShortAddr,
        dst: ShortAddr,
        cost: u8,
        expires: Instant,
    ) -> Result<RequestVerdict> {
        if let Some(entry) = self.find_mut(originator, id) {
            if cost < entry.forward_cost {
                entry.forward_cost = cost;
                entry.sender = sender;
                return Ok(RequestVerdict::Better);
            }
            return Ok(RequestVerdict::Duplicate);
        }
        let slot = self
            .entries
            .iter_mut()
            .find(|e| e.is_none())
            .ok_or(Error::DiscoveryTableFull)?;
        *slot = Some(DiscoveryEntry {
            id,
            originator,
            sender,
            dst,
            forward_cost: cost,
            residual_cost: u8::MAX,
            expires,
            relay_slot: None,
        });
        Ok(RequestVerdict::New)
    }

    /// Remove an entry
    pub fn remove(&mut self, originator: ShortAddr, id: u8) -> Option<DiscoveryEntry> {
        self.entries
            .iter_mut()
            .find(|e| e.is_some_and(|d| d.originator == originator && d.id == id))
            .and_then(Option::take)
    }

    /// Forget the relay slot once the relay left the queue
    pub fn release_relay_slot(&mut self, slot: u8) {
        for entry in self.entries.iter_mut().flatten() {
            if entry.relay_slot == Some(slot) {
                entry.relay_slot = None;
            }
        }
    }

    /// Drop expired entries; returns how many were removed
    pub fn expire(&mut self, now: Instant) -> usize {
        let mut removed = 0;
        for slot in &mut self.entries {
            if slot.is_some_and(|e| now.has_reached(e.expires)) {
                *slot = None;
                removed += 1;
            }
        }
        removed
    }

    /// Iterate over entries
    pub fn iter(&self) -> impl Iterator<Item = &DiscoveryEntry> {
        self.entries.iter().flatten()
    }

    /// Number of entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    /// Check for an empty table
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove every entry
    pub fn clear(&mut self) {
        self.entries = [None; ROUTE_DISCOVERY_TABLE_SIZE];
    }
}

impl Default for DiscoveryTable {
    fn default() -> Self {
        Self::new()
    }
}
