// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Neighbor table
//!
//! One entry per device heard directly: our parent, our children, routers
//! heard through link status and beacon sources recorded during network
//! discovery (those are flagged `potential_parent`).

use q_common::constants::{MAX_LINK_COST, NEIGHBOR_TABLE_SIZE, ROUTER_AGE_LIMIT};
use q_common::{DeviceType, Error, ExtAddr, ExtPanId, PanId, Relationship, Result, ShortAddr};

/// Neighbor table entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NeighborEntry {
    /// Network address
    pub short: ShortAddr,
    /// IEEE address (`ExtAddr::UNKNOWN` until learned)
    pub ext: ExtAddr,
    /// Device role
    pub device_type: DeviceType,
    /// Receiver is on when idle
    pub rx_on_when_idle: bool,
    /// Relationship to us
    pub relationship: Relationship,
    /// Tree depth of the neighbor
    pub depth: u8,
    /// Last received link quality
    pub lqi: u8,
    /// Cost of the link from the neighbor to us (1..=7)
    pub incoming_cost: u8,
    /// Cost of the link from us to the neighbor, as reported by it (0 = unknown)
    pub outgoing_cost: u8,
    /// Link status periods since we last heard from a router neighbor
    pub age: u8,
    /// Beacon: accepting joins
    pub permit_joining: bool,
    /// Beacon source usable as a parent
    pub potential_parent: bool,
    /// Beacon: accepts router children
    pub router_capacity: bool,
    /// Beacon: accepts end device children
    pub end_device_capacity: bool,
    /// PAN of the neighbor
    pub pan_id: PanId,
    /// Extended PAN of the neighbor
    pub ext_pan_id: ExtPanId,
    /// Logical channel of the neighbor
    pub channel: u8,
    /// nwkUpdateId from the beacon
    pub update_id: u8,
}

impl NeighborEntry {
    /// Entry for a device heard on our own network
    #[must_use]
    pub const fn new(short: ShortAddr, ext: ExtAddr, device_type: DeviceType) -> Self {
        Self {
            short,
            ext,
            device_type,
            rx_on_when_idle: true,
            relationship: Relationship::None,
            depth: 0,
            lqi: 0,
            incoming_cost: MAX_LINK_COST,
            outgoing_cost: 0,
            age: 0,
            permit_joining: false,
            potential_parent: false,
            router_capacity: false,
            end_device_capacity: false,
            pan_id: PanId(0),
            ext_pan_id: ExtPanId::ANY,
            channel: 0,
            update_id: 0,
        }
    }

    /// Cost used for routing decisions (worst of both directions)
    #[must_use]
    pub const fn link_cost(&self) -> u8 {
        if self.outgoing_cost == 0 || self.incoming_cost > self.outgoing_cost {
            self.incoming_cost
        } else {
            self.outgoing_cost
        }
    }

    /// The neighbor relays frames
    #[must_use]
    pub const fn is_router(&self) -> bool {
        self.device_type.is_router_capable()
    }
}

/// Map a received LQI onto a 1..=7 link cost
#[must_use]
pub const fn lqi_to_cost(lqi: u8) -> u8 {
    match lqi {
        0..=31 => 7,
        32..=63 => 6,
        64..=95 => 5,
        96..=127 => 4,
        128..=159 => 3,
        160..=191 => 2,
        _ => 1,
    }
}

/// Fixed-size neighbor table
#[derive(Debug, Clone)]
pub struct NeighborTable {
    entries: [Option<NeighborEntry>; NEIGHBOR_TABLE_SIZE],
}

impl NeighborTable {
    /// Empty table
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: [None; NEIGHBOR_TABLE_SIZE],
        }
    }

    fn position_short(&self, short: ShortAddr) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| e.is_some_and(|n| n.short == short))
    }

    /// Insert an entry, or overwrite the one with the same short or IEEE address
    ///
    /// # Errors
    /// `NeighborTableFull` if the device is new and no slot is free. A free
    /// slot is reclaimed from a stale potential parent first.
    pub fn add_or_update(&mut self, entry: NeighborEntry) -> Result<()> {
        let existing = self.entries.iter().position(|e| {
            e.is_some_and(|n| {
                n.short == entry.short || (entry.ext.is_valid() && n.ext == entry.ext)
            })
        });
        let idx = existing
            .or_else(|| self.entries.iter().position(Option::is_none))
            .or_else(|| {
                self.entries.iter().position(|e| {
                    e.is_some_and(|n| n.potential_parent && n.relationship == Relationship::None)
                })
            })
            .ok_or(Error::NeighborTableFull)?;
        self.entries[idx] = Some(entry);
        Ok(())
    }

    /// Look up by network address
    #[must_use]
    pub fn find_short(&self, short: ShortAddr) -> Option<&NeighborEntry> {
        self.iter().find(|n| n.short == short)
    }

    /// Mutable lookup by network address
    pub fn find_short_mut(&mut self, short: ShortAddr) -> Option<&mut NeighborEntry> {
        self.entries.iter_mut().flatten().find(|n| n.short == short)
    }

    /// Look up by IEEE address
    #[must_use]
    pub fn find_ext(&self, ext: ExtAddr) -> Option<&NeighborEntry> {
        if !ext.is_valid() {
            return None;
        }
        self.iter().find(|n| n.ext == ext)
    }

    /// Remove by network address
    pub fn remove(&mut self, short: ShortAddr) -> Option<NeighborEntry> {
        let idx = self.position_short(short)?;
        self.entries[idx].take()
    }

    /// Our parent
    #[must_use]
    pub fn parent(&self) -> Option<&NeighborEntry> {
        self.iter().find(|n| n.relationship == Relationship::Parent)
    }

    /// Number of router children
    #[must_use]
    pub fn router_children(&self) -> usize {
        self.iter()
            .filter(|n| n.relationship.is_child() && n.is_router())
            .count()
    }

    /// Number of end device children
    #[must_use]
    pub fn end_device_children(&self) -> usize {
        self.iter()
            .filter(|n| n.relationship.is_child() && !n.is_router())
            .count()
    }

    /// Pick a parent among recorded beacon sources
    ///
    /// Candidates must be on `ext_pan_id` (unless `ANY`), permit joining,
    /// have capacity for our role and a link cost of at most 3. The lowest
    /// depth wins, then the best LQI.
    #[must_use]
    pub fn best_parent(&self, ext_pan_id: ExtPanId, as_router: bool) -> Option<&NeighborEntry> {
        self.iter()
            .filter(|n| n.potential_parent && n.permit_joining)
            .filter(|n| !ext_pan_id.is_specified() || n.ext_pan_id == ext_pan_id)
            .filter(|n| {
                if as_router {
                    n.router_capacity
                } else {
                    n.end_device_capacity
                }
            })
            .filter(|n| lqi_to_cost(n.lqi) <= 3)
            .min_by(|a, b| a.depth.cmp(&b.depth).then(b.lqi.cmp(&a.lqi)))
    }

    /// Drop beacon-only entries left over from a discovery
    pub fn clear_potential_parents(&mut self) {
        for slot in &mut self.entries {
            if slot.is_some_and(|n| n.potential_parent && n.relationship == Relationship::None) {
                *slot = None;
            }
        }
    }

    /// Age router neighbors by one link status period
    ///
    /// Routers that exceed the age limit are removed and returned through
    /// `expired` so the caller can purge routes through them. Our parent is
    /// never aged out here.
    pub fn age_routers(&mut self, mut expired: impl FnMut(ShortAddr)) {
        for slot in &mut self.entries {
            let Some(n) = slot else { continue };
            if !n.is_router() || n.potential_parent || n.relationship != Relationship::None {
                continue;
            }
            n.age = n.age.saturating_add(1);
            if n.age > ROUTER_AGE_LIMIT {
                let short = n.short;
                *slot = None;
                expired(short);
            }
        }
    }

    /// Iterate over entries
    pub fn iter(&self) -> impl Iterator<Item = &NeighborEntry> {
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
        self.entries = [None; NEIGHBOR_TABLE_SIZE];
    }
}

impl Default for NeighborTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn router(short: u16, ext: u64) -> NeighborEntry {
        NeighborEntry::new(ShortAddr(short), ExtAddr(ext), DeviceType::Router)
    }

    fn beacon(short: u16, depth: u8, lqi: u8) -> NeighborEntry {
        let mut n = router(short, u64::from(short) + 0x100);
        n.potential_parent = true;
        n.permit_joining = true;
        n.router_capacity = true;
        n.end_device_capacity = true;
        n.ext_pan_id = ExtPanId(0xAA);
        n.depth = depth;
        n.lqi = lqi;
        n
    }

    #[test]
    fn test_update_by_ext() {
        let mut table = NeighborTable::new();
        table.add_or_update(router(0x1111, 0x42)).unwrap();
        table.add_or_update(router(0x2222, 0x42)).unwrap();
        assert_eq!(table.len(), 1);
        assert!(table.find_ext(ExtAddr(0x42)).is_some_and(|n| n.short == ShortAddr(0x2222)));
    }

    #[test]
    fn test_full_table() {
        let mut table = NeighborTable::new();
        for i in 0..NEIGHBOR_TABLE_SIZE as u16 {
            table.add_or_update(router(i + 1, u64::from(i) + 1)).unwrap();
        }
        assert_eq!(table.add_or_update(router(0x7000, 0x7000)), Err(Error::NeighborTableFull));
    }

    #[test]
    fn test_best_parent_prefers_shallow_then_lqi() {
        let mut table = NeighborTable::new();
        table.add_or_update(beacon(0x0010, 2, 250)).unwrap();
        table.add_or_update(beacon(0x0020, 1, 180)).unwrap();
        table.add_or_update(beacon(0x0030, 1, 220)).unwrap();
        table.add_or_update(beacon(0x0040, 0, 10)).unwrap();
        let parent = table.best_parent(ExtPanId(0xAA), true).unwrap();
        assert_eq!(parent.short, ShortAddr(0x0030));
        assert!(table.best_parent(ExtPanId(0xBB), true).is_none());
    }

    #[test]
    fn test_age_routers_expires_silent() {
        let mut table = NeighborTable::new();
        table.add_or_update(router(0x0101, 1)).unwrap();
        let mut gone = None;
        for _ in 0..=ROUTER_AGE_LIMIT {
            table.age_routers(|addr| gone = Some(addr));
        }
        assert_eq!(gone, Some(ShortAddr(0x0101)));
        assert!(table.is_empty());
    }

    #[test]
    fn test_lqi_cost_bounds() {
        assert_eq!(lqi_to_cost(0), 7);
        assert_eq!(lqi_to_cost(255), 1);
        assert_eq!(lqi_to_cost(130), 3);
    }
}
