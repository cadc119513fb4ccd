// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Routing table

use q_common::constants::ROUTING_TABLE_SIZE;
use q_common::{Error, Result, ShortAddr};

/// Routing table entry status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum RouteStatus {
    /// Usable
    Active = 0,
    /// Route discovery in progress
    DiscoveryUnderway = 1,
    /// Last discovery failed
    DiscoveryFailed = 2,
    /// Slot reserved but unused
    Inactive = 3,
    /// Route being validated
    ValidationUnderway = 4,
}

impl RouteStatus {
    /// Parse the persisted encoding
    #[must_use]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Active),
            1 => Some(Self::DiscoveryUnderway),
            2 => Some(Self::DiscoveryFailed),
            3 => Some(Self::Inactive),
            4 => Some(Self::ValidationUnderway),
            _ => None,
        }
    }
}

/// Routing table entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RouteEntry {
    /// Destination
    pub dst: ShortAddr,
    /// Next hop toward the destination
    pub next_hop: ShortAddr,
    /// Entry status
    pub status: RouteStatus,
    /// Destination is a concentrator
    pub many_to_one: bool,
    /// Send a route record before the next data frame
    pub route_record_required: bool,
    /// Concentrator keeps no route record table
    pub no_route_cache: bool,
    /// Path cost learned during discovery
    pub path_cost: u8,
}

impl RouteEntry {
    /// Active route through `next_hop`
    #[must_use]
    pub const fn active(dst: ShortAddr, next_hop: ShortAddr, path_cost: u8) -> Self {
        Self {
            dst,
            next_hop,
            status: RouteStatus::Active,
            many_to_one: false,
            route_record_required: false,
            no_route_cache: false,
            path_cost,
        }
    }
}

/// Fixed-size routing table
#[derive(Debug, Clone)]
pub struct RoutingTable {
    entries: [Option<RouteEntry>; ROUTING_TABLE_SIZE],
}

impl RoutingTable {
    /// Empty table
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: [None; ROUTING_TABLE_SIZE],
        }
    }

    /// Entry for `dst`
    #[must_use]
    pub fn find(&self, dst: ShortAddr) -> Option<&RouteEntry> {
        self.iter().find(|e| e.dst == dst)
    }

    /// Mutable entry for `dst`
    pub fn find_mut(&mut self, dst: ShortAddr) -> Option<&mut RouteEntry> {
        self.entries.iter_mut().flatten().find(|e| e.dst == dst)
    }

    /// Next hop of an active route to `dst`
    #[must_use]
    pub fn active_next_hop(&self, dst: ShortAddr) -> Option<ShortAddr> {
        self.find(dst)
            .filter(|e| e.status == RouteStatus::Active)
            .map(|e| e.next_hop)
    }

    fn slot_for(&mut self, dst: ShortAddr) -> Result<&mut Option<RouteEntry>> {
        let idx = self
            .entries
            .iter()
            .position(|e| e.is_some_and(|r| r.dst == dst))
            .or_else(|| self.entries.iter().position(Option::is_none))
            .or_else(|| {
                self.entries.iter().position(|e| {
                    e.is_some_and(|r| {
                        matches!(r.status, RouteStatus::DiscoveryFailed | RouteStatus::Inactive)
                    })
                })
            })
            .ok_or(Error::RoutingTableFull)?;
        Ok(&mut self.entries[idx])
    }

    /// Mark a route to `dst` as being discovered
    ///
    /// An existing active route keeps its next hop until the discovery
    /// replaces it.
    ///
    /// # Errors
    /// `RoutingTableFull` if no slot is free or reclaimable.
    pub fn reserve_discovery(&mut self, dst: ShortAddr) -> Result<()> {
        let slot = self.slot_for(dst)?;
        if let Some(entry) = slot.as_mut().filter(|e| e.dst == dst) {
            if entry.status != RouteStatus::Active {
                entry.status = RouteStatus::DiscoveryUnderway;
            }
            return Ok(());
        }
        *slot = Some(RouteEntry {
            status: RouteStatus::DiscoveryUnderway,
            ..RouteEntry::active(dst, ShortAddr::UNASSIGNED, 0)
        });
        Ok(())
    }

    /// Install or refresh a route
    ///
    /// # Errors
    /// `RoutingTableFull` if no slot is free or reclaimable.
    pub fn set_active(&mut self, entry: RouteEntry) -> Result<()> {
        let slot = self.slot_for(entry.dst)?;
        *slot = Some(RouteEntry {
            status: RouteStatus::Active,
            ..entry
        });
        Ok(())
    }

    /// Mark the route to `dst` as failed; returns whether one existed
    pub fn mark_failed(&mut self, dst: ShortAddr) -> bool {
        match self.find_mut(dst) {
            Some(entry) => {
                entry.status = RouteStatus::DiscoveryFailed;
                true
            }
            None => false,
        }
    }

    /// Remove the entry for `dst`
    pub fn remove(&mut self, dst: ShortAddr) -> Option<RouteEntry> {
        self.entries
            .iter_mut()
            .find(|e| e.is_some_and(|r| r.dst == dst))
            .and_then(Option::take)
    }

    /// Remove every entry whose destination or next hop is `addr`
    ///
    /// Returns the number of entries removed.
    pub fn delete_route(&mut self, addr: ShortAddr) -> usize {
        let mut removed = 0;
        for slot in &mut self.entries {
            if slot.is_some_and(|r| r.dst == addr || r.next_hop == addr) {
                *slot = None;
                removed += 1;
            }
        }
        removed
    }

    /// Check whether any entry references `addr`
    #[must_use]
    pub fn contains_addr(&self, addr: ShortAddr) -> bool {
        self.iter().any(|r| r.dst == addr || r.next_hop == addr)
    }

    /// Iterate over entries
    pub fn iter(&self) -> impl Iterator<Item = &RouteEntry> {
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
        self.entries = [None; ROUTING_TABLE_SIZE];
    }
}

impl Default for RoutingTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discovery_then_active() {
        let mut table = RoutingTable::new();
        table.reserve_discovery(ShortAddr(0x5000)).unwrap();
        assert_eq!(table.active_next_hop(ShortAddr(0x5000)), None);
        assert_eq!(
            table.find(ShortAddr(0x5000)).map(|e| e.status),
            Some(RouteStatus::DiscoveryUnderway)
        );
        table
            .set_active(RouteEntry::active(ShortAddr(0x5000), ShortAddr(0x0001), 3))
            .unwrap();
        assert_eq!(table.active_next_hop(ShortAddr(0x5000)), Some(ShortAddr(0x0001)));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_delete_route_purges_dst_and_next_hop() {
        let mut table = RoutingTable::new();
        let gone = ShortAddr(0x5678);
        table.set_active(RouteEntry::active(gone, ShortAddr(0x0001), 1)).unwrap();
        table.set_active(RouteEntry::active(ShortAddr(0x1000), gone, 2)).unwrap();
        table.set_active(RouteEntry::active(ShortAddr(0x2000), ShortAddr(0x0003), 2)).unwrap();
        assert_eq!(table.delete_route(gone), 2);
        assert!(!table.contains_addr(gone));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_full_table_reclaims_failed() {
        let mut table = RoutingTable::new();
        for i in 0..ROUTING_TABLE_SIZE as u16 {
            table.set_active(RouteEntry::active(ShortAddr(0x100 + i), ShortAddr(1), 1)).unwrap();
        }
        assert_eq!(table.reserve_discovery(ShortAddr(0x7000)), Err(Error::RoutingTableFull));
        assert!(table.mark_failed(ShortAddr(0x100)));
        table.reserve_discovery(ShortAddr(0x7000)).unwrap();
        assert!(table.find(ShortAddr(0x100)).is_none());
    }
}
