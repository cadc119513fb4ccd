// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Address map: short address to IEEE address bindings

use q_common::constants::ADDRESS_MAP_SIZE;
use q_common::{Error, ExtAddr, Result, ShortAddr};

/// One binding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AddressMapEntry {
    /// Network address
    pub short: ShortAddr,
    /// IEEE address
    pub ext: ExtAddr,
}

/// Outcome of [`AddressMap::insert`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapUpdate {
    /// New binding stored
    Added,
    /// The device changed its short address
    Updated,
    /// Binding already known
    Unchanged,
    /// The short address is bound to a different device
    Conflict(ExtAddr),
}

/// Fixed-size address map
#[derive(Debug, Clone)]
pub struct AddressMap {
    entries: [Option<AddressMapEntry>; ADDRESS_MAP_SIZE],
}

impl AddressMap {
    /// Empty map
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: [None; ADDRESS_MAP_SIZE],
        }
    }

    /// Record a binding
    ///
    /// A conflicting binding is reported and left as it was.
    ///
    /// # Errors
    /// `AddressMapFull` when the device is new and no slot is free,
    /// `InvalidParameter` for reserved or unknown addresses.
    pub fn insert(&mut self, short: ShortAddr, ext: ExtAddr) -> Result<MapUpdate> {
        if !short.is_unicast() || !ext.is_valid() {
            return Err(Error::InvalidParameter);
        }
        if let Some(other) = self.iter().find(|e| e.short == short && e.ext != ext) {
            return Ok(MapUpdate::Conflict(other.ext));
        }
        if let Some(entry) = self.entries.iter_mut().flatten().find(|e| e.ext == ext) {
            if entry.short == short {
                return Ok(MapUpdate::Unchanged);
            }
            entry.short = short;
            return Ok(MapUpdate::Updated);
        }
        let slot = self
            .entries
            .iter_mut()
            .find(|e| e.is_none())
            .ok_or(Error::AddressMapFull)?;
        *slot = Some(AddressMapEntry { short, ext });
        Ok(MapUpdate::Added)
    }

    /// Short address bound to `ext`
    #[must_use]
    pub fn short_of(&self, ext: ExtAddr) -> Option<ShortAddr> {
        self.iter().find(|e| e.ext == ext).map(|e| e.short)
    }

    /// IEEE address bound to `short`
    #[must_use]
    pub fn ext_of(&self, short: ShortAddr) -> Option<ExtAddr> {
        self.iter().find(|e| e.short == short).map(|e| e.ext)
    }

    /// Check whether a short address is bound
    #[must_use]
    pub fn contains_short(&self, short: ShortAddr) -> bool {
        self.ext_of(short).is_some()
    }

    /// Remove the binding for `short`
    pub fn remove(&mut self, short: ShortAddr) -> Option<AddressMapEntry> {
        self.entries
            .iter_mut()
            .find(|e| e.is_some_and(|b| b.short == short))
            .and_then(Option::take)
    }

    /// Iterate over bindings
    pub fn iter(&self) -> impl Iterator<Item = &AddressMapEntry> {
        self.entries.iter().flatten()
    }

    /// Number of bindings
    #[must_use]
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    /// Check for an empty map
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove every binding
    pub fn clear(&mut self) {
        self.entries = [None; ADDRESS_MAP_SIZE];
    }
}

impl Default for AddressMap {
    fn default() -> Self {
        Self::new()
    }
}
