// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Address allocator
//!
//! Two schemes:
//!
//! - **Tree**: every router owns a contiguous block sized by Cskip(depth)
//!   and hands out router sub-blocks and end device addresses linearly.
//! - **Stochastic**: addresses are drawn at random and re-rolled until they
//!   collide with nothing we know about.
//!
//! Exhaustion is reported to the caller and never retried here.

use q_common::{AddressingMode, Error, ExtAddr, NwkConfig, Result, ShortAddr};
use q_hal::RngInterface;

use crate::address_map::AddressMap;
use crate::neighbor::NeighborTable;
use crate::routing::RoutingTable;

/// Random draws before stochastic allocation gives up
pub const MAX_ALLOCATION_ATTEMPTS: usize = 16;

/// Largest address stochastic allocation may return
const STOCHASTIC_MAX: u16 = ShortAddr::BROADCAST_RANGE_START - 1;

/// Contiguous block of network addresses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddrRange {
    /// First address
    pub start: ShortAddr,
    /// Number of addresses
    pub size: u16,
}

impl AddrRange {
    /// Check whether the block holds `addr`
    #[must_use]
    pub const fn contains(&self, addr: ShortAddr) -> bool {
        addr.0 >= self.start.0 && (addr.0 as u32) < self.start.0 as u32 + self.size as u32
    }

    /// Check whether two blocks share an address
    #[must_use]
    pub const fn overlaps(&self, other: &Self) -> bool {
        let a_end = self.start.0 as u32 + self.size as u32;
        let b_end = other.start.0 as u32 + other.size as u32;
        (self.start.0 as u32) < b_end && (other.start.0 as u32) < a_end
    }
}

/// Tables an allocated address must not collide with
#[derive(Clone, Copy)]
pub struct AddressUsage<'a> {
    /// Neighbor table
    pub neighbors: &'a NeighborTable,
    /// Routing table
    pub routes: &'a RoutingTable,
    /// Address map
    pub address_map: &'a AddressMap,
    /// Our own address
    pub own: ShortAddr,
}

impl AddressUsage<'_> {
    /// Check whether `addr` is used by a device other than `ext`
    #[must_use]
    pub fn is_taken(&self, addr: ShortAddr, ext: ExtAddr) -> bool {
        if addr == self.own || !addr.is_unicast() {
            return true;
        }
        if let Some(owner) = self.address_map.ext_of(addr) {
            return owner != ext;
        }
        if let Some(n) = self.neighbors.find_short(addr) {
            return n.ext != ext;
        }
        self.routes.contains_addr(addr)
    }
}

/// Address allocator state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressAllocator {
    mode: AddressingMode,
    max_children: u8,
    max_routers: u8,
    max_depth: u8,
    routers_allocated: u8,
    end_devices_allocated: u8,
}

impl AddressAllocator {
    /// Allocator for the given configuration
    #[must_use]
    pub const fn new(config: &NwkConfig) -> Self {
        Self {
            mode: config.addressing,
            max_children: config.max_children,
            max_routers: config.max_routers,
            max_depth: config.max_depth,
            routers_allocated: 0,
            end_devices_allocated: 0,
        }
    }

    /// Addressing scheme in use
    #[must_use]
    pub const fn mode(&self) -> AddressingMode {
        self.mode
    }

    /// Router and end device children allocated so far (tree mode)
    #[must_use]
    pub const fn allocated(&self) -> (u8, u8) {
        (self.routers_allocated, self.end_devices_allocated)
    }

    /// Restore allocation counters (tree mode)
    pub fn set_allocated(&mut self, routers: u8, end_devices: u8) {
        self.routers_allocated = routers;
        self.end_devices_allocated = end_devices;
    }

    /// Forget every allocation
    pub fn reset(&mut self) {
        self.routers_allocated = 0;
        self.end_devices_allocated = 0;
    }

    /// Cskip(depth): size of the block a router at `depth` gives each router child
    #[must_use]
    pub fn cskip(&self, depth: u8) -> u16 {
        if depth >= self.max_depth {
            return 0;
        }
        let cm = i64::from(self.max_children);
        let rm = i64::from(self.max_routers);
        let exp = u32::from(self.max_depth - depth - 1);
        let skip = if rm == 1 {
            1 + cm * i64::from(exp)
        } else {
            let Some(pow) = rm.checked_pow(exp) else {
                return u16::MAX;
            };
            (1 + cm - rm - cm.saturating_mul(pow)) / (1 - rm)
        };
        u16::try_from(skip.max(0)).unwrap_or(u16::MAX)
    }

    /// Block of the `n`th router child (1-based) of `parent` at `depth`
    ///
    /// # Errors
    /// `InvalidParameter` if `n` is zero or beyond nwkMaxRouters,
    /// `AddressSpaceExhausted` if the block would not fit below the
    /// broadcast range.
    pub fn cskip_block(&self, parent: ShortAddr, depth: u8, n: u8) -> Result<AddrRange> {
        if n == 0 || n > self.max_routers {
            return Err(Error::InvalidParameter);
        }
        let skip = u32::from(self.cskip(depth));
        if skip == 0 {
            return Err(Error::AddressSpaceExhausted);
        }
        let start = u32::from(parent.0) + 1 + skip * u32::from(n - 1);
        if start + skip > u32::from(ShortAddr::BROADCAST_RANGE_START) {
            return Err(Error::AddressSpaceExhausted);
        }
        Ok(AddrRange {
            start: ShortAddr(start as u16),
            size: skip as u16,
        })
    }

    /// Allocate an address for a joining device
    ///
    /// `requested` is honored when it is a non-reserved address not used by
    /// another device (rejoin with a known address). Otherwise the next tree
    /// address or a fresh stochastic address is returned.
    ///
    /// # Errors
    /// `AddressSpaceExhausted` when no address can be handed out.
    pub fn allocate_short_addr<R: RngInterface>(
        &mut self,
        is_router: bool,
        requested: ShortAddr,
        ext: ExtAddr,
        depth: u8,
        usage: &AddressUsage<'_>,
        rng: &mut R,
    ) -> Result<ShortAddr> {
        if requested.is_unicast() && !usage.is_taken(requested, ext) {
            return Ok(requested);
        }
        match self.mode {
            AddressingMode::Tree => self.allocate_tree(is_router, ext, depth, usage),
            AddressingMode::Stochastic => {
                let candidate = random_candidate(rng)?;
                Self::allocate_non_conflicting_addr(candidate, ext, usage, rng)
            }
        }
    }

    fn allocate_tree(
        &mut self,
        is_router: bool,
        ext: ExtAddr,
        depth: u8,
        usage: &AddressUsage<'_>,
    ) -> Result<ShortAddr> {
        let own = u32::from(usage.own.0);
        let skip = u32::from(self.cskip(depth));
        if is_router {
            while self.routers_allocated < self.max_routers {
                self.routers_allocated += 1;
                let block = self.cskip_block(usage.own, depth, self.routers_allocated)?;
                if !usage.is_taken(block.start, ext) {
                    return Ok(block.start);
                }
            }
        } else {
            let max_end_devices = self.max_children.saturating_sub(self.max_routers);
            while self.end_devices_allocated < max_end_devices {
                self.end_devices_allocated += 1;
                let addr = own + skip * u32::from(self.max_routers)
                    + u32::from(self.end_devices_allocated);
                if addr >= u32::from(ShortAddr::BROADCAST_RANGE_START) {
                    break;
                }
                let addr = ShortAddr(addr as u16);
                if !usage.is_taken(addr, ext) {
                    return Ok(addr);
                }
            }
        }
        Err(Error::AddressSpaceExhausted)
    }

    /// Re-roll `candidate` until it collides with nothing in `usage`
    ///
    /// # Errors
    /// `AddressSpaceExhausted` after [`MAX_ALLOCATION_ATTEMPTS`] collisions.
    pub fn allocate_non_conflicting_addr<R: RngInterface>(
        candidate: ShortAddr,
        ext: ExtAddr,
        usage: &AddressUsage<'_>,
        rng: &mut R,
    ) -> Result<ShortAddr> {
        let mut addr = candidate;
        for _ in 0..MAX_ALLOCATION_ATTEMPTS {
            if !usage.is_taken(addr, ext) {
                return Ok(addr);
            }
            addr = random_candidate(rng)?;
        }
        Err(Error::AddressSpaceExhausted)
    }

    /// Router child that leads to descendant `dst`, if `dst` is below us
    ///
    /// Returns `Some(dst)` for our own end device children.
    #[must_use]
    pub fn tree_next_hop(&self, own: ShortAddr, depth: u8, dst: ShortAddr) -> Option<ShortAddr> {
        if !self.is_descendant(own, depth, dst) {
            return None;
        }
        let skip = u32::from(self.cskip(depth));
        let a = u32::from(own.0);
        let d = u32::from(dst.0);
        if skip == 0 || d > a + u32::from(self.max_routers) * skip {
            return Some(dst);
        }
        let hop = a + 1 + ((d - a - 1) / skip) * skip;
        Some(ShortAddr(hop as u16))
    }

    /// Check whether `dst` lies in the block owned by `own` at `depth`
    #[must_use]
    pub fn is_descendant(&self, own: ShortAddr, depth: u8, dst: ShortAddr) -> bool {
        if dst == own || !dst.is_unicast() {
            return false;
        }
        if depth == 0 {
            return true;
        }
        let block = u32::from(self.cskip(depth - 1));
        let a = u32::from(own.0);
        let d = u32::from(dst.0);
        d > a && d < a + block
    }
}

pub(crate) fn random_candidate<R: RngInterface>(rng: &mut R) -> Result<ShortAddr> {
    let raw = rng.next_up_to(u32::from(STOCHASTIC_MAX) - 1)?;
    // 0x0001..=0xFFF7
    Ok(ShortAddr(raw as u16 + 1))
}

/// Decide whether a frame sent to `dst` is for this device
///
/// Unicast destinations are never broadcast targets.
#[must_use]
pub const fn is_broadcast_target_for_self(dst: ShortAddr, rx_on_when_idle: bool, is_router: bool) -> bool {
    match dst {
        ShortAddr::ALL_DEVICES => true,
        ShortAddr::RX_ON_WHEN_IDLE => rx_on_when_idle,
        ShortAddr::ALL_ROUTERS => is_router,
        _ => false,
    }
}
