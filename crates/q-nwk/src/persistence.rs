// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Persistence snapshot
//!
//! The engine never touches storage media. When its persistent state has
//! changed it offers an [`NwkSnapshot`] to a [`PersistenceHook`]; after a
//! power cycle the platform hands the decoded snapshot back through
//! `Nwk::restore`.
//!
//! # Format (little endian)
//!
//! ```text
//! magic(2) version(1) flags(1) pan(2) short(2) channel(1) ext_pan(8)
//! depth(1) update_id(1) parent(2) parent_ext(8) routers(1) end_devices(1)
//! map_count(1) { short(2) ext(8) }*
//! route_count(1) { dst(2) next_hop(2) status(1) flags(1) cost(1) }*
//! ```

use heapless::Vec;
use q_common::constants::{ADDRESS_MAP_SIZE, ROUTING_TABLE_SIZE};
use q_common::{Error, ExtAddr, ExtPanId, PanId, Result, ShortAddr};

use crate::address_map::AddressMapEntry;
use crate::routing::{RouteEntry, RouteStatus};

/// Snapshot magic ("NW")
pub const SNAPSHOT_MAGIC: u16 = 0x574E;

/// Snapshot format version
pub const SNAPSHOT_VERSION: u8 = 1;

/// Largest encoded snapshot
pub const MAX_SNAPSHOT_SIZE: usize = 36 + ADDRESS_MAP_SIZE * 10 + ROUTING_TABLE_SIZE * 7;

const FIXED_LEN: usize = 32;

/// Encoded snapshot bytes
pub type SnapshotBytes = Vec<u8, MAX_SNAPSHOT_SIZE>;

/// Persistent NWK state
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NwkSnapshot {
    /// Device had joined or formed a network
    pub joined: bool,
    /// Router functions had been started
    pub router_started: bool,
    /// macPANId
    pub pan_id: PanId,
    /// macShortAddress
    pub short_addr: ShortAddr,
    /// phyCurrentChannel
    pub channel: u8,
    /// nwkExtendedPANID
    pub ext_pan_id: ExtPanId,
    /// Tree depth
    pub depth: u8,
    /// nwkUpdateId
    pub update_id: u8,
    /// Parent network address (unassigned for the coordinator)
    pub parent: ShortAddr,
    /// Parent IEEE address
    pub parent_ext: ExtAddr,
    /// Router children allocated (tree addressing)
    pub routers_allocated: u8,
    /// End device children allocated (tree addressing)
    pub end_devices_allocated: u8,
    /// Address map
    pub address_map: Vec<AddressMapEntry, ADDRESS_MAP_SIZE>,
    /// Routing table
    pub routes: Vec<RouteEntry, ROUTING_TABLE_SIZE>,
}

/// Storage collaborator
pub trait PersistenceHook {
    /// Store a snapshot
    ///
    /// # Errors
    /// Any storage failure; the engine keeps the state dirty and offers it
    /// again later.
    fn store(&mut self, snapshot: &NwkSnapshot) -> Result<()>;
}

fn put(out: &mut SnapshotBytes, bytes: &[u8]) -> Result<()> {
    out.extend_from_slice(bytes).map_err(|()| Error::BufferTooSmall)
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let slice = self
            .bytes
            .get(self.pos..self.pos + n)
            .ok_or(Error::BufferTooSmall)?;
        self.pos += n;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn u64(&mut self) -> Result<u64> {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(self.take(8)?);
        Ok(u64::from_le_bytes(raw))
    }
}

impl NwkSnapshot {
    /// Serialize
    ///
    /// # Errors
    /// `BufferTooSmall` never occurs for snapshots built by the engine.
    pub fn to_bytes(&self) -> Result<SnapshotBytes> {
        let mut out = SnapshotBytes::new();
        put(&mut out, &SNAPSHOT_MAGIC.to_le_bytes())?;
        put(&mut out, &[SNAPSHOT_VERSION])?;
        let flags = u8::from(self.joined) | (u8::from(self.router_started) << 1);
        put(&mut out, &[flags])?;
        put(&mut out, &self.pan_id.0.to_le_bytes())?;
        put(&mut out, &self.short_addr.to_le_bytes())?;
        put(&mut out, &[self.channel])?;
        put(&mut out, &self.ext_pan_id.0.to_le_bytes())?;
        put(&mut out, &[self.depth, self.update_id])?;
        put(&mut out, &self.parent.to_le_bytes())?;
        put(&mut out, &self.parent_ext.to_le_bytes())?;
        put(&mut out, &[self.routers_allocated, self.end_devices_allocated])?;

        put(&mut out, &[self.address_map.len() as u8])?;
        for entry in &self.address_map {
            put(&mut out, &entry.short.to_le_bytes())?;
            put(&mut out, &entry.ext.to_le_bytes())?;
        }

        put(&mut out, &[self.routes.len() as u8])?;
        for route in &self.routes {
            put(&mut out, &route.dst.to_le_bytes())?;
            put(&mut out, &route.next_hop.to_le_bytes())?;
            let flags = u8::from(route.many_to_one)
                | (u8::from(route.route_record_required) << 1)
                | (u8::from(route.no_route_cache) << 2);
            put(&mut out, &[route.status as u8, flags, route.path_cost])?;
        }
        Ok(out)
    }

    /// Deserialize
    ///
    /// # Errors
    /// `BufferTooSmall` on truncation, `InvalidParameter` for a bad magic,
    /// version or field value.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < FIXED_LEN {
            return Err(Error::BufferTooSmall);
        }
        let mut r = Reader { bytes, pos: 0 };
        if r.u16()? != SNAPSHOT_MAGIC || r.u8()? != SNAPSHOT_VERSION {
            return Err(Error::InvalidParameter);
        }
        let flags = r.u8()?;
        let mut snapshot = Self {
            joined: flags & 0x01 != 0,
            router_started: flags & 0x02 != 0,
            pan_id: PanId(r.u16()?),
            short_addr: ShortAddr(r.u16()?),
            channel: r.u8()?,
            ext_pan_id: ExtPanId(r.u64()?),
            depth: r.u8()?,
            update_id: r.u8()?,
            parent: ShortAddr(r.u16()?),
            parent_ext: ExtAddr(r.u64()?),
            routers_allocated: r.u8()?,
            end_devices_allocated: r.u8()?,
            address_map: Vec::new(),
            routes: Vec::new(),
        };

        let map_count = r.u8()?;
        for _ in 0..map_count {
            let entry = AddressMapEntry {
                short: ShortAddr(r.u16()?),
                ext: ExtAddr(r.u64()?),
            };
            snapshot
                .address_map
                .push(entry)
                .map_err(|_| Error::InvalidParameter)?;
        }

        let route_count = r.u8()?;
        for _ in 0..route_count {
            let dst = ShortAddr(r.u16()?);
            let next_hop = ShortAddr(r.u16()?);
            let status = RouteStatus::from_u8(r.u8()?).ok_or(Error::InvalidParameter)?;
            let flags = r.u8()?;
            let path_cost = r.u8()?;
            snapshot
                .routes
                .push(RouteEntry {
                    dst,
                    next_hop,
                    status,
                    many_to_one: flags & 0x01 != 0,
                    route_record_required: flags & 0x02 != 0,
                    no_route_cache: flags & 0x04 != 0,
                    path_cost,
                })
                .map_err(|_| Error::InvalidParameter)?;
        }
        Ok(snapshot)
    }
}
