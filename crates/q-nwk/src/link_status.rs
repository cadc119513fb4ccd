// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Periodic link status
//!
//! Routers broadcast their router neighbors with both link costs once per
//! period, then age those neighbors. A neighbor silent for more than
//! `ROUTER_AGE_LIMIT` periods is dropped along with routes through it.

use heapless::Vec;
use q_common::constants::{MAX_LINK_COST, NEIGHBOR_TABLE_SIZE};
use q_common::{log_debug, log_info, log_warn};
use q_common::{DeviceType, ShortAddr};
use q_hal::RngInterface;

use crate::command::{LinkStatus, LinkStatusEntry, NwkCommand};
use crate::engine::Nwk;
use crate::frame::NwkHeader;
use crate::mac::MacService;
use crate::neighbor::NeighborEntry;
use crate::security::SecurityProvider;
use crate::tx::{OutRequest, TrafficClass, TxOwner};
use crate::upper::UpperLayer;

/// Link status entries for the router neighbors in `neighbors`, sorted by address
pub(crate) fn link_status_entries<'a>(
    neighbors: impl Iterator<Item = &'a NeighborEntry>,
) -> Vec<LinkStatusEntry, NEIGHBOR_TABLE_SIZE> {
    let mut entries: Vec<LinkStatusEntry, NEIGHBOR_TABLE_SIZE> = Vec::new();
    for n in neighbors.filter(|n| n.is_router() && !n.potential_parent) {
        let entry = LinkStatusEntry {
            addr: n.short,
            incoming_cost: n.incoming_cost.min(MAX_LINK_COST),
            outgoing_cost: n.outgoing_cost.min(MAX_LINK_COST),
        };
        if entries.push(entry).is_err() {
            break;
        }
    }
    entries.sort_unstable_by_key(|e| e.addr);
    entries
}

impl<M, S, U, R> Nwk<M, S, U, R>
where
    M: MacService,
    S: SecurityProvider,
    U: UpperLayer,
    R: RngInterface,
{
    pub(crate) fn run_link_status(&mut self) {
        if !self.nib.joined || !self.nib.router_started {
            return;
        }

        let command = NwkCommand::LinkStatus(LinkStatus {
            first: true,
            last: true,
            entries: link_status_entries(self.neighbors.iter()),
        });
        let header = self.command_header(ShortAddr::ALL_ROUTERS, 1);
        let out = OutRequest::new(header, TxOwner::Command, TrafficClass::Broadcast);
        if let Err(e) = self.send_command(out, &command) {
            log_warn!(self.log, self.now.as_millis(), "nwk.link", "link status skipped: {}", e);
        }

        let now = self.now.as_millis();
        let mut expired: Vec<ShortAddr, NEIGHBOR_TABLE_SIZE> = Vec::new();
        self.neighbors.age_routers(|short| {
            if expired.push(short).is_err() {
                log_warn!(self.log, now, "nwk.link", "router {} aged out, routes kept", short);
            }
        });
        for short in expired {
            log_info!(self.log, self.now.as_millis(), "nwk.link", "router {} aged out", short);
            self.delete_route(short);
        }
    }

    pub(crate) fn link_status_received(&mut self, header: &NwkHeader, status: &LinkStatus) {
        if !self.nib.is_router() {
            return;
        }
        let own = self.nib.short_addr();
        // The sender's incoming cost from us is our outgoing cost to it
        let outgoing = status
            .entries
            .iter()
            .find(|e| e.addr == own)
            .map_or(0, |e| e.incoming_cost);

        let mut entry = match self.neighbors.find_short(header.src) {
            Some(existing) => *existing,
            None => {
                let device_type = if header.src == ShortAddr::COORDINATOR {
                    DeviceType::Coordinator
                } else {
                    DeviceType::Router
                };
                let mut fresh = NeighborEntry::new(header.src, header.src_ext.unwrap_or_default(), device_type);
                fresh.pan_id = self.nib.pib.pan_id;
                fresh.ext_pan_id = self.nib.ext_pan_id;
                fresh.channel = self.nib.pib.channel;
                fresh
            }
        };
        entry.outgoing_cost = outgoing;
        entry.age = 0;
        entry.potential_parent = false;
        if let Some(ext) = header.src_ext {
            entry.ext = ext;
        }
        match self.neighbors.add_or_update(entry) {
            Ok(()) => {
                log_debug!(self.log, self.now.as_millis(), "nwk.link", "{} out cost {}", header.src, outgoing);
            }
            Err(e) => {
                log_debug!(self.log, self.now.as_millis(), "nwk.link", "{} not tracked: {}", header.src, e);
            }
        }
    }
}
