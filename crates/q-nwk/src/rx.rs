// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Receive path
//!
//! MAC data indications are copied into a small inbox; the `Rx` task takes
//! one frame per run and decides whether to deliver it, relay it, answer it
//! or drop it.

use q_common::constants::MAX_LINK_COST;
use q_common::{log_debug, log_info, log_warn};
use q_common::{DeviceType, Error, ExtAddr, Millis, Relationship, Result, ShortAddr};
use q_hal::RngInterface;

use crate::address_map::MapUpdate;
use crate::addressing::is_broadcast_target_for_self;
use crate::command::{
    CommandId, LeaveCommand, ManyToOne, NetworkStatus, NetworkStatusCode, NwkCommand, RouteRecord, RouteReply,
    RouteRequest,
};
use crate::engine::{Nwk, NwkTask};
use crate::frame::{FrameBuf, FrameType, NwkHeader};
use crate::mac::{MacDataIndication, MacService};
use crate::neighbor::lqi_to_cost;
use crate::routing::{accumulate_cost, RequestVerdict, RouteEntry};
use crate::security::SecurityProvider;
use crate::tx::{OutRequest, TrafficClass, TxOwner, TxState};
use crate::upper::{LeaveRequest, NwkIndication, RequestHandle, UpperLayer};

/// A received frame waiting for the `Rx` task
#[derive(Debug, Clone)]
pub struct RxFrame {
    /// Complete NWK frame
    pub frame: FrameBuf,
    /// MAC source
    pub prev_hop: ShortAddr,
    /// MAC destination
    pub mac_dst: ShortAddr,
    /// Link quality
    pub lqi: u8,
    /// Copied from our own transmit path
    pub loopback: bool,
}

impl<M, S, U, R> Nwk<M, S, U, R>
where
    M: MacService,
    S: SecurityProvider,
    U: UpperLayer,
    R: RngInterface,
{
    /// Queue a MAC data indication for the `Rx` task
    pub(crate) fn receive(&mut self, data: &MacDataIndication<'_>) {
        let Ok(frame) = FrameBuf::from_slice(data.payload) else {
            log_warn!(self.log, self.now.as_millis(), "nwk.rx", "oversized frame from {}", data.src);
            return;
        };
        let rx = RxFrame {
            frame,
            prev_hop: data.src,
            mac_dst: data.dst,
            lqi: data.lqi,
            loopback: false,
        };
        if self.inbox.push_back(rx).is_err() {
            log_warn!(self.log, self.now.as_millis(), "nwk.rx", "inbox full, frame from {} dropped", data.src);
            return;
        }
        self.scheduler.post(NwkTask::Rx);
    }

    pub(crate) fn run_rx(&mut self) {
        if let Some(mut rx) = self.inbox.pop_front() {
            if let Err(e) = self.process_frame(&mut rx) {
                log_debug!(self.log, self.now.as_millis(), "nwk.rx", "frame from {} dropped: {}", rx.prev_hop, e);
            }
        }
        if !self.inbox.is_empty() {
            self.scheduler.post(NwkTask::Rx);
        }
    }

    fn process_frame(&mut self, rx: &mut RxFrame) -> Result<()> {
        let (header, header_len) = NwkHeader::decode(&rx.frame)?;
        let own = self.nib.short_addr();
        let joined = self.nib.joined;

        if joined && header.src == own && !rx.loopback {
            // Our own frame coming back, unless another device carries our address
            if header.src_ext.is_some_and(|ext| ext != self.nib.ext_addr()) {
                self.note_address(&header);
            }
            return Ok(());
        }

        let secured = header.security;
        if !rx.loopback && self.security.is_decryption_required(&header) {
            if let Err(e) = self
                .security
                .decrypt_input_packet(&self.nib.keys, header_len, &mut rx.frame)
            {
                log_warn!(self.log, self.now.as_millis(), "nwk.sec", "unsecure from {} failed: {}", header.src, e);
                return Err(e);
            }
        }

        if !joined {
            let is_rejoin_response = header.frame_type == FrameType::Command
                && rx.frame.get(header_len) == Some(&(CommandId::RejoinResponse as u8));
            if !is_rejoin_response {
                return Ok(());
            }
        }

        if !rx.loopback {
            self.note_neighbor_frame(rx.prev_hop, rx.lqi);
            self.note_address(&header);
        }

        if header.dst.is_broadcast() || header.multicast.is_some() {
            return self.process_flood(&header, header_len, rx);
        }

        if header.dst == own || !joined {
            return match header.frame_type {
                FrameType::Data => {
                    self.deliver_data(&header, header_len, rx, secured);
                    Ok(())
                }
                FrameType::Command => self.process_command(&header, header_len, rx),
            };
        }

        self.relay_unicast(&header, header_len, rx)
    }

    fn note_neighbor_frame(&mut self, prev_hop: ShortAddr, lqi: u8) {
        if let Some(neighbor) = self.neighbors.find_short_mut(prev_hop) {
            neighbor.lqi = lqi;
            neighbor.incoming_cost = lqi_to_cost(lqi);
        }
    }

    /// Learn the source binding and watch for duplicate addresses
    fn note_address(&mut self, header: &NwkHeader) {
        let Some(ext) = header.src_ext else {
            return;
        };
        let own = self.nib.short_addr();
        if header.src == own {
            if ext != self.nib.ext_addr() {
                log_warn!(self.log, self.now.as_millis(), "nwk.addr", "our address {} used by {}", own, ext);
                self.upper.indication(NwkIndication::NwkStatus {
                    addr: own,
                    code: NetworkStatusCode::AddressConflict,
                });
            }
            return;
        }
        match self.address_map.insert(header.src, ext) {
            Ok(MapUpdate::Added | MapUpdate::Updated) => self.dirty = true,
            Ok(MapUpdate::Unchanged) => {}
            Ok(MapUpdate::Conflict(other)) => {
                log_warn!(self.log, self.now.as_millis(), "nwk.addr", "{} claimed by {} and {}", header.src, other, ext);
                if self.nib.is_router() {
                    self.send_network_status(ShortAddr::RX_ON_WHEN_IDLE, NetworkStatusCode::AddressConflict, header.src);
                }
                self.upper.indication(NwkIndication::NwkStatus {
                    addr: header.src,
                    code: NetworkStatusCode::AddressConflict,
                });
            }
            Err(e) => {
                log_debug!(self.log, self.now.as_millis(), "nwk.addr", "map {} skipped: {}", header.src, e);
            }
        }
    }

    fn deliver_data(&mut self, header: &NwkHeader, header_len: usize, rx: &RxFrame, secured: bool) {
        let payload = rx.frame.get(header_len..).unwrap_or(&[]);
        self.upper.indication(NwkIndication::Data {
            dst: header.dst,
            src: header.src,
            prev_hop: rx.prev_hop,
            lqi: rx.lqi,
            secured,
            payload,
        });
    }

    // ========================================================================
    // Broadcast and multicast
    // ========================================================================

    fn process_flood(&mut self, header: &NwkHeader, header_len: usize, rx: &RxFrame) -> Result<()> {
        let is_command = header.frame_type == FrameType::Command;
        if is_command && rx.frame.get(header_len) == Some(&(CommandId::RouteRequest as u8)) {
            return self.process_command(header, header_len, rx);
        }

        let lifetime = Millis::new(self.config.broadcast_delivery_time_ms);
        if !self.btt.record(header.src, header.sequence, self.now, lifetime)? {
            return Ok(());
        }

        if !rx.loopback && self.nib.is_router() && header.radius > 1 {
            let mut relay = header.clone();
            relay.radius -= 1;
            let payload = rx.frame.get(header_len..).unwrap_or(&[]);
            let out = OutRequest::new(relay, TxOwner::Relay, TrafficClass::Broadcast).relayed_from(rx.prev_hop);
            if let Err(e) = self.enqueue(out, payload) {
                log_warn!(self.log, self.now.as_millis(), "nwk.rx", "rebroadcast dropped: {}", e);
            }
        }

        let for_us = if header.multicast.is_some() {
            self.upper.is_group_member(header.dst.0)
        } else {
            is_broadcast_target_for_self(header.dst, self.nib.pib.rx_on_when_idle, self.nib.is_router())
        };
        if !for_us {
            return Ok(());
        }
        if is_command {
            self.process_command(header, header_len, rx)
        } else {
            self.deliver_data(header, header_len, rx, header.security);
            Ok(())
        }
    }

    // ========================================================================
    // Unicast relay
    // ========================================================================

    fn relay_unicast(&mut self, header: &NwkHeader, header_len: usize, rx: &RxFrame) -> Result<()> {
        if !self.nib.is_router() {
            return Ok(());
        }
        if header.radius <= 1 {
            log_debug!(self.log, self.now.as_millis(), "nwk.rx", "radius exhausted for {}", header.dst);
            return Err(Error::RadiusExhausted);
        }
        let mut relay = header.clone();
        relay.radius -= 1;
        let payload = rx.frame.get(header_len..).unwrap_or(&[]);

        let mut record = FrameBuf::new();
        let payload = if header.frame_type == FrameType::Command
            && payload.first() == Some(&(CommandId::RouteRecord as u8))
        {
            let NwkCommand::RouteRecord(mut rr) = NwkCommand::decode(payload)? else {
                return Err(Error::UnknownCommand);
            };
            // A full relay list is forwarded unchanged
            if rr.relays.push(self.nib.short_addr()).is_err() {
                log_warn!(self.log, self.now.as_millis(), "nwk.rx", "relay list from {} full", header.src);
            }
            NwkCommand::RouteRecord(rr).encode(&mut record)?;
            &record[..]
        } else {
            payload
        };

        let out = OutRequest::new(relay, TxOwner::Relay, TrafficClass::Transit).relayed_from(rx.prev_hop);
        self.enqueue(out, payload)?;
        Ok(())
    }

    // ========================================================================
    // Commands
    // ========================================================================

    fn process_command(&mut self, header: &NwkHeader, header_len: usize, rx: &RxFrame) -> Result<()> {
        let payload = rx.frame.get(header_len..).unwrap_or(&[]);
        let command = NwkCommand::decode(payload)?;
        log_debug!(self.log, self.now.as_millis(), "nwk.rx", "{:?} from {}", command.id(), header.src);
        match command {
            NwkCommand::RouteRequest(rreq) => self.handle_route_request(header, &rreq, rx),
            NwkCommand::RouteReply(rrep) => self.handle_route_reply(&rrep, rx),
            NwkCommand::NetworkStatus(status) => {
                self.handle_network_status(&status);
                Ok(())
            }
            NwkCommand::Leave(leave) => {
                self.handle_leave(header, &leave);
                Ok(())
            }
            NwkCommand::RouteRecord(record) => {
                self.handle_route_record(header, &record);
                Ok(())
            }
            NwkCommand::RejoinRequest(request) => self.rejoin_request_received(header, &request, rx.prev_hop),
            NwkCommand::RejoinResponse(response) => {
                self.rejoin_response_received(header, &response);
                Ok(())
            }
            NwkCommand::LinkStatus(status) => {
                self.link_status_received(header, &status);
                Ok(())
            }
        }
    }

    fn link_cost_from(&self, prev_hop: ShortAddr, lqi: u8) -> u8 {
        self.neighbors
            .find_short(prev_hop)
            .map_or_else(|| lqi_to_cost(lqi), |n| n.link_cost())
            .min(MAX_LINK_COST)
    }

    fn handle_route_request(&mut self, header: &NwkHeader, rreq: &RouteRequest, rx: &RxFrame) -> Result<()> {
        let own = self.nib.short_addr();
        if !self.nib.is_router() || rx.loopback || header.src == own {
            return Ok(());
        }
        let cost = accumulate_cost(rreq.path_cost, self.link_cost_from(rx.prev_hop, rx.lqi));
        let expires = self.now + Millis::new(self.config.route_discovery_time_ms);
        let verdict = self
            .discoveries
            .record_request(header.src, rreq.id, rx.prev_hop, rreq.dst, cost, expires)?;

        if rreq.many_to_one != ManyToOne::No {
            if verdict == RequestVerdict::Duplicate {
                return Ok(());
            }
            let route = RouteEntry {
                many_to_one: true,
                route_record_required: rreq.many_to_one == ManyToOne::WithRouteRecord,
                no_route_cache: rreq.many_to_one == ManyToOne::NoRouteRecord,
                ..RouteEntry::active(header.src, rx.prev_hop, cost)
            };
            self.routes.set_active(route)?;
            self.dirty = true;
            log_debug!(self.log, self.now.as_millis(), "nwk.route", "concentrator {} via {} cost {}", header.src, rx.prev_hop, cost);
            return match verdict {
                RequestVerdict::New => self.relay_route_request(header, rreq, cost, rx.prev_hop),
                _ => {
                    self.patch_relayed_cost(header.src, rreq.id, cost);
                    Ok(())
                }
            };
        }

        let is_target = rreq.dst == own
            || (rreq.multicast && self.upper.is_group_member(rreq.dst.0))
            || self.neighbors.find_short(rreq.dst).is_some_and(|n| {
                n.relationship == Relationship::Child && n.device_type == DeviceType::EndDevice
            });

        if is_target {
            if verdict == RequestVerdict::Duplicate {
                return Ok(());
            }
            self.routes
                .set_active(RouteEntry::active(header.src, rx.prev_hop, cost))?;
            self.dirty = true;
            let reply = RouteReply {
                multicast: rreq.multicast,
                id: rreq.id,
                originator: header.src,
                responder: rreq.dst,
                path_cost: 0,
                originator_ext: header.src_ext,
                responder_ext: if rreq.dst == own {
                    Some(self.nib.ext_addr())
                } else {
                    self.address_map.ext_of(rreq.dst)
                },
            };
            log_info!(self.log, self.now.as_millis(), "nwk.route", "reply to {} for {} via {}", header.src, rreq.dst, rx.prev_hop);
            return self.send_route_reply(rx.prev_hop, &reply);
        }

        match verdict {
            RequestVerdict::New => self.relay_route_request(header, rreq, cost, rx.prev_hop),
            RequestVerdict::Better => {
                self.patch_relayed_cost(header.src, rreq.id, cost);
                Ok(())
            }
            RequestVerdict::Duplicate => Ok(()),
        }
    }

    fn relay_route_request(
        &mut self,
        header: &NwkHeader,
        rreq: &RouteRequest,
        cost: u8,
        prev_hop: ShortAddr,
    ) -> Result<()> {
        if header.radius <= 1 {
            return Ok(());
        }
        let mut relay = header.clone();
        relay.radius -= 1;
        let command = NwkCommand::RouteRequest(RouteRequest {
            path_cost: cost,
            ..*rreq
        });
        let out = OutRequest::new(relay, TxOwner::Relay, TrafficClass::RouteRequest)
            .relayed_from(prev_hop)
            .with_retries(self.config.rreq_retries);
        let slot = self.send_command(out, &command)?;
        if let Some(entry) = self.discoveries.find_mut(header.src, rreq.id) {
            entry.relay_slot = Some(slot as u8);
        }
        Ok(())
    }

    /// Rewrite the path cost of a relayed route request still waiting to go out
    fn patch_relayed_cost(&mut self, originator: ShortAddr, id: u8, cost: u8) {
        let Some(slot) = self.discoveries.find(originator, id).and_then(|e| e.relay_slot) else {
            return;
        };
        if let Some(packet) = self.tx.packets.get_mut(usize::from(slot)) {
            if matches!(packet.state, TxState::Pending { .. }) {
                let at = packet.header_len + RouteRequest::PATH_COST_OFFSET;
                if let Some(byte) = packet.frame.get_mut(at) {
                    *byte = cost;
                }
            }
        }
    }

    fn send_route_reply(&mut self, next_hop: ShortAddr, reply: &RouteReply) -> Result<()> {
        let header = self.command_header(next_hop, 0);
        let out = OutRequest::new(header, TxOwner::Relay, TrafficClass::UnicastCommand).via(next_hop);
        self.send_command(out, &NwkCommand::RouteReply(*reply))?;
        Ok(())
    }

    fn handle_route_reply(&mut self, rrep: &RouteReply, rx: &RxFrame) -> Result<()> {
        let own = self.nib.short_addr();
        let cost = accumulate_cost(rrep.path_cost, self.link_cost_from(rx.prev_hop, rx.lqi));
        if let Some(ext) = rrep.responder_ext {
            if self.address_map.insert(rrep.responder, ext).is_ok() {
                self.dirty = true;
            }
        }

        let Some(entry) = self.discoveries.find_mut(rrep.originator, rrep.id) else {
            log_debug!(self.log, self.now.as_millis(), "nwk.route", "stale reply {} #{}", rrep.originator, rrep.id);
            return Ok(());
        };
        if cost >= entry.residual_cost {
            return Ok(());
        }
        entry.residual_cost = cost;
        let sender = entry.sender;
        let forward_cost = entry.forward_cost;

        self.routes
            .set_active(RouteEntry::active(rrep.responder, rx.prev_hop, cost))?;
        self.dirty = true;

        if rrep.originator == own {
            log_info!(self.log, self.now.as_millis(), "nwk.route", "route to {} via {} cost {}", rrep.responder, rx.prev_hop, cost);
            self.route_reply_received(rrep.responder);
            return Ok(());
        }

        self.routes
            .set_active(RouteEntry::active(rrep.originator, sender, forward_cost))?;
        let forward = RouteReply {
            path_cost: cost,
            ..*rrep
        };
        self.send_route_reply(sender, &forward)
    }

    fn handle_network_status(&mut self, status: &NetworkStatus) {
        let own = self.nib.short_addr();
        if status.code.is_link_failure()
            && self.routes.find(status.target).is_some_and(|r| !r.many_to_one)
        {
            self.routes.remove(status.target);
            self.dirty = true;
        }
        if status.code == NetworkStatusCode::ManyToOneRouteFailure
            && status.target == own
            && self.config.concentrator.enabled
        {
            self.concentrator_due();
        }
        self.upper.indication(NwkIndication::NwkStatus {
            addr: status.target,
            code: status.code,
        });
    }

    fn handle_leave(&mut self, header: &NwkHeader, leave: &LeaveCommand) {
        let own = self.nib.short_addr();
        if leave.request {
            let from_parent = self.neighbors.parent().is_some_and(|p| p.short == header.src)
                || header.src == ShortAddr::COORDINATOR;
            if !from_parent || header.dst != own {
                log_info!(self.log, self.now.as_millis(), "nwk.leave", "leave request from {} ignored", header.src);
                return;
            }
            let request = LeaveRequest {
                device: None,
                remove_children: leave.remove_children,
                rejoin: leave.rejoin,
            };
            if let Err(e) = self.leave_request(RequestHandle::INTERNAL, request) {
                log_warn!(self.log, self.now.as_millis(), "nwk.leave", "forced leave not queued: {}", e);
            }
            return;
        }

        let from_parent = self.neighbors.parent().is_some_and(|p| p.short == header.src);
        if from_parent && leave.remove_children {
            let request = LeaveRequest {
                device: None,
                remove_children: true,
                rejoin: leave.rejoin,
            };
            if let Err(e) = self.leave_request(RequestHandle::INTERNAL, request) {
                log_warn!(self.log, self.now.as_millis(), "nwk.leave", "leave with parent not queued: {}", e);
            }
            return;
        }

        let ext = header
            .src_ext
            .or_else(|| self.address_map.ext_of(header.src))
            .unwrap_or(ExtAddr::UNKNOWN);
        log_info!(self.log, self.now.as_millis(), "nwk.leave", "{} left", header.src);
        self.remove_device(header.src, ext);
        self.upper.indication(NwkIndication::Leave {
            device: ext,
            short_addr: header.src,
            rejoin: leave.rejoin,
        });
    }

    fn handle_route_record(&mut self, header: &NwkHeader, record: &RouteRecord) {
        log_debug!(self.log, self.now.as_millis(), "nwk.route", "record from {} ({} relays)", header.src, record.relays.len());
        self.upper.indication(NwkIndication::RouteRecord {
            src: header.src,
            relays: &record.relays,
        });
    }
}
