// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Transmit pipeline
//!
//! Every outgoing frame (locally originated data, relayed frames and NWK
//! commands) is a slot in a fixed packet pool. A slot moves through
//!
//! ```text
//! Pending -> InFlight -> Done
//!    |                    ^
//!    +-> WaitRoute -------+   (route discovery)
//!    +-> WaitRecord ------+   (route record sent first)
//! ```
//!
//! The `Tx` task hands one due packet to the MAC per run. MAC confirms mark
//! slots `Done` and queue them for the `TxConfirm` task, which tells the
//! owner and frees the slot. The pool slot index doubles as the MSDU handle.

use heapless::Vec;
use q_common::constants::{MAX_NSDU_SIZE, OUT_PACKET_POOL_SIZE};
use q_common::{log_debug, log_info, log_warn};
use q_common::{Error, Instant, Millis, Result, ShortAddr};
use q_hal::RngInterface;
use q_kernel::{Pool, Queue};

use crate::addressing::is_broadcast_target_for_self;
use crate::command::{NetworkStatus, NetworkStatusCode, NwkCommand, RouteRecord};
use crate::engine::{Nwk, NwkTask};
use crate::frame::{build_frame, FrameBuf, FrameType, MulticastControl, MulticastMode, NwkHeader, RADIUS_OFFSET};
use crate::mac::{MacDataRequest, MacService, MacUser};
use crate::routing::{compute_next_hop, NextHop, NextHopQuery, RouteMethod};
use crate::rx::RxFrame;
use crate::security::SecurityProvider;
use crate::status::{MacStatus, NwkStatus};
use crate::upper::{
    DataRequest, DiscoveryMode, NwkConfirm, NwkIndication, RequestHandle, RouteDiscoveryRequest, UpperLayer,
};

/// Link quality reported for frames looped back locally
const LOOPBACK_LQI: u8 = 0xFF;

/// Who gets told when a packet completes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxOwner {
    /// NLDE-DATA request
    Data(RequestHandle),
    /// Leave command of the leave service
    Leave,
    /// Rejoin request of the join service
    Join,
    /// Route request of the route discovery service
    RouteDiscovery {
        /// Route request identifier
        id: u8,
    },
    /// Route record sent ahead of the data packet in `for_slot`
    RouteRecord {
        /// Waiting data packet
        for_slot: u8,
    },
    /// Relayed frame
    Relay,
    /// Fire-and-forget command
    Command,
}

/// Packet slot state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxState {
    /// Waiting for its transmission time
    Pending {
        /// Earliest transmission time
        not_before: Instant,
    },
    /// Waiting for a route discovery
    WaitRoute,
    /// Waiting for a route record to leave first
    WaitRecord,
    /// Handed to the MAC
    InFlight,
    /// Finished; queued for the owner
    Done(NwkStatus),
}

/// Traffic class selecting the initial transmission delay
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrafficClass {
    /// Locally originated unicast data
    UnicastData,
    /// Locally originated unicast command
    UnicastCommand,
    /// Broadcast (jittered)
    Broadcast,
    /// Multicast to a group we belong to
    MulticastMember,
    /// Relayed unicast
    Transit,
    /// Route request (jittered, repeated)
    RouteRequest,
}

/// A frame to queue
#[derive(Debug, Clone)]
pub struct OutRequest {
    /// NWK header
    pub header: NwkHeader,
    /// MAC destination bypassing next-hop selection
    pub forced_hop: Option<ShortAddr>,
    /// MAC source of a relayed frame
    pub prev_hop: ShortAddr,
    /// Owner
    pub owner: TxOwner,
    /// Delay class
    pub class: TrafficClass,
    /// Extra broadcasts after the first
    pub retries: u8,
}

impl OutRequest {
    /// Frame routed by next-hop selection, no retries
    #[must_use]
    pub const fn new(header: NwkHeader, owner: TxOwner, class: TrafficClass) -> Self {
        Self {
            header,
            forced_hop: None,
            prev_hop: ShortAddr::UNASSIGNED,
            owner,
            class,
            retries: 0,
        }
    }

    /// Send straight to `hop`
    #[must_use]
    pub const fn via(mut self, hop: ShortAddr) -> Self {
        self.forced_hop = Some(hop);
        self
    }

    /// Mark as relayed from `prev_hop`
    #[must_use]
    pub const fn relayed_from(mut self, prev_hop: ShortAddr) -> Self {
        self.prev_hop = prev_hop;
        self
    }

    /// Broadcast `retries` more times
    #[must_use]
    pub const fn with_retries(mut self, retries: u8) -> Self {
        self.retries = retries;
        self
    }
}

/// Packet pool slot
#[derive(Debug, Clone)]
pub struct OutPacket {
    /// Complete NWK frame (unsecured)
    pub frame: FrameBuf,
    /// Header as built
    pub header: NwkHeader,
    /// Encoded header length
    pub header_len: usize,
    /// MAC source of a relayed frame (unassigned when originated here)
    pub prev_hop: ShortAddr,
    /// Forced MAC destination
    pub forced_hop: Option<ShortAddr>,
    /// Owner
    pub owner: TxOwner,
    /// State
    pub state: TxState,
    /// Broadcasts still to send
    pub retries: u8,
    /// Gap between broadcasts
    pub retry_gap: Millis,
    /// MAC destination of the last transmission
    pub next_hop: ShortAddr,
    /// Last transmission used a routing table entry
    pub via_mesh: bool,
    /// Local copy already delivered
    pub looped: bool,
    /// A route discovery was already attempted for this packet
    pub discovery_tried: bool,
}

impl OutPacket {
    /// Locally originated data frame
    #[must_use]
    pub fn is_originated_data(&self) -> bool {
        self.header.frame_type == FrameType::Data && self.prev_hop == ShortAddr::UNASSIGNED
    }

    /// Relayed data frame
    #[must_use]
    pub fn is_relayed_data(&self) -> bool {
        self.header.frame_type == FrameType::Data && self.prev_hop != ShortAddr::UNASSIGNED
    }

    fn is_flood(&self) -> bool {
        self.header.dst.is_broadcast() || self.header.multicast.is_some()
    }
}

/// Packet pool plus completion queue
#[derive(Debug)]
pub struct TxPipeline {
    pub(crate) packets: Pool<OutPacket, OUT_PACKET_POOL_SIZE>,
    pub(crate) done: Queue<OUT_PACKET_POOL_SIZE>,
}

impl TxPipeline {
    /// Empty pipeline
    #[must_use]
    pub fn new() -> Self {
        Self {
            packets: Pool::new(),
            done: Queue::new(),
        }
    }

    /// No packet outstanding
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.packets.is_empty()
    }

    /// Outstanding packets
    #[must_use]
    pub fn len(&self) -> usize {
        self.packets.len()
    }

    /// No packet outstanding
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    /// Packet in `slot`
    #[must_use]
    pub fn get(&self, slot: usize) -> Option<&OutPacket> {
        self.packets.get(slot)
    }

    /// Outstanding packets with their slots
    pub fn iter(&self) -> impl Iterator<Item = (usize, &OutPacket)> {
        self.packets.iter()
    }
}

impl Default for TxPipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl<M, S, U, R> Nwk<M, S, U, R>
where
    M: MacService,
    S: SecurityProvider,
    U: UpperLayer,
    R: RngInterface,
{
    // ========================================================================
    // NLDE-DATA
    // ========================================================================

    /// NLDE-DATA.request
    ///
    /// The confirm arrives through [`UpperLayer::confirm`] with `handle`.
    /// A request made before joining is accepted and confirmed with
    /// `InvalidRequest`.
    ///
    /// # Errors
    /// `FrameTooLong` if the payload exceeds the maximum NSDU,
    /// `PacketPoolExhausted` if no packet slot is free.
    pub fn data_request(&mut self, handle: RequestHandle, request: &DataRequest<'_>) -> Result<()> {
        if request.payload.len() > MAX_NSDU_SIZE {
            return Err(Error::FrameTooLong);
        }
        let radius = if request.radius == 0 {
            self.config.default_radius()
        } else {
            request.radius
        };
        let own = self.nib.short_addr();
        let sequence = self.nib.next_sequence();
        let mut header = NwkHeader::data(request.dst, own, radius, sequence);
        header.discover_route = request.discover_route;
        header.security = request.security && self.nib.security_level > 0;
        header.end_device_initiator = !self.nib.is_router();

        let member = request.multicast && self.upper.is_group_member(request.dst.0);
        if request.multicast {
            header.multicast = Some(if member {
                MulticastControl::member()
            } else {
                MulticastControl {
                    mode: MulticastMode::NonMember,
                    ..MulticastControl::member()
                }
            });
        }
        let class = if member {
            TrafficClass::MulticastMember
        } else if request.multicast || request.dst.is_broadcast() {
            TrafficClass::Broadcast
        } else {
            TrafficClass::UnicastData
        };

        let joined = self.nib.joined;
        let slot = self.enqueue(OutRequest::new(header, TxOwner::Data(handle), class), request.payload)?;
        log_debug!(self.log, self.now.as_millis(), "nwk.tx", "data #{} -> {} slot {}", handle.0, request.dst, slot);
        if !joined {
            self.finish_packet(slot, NwkStatus::InvalidRequest);
        }
        Ok(())
    }

    // ========================================================================
    // Queueing
    // ========================================================================

    /// Command header from us, with our IEEE address
    pub(crate) fn command_header(&mut self, dst: ShortAddr, radius: u8) -> NwkHeader {
        let radius = if radius == 0 { self.config.default_radius() } else { radius };
        let sequence = self.nib.next_sequence();
        let mut header = NwkHeader::command(dst, self.nib.short_addr(), radius, sequence);
        header.src_ext = Some(self.nib.ext_addr());
        header
    }

    /// Queue a frame; returns its slot
    ///
    /// # Errors
    /// `FrameTooLong` if the frame does not fit an MSDU,
    /// `PacketPoolExhausted` if no slot is free.
    pub(crate) fn enqueue(&mut self, out: OutRequest, payload: &[u8]) -> Result<usize> {
        let frame = build_frame(&out.header, payload)?;
        let header_len = out.header.encoded_len();
        let delay = self.tx_delay(out.class);
        let retry_gap = match out.class {
            TrafficClass::RouteRequest => Millis::new(self.config.tx_delays.rreq_retry_interval_ms),
            _ => Millis::new(self.config.tx_delays.broadcast_jitter_ms),
        };
        let packet = OutPacket {
            frame,
            header: out.header,
            header_len,
            prev_hop: out.prev_hop,
            forced_hop: out.forced_hop,
            owner: out.owner,
            state: TxState::Pending {
                not_before: self.now + delay,
            },
            retries: out.retries,
            retry_gap,
            next_hop: ShortAddr::UNASSIGNED,
            via_mesh: false,
            looped: false,
            discovery_tried: false,
        };
        let slot = self
            .tx
            .packets
            .alloc(packet)
            .map_err(|_| Error::PacketPoolExhausted)?;
        self.scheduler.post(NwkTask::Tx);
        Ok(slot)
    }

    /// Encode and queue a NWK command
    ///
    /// # Errors
    /// As [`Nwk::enqueue`].
    pub(crate) fn send_command(&mut self, out: OutRequest, command: &NwkCommand) -> Result<usize> {
        let mut payload = FrameBuf::new();
        command.encode(&mut payload)?;
        let id = command.id();
        let result = self.enqueue(out, &payload);
        if let Err(e) = result {
            log_warn!(self.log, self.now.as_millis(), "nwk.tx", "{:?} not queued: {}", id, e);
        }
        result
    }

    /// Send a network status command to `dst`
    pub(crate) fn send_network_status(&mut self, dst: ShortAddr, code: NetworkStatusCode, target: ShortAddr) {
        let header = self.command_header(dst, 0);
        let class = if dst.is_broadcast() {
            TrafficClass::Broadcast
        } else {
            TrafficClass::UnicastCommand
        };
        let command = NwkCommand::NetworkStatus(NetworkStatus { code, target });
        if self
            .send_command(OutRequest::new(header, TxOwner::Command, class), &command)
            .is_err()
        {
            log_warn!(self.log, self.now.as_millis(), "nwk.tx", "status {:?} for {} to {} dropped", code, target, dst);
        }
    }

    fn tx_delay(&mut self, class: TrafficClass) -> Millis {
        let delays = self.config.tx_delays;
        let ms = match class {
            TrafficClass::UnicastData => delays.unicast_data_ms,
            TrafficClass::UnicastCommand => delays.unicast_command_ms,
            TrafficClass::Broadcast => self.jitter(0, delays.broadcast_jitter_ms),
            TrafficClass::MulticastMember => delays.multicast_member_ms,
            TrafficClass::Transit => delays.transit_ms,
            TrafficClass::RouteRequest => self.jitter(delays.rreq_min_ms, delays.rreq_max_ms),
        };
        Millis::new(ms)
    }

    fn jitter(&mut self, min: u32, max: u32) -> u32 {
        if max <= min {
            return min;
        }
        min + self.rng.next_up_to(max - min).unwrap_or(0)
    }

    pub(crate) fn tx_due(&self) -> bool {
        let now = self.now;
        self.tx
            .packets
            .iter()
            .any(|(_, p)| matches!(p.state, TxState::Pending { not_before } if now.has_reached(not_before)))
    }

    pub(crate) fn tx_next_deadline(&self) -> Option<Instant> {
        let now = self.now;
        self.tx
            .packets
            .iter()
            .filter_map(|(_, p)| match p.state {
                TxState::Pending { not_before } if now.has_reached(not_before) => Some(now),
                TxState::Pending { not_before } => Some(not_before),
                _ => None,
            })
            .min_by_key(|t| t.since(now))
    }

    // ========================================================================
    // Tx task
    // ========================================================================

    pub(crate) fn run_tx(&mut self) {
        let now = self.now;
        let due = self
            .tx
            .packets
            .iter()
            .find(|(_, p)| matches!(p.state, TxState::Pending { not_before } if now.has_reached(not_before)))
            .map(|(slot, _)| slot);
        if let Some(slot) = due {
            self.transmit(slot);
        }
        if self.tx_due() {
            self.scheduler.post(NwkTask::Tx);
        }
    }

    fn select_hop(&self, packet: &OutPacket) -> NextHop {
        if let Some(hop) = packet.forced_hop {
            let method = if hop.is_broadcast() {
                RouteMethod::Broadcast
            } else {
                RouteMethod::Neighbor
            };
            return NextHop { method, next_hop: hop };
        }
        let multicast = packet.header.multicast.is_some();
        let query = NextHopQuery {
            dst: packet.header.dst,
            src: packet.header.src,
            prev_hop: packet.prev_hop,
            multicast,
            multicast_member: multicast && self.upper.is_group_member(packet.header.dst.0),
            hops_budget: packet.frame.get(RADIUS_OFFSET).copied().unwrap_or(0),
            discover_route: packet.header.discover_route && !packet.discovery_tried,
        };
        compute_next_hop(&self.routing_context(), &query)
    }

    fn transmit(&mut self, slot: usize) {
        let Some(packet) = self.tx.packets.get(slot) else {
            return;
        };
        let hop = self.select_hop(packet);
        let dst = packet.header.dst;
        let originated_data = packet.is_originated_data();
        let relayed_data = packet.is_relayed_data();
        let src = packet.header.src;
        let looped = packet.looped;

        match hop.method {
            RouteMethod::Local => {
                let status = if self.loopback(slot) {
                    NwkStatus::Success
                } else {
                    NwkStatus::FrameNotBuffered
                };
                self.finish_packet(slot, status);
            }
            RouteMethod::Broadcast | RouteMethod::Multicast { .. } => {
                let deliver = match hop.method {
                    RouteMethod::Multicast { deliver } => deliver,
                    _ => is_broadcast_target_for_self(dst, self.nib.pib.rx_on_when_idle, self.nib.is_router()),
                };
                if originated_data && deliver && !looped {
                    self.loopback(slot);
                }
                self.mac_send(slot, ShortAddr::ALL_DEVICES, false);
            }
            RouteMethod::Mesh | RouteMethod::Neighbor | RouteMethod::Tree | RouteMethod::Parent => {
                let via_mesh = hop.method == RouteMethod::Mesh;
                if via_mesh && originated_data && self.take_route_record_flag(dst) {
                    if self.send_route_record(slot, dst).is_ok() {
                        self.set_packet_state(slot, TxState::WaitRecord);
                        return;
                    }
                }
                if let Some(packet) = self.tx.packets.get_mut(slot) {
                    packet.via_mesh = via_mesh;
                }
                self.mac_send(slot, hop.next_hop, true);
            }
            RouteMethod::DiscoveryRequired => self.wait_for_route(slot, dst),
            RouteMethod::Unroutable => {
                log_info!(self.log, self.now.as_millis(), "nwk.tx", "no route to {}", dst);
                if relayed_data {
                    self.send_network_status(src, NetworkStatusCode::NoRouteAvailable, dst);
                }
                self.finish_packet(slot, NwkStatus::RouteError);
            }
        }
    }

    fn set_packet_state(&mut self, slot: usize, state: TxState) {
        if let Some(packet) = self.tx.packets.get_mut(slot) {
            packet.state = state;
        }
    }

    /// Copy the packet into the receive path
    fn loopback(&mut self, slot: usize) -> bool {
        let own = self.nib.short_addr();
        let Some(packet) = self.tx.packets.get_mut(slot) else {
            return false;
        };
        packet.looped = true;
        let frame = RxFrame {
            frame: packet.frame.clone(),
            prev_hop: own,
            mac_dst: own,
            lqi: LOOPBACK_LQI,
            loopback: true,
        };
        if self.inbox.push_back(frame).is_err() {
            log_warn!(self.log, self.now.as_millis(), "nwk.tx", "inbox full, loopback dropped");
            return false;
        }
        self.scheduler.post(NwkTask::Rx);
        true
    }

    /// Clear the route record flag of a concentrator route; returns whether it was set
    fn take_route_record_flag(&mut self, dst: ShortAddr) -> bool {
        match self.routes.find_mut(dst) {
            Some(route) if route.many_to_one && route.route_record_required => {
                route.route_record_required = false;
                true
            }
            _ => false,
        }
    }

    fn send_route_record(&mut self, for_slot: usize, concentrator: ShortAddr) -> Result<usize> {
        let header = self.command_header(concentrator, 0);
        let owner = TxOwner::RouteRecord {
            for_slot: for_slot as u8,
        };
        let command = NwkCommand::RouteRecord(RouteRecord { relays: Vec::new() });
        log_debug!(self.log, self.now.as_millis(), "nwk.tx", "route record to {}", concentrator);
        self.send_command(OutRequest::new(header, owner, TrafficClass::UnicastCommand), &command)
    }

    fn wait_for_route(&mut self, slot: usize, dst: ShortAddr) {
        if let Some(packet) = self.tx.packets.get_mut(slot) {
            packet.state = TxState::WaitRoute;
            packet.discovery_tried = true;
        }
        let queued = self
            .svc
            .route_discovery
            .svc
            .iter()
            .any(|p| p.request.mode == DiscoveryMode::Unicast(dst));
        if queued {
            return;
        }
        let request = RouteDiscoveryRequest {
            mode: DiscoveryMode::Unicast(dst),
            radius: 0,
            no_route_cache: false,
        };
        match self.route_discovery_request(RequestHandle::INTERNAL, request) {
            Ok(()) => {
                log_debug!(self.log, self.now.as_millis(), "nwk.tx", "discovering route to {}", dst);
            }
            Err(e) => {
                log_warn!(self.log, self.now.as_millis(), "nwk.tx", "discovery to {} refused: {}", dst, e);
                self.finish_packet(slot, NwkStatus::RouteDiscoveryFailed);
            }
        }
    }

    /// Secure a copy of the frame and hand it to the MAC
    fn mac_send(&mut self, slot: usize, next_hop: ShortAddr, ack_request: bool) {
        let own_ext = self.nib.ext_addr();
        let Some(packet) = self.tx.packets.get(slot) else {
            return;
        };
        let mut frame = packet.frame.clone();
        let header_len = packet.header_len;

        if self.security.is_encryption_required(&packet.header) {
            let Some(material) = self.nib.keys.active() else {
                log_warn!(self.log, self.now.as_millis(), "nwk.sec", "no active key for slot {}", slot);
                self.finish_packet(slot, NwkStatus::NoKey);
                return;
            };
            if let Err(e) = self
                .security
                .encrypt_output_packet(material, own_ext, header_len, &mut frame)
            {
                log_warn!(self.log, self.now.as_millis(), "nwk.sec", "encrypt failed: {}", e);
                self.finish_packet(slot, NwkStatus::from(e));
                return;
            }
        }

        if let Some(packet) = self.tx.packets.get_mut(slot) {
            packet.state = TxState::InFlight;
            packet.next_hop = next_hop;
        }
        let request = MacDataRequest {
            dst: next_hop,
            handle: slot as u8,
            ack_request,
            payload: &frame,
        };
        self.mac.data_request(MacUser::Tx(slot as u8), &request);
    }

    // ========================================================================
    // Completion
    // ========================================================================

    /// MCPS-DATA.confirm for the packet in `slot`
    pub(crate) fn tx_mac_confirm(&mut self, slot: u8, status: MacStatus) {
        let idx = usize::from(slot);
        let now = self.now;
        let Some(packet) = self.tx.packets.get_mut(idx) else {
            log_warn!(self.log, now.as_millis(), "nwk.tx", "confirm for free slot {}", slot);
            return;
        };
        if packet.state != TxState::InFlight {
            return;
        }

        if packet.is_flood() {
            if packet.retries > 0 {
                packet.retries -= 1;
                packet.state = TxState::Pending {
                    not_before: now + packet.retry_gap,
                };
                self.scheduler.post(NwkTask::Tx);
                return;
            }
            self.finish_packet(idx, NwkStatus::from(status));
            return;
        }

        if status.is_success() {
            self.finish_packet(idx, NwkStatus::Success);
            return;
        }

        let dst = packet.header.dst;
        let src = packet.header.src;
        let next_hop = packet.next_hop;
        let via_mesh = packet.via_mesh;
        let relayed_data = packet.is_relayed_data();
        log_info!(self.log, now.as_millis(), "nwk.tx", "link to {} failed: {:?}", next_hop, status);

        if !via_mesh {
            self.finish_packet(idx, NwkStatus::from(status));
            return;
        }

        let many_to_one = self.routes.find(dst).is_some_and(|r| r.many_to_one);
        let code = if many_to_one {
            // Routers flood it around the broken hop until it reaches the concentrator
            self.send_network_status(ShortAddr::ALL_ROUTERS, NetworkStatusCode::ManyToOneRouteFailure, dst);
            NetworkStatusCode::ManyToOneRouteFailure
        } else {
            self.routes.mark_failed(dst);
            self.dirty = true;
            if relayed_data {
                self.send_network_status(src, NetworkStatusCode::NonTreeLinkFailure, dst);
            }
            NetworkStatusCode::NonTreeLinkFailure
        };
        self.upper.indication(NwkIndication::NwkStatus { addr: dst, code });
        self.finish_packet(idx, NwkStatus::RouteError);
    }

    /// Mark `slot` done and queue it for its owner
    pub(crate) fn finish_packet(&mut self, slot: usize, status: NwkStatus) {
        match self.tx.packets.get_mut(slot) {
            Some(packet) if !matches!(packet.state, TxState::Done(_)) => {
                packet.state = TxState::Done(status);
            }
            _ => return,
        }
        self.discoveries.release_relay_slot(slot as u8);
        if self.tx.done.put(slot).is_err() {
            log_warn!(self.log, self.now.as_millis(), "nwk.tx", "slot {} already completing", slot);
        }
        self.scheduler.post(NwkTask::TxConfirm);
    }

    pub(crate) fn run_tx_confirm(&mut self) {
        let Some(slot) = self.tx.done.delete_head() else {
            return;
        };
        if let Some(packet) = self.tx.packets.free(slot) {
            let status = match packet.state {
                TxState::Done(status) => status,
                _ => NwkStatus::InvalidRequest,
            };
            match packet.owner {
                TxOwner::Data(handle) => self.deliver(handle, NwkConfirm::Data { status }),
                TxOwner::Leave => self.leave_tx_done(status),
                TxOwner::Join => self.join_tx_done(status),
                TxOwner::RouteDiscovery { id } => self.route_discovery_tx_done(id, status),
                TxOwner::RouteRecord { for_slot } => {
                    let waiting = usize::from(for_slot);
                    if self.tx.packets.get(waiting).is_some_and(|p| p.state == TxState::WaitRecord) {
                        let now = self.now;
                        self.set_packet_state(waiting, TxState::Pending { not_before: now });
                        self.scheduler.post(NwkTask::Tx);
                    }
                }
                TxOwner::Relay | TxOwner::Command => {
                    if !status.is_success() {
                        log_debug!(self.log, self.now.as_millis(), "nwk.tx", "slot {} dropped: {:?}", slot, status);
                    }
                }
            }
        }
        if !self.tx.done.is_empty() {
            self.scheduler.post(NwkTask::TxConfirm);
        }
    }

    /// Wake or fail packets waiting for a route to `dst`
    pub(crate) fn route_resolved(&mut self, dst: ShortAddr, found: bool) {
        let now = self.now;
        let mut failed: Vec<(usize, bool, ShortAddr), OUT_PACKET_POOL_SIZE> = Vec::new();
        for (slot, packet) in self.tx.packets.iter_mut() {
            if packet.state != TxState::WaitRoute || packet.header.dst != dst {
                continue;
            }
            if found {
                packet.state = TxState::Pending { not_before: now };
            } else if failed.push((slot, packet.is_relayed_data(), packet.header.src)).is_err() {
                log_warn!(self.log, now.as_millis(), "nwk.tx", "slot {} left waiting for {}", slot, dst);
            }
        }
        if found {
            self.scheduler.post(NwkTask::Tx);
        }
        for (slot, relayed, src) in failed {
            if relayed {
                self.send_network_status(src, NetworkStatusCode::NoRouteAvailable, dst);
            }
            self.finish_packet(slot, NwkStatus::RouteDiscoveryFailed);
        }
    }

    /// Finish every outstanding packet with `status`
    pub(crate) fn abort_packets(&mut self, status: NwkStatus) {
        let live: Vec<usize, OUT_PACKET_POOL_SIZE> = self
            .tx
            .packets
            .iter()
            .filter(|(_, p)| !matches!(p.state, TxState::Done(_)))
            .map(|(slot, _)| slot)
            .collect();
        for slot in live {
            self.finish_packet(slot, status);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packet(header: NwkHeader, prev_hop: ShortAddr) -> OutPacket {
        OutPacket {
            frame: FrameBuf::new(),
            header,
            header_len: 0,
            prev_hop,
            forced_hop: None,
            owner: TxOwner::Relay,
            state: TxState::InFlight,
            retries: 0,
            retry_gap: Millis::new(0),
            next_hop: ShortAddr::UNASSIGNED,
            via_mesh: false,
            looped: false,
            discovery_tried: false,
        }
    }

    #[test]
    fn test_data_origin() {
        let data = NwkHeader::data(ShortAddr(0x0042), ShortAddr(0x0001), 5, 1);
        let own = packet(data.clone(), ShortAddr::UNASSIGNED);
        assert!(own.is_originated_data());
        assert!(!own.is_relayed_data());

        let relayed = packet(data, ShortAddr(0x0002));
        assert!(relayed.is_relayed_data());
        assert!(!relayed.is_originated_data());

        // Commands are neither
        let command = packet(NwkHeader::command(ShortAddr(0x0042), ShortAddr(0x0001), 5, 2), ShortAddr(0x0002));
        assert!(!command.is_relayed_data());
        assert!(!command.is_originated_data());
    }

    #[test]
    fn test_flood_detection() {
        let unicast = packet(NwkHeader::data(ShortAddr(0x0042), ShortAddr(0x0001), 5, 1), ShortAddr::UNASSIGNED);
        assert!(!unicast.is_flood());

        let broadcast = NwkHeader::data(ShortAddr::RX_ON_WHEN_IDLE, ShortAddr(0x0001), 5, 2);
        assert!(packet(broadcast, ShortAddr::UNASSIGNED).is_flood());

        let mut group = NwkHeader::data(ShortAddr(0x1234), ShortAddr(0x0001), 5, 3);
        group.multicast = Some(MulticastControl::member());
        assert!(packet(group, ShortAddr::UNASSIGNED).is_flood());
    }

    #[test]
    fn test_out_request_builders() {
        let header = NwkHeader::command(ShortAddr::ALL_ROUTERS, ShortAddr(0x0001), 1, 4);
        let plain = OutRequest::new(header.clone(), TxOwner::Command, TrafficClass::Broadcast);
        assert_eq!(plain.forced_hop, None);
        assert_eq!(plain.prev_hop, ShortAddr::UNASSIGNED);
        assert_eq!(plain.retries, 0);

        let out = OutRequest::new(header, TxOwner::Relay, TrafficClass::RouteRequest)
            .via(ShortAddr(0x0009))
            .relayed_from(ShortAddr(0x0002))
            .with_retries(2);
        assert_eq!(out.forced_hop, Some(ShortAddr(0x0009)));
        assert_eq!(out.prev_hop, ShortAddr(0x0002));
        assert_eq!(out.retries, 2);
        assert_eq!(out.owner, TxOwner::Relay);
    }

    #[test]
    fn test_empty_pipeline() {
        let pipeline = TxPipeline::new();
        assert!(pipeline.is_idle());
        assert_eq!(pipeline.len(), 0);
        assert!(pipeline.get(0).is_none());
        assert_eq!(pipeline.iter().count(), 0);
    }
}
