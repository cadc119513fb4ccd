// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! NLME-JOIN, both sides
//!
//! Joining device, by method:
//!
//! ```text
//! Association: set PAN id -> MLME-ASSOCIATE            (next parent on failure)
//! Rejoin:      active scan -> set channel -> set PAN id -> set short
//!              -> rejoin request -> wait for response -> set short
//! Orphan:      orphan scan (MAC applies the realignment)
//! Silent:      set short -> set PAN id -> set channel -> set parent
//! ```
//!
//! Parent side: association and orphan indications from the MAC and rejoin
//! requests from the air. A child admitted by association is announced to
//! the upper layer only once the MAC reports the response was delivered.

use heapless::Vec;
use q_common::constants::REJOIN_RESPONSE_WAIT_MS;
use q_common::{log_debug, log_info, log_warn};
use q_common::{
    CapabilityInfo, DeviceType, Error, ExtAddr, ExtPanId, Millis, PanId, Relationship, Result, ShortAddr,
};
use q_hal::RngInterface;

use super::formation::step_or_fail;
use super::{Phase, Service};
use crate::addressing::random_candidate;
use crate::command::{NwkCommand, RejoinRequest, RejoinResponse};
use crate::engine::{Nwk, NwkTask, NwkTimer};
use crate::frame::NwkHeader;
use crate::mac::{
    AssociateRequest, AssociateResponse, MacConfirm, MacService, MacUser, OrphanResponse, PibAttribute, PollRequest,
    ScanRequest, ScanType,
};
use crate::neighbor::{lqi_to_cost, NeighborEntry};
use crate::security::SecurityProvider;
use crate::status::{MacStatus, NwkStatus};
use crate::tx::{OutRequest, TrafficClass, TxOwner};
use crate::upper::{JoinMethod, JoinRequest, NwkConfirm, NwkIndication, RequestHandle, UpperLayer};

/// Associations awaiting their MAC delivery report
const MAX_PENDING_CHILDREN: usize = 4;

/// Highest link cost accepted for a rejoin parent
const MAX_REJOIN_LINK_COST: u8 = 3;

/// Join sub-requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinStep {
    /// macPANId of the chosen parent
    SetPanId,
    /// MLME-ASSOCIATE
    Associate,
    /// Active scan for a rejoin parent
    RejoinScan,
    /// phyCurrentChannel of the rejoin parent
    RejoinChannel,
    /// macPANId of the rejoin parent
    RejoinPanId,
    /// macShortAddress used while rejoining
    RejoinSource,
    /// Rejoin request on the air
    SendRejoin,
    /// Waiting for the rejoin response
    AwaitResponse,
    /// macShortAddress handed out by the new parent
    SetShort,
    /// MLME-SCAN (orphan)
    OrphanScan,
    /// macShortAddress from the join parameters
    SilentShort,
    /// macPANId from the join parameters
    SilentPanId,
    /// phyCurrentChannel from the join parameters
    SilentChannel,
    /// macCoordShortAddress from the join parameters
    SilentCoord,
}

/// The parent being joined
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct JoinTarget {
    /// Parent network address
    pub short: ShortAddr,
    /// Parent IEEE address
    pub ext: ExtAddr,
    /// PAN id
    pub pan_id: PanId,
    /// Extended PAN id
    pub ext_pan_id: ExtPanId,
    /// Logical channel
    pub channel: u8,
    /// Parent depth
    pub depth: u8,
}

impl JoinTarget {
    fn from_neighbor(n: &NeighborEntry) -> Self {
        Self {
            short: n.short,
            ext: n.ext,
            pan_id: n.pan_id,
            ext_pan_id: n.ext_pan_id,
            channel: n.channel,
            depth: n.depth,
        }
    }
}

/// A child whose association or orphan response is in flight
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingChild {
    /// Child IEEE address
    pub ext: ExtAddr,
    /// Address handed out
    pub short: ShortAddr,
    /// Child capability
    pub capability: CapabilityInfo,
    /// Orphan realignment rather than a new association
    pub rejoin: bool,
}

/// NLME-JOIN machine plus the parent-side bookkeeping
#[derive(Debug, Default)]
pub struct JoinState {
    /// Queue and phase
    pub svc: Service<JoinRequest, JoinStep>,
    target: JoinTarget,
    assigned: ShortAddr,
    last_failure: Option<MacStatus>,
    pending: Vec<PendingChild, MAX_PENDING_CHILDREN>,
}

impl JoinState {
    /// Children whose responses are still in flight
    pub fn pending_children(&self) -> impl Iterator<Item = &PendingChild> {
        self.pending.iter()
    }

    fn take_pending(&mut self, ext: ExtAddr) -> Option<PendingChild> {
        let pos = self.pending.iter().position(|p| p.ext == ext)?;
        Some(self.pending.swap_remove(pos))
    }
}

/// Best rejoin parent among potential parents: permit joining not required
fn rejoin_candidate<'a>(
    neighbors: impl Iterator<Item = &'a NeighborEntry>,
    ext_pan_id: ExtPanId,
) -> Option<&'a NeighborEntry> {
    neighbors
        .filter(|n| n.potential_parent && n.is_router())
        .filter(|n| !ext_pan_id.is_specified() || n.ext_pan_id == ext_pan_id)
        .filter(|n| lqi_to_cost(n.lqi) <= MAX_REJOIN_LINK_COST)
        .min_by(|a, b| a.depth.cmp(&b.depth).then(b.lqi.cmp(&a.lqi)))
}

impl<M, S, U, R> Nwk<M, S, U, R>
where
    M: MacService,
    S: SecurityProvider,
    U: UpperLayer,
    R: RngInterface,
{
    /// NLME-JOIN.request
    ///
    /// # Errors
    /// `PoolExhausted` if the request queue is full.
    pub fn join_request(&mut self, handle: RequestHandle, request: JoinRequest) -> Result<()> {
        self.svc.join.svc.submit(request, handle)?;
        self.scheduler.post(NwkTask::Join);
        Ok(())
    }

    pub(crate) fn run_join(&mut self) {
        match self.svc.join.svc.phase() {
            Phase::Idle => {
                if self.svc.join.svc.try_begin(self.reset_pending()) {
                    self.scheduler.post(NwkTask::Join);
                }
            }
            Phase::Begin => {
                let Some(request) = self.svc.join.svc.request().copied() else {
                    return;
                };
                self.svc.join.assigned = ShortAddr::UNASSIGNED;
                self.svc.join.last_failure = None;
                let next = self.join_begin(&request);
                self.svc.join.svc.set_phase(next);
                self.scheduler.post(NwkTask::Join);
            }
            Phase::Issue(step) => self.join_issue(step),
            Phase::Await(_) => {}
            Phase::Confirm(status) => self.join_confirm(status),
        }
    }

    fn join_begin(&mut self, request: &JoinRequest) -> Phase<JoinStep> {
        if self.nib.device_type == DeviceType::Coordinator {
            return Phase::Confirm(NwkStatus::InvalidRequest);
        }
        match request.method {
            JoinMethod::Association => {
                if self.nib.joined {
                    return Phase::Confirm(NwkStatus::InvalidRequest);
                }
                self.select_parent(request)
            }
            JoinMethod::Rejoin => {
                if request.channels.supported().is_empty() {
                    return Phase::Confirm(NwkStatus::InvalidParameter);
                }
                self.neighbors.clear_potential_parents();
                Phase::Issue(JoinStep::RejoinScan)
            }
            JoinMethod::Orphan => {
                if request.channels.supported().is_empty() {
                    return Phase::Confirm(NwkStatus::InvalidParameter);
                }
                Phase::Issue(JoinStep::OrphanScan)
            }
            JoinMethod::Silent(params) => {
                if self.nib.joined {
                    return Phase::Confirm(NwkStatus::InvalidRequest);
                }
                if !params.short_addr.is_unicast() || !params.pan_id.is_valid() {
                    return Phase::Confirm(NwkStatus::InvalidParameter);
                }
                self.svc.join.target = JoinTarget {
                    short: params.parent,
                    ext: params.parent_ext,
                    pan_id: params.pan_id,
                    ext_pan_id: request.ext_pan_id,
                    channel: params.channel,
                    depth: params.depth.saturating_sub(1),
                };
                self.svc.join.assigned = params.short_addr;
                Phase::Issue(JoinStep::SilentShort)
            }
        }
    }

    /// Best association parent, or the failure that ends the join
    fn select_parent(&mut self, request: &JoinRequest) -> Phase<JoinStep> {
        let as_router = request.capability.is_router();
        match self.neighbors.best_parent(request.ext_pan_id, as_router) {
            Some(parent) => {
                self.svc.join.target = JoinTarget::from_neighbor(parent);
                Phase::Issue(JoinStep::SetPanId)
            }
            None => Phase::Confirm(
                self.svc
                    .join
                    .last_failure
                    .map_or(NwkStatus::NotPermitted, NwkStatus::from),
            ),
        }
    }

    fn join_issue(&mut self, step: JoinStep) {
        let Some(request) = self.svc.join.svc.request().copied() else {
            return;
        };
        let target = self.svc.join.target;
        self.svc.join.svc.set_phase(Phase::Await(step));
        match step {
            JoinStep::SetPanId | JoinStep::RejoinPanId | JoinStep::SilentPanId => {
                self.set_pib(MacUser::Join, PibAttribute::PanId(target.pan_id));
            }
            JoinStep::RejoinChannel | JoinStep::SilentChannel => {
                self.set_pib(MacUser::Join, PibAttribute::LogicalChannel(target.channel));
            }
            JoinStep::SilentShort | JoinStep::SetShort => {
                let short = self.svc.join.assigned;
                self.set_pib(MacUser::Join, PibAttribute::ShortAddress(short));
            }
            JoinStep::SilentCoord => {
                self.set_pib(MacUser::Join, PibAttribute::CoordShortAddress(target.short));
            }
            JoinStep::Associate => {
                let associate = AssociateRequest {
                    channel: target.channel,
                    pan_id: target.pan_id,
                    coord: target.short,
                    capability: request.capability,
                };
                log_info!(self.log, self.now.as_millis(), "nwk.join", "associating with {}", target.short);
                self.mac.associate_request(MacUser::Join, &associate);
            }
            JoinStep::RejoinScan | JoinStep::OrphanScan => {
                let scan_type = if step == JoinStep::RejoinScan {
                    ScanType::Active
                } else {
                    ScanType::Orphan
                };
                let scan = ScanRequest {
                    scan_type,
                    channels: request.channels.supported(),
                    duration: request.scan_duration,
                };
                self.mac.scan_request(MacUser::Join, &scan);
            }
            JoinStep::RejoinSource => {
                let own = self.nib.short_addr();
                let source = if own.is_unicast() && own != ShortAddr::COORDINATOR {
                    own
                } else {
                    match random_candidate(&mut self.rng) {
                        Ok(addr) => addr,
                        Err(e) => {
                            self.join_step_failed(NwkStatus::from(e));
                            return;
                        }
                    }
                };
                self.set_pib(MacUser::Join, PibAttribute::ShortAddress(source));
            }
            JoinStep::SendRejoin => self.send_rejoin_request(target, request.capability),
            JoinStep::AwaitResponse => {}
        }
    }

    fn send_rejoin_request(&mut self, target: JoinTarget, capability: CapabilityInfo) {
        let mut header = self.command_header(target.short, 1);
        if target.ext.is_valid() {
            header.dst_ext = Some(target.ext);
        }
        let out = OutRequest::new(header, TxOwner::Join, TrafficClass::UnicastCommand).via(target.short);
        let command = NwkCommand::RejoinRequest(RejoinRequest { capability });
        log_info!(self.log, self.now.as_millis(), "nwk.join", "rejoin via {}", target.short);
        if let Err(e) = self.send_command(out, &command) {
            self.join_step_failed(NwkStatus::from(e));
        }
    }

    fn join_step_failed(&mut self, status: NwkStatus) {
        self.svc.join.svc.set_phase(Phase::Confirm(status));
        self.scheduler.post(NwkTask::Join);
    }

    pub(crate) fn join_mac_confirm(&mut self, confirm: &MacConfirm) {
        let Some(step) = self.svc.join.svc.awaiting() else {
            return;
        };
        let next = match (step, confirm) {
            (JoinStep::SetPanId, MacConfirm::Set { status }) => step_or_fail(*status, JoinStep::Associate),
            (JoinStep::Associate, MacConfirm::Associate { status, short_addr }) => {
                self.association_done(*status, *short_addr)
            }
            (JoinStep::RejoinScan, MacConfirm::Scan(scan)) => {
                if scan.status.is_success() || scan.status == MacStatus::NO_BEACON {
                    self.pick_rejoin_parent()
                } else {
                    Phase::Confirm(NwkStatus::from(scan.status))
                }
            }
            (JoinStep::RejoinChannel, MacConfirm::Set { status }) => step_or_fail(*status, JoinStep::RejoinPanId),
            (JoinStep::RejoinPanId, MacConfirm::Set { status }) => step_or_fail(*status, JoinStep::RejoinSource),
            (JoinStep::RejoinSource, MacConfirm::Set { status }) => step_or_fail(*status, JoinStep::SendRejoin),
            (JoinStep::SetShort, MacConfirm::Set { status }) => {
                if status.is_success() {
                    let short = self.svc.join.assigned;
                    self.commit_join(short);
                    Phase::Confirm(NwkStatus::Success)
                } else {
                    Phase::Confirm(NwkStatus::from(*status))
                }
            }
            (JoinStep::OrphanScan, MacConfirm::Scan(scan)) => match scan.realignment {
                Some(realign) if scan.status.is_success() => {
                    let depth = self.nib.depth.saturating_sub(1);
                    self.svc.join.target = JoinTarget {
                        short: realign.coord_short,
                        ext: realign.coord_ext,
                        pan_id: realign.pan_id,
                        ext_pan_id: self.nib.ext_pan_id,
                        channel: realign.channel,
                        depth,
                    };
                    self.commit_join(realign.short_addr);
                    Phase::Confirm(NwkStatus::Success)
                }
                _ => Phase::Confirm(NwkStatus::NoNetworks),
            },
            (JoinStep::SilentShort, MacConfirm::Set { status }) => step_or_fail(*status, JoinStep::SilentPanId),
            (JoinStep::SilentPanId, MacConfirm::Set { status }) => step_or_fail(*status, JoinStep::SilentChannel),
            (JoinStep::SilentChannel, MacConfirm::Set { status }) => step_or_fail(*status, JoinStep::SilentCoord),
            (JoinStep::SilentCoord, MacConfirm::Set { status }) => {
                if status.is_success() {
                    let short = self.svc.join.assigned;
                    self.commit_join(short);
                    Phase::Confirm(NwkStatus::Success)
                } else {
                    Phase::Confirm(NwkStatus::from(*status))
                }
            }
            // Poll confirms while waiting for the rejoin response carry nothing
            _ => return,
        };
        self.svc.join.svc.set_phase(next);
        self.scheduler.post(NwkTask::Join);
    }

    fn association_done(&mut self, status: MacStatus, short: ShortAddr) -> Phase<JoinStep> {
        if status.is_success() && short.is_unicast() {
            self.commit_join(short);
            return Phase::Confirm(NwkStatus::Success);
        }
        let parent = self.svc.join.target.short;
        log_info!(self.log, self.now.as_millis(), "nwk.join", "{} refused: {:?}", parent, status);
        if let Some(n) = self.neighbors.find_short_mut(parent) {
            n.permit_joining = false;
        }
        self.svc.join.last_failure = Some(status);
        match self.svc.join.svc.request().copied() {
            Some(request) => self.select_parent(&request),
            None => Phase::Confirm(NwkStatus::from(status)),
        }
    }

    fn pick_rejoin_parent(&mut self) -> Phase<JoinStep> {
        let ext_pan_id = match self.svc.join.svc.request() {
            Some(request) if request.ext_pan_id.is_specified() => request.ext_pan_id,
            _ => self.nib.ext_pan_id,
        };
        match rejoin_candidate(self.neighbors.iter(), ext_pan_id) {
            Some(parent) => {
                self.svc.join.target = JoinTarget::from_neighbor(parent);
                Phase::Issue(JoinStep::RejoinChannel)
            }
            None => Phase::Confirm(NwkStatus::NoNetworks),
        }
    }

    pub(crate) fn join_tx_done(&mut self, status: NwkStatus) {
        if !self.svc.join.svc.is_awaiting(JoinStep::SendRejoin) {
            return;
        }
        if !status.is_success() {
            self.join_step_failed(status);
            return;
        }
        let now = self.now;
        if let Err(e) = self
            .timers
            .start(NwkTimer::RejoinResponse, now, Millis::new(REJOIN_RESPONSE_WAIT_MS))
        {
            self.join_step_failed(NwkStatus::from(e));
            return;
        }
        self.svc.join.svc.set_phase(Phase::Await(JoinStep::AwaitResponse));
        if !self.nib.pib.rx_on_when_idle {
            let poll = PollRequest {
                coord: self.svc.join.target.short,
            };
            self.mac.poll_request(MacUser::Join, &poll);
        }
    }

    pub(crate) fn rejoin_response_timeout(&mut self) {
        if self.svc.join.svc.is_awaiting(JoinStep::AwaitResponse) {
            log_info!(self.log, self.now.as_millis(), "nwk.join", "no rejoin response");
            self.join_step_failed(NwkStatus::Mac(MacStatus::NO_DATA));
        }
    }

    pub(crate) fn rejoin_response_received(&mut self, header: &NwkHeader, response: &RejoinResponse) {
        if !self.svc.join.svc.is_awaiting(JoinStep::AwaitResponse) || header.src != self.svc.join.target.short {
            log_debug!(self.log, self.now.as_millis(), "nwk.join", "unexpected rejoin response from {}", header.src);
            return;
        }
        self.timers.stop(NwkTimer::RejoinResponse);
        let status = MacStatus(response.status);
        let next = if status.is_success() && response.short_addr.is_unicast() {
            self.svc.join.assigned = response.short_addr;
            Phase::Issue(JoinStep::SetShort)
        } else {
            Phase::Confirm(NwkStatus::from(status))
        };
        self.svc.join.svc.set_phase(next);
        self.scheduler.post(NwkTask::Join);
    }

    /// Record the new parent and mark the device joined
    fn commit_join(&mut self, short: ShortAddr) {
        let target = self.svc.join.target;
        if let Some(old) = self.neighbors.parent().map(|p| p.short) {
            if old != target.short {
                if let Some(n) = self.neighbors.find_short_mut(old) {
                    n.relationship = Relationship::None;
                }
            }
        }

        let device_type = if target.short == ShortAddr::COORDINATOR {
            DeviceType::Coordinator
        } else {
            DeviceType::Router
        };
        let mut parent = self
            .neighbors
            .find_short(target.short)
            .copied()
            .unwrap_or_else(|| NeighborEntry::new(target.short, target.ext, device_type));
        parent.relationship = Relationship::Parent;
        parent.potential_parent = false;
        parent.depth = target.depth;
        parent.pan_id = target.pan_id;
        parent.ext_pan_id = target.ext_pan_id;
        parent.channel = target.channel;
        if let Err(e) = self.neighbors.add_or_update(parent) {
            log_warn!(self.log, self.now.as_millis(), "nwk.join", "parent not tracked: {}", e);
        }
        if parent.ext.is_valid() {
            if let Err(e) = self.address_map.insert(parent.short, parent.ext) {
                log_debug!(self.log, self.now.as_millis(), "nwk.join", "parent not mapped: {}", e);
            }
        }
        self.neighbors.clear_potential_parents();

        self.nib.pib.short_addr = short;
        self.nib.pib.pan_id = target.pan_id;
        self.nib.pib.channel = target.channel;
        self.nib.pib.coord_short = target.short;
        self.nib.pib.coord_ext = target.ext;
        if target.ext_pan_id.is_specified() {
            self.nib.ext_pan_id = target.ext_pan_id;
        }
        self.nib.depth = target.depth.saturating_add(1);
        self.nib.joined = true;
        self.dirty = true;
        log_info!(self.log, self.now.as_millis(), "nwk.join", "joined as {} under {}", short, target.short);
    }

    fn join_confirm(&mut self, status: NwkStatus) {
        self.timers.stop(NwkTimer::RejoinResponse);
        let short_addr = if status.is_success() {
            self.nib.short_addr()
        } else {
            log_warn!(self.log, self.now.as_millis(), "nwk.join", "join failed: {:?}", status);
            ShortAddr::UNASSIGNED
        };
        let confirm = NwkConfirm::Join {
            status,
            short_addr,
            ext_pan_id: self.nib.ext_pan_id,
            channel: self.nib.pib.channel,
        };
        if let Some(done) = self.svc.join.svc.finish() {
            self.deliver(done.handle, confirm);
        }
        self.service_done(NwkTask::Join);
    }

    // ========================================================================
    // Parent side
    // ========================================================================

    /// Room for another child of this kind
    fn has_child_capacity(&self, as_router: bool) -> bool {
        let max_routers = usize::from(self.config.max_routers);
        let max_end_devices = usize::from(self.config.max_children.saturating_sub(self.config.max_routers));
        if as_router {
            self.neighbors.router_children() < max_routers
        } else {
            self.neighbors.end_device_children() < max_end_devices
        }
    }

    /// MLME-ASSOCIATE.indication
    pub(crate) fn associate_indication(&mut self, device: ExtAddr, capability: CapabilityInfo) {
        let known = self
            .neighbors
            .find_ext(device)
            .filter(|n| n.relationship.is_child())
            .map(|n| n.short);
        let (status, short) = if !self.nib.joined || !self.nib.is_router() || !self.nib.permit_joining {
            (MacStatus::PAN_ACCESS_DENIED, ShortAddr::UNASSIGNED)
        } else if known.is_none() && !self.has_child_capacity(capability.is_router()) {
            (MacStatus::PAN_AT_CAPACITY, ShortAddr::UNASSIGNED)
        } else {
            let requested = known.unwrap_or(ShortAddr::UNASSIGNED);
            match self.admit_child(device, capability, requested) {
                Ok(short) => (MacStatus::SUCCESS, short),
                Err(e) => {
                    log_info!(self.log, self.now.as_millis(), "nwk.join", "{} not admitted: {}", device, e);
                    (MacStatus::PAN_AT_CAPACITY, ShortAddr::UNASSIGNED)
                }
            }
        };

        if status.is_success() {
            let child = PendingChild {
                ext: device,
                short,
                capability,
                rejoin: false,
            };
            if self.svc.join.pending.push(child).is_err() {
                log_warn!(self.log, self.now.as_millis(), "nwk.join", "too many pending children");
                self.remove_device(short, device);
                return;
            }
        }
        log_info!(self.log, self.now.as_millis(), "nwk.join", "associate {} -> {} {:?}", device, short, status);
        let response = AssociateResponse {
            device,
            short_addr: short,
            status,
        };
        self.mac.associate_response(MacUser::Parent, &response);
    }

    /// MLME-ORPHAN.indication
    pub(crate) fn orphan_indication(&mut self, device: ExtAddr) {
        let Some(child) = self
            .neighbors
            .find_ext(device)
            .filter(|n| n.relationship.is_child())
            .copied()
        else {
            log_debug!(self.log, self.now.as_millis(), "nwk.join", "orphan {} is not our child", device);
            return;
        };
        let capability = if child.is_router() {
            CapabilityInfo::router()
        } else if child.rx_on_when_idle {
            CapabilityInfo::rx_on_end_device()
        } else {
            CapabilityInfo::sleepy_end_device()
        };
        let pending = PendingChild {
            ext: device,
            short: child.short,
            capability,
            rejoin: true,
        };
        if self.svc.join.pending.push(pending).is_err() {
            log_warn!(self.log, self.now.as_millis(), "nwk.join", "too many pending children");
            return;
        }
        let response = OrphanResponse {
            device,
            short_addr: child.short,
            associated: true,
        };
        self.mac.orphan_response(MacUser::Parent, &response);
    }

    /// Confirms for requests issued as a parent
    pub(crate) fn parent_mac_confirm(&mut self, confirm: &MacConfirm) {
        let MacConfirm::CommStatus { device, status } = confirm else {
            return;
        };
        let Some(child) = self.svc.join.take_pending(*device) else {
            return;
        };
        if !status.is_success() {
            log_info!(self.log, self.now.as_millis(), "nwk.join", "response to {} lost: {:?}", child.ext, status);
            if !child.rejoin {
                self.remove_device(child.short, child.ext);
            }
            return;
        }
        self.upper.indication(NwkIndication::Join {
            short_addr: child.short,
            ext_addr: child.ext,
            capability: child.capability,
            rejoin: child.rejoin,
        });
        if !child.rejoin {
            let beacon = self.beacon_attribute();
            self.set_pib(MacUser::Parent, beacon);
        }
    }

    /// Rejoin request addressed to us
    ///
    /// # Errors
    /// `InvalidParameter` if the request does not carry the IEEE address of
    /// the sender, queueing errors for the response.
    pub(crate) fn rejoin_request_received(
        &mut self,
        header: &NwkHeader,
        request: &RejoinRequest,
        prev_hop: ShortAddr,
    ) -> Result<()> {
        if !self.nib.joined || !self.nib.is_router() {
            return Ok(());
        }
        let ext = header.src_ext.ok_or(Error::InvalidParameter)?;
        let (status, short) = match self.admit_child(ext, request.capability, header.src) {
            Ok(short) => (MacStatus::SUCCESS, short),
            Err(e) => {
                log_info!(self.log, self.now.as_millis(), "nwk.join", "rejoin of {} refused: {}", ext, e);
                (MacStatus::PAN_AT_CAPACITY, ShortAddr::UNASSIGNED)
            }
        };

        let mut response_header = self.command_header(header.src, 1);
        response_header.dst_ext = Some(ext);
        let out = OutRequest::new(response_header, TxOwner::Command, TrafficClass::UnicastCommand).via(prev_hop);
        let command = NwkCommand::RejoinResponse(RejoinResponse {
            short_addr: short,
            status: status.0,
        });
        self.send_command(out, &command)?;

        if status.is_success() {
            log_info!(self.log, self.now.as_millis(), "nwk.join", "{} rejoined as {}", ext, short);
            self.upper.indication(NwkIndication::Join {
                short_addr: short,
                ext_addr: ext,
                capability: request.capability,
                rejoin: true,
            });
        }
        Ok(())
    }
}
