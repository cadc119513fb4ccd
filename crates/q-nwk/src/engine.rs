// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! NWK engine
//!
//! [`Nwk`] owns every table, queue and state machine of the network layer
//! of one device. The platform drives it from three entry points:
//!
//! - [`Nwk::tick`] advances the clock and fires expired timers
//! - [`Nwk::mac_confirm`] / [`Nwk::mac_indication`] hand over MAC events
//! - [`Nwk::run_once`] runs one pending task to completion
//!
//! Nothing blocks. A state machine waiting for the MAC or a timer simply
//! returns; the event that wakes it posts its task again.

use heapless::{Deque, Vec};
use q_common::constants::{NWK_TIMER_COUNT, RX_INBOX_SIZE};
use q_common::log::LogBuffer;
use q_common::{log_debug, log_info, log_warn};
use q_common::{
    DeviceType, Error, ExtAddr, Instant, Millis, NwkConfig, Relationship, Result, ShortAddr,
};
use q_hal::RngInterface;
use q_kernel::{TaskId, TaskScheduler, Timers};

use crate::address_map::AddressMap;
use crate::addressing::{AddressAllocator, AddressUsage};
use crate::mac::{MacConfirm, MacIndication, MacService, MacUser, PibAttribute, PibId};
use crate::neighbor::{NeighborEntry, NeighborTable};
use crate::nib::Nib;
use crate::persistence::{NwkSnapshot, PersistenceHook};
use crate::routing::{BroadcastTable, DiscoveryTable, RouteStatus, RoutingContext, RoutingTable};
use crate::rx::RxFrame;
use crate::security::{SecurityMaterial, SecurityProvider};
use crate::services::Services;
use crate::status::MacStatus;
use crate::tx::TxPipeline;
use crate::upper::{NwkConfirm, RequestHandle, UpperLayer};

/// Outstanding PIB writes tracked at once
const MAX_PENDING_PIB_SETS: usize = 8;

// ============================================================================
// Tasks and Timers
// ============================================================================

/// Scheduler task identifiers, one per component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum NwkTask {
    /// NLME-RESET state machine
    Reset = 0,
    /// NLME-NETWORK-FORMATION state machine
    Formation = 1,
    /// NLME-NETWORK-DISCOVERY state machine
    Discovery = 2,
    /// NLME-ED-SCAN state machine
    EdScan = 3,
    /// NLME-JOIN state machine
    Join = 4,
    /// NLME-DIRECT-JOIN state machine
    DirectJoin = 5,
    /// NLME-LEAVE state machine
    Leave = 6,
    /// NLME-SYNC state machine
    Sync = 7,
    /// NLME-START-ROUTER state machine
    StartRouter = 8,
    /// NLME-PERMIT-JOINING state machine
    PermitJoining = 9,
    /// NLME-ROUTE-DISCOVERY state machine
    RouteDiscovery = 10,
    /// Outgoing packet transmission
    Tx = 11,
    /// Completed transmission confirms
    TxConfirm = 12,
    /// Received frame processing
    Rx = 13,
    /// Periodic link status
    LinkStatus = 14,
}

impl NwkTask {
    const ALL: [Self; 15] = [
        Self::Reset,
        Self::Formation,
        Self::Discovery,
        Self::EdScan,
        Self::Join,
        Self::DirectJoin,
        Self::Leave,
        Self::Sync,
        Self::StartRouter,
        Self::PermitJoining,
        Self::RouteDiscovery,
        Self::Tx,
        Self::TxConfirm,
        Self::Rx,
        Self::LinkStatus,
    ];
}

impl TaskId for NwkTask {
    const COUNT: usize = 15;

    fn index(self) -> usize {
        self as usize
    }

    fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }
}

/// Application timers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NwkTimer {
    /// End of the permit joining window
    PermitJoin,
    /// Rejoin response wait
    RejoinResponse,
    /// Route discovery timeout
    RouteDiscovery,
    /// Link status period
    LinkStatus,
    /// Many-to-one route request period
    Concentrator,
}

// ============================================================================
// Engine
// ============================================================================

/// ZigBee NWK layer of one device
///
/// Generic over the MAC (`M`), the security provider (`S`), the upper layer
/// (`U`) and the random number source (`R`).
pub struct Nwk<M, S, U, R> {
    pub(crate) config: NwkConfig,
    pub(crate) now: Instant,
    pub(crate) scheduler: TaskScheduler<NwkTask>,
    pub(crate) timers: Timers<NwkTimer, NWK_TIMER_COUNT>,
    pub(crate) log: LogBuffer,
    pub(crate) nib: Nib,
    pub(crate) neighbors: NeighborTable,
    pub(crate) address_map: AddressMap,
    pub(crate) allocator: AddressAllocator,
    pub(crate) routes: RoutingTable,
    pub(crate) discoveries: DiscoveryTable,
    pub(crate) btt: BroadcastTable,
    pub(crate) tx: TxPipeline,
    pub(crate) inbox: Deque<RxFrame, RX_INBOX_SIZE>,
    pub(crate) svc: Services,
    pub(crate) pib_sets: Vec<(MacUser, PibAttribute), MAX_PENDING_PIB_SETS>,
    pub(crate) dirty: bool,
    pub(crate) mac: M,
    pub(crate) security: S,
    pub(crate) upper: U,
    pub(crate) rng: R,
}

impl<M, S, U, R> Nwk<M, S, U, R>
where
    M: MacService,
    S: SecurityProvider,
    U: UpperLayer,
    R: RngInterface,
{
    /// Create an engine for `config`
    ///
    /// The IEEE address is read from the MAC.
    ///
    /// # Errors
    /// `InvalidParameter` for an inconsistent configuration, `InvalidState`
    /// if the MAC does not report a valid IEEE address.
    pub fn new(config: NwkConfig, mut mac: M, security: S, upper: U, rng: R) -> Result<Self> {
        config.validate()?;
        let ext = match mac.get_request(PibId::ExtendedAddress) {
            Some(PibAttribute::ExtendedAddress(ext)) if ext.is_valid() => ext,
            _ => return Err(Error::InvalidState),
        };

        let mut log = LogBuffer::new();
        log_info!(log, 0, "nwk", "init {:?} ext={:016X}", config.device_type, ext.0);

        Ok(Self {
            config,
            now: Instant::from_millis(0),
            scheduler: TaskScheduler::new(),
            timers: Timers::new(),
            log,
            nib: Nib::new(&config, ext),
            neighbors: NeighborTable::new(),
            address_map: AddressMap::new(),
            allocator: AddressAllocator::new(&config),
            routes: RoutingTable::new(),
            discoveries: DiscoveryTable::new(),
            btt: BroadcastTable::new(),
            tx: TxPipeline::new(),
            inbox: Deque::new(),
            svc: Services::default(),
            pib_sets: Vec::new(),
            dirty: false,
            mac,
            security,
            upper,
            rng,
        })
    }

    // ========================================================================
    // Driving the engine
    // ========================================================================

    /// Advance the clock to `now`
    ///
    /// Fires expired timers, ages the broadcast and route discovery tables
    /// and schedules packets whose transmission delay has elapsed.
    pub fn tick(&mut self, now: Instant) {
        self.now = now;
        while let Some(timer) = self.timers.poll_expired(now) {
            self.on_timer(timer);
        }
        self.btt.expire(now);
        let expired = self.discoveries.expire(now);
        if expired > 0 {
            log_debug!(self.log, now.as_millis(), "nwk.route", "{} discovery entries expired", expired);
        }
        if self.tx_due() {
            self.scheduler.post(NwkTask::Tx);
        }
    }

    /// Run one pending task
    ///
    /// Returns `true` while more tasks are pending.
    pub fn run_once(&mut self) -> bool {
        if let Some(task) = self.scheduler.next_task() {
            self.run_task(task);
        }
        self.scheduler.has_pending()
    }

    /// Any task is pending
    #[must_use]
    pub fn has_pending_work(&self) -> bool {
        self.scheduler.has_pending()
    }

    /// Earliest time [`Nwk::tick`] has something to do
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        let timer = self.timers.next_deadline(self.now);
        let packet = self.tx_next_deadline();
        match (timer, packet) {
            (Some(a), Some(b)) => Some(if a.since(self.now) <= b.since(self.now) { a } else { b }),
            (a, b) => a.or(b),
        }
    }

    fn run_task(&mut self, task: NwkTask) {
        match task {
            NwkTask::Reset => self.run_reset(),
            NwkTask::Formation => self.run_formation(),
            NwkTask::Discovery => self.run_discovery(),
            NwkTask::EdScan => self.run_ed_scan(),
            NwkTask::Join => self.run_join(),
            NwkTask::DirectJoin => self.run_direct_join(),
            NwkTask::Leave => self.run_leave(),
            NwkTask::Sync => self.run_sync(),
            NwkTask::StartRouter => self.run_start_router(),
            NwkTask::PermitJoining => self.run_permit_joining(),
            NwkTask::RouteDiscovery => self.run_route_discovery(),
            NwkTask::Tx => self.run_tx(),
            NwkTask::TxConfirm => self.run_tx_confirm(),
            NwkTask::Rx => self.run_rx(),
            NwkTask::LinkStatus => self.run_link_status(),
        }
    }

    fn on_timer(&mut self, timer: NwkTimer) {
        log_debug!(self.log, self.now.as_millis(), "nwk", "timer {:?}", timer);
        match timer {
            NwkTimer::PermitJoin => self.permit_join_expired(),
            NwkTimer::RejoinResponse => self.rejoin_response_timeout(),
            NwkTimer::RouteDiscovery => self.route_discovery_timeout(),
            NwkTimer::LinkStatus => self.scheduler.post(NwkTask::LinkStatus),
            NwkTimer::Concentrator => self.concentrator_due(),
        }
    }

    /// Hand over a MAC confirm for a request issued by `user`
    pub fn mac_confirm(&mut self, user: MacUser, confirm: MacConfirm) {
        if let MacConfirm::Set { status } = &confirm {
            self.pib_set_done(user, *status);
        }
        match user {
            MacUser::Reset => self.reset_mac_confirm(&confirm),
            MacUser::Formation => self.formation_mac_confirm(confirm),
            MacUser::Discovery => self.discovery_mac_confirm(&confirm),
            MacUser::EdScan => self.ed_scan_mac_confirm(confirm),
            MacUser::Join => self.join_mac_confirm(&confirm),
            MacUser::Sync => self.sync_mac_confirm(&confirm),
            MacUser::StartRouter => self.start_router_mac_confirm(&confirm),
            MacUser::PermitJoining => self.permit_joining_mac_confirm(&confirm),
            MacUser::Parent => self.parent_mac_confirm(&confirm),
            MacUser::Tx(slot) => match confirm {
                MacConfirm::Data { status, .. } => self.tx_mac_confirm(slot, status),
                other => {
                    log_warn!(self.log, self.now.as_millis(), "nwk.tx", "unexpected confirm {:?}", other);
                }
            },
        }
    }

    /// Hand over an unsolicited MAC event
    pub fn mac_indication(&mut self, indication: MacIndication<'_>) {
        match indication {
            MacIndication::Data(data) => self.receive(&data),
            MacIndication::BeaconNotify(notify) => self.beacon_notify(&notify),
            MacIndication::Associate { device, capability } => {
                self.associate_indication(device, capability);
            }
            MacIndication::Orphan { device } => self.orphan_indication(device),
        }
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// Configuration in use
    #[must_use]
    pub const fn config(&self) -> &NwkConfig {
        &self.config
    }

    /// Engine clock
    #[must_use]
    pub const fn now(&self) -> Instant {
        self.now
    }

    /// NWK information base
    #[must_use]
    pub const fn nib(&self) -> &Nib {
        &self.nib
    }

    /// Neighbor table
    #[must_use]
    pub const fn neighbors(&self) -> &NeighborTable {
        &self.neighbors
    }

    /// Routing table
    #[must_use]
    pub const fn routes(&self) -> &RoutingTable {
        &self.routes
    }

    /// Route discovery table
    #[must_use]
    pub const fn discoveries(&self) -> &DiscoveryTable {
        &self.discoveries
    }

    /// Address map
    #[must_use]
    pub const fn address_map(&self) -> &AddressMap {
        &self.address_map
    }

    /// Address allocator
    #[must_use]
    pub const fn allocator(&self) -> &AddressAllocator {
        &self.allocator
    }

    /// Log buffer
    #[must_use]
    pub const fn log(&self) -> &LogBuffer {
        &self.log
    }

    /// Log buffer, mutably (to change the level)
    pub fn log_mut(&mut self) -> &mut LogBuffer {
        &mut self.log
    }

    /// MAC
    #[must_use]
    pub const fn mac(&self) -> &M {
        &self.mac
    }

    /// MAC, mutably
    pub fn mac_mut(&mut self) -> &mut M {
        &mut self.mac
    }

    /// Upper layer
    #[must_use]
    pub const fn upper(&self) -> &U {
        &self.upper
    }

    /// Upper layer, mutably
    pub fn upper_mut(&mut self) -> &mut U {
        &mut self.upper
    }

    /// Security provider, mutably
    pub fn security_mut(&mut self) -> &mut S {
        &mut self.security
    }

    /// Check whether the component behind `task` has nothing to do
    ///
    /// Service components are idle when no request is queued or active; the
    /// transmit components when no packet is outstanding; receive when the
    /// inbox is empty.
    #[must_use]
    pub fn is_service_idle(&self, task: NwkTask) -> bool {
        match task {
            NwkTask::Reset => self.svc.reset.svc.is_idle(),
            NwkTask::Formation => self.svc.formation.svc.is_idle(),
            NwkTask::Discovery => self.svc.discovery.svc.is_idle(),
            NwkTask::EdScan => self.svc.ed_scan.svc.is_idle(),
            NwkTask::Join => self.svc.join.svc.is_idle(),
            NwkTask::DirectJoin => self.svc.direct_join.svc.is_idle(),
            NwkTask::Leave => self.svc.leave.svc.is_idle(),
            NwkTask::Sync => self.svc.sync.svc.is_idle(),
            NwkTask::StartRouter => self.svc.start_router.svc.is_idle(),
            NwkTask::PermitJoining => self.svc.permit_joining.svc.is_idle(),
            NwkTask::RouteDiscovery => self.svc.route_discovery.svc.is_idle(),
            NwkTask::Tx | NwkTask::TxConfirm => self.tx.is_idle(),
            NwkTask::Rx => self.inbox.is_empty(),
            NwkTask::LinkStatus => !self.scheduler.is_pending(NwkTask::LinkStatus),
        }
    }

    // ========================================================================
    // Routing
    // ========================================================================

    /// Remove every route whose destination or next hop is `addr`
    ///
    /// Returns the number of entries removed.
    pub fn delete_route(&mut self, addr: ShortAddr) -> usize {
        let removed = self.routes.delete_route(addr);
        if removed > 0 {
            self.dirty = true;
            log_info!(self.log, self.now.as_millis(), "nwk.route", "deleted {} routes via {:04X}", removed, addr.0);
        }
        removed
    }

    pub(crate) fn routing_context(&self) -> RoutingContext<'_> {
        RoutingContext {
            own: self.nib.short_addr(),
            depth: self.nib.depth,
            device_type: self.nib.device_type,
            mesh_routing: self.config.mesh_routing,
            use_tree_routing: self.config.use_tree_routing,
            parent: self.neighbors.parent().map(|p| p.short),
            routes: &self.routes,
            neighbors: &self.neighbors,
            allocator: &self.allocator,
        }
    }

    /// Forget a device that left: neighbor, address map and routes
    pub(crate) fn remove_device(&mut self, short: ShortAddr, ext: ExtAddr) {
        self.neighbors.remove(short);
        if let Some(entry) = self.neighbors.find_ext(ext) {
            let stale = entry.short;
            self.neighbors.remove(stale);
        }
        self.address_map.remove(short);
        self.delete_route(short);
        self.dirty = true;
    }

    /// Drop every network association of this device
    pub(crate) fn forget_network(&mut self) {
        self.timers.clear();
        self.nib.leave_network();
        self.neighbors.clear();
        self.address_map.clear();
        self.allocator.reset();
        self.routes.clear();
        self.discoveries.clear();
        self.btt.clear();
        self.dirty = true;
    }

    /// Allocate an address for a child and record it as a neighbor
    pub(crate) fn admit_child(
        &mut self,
        ext: ExtAddr,
        capability: q_common::CapabilityInfo,
        requested: ShortAddr,
    ) -> Result<ShortAddr> {
        let mut allocator = self.allocator;
        let usage = AddressUsage {
            neighbors: &self.neighbors,
            routes: &self.routes,
            address_map: &self.address_map,
            own: self.nib.short_addr(),
        };
        let short = allocator.allocate_short_addr(
            capability.is_router(),
            requested,
            ext,
            self.nib.depth,
            &usage,
            &mut self.rng,
        )?;

        let device_type = if capability.is_router() {
            DeviceType::Router
        } else {
            DeviceType::EndDevice
        };
        let mut entry = NeighborEntry::new(short, ext, device_type);
        entry.relationship = Relationship::Child;
        entry.rx_on_when_idle = capability.rx_on_when_idle();
        entry.depth = self.nib.depth.saturating_add(1);
        entry.pan_id = self.nib.pib.pan_id;
        entry.ext_pan_id = self.nib.ext_pan_id;
        entry.channel = self.nib.pib.channel;
        self.neighbors.add_or_update(entry)?;
        if let Err(e) = self.address_map.insert(short, ext) {
            self.neighbors.remove(short);
            return Err(e);
        }
        self.allocator = allocator;
        self.dirty = true;
        Ok(short)
    }

    // ========================================================================
    // Service plumbing
    // ========================================================================

    /// A reset is queued; other services must not begin new requests
    pub(crate) fn reset_pending(&self) -> bool {
        self.svc.reset.svc.has_work()
    }

    /// Deliver a confirm unless the request was raised internally
    pub(crate) fn deliver(&mut self, handle: RequestHandle, confirm: NwkConfirm) {
        let status = confirm.status();
        if handle.is_internal() {
            log_debug!(self.log, self.now.as_millis(), "nwk", "internal confirm {:?}", status);
            return;
        }
        log_debug!(self.log, self.now.as_millis(), "nwk", "confirm #{} {:?}", handle.0, status);
        self.upper.confirm(handle, confirm);
    }

    /// A service finished its active request
    pub(crate) fn service_done(&mut self, task: NwkTask) {
        if !self.is_service_idle(task) {
            self.scheduler.post(task);
        }
        if self.reset_pending() {
            self.scheduler.post(NwkTask::Reset);
        }
    }

    /// Issue an MLME-SET and remember the value until it is confirmed
    pub(crate) fn set_pib(&mut self, user: MacUser, attribute: PibAttribute) {
        if let Some(pos) = self.pib_sets.iter().position(|(u, _)| *u == user) {
            self.pib_sets.swap_remove(pos);
        }
        if self.pib_sets.push((user, attribute)).is_err() {
            log_warn!(self.log, self.now.as_millis(), "nwk", "pib write untracked: {:?}", attribute.id());
        }
        self.mac.set_request(user, attribute);
    }

    fn pib_set_done(&mut self, user: MacUser, status: MacStatus) {
        let Some(pos) = self.pib_sets.iter().position(|(u, _)| *u == user) else {
            return;
        };
        let (_, attribute) = self.pib_sets.swap_remove(pos);
        if status.is_success() {
            self.nib.pib.apply(attribute);
        } else {
            log_warn!(self.log, self.now.as_millis(), "nwk", "set {:?} failed {:?}", attribute.id(), status);
        }
    }

    /// Beacon payload reflecting our current join capacity
    pub(crate) fn beacon_attribute(&self) -> PibAttribute {
        let max_routers = usize::from(self.config.max_routers);
        let max_end_devices =
            usize::from(self.config.max_children.saturating_sub(self.config.max_routers));
        let router_capacity = self.nib.is_router() && self.neighbors.router_children() < max_routers;
        let end_device_capacity = self.nib.is_router() && self.neighbors.end_device_children() < max_end_devices;
        PibAttribute::BeaconPayload(
            self.nib
                .beacon_payload(router_capacity, end_device_capacity)
                .to_bytes(),
        )
    }

    /// Start the periodic jobs of a running router
    pub(crate) fn start_router_timers(&mut self) {
        let now = self.now;
        let period = self.config.link_status_period_ms;
        if period > 0 && self.timers.start_periodic(NwkTimer::LinkStatus, now, Millis::new(period)).is_err() {
            log_warn!(self.log, now.as_millis(), "nwk", "link status timer unavailable");
        }
        let concentrator = self.config.concentrator;
        if concentrator.enabled && concentrator.discovery_time_ms > 0 {
            let period = Millis::new(concentrator.discovery_time_ms);
            if self.timers.start_periodic(NwkTimer::Concentrator, now, period).is_err() {
                log_warn!(self.log, now.as_millis(), "nwk", "concentrator timer unavailable");
            }
            self.concentrator_due();
        }
    }

    // ========================================================================
    // Key material
    // ========================================================================

    /// Install a network key
    ///
    /// # Errors
    /// `NoKey` if both slots hold keys and the inactive one cannot be
    /// replaced.
    pub fn install_key(&mut self, material: SecurityMaterial) -> Result<()> {
        let seq = material.key_seq;
        self.nib.keys.install(material)?;
        log_info!(self.log, self.now.as_millis(), "nwk.sec", "key seq {} installed", seq);
        Ok(())
    }

    /// Make an installed key the active one
    ///
    /// # Errors
    /// `NoKey` if no key with `seq` is installed.
    pub fn activate_key(&mut self, seq: u8) -> Result<()> {
        self.nib.keys.activate(seq)?;
        log_info!(self.log, self.now.as_millis(), "nwk.sec", "key seq {} active", seq);
        Ok(())
    }

    // ========================================================================
    // Persistence
    // ========================================================================

    /// Persistent state changed since the last successful store
    #[must_use]
    pub const fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Snapshot of the persistent state
    #[must_use]
    pub fn snapshot(&self) -> NwkSnapshot {
        let parent = self.neighbors.parent();
        let (routers_allocated, end_devices_allocated) = self.allocator.allocated();
        let mut snapshot = NwkSnapshot {
            joined: self.nib.joined,
            router_started: self.nib.router_started,
            pan_id: self.nib.pib.pan_id,
            short_addr: self.nib.short_addr(),
            channel: self.nib.pib.channel,
            ext_pan_id: self.nib.ext_pan_id,
            depth: self.nib.depth,
            update_id: self.nib.update_id,
            parent: parent.map_or(ShortAddr::UNASSIGNED, |p| p.short),
            parent_ext: parent.map_or(ExtAddr::UNKNOWN, |p| p.ext),
            routers_allocated,
            end_devices_allocated,
            ..NwkSnapshot::default()
        };
        for entry in self.address_map.iter() {
            if snapshot.address_map.push(*entry).is_err() {
                break;
            }
        }
        for route in self.routes.iter().filter(|r| r.status == RouteStatus::Active) {
            if snapshot.routes.push(*route).is_err() {
                break;
            }
        }
        snapshot
    }

    /// Reinstate state saved by [`Nwk::snapshot`]
    ///
    /// Only engine state is restored. The platform restores the MAC PIB
    /// (PAN id, short address, channel) itself.
    ///
    /// # Errors
    /// `InvalidState` while a service is active, table errors if the
    /// snapshot does not fit.
    pub fn restore(&mut self, snapshot: &NwkSnapshot) -> Result<()> {
        if !self.svc.all_idle_except_reset() || self.svc.reset.svc.is_active() {
            return Err(Error::InvalidState);
        }
        self.forget_network();

        self.nib.joined = snapshot.joined;
        self.nib.router_started = snapshot.router_started;
        self.nib.pib.pan_id = snapshot.pan_id;
        self.nib.pib.short_addr = snapshot.short_addr;
        self.nib.pib.channel = snapshot.channel;
        self.nib.ext_pan_id = snapshot.ext_pan_id;
        self.nib.depth = snapshot.depth;
        self.nib.update_id = snapshot.update_id;
        self.allocator
            .set_allocated(snapshot.routers_allocated, snapshot.end_devices_allocated);

        if snapshot.parent != ShortAddr::UNASSIGNED {
            let device_type = if snapshot.parent == ShortAddr::COORDINATOR {
                DeviceType::Coordinator
            } else {
                DeviceType::Router
            };
            let mut parent = NeighborEntry::new(snapshot.parent, snapshot.parent_ext, device_type);
            parent.relationship = Relationship::Parent;
            parent.depth = snapshot.depth.saturating_sub(1);
            parent.pan_id = snapshot.pan_id;
            parent.ext_pan_id = snapshot.ext_pan_id;
            parent.channel = snapshot.channel;
            self.neighbors.add_or_update(parent)?;
            self.nib.pib.coord_short = snapshot.parent;
            self.nib.pib.coord_ext = snapshot.parent_ext;
        }
        for entry in &snapshot.address_map {
            self.address_map.insert(entry.short, entry.ext)?;
        }
        for route in &snapshot.routes {
            self.routes.set_active(*route)?;
        }

        if self.nib.joined && self.nib.router_started {
            self.start_router_timers();
        }
        self.dirty = false;
        let short = snapshot.short_addr;
        log_info!(self.log, self.now.as_millis(), "nwk", "restored {:04X} ({} routes)", short.0, snapshot.routes.len());
        Ok(())
    }

    /// Offer the snapshot to `hook` if the state changed
    ///
    /// Returns `true` when a snapshot was stored.
    pub fn offer_persistence<P: PersistenceHook>(&mut self, hook: &mut P) -> bool {
        if !self.dirty {
            return false;
        }
        match hook.store(&self.snapshot()) {
            Ok(()) => {
                self.dirty = false;
                true
            }
            Err(e) => {
                log_warn!(self.log, self.now.as_millis(), "nwk", "snapshot store failed: {}", e);
                false
            }
        }
    }
}
