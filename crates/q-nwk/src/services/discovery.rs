// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! NLME-NETWORK-DISCOVERY and NLME-ED-SCAN
//!
//! Discovery runs one active scan. Every ZigBee beacon heard is recorded as
//! a potential parent in the neighbor table and merged into one descriptor
//! per extended PAN id.

use q_common::constants::BEACON_PROTOCOL_ID;
use q_common::{log_debug, log_info, log_warn};
use q_common::{ChannelMask, DeviceType, PanId, Relationship, Result, ShortAddr};
use q_hal::RngInterface;

use super::formation::FormationStep;
use super::join::JoinStep;
use super::{Phase, Service};
use crate::engine::{Nwk, NwkTask};
use crate::mac::{BeaconNotify, BeaconPayload, MacConfirm, MacService, MacUser, ScanRequest, ScanType};
use crate::neighbor::{lqi_to_cost, NeighborEntry};
use crate::security::SecurityProvider;
use crate::status::{MacStatus, NwkStatus};
use crate::upper::{
    DiscoveryRequest, EdScanRequest, EnergyList, NetworkDescriptor, NetworkList, NwkConfirm, RequestHandle,
    UpperLayer,
};

/// Discovery sub-requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryStep {
    /// Active scan
    ActiveScan,
}

/// NLME-NETWORK-DISCOVERY machine
#[derive(Debug, Default)]
pub struct DiscoveryState {
    /// Queue and phase
    pub svc: Service<DiscoveryRequest, DiscoveryStep>,
    networks: NetworkList,
}

/// Fold a beacon into the descriptor list, one entry per extended PAN id
///
/// Returns `false` if the list is full.
pub(crate) fn merge_network(
    networks: &mut NetworkList,
    pan_id: PanId,
    channel: u8,
    permit: bool,
    beacon: &BeaconPayload,
) -> bool {
    if let Some(known) = networks.iter_mut().find(|n| n.ext_pan_id == beacon.ext_pan_id) {
        known.permit_joining |= permit;
        known.router_capacity |= beacon.router_capacity;
        known.end_device_capacity |= beacon.end_device_capacity;
        known.update_id = known.update_id.max(beacon.update_id);
        return true;
    }
    networks
        .push(NetworkDescriptor {
            ext_pan_id: beacon.ext_pan_id,
            pan_id,
            channel,
            stack_profile: beacon.stack_profile,
            protocol_version: beacon.protocol_version,
            permit_joining: permit,
            router_capacity: beacon.router_capacity,
            end_device_capacity: beacon.end_device_capacity,
            update_id: beacon.update_id,
        })
        .is_ok()
}

/// ED scan sub-requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdScanStep {
    /// Energy detection scan
    Scan,
}

/// NLME-ED-SCAN machine
#[derive(Debug, Default)]
pub struct EdScanState {
    /// Queue and phase
    pub svc: Service<EdScanRequest, EdScanStep>,
    unscanned: ChannelMask,
    energy: EnergyList,
}

impl<M, S, U, R> Nwk<M, S, U, R>
where
    M: MacService,
    S: SecurityProvider,
    U: UpperLayer,
    R: RngInterface,
{
    // ========================================================================
    // Network discovery
    // ========================================================================

    /// NLME-NETWORK-DISCOVERY.request
    ///
    /// # Errors
    /// `PoolExhausted` if the request queue is full.
    pub fn discovery_request(&mut self, handle: RequestHandle, request: DiscoveryRequest) -> Result<()> {
        self.svc.discovery.svc.submit(request, handle)?;
        self.scheduler.post(NwkTask::Discovery);
        Ok(())
    }

    pub(crate) fn run_discovery(&mut self) {
        match self.svc.discovery.svc.phase() {
            Phase::Idle => {
                if self.svc.discovery.svc.try_begin(self.reset_pending()) {
                    self.scheduler.post(NwkTask::Discovery);
                }
            }
            Phase::Begin => {
                let Some(request) = self.svc.discovery.svc.request().copied() else {
                    return;
                };
                let next = if request.channels.supported().is_empty() {
                    Phase::Confirm(NwkStatus::InvalidParameter)
                } else {
                    self.svc.discovery.networks.clear();
                    self.neighbors.clear_potential_parents();
                    Phase::Issue(DiscoveryStep::ActiveScan)
                };
                self.svc.discovery.svc.set_phase(next);
                self.scheduler.post(NwkTask::Discovery);
            }
            Phase::Issue(DiscoveryStep::ActiveScan) => {
                let Some(request) = self.svc.discovery.svc.request().copied() else {
                    return;
                };
                self.svc.discovery.svc.set_phase(Phase::Await(DiscoveryStep::ActiveScan));
                let scan = ScanRequest {
                    scan_type: ScanType::Active,
                    channels: request.channels.supported(),
                    duration: request.scan_duration,
                };
                self.mac.scan_request(MacUser::Discovery, &scan);
            }
            Phase::Await(_) => {}
            Phase::Confirm(status) => {
                let networks = core::mem::take(&mut self.svc.discovery.networks);
                log_info!(self.log, self.now.as_millis(), "nwk.disc", "{} networks, {:?}", networks.len(), status);
                if let Some(done) = self.svc.discovery.svc.finish() {
                    self.deliver(done.handle, NwkConfirm::Discovery { status, networks });
                }
                self.service_done(NwkTask::Discovery);
            }
        }
    }

    pub(crate) fn discovery_mac_confirm(&mut self, confirm: &MacConfirm) {
        if !self.svc.discovery.svc.is_awaiting(DiscoveryStep::ActiveScan) {
            return;
        }
        let MacConfirm::Scan(scan) = confirm else {
            return;
        };
        let status = match scan.status {
            MacStatus::SUCCESS => NwkStatus::Success,
            MacStatus::NO_BEACON => NwkStatus::NoNetworks,
            other => NwkStatus::from(other),
        };
        self.svc.discovery.svc.set_phase(Phase::Confirm(status));
        self.scheduler.post(NwkTask::Discovery);
    }

    /// Beacon heard during an active scan
    pub(crate) fn beacon_notify(&mut self, notify: &BeaconNotify) {
        if self.svc.formation.svc.is_awaiting(FormationStep::ActiveScan) {
            self.formation_beacon(notify);
            return;
        }
        let discovering = self.svc.discovery.svc.is_awaiting(DiscoveryStep::ActiveScan);
        if !discovering && !self.svc.join.svc.is_awaiting(JoinStep::RejoinScan) {
            log_debug!(self.log, self.now.as_millis(), "nwk.disc", "stray beacon from {}", notify.descriptor.coord_addr);
            return;
        }
        let Some(beacon) = BeaconPayload::from_bytes(&notify.sdu) else {
            return;
        };
        if beacon.protocol_id != BEACON_PROTOCOL_ID {
            return;
        }
        self.record_potential_parent(notify, &beacon);
        if discovering {
            let d = notify.descriptor;
            if !merge_network(&mut self.svc.discovery.networks, d.pan_id, d.channel, d.association_permit, &beacon) {
                log_warn!(self.log, self.now.as_millis(), "nwk.disc", "network list full");
            }
        }
    }

    fn record_potential_parent(&mut self, notify: &BeaconNotify, beacon: &BeaconPayload) {
        let d = notify.descriptor;
        let existing = if d.coord_ext.is_valid() {
            self.neighbors.find_ext(d.coord_ext)
        } else {
            self.neighbors
                .find_short(d.coord_addr)
                .filter(|n| n.pan_id == d.pan_id)
        };
        let device_type = if d.coord_addr == ShortAddr::COORDINATOR {
            DeviceType::Coordinator
        } else {
            DeviceType::Router
        };
        let mut entry = existing.copied().unwrap_or_else(|| NeighborEntry::new(d.coord_addr, d.coord_ext, device_type));
        if entry.short != d.coord_addr {
            self.neighbors.remove(entry.short);
            entry.short = d.coord_addr;
        }
        entry.device_type = device_type;
        entry.rx_on_when_idle = true;
        entry.depth = beacon.device_depth;
        entry.lqi = d.lqi;
        entry.incoming_cost = lqi_to_cost(d.lqi);
        entry.permit_joining = d.association_permit;
        entry.potential_parent = entry.relationship == Relationship::None;
        entry.router_capacity = beacon.router_capacity;
        entry.end_device_capacity = beacon.end_device_capacity;
        entry.pan_id = d.pan_id;
        entry.ext_pan_id = beacon.ext_pan_id;
        entry.channel = d.channel;
        entry.update_id = beacon.update_id;
        if let Err(e) = self.neighbors.add_or_update(entry) {
            log_debug!(self.log, self.now.as_millis(), "nwk.disc", "beacon from {} dropped: {}", d.coord_addr, e);
        }
    }

    // ========================================================================
    // Energy scan
    // ========================================================================

    /// NLME-ED-SCAN.request
    ///
    /// # Errors
    /// `PoolExhausted` if the request queue is full.
    pub fn ed_scan_request(&mut self, handle: RequestHandle, request: EdScanRequest) -> Result<()> {
        self.svc.ed_scan.svc.submit(request, handle)?;
        self.scheduler.post(NwkTask::EdScan);
        Ok(())
    }

    pub(crate) fn run_ed_scan(&mut self) {
        match self.svc.ed_scan.svc.phase() {
            Phase::Idle => {
                if self.svc.ed_scan.svc.try_begin(self.reset_pending()) {
                    self.scheduler.post(NwkTask::EdScan);
                }
            }
            Phase::Begin => {
                let Some(request) = self.svc.ed_scan.svc.request().copied() else {
                    return;
                };
                self.svc.ed_scan.energy.clear();
                self.svc.ed_scan.unscanned = request.channels;
                let next = if request.channels.supported().is_empty() {
                    Phase::Confirm(NwkStatus::InvalidParameter)
                } else {
                    Phase::Issue(EdScanStep::Scan)
                };
                self.svc.ed_scan.svc.set_phase(next);
                self.scheduler.post(NwkTask::EdScan);
            }
            Phase::Issue(EdScanStep::Scan) => {
                let Some(request) = self.svc.ed_scan.svc.request().copied() else {
                    return;
                };
                self.svc.ed_scan.svc.set_phase(Phase::Await(EdScanStep::Scan));
                let scan = ScanRequest {
                    scan_type: ScanType::Ed,
                    channels: request.channels.supported(),
                    duration: request.scan_duration,
                };
                self.mac.scan_request(MacUser::EdScan, &scan);
            }
            Phase::Await(_) => {}
            Phase::Confirm(status) => {
                let energy = core::mem::take(&mut self.svc.ed_scan.energy);
                let unscanned = self.svc.ed_scan.unscanned;
                if let Some(done) = self.svc.ed_scan.svc.finish() {
                    self.deliver(done.handle, NwkConfirm::EdScan { status, unscanned, energy });
                }
                self.service_done(NwkTask::EdScan);
            }
        }
    }

    pub(crate) fn ed_scan_mac_confirm(&mut self, confirm: MacConfirm) {
        if !self.svc.ed_scan.svc.is_awaiting(EdScanStep::Scan) {
            return;
        }
        let MacConfirm::Scan(scan) = confirm else {
            return;
        };
        self.svc.ed_scan.unscanned = scan.unscanned;
        self.svc.ed_scan.energy = scan.energy;
        self.svc.ed_scan.svc.set_phase(Phase::Confirm(NwkStatus::from(scan.status)));
        self.scheduler.post(NwkTask::EdScan);
    }
}
