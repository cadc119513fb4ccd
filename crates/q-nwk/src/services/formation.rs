// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! NLME-NETWORK-FORMATION
//!
//! ```text
//! [ED scan] -> active scan -> pick channel + PAN id
//!   -> set short 0x0000 -> set PAN id -> set beacon payload -> MLME-START
//! ```
//!
//! The energy scan is skipped when only one channel is allowed. The quietest
//! channel wins: fewest networks heard, then lowest energy, then lowest
//! channel number.

use heapless::Vec;
use q_common::constants::MAX_NETWORK_DESCRIPTORS;
use q_common::{log_info, log_warn};
use q_common::{ChannelMask, DeviceType, ExtPanId, PanId, Result, ShortAddr};
use q_hal::RngInterface;

use super::{Phase, Service};
use crate::engine::{Nwk, NwkTask};
use crate::mac::{
    BeaconNotify, ChannelEnergy, MacConfirm, MacService, MacUser, PibAttribute, ScanConfirm, ScanRequest, ScanType,
    StartRequest, MAX_SCAN_CHANNELS,
};
use crate::security::SecurityProvider;
use crate::status::{MacStatus, NwkStatus};
use crate::upper::{FormationRequest, NwkConfirm, RequestHandle, UpperLayer};

/// Highest PAN identifier picked at random
const MAX_RANDOM_PAN_ID: u16 = 0x3FFF;

/// Random PAN id draws before giving up
const PAN_ID_ATTEMPTS: usize = 16;

/// Formation sub-requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormationStep {
    /// Energy detection scan
    EdScan,
    /// Active scan for existing networks
    ActiveScan,
    /// macShortAddress = 0x0000
    SetShort,
    /// macPANId
    SetPanId,
    /// Beacon payload
    SetBeacon,
    /// MLME-START
    Start,
}

/// NLME-NETWORK-FORMATION machine
#[derive(Debug, Default)]
pub struct FormationState {
    /// Queue and phase
    pub svc: Service<FormationRequest, FormationStep>,
    energy: Vec<ChannelEnergy, MAX_SCAN_CHANNELS>,
    seen: Vec<(u8, PanId), MAX_NETWORK_DESCRIPTORS>,
    channel: u8,
    pan_id: PanId,
}

impl FormationState {
    fn clear_scan(&mut self) {
        self.energy.clear();
        self.seen.clear();
        self.channel = 0;
        self.pan_id = PanId::default();
    }

    /// Quietest channel of `channels`
    fn pick_channel(&self, channels: ChannelMask) -> Option<u8> {
        channels.channels().min_by_key(|&ch| {
            let networks = self.seen.iter().filter(|(c, _)| *c == ch).count();
            let energy = self
                .energy
                .iter()
                .find(|e| e.channel == ch)
                .map_or(0, |e| e.energy);
            (networks, energy, ch)
        })
    }

    fn pan_in_use(&self, pan_id: PanId) -> bool {
        self.seen.iter().any(|(_, p)| *p == pan_id)
    }
}

impl<M, S, U, R> Nwk<M, S, U, R>
where
    M: MacService,
    S: SecurityProvider,
    U: UpperLayer,
    R: RngInterface,
{
    /// NLME-NETWORK-FORMATION.request
    ///
    /// # Errors
    /// `PoolExhausted` if the request queue is full.
    pub fn formation_request(&mut self, handle: RequestHandle, request: FormationRequest) -> Result<()> {
        self.svc.formation.svc.submit(request, handle)?;
        self.scheduler.post(NwkTask::Formation);
        Ok(())
    }

    pub(crate) fn run_formation(&mut self) {
        match self.svc.formation.svc.phase() {
            Phase::Idle => {
                if self.svc.formation.svc.try_begin(self.reset_pending()) {
                    self.scheduler.post(NwkTask::Formation);
                }
            }
            Phase::Begin => self.formation_begin(),
            Phase::Issue(step) => self.formation_issue(step),
            Phase::Await(_) => {}
            Phase::Confirm(status) => self.formation_confirm(status),
        }
    }

    fn formation_begin(&mut self) {
        let Some(request) = self.svc.formation.svc.request().copied() else {
            return;
        };
        let next = if self.nib.device_type != DeviceType::Coordinator || self.nib.joined {
            Phase::Confirm(NwkStatus::InvalidRequest)
        } else if request.channels.supported().is_empty() {
            Phase::Confirm(NwkStatus::InvalidParameter)
        } else if request.channels.supported().count() > 1 {
            Phase::Issue(FormationStep::EdScan)
        } else {
            Phase::Issue(FormationStep::ActiveScan)
        };
        self.svc.formation.clear_scan();
        self.svc.formation.svc.set_phase(next);
        self.scheduler.post(NwkTask::Formation);
    }

    fn formation_issue(&mut self, step: FormationStep) {
        let Some(request) = self.svc.formation.svc.request().copied() else {
            return;
        };
        self.svc.formation.svc.set_phase(Phase::Await(step));
        let channels = request.channels.supported();
        let duration = request.scan_duration;
        match step {
            FormationStep::EdScan => {
                let scan = ScanRequest {
                    scan_type: ScanType::Ed,
                    channels,
                    duration,
                };
                self.mac.scan_request(MacUser::Formation, &scan);
            }
            FormationStep::ActiveScan => {
                let scan = ScanRequest {
                    scan_type: ScanType::Active,
                    channels,
                    duration,
                };
                self.mac.scan_request(MacUser::Formation, &scan);
            }
            FormationStep::SetShort => {
                self.set_pib(MacUser::Formation, PibAttribute::ShortAddress(ShortAddr::COORDINATOR));
            }
            FormationStep::SetPanId => {
                let pan_id = self.svc.formation.pan_id;
                self.set_pib(MacUser::Formation, PibAttribute::PanId(pan_id));
            }
            FormationStep::SetBeacon => {
                let payload = self.beacon_attribute();
                self.set_pib(MacUser::Formation, payload);
            }
            FormationStep::Start => {
                let start = StartRequest {
                    pan_id: self.svc.formation.pan_id,
                    channel: self.svc.formation.channel,
                    pan_coordinator: true,
                };
                self.mac.start_request(MacUser::Formation, &start);
            }
        }
    }

    pub(crate) fn formation_mac_confirm(&mut self, confirm: MacConfirm) {
        let Some(step) = self.svc.formation.svc.awaiting() else {
            return;
        };
        let next = match (step, confirm) {
            (FormationStep::EdScan, MacConfirm::Scan(scan)) => {
                if scan.status.is_success() {
                    self.svc.formation.energy = scan.energy;
                } else {
                    log_warn!(self.log, self.now.as_millis(), "nwk.form", "energy scan failed: {:?}", scan.status);
                }
                Phase::Issue(FormationStep::ActiveScan)
            }
            (FormationStep::ActiveScan, MacConfirm::Scan(scan)) => self.formation_scan_done(&scan),
            (FormationStep::SetShort, MacConfirm::Set { status }) => {
                step_or_fail(status, FormationStep::SetPanId)
            }
            (FormationStep::SetPanId, MacConfirm::Set { status }) => {
                step_or_fail(status, FormationStep::SetBeacon)
            }
            (FormationStep::SetBeacon, MacConfirm::Set { status }) => {
                step_or_fail(status, FormationStep::Start)
            }
            (FormationStep::Start, MacConfirm::Start { status }) => {
                if status.is_success() {
                    self.formation_started();
                    Phase::Confirm(NwkStatus::Success)
                } else {
                    Phase::Confirm(NwkStatus::StartupFailure)
                }
            }
            (_, other) => {
                log_warn!(self.log, self.now.as_millis(), "nwk.form", "unexpected {:?} in {:?}", other, step);
                return;
            }
        };
        self.svc.formation.svc.set_phase(next);
        self.scheduler.post(NwkTask::Formation);
    }

    fn formation_scan_done(&mut self, scan: &ScanConfirm) -> Phase<FormationStep> {
        if !scan.status.is_success() && scan.status != MacStatus::NO_BEACON {
            return Phase::Confirm(NwkStatus::from(scan.status));
        }
        let Some(request) = self.svc.formation.svc.request().copied() else {
            return Phase::Confirm(NwkStatus::InvalidRequest);
        };
        let Some(channel) = self.svc.formation.pick_channel(request.channels.supported()) else {
            return Phase::Confirm(NwkStatus::StartupFailure);
        };
        let pan_id = match request.pan_id {
            Some(pan_id) => pan_id,
            None => match self.random_pan_id() {
                Some(pan_id) => pan_id,
                None => return Phase::Confirm(NwkStatus::StartupFailure),
            },
        };
        self.svc.formation.channel = channel;
        self.svc.formation.pan_id = pan_id;
        self.nib.ext_pan_id = if request.ext_pan_id.is_specified() {
            request.ext_pan_id
        } else {
            ExtPanId(self.nib.ext_addr().0)
        };
        log_info!(self.log, self.now.as_millis(), "nwk.form", "channel {} pan {:04X}", channel, pan_id.0);
        Phase::Issue(FormationStep::SetShort)
    }

    fn random_pan_id(&mut self) -> Option<PanId> {
        for _ in 0..PAN_ID_ATTEMPTS {
            let raw = self.rng.next_u16().ok()? & MAX_RANDOM_PAN_ID;
            let pan_id = PanId(raw);
            if raw != 0 && !self.svc.formation.pan_in_use(pan_id) {
                return Some(pan_id);
            }
        }
        None
    }

    /// Active scan beacon while forming
    pub(crate) fn formation_beacon(&mut self, notify: &BeaconNotify) {
        let key = (notify.descriptor.channel, notify.descriptor.pan_id);
        let seen = &mut self.svc.formation.seen;
        if !seen.contains(&key) && seen.push(key).is_err() {
            log_warn!(self.log, self.now.as_millis(), "nwk.form", "too many networks heard");
        }
    }

    fn formation_started(&mut self) {
        self.nib.pib.channel = self.svc.formation.channel;
        self.nib.pib.pan_id = self.svc.formation.pan_id;
        self.nib.depth = 0;
        self.nib.joined = true;
        self.nib.router_started = true;
        self.dirty = true;
        self.start_router_timers();
        let pan = self.svc.formation.pan_id;
        log_info!(self.log, self.now.as_millis(), "nwk.form", "network {:04X} formed", pan.0);
    }

    fn formation_confirm(&mut self, status: NwkStatus) {
        if !status.is_success() {
            self.nib.ext_pan_id = ExtPanId::ANY;
            log_warn!(self.log, self.now.as_millis(), "nwk.form", "formation failed: {:?}", status);
        }
        if let Some(done) = self.svc.formation.svc.finish() {
            self.deliver(done.handle, NwkConfirm::Formation { status });
        }
        self.service_done(NwkTask::Formation);
    }
}

/// Next step after a PIB write, or the failure confirm
pub(crate) fn step_or_fail<S>(status: MacStatus, next: S) -> Phase<S> {
    if status.is_success() {
        Phase::Issue(next)
    } else {
        Phase::Confirm(NwkStatus::from(status))
    }
}
