// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! NLME-START-ROUTER (non-beacon)
//!
//! A joined router refreshes its beacon payload, starts the MAC as a
//! coordinator of its own children and begins its periodic jobs.

use q_common::{log_info, DeviceType, Result};
use q_hal::RngInterface;

use super::formation::step_or_fail;
use super::{Phase, Service};
use crate::engine::{Nwk, NwkTask};
use crate::mac::{MacConfirm, MacService, MacUser, StartRequest};
use crate::security::SecurityProvider;
use crate::status::NwkStatus;
use crate::upper::{NwkConfirm, RequestHandle, StartRouterRequest, UpperLayer};

/// Start router sub-requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartRouterStep {
    /// Beacon payload
    SetBeacon,
    /// MLME-START
    Start,
}

/// NLME-START-ROUTER machine
#[derive(Debug, Default)]
pub struct StartRouterState {
    /// Queue and phase
    pub svc: Service<StartRouterRequest, StartRouterStep>,
}

impl<M, S, U, R> Nwk<M, S, U, R>
where
    M: MacService,
    S: SecurityProvider,
    U: UpperLayer,
    R: RngInterface,
{
    /// NLME-START-ROUTER.request
    ///
    /// # Errors
    /// `PoolExhausted` if the request queue is full.
    pub fn start_router_request(&mut self, handle: RequestHandle, request: StartRouterRequest) -> Result<()> {
        self.svc.start_router.svc.submit(request, handle)?;
        self.scheduler.post(NwkTask::StartRouter);
        Ok(())
    }

    pub(crate) fn run_start_router(&mut self) {
        match self.svc.start_router.svc.phase() {
            Phase::Idle => {
                if self.svc.start_router.svc.try_begin(self.reset_pending()) {
                    self.scheduler.post(NwkTask::StartRouter);
                }
            }
            Phase::Begin => {
                let next = if self.nib.device_type != DeviceType::Router || !self.nib.joined {
                    Phase::Confirm(NwkStatus::InvalidRequest)
                } else {
                    Phase::Issue(StartRouterStep::SetBeacon)
                };
                self.svc.start_router.svc.set_phase(next);
                self.scheduler.post(NwkTask::StartRouter);
            }
            Phase::Issue(step) => {
                self.svc.start_router.svc.set_phase(Phase::Await(step));
                match step {
                    StartRouterStep::SetBeacon => {
                        let beacon = self.beacon_attribute();
                        self.set_pib(MacUser::StartRouter, beacon);
                    }
                    StartRouterStep::Start => {
                        let start = StartRequest {
                            pan_id: self.nib.pib.pan_id,
                            channel: self.nib.pib.channel,
                            pan_coordinator: false,
                        };
                        self.mac.start_request(MacUser::StartRouter, &start);
                    }
                }
            }
            Phase::Await(_) => {}
            Phase::Confirm(status) => {
                if let Some(done) = self.svc.start_router.svc.finish() {
                    self.deliver(done.handle, NwkConfirm::StartRouter { status });
                }
                self.service_done(NwkTask::StartRouter);
            }
        }
    }

    pub(crate) fn start_router_mac_confirm(&mut self, confirm: &MacConfirm) {
        let Some(step) = self.svc.start_router.svc.awaiting() else {
            return;
        };
        let next = match (step, confirm) {
            (StartRouterStep::SetBeacon, MacConfirm::Set { status }) => step_or_fail(*status, StartRouterStep::Start),
            (StartRouterStep::Start, MacConfirm::Start { status }) => {
                if status.is_success() {
                    self.nib.router_started = true;
                    self.dirty = true;
                    self.start_router_timers();
                    log_info!(self.log, self.now.as_millis(), "nwk.start", "router {} started", self.nib.short_addr());
                }
                Phase::Confirm(NwkStatus::from(*status))
            }
            _ => return,
        };
        self.svc.start_router.svc.set_phase(next);
        self.scheduler.post(NwkTask::StartRouter);
    }
}
