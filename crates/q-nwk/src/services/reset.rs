// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! NLME-RESET
//!
//! Waits until no other service is mid-request, resets the MAC and then
//! either keeps (warm start) or drops (cold start) the network state.
//! Outstanding packets are always confirmed with `InvalidRequest`.

use q_common::{log_info, Result};
use q_hal::RngInterface;

use super::{Phase, Service};
use crate::engine::{Nwk, NwkTask};
use crate::mac::{MacConfirm, MacService, MacUser};
use crate::security::SecurityProvider;
use crate::status::NwkStatus;
use crate::upper::{NwkConfirm, RequestHandle, ResetRequest, UpperLayer};

/// Reset sub-requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetStep {
    /// MLME-RESET
    MacReset,
}

/// NLME-RESET machine
#[derive(Debug, Default)]
pub struct ResetState {
    /// Queue and phase
    pub svc: Service<ResetRequest, ResetStep>,
}

impl<M, S, U, R> Nwk<M, S, U, R>
where
    M: MacService,
    S: SecurityProvider,
    U: UpperLayer,
    R: RngInterface,
{
    /// NLME-RESET.request
    ///
    /// # Errors
    /// `PoolExhausted` if the request queue is full.
    pub fn reset_request(&mut self, handle: RequestHandle, request: ResetRequest) -> Result<()> {
        self.svc.reset.svc.submit(request, handle)?;
        self.scheduler.post(NwkTask::Reset);
        Ok(())
    }

    pub(crate) fn run_reset(&mut self) {
        match self.svc.reset.svc.phase() {
            Phase::Idle => {
                if self.svc.reset.svc.try_begin(false) {
                    self.scheduler.post(NwkTask::Reset);
                }
            }
            Phase::Begin => {
                // Woken again by service_done once the others settle
                if self.svc.all_idle_except_reset() {
                    self.svc.reset.svc.set_phase(Phase::Issue(ResetStep::MacReset));
                    self.scheduler.post(NwkTask::Reset);
                }
            }
            Phase::Issue(ResetStep::MacReset) => {
                let warm = self.svc.reset.svc.request().is_some_and(|r| r.warm_start);
                self.svc.reset.svc.set_phase(Phase::Await(ResetStep::MacReset));
                self.mac.reset_request(MacUser::Reset, !warm);
            }
            Phase::Await(_) => {}
            Phase::Confirm(status) => {
                if let Some(done) = self.svc.reset.svc.finish() {
                    self.deliver(done.handle, NwkConfirm::Reset { status });
                }
                if self.svc.reset.svc.has_work() {
                    self.scheduler.post(NwkTask::Reset);
                }
                self.wake_services();
            }
        }
    }

    pub(crate) fn reset_mac_confirm(&mut self, confirm: &MacConfirm) {
        if !self.svc.reset.svc.is_awaiting(ResetStep::MacReset) {
            return;
        }
        let status = confirm.status();
        let next = if status.is_success() {
            let warm = self.svc.reset.svc.request().is_some_and(|r| r.warm_start);
            self.apply_reset(warm);
            NwkStatus::Success
        } else {
            NwkStatus::from(status)
        };
        self.svc.reset.svc.set_phase(Phase::Confirm(next));
        self.scheduler.post(NwkTask::Reset);
    }

    fn apply_reset(&mut self, warm: bool) {
        self.abort_packets(NwkStatus::InvalidRequest);
        self.inbox.clear();
        self.pib_sets.clear();
        self.timers.clear();
        if warm {
            log_info!(self.log, self.now.as_millis(), "nwk.reset", "warm start");
            if self.nib.joined && self.nib.router_started {
                self.start_router_timers();
            }
        } else {
            log_info!(self.log, self.now.as_millis(), "nwk.reset", "cold start");
            self.forget_network();
        }
    }

    /// Repost every service with queued requests held back by a reset
    fn wake_services(&mut self) {
        let tasks = [
            (NwkTask::Formation, self.svc.formation.svc.has_work()),
            (NwkTask::Discovery, self.svc.discovery.svc.has_work()),
            (NwkTask::EdScan, self.svc.ed_scan.svc.has_work()),
            (NwkTask::Join, self.svc.join.svc.has_work()),
            (NwkTask::DirectJoin, self.svc.direct_join.svc.has_work()),
            (NwkTask::Leave, self.svc.leave.svc.has_work()),
            (NwkTask::Sync, self.svc.sync.svc.has_work()),
            (NwkTask::StartRouter, self.svc.start_router.svc.has_work()),
            (NwkTask::PermitJoining, self.svc.permit_joining.svc.has_work()),
            (NwkTask::RouteDiscovery, self.svc.route_discovery.svc.has_work()),
        ];
        for (task, pending) in tasks {
            if pending {
                self.scheduler.post(task);
            }
        }
    }
}
