// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! NLME-SYNC (non-beacon)
//!
//! An end device polls its parent for pending data. A device whose
//! receiver sleeps when idle then opens a short receive window so the
//! parent can deliver anything else it holds.

use q_common::{log_debug, DeviceType, Error, Result};
use q_hal::RngInterface;

use super::{Phase, Service};
use crate::engine::{Nwk, NwkTask};
use crate::mac::{MacConfirm, MacService, MacUser, PollRequest, RxEnableRequest};
use crate::security::SecurityProvider;
use crate::status::{MacStatus, NwkStatus};
use crate::upper::{NwkConfirm, RequestHandle, SyncRequest, UpperLayer};

/// Receive window opened after a poll by a sleeping device
const SYNC_RX_WINDOW_MS: u32 = 100;

/// Sync sub-requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStep {
    /// MLME-POLL
    Poll,
    /// MLME-RX-ENABLE
    RxEnable,
}

/// NLME-SYNC machine
#[derive(Debug, Default)]
pub struct SyncState {
    /// Queue and phase
    pub svc: Service<SyncRequest, SyncStep>,
}

impl<M, S, U, R> Nwk<M, S, U, R>
where
    M: MacService,
    S: SecurityProvider,
    U: UpperLayer,
    R: RngInterface,
{
    /// NLME-SYNC.request
    ///
    /// # Errors
    /// `InvalidParameter` for beacon tracking, which non-beacon networks do
    /// not have; `PoolExhausted` if the request queue is full.
    pub fn sync_request(&mut self, handle: RequestHandle, request: SyncRequest) -> Result<()> {
        if request.track {
            return Err(Error::InvalidParameter);
        }
        self.svc.sync.svc.submit(request, handle)?;
        self.scheduler.post(NwkTask::Sync);
        Ok(())
    }

    pub(crate) fn run_sync(&mut self) {
        match self.svc.sync.svc.phase() {
            Phase::Idle => {
                if self.svc.sync.svc.try_begin(self.reset_pending()) {
                    self.scheduler.post(NwkTask::Sync);
                }
            }
            Phase::Begin => {
                let next = if self.nib.device_type != DeviceType::EndDevice || !self.nib.joined {
                    Phase::Confirm(NwkStatus::InvalidRequest)
                } else if self.neighbors.parent().is_none() {
                    Phase::Confirm(NwkStatus::SyncFailure)
                } else {
                    Phase::Issue(SyncStep::Poll)
                };
                self.svc.sync.svc.set_phase(next);
                self.scheduler.post(NwkTask::Sync);
            }
            Phase::Issue(step) => {
                let Some(parent) = self.neighbors.parent().map(|p| p.short) else {
                    self.svc.sync.svc.set_phase(Phase::Confirm(NwkStatus::SyncFailure));
                    self.scheduler.post(NwkTask::Sync);
                    return;
                };
                self.svc.sync.svc.set_phase(Phase::Await(step));
                match step {
                    SyncStep::Poll => {
                        log_debug!(self.log, self.now.as_millis(), "nwk.sync", "poll {}", parent);
                        self.mac.poll_request(MacUser::Sync, &PollRequest { coord: parent });
                    }
                    SyncStep::RxEnable => {
                        let window = RxEnableRequest {
                            duration_ms: SYNC_RX_WINDOW_MS,
                        };
                        self.mac.rx_enable_request(MacUser::Sync, &window);
                    }
                }
            }
            Phase::Await(_) => {}
            Phase::Confirm(status) => {
                if let Some(done) = self.svc.sync.svc.finish() {
                    self.deliver(done.handle, NwkConfirm::Sync { status });
                }
                self.service_done(NwkTask::Sync);
            }
        }
    }

    pub(crate) fn sync_mac_confirm(&mut self, confirm: &MacConfirm) {
        let Some(step) = self.svc.sync.svc.awaiting() else {
            return;
        };
        let next = match (step, confirm) {
            (SyncStep::Poll, MacConfirm::Poll { status }) => {
                // No pending data is still a successful sync
                if !status.is_success() && *status != MacStatus::NO_DATA {
                    Phase::Confirm(NwkStatus::from(*status))
                } else if self.nib.pib.rx_on_when_idle {
                    Phase::Confirm(NwkStatus::Success)
                } else {
                    Phase::Issue(SyncStep::RxEnable)
                }
            }
            (SyncStep::RxEnable, MacConfirm::RxEnable { status }) => Phase::Confirm(NwkStatus::from(*status)),
            _ => return,
        };
        self.svc.sync.svc.set_phase(next);
        self.scheduler.post(NwkTask::Sync);
    }
}
