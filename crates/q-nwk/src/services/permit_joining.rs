// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! NLME-PERMIT-JOINING
//!
//! Opens or closes the association window. A duration of 0xFF keeps it
//! open until the next request; any other non-zero duration closes it
//! again through an internal request when the window timer fires.

use q_common::{log_info, log_warn, Millis, Result};
use q_hal::RngInterface;

use super::{Phase, Service};
use crate::engine::{Nwk, NwkTask, NwkTimer};
use crate::mac::{MacConfirm, MacService, MacUser, PibAttribute};
use crate::security::SecurityProvider;
use crate::status::NwkStatus;
use crate::upper::{NwkConfirm, PermitJoiningRequest, RequestHandle, UpperLayer};

/// Duration meaning "until told otherwise"
pub const PERMIT_FOREVER: u8 = 0xFF;

/// Permit joining sub-requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermitJoiningStep {
    /// macAssociationPermit
    SetPermit,
    /// Beacon payload with the new capacity bits
    SetBeacon,
}

/// NLME-PERMIT-JOINING machine
#[derive(Debug, Default)]
pub struct PermitJoiningState {
    /// Queue and phase
    pub svc: Service<PermitJoiningRequest, PermitJoiningStep>,
}

impl<M, S, U, R> Nwk<M, S, U, R>
where
    M: MacService,
    S: SecurityProvider,
    U: UpperLayer,
    R: RngInterface,
{
    /// NLME-PERMIT-JOINING.request
    ///
    /// # Errors
    /// `PoolExhausted` if the request queue is full.
    pub fn permit_joining_request(&mut self, handle: RequestHandle, request: PermitJoiningRequest) -> Result<()> {
        self.svc.permit_joining.svc.submit(request, handle)?;
        self.scheduler.post(NwkTask::PermitJoining);
        Ok(())
    }

    pub(crate) fn run_permit_joining(&mut self) {
        match self.svc.permit_joining.svc.phase() {
            Phase::Idle => {
                if self.svc.permit_joining.svc.try_begin(self.reset_pending()) {
                    self.scheduler.post(NwkTask::PermitJoining);
                }
            }
            Phase::Begin => {
                let next = if !self.nib.is_router() || !self.nib.joined {
                    Phase::Confirm(NwkStatus::InvalidRequest)
                } else {
                    Phase::Issue(PermitJoiningStep::SetPermit)
                };
                self.svc.permit_joining.svc.set_phase(next);
                self.scheduler.post(NwkTask::PermitJoining);
            }
            Phase::Issue(step) => {
                let Some(request) = self.svc.permit_joining.svc.request().copied() else {
                    return;
                };
                self.svc.permit_joining.svc.set_phase(Phase::Await(step));
                let attribute = match step {
                    PermitJoiningStep::SetPermit => PibAttribute::AssociationPermit(request.duration_s != 0),
                    PermitJoiningStep::SetBeacon => self.beacon_attribute(),
                };
                self.set_pib(MacUser::PermitJoining, attribute);
            }
            Phase::Await(_) => {}
            Phase::Confirm(status) => {
                if let Some(done) = self.svc.permit_joining.svc.finish() {
                    self.deliver(done.handle, NwkConfirm::PermitJoining { status });
                }
                self.service_done(NwkTask::PermitJoining);
            }
        }
    }

    pub(crate) fn permit_joining_mac_confirm(&mut self, confirm: &MacConfirm) {
        let Some(step) = self.svc.permit_joining.svc.awaiting() else {
            return;
        };
        let MacConfirm::Set { status } = confirm else {
            return;
        };
        let next = if !status.is_success() {
            Phase::Confirm(NwkStatus::from(*status))
        } else if step == PermitJoiningStep::SetPermit {
            let duration = self.svc.permit_joining.svc.request().map_or(0, |r| r.duration_s);
            self.open_join_window(duration);
            Phase::Issue(PermitJoiningStep::SetBeacon)
        } else {
            Phase::Confirm(NwkStatus::Success)
        };
        self.svc.permit_joining.svc.set_phase(next);
        self.scheduler.post(NwkTask::PermitJoining);
    }

    fn open_join_window(&mut self, duration_s: u8) {
        self.nib.permit_joining = duration_s != 0;
        match duration_s {
            0 | PERMIT_FOREVER => {
                self.timers.stop(NwkTimer::PermitJoin);
            }
            seconds => {
                let now = self.now;
                let window = Millis::new(u32::from(seconds) * 1000);
                if let Err(e) = self.timers.start(NwkTimer::PermitJoin, now, window) {
                    log_warn!(self.log, now.as_millis(), "nwk.permit", "window timer unavailable: {}", e);
                }
            }
        }
        log_info!(self.log, self.now.as_millis(), "nwk.permit", "permit joining {}s", duration_s);
    }

    pub(crate) fn permit_join_expired(&mut self) {
        let request = PermitJoiningRequest { duration_s: 0 };
        if let Err(e) = self.permit_joining_request(RequestHandle::INTERNAL, request) {
            log_warn!(self.log, self.now.as_millis(), "nwk.permit", "window close not queued: {}", e);
        }
    }
}
