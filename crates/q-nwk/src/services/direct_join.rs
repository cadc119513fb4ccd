// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! NLME-DIRECT-JOIN
//!
//! Adds a device as our child without any frame exchange. The device is
//! expected to find us later through an orphan scan or a rejoin.

use q_common::{log_info, Result, ShortAddr};
use q_hal::RngInterface;

use super::{Phase, Service};
use crate::engine::{Nwk, NwkTask};
use crate::mac::MacService;
use crate::security::SecurityProvider;
use crate::status::NwkStatus;
use crate::upper::{DirectJoinRequest, NwkConfirm, RequestHandle, UpperLayer};

/// NLME-DIRECT-JOIN machine (no MAC sub-requests)
#[derive(Debug, Default)]
pub struct DirectJoinState {
    /// Queue and phase
    pub svc: Service<DirectJoinRequest, ()>,
}

impl<M, S, U, R> Nwk<M, S, U, R>
where
    M: MacService,
    S: SecurityProvider,
    U: UpperLayer,
    R: RngInterface,
{
    /// NLME-DIRECT-JOIN.request
    ///
    /// # Errors
    /// `PoolExhausted` if the request queue is full.
    pub fn direct_join_request(&mut self, handle: RequestHandle, request: DirectJoinRequest) -> Result<()> {
        self.svc.direct_join.svc.submit(request, handle)?;
        self.scheduler.post(NwkTask::DirectJoin);
        Ok(())
    }

    pub(crate) fn run_direct_join(&mut self) {
        match self.svc.direct_join.svc.phase() {
            Phase::Idle => {
                if self.svc.direct_join.svc.try_begin(self.reset_pending()) {
                    self.scheduler.post(NwkTask::DirectJoin);
                }
            }
            Phase::Begin => {
                let Some(request) = self.svc.direct_join.svc.request().copied() else {
                    return;
                };
                let status = self.direct_join(&request);
                self.svc.direct_join.svc.set_phase(Phase::Confirm(status));
                self.scheduler.post(NwkTask::DirectJoin);
            }
            Phase::Issue(()) | Phase::Await(()) => {}
            Phase::Confirm(status) => {
                if let Some(done) = self.svc.direct_join.svc.finish() {
                    let device = done.request.device;
                    self.deliver(done.handle, NwkConfirm::DirectJoin { status, device });
                }
                self.service_done(NwkTask::DirectJoin);
            }
        }
    }

    fn direct_join(&mut self, request: &DirectJoinRequest) -> NwkStatus {
        if !self.nib.joined || !self.nib.is_router() {
            return NwkStatus::InvalidRequest;
        }
        if !request.device.is_valid() {
            return NwkStatus::InvalidParameter;
        }
        if self.neighbors.find_ext(request.device).is_some() {
            return NwkStatus::AlreadyPresent;
        }
        match self.admit_child(request.device, request.capability, ShortAddr::UNASSIGNED) {
            Ok(short) => {
                log_info!(self.log, self.now.as_millis(), "nwk.join", "{} direct joined as {}", request.device, short);
                NwkStatus::Success
            }
            Err(e) => NwkStatus::from(e),
        }
    }
}
