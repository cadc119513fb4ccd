// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! NLME-LEAVE
//!
//! Leaving ourselves announces the departure (routers to every rx-on
//! device one hop away, end devices to their parent) and then drops all
//! network state whatever the transmission outcome. Removing a child sends
//! it a leave request and forgets it once the frame is out.

use q_common::{log_info, log_warn};
use q_common::{DeviceType, ExtAddr, Result, ShortAddr};
use q_hal::RngInterface;

use super::{Phase, Service};
use crate::command::{LeaveCommand, NwkCommand};
use crate::engine::{Nwk, NwkTask};
use crate::mac::MacService;
use crate::security::SecurityProvider;
use crate::status::NwkStatus;
use crate::tx::{OutRequest, TrafficClass, TxOwner};
use crate::upper::{LeaveRequest, NwkConfirm, NwkIndication, RequestHandle, UpperLayer};

/// Leave sub-requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaveStep {
    /// Leave command on the air
    SendLeave,
}

/// NLME-LEAVE machine
#[derive(Debug, Default)]
pub struct LeaveState {
    /// Queue and phase
    pub svc: Service<LeaveRequest, LeaveStep>,
    child: Option<(ShortAddr, ExtAddr)>,
}

impl<M, S, U, R> Nwk<M, S, U, R>
where
    M: MacService,
    S: SecurityProvider,
    U: UpperLayer,
    R: RngInterface,
{
    /// NLME-LEAVE.request
    ///
    /// # Errors
    /// `PoolExhausted` if the request queue is full.
    pub fn leave_request(&mut self, handle: RequestHandle, request: LeaveRequest) -> Result<()> {
        self.svc.leave.svc.submit(request, handle)?;
        self.scheduler.post(NwkTask::Leave);
        Ok(())
    }

    pub(crate) fn run_leave(&mut self) {
        match self.svc.leave.svc.phase() {
            Phase::Idle => {
                if self.svc.leave.svc.try_begin(self.reset_pending()) {
                    self.scheduler.post(NwkTask::Leave);
                }
            }
            Phase::Begin => {
                let Some(request) = self.svc.leave.svc.request().copied() else {
                    return;
                };
                self.svc.leave.child = None;
                let next = self.leave_begin(&request);
                self.svc.leave.svc.set_phase(next);
                self.scheduler.post(NwkTask::Leave);
            }
            Phase::Issue(LeaveStep::SendLeave) => {
                let Some(request) = self.svc.leave.svc.request().copied() else {
                    return;
                };
                self.svc.leave.svc.set_phase(Phase::Await(LeaveStep::SendLeave));
                self.send_leave(&request);
            }
            Phase::Await(_) => {}
            Phase::Confirm(status) => {
                if let Some(done) = self.svc.leave.svc.finish() {
                    let device = done.request.device;
                    self.deliver(done.handle, NwkConfirm::Leave { status, device });
                }
                self.service_done(NwkTask::Leave);
            }
        }
    }

    fn leave_begin(&mut self, request: &LeaveRequest) -> Phase<LeaveStep> {
        if !self.nib.joined {
            return Phase::Confirm(NwkStatus::InvalidRequest);
        }
        let Some(device) = request.device else {
            return Phase::Issue(LeaveStep::SendLeave);
        };
        if !self.nib.is_router() {
            return Phase::Confirm(NwkStatus::InvalidRequest);
        }
        match self.neighbors.find_ext(device).filter(|n| n.relationship.is_child()) {
            Some(child) => {
                self.svc.leave.child = Some((child.short, child.ext));
                Phase::Issue(LeaveStep::SendLeave)
            }
            None => Phase::Confirm(NwkStatus::UnknownDevice),
        }
    }

    fn send_leave(&mut self, request: &LeaveRequest) {
        let (out, command) = match self.svc.leave.child {
            Some((short, ext)) => {
                let mut header = self.command_header(short, 1);
                header.dst_ext = Some(ext);
                let command = LeaveCommand {
                    rejoin: request.rejoin,
                    request: true,
                    remove_children: request.remove_children,
                };
                let out = OutRequest::new(header, TxOwner::Leave, TrafficClass::UnicastCommand).via(short);
                (out, command)
            }
            None => {
                let parent = self.neighbors.parent().map(|p| p.short);
                let command = LeaveCommand {
                    rejoin: request.rejoin,
                    request: false,
                    remove_children: request.remove_children,
                };
                let out = match parent {
                    Some(parent) if self.nib.device_type == DeviceType::EndDevice => {
                        let header = self.command_header(parent, 1);
                        OutRequest::new(header, TxOwner::Leave, TrafficClass::UnicastCommand).via(parent)
                    }
                    _ => {
                        let header = self.command_header(ShortAddr::RX_ON_WHEN_IDLE, 1);
                        OutRequest::new(header, TxOwner::Leave, TrafficClass::Broadcast)
                    }
                };
                (out, command)
            }
        };
        if let Err(e) = self.send_command(out, &NwkCommand::Leave(command)) {
            self.leave_tx_done(NwkStatus::from(e));
        }
    }

    pub(crate) fn leave_tx_done(&mut self, status: NwkStatus) {
        if !self.svc.leave.svc.is_awaiting(LeaveStep::SendLeave) {
            return;
        }
        let rejoin = self.svc.leave.svc.request().is_some_and(|r| r.rejoin);
        let confirm = match self.svc.leave.child.take() {
            Some((short, ext)) => {
                log_info!(self.log, self.now.as_millis(), "nwk.leave", "child {} removed ({:?})", short, status);
                self.remove_device(short, ext);
                self.upper.indication(NwkIndication::Leave {
                    device: ext,
                    short_addr: short,
                    rejoin,
                });
                status
            }
            None => {
                if !status.is_success() {
                    log_warn!(self.log, self.now.as_millis(), "nwk.leave", "leave announcement failed: {:?}", status);
                }
                let own = self.nib.short_addr();
                let ext = self.nib.ext_addr();
                self.abort_packets(NwkStatus::InvalidRequest);
                self.forget_network();
                log_info!(self.log, self.now.as_millis(), "nwk.leave", "left the network");
                self.upper.indication(NwkIndication::Leave {
                    device: ext,
                    short_addr: own,
                    rejoin,
                });
                NwkStatus::Success
            }
        };
        self.svc.leave.svc.set_phase(Phase::Confirm(confirm));
        self.scheduler.post(NwkTask::Leave);
    }
}
