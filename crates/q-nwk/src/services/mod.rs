// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Service request state machines
//!
//! Every NLME primitive is served by the same pattern: a request queue whose
//! head is the only active request, and a [`Phase`] that walks
//!
//! ```text
//! Idle -> Begin -> Issue(step) -> Await(step) -> ... -> Confirm(status) -> Idle
//! ```
//!
//! One transition happens per task invocation. `Await` parks the machine
//! until the MAC confirm (or a timer, or a received frame) moves it on. A
//! failed step jumps straight to `Confirm`; nothing is retried here.
//!
//! A pending reset takes priority: other services finish their active
//! request but do not begin a new one while a reset is queued, and the reset
//! itself only begins once every other service is idle.

pub mod direct_join;
pub mod discovery;
pub mod formation;
pub mod join;
pub mod leave;
pub mod permit_joining;
pub mod reset;
pub mod route_discovery;
pub mod start_router;
pub mod sync;

use q_common::constants::SERVICE_QUEUE_DEPTH;
use q_common::Result;
use q_kernel::RequestQueue;

use crate::status::NwkStatus;
use crate::upper::RequestHandle;

pub use direct_join::DirectJoinState;
pub use discovery::{DiscoveryState, EdScanState};
pub use formation::FormationState;
pub use join::JoinState;
pub use leave::LeaveState;
pub use permit_joining::PermitJoiningState;
pub use reset::ResetState;
pub use route_discovery::RouteDiscoveryState;
pub use start_router::StartRouterState;
pub use sync::SyncState;

/// A queued request and the handle its confirm goes to
#[derive(Debug, Clone)]
pub struct Pending<Q> {
    /// Request parameters
    pub request: Q,
    /// Confirm handle
    pub handle: RequestHandle,
}

/// State machine phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase<S> {
    /// Nothing active
    Idle,
    /// Head request accepted, validating
    Begin,
    /// Next sub-request to issue
    Issue(S),
    /// Waiting for the confirm of a sub-request
    Await(S),
    /// Done; deliver the confirm
    Confirm(NwkStatus),
}

/// Request queue plus phase of one service
#[derive(Debug, Clone)]
pub struct Service<Q, S> {
    queue: RequestQueue<Pending<Q>, SERVICE_QUEUE_DEPTH>,
    phase: Phase<S>,
}

impl<Q, S: Copy + PartialEq> Service<Q, S> {
    /// Idle service with an empty queue
    #[must_use]
    pub fn new() -> Self {
        Self {
            queue: RequestQueue::new(),
            phase: Phase::Idle,
        }
    }

    /// Queue a request
    ///
    /// # Errors
    /// `PoolExhausted` if the queue is full.
    pub fn submit(&mut self, request: Q, handle: RequestHandle) -> Result<()> {
        self.queue.submit(Pending { request, handle }).map(|_| ())
    }

    /// Current phase
    #[must_use]
    pub fn phase(&self) -> Phase<S> {
        self.phase
    }

    /// Move to another phase
    pub fn set_phase(&mut self, phase: Phase<S>) {
        self.phase = phase;
    }

    /// Step being waited for, if parked
    #[must_use]
    pub fn awaiting(&self) -> Option<S> {
        match self.phase {
            Phase::Await(step) => Some(step),
            _ => None,
        }
    }

    /// Check whether the machine is parked on `step`
    #[must_use]
    pub fn is_awaiting(&self, step: S) -> bool {
        self.awaiting() == Some(step)
    }

    /// No request active or waiting
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.phase == Phase::Idle && self.queue.is_idle()
    }

    /// A request is being worked on
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.phase != Phase::Idle
    }

    /// A request is queued or active
    #[must_use]
    pub fn has_work(&self) -> bool {
        !self.queue.is_idle()
    }

    /// Move from `Idle` to `Begin` if a request is queued and nothing blocks
    pub fn try_begin(&mut self, blocked: bool) -> bool {
        if blocked || self.phase != Phase::Idle || self.queue.is_idle() {
            return false;
        }
        self.phase = Phase::Begin;
        true
    }

    /// Active request
    #[must_use]
    pub fn active(&self) -> Option<&Pending<Q>> {
        self.queue.active()
    }

    /// Active request parameters
    #[must_use]
    pub fn request(&self) -> Option<&Q> {
        self.queue.active().map(|p| &p.request)
    }

    /// Queued requests in service order
    pub fn iter(&self) -> impl Iterator<Item = &Pending<Q>> {
        self.queue.iter()
    }

    /// Finish the active request and return to `Idle`
    pub fn finish(&mut self) -> Option<Pending<Q>> {
        self.phase = Phase::Idle;
        self.queue.complete()
    }
}

impl<Q, S: Copy + PartialEq> Default for Service<Q, S> {
    fn default() -> Self {
        Self::new()
    }
}

/// State of every service machine
#[derive(Debug, Default)]
pub struct Services {
    /// NLME-RESET
    pub reset: ResetState,
    /// NLME-NETWORK-FORMATION
    pub formation: FormationState,
    /// NLME-NETWORK-DISCOVERY
    pub discovery: DiscoveryState,
    /// NLME-ED-SCAN
    pub ed_scan: EdScanState,
    /// NLME-JOIN and the parent side of joins
    pub join: JoinState,
    /// NLME-DIRECT-JOIN
    pub direct_join: DirectJoinState,
    /// NLME-LEAVE
    pub leave: LeaveState,
    /// NLME-SYNC
    pub sync: SyncState,
    /// NLME-START-ROUTER
    pub start_router: StartRouterState,
    /// NLME-PERMIT-JOINING
    pub permit_joining: PermitJoiningState,
    /// NLME-ROUTE-DISCOVERY
    pub route_discovery: RouteDiscoveryState,
}

impl Services {
    /// No service other than reset is working on a request
    ///
    /// Requests may still be queued behind a pending reset.
    #[must_use]
    pub fn all_idle_except_reset(&self) -> bool {
        !(self.formation.svc.is_active()
            || self.discovery.svc.is_active()
            || self.ed_scan.svc.is_active()
            || self.join.svc.is_active()
            || self.direct_join.svc.is_active()
            || self.leave.svc.is_active()
            || self.sync.svc.is_active()
            || self.start_router.svc.is_active()
            || self.permit_joining.svc.is_active()
            || self.route_discovery.svc.is_active())
    }
}
