// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! NLME-ROUTE-DISCOVERY
//!
//! ```text
//! reserve route + discovery entry -> flood route request (with retries)
//!   -> wait for a route reply or the discovery timeout
//! ```
//!
//! A many-to-one discovery has no reply to wait for: it succeeds once the
//! route request has been broadcast. The transmit pipeline raises internal
//! unicast discoveries for packets that have no route, and the concentrator
//! timer raises many-to-one discoveries.

use q_common::{log_debug, log_info, log_warn};
use q_common::{Error, Millis, Result, ShortAddr};
use q_hal::RngInterface;

use super::{Phase, Service};
use crate::command::{ManyToOne, NwkCommand, RouteRequest};
use crate::engine::{Nwk, NwkTask, NwkTimer};
use crate::mac::MacService;
use crate::routing::RouteStatus;
use crate::security::SecurityProvider;
use crate::status::NwkStatus;
use crate::tx::{OutRequest, TrafficClass, TxOwner};
use crate::upper::{DiscoveryMode, NwkConfirm, RequestHandle, RouteDiscoveryRequest, UpperLayer};

/// Route discovery sub-requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteDiscoveryStep {
    /// Route request on the air
    SendRequest,
    /// Waiting for a route reply
    Reply,
}

/// NLME-ROUTE-DISCOVERY machine
#[derive(Debug, Default)]
pub struct RouteDiscoveryState {
    /// Queue and phase
    pub svc: Service<RouteDiscoveryRequest, RouteDiscoveryStep>,
    id: u8,
}

/// Destination field of the route request for `mode`
const fn request_target(mode: DiscoveryMode) -> ShortAddr {
    match mode {
        DiscoveryMode::Unicast(dst) => dst,
        DiscoveryMode::Multicast(group) => ShortAddr(group),
        DiscoveryMode::ManyToOne => ShortAddr::ALL_ROUTERS,
    }
}

impl<M, S, U, R> Nwk<M, S, U, R>
where
    M: MacService,
    S: SecurityProvider,
    U: UpperLayer,
    R: RngInterface,
{
    /// NLME-ROUTE-DISCOVERY.request
    ///
    /// # Errors
    /// `InvalidParameter` for a unicast discovery toward a broadcast
    /// address, `PoolExhausted` if the request queue is full.
    pub fn route_discovery_request(&mut self, handle: RequestHandle, request: RouteDiscoveryRequest) -> Result<()> {
        if let DiscoveryMode::Unicast(dst) = request.mode {
            if !dst.is_unicast() {
                return Err(Error::InvalidParameter);
            }
        }
        self.svc.route_discovery.svc.submit(request, handle)?;
        self.scheduler.post(NwkTask::RouteDiscovery);
        Ok(())
    }

    pub(crate) fn run_route_discovery(&mut self) {
        match self.svc.route_discovery.svc.phase() {
            Phase::Idle => {
                if self.svc.route_discovery.svc.try_begin(self.reset_pending()) {
                    self.scheduler.post(NwkTask::RouteDiscovery);
                }
            }
            Phase::Begin => {
                let Some(request) = self.svc.route_discovery.svc.request().copied() else {
                    return;
                };
                let next = self.route_discovery_begin(&request);
                self.svc.route_discovery.svc.set_phase(next);
                self.scheduler.post(NwkTask::RouteDiscovery);
            }
            Phase::Issue(RouteDiscoveryStep::SendRequest) => {
                let Some(request) = self.svc.route_discovery.svc.request().copied() else {
                    return;
                };
                self.svc
                    .route_discovery
                    .svc
                    .set_phase(Phase::Await(RouteDiscoveryStep::SendRequest));
                self.send_route_request(&request);
            }
            Phase::Issue(RouteDiscoveryStep::Reply) | Phase::Await(_) => {}
            Phase::Confirm(status) => self.route_discovery_confirm(status),
        }
    }

    fn route_discovery_begin(&mut self, request: &RouteDiscoveryRequest) -> Phase<RouteDiscoveryStep> {
        if !self.nib.is_router() || !self.nib.joined {
            return Phase::Confirm(NwkStatus::InvalidRequest);
        }
        let own = self.nib.short_addr();
        match request.mode {
            DiscoveryMode::ManyToOne if !self.config.concentrator.enabled => {
                return Phase::Confirm(NwkStatus::InvalidRequest);
            }
            DiscoveryMode::Unicast(dst) if dst == own => {
                return Phase::Confirm(NwkStatus::InvalidRequest);
            }
            DiscoveryMode::Unicast(dst) => {
                if let Err(e) = self.routes.reserve_discovery(dst) {
                    return Phase::Confirm(NwkStatus::from(e));
                }
            }
            _ => {}
        }

        let id = self.nib.next_rreq_id();
        self.svc.route_discovery.id = id;
        if request.mode != DiscoveryMode::ManyToOne {
            let expires = self.now + Millis::new(self.config.route_discovery_time_ms);
            let target = request_target(request.mode);
            if let Err(e) = self.discoveries.record_request(own, id, own, target, 0, expires) {
                return Phase::Confirm(NwkStatus::from(e));
            }
        }
        Phase::Issue(RouteDiscoveryStep::SendRequest)
    }

    fn send_route_request(&mut self, request: &RouteDiscoveryRequest) {
        let id = self.svc.route_discovery.id;
        let (many_to_one, radius) = match request.mode {
            DiscoveryMode::ManyToOne => {
                let mode = if request.no_route_cache {
                    ManyToOne::NoRouteRecord
                } else {
                    ManyToOne::WithRouteRecord
                };
                let radius = if request.radius == 0 {
                    self.config.concentrator.radius
                } else {
                    request.radius
                };
                (mode, radius)
            }
            _ => (ManyToOne::No, request.radius),
        };
        let dst_ext = match request.mode {
            DiscoveryMode::Unicast(dst) => self.address_map.ext_of(dst),
            _ => None,
        };
        let rreq = RouteRequest {
            many_to_one,
            multicast: matches!(request.mode, DiscoveryMode::Multicast(_)),
            id,
            dst: request_target(request.mode),
            path_cost: 0,
            dst_ext,
        };
        let header = self.command_header(ShortAddr::ALL_ROUTERS, radius);
        let out = OutRequest::new(header, TxOwner::RouteDiscovery { id }, TrafficClass::RouteRequest)
            .with_retries(self.config.initial_rreq_retries);
        log_info!(self.log, self.now.as_millis(), "nwk.route", "route request #{} for {:?}", id, request.mode);
        if let Err(e) = self.send_command(out, &NwkCommand::RouteRequest(rreq)) {
            self.route_discovery_step(Phase::Confirm(NwkStatus::from(e)));
            return;
        }

        if request.mode != DiscoveryMode::ManyToOne {
            let now = self.now;
            let timeout = Millis::new(self.config.route_discovery_time_ms);
            if let Err(e) = self.timers.start(NwkTimer::RouteDiscovery, now, timeout) {
                log_warn!(self.log, now.as_millis(), "nwk.route", "discovery timer unavailable: {}", e);
            }
        }
    }

    fn route_discovery_step(&mut self, next: Phase<RouteDiscoveryStep>) {
        self.svc.route_discovery.svc.set_phase(next);
        self.scheduler.post(NwkTask::RouteDiscovery);
    }

    /// The route request in flight for discovery `id` has been broadcast
    pub(crate) fn route_discovery_tx_done(&mut self, id: u8, status: NwkStatus) {
        let svc = &self.svc.route_discovery;
        if !svc.svc.is_awaiting(RouteDiscoveryStep::SendRequest) || svc.id != id {
            return;
        }
        let many_to_one = svc.svc.request().is_some_and(|r| r.mode == DiscoveryMode::ManyToOne);
        let next = if !status.is_success() {
            Phase::Confirm(status)
        } else if many_to_one {
            Phase::Confirm(NwkStatus::Success)
        } else {
            Phase::Await(RouteDiscoveryStep::Reply)
        };
        self.route_discovery_step(next);
    }

    /// A route reply for one of our requests arrived
    pub(crate) fn route_reply_received(&mut self, responder: ShortAddr) {
        let svc = &self.svc.route_discovery.svc;
        let waiting = svc.is_awaiting(RouteDiscoveryStep::SendRequest) || svc.is_awaiting(RouteDiscoveryStep::Reply);
        let matches = svc.request().is_some_and(|r| match r.mode {
            DiscoveryMode::Unicast(dst) => dst == responder,
            DiscoveryMode::Multicast(group) => ShortAddr(group) == responder,
            DiscoveryMode::ManyToOne => false,
        });
        if waiting && matches {
            self.route_discovery_step(Phase::Confirm(NwkStatus::Success));
        }
    }

    pub(crate) fn route_discovery_timeout(&mut self) {
        let svc = &self.svc.route_discovery.svc;
        if svc.is_awaiting(RouteDiscoveryStep::SendRequest) || svc.is_awaiting(RouteDiscoveryStep::Reply) {
            log_info!(self.log, self.now.as_millis(), "nwk.route", "route discovery timed out");
            self.route_discovery_step(Phase::Confirm(NwkStatus::RouteDiscoveryFailed));
        }
    }

    fn route_discovery_confirm(&mut self, status: NwkStatus) {
        self.timers.stop(NwkTimer::RouteDiscovery);
        if let Some(DiscoveryMode::Unicast(dst)) = self.svc.route_discovery.svc.request().map(|r| r.mode) {
            let found = self.routes.find(dst).is_some_and(|r| r.status == RouteStatus::Active);
            if !found {
                self.routes.mark_failed(dst);
            }
            self.route_resolved(dst, found);
        }
        if let Some(done) = self.svc.route_discovery.svc.finish() {
            self.deliver(done.handle, NwkConfirm::RouteDiscovery { status });
        }
        self.service_done(NwkTask::RouteDiscovery);
    }

    /// Concentrator period: refresh many-to-one routes toward us
    pub(crate) fn concentrator_due(&mut self) {
        if !self.config.concentrator.enabled || !self.nib.joined {
            return;
        }
        let queued = self
            .svc
            .route_discovery
            .svc
            .iter()
            .any(|p| p.request.mode == DiscoveryMode::ManyToOne);
        if queued {
            log_debug!(self.log, self.now.as_millis(), "nwk.route", "many-to-one already queued");
            return;
        }
        let request = RouteDiscoveryRequest {
            mode: DiscoveryMode::ManyToOne,
            radius: 0,
            no_route_cache: !self.config.concentrator.route_record_required,
        };
        if let Err(e) = self.route_discovery_request(RequestHandle::INTERNAL, request) {
            log_warn!(self.log, self.now.as_millis(), "nwk.route", "many-to-one not queued: {}", e);
        }
    }
}
