// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! NWK layer configuration
//!
//! Configuration is fixed at build or provisioning time and handed to the
//! engine at construction. The engine copies it into its NIB; runtime
//! changes go through NWK primitives, never through this struct.

use crate::constants::{
    BROADCAST_DELIVERY_TIME_MS, CONCENTRATOR_DISCOVERY_TIME_MS, INITIAL_RREQ_RETRIES,
    LINK_STATUS_PERIOD_MS, MAX_BROADCAST_JITTER_MS, MAX_RREQ_JITTER_MS, MIN_RREQ_JITTER_MS,
    ROUTE_DISCOVERY_TIME_MS, RREQ_RETRIES, RREQ_RETRY_INTERVAL_MS, STACK_PROFILE_PRO,
};
use crate::errors::{Error, Result};
use crate::types::DeviceType;

/// Short address assignment scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressingMode {
    /// Distributed (Cskip) tree addressing
    Tree,
    /// Stochastic addressing with conflict resolution
    Stochastic,
}

/// Initial transmission delay per traffic class
///
/// Broadcast and route-request values are upper bounds for a random jitter;
/// the others are fixed delays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxDelays {
    /// Locally originated unicast data
    pub unicast_data_ms: u32,
    /// Locally originated unicast command
    pub unicast_command_ms: u32,
    /// Broadcast jitter ceiling
    pub broadcast_jitter_ms: u32,
    /// Multicast to a group we are a member of
    pub multicast_member_ms: u32,
    /// Relayed (transit) unicast frame
    pub transit_ms: u32,
    /// Route request relay jitter floor
    pub rreq_min_ms: u32,
    /// Route request relay jitter ceiling
    pub rreq_max_ms: u32,
    /// Gap between repeated route request broadcasts
    pub rreq_retry_interval_ms: u32,
}

impl TxDelays {
    /// ZigBee PRO defaults
    pub const DEFAULT: Self = Self {
        unicast_data_ms: 0,
        unicast_command_ms: 0,
        broadcast_jitter_ms: MAX_BROADCAST_JITTER_MS,
        multicast_member_ms: 2,
        transit_ms: 0,
        rreq_min_ms: MIN_RREQ_JITTER_MS,
        rreq_max_ms: MAX_RREQ_JITTER_MS,
        rreq_retry_interval_ms: RREQ_RETRY_INTERVAL_MS,
    };

    /// All delays zero (deterministic test setups)
    pub const NONE: Self = Self {
        unicast_data_ms: 0,
        unicast_command_ms: 0,
        broadcast_jitter_ms: 0,
        multicast_member_ms: 0,
        transit_ms: 0,
        rreq_min_ms: 0,
        rreq_max_ms: 0,
        rreq_retry_interval_ms: 0,
    };
}

impl Default for TxDelays {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Many-to-one (concentrator) configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConcentratorConfig {
    /// This device acts as a concentrator
    pub enabled: bool,
    /// Radius of many-to-one route requests (0 = default radius)
    pub radius: u8,
    /// Period between many-to-one route requests (0 = only on demand)
    pub discovery_time_ms: u32,
    /// Senders must precede data with a route record
    pub route_record_required: bool,
}

impl ConcentratorConfig {
    /// Not a concentrator
    pub const DISABLED: Self = Self {
        enabled: false,
        radius: 0,
        discovery_time_ms: CONCENTRATOR_DISCOVERY_TIME_MS,
        route_record_required: false,
    };
}

/// NWK layer configuration
#[derive(Debug, Clone, Copy)]
pub struct NwkConfig {
    /// Role of this device
    pub device_type: DeviceType,
    /// Address assignment scheme
    pub addressing: AddressingMode,
    /// nwkMaxChildren (Cm)
    pub max_children: u8,
    /// nwkMaxRouters (Rm)
    pub max_routers: u8,
    /// nwkMaxDepth (Lm)
    pub max_depth: u8,
    /// Allow hierarchical (tree) routing as a fallback
    pub use_tree_routing: bool,
    /// Allow mesh routing with on-demand route discovery
    pub mesh_routing: bool,
    /// Stack profile advertised in beacons
    pub stack_profile: u8,
    /// nwkSecurityLevel (0 disables NWK security)
    pub security_level: u8,
    /// Keep the receiver on when idle (end devices)
    pub rx_on_when_idle: bool,
    /// Many-to-one settings
    pub concentrator: ConcentratorConfig,
    /// Route discovery timeout
    pub route_discovery_time_ms: u32,
    /// Extra broadcasts of a route request we originate
    pub initial_rreq_retries: u8,
    /// Extra broadcasts of a route request we relay
    pub rreq_retries: u8,
    /// Broadcast transaction record lifetime
    pub broadcast_delivery_time_ms: u32,
    /// Link status broadcast period (0 disables)
    pub link_status_period_ms: u32,
    /// Initial transmission delays per traffic class
    pub tx_delays: TxDelays,
    /// Default MAC scan duration exponent
    pub scan_duration: u8,
}

impl NwkConfig {
    /// Default configuration (router, stochastic addressing, mesh routing)
    pub const DEFAULT: Self = Self {
        device_type: DeviceType::Router,
        addressing: AddressingMode::Stochastic,
        max_children: 20,
        max_routers: 6,
        max_depth: 15,
        use_tree_routing: false,
        mesh_routing: true,
        stack_profile: STACK_PROFILE_PRO,
        security_level: 5,
        rx_on_when_idle: true,
        concentrator: ConcentratorConfig::DISABLED,
        route_discovery_time_ms: ROUTE_DISCOVERY_TIME_MS,
        initial_rreq_retries: INITIAL_RREQ_RETRIES,
        rreq_retries: RREQ_RETRIES,
        broadcast_delivery_time_ms: BROADCAST_DELIVERY_TIME_MS,
        link_status_period_ms: LINK_STATUS_PERIOD_MS,
        tx_delays: TxDelays::DEFAULT,
        scan_duration: 3,
    };

    /// Default coordinator configuration
    #[must_use]
    pub const fn coordinator() -> Self {
        let mut config = Self::DEFAULT;
        config.device_type = DeviceType::Coordinator;
        config
    }

    /// Default router configuration
    #[must_use]
    pub const fn router() -> Self {
        Self::DEFAULT
    }

    /// Default sleepy end device configuration
    #[must_use]
    pub const fn end_device() -> Self {
        let mut config = Self::DEFAULT;
        config.device_type = DeviceType::EndDevice;
        config.rx_on_when_idle = false;
        config.link_status_period_ms = 0;
        config
    }

    /// Tree addressing with the given Cm / Rm / Lm parameters
    #[must_use]
    pub const fn with_tree(mut self, max_children: u8, max_routers: u8, max_depth: u8) -> Self {
        self.addressing = AddressingMode::Tree;
        self.max_children = max_children;
        self.max_routers = max_routers;
        self.max_depth = max_depth;
        self.use_tree_routing = true;
        self
    }

    /// Default radius for originated frames
    #[must_use]
    pub const fn default_radius(&self) -> u8 {
        let radius = self.max_depth.saturating_mul(2);
        if radius == 0 {
            1
        } else {
            radius
        }
    }

    /// Check the configuration for internal consistency
    ///
    /// # Errors
    /// `InvalidParameter` if the tree parameters are inconsistent or the
    /// role cannot use the requested features.
    pub fn validate(&self) -> Result<()> {
        if self.max_routers > self.max_children {
            return Err(Error::InvalidParameter);
        }
        if self.addressing == AddressingMode::Tree && self.max_depth == 0 {
            return Err(Error::InvalidParameter);
        }
        if self.concentrator.enabled && !self.device_type.is_router_capable() {
            return Err(Error::InvalidParameter);
        }
        if self.tx_delays.rreq_min_ms > self.tx_delays.rreq_max_ms {
            return Err(Error::InvalidParameter);
        }
        if !self.mesh_routing && !self.use_tree_routing && self.device_type.is_router_capable() {
            return Err(Error::InvalidParameter);
        }
        Ok(())
    }
}

impl Default for NwkConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}
