// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! ZigBee PRO network layer for Qbitel EdgeOS
//!
//! A run-to-completion NWK engine between an IEEE 802.15.4 MAC and the
//! application support layer:
//!
//! - **Services**: NLME formation, discovery, join, leave, reset, sync,
//!   router start, permit joining and route discovery state machines
//! - **Data**: NLDE-DATA transmission with unicast, broadcast, multicast
//!   and source-routed delivery
//! - **Routing**: tree and mesh routing, route discovery, many-to-one
//!   routes and route records
//! - **Addressing**: distributed and stochastic address assignment with
//!   conflict detection
//! - **Persistence**: snapshots of the state needed to resume after reboot
//!
//! # Usage
//!
//! ```rust,ignore
//! use q_nwk::{Nwk, NoSecurity};
//!
//! let mut nwk = Nwk::new(config, mac, NoSecurity, app, rng)?;
//! nwk.formation_request(handle, request)?;
//! loop {
//!     nwk.tick(clock.now());
//!     while nwk.run_once() {}
//! }
//! ```

#![no_std]
#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

#[cfg(test)]
extern crate std;

pub mod address_map;
pub mod addressing;
pub mod command;
pub mod engine;
pub mod frame;
mod link_status;
pub mod mac;
pub mod neighbor;
pub mod nib;
pub mod persistence;
pub mod routing;
pub mod rx;
pub mod security;
pub mod services;
pub mod status;
pub mod tx;
pub mod upper;

// Re-export commonly used types
pub use address_map::{AddressMap, AddressMapEntry, MapUpdate};
pub use addressing::{AddrRange, AddressAllocator};
pub use command::NwkCommand;
pub use engine::{Nwk, NwkTask, NwkTimer};
pub use frame::{FrameType, NwkHeader};
pub use mac::{
    BeaconNotify, BeaconPayload, MacConfirm, MacDataIndication, MacDataRequest, MacIndication, MacService,
    MacUser, PanDescriptor, PibAttribute, PibId,
};
pub use neighbor::{NeighborEntry, NeighborTable};
pub use nib::Nib;
pub use persistence::{NwkSnapshot, PersistenceHook};
pub use routing::{RouteEntry, RouteStatus, RoutingTable};
pub use security::{NoSecurity, SecurityMaterial, SecurityProvider};
pub use services::permit_joining::PERMIT_FOREVER;
pub use status::{MacStatus, NwkStatus};
pub use upper::{
    DataRequest, DirectJoinRequest, DiscoveryMode, DiscoveryRequest, EdScanRequest, FormationRequest,
    JoinMethod, JoinRequest, LeaveRequest, NetworkDescriptor, NwkConfirm, NwkIndication, PermitJoiningRequest,
    RequestHandle, ResetRequest, RouteDiscoveryRequest, SilentJoinParams, StartRouterRequest, SyncRequest,
    UpperLayer,
};

/// NWK layer version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
