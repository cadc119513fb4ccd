// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Routing engine tables and next hop selection
//!
//! The tables here are plain data. The engine drives them: route requests
//! and replies in the receive path, discovery timeouts from the clock and
//! purges from leave and link status handling.

pub mod btt;
pub mod discovery;
pub mod next_hop;
pub mod table;

pub use btt::BroadcastTable;
pub use discovery::{DiscoveryEntry, DiscoveryTable, RequestVerdict};
pub use next_hop::{compute_next_hop, NextHop, NextHopQuery, RouteMethod, RoutingContext};
pub use table::{RouteEntry, RouteStatus, RoutingTable};

use q_common::constants::MAX_PATH_COST;

/// Add a link cost to a path cost, saturating at the ceiling
#[must_use]
pub const fn accumulate_cost(path_cost: u8, link_cost: u8) -> u8 {
    let sum = path_cost as u16 + link_cost as u16;
    if sum > MAX_PATH_COST as u16 {
        MAX_PATH_COST
    } else {
        sum as u8
    }
}
