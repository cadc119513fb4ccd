// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Stack-wide constants for the ZigBee NWK layer
//!
//! Protocol constants (`nwkc*`) follow ZigBee PRO. Table capacities are
//! compile-time limits chosen for a 32 KiB RAM part; every table in the
//! engine is a fixed array sized by one of these.

// =============================================================================
// Protocol Identification
// =============================================================================

/// NWK protocol version carried in every frame control field (ZigBee PRO)
pub const NWK_PROTOCOL_VERSION: u8 = 0x02;

/// ZigBee PRO stack profile
pub const STACK_PROFILE_PRO: u8 = 0x02;

/// ZigBee protocol identifier in the beacon payload
pub const BEACON_PROTOCOL_ID: u8 = 0x00;

/// Beacon payload length in bytes
pub const BEACON_PAYLOAD_LEN: usize = 15;

// =============================================================================
// Frame Limits
// =============================================================================

/// IEEE 802.15.4 aMaxPHYPacketSize
pub const MAX_PHY_PACKET_SIZE: usize = 127;

/// Worst-case MAC header plus FCS overhead for a NWK frame
pub const MAC_FRAME_OVERHEAD: usize = 11;

/// Largest MSDU the NWK layer can hand to the MAC
pub const MAX_MSDU_SIZE: usize = MAX_PHY_PACKET_SIZE - MAC_FRAME_OVERHEAD;

/// Maximum NWK header (with both IEEE addresses and multicast control)
pub const MAX_NWK_HEADER_SIZE: usize = 25;

/// Auxiliary security header plus MIC-32 added by the security provider
pub const NWK_SECURITY_OVERHEAD: usize = 18;

/// Largest NSDU accepted from the upper layer
pub const MAX_NSDU_SIZE: usize = MAX_MSDU_SIZE - 8 - NWK_SECURITY_OVERHEAD;

/// Maximum relays recorded in a source route or route record
pub const MAX_SOURCE_ROUTE_RELAYS: usize = 8;

// =============================================================================
// Timing (milliseconds)
// =============================================================================

/// nwkcRouteDiscoveryTime
pub const ROUTE_DISCOVERY_TIME_MS: u32 = 10_000;

/// nwkcMaxBroadcastJitter
pub const MAX_BROADCAST_JITTER_MS: u32 = 64;

/// nwkcMinRREQJitter (in 2 ms slots, expressed in ms)
pub const MIN_RREQ_JITTER_MS: u32 = 2;

/// nwkcMaxRREQJitter
pub const MAX_RREQ_JITTER_MS: u32 = 128;

/// nwkcRREQRetryInterval
pub const RREQ_RETRY_INTERVAL_MS: u32 = 254;

/// nwkcInitialRREQRetries
pub const INITIAL_RREQ_RETRIES: u8 = 3;

/// nwkcRREQRetries
pub const RREQ_RETRIES: u8 = 2;

/// nwkBroadcastDeliveryTime
pub const BROADCAST_DELIVERY_TIME_MS: u32 = 9_000;

/// nwkLinkStatusPeriod
pub const LINK_STATUS_PERIOD_MS: u32 = 15_000;

/// nwkRouterAgeLimit (link status periods without hearing a router)
pub const ROUTER_AGE_LIMIT: u8 = 3;

/// Rejoin response wait time
pub const REJOIN_RESPONSE_WAIT_MS: u32 = 2_000;

/// Default concentrator discovery time
pub const CONCENTRATOR_DISCOVERY_TIME_MS: u32 = 60_000;

// =============================================================================
// Routing Constants
// =============================================================================

/// Maximum link cost (link considered unusable above this)
pub const MAX_LINK_COST: u8 = 7;

/// Route request path cost ceiling
pub const MAX_PATH_COST: u8 = 0xFF;

/// Default radius multiplier (radius = 2 * nwkMaxDepth)
pub const DEFAULT_RADIUS_FACTOR: u8 = 2;

// =============================================================================
// Table Capacities
// =============================================================================

/// Neighbor table entries
pub const NEIGHBOR_TABLE_SIZE: usize = 24;

/// Routing table entries
pub const ROUTING_TABLE_SIZE: usize = 16;

/// Route discovery table entries
pub const ROUTE_DISCOVERY_TABLE_SIZE: usize = 8;

/// Address map entries
pub const ADDRESS_MAP_SIZE: usize = 32;

/// Broadcast transaction table entries
pub const BTT_SIZE: usize = 12;

/// Outgoing packet descriptors
pub const OUT_PACKET_POOL_SIZE: usize = 8;

/// Incoming frames buffered between MAC indication and NWK task
pub const RX_INBOX_SIZE: usize = 4;

/// Pending requests per management primitive
pub const SERVICE_QUEUE_DEPTH: usize = 4;

/// Network descriptors reported by a discovery
pub const MAX_NETWORK_DESCRIPTORS: usize = 8;

/// PAN descriptors buffered from one MAC scan
pub const MAX_PAN_DESCRIPTORS: usize = 8;

/// Application timers owned by the NWK engine
pub const NWK_TIMER_COUNT: usize = 16;

/// Network key material slots in the NIB
pub const SECURITY_MATERIAL_SLOTS: usize = 2;
