// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Upper layer service access point (NLME / NLDE)
//!
//! Requests are plain values submitted to `Nwk` together with a
//! [`RequestHandle`]. Every accepted request is answered by exactly one
//! [`UpperLayer::confirm`] carrying the same handle. Requests the engine
//! raises on its own use [`RequestHandle::INTERNAL`] and are never
//! confirmed upward.

use heapless::Vec;
use q_common::constants::MAX_NETWORK_DESCRIPTORS;
use q_common::{CapabilityInfo, ChannelMask, ExtAddr, ExtPanId, PanId, ShortAddr};

use crate::command::NetworkStatusCode;
use crate::mac::{ChannelEnergy, MAX_SCAN_CHANNELS};
use crate::status::NwkStatus;

/// Caller-chosen tag echoed in the confirm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestHandle(pub u16);

impl RequestHandle {
    /// Request raised by the engine itself
    pub const INTERNAL: Self = Self(0xFFFF);

    /// Check for an engine-internal request
    #[must_use]
    pub const fn is_internal(self) -> bool {
        self.0 == Self::INTERNAL.0
    }
}

// ============================================================================
// Requests
// ============================================================================

/// NLME-NETWORK-FORMATION.request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormationRequest {
    /// Channels to consider
    pub channels: ChannelMask,
    /// Scan duration exponent
    pub scan_duration: u8,
    /// PAN id to use; chosen at random when `None`
    pub pan_id: Option<PanId>,
    /// Extended PAN id; our IEEE address when `ANY`
    pub ext_pan_id: ExtPanId,
}

/// NLME-NETWORK-DISCOVERY.request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiscoveryRequest {
    /// Channels to scan
    pub channels: ChannelMask,
    /// Scan duration exponent
    pub scan_duration: u8,
}

/// NLME-ED-SCAN.request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EdScanRequest {
    /// Channels to scan
    pub channels: ChannelMask,
    /// Scan duration exponent
    pub scan_duration: u8,
}

/// Parameters for joining without any over-the-air exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SilentJoinParams {
    /// Our address in the network
    pub short_addr: ShortAddr,
    /// PAN id
    pub pan_id: PanId,
    /// Logical channel
    pub channel: u8,
    /// Parent address
    pub parent: ShortAddr,
    /// Parent IEEE address
    pub parent_ext: ExtAddr,
    /// Our depth
    pub depth: u8,
}

/// How to join
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinMethod {
    /// MAC association with a parent found by network discovery
    Association,
    /// NWK rejoin request
    Rejoin,
    /// MAC orphan scan
    Orphan,
    /// Preconfigured parameters, no frames exchanged
    Silent(SilentJoinParams),
}

/// NLME-JOIN.request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinRequest {
    /// Join method
    pub method: JoinMethod,
    /// Network to join (`ANY` accepts any)
    pub ext_pan_id: ExtPanId,
    /// Channels to scan (rejoin and orphan)
    pub channels: ChannelMask,
    /// Scan duration exponent
    pub scan_duration: u8,
    /// Our capability
    pub capability: CapabilityInfo,
}

/// NLME-DIRECT-JOIN.request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirectJoinRequest {
    /// Device to add as a child
    pub device: ExtAddr,
    /// Its capability
    pub capability: CapabilityInfo,
}

/// NLME-LEAVE.request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeaveRequest {
    /// Child to remove; `None` for ourselves
    pub device: Option<ExtAddr>,
    /// Children leave too
    pub remove_children: bool,
    /// Rejoin after leaving
    pub rejoin: bool,
}

/// NLME-RESET.request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResetRequest {
    /// Keep the NIB and tables
    pub warm_start: bool,
}

/// NLME-SYNC.request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncRequest {
    /// Track beacons (not supported in non-beacon networks)
    pub track: bool,
}

/// NLME-START-ROUTER.request (non-beacon)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartRouterRequest;

/// NLME-PERMIT-JOINING.request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PermitJoiningRequest {
    /// Seconds to permit joining; 0 disables, 0xFF permits indefinitely
    pub duration_s: u8,
}

/// Route discovery target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryMode {
    /// One device
    Unicast(ShortAddr),
    /// A multicast group
    Multicast(u16),
    /// Many-to-one discovery from a concentrator
    ManyToOne,
}

/// NLME-ROUTE-DISCOVERY.request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteDiscoveryRequest {
    /// Target
    pub mode: DiscoveryMode,
    /// Radius (0 selects the default)
    pub radius: u8,
    /// Many-to-one without route record table
    pub no_route_cache: bool,
}

/// NLDE-DATA.request
#[derive(Debug, Clone, Copy)]
pub struct DataRequest<'a> {
    /// Destination (group id for multicast)
    pub dst: ShortAddr,
    /// Radius (0 selects the default)
    pub radius: u8,
    /// Allow route discovery
    pub discover_route: bool,
    /// Secure the frame
    pub security: bool,
    /// Destination is a multicast group
    pub multicast: bool,
    /// NSDU
    pub payload: &'a [u8],
}

// ============================================================================
// Confirms and Indications
// ============================================================================

/// Network found by a discovery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkDescriptor {
    /// Extended PAN id
    pub ext_pan_id: ExtPanId,
    /// PAN id
    pub pan_id: PanId,
    /// Logical channel
    pub channel: u8,
    /// Stack profile
    pub stack_profile: u8,
    /// NWK protocol version
    pub protocol_version: u8,
    /// Some beacon source permits joining
    pub permit_joining: bool,
    /// Some beacon source accepts routers
    pub router_capacity: bool,
    /// Some beacon source accepts end devices
    pub end_device_capacity: bool,
    /// nwkUpdateId
    pub update_id: u8,
}

/// Networks reported by a discovery
pub type NetworkList = Vec<NetworkDescriptor, MAX_NETWORK_DESCRIPTORS>;

/// Energy readings reported by an energy scan
pub type EnergyList = Vec<ChannelEnergy, MAX_SCAN_CHANNELS>;

/// Confirm of an accepted request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NwkConfirm {
    /// NLME-NETWORK-FORMATION.confirm
    Formation {
        /// Status
        status: NwkStatus,
    },
    /// NLME-NETWORK-DISCOVERY.confirm
    Discovery {
        /// Status
        status: NwkStatus,
        /// Networks found
        networks: NetworkList,
    },
    /// NLME-ED-SCAN.confirm
    EdScan {
        /// Status
        status: NwkStatus,
        /// Channels not scanned
        unscanned: ChannelMask,
        /// Energy per scanned channel
        energy: EnergyList,
    },
    /// NLME-JOIN.confirm
    Join {
        /// Status
        status: NwkStatus,
        /// Our network address
        short_addr: ShortAddr,
        /// Joined network
        ext_pan_id: ExtPanId,
        /// Logical channel
        channel: u8,
    },
    /// NLME-DIRECT-JOIN.confirm
    DirectJoin {
        /// Status
        status: NwkStatus,
        /// Device added
        device: ExtAddr,
    },
    /// NLME-LEAVE.confirm
    Leave {
        /// Status
        status: NwkStatus,
        /// Device that left (`None` for ourselves)
        device: Option<ExtAddr>,
    },
    /// NLME-RESET.confirm
    Reset {
        /// Status
        status: NwkStatus,
    },
    /// NLME-SYNC.confirm
    Sync {
        /// Status
        status: NwkStatus,
    },
    /// NLME-START-ROUTER.confirm
    StartRouter {
        /// Status
        status: NwkStatus,
    },
    /// NLME-PERMIT-JOINING.confirm
    PermitJoining {
        /// Status
        status: NwkStatus,
    },
    /// NLME-ROUTE-DISCOVERY.confirm
    RouteDiscovery {
        /// Status
        status: NwkStatus,
    },
    /// NLDE-DATA.confirm
    Data {
        /// Status
        status: NwkStatus,
    },
}

impl NwkConfirm {
    /// Status carried by the confirm
    #[must_use]
    pub const fn status(&self) -> NwkStatus {
        match self {
            Self::Formation { status }
            | Self::Discovery { status, .. }
            | Self::EdScan { status, .. }
            | Self::Join { status, .. }
            | Self::DirectJoin { status, .. }
            | Self::Leave { status, .. }
            | Self::Reset { status }
            | Self::Sync { status }
            | Self::StartRouter { status }
            | Self::PermitJoining { status }
            | Self::RouteDiscovery { status }
            | Self::Data { status } => *status,
        }
    }
}

/// Unsolicited event for the upper layer
#[derive(Debug, Clone, Copy)]
pub enum NwkIndication<'a> {
    /// NLDE-DATA.indication
    Data {
        /// NWK destination (our address, a broadcast address or a group)
        dst: ShortAddr,
        /// NWK source
        src: ShortAddr,
        /// MAC source of the last hop
        prev_hop: ShortAddr,
        /// Link quality of the last hop
        lqi: u8,
        /// Frame was secured
        secured: bool,
        /// NSDU
        payload: &'a [u8],
    },
    /// NLME-JOIN.indication: a device joined through us
    Join {
        /// Its network address
        short_addr: ShortAddr,
        /// Its IEEE address
        ext_addr: ExtAddr,
        /// Its capability
        capability: CapabilityInfo,
        /// Joined by rejoin or orphan realignment
        rejoin: bool,
    },
    /// NLME-LEAVE.indication
    Leave {
        /// Device that left
        device: ExtAddr,
        /// Its former network address
        short_addr: ShortAddr,
        /// It intends to rejoin
        rejoin: bool,
    },
    /// NLME-NWK-STATUS.indication
    NwkStatus {
        /// Address the status refers to
        addr: ShortAddr,
        /// Status code
        code: NetworkStatusCode,
    },
    /// NLME-ROUTE-RECORD.indication (concentrator)
    RouteRecord {
        /// Originator of the route record
        src: ShortAddr,
        /// Relays from the originator toward us
        relays: &'a [ShortAddr],
    },
}

/// Upper layer (APS / ZDO) callbacks
pub trait UpperLayer {
    /// Confirm of a request submitted with `handle`
    fn confirm(&mut self, handle: RequestHandle, confirm: NwkConfirm);

    /// Unsolicited event
    fn indication(&mut self, indication: NwkIndication<'_>);

    /// Membership test for multicast delivery
    fn is_group_member(&self, _group: u16) -> bool {
        false
    }
}
