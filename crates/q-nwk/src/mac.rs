// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! MAC service access point
//!
//! The NWK engine drives an IEEE 802.15.4 MAC through [`MacService`].
//! Requests are fire-and-forget: every request is answered later by exactly
//! one [`MacConfirm`], which the platform hands back through
//! `Nwk::mac_confirm` together with the [`MacUser`] tag given on the request.
//! Unsolicited events arrive through `Nwk::mac_indication`.
//!
//! The MAC is assumed to run a non-beacon network (beacon order 15).

use heapless::Vec;
use q_common::constants::BEACON_PAYLOAD_LEN;
use q_common::{CapabilityInfo, ChannelMask, ExtAddr, ExtPanId, PanId, ShortAddr};

use crate::status::MacStatus;

/// Maximum channels reported by one energy scan
pub const MAX_SCAN_CHANNELS: usize = 16;

// ============================================================================
// Request Routing
// ============================================================================

/// Owner of an outstanding MAC request
///
/// Echoed back with the confirm so the engine can wake the right state
/// machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MacUser {
    /// NLME-RESET
    Reset,
    /// NLME-NETWORK-FORMATION
    Formation,
    /// NLME-NETWORK-DISCOVERY
    Discovery,
    /// NLME-ED-SCAN
    EdScan,
    /// NLME-JOIN (joining side)
    Join,
    /// NLME-SYNC
    Sync,
    /// NLME-START-ROUTER
    StartRouter,
    /// NLME-PERMIT-JOINING
    PermitJoining,
    /// Association and orphan responses sent as a parent
    Parent,
    /// Outgoing NWK frame in the given packet slot
    Tx(u8),
}

// ============================================================================
// PIB
// ============================================================================

/// PIB attribute identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PibId {
    /// macPANId
    PanId,
    /// macShortAddress
    ShortAddress,
    /// aExtendedAddress
    ExtendedAddress,
    /// phyCurrentChannel
    LogicalChannel,
    /// macRxOnWhenIdle
    RxOnWhenIdle,
    /// macAssociationPermit
    AssociationPermit,
    /// macBeaconPayload
    BeaconPayload,
    /// macCoordShortAddress
    CoordShortAddress,
    /// macCoordExtendedAddress
    CoordExtAddress,
}

/// PIB attribute value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PibAttribute {
    /// macPANId
    PanId(PanId),
    /// macShortAddress
    ShortAddress(ShortAddr),
    /// aExtendedAddress (read only)
    ExtendedAddress(ExtAddr),
    /// phyCurrentChannel
    LogicalChannel(u8),
    /// macRxOnWhenIdle
    RxOnWhenIdle(bool),
    /// macAssociationPermit
    AssociationPermit(bool),
    /// macBeaconPayload
    BeaconPayload([u8; BEACON_PAYLOAD_LEN]),
    /// macCoordShortAddress
    CoordShortAddress(ShortAddr),
    /// macCoordExtendedAddress
    CoordExtAddress(ExtAddr),
}

impl PibAttribute {
    /// Identifier of this value
    #[must_use]
    pub const fn id(&self) -> PibId {
        match self {
            Self::PanId(_) => PibId::PanId,
            Self::ShortAddress(_) => PibId::ShortAddress,
            Self::ExtendedAddress(_) => PibId::ExtendedAddress,
            Self::LogicalChannel(_) => PibId::LogicalChannel,
            Self::RxOnWhenIdle(_) => PibId::RxOnWhenIdle,
            Self::AssociationPermit(_) => PibId::AssociationPermit,
            Self::BeaconPayload(_) => PibId::BeaconPayload,
            Self::CoordShortAddress(_) => PibId::CoordShortAddress,
            Self::CoordExtAddress(_) => PibId::CoordExtAddress,
        }
    }
}

// ============================================================================
// Requests
// ============================================================================

/// MCPS-DATA.request
#[derive(Debug, Clone, Copy)]
pub struct MacDataRequest<'a> {
    /// Next-hop MAC destination (0xFFFF for broadcast)
    pub dst: ShortAddr,
    /// MSDU handle echoed in the confirm
    pub handle: u8,
    /// Request a MAC acknowledgment
    pub ack_request: bool,
    /// MSDU (complete NWK frame)
    pub payload: &'a [u8],
}

/// MLME-SCAN type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanType {
    /// Energy detection
    Ed,
    /// Active scan (beacon requests)
    Active,
    /// Passive scan
    Passive,
    /// Orphan scan
    Orphan,
}

/// MLME-SCAN.request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanRequest {
    /// Scan type
    pub scan_type: ScanType,
    /// Channels to scan
    pub channels: ChannelMask,
    /// Scan duration exponent
    pub duration: u8,
}

/// MLME-START.request (non-beacon)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartRequest {
    /// PAN identifier
    pub pan_id: PanId,
    /// Logical channel
    pub channel: u8,
    /// Start as PAN coordinator
    pub pan_coordinator: bool,
}

/// MLME-ASSOCIATE.request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssociateRequest {
    /// Channel of the chosen parent
    pub channel: u8,
    /// PAN of the chosen parent
    pub pan_id: PanId,
    /// Short address of the chosen parent
    pub coord: ShortAddr,
    /// Capability of the joining device
    pub capability: CapabilityInfo,
}

/// MLME-ASSOCIATE.response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssociateResponse {
    /// Joining device
    pub device: ExtAddr,
    /// Allocated short address
    pub short_addr: ShortAddr,
    /// Association status
    pub status: MacStatus,
}

/// MLME-ORPHAN.response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrphanResponse {
    /// Orphaned device
    pub device: ExtAddr,
    /// Its short address
    pub short_addr: ShortAddr,
    /// The device is one of our children
    pub associated: bool,
}

/// MLME-POLL.request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollRequest {
    /// Parent to poll
    pub coord: ShortAddr,
}

/// MLME-RX-ENABLE.request (non-beacon)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RxEnableRequest {
    /// Receiver on-time in milliseconds (0 turns it off)
    pub duration_ms: u32,
}

// ============================================================================
// Confirms and Indications
// ============================================================================

/// Energy measured on one channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelEnergy {
    /// Channel number
    pub channel: u8,
    /// Energy level (0 = quiet, 255 = saturated)
    pub energy: u8,
}

/// Coordinator realignment received during an orphan scan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Realignment {
    /// PAN identifier
    pub pan_id: PanId,
    /// Parent short address
    pub coord_short: ShortAddr,
    /// Parent IEEE address
    pub coord_ext: ExtAddr,
    /// Logical channel
    pub channel: u8,
    /// Our short address
    pub short_addr: ShortAddr,
}

/// MLME-SCAN.confirm
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanConfirm {
    /// Scan status
    pub status: MacStatus,
    /// Scan type performed
    pub scan_type: ScanType,
    /// Channels not scanned
    pub unscanned: ChannelMask,
    /// Energy results (energy scan only)
    pub energy: Vec<ChannelEnergy, MAX_SCAN_CHANNELS>,
    /// Realignment data (successful orphan scan only)
    pub realignment: Option<Realignment>,
}

/// MAC confirm
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MacConfirm {
    /// MCPS-DATA.confirm
    Data {
        /// MSDU handle
        handle: u8,
        /// Status
        status: MacStatus,
    },
    /// MLME-SET.confirm
    Set {
        /// Status
        status: MacStatus,
    },
    /// MLME-SCAN.confirm
    Scan(ScanConfirm),
    /// MLME-START.confirm
    Start {
        /// Status
        status: MacStatus,
    },
    /// MLME-ASSOCIATE.confirm
    Associate {
        /// Association status
        status: MacStatus,
        /// Address assigned by the parent
        short_addr: ShortAddr,
    },
    /// MLME-POLL.confirm
    Poll {
        /// Status
        status: MacStatus,
    },
    /// MLME-RX-ENABLE.confirm
    RxEnable {
        /// Status
        status: MacStatus,
    },
    /// MLME-RESET.confirm
    Reset {
        /// Status
        status: MacStatus,
    },
    /// MLME-COMM-STATUS.indication for an association or orphan response
    CommStatus {
        /// Device the response was sent to
        device: ExtAddr,
        /// Delivery status
        status: MacStatus,
    },
}

impl MacConfirm {
    /// Status carried by the confirm
    #[must_use]
    pub fn status(&self) -> MacStatus {
        match self {
            Self::Scan(scan) => scan.status,
            Self::Data { status, .. }
            | Self::Set { status }
            | Self::Start { status }
            | Self::Associate { status, .. }
            | Self::Poll { status }
            | Self::RxEnable { status }
            | Self::Reset { status }
            | Self::CommStatus { status, .. } => *status,
        }
    }
}

/// PAN descriptor from a received beacon
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PanDescriptor {
    /// Beacon source short address
    pub coord_addr: ShortAddr,
    /// Beacon source IEEE address, if sent in long form
    pub coord_ext: ExtAddr,
    /// PAN identifier
    pub pan_id: PanId,
    /// Logical channel
    pub channel: u8,
    /// Link quality of the beacon
    pub lqi: u8,
    /// Association permit bit of the superframe spec
    pub association_permit: bool,
}

/// MLME-BEACON-NOTIFY.indication
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BeaconNotify {
    /// PAN descriptor
    pub descriptor: PanDescriptor,
    /// Beacon payload
    pub sdu: Vec<u8, BEACON_PAYLOAD_LEN>,
}

/// MCPS-DATA.indication
#[derive(Debug, Clone, Copy)]
pub struct MacDataIndication<'a> {
    /// MAC source (previous hop)
    pub src: ShortAddr,
    /// MAC destination
    pub dst: ShortAddr,
    /// Link quality
    pub lqi: u8,
    /// MSDU
    pub payload: &'a [u8],
}

/// Unsolicited MAC event
#[derive(Debug, Clone)]
pub enum MacIndication<'a> {
    /// Frame received
    Data(MacDataIndication<'a>),
    /// Beacon received during a scan
    BeaconNotify(BeaconNotify),
    /// A device asks to associate with us
    Associate {
        /// Joining device
        device: ExtAddr,
        /// Its capability
        capability: CapabilityInfo,
    },
    /// A device lost its parent and is looking for it
    Orphan {
        /// Orphaned device
        device: ExtAddr,
    },
}

// ============================================================================
// Beacon Payload
// ============================================================================

/// ZigBee beacon payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BeaconPayload {
    /// Protocol identifier (0 for ZigBee)
    pub protocol_id: u8,
    /// Stack profile
    pub stack_profile: u8,
    /// NWK protocol version
    pub protocol_version: u8,
    /// Sender accepts router children
    pub router_capacity: bool,
    /// Sender depth in the tree
    pub device_depth: u8,
    /// Sender accepts end device children
    pub end_device_capacity: bool,
    /// Extended PAN identifier
    pub ext_pan_id: ExtPanId,
    /// nwkUpdateId
    pub update_id: u8,
}

impl BeaconPayload {
    /// Serialize to the 15-byte wire form
    #[must_use]
    pub fn to_bytes(&self) -> [u8; BEACON_PAYLOAD_LEN] {
        let mut bytes = [0u8; BEACON_PAYLOAD_LEN];
        bytes[0] = self.protocol_id;
        bytes[1] = (self.stack_profile & 0x0F) | ((self.protocol_version & 0x0F) << 4);
        bytes[2] = (u8::from(self.router_capacity) << 2)
            | ((self.device_depth & 0x0F) << 3)
            | (u8::from(self.end_device_capacity) << 7);
        bytes[3..11].copy_from_slice(&self.ext_pan_id.0.to_le_bytes());
        // Non-beacon network: TX offset all ones
        bytes[11..14].copy_from_slice(&[0xFF, 0xFF, 0xFF]);
        bytes[14] = self.update_id;
        bytes
    }

    /// Parse from wire bytes
    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < 11 {
            return None;
        }
        let mut epid = [0u8; 8];
        epid.copy_from_slice(&bytes[3..11]);
        Some(Self {
            protocol_id: bytes[0],
            stack_profile: bytes[1] & 0x0F,
            protocol_version: bytes[1] >> 4,
            router_capacity: bytes[2] & 0x04 != 0,
            device_depth: (bytes[2] >> 3) & 0x0F,
            end_device_capacity: bytes[2] & 0x80 != 0,
            ext_pan_id: ExtPanId(u64::from_le_bytes(epid)),
            update_id: bytes.get(14).copied().unwrap_or(0),
        })
    }
}

// ============================================================================
// MAC Service Trait
// ============================================================================

/// IEEE 802.15.4 MAC as seen by the NWK layer
///
/// Every request method is answered by exactly one confirm delivered through
/// `Nwk::mac_confirm` with the same [`MacUser`]. Implementations must not
/// call back into the engine from inside a request method.
pub trait MacService {
    /// MCPS-DATA.request
    fn data_request(&mut self, user: MacUser, request: &MacDataRequest<'_>);

    /// MLME-SET.request
    fn set_request(&mut self, user: MacUser, attribute: PibAttribute);

    /// MLME-GET.request (synchronous)
    fn get_request(&mut self, id: PibId) -> Option<PibAttribute>;

    /// MLME-SCAN.request
    fn scan_request(&mut self, user: MacUser, request: &ScanRequest);

    /// MLME-START.request
    fn start_request(&mut self, user: MacUser, request: &StartRequest);

    /// MLME-ASSOCIATE.request
    fn associate_request(&mut self, user: MacUser, request: &AssociateRequest);

    /// MLME-ASSOCIATE.response (confirmed by `CommStatus`)
    fn associate_response(&mut self, user: MacUser, response: &AssociateResponse);

    /// MLME-ORPHAN.response (confirmed by `CommStatus`)
    fn orphan_response(&mut self, user: MacUser, response: &OrphanResponse);

    /// MLME-POLL.request
    fn poll_request(&mut self, user: MacUser, request: &PollRequest);

    /// MLME-RX-ENABLE.request
    fn rx_enable_request(&mut self, user: MacUser, request: &RxEnableRequest);

    /// MLME-RESET.request
    fn reset_request(&mut self, user: MacUser, set_default_pib: bool);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_beacon_payload_layout() {
        let payload = BeaconPayload {
            protocol_id: 0,
            stack_profile: 2,
            protocol_version: 2,
            router_capacity: true,
            device_depth: 3,
            end_device_capacity: false,
            ext_pan_id: ExtPanId(0x0102_0304_0506_0708),
            update_id: 9,
        };
        let bytes = payload.to_bytes();
        assert_eq!(bytes[1], 0x22);
        assert_eq!(bytes[2], 0x04 | (3 << 3));
        assert_eq!(bytes[3], 0x08);
        assert_eq!(BeaconPayload::from_bytes(&bytes), Some(payload));
    }

    #[test]
    fn test_short_beacon_rejected() {
        assert_eq!(BeaconPayload::from_bytes(&[0, 0x22, 0x84]), None);
    }

    #[test]
    fn test_confirm_status() {
        let confirm = MacConfirm::Associate {
            status: MacStatus::PAN_AT_CAPACITY,
            short_addr: ShortAddr::UNASSIGNED,
        };
        assert_eq!(confirm.status(), MacStatus::PAN_AT_CAPACITY);
    }
}
