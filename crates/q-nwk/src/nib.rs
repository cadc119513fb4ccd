// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! NWK information base and MAC PIB mirror

use q_common::constants::{BEACON_PROTOCOL_ID, NWK_PROTOCOL_VERSION};
use q_common::{DeviceType, ExtAddr, ExtPanId, NwkConfig, PanId, ShortAddr};

use crate::mac::{BeaconPayload, PibAttribute};
use crate::security::SecurityMaterialSet;

/// Cached copy of the MAC attributes the NWK layer sets
///
/// Written only by the state machine that owns the MAC at the time, read by
/// routing and addressing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PibMirror {
    /// macPANId
    pub pan_id: PanId,
    /// macShortAddress
    pub short_addr: ShortAddr,
    /// aExtendedAddress
    pub ext_addr: ExtAddr,
    /// phyCurrentChannel
    pub channel: u8,
    /// macRxOnWhenIdle
    pub rx_on_when_idle: bool,
    /// macAssociationPermit
    pub association_permit: bool,
    /// macCoordShortAddress
    pub coord_short: ShortAddr,
    /// macCoordExtendedAddress
    pub coord_ext: ExtAddr,
}

impl PibMirror {
    /// Values after MLME-RESET with default PIB
    #[must_use]
    pub const fn new(ext_addr: ExtAddr, rx_on_when_idle: bool) -> Self {
        Self {
            pan_id: PanId::BROADCAST,
            short_addr: ShortAddr::UNASSIGNED,
            ext_addr,
            channel: 0,
            rx_on_when_idle,
            association_permit: false,
            coord_short: ShortAddr::UNASSIGNED,
            coord_ext: ExtAddr::UNKNOWN,
        }
    }

    /// Record an attribute the MAC accepted
    pub fn apply(&mut self, attribute: PibAttribute) {
        match attribute {
            PibAttribute::PanId(pan) => self.pan_id = pan,
            PibAttribute::ShortAddress(addr) => self.short_addr = addr,
            PibAttribute::ExtendedAddress(ext) => self.ext_addr = ext,
            PibAttribute::LogicalChannel(ch) => self.channel = ch,
            PibAttribute::RxOnWhenIdle(on) => self.rx_on_when_idle = on,
            PibAttribute::AssociationPermit(permit) => self.association_permit = permit,
            PibAttribute::CoordShortAddress(addr) => self.coord_short = addr,
            PibAttribute::CoordExtAddress(ext) => self.coord_ext = ext,
            PibAttribute::BeaconPayload(_) => {}
        }
    }
}

/// NWK information base
#[derive(Debug, Clone)]
pub struct Nib {
    /// Role of this device
    pub device_type: DeviceType,
    /// Tree depth (0 for the coordinator)
    pub depth: u8,
    /// nwkExtendedPANID
    pub ext_pan_id: ExtPanId,
    /// nwkUpdateId
    pub update_id: u8,
    /// Stack profile
    pub stack_profile: u8,
    /// nwkSecurityLevel
    pub security_level: u8,
    /// Joined or formed a network
    pub joined: bool,
    /// Routing and beaconing started
    pub router_started: bool,
    /// Join permitted right now
    pub permit_joining: bool,
    /// Network keys
    pub keys: SecurityMaterialSet,
    /// MAC attribute mirror
    pub pib: PibMirror,
    sequence: u8,
    rreq_id: u8,
}

impl Nib {
    /// Fresh NIB for `config`
    #[must_use]
    pub fn new(config: &NwkConfig, ext_addr: ExtAddr) -> Self {
        Self {
            device_type: config.device_type,
            depth: 0,
            ext_pan_id: ExtPanId::ANY,
            update_id: 0,
            stack_profile: config.stack_profile,
            security_level: config.security_level,
            joined: false,
            router_started: false,
            permit_joining: false,
            keys: SecurityMaterialSet::new(),
            pib: PibMirror::new(ext_addr, config.rx_on_when_idle),
            // Seeded from the IEEE address so restarted devices do not
            // replay recent sequence numbers
            sequence: ext_addr.0 as u8,
            rreq_id: (ext_addr.0 >> 8) as u8,
        }
    }

    /// Next NWK frame sequence number
    pub fn next_sequence(&mut self) -> u8 {
        self.sequence = self.sequence.wrapping_add(1);
        self.sequence
    }

    /// Next route request identifier
    pub fn next_rreq_id(&mut self) -> u8 {
        self.rreq_id = self.rreq_id.wrapping_add(1);
        self.rreq_id
    }

    /// Our network address
    #[must_use]
    pub const fn short_addr(&self) -> ShortAddr {
        self.pib.short_addr
    }

    /// Our IEEE address
    #[must_use]
    pub const fn ext_addr(&self) -> ExtAddr {
        self.pib.ext_addr
    }

    /// This device relays frames
    #[must_use]
    pub const fn is_router(&self) -> bool {
        self.device_type.is_router_capable()
    }

    /// Beacon payload advertising our current state
    #[must_use]
    pub const fn beacon_payload(&self, router_capacity: bool, end_device_capacity: bool) -> BeaconPayload {
        BeaconPayload {
            protocol_id: BEACON_PROTOCOL_ID,
            stack_profile: self.stack_profile,
            protocol_version: NWK_PROTOCOL_VERSION,
            router_capacity: router_capacity && self.permit_joining,
            device_depth: self.depth,
            end_device_capacity: end_device_capacity && self.permit_joining,
            ext_pan_id: self.ext_pan_id,
            update_id: self.update_id,
        }
    }

    /// Forget the network, keeping role and IEEE address
    ///
    /// Key material is zeroized.
    pub fn leave_network(&mut self) {
        self.depth = 0;
        self.ext_pan_id = ExtPanId::ANY;
        self.update_id = 0;
        self.joined = false;
        self.router_started = false;
        self.permit_joining = false;
        self.keys.clear();
        self.pib = PibMirror::new(self.pib.ext_addr, self.pib.rx_on_when_idle);
    }
}
