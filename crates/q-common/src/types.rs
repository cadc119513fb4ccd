// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Common types for the ZigBee NWK stack
//!
//! This module defines the fundamental address and identifier types shared
//! by every layer: 16-bit network (short) addresses, 64-bit IEEE (extended)
//! addresses, PAN identifiers, channel masks, device roles, and the network
//! key container.

use core::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// 16-bit NWK (short) address
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ShortAddr(pub u16);

impl ShortAddr {
    /// Address of the ZigBee coordinator
    pub const COORDINATOR: Self = Self(0x0000);
    /// Broadcast to all devices in the PAN
    pub const ALL_DEVICES: Self = Self(0xFFFF);
    /// Reserved "no address allocated" value
    pub const UNASSIGNED: Self = Self(0xFFFE);
    /// Broadcast to all devices with macRxOnWhenIdle = TRUE
    pub const RX_ON_WHEN_IDLE: Self = Self(0xFFFD);
    /// Broadcast to all routers and the coordinator
    pub const ALL_ROUTERS: Self = Self(0xFFFC);
    /// Broadcast to low power routers only
    pub const LOW_POWER_ROUTERS: Self = Self(0xFFFB);
    /// First address of the reserved broadcast range
    pub const BROADCAST_RANGE_START: u16 = 0xFFF8;

    /// Create from a raw value
    #[must_use]
    pub const fn new(raw: u16) -> Self {
        Self(raw)
    }

    /// Get the raw value
    #[must_use]
    pub const fn raw(self) -> u16 {
        self.0
    }

    /// Check if the address lies in the reserved broadcast range
    #[must_use]
    pub const fn is_broadcast(self) -> bool {
        self.0 >= Self::BROADCAST_RANGE_START
    }

    /// Check if the address names a single device
    #[must_use]
    pub const fn is_unicast(self) -> bool {
        self.0 < Self::BROADCAST_RANGE_START
    }

    /// Little-endian wire encoding
    #[must_use]
    pub const fn to_le_bytes(self) -> [u8; 2] {
        self.0.to_le_bytes()
    }

    /// Decode from little-endian wire bytes
    #[must_use]
    pub const fn from_le_bytes(bytes: [u8; 2]) -> Self {
        Self(u16::from_le_bytes(bytes))
    }
}

impl fmt::Debug for ShortAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:04X}", self.0)
    }
}

impl fmt::Display for ShortAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:04X}", self.0)
    }
}

impl From<u16> for ShortAddr {
    fn from(value: u16) -> Self {
        Self(value)
    }
}

/// 64-bit IEEE (extended) address
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ExtAddr(pub u64);

impl ExtAddr {
    /// Unknown / not present
    pub const UNKNOWN: Self = Self(0);
    /// Invalid IEEE address (all ones)
    pub const INVALID: Self = Self(u64::MAX);

    /// Create from a raw value
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Get the raw value
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }

    /// Check that the address is a real device address
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.0 != 0 && self.0 != u64::MAX
    }

    /// Little-endian wire encoding
    #[must_use]
    pub const fn to_le_bytes(self) -> [u8; 8] {
        self.0.to_le_bytes()
    }

    /// Decode from little-endian wire bytes
    #[must_use]
    pub const fn from_le_bytes(bytes: [u8; 8]) -> Self {
        Self(u64::from_le_bytes(bytes))
    }
}

impl fmt::Debug for ExtAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016X}", self.0)
    }
}

impl fmt::Display for ExtAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016X}", self.0)
    }
}

/// 16-bit PAN identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PanId(pub u16);

impl PanId {
    /// Broadcast PAN identifier
    pub const BROADCAST: Self = Self(0xFFFF);

    /// Check that the PAN id may be used for a network
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.0 < 0xFFFF
    }
}

/// 64-bit extended PAN identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ExtPanId(pub u64);

impl ExtPanId {
    /// "Any network" / not yet chosen
    pub const ANY: Self = Self(0);

    /// Check if a specific network is requested
    #[must_use]
    pub const fn is_specified(self) -> bool {
        self.0 != 0
    }
}

/// IEEE 802.15.4 channel mask (bit n selects channel n)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ChannelMask(pub u32);

impl ChannelMask {
    /// All 2.4 GHz channels (11..=26)
    pub const ALL_2_4GHZ: Self = Self(0x07FF_F800);
    /// Empty mask
    pub const EMPTY: Self = Self(0);

    /// Mask selecting one channel
    #[must_use]
    pub const fn single(channel: u8) -> Self {
        if channel > 26 {
            Self(0)
        } else {
            Self(1 << channel)
        }
    }

    /// Check whether a channel is selected
    #[must_use]
    pub const fn contains(self, channel: u8) -> bool {
        channel <= 26 && self.0 & (1 << channel) != 0
    }

    /// Number of selected channels
    #[must_use]
    pub const fn count(self) -> u32 {
        self.0.count_ones()
    }

    /// Check for an empty mask
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Mask restricted to channels the 2.4 GHz PHY supports
    #[must_use]
    pub const fn supported(self) -> Self {
        Self(self.0 & Self::ALL_2_4GHZ.0)
    }

    /// Iterate over the selected channels in ascending order
    pub fn channels(self) -> impl Iterator<Item = u8> {
        (0u8..=26).filter(move |&ch| self.contains(ch))
    }
}

/// ZigBee device role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DeviceType {
    /// ZigBee coordinator (forms the network, address 0x0000)
    Coordinator = 0,
    /// ZigBee router (relays, may accept children)
    Router = 1,
    /// ZigBee end device (sleepy or rx-on, never relays)
    EndDevice = 2,
}

impl DeviceType {
    /// Check if the device participates in routing
    #[must_use]
    pub const fn is_router_capable(self) -> bool {
        matches!(self, Self::Coordinator | Self::Router)
    }

    /// Parse from the 2-bit wire encoding
    #[must_use]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Coordinator),
            1 => Some(Self::Router),
            2 => Some(Self::EndDevice),
            _ => None,
        }
    }
}

/// MAC capability information field (IEEE 802.15.4 7.3.1.2)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CapabilityInfo(pub u8);

impl CapabilityInfo {
    /// Alternate PAN coordinator
    pub const ALTERNATE_PAN_COORDINATOR: u8 = 0x01;
    /// Full function device (router capable)
    pub const DEVICE_TYPE_FFD: u8 = 0x02;
    /// Mains powered
    pub const POWER_SOURCE: u8 = 0x04;
    /// Receiver on when idle
    pub const RX_ON_WHEN_IDLE: u8 = 0x08;
    /// Device can secure MAC frames
    pub const SECURITY: u8 = 0x40;
    /// Ask the parent to allocate a short address
    pub const ALLOCATE_ADDRESS: u8 = 0x80;

    /// Capability of a router
    #[must_use]
    pub const fn router() -> Self {
        Self(Self::DEVICE_TYPE_FFD | Self::POWER_SOURCE | Self::RX_ON_WHEN_IDLE | Self::ALLOCATE_ADDRESS)
    }

    /// Capability of a sleepy end device
    #[must_use]
    pub const fn sleepy_end_device() -> Self {
        Self(Self::ALLOCATE_ADDRESS)
    }

    /// Capability of an rx-on-when-idle end device
    #[must_use]
    pub const fn rx_on_end_device() -> Self {
        Self(Self::RX_ON_WHEN_IDLE | Self::ALLOCATE_ADDRESS)
    }

    /// Check if the joining device is router capable
    #[must_use]
    pub const fn is_router(self) -> bool {
        self.0 & Self::DEVICE_TYPE_FFD != 0
    }

    /// Check if the device keeps its receiver on
    #[must_use]
    pub const fn rx_on_when_idle(self) -> bool {
        self.0 & Self::RX_ON_WHEN_IDLE != 0
    }
}

/// Neighbor relationship (ZigBee NIB neighbor table encoding)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Relationship {
    /// Neighbor is our parent
    Parent = 0,
    /// Neighbor is our child
    Child = 1,
    /// Neighbor is a sibling
    Sibling = 2,
    /// No relationship
    None = 3,
    /// Neighbor was a child and left
    PreviousChild = 4,
    /// Child joined but has not authenticated yet
    UnauthenticatedChild = 5,
}

impl Relationship {
    /// Parse from the wire/persistence encoding
    #[must_use]
    pub const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Parent,
            1 => Self::Child,
            2 => Self::Sibling,
            4 => Self::PreviousChild,
            5 => Self::UnauthenticatedChild,
            _ => Self::None,
        }
    }

    /// Check if the neighbor is a (possibly unauthenticated) child
    #[must_use]
    pub const fn is_child(self) -> bool {
        matches!(self, Self::Child | Self::UnauthenticatedChild)
    }
}

/// 128-bit network key
///
/// Zeroized on drop. The NWK engine never runs the cipher itself; it only
/// selects which key the security provider should use.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct NetworkKey([u8; 16]);

impl NetworkKey {
    /// Key size in bytes
    pub const SIZE: usize = 16;

    /// Create from raw bytes
    #[must_use]
    pub const fn new(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Access the key bytes
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl fmt::Debug for NetworkKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("NetworkKey([REDACTED])")
    }
}

impl PartialEq for NetworkKey {
    fn eq(&self, other: &Self) -> bool {
        // Constant-time comparison
        let mut diff = 0u8;
        for (a, b) in self.0.iter().zip(other.0.iter()) {
            diff |= a ^ b;
        }
        diff == 0
    }
}

impl Eq for NetworkKey {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_broadcast_range() {
        assert!(ShortAddr::ALL_DEVICES.is_broadcast());
        assert!(ShortAddr::ALL_ROUTERS.is_broadcast());
        assert!(ShortAddr(0xFFF8).is_broadcast());
        assert!(!ShortAddr(0xFFF7).is_broadcast());
        assert!(ShortAddr::COORDINATOR.is_unicast());
    }

    #[test]
    fn test_channel_mask_iter() {
        let mask = ChannelMask((1 << 11) | (1 << 15) | (1 << 26));
        let mut it = mask.channels();
        assert_eq!(it.next(), Some(11));
        assert_eq!(it.next(), Some(15));
        assert_eq!(it.next(), Some(26));
        assert_eq!(it.next(), None);
        assert_eq!(mask.count(), 3);
    }

    #[test]
    fn test_channel_mask_supported() {
        let mask = ChannelMask(0xFFFF_FFFF).supported();
        assert_eq!(mask, ChannelMask::ALL_2_4GHZ);
        assert!(!mask.contains(10));
    }

    #[test]
    fn test_capability_info() {
        assert!(CapabilityInfo::router().is_router());
        assert!(CapabilityInfo::router().rx_on_when_idle());
        assert!(!CapabilityInfo::sleepy_end_device().is_router());
        assert!(!CapabilityInfo::sleepy_end_device().rx_on_when_idle());
    }

    #[test]
    fn test_network_key_debug_redacted() {
        let key = NetworkKey::new([0xAB; 16]);
        let dbg = std::format!("{:?}", key);
        assert!(!dbg.contains("AB"));
        assert!(!dbg.contains("171"));
    }

    #[test]
    fn test_network_key_zeroize() {
        let mut key = NetworkKey::new([0x55; 16]);
        key.zeroize();
        assert_eq!(key.as_bytes(), &[0u8; 16]);
    }
}
