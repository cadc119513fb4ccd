// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Error types for the Qbitel ZigBee NWK stack
//!
//! This module defines the unified error type used by every crate in the
//! stack. Errors are `Copy`, carry no heap data, and map onto a stable
//! numeric code so they can be reported over a debug link.
//!
//! Errors describe *why* the engine refused or aborted something. What the
//! upper layer sees in a confirm is the ZigBee status byte derived from the
//! error (see `q_nwk::NwkStatus`).

use core::fmt;

/// Result type alias for NWK stack operations
pub type Result<T> = core::result::Result<T, Error>;

/// Unified error type for the NWK stack
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    // =========================================================================
    // Queue / Scheduler Errors (0x01xx)
    // =========================================================================
    /// Element is already a member of a queue
    AlreadyQueued,
    /// Element is not a member of the queue
    NotQueued,
    /// No free slot in a request pool
    PoolExhausted,
    /// Task identifier outside the scheduler's bitmask
    InvalidTask,
    /// No free application timer
    TimerExhausted,

    // =========================================================================
    // Frame Codec Errors (0x02xx)
    // =========================================================================
    /// Frame is shorter than its header claims
    FrameTooShort,
    /// Frame type is reserved or unknown
    UnknownFrameType,
    /// NWK protocol version does not match ours
    UnsupportedProtocolVersion,
    /// Command identifier is reserved or unknown
    UnknownCommand,
    /// Buffer is too small to hold the encoded frame
    BufferTooSmall,
    /// Payload exceeds the maximum NSDU length
    FrameTooLong,

    // =========================================================================
    // Table Errors (0x03xx)
    // =========================================================================
    /// Neighbor table has no free entry
    NeighborTableFull,
    /// Routing table has no free entry
    RoutingTableFull,
    /// Route discovery table has no free entry
    DiscoveryTableFull,
    /// Address map has no free entry
    AddressMapFull,
    /// Broadcast transaction table has no free entry
    BroadcastTableFull,
    /// Outgoing packet pool is exhausted
    PacketPoolExhausted,

    // =========================================================================
    // Addressing Errors (0x04xx)
    // =========================================================================
    /// No address left in the block assigned to this parent
    AddressSpaceExhausted,
    /// Address is reserved and cannot be assigned
    ReservedAddress,
    /// Two devices share a short address
    AddressConflict,

    // =========================================================================
    // Security Errors (0x05xx)
    // =========================================================================
    /// Outgoing frame counter reached its maximum
    MaxFrameCounter,
    /// No key material available for the requested key sequence
    NoKey,
    /// Encryption or decryption produced an invalid result
    SecurityFailure,

    // =========================================================================
    // Routing Errors (0x06xx)
    // =========================================================================
    /// No route to the destination and discovery is not permitted
    NoRouteAvailable,
    /// Route discovery timed out without a reply
    RouteDiscoveryFailed,
    /// Next hop failed to acknowledge a relayed frame
    RouteError,
    /// Radius reached zero before delivery
    RadiusExhausted,
    /// Device has no capacity to route for others
    NoRoutingCapacity,

    // =========================================================================
    // General Errors (0xFFxx)
    // =========================================================================
    /// Invalid parameter provided by the caller
    InvalidParameter,
    /// Request is invalid for the current device role or network state
    InvalidRequest,
    /// Operation not permitted in the current configuration
    NotPermitted,
    /// Invalid state for the operation
    InvalidState,
    /// Requested item not found
    NotFound,
    /// No response within the protocol window
    Timeout,
    /// Resource is busy
    Busy,
    /// Internal error (should not occur)
    InternalError,
}

impl Error {
    /// Get the error code for this error
    ///
    /// Error codes are organized by category:
    /// - 0x01xx: Queue and scheduler errors
    /// - 0x02xx: Frame codec errors
    /// - 0x03xx: Table errors
    /// - 0x04xx: Addressing errors
    /// - 0x05xx: Security errors
    /// - 0x06xx: Routing errors
    /// - 0xFFxx: General errors
    #[must_use]
    pub const fn code(&self) -> u16 {
        match self {
            Self::AlreadyQueued => 0x0101,
            Self::NotQueued => 0x0102,
            Self::PoolExhausted => 0x0103,
            Self::InvalidTask => 0x0104,
            Self::TimerExhausted => 0x0105,

            Self::FrameTooShort => 0x0201,
            Self::UnknownFrameType => 0x0202,
            Self::UnsupportedProtocolVersion => 0x0203,
            Self::UnknownCommand => 0x0204,
            Self::BufferTooSmall => 0x0205,
            Self::FrameTooLong => 0x0206,

            Self::NeighborTableFull => 0x0301,
            Self::RoutingTableFull => 0x0302,
            Self::DiscoveryTableFull => 0x0303,
            Self::AddressMapFull => 0x0304,
            Self::BroadcastTableFull => 0x0305,
            Self::PacketPoolExhausted => 0x0306,

            Self::AddressSpaceExhausted => 0x0401,
            Self::ReservedAddress => 0x0402,
            Self::AddressConflict => 0x0403,

            Self::MaxFrameCounter => 0x0501,
            Self::NoKey => 0x0502,
            Self::SecurityFailure => 0x0503,

            Self::NoRouteAvailable => 0x0601,
            Self::RouteDiscoveryFailed => 0x0602,
            Self::RouteError => 0x0603,
            Self::RadiusExhausted => 0x0604,
            Self::NoRoutingCapacity => 0x0605,

            Self::InvalidParameter => 0xFF01,
            Self::InvalidRequest => 0xFF02,
            Self::NotPermitted => 0xFF03,
            Self::InvalidState => 0xFF04,
            Self::NotFound => 0xFF05,
            Self::Timeout => 0xFF06,
            Self::Busy => 0xFF07,
            Self::InternalError => 0xFFFF,
        }
    }

    /// Check if this error means a fixed-size table or pool ran out of slots
    #[must_use]
    pub const fn is_capacity_error(&self) -> bool {
        matches!(
            self,
            Self::PoolExhausted
                | Self::TimerExhausted
                | Self::NeighborTableFull
                | Self::RoutingTableFull
                | Self::DiscoveryTableFull
                | Self::AddressMapFull
                | Self::BroadcastTableFull
                | Self::PacketPoolExhausted
                | Self::AddressSpaceExhausted
        )
    }

    /// Check if this error was raised by the security hook
    #[must_use]
    pub const fn is_security_error(&self) -> bool {
        matches!(self, Self::MaxFrameCounter | Self::NoKey | Self::SecurityFailure)
    }

    /// Get a short description of the error
    #[must_use]
    pub const fn description(&self) -> &'static str {
        match self {
            Self::AlreadyQueued => "element already queued",
            Self::NotQueued => "element not queued",
            Self::PoolExhausted => "request pool exhausted",
            Self::InvalidTask => "invalid task id",
            Self::TimerExhausted => "no free timer",
            Self::FrameTooShort => "frame too short",
            Self::UnknownFrameType => "unknown frame type",
            Self::UnsupportedProtocolVersion => "unsupported protocol version",
            Self::UnknownCommand => "unknown command",
            Self::BufferTooSmall => "buffer too small",
            Self::FrameTooLong => "frame too long",
            Self::NeighborTableFull => "neighbor table full",
            Self::RoutingTableFull => "routing table full",
            Self::DiscoveryTableFull => "route discovery table full",
            Self::AddressMapFull => "address map full",
            Self::BroadcastTableFull => "broadcast table full",
            Self::PacketPoolExhausted => "packet pool exhausted",
            Self::AddressSpaceExhausted => "address space exhausted",
            Self::ReservedAddress => "reserved address",
            Self::AddressConflict => "address conflict",
            Self::MaxFrameCounter => "max frame counter",
            Self::NoKey => "no key",
            Self::SecurityFailure => "security failure",
            Self::NoRouteAvailable => "no route available",
            Self::RouteDiscoveryFailed => "route discovery failed",
            Self::RouteError => "route error",
            Self::RadiusExhausted => "radius exhausted",
            Self::NoRoutingCapacity => "no routing capacity",
            Self::InvalidParameter => "invalid parameter",
            Self::InvalidRequest => "invalid request",
            Self::NotPermitted => "not permitted",
            Self::InvalidState => "invalid state",
            Self::NotFound => "not found",
            Self::Timeout => "timeout",
            Self::Busy => "busy",
            Self::InternalError => "internal error",
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[0x{:04X}] {}", self.code(), self.description())
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Error {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "[0x{:04X}] {}", self.code(), self.description());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_categorized() {
        assert_eq!(Error::AlreadyQueued.code() >> 8, 0x01);
        assert_eq!(Error::FrameTooShort.code() >> 8, 0x02);
        assert_eq!(Error::RoutingTableFull.code() >> 8, 0x03);
        assert_eq!(Error::AddressSpaceExhausted.code() >> 8, 0x04);
        assert_eq!(Error::MaxFrameCounter.code() >> 8, 0x05);
        assert_eq!(Error::NoRouteAvailable.code() >> 8, 0x06);
        assert_eq!(Error::InvalidParameter.code() >> 8, 0xFF);
    }

    #[test]
    fn test_capacity_errors() {
        assert!(Error::DiscoveryTableFull.is_capacity_error());
        assert!(Error::AddressSpaceExhausted.is_capacity_error());
        assert!(!Error::Timeout.is_capacity_error());
    }

    #[test]
    fn test_security_errors() {
        assert!(Error::MaxFrameCounter.is_security_error());
        assert!(!Error::RouteError.is_security_error());
    }
}
