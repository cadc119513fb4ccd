// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! NWK and MAC status codes
//!
//! [`NwkStatus`] is the status byte carried by every NLME/NLDE confirm and
//! indication. Values are the ZigBee PRO assignments; MAC failures that have
//! no NWK equivalent are passed through unchanged.

use core::fmt;
use q_common::Error;

/// IEEE 802.15.4 MAC status byte
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MacStatus(pub u8);

impl MacStatus {
    /// Operation completed
    pub const SUCCESS: Self = Self(0x00);
    /// PAN at capacity (association status)
    pub const PAN_AT_CAPACITY: Self = Self(0x01);
    /// PAN access denied (association status)
    pub const PAN_ACCESS_DENIED: Self = Self(0x02);
    /// Channel busy, CSMA-CA failed
    pub const CHANNEL_ACCESS_FAILURE: Self = Self(0xE1);
    /// Invalid parameter in a MAC request
    pub const INVALID_PARAMETER: Self = Self(0xE8);
    /// No acknowledgment received
    pub const NO_ACK: Self = Self(0xE9);
    /// No beacon heard during a scan
    pub const NO_BEACON: Self = Self(0xEA);
    /// Poll returned no data
    pub const NO_DATA: Self = Self(0xEB);
    /// Indirect transaction expired
    pub const TRANSACTION_EXPIRED: Self = Self(0xF0);
    /// Indirect queue full
    pub const TRANSACTION_OVERFLOW: Self = Self(0xF1);
    /// Unsupported PIB attribute
    pub const UNSUPPORTED_ATTRIBUTE: Self = Self(0xF4);

    /// Check for success
    #[must_use]
    pub const fn is_success(self) -> bool {
        self.0 == Self::SUCCESS.0
    }
}

impl fmt::Debug for MacStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MacStatus(0x{:02X})", self.0)
    }
}

/// NWK layer status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NwkStatus {
    /// Request executed successfully
    Success,
    /// Invalid argument
    InvalidParameter,
    /// Request cannot be executed in the current role or state
    InvalidRequest,
    /// Request not permitted
    NotPermitted,
    /// Network could not be started
    StartupFailure,
    /// Device already present
    AlreadyPresent,
    /// Synchronization with the parent failed
    SyncFailure,
    /// No room in the neighbor table
    NeighborTableFull,
    /// Device unknown
    UnknownDevice,
    /// Unsupported attribute
    UnsupportedAttribute,
    /// No network found
    NoNetworks,
    /// Outgoing frame counter exhausted
    MaxFrmCounter,
    /// No key for the frame
    NoKey,
    /// Security processing failed
    BadCcmOutput,
    /// Route discovery failed
    RouteDiscoveryFailed,
    /// Routing failed after the frame was accepted
    RouteError,
    /// Broadcast transaction table full
    BtTableFull,
    /// No buffer available for the frame
    FrameNotBuffered,
    /// Lower-layer status passed through
    Mac(MacStatus),
}

impl NwkStatus {
    /// ZigBee wire value
    #[must_use]
    pub const fn code(&self) -> u8 {
        match self {
            Self::Success => 0x00,
            Self::InvalidParameter => 0xC1,
            Self::InvalidRequest => 0xC2,
            Self::NotPermitted => 0xC3,
            Self::StartupFailure => 0xC4,
            Self::AlreadyPresent => 0xC5,
            Self::SyncFailure => 0xC6,
            Self::NeighborTableFull => 0xC7,
            Self::UnknownDevice => 0xC8,
            Self::UnsupportedAttribute => 0xC9,
            Self::NoNetworks => 0xCA,
            Self::MaxFrmCounter => 0xCC,
            Self::NoKey => 0xCD,
            Self::BadCcmOutput => 0xCE,
            Self::RouteDiscoveryFailed => 0xD0,
            Self::RouteError => 0xD1,
            Self::BtTableFull => 0xD2,
            Self::FrameNotBuffered => 0xD3,
            Self::Mac(status) => status.0,
        }
    }

    /// Decode a wire value
    #[must_use]
    pub const fn from_code(code: u8) -> Self {
        match code {
            0x00 => Self::Success,
            0xC1 => Self::InvalidParameter,
            0xC2 => Self::InvalidRequest,
            0xC3 => Self::NotPermitted,
            0xC4 => Self::StartupFailure,
            0xC5 => Self::AlreadyPresent,
            0xC6 => Self::SyncFailure,
            0xC7 => Self::NeighborTableFull,
            0xC8 => Self::UnknownDevice,
            0xC9 => Self::UnsupportedAttribute,
            0xCA => Self::NoNetworks,
            0xCC => Self::MaxFrmCounter,
            0xCD => Self::NoKey,
            0xCE => Self::BadCcmOutput,
            0xD0 => Self::RouteDiscoveryFailed,
            0xD1 => Self::RouteError,
            0xD2 => Self::BtTableFull,
            0xD3 => Self::FrameNotBuffered,
            other => Self::Mac(MacStatus(other)),
        }
    }

    /// Check for success
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

impl From<MacStatus> for NwkStatus {
    fn from(status: MacStatus) -> Self {
        if status.is_success() {
            Self::Success
        } else {
            Self::Mac(status)
        }
    }
}

impl From<Error> for NwkStatus {
    fn from(e: Error) -> Self {
        match e {
            Error::InvalidParameter
            | Error::BufferTooSmall
            | Error::FrameTooLong
            | Error::FrameTooShort
            | Error::UnknownFrameType
            | Error::UnsupportedProtocolVersion
            | Error::UnknownCommand
            | Error::ReservedAddress => Self::InvalidParameter,
            Error::NotPermitted => Self::NotPermitted,
            Error::NeighborTableFull | Error::AddressMapFull | Error::AddressSpaceExhausted => {
                Self::NeighborTableFull
            }
            Error::AddressConflict => Self::AlreadyPresent,
            Error::NotFound => Self::UnknownDevice,
            Error::MaxFrameCounter => Self::MaxFrmCounter,
            Error::NoKey => Self::NoKey,
            Error::SecurityFailure => Self::BadCcmOutput,
            Error::RouteDiscoveryFailed | Error::DiscoveryTableFull => Self::RouteDiscoveryFailed,
            Error::NoRouteAvailable
            | Error::RouteError
            | Error::RadiusExhausted
            | Error::RoutingTableFull
            | Error::NoRoutingCapacity => Self::RouteError,
            Error::BroadcastTableFull => Self::BtTableFull,
            Error::PacketPoolExhausted | Error::PoolExhausted => Self::FrameNotBuffered,
            Error::Timeout => Self::Mac(MacStatus::TRANSACTION_EXPIRED),
            _ => Self::InvalidRequest,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_roundtrip() {
        for status in [
            NwkStatus::Success,
            NwkStatus::InvalidRequest,
            NwkStatus::NoNetworks,
            NwkStatus::RouteDiscoveryFailed,
            NwkStatus::FrameNotBuffered,
            NwkStatus::Mac(MacStatus::NO_ACK),
        ] {
            assert_eq!(NwkStatus::from_code(status.code()), status);
        }
    }

    #[test]
    fn test_mac_pass_through() {
        assert_eq!(NwkStatus::from(MacStatus::SUCCESS), NwkStatus::Success);
        assert_eq!(NwkStatus::from(MacStatus::NO_BEACON).code(), 0xEA);
    }

    #[test]
    fn test_error_mapping() {
        assert_eq!(NwkStatus::from(Error::RoutingTableFull), NwkStatus::RouteError);
        assert_eq!(NwkStatus::from(Error::AddressSpaceExhausted), NwkStatus::NeighborTableFull);
        assert_eq!(NwkStatus::from(Error::MaxFrameCounter), NwkStatus::MaxFrmCounter);
        assert_eq!(NwkStatus::from(Error::InvalidState), NwkStatus::InvalidRequest);
    }
}
