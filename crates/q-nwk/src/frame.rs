// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! NWK frame header codec
//!
//! Wire layout (all multi-byte fields little-endian):
//!
//! ```text
//! | FC (2) | dst (2) | src (2) | radius (1) | seq (1) |
//! | [dst IEEE (8)] | [src IEEE (8)] | [multicast ctrl (1)] | [source route] |
//! ```
//!
//! Frame control bits: 0-1 frame type, 2-5 protocol version, 6-7 discover
//! route, 8 multicast, 9 security, 10 source route, 11 destination IEEE,
//! 12 source IEEE, 13 end device initiator.

use heapless::Vec;
use q_common::constants::{MAX_MSDU_SIZE, MAX_SOURCE_ROUTE_RELAYS, NWK_PROTOCOL_VERSION};
use q_common::{Error, ExtAddr, Result, ShortAddr};

/// Buffer holding one complete NWK frame
pub type FrameBuf = Vec<u8, MAX_MSDU_SIZE>;

/// Offset of the radius byte in every NWK frame
pub const RADIUS_OFFSET: usize = 6;

/// Offset of the sequence number byte in every NWK frame
pub const SEQUENCE_OFFSET: usize = 7;

/// Length of the fixed part of the header
pub const FIXED_HEADER_LEN: usize = 8;

/// Frame control bit masks
pub mod fc {
    /// Frame type field
    pub const FRAME_TYPE_MASK: u16 = 0x0003;
    /// Protocol version field
    pub const VERSION_MASK: u16 = 0x003C;
    /// Protocol version shift
    pub const VERSION_SHIFT: u16 = 2;
    /// Discover route field
    pub const DISCOVER_ROUTE_MASK: u16 = 0x00C0;
    /// Discover route shift
    pub const DISCOVER_ROUTE_SHIFT: u16 = 6;
    /// Multicast flag
    pub const MULTICAST: u16 = 1 << 8;
    /// Security flag
    pub const SECURITY: u16 = 1 << 9;
    /// Source route subframe present
    pub const SOURCE_ROUTE: u16 = 1 << 10;
    /// Destination IEEE address present
    pub const DST_IEEE: u16 = 1 << 11;
    /// Source IEEE address present
    pub const SRC_IEEE: u16 = 1 << 12;
    /// Sent by an end device to its parent
    pub const END_DEVICE_INITIATOR: u16 = 1 << 13;
}

/// NWK frame type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FrameType {
    /// Data frame
    Data = 0,
    /// NWK command frame
    Command = 1,
}

impl FrameType {
    /// Parse from the 2-bit field
    ///
    /// # Errors
    /// `UnknownFrameType` for reserved and inter-PAN frame types.
    pub const fn from_bits(bits: u16) -> Result<Self> {
        match bits {
            0 => Ok(Self::Data),
            1 => Ok(Self::Command),
            _ => Err(Error::UnknownFrameType),
        }
    }
}

/// Multicast mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MulticastMode {
    /// Sender is not a member of the group
    NonMember = 0,
    /// Sender is a member of the group
    Member = 1,
}

/// Multicast control field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MulticastControl {
    /// Multicast mode
    pub mode: MulticastMode,
    /// Remaining non-member radius (3 bits)
    pub non_member_radius: u8,
    /// Maximum non-member radius (3 bits)
    pub max_non_member_radius: u8,
}

impl MulticastControl {
    /// Member-mode control with the default non-member radius
    #[must_use]
    pub const fn member() -> Self {
        Self {
            mode: MulticastMode::Member,
            non_member_radius: 7,
            max_non_member_radius: 7,
        }
    }

    /// Encode to one byte
    #[must_use]
    pub const fn to_byte(&self) -> u8 {
        (self.mode as u8 & 0x03)
            | ((self.non_member_radius & 0x07) << 2)
            | ((self.max_non_member_radius & 0x07) << 5)
    }

    /// Decode from one byte
    #[must_use]
    pub const fn from_byte(byte: u8) -> Self {
        Self {
            mode: if byte & 0x03 == 1 {
                MulticastMode::Member
            } else {
                MulticastMode::NonMember
            },
            non_member_radius: (byte >> 2) & 0x07,
            max_non_member_radius: (byte >> 5) & 0x07,
        }
    }
}

/// Source route subframe
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct SourceRoute {
    /// Index of the next relay to use
    pub index: u8,
    /// Relay list
    pub relays: Vec<ShortAddr, MAX_SOURCE_ROUTE_RELAYS>,
}

/// Parsed NWK header
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NwkHeader {
    /// Frame type
    pub frame_type: FrameType,
    /// Route discovery permitted for this frame
    pub discover_route: bool,
    /// Frame is NWK secured
    pub security: bool,
    /// Sent by an end device to its parent
    pub end_device_initiator: bool,
    /// Final destination
    pub dst: ShortAddr,
    /// Originator
    pub src: ShortAddr,
    /// Remaining hop budget
    pub radius: u8,
    /// Originator sequence number
    pub sequence: u8,
    /// Destination IEEE address
    pub dst_ext: Option<ExtAddr>,
    /// Source IEEE address
    pub src_ext: Option<ExtAddr>,
    /// Multicast control (multicast frames only)
    pub multicast: Option<MulticastControl>,
    /// Source route subframe
    pub source_route: Option<SourceRoute>,
}

impl NwkHeader {
    /// Plain data header
    #[must_use]
    pub const fn data(dst: ShortAddr, src: ShortAddr, radius: u8, sequence: u8) -> Self {
        Self {
            frame_type: FrameType::Data,
            discover_route: true,
            security: false,
            end_device_initiator: false,
            dst,
            src,
            radius,
            sequence,
            dst_ext: None,
            src_ext: None,
            multicast: None,
            source_route: None,
        }
    }

    /// Plain command header (route discovery suppressed)
    #[must_use]
    pub const fn command(dst: ShortAddr, src: ShortAddr, radius: u8, sequence: u8) -> Self {
        let mut header = Self::data(dst, src, radius, sequence);
        header.frame_type = FrameType::Command;
        header.discover_route = false;
        header
    }

    /// Frame control word
    #[must_use]
    pub fn frame_control(&self) -> u16 {
        let mut word = (self.frame_type as u16) & fc::FRAME_TYPE_MASK;
        word |= (u16::from(NWK_PROTOCOL_VERSION) << fc::VERSION_SHIFT) & fc::VERSION_MASK;
        if self.discover_route {
            word |= 1 << fc::DISCOVER_ROUTE_SHIFT;
        }
        if self.multicast.is_some() {
            word |= fc::MULTICAST;
        }
        if self.security {
            word |= fc::SECURITY;
        }
        if self.source_route.is_some() {
            word |= fc::SOURCE_ROUTE;
        }
        if self.dst_ext.is_some() {
            word |= fc::DST_IEEE;
        }
        if self.src_ext.is_some() {
            word |= fc::SRC_IEEE;
        }
        if self.end_device_initiator {
            word |= fc::END_DEVICE_INITIATOR;
        }
        word
    }

    /// Encoded size in bytes
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        let mut len = FIXED_HEADER_LEN;
        if self.dst_ext.is_some() {
            len += 8;
        }
        if self.src_ext.is_some() {
            len += 8;
        }
        if self.multicast.is_some() {
            len += 1;
        }
        if let Some(route) = &self.source_route {
            len += 2 + 2 * route.relays.len();
        }
        len
    }

    /// Append the encoded header to `out`
    ///
    /// # Errors
    /// `FrameTooLong` if `out` cannot hold the header.
    pub fn encode(&self, out: &mut FrameBuf) -> Result<()> {
        let too_long = |_| Error::FrameTooLong;
        out.extend_from_slice(&self.frame_control().to_le_bytes())
            .map_err(too_long)?;
        out.extend_from_slice(&self.dst.to_le_bytes()).map_err(too_long)?;
        out.extend_from_slice(&self.src.to_le_bytes()).map_err(too_long)?;
        out.push(self.radius).map_err(|_| Error::FrameTooLong)?;
        out.push(self.sequence).map_err(|_| Error::FrameTooLong)?;
        if let Some(ext) = self.dst_ext {
            out.extend_from_slice(&ext.to_le_bytes()).map_err(too_long)?;
        }
        if let Some(ext) = self.src_ext {
            out.extend_from_slice(&ext.to_le_bytes()).map_err(too_long)?;
        }
        if let Some(control) = self.multicast {
            out.push(control.to_byte()).map_err(|_| Error::FrameTooLong)?;
        }
        if let Some(route) = &self.source_route {
            // Relay count fits: bounded by MAX_SOURCE_ROUTE_RELAYS
            out.push(route.relays.len() as u8)
                .map_err(|_| Error::FrameTooLong)?;
            out.push(route.index).map_err(|_| Error::FrameTooLong)?;
            for relay in &route.relays {
                out.extend_from_slice(&relay.to_le_bytes()).map_err(too_long)?;
            }
        }
        Ok(())
    }

    /// Parse a header, returning it and its encoded length
    ///
    /// # Errors
    /// `FrameTooShort` on truncation, `UnsupportedProtocolVersion` or
    /// `UnknownFrameType` on bad frame control values.
    pub fn decode(bytes: &[u8]) -> Result<(Self, usize)> {
        if bytes.len() < FIXED_HEADER_LEN {
            return Err(Error::FrameTooShort);
        }
        let word = u16::from_le_bytes([bytes[0], bytes[1]]);
        let version = (word & fc::VERSION_MASK) >> fc::VERSION_SHIFT;
        if version != u16::from(NWK_PROTOCOL_VERSION) {
            return Err(Error::UnsupportedProtocolVersion);
        }
        let frame_type = FrameType::from_bits(word & fc::FRAME_TYPE_MASK)?;

        let mut header = Self {
            frame_type,
            discover_route: (word & fc::DISCOVER_ROUTE_MASK) >> fc::DISCOVER_ROUTE_SHIFT == 1,
            security: word & fc::SECURITY != 0,
            end_device_initiator: word & fc::END_DEVICE_INITIATOR != 0,
            dst: ShortAddr::from_le_bytes([bytes[2], bytes[3]]),
            src: ShortAddr::from_le_bytes([bytes[4], bytes[5]]),
            radius: bytes[RADIUS_OFFSET],
            sequence: bytes[SEQUENCE_OFFSET],
            dst_ext: None,
            src_ext: None,
            multicast: None,
            source_route: None,
        };

        let mut offset = FIXED_HEADER_LEN;
        if word & fc::DST_IEEE != 0 {
            header.dst_ext = Some(read_ext(bytes, offset)?);
            offset += 8;
        }
        if word & fc::SRC_IEEE != 0 {
            header.src_ext = Some(read_ext(bytes, offset)?);
            offset += 8;
        }
        if word & fc::MULTICAST != 0 {
            let byte = *bytes.get(offset).ok_or(Error::FrameTooShort)?;
            header.multicast = Some(MulticastControl::from_byte(byte));
            offset += 1;
        }
        if word & fc::SOURCE_ROUTE != 0 {
            let count = usize::from(*bytes.get(offset).ok_or(Error::FrameTooShort)?);
            let index = *bytes.get(offset + 1).ok_or(Error::FrameTooShort)?;
            offset += 2;
            if count > MAX_SOURCE_ROUTE_RELAYS {
                return Err(Error::FrameTooLong);
            }
            let mut route = SourceRoute {
                index,
                relays: Vec::new(),
            };
            for _ in 0..count {
                let lo = *bytes.get(offset).ok_or(Error::FrameTooShort)?;
                let hi = *bytes.get(offset + 1).ok_or(Error::FrameTooShort)?;
                route
                    .relays
                    .push(ShortAddr::from_le_bytes([lo, hi]))
                    .map_err(|_| Error::FrameTooLong)?;
                offset += 2;
            }
            header.source_route = Some(route);
        }

        Ok((header, offset))
    }
}

fn read_ext(bytes: &[u8], offset: usize) -> Result<ExtAddr> {
    let slice = bytes.get(offset..offset + 8).ok_or(Error::FrameTooShort)?;
    let mut raw = [0u8; 8];
    raw.copy_from_slice(slice);
    Ok(ExtAddr::from_le_bytes(raw))
}

/// Build a complete frame from a header and payload
///
/// # Errors
/// `FrameTooLong` if the frame exceeds the maximum MSDU.
pub fn build_frame(header: &NwkHeader, payload: &[u8]) -> Result<FrameBuf> {
    let mut frame = FrameBuf::new();
    header.encode(&mut frame)?;
    frame
        .extend_from_slice(payload)
        .map_err(|()| Error::FrameTooLong)?;
    Ok(frame)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_data_header() {
        let header = NwkHeader::data(ShortAddr(0x1234), ShortAddr(0x0000), 10, 0x55);
        let frame = build_frame(&header, &[0xAA, 0xBB]).unwrap();
        // FC: data, version 2, discover route enable
        assert_eq!(&frame[..2], &[0x48, 0x00]);
        assert_eq!(&frame[2..4], &[0x34, 0x12]);
        assert_eq!(frame[RADIUS_OFFSET], 10);
        assert_eq!(frame[SEQUENCE_OFFSET], 0x55);
        let (parsed, len) = NwkHeader::decode(&frame).unwrap();
        assert_eq!(len, FIXED_HEADER_LEN);
        assert_eq!(parsed, header);
        assert_eq!(&frame[len..], &[0xAA, 0xBB]);
    }

    #[test]
    fn test_optional_fields() {
        let mut header = NwkHeader::command(ShortAddr(0x0001), ShortAddr(0x0796), 1, 3);
        header.src_ext = Some(ExtAddr(0x0011_2233_4455_6677));
        header.dst_ext = Some(ExtAddr(0x8899_AABB_CCDD_EEFF));
        header.multicast = Some(MulticastControl::member());
        let mut relays = Vec::new();
        relays.push(ShortAddr(0x0002)).unwrap();
        relays.push(ShortAddr(0x0003)).unwrap();
        header.source_route = Some(SourceRoute { index: 1, relays });
        let frame = build_frame(&header, &[]).unwrap();
        assert_eq!(frame.len(), header.encoded_len());
        let word = u16::from_le_bytes([frame[0], frame[1]]);
        assert_ne!(word & fc::SRC_IEEE, 0);
        assert_ne!(word & fc::SOURCE_ROUTE, 0);
        // dst IEEE precedes src IEEE
        assert_eq!(frame[8], 0xFF);
        assert_eq!(frame[16], 0x77);
        let (parsed, _) = NwkHeader::decode(&frame).unwrap();
        assert_eq!(parsed, header);
    }

    #[test]
    fn test_bad_version() {
        let mut frame = build_frame(&NwkHeader::data(ShortAddr(1), ShortAddr(2), 1, 1), &[]).unwrap();
        frame[0] = (frame[0] & !0x3C) | (3 << 2);
        assert_eq!(NwkHeader::decode(&frame), Err(Error::UnsupportedProtocolVersion));
    }

    #[test]
    fn test_inter_pan_rejected() {
        let mut frame = build_frame(&NwkHeader::data(ShortAddr(1), ShortAddr(2), 1, 1), &[]).unwrap();
        frame[0] |= 0x03;
        assert_eq!(NwkHeader::decode(&frame), Err(Error::UnknownFrameType));
    }

    #[test]
    fn test_truncated() {
        let header = NwkHeader {
            src_ext: Some(ExtAddr(1)),
            ..NwkHeader::data(ShortAddr(1), ShortAddr(2), 1, 1)
        };
        let frame = build_frame(&header, &[]).unwrap();
        assert_eq!(NwkHeader::decode(&frame[..12]), Err(Error::FrameTooShort));
        assert_eq!(NwkHeader::decode(&frame[..5]), Err(Error::FrameTooShort));
    }

    #[test]
    fn test_multicast_control_byte() {
        let control = MulticastControl {
            mode: MulticastMode::NonMember,
            non_member_radius: 3,
            max_non_member_radius: 5,
        };
        assert_eq!(MulticastControl::from_byte(control.to_byte()), control);
    }
}
