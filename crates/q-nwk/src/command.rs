// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! NWK command frames
//!
//! Payload codecs for the ZigBee PRO NWK commands. The first payload byte is
//! always the command identifier.

use heapless::Vec;
use q_common::constants::{MAX_SOURCE_ROUTE_RELAYS, NEIGHBOR_TABLE_SIZE};
use q_common::{CapabilityInfo, Error, ExtAddr, Result, ShortAddr};

use crate::frame::FrameBuf;

/// Command identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CommandId {
    /// Route request
    RouteRequest = 0x01,
    /// Route reply
    RouteReply = 0x02,
    /// Network status
    NetworkStatus = 0x03,
    /// Leave
    Leave = 0x04,
    /// Route record
    RouteRecord = 0x05,
    /// Rejoin request
    RejoinRequest = 0x06,
    /// Rejoin response
    RejoinResponse = 0x07,
    /// Link status
    LinkStatus = 0x08,
}

impl CommandId {
    /// Parse a command identifier
    ///
    /// # Errors
    /// `UnknownCommand` for unsupported identifiers.
    pub const fn from_u8(value: u8) -> Result<Self> {
        match value {
            0x01 => Ok(Self::RouteRequest),
            0x02 => Ok(Self::RouteReply),
            0x03 => Ok(Self::NetworkStatus),
            0x04 => Ok(Self::Leave),
            0x05 => Ok(Self::RouteRecord),
            0x06 => Ok(Self::RejoinRequest),
            0x07 => Ok(Self::RejoinResponse),
            0x08 => Ok(Self::LinkStatus),
            _ => Err(Error::UnknownCommand),
        }
    }
}

/// Network status codes carried by the network status command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum NetworkStatusCode {
    /// No route available
    NoRouteAvailable = 0x00,
    /// Tree link failure
    TreeLinkFailure = 0x01,
    /// Non-tree link failure
    NonTreeLinkFailure = 0x02,
    /// Low battery level
    LowBatteryLevel = 0x03,
    /// No routing capacity
    NoRoutingCapacity = 0x04,
    /// No indirect capacity
    NoIndirectCapacity = 0x05,
    /// Indirect transaction expiry
    IndirectTransactionExpiry = 0x06,
    /// Target device unavailable
    TargetDeviceUnavailable = 0x07,
    /// Target address unallocated
    TargetAddressUnallocated = 0x08,
    /// Parent link failure
    ParentLinkFailure = 0x09,
    /// Validate route
    ValidateRoute = 0x0A,
    /// Source route failure
    SourceRouteFailure = 0x0B,
    /// Many-to-one route failure
    ManyToOneRouteFailure = 0x0C,
    /// Address conflict
    AddressConflict = 0x0D,
    /// Verify addresses
    VerifyAddresses = 0x0E,
    /// PAN identifier update
    PanIdentifierUpdate = 0x0F,
    /// Network address update
    NetworkAddressUpdate = 0x10,
    /// Bad frame counter
    BadFrameCounter = 0x11,
    /// Bad key sequence number
    BadKeySequenceNumber = 0x12,
}

impl NetworkStatusCode {
    /// Parse from the wire
    #[must_use]
    pub const fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            0x00 => Self::NoRouteAvailable,
            0x01 => Self::TreeLinkFailure,
            0x02 => Self::NonTreeLinkFailure,
            0x03 => Self::LowBatteryLevel,
            0x04 => Self::NoRoutingCapacity,
            0x05 => Self::NoIndirectCapacity,
            0x06 => Self::IndirectTransactionExpiry,
            0x07 => Self::TargetDeviceUnavailable,
            0x08 => Self::TargetAddressUnallocated,
            0x09 => Self::ParentLinkFailure,
            0x0A => Self::ValidateRoute,
            0x0B => Self::SourceRouteFailure,
            0x0C => Self::ManyToOneRouteFailure,
            0x0D => Self::AddressConflict,
            0x0E => Self::VerifyAddresses,
            0x0F => Self::PanIdentifierUpdate,
            0x10 => Self::NetworkAddressUpdate,
            0x11 => Self::BadFrameCounter,
            0x12 => Self::BadKeySequenceNumber,
            _ => return None,
        })
    }

    /// Status reports a broken link
    #[must_use]
    pub const fn is_link_failure(self) -> bool {
        matches!(
            self,
            Self::NoRouteAvailable | Self::TreeLinkFailure | Self::NonTreeLinkFailure
        )
    }
}

// ============================================================================
// Command Payloads
// ============================================================================

/// Many-to-one field of a route request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ManyToOne {
    /// Ordinary route request
    No = 0,
    /// Many-to-one; senders must send route records
    WithRouteRecord = 1,
    /// Many-to-one; no route record table at the concentrator
    NoRouteRecord = 2,
}

/// Route request payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RouteRequest {
    /// Many-to-one mode
    pub many_to_one: ManyToOne,
    /// Destination is a multicast group
    pub multicast: bool,
    /// Request identifier
    pub id: u8,
    /// Destination (0xFFFC for many-to-one)
    pub dst: ShortAddr,
    /// Accumulated path cost
    pub path_cost: u8,
    /// Destination IEEE address
    pub dst_ext: Option<ExtAddr>,
}

impl RouteRequest {
    /// Offset of the path cost byte within the command payload
    pub const PATH_COST_OFFSET: usize = 5;
}

/// Route reply payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RouteReply {
    /// Destination is a multicast group
    pub multicast: bool,
    /// Route request identifier
    pub id: u8,
    /// Route request originator
    pub originator: ShortAddr,
    /// Device answering (the discovered destination)
    pub responder: ShortAddr,
    /// Accumulated path cost
    pub path_cost: u8,
    /// Originator IEEE address
    pub originator_ext: Option<ExtAddr>,
    /// Responder IEEE address
    pub responder_ext: Option<ExtAddr>,
}

/// Network status payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NetworkStatus {
    /// Status code
    pub code: NetworkStatusCode,
    /// Address the status refers to
    pub target: ShortAddr,
}

/// Leave payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct LeaveCommand {
    /// The device intends to rejoin
    pub rejoin: bool,
    /// Request for the recipient to leave
    pub request: bool,
    /// Children must leave too
    pub remove_children: bool,
}

/// Route record payload
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct RouteRecord {
    /// Relays traversed so far
    pub relays: Vec<ShortAddr, MAX_SOURCE_ROUTE_RELAYS>,
}

/// Rejoin request payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RejoinRequest {
    /// Capability of the rejoining device
    pub capability: CapabilityInfo,
}

/// Rejoin response payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RejoinResponse {
    /// Address to use from now on
    pub short_addr: ShortAddr,
    /// Association status (0 = success)
    pub status: u8,
}

/// One neighbor in a link status command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LinkStatusEntry {
    /// Neighbor address
    pub addr: ShortAddr,
    /// Cost of the link from the neighbor to us
    pub incoming_cost: u8,
    /// Cost of the link from us to the neighbor
    pub outgoing_cost: u8,
}

/// Link status payload
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct LinkStatus {
    /// First frame of a series
    pub first: bool,
    /// Last frame of a series
    pub last: bool,
    /// Neighbor entries, sorted by address
    pub entries: Vec<LinkStatusEntry, NEIGHBOR_TABLE_SIZE>,
}

/// A decoded NWK command
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NwkCommand {
    /// Route request
    RouteRequest(RouteRequest),
    /// Route reply
    RouteReply(RouteReply),
    /// Network status
    NetworkStatus(NetworkStatus),
    /// Leave
    Leave(LeaveCommand),
    /// Route record
    RouteRecord(RouteRecord),
    /// Rejoin request
    RejoinRequest(RejoinRequest),
    /// Rejoin response
    RejoinResponse(RejoinResponse),
    /// Link status
    LinkStatus(LinkStatus),
}

fn push(out: &mut FrameBuf, byte: u8) -> Result<()> {
    out.push(byte).map_err(|_| Error::FrameTooLong)
}

fn push_slice(out: &mut FrameBuf, bytes: &[u8]) -> Result<()> {
    out.extend_from_slice(bytes).map_err(|()| Error::FrameTooLong)
}

fn byte_at(bytes: &[u8], idx: usize) -> Result<u8> {
    bytes.get(idx).copied().ok_or(Error::FrameTooShort)
}

fn short_at(bytes: &[u8], idx: usize) -> Result<ShortAddr> {
    Ok(ShortAddr::from_le_bytes([byte_at(bytes, idx)?, byte_at(bytes, idx + 1)?]))
}

fn ext_at(bytes: &[u8], idx: usize) -> Result<ExtAddr> {
    let slice = bytes.get(idx..idx + 8).ok_or(Error::FrameTooShort)?;
    let mut raw = [0u8; 8];
    raw.copy_from_slice(slice);
    Ok(ExtAddr::from_le_bytes(raw))
}

impl NwkCommand {
    /// Command identifier
    #[must_use]
    pub const fn id(&self) -> CommandId {
        match self {
            Self::RouteRequest(_) => CommandId::RouteRequest,
            Self::RouteReply(_) => CommandId::RouteReply,
            Self::NetworkStatus(_) => CommandId::NetworkStatus,
            Self::Leave(_) => CommandId::Leave,
            Self::RouteRecord(_) => CommandId::RouteRecord,
            Self::RejoinRequest(_) => CommandId::RejoinRequest,
            Self::RejoinResponse(_) => CommandId::RejoinResponse,
            Self::LinkStatus(_) => CommandId::LinkStatus,
        }
    }

    /// Append the command payload (identifier first) to `out`
    ///
    /// # Errors
    /// `FrameTooLong` if `out` runs out of space.
    pub fn encode(&self, out: &mut FrameBuf) -> Result<()> {
        push(out, self.id() as u8)?;
        match self {
            Self::RouteRequest(rreq) => {
                let mut options = (rreq.many_to_one as u8 & 0x03) << 3;
                if rreq.dst_ext.is_some() {
                    options |= 1 << 5;
                }
                if rreq.multicast {
                    options |= 1 << 6;
                }
                push(out, options)?;
                push(out, rreq.id)?;
                push_slice(out, &rreq.dst.to_le_bytes())?;
                push(out, rreq.path_cost)?;
                if let Some(ext) = rreq.dst_ext {
                    push_slice(out, &ext.to_le_bytes())?;
                }
            }
            Self::RouteReply(rrep) => {
                let mut options = 0u8;
                if rrep.originator_ext.is_some() {
                    options |= 1 << 4;
                }
                if rrep.responder_ext.is_some() {
                    options |= 1 << 5;
                }
                if rrep.multicast {
                    options |= 1 << 6;
                }
                push(out, options)?;
                push(out, rrep.id)?;
                push_slice(out, &rrep.originator.to_le_bytes())?;
                push_slice(out, &rrep.responder.to_le_bytes())?;
                push(out, rrep.path_cost)?;
                if let Some(ext) = rrep.originator_ext {
                    push_slice(out, &ext.to_le_bytes())?;
                }
                if let Some(ext) = rrep.responder_ext {
                    push_slice(out, &ext.to_le_bytes())?;
                }
            }
            Self::NetworkStatus(status) => {
                push(out, status.code as u8)?;
                push_slice(out, &status.target.to_le_bytes())?;
            }
            Self::Leave(leave) => {
                let mut options = 0u8;
                if leave.rejoin {
                    options |= 1 << 5;
                }
                if leave.request {
                    options |= 1 << 6;
                }
                if leave.remove_children {
                    options |= 1 << 7;
                }
                push(out, options)?;
            }
            Self::RouteRecord(record) => {
                // Bounded by MAX_SOURCE_ROUTE_RELAYS
                push(out, record.relays.len() as u8)?;
                for relay in &record.relays {
                    push_slice(out, &relay.to_le_bytes())?;
                }
            }
            Self::RejoinRequest(req) => push(out, req.capability.0)?,
            Self::RejoinResponse(rsp) => {
                push_slice(out, &rsp.short_addr.to_le_bytes())?;
                push(out, rsp.status)?;
            }
            Self::LinkStatus(status) => {
                // Bounded by NEIGHBOR_TABLE_SIZE (< 32)
                let mut options = status.entries.len() as u8 & 0x1F;
                if status.first {
                    options |= 1 << 5;
                }
                if status.last {
                    options |= 1 << 6;
                }
                push(out, options)?;
                for entry in &status.entries {
                    push_slice(out, &entry.addr.to_le_bytes())?;
                    push(out, (entry.incoming_cost & 0x07) | ((entry.outgoing_cost & 0x07) << 4))?;
                }
            }
        }
        Ok(())
    }

    /// Parse a command payload (identifier first)
    ///
    /// # Errors
    /// `FrameTooShort` on truncation, `UnknownCommand` for unsupported
    /// identifiers, `InvalidParameter` for malformed fields.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let id = CommandId::from_u8(byte_at(bytes, 0)?)?;
        match id {
            CommandId::RouteRequest => {
                let options = byte_at(bytes, 1)?;
                let many_to_one = match (options >> 3) & 0x03 {
                    0 => ManyToOne::No,
                    1 => ManyToOne::WithRouteRecord,
                    2 => ManyToOne::NoRouteRecord,
                    _ => return Err(Error::InvalidParameter),
                };
                let dst_ext = if options & (1 << 5) != 0 {
                    Some(ext_at(bytes, 6)?)
                } else {
                    None
                };
                Ok(Self::RouteRequest(RouteRequest {
                    many_to_one,
                    multicast: options & (1 << 6) != 0,
                    id: byte_at(bytes, 2)?,
                    dst: short_at(bytes, 3)?,
                    path_cost: byte_at(bytes, RouteRequest::PATH_COST_OFFSET)?,
                    dst_ext,
                }))
            }
            CommandId::RouteReply => {
                let options = byte_at(bytes, 1)?;
                let mut offset = 8;
                let originator_ext = if options & (1 << 4) != 0 {
                    let ext = ext_at(bytes, offset)?;
                    offset += 8;
                    Some(ext)
                } else {
                    None
                };
                let responder_ext = if options & (1 << 5) != 0 {
                    Some(ext_at(bytes, offset)?)
                } else {
                    None
                };
                Ok(Self::RouteReply(RouteReply {
                    multicast: options & (1 << 6) != 0,
                    id: byte_at(bytes, 2)?,
                    originator: short_at(bytes, 3)?,
                    responder: short_at(bytes, 5)?,
                    path_cost: byte_at(bytes, 7)?,
                    originator_ext,
                    responder_ext,
                }))
            }
            CommandId::NetworkStatus => {
                let code = NetworkStatusCode::from_u8(byte_at(bytes, 1)?)
                    .ok_or(Error::InvalidParameter)?;
                Ok(Self::NetworkStatus(NetworkStatus {
                    code,
                    target: short_at(bytes, 2)?,
                }))
            }
            CommandId::Leave => {
                let options = byte_at(bytes, 1)?;
                Ok(Self::Leave(LeaveCommand {
                    rejoin: options & (1 << 5) != 0,
                    request: options & (1 << 6) != 0,
                    remove_children: options & (1 << 7) != 0,
                }))
            }
            CommandId::RouteRecord => {
                let count = usize::from(byte_at(bytes, 1)?);
                if count > MAX_SOURCE_ROUTE_RELAYS {
                    return Err(Error::FrameTooLong);
                }
                let mut record = RouteRecord::default();
                for i in 0..count {
                    record
                        .relays
                        .push(short_at(bytes, 2 + 2 * i)?)
                        .map_err(|_| Error::FrameTooLong)?;
                }
                Ok(Self::RouteRecord(record))
            }
            CommandId::RejoinRequest => Ok(Self::RejoinRequest(RejoinRequest {
                capability: CapabilityInfo(byte_at(bytes, 1)?),
            })),
            CommandId::RejoinResponse => Ok(Self::RejoinResponse(RejoinResponse {
                short_addr: short_at(bytes, 1)?,
                status: byte_at(bytes, 3)?,
            })),
            CommandId::LinkStatus => {
                let options = byte_at(bytes, 1)?;
                let count = usize::from(options & 0x1F);
                let mut status = LinkStatus {
                    first: options & (1 << 5) != 0,
                    last: options & (1 << 6) != 0,
                    entries: Vec::new(),
                };
                for i in 0..count {
                    let base = 2 + 3 * i;
                    let costs = byte_at(bytes, base + 2)?;
                    status
                        .entries
                        .push(LinkStatusEntry {
                            addr: short_at(bytes, base)?,
                            incoming_cost: costs & 0x07,
                            outgoing_cost: (costs >> 4) & 0x07,
                        })
                        .map_err(|_| Error::FrameTooLong)?;
                }
                Ok(Self::LinkStatus(status))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(cmd: &NwkCommand) -> FrameBuf {
        let mut out = FrameBuf::new();
        cmd.encode(&mut out).unwrap();
        out
    }

    #[test]
    fn test_route_request_layout() {
        let cmd = NwkCommand::RouteRequest(RouteRequest {
            many_to_one: ManyToOne::No,
            multicast: false,
            id: 7,
            dst: ShortAddr(0x5678),
            path_cost: 3,
            dst_ext: None,
        });
        let bytes = encode(&cmd);
        assert_eq!(bytes.as_slice(), &[0x01, 0x00, 7, 0x78, 0x56, 3]);
        assert_eq!(NwkCommand::decode(&bytes), Ok(cmd));
    }

    #[test]
    fn test_many_to_one_request() {
        let cmd = NwkCommand::RouteRequest(RouteRequest {
            many_to_one: ManyToOne::WithRouteRecord,
            multicast: false,
            id: 1,
            dst: ShortAddr::ALL_ROUTERS,
            path_cost: 0,
            dst_ext: None,
        });
        let bytes = encode(&cmd);
        assert_eq!(bytes[1], 0x08);
        assert_eq!(NwkCommand::decode(&bytes), Ok(cmd));
    }

    #[test]
    fn test_route_reply_with_ieee() {
        let cmd = NwkCommand::RouteReply(RouteReply {
            multicast: false,
            id: 9,
            originator: ShortAddr(0x0001),
            responder: ShortAddr(0x0002),
            path_cost: 4,
            originator_ext: None,
            responder_ext: Some(ExtAddr(0xAABB)),
        });
        let bytes = encode(&cmd);
        assert_eq!(bytes.len(), 16);
        assert_eq!(bytes[1], 0x20);
        assert_eq!(NwkCommand::decode(&bytes), Ok(cmd));
    }

    #[test]
    fn test_leave_bits() {
        let cmd = NwkCommand::Leave(LeaveCommand {
            rejoin: true,
            request: true,
            remove_children: false,
        });
        assert_eq!(encode(&cmd).as_slice(), &[0x04, 0x60]);
    }

    #[test]
    fn test_link_status_costs() {
        let mut status = LinkStatus {
            first: true,
            last: true,
            entries: Vec::new(),
        };
        status
            .entries
            .push(LinkStatusEntry {
                addr: ShortAddr(0x0102),
                incoming_cost: 1,
                outgoing_cost: 3,
            })
            .unwrap();
        let cmd = NwkCommand::LinkStatus(status);
        let bytes = encode(&cmd);
        assert_eq!(bytes.as_slice(), &[0x08, 0x61, 0x02, 0x01, 0x31]);
        assert_eq!(NwkCommand::decode(&bytes), Ok(cmd));
    }

    #[test]
    fn test_unknown_and_truncated() {
        assert_eq!(NwkCommand::decode(&[0x0B]), Err(Error::UnknownCommand));
        assert_eq!(NwkCommand::decode(&[0x03, 0x00]), Err(Error::FrameTooShort));
        assert_eq!(NwkCommand::decode(&[]), Err(Error::FrameTooShort));
        assert_eq!(NwkCommand::decode(&[0x03, 0x55, 0, 0]), Err(Error::InvalidParameter));
    }
}
