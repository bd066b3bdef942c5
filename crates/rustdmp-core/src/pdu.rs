//! PDU framing, message vectors and reason codes.
//!
//! A block is a run of PDUs, each introduced by a flags+length pair. Vector,
//! address header and data may each be omitted, in which case the value of
//! the preceding PDU in the same block is reused.

use crate::address::{AddressHeader, AddressKind};
use crate::encoding::reader::Reader;
use crate::DecodeError;

/// Length field extends to 20 bits with a third octet.
pub const FLAG_LENGTH: u8 = 0x80;
pub const FLAG_VECTOR: u8 = 0x40;
pub const FLAG_HEADER: u8 = 0x20;
pub const FLAG_DATA: u8 = 0x10;
pub const FLAGS_MASK: u8 = 0xf0;

/// Largest PDU expressible with a 12-bit length.
pub const MAX_PDU_LEN: usize = 0x0fff;
/// Flags, length, vector, header and the widest address field.
pub const MAX_PDU_OVERHEAD: usize = 4 + crate::address::MAX_ADDRESS_FIELD_LEN;

/// DMP message type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Vector {
    GetProperty,
    SetProperty,
    GetPropertyReply,
    Event,
    Subscribe,
    Unsubscribe,
    GetPropertyFail,
    SetPropertyFail,
    SubscribeAccept,
    SubscribeReject,
    SyncEvent,
}

/// What follows the address field of a PDU.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Payload {
    None,
    Values,
    /// One reason octet per datum.
    Reasons,
}

impl Vector {
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::GetProperty),
            2 => Some(Self::SetProperty),
            3 => Some(Self::GetPropertyReply),
            4 => Some(Self::Event),
            7 => Some(Self::Subscribe),
            8 => Some(Self::Unsubscribe),
            9 => Some(Self::GetPropertyFail),
            10 => Some(Self::SetPropertyFail),
            12 => Some(Self::SubscribeAccept),
            13 => Some(Self::SubscribeReject),
            17 => Some(Self::SyncEvent),
            _ => None,
        }
    }

    pub const fn to_u8(self) -> u8 {
        match self {
            Self::GetProperty => 1,
            Self::SetProperty => 2,
            Self::GetPropertyReply => 3,
            Self::Event => 4,
            Self::Subscribe => 7,
            Self::Unsubscribe => 8,
            Self::GetPropertyFail => 9,
            Self::SetPropertyFail => 10,
            Self::SubscribeAccept => 12,
            Self::SubscribeReject => 13,
            Self::SyncEvent => 17,
        }
    }

    pub const fn payload(self) -> Payload {
        match self {
            Self::SetProperty | Self::GetPropertyReply | Self::Event | Self::SyncEvent => {
                Payload::Values
            }
            Self::GetPropertyFail | Self::SetPropertyFail | Self::SubscribeReject => {
                Payload::Reasons
            }
            Self::GetProperty | Self::Subscribe | Self::Unsubscribe | Self::SubscribeAccept => {
                Payload::None
            }
        }
    }

    /// Commands are sent by controllers and handled by devices.
    pub const fn is_command(self) -> bool {
        matches!(
            self,
            Self::GetProperty | Self::SetProperty | Self::Subscribe | Self::Unsubscribe
        )
    }

    /// Vector used to report per-address failures of this command.
    pub const fn failure(self) -> Option<Self> {
        match self {
            Self::GetProperty => Some(Self::GetPropertyFail),
            Self::SetProperty => Some(Self::SetPropertyFail),
            Self::Subscribe => Some(Self::SubscribeReject),
            _ => None,
        }
    }

    /// Address kind for a range of `count` addresses carried by this vector.
    pub const fn range_kind(self, count: u32, common: bool) -> AddressKind {
        if count == 1 {
            AddressKind::Single
        } else if matches!(self.payload(), Payload::None) {
            AddressKind::RangeNoData
        } else if common {
            AddressKind::RangeCommon
        } else {
            AddressKind::RangePerAddress
        }
    }
}

/// DMP reason codes carried by failure and reject PDUs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ReasonCode {
    Success,
    NoSuchProperty,
    NoRead,
    NoWrite,
    BadData,
    NoEvent,
    NoSubscribe,
    NoResources,
    NoPermission,
    Other(u8),
}

impl ReasonCode {
    pub const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Success,
            2 => Self::NoSuchProperty,
            3 => Self::NoRead,
            4 => Self::NoWrite,
            5 => Self::BadData,
            10 => Self::NoEvent,
            11 => Self::NoSubscribe,
            12 => Self::NoResources,
            13 => Self::NoPermission,
            v => Self::Other(v),
        }
    }

    pub const fn to_u8(self) -> u8 {
        match self {
            Self::Success => 0,
            Self::NoSuchProperty => 2,
            Self::NoRead => 3,
            Self::NoWrite => 4,
            Self::BadData => 5,
            Self::NoEvent => 10,
            Self::NoSubscribe => 11,
            Self::NoResources => 12,
            Self::NoPermission => 13,
            Self::Other(v) => v,
        }
    }
}

/// Encodes the flags+length pair of a PDU with a 12-bit length.
pub const fn encode_flags_length(flags: u8, len: usize) -> [u8; 2] {
    [(flags & FLAGS_MASK) | ((len >> 8) as u8 & 0x0f), len as u8]
}

/// One decoded PDU with inherited fields already filled in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pdu<'a> {
    pub vector: Vector,
    pub header: AddressHeader,
    /// Address field followed by any payload.
    pub data: &'a [u8],
}

/// Splits a block into PDUs.
///
/// Iteration stops after a framing error since the position of the next PDU
/// is then unknown. Errors confined to one PDU (unknown vector, bad address
/// header) are yielded and iteration continues with the next PDU.
#[derive(Debug, Clone)]
pub struct BlockReader<'a> {
    r: Reader<'a>,
    vector: Option<u8>,
    header: Option<u8>,
    data: Option<&'a [u8]>,
    failed: bool,
}

impl<'a> BlockReader<'a> {
    pub const fn new(block: &'a [u8]) -> Self {
        Self {
            r: Reader::new(block),
            vector: None,
            header: None,
            data: None,
            failed: false,
        }
    }

    /// Octets of the block not yet consumed.
    pub fn remaining(&self) -> usize {
        self.r.remaining()
    }

    /// Iteration ended early on a framing error.
    pub fn failed(&self) -> bool {
        self.failed
    }

    fn next_raw(&mut self) -> Result<Pdu<'a>, DecodeError> {
        let flags = self.r.peek_u8()? & FLAGS_MASK;
        let consumed = if (flags & FLAG_LENGTH) != 0 { 3 } else { 2 };
        if self.r.remaining() < consumed {
            self.failed = true;
            return Err(DecodeError::UnexpectedEof);
        }
        let head = self.r.read_exact(consumed)?;
        let mut len = (usize::from(head[0] & 0x0f) << 8) | usize::from(head[1]);
        if consumed == 3 {
            len = (len << 8) | usize::from(head[2]);
        }
        if len < consumed || len - consumed > self.r.remaining() {
            self.failed = true;
            return Err(DecodeError::InvalidLength);
        }
        let mut body = Reader::new(self.r.read_exact(len - consumed)?);

        if (flags & FLAG_VECTOR) != 0 {
            self.vector = Some(body.read_u8()?);
        }
        if (flags & FLAG_HEADER) != 0 {
            self.header = Some(body.read_u8()?);
        }
        if (flags & FLAG_DATA) != 0 {
            self.data = Some(body.rest());
        } else if !body.is_empty() {
            return Err(DecodeError::InvalidLength);
        }

        let raw_vector = self.vector.ok_or(DecodeError::MissingInherited)?;
        let raw_header = self.header.ok_or(DecodeError::MissingInherited)?;
        let data = self.data.ok_or(DecodeError::MissingInherited)?;
        let vector = Vector::from_u8(raw_vector).ok_or(DecodeError::UnknownVector(raw_vector))?;
        let header = AddressHeader::from_u8(raw_header)?;
        Ok(Pdu {
            vector,
            header,
            data,
        })
    }
}

impl<'a> Iterator for BlockReader<'a> {
    type Item = Result<Pdu<'a>, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.r.is_empty() {
            return None;
        }
        Some(self.next_raw())
    }
}
