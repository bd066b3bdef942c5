use core::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EncodeError {
    BufferTooSmall,
    ValueOutOfRange,
    InvalidLength,
    /// A payload write or close was attempted with no PDU open.
    NoOpenPdu,
    Message(&'static str),
}

impl fmt::Display for EncodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BufferTooSmall => f.write_str("buffer too small"),
            Self::ValueOutOfRange => f.write_str("value out of range"),
            Self::InvalidLength => f.write_str("invalid length"),
            Self::NoOpenPdu => f.write_str("no pdu open"),
            Self::Message(msg) => f.write_str(msg),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for EncodeError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DecodeError {
    UnexpectedEof,
    InvalidLength,
    InvalidValue,
    UnknownVector(u8),
    InvalidAddressHeader(u8),
    /// A PDU relied on inherited fields with nothing to inherit from.
    MissingInherited,
    Message(&'static str),
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnexpectedEof => f.write_str("unexpected end of input"),
            Self::InvalidLength => f.write_str("invalid length"),
            Self::InvalidValue => f.write_str("invalid value"),
            Self::UnknownVector(v) => write!(f, "unknown vector {v}"),
            Self::InvalidAddressHeader(h) => write!(f, "invalid address header 0x{h:02x}"),
            Self::MissingInherited => f.write_str("pdu inherits from nothing"),
            Self::Message(msg) => f.write_str(msg),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for DecodeError {}

/// Errors raised while validating properties or building an address map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MapError {
    ZeroSpan,
    ZeroCount,
    ZeroStride,
    /// The property's span runs past the end of the 32-bit address space.
    AddressOverflow { address: u32 },
    TooManyProperties,
    TooLarge,
}

impl fmt::Display for MapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ZeroSpan => f.write_str("property spans no addresses"),
            Self::ZeroCount => f.write_str("array dimension has zero count"),
            Self::ZeroStride => f.write_str("array dimension has zero stride"),
            Self::AddressOverflow { address } => {
                write!(f, "property at {address} overflows the address space")
            }
            Self::TooManyProperties => f.write_str("too many properties"),
            Self::TooLarge => f.write_str("address map too large"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for MapError {}
