//! Address specifications and their wire encoding.
//!
//! Every DMP message names its target with an address-type octet followed by
//! one (single) or three (range) numbers of equal width. The encoder picks the
//! narrowest width that holds every number and chooses between an absolute
//! address and a signed delta from the last address used in the same block.

use crate::encoding::{reader::Reader, writer::Writer};
use crate::{DecodeError, EncodeError};

/// Low two bits of the address-type octet: field width.
pub const HEADER_WIDTH_MASK: u8 = 0x03;
/// Address is a delta from the last address used in the block.
pub const HEADER_RELATIVE: u8 = 0x10;
pub const HEADER_KIND_SHIFT: u8 = 5;
pub const HEADER_KIND_MASK: u8 = 0x60;

/// Longest address field: three four-octet numbers.
pub const MAX_ADDRESS_FIELD_LEN: usize = 12;

/// `{base, increment, count}` naming one address or an arithmetic run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AddressSpec {
    pub base: u32,
    pub increment: u32,
    pub count: u32,
}

impl AddressSpec {
    pub const fn single(base: u32) -> Self {
        Self {
            base,
            increment: 0,
            count: 1,
        }
    }

    pub const fn range(base: u32, increment: u32, count: u32) -> Self {
        Self {
            base,
            increment,
            count,
        }
    }

    pub const fn is_single(&self) -> bool {
        self.count == 1
    }

    /// Every element names the same address.
    pub const fn is_common(&self) -> bool {
        self.count > 1 && self.increment == 0
    }

    /// The `n`th address of the progression.
    pub const fn nth(&self, n: u32) -> u32 {
        self.base.wrapping_add(self.increment.wrapping_mul(n))
    }

    pub const fn last(&self) -> u32 {
        self.nth(self.count.saturating_sub(1))
    }

    /// The spec with its first `n` addresses removed.
    pub const fn advance(&self, n: u32) -> Self {
        Self {
            base: self.nth(n),
            increment: self.increment,
            count: self.count.saturating_sub(n),
        }
    }

    /// The first `n` addresses of this spec.
    pub const fn take(&self, n: u32) -> Self {
        Self {
            base: self.base,
            increment: self.increment,
            count: if n < self.count { n } else { self.count },
        }
    }

    pub fn addresses(&self) -> impl Iterator<Item = u32> + '_ {
        (0..self.count).map(move |i| self.nth(i))
    }
}

/// Octet width of each number in an address field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AddressWidth {
    One,
    Two,
    Four,
}

impl AddressWidth {
    pub const fn octets(self) -> usize {
        match self {
            Self::One => 1,
            Self::Two => 2,
            Self::Four => 4,
        }
    }

    const fn bits(self) -> u8 {
        match self {
            Self::One => 0,
            Self::Two => 1,
            Self::Four => 2,
        }
    }

    const fn from_bits(bits: u8) -> Option<Self> {
        match bits {
            0 => Some(Self::One),
            1 => Some(Self::Two),
            2 => Some(Self::Four),
            _ => None,
        }
    }

    /// Narrowest width holding `value` unsigned.
    pub const fn for_unsigned(value: u32) -> Self {
        if value <= 0xff {
            Self::One
        } else if value <= 0xffff {
            Self::Two
        } else {
            Self::Four
        }
    }

    /// Narrowest width holding `delta` as a two's-complement number.
    pub const fn for_signed(delta: i32) -> Self {
        if delta >= i8::MIN as i32 && delta <= i8::MAX as i32 {
            Self::One
        } else if delta >= i16::MIN as i32 && delta <= i16::MAX as i32 {
            Self::Two
        } else {
            Self::Four
        }
    }
}

/// How the addresses of a PDU map onto its data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AddressKind {
    /// One address, one datum.
    Single,
    /// A range sharing one datum.
    RangeCommon,
    /// A range with one datum per address.
    RangePerAddress,
    /// A range with no data.
    RangeNoData,
}

impl AddressKind {
    const fn bits(self) -> u8 {
        match self {
            Self::Single => 0,
            Self::RangeCommon => 1,
            Self::RangePerAddress => 2,
            Self::RangeNoData => 3,
        }
    }

    const fn from_bits(bits: u8) -> Self {
        match bits & 0x03 {
            0 => Self::Single,
            1 => Self::RangeCommon,
            2 => Self::RangePerAddress,
            _ => Self::RangeNoData,
        }
    }

    pub const fn is_range(self) -> bool {
        !matches!(self, Self::Single)
    }
}

/// Decoded address-type octet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AddressHeader {
    pub width: AddressWidth,
    pub relative: bool,
    pub kind: AddressKind,
}

impl AddressHeader {
    pub const fn to_u8(self) -> u8 {
        let mut b = self.width.bits() | (self.kind.bits() << HEADER_KIND_SHIFT);
        if self.relative {
            b |= HEADER_RELATIVE;
        }
        b
    }

    pub const fn from_u8(value: u8) -> Result<Self, DecodeError> {
        let width = match AddressWidth::from_bits(value & HEADER_WIDTH_MASK) {
            Some(w) => w,
            None => return Err(DecodeError::InvalidAddressHeader(value)),
        };
        Ok(Self {
            width,
            relative: (value & HEADER_RELATIVE) != 0,
            kind: AddressKind::from_bits((value & HEADER_KIND_MASK) >> HEADER_KIND_SHIFT),
        })
    }

    /// Encoded length of the address field this header introduces.
    pub const fn field_len(self) -> usize {
        if self.kind.is_range() {
            3 * self.width.octets()
        } else {
            self.width.octets()
        }
    }
}

/// Picks the shortest header for `adspec` given the last address used.
///
/// Relative addressing wins when it is no longer than absolute.
pub fn choose_header(
    kind: AddressKind,
    adspec: &AddressSpec,
    last_address: u32,
) -> Result<AddressHeader, EncodeError> {
    if adspec.count == 0 || (!kind.is_range() && adspec.count != 1) {
        return Err(EncodeError::ValueOutOfRange);
    }
    let range_width = if kind.is_range() {
        AddressWidth::for_unsigned(adspec.increment.max(adspec.count))
    } else {
        AddressWidth::One
    };
    let absolute = AddressWidth::for_unsigned(adspec.base).max(range_width);
    let delta = adspec.base.wrapping_sub(last_address) as i32;
    let relative = AddressWidth::for_signed(delta).max(range_width);

    Ok(if relative <= absolute {
        AddressHeader {
            width: relative,
            relative: true,
            kind,
        }
    } else {
        AddressHeader {
            width: absolute,
            relative: false,
            kind,
        }
    })
}

/// Writes the address field described by `header`.
pub fn encode_address(
    w: &mut Writer<'_>,
    header: AddressHeader,
    adspec: &AddressSpec,
    last_address: u32,
) -> Result<(), EncodeError> {
    let len = header.width.octets();
    let base = if header.relative {
        let delta = adspec.base.wrapping_sub(last_address);
        if AddressWidth::for_signed(delta as i32) > header.width {
            return Err(EncodeError::ValueOutOfRange);
        }
        delta
    } else {
        if AddressWidth::for_unsigned(adspec.base) > header.width {
            return Err(EncodeError::ValueOutOfRange);
        }
        adspec.base
    };
    w.write_be_uint(base, len)?;
    if header.kind.is_range() {
        if AddressWidth::for_unsigned(adspec.increment.max(adspec.count)) > header.width {
            return Err(EncodeError::ValueOutOfRange);
        }
        w.write_be_uint(adspec.increment, len)?;
        w.write_be_uint(adspec.count, len)?;
    }
    Ok(())
}

/// Reads an address field and resolves relative addresses against
/// `last_address`.
pub fn decode_address(
    r: &mut Reader<'_>,
    header: AddressHeader,
    last_address: u32,
) -> Result<AddressSpec, DecodeError> {
    let len = header.width.octets();
    let raw = r.read_be_uint(len)?;
    let base = if header.relative {
        last_address.wrapping_add(sign_extend(raw, header.width) as u32)
    } else {
        raw
    };
    if !header.kind.is_range() {
        return Ok(AddressSpec::single(base));
    }
    let increment = r.read_be_uint(len)?;
    let count = r.read_be_uint(len)?;
    if count == 0 {
        return Err(DecodeError::InvalidValue);
    }
    Ok(AddressSpec::range(base, increment, count))
}

fn sign_extend(raw: u32, width: AddressWidth) -> i32 {
    match width {
        AddressWidth::One => raw as u8 as i8 as i32,
        AddressWidth::Two => raw as u16 as i16 as i32,
        AddressWidth::Four => raw as i32,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn roundtrip(kind: AddressKind, adspec: AddressSpec, last: u32) -> (AddressHeader, usize) {
        let header = choose_header(kind, &adspec, last).unwrap();
        let mut buf = [0u8; MAX_ADDRESS_FIELD_LEN];
        let mut w = Writer::new(&mut buf);
        encode_address(&mut w, header, &adspec, last).unwrap();
        let written = w.position();
        assert_eq!(written, header.field_len());

        let decoded_header = AddressHeader::from_u8(header.to_u8()).unwrap();
        let mut r = Reader::new(w.as_written());
        let decoded = decode_address(&mut r, decoded_header, last).unwrap();
        assert_eq!(decoded, adspec);
        (header, written)
    }

    #[test]
    fn relative_wins_ties() {
        let (h, len) = roundtrip(AddressKind::Single, AddressSpec::single(100), 0);
        assert!(h.relative);
        assert_eq!(len, 1);
    }

    #[test]
    fn absolute_when_shorter() {
        // 200 does not fit a signed octet but does fit an unsigned one.
        let (h, len) = roundtrip(AddressKind::Single, AddressSpec::single(200), 0);
        assert!(!h.relative);
        assert_eq!(len, 1);
    }

    #[test]
    fn negative_delta_is_relative() {
        let (h, len) = roundtrip(AddressKind::Single, AddressSpec::single(0x1_0000), 0x1_0010);
        assert!(h.relative);
        assert_eq!(h.width, AddressWidth::One);
        assert_eq!(len, 1);
    }

    #[test]
    fn range_width_covers_count() {
        let (h, len) = roundtrip(
            AddressKind::RangePerAddress,
            AddressSpec::range(2, 1, 300),
            0,
        );
        assert_eq!(h.width, AddressWidth::Two);
        assert_eq!(len, 6);
    }

    #[test]
    fn single_kind_rejects_ranges() {
        assert_eq!(
            choose_header(AddressKind::Single, &AddressSpec::range(0, 1, 2), 0).unwrap_err(),
            EncodeError::ValueOutOfRange
        );
    }

    #[test]
    fn header_bits_match_wire_layout() {
        let h = AddressHeader {
            width: AddressWidth::Four,
            relative: true,
            kind: AddressKind::RangeNoData,
        };
        assert_eq!(h.to_u8(), 0x72);
        assert_eq!(
            AddressHeader::from_u8(0x03).unwrap_err(),
            DecodeError::InvalidAddressHeader(0x03)
        );
    }

    #[test]
    fn zero_count_range_is_malformed() {
        let header = AddressHeader {
            width: AddressWidth::One,
            relative: false,
            kind: AddressKind::RangeNoData,
        };
        let mut r = Reader::new(&[5, 1, 0]);
        assert_eq!(
            decode_address(&mut r, header, 0).unwrap_err(),
            DecodeError::InvalidValue
        );
    }

    #[test]
    fn adspec_progression() {
        let a = AddressSpec::range(10, 3, 4);
        assert_eq!(a.addresses().collect::<alloc::vec::Vec<_>>(), [10, 13, 16, 19]);
        assert_eq!(a.last(), 19);
        assert_eq!(a.advance(2), AddressSpec::range(16, 3, 2));
        assert_eq!(a.take(1).count, 1);
        assert!(AddressSpec::range(7, 0, 3).is_common());
    }

    proptest! {
        #[test]
        fn single_roundtrip_is_minimal(last in any::<u32>(), addr in any::<u32>()) {
            let (_, len) = roundtrip(AddressKind::Single, AddressSpec::single(addr), last);
            let abs = AddressWidth::for_unsigned(addr).octets();
            let rel = AddressWidth::for_signed(addr.wrapping_sub(last) as i32).octets();
            prop_assert_eq!(len, abs.min(rel));
        }

        #[test]
        fn range_roundtrip(last in any::<u32>(), base in any::<u32>(), inc in any::<u32>(), count in 1u32..) {
            roundtrip(AddressKind::RangePerAddress, AddressSpec::range(base, inc, count), last);
        }
    }
}
