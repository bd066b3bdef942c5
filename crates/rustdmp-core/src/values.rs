//! Walking the values that follow an address field.

use crate::address::AddressKind;
use crate::encoding::reader::Reader;
use crate::types::ElementSize;
use crate::DecodeError;

/// Octets of the length prefix on variable-size values.
pub const VARSIZE_PREFIX_LEN: usize = 2;

/// Hands out one value per address of a PDU.
///
/// A common-value range repeats its single value for every address; other
/// kinds consume the next value from the payload each time.
#[derive(Debug, Clone)]
pub struct ValueCursor<'a> {
    r: Reader<'a>,
    common: bool,
    shared: Option<&'a [u8]>,
}

impl<'a> ValueCursor<'a> {
    pub fn new(payload: &'a [u8], kind: AddressKind) -> Self {
        Self {
            r: Reader::new(payload),
            common: matches!(kind, AddressKind::RangeCommon),
            shared: None,
        }
    }

    /// Payload octets not yet consumed.
    pub fn remaining(&self) -> usize {
        self.r.remaining()
    }

    /// Next value, without any length prefix.
    pub fn next_value(&mut self, size: ElementSize) -> Result<&'a [u8], DecodeError> {
        if let Some(v) = self.shared {
            return Ok(v);
        }
        let value = read_value(&mut self.r, size)?;
        if self.common {
            self.shared = Some(value);
        }
        Ok(value)
    }

    /// Passes over `n` values of `size`.
    pub fn skip_values(&mut self, size: ElementSize, n: u32) -> Result<(), DecodeError> {
        for _ in 0..n {
            self.next_value(size)?;
            if self.common {
                break;
            }
        }
        Ok(())
    }

    /// Next one-octet value, as carried by failure PDUs.
    pub fn next_u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.next_value(ElementSize::Fixed(1))?[0])
    }
}

fn read_value<'a>(r: &mut Reader<'a>, size: ElementSize) -> Result<&'a [u8], DecodeError> {
    match size {
        ElementSize::Fixed(n) => r.read_exact(usize::from(n)),
        ElementSize::Variable => {
            let len = usize::from(r.read_be_u16()?);
            if len < VARSIZE_PREFIX_LEN {
                return Err(DecodeError::InvalidLength);
            }
            r.read_exact(len - VARSIZE_PREFIX_LEN)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn per_address_values_advance() {
        let mut c = ValueCursor::new(&[1, 2, 3, 4], AddressKind::RangePerAddress);
        assert_eq!(c.next_value(ElementSize::Fixed(2)).unwrap(), &[1, 2]);
        assert_eq!(c.next_value(ElementSize::Fixed(2)).unwrap(), &[3, 4]);
        assert_eq!(
            c.next_value(ElementSize::Fixed(2)).unwrap_err(),
            DecodeError::UnexpectedEof
        );
    }

    #[test]
    fn common_value_repeats() {
        let mut c = ValueCursor::new(&[9], AddressKind::RangeCommon);
        for _ in 0..3 {
            assert_eq!(c.next_u8().unwrap(), 9);
        }
        assert_eq!(c.remaining(), 0);
    }

    #[test]
    fn variable_values_carry_prefix() {
        let mut c = ValueCursor::new(&[0, 5, b'a', b'b', b'c', 0, 2], AddressKind::RangePerAddress);
        assert_eq!(c.next_value(ElementSize::Variable).unwrap(), b"abc");
        assert_eq!(c.next_value(ElementSize::Variable).unwrap(), b"");
    }

    #[test]
    fn short_prefix_is_malformed() {
        let mut c = ValueCursor::new(&[0, 1], AddressKind::Single);
        assert_eq!(
            c.next_value(ElementSize::Variable).unwrap_err(),
            DecodeError::InvalidLength
        );
    }

    #[test]
    fn skip_values_moves_past_declared_size() {
        let mut c = ValueCursor::new(&[1, 2, 3, 4, 5, 6, 7], AddressKind::RangePerAddress);
        c.skip_values(ElementSize::Fixed(3), 2).unwrap();
        assert_eq!(c.next_u8().unwrap(), 7);
    }
}
