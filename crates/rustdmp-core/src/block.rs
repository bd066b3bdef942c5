//! Assembly of outgoing PDUs into blocks.
//!
//! [`BlockWriter`] owns the byte buffer of one block at a time and the
//! compression state that only makes sense within a block: the last address
//! sent and the previous vector and header octets.

use crate::address::{choose_header, encode_address, AddressKind, AddressSpec, MAX_ADDRESS_FIELD_LEN};
use crate::encoding::writer::Writer;
use crate::pdu::{
    encode_flags_length, Vector, FLAG_DATA, FLAG_HEADER, FLAG_VECTOR, MAX_PDU_LEN,
};
use crate::types::ElementSize;
use crate::values::VARSIZE_PREFIX_LEN;
use crate::EncodeError;
use alloc::vec::Vec;

/// Default block size; fits a single datagram on common links.
pub const DEFAULT_MAX_BLOCK_LEN: usize = 1400;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct OpenPdu {
    start: usize,
    flags: u8,
    /// Offset of the count number, for ranges.
    count_at: Option<usize>,
    width: usize,
    payload_at: usize,
    adspec: AddressSpec,
    /// Compression state before the PDU was opened.
    prev_vector: Option<u8>,
    prev_header: Option<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    BlockOpen,
    PduOpen(OpenPdu),
}

#[derive(Debug, Clone)]
pub struct BlockWriter {
    buf: Vec<u8>,
    max_len: usize,
    state: State,
    last_address: u32,
    prev_vector: Option<u8>,
    prev_header: Option<u8>,
}

impl Default for BlockWriter {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_MAX_BLOCK_LEN)
    }
}

impl BlockWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(max_len: usize) -> Self {
        Self {
            buf: Vec::with_capacity(max_len),
            max_len,
            state: State::Idle,
            last_address: 0,
            prev_vector: None,
            prev_header: None,
        }
    }

    pub fn max_len(&self) -> usize {
        self.max_len
    }

    pub fn is_idle(&self) -> bool {
        matches!(self.state, State::Idle)
    }

    pub fn has_open_pdu(&self) -> bool {
        matches!(self.state, State::PduOpen(_))
    }

    /// Current end of the block, usable as a truncation point.
    pub fn position(&self) -> usize {
        self.buf.len()
    }

    pub fn remaining(&self) -> usize {
        self.max_len.saturating_sub(self.buf.len())
    }

    pub fn last_address(&self) -> u32 {
        self.last_address
    }

    /// Whether a PDU with `payload_len` octets of payload still fits.
    pub fn fits(&self, payload_len: usize) -> bool {
        self.remaining() >= crate::pdu::MAX_PDU_OVERHEAD + payload_len
    }

    /// Starts a new block, returning the previous one if it held anything.
    pub fn open_block(&mut self) -> Result<Option<Vec<u8>>, EncodeError> {
        let previous = self.finish_block()?;
        self.state = State::BlockOpen;
        Ok(previous)
    }

    /// Opens a PDU and writes everything up to its payload.
    ///
    /// Any PDU still open is closed first; an idle writer opens a block.
    pub fn open_pdu(
        &mut self,
        vector: Vector,
        kind: AddressKind,
        adspec: AddressSpec,
    ) -> Result<(), EncodeError> {
        match self.state {
            State::Idle => self.state = State::BlockOpen,
            State::PduOpen(_) => self.close_pdu()?,
            State::BlockOpen => {}
        }

        let header = choose_header(kind, &adspec, self.last_address)?;
        let mut field = [0u8; MAX_ADDRESS_FIELD_LEN];
        let mut w = Writer::new(&mut field);
        encode_address(&mut w, header, &adspec, self.last_address)?;

        let vector_octet = vector.to_u8();
        let header_octet = header.to_u8();
        let mut flags = FLAG_DATA;
        if self.prev_vector != Some(vector_octet) {
            flags |= FLAG_VECTOR;
        }
        if self.prev_header != Some(header_octet) {
            flags |= FLAG_HEADER;
        }

        let head_len = 2
            + usize::from((flags & FLAG_VECTOR) != 0)
            + usize::from((flags & FLAG_HEADER) != 0);
        if self.remaining() < head_len + w.position() {
            return Err(EncodeError::BufferTooSmall);
        }

        let start = self.buf.len();
        self.buf.extend_from_slice(&[0, 0]);
        if (flags & FLAG_VECTOR) != 0 {
            self.buf.push(vector_octet);
        }
        if (flags & FLAG_HEADER) != 0 {
            self.buf.push(header_octet);
        }
        let field_at = self.buf.len();
        self.buf.extend_from_slice(w.as_written());

        let width = header.width.octets();
        let opened = OpenPdu {
            start,
            flags,
            count_at: kind.is_range().then_some(field_at + 2 * width),
            width,
            payload_at: self.buf.len(),
            adspec,
            prev_vector: self.prev_vector,
            prev_header: self.prev_header,
        };
        self.prev_vector = Some(vector_octet);
        self.prev_header = Some(header_octet);
        self.state = State::PduOpen(opened);
        Ok(())
    }

    fn open(&self) -> Result<OpenPdu, EncodeError> {
        match self.state {
            State::PduOpen(pdu) => Ok(pdu),
            _ => Err(EncodeError::NoOpenPdu),
        }
    }

    pub fn write_u8(&mut self, value: u8) -> Result<(), EncodeError> {
        self.write_all(&[value])
    }

    pub fn write_all(&mut self, data: &[u8]) -> Result<(), EncodeError> {
        self.open()?;
        if self.remaining() < data.len() {
            return Err(EncodeError::BufferTooSmall);
        }
        self.buf.extend_from_slice(data);
        Ok(())
    }

    pub fn write_be_u16(&mut self, value: u16) -> Result<(), EncodeError> {
        self.write_all(&value.to_be_bytes())
    }

    pub fn write_be_u32(&mut self, value: u32) -> Result<(), EncodeError> {
        self.write_all(&value.to_be_bytes())
    }

    /// Writes one property value, adding the length prefix for
    /// variable-size properties.
    pub fn write_value(&mut self, size: ElementSize, value: &[u8]) -> Result<(), EncodeError> {
        match size {
            ElementSize::Fixed(n) => {
                if value.len() != usize::from(n) {
                    return Err(EncodeError::InvalidLength);
                }
                self.write_all(value)
            }
            ElementSize::Variable => {
                let len = u16::try_from(value.len() + VARSIZE_PREFIX_LEN)
                    .map_err(|_| EncodeError::ValueOutOfRange)?;
                if self.remaining() < usize::from(len) {
                    return Err(EncodeError::BufferTooSmall);
                }
                self.write_be_u16(len)?;
                self.write_all(value)
            }
        }
    }

    /// Back-patches the length of the open PDU.
    pub fn close_pdu(&mut self) -> Result<(), EncodeError> {
        let pdu = self.open()?;
        let len = self.buf.len() - pdu.start;
        if len > MAX_PDU_LEN {
            return Err(EncodeError::InvalidLength);
        }
        let head = encode_flags_length(pdu.flags, len);
        self.buf[pdu.start..pdu.start + 2].copy_from_slice(&head);
        self.last_address = pdu.adspec.base;
        self.state = State::BlockOpen;
        Ok(())
    }

    /// Shrinks the count of the open range PDU in place.
    ///
    /// With `end`, the payload is cut at that position and the PDU closed.
    pub fn truncate_pdu(&mut self, new_count: u32, end: Option<usize>) -> Result<(), EncodeError> {
        let mut pdu = self.open()?;
        let count_at = pdu.count_at.ok_or(EncodeError::Message("pdu is not a range"))?;
        if new_count == 0 || new_count > pdu.adspec.count {
            return Err(EncodeError::ValueOutOfRange);
        }
        let mut field = [0u8; 4];
        let mut w = Writer::new(&mut field);
        w.write_be_uint(new_count, pdu.width)?;
        self.buf[count_at..count_at + pdu.width].copy_from_slice(w.as_written());
        pdu.adspec.count = new_count;
        self.state = State::PduOpen(pdu);

        if let Some(end) = end {
            if end < pdu.payload_at || end > self.buf.len() {
                return Err(EncodeError::InvalidLength);
            }
            self.buf.truncate(end);
            self.close_pdu()?;
        }
        Ok(())
    }

    /// Drops the open PDU and everything written into it. Returns whether
    /// there was one.
    pub fn abandon_pdu(&mut self) -> bool {
        let State::PduOpen(pdu) = self.state else {
            return false;
        };
        self.buf.truncate(pdu.start);
        self.prev_vector = pdu.prev_vector;
        self.prev_header = pdu.prev_header;
        self.state = State::BlockOpen;
        true
    }

    /// Closes any open PDU and hands back the block, resetting the writer.
    pub fn finish_block(&mut self) -> Result<Option<Vec<u8>>, EncodeError> {
        if self.has_open_pdu() {
            self.close_pdu()?;
        }
        self.state = State::Idle;
        self.last_address = 0;
        self.prev_vector = None;
        self.prev_header = None;
        if self.buf.is_empty() {
            return Ok(None);
        }
        let block = core::mem::replace(&mut self.buf, Vec::with_capacity(self.max_len));
        Ok(Some(block))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::decode_address;
    use crate::encoding::reader::Reader;
    use crate::pdu::BlockReader;

    #[test]
    fn single_get_is_five_octets() {
        let mut b = BlockWriter::new();
        b.open_pdu(Vector::GetProperty, AddressKind::Single, AddressSpec::single(5))
            .unwrap();
        let block = b.finish_block().unwrap().unwrap();
        assert_eq!(block, [0x70, 0x05, 0x01, 0x10, 0x05]);
        assert!(b.is_idle());
    }

    #[test]
    fn repeated_vector_and_header_are_inherited() {
        let mut b = BlockWriter::new();
        b.open_pdu(Vector::GetProperty, AddressKind::Single, AddressSpec::single(5))
            .unwrap();
        b.open_pdu(Vector::GetProperty, AddressKind::Single, AddressSpec::single(6))
            .unwrap();
        let block = b.finish_block().unwrap().unwrap();
        assert_eq!(block, [0x70, 0x05, 0x01, 0x10, 0x05, 0x10, 0x03, 0x01]);

        let mut last = 0;
        let addrs: Vec<u32> = BlockReader::new(&block)
            .map(|pdu| {
                let pdu = pdu.unwrap();
                let a = decode_address(&mut Reader::new(pdu.data), pdu.header, last).unwrap();
                last = a.base;
                a.base
            })
            .collect();
        assert_eq!(addrs, [5, 6]);
    }

    #[test]
    fn truncate_rewrites_count_and_cuts_payload() {
        let mut b = BlockWriter::new();
        b.open_pdu(
            Vector::GetPropertyReply,
            AddressKind::RangePerAddress,
            AddressSpec::range(0, 1, 4),
        )
        .unwrap();
        b.write_all(&[10, 11]).unwrap();
        let end = b.position();
        b.write_all(&[12, 13]).unwrap();
        b.truncate_pdu(2, Some(end)).unwrap();
        assert!(!b.has_open_pdu());
        let block = b.finish_block().unwrap().unwrap();
        // flags/len, vector 3, header: range per address, relative, one octet.
        assert_eq!(block, [0x70, 0x09, 0x03, 0x50, 0x00, 0x01, 0x02, 10, 11]);
    }

    #[test]
    fn truncate_refuses_growth() {
        let mut b = BlockWriter::new();
        b.open_pdu(
            Vector::GetProperty,
            AddressKind::RangeNoData,
            AddressSpec::range(0, 1, 4),
        )
        .unwrap();
        assert_eq!(
            b.truncate_pdu(5, None).unwrap_err(),
            EncodeError::ValueOutOfRange
        );
    }

    #[test]
    fn abandoned_pdu_leaves_no_trace() {
        let mut b = BlockWriter::new();
        b.open_pdu(Vector::GetProperty, AddressKind::Single, AddressSpec::single(5))
            .unwrap();
        b.open_pdu(
            Vector::GetPropertyReply,
            AddressKind::RangePerAddress,
            AddressSpec::range(6, 1, 3),
        )
        .unwrap();
        b.write_all(&[1, 2]).unwrap();
        assert!(b.abandon_pdu());
        assert!(!b.abandon_pdu());
        assert_eq!(b.position(), 5);

        // Vector and header are inherited from the first PDU again.
        b.open_pdu(Vector::GetProperty, AddressKind::Single, AddressSpec::single(7))
            .unwrap();
        let block = b.finish_block().unwrap().unwrap();
        assert_eq!(block, [0x70, 0x05, 0x01, 0x10, 0x05, 0x10, 0x03, 0x02]);
    }

    #[test]
    fn writes_require_open_pdu() {
        let mut b = BlockWriter::new();
        assert_eq!(b.write_u8(1).unwrap_err(), EncodeError::NoOpenPdu);
        assert_eq!(b.close_pdu().unwrap_err(), EncodeError::NoOpenPdu);
    }

    #[test]
    fn block_limit_is_enforced() {
        let mut b = BlockWriter::with_capacity(8);
        b.open_pdu(Vector::SetProperty, AddressKind::Single, AddressSpec::single(1))
            .unwrap();
        assert_eq!(
            b.write_all(&[0; 4]).unwrap_err(),
            EncodeError::BufferTooSmall
        );
        b.write_all(&[0; 3]).unwrap();
        assert!(!b.fits(0));
    }

    #[test]
    fn open_block_hands_back_previous() {
        let mut b = BlockWriter::new();
        assert_eq!(b.open_block().unwrap(), None);
        b.open_pdu(Vector::Subscribe, AddressKind::Single, AddressSpec::single(9))
            .unwrap();
        let prev = b.open_block().unwrap().unwrap();
        assert_eq!(prev.len(), 5);
        assert_eq!(b.position(), 0);
        assert_eq!(b.last_address(), 0);
    }

    #[test]
    fn variable_values_get_prefix() {
        let mut b = BlockWriter::new();
        b.open_pdu(Vector::SetProperty, AddressKind::Single, AddressSpec::single(1))
            .unwrap();
        let start = b.position();
        b.write_value(ElementSize::Variable, b"hi").unwrap();
        assert_eq!(b.position() - start, 4);
        assert_eq!(
            b.write_value(ElementSize::Fixed(2), b"abc").unwrap_err(),
            EncodeError::InvalidLength
        );
    }
}
