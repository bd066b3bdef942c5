//! Outgoing PDU assembly bound to one destination.

use crate::DmpError;
use rustdmp_core::address::{AddressKind, AddressSpec};
use rustdmp_core::block::BlockWriter;
use rustdmp_core::pdu::{ReasonCode, Vector};
use rustdmp_core::types::ElementSize;
use rustdmp_session::{MemberHandle, Session};

/// Builds blocks for one peer and sends each when it fills up.
///
/// PDUs are written in the order opened. A block is sent either when the
/// next PDU would not fit or on [`flush`](Self::flush); nothing is sent on
/// drop.
pub struct TransmitContext<'s> {
    session: &'s dyn Session,
    dest: MemberHandle,
    writer: BlockWriter,
    blocks_sent: usize,
}

impl<'s> TransmitContext<'s> {
    pub fn new(session: &'s dyn Session, dest: MemberHandle) -> Self {
        Self {
            session,
            dest,
            writer: BlockWriter::with_capacity(session.max_block_len()),
            blocks_sent: 0,
        }
    }

    pub fn dest(&self) -> MemberHandle {
        self.dest
    }

    pub fn blocks_sent(&self) -> usize {
        self.blocks_sent
    }

    pub fn max_block_len(&self) -> usize {
        self.writer.max_len()
    }

    /// Octets left in the current block.
    pub fn remaining(&self) -> usize {
        self.writer.remaining()
    }

    pub fn position(&self) -> usize {
        self.writer.position()
    }

    /// Opens a PDU, first sending the current block if a PDU carrying
    /// `size_hint` payload octets would not fit in it.
    pub fn open_pdu(
        &mut self,
        vector: Vector,
        kind: AddressKind,
        adspec: AddressSpec,
        size_hint: usize,
    ) -> Result<(), DmpError> {
        if self.writer.has_open_pdu() {
            self.writer.close_pdu()?;
        }
        if self.writer.position() > 0 && !self.writer.fits(size_hint) {
            self.flush()?;
        }
        self.writer.open_pdu(vector, kind, adspec)?;
        Ok(())
    }

    pub fn write_u8(&mut self, value: u8) -> Result<(), DmpError> {
        Ok(self.writer.write_u8(value)?)
    }

    pub fn write_all(&mut self, data: &[u8]) -> Result<(), DmpError> {
        Ok(self.writer.write_all(data)?)
    }

    pub fn write_value(&mut self, size: ElementSize, value: &[u8]) -> Result<(), DmpError> {
        Ok(self.writer.write_value(size, value)?)
    }

    pub fn close_pdu(&mut self) -> Result<(), DmpError> {
        Ok(self.writer.close_pdu()?)
    }

    pub fn truncate_pdu(&mut self, new_count: u32, end: Option<usize>) -> Result<(), DmpError> {
        Ok(self.writer.truncate_pdu(new_count, end)?)
    }

    /// Drops a PDU left open by a failed write.
    pub fn abandon_pdu(&mut self) -> bool {
        self.writer.abandon_pdu()
    }

    /// Reports `reason` for every address of `adspec` with the failure
    /// vector of `command`. Commands without one are ignored.
    pub fn fail(
        &mut self,
        command: Vector,
        adspec: AddressSpec,
        reason: ReasonCode,
    ) -> Result<(), DmpError> {
        let Some(vector) = command.failure() else {
            return Ok(());
        };
        log::trace!(
            "{:?} at {}+{}x{} to {}: {:?}",
            vector,
            adspec.base,
            adspec.increment,
            adspec.count,
            self.dest,
            reason
        );
        self.open_pdu(vector, vector.range_kind(adspec.count, true), adspec, 1)?;
        self.writer.write_u8(reason.to_u8())?;
        self.writer.close_pdu()?;
        Ok(())
    }

    /// Sends the current block, if it holds anything.
    pub fn flush(&mut self) -> Result<(), DmpError> {
        if let Some(block) = self.writer.finish_block()? {
            self.session.send(self.dest, &block)?;
            self.blocks_sent += 1;
        }
        Ok(())
    }
}
