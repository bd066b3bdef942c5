//! Lightweight simulated DMP device.
//!
//! [`SimulatedDevice`] answers get, set, subscribe and unsubscribe against
//! an in-memory value store keyed by address. Useful for testing controllers
//! and tools without real equipment.

use crate::handler::{DeviceHandler, HandlerTable, PropertyRun};
use crate::receive::BlockSummary;
use crate::{Component, DmpError, TransmitContext};
use rustdmp_core::address::AddressSpec;
use rustdmp_core::map::{AddressMap, PropertyRef};
use rustdmp_core::pdu::{ReasonCode, Vector, MAX_PDU_LEN, MAX_PDU_OVERHEAD};
use rustdmp_core::types::{ElementSize, PropertyFlags};
use rustdmp_core::values::{ValueCursor, VARSIZE_PREFIX_LEN};
use rustdmp_core::EncodeError;
use rustdmp_session::{BlockSource, MemberHandle, Session};
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

const MAX_RECV_BLOCK_LEN: usize = 64 * 1024;

#[derive(Debug, Default)]
struct Store {
    values: HashMap<u32, Vec<u8>>,
    subscribers: HashMap<PropertyRef, BTreeSet<MemberHandle>>,
    /// Event properties written by a peer since the last notification.
    changed: BTreeSet<PropertyRef>,
}

/// Shared value store; also the simulator's default device handler.
#[derive(Debug, Clone, Default)]
pub struct SimulatedStore {
    inner: Arc<Mutex<Store>>,
}

impl SimulatedStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Store> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn value(&self, address: u32) -> Option<Vec<u8>> {
        self.lock().values.get(&address).cloned()
    }

    pub fn subscribers(&self, property: PropertyRef) -> Vec<MemberHandle> {
        self.lock()
            .subscribers
            .get(&property)
            .map(|s| s.iter().copied().collect())
            .unwrap_or_default()
    }

    fn insert(&self, address: u32, value: Vec<u8>) {
        self.lock().values.insert(address, value);
    }

    fn take_changed(&self) -> BTreeSet<PropertyRef> {
        std::mem::take(&mut self.lock().changed)
    }
}

impl DeviceHandler for SimulatedStore {
    fn get_property(
        &mut self,
        tx: &mut TransmitContext<'_>,
        run: &PropertyRun<'_>,
    ) -> Result<u32, DmpError> {
        let store = self.lock();
        let size = run.prop.element_size();
        let Some(first) = store.values.get(&run.adspec.base) else {
            tx.fail(run.vector, run.adspec.take(1), ReasonCode::NoRead)?;
            return Ok(1);
        };
        if run.adspec.is_common() {
            let vector = Vector::GetPropertyReply;
            let kind = vector.range_kind(run.count(), true);
            tx.open_pdu(vector, kind, run.adspec, encoded_len(size, first))?;
            tx.write_value(size, first)?;
            tx.close_pdu()?;
            return Ok(run.count());
        }

        // No more than one block's worth per call.
        let budget = tx
            .max_block_len()
            .min(MAX_PDU_LEN)
            .saturating_sub(MAX_PDU_OVERHEAD);
        let mut used = 0;
        let values: Vec<&[u8]> = run
            .adspec
            .addresses()
            .map_while(|a| store.values.get(&a).map(Vec::as_slice))
            .take_while(|v| {
                used += encoded_len(size, v);
                used <= budget
            })
            .collect();
        if values.is_empty() {
            // The first value is larger than a block.
            return Err(EncodeError::BufferTooSmall.into());
        }
        let span = run.adspec.take(values.len() as u32);
        write_run(tx, Vector::GetPropertyReply, span, size, &values)
    }

    fn set_property(
        &mut self,
        _tx: &mut TransmitContext<'_>,
        run: &PropertyRun<'_>,
        values: &mut ValueCursor<'_>,
    ) -> Result<u32, DmpError> {
        let mut store = self.lock();
        for address in run.adspec.addresses() {
            let value = values
                .next_value(run.prop.element_size())
                .map_err(|_| DmpError::LostSync)?;
            store.values.insert(address, value.to_vec());
        }
        if run.prop.flags().contains(PropertyFlags::EVENT) {
            store.changed.insert(run.property);
        }
        Ok(run.count())
    }

    fn subscribe(
        &mut self,
        tx: &mut TransmitContext<'_>,
        run: &PropertyRun<'_>,
    ) -> Result<u32, DmpError> {
        self.lock()
            .subscribers
            .entry(run.property)
            .or_default()
            .insert(run.source);
        let vector = Vector::SubscribeAccept;
        tx.open_pdu(vector, vector.range_kind(run.count(), false), run.adspec, 0)?;
        tx.close_pdu()?;
        Ok(run.count())
    }

    fn unsubscribe(
        &mut self,
        _tx: &mut TransmitContext<'_>,
        run: &PropertyRun<'_>,
    ) -> Result<u32, DmpError> {
        let mut store = self.lock();
        if let Some(subs) = store.subscribers.get_mut(&run.property) {
            subs.remove(&run.source);
            if subs.is_empty() {
                store.subscribers.remove(&run.property);
            }
        }
        Ok(run.count())
    }
}

/// Writes one PDU carrying as many leading `values` as fit, returning how
/// many were written.
fn write_run(
    tx: &mut TransmitContext<'_>,
    vector: Vector,
    adspec: AddressSpec,
    size: ElementSize,
    values: &[&[u8]],
) -> Result<u32, DmpError> {
    let first = values.first().map_or(0, |v| encoded_len(size, v));
    if first + MAX_PDU_OVERHEAD > tx.max_block_len().min(MAX_PDU_LEN) {
        return Err(EncodeError::BufferTooSmall.into());
    }
    let total = values.iter().map(|v| encoded_len(size, v)).sum();

    tx.open_pdu(vector, vector.range_kind(adspec.count, false), adspec, total)?;
    let payload_start = tx.position();
    let mut written = 0u32;
    for value in values {
        let len = encoded_len(size, value);
        let pdu_full = tx.position() - payload_start + len > MAX_PDU_LEN - MAX_PDU_OVERHEAD;
        if pdu_full || tx.remaining() < len {
            break;
        }
        tx.write_value(size, value)?;
        written += 1;
    }
    if written == 0 {
        return Err(EncodeError::BufferTooSmall.into());
    }
    if written < adspec.count {
        tx.truncate_pdu(written, None)?;
    }
    tx.close_pdu()?;
    Ok(written)
}

fn encoded_len(size: ElementSize, value: &[u8]) -> usize {
    match size {
        ElementSize::Fixed(_) => value.len(),
        ElementSize::Variable => value.len() + VARSIZE_PREFIX_LEN,
    }
}

/// Splits addresses into arithmetic runs, keeping their order.
fn progressions(addresses: &[u32]) -> Vec<AddressSpec> {
    let mut out = Vec::new();
    let mut i = 0;
    while i < addresses.len() {
        let base = addresses[i];
        let mut spec = AddressSpec::single(base);
        if let Some(&next) = addresses.get(i + 1).filter(|&&n| n > base) {
            spec = AddressSpec::range(base, next - base, 2);
            while addresses.get(i + spec.count as usize) == Some(&spec.nth(spec.count)) {
                spec.count += 1;
            }
        }
        i += spec.count as usize;
        out.push(spec);
    }
    out
}

/// A simulated DMP device.
pub struct SimulatedDevice<S> {
    component: Component,
    store: SimulatedStore,
    session: S,
}

impl<S: Session> SimulatedDevice<S> {
    pub fn new(map: Arc<AddressMap>, session: S) -> Self {
        let store = SimulatedStore::new();
        let component = Component::new(map).with_device_handler(store.clone());
        Self {
            component,
            store,
            session,
        }
    }

    pub fn store(&self) -> &SimulatedStore {
        &self.store
    }

    pub fn session(&self) -> &S {
        &self.session
    }

    pub fn map(&self) -> &Arc<AddressMap> {
        self.component.map()
    }

    /// Per-property handler overrides.
    pub fn handlers_mut(&mut self) -> Option<&mut HandlerTable<dyn DeviceHandler>> {
        self.component.device_handlers_mut()
    }

    /// Stores `value` at `address` without notifying subscribers.
    pub fn set_value(&self, address: u32, value: impl Into<Vec<u8>>) -> Result<(), DmpError> {
        let value = value.into();
        let prop = self
            .map()
            .resolve_property(address)
            .ok_or(DmpError::UnknownAddress(address))?;
        if let ElementSize::Fixed(n) = prop.element_size() {
            if value.len() != usize::from(n) {
                return Err(EncodeError::InvalidLength.into());
            }
        }
        self.store.insert(address, value);
        Ok(())
    }

    /// Sends the current values of `property` as events to every
    /// subscriber, returning how many were notified.
    pub fn notify_change(&self, property: PropertyRef) -> Result<usize, DmpError> {
        let map = self.component.map();
        let Some(prop) = map.get(property) else {
            return Ok(0);
        };
        let subscribers = self.store.subscribers(property);
        if subscribers.is_empty() {
            return Ok(0);
        }
        let (addresses, values): (Vec<u32>, Vec<Vec<u8>>) = {
            let store = self.store.lock();
            prop.elements()
                .filter(|a| map.resolve(*a) == Some(property))
                .filter_map(|a| store.values.get(&a).map(|v| (a, v.clone())))
                .unzip()
        };
        if addresses.is_empty() {
            return Ok(0);
        }

        for dest in &subscribers {
            let mut tx = TransmitContext::new(&self.session, *dest);
            let mut offset = 0;
            for spec in progressions(&addresses) {
                let mut done = 0;
                while done < spec.count {
                    let start = offset + done as usize;
                    let end = offset + spec.count as usize;
                    let slices: Vec<&[u8]> =
                        values[start..end].iter().map(Vec::as_slice).collect();
                    done += write_run(
                        &mut tx,
                        Vector::Event,
                        spec.advance(done),
                        prop.element_size(),
                        &slices,
                    )?;
                }
                offset += spec.count as usize;
            }
            tx.flush()?;
        }
        log::debug!(
            "notified {} subscribers of property {}",
            subscribers.len(),
            property.index()
        );
        Ok(subscribers.len())
    }

    /// Dispatches one block, then notifies subscribers of event properties
    /// the block changed.
    pub fn handle_block(
        &mut self,
        source: MemberHandle,
        block: &[u8],
    ) -> Result<BlockSummary, DmpError> {
        let summary = self.component.receive_block(&self.session, source, block)?;
        for property in self.store.take_changed() {
            self.notify_change(property)?;
        }
        Ok(summary)
    }
}

impl<S: Session + BlockSource> SimulatedDevice<S> {
    /// Runs the device loop until the session fails.
    pub async fn run(&mut self) -> Result<(), DmpError> {
        let mut buf = vec![0u8; MAX_RECV_BLOCK_LEN];
        loop {
            let (n, source) = self.session.recv_block(&mut buf).await?;
            if let Err(e) = self.handle_block(source, &buf[..n]) {
                log::debug!("simulator: error handling block from {source}: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progressions_group_arithmetic_runs() {
        assert_eq!(
            progressions(&[0, 1, 2, 10, 13, 16, 20]),
            vec![
                AddressSpec::range(0, 1, 3),
                AddressSpec::range(10, 3, 3),
                AddressSpec::single(20),
            ]
        );
        assert_eq!(
            progressions(&[5, 4]),
            vec![AddressSpec::single(5), AddressSpec::single(4)]
        );
        assert!(progressions(&[]).is_empty());
    }
}
