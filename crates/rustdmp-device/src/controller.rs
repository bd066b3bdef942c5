//! Issuing commands to a remote device and collecting its answers.

use crate::handler::{ControllerHandler, HandlerTable, PropertyRun};
use crate::receive::{dispatch_block, Handlers};
use crate::{DmpError, TransmitContext};
use rustdmp_core::address::AddressSpec;
use rustdmp_core::map::AddressMap;
use rustdmp_core::pdu::{ReasonCode, Vector};
use rustdmp_core::types::ElementSize;
use rustdmp_core::values::{ValueCursor, VARSIZE_PREFIX_LEN};
use rustdmp_session::{BlockSource, MemberHandle, Session};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::time::{timeout, Instant};

const MAX_RECV_BLOCK_LEN: usize = 64 * 1024;

/// Commands for one device, sent together when [`send`](Self::send) is
/// called or a block fills up.
pub struct Requests<'s> {
    map: &'s AddressMap,
    tx: TransmitContext<'s>,
}

impl<'s> Requests<'s> {
    pub fn new(map: &'s AddressMap, session: &'s dyn Session, device: MemberHandle) -> Self {
        Self {
            map,
            tx: TransmitContext::new(session, device),
        }
    }

    pub fn get(&mut self, adspec: AddressSpec) -> Result<&mut Self, DmpError> {
        self.no_data(Vector::GetProperty, adspec)
    }

    pub fn subscribe(&mut self, adspec: AddressSpec) -> Result<&mut Self, DmpError> {
        self.no_data(Vector::Subscribe, adspec)
    }

    pub fn unsubscribe(&mut self, adspec: AddressSpec) -> Result<&mut Self, DmpError> {
        self.no_data(Vector::Unsubscribe, adspec)
    }

    fn no_data(&mut self, vector: Vector, adspec: AddressSpec) -> Result<&mut Self, DmpError> {
        self.tx
            .open_pdu(vector, vector.range_kind(adspec.count, false), adspec, 0)?;
        self.tx.close_pdu()?;
        Ok(self)
    }

    /// Sets one value per address, or a single value for every address.
    pub fn set(&mut self, adspec: AddressSpec, values: &[&[u8]]) -> Result<&mut Self, DmpError> {
        let common = values.len() == 1 && adspec.count > 1;
        if !common && values.len() as u64 != u64::from(adspec.count) {
            return Err(rustdmp_core::EncodeError::InvalidLength.into());
        }
        let sizes = adspec
            .addresses()
            .take(values.len())
            .map(|a| {
                self.map
                    .resolve_property(a)
                    .map(|p| p.element_size())
                    .ok_or(DmpError::UnknownAddress(a))
            })
            .collect::<Result<Vec<ElementSize>, _>>()?;
        let size_hint = values
            .iter()
            .zip(&sizes)
            .map(|(v, size)| match size {
                ElementSize::Fixed(_) => v.len(),
                ElementSize::Variable => v.len() + VARSIZE_PREFIX_LEN,
            })
            .sum();

        let vector = Vector::SetProperty;
        self.tx.open_pdu(
            vector,
            vector.range_kind(adspec.count, common),
            adspec,
            size_hint,
        )?;
        for (value, size) in values.iter().zip(sizes) {
            self.tx.write_value(size, value)?;
        }
        self.tx.close_pdu()?;
        Ok(self)
    }

    /// Sends what is queued and returns the number of blocks used.
    pub fn send(mut self) -> Result<usize, DmpError> {
        self.tx.flush()?;
        Ok(self.tx.blocks_sent())
    }
}

#[derive(Debug, Default)]
struct ReplyLog {
    values: BTreeMap<u32, Vec<u8>>,
    failures: BTreeMap<u32, ReasonCode>,
    accepted: BTreeSet<u32>,
}

impl ReplyLog {
    fn answered(&self, address: u32, vector: Vector) -> bool {
        self.failures.contains_key(&address)
            || match vector {
                Vector::Subscribe => self.accepted.contains(&address),
                _ => self.values.contains_key(&address),
            }
    }
}

/// Records replies and failures by address.
struct ReplyCollector(Arc<Mutex<ReplyLog>>);

impl ReplyCollector {
    fn log(&self) -> std::sync::MutexGuard<'_, ReplyLog> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record_reasons(
        &mut self,
        run: &PropertyRun<'_>,
        reasons: &mut ValueCursor<'_>,
    ) -> Result<u32, DmpError> {
        let mut log = self.log();
        for address in run.adspec.addresses() {
            let reason = reasons.next_u8().map_err(|_| DmpError::LostSync)?;
            log.failures.insert(address, ReasonCode::from_u8(reason));
        }
        Ok(run.count())
    }
}

impl ControllerHandler for ReplyCollector {
    fn get_reply(
        &mut self,
        run: &PropertyRun<'_>,
        values: &mut ValueCursor<'_>,
    ) -> Result<u32, DmpError> {
        let mut log = self.log();
        for address in run.adspec.addresses() {
            let value = values
                .next_value(run.prop.element_size())
                .map_err(|_| DmpError::LostSync)?;
            log.values.insert(address, value.to_vec());
        }
        Ok(run.count())
    }

    fn get_fail(
        &mut self,
        run: &PropertyRun<'_>,
        reasons: &mut ValueCursor<'_>,
    ) -> Result<u32, DmpError> {
        self.record_reasons(run, reasons)
    }

    fn set_fail(
        &mut self,
        run: &PropertyRun<'_>,
        reasons: &mut ValueCursor<'_>,
    ) -> Result<u32, DmpError> {
        self.record_reasons(run, reasons)
    }

    fn subscribe_accept(&mut self, run: &PropertyRun<'_>) -> Result<u32, DmpError> {
        self.log().accepted.extend(run.adspec.addresses());
        Ok(run.count())
    }

    fn subscribe_reject(
        &mut self,
        run: &PropertyRun<'_>,
        reasons: &mut ValueCursor<'_>,
    ) -> Result<u32, DmpError> {
        self.record_reasons(run, reasons)
    }
}

/// A controller bound to one session, waiting on replies in turn.
///
/// Blocks arriving while a request is outstanding are dispatched to an
/// internal collector; events in them are dropped.
#[derive(Debug)]
pub struct Controller<S> {
    session: S,
    map: Arc<AddressMap>,
    response_timeout: Duration,
}

impl<S: Session + BlockSource> Controller<S> {
    pub fn new(session: S, map: Arc<AddressMap>) -> Self {
        Self {
            session,
            map,
            response_timeout: Duration::from_secs(3),
        }
    }

    pub fn with_response_timeout(mut self, response_timeout: Duration) -> Self {
        self.response_timeout = response_timeout;
        self
    }

    pub fn session(&self) -> &S {
        &self.session
    }

    pub fn map(&self) -> &Arc<AddressMap> {
        &self.map
    }

    /// Starts a batch of commands for `device`.
    pub fn request(&self, device: MemberHandle) -> Requests<'_> {
        Requests::new(&self.map, &self.session, device)
    }

    /// Reads every address of `adspec`, in address order.
    pub async fn get(
        &self,
        device: MemberHandle,
        adspec: AddressSpec,
    ) -> Result<Vec<(u32, Vec<u8>)>, DmpError> {
        let mut req = self.request(device);
        req.get(adspec)?;
        req.send()?;
        let log = self.await_answers(device, Vector::GetProperty, adspec).await?;
        adspec
            .addresses()
            .map(|a| {
                log.values
                    .get(&a)
                    .map(|v| (a, v.clone()))
                    .ok_or(DmpError::UnknownAddress(a))
            })
            .collect()
    }

    /// Writes `values`. DMP acknowledges only failures, so this returns
    /// once the block is sent.
    pub fn set(
        &self,
        device: MemberHandle,
        adspec: AddressSpec,
        values: &[&[u8]],
    ) -> Result<(), DmpError> {
        let mut req = self.request(device);
        req.set(adspec, values)?;
        req.send()?;
        Ok(())
    }

    pub async fn subscribe(&self, device: MemberHandle, adspec: AddressSpec) -> Result<(), DmpError> {
        let mut req = self.request(device);
        req.subscribe(adspec)?;
        req.send()?;
        self.await_answers(device, Vector::Subscribe, adspec).await?;
        Ok(())
    }

    pub fn unsubscribe(&self, device: MemberHandle, adspec: AddressSpec) -> Result<(), DmpError> {
        let mut req = self.request(device);
        req.unsubscribe(adspec)?;
        req.send()?;
        Ok(())
    }

    async fn await_answers(
        &self,
        device: MemberHandle,
        vector: Vector,
        adspec: AddressSpec,
    ) -> Result<ReplyLog, DmpError> {
        let shared = Arc::new(Mutex::new(ReplyLog::default()));
        let collector: Box<dyn ControllerHandler> = Box::new(ReplyCollector(shared.clone()));
        let mut table = HandlerTable::new(collector);
        let deadline = Instant::now() + self.response_timeout;
        let mut buf = vec![0u8; MAX_RECV_BLOCK_LEN];

        loop {
            {
                let log = shared.lock().unwrap_or_else(PoisonError::into_inner);
                if let Some((&address, &reason)) = adspec
                    .addresses()
                    .find_map(|a| log.failures.get_key_value(&a))
                {
                    return Err(DmpError::RemoteFailure { address, reason });
                }
                if adspec.addresses().all(|a| log.answered(a, vector)) {
                    break;
                }
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(DmpError::Timeout);
            }
            let (n, source) = timeout(remaining, self.session.recv_block(&mut buf))
                .await
                .map_err(|_| DmpError::Timeout)??;
            if source != device {
                log::debug!("ignoring block from {source} while waiting on {device}");
                continue;
            }
            let handlers = Handlers {
                device: None,
                controller: Some(&mut table),
            };
            dispatch_block(&self.map, handlers, &self.session, source, &buf[..n])?;
        }

        drop(table);
        let log = match Arc::try_unwrap(shared) {
            Ok(mutex) => mutex.into_inner().unwrap_or_else(PoisonError::into_inner),
            Err(shared) => std::mem::take(&mut *shared.lock().unwrap_or_else(PoisonError::into_inner)),
        };
        Ok(log)
    }
}
