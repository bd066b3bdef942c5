//! Decoding a received block and dispatching its PDUs to handlers.
//!
//! Commands (get, set, subscribe, unsubscribe) go to the device handlers and
//! may produce replies or failures back to the sender. Everything else goes
//! to the controller handlers and never produces a response.

use crate::handler::{ControllerHandler, DeviceHandler, HandlerTable, PropertyRun};
use crate::{DmpError, TransmitContext};
use rustdmp_core::address::{decode_address, AddressKind, AddressSpec};
use rustdmp_core::encoding::reader::Reader;
use rustdmp_core::map::{AddressMap, PropertyRef};
use rustdmp_core::pdu::{BlockReader, Payload, ReasonCode, Vector};
use rustdmp_core::types::{ElementSize, PropertyFlags};
use rustdmp_core::values::ValueCursor;
use rustdmp_session::{MemberHandle, Session};

/// Handler tables for the roles a component plays.
#[derive(Default)]
pub struct Handlers<'a> {
    pub device: Option<&'a mut HandlerTable<dyn DeviceHandler>>,
    pub controller: Option<&'a mut HandlerTable<dyn ControllerHandler>>,
}

/// What happened to one received block.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BlockSummary {
    /// PDUs handed to a handler, including one that lost synchronization.
    pub pdus: usize,
    /// Malformed PDUs and PDUs with no handler for their role.
    pub discarded: usize,
    /// The block was abandoned before its end.
    pub aborted: bool,
}

/// Processes every PDU of `block` from `source`.
///
/// Replies are collected into blocks addressed to `source` and sent before
/// returning. Malformed PDUs are skipped; a length overrun or lost
/// synchronization ends the block. A handler that cannot encode its reply
/// gets a `NoResources` failure for its run instead. Only session failures
/// and handler errors are returned as errors, after any replies built so far
/// have been sent.
pub fn dispatch_block(
    map: &AddressMap,
    mut handlers: Handlers<'_>,
    session: &dyn Session,
    source: MemberHandle,
    block: &[u8],
) -> Result<BlockSummary, DmpError> {
    let mut tx = TransmitContext::new(session, source);
    let mut summary = BlockSummary::default();
    // Unknown after a PDU whose address could not be read.
    let mut last: Option<u32> = Some(0);

    let mut reader = BlockReader::new(block);
    for item in reader.by_ref() {
        let pdu = match item {
            Ok(pdu) => pdu,
            Err(err) => {
                log::debug!("discarding pdu from {source}: {err}");
                summary.discarded += 1;
                last = None;
                continue;
            }
        };

        let mut r = Reader::new(pdu.data);
        let reference = match (pdu.header.relative, last) {
            (true, None) => {
                log::debug!("discarding relative pdu from {source} after an unreadable address");
                summary.discarded += 1;
                continue;
            }
            (_, last) => last.unwrap_or(0),
        };
        let adspec = match decode_address(&mut r, pdu.header, reference) {
            Ok(adspec) => adspec,
            Err(err) => {
                log::debug!("discarding pdu from {source}: bad address field: {err}");
                summary.discarded += 1;
                last = None;
                continue;
            }
        };
        last = Some(adspec.base);

        let payload = pdu.vector.payload();
        if payload != Payload::None && pdu.header.kind == AddressKind::RangeNoData {
            log::debug!("discarding {:?} from {source}: no data for a data vector", pdu.vector);
            summary.discarded += 1;
            continue;
        }
        let values = ValueCursor::new(r.rest(), pdu.header.kind);
        log::trace!(
            "{:?} from {source} at {}+{}x{}",
            pdu.vector,
            adspec.base,
            adspec.increment,
            adspec.count
        );

        let outcome = if pdu.vector.is_command() {
            match handlers.device.as_deref_mut() {
                Some(table) => {
                    dispatch_command(map, table, &mut tx, source, pdu.vector, adspec, values)
                }
                None => {
                    log::debug!("ignoring {:?} from {source}: not a device", pdu.vector);
                    summary.discarded += 1;
                    continue;
                }
            }
        } else {
            match handlers.controller.as_deref_mut() {
                Some(table) => dispatch_reply(map, table, source, pdu.vector, adspec, values),
                None => {
                    log::debug!("ignoring {:?} from {source}: not a controller", pdu.vector);
                    summary.discarded += 1;
                    continue;
                }
            }
        };

        summary.pdus += 1;
        match outcome {
            Ok(()) => {}
            Err(DmpError::LostSync) => {
                log::warn!(
                    "lost sync in {:?} from {source}; dropping rest of block",
                    pdu.vector
                );
                tx.abandon_pdu();
                summary.aborted = true;
                break;
            }
            Err(err) => {
                // Replies already built still go out.
                tx.abandon_pdu();
                if let Err(flush_err) = tx.flush() {
                    log::debug!("dropping replies to {source}: {flush_err}");
                }
                return Err(err);
            }
        }
    }

    if reader.failed() {
        summary.aborted = true;
    }
    tx.flush()?;
    Ok(summary)
}

/// Access bit a command needs and the reason reported without it.
fn required_access(vector: Vector) -> (PropertyFlags, ReasonCode) {
    match vector {
        Vector::SetProperty => (PropertyFlags::WRITE, ReasonCode::NoWrite),
        Vector::Subscribe | Vector::Unsubscribe => (PropertyFlags::EVENT, ReasonCode::NoEvent),
        _ => (PropertyFlags::READ, ReasonCode::NoRead),
    }
}

fn dispatch_command(
    map: &AddressMap,
    table: &mut HandlerTable<dyn DeviceHandler>,
    tx: &mut TransmitContext<'_>,
    source: MemberHandle,
    vector: Vector,
    adspec: AddressSpec,
    mut values: ValueCursor<'_>,
) -> Result<(), DmpError> {
    let mut done = 0;
    while done < adspec.count {
        let rest = adspec.advance(done);
        let owner = map.resolve(rest.base);
        let run = run_length(map, &rest, owner);
        let span = rest.take(run);

        let Some(property) = owner else {
            if vector == Vector::SetProperty {
                // Without a property there is no value size to skip by.
                tx.fail(vector, rest, ReasonCode::NoSuchProperty)?;
                return Err(DmpError::LostSync);
            }
            tx.fail(vector, span, ReasonCode::NoSuchProperty)?;
            done += run;
            continue;
        };

        let prop = map.property(property);
        let (access, reason) = required_access(vector);
        if !prop.flags().contains(access) {
            tx.fail(vector, span, reason)?;
            if vector == Vector::SetProperty {
                values
                    .skip_values(prop.element_size(), run)
                    .map_err(|_| DmpError::LostSync)?;
            }
            done += run;
            continue;
        }

        let request = PropertyRun {
            source,
            vector,
            property,
            prop,
            adspec: span,
        };
        let handler = table.handler_for(property);
        let before = values.clone();
        let result = match vector {
            Vector::GetProperty => handler.get_property(tx, &request),
            Vector::SetProperty => handler.set_property(tx, &request, &mut values),
            Vector::Subscribe => handler.subscribe(tx, &request),
            Vector::Unsubscribe => handler.unsubscribe(tx, &request),
            _ => return Ok(()),
        };
        let handled = match result {
            Ok(handled) => handled,
            Err(DmpError::Encode(err)) => {
                // The reply could not be built; report the run and move on.
                log::warn!(
                    "{vector:?} handler for property {} could not encode a reply: {err}",
                    property.index()
                );
                tx.abandon_pdu();
                tx.fail(vector, span, ReasonCode::NoResources)?;
                if vector == Vector::SetProperty {
                    values = before;
                    values
                        .skip_values(prop.element_size(), run)
                        .map_err(|_| DmpError::LostSync)?;
                }
                run
            }
            Err(err) => return Err(err),
        };
        if handled == 0 || handled > run {
            log::warn!("handler for property {} handled {handled} of {run}", property.index());
            return Err(DmpError::LostSync);
        }
        done += handled;
    }
    Ok(())
}

fn dispatch_reply(
    map: &AddressMap,
    table: &mut HandlerTable<dyn ControllerHandler>,
    source: MemberHandle,
    vector: Vector,
    adspec: AddressSpec,
    mut values: ValueCursor<'_>,
) -> Result<(), DmpError> {
    let mut done = 0;
    while done < adspec.count {
        let rest = adspec.advance(done);
        let owner = map.resolve(rest.base);
        let run = run_length(map, &rest, owner);

        let Some(property) = owner else {
            match vector.payload() {
                Payload::Values => {
                    log::debug!("{vector:?} from {source} for unknown address {}", rest.base);
                    return Err(DmpError::LostSync);
                }
                Payload::Reasons => values
                    .skip_values(ElementSize::Fixed(1), run)
                    .map_err(|_| DmpError::LostSync)?,
                Payload::None => {}
            }
            done += run;
            continue;
        };

        let request = PropertyRun {
            source,
            vector,
            property,
            prop: map.property(property),
            adspec: rest.take(run),
        };
        let handler = table.handler_for(property);
        let handled = match vector {
            Vector::GetPropertyReply => handler.get_reply(&request, &mut values)?,
            Vector::Event => handler.event(&request, &mut values)?,
            Vector::SyncEvent => handler.sync_event(&request, &mut values)?,
            Vector::GetPropertyFail => handler.get_fail(&request, &mut values)?,
            Vector::SetPropertyFail => handler.set_fail(&request, &mut values)?,
            Vector::SubscribeAccept => handler.subscribe_accept(&request)?,
            Vector::SubscribeReject => handler.subscribe_reject(&request, &mut values)?,
            _ => return Ok(()),
        };
        if handled == 0 || handled > run {
            log::warn!("handler for property {} handled {handled} of {run}", property.index());
            return Err(DmpError::LostSync);
        }
        done += handled;
    }
    Ok(())
}

/// Number of leading addresses of `rest` that resolve to `owner`.
fn run_length(map: &AddressMap, rest: &AddressSpec, owner: Option<PropertyRef>) -> u32 {
    if rest.increment == 0 {
        return rest.count;
    }
    let mut n = 1;
    while n < rest.count {
        let address = rest.nth(n);
        if map.resolve(address) != owner {
            break;
        }
        n += 1;
        if owner.is_none() {
            // Steps that stay below the next covered address without wrapping.
            let clear = match map.next_covered(address) {
                Some(next) if next > address => (next - address - 1) / rest.increment,
                Some(_) => 0,
                None => (u32::MAX - address) / rest.increment,
            };
            n = n.saturating_add(clear);
        }
    }
    n.min(rest.count)
}
