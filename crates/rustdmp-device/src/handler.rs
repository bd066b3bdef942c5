//! Application callbacks invoked by the receive dispatcher.
//!
//! Each method handles a run of consecutive addresses of one PDU that all
//! resolve to the same property, and returns how many of them it handled
//! (at least one, at most the run). The dispatcher calls again for the rest.
//! Returning [`DmpError::LostSync`] drops the remainder of the block.

use crate::{DmpError, TransmitContext};
use rustdmp_core::address::AddressSpec;
use rustdmp_core::map::PropertyRef;
use rustdmp_core::pdu::{ReasonCode, Vector};
use rustdmp_core::property::Property;
use rustdmp_core::values::ValueCursor;
use rustdmp_session::MemberHandle;
use std::collections::HashMap;

/// The addresses a handler call covers.
#[derive(Debug, Clone, Copy)]
pub struct PropertyRun<'a> {
    pub source: MemberHandle,
    pub vector: Vector,
    pub property: PropertyRef,
    pub prop: &'a Property,
    pub adspec: AddressSpec,
}

impl PropertyRun<'_> {
    pub fn count(&self) -> u32 {
        self.adspec.count
    }
}

/// Commands arriving at a device.
///
/// Replies go through `tx`, which is addressed back to the requester.
/// Access bits have already been checked when these are called.
pub trait DeviceHandler: Send {
    fn get_property(
        &mut self,
        tx: &mut TransmitContext<'_>,
        run: &PropertyRun<'_>,
    ) -> Result<u32, DmpError>;

    /// Must consume exactly one value from `values` per address handled.
    fn set_property(
        &mut self,
        tx: &mut TransmitContext<'_>,
        run: &PropertyRun<'_>,
        values: &mut ValueCursor<'_>,
    ) -> Result<u32, DmpError>;

    fn subscribe(
        &mut self,
        tx: &mut TransmitContext<'_>,
        run: &PropertyRun<'_>,
    ) -> Result<u32, DmpError> {
        tx.fail(run.vector, run.adspec, ReasonCode::NoSubscribe)?;
        Ok(run.count())
    }

    fn unsubscribe(
        &mut self,
        _tx: &mut TransmitContext<'_>,
        run: &PropertyRun<'_>,
    ) -> Result<u32, DmpError> {
        Ok(run.count())
    }
}

/// Replies and events arriving at a controller.
///
/// Every method defaults to consuming its data and ignoring it.
pub trait ControllerHandler: Send {
    fn get_reply(
        &mut self,
        run: &PropertyRun<'_>,
        values: &mut ValueCursor<'_>,
    ) -> Result<u32, DmpError> {
        skip_values(run, values)
    }

    fn event(
        &mut self,
        run: &PropertyRun<'_>,
        values: &mut ValueCursor<'_>,
    ) -> Result<u32, DmpError> {
        skip_values(run, values)
    }

    /// Defaults to [`event`](Self::event).
    fn sync_event(
        &mut self,
        run: &PropertyRun<'_>,
        values: &mut ValueCursor<'_>,
    ) -> Result<u32, DmpError> {
        self.event(run, values)
    }

    fn get_fail(
        &mut self,
        run: &PropertyRun<'_>,
        reasons: &mut ValueCursor<'_>,
    ) -> Result<u32, DmpError> {
        log_reasons(run, reasons)
    }

    fn set_fail(
        &mut self,
        run: &PropertyRun<'_>,
        reasons: &mut ValueCursor<'_>,
    ) -> Result<u32, DmpError> {
        log_reasons(run, reasons)
    }

    fn subscribe_accept(&mut self, run: &PropertyRun<'_>) -> Result<u32, DmpError> {
        Ok(run.count())
    }

    fn subscribe_reject(
        &mut self,
        run: &PropertyRun<'_>,
        reasons: &mut ValueCursor<'_>,
    ) -> Result<u32, DmpError> {
        log_reasons(run, reasons)
    }
}

fn skip_values(run: &PropertyRun<'_>, values: &mut ValueCursor<'_>) -> Result<u32, DmpError> {
    values
        .skip_values(run.prop.element_size(), run.count())
        .map_err(|_| DmpError::LostSync)?;
    Ok(run.count())
}

fn log_reasons(run: &PropertyRun<'_>, reasons: &mut ValueCursor<'_>) -> Result<u32, DmpError> {
    for address in run.adspec.addresses() {
        let reason = reasons.next_u8().map_err(|_| DmpError::LostSync)?;
        log::debug!(
            "{:?} from {} at {address}: {:?}",
            run.vector,
            run.source,
            ReasonCode::from_u8(reason)
        );
    }
    Ok(run.count())
}

/// A default handler plus per-property overrides.
pub struct HandlerTable<H: ?Sized> {
    default: Box<H>,
    overrides: HashMap<PropertyRef, Box<H>>,
}

impl<H: ?Sized> HandlerTable<H> {
    pub fn new(default: Box<H>) -> Self {
        Self {
            default,
            overrides: HashMap::new(),
        }
    }

    /// Routes `property` to `handler`, returning any override it replaces.
    pub fn set_override(&mut self, property: PropertyRef, handler: Box<H>) -> Option<Box<H>> {
        self.overrides.insert(property, handler)
    }

    pub fn remove_override(&mut self, property: PropertyRef) -> Option<Box<H>> {
        self.overrides.remove(&property)
    }

    pub fn has_override(&self, property: PropertyRef) -> bool {
        self.overrides.contains_key(&property)
    }

    pub fn default_mut(&mut self) -> &mut H {
        self.default.as_mut()
    }

    /// The override for `property`, else the default.
    pub fn handler_for(&mut self, property: PropertyRef) -> &mut H {
        match self.overrides.get_mut(&property) {
            Some(h) => h.as_mut(),
            None => self.default.as_mut(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Tagged(&'static str);

    trait Named {
        fn name(&self) -> &'static str;
    }

    impl Named for Tagged {
        fn name(&self) -> &'static str {
            self.0
        }
    }

    #[test]
    fn override_takes_precedence() {
        let default: Box<dyn Named> = Box::new(Tagged("default"));
        let mut table = HandlerTable::new(default);
        let p = PropertyRef::new(3);
        assert_eq!(table.handler_for(p).name(), "default");

        assert!(table.set_override(p, Box::new(Tagged("special"))).is_none());
        assert_eq!(table.handler_for(p).name(), "special");
        assert_eq!(table.handler_for(PropertyRef::new(4)).name(), "default");

        assert!(table.remove_override(p).is_some());
        assert!(!table.has_override(p));
        assert_eq!(table.handler_for(p).name(), "default");
    }
}
