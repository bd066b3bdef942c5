use crate::handler::{ControllerHandler, DeviceHandler, HandlerTable};
use crate::receive::{dispatch_block, BlockSummary, Handlers};
use crate::DmpError;
use rustdmp_core::map::AddressMap;
use rustdmp_session::{MemberHandle, Session};
use std::sync::Arc;

/// One local DMP component: a shared address map and the handlers for the
/// roles it plays.
///
/// A component with device handlers answers commands; one with controller
/// handlers accepts replies and events. It may be both.
pub struct Component {
    map: Arc<AddressMap>,
    device: Option<HandlerTable<dyn DeviceHandler>>,
    controller: Option<HandlerTable<dyn ControllerHandler>>,
}

impl Component {
    pub fn new(map: Arc<AddressMap>) -> Self {
        Self {
            map,
            device: None,
            controller: None,
        }
    }

    pub fn with_device_handler(mut self, handler: impl DeviceHandler + 'static) -> Self {
        let handler: Box<dyn DeviceHandler> = Box::new(handler);
        self.device = Some(HandlerTable::new(handler));
        self
    }

    pub fn with_controller_handler(mut self, handler: impl ControllerHandler + 'static) -> Self {
        let handler: Box<dyn ControllerHandler> = Box::new(handler);
        self.controller = Some(HandlerTable::new(handler));
        self
    }

    pub fn map(&self) -> &Arc<AddressMap> {
        &self.map
    }

    pub fn device_handlers_mut(&mut self) -> Option<&mut HandlerTable<dyn DeviceHandler>> {
        self.device.as_mut()
    }

    pub fn controller_handlers_mut(
        &mut self,
    ) -> Option<&mut HandlerTable<dyn ControllerHandler>> {
        self.controller.as_mut()
    }

    /// Dispatches one block delivered by `session` from `source`.
    pub fn receive_block(
        &mut self,
        session: &dyn Session,
        source: MemberHandle,
        block: &[u8],
    ) -> Result<BlockSummary, DmpError> {
        let handlers = Handlers {
            device: self.device.as_mut(),
            controller: self.controller.as_mut(),
        };
        dispatch_block(&self.map, handlers, session, source, block)
    }
}
