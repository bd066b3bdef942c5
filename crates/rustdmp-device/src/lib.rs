pub mod component;
pub mod controller;
pub mod error;
pub mod handler;
pub mod receive;
pub mod simulator;
pub mod transmit;

pub use component::Component;
pub use controller::{Controller, Requests};
pub use error::DmpError;
pub use handler::{ControllerHandler, DeviceHandler, HandlerTable, PropertyRun};
pub use receive::{dispatch_block, BlockSummary, Handlers};
pub use simulator::{SimulatedDevice, SimulatedStore};
pub use transmit::TransmitContext;
