#![no_main]

use libfuzzer_sys::fuzz_target;
use rustdmp_core::map::{AddressMap, IndexPolicy};
use rustdmp_core::property::PropertyDescriptor;
use rustdmp_core::types::{ElementSize, PropertyFlags};
use rustdmp_device::SimulatedDevice;
use rustdmp_session::{MemberHandle, MemorySession};
use std::sync::Arc;

fn map() -> AddressMap {
    let all = PropertyFlags::READ | PropertyFlags::WRITE | PropertyFlags::EVENT;
    let mut b = AddressMap::builder();
    let _ = b.add_property(PropertyDescriptor::scalar(0, ElementSize::Fixed(2), all));
    let _ = b.add_property(PropertyDescriptor::scalar(1, ElementSize::Variable, all));
    let _ = b.add_property(
        PropertyDescriptor::scalar(16, ElementSize::Fixed(1), PropertyFlags::READ)
            .with_dimension(4, 8)
            .with_dimension(1, 3),
    );
    let _ = b.add_property(PropertyDescriptor::scalar(0x10000, ElementSize::Fixed(4), all));
    b.finish(IndexPolicy::never())
}

fuzz_target!(|data: &[u8]| {
    let session = MemorySession::new(MemberHandle::Local(0));
    let mut dev = SimulatedDevice::new(Arc::new(map()), session);
    let _ = dev.set_value(0, [0u8, 1]);
    let _ = dev.handle_block(MemberHandle::Local(1), data);
    let _ = dev.handle_block(MemberHandle::Local(2), data);
});
