#![no_main]

use libfuzzer_sys::fuzz_target;
use rustdmp_core::address::decode_address;
use rustdmp_core::encoding::reader::Reader;
use rustdmp_core::pdu::BlockReader;
use rustdmp_core::types::ElementSize;
use rustdmp_core::values::ValueCursor;

fuzz_target!(|data: &[u8]| {
    let mut last = 0;
    for pdu in BlockReader::new(data).flatten() {
        let mut r = Reader::new(pdu.data);
        let Ok(spec) = decode_address(&mut r, pdu.header, last) else {
            continue;
        };
        last = spec.base;
        let mut values = ValueCursor::new(r.rest(), pdu.header.kind);
        let _ = values.skip_values(ElementSize::Variable, spec.count.min(64));
    }
});
