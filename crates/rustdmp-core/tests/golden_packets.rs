use rustdmp_core::address::{decode_address, AddressKind, AddressSpec};
use rustdmp_core::block::BlockWriter;
use rustdmp_core::encoding::reader::Reader;
use rustdmp_core::pdu::{BlockReader, ReasonCode, Vector};
use rustdmp_core::types::ElementSize;
use rustdmp_core::values::ValueCursor;

fn finish(mut b: BlockWriter) -> Vec<u8> {
    b.finish_block().unwrap().expect("block should not be empty")
}

#[test]
fn get_single_block_matches_fixture() {
    let mut b = BlockWriter::new();
    b.open_pdu(Vector::GetProperty, AddressKind::Single, AddressSpec::single(5))
        .unwrap();
    assert_eq!(finish(b), [0x70, 0x05, 0x01, 0x10, 0x05]);
}

#[test]
fn get_ranges_inherit_vector_and_header() {
    let mut b = BlockWriter::new();
    b.open_pdu(
        Vector::GetProperty,
        AddressKind::RangeNoData,
        AddressSpec::range(0, 1, 4),
    )
    .unwrap();
    b.open_pdu(
        Vector::GetProperty,
        AddressKind::RangeNoData,
        AddressSpec::range(10, 1, 2),
    )
    .unwrap();
    assert_eq!(
        finish(b),
        [0x70, 0x07, 0x01, 0x70, 0x00, 0x01, 0x04, 0x10, 0x05, 0x0a, 0x01, 0x02]
    );
}

#[test]
fn set_two_octet_address_matches_fixture() {
    let mut b = BlockWriter::new();
    b.open_pdu(
        Vector::SetProperty,
        AddressKind::Single,
        AddressSpec::single(0x1234),
    )
    .unwrap();
    b.write_value(ElementSize::Fixed(2), &[0xbe, 0xef]).unwrap();
    assert_eq!(finish(b), [0x70, 0x08, 0x02, 0x11, 0x12, 0x34, 0xbe, 0xef]);
}

#[test]
fn sync_event_common_value_matches_fixture() {
    let mut b = BlockWriter::new();
    b.open_pdu(
        Vector::SyncEvent,
        AddressKind::RangeCommon,
        AddressSpec::range(0, 1, 3),
    )
    .unwrap();
    b.write_u8(0x2a).unwrap();
    let block = finish(b);
    assert_eq!(block, [0x70, 0x08, 0x11, 0x30, 0x00, 0x01, 0x03, 0x2a]);

    let pdu = BlockReader::new(&block).next().unwrap().unwrap();
    let mut r = Reader::new(pdu.data);
    let adspec = decode_address(&mut r, pdu.header, 0).unwrap();
    let mut values = ValueCursor::new(r.rest(), pdu.header.kind);
    for _ in adspec.addresses() {
        assert_eq!(values.next_u8().unwrap(), 0x2a);
    }
}

#[test]
fn get_fail_reasons_match_fixture() {
    let mut b = BlockWriter::new();
    b.open_pdu(
        Vector::GetPropertyFail,
        AddressKind::RangePerAddress,
        AddressSpec::range(7, 1, 3),
    )
    .unwrap();
    for _ in 0..3 {
        b.write_u8(ReasonCode::NoSuchProperty.to_u8()).unwrap();
    }
    assert_eq!(
        finish(b),
        [0x70, 0x0a, 0x09, 0x50, 0x07, 0x01, 0x03, 0x02, 0x02, 0x02]
    );
}

#[test]
fn relative_addresses_resolve_against_previous_base() {
    let mut b = BlockWriter::new();
    for base in [1000u32, 990, 70_000] {
        b.open_pdu(Vector::Subscribe, AddressKind::Single, AddressSpec::single(base))
            .unwrap();
    }
    let block = finish(b);

    let mut last = 0;
    let mut seen = Vec::new();
    for pdu in BlockReader::new(&block) {
        let pdu = pdu.unwrap();
        let adspec = decode_address(&mut Reader::new(pdu.data), pdu.header, last).unwrap();
        last = adspec.base;
        seen.push(adspec.base);
    }
    assert_eq!(seen, [1000, 990, 70_000]);
}
