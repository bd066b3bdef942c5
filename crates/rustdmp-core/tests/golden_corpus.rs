use rustdmp_core::address::{decode_address, AddressKind, AddressSpec};
use rustdmp_core::encoding::reader::Reader;
use rustdmp_core::pdu::{BlockReader, Payload};
use std::fs;
use std::path::{Path, PathBuf};

fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("../..")
        .canonicalize()
        .expect("workspace root should be resolvable")
}

fn parse_hex_fixture(path: &Path) -> Vec<u8> {
    let content = fs::read_to_string(path).expect("fixture must be readable");
    let mut out = Vec::new();
    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        for token in trimmed.split_whitespace() {
            let byte = u8::from_str_radix(token, 16)
                .unwrap_or_else(|_| panic!("invalid hex token '{token}' in {}", path.display()));
            out.push(byte);
        }
    }
    out
}

#[test]
fn golden_corpus_fixtures_decode_every_pdu() {
    let fixture_dir = workspace_root().join("fixtures/golden");
    let mut fixture_files = fs::read_dir(&fixture_dir)
        .expect("fixtures directory should exist")
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|p| p.extension().is_some_and(|ext| ext == "hex"))
        .collect::<Vec<_>>();
    fixture_files.sort();
    assert!(
        !fixture_files.is_empty(),
        "expected at least one corpus fixture in {}",
        fixture_dir.display()
    );

    for fixture in fixture_files {
        let bytes = parse_hex_fixture(&fixture);
        let mut last = 0;
        let mut pdus = 0;
        for pdu in BlockReader::new(&bytes) {
            let pdu = pdu.unwrap_or_else(|e| {
                panic!("fixture {} failed PDU decode with {e:?}", fixture.display())
            });
            let mut r = Reader::new(pdu.data);
            let adspec = decode_address(&mut r, pdu.header, last).unwrap_or_else(|e| {
                panic!(
                    "fixture {} has a bad address field: {e:?}",
                    fixture.display()
                )
            });
            last = adspec.base;
            pdus += 1;

            match pdu.vector.payload() {
                Payload::None => assert_eq!(
                    r.remaining(),
                    0,
                    "fixture {} carries data on a data-less vector",
                    fixture.display()
                ),
                Payload::Reasons => {
                    let expected = match pdu.header.kind {
                        AddressKind::RangePerAddress => adspec.count as usize,
                        _ => 1,
                    };
                    assert_eq!(r.remaining(), expected, "fixture {}", fixture.display());
                }
                Payload::Values => assert!(r.remaining() > 0, "fixture {}", fixture.display()),
            }
        }
        assert!(pdus > 0, "fixture {} holds no PDUs", fixture.display());
    }
}

#[test]
fn inherited_get_fixture_names_two_ranges() {
    let bytes = parse_hex_fixture(&workspace_root().join("fixtures/golden/get_ranges_inherited.hex"));
    let mut last = 0;
    let specs: Vec<AddressSpec> = BlockReader::new(&bytes)
        .map(|pdu| {
            let pdu = pdu.unwrap();
            let spec = decode_address(&mut Reader::new(pdu.data), pdu.header, last).unwrap();
            last = spec.base;
            spec
        })
        .collect();
    assert_eq!(
        specs,
        vec![AddressSpec::range(0, 1, 4), AddressSpec::range(10, 1, 2)]
    );
    assert_eq!(specs[1].last(), 11);
}
