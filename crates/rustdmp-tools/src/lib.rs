use rustdmp_core::address::AddressSpec;
use rustdmp_core::map::{AddressMap, IndexPolicy};
use rustdmp_core::property::PropertyDescriptor;
use rustdmp_core::MapError;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::path::Path;

/// A device description as loaded from JSON: the property table in
/// description order plus optional starting values for a simulator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceDescription {
    #[serde(default)]
    pub name: Option<String>,
    pub properties: Vec<PropertyDescriptor>,
    #[serde(default)]
    pub values: Vec<InitialValue>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitialValue {
    pub address: u32,
    /// Value octets as hex, without a length prefix.
    pub value: String,
}

impl DeviceDescription {
    pub fn load(path: &Path) -> Result<Self, Box<dyn Error>> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Builds the address map, rejecting the whole description if any
    /// property is invalid.
    pub fn build_map(&self, policy: IndexPolicy) -> Result<AddressMap, MapError> {
        let mut builder = AddressMap::builder();
        for desc in &self.properties {
            builder.add_property(desc.clone())?;
        }
        Ok(builder.finish(policy))
    }
}

/// Parses `base` or `base:increment:count`. Numbers may be decimal or
/// `0x` hex.
pub fn parse_adspec(s: &str) -> Result<AddressSpec, String> {
    let parts: Vec<&str> = s.split(':').collect();
    match parts.as_slice() {
        [base] => Ok(AddressSpec::single(parse_u32(base)?)),
        [base, increment, count] => {
            let count = parse_u32(count)?;
            if count == 0 {
                return Err("count must be at least 1".to_string());
            }
            Ok(AddressSpec::range(
                parse_u32(base)?,
                parse_u32(increment)?,
                count,
            ))
        }
        _ => Err(format!("expected base or base:increment:count, got '{s}'")),
    }
}

fn parse_u32(s: &str) -> Result<u32, String> {
    let s = s.trim();
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("invalid number '{s}': {e}"))
}

/// Parses an even-length hex string, ignoring spaces.
pub fn parse_hex(s: &str) -> Result<Vec<u8>, String> {
    let digits: String = s.chars().filter(|c| !c.is_whitespace()).collect();
    if digits.len() % 2 != 0 {
        return Err(format!("odd number of hex digits in '{s}'"));
    }
    (0..digits.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&digits[i..i + 2], 16)
                .map_err(|e| format!("invalid hex in '{s}': {e}"))
        })
        .collect()
}

pub fn format_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rustdmp_core::types::{ElementSize, PropertyFlags};

    #[test]
    fn adspec_forms() {
        assert_eq!(parse_adspec("12").unwrap(), AddressSpec::single(12));
        assert_eq!(
            parse_adspec("0x10:2:4").unwrap(),
            AddressSpec::range(16, 2, 4)
        );
        assert!(parse_adspec("1:2").is_err());
        assert!(parse_adspec("1:1:0").is_err());
        assert!(parse_adspec("x").is_err());
    }

    #[test]
    fn hex_values() {
        assert_eq!(parse_hex("be ef").unwrap(), vec![0xbe, 0xef]);
        assert_eq!(parse_hex("").unwrap(), Vec::<u8>::new());
        assert!(parse_hex("abc").is_err());
        assert_eq!(format_hex(&[0x01, 0xab]), "01ab");
    }

    #[test]
    fn description_from_json_builds_map() {
        let json = r#"{
            "properties": [
                { "address": 0, "element_size": { "fixed": 2 }, "flags": 7 },
                { "address": 10, "element_size": { "fixed": 1 }, "flags": 3,
                  "dimensions": [ { "stride": 1, "count": 4 } ] },
                { "address": 20, "element_size": "variable", "flags": 1 }
            ],
            "values": [ { "address": 20, "value": "6c616d70" } ]
        }"#;
        let desc: DeviceDescription = serde_json::from_str(json).unwrap();
        assert_eq!(desc.properties.len(), 3);
        assert_eq!(desc.properties[2].element_size, ElementSize::Variable);
        assert_eq!(
            desc.properties[0].flags,
            PropertyFlags::READ | PropertyFlags::WRITE | PropertyFlags::EVENT
        );

        let map = desc.build_map(IndexPolicy::default()).unwrap();
        assert_eq!(map.len(), 3);
        assert!(map.resolve(13).is_some());
        assert!(map.resolve(14).is_none());
        assert_eq!(parse_hex(&desc.values[0].value).unwrap(), b"lamp");
    }

    #[test]
    fn invalid_property_rejects_description() {
        let json = r#"{ "properties": [
            { "address": 0, "element_size": { "fixed": 0 }, "flags": 1 }
        ] }"#;
        let desc: DeviceDescription = serde_json::from_str(json).unwrap();
        assert_eq!(
            desc.build_map(IndexPolicy::default()),
            Err(MapError::ZeroSpan)
        );
    }
}
