use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_with::serde_as;
use std::collections::BTreeMap;

#[serde_as]
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
#[readonly::make]
pub struct Values {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    #[serde_as(as = "BTreeMap<_, blockscout_display_bytes::serde_as::Hex>")]
    pub cbor_auxdata: BTreeMap<String, Bytes>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[serde_as(as = "Option<blockscout_display_bytes::serde_as::Hex>")]
    pub constructor_arguments: Option<Bytes>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    #[serde_as(as = "BTreeMap<_, blockscout_display_bytes::serde_as::Hex>")]
    pub libraries: BTreeMap<String, Bytes>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    #[serde_as(as = "BTreeMap<_, blockscout_display_bytes::serde_as::Hex>")]
    pub immutables: BTreeMap<String, Bytes>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[serde_as(as = "Option<blockscout_display_bytes::serde_as::Hex>")]
    pub call_protection: Option<Bytes>,
}

impl From<Values> for serde_json::Value {
    fn from(value: Values) -> Self {
        serde_json::to_value(value).expect("values serialization must succeed")
    }
}

impl Values {
    pub fn add_cbor_auxdata(&mut self, key: impl Into<String>, value: Bytes) -> &mut Self {
        self.cbor_auxdata.insert(key.into(), value);
        self
    }

    pub fn add_constructor_arguments(&mut self, value: Bytes) -> &mut Self {
        self.constructor_arguments = Some(value);
        self
    }

    pub fn add_library(&mut self, key: impl Into<String>, value: Bytes) -> &mut Self {
        self.libraries.insert(key.into(), value);
        self
    }

    pub fn add_immutable(&mut self, key: impl Into<String>, value: Bytes) -> &mut Self {
        self.immutables.insert(key.into(), value);
        self
    }

    pub fn add_call_protection(&mut self, value: Bytes) -> &mut Self {
        self.call_protection = Some(value);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn values_serialize_as_prefixed_hex() {
        let mut values = Values::default();
        values.add_constructor_arguments(Bytes::from_static(&[0xca, 0xfe]));
        values.add_library(
            "contracts/Lib.sol:Lib",
            Bytes::copy_from_slice(&[0x11; 20]),
        );

        let expected = serde_json::json!({
            "constructorArguments": "0xcafe",
            "libraries": {
                "contracts/Lib.sol:Lib": "0x1111111111111111111111111111111111111111",
            },
        });
        assert_eq!(serde_json::Value::from(values), expected);
    }
}
