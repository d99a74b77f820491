use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
enum TransformationType {
    Insert,
    Replace,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
enum TransformationReason {
    CborAuxdata,
    ConstructorArguments,
    Immutable,
    Library,
    CallProtection,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Transformation {
    r#type: TransformationType,
    reason: TransformationReason,
    offset: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<String>,
}

impl From<Transformation> for serde_json::Value {
    fn from(value: Transformation) -> Self {
        serde_json::to_value(value).expect("transformations serialization must succeed")
    }
}

impl Transformation {
    pub fn auxdata(offset: usize, id: impl Into<String>) -> Self {
        Self {
            r#type: TransformationType::Replace,
            reason: TransformationReason::CborAuxdata,
            offset,
            id: Some(id.into()),
        }
    }

    pub fn constructor(offset: usize) -> Self {
        Self {
            r#type: TransformationType::Insert,
            reason: TransformationReason::ConstructorArguments,
            offset,
            id: None,
        }
    }

    pub fn immutable(offset: usize, id: impl Into<String>) -> Self {
        Self {
            r#type: TransformationType::Replace,
            reason: TransformationReason::Immutable,
            offset,
            id: Some(id.into()),
        }
    }

    pub fn library(offset: usize, id: impl Into<String>) -> Self {
        Self {
            r#type: TransformationType::Replace,
            reason: TransformationReason::Library,
            offset,
            id: Some(id.into()),
        }
    }

    pub fn call_protection(offset: usize) -> Self {
        Self {
            r#type: TransformationType::Replace,
            reason: TransformationReason::CallProtection,
            offset,
            id: None,
        }
    }

    /// Byte offset into the bytecode (no `0x` prefix assumed).
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Offset of the same region when the bytecode is handled as hex text.
    pub fn hex_text_offset(&self) -> usize {
        self.offset * 2
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn transformations_serialize_with_camel_case_reasons() {
        let cases = vec![
            (
                Transformation::auxdata(1639, "1"),
                serde_json::json!({"type": "replace", "reason": "cborAuxdata", "offset": 1639, "id": "1"}),
            ),
            (
                Transformation::constructor(1328),
                serde_json::json!({"type": "insert", "reason": "constructorArguments", "offset": 1328}),
            ),
            (
                Transformation::library(573, "contracts/Lib.sol:Lib"),
                serde_json::json!({"type": "replace", "reason": "library", "offset": 573, "id": "contracts/Lib.sol:Lib"}),
            ),
            (
                Transformation::immutable(904, "2155"),
                serde_json::json!({"type": "replace", "reason": "immutable", "offset": 904, "id": "2155"}),
            ),
            (
                Transformation::call_protection(1),
                serde_json::json!({"type": "replace", "reason": "callProtection", "offset": 1}),
            ),
        ];

        for (transformation, expected) in cases {
            assert_eq!(serde_json::Value::from(transformation), expected);
        }
    }

    #[test]
    fn hex_text_offset_doubles_the_byte_offset() {
        assert_eq!(Transformation::constructor(1328).hex_text_offset(), 2656);
    }
}
