use serde::{Serialize, Serializer};
use serde_json::Value;

/// Result of coercing a model response into structured data.
///
/// `Parsed` keeps the exact text the value was recovered from so that
/// downstream prompts can embed it verbatim. `Unparsed` carries the original
/// response untouched; consumers that need structure must treat it as a
/// deferred parse failure.
#[derive(Debug, Clone, PartialEq)]
pub enum StructuredPayload {
    Parsed { raw: String, value: Value },
    Unparsed(String),
}

impl StructuredPayload {
    /// The text this payload was built from.
    pub fn as_text(&self) -> &str {
        match self {
            StructuredPayload::Parsed { raw, .. } => raw,
            StructuredPayload::Unparsed(raw) => raw,
        }
    }

    pub fn value(&self) -> Option<&Value> {
        match self {
            StructuredPayload::Parsed { value, .. } => Some(value),
            StructuredPayload::Unparsed(_) => None,
        }
    }

    pub fn is_parsed(&self) -> bool {
        matches!(self, StructuredPayload::Parsed { .. })
    }

    /// JSON rendition for responses: the parsed value, or the raw text as a
    /// JSON string.
    pub fn to_json(&self) -> Value {
        match self {
            StructuredPayload::Parsed { value, .. } => value.clone(),
            StructuredPayload::Unparsed(raw) => Value::String(raw.clone()),
        }
    }
}

impl Serialize for StructuredPayload {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            StructuredPayload::Parsed { value, .. } => value.serialize(serializer),
            StructuredPayload::Unparsed(raw) => serializer.serialize_str(raw),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parsed_payload_serializes_as_value() {
        let payload = StructuredPayload::Parsed {
            raw: r#"{"a": 1}"#.to_string(),
            value: json!({"a": 1}),
        };
        assert_eq!(serde_json::to_value(&payload).unwrap(), json!({"a": 1}));
        assert_eq!(payload.as_text(), r#"{"a": 1}"#);
    }

    #[test]
    fn test_unparsed_payload_serializes_as_string() {
        let payload = StructuredPayload::Unparsed("No business logic found".to_string());
        assert!(!payload.is_parsed());
        assert_eq!(payload.value(), None);
        assert_eq!(
            serde_json::to_value(&payload).unwrap(),
            json!("No business logic found")
        );
    }
}
