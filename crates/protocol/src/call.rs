use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::error::DecodeError;

/// A decoded request: correlation id, method name and positional params.
///
/// `params` is kept as raw JSON. Numbers retain their literal text, so a
/// 30-digit id inside `params` reaches the handler exactly as sent.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Call {
    /// Opaque correlation token. Absent and `null` both decode to empty.
    #[serde(default, deserialize_with = "null_as_default")]
    pub id: String,
    pub method: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub params: Vec<Value>,
}

impl Call {
    /// Decode a request body. The body must hold exactly one JSON object.
    pub fn decode(body: &[u8]) -> Result<Self, DecodeError> {
        let value: Value = serde_json::from_slice(body)?;
        if !value.is_object() {
            return Err(DecodeError::NotAnObject(json_kind(&value)));
        }
        Ok(serde_json::from_value(value)?)
    }

    /// The id to echo back, or `None` when the caller did not send one.
    pub fn correlation_id(&self) -> Option<&str> {
        (!self.id.is_empty()).then_some(self.id.as_str())
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use {super::*, serde_json::json};

    #[test]
    fn decodes_full_call() {
        let call =
            Call::decode(br#"{"id":"c1","method":"publish","params":["room","peer",{"a":1}]}"#)
                .unwrap();
        assert_eq!(call.id, "c1");
        assert_eq!(call.method, "publish");
        assert_eq!(call.params, vec![json!("room"), json!("peer"), json!({"a": 1})]);
        assert_eq!(call.correlation_id(), Some("c1"));
    }

    #[test]
    fn missing_id_and_params_default_to_empty() {
        let call = Call::decode(br#"{"method":"list"}"#).unwrap();
        assert_eq!(call.id, "");
        assert!(call.params.is_empty());
        assert_eq!(call.correlation_id(), None);
    }

    #[test]
    fn null_id_and_params_default_to_empty() {
        let call = Call::decode(br#"{"id":null,"method":"list","params":null}"#).unwrap();
        assert_eq!(call.correlation_id(), None);
        assert!(call.params.is_empty());
    }

    #[test]
    fn unknown_method_names_still_decode() {
        let call = Call::decode(br#"{"method":"LIST"}"#).unwrap();
        assert_eq!(call.method, "LIST");
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let call = Call::decode(br#"{"jsonrpc":"2.0","method":"list","params":[]}"#).unwrap();
        assert_eq!(call.method, "list");
    }

    #[test]
    fn rejects_malformed_json() {
        let err = Call::decode(b"{\"method\":").unwrap_err();
        assert!(matches!(err, DecodeError::Json(_)));
        assert!(err.to_string().contains("EOF"), "{err}");
    }

    #[test]
    fn rejects_missing_method() {
        let err = Call::decode(br#"{"id":"1","params":[]}"#).unwrap_err();
        assert!(err.to_string().contains("missing field `method`"), "{err}");
    }

    #[test]
    fn rejects_non_string_method() {
        let err = Call::decode(br#"{"method":7}"#).unwrap_err();
        assert!(err.to_string().contains("invalid type"), "{err}");
    }

    #[test]
    fn rejects_numeric_id() {
        assert!(Call::decode(br#"{"id":5,"method":"list"}"#).is_err());
    }

    #[test]
    fn rejects_non_object_bodies() {
        for (body, kind) in [
            ("[]", "array"),
            ("null", "null"),
            ("\"list\"", "string"),
            ("42", "number"),
        ] {
            let err = Call::decode(body.as_bytes()).unwrap_err();
            assert!(
                matches!(err, DecodeError::NotAnObject(k) if k == kind),
                "{body:?} -> {err}"
            );
        }
    }

    #[test]
    fn rejects_trailing_garbage() {
        assert!(Call::decode(br#"{"method":"list"} extra"#).is_err());
    }

    #[test]
    fn numeric_params_keep_their_literal_text() {
        let call = Call::decode(
            br#"{"method":"publish","params":[123456789012345678901234567890,1.10]}"#,
        )
        .unwrap();
        assert_eq!(
            serde_json::to_string(&call.params).unwrap(),
            "[123456789012345678901234567890,1.10]"
        );
    }
}
