use serde::{Serialize, Serializer, ser::SerializeMap};
use serde_json::Value;

use crate::error::RpcError;

/// Response body: the caller's id (when it sent one) plus either `data` or
/// `error`, never both.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    id: Option<String>,
    outcome: Outcome,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Data(Value),
    Error(String),
}

impl Envelope {
    pub fn success(id: Option<&str>, data: Value) -> Self {
        Self::new(id, Outcome::Data(data))
    }

    pub fn failure(id: Option<&str>, message: impl Into<String>) -> Self {
        Self::new(id, Outcome::Error(message.into()))
    }

    pub fn from_result(id: Option<&str>, result: Result<Value, RpcError>) -> Self {
        match result {
            Ok(data) => Self::success(id, data),
            Err(err) => Self::failure(id, err.to_string()),
        }
    }

    fn new(id: Option<&str>, outcome: Outcome) -> Self {
        Self {
            id: id.filter(|id| !id.is_empty()).map(str::to_owned),
            outcome,
        }
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn outcome(&self) -> &Outcome {
        &self.outcome
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, Outcome::Data(_))
    }

    /// Serialize to the canonical JSON bytes.
    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

impl Serialize for Envelope {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let len = 1 + usize::from(self.id.is_some());
        let mut map = serializer.serialize_map(Some(len))?;
        if let Some(id) = &self.id {
            map.serialize_entry("id", id)?;
        }
        match &self.outcome {
            Outcome::Data(data) => map.serialize_entry("data", data)?,
            Outcome::Error(message) => map.serialize_entry("error", message)?,
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use {super::*, serde_json::json};

    fn encoded(envelope: &Envelope) -> Value {
        serde_json::from_slice(&envelope.encode().unwrap()).unwrap()
    }

    #[test]
    fn success_echoes_id() {
        let env = Envelope::success(Some("42"), json!({"peers": []}));
        assert_eq!(encoded(&env), json!({"id": "42", "data": {"peers": []}}));
        assert!(env.is_success());
    }

    #[test]
    fn failure_echoes_id() {
        let env = Envelope::failure(Some("42"), "invalid method join");
        assert_eq!(
            encoded(&env),
            json!({"id": "42", "error": "invalid method join"})
        );
        assert!(!env.is_success());
    }

    #[test]
    fn empty_or_missing_id_is_omitted() {
        for id in [None, Some("")] {
            let body = encoded(&Envelope::success(id, json!({})));
            assert_eq!(body, json!({"data": {}}));
            assert!(body.get("id").is_none());
            let body = encoded(&Envelope::failure(id, "boom"));
            assert_eq!(body, json!({"error": "boom"}));
        }
    }

    #[test]
    fn null_data_is_still_a_success_object() {
        let body = encoded(&Envelope::success(None, Value::Null));
        assert_eq!(body, json!({"data": null}));
        assert!(body.is_object());
    }

    #[test]
    fn from_result_maps_errors_to_their_message() {
        let env = Envelope::from_result(Some("7"), Err(RpcError::UnknownMethod("x".into())));
        assert_eq!(env.outcome(), &Outcome::Error("invalid method x".into()));
        assert_eq!(env.id(), Some("7"));
    }

    #[test]
    fn never_carries_both_fields() {
        for env in [
            Envelope::success(Some("1"), json!("ok")),
            Envelope::failure(Some("1"), "bad"),
        ] {
            let body = encoded(&env);
            assert!(body.get("data").is_some() != body.get("error").is_some());
        }
    }
}
