use {kraken_protocol::RpcError, serde_json::Value};

/// Reader over a call's positional params.
#[derive(Debug, Clone, Copy)]
pub struct Params<'a> {
    values: &'a [Value],
}

impl<'a> Params<'a> {
    pub fn new(values: &'a [Value]) -> Self {
        Self { values }
    }

    pub fn expect_len(&self, expected: usize) -> Result<(), RpcError> {
        if self.values.len() != expected {
            return Err(RpcError::handler(format!(
                "invalid params count {}, expected {expected}",
                self.values.len()
            )));
        }
        Ok(())
    }

    pub fn string(&self, index: usize, name: &str) -> Result<&'a str, RpcError> {
        self.values
            .get(index)
            .and_then(Value::as_str)
            .ok_or_else(|| {
                RpcError::handler(format!("invalid {name} at position {index}, expected string"))
            })
    }

    /// Check the arity is exactly `N` and read every param as a string.
    pub fn strings<const N: usize>(&self, names: [&str; N]) -> Result<[&'a str; N], RpcError> {
        self.expect_len(N)?;
        let mut out = [""; N];
        for (index, name) in names.iter().enumerate() {
            out[index] = self.string(index, name)?;
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use {super::*, serde_json::json};

    #[test]
    fn reads_strings_in_order() {
        let values = vec![json!("r1"), json!("u1")];
        let [rid, uid] = Params::new(&values).strings(["rid", "uid"]).unwrap();
        assert_eq!((rid, uid), ("r1", "u1"));
    }

    #[test]
    fn wrong_arity_is_reported() {
        let values = vec![json!("r1")];
        let err = Params::new(&values).strings(["rid", "uid"]).unwrap_err();
        assert_eq!(err.to_string(), "invalid params count 1, expected 2");
    }

    #[test]
    fn wrong_type_names_the_param() {
        let values = vec![json!("r1"), json!(42)];
        let err = Params::new(&values).strings(["rid", "uid"]).unwrap_err();
        assert_eq!(err.to_string(), "invalid uid at position 1, expected string");
    }

    #[test]
    fn missing_index_is_a_type_error() {
        let params = Params::new(&[]);
        let err = params.string(0, "rid").unwrap_err();
        assert_eq!(err.to_string(), "invalid rid at position 0, expected string");
    }
}
