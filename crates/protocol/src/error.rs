use thiserror::Error;

/// The request body could not be turned into a [`Call`](crate::Call).
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("request body must be a JSON object, found {0}")]
    NotAnObject(&'static str),

    #[error("request body exceeds {0} bytes")]
    TooLarge(usize),

    #[error("failed to read request body: {0}")]
    Body(String),
}

/// A dispatch-level failure. Rendered inside an HTTP 200 envelope.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RpcError {
    #[error("invalid method {0}")]
    UnknownMethod(String),

    /// Raised by a method handler; the message reaches the client verbatim.
    #[error("{0}")]
    Handler(String),
}

impl RpcError {
    pub fn handler(message: impl Into<String>) -> Self {
        Self::Handler(message.into())
    }
}
