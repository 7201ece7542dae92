//! Wire protocol for the kraken RPC endpoint.
//!
//! Requests are a single JSON object `{"id", "method", "params"}` posted to
//! `/`. Every response body is an envelope object carrying either `data` or
//! `error`, plus the caller's `id` when one was supplied.

pub mod call;
pub mod envelope;
pub mod error;

pub use {
    call::Call,
    envelope::{Envelope, Outcome},
    error::{DecodeError, RpcError},
};

/// Header clients use to tag a request with a conversation.
pub const CONVERSATION_ID_HEADER: &str = "Mixin-Conversation-ID";

/// Value of `Access-Control-Allow-Headers` on cross-origin responses.
pub const CORS_ALLOW_HEADERS: &str = "Content-Type,Authorization,Mixin-Conversation-ID";

/// Value of `Access-Control-Allow-Methods` on cross-origin responses.
pub const CORS_ALLOW_METHODS: &str = "OPTIONS,GET,POST,DELETE";

/// Preflight cache lifetime in seconds.
pub const CORS_MAX_AGE_SECS: u32 = 600;

/// Error text for unmatched routes and disallowed verbs.
pub const NOT_FOUND_MESSAGE: &str = "not found";

/// Error text for requests whose handler panicked.
pub const SERVER_ERROR_MESSAGE: &str = "server error";
