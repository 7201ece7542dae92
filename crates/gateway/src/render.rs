use {
    axum::{
        Json,
        http::StatusCode,
        response::{IntoResponse, Response},
    },
    kraken_protocol::Envelope,
};

use crate::methods::MethodResult;

/// Writes the response for one dispatched call.
///
/// Dispatch outcomes are always HTTP 200; success or failure is carried in
/// the envelope. `render` consumes the renderer, so a request is answered
/// at most once.
#[derive(Debug)]
pub struct Renderer {
    id: String,
}

impl Renderer {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }

    pub fn render(self, result: MethodResult) -> Response {
        let envelope = Envelope::from_result(Some(&self.id), result);
        (StatusCode::OK, Json(envelope)).into_response()
    }
}

/// An id-less failure envelope for transport-level errors (400, 404, 500).
pub fn transport_error(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(Envelope::failure(None, message))).into_response()
}
