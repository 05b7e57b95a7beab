//! Per-request gate errors.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// Body sent when the credential query parameters are missing.
pub const MALFORMED_QUERY_BODY: &str = "MalformedQuery";

/// Body sent when the identity provider rejects the credentials.
pub const REJECTED_BODY: &str = "Forbidden";

/// Errors that terminate a request at the gate.
///
/// Each variant produces exactly one error response; none are retried.
#[derive(Debug, Error)]
pub enum GateError {
    /// The configured username or password parameter is absent.
    #[error("malformed query: missing `{0}` parameter")]
    MalformedQuery(String),

    /// The identity provider could not be reached.
    #[error("{0}")]
    Transport(String),

    /// The identity provider answered with something other than 200.
    #[error("identity provider rejected credentials with status {0}")]
    AuthenticationRejected(StatusCode),

    /// The identity provider's body could not be read.
    #[error("{0}")]
    ResponseRead(String),

    /// The identity provider's body is not a token response.
    #[error("{0}")]
    ResponseParse(String),

    /// The access token cannot be carried in an HTTP header.
    #[error("access token is not a valid header value: {0}")]
    InvalidToken(String),
}

impl GateError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::MalformedQuery(_) => StatusCode::BAD_REQUEST,
            Self::AuthenticationRejected(_) => StatusCode::UNAUTHORIZED,
            Self::Transport(_)
            | Self::ResponseRead(_)
            | Self::ResponseParse(_)
            | Self::InvalidToken(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Text written to the client.
    ///
    /// Client-facing failures get a fixed body; system faults carry the
    /// underlying error text.
    pub fn body(&self) -> String {
        match self {
            Self::MalformedQuery(_) => MALFORMED_QUERY_BODY.to_string(),
            Self::AuthenticationRejected(_) => REJECTED_BODY.to_string(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for GateError {
    fn into_response(self) -> Response {
        (self.status_code(), self.body()).into_response()
    }
}
