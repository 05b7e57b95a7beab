//! Authentication gate.
//!
//! Exchanges username/password query parameters for a bearer token using
//! the OAuth2 password grant, then forwards the request with the token in
//! its `Authorization` header.

mod config;
mod credentials;
mod error;
mod middleware;
mod token;

pub use config::{
    CLIENT_ID_KEY, CLIENT_SECRET_KEY, ConfigError, IamConfig, PASSWORD_PARAM_KEY, REQUIRED_KEYS,
    URL_KEY, USERNAME_PARAM_KEY,
};
pub use credentials::{Credentials, QueryParams};
pub use error::{GateError, MALFORMED_QUERY_BODY, REJECTED_BODY};
pub use middleware::{AuthGate, gate_middleware};
pub use token::{DEFAULT_TIMEOUT, TokenClient, TokenResponse};
