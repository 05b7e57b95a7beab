//! Identity provider token endpoint client (OAuth2 password grant).

use std::error::Error as _;
use std::fmt;
use std::time::Duration;

use reqwest::{Client, StatusCode, header};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{Credentials, GateError, IamConfig};

/// Default upper bound for one token exchange, body included.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Token endpoint reply.
///
/// Only `access_token` is required; the remaining fields default when the
/// provider leaves them out.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub expires_in: i64,
    #[serde(default)]
    pub refresh_expires_in: i64,
    #[serde(default)]
    pub token_type: String,
    #[serde(default, rename = "not-before-policy")]
    pub not_before_policy: i64,
    #[serde(default)]
    pub session_state: String,
    #[serde(default)]
    pub scope: String,
}

impl TokenResponse {
    /// Value for the forwarded request's `Authorization` header.
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.access_token)
    }

    /// Decode a token endpoint body. Only a JSON object is accepted.
    pub fn from_slice(body: &[u8]) -> Result<Self, serde_json::Error> {
        // Derived `Deserialize` also accepts a JSON array.
        let object: Map<String, Value> = serde_json::from_slice(body)?;
        serde_json::from_value(Value::Object(object))
    }
}

impl fmt::Debug for TokenResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenResponse")
            .field("access_token", &"<redacted>")
            .field("expires_in", &self.expires_in)
            .field("refresh_expires_in", &self.refresh_expires_in)
            .field("token_type", &self.token_type)
            .field("not_before_policy", &self.not_before_policy)
            .field("session_state", &self.session_state)
            .field("scope", &self.scope)
            .finish()
    }
}

/// Form body of a password-grant token request.
#[derive(Serialize)]
struct PasswordGrantForm<'a> {
    grant_type: &'static str,
    client_id: &'a str,
    client_secret: &'a str,
    username: &'a str,
    password: &'a str,
}

/// HTTP client for the identity provider's token endpoint.
///
/// Cloning is cheap; clones share one connection pool.
#[derive(Debug, Clone)]
pub struct TokenClient {
    client: Client,
}

impl TokenClient {
    /// Create a client whose exchanges give up after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    /// Exchange credentials for a token. Exactly one POST, no retries.
    pub async fn exchange(
        &self,
        config: &IamConfig,
        credentials: &Credentials,
    ) -> Result<TokenResponse, GateError> {
        let form = PasswordGrantForm {
            grant_type: "password",
            client_id: config.client_id(),
            client_secret: config.client_secret(),
            username: &credentials.username,
            password: &credentials.password,
        };

        let response = self
            .client
            .post(config.token_url().clone())
            .header(header::ACCEPT, "application/json")
            .form(&form)
            .send()
            .await
            .map_err(|e| GateError::Transport(error_text(&e)))?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(GateError::AuthenticationRejected(status));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| GateError::ResponseRead(error_text(&e)))?;

        TokenResponse::from_slice(&body).map_err(|e| GateError::ResponseParse(e.to_string()))
    }
}

/// Render an error with its source chain, e.g.
/// `error sending request for url (...): tcp connect error: Connection refused`.
fn error_text(err: &reqwest::Error) -> String {
    let mut text = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let cause_text = cause.to_string();
        if !text.contains(&cause_text) {
            text.push_str(": ");
            text.push_str(&cause_text);
        }
        source = cause.source();
    }
    text
}
