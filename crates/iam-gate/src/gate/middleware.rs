//! Authentication gate middleware.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    extract::{Request, State},
    http::{HeaderValue, StatusCode, header::AUTHORIZATION},
    middleware::{self, Next},
    response::Response,
};
use tracing::{debug, warn};

use super::token::DEFAULT_TIMEOUT;
use super::{ConfigError, Credentials, GateError, IamConfig, TokenClient};

#[derive(Debug)]
struct GateInner {
    name: String,
    config: IamConfig,
    client: TokenClient,
}

/// One configured gate instance.
///
/// Created once per protected route and shared by every request on it.
/// Holds no per-request state.
#[derive(Debug, Clone)]
pub struct AuthGate {
    inner: Arc<GateInner>,
}

impl AuthGate {
    /// Create a gate with the default outbound timeout.
    pub fn new(config: IamConfig, name: impl Into<String>) -> Result<Self, ConfigError> {
        Self::with_timeout(config, name, DEFAULT_TIMEOUT)
    }

    /// Create a gate whose token exchanges give up after `timeout`.
    pub fn with_timeout(
        config: IamConfig,
        name: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ConfigError> {
        let client =
            TokenClient::new(timeout).map_err(|e| ConfigError::HttpClient(e.to_string()))?;

        Ok(Self {
            inner: Arc::new(GateInner {
                name: name.into(),
                config,
                client,
            }),
        })
    }

    /// Validate a raw parameter map and create a gate from it.
    pub fn from_map<I, K, V>(raw: I, name: impl Into<String>) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        Self::new(IamConfig::from_map(raw)?, name)
    }

    /// Instance name, used in diagnostics only.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn config(&self) -> &IamConfig {
        &self.inner.config
    }

    /// Put the gate in front of `next`.
    ///
    /// Every route and the fallback of `next` are gated.
    pub fn wrap<S>(&self, next: Router<S>) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        next.layer(middleware::from_fn_with_state(self.clone(), gate_middleware))
    }

    /// Authenticate `req` against the identity provider.
    ///
    /// On success the request carries `Authorization: Bearer <token>`
    /// (replacing any earlier value) and the decoded [`TokenResponse`] in
    /// its extensions. On failure the request is left untouched.
    ///
    /// [`TokenResponse`]: super::TokenResponse
    pub async fn authorize(&self, req: &mut Request) -> Result<(), GateError> {
        let config = &self.inner.config;

        let credentials = Credentials::from_query(req.uri().query(), config).inspect_err(|e| {
            debug!(gate = %self.name(), "rejecting request: {e}");
        })?;

        let token = self
            .inner
            .client
            .exchange(config, &credentials)
            .await
            .inspect_err(|e| self.log_exchange_failure(e))?;

        let mut value = HeaderValue::from_str(&token.bearer()).map_err(|e| {
            warn!(gate = %self.name(), "identity provider issued an unusable token: {e}");
            GateError::InvalidToken(e.to_string())
        })?;
        value.set_sensitive(true);

        req.headers_mut().insert(AUTHORIZATION, value);
        req.extensions_mut().insert(token);

        debug!(
            gate = %self.name(),
            username = %credentials.username,
            "credentials accepted, forwarding request"
        );
        Ok(())
    }

    fn log_exchange_failure(&self, err: &GateError) {
        if err.status_code() == StatusCode::INTERNAL_SERVER_ERROR {
            warn!(
                gate = %self.name(),
                url = %self.inner.config.token_url(),
                "token exchange failed: {err}"
            );
        } else {
            debug!(gate = %self.name(), "token exchange refused: {err}");
        }
    }
}

/// Gate middleware.
///
/// Either forwards the authenticated request to `next` or answers with
/// the error, never both.
pub async fn gate_middleware(
    State(gate): State<AuthGate>,
    mut req: Request,
    next: Next,
) -> Result<Response, GateError> {
    gate.authorize(&mut req).await?;
    Ok(next.run(req).await)
}
