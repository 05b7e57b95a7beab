//! IAM configuration contract.
//!
//! The host hands the gate a flat map of string parameters. The map is
//! validated once, at construction, and resolved into typed fields so the
//! request path never looks anything up by key.

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use reqwest::Url;
use thiserror::Error;

/// OAuth2 client identifier registered with the identity provider.
pub const CLIENT_ID_KEY: &str = "ClientId";
/// OAuth2 client secret. Accepts `env:VAR_NAME`.
pub const CLIENT_SECRET_KEY: &str = "ClientSecret";
/// Token endpoint of the identity provider.
pub const URL_KEY: &str = "Url";
/// Query parameter carrying the username.
pub const USERNAME_PARAM_KEY: &str = "usernameParam";
/// Query parameter carrying the password.
pub const PASSWORD_PARAM_KEY: &str = "passwordParam";

/// Every key the configuration must define, in reporting order.
pub const REQUIRED_KEYS: [&str; 5] = [
    CLIENT_ID_KEY,
    CLIENT_SECRET_KEY,
    URL_KEY,
    USERNAME_PARAM_KEY,
    PASSWORD_PARAM_KEY,
];

/// Configuration validation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A required key is absent.
    #[error("IAM Configuration must be defined: missing key `{0}`")]
    MissingKey(&'static str),

    /// A required key is present but blank.
    #[error("IAM Configuration must be defined: key `{0}` is empty")]
    EmptyKey(&'static str),

    /// A key the gate does not recognise.
    #[error("IAM Configuration must be defined: unknown key `{0}`")]
    UnknownKey(String),

    /// The same key was given twice with different letter case.
    #[error("IAM Configuration must be defined: key `{0}` is given more than once")]
    DuplicateKey(&'static str),

    /// The token endpoint is not an absolute http(s) URL.
    #[error("IAM Configuration must be defined: invalid Url `{url}`: {reason}")]
    InvalidUrl { url: String, reason: String },

    /// Environment variable not found (for `env:VAR_NAME` syntax).
    #[error(
        "IAM Configuration must be defined: environment variable '{0}' not found (referenced via env:{0})"
    )]
    EnvVarNotFound(String),

    /// Environment variable is empty (for `env:VAR_NAME` syntax).
    #[error(
        "IAM Configuration must be defined: environment variable '{0}' is empty (referenced via env:{0})"
    )]
    EnvVarEmpty(String),

    /// The outbound HTTP client could not be built (TLS backend setup).
    #[error("IAM Configuration must be defined: cannot build HTTP client: {0}")]
    HttpClient(String),
}

/// Validated IAM configuration.
///
/// Immutable after construction and shared read-only by every request the
/// gate handles.
#[derive(Clone, PartialEq, Eq)]
pub struct IamConfig {
    client_id: String,
    client_secret: String,
    token_url: Url,
    username_param: String,
    password_param: String,
}

impl IamConfig {
    /// Validate a raw parameter map and resolve it into typed fields.
    ///
    /// Keys match ASCII-case-insensitively because layered config sources
    /// may fold key case. Every required key must be present and non-blank;
    /// anything else in the map is rejected.
    pub fn from_map<I, K, V>(raw: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut slots: [Option<String>; 5] = Default::default();
        let mut unknown = BTreeSet::new();

        for (key, value) in raw {
            let key = key.as_ref();
            match REQUIRED_KEYS
                .iter()
                .position(|required| required.eq_ignore_ascii_case(key))
            {
                Some(idx) => {
                    if slots[idx].is_some() {
                        return Err(ConfigError::DuplicateKey(REQUIRED_KEYS[idx]));
                    }
                    slots[idx] = Some(value.into());
                }
                None => {
                    unknown.insert(key.to_string());
                }
            }
        }

        if let Some(key) = unknown.into_iter().next() {
            return Err(ConfigError::UnknownKey(key));
        }

        let [client_id, client_secret, url, username_param, password_param] = slots;
        let client_id = required(CLIENT_ID_KEY, client_id)?;
        let client_secret = required(CLIENT_SECRET_KEY, client_secret)?;
        let url = required(URL_KEY, url)?;
        let username_param = required(USERNAME_PARAM_KEY, username_param)?;
        let password_param = required(PASSWORD_PARAM_KEY, password_param)?;

        Ok(Self {
            client_id,
            client_secret: resolve_secret(&client_secret)?,
            token_url: parse_token_url(&url)?,
            username_param,
            password_param,
        })
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn client_secret(&self) -> &str {
        &self.client_secret
    }

    /// Token endpoint of the identity provider.
    pub fn token_url(&self) -> &Url {
        &self.token_url
    }

    pub fn username_param(&self) -> &str {
        &self.username_param
    }

    pub fn password_param(&self) -> &str {
        &self.password_param
    }
}

impl TryFrom<HashMap<String, String>> for IamConfig {
    type Error = ConfigError;

    fn try_from(raw: HashMap<String, String>) -> Result<Self, Self::Error> {
        Self::from_map(raw)
    }
}

impl fmt::Debug for IamConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IamConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("token_url", &self.token_url.as_str())
            .field("username_param", &self.username_param)
            .field("password_param", &self.password_param)
            .finish()
    }
}

fn required(key: &'static str, value: Option<String>) -> Result<String, ConfigError> {
    let value = value.ok_or(ConfigError::MissingKey(key))?;
    if value.trim().is_empty() {
        return Err(ConfigError::EmptyKey(key));
    }
    Ok(value)
}

/// Resolve the client secret, expanding `env:VAR_NAME` syntax.
fn resolve_secret(value: &str) -> Result<String, ConfigError> {
    let Some(var_name) = value.strip_prefix("env:") else {
        return Ok(value.to_string());
    };

    match std::env::var(var_name) {
        Ok(secret) if !secret.is_empty() => Ok(secret),
        Ok(_) => Err(ConfigError::EnvVarEmpty(var_name.to_string())),
        Err(_) => Err(ConfigError::EnvVarNotFound(var_name.to_string())),
    }
}

fn parse_token_url(value: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(value.trim()).map_err(|e| ConfigError::InvalidUrl {
        url: value.to_string(),
        reason: e.to_string(),
    })?;

    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(ConfigError::InvalidUrl {
            url: value.to_string(),
            reason: format!("unsupported scheme `{other}`"),
        }),
    }
}
