//! Host configuration: listener settings and the table of gated routes.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

use crate::gate::{AuthGate, ConfigError, DEFAULT_TIMEOUT, IamConfig};

/// Prefix for environment overrides, e.g. `IAM_GATE__SERVER__PORT=9000`.
pub const ENV_PREFIX: &str = "IAM_GATE";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub routes: Vec<RouteConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind to.
    pub bind: String,
    /// Port to listen on.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

/// One gated route: a mount path, the service behind it, and the IAM
/// parameters its gate is built from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteConfig {
    /// Gate instance name.
    pub name: String,
    /// Mount prefix. `/` gates everything except the health endpoint.
    #[serde(default = "default_route_path")]
    pub path: String,
    /// Base URL of the downstream service.
    pub upstream: String,
    /// Token exchange timeout in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    /// Raw IAM parameters (`ClientId`, `ClientSecret`, `Url`,
    /// `usernameParam`, `passwordParam`).
    #[serde(default)]
    pub iam: BTreeMap<String, String>,
}

fn default_route_path() -> String {
    "/".to_string()
}

impl RouteConfig {
    pub fn timeout(&self) -> Duration {
        self.timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_TIMEOUT)
    }

    /// Validate this route's IAM parameters and build its gate.
    pub fn build_gate(&self) -> Result<AuthGate, ConfigError> {
        let config = IamConfig::from_map(&self.iam)?;
        AuthGate::with_timeout(config, &self.name, self.timeout())
    }
}

impl AppConfig {
    /// Load configuration from a TOML file layered with `IAM_GATE__*`
    /// environment variables. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, config::ConfigError> {
        Config::builder()
            .set_default("server.bind", "127.0.0.1")?
            .set_default("server.port", 8080_i64)?
            .add_source(
                File::from(path)
                    .format(FileFormat::Toml)
                    .required(false),
            )
            .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?
            .try_deserialize()
    }

    /// Template written by `iam-gate config init`.
    pub fn example() -> Self {
        let iam = [
            ("ClientId", "my-gateway"),
            ("ClientSecret", "env:IAM_CLIENT_SECRET"),
            (
                "Url",
                "https://idp.example.com/realms/main/protocol/openid-connect/token",
            ),
            ("usernameParam", "username"),
            ("passwordParam", "password"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        Self {
            server: ServerConfig::default(),
            routes: vec![RouteConfig {
                name: "api".to_string(),
                path: "/api".to_string(),
                upstream: "http://127.0.0.1:9000".to_string(),
                timeout_secs: Some(DEFAULT_TIMEOUT.as_secs()),
                iam,
            }],
        }
    }
}
