//! Route table errors, reported at startup.

use thiserror::Error;

use crate::gate::ConfigError;

#[derive(Debug, Error)]
pub enum RouteError {
    /// The route's IAM parameters do not form a valid gate.
    #[error("route `{route}`: {source}")]
    Gate {
        route: String,
        #[source]
        source: ConfigError,
    },

    #[error("route `{route}`: invalid path `{path}`: {reason}")]
    InvalidPath {
        route: String,
        path: String,
        reason: &'static str,
    },

    #[error("route `{route}`: path `{path}` is already mounted")]
    DuplicatePath { route: String, path: String },

    #[error("route `{route}`: invalid upstream `{upstream}`: {reason}")]
    InvalidUpstream {
        route: String,
        upstream: String,
        reason: String,
    },

    #[error("route `{route}`: timeout_secs must be greater than zero")]
    InvalidTimeout { route: String },
}

impl RouteError {
    /// Name of the route the error belongs to.
    pub fn route(&self) -> &str {
        match self {
            Self::Gate { route, .. }
            | Self::InvalidPath { route, .. }
            | Self::DuplicatePath { route, .. }
            | Self::InvalidUpstream { route, .. }
            | Self::InvalidTimeout { route } => route,
        }
    }
}
