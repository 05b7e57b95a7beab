//! OAuth2 password-grant authentication gate.
//!
//! [`gate::AuthGate`] sits in front of an axum [`axum::Router`], trades the
//! username/password found in each request's query string for an access
//! token at the identity provider, and forwards the request with
//! `Authorization: Bearer <token>`. The [`api`] and [`settings`] modules
//! turn a table of such gates into a runnable reverse proxy.

pub mod api;
pub mod gate;
pub mod settings;

pub use gate::{AuthGate, ConfigError, GateError, IamConfig, TokenResponse};
