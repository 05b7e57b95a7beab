//! Router construction from the route table.

use std::collections::HashSet;

use axum::{Json, Router, routing::get};
use serde_json::{Value, json};
use tower_http::trace::TraceLayer;
use tracing::info;

use super::error::RouteError;
use super::proxy::{self, HttpClient, UpstreamProxy};
use crate::settings::{AppConfig, RouteConfig};

/// Public, ungated health endpoint.
pub const HEALTH_PATH: &str = "/health";

/// Build the host router. Every gate is constructed here, so a bad route
/// fails the whole table before anything is served.
pub fn create_router(config: &AppConfig) -> Result<Router, RouteError> {
    let client = proxy::http_client();
    let mut router = Router::new().route(HEALTH_PATH, get(health));
    let mut root: Option<Router> = None;
    let mut mounted = HashSet::new();

    for route in &config.routes {
        let path = mount_path(route)?;
        if !mounted.insert(path.clone()) {
            return Err(RouteError::DuplicatePath {
                route: route.name.clone(),
                path,
            });
        }

        let protected = gated_upstream(route, client.clone())?;
        info!(
            route = %route.name,
            path = %path,
            upstream = %route.upstream,
            "mounted gated route"
        );

        if path == "/" {
            root = Some(protected);
        } else {
            router = router.nest(&path, protected);
        }
    }

    if let Some(root) = root {
        router = router.fallback_service(root);
    }

    Ok(router.layer(TraceLayer::new_for_http()))
}

/// Gate in front of a proxy to the route's upstream.
fn gated_upstream(route: &RouteConfig, client: HttpClient) -> Result<Router, RouteError> {
    if route.timeout_secs == Some(0) {
        return Err(RouteError::InvalidTimeout {
            route: route.name.clone(),
        });
    }

    let gate = route.build_gate().map_err(|source| RouteError::Gate {
        route: route.name.clone(),
        source,
    })?;

    let upstream = UpstreamProxy::new(client, &route.upstream).map_err(|reason| {
        RouteError::InvalidUpstream {
            route: route.name.clone(),
            upstream: route.upstream.clone(),
            reason,
        }
    })?;

    let next = Router::new()
        .fallback(proxy::proxy_upstream)
        .with_state(upstream);
    Ok(gate.wrap(next))
}

/// Normalise a route's mount path: leading `/`, no trailing `/`.
fn mount_path(route: &RouteConfig) -> Result<String, RouteError> {
    let invalid = |reason| RouteError::InvalidPath {
        route: route.name.clone(),
        path: route.path.clone(),
        reason,
    };

    let path = route.path.trim();
    if !path.starts_with('/') {
        return Err(invalid("must start with '/'"));
    }
    if path.contains(['{', '}', '*', '?', '#']) {
        return Err(invalid("must be a literal path"));
    }

    let path = match path.trim_end_matches('/') {
        "" => "/".to_string(),
        trimmed => trimmed.to_string(),
    };
    if path == HEALTH_PATH || path.starts_with("/health/") {
        return Err(invalid("reserved for the health endpoint"));
    }

    Ok(path)
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
