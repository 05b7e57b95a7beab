//! HTTP proxy to the service behind a gate.

use axum::{
    body::Body,
    extract::{Request, State},
    http::{HeaderValue, StatusCode, Uri, header::HOST},
    response::Response,
};
use hyper_util::client::legacy::{Client, connect::HttpConnector};
use hyper_util::rt::TokioExecutor;
use tracing::{debug, error};

pub type HttpClient = Client<HttpConnector, Body>;

/// Shared connection pool for all upstreams.
pub fn http_client() -> HttpClient {
    Client::builder(TokioExecutor::new()).build_http()
}

/// Forwarding target of one route.
#[derive(Clone)]
pub struct UpstreamProxy {
    client: HttpClient,
    base: Uri,
}

impl UpstreamProxy {
    /// Target `upstream`, which must be an absolute `http://` URL.
    pub fn new(client: HttpClient, upstream: &str) -> Result<Self, String> {
        let base: Uri = upstream.parse().map_err(|e| format!("{e}"))?;

        match base.scheme_str() {
            Some("http") => {}
            Some(other) => return Err(format!("unsupported scheme `{other}`")),
            None => return Err("missing scheme".to_string()),
        }
        if base.authority().is_none() {
            return Err("missing host".to_string());
        }

        Ok(Self { client, base })
    }

    /// Join the upstream base with the request's (already unmounted) path.
    pub fn target_uri(&self, path: &str, query: Option<&str>) -> Result<Uri, String> {
        let base_path = self.base.path().trim_end_matches('/');
        let path = if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{path}")
        };

        let mut target = format!(
            "{}://{}{}{}",
            self.base.scheme_str().unwrap_or("http"),
            self.base.authority().map(|a| a.as_str()).unwrap_or_default(),
            base_path,
            path
        );
        if let Some(query) = query.filter(|q| !q.is_empty()) {
            target.push('?');
            target.push_str(query);
        }

        target.parse().map_err(|e| format!("{e}"))
    }
}

/// Forward the (already authenticated) request upstream.
pub async fn proxy_upstream(
    State(proxy): State<UpstreamProxy>,
    mut req: Request,
) -> Result<Response, StatusCode> {
    let uri = proxy
        .target_uri(req.uri().path(), req.uri().query())
        .map_err(|e| {
            error!("Invalid upstream URI for {}: {}", req.uri(), e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    debug!("Proxying request to {}", uri);
    *req.uri_mut() = uri;

    // Host must name the upstream, not the gate.
    if let Some(authority) = req.uri().authority() {
        let value = HeaderValue::from_str(authority.as_str()).map_err(|e| {
            error!("Invalid Host header value {}: {:?}", authority.as_str(), e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?;
        req.headers_mut().insert(HOST, value);
    }

    let response = proxy.client.request(req).await.map_err(|e| {
        error!("Proxy request failed: {:?}", e);
        StatusCode::BAD_GATEWAY
    })?;

    let (parts, body) = response.into_parts();
    Ok(Response::from_parts(parts, Body::new(body)))
}
