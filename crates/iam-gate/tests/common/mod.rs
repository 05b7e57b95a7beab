//! Test utilities: a stub identity provider and a downstream service.

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    Form, Json, Router,
    extract::{Request, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{any, get, post},
};
use iam_gate::TokenResponse;
use serde_json::{Value, json};
use tokio::net::TcpListener;

/// How the stub identity provider answers.
#[derive(Debug, Clone)]
pub enum IdpBehavior {
    /// 200 with a token response carrying this access token.
    Token(&'static str),
    /// This status with an error body.
    Status(StatusCode),
    /// 200 with this literal body.
    Body(&'static str),
    /// Wait before answering with a token.
    Delay(Duration),
}

#[derive(Clone)]
struct IdpState {
    behavior: IdpBehavior,
    calls: Arc<AtomicUsize>,
    forms: Arc<Mutex<Vec<HashMap<String, String>>>>,
    content_types: Arc<Mutex<Vec<String>>>,
}

/// Running stub identity provider.
pub struct StubIdp {
    pub url: String,
    calls: Arc<AtomicUsize>,
    forms: Arc<Mutex<Vec<HashMap<String, String>>>>,
    content_types: Arc<Mutex<Vec<String>>>,
}

impl StubIdp {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Form fields of every token request received so far.
    pub fn forms(&self) -> Vec<HashMap<String, String>> {
        self.forms.lock().unwrap().clone()
    }

    pub fn content_types(&self) -> Vec<String> {
        self.content_types.lock().unwrap().clone()
    }
}

/// Serve a router on an ephemeral localhost port.
pub async fn serve(app: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

/// Start a stub token endpoint at `http://127.0.0.1:<port>/token`.
pub async fn spawn_idp(behavior: IdpBehavior) -> StubIdp {
    let state = IdpState {
        behavior,
        calls: Arc::new(AtomicUsize::new(0)),
        forms: Arc::new(Mutex::new(Vec::new())),
        content_types: Arc::new(Mutex::new(Vec::new())),
    };
    let idp = StubIdp {
        url: String::new(),
        calls: state.calls.clone(),
        forms: state.forms.clone(),
        content_types: state.content_types.clone(),
    };

    let app = Router::new()
        .route("/token", post(token_endpoint))
        .with_state(state);
    let addr = serve(app).await;

    StubIdp {
        url: format!("http://{addr}/token"),
        ..idp
    }
}

fn token_body(access_token: &str) -> Value {
    json!({
        "access_token": access_token,
        "expires_in": 300,
        "refresh_expires_in": 1800,
        "refresh_token": "refresh",
        "token_type": "Bearer",
        "not-before-policy": 0,
        "session_state": "state-1",
        "scope": "profile email"
    })
}

async fn token_endpoint(
    State(state): State<IdpState>,
    headers: HeaderMap,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    state.calls.fetch_add(1, Ordering::SeqCst);
    state.forms.lock().unwrap().push(form);
    if let Some(ct) = headers.get(header::CONTENT_TYPE).and_then(|v| v.to_str().ok()) {
        state.content_types.lock().unwrap().push(ct.to_string());
    }

    match state.behavior {
        IdpBehavior::Token(token) => Json(token_body(token)).into_response(),
        IdpBehavior::Status(status) => {
            (status, Json(json!({"error": "invalid_grant"}))).into_response()
        }
        IdpBehavior::Body(body) => (StatusCode::OK, body).into_response(),
        IdpBehavior::Delay(delay) => {
            tokio::time::sleep(delay).await;
            Json(token_body("late")).into_response()
        }
    }
}

/// An address nothing listens on.
pub async fn unused_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}/token")
}

/// IAM parameters pointing at `url`.
pub fn iam_params(url: &str) -> Vec<(String, String)> {
    [
        ("ClientId", "orders-gateway"),
        ("ClientSecret", "gateway-secret"),
        ("Url", url),
        ("usernameParam", "user"),
        ("passwordParam", "pass"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

/// Downstream handler that records calls and echoes what the gate forwarded.
#[derive(Clone, Default)]
pub struct Downstream {
    calls: Arc<AtomicUsize>,
}

impl Downstream {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/resource", get(echo))
            .with_state(self.clone())
    }
}

async fn echo(State(downstream): State<Downstream>, req: Request) -> Json<Value> {
    downstream.calls.fetch_add(1, Ordering::SeqCst);

    let authorization: Vec<String> = req
        .headers()
        .get_all(header::AUTHORIZATION)
        .iter()
        .filter_map(|v| v.to_str().ok().map(str::to_string))
        .collect();
    let expires_in = req
        .extensions()
        .get::<TokenResponse>()
        .map(|token| token.expires_in);

    Json(json!({
        "authorization": authorization,
        "expires_in": expires_in,
        "query": req.uri().query(),
    }))
}

/// Upstream HTTP service for host tests: echoes what it received.
pub async fn spawn_upstream() -> SocketAddr {
    let app = Router::new().fallback(any(upstream_echo));
    serve(app).await
}

async fn upstream_echo(req: Request) -> Json<Value> {
    let header = |name: header::HeaderName| {
        req.headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };

    Json(json!({
        "method": req.method().as_str(),
        "path": req.uri().path(),
        "query": req.uri().query(),
        "authorization": header(header::AUTHORIZATION),
        "host": header(header::HOST),
    }))
}

pub async fn body_string(response: Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

pub async fn body_json(response: Response) -> Value {
    serde_json::from_str(&body_string(response).await).unwrap()
}
