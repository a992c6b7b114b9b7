// HTTP registration surface
//
// Peers and fallbacks announce themselves with `POST /register` and leave
// with `POST /unregister`. The address defaults to the caller's socket
// address when the form does not carry one.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use axum::extract::{ConnectInfo, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use peerscanner_core::{Error, HostRegistry};
use serde::Deserialize;
use tracing::{debug, warn};

/// Fields accepted by `/register` and `/unregister`
#[derive(Debug, Deserialize)]
pub struct RegistrationForm {
    pub name: String,
    #[serde(default)]
    pub ip: Option<String>,
}

/// Build the router over a loaded registry
pub fn router(registry: Arc<HostRegistry>) -> Router {
    Router::new()
        .route("/register", post(register))
        .route("/unregister", post(unregister))
        .route("/hosts", get(hosts))
        .route("/health", get(health))
        .with_state(registry)
}

/// Address to register: the form's `ip`, else the caller's address
fn resolve_ip(form_ip: Option<&str>, peer: SocketAddr) -> Result<IpAddr, Error> {
    match form_ip.map(str::trim).filter(|ip| !ip.is_empty()) {
        Some(ip) => ip
            .parse::<IpAddr>()
            .map(|ip| ip.to_canonical())
            .map_err(|_| Error::invalid_input(format!("Invalid ip: {}", ip))),
        None => Ok(peer.ip().to_canonical()),
    }
}

async fn register(
    State(registry): State<Arc<HostRegistry>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    Form(form): Form<RegistrationForm>,
) -> Response {
    let ip = match resolve_ip(form.ip.as_deref(), peer) {
        Ok(ip) => ip,
        Err(e) => return error_response(e),
    };

    match registry.get_or_create(form.name.trim(), ip) {
        Ok(host) => {
            debug!("Registration from {} for {}", peer, host.key());
            Json(host.snapshot()).into_response()
        }
        Err(e) => error_response(e),
    }
}

async fn unregister(
    State(registry): State<Arc<HostRegistry>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    Form(form): Form<RegistrationForm>,
) -> Response {
    let ip = match resolve_ip(form.ip.as_deref(), peer) {
        Ok(ip) => ip,
        Err(e) => return error_response(e),
    };

    match registry.unregister(form.name.trim(), ip) {
        Some(host) => {
            debug!("Unregistered {} on request from {}", host.key(), peer);
            (StatusCode::OK, "OK").into_response()
        }
        None => (StatusCode::NOT_FOUND, "Host not registered").into_response(),
    }
}

async fn hosts(State(registry): State<Arc<HostRegistry>>) -> impl IntoResponse {
    Json(registry.snapshot())
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

fn error_response(error: Error) -> Response {
    let status = match error {
        Error::InvalidInput(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        warn!("Request failed: {}", error);
    }
    (status, error.to_string()).into_response()
}
