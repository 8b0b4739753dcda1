//! HTTP handlers for Parley server.
//!
//! Login, channel management and the WebSocket upgrade. The socket itself is
//! served by [`crate::connection`].

use crate::config::Config;
use crate::connection::{self, Wire};
use crate::lobby::{Lobby, LoginError};
use crate::metrics;
use anyhow::Result;
use axum::{
    extract::{ws::WebSocketUpgrade, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use parley_core::{BroadcastHub, RegistryError};
use parley_protocol::{Version, PROTOCOL_VERSION};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, error, info};

/// Maximum channel name length.
pub const MAX_CHANNEL_NAME_LENGTH: usize = 256;

/// Shared server state.
pub struct AppState {
    /// The channel engine.
    pub hub: BroadcastHub,
    /// Logged-in identities.
    pub lobby: Lobby,
    /// Server configuration.
    pub config: Config,
}

impl AppState {
    /// Create new app state.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self {
            hub: BroadcastHub::with_config(config.hub_config()),
            lobby: Lobby::new(config.limits.max_identity_length),
            config,
        }
    }
}

/// Run the HTTP/WebSocket server.
///
/// # Errors
///
/// Returns an error if the server fails to start.
pub async fn run_server(config: Config) -> Result<()> {
    let addr = config.bind_addr()?;
    let state = Arc::new(AppState::new(config.clone()));

    // Start metrics server if enabled
    if config.metrics.enabled {
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            error!("Failed to start metrics server: {}", e);
        }
    }

    let app = build_router(state);
    let listener = TcpListener::bind(addr).await?;

    info!("Parley server listening on {}", addr);
    info!(
        "WebSocket endpoint: ws://{}{}",
        addr, config.delivery.websocket_path
    );

    axum::serve(listener, app).await?;

    Ok(())
}

/// Build the application routes.
pub fn build_router(state: Arc<AppState>) -> Router {
    let ws_path = state.config.delivery.websocket_path.clone();
    Router::new()
        .route("/login", post(login_handler))
        .route("/logout", post(logout_handler))
        .route("/channels", get(list_channels_handler).post(create_channel_handler))
        .route("/channels/:name", get(enter_channel_handler))
        .route("/health", get(health_handler))
        .route(&ws_path, get(ws_handler))
        .with_state(state)
}

/// An error rendered as a JSON body.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

impl From<RegistryError> for ApiError {
    fn from(e: RegistryError) -> Self {
        let status = match e {
            RegistryError::DuplicateChannel(_) => StatusCode::CONFLICT,
            RegistryError::ChannelNotFound(_) => StatusCode::NOT_FOUND,
            RegistryError::MaxChannelsReached => StatusCode::SERVICE_UNAVAILABLE,
        };
        Self::new(status, e.to_string())
    }
}

impl From<LoginError> for ApiError {
    fn from(e: LoginError) -> Self {
        let status = match e {
            LoginError::Empty | LoginError::TooLong(_) => StatusCode::BAD_REQUEST,
            LoginError::NotLoggedIn(_) => StatusCode::UNAUTHORIZED,
            LoginError::InUse(_)
            | LoginError::AlreadyConnected(_)
            | LoginError::StillConnected(_) => StatusCode::CONFLICT,
        };
        Self::new(status, e.to_string())
    }
}

#[derive(Debug, Deserialize)]
struct IdentityRequest {
    identity: String,
}

#[derive(Debug, Deserialize)]
struct CreateChannelRequest {
    name: String,
}

#[derive(Debug, Deserialize)]
struct WsParams {
    identity: String,
    version: Option<String>,
    wire: Option<Wire>,
}

/// Health check handler.
async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let stats = state.hub.stats();
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "protocol": PROTOCOL_VERSION.to_string(),
        "channels": stats.registry.channel_count,
        "connections": stats.attached_sinks,
        "logged_in": state.lobby.len(),
    }))
}

async fn login_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<IdentityRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let identity = state.lobby.login(&request.identity)?;
    Ok(Json(json!({ "identity": identity })))
}

async fn logout_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<IdentityRequest>,
) -> Result<StatusCode, ApiError> {
    state.lobby.logout(request.identity.trim())?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_channels_handler(State(state): State<Arc<AppState>>) -> Json<Vec<String>> {
    Json(state.hub.list_channels())
}

async fn create_channel_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CreateChannelRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    validate_channel_name(&request.name)
        .map_err(|reason| ApiError::new(StatusCode::BAD_REQUEST, reason))?;
    state.hub.create_channel(&request.name)?;
    metrics::set_active_channels(state.hub.registry().len());
    debug!(channel = %request.name, "Channel created over HTTP");
    Ok((StatusCode::CREATED, Json(json!({ "name": request.name }))))
}

async fn enter_channel_handler(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.hub.enter_channel(&name)?))
}

/// Check that a channel name can be used as a `/channels/:name` path segment.
fn validate_channel_name(name: &str) -> Result<(), &'static str> {
    if name.trim().is_empty() {
        return Err("Channel name cannot be empty");
    }
    if name.len() > MAX_CHANNEL_NAME_LENGTH {
        return Err("Channel name too long");
    }
    if name.contains('/') {
        return Err("Channel name cannot contain '/'");
    }
    if name.chars().any(char::is_control) {
        return Err("Channel name contains invalid characters");
    }
    Ok(())
}

/// WebSocket upgrade handler.
async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<WsParams>,
    State(state): State<Arc<AppState>>,
) -> Result<Response, ApiError> {
    if !state.lobby.is_logged_in(&params.identity) {
        return Err(ApiError::new(StatusCode::UNAUTHORIZED, "Not logged in"));
    }
    if let Some(requested) = params.version.as_deref() {
        check_version(requested)?;
    }

    let identity = params.identity;
    let wire = params.wire.unwrap_or_default();
    Ok(ws.on_upgrade(move |socket| connection::handle_socket(socket, state, identity, wire)))
}

fn check_version(requested: &str) -> Result<(), ApiError> {
    let version: Version = requested
        .parse()
        .map_err(|e: &str| ApiError::new(StatusCode::BAD_REQUEST, e))?;
    if !version.is_compatible_with(&PROTOCOL_VERSION) {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            format!("Unsupported protocol version {version}, server speaks {PROTOCOL_VERSION}"),
        ));
    }
    Ok(())
}
