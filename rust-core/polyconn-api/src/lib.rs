// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//! PolyConn API
//!
//! HTTP pass-through server over a single configured connector.
//! Every route maps onto one client operation on JSON values.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use polyconn_storage::{
    ConnectorClient, ConnectorConfig, ConnectorError, ConnectorWrapper, MetricsWrapper,
    OperationsFactory, WrapperStats,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{info, instrument, warn};

/// API errors
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Connector(#[from] ConnectorError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Connector(err) => match err {
                ConnectorError::InvalidEntity(_) => StatusCode::BAD_REQUEST,
                ConnectorError::Decode { .. } | ConnectorError::CorruptedData(_) => {
                    StatusCode::UNPROCESSABLE_ENTITY
                }
                ConnectorError::Unsupported { .. } => StatusCode::NOT_IMPLEMENTED,
                ConnectorError::Driver { .. } | ConnectorError::Http { .. } => {
                    StatusCode::BAD_GATEWAY
                }
                ConnectorError::Config(_) | ConnectorError::Io(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status();
        if status.is_server_error() {
            warn!(code = status.as_u16(), error = %self, "request failed");
        }

        let body = Json(ErrorResponse {
            error: self.to_string(),
            code: status.as_u16(),
        });

        (status, body).into_response()
    }
}

/// Error response body
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: u16,
}

/// API configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Host to bind to
    pub host: String,
    /// Port to bind to
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

impl ApiConfig {
    /// Defaults overridden by `POLYCONN_HOST` and `POLYCONN_PORT`.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Defaults overridden through an arbitrary variable lookup.
    ///
    /// An unparseable port is logged and ignored.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(host) = lookup("POLYCONN_HOST").filter(|h| !h.is_empty()) {
            config.host = host;
        }
        if let Some(port) = lookup("POLYCONN_PORT") {
            match port.parse() {
                Ok(port) => config.port = port,
                Err(_) => warn!(%port, "ignoring invalid POLYCONN_PORT"),
            }
        }
        config
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub backend: String,
    pub connected: bool,
    pub version: String,
    pub uptime_seconds: u64,
}

/// `?key=` parameters of the single insert routes
#[derive(Debug, Deserialize)]
pub struct InsertParams {
    pub key: String,
}

/// `?key=&expiration=` parameters; expiration is in seconds
#[derive(Debug, Deserialize)]
pub struct ExpiringInsertParams {
    pub key: String,
    pub expiration: u64,
}

/// Optional `?expiration=` parameter of the bulk routes
#[derive(Debug, Default, Deserialize)]
pub struct InsertManyParams {
    pub expiration: Option<u64>,
}

/// Application state
#[derive(Clone)]
pub struct AppState {
    pub start_time: Instant,
    pub client: Arc<ConnectorClient<Value>>,
    pub metrics: Arc<MetricsWrapper<Arc<dyn ConnectorWrapper>>>,
}

impl AppState {
    /// State over an existing wrapper, with statistics collected in front
    /// of it.
    pub fn new(wrapper: Arc<dyn ConnectorWrapper>) -> Self {
        let metrics = Arc::new(MetricsWrapper::new(wrapper));
        let client = ConnectorClient::with_wrapper(metrics.clone());
        Self {
            start_time: Instant::now(),
            client: Arc::new(client),
            metrics,
        }
    }

    /// State for the backend named by `config`. Does not connect.
    pub fn from_config(config: &ConnectorConfig) -> Result<Self, ConnectorError> {
        let wrapper = OperationsFactory::wrapper(config)?;
        info!(backend = wrapper.name(), "connector client created");
        Ok(Self::new(wrapper))
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("backend", &self.client.name())
            .finish_non_exhaustive()
    }
}

/// Build the API router
///
/// The fixed routes (`/all`, `/health`, `/stats`, `/insert…`) take
/// precedence over `/{key}`, so records under those keys are reachable
/// only through `/async/{key}`.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        // Health and statistics
        .route("/health", get(health_handler))
        .route("/stats", get(stats_handler))
        // Reads
        .route("/all", get(get_all_handler))
        // Inserts
        .route("/insert", post(insert_handler))
        .route("/insert-async", post(insert_handler))
        .route("/insert/with-expiration", post(insert_with_expiration_handler))
        .route(
            "/insert-async/with-expiration",
            post(insert_with_expiration_handler),
        )
        .route("/insert-many", post(insert_many_handler))
        .route(
            "/insert-many/with-expiration",
            post(insert_many_with_expiration_handler),
        )
        // Per-key get / update / delete
        .route(
            "/{key}",
            get(get_handler).put(update_handler).delete(delete_handler),
        )
        .route(
            "/async/{key}",
            get(get_handler).put(update_handler).delete(delete_handler),
        )
        .with_state(state)
}

/// Health check handler
#[instrument(skip(state))]
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        backend: state.client.name().to_string(),
        connected: state.client.is_connected(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
    })
}

/// Operation statistics handler
#[instrument(skip(state))]
async fn stats_handler(State(state): State<AppState>) -> Json<WrapperStats> {
    Json(state.metrics.stats().await)
}

#[instrument(skip(state))]
async fn get_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<Value>, ApiError> {
    state
        .client
        .get(&key)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("key '{key}' not found")))
}

#[instrument(skip(state))]
async fn get_all_handler(State(state): State<AppState>) -> Result<Json<Vec<Value>>, ApiError> {
    Ok(Json(state.client.get_all().await?))
}

#[instrument(skip(state, value))]
async fn insert_handler(
    State(state): State<AppState>,
    Query(params): Query<InsertParams>,
    Json(value): Json<Value>,
) -> Result<Json<bool>, ApiError> {
    let stored = state.client.insert(&params.key, &value).await?;
    acknowledged(stored, &params.key)
}

#[instrument(skip(state, value))]
async fn insert_with_expiration_handler(
    State(state): State<AppState>,
    Query(params): Query<ExpiringInsertParams>,
    Json(value): Json<Value>,
) -> Result<Json<bool>, ApiError> {
    let expiration = Duration::from_secs(params.expiration);
    let stored = state
        .client
        .insert_with_expiration(&params.key, &value, expiration)
        .await?;
    acknowledged(stored, &params.key)
}

#[instrument(skip(state, values))]
async fn insert_many_handler(
    State(state): State<AppState>,
    Query(params): Query<InsertManyParams>,
    Json(values): Json<Map<String, Value>>,
) -> Result<Json<bool>, ApiError> {
    let expiration = params.expiration.map(Duration::from_secs);
    store_batch(&state, values, expiration).await
}

#[instrument(skip(state, values))]
async fn insert_many_with_expiration_handler(
    State(state): State<AppState>,
    Query(params): Query<InsertManyParams>,
    Json(values): Json<Map<String, Value>>,
) -> Result<Json<bool>, ApiError> {
    let secs = params
        .expiration
        .ok_or_else(|| ApiError::BadRequest("missing expiration".to_string()))?;
    store_batch(&state, values, Some(Duration::from_secs(secs))).await
}

async fn store_batch(
    state: &AppState,
    values: Map<String, Value>,
    expiration: Option<Duration>,
) -> Result<Json<bool>, ApiError> {
    let pairs: Vec<(String, Value)> = values.into_iter().collect();
    let stored = match expiration {
        Some(expiration) => {
            state
                .client
                .insert_many_with_expiration(pairs, expiration)
                .await?
        }
        None => state.client.insert_many(pairs).await?,
    };
    if stored {
        Ok(Json(true))
    } else {
        Err(ApiError::BadRequest("batch was not fully stored".to_string()))
    }
}

#[instrument(skip(state, value))]
async fn update_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Json(value): Json<Value>,
) -> Result<Json<bool>, ApiError> {
    if state.client.update(&key, &value).await? {
        Ok(Json(true))
    } else {
        Err(ApiError::NotFound(format!("key '{key}' not found")))
    }
}

#[instrument(skip(state))]
async fn delete_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<bool>, ApiError> {
    if state.client.delete(&key).await? {
        Ok(Json(true))
    } else {
        Err(ApiError::NotFound(format!("key '{key}' not found")))
    }
}

fn acknowledged(stored: bool, key: &str) -> Result<Json<bool>, ApiError> {
    if stored {
        Ok(Json(true))
    } else {
        Err(ApiError::BadRequest(format!("insert of '{key}' was not stored")))
    }
}

/// Start the API server
pub async fn serve(config: ApiConfig, state: AppState) -> Result<(), std::io::Error> {
    let app = build_router(state);

    let addr = config.bind_address();
    info!("Starting PolyConn API server on {}", addr);

    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
