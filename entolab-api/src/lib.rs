//! entolab-api library interface for testing
//!
//! Exposes public APIs for integration testing

pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod services;

pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use chrono::{DateTime, Utc};
use entolab_common::events::EventBus;
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::auth::LoginLimiter;
use crate::services::annotation::SessionStore;
use crate::services::detector_client::DetectorClient;
use crate::services::storage::ObjectStorage;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,
    /// Event bus for SSE broadcasting
    pub event_bus: EventBus,
    /// Object storage backend for specimen images and exports
    pub storage: Arc<ObjectStorage>,
    /// Detection model API client
    pub detector: Arc<DetectorClient>,
    /// Open annotation sessions (in-memory drafts with undo history)
    pub annotation_sessions: Arc<RwLock<SessionStore>>,
    /// Per-username throttle for login and recovery attempts
    pub login_limiter: Arc<LoginLimiter>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
    /// Last error for diagnostic purposes
    pub last_error: Arc<RwLock<Option<String>>>,
}

impl AppState {
    pub fn new(
        db: SqlitePool,
        event_bus: EventBus,
        storage: ObjectStorage,
        detector: DetectorClient,
    ) -> Self {
        Self {
            db,
            event_bus,
            storage: Arc::new(storage),
            detector: Arc::new(detector),
            annotation_sessions: Arc::new(RwLock::new(SessionStore::new())),
            login_limiter: Arc::new(LoginLimiter::new()),
            startup_time: Utc::now(),
            last_error: Arc::new(RwLock::new(None)),
        }
    }

    /// Record an error for the health endpoint
    pub async fn record_error(&self, message: String) {
        let mut last = self.last_error.write().await;
        *last = Some(message);
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::get;
    use tower_http::cors::CorsLayer;

    Router::new()
        .merge(auth::auth_routes())
        .merge(api::case_routes())
        .merge(api::upload_routes())
        .merge(api::detection_routes())
        .merge(api::annotation_routes())
        .merge(api::export_routes())
        .route("/api/events", get(api::event_stream))
        .merge(api::health_routes())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
