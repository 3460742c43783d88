//! setlist-server library
//!
//! REST + SSE backend for managing songs, setlists, reusable song lists and
//! live performance sessions.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::Request;
use axum::Router;
use setlist_common::config::ServerConfig;
use sqlx::SqlitePool;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info_span, Span};

pub mod api;
pub mod db;
pub mod export;
pub mod realtime;

use realtime::SessionHub;

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    /// Realtime fan-out for performance sessions
    pub hub: Arc<SessionHub>,
    /// How long a leadership request waits before the server approves it
    pub auto_approve: Duration,
    pub db_max_lock_wait_ms: u64,
    /// Markdown file served at /tos
    pub tos_path: PathBuf,
}

impl AppState {
    pub fn new(db: SqlitePool, config: &ServerConfig) -> Self {
        Self {
            db,
            hub: Arc::new(SessionHub::new()),
            auto_approve: Duration::from_secs(config.auto_approve_secs),
            db_max_lock_wait_ms: config.db_max_lock_wait_ms,
            tos_path: config.tos_path.clone(),
        }
    }
}

/// Request span without the query string, which may carry `access_token`
fn request_span(request: &Request) -> Span {
    info_span!("request", method = %request.method(), path = %request.uri().path())
}

/// Build application router
///
/// Everything under `/api` needs a bearer token except registration.
/// `/health` and `/tos` are public.
pub fn build_router(state: AppState) -> Router {
    use axum::middleware;

    let protected = Router::new()
        .merge(api::song_routes())
        .merge(api::setlist_routes())
        .merge(api::set_routes())
        .merge(api::song_list_routes())
        .merge(api::user_routes())
        .merge(api::performance_routes())
        .merge(api::sse_routes())
        .merge(api::export_routes())
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            api::auth_middleware,
        ));

    let public = Router::new()
        .merge(api::registration_routes())
        .merge(api::health_routes())
        .merge(api::tos_routes());

    Router::new()
        .merge(protected)
        .merge(public)
        .layer(TraceLayer::new_for_http().make_span_with(request_span))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
