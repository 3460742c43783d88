//! Performance session handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Extension, Json, Router,
};
use serde::Deserialize;
use setlist_common::db::models::{
    LeadershipRequest, Participant, PerformanceSession, SessionMode,
};
use uuid::Uuid;

use super::auth::CurrentUser;
use super::error::ApiResult;
use crate::db::performance::{self, Direction, PositionUpdate};
use crate::db::setlists;
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct StartSessionRequest {
    #[serde(default)]
    pub mode: SessionMode,
}

#[derive(Debug, Deserialize)]
pub struct NavigateRequest {
    pub direction: Direction,
}

#[derive(Debug, Deserialize)]
pub struct RespondRequest {
    pub approve: bool,
}

/// POST /api/setlists/:id/session
pub async fn start_session(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(setlist_id): Path<Uuid>,
    body: Option<Json<StartSessionRequest>>,
) -> ApiResult<(StatusCode, Json<PerformanceSession>)> {
    let mode = body.map(|Json(request)| request.mode).unwrap_or_default();
    let session = performance::create_session(&state.db, &state.hub, &user, setlist_id, mode).await?;
    Ok((StatusCode::CREATED, Json(session)))
}

/// GET /api/setlists/:id/session
pub async fn active_session(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(setlist_id): Path<Uuid>,
) -> ApiResult<Json<Option<PerformanceSession>>> {
    setlists::get_visible_setlist(&state.db, &user, setlist_id).await?;
    Ok(Json(
        performance::get_active_session(&state.db, setlist_id, state.db_max_lock_wait_ms).await?,
    ))
}

/// GET /api/sessions/:id
pub async fn get_session(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(session_id): Path<Uuid>,
) -> ApiResult<Json<PerformanceSession>> {
    Ok(Json(performance::get_session(&state.db, &user, session_id).await?))
}

/// POST /api/sessions/:id/join
pub async fn join(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(session_id): Path<Uuid>,
) -> ApiResult<Json<Participant>> {
    Ok(Json(
        performance::join_session(&state.db, &state.hub, &user, session_id).await?,
    ))
}

/// POST /api/sessions/:id/leave
pub async fn leave(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(session_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    performance::leave_session(&state.db, &state.hub, &user, session_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/sessions/:id/heartbeat
pub async fn heartbeat(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(session_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    performance::heartbeat(&state.db, &user, session_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/sessions/:id/position
pub async fn position(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(session_id): Path<Uuid>,
    Json(request): Json<PositionUpdate>,
) -> ApiResult<Json<PerformanceSession>> {
    Ok(Json(
        performance::update_position(&state.db, &state.hub, &user, session_id, request).await?,
    ))
}

/// POST /api/sessions/:id/navigate
pub async fn navigate(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(session_id): Path<Uuid>,
    Json(request): Json<NavigateRequest>,
) -> ApiResult<Json<PerformanceSession>> {
    Ok(Json(
        performance::navigate(&state.db, &state.hub, &user, session_id, request.direction).await?,
    ))
}

/// POST /api/sessions/:id/end
pub async fn end(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(session_id): Path<Uuid>,
) -> ApiResult<Json<PerformanceSession>> {
    Ok(Json(
        performance::end_session(&state.db, &state.hub, &user, session_id).await?,
    ))
}

/// POST /api/sessions/:id/takeover (admin)
pub async fn takeover(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(session_id): Path<Uuid>,
) -> ApiResult<Json<PerformanceSession>> {
    Ok(Json(
        performance::force_takeover(&state.db, &state.hub, &user, session_id).await?,
    ))
}

/// POST /api/sessions/:id/leadership
pub async fn request_leadership(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(session_id): Path<Uuid>,
) -> ApiResult<(StatusCode, Json<LeadershipRequest>)> {
    let request =
        performance::request_leadership(&state.db, &state.hub, &user, session_id, state.auto_approve)
            .await?;
    Ok((StatusCode::CREATED, Json(request)))
}

/// GET /api/sessions/:id/participants
pub async fn participants(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(session_id): Path<Uuid>,
) -> ApiResult<Json<Vec<Participant>>> {
    Ok(Json(performance::list_participants(&state.db, &user, session_id).await?))
}

/// GET /api/sessions/:id/requests
pub async fn pending_requests(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(session_id): Path<Uuid>,
) -> ApiResult<Json<Vec<LeadershipRequest>>> {
    Ok(Json(
        performance::list_pending_requests(&state.db, &user, session_id).await?,
    ))
}

/// POST /api/leadership-requests/:id/respond
pub async fn respond(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(request_id): Path<Uuid>,
    Json(request): Json<RespondRequest>,
) -> ApiResult<Json<LeadershipRequest>> {
    Ok(Json(
        performance::respond_to_request(&state.db, &state.hub, &user, request_id, request.approve)
            .await?,
    ))
}

/// POST /api/leadership-requests/:id/cancel
pub async fn cancel(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(request_id): Path<Uuid>,
) -> ApiResult<Json<LeadershipRequest>> {
    Ok(Json(
        performance::cancel_request(&state.db, &state.hub, &user, request_id).await?,
    ))
}

pub fn performance_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/api/setlists/:id/session",
            get(active_session).post(start_session),
        )
        .route("/api/sessions/:id", get(get_session))
        .route("/api/sessions/:id/join", post(join))
        .route("/api/sessions/:id/leave", post(leave))
        .route("/api/sessions/:id/heartbeat", post(heartbeat))
        .route("/api/sessions/:id/position", post(position))
        .route("/api/sessions/:id/navigate", post(navigate))
        .route("/api/sessions/:id/end", post(end))
        .route("/api/sessions/:id/takeover", post(takeover))
        .route("/api/sessions/:id/leadership", post(request_leadership))
        .route("/api/sessions/:id/participants", get(participants))
        .route("/api/sessions/:id/requests", get(pending_requests))
        .route("/api/leadership-requests/:id/respond", post(respond))
        .route("/api/leadership-requests/:id/cancel", post(cancel))
}
