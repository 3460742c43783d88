//! Setlist handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Extension, Json, Router,
};
use serde::Deserialize;
use setlist_common::db::models::{Setlist, SetlistDetail, SetlistSummary};
use uuid::Uuid;

use super::auth::CurrentUser;
use super::error::ApiResult;
use crate::db::setlists::{self, NewSetlist, SetlistUpdate};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct DuplicateRequest {
    pub name: String,
}

/// GET /api/setlists
pub async fn list_setlists(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> ApiResult<Json<Vec<SetlistSummary>>> {
    Ok(Json(
        setlists::list_setlists(&state.db, &user, state.db_max_lock_wait_ms).await?,
    ))
}

/// GET /api/setlists/:id
pub async fn get_setlist(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<SetlistDetail>> {
    Ok(Json(setlists::get_setlist(&state.db, &user, id).await?))
}

/// POST /api/setlists
pub async fn create_setlist(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Json(request): Json<NewSetlist>,
) -> ApiResult<(StatusCode, Json<Setlist>)> {
    let setlist = setlists::create_setlist(&state.db, &user, request).await?;
    Ok((StatusCode::CREATED, Json(setlist)))
}

/// PUT /api/setlists/:id
pub async fn update_setlist(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
    Json(request): Json<SetlistUpdate>,
) -> ApiResult<Json<Setlist>> {
    Ok(Json(setlists::update_setlist(&state.db, &user, id, request).await?))
}

/// DELETE /api/setlists/:id
pub async fn delete_setlist(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    setlists::delete_setlist(&state.db, &state.hub, &user, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/setlists/:id/duplicate
pub async fn duplicate_setlist(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
    Json(request): Json<DuplicateRequest>,
) -> ApiResult<(StatusCode, Json<SetlistDetail>)> {
    let copy = setlists::duplicate_setlist(&state.db, &user, id, &request.name).await?;
    Ok((StatusCode::CREATED, Json(copy)))
}

pub fn setlist_routes() -> Router<AppState> {
    Router::new()
        .route("/api/setlists", get(list_setlists).post(create_setlist))
        .route(
            "/api/setlists/:id",
            get(get_setlist).put(update_setlist).delete(delete_setlist),
        )
        .route("/api/setlists/:id/duplicate", post(duplicate_setlist))
}
