//! Song library handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Extension, Json, Router,
};
use serde::Deserialize;
use setlist_common::db::models::{Song, SongInput};
use uuid::Uuid;

use super::auth::CurrentUser;
use super::error::ApiResult;
use crate::db::songs;
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct SongQuery {
    /// Substring matched against title and artist
    pub search: Option<String>,
}

/// GET /api/songs
pub async fn list_songs(
    State(state): State<AppState>,
    Query(query): Query<SongQuery>,
) -> ApiResult<Json<Vec<Song>>> {
    let songs = songs::list_songs(&state.db, query.search.as_deref(), state.db_max_lock_wait_ms).await?;
    Ok(Json(songs))
}

/// GET /api/songs/:id
pub async fn get_song(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Json<Song>> {
    Ok(Json(songs::get_song(&state.db, id).await?))
}

/// POST /api/songs
pub async fn create_song(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Json(input): Json<SongInput>,
) -> ApiResult<(StatusCode, Json<Song>)> {
    let song = songs::create_song(&state.db, &user, input).await?;
    Ok((StatusCode::CREATED, Json(song)))
}

/// PUT /api/songs/:id
pub async fn update_song(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
    Json(input): Json<SongInput>,
) -> ApiResult<Json<Song>> {
    Ok(Json(songs::update_song(&state.db, &user, id, input).await?))
}

/// DELETE /api/songs/:id
pub async fn delete_song(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    songs::delete_song(&state.db, &user, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub fn song_routes() -> Router<AppState> {
    Router::new()
        .route("/api/songs", get(list_songs).post(create_song))
        .route("/api/songs/:id", get(get_song).put(update_song).delete(delete_song))
}
