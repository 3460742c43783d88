//! Set handlers: creation inside a setlist, editing, and song placement

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, post, put},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use setlist_common::db::models::{Set, SetWithSongs};
use uuid::Uuid;

use super::auth::CurrentUser;
use super::error::{ApiError, ApiResult};
use crate::db::sets::{self, AddSong, MoveSong, NewSet, SetUpdate, SongSource};
use crate::AppState;

/// POST /api/setlists/:id/sets body
///
/// Songs come either from `song_ids` or from a template/collection `source`.
#[derive(Debug, Deserialize)]
pub struct CreateSetRequest {
    pub name: String,
    #[serde(default)]
    pub song_ids: Vec<Uuid>,
    pub source: Option<SongSource>,
    /// Accept songs already used in another set of the setlist
    #[serde(default)]
    pub force: bool,
}

#[derive(Debug, Deserialize)]
pub struct SetOrderRequest {
    pub set_ids: Vec<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct SongOrderRequest {
    pub song_ids: Vec<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct ApplySourceRequest {
    pub source: SongSource,
    #[serde(default)]
    pub force: bool,
}

#[derive(Debug, Serialize)]
pub struct MoveSongResponse {
    pub from: SetWithSongs,
    pub to: SetWithSongs,
}

/// POST /api/setlists/:id/sets
pub async fn create_set(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(setlist_id): Path<Uuid>,
    Json(request): Json<CreateSetRequest>,
) -> ApiResult<(StatusCode, Json<SetWithSongs>)> {
    let set = match request.source {
        Some(_) if !request.song_ids.is_empty() => {
            return Err(ApiError::BadRequest(
                "Give either song_ids or a source, not both".to_string(),
            ));
        }
        Some(source) => {
            sets::create_set_from_source(&state.db, &user, setlist_id, &request.name, source, request.force)
                .await?
        }
        None => {
            let new_set = NewSet {
                name: request.name,
                song_ids: request.song_ids,
                force: request.force,
            };
            sets::create_set(&state.db, &user, setlist_id, new_set).await?
        }
    };
    Ok((StatusCode::CREATED, Json(set)))
}

/// PUT /api/setlists/:id/sets/order
pub async fn reorder_sets(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(setlist_id): Path<Uuid>,
    Json(request): Json<SetOrderRequest>,
) -> ApiResult<Json<Vec<Set>>> {
    Ok(Json(
        sets::reorder_sets(&state.db, &user, setlist_id, &request.set_ids).await?,
    ))
}

/// PUT /api/sets/:id
pub async fn update_set(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(set_id): Path<Uuid>,
    Json(request): Json<SetUpdate>,
) -> ApiResult<Json<SetWithSongs>> {
    Ok(Json(sets::update_set(&state.db, &user, set_id, request).await?))
}

/// DELETE /api/sets/:id
pub async fn delete_set(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(set_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    sets::delete_set(&state.db, &user, set_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/sets/:id/songs
pub async fn add_song(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(set_id): Path<Uuid>,
    Json(request): Json<AddSong>,
) -> ApiResult<Json<SetWithSongs>> {
    Ok(Json(sets::add_song_to_set(&state.db, &user, set_id, request).await?))
}

/// DELETE /api/sets/:id/songs/:song_id
pub async fn remove_song(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path((set_id, song_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<Json<SetWithSongs>> {
    Ok(Json(
        sets::remove_song_from_set(&state.db, &user, set_id, song_id).await?,
    ))
}

/// PUT /api/sets/:id/songs/order
pub async fn reorder_songs(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(set_id): Path<Uuid>,
    Json(request): Json<SongOrderRequest>,
) -> ApiResult<Json<SetWithSongs>> {
    Ok(Json(
        sets::reorder_set_songs(&state.db, &user, set_id, &request.song_ids).await?,
    ))
}

/// POST /api/sets/:id/songs/:song_id/move
pub async fn move_song(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path((set_id, song_id)): Path<(Uuid, Uuid)>,
    Json(request): Json<MoveSong>,
) -> ApiResult<Json<MoveSongResponse>> {
    let (from, to) = sets::move_song(&state.db, &user, set_id, song_id, request).await?;
    Ok(Json(MoveSongResponse { from, to }))
}

/// POST /api/sets/:id/apply
pub async fn apply_source(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(set_id): Path<Uuid>,
    Json(request): Json<ApplySourceRequest>,
) -> ApiResult<Json<SetWithSongs>> {
    Ok(Json(
        sets::apply_source_to_set(&state.db, &user, set_id, request.source, request.force).await?,
    ))
}

pub fn set_routes() -> Router<AppState> {
    Router::new()
        .route("/api/setlists/:id/sets", post(create_set))
        .route("/api/setlists/:id/sets/order", put(reorder_sets))
        .route("/api/sets/:id", put(update_set).delete(delete_set))
        .route("/api/sets/:id/songs", post(add_song))
        .route("/api/sets/:id/songs/order", put(reorder_songs))
        .route("/api/sets/:id/songs/:song_id", delete(remove_song))
        .route("/api/sets/:id/songs/:song_id/move", post(move_song))
        .route("/api/sets/:id/apply", post(apply_source))
}
