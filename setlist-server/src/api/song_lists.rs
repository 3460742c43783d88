//! Set template and song collection handlers
//!
//! Both resources share these handlers; the router for each mounts an
//! `Extension<SongListKind>` telling them which tables to use.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Extension, Json, Router,
};
use setlist_common::db::models::{SongList, SongListDetail, SongListKind};
use uuid::Uuid;

use super::auth::CurrentUser;
use super::error::ApiResult;
use crate::db::song_lists::{self, NewSongList, SongListUpdate};
use crate::AppState;

/// GET /api/set-templates, /api/song-collections
pub async fn list(
    State(state): State<AppState>,
    Extension(kind): Extension<SongListKind>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> ApiResult<Json<Vec<SongList>>> {
    Ok(Json(song_lists::list_song_lists(&state.db, &user, kind).await?))
}

pub async fn get_one(
    State(state): State<AppState>,
    Extension(kind): Extension<SongListKind>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<SongListDetail>> {
    Ok(Json(song_lists::get_song_list(&state.db, &user, kind, id).await?))
}

pub async fn create(
    State(state): State<AppState>,
    Extension(kind): Extension<SongListKind>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Json(request): Json<NewSongList>,
) -> ApiResult<(StatusCode, Json<SongListDetail>)> {
    let list = song_lists::create_song_list(&state.db, &user, kind, request).await?;
    Ok((StatusCode::CREATED, Json(list)))
}

pub async fn update(
    State(state): State<AppState>,
    Extension(kind): Extension<SongListKind>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
    Json(request): Json<SongListUpdate>,
) -> ApiResult<Json<SongListDetail>> {
    Ok(Json(
        song_lists::update_song_list(&state.db, &user, kind, id, request).await?,
    ))
}

pub async fn remove(
    State(state): State<AppState>,
    Extension(kind): Extension<SongListKind>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    song_lists::delete_song_list(&state.db, &user, kind, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

fn routes_for(base: &str, kind: SongListKind) -> Router<AppState> {
    Router::new()
        .route(base, get(list).post(create))
        .route(&format!("{base}/:id"), get(get_one).put(update).delete(remove))
        .layer(Extension(kind))
}

pub fn song_list_routes() -> Router<AppState> {
    Router::new()
        .merge(routes_for("/api/set-templates", SongListKind::Template))
        .merge(routes_for("/api/song-collections", SongListKind::Collection))
}
