//! User registration, profile and admin handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post, put},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use setlist_common::db::models::{User, UserLevel};
use uuid::Uuid;

use super::auth::CurrentUser;
use super::error::ApiResult;
use crate::db::users::{self, NewUser, ProfileUpdate};
use crate::AppState;

/// Registration and token rotation response; the token is not retrievable later
#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub user: User,
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct LevelRequest {
    pub user_level: UserLevel,
}

/// POST /api/users (open registration)
pub async fn register(
    State(state): State<AppState>,
    Json(request): Json<NewUser>,
) -> ApiResult<(StatusCode, Json<TokenResponse>)> {
    let (user, token) = users::create_user(&state.db, request).await?;
    Ok((StatusCode::CREATED, Json(TokenResponse { user, token })))
}

/// GET /api/users
pub async fn list_users(State(state): State<AppState>) -> ApiResult<Json<Vec<User>>> {
    Ok(Json(users::list_users(&state.db).await?))
}

/// GET /api/users/me
pub async fn me(Extension(CurrentUser(user)): Extension<CurrentUser>) -> Json<User> {
    Json(user)
}

/// PUT /api/users/me
pub async fn update_me(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Json(request): Json<ProfileUpdate>,
) -> ApiResult<Json<User>> {
    Ok(Json(users::update_profile(&state.db, &user, request).await?))
}

/// POST /api/users/me/token
pub async fn rotate_token(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> ApiResult<Json<TokenResponse>> {
    let token = users::rotate_token(&state.db, &user).await?;
    Ok(Json(TokenResponse { user, token }))
}

/// PUT /api/users/:id/level
pub async fn set_level(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
    Json(request): Json<LevelRequest>,
) -> ApiResult<Json<User>> {
    Ok(Json(
        users::set_user_level(&state.db, &user, id, request.user_level).await?,
    ))
}

/// Routes that need a bearer token
pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/api/users", get(list_users))
        .route("/api/users/me", get(me).put(update_me))
        .route("/api/users/me/token", post(rotate_token))
        .route("/api/users/:id/level", put(set_level))
}

/// Registration, open to anyone
pub fn registration_routes() -> Router<AppState> {
    Router::new().route("/api/users", post(register))
}
