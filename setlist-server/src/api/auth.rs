//! Bearer token authentication middleware
//!
//! Resolves `Authorization: Bearer <token>` to a user and stores it as a
//! [`CurrentUser`] request extension. Browsers cannot set headers on an
//! `EventSource`, so an `access_token` query parameter is accepted as well.

use axum::{
    extract::{Query, Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use serde::Deserialize;
use setlist_common::api::auth::parse_bearer;
use setlist_common::db::models::User;
use tracing::debug;

use super::error::ApiError;
use crate::db::users;
use crate::AppState;

/// Authenticated caller of a protected route
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

#[derive(Debug, Deserialize)]
struct TokenQuery {
    access_token: Option<String>,
}

fn query_token(request: &Request) -> Option<String> {
    let Query(query) = Query::<TokenQuery>::try_from_uri(request.uri()).ok()?;
    query.access_token.filter(|token| !token.is_empty())
}

fn request_token(request: &Request) -> Option<String> {
    let header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(parse_bearer)
        .map(str::to_string);
    header.or_else(|| query_token(request))
}

/// Reject requests without a valid token
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = request_token(&request)
        .ok_or_else(|| ApiError::Unauthorized("Missing bearer token".to_string()))?;

    let user = users::authenticate(&state.db, &token).await?;
    debug!(user_id = %user.id, path = %request.uri().path(), "Authenticated request");

    request.extensions_mut().insert(CurrentUser(user));
    Ok(next.run(request).await)
}
