//! Terms of service page
//!
//! The Markdown file is read on every request so edits show up without a
//! restart.

use axum::{
    extract::State,
    response::Html,
    routing::get,
    Router,
};
use pulldown_cmark::{html, Options, Parser};
use tracing::warn;

use super::error::{ApiError, ApiResult};
use crate::AppState;

/// Render Markdown to an HTML fragment
pub fn render_markdown(markdown: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);

    let mut body = String::new();
    html::push_html(&mut body, Parser::new_ext(markdown, options));
    body
}

/// GET /tos
pub async fn terms_of_service(State(state): State<AppState>) -> ApiResult<Html<String>> {
    let markdown = match tokio::fs::read_to_string(&state.tos_path).await {
        Ok(markdown) => markdown,
        Err(e) => {
            warn!(path = %state.tos_path.display(), error = %e, "Terms of service unavailable");
            return Err(ApiError::NotFound("Terms of service".to_string()));
        }
    };

    Ok(Html(format!(
        "<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\"><title>Terms of Service</title></head>\n<body>\n{}</body></html>\n",
        render_markdown(&markdown)
    )))
}

pub fn tos_routes() -> Router<AppState> {
    Router::new().route("/tos", get(terms_of_service))
}
