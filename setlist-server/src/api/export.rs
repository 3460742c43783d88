//! PDF export of a setlist

use axum::{
    extract::{Path, State},
    http::header,
    response::{IntoResponse, Response},
    routing::get,
    Extension, Router,
};
use tracing::info;
use uuid::Uuid;

use super::auth::CurrentUser;
use super::error::{ApiError, ApiResult};
use crate::db::setlists;
use crate::export::render_setlist_pdf;
use crate::AppState;

/// Characters safe to put in a Content-Disposition filename
fn file_name(setlist_name: &str) -> String {
    let cleaned: String = setlist_name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    format!("{}.pdf", cleaned.trim_matches('_'))
}

/// GET /api/setlists/:id/export.pdf
pub async fn export_pdf(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<Response> {
    let detail = setlists::get_setlist(&state.db, &user, id).await?;

    // Layout is CPU-bound; keep it off the async workers
    let name = file_name(&detail.setlist.name);
    let bytes = tokio::task::spawn_blocking(move || render_setlist_pdf(&detail))
        .await
        .map_err(|e| ApiError::Internal(format!("PDF task failed: {}", e)))??;

    info!(setlist_id = %id, bytes = bytes.len(), "Setlist exported");
    Ok((
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", name),
            ),
        ],
        bytes,
    )
        .into_response())
}

pub fn export_routes() -> Router<AppState> {
    Router::new().route("/api/setlists/:id/export.pdf", get(export_pdf))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_name_is_header_safe() {
        assert_eq!(file_name("Live at Wembley '86"), "Live_at_Wembley__86.pdf");
        assert_eq!(file_name("Set \"A\""), "Set__A.pdf");
    }
}
