//! HTTP API handlers

pub mod auth;
pub mod error;
pub mod export;
pub mod health;
pub mod performance;
pub mod setlists;
pub mod sets;
pub mod song_lists;
pub mod songs;
pub mod sse;
pub mod tos;
pub mod users;

pub use auth::{auth_middleware, CurrentUser};
pub use error::{ApiError, ApiResult};
pub use export::export_routes;
pub use health::health_routes;
pub use performance::performance_routes;
pub use setlists::setlist_routes;
pub use sets::set_routes;
pub use song_lists::song_list_routes;
pub use songs::song_routes;
pub use sse::sse_routes;
pub use tos::tos_routes;
pub use users::{registration_routes, user_routes};
