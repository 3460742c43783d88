//! Shared HTTP API functionality
//!
//! Pure functions only (no HTTP framework dependencies). The server wraps
//! these with axum middleware.

pub mod auth;

pub use auth::{generate_token, hash_token, parse_bearer};
