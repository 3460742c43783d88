//! # Setlist Common Library
//!
//! Shared code for the setlist service:
//! - Error taxonomy
//! - Configuration resolution
//! - Database schema, models and retry helper
//! - Realtime session event types
//! - Token and timestamp utilities

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod time;
pub mod uuid_utils;

pub use error::{DuplicateSong, Error, Result};
