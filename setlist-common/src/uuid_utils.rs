//! UUID utilities

use uuid::Uuid;

use crate::{Error, Result};

/// Generate a new UUIDv4
pub fn generate() -> Uuid {
    Uuid::new_v4()
}

/// Parse a UUID read back from a TEXT column
pub fn parse_column(s: &str) -> Result<Uuid> {
    Uuid::parse_str(s).map_err(|e| Error::Internal(format!("Corrupt id '{}' in database: {}", s, e)))
}

/// Parse an optional UUID column
pub fn parse_optional(s: Option<String>) -> Result<Option<Uuid>> {
    s.as_deref().map(parse_column).transpose()
}
