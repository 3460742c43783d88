//! Bearer token generation and hashing
//!
//! Tokens are 256 random bits rendered as 64 hex characters. Only the SHA-256
//! of a token is stored; the plain token is shown to the user exactly once.

use rand::RngCore;
use sha2::{Digest, Sha256};

/// Length of a generated token in hex characters
pub const TOKEN_LEN: usize = 64;

/// Generate a new random bearer token
pub fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    to_hex(&bytes)
}

/// SHA-256 of a token, as stored in `users.token_hash`
///
/// # Examples
///
/// ```
/// use setlist_common::api::auth::hash_token;
///
/// let hash = hash_token("secret");
/// assert_eq!(hash.len(), 64);
/// assert_eq!(hash, hash_token("secret"));
/// ```
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    to_hex(&hasher.finalize())
}

/// Extract the token from an `Authorization` header value
///
/// Accepts `Bearer <token>` with any casing of the scheme. Returns `None` for
/// other schemes or an empty token.
pub fn parse_bearer(header_value: &str) -> Option<&str> {
    let (scheme, token) = header_value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    if token.is_empty() {
        None
    } else {
        Some(token)
    }
}

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
