//! Opaque authentication token generation and digesting
//!
//! Tokens are 64 lowercase hex characters drawn from two random UUIDs. The
//! database only ever sees the SHA-256 digest of a token plus a short prefix
//! used to narrow lookups.

use data_encoding::HEXLOWER;
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Length of a plaintext token
pub const TOKEN_LENGTH: usize = 64;

/// Number of leading characters stored in clear as the token key
pub const TOKEN_KEY_LENGTH: usize = 8;

/// Generate a fresh random token
pub fn generate_token() -> String {
    format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple())
}

/// Hex-encoded SHA-256 digest of a token
pub fn digest_token(token: &str) -> String {
    HEXLOWER.encode(&Sha256::digest(token.as_bytes()))
}

/// The lookup prefix of a token
pub fn token_key(token: &str) -> &str {
    token.get(..TOKEN_KEY_LENGTH).unwrap_or(token)
}

/// Cheap shape check before touching the database
pub fn is_well_formed(token: &str) -> bool {
    token.len() == TOKEN_LENGTH && token.bytes().all(|b| b.is_ascii_hexdigit())
}
