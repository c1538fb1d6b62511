//! Authentication token model

use chrono::{DateTime, Utc};
use serde::Serialize;

/// A stored authentication token.
///
/// Only the digest of the token is persisted; the plaintext is handed to the
/// client once, at issue time, as an [`IssuedToken`].
#[derive(Debug, Clone)]
pub struct AuthToken {
    /// Hex-encoded SHA-256 digest of the token (primary key)
    pub digest: String,
    /// First characters of the plaintext token, used to narrow lookups
    pub token_key: String,
    pub user_id: i64,
    pub created: DateTime<Utc>,
    /// `None` means the token never expires
    pub expiry: Option<DateTime<Utc>>,
}

impl AuthToken {
    /// Check if the token has expired at the given instant
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expiry, Some(expiry) if expiry < now)
    }

    /// Check if the token has expired
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }
}

/// A freshly issued token, the only place its plaintext ever appears.
#[derive(Debug, Clone, Serialize)]
pub struct IssuedToken {
    pub token: String,
    pub expiry: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn token(expiry: Option<DateTime<Utc>>) -> AuthToken {
        AuthToken {
            digest: "d".to_string(),
            token_key: "k".to_string(),
            user_id: 1,
            created: Utc::now(),
            expiry,
        }
    }

    #[test]
    fn test_expiry() {
        let now = Utc::now();
        assert!(token(Some(now - Duration::seconds(1))).is_expired_at(now));
        assert!(!token(Some(now + Duration::hours(1))).is_expired_at(now));
        assert!(!token(None).is_expired_at(now));
    }
}
