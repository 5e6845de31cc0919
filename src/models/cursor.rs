//! Opaque pagination cursor for user post listings.

use crate::errors::{PostError, PostResult};
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use serde::{Deserialize, Serialize};

/// Position of the last row a listing page was built from.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PaginationCursor {
    pub last_id: String,
    pub last_created_at: String,
}

impl PaginationCursor {
    pub fn new(last_id: impl Into<String>, last_created_at: impl Into<String>) -> Self {
        Self {
            last_id: last_id.into(),
            last_created_at: last_created_at.into(),
        }
    }

    /// URL-safe token handed to clients.
    pub fn encode(&self) -> String {
        // Serializing two strings cannot fail.
        let json = serde_json::to_vec(self).unwrap_or_default();
        URL_SAFE_NO_PAD.encode(json)
    }

    pub fn decode(token: &str) -> PostResult<Self> {
        let bytes = URL_SAFE_NO_PAD
            .decode(token)
            .map_err(|err| PostError::validation(format!("malformed cursor: {err}")))?;
        serde_json::from_slice(&bytes)
            .map_err(|err| PostError::validation(format!("malformed cursor: {err}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_is_opaque_and_query_safe() {
        let cursor = PaginationCursor::new("alice-Hi_There-1723153880", "2024-08-08T21:51:20.000033Z");
        let token = cursor.encode();
        assert!(!token.contains('"'));
        assert!(token.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
        assert_eq!(PaginationCursor::decode(&token).unwrap(), cursor);
    }

    #[test]
    fn garbage_is_a_validation_error() {
        assert!(matches!(
            PaginationCursor::decode("%%%"),
            Err(PostError::Validation(_))
        ));
        let not_json = URL_SAFE_NO_PAD.encode("hello");
        assert!(matches!(
            PaginationCursor::decode(&not_json),
            Err(PostError::Validation(_))
        ));
    }
}
