//! Cache key generation.

use serde::{Deserialize, Serialize};

/// Opaque key built from `request_type:query:user_token`.
///
/// Two keys are equal only when all three parts are identical.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(request_type: &str, query: &str, user_token: &str) -> Self {
        Self(format!("{}:{}:{}", request_type, query, user_token))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
