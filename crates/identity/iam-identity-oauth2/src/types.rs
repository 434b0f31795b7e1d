//! OAuth2 protocol types.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// OAuth2 token response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    pub expires_in: Option<u64>,
    pub refresh_token: Option<String>,
    pub scope: Option<String>,
    pub id_token: Option<String>,
}

/// User info response, kept as the raw claim set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserInfoResponse {
    pub claims: Map<String, Value>,
}

impl UserInfoResponse {
    /// A claim rendered as a string. Numeric claims (such as a numeric `id`)
    /// are formatted; other types and empty strings yield `None`.
    pub fn claim(&self, name: &str) -> Option<String> {
        match self.claims.get(name)? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// The first of `names` that is present.
    pub fn first_claim(&self, names: &[&str]) -> Option<String> {
        names.iter().find_map(|name| self.claim(name))
    }
}
