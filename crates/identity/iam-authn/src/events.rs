use chrono::{DateTime, Utc};
use iam_event_core::DomainEvent;
use iam_identity_core::{Identity, MappingMethod};
use serde::{Deserialize, Serialize};

/// Published after every successful authentication.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthenticationEvent {
    pub user_id: String,
    pub username: String,
    pub email: String,
    /// Name of the provider instance that authenticated the user
    pub provider: String,
    pub mapping_method: MappingMethod,
    pub login_at: DateTime<Utc>,
}

impl AuthenticationEvent {
    pub fn new(identity: &dyn Identity, provider: &str, mapping_method: MappingMethod) -> Self {
        Self {
            user_id: identity.user_id().to_string(),
            username: identity.username().to_string(),
            email: identity.email().to_string(),
            provider: provider.to_string(),
            mapping_method,
            login_at: Utc::now(),
        }
    }
}

impl DomainEvent for AuthenticationEvent {
    const NAME: &'static str = "authentication";
}
