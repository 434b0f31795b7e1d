//! The provider-agnostic result of a successful authentication.

use serde::{Deserialize, Serialize};

/// Capability every authentication result exposes, regardless of which
/// provider produced it.
///
/// `user_id` is the stable join key to local accounts and is never empty on
/// success. The remaining attributes return an empty string when the
/// upstream source does not carry them.
pub trait Identity: Send + Sync + std::fmt::Debug {
    fn user_id(&self) -> &str;

    fn username(&self) -> &str;

    fn email(&self) -> &str;

    fn avatar(&self) -> &str;
}

/// Plain identity value for providers without a richer native shape.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BasicIdentity {
    pub user_id: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub avatar: String,
}

impl BasicIdentity {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            ..Self::default()
        }
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = username.into();
        self
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = email.into();
        self
    }

    pub fn with_avatar(mut self, avatar: impl Into<String>) -> Self {
        self.avatar = avatar.into();
        self
    }

    /// Copy the attributes of any identity into an owned value.
    pub fn from_identity(identity: &dyn Identity) -> Self {
        Self {
            user_id: identity.user_id().to_string(),
            username: identity.username().to_string(),
            email: identity.email().to_string(),
            avatar: identity.avatar().to_string(),
        }
    }
}

impl Identity for BasicIdentity {
    fn user_id(&self) -> &str {
        &self.user_id
    }

    fn username(&self) -> &str {
        &self.username
    }

    fn email(&self) -> &str {
        &self.email
    }

    fn avatar(&self) -> &str {
        &self.avatar
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_attributes_are_empty() {
        let identity = BasicIdentity::new("u-1");
        assert_eq!(identity.user_id(), "u-1");
        assert_eq!(identity.username(), "");
        assert_eq!(identity.email(), "");
        assert_eq!(identity.avatar(), "");
    }

    #[test]
    fn deserialize_with_only_user_id() {
        let identity: BasicIdentity = serde_json::from_str(r#"{"user_id": "42"}"#).unwrap();
        assert_eq!(identity, BasicIdentity::new("42"));
    }

    #[test]
    fn copy_from_trait_object() {
        let boxed: Box<dyn Identity> = Box::new(
            BasicIdentity::new("alice")
                .with_username("alice")
                .with_email("alice@example.com"),
        );
        let copy = BasicIdentity::from_identity(boxed.as_ref());
        assert_eq!(copy.email, "alice@example.com");
        assert_eq!(copy.username, "alice");
    }
}
