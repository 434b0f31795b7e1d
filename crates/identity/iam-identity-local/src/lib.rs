//! Username/password identity provider (`password` type).
//!
//! Users are declared in the provider options with Argon2 PHC hashes:
//!
//! ```toml
//! [[identity_providers]]
//! name = "builtin"
//! type = "password"
//! [identity_providers.provider]
//! users = [{ username = "alice", password_hash = "$argon2id$v=19$...", email = "alice@example.com" }]
//! ```

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
};
use async_trait::async_trait;
use iam_identity_core::{
    BasicIdentity, DynamicOptions, GenericProvider, GenericProviderFactory, Identity,
    IdentityError, IdentityResult, ProviderRegistry, require_field,
};
use rand_core::OsRng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::debug;

pub const PROVIDER_TYPE: &str = "password";

/// Maximum number of password verifications running at once.
const MAX_CONCURRENT_VERIFICATIONS: usize = 5;

// A real Argon2 hash of "dummy_password", verified for unknown users so
// both failure paths cost the same.
const DUMMY_HASH: &str =
    "$argon2id$v=19$m=19456,t=2,p=1$9QsJRKgzJkKaOUvlp7gl2Q$qmE3qIFBNJ6nZYbLYXEI2uo0zZc7T0Q8LU1ZsqsZ3QE";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalUser {
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PasswordConfig {
    #[serde(default)]
    pub users: Vec<LocalUser>,
}

#[derive(Debug, Deserialize)]
pub struct PasswordAuthPayload {
    pub username: String,
    pub password: String,
}

/// Hash a password into the PHC string format accepted in `password_hash`.
pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    Ok(Argon2::default()
        .hash_password(password.as_bytes(), &salt)?
        .to_string())
}

pub struct PasswordProvider {
    users: HashMap<String, LocalUser>,
    semaphore: Arc<Semaphore>,
}

impl PasswordProvider {
    pub fn new(config: PasswordConfig) -> IdentityResult<Self> {
        let mut users = HashMap::with_capacity(config.users.len());
        for user in config.users {
            require_field(PROVIDER_TYPE, "users[].username", &user.username)?;
            PasswordHash::new(&user.password_hash).map_err(|e| {
                IdentityError::invalid_config(
                    PROVIDER_TYPE,
                    format!("invalid password_hash for '{}': {}", user.username, e),
                )
            })?;
            if users.contains_key(&user.username) {
                return Err(IdentityError::invalid_config(
                    PROVIDER_TYPE,
                    format!("duplicate user '{}'", user.username),
                ));
            }
            users.insert(user.username.clone(), user);
        }

        Ok(Self {
            users,
            semaphore: Arc::new(Semaphore::new(MAX_CONCURRENT_VERIFICATIONS)),
        })
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    async fn verify_user(&self, username: &str, password: &str) -> IdentityResult<&LocalUser> {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(IdentityError::upstream)?;

        let user = self.users.get(username);
        let password_hash = user.map_or(DUMMY_HASH, |u| u.password_hash.as_str());

        let parsed_hash = PasswordHash::new(password_hash)
            .map_err(|e| IdentityError::upstream(std::io::Error::other(e.to_string())))?;

        let password_valid = Argon2::default()
            .verify_password(password.as_bytes(), &parsed_hash)
            .is_ok();

        // Same error whether the user is unknown or the password is wrong.
        match user {
            Some(user) if password_valid => Ok(user),
            _ => {
                debug!("Password verification failed");
                Err(IdentityError::InvalidCredentials)
            }
        }
    }
}

#[async_trait]
impl GenericProvider for PasswordProvider {
    async fn authenticate(&self, payload: serde_json::Value) -> IdentityResult<Box<dyn Identity>> {
        let payload: PasswordAuthPayload = serde_json::from_value(payload)
            .map_err(|e| IdentityError::InvalidPayload(e.to_string()))?;

        let user = self
            .verify_user(&payload.username, &payload.password)
            .await?;

        Ok(Box::new(
            BasicIdentity::new(user.username.clone())
                .with_username(user.display_name.as_deref().unwrap_or(&user.username))
                .with_email(user.email.clone().unwrap_or_default())
                .with_avatar(user.avatar.clone().unwrap_or_default()),
        ))
    }
}

pub struct PasswordProviderFactory;

impl GenericProviderFactory for PasswordProviderFactory {
    fn provider_type(&self) -> &'static str {
        PROVIDER_TYPE
    }

    fn create(&self, options: &DynamicOptions) -> IdentityResult<Arc<dyn GenericProvider>> {
        let config: PasswordConfig = options.decode(PROVIDER_TYPE)?;
        Ok(Arc::new(PasswordProvider::new(config)?))
    }
}

/// Register the `password` provider type.
pub fn register(registry: &ProviderRegistry) -> IdentityResult<()> {
    registry.register_generic_provider(PasswordProviderFactory)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn user(username: &str, password: &str, email: Option<&str>) -> LocalUser {
        LocalUser {
            username: username.to_string(),
            password_hash: hash_password(password).unwrap(),
            email: email.map(str::to_string),
            display_name: None,
            avatar: None,
        }
    }

    fn setup_test_provider() -> PasswordProvider {
        let mut alice = user("alice", "supersecret", Some("alice@example.com"));
        alice.display_name = Some("Alice Smith".to_string());

        PasswordProvider::new(PasswordConfig {
            users: vec![
                user("testuser", "password123", Some("test@example.com")),
                alice,
            ],
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_basic_authentication_success() {
        let provider = setup_test_provider();

        let identity = provider
            .authenticate(json!({"username": "testuser", "password": "password123"}))
            .await
            .unwrap();

        assert_eq!(identity.user_id(), "testuser");
        assert_eq!(identity.username(), "testuser");
        assert_eq!(identity.email(), "test@example.com");
        assert_eq!(identity.avatar(), "");
    }

    #[tokio::test]
    async fn test_display_name_used_as_username() {
        let provider = setup_test_provider();
        let identity = provider
            .authenticate(json!({"username": "alice", "password": "supersecret"}))
            .await
            .unwrap();
        assert_eq!(identity.user_id(), "alice");
        assert_eq!(identity.username(), "Alice Smith");
    }

    #[tokio::test]
    async fn test_username_enumeration_prevention() {
        let provider = setup_test_provider();

        let err1 = provider
            .authenticate(json!({"username": "nonexistentuser", "password": "anypassword"}))
            .await
            .unwrap_err();
        let err2 = provider
            .authenticate(json!({"username": "testuser", "password": "wrongpassword"}))
            .await
            .unwrap_err();

        assert!(matches!(err1, IdentityError::InvalidCredentials));
        assert!(matches!(err2, IdentityError::InvalidCredentials));
        assert_eq!(err1.to_string(), err2.to_string());
    }

    #[tokio::test]
    async fn test_malformed_payload_handling() {
        let provider = setup_test_provider();

        for payload in [
            json!({"password": "password123"}),
            json!({"username": "testuser"}),
            json!({"user": "testuser", "pass": "password123"}),
            json!("just a string"),
        ] {
            let result = provider.authenticate(payload).await;
            assert!(matches!(result, Err(IdentityError::InvalidPayload(_))));
        }
    }

    #[tokio::test]
    async fn test_empty_credentials() {
        let provider = setup_test_provider();

        for (username, password) in [("", "password123"), ("testuser", ""), ("", "")] {
            let result = provider
                .authenticate(json!({"username": username, "password": password}))
                .await;
            assert!(matches!(result, Err(IdentityError::InvalidCredentials)));
        }
    }

    #[tokio::test]
    async fn test_concurrent_authentication_attempts() {
        let provider = Arc::new(setup_test_provider());

        const CONCURRENT_ATTEMPTS: usize = 12;
        let mut handles = Vec::new();

        for i in 0..CONCURRENT_ATTEMPTS {
            let provider = Arc::clone(&provider);
            handles.push(tokio::spawn(async move {
                let password = if i % 2 == 0 {
                    "password123".to_string()
                } else {
                    format!("wrong_password_{}", i)
                };
                provider
                    .authenticate(json!({"username": "testuser", "password": password}))
                    .await
                    .map(|identity| identity.user_id().to_string())
            }));
        }

        let mut successful_auths = 0;
        let mut failed_auths = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => successful_auths += 1,
                Err(IdentityError::InvalidCredentials) => failed_auths += 1,
                Err(other) => panic!("Unexpected error: {:?}", other),
            }
        }

        assert_eq!(successful_auths, CONCURRENT_ATTEMPTS / 2);
        assert_eq!(failed_auths, CONCURRENT_ATTEMPTS / 2);
    }

    #[test]
    fn test_factory_validates_hashes_and_duplicates() {
        let factory = PasswordProviderFactory;

        let bad_hash = DynamicOptions::from_value(json!({
            "users": [{"username": "bob", "password_hash": "plaintext"}]
        }))
        .unwrap();
        assert!(matches!(
            factory.create(&bad_hash),
            Err(IdentityError::InvalidConfig { .. })
        ));

        let hash = hash_password("pw").unwrap();
        let duplicate = DynamicOptions::from_value(json!({
            "users": [
                {"username": "bob", "password_hash": hash},
                {"username": "bob", "password_hash": hash}
            ]
        }))
        .unwrap();
        assert!(factory.create(&duplicate).is_err());

        let empty = DynamicOptions::new();
        assert!(factory.create(&empty).is_ok());
    }

    #[test]
    fn test_config_round_trip_omits_hashes() {
        let options = DynamicOptions::from_value(json!({
            "users": [{
                "username": "bob",
                "password_hash": hash_password("pw").unwrap(),
                "email": "bob@example.com"
            }],
            "ignored_key": 1
        }))
        .unwrap();

        let config: PasswordConfig = options.decode(PROVIDER_TYPE).unwrap();
        let encoded = serde_json::to_value(&config).unwrap();
        assert_eq!(
            encoded,
            json!({"users": [{"username": "bob", "email": "bob@example.com"}]})
        );
    }

    #[cfg(feature = "timing-tests")]
    #[tokio::test]
    async fn test_timing_attack_resistance() {
        use std::time::{Duration, Instant};

        let provider = setup_test_provider();
        const NUM_ATTEMPTS: u32 = 10;

        let mut nonexistent = Duration::ZERO;
        let mut wrong_password = Duration::ZERO;
        for i in 0..NUM_ATTEMPTS {
            let start = Instant::now();
            let _ = provider
                .authenticate(json!({"username": format!("ghost{}", i), "password": "x"}))
                .await;
            nonexistent += start.elapsed();

            let start = Instant::now();
            let _ = provider
                .authenticate(json!({"username": "testuser", "password": format!("x{}", i)}))
                .await;
            wrong_password += start.elapsed();
        }

        let avg_nonexistent = nonexistent / NUM_ATTEMPTS;
        let avg_wrong_password = wrong_password / NUM_ATTEMPTS;
        let time_diff = avg_nonexistent.abs_diff(avg_wrong_password);
        assert!(
            time_diff < Duration::from_millis(50),
            "Timing difference too large: {:?}",
            time_diff
        );
    }
}
