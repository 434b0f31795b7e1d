//! Identity error kinds shared by every provider.

use thiserror::Error;

/// Boxed error used to carry library and transport failures unchanged.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Provider not found: {0}")]
    ProviderNotFound(String),

    #[error("Unknown provider type '{provider_type}' for provider '{name}'")]
    UnknownProviderType { name: String, provider_type: String },

    #[error("Duplicate provider name: {0}")]
    DuplicateProviderName(String),

    #[error("Provider type already registered: {0}")]
    DuplicateProviderType(String),

    #[error("Invalid {provider_type} provider configuration: {reason}")]
    InvalidConfig {
        provider_type: String,
        reason: String,
    },

    #[error("Invalid authentication payload: {0}")]
    InvalidPayload(String),

    #[error("Missing authorization code")]
    MissingAuthorizationCode,

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// A transport, protocol or library failure, kept as the original error.
    #[error(transparent)]
    Upstream(BoxError),
}

impl IdentityError {
    pub fn invalid_config(provider_type: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            provider_type: provider_type.into(),
            reason: reason.into(),
        }
    }

    pub fn upstream<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Upstream(Box::new(err))
    }

    /// Configuration-level errors abort `setup_with_options`.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Self::UnknownProviderType { .. }
                | Self::DuplicateProviderName(_)
                | Self::DuplicateProviderType(_)
        )
    }

    /// Expected, user-triggerable authentication outcomes.
    pub fn is_authentication_failure(&self) -> bool {
        matches!(
            self,
            Self::InvalidCredentials
                | Self::Unauthorized(_)
                | Self::InvalidPayload(_)
                | Self::MissingAuthorizationCode
        )
    }
}

pub type IdentityResult<T> = Result<T, IdentityError>;
