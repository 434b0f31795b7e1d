//! Mini-app error types.

use iam_identity_core::IdentityError;
use thiserror::Error;

pub type MiniAppResult<T> = Result<T, MiniAppError>;

#[derive(Debug, Error)]
pub enum MiniAppError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Session exchange failed: {0}")]
    SessionExchangeFailed(String),

    #[error("Session exchange rejected ({errcode}): {errmsg}")]
    SessionRejected { errcode: i64, errmsg: String },

    #[error("Malformed session response: {0}")]
    MalformedSession(#[source] serde_json::Error),

    #[error("Session carries neither openid nor unionid")]
    MissingOpenId,

    #[error("Invalid base64 in {field}: {source}")]
    InvalidEncoding {
        field: &'static str,
        #[source]
        source: base64::DecodeError,
    },

    #[error("Invalid session key or iv length")]
    InvalidKeyLength,

    #[error("Failed to decrypt user data")]
    DecryptionFailed,

    #[error("Watermark appid '{actual}' does not match '{expected}'")]
    WatermarkMismatch { expected: String, actual: String },

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl From<MiniAppError> for IdentityError {
    fn from(err: MiniAppError) -> Self {
        match err {
            MiniAppError::MissingOpenId => IdentityError::InvalidCredentials,
            MiniAppError::WatermarkMismatch { .. } => IdentityError::Unauthorized(err.to_string()),
            MiniAppError::InvalidEncoding { .. }
            | MiniAppError::InvalidKeyLength
            | MiniAppError::DecryptionFailed
            | MiniAppError::SerializationError(_) => IdentityError::InvalidPayload(err.to_string()),
            MiniAppError::HttpError(e) => IdentityError::upstream(e),
            other => IdentityError::upstream(other),
        }
    }
}
