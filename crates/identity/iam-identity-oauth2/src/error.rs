//! OAuth2 error types.

use iam_identity_core::IdentityError;
use thiserror::Error;

pub type OAuth2Result<T> = Result<T, OAuth2Error>;

#[derive(Debug, Error)]
pub enum OAuth2Error {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("Missing authorization code")]
    MissingAuthorizationCode,

    #[error("Token exchange failed: {0}")]
    TokenExchangeFailed(String),

    #[error("User info request failed: {0}")]
    UserInfoFailed(String),

    #[error("URL parsing error: {0}")]
    UrlError(#[from] url::ParseError),

    #[error("User info response has no subject")]
    MissingSubject,

    #[error("Callback error: {0}")]
    CallbackError(String),
}

impl From<OAuth2Error> for IdentityError {
    fn from(err: OAuth2Error) -> Self {
        match err {
            OAuth2Error::MissingAuthorizationCode => IdentityError::MissingAuthorizationCode,
            OAuth2Error::CallbackError(_) | OAuth2Error::MissingSubject => {
                IdentityError::Unauthorized(err.to_string())
            }
            OAuth2Error::ConfigError(reason) => IdentityError::invalid_config("oauth2", reason),
            OAuth2Error::HttpError(e) => IdentityError::upstream(e),
            other => IdentityError::upstream(other),
        }
    }
}
