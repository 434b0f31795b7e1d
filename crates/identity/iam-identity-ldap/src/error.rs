//! LDAP provider errors.
//!
//! Messages never carry the bind password or the user's password.

use iam_identity_core::IdentityError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LdapError {
    /// The server answered a bind with result code 49.
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// The lookup account was rejected by the server.
    #[error("LDAP lookup bind rejected for '{0}'")]
    LookupBindRejected(String),

    #[error("LDAP bind failed with result code {code}: {message}")]
    BindFailed { code: u32, message: String },

    #[error("User not found: {0}")]
    UserNotFound(String),

    #[error("{count} entries match user '{username}'")]
    AmbiguousUser { username: String, count: usize },

    #[error("LDAP TLS error: {0}")]
    Tls(#[from] native_tls::Error),

    #[error("Failed to read root CA: {0}")]
    RootCa(#[from] std::io::Error),

    #[error(transparent)]
    Protocol(#[from] ldap3::LdapError),
}

pub type LdapResult<T> = Result<T, LdapError>;

impl From<LdapError> for IdentityError {
    fn from(err: LdapError) -> Self {
        match err {
            LdapError::InvalidCredentials => IdentityError::InvalidCredentials,
            LdapError::UserNotFound(_) | LdapError::AmbiguousUser { .. } => {
                IdentityError::Unauthorized(err.to_string())
            }
            LdapError::Protocol(e) => IdentityError::upstream(e),
            LdapError::Tls(e) => IdentityError::upstream(e),
            other => IdentityError::upstream(other),
        }
    }
}
