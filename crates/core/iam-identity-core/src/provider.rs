//! Provider capability families and their factories.

use crate::error::IdentityResult;
use crate::identity::Identity;
use crate::options::DynamicOptions;
use async_trait::async_trait;
use std::sync::Arc;

/// Which capability family a provider belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Generic,
    OAuth,
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderKind::Generic => write!(f, "generic"),
            ProviderKind::OAuth => write!(f, "oauth"),
        }
    }
}

/// Direct credential verification completed in one round trip
/// (username/password, a mini-app code, a pre-established session key).
#[async_trait]
pub trait GenericProvider: Send + Sync {
    /// Verify the credential carried by `payload`.
    ///
    /// Each provider decodes its own payload shape; a payload that does not
    /// match is reported as `InvalidPayload`.
    async fn authenticate(&self, payload: serde_json::Value) -> IdentityResult<Box<dyn Identity>>;
}

/// The redirect/callback half of an OAuth2 authorization-code grant.
#[async_trait]
pub trait OAuthProvider: Send + Sync {
    /// URL the browser is redirected to in order to start the grant.
    fn authorization_url(&self, state: &str) -> IdentityResult<String>;

    /// Exchange the `code` query parameter of the inbound callback for an identity.
    async fn identity_exchange_callback(
        &self,
        request: &http::request::Parts,
    ) -> IdentityResult<Box<dyn Identity>>;
}

/// Stateless constructor for one generic provider type.
///
/// `create` decodes the options, applies defaults, validates required fields
/// and never performs network I/O.
pub trait GenericProviderFactory: Send + Sync {
    fn provider_type(&self) -> &'static str;

    fn create(&self, options: &DynamicOptions) -> IdentityResult<Arc<dyn GenericProvider>>;
}

/// Stateless constructor for one OAuth provider type.
pub trait OAuthProviderFactory: Send + Sync {
    fn provider_type(&self) -> &'static str;

    fn create(&self, options: &DynamicOptions) -> IdentityResult<Arc<dyn OAuthProvider>>;
}

/// Read the OAuth2 `code` query parameter from a callback request.
pub fn authorization_code(request: &http::request::Parts) -> Option<String> {
    let query = request.uri.query()?;
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == "code")
        .map(|(_, value)| value.into_owned())
        .filter(|code| !code.is_empty())
}
