//! OAuth2 identity providers (`oauth2` and `microsoft` types).
//!
//! [`OAuthProvider::authorization_url`](iam_identity_core::OAuthProvider::authorization_url)
//! builds the redirect; the callback exchanges the authorization code at the
//! token endpoint and reads the user's claims from the userinfo endpoint.

pub mod client;
pub mod config;
pub mod error;
pub mod provider;
pub mod types;


pub use client::OAuth2Client;
pub use config::{
    MICROSOFT_LOGIN_BASE, MICROSOFT_USERINFO_URL, MicrosoftConfig, OAuth2Config, UserInfoMapping,
};
pub use error::{OAuth2Error, OAuth2Result};
pub use provider::{MicrosoftProviderFactory, OAuth2Provider, OAuth2ProviderFactory, map_user_info};
pub use types::{TokenResponse, UserInfoResponse};

use iam_identity_core::{IdentityResult, ProviderRegistry};

pub const OAUTH2_PROVIDER_TYPE: &str = "oauth2";
pub const MICROSOFT_PROVIDER_TYPE: &str = "microsoft";

/// Register the `oauth2` and `microsoft` provider types.
pub fn register(registry: &ProviderRegistry) -> IdentityResult<()> {
    registry.register_oauth_provider(OAuth2ProviderFactory)?;
    registry.register_oauth_provider(MicrosoftProviderFactory)
}
