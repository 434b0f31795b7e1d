//! OAuth2 identity providers.

use crate::client::OAuth2Client;
use crate::config::{MicrosoftConfig, OAuth2Config, UserInfoMapping};
use crate::error::{OAuth2Error, OAuth2Result};
use crate::types::UserInfoResponse;
use crate::{MICROSOFT_PROVIDER_TYPE, OAUTH2_PROVIDER_TYPE};
use async_trait::async_trait;
use iam_identity_core::{
    BasicIdentity, DynamicOptions, Identity, IdentityError, IdentityResult, OAuthProvider,
    OAuthProviderFactory, authorization_code,
};
use std::sync::Arc;
use tracing::{debug, info};

const SUBJECT_CLAIMS: &[&str] = &["sub", "id", "oid"];
const USERNAME_CLAIMS: &[&str] = &["preferred_username", "login", "name"];
const EMAIL_CLAIMS: &[&str] = &["email", "mail", "upn"];
const AVATAR_CLAIMS: &[&str] = &["picture", "avatar_url"];

/// Authorization-code grant against configured endpoints.
pub struct OAuth2Provider {
    config: OAuth2Config,
    client: OAuth2Client,
}

impl OAuth2Provider {
    pub fn new(config: OAuth2Config) -> OAuth2Result<Self> {
        config.validate()?;
        let client = OAuth2Client::new(config.timeout_seconds, config.insecure_skip_verify)?;
        Ok(Self { config, client })
    }

    pub fn config(&self) -> &OAuth2Config {
        &self.config
    }

    async fn exchange(&self, request: &http::request::Parts) -> OAuth2Result<BasicIdentity> {
        if let Some(error) = query_param(request, "error") {
            let description = query_param(request, "error_description")
                .unwrap_or_else(|| "No description".to_string());
            return Err(OAuth2Error::CallbackError(format!(
                "{}: {}",
                error, description
            )));
        }

        let code = authorization_code(request).ok_or(OAuth2Error::MissingAuthorizationCode)?;

        let token_response = self.client.exchange_code(&self.config, &code).await?;
        let user_info = self
            .client
            .get_user_info(&self.config, &token_response.access_token)
            .await?;

        let identity = map_user_info(&user_info, self.config.user_info_mapping.as_ref())?;
        debug!(subject = %identity.user_id(), "Retrieved user info");
        Ok(identity)
    }
}

fn query_param(request: &http::request::Parts, name: &str) -> Option<String> {
    let query = request.uri.query()?;
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
        .filter(|value| !value.is_empty())
}

/// Pick a claim, preferring the configured field over the fallbacks.
fn mapped_claim(
    user_info: &UserInfoResponse,
    configured: Option<&String>,
    fallbacks: &[&str],
) -> Option<String> {
    configured
        .and_then(|field| user_info.claim(field))
        .or_else(|| user_info.first_claim(fallbacks))
}

/// Map a user info claim set to an identity.
pub fn map_user_info(
    user_info: &UserInfoResponse,
    mapping: Option<&UserInfoMapping>,
) -> OAuth2Result<BasicIdentity> {
    let subject = mapped_claim(
        user_info,
        mapping.and_then(|m| m.subject_field.as_ref()),
        SUBJECT_CLAIMS,
    )
    .ok_or(OAuth2Error::MissingSubject)?;

    let username = mapped_claim(
        user_info,
        mapping.and_then(|m| m.username_field.as_ref()),
        USERNAME_CLAIMS,
    )
    .unwrap_or_else(|| subject.clone());
    let email = mapped_claim(
        user_info,
        mapping.and_then(|m| m.email_field.as_ref()),
        EMAIL_CLAIMS,
    )
    .unwrap_or_default();
    let avatar = mapped_claim(
        user_info,
        mapping.and_then(|m| m.avatar_field.as_ref()),
        AVATAR_CLAIMS,
    )
    .unwrap_or_default();

    Ok(BasicIdentity::new(subject)
        .with_username(username)
        .with_email(email)
        .with_avatar(avatar))
}

#[async_trait]
impl OAuthProvider for OAuth2Provider {
    fn authorization_url(&self, state: &str) -> IdentityResult<String> {
        Ok(self.client.authorization_url(&self.config, state)?)
    }

    async fn identity_exchange_callback(
        &self,
        request: &http::request::Parts,
    ) -> IdentityResult<Box<dyn Identity>> {
        Ok(Box::new(self.exchange(request).await?))
    }
}

fn create_provider(
    provider_type: &str,
    config: OAuth2Config,
) -> IdentityResult<Arc<dyn OAuthProvider>> {
    let provider = OAuth2Provider::new(config).map_err(|e| match e {
        OAuth2Error::HttpError(e) => IdentityError::invalid_config(provider_type, e.to_string()),
        OAuth2Error::UrlError(e) => IdentityError::invalid_config(provider_type, e.to_string()),
        OAuth2Error::ConfigError(reason) => IdentityError::invalid_config(provider_type, reason),
        other => other.into(),
    })?;
    info!(
        provider_type,
        auth_url = %provider.config().auth_url,
        "Created OAuth2 provider"
    );
    Ok(Arc::new(provider))
}

pub struct OAuth2ProviderFactory;

impl OAuthProviderFactory for OAuth2ProviderFactory {
    fn provider_type(&self) -> &'static str {
        OAUTH2_PROVIDER_TYPE
    }

    fn create(&self, options: &DynamicOptions) -> IdentityResult<Arc<dyn OAuthProvider>> {
        let config: OAuth2Config = options.decode(OAUTH2_PROVIDER_TYPE)?;
        create_provider(OAUTH2_PROVIDER_TYPE, config)
    }
}

/// Microsoft identity platform: endpoints derived from the tenant.
pub struct MicrosoftProviderFactory;

impl OAuthProviderFactory for MicrosoftProviderFactory {
    fn provider_type(&self) -> &'static str {
        MICROSOFT_PROVIDER_TYPE
    }

    fn create(&self, options: &DynamicOptions) -> IdentityResult<Arc<dyn OAuthProvider>> {
        let config: MicrosoftConfig = options.decode(MICROSOFT_PROVIDER_TYPE)?;
        create_provider(MICROSOFT_PROVIDER_TYPE, config.into_oauth2())
    }
}
