//! OAuth2 authorization-code client.

use crate::config::OAuth2Config;
use crate::error::{OAuth2Error, OAuth2Result};
use crate::types::{TokenResponse, UserInfoResponse};
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, error};
use url::Url;

/// HTTP side of the authorization-code grant.
#[derive(Clone)]
pub struct OAuth2Client {
    http_client: Client,
}

impl OAuth2Client {
    pub fn new(http_timeout_seconds: u64, insecure_skip_verify: bool) -> OAuth2Result<Self> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(http_timeout_seconds))
            .danger_accept_invalid_certs(insecure_skip_verify)
            .build()?;

        Ok(Self { http_client })
    }

    /// Build the URL the user agent is redirected to.
    pub fn authorization_url(&self, config: &OAuth2Config, state: &str) -> OAuth2Result<String> {
        let mut url = Url::parse(&config.auth_url)?;

        {
            let mut params = url.query_pairs_mut();
            params.append_pair("response_type", "code");
            params.append_pair("client_id", &config.client_id);
            if !config.redirect_url.is_empty() {
                params.append_pair("redirect_uri", &config.redirect_url);
            }
            if !config.scopes.is_empty() {
                params.append_pair("scope", &config.scopes.join(" "));
            }
            params.append_pair("state", state);

            for (key, value) in &config.auth_params {
                params.append_pair(key, value);
            }
        }

        Ok(url.to_string())
    }

    /// Exchange an authorization code for tokens
    pub async fn exchange_code(
        &self,
        config: &OAuth2Config,
        code: &str,
    ) -> OAuth2Result<TokenResponse> {
        let mut params = vec![
            ("grant_type", "authorization_code"),
            ("code", code),
            ("client_id", config.client_id.as_str()),
            ("client_secret", config.client_secret.as_str()),
        ];
        if !config.redirect_url.is_empty() {
            params.push(("redirect_uri", config.redirect_url.as_str()));
        }

        let response = self
            .http_client
            .post(&config.token_url)
            .header(reqwest::header::ACCEPT, "application/json")
            .form(&params)
            .send()
            .await?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!("Token exchange failed: {}", error_text);
            return Err(OAuth2Error::TokenExchangeFailed(error_text));
        }

        let token_response: TokenResponse = response.json().await?;
        debug!("Exchanged authorization code for tokens");
        Ok(token_response)
    }

    /// Get user info using an access token
    pub async fn get_user_info(
        &self,
        config: &OAuth2Config,
        access_token: &str,
    ) -> OAuth2Result<UserInfoResponse> {
        let response = self
            .http_client
            .get(&config.userinfo_url)
            .bearer_auth(access_token)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!("User info request failed: {}", error_text);
            return Err(OAuth2Error::UserInfoFailed(error_text));
        }

        Ok(response.json().await?)
    }
}
