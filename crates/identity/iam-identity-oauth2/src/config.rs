//! OAuth2 configuration types.

use crate::error::{OAuth2Error, OAuth2Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const MICROSOFT_LOGIN_BASE: &str = "https://login.microsoftonline.com";
pub const MICROSOFT_USERINFO_URL: &str = "https://graph.microsoft.com/oidc/userinfo";

fn default_timeout_seconds() -> u64 {
    30
}

fn default_tenant() -> String {
    "common".to_string()
}

/// Options of an `oauth2` provider instance.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OAuth2Config {
    pub client_id: String,
    #[serde(skip_serializing)]
    pub client_secret: String,
    #[serde(default)]
    pub redirect_url: String,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default)]
    pub auth_url: String,
    #[serde(default)]
    pub token_url: String,
    #[serde(default)]
    pub userinfo_url: String,
    /// Additional parameters to include in the authorization request
    #[serde(default)]
    pub auth_params: HashMap<String, String>,
    #[serde(default)]
    pub insecure_skip_verify: bool,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    #[serde(default)]
    pub user_info_mapping: Option<UserInfoMapping>,
}

impl OAuth2Config {
    pub fn validate(&self) -> OAuth2Result<()> {
        for (field, value) in [
            ("client_id", &self.client_id),
            ("auth_url", &self.auth_url),
            ("token_url", &self.token_url),
            ("userinfo_url", &self.userinfo_url),
        ] {
            if value.trim().is_empty() {
                return Err(OAuth2Error::ConfigError(format!(
                    "missing required field '{}'",
                    field
                )));
            }
        }
        url::Url::parse(&self.auth_url)?;
        url::Url::parse(&self.token_url)?;
        url::Url::parse(&self.userinfo_url)?;
        if self.timeout_seconds == 0 {
            return Err(OAuth2Error::ConfigError(
                "timeout_seconds must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Options of a `microsoft` provider instance.
///
/// Blank endpoint URLs are derived from the tenant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MicrosoftConfig {
    #[serde(default = "default_tenant")]
    pub tenant: String,
    #[serde(flatten)]
    pub oauth2: OAuth2Config,
}

impl MicrosoftConfig {
    pub fn into_oauth2(self) -> OAuth2Config {
        let tenant = if self.tenant.trim().is_empty() {
            default_tenant()
        } else {
            self.tenant
        };

        let mut config = self.oauth2;
        if config.auth_url.trim().is_empty() {
            config.auth_url = format!("{}/{}/oauth2/v2.0/authorize", MICROSOFT_LOGIN_BASE, tenant);
        }
        if config.token_url.trim().is_empty() {
            config.token_url = format!("{}/{}/oauth2/v2.0/token", MICROSOFT_LOGIN_BASE, tenant);
        }
        if config.userinfo_url.trim().is_empty() {
            config.userinfo_url = MICROSOFT_USERINFO_URL.to_string();
        }
        if config.scopes.is_empty() {
            config.scopes = ["openid", "profile", "email"]
                .into_iter()
                .map(String::from)
                .collect();
        }
        config
    }
}

/// Names of the user info claims each identity field is read from.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserInfoMapping {
    pub subject_field: Option<String>,
    pub username_field: Option<String>,
    pub email_field: Option<String>,
    pub avatar_field: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use iam_identity_core::is_sensitive_key;
    use serde_json::json;

    #[test]
    fn microsoft_endpoints_from_tenant() {
        let config: MicrosoftConfig = serde_json::from_value(json!({
            "tenant": "contoso.onmicrosoft.com",
            "client_id": "cid",
            "client_secret": "secret",
            "redirect_url": "https://app.example.com/callback"
        }))
        .unwrap();

        let config = config.into_oauth2();
        assert_eq!(
            config.auth_url,
            "https://login.microsoftonline.com/contoso.onmicrosoft.com/oauth2/v2.0/authorize"
        );
        assert_eq!(
            config.token_url,
            "https://login.microsoftonline.com/contoso.onmicrosoft.com/oauth2/v2.0/token"
        );
        assert_eq!(config.userinfo_url, MICROSOFT_USERINFO_URL);
        assert_eq!(config.scopes, vec!["openid", "profile", "email"]);
        assert_eq!(config.timeout_seconds, 30);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn microsoft_defaults_to_common_tenant() {
        let config: MicrosoftConfig = serde_json::from_value(json!({
            "client_id": "cid",
            "client_secret": "secret",
            "scopes": ["User.Read"]
        }))
        .unwrap();
        assert_eq!(config.tenant, "common");

        let config = config.into_oauth2();
        assert!(config.auth_url.contains("/common/"));
        assert_eq!(config.scopes, vec!["User.Read"]);
    }

    #[test]
    fn explicit_urls_are_kept() {
        let config: MicrosoftConfig = serde_json::from_value(json!({
            "client_id": "cid",
            "client_secret": "secret",
            "auth_url": "https://login.example.com/authorize"
        }))
        .unwrap();
        assert_eq!(
            config.into_oauth2().auth_url,
            "https://login.example.com/authorize"
        );
    }

    #[test]
    fn oauth2_requires_endpoints() {
        let config: OAuth2Config = serde_json::from_value(json!({
            "client_id": "cid",
            "client_secret": "secret",
            "auth_url": "https://example.com/auth",
            "token_url": "https://example.com/token"
        }))
        .unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("userinfo_url"));
    }

    #[test]
    fn oauth2_rejects_malformed_url() {
        let config = OAuth2Config {
            client_id: "cid".to_string(),
            auth_url: "not a url".to_string(),
            token_url: "https://example.com/token".to_string(),
            userinfo_url: "https://example.com/userinfo".to_string(),
            timeout_seconds: 30,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(OAuth2Error::UrlError(_))));
    }

    #[test]
    fn serialized_configs_omit_client_secret() {
        let oauth2: OAuth2Config = serde_json::from_value(json!({
            "client_id": "cid",
            "client_secret": "s3cr3t",
            "auth_url": "https://example.com/auth",
            "token_url": "https://example.com/token",
            "userinfo_url": "https://example.com/userinfo"
        }))
        .unwrap();
        assert_eq!(oauth2.client_secret, "s3cr3t");

        let microsoft: MicrosoftConfig = serde_json::from_value(json!({
            "tenant": "contoso",
            "client_id": "cid",
            "client_secret": "s3cr3t"
        }))
        .unwrap();

        for value in [
            serde_json::to_value(&oauth2).unwrap(),
            serde_json::to_value(&microsoft).unwrap(),
        ] {
            assert!(!value.to_string().contains("s3cr3t"));
            let out = value.as_object().unwrap();
            assert!(out.keys().all(|key| !is_sensitive_key(key)));
            assert_eq!(out["client_id"], "cid");
        }
    }
}
