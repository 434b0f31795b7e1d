use crate::PROVIDER_TYPE;
use crate::crypto::{DecryptedUserData, decrypt_user_data};
use crate::error::{MiniAppError, MiniAppResult};
use async_trait::async_trait;
use iam_identity_core::{
    BasicIdentity, DynamicOptions, GenericProvider, GenericProviderFactory, Identity,
    IdentityError, IdentityResult, require_field,
};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error};

pub const DEFAULT_SESSION_ENDPOINT: &str = "https://api.weixin.qq.com/sns/jscode2session";

fn default_session_endpoint() -> String {
    DEFAULT_SESSION_ENDPOINT.to_string()
}

fn default_timeout_seconds() -> u64 {
    10
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MiniAppConfig {
    pub app_id: String,
    #[serde(skip_serializing)]
    pub app_secret: String,
    #[serde(default = "default_session_endpoint")]
    pub session_endpoint: String,
    #[serde(default)]
    pub insecure_skip_verify: bool,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

impl MiniAppConfig {
    pub fn validate(&self) -> IdentityResult<()> {
        require_field(PROVIDER_TYPE, "app_id", &self.app_id)?;
        require_field(PROVIDER_TYPE, "app_secret", &self.app_secret)?;
        require_field(PROVIDER_TYPE, "session_endpoint", &self.session_endpoint)?;
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
pub struct MiniAppAuthPayload {
    pub code: String,
    #[serde(default, alias = "encryptedData")]
    pub encrypted_data: Option<String>,
    #[serde(default)]
    pub iv: Option<String>,
}

/// Code-to-session exchange result.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SessionResponse {
    #[serde(default)]
    pub openid: Option<String>,
    #[serde(default)]
    pub session_key: Option<String>,
    #[serde(default)]
    pub unionid: Option<String>,
    #[serde(default)]
    pub errcode: i64,
    #[serde(default)]
    pub errmsg: String,
}

pub struct MiniAppProvider {
    config: MiniAppConfig,
    http_client: Client,
}

impl MiniAppProvider {
    pub fn new(config: MiniAppConfig) -> IdentityResult<Self> {
        config.validate()?;

        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .danger_accept_invalid_certs(config.insecure_skip_verify)
            .build()
            .map_err(|e| IdentityError::invalid_config(PROVIDER_TYPE, e.to_string()))?;

        Ok(Self {
            config,
            http_client,
        })
    }

    /// Exchange a login code for the user's session.
    pub async fn code_to_session(&self, code: &str) -> MiniAppResult<SessionResponse> {
        let response = self
            .http_client
            .get(&self.config.session_endpoint)
            .query(&[
                ("appid", self.config.app_id.as_str()),
                ("secret", self.config.app_secret.as_str()),
                ("js_code", code),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!("Session exchange failed: {}", error_text);
            return Err(MiniAppError::SessionExchangeFailed(error_text));
        }

        // The endpoint may answer with a text/plain content type.
        let body = response.text().await?;
        let session: SessionResponse =
            serde_json::from_str(&body).map_err(MiniAppError::MalformedSession)?;
        if session.errcode != 0 {
            error!(errcode = session.errcode, "Session exchange rejected: {}", session.errmsg);
            return Err(MiniAppError::SessionRejected {
                errcode: session.errcode,
                errmsg: session.errmsg,
            });
        }

        debug!("Exchanged login code for session");
        Ok(session)
    }

    fn identity(
        session: SessionResponse,
        profile: Option<DecryptedUserData>,
    ) -> MiniAppResult<BasicIdentity> {
        let openid = session.openid.filter(|id| !id.is_empty());
        let unionid = session.unionid.filter(|id| !id.is_empty());

        // The profile may only add a union id to a session that has an openid.
        let unionid = unionid.or_else(|| {
            openid.as_ref()?;
            profile
                .as_ref()
                .and_then(|p| p.union_id.clone())
                .filter(|id| !id.is_empty())
        });

        let (user_id, username) = match (unionid, openid) {
            (Some(unionid), Some(openid)) => (unionid, openid),
            (Some(unionid), None) => (unionid.clone(), unionid),
            (None, Some(openid)) => (openid.clone(), openid),
            (None, None) => return Err(MiniAppError::MissingOpenId),
        };

        let mut identity = BasicIdentity::new(user_id).with_username(username);
        if let Some(profile) = profile {
            if let Some(nick_name) = profile.nick_name.filter(|n| !n.is_empty()) {
                identity = identity.with_username(nick_name);
            }
            if let Some(avatar) = profile.avatar_url {
                identity = identity.with_avatar(avatar);
            }
        }
        Ok(identity)
    }
}

#[async_trait]
impl GenericProvider for MiniAppProvider {
    async fn authenticate(&self, payload: serde_json::Value) -> IdentityResult<Box<dyn Identity>> {
        let payload: MiniAppAuthPayload = serde_json::from_value(payload)
            .map_err(|e| IdentityError::InvalidPayload(e.to_string()))?;
        if payload.code.is_empty() {
            return Err(IdentityError::InvalidPayload("code is required".to_string()));
        }

        let session = self.code_to_session(&payload.code).await?;
        if !has_id(&session.openid) && !has_id(&session.unionid) {
            return Err(MiniAppError::MissingOpenId.into());
        }

        let profile = match (&payload.encrypted_data, &payload.iv, &session.session_key) {
            (Some(data), Some(iv), Some(key)) if !data.is_empty() && !iv.is_empty() => {
                Some(decrypt_user_data(&self.config.app_id, key, data, iv)?)
            }
            _ => None,
        };

        Ok(Box::new(Self::identity(session, profile)?))
    }
}

fn has_id(id: &Option<String>) -> bool {
    id.as_deref().is_some_and(|id| !id.is_empty())
}

pub struct MiniAppProviderFactory;

impl GenericProviderFactory for MiniAppProviderFactory {
    fn provider_type(&self) -> &'static str {
        PROVIDER_TYPE
    }

    fn create(&self, options: &DynamicOptions) -> IdentityResult<Arc<dyn GenericProvider>> {
        let config: MiniAppConfig = options.decode(PROVIDER_TYPE)?;
        Ok(Arc::new(MiniAppProvider::new(config)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::tests::encrypt;
    use iam_identity_core::is_sensitive_key;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn provider(server: &MockServer) -> MiniAppProvider {
        MiniAppProvider::new(MiniAppConfig {
            app_id: "wx-app".to_string(),
            app_secret: "wx-secret".to_string(),
            session_endpoint: format!("{}/sns/jscode2session", server.uri()),
            insecure_skip_verify: false,
            timeout_seconds: 5,
        })
        .unwrap()
    }

    async fn mock_session(server: &MockServer, code: &str, body: serde_json::Value) {
        Mock::given(method("GET"))
            .and(path("/sns/jscode2session"))
            .and(query_param("appid", "wx-app"))
            .and(query_param("secret", "wx-secret"))
            .and(query_param("js_code", code))
            .and(query_param("grant_type", "authorization_code"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body.to_string()))
            .expect(1)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn openid_becomes_user_id() {
        let server = MockServer::start().await;
        mock_session(
            &server,
            "code-1",
            json!({"openid": "o-123", "session_key": "a2V5"}),
        )
        .await;

        let identity = provider(&server)
            .await
            .authenticate(json!({"code": "code-1"}))
            .await
            .unwrap();

        assert_eq!(identity.user_id(), "o-123");
        assert_eq!(identity.username(), "o-123");
        assert_eq!(identity.email(), "");
    }

    #[tokio::test]
    async fn unionid_preferred() {
        let server = MockServer::start().await;
        mock_session(
            &server,
            "code-2",
            json!({"openid": "o-123", "unionid": "u-456", "session_key": "a2V5"}),
        )
        .await;

        let identity = provider(&server)
            .await
            .authenticate(json!({"code": "code-2"}))
            .await
            .unwrap();
        assert_eq!(identity.user_id(), "u-456");
        assert_eq!(identity.username(), "o-123");
    }

    #[tokio::test]
    async fn encrypted_profile_is_applied() {
        let server = MockServer::start().await;
        let (key, data, iv) = encrypt(&json!({
            "openId": "o-123",
            "nickName": "Band",
            "avatarUrl": "https://img.example.com/a.png",
            "watermark": {"appid": "wx-app", "timestamp": 1}
        }));
        mock_session(
            &server,
            "code-3",
            json!({"openid": "o-123", "session_key": key}),
        )
        .await;

        let identity = provider(&server)
            .await
            .authenticate(json!({"code": "code-3", "encryptedData": data, "iv": iv}))
            .await
            .unwrap();

        assert_eq!(identity.user_id(), "o-123");
        assert_eq!(identity.username(), "Band");
        assert_eq!(identity.avatar(), "https://img.example.com/a.png");
    }

    #[tokio::test]
    async fn foreign_watermark_unauthorized() {
        let server = MockServer::start().await;
        let (key, data, iv) = encrypt(&json!({"watermark": {"appid": "wx-other"}}));
        mock_session(
            &server,
            "code-4",
            json!({"openid": "o-123", "session_key": key}),
        )
        .await;

        let result = provider(&server)
            .await
            .authenticate(json!({"code": "code-4", "encrypted_data": data, "iv": iv}))
            .await;
        assert!(matches!(result, Err(IdentityError::Unauthorized(_))));
    }

    #[tokio::test]
    async fn errcode_returned_upstream() {
        let server = MockServer::start().await;
        mock_session(
            &server,
            "used",
            json!({"errcode": 40163, "errmsg": "code been used"}),
        )
        .await;

        let result = provider(&server)
            .await
            .authenticate(json!({"code": "used"}))
            .await;
        let Err(IdentityError::Upstream(source)) = result else {
            panic!("expected upstream error");
        };
        assert!(matches!(
            source.downcast_ref::<MiniAppError>(),
            Some(MiniAppError::SessionRejected { errcode: 40163, .. })
        ));
    }

    #[tokio::test]
    async fn session_without_ids_is_invalid_credentials() {
        let server = MockServer::start().await;
        mock_session(&server, "code-5", json!({"session_key": "a2V5"})).await;

        let result = provider(&server)
            .await
            .authenticate(json!({"code": "code-5"}))
            .await;
        assert!(matches!(result, Err(IdentityError::InvalidCredentials)));
    }

    #[tokio::test]
    async fn profile_cannot_supply_missing_session_ids() {
        let server = MockServer::start().await;
        let (key, data, iv) = encrypt(&json!({
            "openId": "o-from-profile",
            "unionId": "u-from-profile",
            "watermark": {"appid": "wx-app", "timestamp": 1}
        }));
        mock_session(&server, "code-6", json!({"session_key": key})).await;

        let result = provider(&server)
            .await
            .authenticate(json!({"code": "code-6", "encryptedData": data, "iv": iv}))
            .await;
        assert!(matches!(result, Err(IdentityError::InvalidCredentials)));
    }

    #[tokio::test]
    async fn profile_union_id_extends_openid_session() {
        let server = MockServer::start().await;
        let (key, data, iv) = encrypt(&json!({
            "openId": "o-123",
            "unionId": "u-789",
            "watermark": {"appid": "wx-app", "timestamp": 1}
        }));
        mock_session(
            &server,
            "code-7",
            json!({"openid": "o-123", "session_key": key}),
        )
        .await;

        let identity = provider(&server)
            .await
            .authenticate(json!({"code": "code-7", "encryptedData": data, "iv": iv}))
            .await
            .unwrap();
        assert_eq!(identity.user_id(), "u-789");
        assert_eq!(identity.username(), "o-123");
    }

    #[tokio::test]
    async fn malformed_session_body_is_upstream() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/sns/jscode2session"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>gateway</html>"))
            .mount(&server)
            .await;

        let result = provider(&server)
            .await
            .authenticate(json!({"code": "code-8"}))
            .await;
        let Err(IdentityError::Upstream(source)) = result else {
            panic!("expected upstream error");
        };
        assert!(matches!(
            source.downcast_ref::<MiniAppError>(),
            Some(MiniAppError::MalformedSession(_))
        ));
    }

    #[tokio::test]
    async fn non_success_status_keeps_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/sns/jscode2session"))
            .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
            .mount(&server)
            .await;

        let result = provider(&server).await.code_to_session("x").await;
        assert!(matches!(
            result,
            Err(MiniAppError::SessionExchangeFailed(ref body)) if body == "bad gateway"
        ));
    }

    #[tokio::test]
    async fn missing_code_is_invalid_payload() {
        let server = MockServer::start().await;
        let provider = provider(&server).await;

        for payload in [json!({}), json!({"code": ""})] {
            let result = provider.authenticate(payload).await;
            assert!(matches!(result, Err(IdentityError::InvalidPayload(_))));
        }
    }

    #[test]
    fn factory_requires_credentials() {
        let factory = MiniAppProviderFactory;
        assert_eq!(factory.provider_type(), "miniapp");

        let missing_secret = DynamicOptions::new()
            .with("app_id", "wx-app")
            .with("app_secret", "");
        assert!(matches!(
            factory.create(&missing_secret),
            Err(IdentityError::InvalidConfig { .. })
        ));

        let valid = DynamicOptions::new()
            .with("app_id", "wx-app")
            .with("app_secret", "wx-secret");
        assert!(factory.create(&valid).is_ok());
    }

    #[test]
    fn serialized_config_omits_secret() {
        let config: MiniAppConfig = DynamicOptions::new()
            .with("app_id", "wx-app")
            .with("app_secret", "wx-secret")
            .decode(PROVIDER_TYPE)
            .unwrap();
        assert_eq!(config.app_secret, "wx-secret");

        let out = serde_json::to_value(&config).unwrap();
        let out = out.as_object().unwrap();
        assert!(out.keys().all(|key| !is_sensitive_key(key)));
        assert_eq!(out["app_id"], "wx-app");
        assert_eq!(out["timeout_seconds"], 10);
    }
}
