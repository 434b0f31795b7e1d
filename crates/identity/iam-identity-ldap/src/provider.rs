use crate::PROVIDER_TYPE;
use crate::config::LdapConfig;
use crate::directory::{DirectoryConnector, DirectorySession, Ldap3Connector};
use crate::error::{LdapError, LdapResult};
use async_trait::async_trait;
use iam_identity_core::{
    BasicIdentity, DynamicOptions, GenericProvider, GenericProviderFactory, Identity,
    IdentityError, IdentityResult,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Deserialize)]
pub struct LdapAuthPayload {
    pub username: String,
    pub password: String,
}

/// Direct-bind authentication: bind as the lookup account, find exactly one
/// entry for the login name, then bind as that entry with the user's password.
pub struct LdapProvider {
    config: LdapConfig,
    connector: Arc<dyn DirectoryConnector>,
}

impl LdapProvider {
    pub fn new(config: LdapConfig) -> IdentityResult<Self> {
        Self::with_connector(config, Arc::new(Ldap3Connector))
    }

    pub fn with_connector(
        config: LdapConfig,
        connector: Arc<dyn DirectoryConnector>,
    ) -> IdentityResult<Self> {
        config.validate()?;
        Ok(Self { config, connector })
    }

    pub fn config(&self) -> &LdapConfig {
        &self.config
    }

    async fn direct_bind(
        &self,
        session: &mut dyn DirectorySession,
        username: &str,
        password: &str,
    ) -> LdapResult<BasicIdentity> {
        if !self.config.bind_dn.is_empty() {
            session
                .simple_bind(&self.config.bind_dn, &self.config.bind_password)
                .await
                .map_err(|e| match e {
                    LdapError::InvalidCredentials => {
                        LdapError::LookupBindRejected(self.config.bind_dn.clone())
                    }
                    other => other,
                })?;
        }

        let filter = self.config.user_filter(username);
        debug!(filter = %filter, base = %self.config.search_base, "Searching for user entry");
        let mut entries = session
            .search(&self.config.search_base, &filter, &self.config.attributes())
            .await?;

        let entry = match entries.len() {
            0 => return Err(LdapError::UserNotFound(username.to_string())),
            1 => entries.remove(0),
            count => {
                return Err(LdapError::AmbiguousUser {
                    username: username.to_string(),
                    count,
                });
            }
        };

        session.simple_bind(&entry.dn, password).await?;
        debug!(dn = %entry.dn, "User bind succeeded");

        let login = entry
            .first(&self.config.login_attribute)
            .unwrap_or(username)
            .to_string();
        let email = entry
            .first(&self.config.mail_attribute)
            .unwrap_or_default()
            .to_string();

        Ok(BasicIdentity::new(login.clone())
            .with_username(login)
            .with_email(email))
    }
}

#[async_trait]
impl GenericProvider for LdapProvider {
    async fn authenticate(&self, payload: serde_json::Value) -> IdentityResult<Box<dyn Identity>> {
        let payload: LdapAuthPayload = serde_json::from_value(payload)
            .map_err(|e| IdentityError::InvalidPayload(e.to_string()))?;

        // An empty password would be an unauthenticated bind, which many
        // servers accept.
        if payload.username.is_empty() || payload.password.is_empty() {
            return Err(IdentityError::InvalidCredentials);
        }

        let mut session = self.connector.connect(&self.config).await?;
        let result = self
            .direct_bind(session.as_mut(), &payload.username, &payload.password)
            .await;

        if let Err(e) = session.unbind().await {
            debug!("LDAP unbind failed: {}", e);
        }

        Ok(Box::new(result?))
    }
}

pub struct LdapProviderFactory;

impl GenericProviderFactory for LdapProviderFactory {
    fn provider_type(&self) -> &'static str {
        PROVIDER_TYPE
    }

    fn create(&self, options: &DynamicOptions) -> IdentityResult<Arc<dyn GenericProvider>> {
        let config: LdapConfig = options.decode(PROVIDER_TYPE)?;
        Ok(Arc::new(LdapProvider::new(config)?))
    }
}
