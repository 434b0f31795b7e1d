//! Authentication entry point.

use crate::events::AuthenticationEvent;
use iam_event_core::{EventBus, EventResult};
use iam_identity_core::{Identity, IdentityError, IdentityResult, MappingMethod, ProviderRegistry};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// How authentication events reach their listeners.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryMode {
    /// Listeners run before the login call returns.
    Sync,
    /// Listeners run on the bus worker pool.
    #[default]
    Async,
}

/// A successful authentication.
#[derive(Debug)]
pub struct AuthOutcome {
    pub identity: Box<dyn Identity>,
    pub provider: String,
    pub mapping_method: MappingMethod,
}

/// Resolves providers by name, runs them and announces the result.
#[derive(Clone)]
pub struct Authenticator {
    registry: Arc<ProviderRegistry>,
    bus: EventBus,
    delivery: DeliveryMode,
}

impl Authenticator {
    pub fn new(registry: Arc<ProviderRegistry>, bus: EventBus, delivery: DeliveryMode) -> Self {
        Self {
            registry,
            bus,
            delivery,
        }
    }

    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }

    pub fn delivery(&self) -> DeliveryMode {
        self.delivery
    }

    /// Authenticate with a generic provider.
    pub async fn authenticate(
        &self,
        provider: &str,
        payload: serde_json::Value,
    ) -> IdentityResult<AuthOutcome> {
        let (instance, descriptor) = self.registry.get_generic_provider_with_descriptor(provider)?;
        let identity = instance
            .authenticate(payload)
            .await
            .inspect_err(|e| log_failure(provider, e))?;
        Ok(self.complete(provider, descriptor.mapping_method, identity).await)
    }

    /// Redirect URL for an OAuth provider.
    pub fn authorization_url(&self, provider: &str, state: &str) -> IdentityResult<String> {
        self.registry
            .get_oauth_provider(provider)?
            .authorization_url(state)
    }

    /// Finish an OAuth authorization-code flow from the callback request.
    pub async fn identity_exchange_callback(
        &self,
        provider: &str,
        request: &http::request::Parts,
    ) -> IdentityResult<AuthOutcome> {
        let (instance, descriptor) = self.registry.get_oauth_provider_with_descriptor(provider)?;
        let identity = instance
            .identity_exchange_callback(request)
            .await
            .inspect_err(|e| log_failure(provider, e))?;
        Ok(self.complete(provider, descriptor.mapping_method, identity).await)
    }

    /// `mapping_method` belongs to the instance that authenticated, even if a
    /// reload has replaced it since.
    async fn complete(
        &self,
        provider: &str,
        mapping_method: MappingMethod,
        identity: Box<dyn Identity>,
    ) -> AuthOutcome {
        let event = AuthenticationEvent::new(identity.as_ref(), provider, mapping_method);
        if let Err(e) = self.publish(&event).await {
            warn!(provider, user_id = %event.user_id, "Failed to publish authentication event: {}", e);
        }

        info!(provider, user_id = %identity.user_id(), "User authenticated");
        AuthOutcome {
            identity,
            provider: provider.to_string(),
            mapping_method,
        }
    }

    async fn publish(&self, event: &AuthenticationEvent) -> EventResult<()> {
        match self.delivery {
            DeliveryMode::Sync => self.bus.publish_domain(event).await,
            DeliveryMode::Async => self.bus.async_publish_domain(event).await,
        }
    }
}

fn log_failure(provider: &str, error: &IdentityError) {
    if error.is_authentication_failure() {
        debug!(provider, "Authentication rejected: {}", error);
    } else {
        warn!(provider, "Authentication failed: {}", error);
    }
}
