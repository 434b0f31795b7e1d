//! Process-wide wiring of registry, event bus and listeners.

use crate::authenticator::Authenticator;
use crate::config::AppConfig;
use crate::events::AuthenticationEvent;
use crate::register_builtin_providers;
use crate::repository::{InMemoryUserRepository, LastLoginListener, UserRepository};
use anyhow::{Context, Result};
use iam_event_core::{DomainEvent, EventBus, EventResult};
use iam_identity_core::{IdentityProviderConfig, IdentityResult, ProviderRegistry, SetupReport};
use std::sync::Arc;
use tracing::{info, warn};

pub struct IamRuntime {
    registry: Arc<ProviderRegistry>,
    bus: EventBus,
    authenticator: Authenticator,
    repository: Arc<dyn UserRepository>,
}

impl IamRuntime {
    /// Bootstrap with an in-memory user repository.
    pub fn bootstrap(config: &AppConfig) -> Result<Self> {
        Self::bootstrap_with_repository(config, Arc::new(InMemoryUserRepository::new()))
    }

    pub fn bootstrap_with_repository(
        config: &AppConfig,
        repository: Arc<dyn UserRepository>,
    ) -> Result<Self> {
        config.validate()?;

        let registry = Arc::new(ProviderRegistry::new());
        register_builtin_providers(&registry).context("Failed to register built-in providers")?;

        let report = registry
            .setup_with_options(&config.identity_providers)
            .context("Failed to configure identity providers")?;
        log_report(&report);

        let bus = EventBus::new(config.event_bus.bus_config());
        bus.add_event_listener(
            AuthenticationEvent::NAME,
            Arc::new(LastLoginListener::new(Arc::clone(&repository))),
        )
        .context("Failed to register last-login listener")?;

        let authenticator =
            Authenticator::new(Arc::clone(&registry), bus.clone(), config.event_bus.delivery);

        info!(
            providers = registry.active_count(),
            delivery = ?config.event_bus.delivery,
            "IAM runtime ready"
        );

        Ok(Self {
            registry,
            bus,
            authenticator,
            repository,
        })
    }

    pub fn authenticator(&self) -> &Authenticator {
        &self.authenticator
    }

    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn repository(&self) -> &Arc<dyn UserRepository> {
        &self.repository
    }

    /// Replace the active providers.
    pub fn reload(&self, configs: &[IdentityProviderConfig]) -> IdentityResult<SetupReport> {
        let report = self.registry.setup_with_options(configs)?;
        log_report(&report);
        Ok(report)
    }

    /// Stop accepting async events and wait for queued ones to be handled.
    pub async fn shutdown(&self) -> EventResult<()> {
        info!("Shutting down IAM runtime");
        self.bus.close_wait().await
    }
}

fn log_report(report: &SetupReport) {
    for (name, reason) in &report.skipped {
        warn!(provider = %name, "Identity provider not activated: {}", reason);
    }
}
