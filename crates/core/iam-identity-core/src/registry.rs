//! Factory tables and the active provider table.

use crate::error::{IdentityError, IdentityResult};
use crate::options::{IdentityProviderConfig, MappingMethod};
use crate::provider::{
    GenericProvider, GenericProviderFactory, OAuthProvider, OAuthProviderFactory, ProviderKind,
};
use dashmap::DashMap;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, info, warn};

/// Public description of an active provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderDescriptor {
    pub name: String,
    pub provider_type: String,
    pub kind: ProviderKind,
    pub mapping_method: MappingMethod,
}

/// Outcome of a successful `setup_with_options` pass.
#[derive(Debug, Clone, Default)]
pub struct SetupReport {
    /// Providers now active, in configuration order.
    pub activated: Vec<String>,
    /// Providers whose construction failed, with the reason.
    pub skipped: Vec<(String, String)>,
}

struct ActiveEntry<P: ?Sized> {
    provider: Arc<P>,
    descriptor: ProviderDescriptor,
}

#[derive(Default)]
struct ActiveProviders {
    generic: HashMap<String, ActiveEntry<dyn GenericProvider>>,
    oauth: HashMap<String, ActiveEntry<dyn OAuthProvider>>,
    order: Vec<String>,
}

/// Maps provider types to factories and, after setup, provider names to
/// live instances.
///
/// Construct one per process at the composition root and share it by `Arc`.
/// Factory registration happens at load time; `setup_with_options` may be
/// re-run at any time to replace the active table.
#[derive(Default)]
pub struct ProviderRegistry {
    generic_factories: DashMap<String, Arc<dyn GenericProviderFactory>>,
    oauth_factories: DashMap<String, Arc<dyn OAuthProviderFactory>>,
    active: RwLock<Arc<ActiveProviders>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_generic_provider<F>(&self, factory: F) -> IdentityResult<()>
    where
        F: GenericProviderFactory + 'static,
    {
        let provider_type = factory.provider_type();
        self.ensure_type_free(provider_type)?;
        self.generic_factories
            .insert(provider_type.to_string(), Arc::new(factory));
        debug!("Registered generic provider factory: {}", provider_type);
        Ok(())
    }

    pub fn register_oauth_provider<F>(&self, factory: F) -> IdentityResult<()>
    where
        F: OAuthProviderFactory + 'static,
    {
        let provider_type = factory.provider_type();
        self.ensure_type_free(provider_type)?;
        self.oauth_factories
            .insert(provider_type.to_string(), Arc::new(factory));
        debug!("Registered OAuth provider factory: {}", provider_type);
        Ok(())
    }

    fn ensure_type_free(&self, provider_type: &str) -> IdentityResult<()> {
        if self.generic_factories.contains_key(provider_type)
            || self.oauth_factories.contains_key(provider_type)
        {
            return Err(IdentityError::DuplicateProviderType(
                provider_type.to_string(),
            ));
        }
        Ok(())
    }

    /// Registered provider types, sorted.
    pub fn provider_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self
            .generic_factories
            .iter()
            .map(|entry| entry.key().clone())
            .chain(self.oauth_factories.iter().map(|entry| entry.key().clone()))
            .collect();
        types.sort();
        types
    }

    /// Replace the active providers with the ones described by `configs`.
    ///
    /// A duplicate name or an unknown type aborts the whole pass and leaves
    /// the registry empty. A provider whose factory fails is logged and
    /// skipped; the rest of the batch still activates.
    pub fn setup_with_options(
        &self,
        configs: &[IdentityProviderConfig],
    ) -> IdentityResult<SetupReport> {
        match self.build_active(configs) {
            Ok((active, report)) => {
                self.swap_active(active);
                info!(
                    activated = report.activated.len(),
                    skipped = report.skipped.len(),
                    "Identity providers configured"
                );
                Ok(report)
            }
            Err(e) => {
                self.swap_active(ActiveProviders::default());
                Err(e)
            }
        }
    }

    fn build_active(
        &self,
        configs: &[IdentityProviderConfig],
    ) -> IdentityResult<(ActiveProviders, SetupReport)> {
        let mut active = ActiveProviders::default();
        let mut report = SetupReport::default();
        let mut seen = HashSet::new();

        for config in configs {
            if !seen.insert(config.name.as_str()) {
                return Err(IdentityError::DuplicateProviderName(config.name.clone()));
            }

            let generic = self
                .generic_factories
                .get(&config.provider_type)
                .map(|entry| Arc::clone(entry.value()));
            let oauth = self
                .oauth_factories
                .get(&config.provider_type)
                .map(|entry| Arc::clone(entry.value()));

            let result = match (generic, oauth) {
                (Some(factory), _) => factory.create(&config.provider).map(|provider| {
                    let descriptor = descriptor(config, ProviderKind::Generic);
                    active.generic.insert(
                        config.name.clone(),
                        ActiveEntry {
                            provider,
                            descriptor,
                        },
                    );
                }),
                (None, Some(factory)) => factory.create(&config.provider).map(|provider| {
                    let descriptor = descriptor(config, ProviderKind::OAuth);
                    active.oauth.insert(
                        config.name.clone(),
                        ActiveEntry {
                            provider,
                            descriptor,
                        },
                    );
                }),
                (None, None) => {
                    return Err(IdentityError::UnknownProviderType {
                        name: config.name.clone(),
                        provider_type: config.provider_type.clone(),
                    });
                }
            };

            match result {
                Ok(()) => {
                    debug!(
                        "Activated identity provider {} ({})",
                        config.name, config.provider_type
                    );
                    active.order.push(config.name.clone());
                    report.activated.push(config.name.clone());
                }
                Err(e) => {
                    warn!(
                        "Skipping identity provider {} ({}): {}",
                        config.name, config.provider_type, e
                    );
                    report.skipped.push((config.name.clone(), e.to_string()));
                }
            }
        }

        Ok((active, report))
    }

    fn swap_active(&self, active: ActiveProviders) {
        let mut guard = self.active.write().unwrap_or_else(PoisonError::into_inner);
        *guard = Arc::new(active);
    }

    fn snapshot(&self) -> Arc<ActiveProviders> {
        Arc::clone(&self.active.read().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn get_generic_provider(&self, name: &str) -> IdentityResult<Arc<dyn GenericProvider>> {
        self.snapshot()
            .generic
            .get(name)
            .map(|entry| Arc::clone(&entry.provider))
            .ok_or_else(|| IdentityError::ProviderNotFound(name.to_string()))
    }

    pub fn get_oauth_provider(&self, name: &str) -> IdentityResult<Arc<dyn OAuthProvider>> {
        self.snapshot()
            .oauth
            .get(name)
            .map(|entry| Arc::clone(&entry.provider))
            .ok_or_else(|| IdentityError::ProviderNotFound(name.to_string()))
    }

    /// Generic provider and its descriptor, read from one table snapshot.
    pub fn get_generic_provider_with_descriptor(
        &self,
        name: &str,
    ) -> IdentityResult<(Arc<dyn GenericProvider>, ProviderDescriptor)> {
        self.snapshot()
            .generic
            .get(name)
            .map(|entry| (Arc::clone(&entry.provider), entry.descriptor.clone()))
            .ok_or_else(|| IdentityError::ProviderNotFound(name.to_string()))
    }

    /// OAuth provider and its descriptor, read from one table snapshot.
    pub fn get_oauth_provider_with_descriptor(
        &self,
        name: &str,
    ) -> IdentityResult<(Arc<dyn OAuthProvider>, ProviderDescriptor)> {
        self.snapshot()
            .oauth
            .get(name)
            .map(|entry| (Arc::clone(&entry.provider), entry.descriptor.clone()))
            .ok_or_else(|| IdentityError::ProviderNotFound(name.to_string()))
    }

    /// Descriptor of an active provider of either family.
    pub fn descriptor(&self, name: &str) -> IdentityResult<ProviderDescriptor> {
        let active = self.snapshot();
        active
            .generic
            .get(name)
            .map(|entry| entry.descriptor.clone())
            .or_else(|| active.oauth.get(name).map(|entry| entry.descriptor.clone()))
            .ok_or_else(|| IdentityError::ProviderNotFound(name.to_string()))
    }

    pub fn mapping_method(&self, name: &str) -> IdentityResult<MappingMethod> {
        self.descriptor(name).map(|d| d.mapping_method)
    }

    /// All active providers in configuration order.
    pub fn descriptors(&self) -> Vec<ProviderDescriptor> {
        let active = self.snapshot();
        active
            .order
            .iter()
            .filter_map(|name| {
                active
                    .generic
                    .get(name)
                    .map(|entry| entry.descriptor.clone())
                    .or_else(|| active.oauth.get(name).map(|entry| entry.descriptor.clone()))
            })
            .collect()
    }

    pub fn active_count(&self) -> usize {
        let active = self.snapshot();
        active.generic.len() + active.oauth.len()
    }
}

fn descriptor(config: &IdentityProviderConfig, kind: ProviderKind) -> ProviderDescriptor {
    ProviderDescriptor {
        name: config.name.clone(),
        provider_type: config.provider_type.clone(),
        kind,
        mapping_method: config.mapping_method,
    }
}
