//! Authentication service wiring.
//!
//! [`IamRuntime`] builds a [`ProviderRegistry`] with every built-in provider
//! type, activates the configured instances and connects the
//! [`Authenticator`] to an event bus. Each successful login publishes an
//! [`AuthenticationEvent`]; [`LastLoginListener`] records it through a
//! [`UserRepository`].

pub mod authenticator;
pub mod config;
pub mod events;
pub mod repository;
pub mod runtime;
pub mod telemetry;


pub use authenticator::{AuthOutcome, Authenticator, DeliveryMode};
pub use config::{AppConfig, EventBusSettings, LoggingConfig};
pub use events::AuthenticationEvent;
pub use repository::{InMemoryUserRepository, LastLoginListener, UserRepository};
pub use runtime::IamRuntime;
pub use telemetry::init_tracing;

use iam_identity_core::{IdentityResult, ProviderRegistry};

/// Register the `password`, `ldap`, `miniapp`, `oauth2` and `microsoft` provider types.
pub fn register_builtin_providers(registry: &ProviderRegistry) -> IdentityResult<()> {
    iam_identity_local::register(registry)?;
    iam_identity_ldap::register(registry)?;
    iam_identity_miniapp::register(registry)?;
    iam_identity_oauth2::register(registry)?;
    Ok(())
}
