//! LDAP identity provider (`ldap` type).

mod config;
mod directory;
mod error;
mod provider;

pub use config::LdapConfig;
pub use directory::{DirectoryConnector, DirectoryEntry, DirectorySession, Ldap3Connector};
pub use error::{LdapError, LdapResult};
pub use provider::{LdapAuthPayload, LdapProvider, LdapProviderFactory};

use iam_identity_core::{IdentityResult, ProviderRegistry};

pub const PROVIDER_TYPE: &str = "ldap";

/// Register the `ldap` provider type.
pub fn register(registry: &ProviderRegistry) -> IdentityResult<()> {
    registry.register_generic_provider(LdapProviderFactory)
}
