//! Core identity provider traits and types.
//!
//! Every authentication result satisfies [`Identity`]. Providers come in two
//! capability families: [`GenericProvider`] for direct credential checks and
//! [`OAuthProvider`] for the redirect/callback half of an authorization-code
//! grant. Concrete provider crates register a factory per provider type with
//! a [`ProviderRegistry`], which then builds named instances from operator
//! configuration.

mod error;
mod identity;
mod options;
mod provider;
mod registry;

pub use error::{BoxError, IdentityError, IdentityResult};
pub use identity::{BasicIdentity, Identity};
pub use options::{
    DynamicOptions, IdentityProviderConfig, MappingMethod, is_sensitive_key, require_field,
};
pub use provider::{
    GenericProvider, GenericProviderFactory, OAuthProvider, OAuthProviderFactory, ProviderKind,
    authorization_code,
};
pub use registry::{ProviderDescriptor, ProviderRegistry, SetupReport};
