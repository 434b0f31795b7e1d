//! Mini-program identity provider (`miniapp` type).
//!
//! The client obtains a short-lived login code and, optionally, an encrypted
//! profile blob. The provider exchanges the code for the user's `openid`,
//! `unionid` and session key, then decrypts the blob with that key.

mod crypto;
mod error;
mod provider;

pub use crypto::{DecryptedUserData, Watermark, decrypt_user_data};
pub use error::{MiniAppError, MiniAppResult};
pub use provider::{
    DEFAULT_SESSION_ENDPOINT, MiniAppAuthPayload, MiniAppConfig, MiniAppProvider,
    MiniAppProviderFactory, SessionResponse,
};

use iam_identity_core::{IdentityResult, ProviderRegistry};

pub const PROVIDER_TYPE: &str = "miniapp";

/// Register the `miniapp` provider type.
pub fn register(registry: &ProviderRegistry) -> IdentityResult<()> {
    registry.register_generic_provider(MiniAppProviderFactory)
}
