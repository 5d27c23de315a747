//! Google credential selection and access token minting.
//!
//! The strategy is a pure function of the environment ([`CredentialStrategy`]). Resolving it
//! produces a [`Credential`], shared by every REST client, which mints OAuth2 access tokens
//! and caches them until shortly before they expire.

mod credential;
mod strategy;

pub use credential::{AuthEndpoints, Credential, CredentialSource, ImpersonationSource};
pub use strategy::{
    CredentialStrategy, GOOGLE_APPLICATION_CREDENTIALS_ENV_NAME,
    GOOGLE_OAUTH_ACCESS_TOKEN_ENV_NAME,
};

/// OAuth2 scope requested for every token.
pub const CLOUD_PLATFORM_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";

/// Lifetime requested for impersonated access tokens.
pub const IMPERSONATED_TOKEN_LIFETIME_SECS: u64 = 300;
