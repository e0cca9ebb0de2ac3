//! Protocol constants shared across the crate.

/// Manifest path used when the application does not provide one.
pub(crate) const DEFAULT_MANIFEST_PATH: &str = "/manifest.json";

/// Redirect path used when the application does not provide one.
pub(crate) const DEFAULT_REDIRECT_PATH: &str = "/redirect";

/// Web flow of the identity provider that consumes auth request tokens.
pub(crate) const DEFAULT_PROVIDER_AUTH_URI: &str =
    "https://auth.authkit.dev/authenticate";

/// How long an auth request stays valid once issued.
pub(crate) const AUTH_REQUEST_TTL_SECS: u64 = 3600;

/// Version stamped into outgoing auth request tokens.
pub(crate) const AUTH_REQUEST_VERSION: u32 = 1;

/// Response token version this crate understands.
pub(crate) const AUTH_RESPONSE_VERSION: u32 = 1;
