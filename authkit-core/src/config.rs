//! Validated, immutable per-session configuration.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use url::Url;

use crate::{
    defaults::{DEFAULT_MANIFEST_PATH, DEFAULT_REDIRECT_PATH},
    error::AuthKitError,
};

/// A permission the application requests from the identity provider at sign-in.
///
/// Scopes arrive from callers as snake_case strings (`store_write`) and are
/// embedded verbatim in the auth request token.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    EnumString,
    Display,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    /// Write access to the user's storage root.
    StoreWrite,
    /// Permission to publish data discoverable by other users.
    PublishData,
    /// Access to the user's email address.
    Email,
}

/// Immutable application configuration, created once per session.
///
/// Construction fails fast: an invalid `app_domain`, an empty or unrecognized
/// scope set, or a path that does not resolve against the domain are all
/// rejected here rather than at first use.
#[derive(Debug, Clone)]
pub struct AppConfig {
    app_domain: Url,
    manifest_uri: Url,
    redirect_uri: Url,
    scopes: Vec<Scope>,
}

impl AppConfig {
    /// Builds a validated configuration.
    ///
    /// `manifest_path` and `redirect_path` default to `/manifest.json` and
    /// `/redirect` and are resolved against `app_domain`.
    ///
    /// # Errors
    ///
    /// Returns [`AuthKitError::InvalidConfig`] if `app_domain` is not an
    /// absolute http(s) URI with a host, if `scopes` is empty, or if either
    /// path cannot be resolved against the domain.
    pub fn new(
        app_domain: &str,
        manifest_path: Option<String>,
        redirect_path: Option<String>,
        scopes: Vec<Scope>,
    ) -> Result<Self, AuthKitError> {
        let app_domain = Url::parse(app_domain).map_err(|err| {
            AuthKitError::InvalidConfig(format!(
                "appDomain is not a valid absolute URI: {err}"
            ))
        })?;
        if !matches!(app_domain.scheme(), "http" | "https") {
            return Err(AuthKitError::InvalidConfig(format!(
                "appDomain must use http or https, got `{}`",
                app_domain.scheme()
            )));
        }
        if app_domain.host_str().is_none() {
            return Err(AuthKitError::InvalidConfig(
                "appDomain must include a host".to_string(),
            ));
        }
        if scopes.is_empty() {
            return Err(AuthKitError::InvalidConfig(
                "at least one scope is required".to_string(),
            ));
        }

        let manifest_uri = resolve_path(
            &app_domain,
            manifest_path.as_deref().unwrap_or(DEFAULT_MANIFEST_PATH),
        )?;
        let redirect_uri = resolve_path(
            &app_domain,
            redirect_path.as_deref().unwrap_or(DEFAULT_REDIRECT_PATH),
        )?;

        Ok(Self {
            app_domain,
            manifest_uri,
            redirect_uri,
            scopes,
        })
    }

    /// Parses raw scope strings as supplied by a caller.
    ///
    /// # Errors
    ///
    /// Returns [`AuthKitError::InvalidConfig`] naming the first unrecognized
    /// scope value.
    pub fn parse_scopes(raw: &[String]) -> Result<Vec<Scope>, AuthKitError> {
        raw.iter()
            .map(|value| {
                value.parse::<Scope>().map_err(|_| {
                    AuthKitError::InvalidConfig(format!(
                        "unrecognized scope `{value}`"
                    ))
                })
            })
            .collect()
    }

    /// Origin URI identifying the requesting application.
    #[must_use]
    pub const fn app_domain(&self) -> &Url {
        &self.app_domain
    }

    /// Absolute URI of the application manifest.
    #[must_use]
    pub const fn manifest_uri(&self) -> &Url {
        &self.manifest_uri
    }

    /// Absolute URI the identity provider redirects back to.
    #[must_use]
    pub const fn redirect_uri(&self) -> &Url {
        &self.redirect_uri
    }

    /// Requested permission scopes, in caller order.
    #[must_use]
    pub fn scopes(&self) -> &[Scope] {
        &self.scopes
    }
}

fn resolve_path(domain: &Url, path: &str) -> Result<Url, AuthKitError> {
    if !path.starts_with('/') {
        return Err(AuthKitError::InvalidConfig(format!(
            "path `{path}` must be absolute (start with `/`)"
        )));
    }
    domain.join(path).map_err(|err| {
        AuthKitError::InvalidConfig(format!(
            "path `{path}` does not resolve against the app domain: {err}"
        ))
    })
}
