//! Protection configuration and the nested-override merge.
//!
//! Per-route configuration is a partial [`ProtectionOverrides`] merged over
//! [`ProtectionConfig::defaults`]. The merge is per-field at every nesting
//! level: supplying `{ rate_limit: { max: 200 } }` overrides only `max` and
//! keeps the default `window`; it never replaces the whole `rate_limit`
//! block. This semantics is deliberate and load-bearing; it is unit-tested
//! directly.
//!
//! Overrides deserialize from the camelCase wire shape routes already use
//! (`windowMs`, `inactivityTimeout`, ...), so they can come from JSON or
//! TOML route configuration files.

use crate::cookie::SameSite;
use serde::Deserialize;
use std::time::Duration;

/// Execution environment of the serving process.
///
/// Production hardens defaults: the CSRF cookie gets `Secure` and responses
/// carry a restrictive `Content-Security-Policy`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Local or development execution.
    #[default]
    Development,
    /// Production-equivalent execution.
    Production,
}

impl Environment {
    /// Returns true for production-equivalent execution.
    #[must_use]
    pub const fn is_production(self) -> bool {
        matches!(self, Self::Production)
    }
}

/// Rate limiting configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Refill window for the token bucket.
    pub window: Duration,
    /// Bucket capacity: requests allowed per window.
    pub max: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        // 60 requests per minute
        Self {
            window: Duration::from_millis(60_000),
            max: 60,
        }
    }
}

/// CSRF protection configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsrfConfig {
    /// Whether the CSRF stage runs at all.
    pub enabled: bool,
    /// Whether the token cookie carries the `Secure` attribute.
    pub secure: bool,
    /// `SameSite` attribute of the token cookie.
    pub same_site: SameSite,
}

impl Default for CsrfConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            secure: false,
            same_site: SameSite::Lax,
        }
    }
}

/// Session enforcement configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Whether a valid session is required to pass the pipeline.
    pub required: bool,
    /// Sliding inactivity window.
    pub inactivity_timeout: Duration,
    /// Hard cap on session lifetime.
    pub absolute_timeout: Duration,
    /// Age past which the session token is rotated (when rotation is on).
    pub update_age: Duration,
    /// Whether to rotate the session token past `update_age`.
    pub rotate_refresh: bool,
    /// Cap concurrent sessions per user. Declared but not enforced; kept so
    /// configuration written against the original keeps deserializing.
    pub single_session: bool,
    /// Whether reissued session cookies carry the `Secure` attribute.
    pub cookie_secure: bool,
    /// `SameSite` attribute of reissued session cookies.
    pub cookie_same_site: SameSite,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            required: true,
            inactivity_timeout: Duration::from_secs(2 * 60 * 60),
            absolute_timeout: Duration::from_secs(24 * 60 * 60),
            update_age: Duration::from_secs(24 * 60 * 60),
            rotate_refresh: true,
            single_session: false,
            cookie_secure: false,
            cookie_same_site: SameSite::Lax,
        }
    }
}

/// Complete, merged protection configuration for one route or handler.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProtectionConfig {
    /// Rate limiting settings.
    pub rate_limit: RateLimitConfig,
    /// CSRF settings.
    pub csrf: CsrfConfig,
    /// Session settings.
    pub session: SessionConfig,
    /// Required roles; empty means no role restriction.
    pub roles: Vec<String>,
}

impl ProtectionConfig {
    /// Documented defaults for the given environment: 60 req/min, CSRF
    /// enabled with `Lax` (plus `Secure` in production), session required
    /// with 2 h inactivity / 24 h absolute timeout, no role restriction.
    /// Both the CSRF cookie and reissued session cookies get `Secure` in
    /// production.
    #[must_use]
    pub fn defaults(environment: Environment) -> Self {
        Self {
            csrf: CsrfConfig {
                secure: environment.is_production(),
                ..CsrfConfig::default()
            },
            session: SessionConfig {
                cookie_secure: environment.is_production(),
                ..SessionConfig::default()
            },
            ..Self::default()
        }
    }

    /// Merges caller overrides over this configuration.
    ///
    /// Pure function; nested per-field override, never whole-block
    /// replacement.
    #[must_use]
    pub fn merged(&self, overrides: &ProtectionOverrides) -> Self {
        let mut config = self.clone();

        if let Some(rate_limit) = &overrides.rate_limit {
            if let Some(window_ms) = rate_limit.window_ms {
                config.rate_limit.window = Duration::from_millis(window_ms);
            }
            if let Some(max) = rate_limit.max {
                config.rate_limit.max = max;
            }
        }

        if let Some(csrf) = &overrides.csrf {
            if let Some(enabled) = csrf.enabled {
                config.csrf.enabled = enabled;
            }
            if let Some(secure) = csrf.secure {
                config.csrf.secure = secure;
            }
            if let Some(same_site) = csrf.same_site {
                config.csrf.same_site = same_site;
            }
        }

        if let Some(session) = &overrides.session {
            if let Some(required) = session.required {
                config.session.required = required;
            }
            if let Some(secs) = session.inactivity_timeout {
                config.session.inactivity_timeout = Duration::from_secs(secs);
            }
            if let Some(secs) = session.absolute_timeout {
                config.session.absolute_timeout = Duration::from_secs(secs);
            }
            if let Some(secs) = session.update_age {
                config.session.update_age = Duration::from_secs(secs);
            }
            if let Some(rotate) = session.rotate_refresh {
                config.session.rotate_refresh = rotate;
            }
            if let Some(single) = session.single_session {
                config.session.single_session = single;
            }
            if let Some(secure) = session.cookie_secure {
                config.session.cookie_secure = secure;
            }
            if let Some(same_site) = session.cookie_same_site {
                config.session.cookie_same_site = same_site;
            }
        }

        if let Some(roles) = &overrides.roles {
            config.roles = roles.clone();
        }

        config
    }
}

/// Partial per-route overrides.
///
/// Timeout fields are seconds, the window is milliseconds, matching the
/// wire shape routes configure (`windowMs`, `inactivityTimeout`, ...).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ProtectionOverrides {
    /// Rate limit overrides.
    pub rate_limit: Option<RateLimitOverrides>,
    /// CSRF overrides.
    pub csrf: Option<CsrfOverrides>,
    /// Session overrides.
    pub session: Option<SessionOverrides>,
    /// Role restriction override (whole-list replacement; roles are a flat
    /// list, not a nested record).
    pub roles: Option<Vec<String>>,
}

/// Partial rate limit overrides.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RateLimitOverrides {
    /// Window in milliseconds.
    pub window_ms: Option<u64>,
    /// Requests allowed per window.
    pub max: Option<u32>,
}

/// Partial CSRF overrides.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CsrfOverrides {
    /// Whether the CSRF stage runs.
    pub enabled: Option<bool>,
    /// `Secure` cookie attribute.
    pub secure: Option<bool>,
    /// `SameSite` cookie attribute.
    pub same_site: Option<SameSite>,
}

/// Partial session overrides. All timeouts in seconds.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SessionOverrides {
    /// Whether a session is required.
    pub required: Option<bool>,
    /// Inactivity timeout in seconds.
    pub inactivity_timeout: Option<u64>,
    /// Absolute timeout in seconds.
    pub absolute_timeout: Option<u64>,
    /// Rotation age in seconds.
    pub update_age: Option<u64>,
    /// Whether to rotate session tokens.
    pub rotate_refresh: Option<bool>,
    /// Concurrent-session cap flag.
    pub single_session: Option<bool>,
    /// `Secure` attribute for reissued session cookies.
    pub cookie_secure: Option<bool>,
    /// `SameSite` attribute for reissued session cookies.
    pub cookie_same_site: Option<SameSite>,
}
