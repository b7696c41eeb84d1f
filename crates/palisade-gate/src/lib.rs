//! Edge-layer auth gate.
//!
//! A lighter first line of defense applied at a coarser boundary (network
//! edge, reverse proxy) than the per-handler pipeline: public paths pass
//! through untouched; everything else gets tiered token-bucket rate limiting
//! and a bare session-token presence check. No CSRF, no role checks; the
//! full pipeline runs those closer to the handler.
//!
//! # Example
//!
//! ```
//! use bytes::Bytes;
//! use palisade_gate::{Gate, GateConfig};
//!
//! let gate = Gate::new(GateConfig::default());
//!
//! let request = http::Request::builder()
//!     .uri("/api/auth/signin")
//!     .body(Bytes::new())
//!     .unwrap();
//! assert!(gate.check(&request, None).is_continue());
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use http::StatusCode;
use palisade_core::ClientIdentity;
use palisade_middleware::limiter::{RateLimiter, Tier, TierLimits};
use palisade_middleware::stage::Outcome;
use palisade_middleware::stages::session::extract_session_token;
use palisade_middleware::types::{Request, Response, ResponseExt};
use serde::Deserialize;
use std::net::SocketAddr;
use std::time::Duration;

/// Gate configuration.
///
/// The defaults are the edge profile: a one-second window with tight limits,
/// and the authentication endpoints open so sign-in itself is reachable.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct GateConfig {
    /// Path prefixes that bypass the gate entirely.
    pub public_paths: Vec<String>,
    /// Rate-limit window in milliseconds.
    pub window_ms: u64,
    /// Requests per window without a session token.
    pub unauthenticated_max: u32,
    /// Requests per window with a session token present.
    pub authenticated_max: u32,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            public_paths: vec![
                "/api/auth/signin".to_string(),
                "/api/auth/signup".to_string(),
                "/api/auth/reset-password".to_string(),
            ],
            window_ms: 1000,
            unauthenticated_max: 5,
            authenticated_max: 10,
        }
    }
}

/// The assembled edge gate.
#[derive(Debug)]
pub struct Gate {
    public_paths: Vec<String>,
    limiter: RateLimiter,
}

impl Gate {
    /// Creates a gate from configuration.
    #[must_use]
    pub fn new(config: GateConfig) -> Self {
        let limiter = RateLimiter::in_memory(
            Duration::from_millis(config.window_ms),
            TierLimits {
                unauthenticated: config.unauthenticated_max,
                authenticated: config.authenticated_max,
            },
        );
        Self {
            public_paths: config.public_paths,
            limiter,
        }
    }

    /// Returns true when `path` bypasses the gate.
    #[must_use]
    pub fn is_public(&self, path: &str) -> bool {
        self.public_paths.iter().any(|p| path.starts_with(p.as_str()))
    }

    /// Runs the gate against a request.
    ///
    /// `Continue` means the request may proceed to the router; `Respond`
    /// carries the 429 or 401 to send back instead.
    #[must_use]
    pub fn check(&self, request: &Request, peer: Option<SocketAddr>) -> Outcome {
        if self.is_public(request.uri().path()) {
            return Outcome::Continue;
        }

        let client = ClientIdentity::from_request(request.headers(), peer);
        let token = extract_session_token(request);
        let tier = if token.is_some() {
            Tier::Authenticated
        } else {
            Tier::Unauthenticated
        };

        let decision = self.limiter.check(&client, tier);
        if !decision.allowed {
            tracing::debug!(client = %client, "edge rate limit exceeded");
            return Outcome::Respond(Response::json_error(
                StatusCode::TOO_MANY_REQUESTS,
                "Too Many Requests",
            ));
        }

        // Presence only; validity is the pipeline's job.
        if token.is_none() {
            return Outcome::Respond(Response::json_error(
                StatusCode::UNAUTHORIZED,
                "Unauthorized",
            ));
        }

        Outcome::Continue
    }
}
