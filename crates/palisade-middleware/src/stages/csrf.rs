//! CSRF double-submit guard.
//!
//! The client holds a random token in the `csrf_token` cookie and must echo
//! it on every state-changing request, either in the `x-csrf-token` header
//! or as a `csrfToken` field in a JSON body. The two copies are compared in
//! constant time.
//!
//! Safe methods (GET, HEAD, OPTIONS) bypass validation; a safe request that
//! arrives without the cookie gets a fresh token issued so later unsafe
//! requests can echo it.

use crate::config::CsrfConfig;
use crate::context::ProtectionContext;
use crate::cookie::{Cookies, SetCookie};
use crate::stage::{BoxFuture, Outcome, Stage};
use crate::types::{Request, Response, ResponseExt};
use http::{Method, StatusCode};
use palisade_core::PalisadeResult;
use rand::RngCore;
use subtle::ConstantTimeEq;

/// Cookie holding the server-issued token.
pub const CSRF_COOKIE: &str = "csrf_token";

/// Header the client echoes the token in.
pub const CSRF_HEADER: &str = "x-csrf-token";

/// JSON body field the client may echo the token in instead.
pub const CSRF_BODY_FIELD: &str = "csrfToken";

/// Generates a new CSRF token: 32 random bytes, hex-encoded.
#[must_use]
pub fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Constant-time token equality.
///
/// The length check leaks length, which is fine: token length is public.
fn tokens_match(a: &str, b: &str) -> bool {
    a.len() == b.len() && a.as_bytes().ct_eq(b.as_bytes()).into()
}

/// Extracts the echoed token from the header or, failing that, from a JSON
/// body field. A non-JSON or malformed body simply yields no token.
fn provided_token(request: &Request) -> Option<String> {
    if let Some(header) = request
        .headers()
        .get(CSRF_HEADER)
        .and_then(|value| value.to_str().ok())
    {
        return Some(header.to_string());
    }

    serde_json::from_slice::<serde_json::Value>(request.body())
        .ok()?
        .get(CSRF_BODY_FIELD)?
        .as_str()
        .map(ToString::to_string)
}

/// Stage enforcing the double-submit check.
#[derive(Debug, Clone)]
pub struct CsrfStage {
    config: CsrfConfig,
}

impl CsrfStage {
    /// Creates the stage with the given cookie settings.
    #[must_use]
    pub fn new(config: CsrfConfig) -> Self {
        Self { config }
    }

    /// Builds the `Set-Cookie` for a freshly issued token.
    fn token_cookie(&self, token: &str) -> SetCookie {
        SetCookie::new(CSRF_COOKIE, token)
            .http_only(true)
            .path("/")
            .secure(self.config.secure)
            .same_site(self.config.same_site)
    }

    /// Validates an unsafe request against the cookie.
    fn validate(request: &Request) -> bool {
        let cookies = Cookies::from_headers(request.headers());
        let Some(cookie_token) = cookies.get(CSRF_COOKIE) else {
            return false;
        };
        let Some(provided) = provided_token(request) else {
            return false;
        };
        tokens_match(cookie_token, &provided)
    }
}

impl Stage for CsrfStage {
    fn name(&self) -> &'static str {
        "csrf"
    }

    fn handle<'a>(
        &'a self,
        ctx: &'a mut ProtectionContext,
        request: &'a Request,
    ) -> BoxFuture<'a, PalisadeResult<Outcome>> {
        Box::pin(async move {
            let safe = matches!(
                *request.method(),
                Method::GET | Method::HEAD | Method::OPTIONS
            );

            if safe {
                if !Cookies::from_headers(request.headers()).contains(CSRF_COOKIE) {
                    ctx.push_cookie(self.token_cookie(&generate_token()));
                }
                return Ok(Outcome::Continue);
            }

            if Self::validate(request) {
                Ok(Outcome::Continue)
            } else {
                tracing::debug!(client = %ctx.client(), "csrf validation failed");
                Ok(Outcome::Respond(Response::json_error(
                    StatusCode::FORBIDDEN,
                    "Invalid CSRF token",
                )))
            }
        })
    }
}
