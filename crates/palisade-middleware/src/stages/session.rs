//! Session validation stage.
//!
//! Looks up the presented session token, applies both timeouts, stamps
//! activity, and optionally rotates aged tokens. Absolute and inactivity
//! timeouts are independent: a 25-hour-old session with activity a minute
//! ago is still absolutely expired, and is reported as such.
//!
//! Rejection bodies distinguish the two expiries (`"Session expired"` vs
//! `"Session expired due to inactivity"`) so clients can message the user
//! accurately; a missing or unknown token is a plain `"Unauthorized"`.
//! When the route does not require a session, nothing rejects: valid
//! sessions still attach to the context, anything else passes through as
//! anonymous.

use crate::config::SessionConfig;
use crate::context::ProtectionContext;
use crate::cookie::{Cookies, SetCookie};
use crate::stage::{BoxFuture, Outcome, Stage};
use crate::types::{Request, Response, ResponseExt};
use chrono::Utc;
use http::StatusCode;
use palisade_core::{PalisadeResult, Session, SessionStore};
use std::sync::Arc;

/// Cookie the session token travels in.
pub const SESSION_COOKIE: &str = "session_token";

/// Extracts the session token from the `session_token` cookie or, failing
/// that, an `Authorization: Bearer` header.
#[must_use]
pub fn extract_session_token(request: &Request) -> Option<String> {
    if let Some(token) = Cookies::from_headers(request.headers()).get(SESSION_COOKIE) {
        return Some(token.to_string());
    }

    request
        .headers()
        .get(http::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|token| token.trim().to_string())
}

/// The session manager's verdict for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionCheck {
    /// A valid session was found; `refreshed` is true when the token was
    /// rotated (the new token lives on the context).
    Ok {
        /// Whether the token was rotated during this check.
        refreshed: bool,
    },
    /// No token was presented, or the token is unknown or revoked.
    NoSession,
    /// The session breached the absolute lifetime cap.
    ExpiredAbsolute,
    /// The session breached the inactivity window.
    ExpiredInactive,
}

/// Stage enforcing session presence, timeouts, and rotation.
pub struct SessionStage {
    config: SessionConfig,
    store: Arc<dyn SessionStore>,
}

impl SessionStage {
    /// Creates the stage over a session store.
    pub fn new(config: SessionConfig, store: Arc<dyn SessionStore>) -> Self {
        Self { config, store }
    }

    /// Signs the session out server-side. Failure to invalidate is logged
    /// but never masks the expiry response.
    async fn invalidate(&self, ctx: &ProtectionContext, token: &str) {
        if let Err(err) = self.store.invalidate_session(token).await {
            tracing::warn!(
                request_id = %ctx.request_id(),
                error = %err,
                "failed to invalidate expired session"
            );
        }
    }

    /// Classifies the request's session, applying side effects as it goes:
    /// expired sessions are invalidated, aged tokens rotated, activity
    /// stamped, and the validated session attached to the context.
    ///
    /// # Errors
    ///
    /// Returns an error only for session-store failures; every normal
    /// outcome, including "no session", is a [`SessionCheck`] value.
    pub async fn check(
        &self,
        ctx: &mut ProtectionContext,
        request: &Request,
    ) -> PalisadeResult<SessionCheck> {
        let Some(token) = extract_session_token(request) else {
            return Ok(SessionCheck::NoSession);
        };

        let record = self.store.find_session(&token).await?;
        let record = match record {
            Some(record) if !record.revoked => record,
            _ => return Ok(SessionCheck::NoSession),
        };

        let session = Session::from(record);
        let now = Utc::now();

        if session.absolute_expired(now, self.config.absolute_timeout) {
            self.invalidate(ctx, &token).await;
            return Ok(SessionCheck::ExpiredAbsolute);
        }

        if session.inactivity_expired(now, self.config.inactivity_timeout) {
            self.invalidate(ctx, &token).await;
            return Ok(SessionCheck::ExpiredInactive);
        }

        // Rotate aged tokens. Rotation failure is non-fatal: the old token
        // stays valid until its own timeouts fire.
        let mut active_token = token.clone();
        let mut refreshed = false;
        if self.config.rotate_refresh && session.age(now) > self.config.update_age {
            match self.store.rotate_session(&token).await {
                Ok(rotated) => {
                    ctx.push_cookie(
                        SetCookie::new(SESSION_COOKIE, rotated.token.clone())
                            .http_only(true)
                            .path("/")
                            .secure(self.config.cookie_secure)
                            .same_site(self.config.cookie_same_site),
                    );
                    active_token = rotated.token;
                    refreshed = true;
                }
                Err(err) => {
                    tracing::warn!(
                        request_id = %ctx.request_id(),
                        error = %err,
                        "session rotation failed"
                    );
                }
            }
        }

        // Stamp activity to slide the inactivity window.
        if let Err(err) = self.store.touch_session(&active_token, now).await {
            tracing::warn!(
                request_id = %ctx.request_id(),
                error = %err,
                "failed to stamp session activity"
            );
        }

        ctx.set_session_token(active_token);
        ctx.set_session(session);
        Ok(SessionCheck::Ok { refreshed })
    }
}

impl Stage for SessionStage {
    fn name(&self) -> &'static str {
        "session"
    }

    fn handle<'a>(
        &'a self,
        ctx: &'a mut ProtectionContext,
        request: &'a Request,
    ) -> BoxFuture<'a, PalisadeResult<Outcome>> {
        Box::pin(async move {
            let check = self.check(ctx, request).await?;

            // Optional-session routes serve any non-valid session as
            // anonymous; rejections only apply when a session is required.
            if !self.config.required {
                return Ok(Outcome::Continue);
            }

            let outcome = match check {
                SessionCheck::Ok { .. } => Outcome::Continue,
                SessionCheck::NoSession => Outcome::Respond(Response::json_error(
                    StatusCode::UNAUTHORIZED,
                    "Unauthorized",
                )),
                SessionCheck::ExpiredAbsolute => Outcome::Respond(Response::json_error(
                    StatusCode::UNAUTHORIZED,
                    "Session expired",
                )),
                SessionCheck::ExpiredInactive => Outcome::Respond(Response::json_error(
                    StatusCode::UNAUTHORIZED,
                    "Session expired due to inactivity",
                )),
            };
            Ok(outcome)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use chrono::TimeDelta;
    use palisade_core::fixtures::InMemorySessionStore;
    use palisade_core::{ClientIdentity, SessionRecord};
    use std::time::Duration;

    fn request_with_cookie(token: &str) -> Request {
        http::Request::builder()
            .method("GET")
            .uri("/api/items")
            .header("cookie", format!("{SESSION_COOKIE}={token}"))
            .body(Bytes::new())
            .unwrap()
    }

    fn request_anonymous() -> Request {
        http::Request::builder()
            .method("GET")
            .uri("/api/items")
            .body(Bytes::new())
            .unwrap()
    }

    fn record(token: &str, issued_hours_ago: i64) -> SessionRecord {
        let now = Utc::now();
        SessionRecord {
            token: token.to_string(),
            user_id: "user-1".to_string(),
            role: Some("buyer".to_string()),
            issued_at: now - TimeDelta::hours(issued_hours_ago),
            expires_at: now + TimeDelta::hours(24),
            last_activity: None,
            revoked: false,
        }
    }

    fn stage_with(store: Arc<InMemorySessionStore>, config: SessionConfig) -> SessionStage {
        SessionStage::new(config, store)
    }

    fn ctx() -> ProtectionContext {
        ProtectionContext::new(ClientIdentity::new("10.0.0.1"))
    }

    #[tokio::test]
    async fn test_extract_prefers_cookie_over_bearer() {
        let request = http::Request::builder()
            .uri("/api/items")
            .header("cookie", format!("{SESSION_COOKIE}=from-cookie"))
            .header("authorization", "Bearer from-header")
            .body(Bytes::new())
            .unwrap();
        assert_eq!(extract_session_token(&request).as_deref(), Some("from-cookie"));
    }

    #[tokio::test]
    async fn test_extract_bearer_fallback() {
        let request = http::Request::builder()
            .uri("/api/items")
            .header("authorization", "Bearer tok-9")
            .body(Bytes::new())
            .unwrap();
        assert_eq!(extract_session_token(&request).as_deref(), Some("tok-9"));
    }

    #[tokio::test]
    async fn test_missing_session_required_unauthorized() {
        let store = Arc::new(InMemorySessionStore::new());
        let stage = stage_with(store, SessionConfig::default());

        let outcome = stage.handle(&mut ctx(), &request_anonymous()).await.unwrap();
        match outcome {
            Outcome::Respond(response) => {
                assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
            }
            Outcome::Continue => panic!("expected rejection"),
        }
    }

    #[tokio::test]
    async fn test_missing_session_optional_continues() {
        let store = Arc::new(InMemorySessionStore::new());
        let stage = stage_with(
            store,
            SessionConfig {
                required: false,
                ..SessionConfig::default()
            },
        );

        let mut ctx = ctx();
        let outcome = stage.handle(&mut ctx, &request_anonymous()).await.unwrap();
        assert!(outcome.is_continue());
        assert!(ctx.session().is_none());
    }

    #[tokio::test]
    async fn test_optional_session_expired_continues_anonymously() {
        let store = Arc::new(InMemorySessionStore::new());
        store.insert(record("tok-stale", 25));
        let stage = stage_with(
            store,
            SessionConfig {
                required: false,
                ..SessionConfig::default()
            },
        );

        // An expired cookie on an optional route is served anonymously, not
        // rejected.
        let mut ctx = ctx();
        let outcome = stage
            .handle(&mut ctx, &request_with_cookie("tok-stale"))
            .await
            .unwrap();
        assert!(outcome.is_continue());
        assert!(ctx.session().is_none());
    }

    #[tokio::test]
    async fn test_optional_session_valid_still_attached() {
        let store = Arc::new(InMemorySessionStore::new());
        store.insert(record("tok-1", 1));
        let stage = stage_with(
            store,
            SessionConfig {
                required: false,
                ..SessionConfig::default()
            },
        );

        let mut ctx = ctx();
        let outcome = stage.handle(&mut ctx, &request_with_cookie("tok-1")).await.unwrap();
        assert!(outcome.is_continue());
        assert_eq!(ctx.session().unwrap().subject.as_deref(), Some("user-1"));
    }

    #[tokio::test]
    async fn test_unknown_token_unauthorized() {
        let store = Arc::new(InMemorySessionStore::new());
        let stage = stage_with(store, SessionConfig::default());

        let outcome = stage
            .handle(&mut ctx(), &request_with_cookie("no-such-token"))
            .await
            .unwrap();
        assert!(!outcome.is_continue());
    }

    #[tokio::test]
    async fn test_revoked_token_unauthorized() {
        let store = Arc::new(InMemorySessionStore::new());
        let mut rec = record("tok-revoked", 1);
        rec.revoked = true;
        store.insert(rec);
        let stage = stage_with(store, SessionConfig::default());

        let outcome = stage
            .handle(&mut ctx(), &request_with_cookie("tok-revoked"))
            .await
            .unwrap();
        assert!(!outcome.is_continue());
    }

    #[tokio::test]
    async fn test_valid_session_attached_and_touched() {
        let store = Arc::new(InMemorySessionStore::new());
        store.insert(record("tok-1", 1));
        let stage = stage_with(store.clone(), SessionConfig::default());

        let mut ctx = ctx();
        let outcome = stage.handle(&mut ctx, &request_with_cookie("tok-1")).await.unwrap();
        assert!(outcome.is_continue());
        assert_eq!(ctx.session().unwrap().subject.as_deref(), Some("user-1"));
        assert_eq!(ctx.session_token(), Some("tok-1"));

        // Activity was stamped.
        let stored = store.find_session("tok-1").await.unwrap().unwrap();
        assert!(stored.last_activity.is_some());
    }

    #[tokio::test]
    async fn test_absolute_expiry_wins_over_recent_activity() {
        let store = Arc::new(InMemorySessionStore::new());
        let mut rec = record("tok-old", 25);
        rec.last_activity = Some(Utc::now());
        store.insert(rec);
        let stage = stage_with(store.clone(), SessionConfig::default());

        let outcome = stage
            .handle(&mut ctx(), &request_with_cookie("tok-old"))
            .await
            .unwrap();
        match outcome {
            Outcome::Respond(response) => {
                assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
                let body = response.into_body();
                let bytes = http_body_util::BodyExt::collect(body).await.unwrap().to_bytes();
                let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
                assert_eq!(json["error"], "Session expired");
            }
            Outcome::Continue => panic!("expected rejection"),
        }

        // The expired session was invalidated server-side.
        assert!(store.find_session("tok-old").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_inactivity_expiry_distinct_message() {
        let store = Arc::new(InMemorySessionStore::new());
        let mut rec = record("tok-idle", 5);
        rec.last_activity = Some(Utc::now() - TimeDelta::hours(3));
        store.insert(rec);
        let stage = stage_with(store, SessionConfig::default());

        let outcome = stage
            .handle(&mut ctx(), &request_with_cookie("tok-idle"))
            .await
            .unwrap();
        match outcome {
            Outcome::Respond(response) => {
                let bytes = http_body_util::BodyExt::collect(response.into_body())
                    .await
                    .unwrap()
                    .to_bytes();
                let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
                assert_eq!(json["error"], "Session expired due to inactivity");
            }
            Outcome::Continue => panic!("expected rejection"),
        }
    }

    #[tokio::test]
    async fn test_check_classifies_without_responding() {
        let store = Arc::new(InMemorySessionStore::new());
        store.insert(record("tok-1", 1));
        let mut old = record("tok-old", 25);
        old.last_activity = Some(Utc::now());
        store.insert(old);
        let stage = stage_with(store, SessionConfig::default());

        let mut ctx = ctx();
        assert_eq!(
            stage.check(&mut ctx, &request_anonymous()).await.unwrap(),
            SessionCheck::NoSession
        );
        assert_eq!(
            stage
                .check(&mut ctx, &request_with_cookie("tok-1"))
                .await
                .unwrap(),
            SessionCheck::Ok { refreshed: false }
        );
        // Absolute expiry classified even though activity is recent.
        assert_eq!(
            stage
                .check(&mut ctx, &request_with_cookie("tok-old"))
                .await
                .unwrap(),
            SessionCheck::ExpiredAbsolute
        );
    }

    #[tokio::test]
    async fn test_aged_session_rotated() {
        let store = Arc::new(InMemorySessionStore::new());
        store.insert(record("tok-aging", 2));
        let stage = stage_with(
            store.clone(),
            SessionConfig {
                // Rotate anything older than an hour; both timeouts stay
                // wide enough not to fire.
                update_age: Duration::from_secs(3600),
                inactivity_timeout: Duration::from_secs(24 * 3600),
                ..SessionConfig::default()
            },
        );

        let mut ctx = ctx();
        let outcome = stage
            .handle(&mut ctx, &request_with_cookie("tok-aging"))
            .await
            .unwrap();
        assert!(outcome.is_continue());

        // The old token is gone, a new one is active and queued as a cookie.
        assert!(store.find_session("tok-aging").await.unwrap().is_none());
        let new_token = ctx.session_token().unwrap().to_string();
        assert_ne!(new_token, "tok-aging");
        let cookies = ctx.take_cookies();
        assert!(cookies.iter().any(|c| c.name() == SESSION_COOKIE));
        assert!(store.find_session(&new_token).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_rotated_cookie_carries_hardening() {
        let store = Arc::new(InMemorySessionStore::new());
        store.insert(record("tok-aging", 2));
        let stage = stage_with(
            store,
            SessionConfig {
                update_age: Duration::from_secs(3600),
                inactivity_timeout: Duration::from_secs(24 * 3600),
                cookie_secure: true,
                ..SessionConfig::default()
            },
        );

        let mut ctx = ctx();
        let outcome = stage
            .handle(&mut ctx, &request_with_cookie("tok-aging"))
            .await
            .unwrap();
        assert!(outcome.is_continue());

        let cookies = ctx.take_cookies();
        let header = cookies
            .iter()
            .find(|c| c.name() == SESSION_COOKIE)
            .unwrap()
            .to_header_value();
        assert!(header.contains("; Secure"));
        assert!(header.contains("; HttpOnly"));
        assert!(header.contains("; SameSite=Lax"));
    }

    #[tokio::test]
    async fn test_store_failure_surfaces_as_error() {
        let store = Arc::new(InMemorySessionStore::new());
        store.fail_with("connection refused");
        let stage = stage_with(store, SessionConfig::default());

        let result = stage.handle(&mut ctx(), &request_with_cookie("tok-1")).await;
        assert!(result.is_err());
    }
}
