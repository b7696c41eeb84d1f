//! Rate limiting stage.
//!
//! Runs first in the pipeline so abusive clients are shed before any
//! session-store lookup. Tier selection is by *presence* of a session
//! credential, not validity: validation happens later and is much more
//! expensive than a bucket check.

use crate::context::ProtectionContext;
use crate::limiter::{RateLimiter, Tier};
use crate::stage::{BoxFuture, Outcome, Stage};
use crate::types::{Request, Response, ResponseExt};
use http::StatusCode;
use palisade_core::PalisadeResult;

/// Rate-limit verdict recorded on the context for downstream consumers
/// (e.g. handlers that emit `X-RateLimit-*` headers).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitInfo {
    /// Capacity the check ran against.
    pub limit: u32,
    /// Whole tokens left after the check.
    pub remaining: u32,
}

/// Stage wrapping a [`RateLimiter`].
#[derive(Debug, Clone)]
pub struct RateLimitStage {
    limiter: RateLimiter,
}

impl RateLimitStage {
    /// Creates the stage over a configured limiter.
    #[must_use]
    pub fn new(limiter: RateLimiter) -> Self {
        Self { limiter }
    }

    fn deny_response(retry_after_secs: u64) -> Response {
        let mut response = Response::json(
            StatusCode::TOO_MANY_REQUESTS,
            &serde_json::json!({
                "error": "Too many requests",
                "retryAfter": retry_after_secs,
            }),
        );
        if let Ok(value) = http::HeaderValue::from_str(&retry_after_secs.to_string()) {
            response.headers_mut().insert(http::header::RETRY_AFTER, value);
        }
        response
    }
}

impl Stage for RateLimitStage {
    fn name(&self) -> &'static str {
        "rate-limit"
    }

    fn handle<'a>(
        &'a self,
        ctx: &'a mut ProtectionContext,
        request: &'a Request,
    ) -> BoxFuture<'a, PalisadeResult<Outcome>> {
        Box::pin(async move {
            let tier = if super::session::extract_session_token(request).is_some() {
                Tier::Authenticated
            } else {
                Tier::Unauthenticated
            };

            let decision = self.limiter.check(ctx.client(), tier);

            if decision.allowed {
                ctx.set_extension(RateLimitInfo {
                    limit: decision.limit,
                    remaining: decision.remaining,
                });
                return Ok(Outcome::Continue);
            }

            let retry_after = decision.retry_after_secs().unwrap_or(1);
            tracing::debug!(
                client = %ctx.client(),
                limit = decision.limit,
                retry_after_secs = retry_after,
                "rate limit exceeded"
            );
            Ok(Outcome::Respond(Self::deny_response(retry_after)))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::limiter::TierLimits;
    use bytes::Bytes;
    use palisade_core::ClientIdentity;
    use std::time::Duration;

    fn request_anonymous() -> Request {
        http::Request::builder()
            .method("GET")
            .uri("/api/items")
            .body(Bytes::new())
            .unwrap()
    }

    fn request_with_bearer() -> Request {
        http::Request::builder()
            .method("GET")
            .uri("/api/items")
            .header("authorization", "Bearer tok-123")
            .body(Bytes::new())
            .unwrap()
    }

    fn stage(unauthenticated: u32, authenticated: u32) -> RateLimitStage {
        RateLimitStage::new(RateLimiter::in_memory(
            Duration::from_secs(60),
            TierLimits {
                unauthenticated,
                authenticated,
            },
        ))
    }

    #[tokio::test]
    async fn test_allows_within_limit_and_records_info() {
        let stage = stage(5, 10);
        let mut ctx = ProtectionContext::new(ClientIdentity::new("10.0.0.1"));
        let outcome = stage.handle(&mut ctx, &request_anonymous()).await.unwrap();

        assert!(outcome.is_continue());
        let info = ctx.get_extension::<RateLimitInfo>().unwrap();
        assert_eq!(info.limit, 5);
        assert_eq!(info.remaining, 4);
    }

    #[tokio::test]
    async fn test_denies_over_limit_with_retry_after() {
        let stage = stage(2, 10);
        let request = request_anonymous();

        let mut ctx = ProtectionContext::new(ClientIdentity::new("10.0.0.2"));
        for _ in 0..2 {
            let outcome = stage.handle(&mut ctx, &request).await.unwrap();
            assert!(outcome.is_continue());
        }

        let outcome = stage.handle(&mut ctx, &request).await.unwrap();
        match outcome {
            Outcome::Respond(response) => {
                assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
                assert!(response.headers().contains_key(http::header::RETRY_AFTER));
            }
            Outcome::Continue => panic!("expected denial"),
        }
    }

    #[tokio::test]
    async fn test_credential_presence_selects_authenticated_tier() {
        let stage = stage(5, 10);
        let mut ctx = ProtectionContext::new(ClientIdentity::new("10.0.0.3"));
        let outcome = stage.handle(&mut ctx, &request_with_bearer()).await.unwrap();

        assert!(outcome.is_continue());
        assert_eq!(ctx.get_extension::<RateLimitInfo>().unwrap().limit, 10);
    }
}
