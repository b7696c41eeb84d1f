//! The composed protection pipeline.
//!
//! [`Pipeline`] runs the built-in stages in a fixed order (rate limiting,
//! CSRF, session validation, role check) and only then the business
//! handler. The order is not configurable: rate limiting must shed load
//! before any store lookup, and the role check is meaningless before the
//! session stage has attached a validated session.
//!
//! Successful responses get the security header set and any cookies the
//! stages queued (CSRF token issuance, session rotation). Stage rejections
//! keep the status and body the stage built, but queued cookies still
//! attach: by the time a later stage rejects, an earlier stage may have
//! already rotated the session token in the store, and dropping that
//! `Set-Cookie` would strand the client on an invalidated token.
//!
//! # Example
//!
//! ```
//! use bytes::Bytes;
//! use http::StatusCode;
//! use http_body_util::Full;
//! use palisade_core::fixtures::InMemorySessionStore;
//! use palisade_middleware::config::Environment;
//! use palisade_middleware::pipeline::Pipeline;
//! use std::sync::Arc;
//!
//! # tokio_test::block_on(async {
//! let pipeline = Pipeline::builder(Environment::Development)
//!     .session_store(Arc::new(InMemorySessionStore::new()))
//!     .build()
//!     .unwrap();
//!
//! let request = http::Request::builder()
//!     .method("GET")
//!     .uri("/api/items")
//!     .body(Bytes::new())
//!     .unwrap();
//!
//! // No session: the session stage rejects before the handler runs.
//! use palisade_middleware::context::ProtectionContext;
//! use palisade_middleware::types::Request;
//! let response = pipeline
//!     .process(request, None, |_ctx: &ProtectionContext, _req: &Request| {
//!         Box::pin(async {
//!             http::Response::builder()
//!                 .status(StatusCode::OK)
//!                 .body(Full::new(Bytes::new()))
//!                 .unwrap()
//!         })
//!     })
//!     .await;
//! assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
//! # });
//! ```

use crate::config::{Environment, ProtectionConfig, ProtectionOverrides};
use crate::context::ProtectionContext;
use crate::headers::apply_security_headers;
use crate::limiter::{BucketStore, RateLimiter, TierLimits};
use crate::stage::{BoxFuture, Outcome, Stage};
use crate::stages::{CsrfStage, RateLimitStage, RoleStage, SessionStage};
use crate::types::{Request, Response, ResponseExt};
use http::StatusCode;
use palisade_core::{ClientIdentity, SessionStore};
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;

/// Pipeline construction failure.
#[derive(Debug, Error)]
pub enum PipelineBuildError {
    /// Session enforcement or role checks were requested without a store to
    /// validate sessions against.
    #[error("session enforcement requires a session store")]
    MissingSessionStore,
}

/// The assembled protection pipeline for one route or handler group.
pub struct Pipeline {
    stages: Vec<Box<dyn Stage>>,
    config: ProtectionConfig,
    environment: Environment,
}

impl Pipeline {
    /// Starts building a pipeline for the given environment.
    #[must_use]
    pub fn builder(environment: Environment) -> PipelineBuilder {
        PipelineBuilder::new(environment)
    }

    /// The merged configuration this pipeline enforces.
    #[must_use]
    pub fn config(&self) -> &ProtectionConfig {
        &self.config
    }

    /// Stage names in execution order.
    #[must_use]
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|stage| stage.name()).collect()
    }

    /// Runs the request through every stage, then the handler.
    ///
    /// Never returns an error: stage failures are logged and collapse to a
    /// generic 500 so internals never leak to clients.
    pub async fn process<F>(
        &self,
        request: Request,
        peer: Option<SocketAddr>,
        handler: F,
    ) -> Response
    where
        F: for<'a> FnOnce(&'a ProtectionContext, &'a Request) -> BoxFuture<'a, Response>,
    {
        let client = ClientIdentity::from_request(request.headers(), peer);
        let mut ctx = ProtectionContext::new(client);

        for stage in &self.stages {
            match stage.handle(&mut ctx, &request).await {
                Ok(Outcome::Continue) => {}
                Ok(Outcome::Respond(mut response)) => {
                    tracing::debug!(
                        request_id = %ctx.request_id(),
                        stage = stage.name(),
                        status = response.status().as_u16(),
                        "request rejected"
                    );
                    attach_cookies(&mut ctx, &mut response);
                    return response;
                }
                Err(err) => {
                    tracing::error!(
                        request_id = %ctx.request_id(),
                        stage = stage.name(),
                        error = %err,
                        "protection stage failed"
                    );
                    let mut response = Response::json_error(
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "Internal Server Error",
                    );
                    attach_cookies(&mut ctx, &mut response);
                    return response;
                }
            }
        }

        let mut response = handler(&ctx, &request).await;

        attach_cookies(&mut ctx, &mut response);
        apply_security_headers(response.headers_mut(), self.environment);

        tracing::debug!(
            request_id = %ctx.request_id(),
            elapsed_ms = ctx.elapsed().as_millis() as u64,
            status = response.status().as_u16(),
            "request processed"
        );
        response
    }
}

/// Appends every cookie the stages queued as `Set-Cookie` headers.
fn attach_cookies(ctx: &mut ProtectionContext, response: &mut Response) {
    for cookie in ctx.take_cookies() {
        if let Ok(value) = http::HeaderValue::from_str(&cookie.to_header_value()) {
            response.headers_mut().append(http::header::SET_COOKIE, value);
        }
    }
}

/// Builder assembling a [`Pipeline`] from defaults plus overrides.
pub struct PipelineBuilder {
    environment: Environment,
    overrides: ProtectionOverrides,
    session_store: Option<Arc<dyn SessionStore>>,
    bucket_store: Option<Arc<dyn BucketStore>>,
}

impl PipelineBuilder {
    /// Creates a builder with no overrides.
    #[must_use]
    pub fn new(environment: Environment) -> Self {
        Self {
            environment,
            overrides: ProtectionOverrides::default(),
            session_store: None,
            bucket_store: None,
        }
    }

    /// Applies per-route overrides over the environment defaults.
    #[must_use]
    pub fn overrides(mut self, overrides: ProtectionOverrides) -> Self {
        self.overrides = overrides;
        self
    }

    /// Injects the session store. Required when sessions are enforced or
    /// roles are restricted.
    #[must_use]
    pub fn session_store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.session_store = Some(store);
        self
    }

    /// Injects a bucket store for the rate limiter. Defaults to a private
    /// in-memory store; share one to rate-limit across pipelines.
    #[must_use]
    pub fn bucket_store(mut self, store: Arc<dyn BucketStore>) -> Self {
        self.bucket_store = Some(store);
        self
    }

    /// Assembles the pipeline.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineBuildError::MissingSessionStore`] when the merged
    /// configuration enforces sessions (or restricts roles) but no session
    /// store was injected.
    pub fn build(self) -> Result<Pipeline, PipelineBuildError> {
        let config = ProtectionConfig::defaults(self.environment).merged(&self.overrides);

        let limiter = match self.bucket_store {
            Some(store) => RateLimiter::new(
                config.rate_limit.window,
                TierLimits::uniform(config.rate_limit.max),
                store,
            ),
            None => RateLimiter::in_memory(
                config.rate_limit.window,
                TierLimits::uniform(config.rate_limit.max),
            ),
        };

        let mut stages: Vec<Box<dyn Stage>> = vec![Box::new(RateLimitStage::new(limiter))];

        if config.csrf.enabled {
            stages.push(Box::new(CsrfStage::new(config.csrf.clone())));
        }

        let needs_sessions = config.session.required || !config.roles.is_empty();
        match &self.session_store {
            Some(store) => {
                stages.push(Box::new(SessionStage::new(
                    config.session.clone(),
                    store.clone(),
                )));
            }
            None if needs_sessions => return Err(PipelineBuildError::MissingSessionStore),
            None => {}
        }

        if !config.roles.is_empty() {
            stages.push(Box::new(RoleStage::new(config.roles.clone())));
        }

        Ok(Pipeline {
            stages,
            config,
            environment: self.environment,
        })
    }
}
