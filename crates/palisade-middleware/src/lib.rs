//! Composable API protection middleware.
//!
//! This crate implements the request protection pipeline: token-bucket rate
//! limiting, CSRF double-submit validation, session timeout enforcement with
//! token rotation, and flat role-based access control, composed in a fixed
//! order by [`pipeline::Pipeline`].
//!
//! Stages are explicit values implementing [`stage::Stage`] and returning an
//! [`stage::Outcome`]; nothing here writes to a socket. Host servers call
//! [`pipeline::Pipeline::process`] with the buffered request and a handler
//! closure and send whatever response comes back.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod context;
pub mod cookie;
pub mod headers;
pub mod limiter;
pub mod pipeline;
pub mod stage;
pub mod stages;
pub mod types;

pub use config::{Environment, ProtectionConfig, ProtectionOverrides};
pub use context::ProtectionContext;
pub use limiter::{BucketStore, InMemoryBucketStore, RateDecision, RateLimiter, Tier, TierLimits};
pub use pipeline::{Pipeline, PipelineBuilder, PipelineBuildError};
pub use stage::{Outcome, Stage};
pub use types::{Request, Response, ResponseExt};
