//! # Palisade
//!
//! **API protection toolkit for marketplace-style web services**
//!
//! Palisade wraps business handlers in a fixed-order protection pipeline:
//!
//! - **Rate limiting** – continuous token buckets per client identity, with
//!   a higher ceiling for authenticated clients
//! - **CSRF** – double-submit cookie validated in constant time
//! - **Sessions** – inactivity and absolute timeouts, activity stamping,
//!   optional token rotation
//! - **RBAC** – flat role checks layered on a validated session
//!
//! plus a lighter [`gate`] variant for the network edge and the standard
//! security response headers on everything that passes.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use palisade::prelude::*;
//! use std::sync::Arc;
//!
//! let pipeline = Pipeline::builder(Environment::Production)
//!     .session_store(Arc::new(my_session_store))
//!     .build()?;
//!
//! let response = pipeline
//!     .process(request, peer_addr, |ctx, req| Box::pin(handle(ctx, req)))
//!     .await;
//! ```
//!
//! ## Architecture
//!
//! The pipeline order is fixed and cannot be reordered:
//!
//! ```text
//! Request → RateLimit → CSRF → Session → Roles → Handler
//!                                                   ↓
//! Response ← SecurityHeaders ← Cookies ←───────────┘
//! ```

#![doc(html_root_url = "https://docs.rs/palisade/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

// Re-export core types
pub use palisade_core as core;

// Re-export the protection pipeline
pub use palisade_middleware as middleware;

// Re-export the edge gate
pub use palisade_gate as gate;

// Re-export telemetry setup
pub use palisade_telemetry as telemetry;

/// Prelude module for convenient imports.
///
/// # Example
///
/// ```rust,ignore
/// use palisade::prelude::*;
/// ```
pub mod prelude {
    pub use palisade_core::{
        ClientIdentity, PalisadeError, PalisadeResult, Session, SessionRecord, SessionStore,
    };

    pub use palisade_middleware::{
        Environment, Outcome, Pipeline, PipelineBuilder, ProtectionConfig, ProtectionContext,
        ProtectionOverrides, RateLimiter, Request, Response, ResponseExt, Stage,
    };

    pub use palisade_gate::{Gate, GateConfig};

    pub use palisade_telemetry::{init_logging, LogConfig};
}
