//! The stage abstraction.
//!
//! The pipeline is an explicit ordered list of stages. Each stage inspects
//! the request and either lets processing continue or short-circuits with a
//! response. Control flow is a value ([`Outcome`]), not a nested callback
//! chain, which keeps every stage testable in isolation.
//!
//! # Invariants
//!
//! - Stages never write responses directly; they *return* them.
//! - Stage-level rejections (429/401/403) are `Ok(Outcome::Respond(..))`.
//!   `Err` is reserved for unexpected failures (e.g. an unreachable session
//!   store), which the pipeline converts to a generic 500.
//!
//! # Example
//!
//! ```
//! use palisade_core::PalisadeResult;
//! use palisade_middleware::context::ProtectionContext;
//! use palisade_middleware::stage::{BoxFuture, Outcome, Stage};
//! use palisade_middleware::types::Request;
//!
//! struct AllowAll;
//!
//! impl Stage for AllowAll {
//!     fn name(&self) -> &'static str {
//!         "allow-all"
//!     }
//!
//!     fn handle<'a>(
//!         &'a self,
//!         _ctx: &'a mut ProtectionContext,
//!         _request: &'a Request,
//!     ) -> BoxFuture<'a, PalisadeResult<Outcome>> {
//!         Box::pin(async { Ok(Outcome::Continue) })
//!     }
//! }
//! ```

use crate::context::ProtectionContext;
use crate::types::{Request, Response};
use palisade_core::PalisadeResult;

pub use palisade_core::BoxFuture;

/// The result of one stage's look at a request.
#[derive(Debug)]
pub enum Outcome {
    /// The request survives this stage; run the next one.
    Continue,
    /// Short-circuit: this response goes back to the client and no further
    /// stage (nor the handler) runs.
    Respond(Response),
}

impl Outcome {
    /// Returns true if processing should continue.
    #[must_use]
    pub const fn is_continue(&self) -> bool {
        matches!(self, Self::Continue)
    }
}

/// One link in the protection chain.
///
/// Stages run strictly in the order the pipeline lists them, each completing
/// (or short-circuiting) before the next begins.
pub trait Stage: Send + Sync + 'static {
    /// Unique stage name, used for logging and debugging.
    fn name(&self) -> &'static str;

    /// Inspects the request and decides whether processing continues.
    fn handle<'a>(
        &'a self,
        ctx: &'a mut ProtectionContext,
        request: &'a Request,
    ) -> BoxFuture<'a, PalisadeResult<Outcome>>;
}
