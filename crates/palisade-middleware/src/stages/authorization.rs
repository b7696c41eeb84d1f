//! Role-based access stage.
//!
//! Roles are a flat list of names, compared by exact string match. An empty
//! required list means the route has no role restriction. Runs after the
//! session stage so the role comes from a validated session; without one,
//! any role requirement fails closed.

use crate::context::ProtectionContext;
use crate::stage::{BoxFuture, Outcome, Stage};
use crate::types::{Request, Response, ResponseExt};
use http::StatusCode;
use palisade_core::PalisadeResult;

/// Stage enforcing a flat role requirement.
#[derive(Debug, Clone, Default)]
pub struct RoleStage {
    required: Vec<String>,
}

impl RoleStage {
    /// Creates the stage requiring any one of `required` roles.
    #[must_use]
    pub fn new(required: Vec<String>) -> Self {
        Self { required }
    }

    fn permitted(&self, ctx: &ProtectionContext) -> bool {
        if self.required.is_empty() {
            return true;
        }
        ctx.session()
            .and_then(|session| session.role.as_deref())
            .is_some_and(|role| self.required.iter().any(|r| r == role))
    }
}

impl Stage for RoleStage {
    fn name(&self) -> &'static str {
        "authorization"
    }

    fn handle<'a>(
        &'a self,
        ctx: &'a mut ProtectionContext,
        _request: &'a Request,
    ) -> BoxFuture<'a, PalisadeResult<Outcome>> {
        Box::pin(async move {
            if self.permitted(ctx) {
                Ok(Outcome::Continue)
            } else {
                tracing::debug!(
                    request_id = %ctx.request_id(),
                    required = ?self.required,
                    "role check failed"
                );
                Ok(Outcome::Respond(Response::json_error(
                    StatusCode::FORBIDDEN,
                    "Forbidden",
                )))
            }
        })
    }
}
