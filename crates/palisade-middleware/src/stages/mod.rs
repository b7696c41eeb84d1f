//! The built-in protection stages.
//!
//! The pipeline composes these in a fixed order: rate limiting first (so
//! abusive clients are shed before any store lookup), then CSRF, then
//! session validation, then role checks. Each stage is independently
//! constructible and testable.

pub mod authorization;
pub mod csrf;
pub mod rate_limit;
pub mod session;

pub use authorization::RoleStage;
pub use csrf::CsrfStage;
pub use rate_limit::{RateLimitInfo, RateLimitStage};
pub use session::{SessionCheck, SessionStage};
