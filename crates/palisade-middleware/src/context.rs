//! Per-request protection context.
//!
//! The [`ProtectionContext`] carries state through the stage list. Stages
//! enrich it (the session stage attaches the validated [`Session`], the rate
//! limit stage records its decision as an extension) and the business
//! handler receives it after all stages pass.

use crate::cookie::SetCookie;
use palisade_core::{ClientIdentity, Session};
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::time::Instant;
use uuid::Uuid;

/// Context that flows through the protection pipeline.
///
/// # Example
///
/// ```
/// use palisade_core::ClientIdentity;
/// use palisade_middleware::context::ProtectionContext;
///
/// let ctx = ProtectionContext::new(ClientIdentity::new("203.0.113.7"));
/// assert_eq!(ctx.client().as_str(), "203.0.113.7");
/// assert!(ctx.session().is_none());
/// ```
pub struct ProtectionContext {
    /// Unique identifier for this request.
    request_id: Uuid,

    /// Best-effort client attribution (rate-limit key).
    client: ClientIdentity,

    /// The validated session, once the session stage has run.
    session: Option<Session>,

    /// The session token the request presented, possibly replaced by
    /// rotation.
    session_token: Option<String>,

    /// Cookies to attach to the final response (token issuance, rotation).
    pending_cookies: Vec<SetCookie>,

    /// When the request started processing.
    started_at: Instant,

    /// Type-erased extension data set by stages.
    extensions: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl ProtectionContext {
    /// Creates a context for a request from `client`.
    #[must_use]
    pub fn new(client: ClientIdentity) -> Self {
        Self {
            request_id: Uuid::now_v7(),
            client,
            session: None,
            session_token: None,
            pending_cookies: Vec::new(),
            started_at: Instant::now(),
            extensions: HashMap::new(),
        }
    }

    /// Returns the request ID.
    #[must_use]
    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    /// Returns the client identity.
    #[must_use]
    pub fn client(&self) -> &ClientIdentity {
        &self.client
    }

    /// Returns the validated session, if the session stage attached one.
    #[must_use]
    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// Attaches the validated session.
    ///
    /// This should only be called by the session stage.
    pub fn set_session(&mut self, session: Session) {
        self.session = Some(session);
    }

    /// Returns the active session token.
    #[must_use]
    pub fn session_token(&self) -> Option<&str> {
        self.session_token.as_deref()
    }

    /// Sets the active session token (original or rotated).
    pub fn set_session_token(&mut self, token: String) {
        self.session_token = Some(token);
    }

    /// Queues a cookie for the final response.
    pub fn push_cookie(&mut self, cookie: SetCookie) {
        self.pending_cookies.push(cookie);
    }

    /// Drains the queued cookies.
    pub fn take_cookies(&mut self) -> Vec<SetCookie> {
        std::mem::take(&mut self.pending_cookies)
    }

    /// Returns the elapsed time since the request started.
    #[must_use]
    pub fn elapsed(&self) -> std::time::Duration {
        self.started_at.elapsed()
    }

    /// Stores a typed extension value.
    pub fn set_extension<T: Send + Sync + 'static>(&mut self, value: T) {
        self.extensions.insert(TypeId::of::<T>(), Box::new(value));
    }

    /// Retrieves a typed extension value.
    #[must_use]
    pub fn get_extension<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.extensions
            .get(&TypeId::of::<T>())
            .and_then(|v| v.downcast_ref())
    }

    /// Checks if an extension of the given type exists.
    #[must_use]
    pub fn has_extension<T: Send + Sync + 'static>(&self) -> bool {
        self.extensions.contains_key(&TypeId::of::<T>())
    }
}

impl std::fmt::Debug for ProtectionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Extension values are type-erased; report only their count.
        f.debug_struct("ProtectionContext")
            .field("request_id", &self.request_id)
            .field("client", &self.client)
            .field("session", &self.session)
            .field("pending_cookies", &self.pending_cookies.len())
            .field("extensions", &self.extensions.len())
            .finish_non_exhaustive()
    }
}
