//! External collaborator interfaces.
//!
//! Persistence of users and sessions, credential hashing, and outbound mail
//! are outside the protection pipeline. The pipeline consumes them through
//! the narrow traits in this module; each call is asynchronous, cancellable,
//! and never retried implicitly. A failed lookup is surfaced as an opaque
//! [`StoreError`], not retried.
//!
//! All traits are object-safe so implementations can be injected as
//! `Arc<dyn SessionStore>` etc. In-memory implementations for tests live in
//! [`crate::fixtures`].

use crate::session::SessionRecord;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;

/// A boxed future, as returned by collaborator trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Result alias for collaborator calls.
pub type StoreResult<T> = Result<T, StoreError>;

/// Opaque failure from an external collaborator.
///
/// The pipeline never inspects these beyond logging; the `service` name is
/// kept so the error can be attributed without leaking internals to clients.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The collaborator could not be reached or failed internally.
    #[error("{service} unavailable: {message}")]
    Unavailable {
        /// Collaborator name (e.g. `"session-store"`).
        service: String,
        /// Failure description.
        message: String,
        /// Underlying error, when available.
        #[source]
        source: Option<anyhow::Error>,
    },

    /// The collaborator refused the operation (e.g. rotating an unknown token).
    #[error("{service} rejected the request: {message}")]
    Rejected {
        /// Collaborator name.
        service: String,
        /// Rejection description.
        message: String,
    },
}

impl StoreError {
    /// Creates an unavailability error.
    #[must_use]
    pub fn unavailable(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Unavailable {
            service: service.into(),
            message: message.into(),
            source: None,
        }
    }

    /// Creates an unavailability error with a source.
    pub fn unavailable_with_source(
        service: impl Into<String>,
        message: impl Into<String>,
        source: impl Into<anyhow::Error>,
    ) -> Self {
        Self::Unavailable {
            service: service.into(),
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Creates a rejection error.
    #[must_use]
    pub fn rejected(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Rejected {
            service: service.into(),
            message: message.into(),
        }
    }

    /// Returns the collaborator name.
    #[must_use]
    pub fn service(&self) -> &str {
        match self {
            Self::Unavailable { service, .. } | Self::Rejected { service, .. } => service,
        }
    }
}

/// A user as returned by the external user store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    /// Stable user id.
    pub id: String,
    /// Unique email address.
    pub email: String,
    /// Display name, if set.
    pub name: Option<String>,
    /// Flat role name for authorization.
    pub role: Option<String>,
    /// One-way password hash.
    pub password_hash: String,
}

/// An outbound email message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailMessage {
    /// Recipient address.
    pub to: String,
    /// Subject line.
    pub subject: String,
    /// Plain-text body.
    pub body: String,
}

/// Server-side session persistence.
///
/// The pipeline reads, touches, invalidates, and (when rotation is enabled)
/// rotates sessions; it never caches them across requests.
pub trait SessionStore: Send + Sync + 'static {
    /// Looks up a session by token. Revoked sessions are returned as-is;
    /// callers decide how to treat them.
    fn find_session<'a>(&'a self, token: &'a str)
        -> BoxFuture<'a, StoreResult<Option<SessionRecord>>>;

    /// Creates a fresh session for `user_id` with the given lifetime.
    fn create_session<'a>(
        &'a self,
        user_id: &'a str,
        ttl: Duration,
    ) -> BoxFuture<'a, StoreResult<SessionRecord>>;

    /// Invalidates a session (forced sign-out). Invalidating an unknown
    /// token is not an error.
    fn invalidate_session<'a>(&'a self, token: &'a str) -> BoxFuture<'a, StoreResult<()>>;

    /// Stamps the session's last-activity time. This is what produces the
    /// sliding inactivity window.
    fn touch_session<'a>(
        &'a self,
        token: &'a str,
        at: DateTime<Utc>,
    ) -> BoxFuture<'a, StoreResult<()>>;

    /// Atomically issues a replacement token and invalidates the old one.
    fn rotate_session<'a>(&'a self, token: &'a str)
        -> BoxFuture<'a, StoreResult<SessionRecord>>;
}

/// User lookup by email or id.
pub trait UserStore: Send + Sync + 'static {
    /// Finds a user by their unique email address.
    fn find_user_by_email<'a>(
        &'a self,
        email: &'a str,
    ) -> BoxFuture<'a, StoreResult<Option<UserRecord>>>;

    /// Finds a user by their stable id.
    fn find_user_by_id<'a>(&'a self, id: &'a str)
        -> BoxFuture<'a, StoreResult<Option<UserRecord>>>;
}

/// One-way credential hashing.
///
/// Synchronous on purpose: hashing is CPU-bound and implementations decide
/// whether to offload to a blocking pool.
pub trait CredentialHasher: Send + Sync + 'static {
    /// Hashes a plaintext password.
    fn hash_password(&self, password: &str) -> StoreResult<String>;

    /// Verifies a plaintext password against a stored hash.
    fn verify_password(&self, password: &str, hash: &str) -> StoreResult<bool>;
}

/// Outbound email delivery.
pub trait Mailer: Send + Sync + 'static {
    /// Sends a single message.
    fn send(&self, message: MailMessage) -> BoxFuture<'_, StoreResult<()>>;
}
