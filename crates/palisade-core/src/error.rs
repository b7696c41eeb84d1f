//! Error types for Palisade.
//!
//! This module provides the [`PalisadeError`] type, the standard error type
//! used throughout the protection pipeline, and [`ErrorCategory`] for
//! classification and HTTP status mapping.
//!
//! Every rejection the pipeline can produce maps onto one category:
//!
//! | Category | Status | Client recovery |
//! |---|---|---|
//! | `RateLimited` | 429 | Retry after `retry_after_seconds` |
//! | `Csrf` | 403 | Re-fetch a CSRF token |
//! | `SessionExpired` | 401 | Re-authenticate |
//! | `Authentication` | 401 | Supply credentials |
//! | `Authorization` | 403 | None without a role change |
//! | `External` | 502 | None; collaborator failure |
//! | `Internal` | 500 | None; logged server-side |

use http::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::session::ExpiryKind;

/// Result type alias using [`PalisadeError`].
pub type PalisadeResult<T> = Result<T, PalisadeError>;

/// Categories of errors for classification and handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Request volume exceeded the token bucket.
    RateLimited,
    /// CSRF double-submit validation failed.
    Csrf,
    /// Session exceeded an inactivity or absolute timeout.
    SessionExpired,
    /// Missing or invalid credentials.
    Authentication,
    /// Valid session, insufficient role.
    Authorization,
    /// External collaborator (store, mailer) failure.
    External,
    /// Unexpected internal failure.
    Internal,
}

impl ErrorCategory {
    /// Returns the default HTTP status code for this error category.
    #[must_use]
    pub const fn default_status_code(&self) -> StatusCode {
        match self {
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::Csrf | Self::Authorization => StatusCode::FORBIDDEN,
            Self::SessionExpired | Self::Authentication => StatusCode::UNAUTHORIZED,
            Self::External => StatusCode::BAD_GATEWAY,
            Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Standard error type for Palisade.
///
/// `PalisadeError` provides structured errors with categorization, HTTP
/// status mapping, and error chaining. Stages normally report rejections by
/// writing a response rather than returning an error; this type covers the
/// remaining cases where a failure has to cross a stage boundary (collaborator
/// failures, unexpected internal errors) plus the taxonomy the pipeline logs.
///
/// # Example
///
/// ```
/// use palisade_core::{PalisadeError, ErrorCategory};
///
/// let err = PalisadeError::rate_limited("too many requests", Some(30));
/// assert_eq!(err.category(), ErrorCategory::RateLimited);
/// assert_eq!(err.status_code().as_u16(), 429);
/// ```
#[derive(Error, Debug)]
pub enum PalisadeError {
    /// Rate limit exceeded.
    #[error("Rate limited: {message}")]
    RateLimited {
        /// Human-readable error message.
        message: String,
        /// Seconds until the client may retry.
        retry_after_seconds: Option<u64>,
    },

    /// CSRF validation failed.
    #[error("CSRF validation failed: {message}")]
    CsrfInvalid {
        /// Human-readable error message.
        message: String,
    },

    /// Session expired (absolute or inactivity timeout).
    #[error("Session expired: {message}")]
    SessionExpired {
        /// Human-readable error message.
        message: String,
        /// Which timeout was breached.
        kind: ExpiryKind,
    },

    /// Authentication failed (no/invalid credentials).
    #[error("Authentication error: {message}")]
    Authentication {
        /// Human-readable error message.
        message: String,
    },

    /// Authorization denied (role check failed).
    #[error("Authorization denied: {message}")]
    Authorization {
        /// Human-readable error message.
        message: String,
    },

    /// External collaborator error.
    #[error("External service error: {message}")]
    External {
        /// Human-readable error message.
        message: String,
        /// The name of the external service, if known.
        service: Option<String>,
    },

    /// Internal server error.
    #[error("Internal error: {message}")]
    Internal {
        /// Human-readable error message.
        message: String,
        /// The underlying error (never exposed to clients).
        #[source]
        source: Option<anyhow::Error>,
    },
}

impl PalisadeError {
    /// Creates a rate limited error.
    #[must_use]
    pub fn rate_limited(message: impl Into<String>, retry_after_seconds: Option<u64>) -> Self {
        Self::RateLimited {
            message: message.into(),
            retry_after_seconds,
        }
    }

    /// Creates a CSRF validation error.
    #[must_use]
    pub fn csrf_invalid(message: impl Into<String>) -> Self {
        Self::CsrfInvalid {
            message: message.into(),
        }
    }

    /// Creates a session expired error.
    #[must_use]
    pub fn session_expired(message: impl Into<String>, kind: ExpiryKind) -> Self {
        Self::SessionExpired {
            message: message.into(),
            kind,
        }
    }

    /// Creates an authentication error.
    #[must_use]
    pub fn authentication(message: impl Into<String>) -> Self {
        Self::Authentication {
            message: message.into(),
        }
    }

    /// Creates an authorization error.
    #[must_use]
    pub fn authorization(message: impl Into<String>) -> Self {
        Self::Authorization {
            message: message.into(),
        }
    }

    /// Creates an external service error.
    #[must_use]
    pub fn external(message: impl Into<String>, service: Option<impl Into<String>>) -> Self {
        Self::External {
            message: message.into(),
            service: service.map(Into::into),
        }
    }

    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
            source: None,
        }
    }

    /// Creates an internal error with a source error.
    pub fn internal_with_source(
        message: impl Into<String>,
        source: impl Into<anyhow::Error>,
    ) -> Self {
        Self::Internal {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Returns the error category.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::RateLimited { .. } => ErrorCategory::RateLimited,
            Self::CsrfInvalid { .. } => ErrorCategory::Csrf,
            Self::SessionExpired { .. } => ErrorCategory::SessionExpired,
            Self::Authentication { .. } => ErrorCategory::Authentication,
            Self::Authorization { .. } => ErrorCategory::Authorization,
            Self::External { .. } => ErrorCategory::External,
            Self::Internal { .. } => ErrorCategory::Internal,
        }
    }

    /// Returns the HTTP status code for this error.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        self.category().default_status_code()
    }
}

impl From<crate::store::StoreError> for PalisadeError {
    fn from(err: crate::store::StoreError) -> Self {
        Self::External {
            message: err.to_string(),
            service: Some(err.service().to_string()),
        }
    }
}
