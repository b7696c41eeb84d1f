//! Session value types.
//!
//! The protection pipeline never depends on the external session store's
//! internal representation. The store returns a [`SessionRecord`] (its own
//! wire shape); the boundary adapter converts it into the internal
//! [`Session`] value type, which is the only shape the timeout math and the
//! role check ever see.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Which session timeout was breached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpiryKind {
    /// Hard cap on session lifetime regardless of activity.
    Absolute,
    /// Sliding window measured from the last observed activity.
    Inactive,
}

/// A session as returned by the external store.
///
/// This mirrors whatever the store persists. Fields the pipeline does not
/// need (e.g. device metadata) are intentionally absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    /// The opaque session token.
    pub token: String,
    /// Owning user id.
    pub user_id: String,
    /// Role assigned to the user, if any.
    pub role: Option<String>,
    /// When the session was issued.
    pub issued_at: DateTime<Utc>,
    /// When the session hard-expires.
    pub expires_at: DateTime<Utc>,
    /// Last observed activity, if the store tracks it.
    pub last_activity: Option<DateTime<Utc>>,
    /// Whether the session was revoked server-side.
    pub revoked: bool,
}

/// The internal session value type used by the pipeline.
///
/// Owned by the session manager for the duration of one request; never
/// persisted by the pipeline itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// The user id this session belongs to, when known.
    pub subject: Option<String>,
    /// Flat role name for authorization, when assigned.
    pub role: Option<String>,
    /// When the session was issued.
    pub issued_at: DateTime<Utc>,
    /// When the session hard-expires.
    pub expires_at: DateTime<Utc>,
    /// Last observed activity.
    pub last_activity: Option<DateTime<Utc>>,
}

impl Session {
    /// Absolute age of the session at `now`.
    ///
    /// Clock skew can make `issued_at` lie in the future; the age saturates
    /// at zero rather than going negative.
    #[must_use]
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now.signed_duration_since(self.issued_at)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }

    /// Idle time at `now`, measured from `last_activity` or `issued_at`.
    #[must_use]
    pub fn idle(&self, now: DateTime<Utc>) -> Duration {
        let reference = self.last_activity.unwrap_or(self.issued_at);
        now.signed_duration_since(reference)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }

    /// Returns true if the absolute age exceeds `timeout`.
    #[must_use]
    pub fn absolute_expired(&self, now: DateTime<Utc>, timeout: Duration) -> bool {
        self.age(now) > timeout
    }

    /// Returns true if the idle time exceeds `timeout`.
    #[must_use]
    pub fn inactivity_expired(&self, now: DateTime<Utc>, timeout: Duration) -> bool {
        self.idle(now) > timeout
    }
}

impl From<SessionRecord> for Session {
    fn from(record: SessionRecord) -> Self {
        Self {
            subject: Some(record.user_id),
            role: record.role,
            issued_at: record.issued_at,
            expires_at: record.expires_at,
            last_activity: record.last_activity,
        }
    }
}
