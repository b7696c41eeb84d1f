//! In-memory collaborator implementations for development and testing.
//!
//! These back the pipeline's unit and integration tests so no external
//! store is needed. They are honest implementations (real timestamps, real
//! token rotation), not stubs, which keeps the timeout math testable.
//!
//! # Example
//!
//! ```
//! use palisade_core::fixtures::InMemorySessionStore;
//! use palisade_core::store::SessionStore;
//! use std::time::Duration;
//!
//! # tokio_test::block_on(async {
//! let store = InMemorySessionStore::new();
//! let record = store
//!     .create_session("user-1", Duration::from_secs(86_400))
//!     .await
//!     .unwrap();
//! assert!(store.find_session(&record.token).await.unwrap().is_some());
//! # });
//! ```

use crate::session::SessionRecord;
use crate::store::{
    BoxFuture, CredentialHasher, MailMessage, Mailer, SessionStore, StoreError, StoreResult,
    UserRecord, UserStore,
};
use chrono::{DateTime, TimeDelta, Utc};
use dashmap::DashMap;
use std::sync::Mutex;
use std::time::Duration;
use uuid::Uuid;

/// In-memory [`SessionStore`] backed by a concurrent map.
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    sessions: DashMap<String, SessionRecord>,
    /// When set, every call fails with this message. Lets tests exercise the
    /// pipeline's collaborator-failure path.
    fail_with: Mutex<Option<String>>,
}

impl InMemorySessionStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent call fail with `message`.
    pub fn fail_with(&self, message: impl Into<String>) {
        *self.fail_with.lock().unwrap() = Some(message.into());
    }

    /// Inserts a pre-built record directly (for expiry tests that need
    /// sessions issued in the past).
    pub fn insert(&self, record: SessionRecord) {
        self.sessions.insert(record.token.clone(), record);
    }

    /// Number of live sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Returns true if no sessions are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    fn check_failure(&self) -> StoreResult<()> {
        match self.fail_with.lock().unwrap().as_ref() {
            Some(message) => Err(StoreError::unavailable("session-store", message.clone())),
            None => Ok(()),
        }
    }

    fn fresh_record(user_id: &str, ttl: Duration) -> SessionRecord {
        let now = Utc::now();
        let ttl = TimeDelta::from_std(ttl).unwrap_or_else(|_| TimeDelta::days(1));
        SessionRecord {
            token: Uuid::now_v7().simple().to_string(),
            user_id: user_id.to_string(),
            role: None,
            issued_at: now,
            expires_at: now + ttl,
            last_activity: None,
            revoked: false,
        }
    }
}

impl SessionStore for InMemorySessionStore {
    fn find_session<'a>(
        &'a self,
        token: &'a str,
    ) -> BoxFuture<'a, StoreResult<Option<SessionRecord>>> {
        Box::pin(async move {
            self.check_failure()?;
            Ok(self.sessions.get(token).map(|r| r.clone()))
        })
    }

    fn create_session<'a>(
        &'a self,
        user_id: &'a str,
        ttl: Duration,
    ) -> BoxFuture<'a, StoreResult<SessionRecord>> {
        Box::pin(async move {
            self.check_failure()?;
            let record = Self::fresh_record(user_id, ttl);
            self.sessions.insert(record.token.clone(), record.clone());
            Ok(record)
        })
    }

    fn invalidate_session<'a>(&'a self, token: &'a str) -> BoxFuture<'a, StoreResult<()>> {
        Box::pin(async move {
            self.check_failure()?;
            self.sessions.remove(token);
            Ok(())
        })
    }

    fn touch_session<'a>(
        &'a self,
        token: &'a str,
        at: DateTime<Utc>,
    ) -> BoxFuture<'a, StoreResult<()>> {
        Box::pin(async move {
            self.check_failure()?;
            if let Some(mut record) = self.sessions.get_mut(token) {
                record.last_activity = Some(at);
            }
            Ok(())
        })
    }

    fn rotate_session<'a>(
        &'a self,
        token: &'a str,
    ) -> BoxFuture<'a, StoreResult<SessionRecord>> {
        Box::pin(async move {
            self.check_failure()?;
            // remove-then-insert keeps rotation atomic per token: the old
            // entry is gone before the replacement becomes visible.
            let (_, old) = self
                .sessions
                .remove(token)
                .ok_or_else(|| StoreError::rejected("session-store", "unknown session token"))?;

            let mut rotated = old;
            rotated.token = Uuid::now_v7().simple().to_string();
            self.sessions.insert(rotated.token.clone(), rotated.clone());
            Ok(rotated)
        })
    }
}

/// In-memory [`UserStore`].
#[derive(Debug, Default)]
pub struct InMemoryUserStore {
    users: DashMap<String, UserRecord>,
}

impl InMemoryUserStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a user record.
    pub fn insert(&self, user: UserRecord) {
        self.users.insert(user.id.clone(), user);
    }
}

impl UserStore for InMemoryUserStore {
    fn find_user_by_email<'a>(
        &'a self,
        email: &'a str,
    ) -> BoxFuture<'a, StoreResult<Option<UserRecord>>> {
        Box::pin(async move {
            Ok(self
                .users
                .iter()
                .find(|entry| entry.email == email)
                .map(|entry| entry.clone()))
        })
    }

    fn find_user_by_id<'a>(
        &'a self,
        id: &'a str,
    ) -> BoxFuture<'a, StoreResult<Option<UserRecord>>> {
        Box::pin(async move { Ok(self.users.get(id).map(|r| r.clone())) })
    }
}

/// Reversible "hasher" for tests. Never use outside tests.
#[derive(Debug, Default)]
pub struct PlainCredentialHasher;

impl CredentialHasher for PlainCredentialHasher {
    fn hash_password(&self, password: &str) -> StoreResult<String> {
        Ok(format!("plain:{password}"))
    }

    fn verify_password(&self, password: &str, hash: &str) -> StoreResult<bool> {
        Ok(hash == format!("plain:{password}"))
    }
}

/// [`Mailer`] that records messages instead of sending them.
#[derive(Debug, Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<MailMessage>>,
}

impl RecordingMailer {
    /// Creates an empty mailer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all messages recorded so far.
    #[must_use]
    pub fn sent(&self) -> Vec<MailMessage> {
        self.sent.lock().unwrap().clone()
    }
}

impl Mailer for RecordingMailer {
    fn send(&self, message: MailMessage) -> BoxFuture<'_, StoreResult<()>> {
        Box::pin(async move {
            self.sent.lock().unwrap().push(message);
            Ok(())
        })
    }
}

/// Builds a session record issued `hours_ago` with a 7-day hard expiry,
/// convenient for expiry-classification tests.
#[must_use]
pub fn session_issued_hours_ago(user_id: &str, hours_ago: i64) -> SessionRecord {
    let now = Utc::now();
    SessionRecord {
        token: Uuid::now_v7().simple().to_string(),
        user_id: user_id.to_string(),
        role: None,
        issued_at: now - TimeDelta::hours(hours_ago),
        expires_at: now + TimeDelta::days(7),
        last_activity: None,
        revoked: false,
    }
}
