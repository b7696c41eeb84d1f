//! Token-bucket rate limiting.
//!
//! Per-client buckets refill continuously (linear in elapsed time times
//! rate) rather than step-wise. Each check refills, then either consumes one
//! token or denies with a retry hint.
//!
//! Two quirks are deliberate and preserved:
//!
//! - `last_refill` advances on **every** check, denied ones included. A
//!   sustained flood at exactly the bucket's rate therefore never fully
//!   recovers capacity. This trades precision for statelessness-per-call.
//! - Buckets are garbage-collected probabilistically: each check has a 1%
//!   chance of sweeping buckets idle for more than twice the window.
//!
//! Buckets live behind the injectable [`BucketStore`] trait so tests isolate
//! state per run and deployments can swap in an external cache. The store
//! must serialize read-modify-write cycles per key; the in-memory
//! implementation gets this from `DashMap`'s entry locking.

use dashmap::DashMap;
use palisade_core::ClientIdentity;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Probability that any single check triggers a bucket sweep.
const GC_PROBABILITY: f64 = 0.01;

/// Idle multiple of the window after which a bucket is collectable.
const GC_IDLE_WINDOWS: u32 = 2;

/// Per-client bucket state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TokenBucket {
    /// Remaining capacity. Invariant: `0 <= tokens <= max`.
    pub tokens: f64,
    /// When the bucket last refilled (updated on every check).
    pub last_refill: Instant,
    /// Capacity the bucket last operated at. Tracked so a tier switch
    /// preserves consumption rather than resetting the bucket.
    pub max: f64,
}

impl TokenBucket {
    /// Creates a full bucket.
    #[must_use]
    pub fn full(max: f64, now: Instant) -> Self {
        Self {
            tokens: max,
            last_refill: now,
            max,
        }
    }
}

/// Storage for per-client token buckets.
///
/// `update` must be atomic per key: two concurrent checks for the same
/// identity may not interleave between the read and the write, or they
/// could double-spend a token.
pub trait BucketStore: Send + Sync + fmt::Debug + 'static {
    /// Atomically applies `apply` to the bucket for `key`, inserting
    /// `default` first if the key is new.
    fn update(&self, key: &str, default: TokenBucket, apply: &mut dyn FnMut(&mut TokenBucket));

    /// Reads a bucket snapshot, if one exists.
    fn get(&self, key: &str) -> Option<TokenBucket>;

    /// Deletes a bucket.
    fn delete(&self, key: &str);

    /// Removes buckets whose `last_refill` is older than `idle_for`.
    fn sweep_idle(&self, idle_for: Duration, now: Instant);

    /// Number of live buckets.
    fn len(&self) -> usize;
}

/// In-memory [`BucketStore`] backed by a concurrent map.
#[derive(Debug, Default)]
pub struct InMemoryBucketStore {
    buckets: DashMap<String, TokenBucket>,
}

impl InMemoryBucketStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl BucketStore for InMemoryBucketStore {
    fn update(&self, key: &str, default: TokenBucket, apply: &mut dyn FnMut(&mut TokenBucket)) {
        // The entry guard holds the shard lock for the duration of `apply`,
        // which is what makes the read-modify-write atomic per key.
        let mut entry = self.buckets.entry(key.to_string()).or_insert(default);
        apply(entry.value_mut());
    }

    fn get(&self, key: &str) -> Option<TokenBucket> {
        self.buckets.get(key).map(|b| *b)
    }

    fn delete(&self, key: &str) {
        self.buckets.remove(key);
    }

    fn sweep_idle(&self, idle_for: Duration, now: Instant) {
        self.buckets
            .retain(|_, bucket| now.duration_since(bucket.last_refill) <= idle_for);
    }

    fn len(&self) -> usize {
        self.buckets.len()
    }
}

/// Rate-limit tier, selected by whether a session credential is present at
/// check time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    /// No session credential on the request.
    Unauthenticated,
    /// A session credential is present (not necessarily validated yet).
    Authenticated,
}

/// Per-tier bucket capacities.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierLimits {
    /// Capacity for unauthenticated clients.
    pub unauthenticated: u32,
    /// Capacity for authenticated clients (usually higher).
    pub authenticated: u32,
}

impl TierLimits {
    /// The same capacity for both tiers.
    #[must_use]
    pub const fn uniform(max: u32) -> Self {
        Self {
            unauthenticated: max,
            authenticated: max,
        }
    }

    /// Capacity for the given tier.
    #[must_use]
    pub const fn for_tier(&self, tier: Tier) -> u32 {
        match tier {
            Tier::Unauthenticated => self.unauthenticated,
            Tier::Authenticated => self.authenticated,
        }
    }
}

/// The verdict of one rate-limit check.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateDecision {
    /// Whether the request may proceed.
    pub allowed: bool,
    /// Capacity the check was evaluated against.
    pub limit: u32,
    /// Whole tokens left after this check.
    pub remaining: u32,
    /// How long until one token is available, when denied.
    pub retry_after: Option<Duration>,
}

impl RateDecision {
    /// Retry hint in whole seconds, rounded up and at least 1.
    ///
    /// This is what goes into the `Retry-After` header and the response
    /// body; sub-second waits still tell the client to wait a second.
    #[must_use]
    pub fn retry_after_secs(&self) -> Option<u64> {
        self.retry_after
            .map(|d| (d.as_secs_f64().ceil() as u64).max(1))
    }
}

/// Continuous token-bucket rate limiter with tiered capacity.
///
/// # Example
///
/// ```
/// use palisade_core::ClientIdentity;
/// use palisade_middleware::limiter::{RateLimiter, Tier, TierLimits};
/// use std::time::Duration;
///
/// let limiter = RateLimiter::in_memory(Duration::from_secs(60), TierLimits::uniform(60));
/// let client = ClientIdentity::new("203.0.113.7");
///
/// let decision = limiter.check(&client, Tier::Unauthenticated);
/// assert!(decision.allowed);
/// assert_eq!(decision.limit, 60);
/// ```
#[derive(Debug, Clone)]
pub struct RateLimiter {
    window: Duration,
    limits: TierLimits,
    store: Arc<dyn BucketStore>,
}

impl RateLimiter {
    /// Creates a limiter over an injected bucket store.
    #[must_use]
    pub fn new(window: Duration, limits: TierLimits, store: Arc<dyn BucketStore>) -> Self {
        Self {
            window,
            limits,
            store,
        }
    }

    /// Creates a limiter with its own in-memory store.
    #[must_use]
    pub fn in_memory(window: Duration, limits: TierLimits) -> Self {
        Self::new(window, limits, Arc::new(InMemoryBucketStore::new()))
    }

    /// Returns the refill window.
    #[must_use]
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Returns the configured tier limits.
    #[must_use]
    pub fn limits(&self) -> TierLimits {
        self.limits
    }

    /// Returns the bucket store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn BucketStore> {
        &self.store
    }

    /// Checks (and consumes from) the bucket for `identity`.
    ///
    /// Never fails; the verdict is always an allow or a deny with a retry
    /// hint.
    #[must_use]
    pub fn check(&self, identity: &ClientIdentity, tier: Tier) -> RateDecision {
        let decision = self.check_at(identity, tier, Instant::now());

        // Opportunistic cleanup so idle buckets don't accumulate forever.
        if rand::random::<f64>() < GC_PROBABILITY {
            self.store
                .sweep_idle(self.window * GC_IDLE_WINDOWS, Instant::now());
        }

        decision
    }

    /// Deterministic variant of [`check`](Self::check) taking an explicit
    /// clock reading. Skips garbage collection. Used by tests.
    #[must_use]
    pub fn check_at(&self, identity: &ClientIdentity, tier: Tier, now: Instant) -> RateDecision {
        let max = f64::from(self.limits.for_tier(tier));
        let window_ms = self.window.as_secs_f64() * 1000.0;
        let rate_per_ms = max / window_ms;

        let mut decision = RateDecision {
            allowed: false,
            limit: self.limits.for_tier(tier),
            remaining: 0,
            retry_after: None,
        };

        self.store.update(
            identity.as_str(),
            TokenBucket::full(max, now),
            &mut |bucket| {
                // A tier switch changes capacity; keep what the client has
                // already consumed rather than refunding or over-charging.
                if (bucket.max - max).abs() > f64::EPSILON {
                    bucket.tokens = (bucket.tokens + (max - bucket.max)).clamp(0.0, max);
                    bucket.max = max;
                }

                let elapsed_ms = now.duration_since(bucket.last_refill).as_secs_f64() * 1000.0;
                bucket.tokens = (bucket.tokens + elapsed_ms * rate_per_ms).min(max);
                // Advances even when the check is denied; see module docs.
                bucket.last_refill = now;

                if bucket.tokens < 1.0 {
                    let wait_ms = (1.0 - bucket.tokens) / rate_per_ms;
                    decision.allowed = false;
                    decision.remaining = 0;
                    decision.retry_after = Some(Duration::from_millis(wait_ms.ceil() as u64));
                } else {
                    bucket.tokens -= 1.0;
                    decision.allowed = true;
                    decision.remaining = bucket.tokens.floor() as u32;
                    decision.retry_after = None;
                }
            },
        );

        decision
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn limiter(window_ms: u64, max: u32) -> RateLimiter {
        RateLimiter::in_memory(Duration::from_millis(window_ms), TierLimits::uniform(max))
    }

    fn client(key: &str) -> ClientIdentity {
        ClientIdentity::new(key)
    }

    #[test]
    fn test_burst_to_capacity_then_denied() {
        // Bucket {max: 5, window: 1000ms}, six checks with no elapsed time:
        // first five allow, sixth denies with retry-after ~200ms.
        let limiter = limiter(1000, 5);
        let identity = client("198.51.100.1");
        let now = Instant::now();

        for i in 0..5 {
            let decision = limiter.check_at(&identity, Tier::Unauthenticated, now);
            assert!(decision.allowed, "check {i} should be allowed");
        }

        let denied = limiter.check_at(&identity, Tier::Unauthenticated, now);
        assert!(!denied.allowed);
        let retry = denied.retry_after.unwrap();
        assert_eq!(retry, Duration::from_millis(200));
        assert_eq!(denied.retry_after_secs(), Some(1));
    }

    #[test]
    fn test_continuous_refill() {
        let limiter = limiter(1000, 5);
        let identity = client("198.51.100.2");
        let start = Instant::now();

        // Drain the bucket.
        for _ in 0..5 {
            let _ = limiter.check_at(&identity, Tier::Unauthenticated, start);
        }
        assert!(!limiter.check_at(&identity, Tier::Unauthenticated, start).allowed);

        // 400ms refills 2 tokens (rate is 5/sec); minus the denied check's
        // clock reset this still leaves capacity for two requests.
        let later = start + Duration::from_millis(400);
        assert!(limiter.check_at(&identity, Tier::Unauthenticated, later).allowed);
        assert!(limiter.check_at(&identity, Tier::Unauthenticated, later).allowed);
        assert!(!limiter.check_at(&identity, Tier::Unauthenticated, later).allowed);
    }

    #[test]
    fn test_denied_checks_advance_refill_clock() {
        // A denial resets last_refill, so back-to-back denials at the same
        // instant see no refill, and waiting restarts from the last denial.
        let limiter = limiter(1000, 1);
        let identity = client("198.51.100.3");
        let start = Instant::now();

        assert!(limiter.check_at(&identity, Tier::Unauthenticated, start).allowed);
        let half = start + Duration::from_millis(500);
        assert!(!limiter.check_at(&identity, Tier::Unauthenticated, half).allowed);

        // 500ms of refill were banked by the denied check (0.5 tokens), so
        // 500ms later the bucket has exactly 1 token again.
        let full = half + Duration::from_millis(500);
        assert!(limiter.check_at(&identity, Tier::Unauthenticated, full).allowed);
    }

    #[test]
    fn test_tokens_capped_at_max() {
        let limiter = limiter(1000, 5);
        let identity = client("198.51.100.4");
        let start = Instant::now();

        let _ = limiter.check_at(&identity, Tier::Unauthenticated, start);
        // A long idle period must not overfill the bucket.
        let much_later = start + Duration::from_secs(3600);
        let _ = limiter.check_at(&identity, Tier::Unauthenticated, much_later);

        let bucket = limiter.store().get(identity.as_str()).unwrap();
        assert!(bucket.tokens <= 5.0);
        assert!(bucket.tokens >= 0.0);
    }

    #[test]
    fn test_independent_identities() {
        let limiter = limiter(1000, 2);
        let now = Instant::now();

        let a = client("a");
        let b = client("b");
        let _ = limiter.check_at(&a, Tier::Unauthenticated, now);
        let _ = limiter.check_at(&a, Tier::Unauthenticated, now);
        assert!(!limiter.check_at(&a, Tier::Unauthenticated, now).allowed);
        assert!(limiter.check_at(&b, Tier::Unauthenticated, now).allowed);
    }

    #[test]
    fn test_tier_switch_uses_higher_ceiling() {
        // Unauthenticated limit 5, authenticated limit 10: after draining
        // the unauthenticated ceiling, presenting a token must allow more
        // requests starting from the next check.
        let limiter = RateLimiter::in_memory(
            Duration::from_secs(60),
            TierLimits {
                unauthenticated: 5,
                authenticated: 10,
            },
        );
        let identity = client("nat-gateway");
        let now = Instant::now();

        for _ in 0..5 {
            assert!(limiter.check_at(&identity, Tier::Unauthenticated, now).allowed);
        }
        assert!(!limiter.check_at(&identity, Tier::Unauthenticated, now).allowed);

        // Same window, now with a session credential: 5 more fit under the
        // authenticated ceiling of 10.
        for i in 0..5 {
            let decision = limiter.check_at(&identity, Tier::Authenticated, now);
            assert!(decision.allowed, "authenticated check {i} should pass");
            assert_eq!(decision.limit, 10);
        }
        assert!(!limiter.check_at(&identity, Tier::Authenticated, now).allowed);
    }

    #[test]
    fn test_tier_downgrade_does_not_refund() {
        let limiter = RateLimiter::in_memory(
            Duration::from_secs(60),
            TierLimits {
                unauthenticated: 2,
                authenticated: 10,
            },
        );
        let identity = client("downgrader");
        let now = Instant::now();

        // Spend 4 under the authenticated ceiling.
        for _ in 0..4 {
            assert!(limiter.check_at(&identity, Tier::Authenticated, now).allowed);
        }

        // Dropping the credential shrinks capacity to 2, all spent.
        assert!(!limiter.check_at(&identity, Tier::Unauthenticated, now).allowed);
    }

    #[test]
    fn test_sweep_removes_idle_buckets() {
        let store = Arc::new(InMemoryBucketStore::new());
        let limiter = RateLimiter::new(
            Duration::from_millis(1000),
            TierLimits::uniform(5),
            store.clone(),
        );
        let now = Instant::now();

        let _ = limiter.check_at(&client("idle"), Tier::Unauthenticated, now);
        let _ = limiter.check_at(
            &client("active"),
            Tier::Unauthenticated,
            now + Duration::from_secs(3),
        );
        assert_eq!(store.len(), 2);

        // "idle" has been quiet for 3s > 2 * window; "active" survives.
        store.sweep_idle(Duration::from_millis(2000), now + Duration::from_secs(3));
        assert_eq!(store.len(), 1);
        assert!(store.get("active").is_some());
        assert!(store.get("idle").is_none());
    }

    #[test]
    fn test_delete_bucket() {
        let store = InMemoryBucketStore::new();
        store.update("k", TokenBucket::full(5.0, Instant::now()), &mut |_| {});
        assert_eq!(store.len(), 1);
        store.delete("k");
        assert_eq!(store.len(), 0);
    }

    proptest! {
        /// Boundedness: whatever the sequence of checks, tiers, and elapsed
        /// times, tokens stay within [0, max].
        #[test]
        fn prop_tokens_bounded(steps in prop::collection::vec((0u64..5_000, any::<bool>()), 1..60)) {
            let limiter = RateLimiter::in_memory(
                Duration::from_millis(1000),
                TierLimits { unauthenticated: 5, authenticated: 10 },
            );
            let identity = ClientIdentity::new("prop-client");
            let mut now = Instant::now();

            for (elapsed_ms, authenticated) in steps {
                now += Duration::from_millis(elapsed_ms);
                let tier = if authenticated { Tier::Authenticated } else { Tier::Unauthenticated };
                let _ = limiter.check_at(&identity, tier, now);

                let bucket = limiter.store().get(identity.as_str()).unwrap();
                prop_assert!(bucket.tokens >= 0.0);
                prop_assert!(bucket.tokens <= bucket.max);
            }
        }

        /// Refill monotonicity: elapsed time alone never decreases tokens.
        #[test]
        fn prop_refill_monotonic(elapsed_ms in 0u64..10_000) {
            let store = InMemoryBucketStore::new();
            let start = Instant::now();
            store.update("k", TokenBucket::full(5.0, start), &mut |bucket| {
                bucket.tokens = 2.0;
            });

            let before = store.get("k").unwrap().tokens;
            let limiter = RateLimiter::new(
                Duration::from_millis(1000),
                TierLimits::uniform(5),
                Arc::new(store),
            );

            // A denied-or-allowed check at a later instant refills first and
            // consumes at most 1: tokens never drop below (before - 1), and
            // pure elapsed time can only add.
            let decision = limiter.check_at(
                &ClientIdentity::new("k"),
                Tier::Unauthenticated,
                start + Duration::from_millis(elapsed_ms),
            );
            let after = limiter.store().get("k").unwrap().tokens;
            let consumed = if decision.allowed { 1.0 } else { 0.0 };
            prop_assert!(after + consumed >= before - 1e-9);
        }
    }
}
