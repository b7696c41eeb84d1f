//! Client identity for rate-limit partitioning.
//!
//! A [`ClientIdentity`] is the string key that partitions per-client state
//! (token buckets). It is best-effort IP attribution: the first value of the
//! `x-forwarded-for` header when present, otherwise the socket peer address,
//! otherwise a shared `"unknown"` key. Multiple users behind one NAT share a
//! bucket; that is an accepted limitation, not a bug.

use http::HeaderMap;
use std::fmt;
use std::net::SocketAddr;

/// Header consulted first for the client address.
pub const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";

/// Key used when no address information is available at all.
const UNKNOWN_CLIENT: &str = "unknown";

/// Best-effort identity of the requesting client.
///
/// # Example
///
/// ```
/// use http::HeaderMap;
/// use palisade_core::ClientIdentity;
///
/// let mut headers = HeaderMap::new();
/// headers.insert("x-forwarded-for", "203.0.113.7, 10.0.0.1".parse().unwrap());
///
/// let identity = ClientIdentity::from_request(&headers, None);
/// assert_eq!(identity.as_str(), "203.0.113.7");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientIdentity(String);

impl ClientIdentity {
    /// Creates an identity from a raw key.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Derives the identity from request headers and the peer address.
    ///
    /// `x-forwarded-for` may contain multiple comma-separated hops; only the
    /// first (the original client, as reported by the proxy) is used.
    #[must_use]
    pub fn from_request(headers: &HeaderMap, remote_addr: Option<SocketAddr>) -> Self {
        if let Some(forwarded) = headers.get(FORWARDED_FOR_HEADER) {
            if let Ok(value) = forwarded.to_str() {
                if let Some(first) = value.split(',').next() {
                    let first = first.trim();
                    if !first.is_empty() {
                        return Self(first.to_string());
                    }
                }
            }
        }

        match remote_addr {
            Some(addr) => Self(addr.ip().to_string()),
            None => Self(UNKNOWN_CLIENT.to_string()),
        }
    }

    /// Returns the identity key.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if no address could be attributed.
    #[must_use]
    pub fn is_unknown(&self) -> bool {
        self.0 == UNKNOWN_CLIENT
    }
}

impl fmt::Display for ClientIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ClientIdentity {
    fn from(key: &str) -> Self {
        Self(key.to_string())
    }
}
