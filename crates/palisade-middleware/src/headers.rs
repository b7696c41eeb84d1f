//! Security response headers.
//!
//! Applied by the pipeline to successful responses only; stage rejections
//! (429/401/403) go back without them. Application is additive: a header
//! the handler already set wins.

use crate::config::Environment;
use http::header::{HeaderName, HeaderValue};
use http::HeaderMap;

const NOSNIFF: HeaderName = HeaderName::from_static("x-content-type-options");
const FRAME_OPTIONS: HeaderName = HeaderName::from_static("x-frame-options");
const XSS_PROTECTION: HeaderName = HeaderName::from_static("x-xss-protection");
const HSTS: HeaderName = HeaderName::from_static("strict-transport-security");
const CSP: HeaderName = HeaderName::from_static("content-security-policy");

/// Applies the standard security header set to `headers`.
///
/// The `Content-Security-Policy` is production-only so local tooling
/// (hot reload, inline dev scripts) keeps working.
pub fn apply_security_headers(headers: &mut HeaderMap, environment: Environment) {
    insert_if_absent(headers, NOSNIFF, "nosniff");
    insert_if_absent(headers, FRAME_OPTIONS, "DENY");
    insert_if_absent(headers, XSS_PROTECTION, "1; mode=block");
    insert_if_absent(headers, HSTS, "max-age=31536000; includeSubDomains");

    if environment.is_production() {
        insert_if_absent(headers, CSP, "default-src 'self'");
    }
}

fn insert_if_absent(headers: &mut HeaderMap, name: HeaderName, value: &'static str) {
    if !headers.contains_key(&name) {
        headers.insert(name, HeaderValue::from_static(value));
    }
}
