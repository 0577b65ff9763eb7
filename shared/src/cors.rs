// Helpers for the fixed cross-origin response policy. Applied to every
// response leaving the service, success and rejection alike.

use http::HeaderMap;
use http::header::{
    ACCESS_CONTROL_ALLOW_CREDENTIALS, ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue, VARY,
};

/// Merges the fixed cross-origin headers onto `headers`.
///
/// Uses `insert`, so on a name collision the fixed policy wins over anything
/// a handler set. Credentials are always disallowed, and `Vary: Origin`
/// keeps intermediary caches from serving one origin's response to another.
pub fn apply_cors_headers(headers: &mut HeaderMap, allowed_origin: &HeaderValue) {
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, allowed_origin.clone());
    headers.insert(
        ACCESS_CONTROL_ALLOW_CREDENTIALS,
        HeaderValue::from_static("false"),
    );
    headers.insert(VARY, HeaderValue::from_static("Origin"));
}
