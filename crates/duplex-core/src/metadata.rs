//! Well-known call metadata keys.
//!
//! Keys are lowercase; `http::HeaderMap` lookups are case-insensitive so the
//! same constants serve RPC metadata and plain HTTP headers.

use http::HeaderMap;

/// Bearer credentials.
pub const AUTHORIZATION: &str = "authorization";

/// Correlation identifier.
pub const X_CORRELATION_ID: &str = "x-correlation-id";

/// Request identifier, accepted as a correlation identifier alias.
pub const X_REQUEST_ID: &str = "x-request-id";

/// API key credentials.
pub const API_KEY: &str = "api-key";

/// Cookie header forwarded by the gateway.
pub const GATEWAY_COOKIE: &str = "grpcgateway-cookie";

/// RPC deadline header.
pub const GRPC_TIMEOUT: &str = "grpc-timeout";

/// Headers the gateway copies from an HTTP request into call metadata.
pub const FORWARDED_HEADERS: &[&str] = &[AUTHORIZATION, X_REQUEST_ID, X_CORRELATION_ID, API_KEY];

/// Returns the first value for `key` as a string, if present and valid UTF-8.
pub fn get<'a>(metadata: &'a HeaderMap, key: &str) -> Option<&'a str> {
    metadata.get(key).and_then(|value| value.to_str().ok())
}

/// Returns every value for `key` that is valid UTF-8.
pub fn get_all<'a>(metadata: &'a HeaderMap, key: &str) -> Vec<&'a str> {
    metadata
        .get_all(key)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .collect()
}
