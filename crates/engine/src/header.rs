//! The header capability and its implementation over [`http::HeaderMap`].
//!
//! Header access never fails: absent keys read as the empty string, and keys or
//! values that are not valid HTTP tokens are dropped with a warning instead of
//! surfacing an error to the caller.

use std::any::Any;

use http::{HeaderMap, HeaderName, HeaderValue};
use tracing::warn;

/// Header carrying the client address set by a reverse proxy
pub const X_REAL_IP: &str = "X-Real-IP";

/// Header carrying the chain of client/proxy addresses
pub const X_FORWARDED_FOR: &str = "X-Forwarded-For";

/// A multi-valued, case-insensitive header store.
pub trait Header: Send + Sync {
    /// Appends `value` to the values already associated with `key`.
    fn add(&mut self, key: &str, value: &str);

    /// Removes every value associated with `key`.
    fn del(&mut self, key: &str);

    /// Returns the first value associated with `key`, or `""` if there is none.
    fn get(&self, key: &str) -> &str;

    /// Replaces every value associated with `key` with the single `value`.
    fn set(&mut self, key: &str, value: &str);

    /// Returns all values associated with `key`, in insertion order.
    fn values(&self, key: &str) -> Vec<&str>;

    fn contains(&self, key: &str) -> bool;

    /// Access to the backend's native header type.
    fn as_any(&self) -> &dyn Any;
}

impl Header for HeaderMap {
    fn add(&mut self, key: &str, value: &str) {
        if let Some((name, value)) = parse_entry(key, value) {
            self.append(name, value);
        }
    }

    fn del(&mut self, key: &str) {
        HeaderMap::remove(self, key);
    }

    fn get(&self, key: &str) -> &str {
        HeaderMap::get(self, key).and_then(|value| value.to_str().ok()).unwrap_or_default()
    }

    fn set(&mut self, key: &str, value: &str) {
        if let Some((name, value)) = parse_entry(key, value) {
            self.insert(name, value);
        }
    }

    fn values(&self, key: &str) -> Vec<&str> {
        self.get_all(key).iter().filter_map(|value| value.to_str().ok()).collect()
    }

    fn contains(&self, key: &str) -> bool {
        self.contains_key(key)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

fn parse_entry(key: &str, value: &str) -> Option<(HeaderName, HeaderValue)> {
    let name = match HeaderName::from_bytes(key.as_bytes()) {
        Ok(name) => name,
        Err(e) => {
            warn!(key, cause = %e, "ignore invalid header name");
            return None;
        }
    };

    match HeaderValue::from_str(value) {
        Ok(value) => Some((name, value)),
        Err(e) => {
            warn!(key, cause = %e, "ignore invalid header value");
            None
        }
    }
}
