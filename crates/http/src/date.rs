//! HTTP `Date` header value management.
//!
//! Formatting the date on every response is wasteful, so the service keeps the
//! current value in an [`ArcSwap`] and refreshes it from a background task.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use arc_swap::ArcSwap;
use http::HeaderValue;
use httpdate::fmt_http_date;
use tokio::task::JoinHandle;

const UPDATE_INTERVAL: Duration = Duration::from_millis(800);

/// Keeps a recent HTTP date string; must be created inside a tokio runtime.
#[derive(Debug)]
pub struct DateService {
    current: Arc<ArcSwap<HeaderValue>>,
    handle: JoinHandle<()>,
}

impl DateService {
    pub fn new() -> Self {
        Self::with_update_interval(UPDATE_INTERVAL)
    }

    pub fn with_update_interval(update_interval: Duration) -> Self {
        let current = Arc::new(ArcSwap::from_pointee(http_date_now()));
        let current_arc = Arc::clone(&current);

        let handle = tokio::spawn(async move {
            loop {
                tokio::time::sleep(update_interval).await;
                current_arc.store(Arc::new(http_date_now()));
            }
        });

        Self { current, handle }
    }

    pub fn header_value(&self) -> HeaderValue {
        self.current.load().as_ref().clone()
    }
}

impl Default for DateService {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for DateService {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Formats the current time as an HTTP date.
pub fn http_date_now() -> HeaderValue {
    HeaderValue::try_from(fmt_http_date(SystemTime::now())).unwrap_or_else(|_| HeaderValue::from_static(""))
}
