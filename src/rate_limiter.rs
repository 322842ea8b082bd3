use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

const WINDOW: Duration = Duration::from_secs(60);

/// Per-key fixed-window request limiter.
///
/// The first request for a key opens a one-minute window; at most `requests_per_window`
/// requests are admitted until the window expires, after which the next request opens a new one.
#[derive(Debug, Clone)]
pub struct KeyRateLimiter {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    requests_per_window: u32,
    // key -> (window start, admitted count)
    windows: Mutex<HashMap<String, (Instant, u32)>>,
}

impl KeyRateLimiter {
    pub fn new(requests_per_window: u32) -> Self {
        Self {
            inner: Arc::new(Inner {
                requests_per_window,
                windows: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Returns true when the request is admitted.
    pub async fn check(&self, key: &str) -> bool {
        self.check_at(key, Instant::now()).await
    }

    pub async fn check_at(&self, key: &str, now: Instant) -> bool {
        let mut windows = self.inner.windows.lock().await;
        match windows.get_mut(key) {
            Some((start, count)) if now.saturating_duration_since(*start) < WINDOW => {
                if *count >= self.inner.requests_per_window {
                    return false;
                }
                *count += 1;
                true
            }
            _ => {
                if self.inner.requests_per_window == 0 {
                    return false;
                }
                windows.insert(key.to_string(), (now, 1));
                true
            }
        }
    }
}
