use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use tokio::time::{sleep, Duration, Instant};

/// Cooperative per-second counter. Not a hard scheduler — a caller that exceeds the
/// budget simply yields until the next 1-second window opens.
pub struct RateLimiter {
    limit_per_sec: u32,
    window_start: AtomicU64,
    count: AtomicU32,
    epoch: Instant,
}

impl RateLimiter {
    pub fn new(limit_per_sec: u32) -> Self {
        Self {
            limit_per_sec,
            window_start: AtomicU64::new(0),
            count: AtomicU32::new(0),
            epoch: Instant::now(),
        }
    }

    /// Block (cooperatively) until a slot in the current or next 1-second
    /// window is available, then consume it.
    pub async fn acquire(&self) {
        loop {
            let now_ms = self.epoch.elapsed().as_millis() as u64;
            let window = now_ms / 1_000;
            let prior = self.window_start.swap(window, Ordering::SeqCst);
            if prior != window {
                self.count.store(0, Ordering::SeqCst);
            }

            let used = self.count.fetch_add(1, Ordering::SeqCst);
            if used < self.limit_per_sec {
                return;
            }

            // Over budget for this window: give the slot back and sleep
            // until the next window boundary.
            self.count.fetch_sub(1, Ordering::SeqCst);
            let next_window_ms = (window + 1) * 1_000;
            let wait_ms = next_window_ms.saturating_sub(now_ms);
            sleep(Duration::from_millis(wait_ms.max(1))).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn allows_bursts_up_to_the_limit_without_sleeping() {
        let limiter = RateLimiter::new(5);
        let start = Instant::now();
        for _ in 0..5 {
            limiter.acquire().await;
        }
        assert!(start.elapsed() < Duration::from_millis(200));
    }
}
