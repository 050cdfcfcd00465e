//! Minimum spacing between outgoing requests.

use std::time::Duration;

use tokio::{sync::Mutex, time::Instant};

pub(crate) struct RateLimiter {
  last_request: Mutex<Option<Instant>>,
  min_interval: Duration,
}

impl RateLimiter {
  pub(crate) fn new(min_interval: Duration) -> Self {
    Self { last_request: Mutex::new(None), min_interval }
  }

  /// Sleep until `min_interval` has passed since the previous request.
  /// Concurrent callers queue on the lock, so requests go out one at a time.
  pub(crate) async fn wait(&self) {
    let mut last = self.last_request.lock().await;
    if let Some(previous) = *last {
      let elapsed = previous.elapsed();
      if elapsed < self.min_interval {
        let pause = self.min_interval - elapsed;
        tracing::debug!(?pause, "rate limiting reference request");
        tokio::time::sleep(pause).await;
      }
    }
    *last = Some(Instant::now());
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn second_request_waits_for_the_interval() {
    let limiter = RateLimiter::new(Duration::from_millis(50));
    let start = tokio::time::Instant::now();
    limiter.wait().await;
    limiter.wait().await;
    assert!(start.elapsed() >= Duration::from_millis(50));
  }
}
