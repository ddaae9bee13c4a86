//! Bounded retry with exponential backoff for external capability calls.

use std::future::Future;
use std::time::Duration;

use tracing::debug;

use crate::error::CapabilityError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
  /// Total attempts, including the first call.
  pub max_attempts: u32,
  pub base_delay: Duration,
  pub max_delay: Duration,
  /// Each attempt is abandoned after this long.
  pub call_timeout: Duration,
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self {
      max_attempts: 3,
      base_delay: Duration::from_millis(250),
      max_delay: Duration::from_secs(4),
      call_timeout: Duration::from_secs(20),
    }
  }
}

impl RetryPolicy {
  /// Delay after the given failed attempt (1-based): base * 2^(attempt-1), capped.
  pub fn delay_for(&self, attempt: u32) -> Duration {
    let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
    self.base_delay.saturating_mul(factor).min(self.max_delay)
  }
}

/// Run `op` until it succeeds, fails permanently, or attempts run out.
pub async fn with_retry<T, F, Fut>(
  policy: &RetryPolicy,
  capability: &str,
  mut op: F,
) -> Result<T, CapabilityError>
where
  F: FnMut() -> Fut,
  Fut: Future<Output = Result<T, CapabilityError>>,
{
  let mut attempt = 0;
  loop {
    attempt += 1;
    let result = match tokio::time::timeout(policy.call_timeout, op()).await {
      Ok(r) => r,
      Err(_) => Err(CapabilityError::Timeout(policy.call_timeout.as_millis() as u64)),
    };
    match result {
      Ok(v) => return Ok(v),
      Err(e) if e.is_retryable() && attempt < policy.max_attempts => {
        let delay = policy.delay_for(attempt);
        debug!(
          capability,
          attempt,
          delay_ms = delay.as_millis() as u64,
          error = %e,
          "capability call failed, retrying"
        );
        tokio::time::sleep(delay).await;
      }
      Err(e) => return Err(e),
    }
  }
}
