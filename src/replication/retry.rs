//! Bounded retries with exponential backoff

use crate::error::Result;
use crate::logging::Logger;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// Position within a retry loop, handed to each attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryState {
    /// 0-based attempt index
    pub attempt: u32,
    /// Backoff that will be slept if this attempt fails
    pub backoff: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_backoff: Duration,
    max_backoff: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(5))
    }
}

impl RetryPolicy {
    /// `max_attempts` counts the first try; it is clamped to at least 1
    pub fn new(max_attempts: u32, initial_backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_backoff,
            max_backoff: None,
        }
    }

    /// Cap the doubled backoff; unset means the attempt limit is the only bound
    pub fn with_max_backoff(mut self, max_backoff: Duration) -> Self {
        self.max_backoff = Some(max_backoff);
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    fn next_backoff(&self, current: Duration) -> Duration {
        let doubled = current.saturating_mul(2);
        match self.max_backoff {
            Some(max) => doubled.min(max),
            None => doubled,
        }
    }

    fn first_backoff(&self) -> Duration {
        match self.max_backoff {
            Some(max) => self.initial_backoff.min(max),
            None => self.initial_backoff,
        }
    }

    /// Sleeps taken between attempts when every attempt fails
    pub fn backoff_schedule(&self) -> Vec<Duration> {
        let mut delays = Vec::new();
        let mut backoff = self.first_backoff();
        for _ in 1..self.max_attempts {
            delays.push(backoff);
            backoff = self.next_backoff(backoff);
        }
        delays
    }

    /// Run `operation` until it succeeds or the attempts run out, returning
    /// the last error in the latter case. No sleep follows the final failure.
    pub async fn execute<T, F, Fut>(&self, log: &Logger, mut operation: F) -> Result<T>
    where
        F: FnMut(RetryState) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut state = RetryState {
            attempt: 0,
            backoff: self.first_backoff(),
        };

        loop {
            match operation(state).await {
                Ok(value) => {
                    if state.attempt > 0 {
                        log.info(&format!(
                            "Succeeded on attempt {}/{}",
                            state.attempt + 1,
                            self.max_attempts
                        ));
                    }
                    return Ok(value);
                }
                Err(e) if state.attempt + 1 < self.max_attempts => {
                    log.warning(&format!(
                        "Attempt {}/{} failed: {}. Retrying in {}s",
                        state.attempt + 1,
                        self.max_attempts,
                        e,
                        state.backoff.as_secs_f64()
                    ));
                    sleep(state.backoff).await;
                    state = RetryState {
                        attempt: state.attempt + 1,
                        backoff: self.next_backoff(state.backoff),
                    };
                }
                Err(e) => {
                    log.error(&format!(
                        "All {} attempts failed. Last error: {}",
                        self.max_attempts, e
                    ));
                    return Err(e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ReplicatorError;
    use std::sync::Mutex;
    use tokio::time::Instant;

    #[test]
    fn schedule_doubles_from_initial() {
        let policy = RetryPolicy::new(3, Duration::from_secs(5));
        assert_eq!(
            policy.backoff_schedule(),
            vec![Duration::from_secs(5), Duration::from_secs(10)]
        );
    }

    #[test]
    fn ceiling_caps_the_schedule() {
        let policy = RetryPolicy::new(5, Duration::from_secs(5)).with_max_backoff(Duration::from_secs(12));
        assert_eq!(
            policy.backoff_schedule(),
            vec![5, 10, 12, 12].into_iter().map(Duration::from_secs).collect::<Vec<_>>()
        );
    }

    #[test]
    fn zero_attempts_still_tries_once() {
        assert_eq!(RetryPolicy::new(0, Duration::from_secs(1)).max_attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn sleeps_five_then_ten_and_returns_last_error() {
        let policy = RetryPolicy::new(3, Duration::from_secs(5));
        let start = Instant::now();
        let attempts = Mutex::new(Vec::new());

        let result: Result<()> = policy
            .execute(&Logger::new_quiet(), |state| {
                attempts.lock().unwrap().push((state.attempt, start.elapsed()));
                async move { Err(ReplicatorError::Copy(format!("boom {}", state.attempt))) }
            })
            .await;

        let err = result.unwrap_err();
        assert_eq!(err.to_string(), "Copy error: boom 2");
        let attempts = attempts.into_inner().unwrap();
        assert_eq!(
            attempts,
            vec![
                (0, Duration::from_secs(0)),
                (1, Duration::from_secs(5)),
                (2, Duration::from_secs(15)),
            ]
        );
        // No sleep after the final failure
        assert_eq!(start.elapsed(), Duration::from_secs(15));
    }

    #[tokio::test(start_paused = true)]
    async fn stops_retrying_after_success() {
        let policy = RetryPolicy::new(4, Duration::from_secs(2));
        let calls = Mutex::new(0u32);

        let value = policy
            .execute(&Logger::new_quiet(), |state| {
                *calls.lock().unwrap() += 1;
                async move {
                    if state.attempt < 1 {
                        Err(ReplicatorError::Copy("transient".to_string()))
                    } else {
                        Ok(42)
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(value, 42);
        assert_eq!(calls.into_inner().unwrap(), 2);
    }
}
