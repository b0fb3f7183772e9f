use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaxAttempts {
    /// Always performs at least one attempt.
    Limited(u32),
    Unbounded,
}

impl MaxAttempts {
    /// `0` means retry forever.
    pub fn from_count(count: u32) -> Self {
        if count == 0 {
            Self::Unbounded
        } else {
            Self::Limited(count)
        }
    }

    fn is_exhausted(&self, attempts: u32) -> bool {
        match self {
            Self::Limited(max) => attempts >= *max,
            Self::Unbounded => false,
        }
    }
}

impl fmt::Display for MaxAttempts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Limited(max) => write!(f, "{max}"),
            Self::Unbounded => f.write_str("unbounded"),
        }
    }
}

#[derive(Clone)]
pub enum Backoff {
    Fixed(Duration),
    /// Delay chosen from the 1-based number of the attempt that just failed.
    PerAttempt(Arc<dyn Fn(u32) -> Duration + Send + Sync>),
}

impl Backoff {
    pub fn delay(&self, failed_attempt: u32) -> Duration {
        match self {
            Self::Fixed(delay) => *delay,
            Self::PerAttempt(delay_for) => delay_for(failed_attempt),
        }
    }
}

impl fmt::Debug for Backoff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed(delay) => f.debug_tuple("Fixed").field(delay).finish(),
            Self::PerAttempt(_) => f.write_str("PerAttempt(..)"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: MaxAttempts,
    pub backoff: Backoff,
}

impl RetryPolicy {
    pub fn new(max_attempts: MaxAttempts, backoff: Backoff) -> Self {
        Self {
            max_attempts,
            backoff,
        }
    }

    pub fn fixed(max_attempts: MaxAttempts, delay: Duration) -> Self {
        Self::new(max_attempts, Backoff::Fixed(delay))
    }

    pub fn fetch_default() -> Self {
        Self::fixed(MaxAttempts::Limited(5), Duration::from_secs(2))
    }

    pub fn speech_default() -> Self {
        Self::fixed(MaxAttempts::Limited(20), Duration::from_secs(1))
    }
}

#[derive(Debug)]
pub enum RetryOutcome<T> {
    Succeeded { value: T, attempts: u32 },
    Exhausted { attempts: u32, last_error: anyhow::Error },
}

impl<T> RetryOutcome<T> {
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Succeeded { attempts, .. } | Self::Exhausted { attempts, .. } => *attempts,
        }
    }

    pub fn into_result(self) -> anyhow::Result<T> {
        match self {
            Self::Succeeded { value, .. } => Ok(value),
            Self::Exhausted {
                attempts,
                last_error,
            } => Err(last_error.context(format!("gave up after {attempts} attempt(s)"))),
        }
    }
}

/// Runs `op` until it succeeds or `policy` runs out of attempts.
///
/// `op` receives the 1-based attempt number. Failures are logged and never
/// propagated: exhaustion is reported as [`RetryOutcome::Exhausted`] and the
/// caller decides what it means.
pub async fn retry<T, F, Fut>(policy: &RetryPolicy, what: &str, mut op: F) -> RetryOutcome<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
{
    let mut attempt: u32 = 0;
    loop {
        attempt = attempt.saturating_add(1);
        let err = match op(attempt).await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::info!(what, attempt, "succeeded after retry");
                }
                return RetryOutcome::Succeeded {
                    value,
                    attempts: attempt,
                };
            }
            Err(err) => err,
        };

        if policy.max_attempts.is_exhausted(attempt) {
            tracing::error!(
                what,
                attempts = attempt,
                error = %format!("{err:#}"),
                "retries exhausted"
            );
            return RetryOutcome::Exhausted {
                attempts: attempt,
                last_error: err,
            };
        }

        let delay = policy.backoff.delay(attempt);
        tracing::warn!(
            what,
            attempt,
            max_attempts = %policy.max_attempts,
            delay_ms = delay.as_millis() as u64,
            error = %format!("{err:#}"),
            "attempt failed; retrying"
        );
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}
