//! Bounded retry with a fixed delay between attempts.
//!
//! The same primitive drives the imagery request retries (same request,
//! three attempts) and the backward day walk of the daily precipitation
//! archive (attempt index = days back). The `should_continue` predicate
//! decides whether a failure moves on to the next attempt or stops the
//! chain immediately.

use std::fmt::Display;
use std::time::Duration;

/// Attempt bound and delay between consecutive attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

/// Why a retried operation did not produce a value
#[derive(Debug)]
pub enum RetryError<E> {
    /// Every attempt failed; carries the last error
    Exhausted { attempts: u32, last: E },
    /// The predicate refused to continue after this error
    Aborted { attempt: u32, error: E },
}

impl<E> RetryError<E> {
    pub fn into_inner(self) -> E {
        match self {
            RetryError::Exhausted { last, .. } => last,
            RetryError::Aborted { error, .. } => error,
        }
    }

    pub fn attempts(&self) -> u32 {
        match self {
            RetryError::Exhausted { attempts, .. } => *attempts,
            RetryError::Aborted { attempt, .. } => attempt + 1,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self { max_attempts: max_attempts.max(1), delay }
    }

    /// Single attempt, no delay
    pub fn once() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// Run `op` until it succeeds, the predicate stops the chain, or the
    /// attempt bound is reached. `op` receives the zero-based attempt index.
    pub fn run<T, E, F, P>(&self, label: &str, mut op: F, should_continue: P) -> Result<T, RetryError<E>>
    where
        E: Display,
        F: FnMut(u32) -> Result<T, E>,
        P: Fn(&E) -> bool,
    {
        let mut attempt = 0;
        loop {
            log::debug!("{}: attempt {} of {}", label, attempt + 1, self.max_attempts);
            let error = match op(attempt) {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };

            if !should_continue(&error) {
                log::warn!("{}: attempt {} failed, not retrying: {}", label, attempt + 1, error);
                return Err(RetryError::Aborted { attempt, error });
            }

            attempt += 1;
            if attempt >= self.max_attempts {
                log::warn!("{}: giving up after {} attempts: {}", label, attempt, error);
                return Err(RetryError::Exhausted { attempts: attempt, last: error });
            }

            log::warn!("{}: attempt {} failed, retrying: {}", label, attempt, error);
            if !self.delay.is_zero() {
                std::thread::sleep(self.delay);
            }
        }
    }
}
