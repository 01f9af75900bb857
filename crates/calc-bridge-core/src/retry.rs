//! Bounded retry without backoff.

use std::future::Future;

/// Returned when every attempt failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryExhausted<E> {
    /// Attempts made.
    pub attempts: u32,
    /// Error of the final attempt.
    pub last_error: E,
}

/// Run `operation` until it succeeds or `max_attempts` attempts have failed.
///
/// The 1-based attempt number is passed to each invocation. Attempts run back
/// to back; there is no sleeping, so the function is testable without timers.
/// A `max_attempts` of zero still makes one attempt.
pub async fn retry<T, E, F, Fut>(max_attempts: u32, mut operation: F) -> Result<T, RetryExhausted<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let max_attempts = max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(last_error) if attempt >= max_attempts => {
                return Err(RetryExhausted {
                    attempts: attempt,
                    last_error,
                });
            }
            Err(_) => attempt += 1,
        }
    }
}
