//! Bounded retry of a fallible async operation.

use std::fmt;
use std::future::Future;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum RetryError<E: fmt::Debug + fmt::Display> {
    #[error("{name}: all {attempts} attempts failed, last error: {last}")]
    Exhausted { name: String, attempts: u32, last: E },

    #[error("{name}: timed out after {timeout:?}")]
    TimedOut { name: String, timeout: Duration },

    #[error("{name}: {error}")]
    Aborted { name: String, error: E },
}

/// Run `op` up to `budget` times while the whole loop races `timeout`.
///
/// Returns the first success. A failure for which `is_abort` holds ends
/// the loop immediately. A zero budget still makes one attempt.
pub async fn retry_with_timeout<T, E, F, Fut>(
    name: &str,
    budget: u32,
    timeout: Duration,
    mut op: F,
    is_abort: impl Fn(&E) -> bool,
) -> Result<T, RetryError<E>>
where
    E: fmt::Debug + fmt::Display,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let attempts = budget.max(1);
    let retry_loop = async {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(error) if is_abort(&error) => {
                    return Err(RetryError::Aborted {
                        name: name.to_string(),
                        error,
                    })
                }
                Err(error) if attempt >= attempts => {
                    return Err(RetryError::Exhausted {
                        name: name.to_string(),
                        attempts,
                        last: error,
                    })
                }
                Err(error) => {
                    log::warn!("{name}: attempt {attempt}/{attempts} failed: {error}");
                }
            }
        }
    };

    match tokio::time::timeout(timeout, retry_loop).await {
        Ok(result) => result,
        Err(_) => Err(RetryError::TimedOut {
            name: name.to_string(),
            timeout,
        }),
    }
}
