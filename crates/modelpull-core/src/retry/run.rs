//! Retry loop: run a closure until success or policy says stop.

use super::policy::{ErrorKind, RetryDecision, RetryPolicy};

/// Runs a closure until it succeeds or the retry policy says to stop.
/// On retryable failure, sleeps for the backoff duration then tries again.
/// Used for short blocking requests (registry metadata); chunk transfers go
/// through the scheduler's task state machine instead.
pub fn run_with_retry<T, E, F, C>(policy: &RetryPolicy, classify: C, mut f: F) -> Result<T, E>
where
    F: FnMut() -> Result<T, E>,
    C: Fn(&E) -> ErrorKind,
{
    let mut attempt = 1u32;
    loop {
        match f() {
            Ok(v) => return Ok(v),
            Err(e) => match policy.decide(attempt, classify(&e)) {
                RetryDecision::NoRetry => return Err(e),
                RetryDecision::RetryAfter(d) => {
                    std::thread::sleep(d);
                    attempt += 1;
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
        }
    }

    #[test]
    fn retries_transient_until_success() {
        let mut calls = 0;
        let res: Result<u32, ErrorKind> = run_with_retry(&fast_policy(5), |k| *k, || {
            calls += 1;
            if calls < 3 {
                Err(ErrorKind::Connection)
            } else {
                Ok(7)
            }
        });
        assert_eq!(res, Ok(7));
        assert_eq!(calls, 3);
    }

    #[test]
    fn stops_on_non_transient() {
        let mut calls = 0;
        let res: Result<(), ErrorKind> = run_with_retry(&fast_policy(5), |k| *k, || {
            calls += 1;
            Err(ErrorKind::Other)
        });
        assert_eq!(res, Err(ErrorKind::Other));
        assert_eq!(calls, 1);
    }

    #[test]
    fn gives_up_after_max_attempts() {
        let mut calls = 0;
        let res: Result<(), ErrorKind> = run_with_retry(&fast_policy(3), |k| *k, || {
            calls += 1;
            Err(ErrorKind::Timeout)
        });
        assert!(res.is_err());
        assert_eq!(calls, 3);
    }
}
