//! Chunk task state machine.
//!
//! `Pending → Dispatched → {Succeeded, Retrying, Failed}`; a retrying task
//! is dispatched again once its delay has passed.

use std::time::Duration;

use crate::retry::{ErrorKind, RetryDecision, RetryPolicy};
use crate::segmenter::ByteRange;

/// Why a task stopped for good.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailKind {
    /// Transient errors until the attempt limit ran out.
    Exhausted,
    /// The error cannot be fixed by retrying.
    NotRetryable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Pending,
    Dispatched,
    Succeeded,
    Retrying { attempt: u32, delay: Duration },
    Failed(FailKind),
}

/// One ranged fetch of one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkTask {
    /// Index of the file within the run.
    pub file: usize,
    pub range: ByteRange,
    /// Number of dispatches so far.
    pub attempt: u32,
    pub state: TaskState,
}

impl ChunkTask {
    pub fn new(file: usize, range: ByteRange) -> Self {
        Self {
            file,
            range,
            attempt: 0,
            state: TaskState::Pending,
        }
    }

    /// Marks the task as handed to a worker.
    pub fn dispatch(&mut self) {
        debug_assert!(matches!(
            self.state,
            TaskState::Pending | TaskState::Retrying { .. }
        ));
        self.attempt += 1;
        self.state = TaskState::Dispatched;
    }

    pub fn succeed(&mut self) {
        self.state = TaskState::Succeeded;
    }

    /// Applies a failed attempt and returns the new state.
    pub fn fail(&mut self, kind: ErrorKind, policy: &RetryPolicy) -> TaskState {
        self.state = match policy.decide(self.attempt, kind) {
            RetryDecision::RetryAfter(delay) => TaskState::Retrying {
                attempt: self.attempt,
                delay,
            },
            RetryDecision::NoRetry if kind.is_transient() => TaskState::Failed(FailKind::Exhausted),
            RetryDecision::NoRetry => TaskState::Failed(FailKind::NotRetryable),
        };
        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(40),
        }
    }

    #[test]
    fn transient_failures_retry_then_exhaust() {
        let p = policy(3);
        let mut t = ChunkTask::new(0, ByteRange::new(0, 10));
        assert_eq!(t.state, TaskState::Pending);

        t.dispatch();
        assert_eq!(
            t.fail(ErrorKind::Connection, &p),
            TaskState::Retrying {
                attempt: 1,
                delay: Duration::from_millis(10)
            }
        );
        t.dispatch();
        assert_eq!(
            t.fail(ErrorKind::Truncated, &p),
            TaskState::Retrying {
                attempt: 2,
                delay: Duration::from_millis(20)
            }
        );
        t.dispatch();
        assert_eq!(t.attempt, 3);
        assert_eq!(
            t.fail(ErrorKind::Timeout, &p),
            TaskState::Failed(FailKind::Exhausted)
        );
    }

    #[test]
    fn permanent_error_fails_immediately() {
        let mut t = ChunkTask::new(1, ByteRange::new(0, 10));
        t.dispatch();
        assert_eq!(
            t.fail(ErrorKind::Other, &policy(5)),
            TaskState::Failed(FailKind::NotRetryable)
        );
    }

    #[test]
    fn success_after_retry() {
        let mut t = ChunkTask::new(0, ByteRange::new(5, 9));
        t.dispatch();
        t.fail(ErrorKind::Http5xx(502), &policy(5));
        t.dispatch();
        t.succeed();
        assert_eq!(t.state, TaskState::Succeeded);
        assert_eq!(t.attempt, 2);
    }
}
