//! Waiting for platform tasks, with a bounded deadline and retry backoff.

use rand::Rng;
use std::time::{Duration, Instant};

use crate::config::RotatorConfig;
use crate::consts::MAX_RETRY_BACKOFF_MS;
use crate::error::PlatformError;
use crate::platform::{SnapshotService, TaskHandle, TaskState};

/// Timeout/poll/retry knobs for platform tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskPolicy {
    pub timeout: Duration,
    pub poll: Duration,
    pub retries: u32,
    pub backoff: Duration,
}

impl TaskPolicy {
    pub fn from_config(cfg: &RotatorConfig) -> Self {
        Self {
            timeout: cfg.task_timeout(),
            poll: cfg.poll_interval(),
            retries: cfg.retries,
            backoff: Duration::from_millis(cfg.retry_backoff_ms),
        }
    }

    /// Delay before retry number `attempt` (0-based): `backoff * 2^attempt`,
    /// capped, plus up to 50% random jitter.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let base_ms = self.backoff.as_millis().min(u128::from(u64::MAX)) as u64;
        let exp = base_ms
            .saturating_mul(1u64 << attempt.min(16))
            .min(MAX_RETRY_BACKOFF_MS);
        let jitter = if exp >= 2 {
            rand::thread_rng().gen_range(0..=exp / 2)
        } else {
            0
        };
        Duration::from_millis(exp + jitter)
    }
}

/// Poll `task` until it reaches a terminal state or `policy.timeout` elapses.
/// The first poll always happens, even with a zero timeout.
pub fn wait_for_task<S: SnapshotService + ?Sized>(
    service: &mut S,
    task: &TaskHandle,
    policy: &TaskPolicy,
) -> Result<(), PlatformError> {
    let started = Instant::now();
    loop {
        match service.task_state(task)? {
            TaskState::Success => return Ok(()),
            TaskState::Error(e) => return Err(e),
            TaskState::Queued | TaskState::Running => {}
        }

        let waited = started.elapsed();
        if waited >= policy.timeout {
            return Err(PlatformError::TaskTimeout {
                task: task.clone(),
                waited_ms: waited.as_millis() as u64,
            });
        }
        std::thread::sleep(policy.poll.min(policy.timeout - waited));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(backoff_ms: u64) -> TaskPolicy {
        TaskPolicy {
            timeout: Duration::from_millis(10),
            poll: Duration::from_millis(1),
            retries: 3,
            backoff: Duration::from_millis(backoff_ms),
        }
    }

    #[test]
    fn backoff_doubles_with_bounded_jitter() {
        let p = policy(100);
        for attempt in 0..4u32 {
            let base = 100u64 << attempt;
            let d = p.backoff_delay(attempt).as_millis() as u64;
            assert!(d >= base && d <= base + base / 2, "attempt={attempt} d={d}");
        }
    }

    #[test]
    fn backoff_is_capped() {
        let d = policy(50_000).backoff_delay(10).as_millis() as u64;
        assert!(d <= MAX_RETRY_BACKOFF_MS + MAX_RETRY_BACKOFF_MS / 2);
        assert_eq!(policy(0).backoff_delay(5), Duration::ZERO);
    }
}
