//! Cancellable repeating callback on the tokio runtime

use crate::error::{CacheError, Result};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// Invokes a callback every `period` until cancelled or dropped.
///
/// The first invocation happens one full period after scheduling.
pub struct RepeatingTimer {
    task: JoinHandle<()>,
    period: Duration,
}

impl RepeatingTimer {
    /// Schedule `callback` on the current tokio runtime
    pub fn schedule<F>(period: Duration, callback: F) -> Result<Self>
    where
        F: Fn() + Send + Sync + 'static,
    {
        if period.is_zero() {
            return Err(CacheError::Scheduler(
                "timer period must be non-zero".to_string(),
            ));
        }
        let runtime = Handle::try_current().map_err(|e| CacheError::Scheduler(e.to_string()))?;

        let task = runtime.spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                callback();
            }
        });

        Ok(Self { task, period })
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Stop future invocations. A callback already running is not interrupted.
    pub fn cancel(&self) {
        self.task.abort();
    }
}

impl Drop for RepeatingTimer {
    fn drop(&mut self) {
        self.task.abort();
    }
}
