use std::time::Duration;

use tokio::time::{Instant, sleep};

use crate::client::ReportSource;
use crate::report::StatusReport;
use crate::{Error, Result, RunPlan};

/// Waits for the target to drain after a dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompletionPoller {
    pub interval: Duration,
    pub timeout: Duration,
}

impl CompletionPoller {
    #[must_use]
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }

    #[must_use]
    pub fn from_plan(plan: &RunPlan) -> Self {
        Self::new(plan.poll_interval, plan.timeout)
    }

    /// Fetches reports until one satisfies [`StatusReport::is_drained`].
    ///
    /// The first fetch happens immediately; `interval` is slept only between
    /// fetches. Fetch errors are returned as-is without retrying. Once more than
    /// `timeout` has elapsed since the first fetch, the next undrained report
    /// fails the poll with [`Error::PollTimeout`].
    pub async fn wait<S>(&self, source: &S) -> Result<StatusReport>
    where
        S: ReportSource + ?Sized,
    {
        let started = Instant::now();
        let mut polls = 0u64;

        loop {
            let report = source.report().await?;
            polls += 1;

            if report.is_drained() {
                tracing::debug!(
                    polls,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "target drained"
                );
                return Ok(report);
            }

            let elapsed = started.elapsed();
            if elapsed > self.timeout {
                return Err(Error::PollTimeout { elapsed });
            }

            tracing::debug!(
                pending = report.pending(),
                processing = report.processing(),
                retry_scheduled = report.retry_scheduled(),
                "waiting for drain"
            );
            sleep(self.interval).await;
        }
    }
}
