use std::time::Duration;

use serde_json::Value;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::sleep;

use crate::aggregate::round2;
use crate::client::{HeapMetric, HeapMetrics};
use crate::report::Fields;

const BYTES_PER_MB: f64 = 1024.0;

/// Raw heap observations (bytes) collected during one run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SampleSeries {
    pub used: Vec<f64>,
    pub max: Vec<f64>,
    pub committed: Vec<f64>,
}

impl SampleSeries {
    pub fn push(&mut self, metric: HeapMetric, value: f64) {
        match metric {
            HeapMetric::Used => self.used.push(value),
            HeapMetric::Max => self.max.push(value),
            HeapMetric::Committed => self.committed.push(value),
        }
    }

    /// Reduces the series to MiB statistics. An empty "used" series yields an empty summary.
    #[must_use]
    pub fn summarize(&self) -> SampleSummary {
        if self.used.is_empty() {
            return SampleSummary::default();
        }

        let mut used = to_mb(&self.used);
        used.sort_by(f64::total_cmp);
        let committed = to_mb(&self.committed);

        let used_max = round2(max(&used));
        let (p95, p99) = if used.len() >= 2 {
            (
                round2(nearest_rank(&used, 0.95).unwrap_or_default()),
                round2(nearest_rank(&used, 0.99).unwrap_or_default()),
            )
        } else {
            (used_max, used_max)
        };

        let heap_max_mb = if self.max.is_empty() {
            0.0
        } else {
            round2(max(&self.max) / BYTES_PER_MB / BYTES_PER_MB)
        };

        let (committed_min, committed_max, committed_avg) = if committed.is_empty() {
            (0.0, 0.0, 0.0)
        } else {
            (
                round2(min(&committed)),
                round2(max(&committed)),
                round2(mean(&committed)),
            )
        };

        SampleSummary {
            samples: used.len(),
            heap_used_min_mb: round2(min(&used)),
            heap_used_max_mb: used_max,
            heap_used_avg_mb: round2(mean(&used)),
            heap_used_p95_mb: p95,
            heap_used_p99_mb: p99,
            heap_max_mb,
            heap_committed_min_mb: committed_min,
            heap_committed_max_mb: committed_max,
            heap_committed_avg_mb: committed_avg,
        }
    }
}

/// Heap statistics for one run, in MiB rounded to 2 decimals.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SampleSummary {
    /// Number of "used" samples the summary was computed from.
    pub samples: usize,
    pub heap_used_min_mb: f64,
    pub heap_used_max_mb: f64,
    pub heap_used_avg_mb: f64,
    pub heap_used_p95_mb: f64,
    pub heap_used_p99_mb: f64,
    pub heap_max_mb: f64,
    pub heap_committed_min_mb: f64,
    pub heap_committed_max_mb: f64,
    pub heap_committed_avg_mb: f64,
}

impl SampleSummary {
    pub const FIELD_NAMES: [&'static str; 9] = [
        "heap_used_min_mb",
        "heap_used_max_mb",
        "heap_used_avg_mb",
        "heap_used_p95_mb",
        "heap_used_p99_mb",
        "heap_max_mb",
        "heap_committed_min_mb",
        "heap_committed_max_mb",
        "heap_committed_avg_mb",
    ];

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples == 0
    }

    fn values(&self) -> [f64; 9] {
        [
            self.heap_used_min_mb,
            self.heap_used_max_mb,
            self.heap_used_avg_mb,
            self.heap_used_p95_mb,
            self.heap_used_p99_mb,
            self.heap_max_mb,
            self.heap_committed_min_mb,
            self.heap_committed_max_mb,
            self.heap_committed_avg_mb,
        ]
    }

    /// Flat record form. Empty when no samples were collected.
    #[must_use]
    pub fn fields(&self) -> Fields {
        if self.is_empty() {
            return Fields::new();
        }
        Self::FIELD_NAMES
            .iter()
            .zip(self.values())
            .map(|(name, value)| ((*name).to_string(), Value::from(value)))
            .collect()
    }
}

/// Nearest-rank percentile: `sorted[floor(len * q)]`, no interpolation.
///
/// `sorted` must be ascending. The index is clamped to the last element.
#[must_use]
pub fn nearest_rank(sorted: &[f64], q: f64) -> Option<f64> {
    let last = sorted.len().checked_sub(1)?;
    let idx = ((sorted.len() as f64) * q).floor() as usize;
    sorted.get(idx.min(last)).copied()
}

fn to_mb(bytes: &[f64]) -> Vec<f64> {
    bytes
        .iter()
        .map(|b| b / BYTES_PER_MB / BYTES_PER_MB)
        .collect()
}

fn min(values: &[f64]) -> f64 {
    values.iter().copied().fold(f64::INFINITY, f64::min)
}

fn max(values: &[f64]) -> f64 {
    values.iter().copied().fold(f64::NEG_INFINITY, f64::max)
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Best-effort background heap sampler for a single run.
///
/// The sampling task owns its [`SampleSeries`] and hands it back only through
/// its join result, so nothing is shared while it runs.
#[derive(Debug)]
pub struct HeapSampler {
    stop_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<SampleSeries>>,
    series: Option<SampleSeries>,
}

impl HeapSampler {
    /// Spawns the sampling loop. Must be called from within a tokio runtime.
    pub fn start<M: HeapMetrics>(source: M, interval: Duration) -> Self {
        let (stop_tx, stop_rx) = oneshot::channel();
        let task = tokio::spawn(sample_loop(source, interval, stop_rx));

        Self {
            stop_tx: Some(stop_tx),
            task: Some(task),
            series: None,
        }
    }

    /// Asks the loop to finish after its current tick. Never blocks.
    pub fn stop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
    }

    /// Waits up to `grace` for the loop to finish and keeps its samples.
    ///
    /// Returns `false` if the loop had to be abandoned; its samples are dropped
    /// and [`HeapSampler::stats`] reports an empty summary.
    pub async fn join(&mut self, grace: Duration) -> bool {
        let Some(mut task) = self.task.take() else {
            return self.series.is_some();
        };

        match tokio::time::timeout(grace, &mut task).await {
            Ok(Ok(series)) => {
                tracing::debug!(samples = series.used.len(), "heap sampler joined");
                self.series = Some(series);
                true
            }
            Ok(Err(err)) => {
                tracing::warn!(%err, "heap sampler task failed");
                false
            }
            Err(_) => {
                task.abort();
                tracing::warn!(
                    grace_ms = grace.as_millis() as u64,
                    "heap sampler did not stop in time; samples discarded"
                );
                false
            }
        }
    }

    /// Summary of the joined series. Safe to call with zero samples.
    #[must_use]
    pub fn stats(&self) -> SampleSummary {
        self.series
            .as_ref()
            .map(SampleSeries::summarize)
            .unwrap_or_default()
    }
}

impl Drop for HeapSampler {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn sample_loop<M: HeapMetrics>(
    source: M,
    interval: Duration,
    mut stop_rx: oneshot::Receiver<()>,
) -> SampleSeries {
    let mut series = SampleSeries::default();

    loop {
        for metric in HeapMetric::ALL {
            match source.heap_metric(metric).await {
                Ok(Some(value)) => series.push(metric, value),
                Ok(None) => tracing::trace!(%metric, "no heap sample this tick"),
                Err(err) => tracing::trace!(%metric, %err, "heap sample fetch failed"),
            }
        }

        // A dropped sender also ends the loop.
        tokio::select! {
            _ = &mut stop_rx => break,
            () = sleep(interval) => {}
        }
    }

    series
}
