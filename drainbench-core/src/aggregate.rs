use std::collections::BTreeMap;

use crate::plan::Mode;
use crate::report::{Fields, StatusReport};
use crate::sampler::SampleSummary;

pub const FIELD_DRAIN_TIME_MS: &str = "drainTimeMs";
pub const FIELD_AVG_PROCESSING_MS: &str = "avgProcessingMs";
pub const FIELD_JOBS_PER_MINUTE: &str = "jobsPerMinute";
pub const FIELD_TOTAL_ERRORS: &str = "totalErrors";
pub const FIELD_TOTAL_RETRY_SCHEDULED: &str = "totalRetryScheduled";
pub const FIELD_TOTAL_SUCCESS: &str = "totalSuccess";

/// Two-decimal rounding with exact ties going to the even neighbour.
pub(crate) fn round2(v: f64) -> f64 {
    (v * 100.0).round_ties_even() / 100.0
}

/// Ordered merge of two flat records. Keys present in both take `second`'s value.
#[must_use]
pub fn merge_fields(first: &Fields, second: &Fields) -> Fields {
    let mut merged = first.clone();
    for (key, value) in second {
        merged.insert(key.clone(), value.clone());
    }
    merged
}

/// Outcome of one (items, mode, repetition) iteration.
#[derive(Debug, Clone, PartialEq)]
pub struct RunResult {
    pub items: u64,
    pub mode: Mode,
    /// 1-based repetition index.
    pub run: u32,
    pub report: StatusReport,
    /// Present only when heap sampling was enabled.
    pub memory: Option<SampleSummary>,
}

impl RunResult {
    /// The drained report enriched with heap statistics.
    #[must_use]
    pub fn record(&self) -> Fields {
        match &self.memory {
            Some(summary) => merge_fields(self.report.fields(), &summary.fields()),
            None => self.report.fields().clone(),
        }
    }
}

/// Running sums for one (items, mode) group.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateRow {
    pub items: u64,
    pub mode: Mode,
    pub runs: u64,
    pub drain_ms: f64,
    pub processing_ms: f64,
    pub jobs_per_min: f64,
    pub errors: i64,
    pub retries: i64,
}

impl AggregateRow {
    fn new(items: u64, mode: Mode) -> Self {
        Self {
            items,
            mode,
            runs: 0,
            drain_ms: 0.0,
            processing_ms: 0.0,
            jobs_per_min: 0.0,
            errors: 0,
            retries: 0,
        }
    }

    pub fn add(&mut self, report: &StatusReport) {
        self.runs += 1;
        self.drain_ms += report.number(FIELD_DRAIN_TIME_MS);
        self.processing_ms += report.number(FIELD_AVG_PROCESSING_MS);
        self.jobs_per_min += report.number(FIELD_JOBS_PER_MINUTE);
        self.errors += report.count(FIELD_TOTAL_ERRORS);
        self.retries += report.count(FIELD_TOTAL_RETRY_SCHEDULED);
    }

    #[must_use]
    pub fn finish(&self) -> SummaryRow {
        let avg = |sum: f64| {
            if self.runs == 0 {
                sum
            } else {
                round2(sum / self.runs as f64)
            }
        };

        SummaryRow {
            items: self.items,
            mode: self.mode,
            runs: self.runs,
            avg_drain_ms: avg(self.drain_ms),
            avg_processing_ms: avg(self.processing_ms),
            avg_jobs_per_min: avg(self.jobs_per_min),
            errors: self.errors,
            retries: self.retries,
        }
    }
}

/// Finalized per-(items, mode) summary.
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryRow {
    pub items: u64,
    pub mode: Mode,
    pub runs: u64,
    pub avg_drain_ms: f64,
    pub avg_processing_ms: f64,
    pub avg_jobs_per_min: f64,
    /// Total across runs, not averaged.
    pub errors: i64,
    /// Total across runs, not averaged.
    pub retries: i64,
}

/// Cross-run rollup keyed by (items, mode name).
#[derive(Debug, Clone, Default)]
pub struct Rollup {
    groups: BTreeMap<(u64, &'static str), AggregateRow>,
}

impl Rollup {
    pub fn add(&mut self, result: &RunResult) {
        self.groups
            .entry((result.items, result.mode.as_str()))
            .or_insert_with(|| AggregateRow::new(result.items, result.mode))
            .add(&result.report);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Rows ordered by items ascending, then mode name.
    #[must_use]
    pub fn finish(&self) -> Vec<SummaryRow> {
        self.groups.values().map(AggregateRow::finish).collect()
    }
}

#[must_use]
pub fn summarize_runs<'a, I>(results: I) -> Vec<SummaryRow>
where
    I: IntoIterator<Item = &'a RunResult>,
{
    let mut rollup = Rollup::default();
    for result in results {
        rollup.add(result);
    }
    rollup.finish()
}
