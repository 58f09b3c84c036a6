#![forbid(unsafe_code)]

mod aggregate;
mod client;
mod error;
mod orchestrator;
mod plan;
mod poll;
mod report;
mod sampler;

pub use aggregate::{
    AggregateRow, FIELD_AVG_PROCESSING_MS, FIELD_DRAIN_TIME_MS, FIELD_JOBS_PER_MINUTE,
    FIELD_TOTAL_ERRORS, FIELD_TOTAL_RETRY_SCHEDULED, FIELD_TOTAL_SUCCESS, Rollup, RunResult,
    SummaryRow, merge_fields, summarize_runs,
};
pub use client::{ControlClient, HeapMetric, HeapMetrics, LabControl, Phase, ReportSource};
pub use error::{Error, Result};
pub use orchestrator::{Orchestrator, ResultSink};
pub use plan::{
    ConfigError, DEFAULT_BASE_URL, DEFAULT_ITEMS_LIST, DEFAULT_ITEMS_STEP,
    DEFAULT_POLL_INTERVAL_MS, DEFAULT_RUNS, DEFAULT_SAMPLER_INTERVAL_MS, DEFAULT_TIMEOUT_MS, Mode,
    PlanInputs, Profile, RunPlan, items_range, parse_items_list, parse_modes,
};
pub use poll::CompletionPoller;
pub use report::{Fields, StatusReport};
pub use sampler::{HeapSampler, SampleSeries, SampleSummary, nearest_rank};
