use std::fs::File;
use std::io;
use std::path::Path;

use drainbench_core::{
    FIELD_DRAIN_TIME_MS, FIELD_TOTAL_ERRORS, FIELD_TOTAL_RETRY_SCHEDULED, FIELD_TOTAL_SUCCESS,
    Profile, ResultSink, RunResult, SampleSummary,
};
use serde_json::Value;

use super::render_cell;

/// Report fields copied verbatim into the flow detail file.
const FLOW_REPORT_FIELDS: [&str; 22] = [
    "pending",
    "processing",
    "done",
    "error",
    "retryScheduled",
    "totalProcessed",
    "totalSuccess",
    "totalErrors",
    "totalRetryScheduled",
    "totalStuckRecovered",
    "avgProcessingMs",
    "totalElapsedMs",
    "jobsPerMinute",
    "runId",
    "scenario",
    "startedAtMs",
    "finishedAtMs",
    "drainTimeMs",
    "successCount",
    "failCount",
    "retryCount",
    "runDone",
];

#[derive(Debug, Clone)]
enum Cell {
    Run,
    Mode,
    Items,
    /// Value of `source` in the enriched record, or `default` when absent.
    Field { source: &'static str, default: Value },
}

#[derive(Debug, Clone)]
struct Column {
    header: &'static str,
    cell: Cell,
}

impl Column {
    fn field(header: &'static str, source: &'static str, default: Value) -> Self {
        Self {
            header,
            cell: Cell::Field { source, default },
        }
    }
}

fn leading_columns() -> Vec<Column> {
    vec![
        Column {
            header: "run",
            cell: Cell::Run,
        },
        Column {
            header: "mode",
            cell: Cell::Mode,
        },
        Column {
            header: "items",
            cell: Cell::Items,
        },
    ]
}

fn heap_columns() -> impl Iterator<Item = Column> {
    SampleSummary::FIELD_NAMES
        .iter()
        .map(|&name| Column::field(name, name, Value::from(0.0)))
}

/// Column layout for a profile. The memory layout always carries the heap
/// columns; the flow layout appends them only when sampling is on.
fn columns(profile: Profile, sample_heap: bool) -> Vec<Column> {
    let mut cols = leading_columns();
    match profile {
        Profile::Flow => {
            cols.extend(
                FLOW_REPORT_FIELDS
                    .iter()
                    .map(|&name| Column::field(name, name, Value::Null)),
            );
            if sample_heap {
                cols.extend(heap_columns());
            }
        }
        Profile::Memory => {
            cols.push(Column::field("drain_ms", FIELD_DRAIN_TIME_MS, Value::from(0)));
            cols.extend(heap_columns());
            cols.push(Column::field("success_count", FIELD_TOTAL_SUCCESS, Value::from(0)));
            cols.push(Column::field("error_count", FIELD_TOTAL_ERRORS, Value::from(0)));
            cols.push(Column::field(
                "retry_count",
                FIELD_TOTAL_RETRY_SCHEDULED,
                Value::from(0),
            ));
        }
    }
    cols
}

/// Streams one CSV row per finished run, flushing after each so a later
/// failure leaves every completed run on disk.
pub(crate) struct DetailWriter<W: io::Write> {
    writer: csv::Writer<W>,
    columns: Vec<Column>,
}

impl DetailWriter<File> {
    pub(crate) fn create(path: &Path, profile: Profile, sample_heap: bool) -> io::Result<Self> {
        Self::from_writer(File::create(path)?, profile, sample_heap)
    }
}

impl<W: io::Write> DetailWriter<W> {
    pub(crate) fn from_writer(inner: W, profile: Profile, sample_heap: bool) -> io::Result<Self> {
        let columns = columns(profile, sample_heap);
        let mut writer = csv::Writer::from_writer(inner);
        writer.write_record(columns.iter().map(|c| c.header))?;
        writer.flush()?;
        Ok(Self { writer, columns })
    }

    fn row(&self, result: &RunResult) -> Vec<String> {
        let record = result.record();
        self.columns
            .iter()
            .map(|col| match &col.cell {
                Cell::Run => result.run.to_string(),
                Cell::Mode => result.mode.to_string(),
                Cell::Items => result.items.to_string(),
                Cell::Field { source, default } => {
                    render_cell(record.get(*source).unwrap_or(default))
                }
            })
            .collect()
    }

    #[cfg(test)]
    fn into_inner(self) -> io::Result<W> {
        self.writer.into_inner().map_err(csv::IntoInnerError::into_error)
    }
}

impl<W: io::Write> ResultSink for DetailWriter<W> {
    fn record(&mut self, result: &RunResult) -> io::Result<()> {
        let row = self.row(result);
        self.writer.write_record(&row)?;
        self.writer.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use drainbench_core::{Mode, StatusReport};
    use serde_json::json;

    fn report(value: Value) -> StatusReport {
        match value {
            Value::Object(fields) => StatusReport::new(fields),
            other => panic!("expected an object, got {other}"),
        }
    }

    fn written(profile: Profile, sample_heap: bool, results: &[RunResult]) -> Vec<String> {
        let mut writer = match DetailWriter::from_writer(Vec::new(), profile, sample_heap) {
            Ok(w) => w,
            Err(err) => panic!("create writer: {err}"),
        };
        for r in results {
            if let Err(err) = writer.record(r) {
                panic!("record row: {err}");
            }
        }
        let bytes = match writer.into_inner() {
            Ok(b) => b,
            Err(err) => panic!("into_inner: {err}"),
        };
        String::from_utf8_lossy(&bytes)
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn flow_rows_copy_report_fields_and_blank_missing_ones() {
        let result = RunResult {
            items: 100,
            mode: Mode::Sync,
            run: 2,
            report: report(json!({
                "pending": 0,
                "processing": 0,
                "done": 100,
                "scenario": "retry, then succeed",
                "avgProcessingMs": 12.5,
                "runDone": true,
                "runId": null,
                "unlisted": "ignored"
            })),
            memory: None,
        };

        let lines = written(Profile::Flow, false, &[result]);
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("run,mode,items,pending,processing,done,error,"));
        assert!(lines[0].ends_with(",failCount,retryCount,runDone"));

        let cells: Vec<&str> = lines[1].split(',').collect();
        assert_eq!(&cells[..6], &["2", "sync", "100", "0", "0", "100"]);
        assert_eq!(cells[6], "", "missing field renders empty");
        assert!(lines[1].contains("\"retry, then succeed\""));
        assert!(lines[1].contains(",12.5,"));
        assert!(lines[1].ends_with(",true"));
        assert!(!lines[1].contains("ignored"));
    }

    #[test]
    fn memory_rows_map_counters_and_default_heap_columns() {
        let result = RunResult {
            items: 250,
            mode: Mode::AsyncAll,
            run: 1,
            report: report(json!({
                "drainTimeMs": 840,
                "totalSuccess": 248,
                "totalErrors": 2,
            })),
            memory: Some(SampleSummary::default()),
        };

        let lines = written(Profile::Memory, true, &[result]);
        assert_eq!(
            lines[0],
            "run,mode,items,drain_ms,heap_used_min_mb,heap_used_max_mb,heap_used_avg_mb,\
             heap_used_p95_mb,heap_used_p99_mb,heap_max_mb,heap_committed_min_mb,\
             heap_committed_max_mb,heap_committed_avg_mb,success_count,error_count,retry_count"
        );
        assert_eq!(
            lines[1],
            "1,async-all,250,840,0.0,0.0,0.0,0.0,0.0,0.0,0.0,0.0,0.0,248,2,0"
        );
    }

    #[test]
    fn memory_rows_carry_heap_statistics() {
        let summary = SampleSummary {
            samples: 3,
            heap_used_min_mb: 64.0,
            heap_used_max_mb: 96.5,
            heap_used_avg_mb: 80.25,
            heap_used_p95_mb: 96.5,
            heap_used_p99_mb: 96.5,
            heap_max_mb: 4096.0,
            heap_committed_min_mb: 96.0,
            heap_committed_max_mb: 144.75,
            heap_committed_avg_mb: 120.38,
        };
        let result = RunResult {
            items: 10,
            mode: Mode::Async,
            run: 1,
            report: report(json!({ "drainTimeMs": 5 })),
            memory: Some(summary),
        };

        let lines = written(Profile::Memory, true, &[result]);
        assert_eq!(
            lines[1],
            "1,async,10,5,64.0,96.5,80.25,96.5,96.5,4096.0,96.0,144.75,120.38,0,0,0"
        );
    }

    #[test]
    fn flow_rows_append_heap_columns_when_sampling() {
        let summary = SampleSummary {
            samples: 2,
            heap_used_min_mb: 80.0,
            heap_used_max_mb: 99.5,
            heap_used_avg_mb: 89.75,
            heap_used_p95_mb: 99.5,
            heap_used_p99_mb: 99.5,
            heap_max_mb: 4096.0,
            heap_committed_min_mb: 120.0,
            heap_committed_max_mb: 149.25,
            heap_committed_avg_mb: 134.63,
        };
        let result = RunResult {
            items: 100,
            mode: Mode::Async,
            run: 1,
            report: report(json!({ "runDone": true })),
            memory: Some(summary),
        };

        let lines = written(Profile::Flow, true, std::slice::from_ref(&result));
        assert!(
            lines[0].ends_with(
                ",runDone,heap_used_min_mb,heap_used_max_mb,heap_used_avg_mb,\
                 heap_used_p95_mb,heap_used_p99_mb,heap_max_mb,heap_committed_min_mb,\
                 heap_committed_max_mb,heap_committed_avg_mb"
            ),
            "{}",
            lines[0]
        );
        assert!(
            lines[1].ends_with(",true,80.0,99.5,89.75,99.5,99.5,4096.0,120.0,149.25,134.63"),
            "{}",
            lines[1]
        );

        let plain = written(Profile::Flow, false, &[result]);
        assert!(!plain[0].contains("heap_"), "{}", plain[0]);
    }

    #[test]
    fn flow_heap_columns_default_when_no_samples() {
        let result = RunResult {
            items: 5,
            mode: Mode::Sync,
            run: 1,
            report: report(json!({})),
            memory: Some(SampleSummary::default()),
        };

        let lines = written(Profile::Flow, true, &[result]);
        assert!(
            lines[1].ends_with(",0.0,0.0,0.0,0.0,0.0,0.0,0.0,0.0,0.0"),
            "{}",
            lines[1]
        );
    }
}
