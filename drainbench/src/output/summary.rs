use std::io;
use std::path::Path;

use drainbench_core::SummaryRow;
use serde_json::Value;

use super::render_cell;

const HEADER: [&str; 8] = [
    "items",
    "mode",
    "runs",
    "avg_drain_ms",
    "avg_processing_ms",
    "avg_jobs_per_min",
    "errors",
    "retries",
];

pub(crate) fn write_file(path: &Path, rows: &[SummaryRow]) -> io::Result<()> {
    write(std::fs::File::create(path)?, rows)
}

pub(crate) fn write<W: io::Write>(inner: W, rows: &[SummaryRow]) -> io::Result<()> {
    let mut wtr = csv::Writer::from_writer(inner);
    wtr.write_record(HEADER)?;
    for row in rows {
        wtr.write_record([
            row.items.to_string(),
            row.mode.to_string(),
            row.runs.to_string(),
            render_cell(&Value::from(row.avg_drain_ms)),
            render_cell(&Value::from(row.avg_processing_ms)),
            render_cell(&Value::from(row.avg_jobs_per_min)),
            row.errors.to_string(),
            row.retries.to_string(),
        ])?;
    }
    wtr.flush()
}
