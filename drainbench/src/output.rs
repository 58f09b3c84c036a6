use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use drainbench_core::Profile;
use serde_json::Value;

pub(crate) mod detail;
pub(crate) mod summary;

/// Detail and summary CSV locations for one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct OutputPaths {
    pub detail: PathBuf,
    pub summary: PathBuf,
}

impl OutputPaths {
    pub(crate) fn new(dir: &Path, profile: Profile, timestamp_ms: u128) -> Self {
        let prefix = file_prefix(profile);
        Self {
            detail: dir.join(format!("{prefix}-{timestamp_ms}.csv")),
            summary: dir.join(format!("{prefix}-summary-{timestamp_ms}.csv")),
        }
    }

    /// Paths stamped with the current epoch milliseconds. The stamp is bumped
    /// while either file already exists so two quick invocations never share
    /// a file.
    pub(crate) fn allocate(dir: &Path, profile: Profile) -> Self {
        let mut ts = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_millis());
        loop {
            let paths = Self::new(dir, profile, ts);
            if !paths.detail.exists() && !paths.summary.exists() {
                return paths;
            }
            ts += 1;
        }
    }
}

fn file_prefix(profile: Profile) -> &'static str {
    match profile {
        Profile::Flow => "flow-compare",
        Profile::Memory => "memory-compare",
    }
}

/// CSV cell text: null is empty, strings are written raw, everything else as JSON.
pub(crate) fn render_cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
