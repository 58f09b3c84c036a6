use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Flat key/value record, e.g. one detail row.
pub type Fields = Map<String, Value>;

pub const FIELD_PENDING: &str = "pending";
pub const FIELD_PROCESSING: &str = "processing";
pub const FIELD_RETRY_SCHEDULED: &str = "retryScheduled";

/// Snapshot returned by `GET /lab/report`.
///
/// Only the drain predicate fields are interpreted here; everything else is
/// carried through to the output untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatusReport(Fields);

impl StatusReport {
    #[must_use]
    pub fn new(fields: Fields) -> Self {
        Self(fields)
    }

    #[must_use]
    pub fn fields(&self) -> &Fields {
        &self.0
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Integer view of a field. Missing, null and non-numeric values count as zero.
    #[must_use]
    pub fn count(&self, key: &str) -> i64 {
        match self.0.get(key) {
            Some(Value::Number(n)) => n
                .as_i64()
                .or_else(|| n.as_f64().map(|f| f.trunc() as i64))
                .unwrap_or(0),
            _ => 0,
        }
    }

    /// Float view of a field. Missing, null and non-numeric values count as zero.
    #[must_use]
    pub fn number(&self, key: &str) -> f64 {
        match self.0.get(key) {
            Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
            _ => 0.0,
        }
    }

    #[must_use]
    pub fn pending(&self) -> i64 {
        self.count(FIELD_PENDING)
    }

    #[must_use]
    pub fn processing(&self) -> i64 {
        self.count(FIELD_PROCESSING)
    }

    #[must_use]
    pub fn retry_scheduled(&self) -> i64 {
        self.count(FIELD_RETRY_SCHEDULED)
    }

    /// No pending, in-flight or retry-scheduled work remains.
    #[must_use]
    pub fn is_drained(&self) -> bool {
        self.pending() == 0 && self.processing() == 0 && self.retry_scheduled() == 0
    }
}

impl From<Fields> for StatusReport {
    fn from(fields: Fields) -> Self {
        Self(fields)
    }
}
