use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// A single sample decoded from the store. Immutable once constructed;
/// labels are carried verbatim from the series entry that owned the point.
#[derive(Clone, Debug, PartialEq)]
pub struct TimeSeriesPoint {
    pub timestamp_ms: i64,
    pub value: f64,
    pub labels: BTreeMap<String, String>,
}

impl TimeSeriesPoint {
    pub fn new(timestamp_ms: i64, value: f64, labels: BTreeMap<String, String>) -> Self {
        Self {
            timestamp_ms,
            value,
            labels,
        }
    }
}

/// Series keyed by name, in key order. Point order is whatever the store
/// returned; sorting happens in chart preparation.
pub type SeriesCollection = BTreeMap<String, Vec<TimeSeriesPoint>>;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SummaryStats {
    pub count: usize,
    pub average: f64,
    pub min: f64,
    pub max: f64,
}

/// Coarse per-key summary computed from store-side hourly buckets.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BucketedSummary {
    pub average: f64,
    pub max: f64,
    pub min: f64,
}

#[derive(Clone, Debug)]
pub struct ReportRequest {
    pub report_type: String,
    pub filters: BTreeMap<String, String>,
    pub metrics: Vec<String>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl ReportRequest {
    pub fn start_ms(&self) -> i64 {
        self.start.timestamp_millis()
    }

    pub fn end_ms(&self) -> i64 {
        self.end.timestamp_millis()
    }
}

/// Finished report: the serialized document plus its suggested filename.
#[derive(Clone, Debug)]
pub struct ReportArtifact {
    pub document: Vec<u8>,
    pub filename: String,
}
