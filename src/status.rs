//! In-memory report status tracking.
//!
//! Process-local, not durable: a restart forgets all reports. Generation is
//! synchronous today, so records move pending -> completed/failed within one
//! request, but the transitions are real and observable concurrently.
//!
//! The store is bounded: once it holds more than its capacity, the least
//! recently updated record is evicted, so status memory stays constant no
//! matter how many reports the server has generated.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;

/// Default record capacity; evicted reports answer NOT_FOUND afterwards.
pub const DEFAULT_MAX_RECORDS: usize = 1024;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReportState {
    Pending,
    Completed,
    Failed,
}

#[derive(Clone, Debug)]
pub struct StatusRecord {
    pub report_id: String,
    pub state: ReportState,
    pub error_message: Option<String>,
    pub filename: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    // Monotonic update order; `updated_at` alone can tie at clock resolution.
    seq: u64,
}

pub struct ReportStatusStore {
    records: RwLock<HashMap<String, StatusRecord>>,
    max_records: usize,
    seq: AtomicU64,
}

impl Default for ReportStatusStore {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_MAX_RECORDS)
    }
}

impl ReportStatusStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(max_records: usize) -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            max_records: max_records.max(1),
            seq: AtomicU64::new(0),
        }
    }

    pub async fn mark_pending(&self, report_id: &str) {
        let now = Utc::now();
        let record = StatusRecord {
            report_id: report_id.to_string(),
            state: ReportState::Pending,
            error_message: None,
            filename: None,
            created_at: now,
            updated_at: now,
            seq: self.next_seq(),
        };
        let mut records = self.records.write().await;
        records.insert(report_id.to_string(), record);
        while records.len() > self.max_records {
            let Some(oldest) = records
                .values()
                .min_by_key(|r| r.seq)
                .map(|r| r.report_id.clone())
            else {
                break;
            };
            records.remove(&oldest);
            tracing::debug!(report_id = %oldest, "evicted status record at capacity");
        }
    }

    pub async fn mark_completed(&self, report_id: &str, filename: &str) {
        self.transition(report_id, ReportState::Completed, None, Some(filename))
            .await;
    }

    pub async fn mark_failed(&self, report_id: &str, error_message: &str) {
        self.transition(report_id, ReportState::Failed, Some(error_message), None)
            .await;
    }

    pub async fn get(&self, report_id: &str) -> Option<StatusRecord> {
        self.records.read().await.get(report_id).cloned()
    }

    async fn transition(
        &self,
        report_id: &str,
        state: ReportState,
        error_message: Option<&str>,
        filename: Option<&str>,
    ) {
        let seq = self.next_seq();
        let mut records = self.records.write().await;
        match records.get_mut(report_id) {
            Some(record) => {
                record.state = state;
                record.error_message = error_message.map(str::to_string);
                record.filename = filename.map(str::to_string);
                record.updated_at = Utc::now();
                record.seq = seq;
            }
            None => {
                tracing::warn!(report_id, ?state, "status transition for unknown report");
            }
        }
    }

    fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::Relaxed)
    }
}
