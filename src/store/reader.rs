use crate::error::ReportError;
use crate::model::{SeriesCollection, TimeSeriesPoint};
use crate::store::decode::{self, DecodeIssue};
use redis::aio::ConnectionManager;
use std::collections::BTreeMap;
use tokio_util::sync::CancellationToken;

/// Store-side reducer for bucketed aggregation queries.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AggregationFn {
    Avg,
    Max,
    Min,
}

impl AggregationFn {
    fn as_str(self) -> &'static str {
        match self {
            AggregationFn::Avg => "avg",
            AggregationFn::Max => "max",
            AggregationFn::Min => "min",
        }
    }
}

/// Decoded multi-series fetch plus any lossy-decode diagnostics.
#[derive(Debug, Default)]
pub struct FetchOutcome {
    pub collection: SeriesCollection,
    pub issues: Vec<DecodeIssue>,
}

/// Fetch seam for the report pipeline, so request handling can be driven
/// without a live store.
#[async_trait::async_trait]
pub trait SeriesSource: Send + Sync {
    async fn fetch(
        &self,
        filters: &BTreeMap<String, String>,
        start_ms: i64,
        end_ms: i64,
        token: &CancellationToken,
    ) -> Result<FetchOutcome, ReportError>;
}

/// Read-only adapter over RedisTimeSeries. No retries here; the connection
/// manager multiplexes concurrently outstanding queries, and every query
/// races the request's cancellation token.
#[derive(Clone)]
pub struct TimeSeriesReader {
    conn: ConnectionManager,
}

impl TimeSeriesReader {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    /// TS.MRANGE over all series matching the conjunctive label filters.
    /// An empty filter set selects every series; zero matches decode to an
    /// empty collection.
    pub async fn fetch(
        &self,
        filters: &BTreeMap<String, String>,
        start_ms: i64,
        end_ms: i64,
        token: &CancellationToken,
    ) -> Result<FetchOutcome, ReportError> {
        let mut cmd = redis::cmd("TS.MRANGE");
        cmd.arg(start_ms).arg(end_ms);
        if let Some(expr) = filter_expression(filters) {
            cmd.arg("FILTER").arg(expr);
        }

        let reply = self
            .query(&cmd, "TS.MRANGE", "<multi>", start_ms, end_ms, token)
            .await?;
        let (collection, issues) = decode::decode_mrange(&reply);
        Ok(FetchOutcome { collection, issues })
    }

    /// TS.RANGE for a single key. The reply carries no labels, so the points
    /// come back with empty label maps.
    pub async fn fetch_one(
        &self,
        key: &str,
        start_ms: i64,
        end_ms: i64,
        token: &CancellationToken,
    ) -> Result<(Vec<TimeSeriesPoint>, Vec<DecodeIssue>), ReportError> {
        let mut cmd = redis::cmd("TS.RANGE");
        cmd.arg(key).arg(start_ms).arg(end_ms);

        let reply = self
            .query(&cmd, "TS.RANGE", key, start_ms, end_ms, token)
            .await?;
        Ok(decode::decode_range(key, &reply, &BTreeMap::new()))
    }

    /// TS.RANGE with a store-side AGGREGATION clause.
    pub async fn range_aggregated(
        &self,
        key: &str,
        start_ms: i64,
        end_ms: i64,
        agg: AggregationFn,
        bucket_width_ms: i64,
        token: &CancellationToken,
    ) -> Result<(Vec<TimeSeriesPoint>, Vec<DecodeIssue>), ReportError> {
        let mut cmd = redis::cmd("TS.RANGE");
        cmd.arg(key)
            .arg(start_ms)
            .arg(end_ms)
            .arg("AGGREGATION")
            .arg(agg.as_str())
            .arg(bucket_width_ms);

        let reply = self
            .query(&cmd, "TS.RANGE AGGREGATION", key, start_ms, end_ms, token)
            .await?;
        Ok(decode::decode_range(key, &reply, &BTreeMap::new()))
    }

    async fn query(
        &self,
        cmd: &redis::Cmd,
        op: &'static str,
        key: &str,
        start_ms: i64,
        end_ms: i64,
        token: &CancellationToken,
    ) -> Result<redis::Value, ReportError> {
        let mut conn = self.conn.clone();
        tokio::select! {
            _ = token.cancelled() => Err(ReportError::Cancelled),
            res = cmd.query_async::<_, redis::Value>(&mut conn) => {
                res.map_err(|source| ReportError::Query {
                    op,
                    key: key.to_string(),
                    start_ms,
                    end_ms,
                    source,
                })
            }
        }
    }
}

#[async_trait::async_trait]
impl SeriesSource for TimeSeriesReader {
    async fn fetch(
        &self,
        filters: &BTreeMap<String, String>,
        start_ms: i64,
        end_ms: i64,
        token: &CancellationToken,
    ) -> Result<FetchOutcome, ReportError> {
        TimeSeriesReader::fetch(self, filters, start_ms, end_ms, token).await
    }
}

/// Space-joined `label=value` conjunction, or None when no filters are given.
pub fn filter_expression(filters: &BTreeMap<String, String>) -> Option<String> {
    if filters.is_empty() {
        return None;
    }
    let expr = filters
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(" ");
    Some(expr)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_expression_joins_terms_in_key_order() {
        let mut filters = BTreeMap::new();
        filters.insert("region".to_string(), "us-east".to_string());
        filters.insert("env".to_string(), "prod".to_string());
        assert_eq!(
            filter_expression(&filters).as_deref(),
            Some("env=prod region=us-east")
        );
    }

    #[test]
    fn empty_filters_omit_the_clause() {
        assert_eq!(filter_expression(&BTreeMap::new()), None);
    }
}
