use crate::error::ReportError;
use crate::model::{BucketedSummary, SummaryStats, TimeSeriesPoint};
use crate::store::{AggregationFn, TimeSeriesReader};
use tokio_util::sync::CancellationToken;

/// Bucket width for store-side aggregation queries: one hour.
pub const BUCKET_WIDTH_MS: i64 = 3_600_000;

/// Per-series statistics in one linear pass. Callers filter out empty series
/// before calling; an empty slice would yield a NaN average.
pub fn summarize(points: &[TimeSeriesPoint]) -> SummaryStats {
    debug_assert!(!points.is_empty(), "summarize requires a non-empty series");

    let mut sum = 0.0;
    let mut min = points[0].value;
    let mut max = points[0].value;
    for point in points {
        sum += point.value;
        if point.value < min {
            min = point.value;
        }
        if point.value > max {
            max = point.value;
        }
    }

    SummaryStats {
        count: points.len(),
        average: sum / points.len() as f64,
        min,
        max,
    }
}

/// Coarse summaries computed by the store's own bucketed aggregation.
#[derive(Clone)]
pub struct StatisticsAggregator {
    reader: TimeSeriesReader,
}

impl StatisticsAggregator {
    pub fn new(reader: TimeSeriesReader) -> Self {
        Self { reader }
    }

    /// Three independent hourly-bucket queries (avg, max, min). Any query
    /// failure fails the whole operation; there is no partial summary.
    pub async fn bucketed_summary(
        &self,
        key: &str,
        start_ms: i64,
        end_ms: i64,
        token: &CancellationToken,
    ) -> Result<BucketedSummary, ReportError> {
        let (avg, _) = self
            .reader
            .range_aggregated(key, start_ms, end_ms, AggregationFn::Avg, BUCKET_WIDTH_MS, token)
            .await?;
        let (max, _) = self
            .reader
            .range_aggregated(key, start_ms, end_ms, AggregationFn::Max, BUCKET_WIDTH_MS, token)
            .await?;
        let (min, _) = self
            .reader
            .range_aggregated(key, start_ms, end_ms, AggregationFn::Min, BUCKET_WIDTH_MS, token)
            .await?;

        Ok(reduce_buckets(&avg, &max, &min))
    }
}

/// Collapse bucketed points into one summary: mean of the avg buckets, max of
/// the max buckets, min of the min buckets. Empty inputs reduce to 0.
pub fn reduce_buckets(
    avg: &[TimeSeriesPoint],
    max: &[TimeSeriesPoint],
    min: &[TimeSeriesPoint],
) -> BucketedSummary {
    let average = if avg.is_empty() {
        0.0
    } else {
        avg.iter().map(|p| p.value).sum::<f64>() / avg.len() as f64
    };
    let max = max.iter().map(|p| p.value).fold(f64::MIN, f64::max);
    let min = min.iter().map(|p| p.value).fold(f64::MAX, f64::min);

    BucketedSummary {
        average,
        max: if max == f64::MIN { 0.0 } else { max },
        min: if min == f64::MAX { 0.0 } else { min },
    }
}
