pub mod decode;
mod reader;

pub use decode::DecodeIssue;
pub use reader::{filter_expression, AggregationFn, FetchOutcome, SeriesSource, TimeSeriesReader};
