use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("{op} for {key} over [{start_ms}, {end_ms}] failed: {source}")]
    Query {
        op: &'static str,
        key: String,
        start_ms: i64,
        end_ms: i64,
        #[source]
        source: redis::RedisError,
    },

    #[error("chart render failed for series {key}: {reason}")]
    Render { key: String, reason: String },

    #[error("document assembly failed: {0}")]
    Assembly(String),

    #[error("report generation cancelled")]
    Cancelled,
}

impl ReportError {
    pub fn render(key: impl Into<String>, reason: impl ToString) -> Self {
        Self::Render {
            key: key.into(),
            reason: reason.to_string(),
        }
    }

    pub fn assembly(reason: impl ToString) -> Self {
        Self::Assembly(reason.to_string())
    }
}
