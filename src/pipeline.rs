use crate::chart::ChartRenderer;
use crate::error::ReportError;
use crate::model::{ReportArtifact, ReportRequest};
use crate::report;
use crate::store::{FetchOutcome, SeriesSource};
use chrono::Utc;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Per-request report generation: fetch -> compose -> finalize. All working
/// state is allocated per call, so the pipeline is reentrant; concurrent
/// requests only share the multiplexed store connection.
#[derive(Clone)]
pub struct ReportPipeline {
    source: Arc<dyn SeriesSource>,
    renderer: Arc<dyn ChartRenderer>,
    row_cap: usize,
}

impl ReportPipeline {
    pub fn new(
        source: Arc<dyn SeriesSource>,
        renderer: Arc<dyn ChartRenderer>,
        row_cap: usize,
    ) -> Self {
        Self {
            source,
            renderer,
            row_cap,
        }
    }

    pub async fn generate(
        &self,
        request: &ReportRequest,
        token: &CancellationToken,
    ) -> Result<ReportArtifact, ReportError> {
        let FetchOutcome { collection, issues } = self
            .source
            .fetch(&request.filters, request.start_ms(), request.end_ms(), token)
            .await?;

        for issue in &issues {
            tracing::warn!(
                series = %issue.series,
                index = issue.index,
                field = issue.field,
                raw = %issue.raw,
                "lossy decode: unparseable field replaced with 0"
            );
        }
        tracing::debug!(series = collection.len(), "fetched series collection");

        if token.is_cancelled() {
            return Err(ReportError::Cancelled);
        }

        // Chart rasterization and PDF writing are CPU-bound; keep them off
        // the runtime threads.
        let generated_at = Utc::now();
        let owned_request = request.clone();
        let renderer = self.renderer.clone();
        let row_cap = self.row_cap;
        let (render_failures, document) = tokio::task::spawn_blocking(move || {
            let doc = report::compose(
                &owned_request,
                &collection,
                renderer.as_ref(),
                generated_at,
                row_cap,
            );
            report::render_pdf(&doc).map(|bytes| (doc.render_failures, bytes))
        })
        .await
        .map_err(ReportError::assembly)??;

        for (key, reason) in &render_failures {
            tracing::warn!(series = %key, reason = %reason, "chart render failed; detail page skipped");
        }

        let filename = format!(
            "report_{}_{}.pdf",
            request.report_type,
            generated_at.format("%Y%m%d_%H%M%S")
        );
        Ok(ReportArtifact { document, filename })
    }
}
