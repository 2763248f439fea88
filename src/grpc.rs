use crate::error::ReportError;
use crate::model::ReportRequest;
use crate::pipeline::ReportPipeline;
use crate::status::{ReportState, ReportStatusStore};
use anyhow::Result;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tonic::{transport::Server, Request, Response, Status};
use tonic_health::server::health_reporter;
use uuid::Uuid;

pub mod proto {
    tonic::include_proto!("report.v1");
}

use proto::report_generator_server::{ReportGenerator, ReportGeneratorServer};
use proto::{
    GenerateReportRequest, GenerateReportResponse, GetReportStatusRequest,
    GetReportStatusResponse, ReportStatus,
};

#[derive(Clone)]
pub struct ReportService {
    pipeline: ReportPipeline,
    statuses: Arc<ReportStatusStore>,
    request_timeout: Duration,
}

impl ReportService {
    pub fn new(
        pipeline: ReportPipeline,
        statuses: Arc<ReportStatusStore>,
        request_timeout: Duration,
    ) -> Self {
        Self {
            pipeline,
            statuses,
            request_timeout,
        }
    }
}

fn parse_request(req: GenerateReportRequest) -> Result<ReportRequest, ReportError> {
    let start = parse_bound("start_time", &req.start_time)?;
    let end = parse_bound("end_time", &req.end_time)?;

    Ok(ReportRequest {
        report_type: req.report_type,
        filters: req.filters.into_iter().collect::<BTreeMap<_, _>>(),
        metrics: req.metrics,
        start,
        end,
    })
}

fn parse_bound(field: &str, raw: &str) -> Result<DateTime<Utc>, ReportError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|err| ReportError::InvalidArgument(format!("invalid {field} {raw:?}: {err}")))
}

fn success_response(report_id: String, artifact: crate::model::ReportArtifact) -> GenerateReportResponse {
    GenerateReportResponse {
        report_id,
        pdf_data: artifact.document,
        filename: artifact.filename,
        success: true,
        error_message: String::new(),
    }
}

fn failure_response(report_id: String, err: &ReportError) -> GenerateReportResponse {
    GenerateReportResponse {
        report_id,
        pdf_data: Vec::new(),
        filename: String::new(),
        success: false,
        error_message: err.to_string(),
    }
}

fn to_proto_status(state: ReportState) -> ReportStatus {
    match state {
        ReportState::Pending => ReportStatus::Pending,
        ReportState::Completed => ReportStatus::Completed,
        ReportState::Failed => ReportStatus::Failed,
    }
}

#[tonic::async_trait]
impl ReportGenerator for ReportService {
    async fn generate_report(
        &self,
        request: Request<GenerateReportRequest>,
    ) -> Result<Response<GenerateReportResponse>, Status> {
        // Malformed time bounds fail before any store access.
        let req = parse_request(request.into_inner())
            .map_err(|err| Status::invalid_argument(err.to_string()))?;

        let report_id = Uuid::new_v4().to_string();
        self.statuses.mark_pending(&report_id).await;

        let token = CancellationToken::new();
        let timeout_guard = {
            let token = token.clone();
            let timeout = self.request_timeout;
            tokio::spawn(async move {
                tokio::time::sleep(timeout).await;
                token.cancel();
            })
        };
        let outcome = self.pipeline.generate(&req, &token).await;
        timeout_guard.abort();

        match outcome {
            Ok(artifact) => {
                self.statuses
                    .mark_completed(&report_id, &artifact.filename)
                    .await;
                tracing::info!(
                    report_id = %report_id,
                    filename = %artifact.filename,
                    bytes = artifact.document.len(),
                    "report generated"
                );
                Ok(Response::new(success_response(report_id, artifact)))
            }
            Err(err) => {
                self.statuses.mark_failed(&report_id, &err.to_string()).await;
                tracing::error!(report_id = %report_id, error = %err, "report generation failed");
                Ok(Response::new(failure_response(report_id, &err)))
            }
        }
    }

    async fn get_report_status(
        &self,
        request: Request<GetReportStatusRequest>,
    ) -> Result<Response<GetReportStatusResponse>, Status> {
        let req = request.into_inner();
        match self.statuses.get(&req.report_id).await {
            Some(record) => Ok(Response::new(GetReportStatusResponse {
                report_id: record.report_id,
                status: to_proto_status(record.state) as i32,
                error_message: record.error_message.unwrap_or_default(),
                filename: record.filename.unwrap_or_default(),
            })),
            None => Err(Status::not_found(format!(
                "unknown report {}",
                req.report_id
            ))),
        }
    }
}

pub async fn serve(addr: SocketAddr, service: ReportService) -> Result<()> {
    let (mut health_reporter, health_service) = health_reporter();
    health_reporter
        .set_serving::<ReportGeneratorServer<ReportService>>()
        .await;

    Server::builder()
        .add_service(health_service)
        .add_service(ReportGeneratorServer::new(service))
        .serve_with_shutdown(addr, async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown signal received");
        })
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chart::PlottersChartRenderer;
    use crate::model::{SeriesCollection, TimeSeriesPoint};
    use crate::report::TABLE_ROW_CAP;
    use crate::store::{FetchOutcome, SeriesSource};

    struct FailingSource;

    #[async_trait::async_trait]
    impl SeriesSource for FailingSource {
        async fn fetch(
            &self,
            _filters: &BTreeMap<String, String>,
            start_ms: i64,
            end_ms: i64,
            _token: &CancellationToken,
        ) -> Result<FetchOutcome, ReportError> {
            Err(ReportError::Query {
                op: "TS.MRANGE",
                key: "<multi>".to_string(),
                start_ms,
                end_ms,
                source: redis::RedisError::from((
                    redis::ErrorKind::IoError,
                    "connection refused",
                )),
            })
        }
    }

    struct FixedSource(SeriesCollection);

    #[async_trait::async_trait]
    impl SeriesSource for FixedSource {
        async fn fetch(
            &self,
            _filters: &BTreeMap<String, String>,
            _start_ms: i64,
            _end_ms: i64,
            _token: &CancellationToken,
        ) -> Result<FetchOutcome, ReportError> {
            Ok(FetchOutcome {
                collection: self.0.clone(),
                issues: Vec::new(),
            })
        }
    }

    fn service_with(source: Arc<dyn SeriesSource>) -> (ReportService, Arc<ReportStatusStore>) {
        let pipeline =
            ReportPipeline::new(source, Arc::new(PlottersChartRenderer), TABLE_ROW_CAP);
        let statuses = Arc::new(ReportStatusStore::new());
        let service = ReportService::new(pipeline, statuses.clone(), Duration::from_secs(5));
        (service, statuses)
    }

    fn wire_request(start: &str, end: &str) -> GenerateReportRequest {
        let mut filters = std::collections::HashMap::new();
        filters.insert("region".to_string(), "us-east".to_string());
        GenerateReportRequest {
            report_type: "daily".to_string(),
            filters,
            metrics: vec!["cpu_usage".to_string()],
            start_time: start.to_string(),
            end_time: end.to_string(),
        }
    }

    #[test]
    fn parses_rfc3339_bounds() {
        let req = parse_request(wire_request("2024-01-01T00:00:00Z", "2024-01-02T00:00:00Z"))
            .expect("parse");
        assert_eq!(req.start_ms(), 1_704_067_200_000);
        assert_eq!(req.end_ms(), 1_704_153_600_000);
        assert_eq!(req.filters.get("region").map(String::as_str), Some("us-east"));
    }

    #[test]
    fn offset_timestamps_normalize_to_utc() {
        let req = parse_request(wire_request(
            "2024-01-01T02:00:00+02:00",
            "2024-01-02T00:00:00Z",
        ))
        .expect("parse");
        assert_eq!(req.start_ms(), 1_704_067_200_000);
    }

    #[test]
    fn malformed_start_time_is_invalid_argument() {
        let err = parse_request(wire_request("yesterday", "2024-01-02T00:00:00Z")).unwrap_err();
        assert!(matches!(err, ReportError::InvalidArgument(_)));
        assert!(err.to_string().contains("start_time"));
    }

    #[test]
    fn malformed_end_time_is_invalid_argument() {
        let err = parse_request(wire_request("2024-01-01T00:00:00Z", "")).unwrap_err();
        assert!(matches!(err, ReportError::InvalidArgument(_)));
    }

    #[test]
    fn pipeline_failure_maps_to_unsuccessful_body() {
        let err = ReportError::assembly("pdf backend unavailable");
        let resp = failure_response("r-1".to_string(), &err);
        assert!(!resp.success);
        assert!(resp.pdf_data.is_empty());
        assert!(resp.filename.is_empty());
        assert!(resp.error_message.contains("pdf backend unavailable"));
    }

    #[tokio::test]
    async fn store_failure_is_an_unsuccessful_response_not_a_grpc_error() {
        let (service, statuses) = service_with(Arc::new(FailingSource));
        let resp = service
            .generate_report(Request::new(wire_request(
                "2024-01-01T00:00:00Z",
                "2024-01-02T00:00:00Z",
            )))
            .await
            .expect("body-level failure, not a status")
            .into_inner();

        assert!(!resp.success);
        assert!(resp.pdf_data.is_empty());
        assert!(resp.filename.is_empty());
        assert!(resp.error_message.contains("TS.MRANGE"));

        let record = statuses.get(&resp.report_id).await.expect("record");
        assert_eq!(record.state, ReportState::Failed);
        assert_eq!(record.error_message.as_deref(), Some(resp.error_message.as_str()));
    }

    #[tokio::test]
    async fn generated_report_completes_with_pdf_payload() {
        let mut collection = SeriesCollection::new();
        collection.insert(
            "cpu_usage".to_string(),
            vec![
                TimeSeriesPoint::new(1_704_067_200_000, 10.0, BTreeMap::new()),
                TimeSeriesPoint::new(1_704_070_800_000, 20.0, BTreeMap::new()),
            ],
        );

        let (service, statuses) = service_with(Arc::new(FixedSource(collection)));
        let resp = service
            .generate_report(Request::new(wire_request(
                "2024-01-01T00:00:00Z",
                "2024-01-02T00:00:00Z",
            )))
            .await
            .expect("response")
            .into_inner();

        assert!(resp.success);
        assert!(resp.pdf_data.starts_with(b"%PDF-"));
        assert!(resp.filename.starts_with("report_daily_"));
        assert!(resp.filename.ends_with(".pdf"));

        let record = statuses.get(&resp.report_id).await.expect("record");
        assert_eq!(record.state, ReportState::Completed);
        assert_eq!(record.filename.as_deref(), Some(resp.filename.as_str()));
    }

    #[test]
    fn artifact_maps_to_successful_body() {
        let artifact = crate::model::ReportArtifact {
            document: vec![0x25, 0x50, 0x44, 0x46],
            filename: "report_daily_20240101_000000.pdf".to_string(),
        };
        let resp = success_response("r-2".to_string(), artifact);
        assert!(resp.success);
        assert!(resp.error_message.is_empty());
        assert_eq!(resp.filename, "report_daily_20240101_000000.pdf");
        assert_eq!(resp.pdf_data, b"%PDF".to_vec());
    }
}
