//! HTTP API (spec §6).
//!
//! Thin axum layer: handlers validate/dispatch through the Job Queue (C7)
//! or take a snapshot off a `JobHandle`; no business logic lives here
//! beyond request/response shaping. Every error response takes the uniform
//! shape in [`ErrorBody`].

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path as AxumPath, Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use futures::stream::Stream;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use sysinfo::{System, SystemExt};
use tokio_stream::wrappers::ReceiverStream;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::domain::job::{ExportRequest, Job, JobRequest, JobState, Stage};
use crate::error::{AppError, ErrorBody, ErrorCode};
use crate::events::poll_job;
use crate::pipeline::export::{presets, ExportPreset};
use crate::process::ProcessSupervisor;
use crate::queue::JobQueue;
use crate::shutdown;
use crate::validate::resolve_encoder_path;

pub struct AppState {
    pub queue: Arc<JobQueue>,
    pub config: Arc<Config>,
    pub supervisor: ProcessSupervisor,
    pub shutdown_notify: Arc<tokio::sync::Notify>,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/jobs", post(create_job).get(list_jobs))
        .route("/jobs/:id", get(get_job))
        .route("/jobs/:id/progress", get(job_progress))
        .route("/jobs/:id/events", get(job_events))
        .route("/jobs/:id/failure-details", get(job_failure_details))
        .route("/jobs/:id/cancel", post(cancel_job))
        .route("/jobs/:id/retry", post(retry_job))
        .route("/jobs/recent-artifacts", get(recent_artifacts))
        .route("/export/start", post(export_start))
        .route("/export/status/:id", get(export_status))
        .route("/export/cancel/:id", post(export_cancel))
        .route("/export/presets", get(export_presets))
        .route("/system/encoder/status", get(encoder_status))
        .route("/system/shutdown", post(system_shutdown))
        .route("/system/info", get(system_info))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Wraps [`AppError`] so it can be returned directly from a handler via `?`.
/// The second field is the correlation id to report on the error body, when
/// one is known at the point of failure (e.g. an existing job's, or a
/// client-supplied one on admission); `?`-converted errors carry `None`
/// since no job context is reachable from a bare `AppError`.
struct ApiError(AppError, Option<String>);

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        ApiError(err, None)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody::from_app_error(&self.0, self.1);
        (StatusCode::from_u16(body.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR), Json(body)).into_response()
    }
}

fn not_found(detail: impl Into<String>) -> Response {
    let body = ErrorBody {
        kind: "urn:aura#not_found".to_string(),
        title: "Not Found".to_string(),
        status: 404,
        detail: detail.into(),
        correlation_id: None,
    };
    (StatusCode::NOT_FOUND, Json(body)).into_response()
}

#[derive(Debug, Serialize)]
struct CreateJobResponse {
    #[serde(rename = "jobId")]
    job_id: String,
    status: JobState,
    stage: Stage,
    #[serde(rename = "correlationId")]
    correlation_id: String,
}

async fn create_job(
    State(state): State<Arc<AppState>>,
    Json(request): Json<JobRequest>,
) -> Result<(StatusCode, Json<CreateJobResponse>), ApiError> {
    let correlation_id = request.correlation_id.clone();
    let handle = state
        .queue
        .create_generation(request)
        .await
        .map_err(|e| ApiError(e, correlation_id))?;
    let job = handle.read().await;
    Ok((
        StatusCode::CREATED,
        Json(CreateJobResponse {
            job_id: job.id.clone(),
            status: job.state,
            stage: job.stage,
            correlation_id: job.correlation_id.clone(),
        }),
    ))
}

#[derive(Debug, Deserialize)]
struct PageQuery {
    limit: Option<usize>,
    offset: Option<usize>,
}

async fn list_jobs(State(state): State<Arc<AppState>>, Query(page): Query<PageQuery>) -> Json<Vec<Job>> {
    let offset = page.offset.unwrap_or(0);
    let limit = page.limit.unwrap_or(50);
    let handles = state.queue.list().await;
    let mut jobs = Vec::with_capacity(limit.min(handles.len().saturating_sub(offset)));
    for handle in handles.into_iter().skip(offset).take(limit) {
        jobs.push(handle.read().await.clone());
    }
    Json(jobs)
}

async fn get_job(State(state): State<Arc<AppState>>, AxumPath(id): AxumPath<String>) -> Response {
    match state.queue.get(&id).await {
        Some(handle) => Json(handle.read().await.clone()).into_response(),
        None => not_found(format!("no such job '{id}'")),
    }
}

#[derive(Debug, Serialize)]
struct ProgressView {
    status: JobState,
    progress: u8,
    #[serde(rename = "currentStage")]
    current_stage: Stage,
    #[serde(rename = "startedAt")]
    started_at: Option<DateTime<Utc>>,
    #[serde(rename = "completedAt")]
    completed_at: Option<DateTime<Utc>>,
}

async fn job_progress(State(state): State<Arc<AppState>>, AxumPath(id): AxumPath<String>) -> Response {
    match state.queue.get(&id).await {
        Some(handle) => {
            let job = handle.read().await;
            Json(ProgressView {
                status: job.state,
                progress: job.percent,
                current_stage: job.stage,
                started_at: job.started_at,
                completed_at: job.finished_at,
            })
            .into_response()
        }
        None => not_found(format!("no such job '{id}'")),
    }
}

async fn job_events(
    State(state): State<Arc<AppState>>,
    AxumPath(id): AxumPath<String>,
) -> Sse<impl Stream<Item = Result<Event, std::convert::Infallible>>> {
    let (tx, rx) = tokio::sync::mpsc::channel(32);
    let queue = state.queue.clone();
    let poll_interval = Duration::from_millis(state.config.event_poll_interval_ms);
    tokio::spawn(async move {
        poll_job(&queue, &id, poll_interval, tx).await;
    });
    let stream = ReceiverStream::new(rx).map(|event| {
        Ok(Event::default()
            .event(event.kind)
            .json_data(event.data)
            .unwrap_or_else(|_| Event::default().event("error").data("event serialization failed")))
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}

async fn job_failure_details(State(state): State<Arc<AppState>>, AxumPath(id): AxumPath<String>) -> Response {
    let Some(handle) = state.queue.get(&id).await else {
        return not_found(format!("no such job '{id}'"));
    };
    let job = handle.read().await;
    match &job.failure_details {
        Some(details) => Json(details.clone()).into_response(),
        None => ApiError(
            AppError::new(ErrorCode::EValidation, format!("job '{id}' has not failed")),
            Some(job.correlation_id.clone()),
        )
        .into_response(),
    }
}

async fn job_correlation_id(queue: &JobQueue, id: &str) -> Option<String> {
    let handle = queue.get(id).await?;
    let job = handle.read().await;
    Some(job.correlation_id.clone())
}

async fn cancel_job(State(state): State<Arc<AppState>>, AxumPath(id): AxumPath<String>) -> Result<StatusCode, ApiError> {
    let correlation_id = job_correlation_id(&state.queue, &id).await;
    state.queue.cancel(&id).await.map_err(|e| ApiError(e, correlation_id))?;
    Ok(StatusCode::ACCEPTED)
}

async fn retry_job(
    State(state): State<Arc<AppState>>,
    AxumPath(id): AxumPath<String>,
) -> Result<Json<CreateJobResponse>, ApiError> {
    let correlation_id = job_correlation_id(&state.queue, &id).await;
    let handle = state.queue.retry(&id).await.map_err(|e| ApiError(e, correlation_id))?;
    let job = handle.read().await;
    Ok(Json(CreateJobResponse {
        job_id: job.id.clone(),
        status: job.state,
        stage: job.stage,
        correlation_id: job.correlation_id.clone(),
    }))
}

#[derive(Debug, Deserialize)]
struct RecentQuery {
    limit: Option<usize>,
}

async fn recent_artifacts(
    State(state): State<Arc<AppState>>,
    Query(q): Query<RecentQuery>,
) -> Json<Vec<crate::artifacts::RecentArtifactEntry>> {
    Json(state.queue.recent_artifacts(q.limit.unwrap_or(20)).await)
}

async fn export_start(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ExportRequest>,
) -> Result<(StatusCode, Json<CreateJobResponse>), ApiError> {
    let correlation_id = request.correlation_id.clone();
    let handle = state
        .queue
        .create_export(request)
        .await
        .map_err(|e| ApiError(e, correlation_id))?;
    let job = handle.read().await;
    Ok((
        StatusCode::CREATED,
        Json(CreateJobResponse {
            job_id: job.id.clone(),
            status: job.state,
            stage: job.stage,
            correlation_id: job.correlation_id.clone(),
        }),
    ))
}

async fn export_status(State(state): State<Arc<AppState>>, AxumPath(id): AxumPath<String>) -> Response {
    job_progress(State(state), AxumPath(id)).await
}

async fn export_cancel(
    State(state): State<Arc<AppState>>,
    AxumPath(id): AxumPath<String>,
) -> Result<StatusCode, ApiError> {
    let correlation_id = job_correlation_id(&state.queue, &id).await;
    state.queue.cancel(&id).await.map_err(|e| ApiError(e, correlation_id))?;
    Ok(StatusCode::ACCEPTED)
}

async fn export_presets() -> Json<Vec<ExportPreset>> {
    Json(presets())
}

#[derive(Debug, Serialize)]
struct EncoderStatusView {
    present: bool,
    path: Option<String>,
    version_line: Option<String>,
    hwaccels: Vec<String>,
    message: Option<String>,
}

async fn encoder_status(State(state): State<Arc<AppState>>) -> Json<EncoderStatusView> {
    let config = state.config.clone();
    let view = tokio::task::spawn_blocking(move || probe_encoder(&config))
        .await
        .unwrap_or(EncoderStatusView {
            present: false,
            path: None,
            version_line: None,
            hwaccels: Vec::new(),
            message: Some("encoder probe task panicked".to_string()),
        });
    Json(view)
}

fn probe_encoder(config: &Config) -> EncoderStatusView {
    let path = match resolve_encoder_path(config) {
        Ok(path) => path,
        Err(e) => {
            return EncoderStatusView {
                present: false,
                path: None,
                version_line: None,
                hwaccels: Vec::new(),
                message: Some(e.to_string()),
            }
        }
    };

    let version_line = std::process::Command::new(&path)
        .arg("-version")
        .output()
        .ok()
        .and_then(|out| String::from_utf8_lossy(&out.stdout).lines().next().map(str::to_string));

    let hwaccels = std::process::Command::new(&path)
        .arg("-hwaccels")
        .output()
        .ok()
        .map(|out| {
            String::from_utf8_lossy(&out.stdout)
                .lines()
                .skip_while(|l| !l.contains("Hardware acceleration methods"))
                .skip(1)
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    EncoderStatusView {
        present: true,
        path: Some(path),
        version_line,
        hwaccels,
        message: None,
    }
}

async fn system_shutdown(State(state): State<Arc<AppState>>) -> Json<shutdown::ShutdownSummary> {
    let summary = shutdown::run(&state.queue, &state.supervisor).await;
    state.shutdown_notify.notify_one();
    Json(summary)
}

#[derive(Debug, Serialize)]
struct SystemInfoView {
    logical_cores: usize,
    total_ram_bytes: u64,
    output_dir: String,
    offline_only: bool,
    max_concurrent_jobs: usize,
}

async fn system_info(State(state): State<Arc<AppState>>) -> Json<SystemInfoView> {
    let config = state.config.clone();
    let view = tokio::task::spawn_blocking(move || {
        let mut sys = System::new();
        sys.refresh_cpu();
        sys.refresh_memory();
        SystemInfoView {
            logical_cores: sys.cpus().len().max(1),
            total_ram_bytes: sys.total_memory() * 1024,
            output_dir: config.output_dir.to_string_lossy().to_string(),
            offline_only: config.offline_only,
            max_concurrent_jobs: config.max_concurrent_jobs,
        }
    })
    .await
    .expect("system info probe should not panic");
    Json(view)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_body_status_round_trips_through_status_code() {
        let err = AppError::new(ErrorCode::EValidation, "bad input");
        let body = ErrorBody::from_app_error(&err, None);
        assert_eq!(StatusCode::from_u16(body.status).unwrap(), StatusCode::BAD_REQUEST);
    }
}
