//! Job Queue & Supervisor (C7, spec §4.7).
//!
//! Owns the job index, admits new jobs after synchronous pre-admission
//! validation (C4), and dispatches admitted jobs onto a bounded worker pool
//! backed by the Job Runner (C6). Generation and export jobs share the same
//! index, retention, and cancellation machinery (spec §4.7.1); only the
//! runner entry point differs.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{RwLock, Semaphore};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::artifacts::RecentArtifactEntry;
use crate::domain::job::{ExportRequest, Job, JobInputs, JobKind, JobRequest, JobState};
use crate::error::{AppError, ErrorCode};
use crate::runner::{run_export, run_generation, JobHandle, RunnerContext};
use crate::validate::Validator;

struct Entry {
    handle: JobHandle,
    kind: JobKind,
}

/// Bounded FIFO job queue with a worker pool sized by
/// `config.max_concurrent_jobs` (spec §4.7 "Concurrency"). Every shared
/// field lives behind an `Arc` so the per-job worker task, which tokio
/// requires to be `'static`, can hold its own owned handles without the
/// queue itself needing to be wrapped in an `Arc` at every call site.
pub struct JobQueue {
    ctx: RunnerContext,
    index: Arc<RwLock<HashMap<String, Entry>>>,
    order: Arc<RwLock<VecDeque<String>>>,
    cancels: Arc<RwLock<HashMap<String, CancellationToken>>>,
    semaphore: Arc<Semaphore>,
    retention: usize,
    accepting: Arc<AtomicBool>,
}

impl JobQueue {
    pub fn new(ctx: RunnerContext) -> Self {
        let workers = ctx.config.max_concurrent_jobs.max(1);
        let retention = ctx.config.job_retention;
        Self {
            ctx,
            index: Arc::new(RwLock::new(HashMap::new())),
            order: Arc::new(RwLock::new(VecDeque::new())),
            cancels: Arc::new(RwLock::new(HashMap::new())),
            semaphore: Arc::new(Semaphore::new(workers)),
            retention,
            accepting: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Rejects all future admissions; jobs already admitted keep running
    /// (spec §4.9 "reject new, let in-flight finish or be cancelled").
    pub fn stop_accepting(&self) {
        self.accepting.store(false, Ordering::SeqCst);
    }

    fn admission_guard(&self) -> Result<(), AppError> {
        if !self.accepting.load(Ordering::SeqCst) {
            return Err(AppError::new(
                ErrorCode::EShuttingDown,
                "orchestrator is shutting down; no new jobs are accepted",
            ));
        }
        Ok(())
    }

    pub async fn create_generation(&self, request: JobRequest) -> Result<JobHandle, AppError> {
        self.admission_guard()?;
        let report = Validator::new(&self.ctx.config).validate(&request.brief, &request.plan_spec);
        if let Some(err) = Validator::as_app_error(&report) {
            return Err(err);
        }

        let id = Uuid::new_v4().to_string();
        let job = Job::new(id.clone(), request);
        self.admit(id, job, JobKind::Generation).await
    }

    pub async fn create_export(&self, request: ExportRequest) -> Result<JobHandle, AppError> {
        self.admission_guard()?;
        let report = Validator::new(&self.ctx.config).validate_export();
        if let Some(err) = Validator::as_app_error(&report) {
            return Err(err);
        }

        let id = Uuid::new_v4().to_string();
        let job = Job::new_export(id.clone(), request);
        self.admit(id, job, JobKind::Export).await
    }

    async fn admit(&self, id: String, job: Job, kind: JobKind) -> Result<JobHandle, AppError> {
        let handle: JobHandle = Arc::new(RwLock::new(job));
        let cancel = CancellationToken::new();

        {
            let mut index = self.index.write().await;
            index.insert(
                id.clone(),
                Entry {
                    handle: handle.clone(),
                    kind,
                },
            );
        }
        self.order.write().await.push_back(id.clone());
        self.cancels.write().await.insert(id.clone(), cancel.clone());

        let ctx = self.ctx.clone();
        let semaphore = self.semaphore.clone();
        let job_for_task = handle.clone();
        let id_for_task = id.clone();
        let cancels = self.cancels.clone();
        let retention = self.retention;
        let index_for_task = self.index.clone();
        let order_for_task = self.order.clone();
        let artifacts = ctx.artifacts.clone();

        tokio::spawn(async move {
            let _permit = semaphore.acquire_owned().await;
            match kind {
                JobKind::Generation => run_generation(ctx.clone(), job_for_task.clone(), cancel.clone()).await,
                JobKind::Export => run_export(ctx.clone(), job_for_task.clone(), cancel.clone()).await,
            }

            let (finished_at, state, correlation_id) = {
                let g = job_for_task.read().await;
                (g.finished_at, g.state, g.correlation_id.clone())
            };
            if state.is_terminal() {
                if let Some(finished_at) = finished_at {
                    let index_path = artifacts.reveal_directory("_index").join("recent.jsonl");
                    let _ = artifacts
                        .record_terminal_job(&index_path, &id_for_task, &correlation_id, finished_at)
                        .await;
                }
            }
            cancels.write().await.remove(&id_for_task);
            enforce_retention(&index_for_task, &order_for_task, kind, retention).await;
        });

        Ok(handle)
    }

    pub async fn get(&self, id: &str) -> Option<JobHandle> {
        self.index.read().await.get(id).map(|e| e.handle.clone())
    }

    /// Jobs in admission order, oldest first (spec §4.7 "FIFO listing").
    pub async fn list(&self) -> Vec<JobHandle> {
        let order = self.order.read().await;
        let index = self.index.read().await;
        order
            .iter()
            .filter_map(|id| index.get(id).map(|e| e.handle.clone()))
            .collect()
    }

    pub async fn active(&self) -> usize {
        let index = self.index.read().await;
        let mut count = 0;
        for entry in index.values() {
            if !entry.handle.read().await.state.is_terminal() {
                count += 1;
            }
        }
        count
    }

    pub async fn cancel(&self, id: &str) -> Result<(), AppError> {
        let state = {
            let index = self.index.read().await;
            let entry = index
                .get(id)
                .ok_or_else(|| AppError::new(ErrorCode::EValidation, format!("no such job '{id}'")))?;
            entry.handle.read().await.state
        };
        if state.is_terminal() {
            return Err(AppError::new(
                ErrorCode::EValidation,
                format!("job '{id}' is already in a terminal state"),
            ));
        }
        let cancels = self.cancels.read().await;
        match cancels.get(id) {
            Some(token) => {
                token.cancel();
                Ok(())
            }
            None => Err(AppError::new(ErrorCode::EValidation, format!("no such job '{id}'"))),
        }
    }

    /// Re-issues a terminal-Failed job's inputs as a fresh job (spec §4.7
    /// "Retry"). Rejects any other state, including Cancelled.
    pub async fn retry(&self, id: &str) -> Result<JobHandle, AppError> {
        let (inputs, state) = {
            let index = self.index.read().await;
            let entry = index
                .get(id)
                .ok_or_else(|| AppError::new(ErrorCode::EValidation, format!("no such job '{id}'")))?;
            let g = entry.handle.read().await;
            (g.retry_inputs(), g.state)
        };
        if state != JobState::Failed {
            return Err(AppError::new(
                ErrorCode::EValidation,
                "only a job in the Failed state can be retried",
            ));
        }
        match inputs {
            JobInputs::Generation(request) => self.create_generation(request).await,
            JobInputs::Export(request) => self.create_export(request).await,
        }
    }

    pub async fn recent_artifacts(&self, n: usize) -> Vec<RecentArtifactEntry> {
        let index_path = self.ctx.artifacts.reveal_directory("_index").join("recent.jsonl");
        self.ctx.artifacts.recent_completed(n, &index_path).await
    }
}

/// Evicts the oldest terminal jobs of `kind` from the in-memory index once
/// more than `retention` terminal jobs of that kind are held (spec §4.7
/// "Retention of last 50 terminal jobs per job kind"). Artifacts already
/// persisted to disk and the append-only recent-artifacts index are
/// unaffected; only the live job-status index is pruned.
async fn enforce_retention(
    index: &RwLock<HashMap<String, Entry>>,
    order: &RwLock<VecDeque<String>>,
    kind: JobKind,
    retention: usize,
) {
    let mut terminal_ids_in_order = Vec::new();
    {
        let index_guard = index.read().await;
        let order_guard = order.read().await;
        for id in order_guard.iter() {
            if let Some(entry) = index_guard.get(id) {
                if entry.kind == kind && entry.handle.read().await.state.is_terminal() {
                    terminal_ids_in_order.push(id.clone());
                }
            }
        }
    }
    if terminal_ids_in_order.len() <= retention {
        return;
    }
    let evict_count = terminal_ids_in_order.len() - retention;
    let to_evict: Vec<String> = terminal_ids_in_order.into_iter().take(evict_count).collect();
    if to_evict.is_empty() {
        return;
    }
    let mut index_guard = index.write().await;
    let mut order_guard = order.write().await;
    for id in &to_evict {
        index_guard.remove(id);
    }
    order_guard.retain(|id| !to_evict.contains(id));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::ArtifactStore;
    use crate::config::Config;
    use crate::domain::brief::{AspectRatio, Brief, Density, Pacing, PlanSpec, RenderSpec, VoiceSpec};
    use crate::domain::job::Tier;
    use crate::process::ProcessSupervisor;
    use crate::providers::llm::RuleBasedLlm;
    use crate::providers::tts::NullTts;
    use crate::providers::visuals::SlideshowVisuals;
    use crate::providers::ProviderRegistry;
    use tempfile::tempdir;

    async fn test_ctx(dir: &std::path::Path) -> RunnerContext {
        let providers = ProviderRegistry::new();
        providers.register_llm(Arc::new(RuleBasedLlm)).await;
        providers.register_tts(Arc::new(NullTts)).await;
        providers.register_visuals(Arc::new(SlideshowVisuals)).await;
        let mut config = Config::default();
        config.output_dir = dir.to_path_buf();
        config.encoder_path = which::which("ffmpeg").ok().map(|p| p.to_string_lossy().to_string());
        RunnerContext {
            config: Arc::new(config),
            providers: Arc::new(providers),
            artifacts: Arc::new(ArtifactStore::new(dir.to_path_buf())),
            supervisor: ProcessSupervisor::new(),
        }
    }

    fn sample_request() -> JobRequest {
        JobRequest {
            brief: Brief {
                topic: "How solar panels work".to_string(),
                audience: "general".to_string(),
                goal: "educate".to_string(),
                tone: "friendly".to_string(),
                language: "en".to_string(),
                aspect_ratio: AspectRatio::Widescreen,
            },
            plan_spec: PlanSpec {
                target_duration_secs: 30.0,
                pacing: Pacing::Medium,
                density: Density::Balanced,
                style: "explainer".to_string(),
            },
            voice_spec: VoiceSpec::default(),
            render_spec: RenderSpec::default(),
            tier: Tier::Free,
            specific_provider: None,
            correlation_id: None,
        }
    }

    #[tokio::test]
    async fn rejects_admission_after_shutdown() {
        let dir = tempdir().unwrap();
        let ctx = test_ctx(dir.path()).await;
        let queue = JobQueue::new(ctx);
        queue.stop_accepting();
        let err = queue.create_generation(sample_request()).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::EShuttingDown);
    }

    #[tokio::test]
    async fn cancel_of_unknown_job_is_an_error() {
        let dir = tempdir().unwrap();
        let ctx = test_ctx(dir.path()).await;
        let queue = JobQueue::new(ctx);
        let err = queue.cancel("not-a-real-id").await.unwrap_err();
        assert_eq!(err.code, ErrorCode::EValidation);
    }

    #[tokio::test]
    async fn retry_of_non_failed_job_is_rejected() {
        let dir = tempdir().unwrap();
        let ctx = test_ctx(dir.path()).await;
        let queue = JobQueue::new(ctx);
        let handle = queue.create_generation(sample_request()).await.unwrap();
        let id = handle.read().await.id.clone();
        // Freshly admitted job is Queued/Running, never Failed yet.
        let err = queue.retry(&id).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::EValidation);
    }
}
