//! Shutdown Coordinator (C9, spec §4.9).
//!
//! Runs once, triggered by a termination signal or the `/system/shutdown`
//! endpoint. Reaches into the Job Queue (C7) and Process Supervisor (C1);
//! does not own either.

use std::time::Duration;

use serde::Serialize;
use tokio::time::timeout;
use tracing::info;

use crate::queue::JobQueue;

const KILL_ALL_BOUND: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Serialize)]
pub struct ShutdownSummary {
    pub jobs_cancelled: usize,
    pub processes_killed: usize,
    pub killed_within_bound: bool,
}

/// Drains admission, cancels every in-flight job, force-kills every tracked
/// subprocess (bounded to 30s), and returns a summary for the startup/
/// shutdown log line (spec §4.9 steps 1-5; artifact manifests are flushed
/// incrementally by the Artifact Store as each artifact is added, so there
/// is nothing left to flush here at shutdown time).
pub async fn run(queue: &JobQueue, supervisor: &crate::process::ProcessSupervisor) -> ShutdownSummary {
    queue.stop_accepting();

    let mut jobs_cancelled = 0;
    for job in queue.list().await {
        let id = job.read().await.id.clone();
        if queue.cancel(&id).await.is_ok() {
            jobs_cancelled += 1;
        }
    }

    let (processes_killed, killed_within_bound) = match timeout(KILL_ALL_BOUND, supervisor.kill_all()).await {
        Ok(count) => (count, true),
        Err(_) => (supervisor.live_count().await, false),
    };

    let summary = ShutdownSummary {
        jobs_cancelled,
        processes_killed,
        killed_within_bound,
    };
    info!(
        jobs_cancelled = summary.jobs_cancelled,
        processes_killed = summary.processes_killed,
        killed_within_bound = summary.killed_within_bound,
        "shutdown complete"
    );
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::ArtifactStore;
    use crate::config::Config;
    use crate::process::ProcessSupervisor;
    use crate::providers::llm::RuleBasedLlm;
    use crate::providers::tts::NullTts;
    use crate::providers::visuals::SlideshowVisuals;
    use crate::providers::ProviderRegistry;
    use crate::runner::RunnerContext;
    use std::sync::Arc;
    use tempfile::tempdir;

    #[tokio::test]
    async fn shutdown_on_an_idle_queue_kills_nothing() {
        let dir = tempdir().unwrap();
        let providers = ProviderRegistry::new();
        providers.register_llm(Arc::new(RuleBasedLlm)).await;
        providers.register_tts(Arc::new(NullTts)).await;
        providers.register_visuals(Arc::new(SlideshowVisuals)).await;
        let mut config = Config::default();
        config.output_dir = dir.path().to_path_buf();
        let ctx = RunnerContext {
            config: Arc::new(config),
            providers: Arc::new(providers),
            artifacts: Arc::new(ArtifactStore::new(dir.path().to_path_buf())),
            supervisor: ProcessSupervisor::new(),
        };
        let supervisor = ctx.supervisor.clone();
        let queue = JobQueue::new(ctx);

        let summary = run(&queue, &supervisor).await;
        assert_eq!(summary.jobs_cancelled, 0);
        assert_eq!(summary.processes_killed, 0);
        assert!(summary.killed_within_bound);

        let err = queue
            .create_export(crate::domain::job::ExportRequest {
                source: crate::domain::job::ExportSource::InputFile {
                    input_file: "/tmp/x.mp4".to_string(),
                },
                preset_name: "youtube-1080p".to_string(),
                correlation_id: None,
            })
            .await
            .unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::EShuttingDown);
    }
}
