//! Event Stream (C8, spec §4.8).
//!
//! Long-lived, server-initiated, per-job event stream. There is no push bus
//! inside the runner (C6); instead this module polls the job record at
//! `event_poll_interval_ms` and emits a diff-event for every field that
//! changed since the previous poll, closing cleanly on terminal state.

use std::time::Duration;

use serde::Serialize;
use serde_json::json;
use tokio::time::interval;

use crate::domain::job::{Job, JobState, Stage};
use crate::queue::JobQueue;

/// One SSE record: `event: <kind>\ndata: <json>\n\n`.
#[derive(Debug, Clone)]
pub struct JobEvent {
    pub kind: &'static str,
    pub data: serde_json::Value,
}

#[derive(Debug, Clone, Serialize)]
struct JobStatusPayload<'a> {
    #[serde(rename = "jobId")]
    job_id: &'a str,
    #[serde(rename = "correlationId")]
    correlation_id: &'a str,
    status: JobState,
}

#[derive(Debug, Clone, Serialize)]
struct StepStatusPayload<'a> {
    #[serde(rename = "jobId")]
    job_id: &'a str,
    #[serde(rename = "correlationId")]
    correlation_id: &'a str,
    stage: Stage,
}

#[derive(Debug, Clone, Serialize)]
struct StepProgressPayload<'a> {
    #[serde(rename = "jobId")]
    job_id: &'a str,
    #[serde(rename = "correlationId")]
    correlation_id: &'a str,
    stage: Stage,
    percent: u8,
}

struct LastSeen {
    state: JobState,
    stage: Stage,
    percent: u8,
}

impl LastSeen {
    fn diff(&mut self, job: &Job) -> Vec<JobEvent> {
        let mut events = Vec::new();
        if job.state != self.state {
            events.push(JobEvent {
                kind: "job-status",
                data: json!(JobStatusPayload {
                    job_id: &job.id,
                    correlation_id: &job.correlation_id,
                    status: job.state,
                }),
            });
            self.state = job.state;
        }
        if job.stage != self.stage {
            events.push(JobEvent {
                kind: "step-status",
                data: json!(StepStatusPayload {
                    job_id: &job.id,
                    correlation_id: &job.correlation_id,
                    stage: job.stage,
                }),
            });
            self.stage = job.stage;
        }
        if job.percent != self.percent {
            events.push(JobEvent {
                kind: "step-progress",
                data: json!(StepProgressPayload {
                    job_id: &job.id,
                    correlation_id: &job.correlation_id,
                    stage: job.stage,
                    percent: job.percent,
                }),
            });
            self.percent = job.percent;
        }
        events
    }
}

/// Polls `job_id` at `poll_interval` and forwards diff events to `tx` until
/// the job reaches a terminal state (spec §4.8 "emits the terminal event
/// then closes cleanly") or the receiver is dropped (client disconnect).
pub async fn poll_job(
    queue: &JobQueue,
    job_id: &str,
    poll_interval: Duration,
    tx: tokio::sync::mpsc::Sender<JobEvent>,
) {
    let Some(handle) = queue.get(job_id).await else {
        let _ = tx
            .send(JobEvent {
                kind: "error",
                data: json!({ "jobId": job_id, "message": "no such job" }),
            })
            .await;
        return;
    };

    let mut last = {
        let g = handle.read().await;
        LastSeen {
            state: g.state,
            stage: g.stage,
            percent: g.percent,
        }
    };
    // Emit the initial snapshot as if every field just changed, so a fresh
    // subscriber sees current status immediately rather than waiting for
    // the next state transition.
    {
        let g = handle.read().await;
        for event in (LastSeen {
            state: JobState::Queued,
            stage: Stage::Script,
            percent: u8::MAX,
        })
        .diff_force(&g)
        {
            if tx.send(event).await.is_err() {
                return;
            }
        }
    }

    let mut ticker = interval(poll_interval);
    loop {
        ticker.tick().await;
        let (events, terminal, failed) = {
            let g = handle.read().await;
            let events = last.diff(&g);
            (events, g.state.is_terminal(), g.state == JobState::Failed)
        };
        for event in events {
            if tx.send(event).await.is_err() {
                return;
            }
        }
        if terminal {
            let terminal_event = {
                let g = handle.read().await;
                terminal_event_for(&g, failed)
            };
            let _ = tx.send(terminal_event).await;
            return;
        }
    }
}

impl LastSeen {
    /// Like `diff`, but always reports every field regardless of whether it
    /// differs from `self` — used once, for the initial snapshot.
    fn diff_force(&mut self, job: &Job) -> Vec<JobEvent> {
        self.state = job.state;
        self.stage = job.stage;
        self.percent = job.percent;
        vec![
            JobEvent {
                kind: "job-status",
                data: json!(JobStatusPayload {
                    job_id: &job.id,
                    correlation_id: &job.correlation_id,
                    status: job.state,
                }),
            },
            JobEvent {
                kind: "step-status",
                data: json!(StepStatusPayload {
                    job_id: &job.id,
                    correlation_id: &job.correlation_id,
                    stage: job.stage,
                }),
            },
            JobEvent {
                kind: "step-progress",
                data: json!(StepProgressPayload {
                    job_id: &job.id,
                    correlation_id: &job.correlation_id,
                    stage: job.stage,
                    percent: job.percent,
                }),
            },
        ]
    }
}

fn terminal_event_for(job: &Job, failed: bool) -> JobEvent {
    if failed {
        JobEvent {
            kind: "job-failed",
            data: json!({
                "jobId": job.id,
                "correlationId": job.correlation_id,
                "failureDetails": job.failure_details,
            }),
        }
    } else {
        JobEvent {
            kind: "job-completed",
            data: json!({
                "jobId": job.id,
                "correlationId": job.correlation_id,
                "status": job.state,
                "artifacts": job.artifacts,
            }),
        }
    }
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
    use crate::runner::RunnerContext;
    use std::sync::Arc;
    use tempfile::tempdir;

    async fn test_queue(dir: &std::path::Path) -> JobQueue {
        let providers = ProviderRegistry::new();
        providers.register_llm(Arc::new(RuleBasedLlm)).await;
        providers.register_tts(Arc::new(NullTts)).await;
        providers.register_visuals(Arc::new(SlideshowVisuals)).await;
        let mut config = Config::default();
        config.output_dir = dir.to_path_buf();
        let ctx = RunnerContext {
            config: Arc::new(config),
            providers: Arc::new(providers),
            artifacts: Arc::new(ArtifactStore::new(dir.to_path_buf())),
            supervisor: ProcessSupervisor::new(),
        };
        JobQueue::new(ctx)
    }

    fn sample_request() -> crate::domain::job::JobRequest {
        crate::domain::job::JobRequest {
            brief: Brief {
                topic: "Topic".to_string(),
                audience: "general".to_string(),
                goal: "educate".to_string(),
                tone: "friendly".to_string(),
                language: "en".to_string(),
                aspect_ratio: AspectRatio::Widescreen,
            },
            plan_spec: PlanSpec {
                target_duration_secs: 20.0,
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
    async fn unknown_job_emits_error_event_and_closes() {
        let dir = tempdir().unwrap();
        let queue = test_queue(dir.path()).await;
        let (tx, mut rx) = tokio::sync::mpsc::channel(8);
        poll_job(&queue, "nope", Duration::from_millis(10), tx).await;
        let event = rx.recv().await.unwrap();
        assert_eq!(event.kind, "error");
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn known_job_emits_initial_snapshot() {
        let dir = tempdir().unwrap();
        let queue = test_queue(dir.path()).await;
        // Admission requires an encoder on PATH in `validate`; skip this
        // assertion entirely if the host has no ffmpeg to probe with.
        if which::which("ffmpeg").is_err() {
            return;
        }
        let handle = queue.create_generation(sample_request()).await.unwrap();
        let id = handle.read().await.id.clone();
        let (tx, mut rx) = tokio::sync::mpsc::channel(8);
        tokio::spawn(async move {
            poll_job(&queue, &id, Duration::from_millis(5000), tx).await;
        });
        let first = rx.recv().await.unwrap();
        assert_eq!(first.kind, "job-status");
    }
}
