//! Job Runner (C6, spec §4.6).
//!
//! Runs the stage DAG for a single job, resolving a provider per stage via
//! the Provider Registry (C2), invoking pipeline stage functions (C5), and
//! persisting artifacts via the Artifact Store (C3). The runner never
//! mutates job state outside the `JobHandle` it was given; the Job Queue
//! (C7) owns the index those handles live in.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::artifacts::{new_artifact, ArtifactStore};
use crate::config::Config;
use crate::domain::job::{
    Artifact, ArtifactType, ExportSource, FailureDetails, Job, JobError, JobState, Stage,
};
use crate::error::{AppError, ErrorCode};
use crate::pipeline::export::ExportPreset;
use crate::pipeline::{export, narration, render, script, visuals, ProgressSink};
use crate::process::ProcessSupervisor;
use crate::providers::{resolve, Capability, ProviderRegistry, ResolveTier};

pub type JobHandle = Arc<RwLock<Job>>;

const RETRY_BACKOFFS: [Duration; 3] = [
    Duration::from_secs(2),
    Duration::from_secs(4),
    Duration::from_secs(8),
];

const LLM_TIMEOUT: Duration = Duration::from_secs(15 * 60);
const TTS_TIMEOUT: Duration = Duration::from_secs(10 * 60);
const VISUALS_TIMEOUT: Duration = Duration::from_secs(20 * 60);

#[derive(Clone)]
pub struct RunnerContext {
    pub config: Arc<Config>,
    pub providers: Arc<ProviderRegistry>,
    pub artifacts: Arc<ArtifactStore>,
    pub supervisor: ProcessSupervisor,
}

/// Retries a fallible attempt up to 3 additional times with exponential
/// backoff (2s, 4s, 8s), per spec §4.6 step 5. Only error codes the
/// taxonomy marks retryable are retried; everything else (including
/// cancellation) returns immediately. Backoff sleeps race the job's
/// cancellation token so a cancel during a wait is observed promptly.
///
/// `attempt` must be self-contained: it is called repeatedly, so anything
/// it needs must be cloned fresh on each call rather than moved out of the
/// enclosing closure's environment.
async fn with_retry<T, F, Fut>(stage: Stage, cancel: &CancellationToken, mut attempt: F) -> Result<T, AppError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
{
    let mut tries = 0usize;
    loop {
        if cancel.is_cancelled() {
            return Err(AppError::new(ErrorCode::ECancelled, "cancelled before stage attempt").with_stage(stage));
        }
        match attempt().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                let classified = AppError::classify(stage, &err);
                if classified.code == ErrorCode::ECancelled {
                    return Err(classified);
                }
                if !classified.code.is_retryable() || tries >= RETRY_BACKOFFS.len() {
                    return Err(classified);
                }
                let wait = RETRY_BACKOFFS[tries];
                tries += 1;
                tokio::select! {
                    _ = cancel.cancelled() => {
                        return Err(AppError::new(ErrorCode::ECancelled, "cancelled during retry backoff").with_stage(stage));
                    }
                    _ = tokio::time::sleep(wait) => {}
                }
            }
        }
    }
}

/// Wraps a future with a stage timeout, converting elapsed-deadline into a
/// message `AppError::classify` recognizes as `E_Timeout`.
async fn with_timeout<T>(stage: Stage, duration: Duration, fut: impl Future<Output = anyhow::Result<T>>) -> anyhow::Result<T> {
    match tokio::time::timeout(duration, fut).await {
        Ok(result) => result,
        Err(_) => anyhow::bail!("{stage:?} provider call timed out after {}s", duration.as_secs()),
    }
}

/// Runs a low-frequency keep-alive while `fut` is in flight, per spec §4.6
/// "Heartbeat". Cancelled as soon as `fut` resolves.
async fn with_heartbeat<T>(job: JobHandle, stage: Stage, interval: Duration, fut: impl Future<Output = T>) -> T {
    let started = Instant::now();
    let heartbeat = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let elapsed = started.elapsed().as_secs_f64();
            job.write()
                .await
                .push_log(format!("heartbeat: stage={stage:?} elapsed={elapsed:.0}s"));
        }
    });
    let result = fut.await;
    heartbeat.abort();
    result
}

async fn progress_forwarder(job: JobHandle, mut rx: tokio::sync::mpsc::Receiver<u8>) {
    while let Some(percent) = rx.recv().await {
        job.write().await.set_percent(percent);
    }
}

fn progress_channel(job: &JobHandle) -> (ProgressSink, tokio::task::JoinHandle<()>) {
    let (tx, rx) = tokio::sync::mpsc::channel(32);
    let handle = tokio::spawn(progress_forwarder(job.clone(), rx));
    (ProgressSink::new(tx), handle)
}

async fn record_failure(job: &JobHandle, err: AppError) {
    let mut guard = job.write().await;
    guard.errors.push(JobError {
        code: err.code,
        message: err.message.clone(),
        remediation: err.remediation.clone(),
        stage: err.stage.unwrap_or(guard.stage),
    });
    guard.failure_details = Some(FailureDetails {
        stage: err.stage.unwrap_or(guard.stage),
        code: err.code,
        message: err.message.clone(),
        suggested_actions: err.suggested_actions(),
        failed_at: Utc::now(),
    });
    guard.state = if err.code == ErrorCode::ECancelled {
        JobState::Cancelled
    } else {
        JobState::Failed
    };
    guard.finished_at = Some(Utc::now());
}

async fn add_artifact(
    ctx: &RunnerContext,
    job: &JobHandle,
    kind: ArtifactType,
    path: PathBuf,
) -> anyhow::Result<Artifact> {
    let size = tokio::fs::metadata(&path).await.map(|m| m.len()).unwrap_or(0);
    let artifact = new_artifact(kind, path, size);
    let (job_id, correlation_id) = {
        let g = job.read().await;
        (g.id.clone(), g.correlation_id.clone())
    };
    ctx.artifacts.add(&job_id, &correlation_id, artifact.clone()).await?;
    job.write().await.artifacts.push(artifact.clone());
    Ok(artifact)
}

async fn check_cancel(cancel: &CancellationToken, stage: Stage) -> Result<(), AppError> {
    if cancel.is_cancelled() {
        return Err(AppError::new(ErrorCode::ECancelled, "job cancelled at stage boundary").with_stage(stage));
    }
    Ok(())
}

/// Encodes one pass of the encoder (render or export) end to end: spawn a
/// fresh progress channel, run it, and tear the channel down. Used inside
/// `with_retry` so every attempt gets its own progress plumbing.
async fn run_encoder_pass(
    job: &JobHandle,
    cancel: &CancellationToken,
    supervisor: &ProcessSupervisor,
    encoder_path: &str,
    args: Vec<String>,
    target_duration_secs: f64,
) -> anyhow::Result<()> {
    let (sink, forwarder) = progress_channel(job);
    let result = render::run(supervisor, encoder_path, args, target_duration_secs, &sink, cancel.clone()).await;
    drop(sink);
    let _ = forwarder.await;
    result
}

/// Runs a full generation job: Script -> Narration -> Visuals ->
/// TimelineRender -> Complete (spec §4.6).
pub async fn run_generation(ctx: RunnerContext, job: JobHandle, cancel: CancellationToken) {
    let (job_id, correlation_id) = {
        let g = job.read().await;
        (g.id.clone(), g.correlation_id.clone())
    };
    let span = tracing::info_span!("job", job_id = %job_id, correlation_id = %correlation_id);
    let _enter = span.enter();

    if cancel.is_cancelled() {
        tracing::info!("generation job cancelled before it began running");
        record_failure(&job, AppError::new(ErrorCode::ECancelled, "cancelled while queued")).await;
        return;
    }

    {
        let mut g = job.write().await;
        g.state = JobState::Running;
        g.started_at = Some(Utc::now());
    }

    match run_generation_inner(&ctx, &job, &cancel).await {
        Ok(()) => {
            let mut g = job.write().await;
            g.state = JobState::Succeeded;
            g.stage = Stage::Complete;
            g.percent = 100;
            g.finished_at = Some(Utc::now());
            tracing::info!("generation job succeeded");
        }
        Err(err) => {
            tracing::warn!(code = ?err.code, message = %err.message, "generation job failed");
            record_failure(&job, err).await;
        }
    }
}

async fn run_generation_inner(
    ctx: &RunnerContext,
    job: &JobHandle,
    cancel: &CancellationToken,
) -> Result<(), AppError> {
    let request = {
        let g = job.read().await;
        g.generation_request()
            .cloned()
            .ok_or_else(|| AppError::new(ErrorCode::EInternal, "generation runner invoked on a non-generation job"))?
    };
    let job_id = job.read().await.id.clone();

    // --- Script ---------------------------------------------------------
    check_cancel(cancel, Stage::Script).await?;
    job.write().await.enter_stage(Stage::Script);
    let llm_decision = resolve(
        &ctx.providers,
        Capability::Llm,
        ResolveTier::from_job_tier(request.tier, request.specific_provider.clone()),
        ctx.config.offline_only,
    )
    .await;
    job.write()
        .await
        .push_log(format!("resolved LLM provider: {}", llm_decision.reason));
    let llm_provider = ctx
        .providers
        .get_llm(&llm_decision.provider_name)
        .await
        .ok_or_else(|| AppError::new(ErrorCode::EProviderUnavailable, "resolved LLM provider not registered").with_stage(Stage::Script))?;
    if !ctx.providers.llm_available_cached(llm_provider.as_ref()).await {
        return Err(AppError::new(
            ErrorCode::EProviderUnavailable,
            format!("LLM provider '{}' is registered but reports itself unavailable", llm_provider.name()),
        )
        .with_remediation("Configure the provider's credentials or choose a different tier.")
        .with_stage(Stage::Script));
    }

    let system_prompt = format!(
        "Write a narration script for a {}-second video aimed at {}.",
        request.plan_spec.target_duration_secs, request.brief.audience
    );
    let user_prompt = request.brief.topic.clone();
    let heartbeat_interval = Duration::from_secs(ctx.config.heartbeat_interval_secs);

    let cleaned_script = with_retry(Stage::Script, cancel, || {
        let llm_provider = llm_provider.clone();
        let system_prompt = system_prompt.clone();
        let user_prompt = user_prompt.clone();
        let job = job.clone();
        async move {
            with_heartbeat(
                job,
                Stage::Script,
                heartbeat_interval,
                with_timeout(Stage::Script, LLM_TIMEOUT, async move {
                    script::run(llm_provider.as_ref(), &system_prompt, &user_prompt).await
                }),
            )
            .await
        }
    })
    .await?;

    let script_path = ctx.artifacts.job_dir(&job_id).join("script.txt");
    tokio::fs::create_dir_all(ctx.artifacts.job_dir(&job_id))
        .await
        .map_err(|e| AppError::classify(Stage::Script, &anyhow::anyhow!(e)))?;
    tokio::fs::write(&script_path, &cleaned_script)
        .await
        .map_err(|e| AppError::classify(Stage::Script, &anyhow::anyhow!(e)))?;
    add_artifact(ctx, job, ArtifactType::Script, script_path)
        .await
        .map_err(|e| AppError::classify(Stage::Script, &e))?;
    job.write().await.set_percent(100);

    // --- Narration --------------------------------------------------------
    check_cancel(cancel, Stage::Narration).await?;
    job.write().await.enter_stage(Stage::Narration);
    let tts_decision = resolve(
        &ctx.providers,
        Capability::Tts,
        ResolveTier::from_job_tier(request.tier, request.specific_provider.clone()),
        ctx.config.offline_only,
    )
    .await;
    job.write()
        .await
        .push_log(format!("resolved TTS provider: {}", tts_decision.reason));
    let tts_provider = ctx
        .providers
        .get_tts(&tts_decision.provider_name)
        .await
        .ok_or_else(|| AppError::new(ErrorCode::EProviderUnavailable, "resolved TTS provider not registered").with_stage(Stage::Narration))?;
    if !ctx.providers.tts_available_cached(tts_provider.as_ref()).await {
        return Err(AppError::new(
            ErrorCode::EProviderUnavailable,
            format!("TTS provider '{}' is registered but reports itself unavailable", tts_provider.name()),
        )
        .with_remediation("Configure the provider's credentials or choose a different tier.")
        .with_stage(Stage::Narration));
    }

    let narration_path = ctx.artifacts.job_dir(&job_id).join("narration.wav");
    let voice = request.voice_spec.clone();
    let audio_meta = with_retry(Stage::Narration, cancel, || {
        let tts_provider = tts_provider.clone();
        let cleaned_script = cleaned_script.clone();
        let voice = voice.clone();
        let narration_path = narration_path.clone();
        let job = job.clone();
        async move {
            with_heartbeat(
                job,
                Stage::Narration,
                heartbeat_interval,
                with_timeout(Stage::Narration, TTS_TIMEOUT, async move {
                    narration::run(tts_provider.as_ref(), &cleaned_script, &voice, &narration_path).await
                }),
            )
            .await
        }
    })
    .await?;
    job.write()
        .await
        .push_log(format!("narration duration ~{:.1}s", audio_meta.duration_secs));
    add_artifact(ctx, job, ArtifactType::Audio, narration_path.clone())
        .await
        .map_err(|e| AppError::classify(Stage::Narration, &e))?;
    job.write().await.set_percent(100);

    // --- Visuals ----------------------------------------------------------
    check_cancel(cancel, Stage::Visuals).await?;
    job.write().await.enter_stage(Stage::Visuals);
    let visuals_decision = resolve(
        &ctx.providers,
        Capability::Visuals,
        ResolveTier::from_job_tier(request.tier, request.specific_provider.clone()),
        ctx.config.offline_only,
    )
    .await;
    job.write()
        .await
        .push_log(format!("resolved visuals provider: {}", visuals_decision.reason));
    let visuals_provider = ctx
        .providers
        .get_visuals(&visuals_decision.provider_name)
        .await
        .ok_or_else(|| AppError::new(ErrorCode::EProviderUnavailable, "resolved visuals provider not registered").with_stage(Stage::Visuals))?;
    if !ctx.providers.visuals_available_cached(visuals_provider.as_ref()).await {
        return Err(AppError::new(
            ErrorCode::EProviderUnavailable,
            format!("visuals provider '{}' is registered but reports itself unavailable", visuals_provider.name()),
        )
        .with_remediation("Configure the provider's credentials or choose a different tier.")
        .with_stage(Stage::Visuals));
    }

    let visuals_dir = ctx.artifacts.job_dir(&job_id).join("visuals");
    let aspect = request.brief.aspect_ratio;
    let image_paths = with_retry(Stage::Visuals, cancel, || {
        let visuals_provider = visuals_provider.clone();
        let cleaned_script = cleaned_script.clone();
        let visuals_dir = visuals_dir.clone();
        let job = job.clone();
        async move {
            with_heartbeat(
                job,
                Stage::Visuals,
                heartbeat_interval,
                with_timeout(Stage::Visuals, VISUALS_TIMEOUT, async move {
                    visuals::run(visuals_provider.as_ref(), &cleaned_script, &cleaned_script, aspect, &visuals_dir).await
                }),
            )
            .await
        }
    })
    .await?;

    let mut visual_set_size: u64 = 0;
    for path in &image_paths {
        visual_set_size += tokio::fs::metadata(path).await.map(|m| m.len()).unwrap_or(0);
    }
    let visual_artifact = new_artifact(ArtifactType::VisualSet, visuals_dir.clone(), visual_set_size);
    let correlation_id = job.read().await.correlation_id.clone();
    ctx.artifacts
        .add(&job_id, &correlation_id, visual_artifact.clone())
        .await
        .map_err(|e| AppError::classify(Stage::Visuals, &e))?;
    job.write().await.artifacts.push(visual_artifact);
    job.write().await.set_percent(100);

    // --- Timeline Render ----------------------------------------------
    check_cancel(cancel, Stage::TimelineRender).await?;
    job.write().await.enter_stage(Stage::TimelineRender);
    let encoder_path = crate::validate::resolve_encoder_path(&ctx.config)
        .map_err(|e| AppError::classify(Stage::TimelineRender, &e))?;
    let render_spec = request.render_spec.clone();
    let target_duration = request.plan_spec.target_duration_secs;
    let per_image = target_duration / image_paths.len().max(1) as f64;
    let intermediate_path = ctx
        .artifacts
        .job_dir(&job_id)
        .join(format!("intermediate.{}", render_spec.container));

    with_retry(Stage::TimelineRender, cancel, || {
        let encoder_path = encoder_path.clone();
        let image_paths = image_paths.clone();
        let narration_path = narration_path.clone();
        let intermediate_path = intermediate_path.clone();
        let render_spec = render_spec.clone();
        let job = job.clone();
        async move {
            let args = render::build_encoder_args(&image_paths, &narration_path, &intermediate_path, &render_spec, per_image);
            run_encoder_pass(&job, cancel, &ctx.supervisor, &encoder_path, args, target_duration).await
        }
    })
    .await?;

    add_artifact(ctx, job, ArtifactType::IntermediateVideo, intermediate_path.clone())
        .await
        .map_err(|e| AppError::classify(Stage::TimelineRender, &e))?;
    // The generation pipeline has no separate Export stage of its own
    // (spec §4.6's diagram ends the job at TimelineRender success with a
    // final-video artifact recorded); the rendered file stands as the
    // final video unless the caller later runs a dedicated export job
    // against it (spec §4.7.1).
    add_artifact(ctx, job, ArtifactType::FinalVideo, intermediate_path)
        .await
        .map_err(|e| AppError::classify(Stage::TimelineRender, &e))?;
    job.write().await.set_percent(100);

    Ok(())
}

/// Runs an export job: a single `Export` stage (spec §4.7.1). If the
/// source is a timeline rather than an existing intermediate file, it is
/// rendered first with the same renderer as §4.5.
pub async fn run_export(ctx: RunnerContext, job: JobHandle, cancel: CancellationToken) {
    let (job_id, correlation_id) = {
        let g = job.read().await;
        (g.id.clone(), g.correlation_id.clone())
    };
    let span = tracing::info_span!("job", job_id = %job_id, correlation_id = %correlation_id);
    let _enter = span.enter();

    if cancel.is_cancelled() {
        tracing::info!("export job cancelled before it began running");
        record_failure(&job, AppError::new(ErrorCode::ECancelled, "cancelled while queued")).await;
        return;
    }

    {
        let mut g = job.write().await;
        g.state = JobState::Running;
        g.started_at = Some(Utc::now());
    }

    match run_export_inner(&ctx, &job, &cancel).await {
        Ok(()) => {
            let mut g = job.write().await;
            g.state = JobState::Succeeded;
            g.stage = Stage::Complete;
            g.percent = 100;
            g.finished_at = Some(Utc::now());
            tracing::info!("export job succeeded");
        }
        Err(err) => {
            tracing::warn!(code = ?err.code, message = %err.message, "export job failed");
            record_failure(&job, err).await;
        }
    }
}

async fn run_export_inner(ctx: &RunnerContext, job: &JobHandle, cancel: &CancellationToken) -> Result<(), AppError> {
    let request = {
        let g = job.read().await;
        g.export_request()
            .cloned()
            .ok_or_else(|| AppError::new(ErrorCode::EInternal, "export runner invoked on a non-export job"))?
    };
    let job_id = job.read().await.id.clone();
    let encoder_path = crate::validate::resolve_encoder_path(&ctx.config)
        .map_err(|e| AppError::classify(Stage::Export, &e))?;
    let preset: ExportPreset = export::find_preset(&request.preset_name)
        .ok_or_else(|| AppError::new(ErrorCode::EValidation, format!("unknown export preset '{}'", request.preset_name)).with_stage(Stage::Export))?;

    check_cancel(cancel, Stage::Export).await?;
    job.write().await.enter_stage(Stage::Export);

    let (input_path, target_duration) = match &request.source {
        ExportSource::InputFile { input_file } => (PathBuf::from(input_file), 0.0_f64),
        ExportSource::Timeline { timeline } => {
            let visuals_paths: Vec<PathBuf> = timeline.visuals.iter().map(PathBuf::from).collect();
            let narration_path = PathBuf::from(&timeline.narration_path);
            let intermediate_path = ctx
                .artifacts
                .job_dir(&job_id)
                .join(format!("timeline-render.{}", timeline.render_spec.container));
            let per_image = timeline.target_duration_secs / visuals_paths.len().max(1) as f64;
            let render_spec = timeline.render_spec.clone();
            let target_duration_secs = timeline.target_duration_secs;

            with_retry(Stage::Export, cancel, || {
                let encoder_path = encoder_path.clone();
                let visuals_paths = visuals_paths.clone();
                let narration_path = narration_path.clone();
                let intermediate_path = intermediate_path.clone();
                let render_spec = render_spec.clone();
                let job = job.clone();
                async move {
                    let args =
                        render::build_encoder_args(&visuals_paths, &narration_path, &intermediate_path, &render_spec, per_image);
                    run_encoder_pass(&job, cancel, &ctx.supervisor, &encoder_path, args, target_duration_secs).await
                }
            })
            .await?;
            (intermediate_path, timeline.target_duration_secs)
        }
    };

    let final_path = ctx.artifacts.job_dir(&job_id).join(format!("final.{}", preset.ext()));
    let result = with_retry(Stage::Export, cancel, || {
        let input_path = input_path.clone();
        let final_path = final_path.clone();
        let preset = preset.clone();
        let encoder_path = encoder_path.clone();
        let job = job.clone();
        async move {
            let (sink, forwarder) = progress_channel(&job);
            let outcome = export::run(
                &ctx.supervisor,
                &encoder_path,
                &input_path,
                &final_path,
                &preset,
                target_duration,
                &sink,
                cancel.clone(),
            )
            .await;
            drop(sink);
            let _ = forwarder.await;
            outcome
        }
    })
    .await;
    result?;

    add_artifact(ctx, job, ArtifactType::FinalVideo, final_path)
        .await
        .map_err(|e| AppError::classify(Stage::Export, &e))?;
    job.write().await.set_percent(100);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::brief::{AspectRatio, Brief, Density, Pacing, PlanSpec, RenderSpec, VoiceSpec};
    use crate::domain::job::{Job, JobRequest, Tier};
    use crate::providers::llm::RuleBasedLlm;
    use crate::providers::tts::NullTts;
    use crate::providers::visuals::SlideshowVisuals;
    use tempfile::tempdir;

    async fn test_ctx(dir: &std::path::Path) -> RunnerContext {
        let providers = ProviderRegistry::new();
        providers.register_llm(Arc::new(RuleBasedLlm)).await;
        providers.register_tts(Arc::new(NullTts)).await;
        providers.register_visuals(Arc::new(SlideshowVisuals)).await;
        let mut config = Config::default();
        config.output_dir = dir.to_path_buf();
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

    /// Spec requires that a job cancelled while still queued never observes
    /// `Running`; it must be recorded as `Cancelled` and never started.
    #[tokio::test]
    async fn generation_cancelled_before_dispatch_never_runs() {
        let dir = tempdir().unwrap();
        let ctx = test_ctx(dir.path()).await;
        let job: JobHandle = Arc::new(RwLock::new(Job::new("job-1".to_string(), sample_request())));
        let cancel = CancellationToken::new();
        cancel.cancel();

        run_generation(ctx, job.clone(), cancel).await;

        let g = job.read().await;
        assert_eq!(g.state, JobState::Cancelled);
        assert!(g.started_at.is_none());
        assert_eq!(g.errors.last().unwrap().code, ErrorCode::ECancelled);
    }
}
