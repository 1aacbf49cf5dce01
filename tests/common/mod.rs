//! Shared test harness: boots a real axum server against the mock encoder
//! binary, so HTTP-surface tests exercise subprocess supervision without a
//! real FFmpeg build on the test host.

use std::sync::Arc;

use aura_studio::artifacts::ArtifactStore;
use aura_studio::config::Config;
use aura_studio::http::{self, AppState};
use aura_studio::process::ProcessSupervisor;
use aura_studio::providers::llm::RuleBasedLlm;
use aura_studio::providers::tts::NullTts;
use aura_studio::providers::visuals::SlideshowVisuals;
use aura_studio::providers::ProviderRegistry;
use aura_studio::queue::JobQueue;
use aura_studio::runner::RunnerContext;

pub struct TestApp {
    pub base_url: String,
    pub _dir: tempfile::TempDir,
}

pub async fn spawn() -> TestApp {
    let dir = tempfile::tempdir().expect("tempdir");

    let providers = ProviderRegistry::new();
    providers.register_llm(Arc::new(RuleBasedLlm)).await;
    providers.register_tts(Arc::new(NullTts)).await;
    providers.register_visuals(Arc::new(SlideshowVisuals)).await;

    let mut config = Config::default();
    config.output_dir = dir.path().to_path_buf();
    config.encoder_path = Some(env!("CARGO_BIN_EXE_mock_ffmpeg").to_string());
    config.event_poll_interval_ms = 20;
    let config = Arc::new(config);

    let ctx = RunnerContext {
        config: config.clone(),
        providers: Arc::new(providers),
        artifacts: Arc::new(ArtifactStore::new(dir.path().to_path_buf())),
        supervisor: ProcessSupervisor::new(),
    };
    let supervisor = ctx.supervisor.clone();
    let queue = Arc::new(JobQueue::new(ctx));
    let state = Arc::new(AppState {
        queue,
        config,
        supervisor,
        shutdown_notify: Arc::new(tokio::sync::Notify::new()),
    });
    let app = http::router(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind ephemeral port");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });

    TestApp {
        base_url: format!("http://{addr}"),
        _dir: dir,
    }
}

pub fn sample_job_body() -> serde_json::Value {
    serde_json::json!({
        "brief": {
            "topic": "How solar panels work",
            "audience": "general",
            "goal": "educate",
            "tone": "friendly",
            "language": "en",
            "aspectRatio": "widescreen"
        },
        "planSpec": {
            "targetDurationSecs": 12.0,
            "pacing": "medium",
            "density": "balanced",
            "style": "explainer"
        },
        "voiceSpec": { "voiceName": "default", "rate": 1.0, "pitch": 0.0, "interSentencePauseMs": 150 },
        "renderSpec": {
            "width": 640, "height": 360, "container": "mp4",
            "videoBitrateKbps": 1000, "audioBitrateKbps": 128,
            "fps": 24, "codec": "libx264", "quality": 50, "sceneCut": false
        },
        "tier": "free"
    })
}
