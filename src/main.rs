use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use aura_studio::artifacts::ArtifactStore;
use aura_studio::config::{Cli, Config};
use aura_studio::http::{self, AppState};
use aura_studio::process::ProcessSupervisor;
use aura_studio::providers::llm::{AzureLlm, GeminiLlm, OllamaLlm, OpenAiLlm, RemoteLlmConfig, RuleBasedLlm};
use aura_studio::providers::tts::{ElevenLabsTts, Mimic3Tts, NullTts, PiperTts, PlayHtTts, WindowsTts};
use aura_studio::providers::visuals::{
    LocalSdVisuals, RunwayVisuals, SlideshowVisuals, StabilityVisuals, StockVisuals,
};
use aura_studio::providers::ProviderRegistry;
use aura_studio::queue::JobQueue;
use aura_studio::runner::RunnerContext;
use aura_studio::shutdown;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = Arc::new(Config::load(&cli).context("loading configuration")?);
    std::fs::create_dir_all(&config.output_dir)
        .with_context(|| format!("creating output directory {:?}", config.output_dir))?;
    tracing::info!(?config, "starting aura-studio");

    let providers = Arc::new(register_providers().await);
    let artifacts = Arc::new(ArtifactStore::new(config.output_dir.clone()));
    let supervisor = ProcessSupervisor::new();

    let ctx = RunnerContext {
        config: config.clone(),
        providers,
        artifacts,
        supervisor: supervisor.clone(),
    };
    let queue = Arc::new(JobQueue::new(ctx));
    let shutdown_notify = Arc::new(tokio::sync::Notify::new());

    let state = Arc::new(AppState {
        queue: queue.clone(),
        config: config.clone(),
        supervisor: supervisor.clone(),
        shutdown_notify: shutdown_notify.clone(),
    });
    let app = http::router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("binding to {}", config.bind_addr))?;
    tracing::info!(addr = %config.bind_addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(wait_for_shutdown(shutdown_notify))
        .await
        .context("serving HTTP API")?;

    let summary = shutdown::run(&queue, &supervisor).await;
    tracing::info!(?summary, "shutdown coordinator finished");
    Ok(())
}

/// Resolves on either a process signal or an explicit `/system/shutdown`
/// request, whichever comes first (spec §4.9).
async fn wait_for_shutdown(notify: Arc<tokio::sync::Notify>) {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
        _ = notify.notified() => {}
    }
}

/// Registers every provider capability at startup. Terminal fallbacks
/// (`rulebased`/`null`/`slideshow`) are unconditional per spec §4.3 "the
/// terminal fallback is always registered". `Ollama` and `LocalSd` gate
/// registration itself on a one-time startup probe (daemon/GPU presence
/// can't change per-call). The API-key-gated remote providers (OpenAI,
/// Azure, Gemini, ElevenLabs, PlayHt, Stability, Runway) are registered
/// unconditionally instead — the resolver (§4.3 "Totality of Resolver") only
/// ever consults registration, never `available()` — and an unconfigured one
/// is caught by the runner's cached `available()` check right before
/// invocation (spec §5 "Availability caching"), failing fast with
/// `E_ProviderUnavailable` rather than attempting a doomed call.
async fn register_providers() -> ProviderRegistry {
    let registry = ProviderRegistry::new();

    registry.register_llm(Arc::new(RuleBasedLlm)).await;
    registry
        .register_llm(Arc::new(OpenAiLlm {
            config: RemoteLlmConfig {
                endpoint: "https://api.openai.com/v1".to_string(),
                api_key: std::env::var("OPENAI_API_KEY").ok(),
            },
        }))
        .await;
    registry
        .register_llm(Arc::new(AzureLlm {
            config: RemoteLlmConfig {
                endpoint: std::env::var("AZURE_OPENAI_ENDPOINT").unwrap_or_default(),
                api_key: std::env::var("AZURE_OPENAI_API_KEY").ok(),
            },
        }))
        .await;
    registry
        .register_llm(Arc::new(GeminiLlm {
            config: RemoteLlmConfig {
                endpoint: "https://generativelanguage.googleapis.com".to_string(),
                api_key: std::env::var("GEMINI_API_KEY").ok(),
            },
        }))
        .await;
    registry
        .register_llm(Arc::new(OllamaLlm {
            endpoint: std::env::var("OLLAMA_ENDPOINT").unwrap_or_else(|_| "http://127.0.0.1:11434".to_string()),
            reachable: which::which("ollama").is_ok(),
        }))
        .await;

    registry.register_tts(Arc::new(NullTts)).await;
    registry.register_tts(Arc::new(Mimic3Tts)).await;
    registry.register_tts(Arc::new(PiperTts)).await;
    registry.register_tts(Arc::new(WindowsTts)).await;
    registry
        .register_tts(Arc::new(ElevenLabsTts {
            api_key: std::env::var("ELEVENLABS_API_KEY").ok(),
        }))
        .await;
    registry
        .register_tts(Arc::new(PlayHtTts {
            api_key: std::env::var("PLAYHT_API_KEY").ok(),
        }))
        .await;

    registry.register_visuals(Arc::new(SlideshowVisuals)).await;
    registry.register_visuals(Arc::new(StockVisuals)).await;
    // LocalSD requires an nvidia GPU with >= 6 GiB VRAM (spec §4.3 step 1);
    // there is no GPU-probing crate in this build's dependency set, so
    // `nvidia-smi` on PATH is used as an approximate proxy (see DESIGN.md).
    if which::which("nvidia-smi").is_ok() {
        registry.register_visuals(Arc::new(LocalSdVisuals)).await;
    }
    registry
        .register_visuals(Arc::new(StabilityVisuals {
            api_key: std::env::var("STABILITY_API_KEY").ok(),
        }))
        .await;
    registry
        .register_visuals(Arc::new(RunwayVisuals {
            api_key: std::env::var("RUNWAY_API_KEY").ok(),
        }))
        .await;

    registry
}
