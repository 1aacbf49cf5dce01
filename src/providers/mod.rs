//! Provider Registry & Resolver (C2, spec §4.3).

pub mod llm;
pub mod resolve;
pub mod tts;
pub mod visuals;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};

use crate::domain::job::Tier;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    Llm,
    Tts,
    Visuals,
}

#[async_trait]
pub trait LlmProvider: Send + Sync {
    fn name(&self) -> &'static str;
    async fn generate(&self, system_prompt: &str, user_prompt: &str) -> anyhow::Result<String>;
    async fn available(&self) -> bool {
        true
    }
}

pub struct AudioMetadata {
    pub duration_secs: f64,
}

#[async_trait]
pub trait TtsProvider: Send + Sync {
    fn name(&self) -> &'static str;
    async fn synthesize(
        &self,
        text: &str,
        voice: &crate::domain::brief::VoiceSpec,
        out_path: &std::path::Path,
    ) -> anyhow::Result<AudioMetadata>;
    async fn available(&self) -> bool {
        true
    }
}

#[async_trait]
pub trait VisualsProvider: Send + Sync {
    fn name(&self) -> &'static str;
    async fn generate(
        &self,
        prompt: &str,
        aspect: crate::domain::brief::AspectRatio,
        count: usize,
        out_dir: &std::path::Path,
    ) -> anyhow::Result<Vec<std::path::PathBuf>>;
    async fn available(&self) -> bool {
        true
    }
}

/// Caches a provider's `available()` result for 30s per (capability, name)
/// pair (spec §4.9/§5 "Availability caching") to avoid hammering remote APIs
/// during admission bursts. Consulted by the runner right before it invokes
/// a resolved provider, so a provider that resolve() picked deterministically
/// but that reports itself unavailable fails fast with `E_ProviderUnavailable`
/// instead of attempting (and waiting out) a doomed call.
struct AvailabilityCache {
    ttl: Duration,
    entries: Mutex<HashMap<(Capability, &'static str), (bool, Instant)>>,
}

impl AvailabilityCache {
    fn new() -> Self {
        Self {
            ttl: Duration::from_secs(30),
            entries: Mutex::new(HashMap::new()),
        }
    }

    async fn get_or_compute<F>(&self, capability: Capability, name: &'static str, compute: F) -> bool
    where
        F: std::future::Future<Output = bool>,
    {
        let key = (capability, name);
        {
            let entries = self.entries.lock().await;
            if let Some((value, at)) = entries.get(&key) {
                if at.elapsed() < self.ttl {
                    return *value;
                }
            }
        }
        let value = compute.await;
        let mut entries = self.entries.lock().await;
        entries.insert(key, (value, Instant::now()));
        value
    }
}

/// Registry of providers per capability. Read-mostly: set at startup,
/// resolved under a read lock; plugin-style reload takes the write lock.
pub struct ProviderRegistry {
    llm: RwLock<HashMap<String, Arc<dyn LlmProvider>>>,
    tts: RwLock<HashMap<String, Arc<dyn TtsProvider>>>,
    visuals: RwLock<HashMap<String, Arc<dyn VisualsProvider>>>,
    availability: AvailabilityCache,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self {
            llm: RwLock::new(HashMap::new()),
            tts: RwLock::new(HashMap::new()),
            visuals: RwLock::new(HashMap::new()),
            availability: AvailabilityCache::new(),
        }
    }

    pub async fn register_llm(&self, provider: Arc<dyn LlmProvider>) {
        let mut map = self.llm.write().await;
        map.insert(normalize_name(provider.name()), provider);
    }

    pub async fn register_tts(&self, provider: Arc<dyn TtsProvider>) {
        let mut map = self.tts.write().await;
        map.insert(normalize_name(provider.name()), provider);
    }

    pub async fn register_visuals(&self, provider: Arc<dyn VisualsProvider>) {
        let mut map = self.visuals.write().await;
        map.insert(normalize_name(provider.name()), provider);
    }

    pub async fn llm_names(&self) -> Vec<String> {
        self.llm.read().await.keys().cloned().collect()
    }

    pub async fn tts_names(&self) -> Vec<String> {
        self.tts.read().await.keys().cloned().collect()
    }

    pub async fn visuals_names(&self) -> Vec<String> {
        self.visuals.read().await.keys().cloned().collect()
    }

    pub async fn get_llm(&self, name: &str) -> Option<Arc<dyn LlmProvider>> {
        self.llm.read().await.get(&normalize_name(name)).cloned()
    }

    pub async fn get_tts(&self, name: &str) -> Option<Arc<dyn TtsProvider>> {
        self.tts.read().await.get(&normalize_name(name)).cloned()
    }

    pub async fn get_visuals(&self, name: &str) -> Option<Arc<dyn VisualsProvider>> {
        self.visuals
            .read()
            .await
            .get(&normalize_name(name))
            .cloned()
    }

    /// Checks (and caches for 30s) whether an LLM provider reports itself
    /// available, per spec §5 "Availability caching".
    pub async fn llm_available_cached(&self, provider: &dyn LlmProvider) -> bool {
        let name = provider.name();
        self.availability
            .get_or_compute(Capability::Llm, name, provider.available())
            .await
    }

    pub async fn tts_available_cached(&self, provider: &dyn TtsProvider) -> bool {
        let name = provider.name();
        self.availability
            .get_or_compute(Capability::Tts, name, provider.available())
            .await
    }

    pub async fn visuals_available_cached(&self, provider: &dyn VisualsProvider) -> bool {
        let name = provider.name();
        self.availability
            .get_or_compute(Capability::Visuals, name, provider.available())
            .await
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Case- and synonym-tolerant name normalization (spec §4.3 "Tie-breaks").
pub fn normalize_name(raw: &str) -> String {
    let lower = raw.trim().to_ascii_lowercase();
    match lower.as_str() {
        "gpt" | "gpt-4" | "gpt4" | "open-ai" => "openai".to_string(),
        "msazure" | "azure-openai" => "azure".to_string(),
        "google" | "google-gemini" => "gemini".to_string(),
        "local-llama" | "llama" => "ollama".to_string(),
        "rule-based" | "rules" | "template" => "rulebased".to_string(),
        "eleven-labs" | "elevenlabs.io" => "elevenlabs".to_string(),
        "play.ht" | "play-ht" => "playht".to_string(),
        "mimic-3" => "mimic3".to_string(),
        "windows-sapi" | "sapi" => "windows".to_string(),
        "null" | "silence" => "null".to_string(),
        "local-sd" | "stable-diffusion" | "sd" => "localsd".to_string(),
        "stockphoto" | "stock-photos" => "stock".to_string(),
        other => other.to_string(),
    }
}

pub use resolve::{resolve, ProviderDecision};

/// Tier argument used by [`resolve`]. `Specific` carries the requested
/// provider name separately (spec §4.3).
#[derive(Debug, Clone)]
pub enum ResolveTier {
    Free,
    ProIfAvailable,
    Pro,
    Specific(String),
}

impl ResolveTier {
    pub fn from_job_tier(tier: Tier, specific: Option<String>) -> Self {
        match (tier, specific) {
            (Tier::Specific, Some(name)) => ResolveTier::Specific(name),
            (Tier::Specific, None) => ResolveTier::Free,
            (Tier::Free, _) => ResolveTier::Free,
            (Tier::ProIfAvailable, _) => ResolveTier::ProIfAvailable,
            (Tier::Pro, _) => ResolveTier::Pro,
        }
    }
}
