//! Visuals capability providers (spec §4.3, §4.5 "Visuals").

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use once_cell::sync::Lazy;

use super::VisualsProvider;
use crate::domain::brief::AspectRatio;

macro_rules! remote_visuals_stub {
    ($struct_name:ident, $provider_name:literal) => {
        pub struct $struct_name {
            pub api_key: Option<String>,
        }

        #[async_trait]
        impl VisualsProvider for $struct_name {
            fn name(&self) -> &'static str {
                $provider_name
            }

            async fn generate(
                &self,
                prompt: &str,
                _aspect: AspectRatio,
                count: usize,
                _out_dir: &Path,
            ) -> anyhow::Result<Vec<PathBuf>> {
                anyhow::bail!(
                    "provider call to {} is not implemented in this build (prompt_len={}, count={})",
                    $provider_name,
                    prompt.len(),
                    count
                )
            }

            async fn available(&self) -> bool {
                self.api_key.is_some()
            }
        }
    };
}

remote_visuals_stub!(StabilityVisuals, "stability");
remote_visuals_stub!(RunwayVisuals, "runway");

/// Local Stable-Diffusion-class runner. Requires an nvidia GPU with
/// >= 6 GiB VRAM to even appear in the downgrade chain (spec §4.3 step 1,
/// the `LocalSD?` conditional entry); gating happens at registration time
/// in the startup wiring, not inside the resolver.
pub struct LocalSdVisuals;

#[async_trait]
impl VisualsProvider for LocalSdVisuals {
    fn name(&self) -> &'static str {
        "localsd"
    }

    async fn generate(
        &self,
        prompt: &str,
        _aspect: AspectRatio,
        count: usize,
        _out_dir: &Path,
    ) -> anyhow::Result<Vec<PathBuf>> {
        anyhow::bail!(
            "provider call to localsd is not implemented in this build (prompt_len={}, count={})",
            prompt.len(),
            count
        )
    }

    async fn available(&self) -> bool {
        false
    }
}

static STOP_WORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "the", "and", "for", "with", "that", "this", "from", "your", "have", "about", "into",
        "will", "they", "them", "than", "then", "what", "when", "where", "which", "while", "some",
        "such", "these", "those", "being", "been", "here", "there", "over", "under", "also",
    ]
    .into_iter()
    .collect()
});

/// Translates a narration prompt into 1-5 content keywords for a stock
/// photo search: stop-word filtered, word length > 3, max 5 (spec §4.5).
pub fn extract_keywords(prompt: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut keywords = Vec::new();
    for raw in prompt.split_whitespace() {
        let word: String = raw
            .chars()
            .filter(|c| c.is_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();
        if word.chars().count() <= 3 {
            continue;
        }
        if STOP_WORDS.contains(word.as_str()) {
            continue;
        }
        if !seen.insert(word.clone()) {
            continue;
        }
        keywords.push(word);
        if keywords.len() == 5 {
            break;
        }
    }
    keywords
}

fn orientation_for(aspect: AspectRatio) -> &'static str {
    match aspect {
        AspectRatio::Widescreen => "landscape",
        AspectRatio::Portrait => "portrait",
        AspectRatio::Square => "squarish",
        AspectRatio::Standard => "landscape",
    }
}

/// Stock-photo provider: turns the scene prompt into keywords and an
/// orientation hint. Network calls are out of scope; this build writes a
/// placeholder file per scene so the render stage has inputs to compose.
pub struct StockVisuals;

#[async_trait]
impl VisualsProvider for StockVisuals {
    fn name(&self) -> &'static str {
        "stock"
    }

    async fn generate(
        &self,
        prompt: &str,
        aspect: AspectRatio,
        count: usize,
        out_dir: &Path,
    ) -> anyhow::Result<Vec<PathBuf>> {
        let keywords = extract_keywords(prompt);
        let orientation = orientation_for(aspect);
        std::fs::create_dir_all(out_dir)?;
        let mut paths = Vec::with_capacity(count);
        for i in 0..count {
            let path = out_dir.join(format!("stock-{i:03}.txt"));
            std::fs::write(
                &path,
                format!("stock placeholder orientation={orientation} keywords={keywords:?}"),
            )?;
            paths.push(path);
        }
        Ok(paths)
    }

    async fn available(&self) -> bool {
        true
    }
}

/// Solid-colour-frame terminal fallback. Always available, never fails
/// (spec §4.3 "Terminal fallback").
pub struct SlideshowVisuals;

#[async_trait]
impl VisualsProvider for SlideshowVisuals {
    fn name(&self) -> &'static str {
        "slideshow"
    }

    async fn generate(
        &self,
        _prompt: &str,
        _aspect: AspectRatio,
        count: usize,
        out_dir: &Path,
    ) -> anyhow::Result<Vec<PathBuf>> {
        std::fs::create_dir_all(out_dir)?;
        let palette = ["#1d3557", "#457b9d", "#a8dadc", "#f1faee", "#e63946"];
        let mut paths = Vec::with_capacity(count);
        for i in 0..count.max(1) {
            let colour = palette[i % palette.len()];
            let path = out_dir.join(format!("slide-{i:03}.txt"));
            std::fs::write(&path, format!("solid-colour frame {colour}"))?;
            paths.push(path);
        }
        Ok(paths)
    }

    async fn available(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn extract_keywords_filters_stopwords_and_short_words() {
        let keywords = extract_keywords("the and for with solar panels generate electricity");
        assert_eq!(keywords, vec!["solar", "panels", "generate", "electricity"]);
    }

    #[test]
    fn extract_keywords_caps_at_five() {
        let keywords = extract_keywords("alpha bravo charlie delta echo foxtrot golf hotel");
        assert_eq!(keywords.len(), 5);
    }

    #[tokio::test]
    async fn slideshow_always_succeeds_and_writes_requested_count() {
        let dir = tempdir().unwrap();
        let provider = SlideshowVisuals;
        let paths = provider
            .generate("anything", AspectRatio::Widescreen, 3, dir.path())
            .await
            .unwrap();
        assert_eq!(paths.len(), 3);
        assert!(provider.available().await);
    }
}
