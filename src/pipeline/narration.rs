//! Narration stage (spec §4.5 "Narration"): calls the resolved TTS
//! provider with the cleaned script and the job's `VoiceSpec`.

use std::path::Path;

use crate::domain::brief::VoiceSpec;
use crate::providers::{AudioMetadata, TtsProvider};

pub async fn run(
    provider: &dyn TtsProvider,
    cleaned_script: &str,
    voice: &VoiceSpec,
    out_path: &Path,
) -> anyhow::Result<AudioMetadata> {
    if cleaned_script.trim().is_empty() {
        anyhow::bail!("cannot synthesize narration from an empty script");
    }
    provider.synthesize(cleaned_script, voice, out_path).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::tts::NullTts;
    use tempfile::tempdir;

    #[tokio::test]
    async fn rejects_empty_script_before_calling_provider() {
        let dir = tempdir().unwrap();
        let err = run(&NullTts, "   ", &VoiceSpec::default(), &dir.path().join("a.wav"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("empty script"));
    }

    #[tokio::test]
    async fn null_provider_produces_audio_metadata() {
        let dir = tempdir().unwrap();
        let meta = run(
            &NullTts,
            "Hello there, this is a narration line.",
            &VoiceSpec::default(),
            &dir.path().join("a.wav"),
        )
        .await
        .unwrap();
        assert!(meta.duration_secs > 0.0);
    }
}
