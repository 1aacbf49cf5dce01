//! TTS capability providers (spec §4.3).

use async_trait::async_trait;

use super::{AudioMetadata, TtsProvider};
use crate::domain::brief::VoiceSpec;

const WORDS_PER_MINUTE: f64 = 150.0;
const WAV_SAMPLE_RATE: u32 = 16_000;

macro_rules! remote_tts_stub {
    ($struct_name:ident, $provider_name:literal) => {
        pub struct $struct_name {
            pub api_key: Option<String>,
        }

        #[async_trait]
        impl TtsProvider for $struct_name {
            fn name(&self) -> &'static str {
                $provider_name
            }

            async fn synthesize(
                &self,
                text: &str,
                _voice: &VoiceSpec,
                _out_path: &std::path::Path,
            ) -> anyhow::Result<AudioMetadata> {
                anyhow::bail!(
                    "provider call to {} is not implemented in this build (text_len={})",
                    $provider_name,
                    text.len()
                )
            }

            async fn available(&self) -> bool {
                self.api_key.is_some()
            }
        }
    };
}

remote_tts_stub!(ElevenLabsTts, "elevenlabs");
remote_tts_stub!(PlayHtTts, "playht");

/// Local CLI-wrapper style providers. Available when the configured binary
/// resolves on PATH; invocation itself is out of scope beyond the
/// capability interface.
macro_rules! local_tts_stub {
    ($struct_name:ident, $provider_name:literal, $binary:literal) => {
        pub struct $struct_name;

        #[async_trait]
        impl TtsProvider for $struct_name {
            fn name(&self) -> &'static str {
                $provider_name
            }

            async fn synthesize(
                &self,
                text: &str,
                _voice: &VoiceSpec,
                _out_path: &std::path::Path,
            ) -> anyhow::Result<AudioMetadata> {
                anyhow::bail!(
                    "provider call to {} ({}) is not implemented in this build (text_len={})",
                    $provider_name,
                    $binary,
                    text.len()
                )
            }

            async fn available(&self) -> bool {
                which::which($binary).is_ok()
            }
        }
    };
}

local_tts_stub!(Mimic3Tts, "mimic3", "mimic3");
local_tts_stub!(PiperTts, "piper", "piper");
local_tts_stub!(WindowsTts, "windows", "espeak-ng");

/// Silence-generating terminal fallback: produces a WAV whose duration
/// matches the estimated read time of the cleaned script at 150 WPM
/// (spec §4.5 "Narration"). Always available, never fails.
pub struct NullTts;

#[async_trait]
impl TtsProvider for NullTts {
    fn name(&self) -> &'static str {
        "null"
    }

    async fn synthesize(
        &self,
        text: &str,
        _voice: &VoiceSpec,
        out_path: &std::path::Path,
    ) -> anyhow::Result<AudioMetadata> {
        let duration = estimated_read_seconds(text);
        write_silent_wav(out_path, duration)?;
        Ok(AudioMetadata {
            duration_secs: duration,
        })
    }

    async fn available(&self) -> bool {
        true
    }
}

pub fn estimated_read_seconds(text: &str) -> f64 {
    let word_count = text.split_whitespace().count().max(1) as f64;
    (word_count / WORDS_PER_MINUTE * 60.0).max(1.0)
}

fn write_silent_wav(path: &std::path::Path, duration_secs: f64) -> anyhow::Result<()> {
    use std::io::Write;

    let sample_count = (WAV_SAMPLE_RATE as f64 * duration_secs).round() as u32;
    let byte_rate = WAV_SAMPLE_RATE * 2;
    let data_len = sample_count * 2;
    let riff_len = 36 + data_len;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = std::fs::File::create(path)?;
    file.write_all(b"RIFF")?;
    file.write_all(&riff_len.to_le_bytes())?;
    file.write_all(b"WAVE")?;
    file.write_all(b"fmt ")?;
    file.write_all(&16u32.to_le_bytes())?;
    file.write_all(&1u16.to_le_bytes())?; // PCM
    file.write_all(&1u16.to_le_bytes())?; // mono
    file.write_all(&WAV_SAMPLE_RATE.to_le_bytes())?;
    file.write_all(&byte_rate.to_le_bytes())?;
    file.write_all(&2u16.to_le_bytes())?; // block align
    file.write_all(&16u16.to_le_bytes())?; // bits per sample
    file.write_all(b"data")?;
    file.write_all(&data_len.to_le_bytes())?;
    file.write_all(&vec![0u8; data_len as usize])?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn estimated_read_seconds_matches_150_wpm() {
        let text: String = (0..150).map(|_| "word ").collect();
        let secs = estimated_read_seconds(&text);
        assert!((secs - 60.0).abs() < 1.0, "expected ~60s, got {secs}");
    }

    #[tokio::test]
    async fn null_tts_writes_wav_matching_duration() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.wav");
        let provider = NullTts;
        let meta = provider
            .synthesize("one two three four five", &VoiceSpec::default(), &path)
            .await
            .unwrap();
        assert!(meta.duration_secs > 0.0);
        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(&bytes[0..4], b"RIFF");
        assert_eq!(&bytes[8..12], b"WAVE");
    }
}
