//! Export stage and export presets (spec §4.5 "Export", §4.7.1).
//!
//! Export transcodes an intermediate video per a chosen platform preset
//! into the final file. It can run as the last stage of a generation job
//! or as an independently queued job type (§4.7.1).

use std::path::Path;

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::domain::brief::AspectRatio;
use crate::pipeline::render::{compute_percent, is_progress_end, parse_progress_line};
use crate::pipeline::ProgressSink;
use crate::process::ProcessSupervisor;

#[derive(Debug, Clone, Serialize)]
pub struct ExportPreset {
    pub name: &'static str,
    pub width: u32,
    pub height: u32,
    pub codec: &'static str,
    pub bitrate_kbps: u32,
    pub fps: u32,
    pub aspect: AspectRatio,
}

impl ExportPreset {
    /// Every preset in the closed table targets an mp4 container.
    pub fn ext(&self) -> &'static str {
        "mp4"
    }
}

/// Closed set of export presets (spec §4.5 "Export" / §4.7.1).
pub fn presets() -> Vec<ExportPreset> {
    vec![
        ExportPreset {
            name: "youtube-1080p",
            width: 1920,
            height: 1080,
            codec: "libx264",
            bitrate_kbps: 8000,
            fps: 30,
            aspect: AspectRatio::Widescreen,
        },
        ExportPreset {
            name: "youtube-shorts",
            width: 1080,
            height: 1920,
            codec: "libx264",
            bitrate_kbps: 6000,
            fps: 30,
            aspect: AspectRatio::Portrait,
        },
        ExportPreset {
            name: "instagram-reel",
            width: 1080,
            height: 1920,
            codec: "libx264",
            bitrate_kbps: 5000,
            fps: 30,
            aspect: AspectRatio::Portrait,
        },
        ExportPreset {
            name: "instagram-square",
            width: 1080,
            height: 1080,
            codec: "libx264",
            bitrate_kbps: 5000,
            fps: 30,
            aspect: AspectRatio::Square,
        },
        ExportPreset {
            name: "tiktok",
            width: 1080,
            height: 1920,
            codec: "libx264",
            bitrate_kbps: 6000,
            fps: 30,
            aspect: AspectRatio::Portrait,
        },
    ]
}

pub fn find_preset(name: &str) -> Option<ExportPreset> {
    presets().into_iter().find(|p| p.name == name)
}

fn build_args(input: &Path, output: &Path, preset: &ExportPreset) -> Vec<String> {
    vec![
        "-y".to_string(),
        "-hide_banner".to_string(),
        "-i".to_string(),
        input.to_string_lossy().to_string(),
        "-c:v".to_string(),
        preset.codec.to_string(),
        "-b:v".to_string(),
        format!("{}k", preset.bitrate_kbps),
        "-r".to_string(),
        preset.fps.to_string(),
        "-s".to_string(),
        format!("{}x{}", preset.width, preset.height),
        "-progress".to_string(),
        "pipe:2".to_string(),
        output.to_string_lossy().to_string(),
    ]
}

pub async fn run(
    supervisor: &ProcessSupervisor,
    encoder_path: &str,
    input: &Path,
    output: &Path,
    preset: &ExportPreset,
    target_duration_secs: f64,
    progress: &ProgressSink,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let args = build_args(input, output, preset);
    let handle = supervisor.spawn(encoder_path, &args, &[], None).await?;
    let mut stderr = handle
        .take_stderr_lines()
        .await
        .ok_or_else(|| anyhow::anyhow!("encoder stderr stream was already taken"))?;

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                handle.kill().await?;
                anyhow::bail!("export cancelled");
            }
            line = stderr.recv() => {
                match line {
                    Some(line) => {
                        if let Some((elapsed, _)) = parse_progress_line(&line) {
                            progress.report(compute_percent(target_duration_secs, elapsed)).await;
                        }
                        if is_progress_end(&line) {
                            progress.report(100).await;
                        }
                    }
                    None => break,
                }
            }
        }
    }

    let outcome = handle.wait().await?;
    match outcome {
        crate::process::ProcessOutcome::Exited(0) => Ok(()),
        crate::process::ProcessOutcome::Exited(code) => {
            anyhow::bail!("encoder exited with non-zero exit code {code}")
        }
        crate::process::ProcessOutcome::Killed => anyhow::bail!("export cancelled"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_are_a_closed_findable_set() {
        assert!(find_preset("youtube-1080p").is_some());
        assert!(find_preset("tiktok").is_some());
        assert!(find_preset("not-a-real-preset").is_none());
    }

    #[test]
    fn every_preset_has_positive_dimensions_and_bitrate() {
        for preset in presets() {
            assert!(preset.width > 0 && preset.height > 0);
            assert!(preset.bitrate_kbps > 0);
            assert!(preset.fps > 0);
        }
    }
}
