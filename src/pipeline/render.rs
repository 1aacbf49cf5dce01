//! Timeline Render stage (spec §4.5 "Timeline Render").
//!
//! Composes narration + visuals into an intermediate video by invoking the
//! encoder binary through the Process Supervisor (C1). Progress is parsed
//! from the encoder's stderr (`frame=... out_time=...`) and normalized to
//! 0-100 against the target duration.

use std::path::{Path, PathBuf};

use tokio_util::sync::CancellationToken;

use crate::domain::brief::RenderSpec;
use crate::pipeline::ProgressSink;
use crate::process::ProcessSupervisor;

/// Builds the encoder argument vector for a simple image-sequence +
/// narration-track composition. Kept deliberately small: only the flags
/// the spec's RenderSpec fields actually govern.
pub fn build_encoder_args(
    visuals: &[PathBuf],
    narration_wav: &Path,
    out_path: &Path,
    spec: &RenderSpec,
    per_image_duration_secs: f64,
) -> Vec<String> {
    let mut args = vec!["-y".to_string(), "-hide_banner".to_string()];
    for image in visuals {
        args.push("-loop".to_string());
        args.push("1".to_string());
        args.push("-t".to_string());
        args.push(format!("{per_image_duration_secs:.3}"));
        args.push("-i".to_string());
        args.push(image.to_string_lossy().to_string());
    }
    args.push("-i".to_string());
    args.push(narration_wav.to_string_lossy().to_string());

    args.push("-filter_complex".to_string());
    let concat_inputs: String = (0..visuals.len()).map(|i| format!("[{i}:v]")).collect();
    args.push(format!(
        "{concat_inputs}concat=n={}:v=1:a=0[outv]",
        visuals.len().max(1)
    ));
    args.push("-map".to_string());
    args.push("[outv]".to_string());
    args.push("-map".to_string());
    args.push(format!("{}:a", visuals.len()));

    args.push("-c:v".to_string());
    args.push(spec.codec.clone());
    args.push("-b:v".to_string());
    args.push(format!("{}k", spec.video_bitrate_kbps));
    args.push("-b:a".to_string());
    args.push(format!("{}k", spec.audio_bitrate_kbps));
    args.push("-r".to_string());
    args.push(spec.fps.to_string());
    args.push("-s".to_string());
    args.push(format!("{}x{}", spec.width, spec.height));
    if spec.scene_cut {
        args.push("-sc_threshold".to_string());
        args.push("40".to_string());
    } else {
        args.push("-sc_threshold".to_string());
        args.push("0".to_string());
    }
    args.push("-progress".to_string());
    args.push("pipe:2".to_string());
    args.push(out_path.to_string_lossy().to_string());
    args
}

pub fn parse_progress_line(line: &str) -> Option<(f64, Option<f64>)> {
    let mut elapsed: Option<f64> = None;
    let mut speed: Option<f64> = None;
    for token in line.split_whitespace() {
        if let Some(rest) = token.strip_prefix("out_time_ms=") {
            if let Ok(us) = rest.parse::<f64>() {
                elapsed = Some(us / 1_000_000.0);
            }
        } else if let Some(rest) = token.strip_prefix("out_time=") {
            elapsed = Some(parse_timecode(rest));
        } else if let Some(rest) = token.strip_prefix("time=") {
            elapsed = Some(parse_timecode(rest));
        } else if let Some(rest) = token.strip_prefix("speed=") {
            if let Ok(v) = rest.trim_end_matches('x').parse::<f64>() {
                speed = Some(v);
            }
        }
    }
    elapsed.map(|e| (e, speed))
}

pub fn is_progress_end(line: &str) -> bool {
    line.split_whitespace()
        .any(|t| t.strip_prefix("progress=").map(|v| v.eq_ignore_ascii_case("end")).unwrap_or(false))
}

fn parse_timecode(s: &str) -> f64 {
    let parts: Vec<&str> = s.split(':').collect();
    if parts.len() == 3 {
        let h: f64 = parts[0].parse().unwrap_or(0.0);
        let m: f64 = parts[1].parse().unwrap_or(0.0);
        let sec: f64 = parts[2].parse().unwrap_or(0.0);
        h * 3600.0 + m * 60.0 + sec
    } else {
        s.parse().unwrap_or(0.0)
    }
}

pub fn compute_percent(target_duration_secs: f64, elapsed_secs: f64) -> u8 {
    if target_duration_secs <= 0.0 || !target_duration_secs.is_finite() {
        return 0;
    }
    let elapsed = if elapsed_secs.is_finite() && elapsed_secs > 0.0 {
        elapsed_secs
    } else {
        0.0
    };
    let ratio = (elapsed / target_duration_secs).clamp(0.0, 1.0);
    (ratio * 100.0).round() as u8
}

/// Runs the encoder to completion, reporting progress and honouring
/// cancellation. On cancel, kills the subprocess before returning
/// (spec §4.6 step 7 "resources released before the terminal state").
pub async fn run(
    supervisor: &ProcessSupervisor,
    encoder_path: &str,
    args: Vec<String>,
    target_duration_secs: f64,
    progress: &ProgressSink,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
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
                anyhow::bail!("render cancelled");
            }
            line = stderr.recv() => {
                match line {
                    Some(line) => {
                        if let Some((elapsed, _speed)) = parse_progress_line(&line) {
                            let pct = compute_percent(target_duration_secs, elapsed);
                            progress.report(pct).await;
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
        crate::process::ProcessOutcome::Killed => anyhow::bail!("render cancelled"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_out_time_and_out_time_ms() {
        let (elapsed, _) = parse_progress_line("out_time=00:01:23.45").unwrap();
        assert!((elapsed - 83.45).abs() < 0.01);

        let (elapsed_ms, _) = parse_progress_line("out_time_ms=1234567").unwrap();
        assert!((elapsed_ms - 1.234567).abs() < 0.0001);
    }

    #[test]
    fn parses_classic_frame_line_with_speed() {
        let line = "frame=  899 fps=174 q=29.0 size=12800KiB time=00:00:32.51 bitrate=3224.5kbits/s speed=6.29x";
        let (elapsed, speed) = parse_progress_line(line).unwrap();
        assert!((elapsed - 32.51).abs() < 0.01);
        assert_eq!(speed, Some(6.29));
    }

    #[test]
    fn detects_progress_end_marker() {
        assert!(is_progress_end("progress=end"));
        assert!(!is_progress_end("progress=continue"));
        assert!(!is_progress_end("frame=10"));
    }

    #[test]
    fn compute_percent_clamps_and_handles_unknown_duration() {
        assert_eq!(compute_percent(60.0, 30.0), 50);
        assert_eq!(compute_percent(60.0, 120.0), 100);
        assert_eq!(compute_percent(60.0, -5.0), 0);
        assert_eq!(compute_percent(0.0, 30.0), 0);
    }

    #[tokio::test]
    async fn run_reports_failure_for_nonzero_exit() {
        let supervisor = ProcessSupervisor::new();
        let (tx, _rx) = tokio::sync::mpsc::channel(16);
        let sink = ProgressSink::new(tx);
        let cancel = CancellationToken::new();
        let err = run(
            &supervisor,
            "sh",
            vec!["-c".to_string(), "echo fail 1>&2; exit 3".to_string()],
            60.0,
            &sink,
            cancel,
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("non-zero exit code 3"));
    }

    #[tokio::test]
    async fn run_kills_process_on_cancellation() {
        let supervisor = ProcessSupervisor::new();
        let (tx, _rx) = tokio::sync::mpsc::channel(16);
        let sink = ProgressSink::new(tx);
        let cancel = CancellationToken::new();
        let cancel_clone = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            cancel_clone.cancel();
        });
        let err = run(
            &supervisor,
            "sleep",
            vec!["5".to_string()],
            60.0,
            &sink,
            cancel,
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("cancelled"));
        assert_eq!(supervisor.live_count().await, 0);
    }
}
