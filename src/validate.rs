//! Pre-Generation Validator (C4, spec §4.2).
//!
//! Runs synchronously before admission. Never mutates job state; just
//! reports issues. Each check produces a distinct message so the caller can
//! surface all problems at once rather than one at a time.

use serde::Serialize;
use sysinfo::{System, SystemExt};

use crate::config::Config;
use crate::domain::brief::{Brief, PlanSpec};
use crate::error::{AppError, ErrorCode};

const MIN_ENCODER_VERSION: (u32, u32, u32) = (4, 0, 0);
const MIN_FREE_BYTES: u64 = 1024 * 1024 * 1024;
const MIN_LOGICAL_CORES: usize = 2;
const MIN_RAM_BYTES: u64 = 4 * 1024 * 1024 * 1024;

#[derive(Debug, Clone, Serialize)]
pub struct ValidationIssue {
    pub code: ErrorCode,
    pub message: String,
    pub fatal: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    pub ok: bool,
    pub issues: Vec<ValidationIssue>,
}

pub struct Validator<'a> {
    config: &'a Config,
}

impl<'a> Validator<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self { config }
    }

    pub fn validate(&self, brief: &Brief, plan: &PlanSpec) -> ValidationReport {
        let mut issues = self.check_encoder_and_disk();

        if !brief.topic_is_valid() {
            issues.push(ValidationIssue {
                code: ErrorCode::EValidation,
                message: "topic must be at least 3 characters after trimming".to_string(),
                fatal: true,
            });
        }

        if !plan.duration_is_valid() {
            issues.push(ValidationIssue {
                code: ErrorCode::EValidation,
                message: "target duration must be between 10s and 30min".to_string(),
                fatal: true,
            });
        }

        let mut sys = System::new();
        sys.refresh_cpu();
        sys.refresh_memory();
        let cores = sys.cpus().len().max(1);
        if cores < MIN_LOGICAL_CORES {
            issues.push(ValidationIssue {
                code: ErrorCode::EValidation,
                message: format!("host has only {cores} logical core(s); at least 2 recommended"),
                fatal: true,
            });
        }
        let ram_bytes = sys.total_memory() * 1024;
        if ram_bytes < MIN_RAM_BYTES {
            issues.push(ValidationIssue {
                code: ErrorCode::EValidation,
                message: format!(
                    "host has {:.1} GiB RAM; 4 GiB recommended on first run",
                    ram_bytes as f64 / MIN_RAM_BYTES as f64 * 4.0
                ),
                fatal: false,
            });
        }

        let ok = !issues.iter().any(|i| i.fatal);
        ValidationReport { ok, issues }
    }

    /// Lighter pre-admission check for export jobs (spec §4.7.1): no brief
    /// or duration to check, just that the encoder and disk are usable.
    pub fn validate_export(&self) -> ValidationReport {
        let issues = self.check_encoder_and_disk();
        let ok = !issues.iter().any(|i| i.fatal);
        ValidationReport { ok, issues }
    }

    fn check_encoder_and_disk(&self) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();

        match self.resolve_encoder_path() {
            Ok(path) => {
                if let Err(e) = self.check_encoder_version(&path) {
                    issues.push(ValidationIssue {
                        code: ErrorCode::ENoEncoder,
                        message: e.to_string(),
                        fatal: true,
                    });
                }
            }
            Err(e) => issues.push(ValidationIssue {
                code: ErrorCode::ENoEncoder,
                message: e.to_string(),
                fatal: true,
            }),
        }

        if let Err(e) = self.check_disk_space() {
            issues.push(ValidationIssue {
                code: ErrorCode::EDiskSpace,
                message: e.to_string(),
                fatal: true,
            });
        }

        issues
    }

    pub fn as_app_error(report: &ValidationReport) -> Option<AppError> {
        let first_fatal = report.issues.iter().find(|i| i.fatal)?;
        Some(
            AppError::new(first_fatal.code, first_fatal.message.clone()).with_remediation(
                match first_fatal.code {
                    ErrorCode::ENoEncoder => "Install the encoder or configure its path.",
                    ErrorCode::EDiskSpace => "Free up disk space on the output drive.",
                    _ => "Fix the reported input and resubmit.",
                },
            ),
        )
    }

    fn resolve_encoder_path(&self) -> anyhow::Result<String> {
        resolve_encoder_path(self.config)
    }

    fn check_encoder_version(&self, path: &str) -> anyhow::Result<()> {
        let output = std::process::Command::new(path)
            .arg("-version")
            .output()
            .map_err(|e| anyhow::anyhow!("failed to run '{path} -version': {e}"))?;
        let text = String::from_utf8_lossy(&output.stdout);
        let version = parse_encoder_version(&text)
            .ok_or_else(|| anyhow::anyhow!("could not determine encoder version from output"))?;
        if version < MIN_ENCODER_VERSION {
            anyhow::bail!(
                "encoder version {}.{}.{} is below the minimum required {}.{}.{}",
                version.0,
                version.1,
                version.2,
                MIN_ENCODER_VERSION.0,
                MIN_ENCODER_VERSION.1,
                MIN_ENCODER_VERSION.2
            );
        }
        Ok(())
    }

    fn check_disk_space(&self) -> anyhow::Result<()> {
        std::fs::create_dir_all(&self.config.output_dir)
            .map_err(|e| anyhow::anyhow!("cannot create output directory: {e}"))?;
        let free = free_bytes(&self.config.output_dir)?;
        if free < MIN_FREE_BYTES {
            anyhow::bail!(
                "output drive has only {:.2} GiB free; at least 1 GiB required",
                free as f64 / MIN_FREE_BYTES as f64
            );
        }
        Ok(())
    }
}

#[cfg(unix)]
fn free_bytes(path: &std::path::Path) -> anyhow::Result<u64> {
    use std::ffi::CString;
    use std::mem::MaybeUninit;

    let c_path = CString::new(path.to_string_lossy().as_bytes())
        .map_err(|e| anyhow::anyhow!("invalid path for statvfs: {e}"))?;
    unsafe {
        let mut stat: MaybeUninit<libc::statvfs> = MaybeUninit::uninit();
        let rc = libc::statvfs(c_path.as_ptr(), stat.as_mut_ptr());
        if rc != 0 {
            anyhow::bail!("statvfs failed for {path:?}");
        }
        let stat = stat.assume_init();
        Ok(stat.f_bavail as u64 * stat.f_frsize as u64)
    }
}

#[cfg(not(unix))]
fn free_bytes(_path: &std::path::Path) -> anyhow::Result<u64> {
    // No portable stdlib API for free disk space outside unix; treat as
    // "plenty" rather than failing admission on platforms we cannot probe.
    Ok(u64::MAX)
}

/// Resolves the encoder binary per spec §4.2 check 1: explicit config path,
/// then system PATH, then platform well-known install locations. Shared by
/// the validator and by stages that need to invoke the encoder directly.
pub fn resolve_encoder_path(config: &Config) -> anyhow::Result<String> {
    if let Some(path) = &config.encoder_path {
        if std::path::Path::new(path).exists() {
            return Ok(path.clone());
        }
        anyhow::bail!("configured encoder path '{path}' does not exist");
    }
    if let Ok(path) = which::which("ffmpeg") {
        return Ok(path.to_string_lossy().to_string());
    }
    for candidate in well_known_encoder_paths() {
        if candidate.is_file() {
            return Ok(candidate.to_string_lossy().to_string());
        }
    }
    Err(anyhow::anyhow!("encoder binary not found on PATH or well-known locations"))
}

/// Fixed, non-exhaustive list of install locations a platform's package
/// manager commonly drops ffmpeg at, probed only once PATH resolution has
/// already failed. A much shallower version of the teacher's multi-source
/// `discover_candidates` (`ffui_core/tools/discover.rs`) — no registry scan
/// or Everything SDK index (both Windows-only and out of scope here), just
/// the handful of locations that catch the common "installed but shell
/// hasn't re-sourced its PATH" case.
#[cfg(target_os = "macos")]
fn well_known_encoder_paths() -> Vec<std::path::PathBuf> {
    vec!["/opt/homebrew/bin/ffmpeg".into(), "/usr/local/bin/ffmpeg".into()]
}

#[cfg(target_os = "windows")]
fn well_known_encoder_paths() -> Vec<std::path::PathBuf> {
    let mut paths = Vec::new();
    if let Some(program_files) = std::env::var_os("ProgramFiles").map(std::path::PathBuf::from) {
        paths.push(program_files.join("ffmpeg").join("bin").join("ffmpeg.exe"));
    }
    paths.push(std::path::PathBuf::from(r"C:\ffmpeg\bin\ffmpeg.exe"));
    paths
}

#[cfg(all(unix, not(target_os = "macos")))]
fn well_known_encoder_paths() -> Vec<std::path::PathBuf> {
    vec![
        "/usr/bin/ffmpeg".into(),
        "/usr/local/bin/ffmpeg".into(),
        "/snap/bin/ffmpeg".into(),
    ]
}

fn parse_encoder_version(text: &str) -> Option<(u32, u32, u32)> {
    let first_line = text.lines().next()?;
    let marker = "version ";
    let idx = first_line.find(marker)? + marker.len();
    let rest = &first_line[idx..];
    let token = rest.split_whitespace().next()?;
    let digits: String = token
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    let mut parts = digits.split('.');
    let major = parts.next()?.parse().ok()?;
    let minor = parts.next().unwrap_or("0").parse().ok()?;
    let patch = parts.next().unwrap_or("0").parse().ok()?;
    Some((major, minor, patch))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ffmpeg_style_version_line() {
        let text = "ffmpeg version 6.1.1-essentials_build ...\nbuilt with gcc";
        assert_eq!(parse_encoder_version(text), Some((6, 1, 1)));
    }

    #[test]
    fn parses_short_version_string() {
        let text = "ffmpeg version 4.0\n";
        assert_eq!(parse_encoder_version(text), Some((4, 0, 0)));
    }

    #[test]
    fn rejects_missing_version_marker() {
        let text = "some unrelated tool output\n";
        assert_eq!(parse_encoder_version(text), None);
    }

    #[test]
    fn well_known_encoder_paths_are_all_absolute() {
        for path in well_known_encoder_paths() {
            assert!(path.is_absolute(), "{path:?} should be an absolute path");
        }
    }
}
