//! Closed error taxonomy for the orchestrator (spec §7).
//!
//! Stage and provider code returns `anyhow::Result` internally; the runner
//! classifies failures into `AppError` at the stage boundary via
//! [`AppError::classify`]. Nothing crosses a component boundary as a raw
//! exception past that point — only `AppError` records.

use serde::{Deserialize, Serialize};

use crate::domain::job::Stage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum ErrorCode {
    EValidation,
    ENoEncoder,
    EConfigConflict,
    EProviderUnavailable,
    EProviderCall,
    ETimeout,
    ESubprocessExit,
    EDiskSpace,
    ECancelled,
    EInternal,
    EShuttingDown,
}

impl ErrorCode {
    /// Only these codes are retried by the runner (spec §4.6/§7).
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            ErrorCode::ETimeout | ErrorCode::EProviderCall | ErrorCode::ESubprocessExit
        )
    }

    pub fn http_status(self) -> http::StatusCode {
        use http::StatusCode;
        match self {
            ErrorCode::EValidation
            | ErrorCode::ENoEncoder
            | ErrorCode::EConfigConflict
            | ErrorCode::EDiskSpace => StatusCode::BAD_REQUEST,
            ErrorCode::ECancelled => StatusCode::BAD_REQUEST,
            ErrorCode::EProviderUnavailable
            | ErrorCode::EProviderCall
            | ErrorCode::ETimeout
            | ErrorCode::ESubprocessExit
            | ErrorCode::EInternal => StatusCode::INTERNAL_SERVER_ERROR,
            // Spec §4.9: in-flight requests during shutdown get an immediate
            // 503, distinct from an actual internal failure.
            ErrorCode::EShuttingDown => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::EValidation => "E_Validation",
            ErrorCode::ENoEncoder => "E_NoEncoder",
            ErrorCode::EConfigConflict => "E_ConfigConflict",
            ErrorCode::EProviderUnavailable => "E_ProviderUnavailable",
            ErrorCode::EProviderCall => "E_ProviderCall",
            ErrorCode::ETimeout => "E_Timeout",
            ErrorCode::ESubprocessExit => "E_SubprocessExit",
            ErrorCode::EDiskSpace => "E_DiskSpace",
            ErrorCode::ECancelled => "E_Cancelled",
            ErrorCode::EInternal => "E_Internal",
            ErrorCode::EShuttingDown => "E_ShuttingDown",
        }
    }
}

#[derive(Debug, Clone, thiserror::Error, Serialize, Deserialize)]
#[error("{code:?}: {message}")]
pub struct AppError {
    pub code: ErrorCode,
    pub message: String,
    pub remediation: Option<String>,
    pub stage: Option<Stage>,
}

impl AppError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            remediation: None,
            stage: None,
        }
    }

    pub fn with_remediation(mut self, remediation: impl Into<String>) -> Self {
        self.remediation = Some(remediation.into());
        self
    }

    pub fn with_stage(mut self, stage: Stage) -> Self {
        self.stage = Some(stage);
        self
    }

    /// Maps a free-form stage failure into the closed taxonomy, attaching a
    /// remediation string the way `spec.md` §4.6 "Failure enrichment"
    /// describes. Unrecognized failures fall back to `E_Internal`.
    pub fn classify(stage: Stage, err: &anyhow::Error) -> Self {
        let message = err.to_string();
        let lower = message.to_ascii_lowercase();

        if lower.contains("cancelled") || lower.contains("canceled") {
            return AppError::new(ErrorCode::ECancelled, message).with_stage(stage);
        }
        if lower.contains("timed out") || lower.contains("timeout") {
            return AppError::new(ErrorCode::ETimeout, message)
                .with_remediation("Retry or try a smaller/faster model.")
                .with_stage(stage);
        }
        if lower.contains("encoder") && (lower.contains("not found") || lower.contains("missing"))
        {
            return AppError::new(ErrorCode::ENoEncoder, message)
                .with_remediation("Install the encoder or configure its path in settings.")
                .with_stage(stage);
        }
        if lower.contains("disk") || lower.contains("no space") {
            return AppError::new(ErrorCode::EDiskSpace, message)
                .with_remediation("Free up disk space and retry.")
                .with_stage(stage);
        }
        if lower.contains("exit code") || lower.contains("non-zero exit") {
            return AppError::new(ErrorCode::ESubprocessExit, message)
                .with_remediation("Retry the job; inspect the encoder stderr log for detail.")
                .with_stage(stage);
        }
        if lower.contains("provider") {
            return AppError::new(ErrorCode::EProviderCall, message)
                .with_remediation("Retry via a new job with a different tier or provider.")
                .with_stage(stage);
        }

        AppError::new(ErrorCode::EInternal, message).with_stage(stage)
    }

    pub fn suggested_actions(&self) -> Vec<String> {
        let mut actions = Vec::new();
        if let Some(r) = &self.remediation {
            actions.push(r.clone());
        }
        match self.code {
            ErrorCode::ENoEncoder => {
                actions.push("Check the configured encoder path.".into());
                actions.push("Verify the encoder binary is executable.".into());
            }
            ErrorCode::ETimeout => {
                actions.push("Ensure sufficient RAM is available.".into());
                actions.push("Check `ollama ps` (or provider dashboard) for stuck models.".into());
            }
            ErrorCode::EDiskSpace => {
                actions.push("Remove old artifacts or choose another output drive.".into());
            }
            ErrorCode::EConfigConflict => {
                actions.push("Switch tier to Free or ProIfAvailable, or disable offline mode.".into());
            }
            _ => {}
        }
        if actions.is_empty() {
            actions.push("Retry the job.".into());
        }
        actions
    }
}

/// Uniform HTTP error body (spec §6).
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    pub status: u16,
    pub detail: String,
    #[serde(rename = "correlationId")]
    pub correlation_id: Option<String>,
}

impl ErrorBody {
    pub fn from_app_error(err: &AppError, correlation_id: Option<String>) -> Self {
        Self {
            kind: format!("urn:aura#{}", err.code.as_str()),
            title: err.code.as_str().to_string(),
            status: err.code.http_status().as_u16(),
            detail: err.message.clone(),
            correlation_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_maps_timeout_message() {
        let err = anyhow::anyhow!("provider call timed out after 15m");
        let classified = AppError::classify(Stage::Script, &err);
        assert_eq!(classified.code, ErrorCode::ETimeout);
        assert!(classified.remediation.is_some());
    }

    #[test]
    fn classify_defaults_to_internal() {
        let err = anyhow::anyhow!("something unexpected happened");
        let classified = AppError::classify(Stage::Narration, &err);
        assert_eq!(classified.code, ErrorCode::EInternal);
    }

    #[test]
    fn only_documented_codes_are_retryable() {
        assert!(ErrorCode::ETimeout.is_retryable());
        assert!(ErrorCode::EProviderCall.is_retryable());
        assert!(ErrorCode::ESubprocessExit.is_retryable());
        assert!(!ErrorCode::EValidation.is_retryable());
        assert!(!ErrorCode::ENoEncoder.is_retryable());
        assert!(!ErrorCode::EConfigConflict.is_retryable());
        assert!(!ErrorCode::EDiskSpace.is_retryable());
        assert!(!ErrorCode::ECancelled.is_retryable());
    }
}
