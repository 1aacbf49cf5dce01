//! Job record and lifecycle types (spec §3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::brief::{Brief, PlanSpec, RenderSpec, VoiceSpec};
use crate::error::ErrorCode;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Queued,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobState::Succeeded | JobState::Failed | JobState::Cancelled
        )
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum Stage {
    Script,
    Narration,
    Visuals,
    TimelineRender,
    Export,
    Complete,
}

impl Stage {
    /// Forward-only stage sequence for a full generation job (spec §4.6).
    pub const GENERATION_SEQUENCE: [Stage; 5] = [
        Stage::Script,
        Stage::Narration,
        Stage::Visuals,
        Stage::TimelineRender,
        Stage::Complete,
    ];

    /// Forward-only stage sequence for an export job (spec §4.7.1): a
    /// single `Export` stage.
    pub const EXPORT_SEQUENCE: [Stage; 2] = [Stage::Export, Stage::Complete];

    fn sequence_for(self, kind: JobKind) -> &'static [Stage] {
        match kind {
            JobKind::Generation => &Self::GENERATION_SEQUENCE,
            JobKind::Export => &Self::EXPORT_SEQUENCE,
        }
    }

    pub fn next_in(self, kind: JobKind) -> Option<Stage> {
        let sequence = self.sequence_for(kind);
        let idx = sequence.iter().position(|s| *s == self)?;
        sequence.get(idx + 1).copied()
    }

    /// Convenience for the generation sequence, used throughout tests and
    /// call sites that only ever deal with generation jobs.
    pub fn next(self) -> Option<Stage> {
        self.next_in(JobKind::Generation)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ArtifactType {
    Script,
    Audio,
    VisualSet,
    IntermediateVideo,
    FinalVideo,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    #[serde(rename = "type")]
    pub kind: ArtifactType,
    pub path: String,
    pub size_bytes: u64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobError {
    pub code: ErrorCode,
    pub message: String,
    pub remediation: Option<String>,
    pub stage: Stage,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureDetails {
    pub stage: Stage,
    pub code: ErrorCode,
    pub message: String,
    pub suggested_actions: Vec<String>,
    pub failed_at: DateTime<Utc>,
}

/// Distinguishes the two independently queued job types (spec §4.7.1).
/// Both share the same state model, queueing, cancellation, and retention
/// semantics; only the stage sequence differs.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum JobKind {
    Generation,
    Export,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Free,
    ProIfAvailable,
    Pro,
    Specific,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRequest {
    pub brief: Brief,
    pub plan_spec: PlanSpec,
    pub voice_spec: VoiceSpec,
    pub render_spec: RenderSpec,
    #[serde(default = "default_tier")]
    pub tier: Tier,
    #[serde(default)]
    pub specific_provider: Option<String>,
    #[serde(default)]
    pub correlation_id: Option<String>,
}

fn default_tier() -> Tier {
    Tier::Free
}

/// Source material for an export job (spec §4.7.1): either a previously
/// rendered intermediate video, or a supplied editable timeline that is
/// first rendered with the same renderer as §4.5.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineSpec {
    pub visuals: Vec<String>,
    pub narration_path: String,
    pub render_spec: RenderSpec,
    pub target_duration_secs: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", untagged)]
pub enum ExportSource {
    InputFile { input_file: String },
    Timeline { timeline: TimelineSpec },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportRequest {
    #[serde(flatten)]
    pub source: ExportSource,
    pub preset_name: String,
    #[serde(default)]
    pub correlation_id: Option<String>,
}

/// The type-specific portion of a job's inputs; shared fields (id, state,
/// stage, ...) live directly on [`Job`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum JobInputs {
    Generation(JobRequest),
    Export(ExportRequest),
}

impl JobInputs {
    pub fn kind(&self) -> JobKind {
        match self {
            JobInputs::Generation(_) => JobKind::Generation,
            JobInputs::Export(_) => JobKind::Export,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: String,
    pub correlation_id: String,
    pub state: JobState,
    pub stage: Stage,
    pub percent: u8,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub eta_remaining_secs: Option<f64>,
    pub errors: Vec<JobError>,
    pub failure_details: Option<FailureDetails>,
    pub artifacts: Vec<Artifact>,
    pub log_tail: Vec<String>,

    pub inputs: JobInputs,
}

const LOG_TAIL_CAPACITY: usize = 50;

impl Job {
    pub fn new(id: String, request: JobRequest) -> Self {
        let correlation_id = request
            .correlation_id
            .clone()
            .unwrap_or_else(|| id.clone());
        Self {
            id,
            correlation_id,
            state: JobState::Queued,
            stage: Stage::Script,
            percent: 0,
            started_at: None,
            finished_at: None,
            eta_remaining_secs: None,
            errors: Vec::new(),
            failure_details: None,
            artifacts: Vec::new(),
            log_tail: Vec::new(),
            inputs: JobInputs::Generation(request),
        }
    }

    pub fn new_export(id: String, request: ExportRequest) -> Self {
        let correlation_id = request
            .correlation_id
            .clone()
            .unwrap_or_else(|| id.clone());
        Self {
            id,
            correlation_id,
            state: JobState::Queued,
            stage: Stage::Export,
            percent: 0,
            started_at: None,
            finished_at: None,
            eta_remaining_secs: None,
            errors: Vec::new(),
            failure_details: None,
            artifacts: Vec::new(),
            log_tail: Vec::new(),
            inputs: JobInputs::Export(request),
        }
    }

    pub fn kind(&self) -> JobKind {
        self.inputs.kind()
    }

    pub fn generation_request(&self) -> Option<&JobRequest> {
        match &self.inputs {
            JobInputs::Generation(r) => Some(r),
            JobInputs::Export(_) => None,
        }
    }

    pub fn export_request(&self) -> Option<&ExportRequest> {
        match &self.inputs {
            JobInputs::Export(r) => Some(r),
            JobInputs::Generation(_) => None,
        }
    }

    /// Re-issue a failed job's inputs under a fresh id/correlation id (spec
    /// §4.7 `Retry`). Only valid for terminal-Failed jobs; the caller
    /// enforces that precondition.
    pub fn retry_inputs(&self) -> JobInputs {
        match &self.inputs {
            JobInputs::Generation(r) => {
                let mut fresh = r.clone();
                fresh.correlation_id = None;
                JobInputs::Generation(fresh)
            }
            JobInputs::Export(r) => {
                let mut fresh = r.clone();
                fresh.correlation_id = None;
                JobInputs::Export(fresh)
            }
        }
    }

    pub fn push_log(&mut self, line: impl Into<String>) {
        self.log_tail.push(line.into());
        if self.log_tail.len() > LOG_TAIL_CAPACITY {
            let excess = self.log_tail.len() - LOG_TAIL_CAPACITY;
            self.log_tail.drain(0..excess);
        }
    }

    /// Clamp and apply monotonic-within-stage progress (spec §3 invariant,
    /// §8 "Monotone progress").
    pub fn set_percent(&mut self, percent: u8) {
        let clamped = percent.min(100);
        if clamped >= self.percent {
            self.percent = clamped;
        }
    }

    pub fn enter_stage(&mut self, stage: Stage) {
        self.stage = stage;
        self.percent = 0;
    }
}
