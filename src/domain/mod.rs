pub mod brief;
pub mod job;

pub use brief::{AspectRatio, Brief, PlanSpec, RenderSpec, VoiceSpec};
pub use job::{
    Artifact, ArtifactType, ExportRequest, ExportSource, FailureDetails, Job, JobError,
    JobInputs, JobKind, JobRequest, JobState, Stage, Tier, TimelineSpec,
};
