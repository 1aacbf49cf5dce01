//! Input types for a generation job (spec §3 "Data Model").

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AspectRatio {
    #[serde(rename = "16:9")]
    Widescreen,
    #[serde(rename = "9:16")]
    Portrait,
    #[serde(rename = "1:1")]
    Square,
    #[serde(rename = "4:3")]
    Standard,
}

impl AspectRatio {
    pub fn dimensions_for(self, long_edge: u32) -> (u32, u32) {
        match self {
            AspectRatio::Widescreen => (long_edge, long_edge * 9 / 16),
            AspectRatio::Portrait => (long_edge * 9 / 16, long_edge),
            AspectRatio::Square => (long_edge, long_edge),
            AspectRatio::Standard => (long_edge, long_edge * 3 / 4),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Brief {
    pub topic: String,
    pub audience: String,
    pub goal: String,
    pub tone: String,
    pub language: String,
    pub aspect_ratio: AspectRatio,
}

impl Brief {
    /// Topic must be at least 3 chars after trimming (spec §4.2 check 4).
    pub fn topic_is_valid(&self) -> bool {
        self.topic.trim().chars().count() >= 3
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Pacing {
    Slow,
    Medium,
    Fast,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Density {
    Sparse,
    Balanced,
    Dense,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanSpec {
    /// Target duration in seconds. Must be within [10, 1800] (spec §3).
    pub target_duration_secs: f64,
    pub pacing: Pacing,
    pub density: Density,
    pub style: String,
}

impl PlanSpec {
    pub fn duration_is_valid(&self) -> bool {
        (10.0..=1800.0).contains(&self.target_duration_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceSpec {
    pub voice_name: String,
    pub rate: f64,
    pub pitch: f64,
    pub inter_sentence_pause_ms: u32,
}

impl Default for VoiceSpec {
    fn default() -> Self {
        Self {
            voice_name: "default".to_string(),
            rate: 1.0,
            pitch: 0.0,
            inter_sentence_pause_ms: 250,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderSpec {
    pub width: u32,
    pub height: u32,
    pub container: String,
    pub video_bitrate_kbps: u32,
    pub audio_bitrate_kbps: u32,
    pub fps: u32,
    pub codec: String,
    /// 0-100.
    pub quality: u8,
    pub scene_cut: bool,
}

impl Default for RenderSpec {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
            container: "mp4".to_string(),
            video_bitrate_kbps: 6000,
            audio_bitrate_kbps: 192,
            fps: 30,
            codec: "libx264".to_string(),
            quality: 75,
            scene_cut: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topic_trims_before_length_check() {
        let mut brief = sample_brief();
        brief.topic = "  ab  ".to_string();
        assert!(!brief.topic_is_valid());
        brief.topic = "  abc  ".to_string();
        assert!(brief.topic_is_valid());
    }

    #[test]
    fn duration_bounds_are_10s_to_30min() {
        let mut plan = sample_plan();
        plan.target_duration_secs = 9.9;
        assert!(!plan.duration_is_valid());
        plan.target_duration_secs = 10.0;
        assert!(plan.duration_is_valid());
        plan.target_duration_secs = 1800.0;
        assert!(plan.duration_is_valid());
        plan.target_duration_secs = 1800.1;
        assert!(!plan.duration_is_valid());
    }

    fn sample_brief() -> Brief {
        Brief {
            topic: "How solar panels work".to_string(),
            audience: "general".to_string(),
            goal: "educate".to_string(),
            tone: "friendly".to_string(),
            language: "en".to_string(),
            aspect_ratio: AspectRatio::Widescreen,
        }
    }

    fn sample_plan() -> PlanSpec {
        PlanSpec {
            target_duration_secs: 60.0,
            pacing: Pacing::Medium,
            density: Density::Balanced,
            style: "explainer".to_string(),
        }
    }
}
