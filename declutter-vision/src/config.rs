//! Configuration for declutter-vision

use crate::error::{Result, VisionError};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Largest accepted dilation radius, in pixels
pub const MAX_DILATION_PX: u32 = 512;

/// Largest accepted feathering sigma, in pixels
pub const MAX_BLEND_SIGMA: f32 = 64.0;

/// Distillation pipeline configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DistillConfig {
    /// Frames used to build stable masks before any output reaches the policy
    pub warmup_frame_count: u32,
    /// Extra warmup frames granted when the target was never detected
    pub deferred_detection_frame_count: u32,
    /// Oracle score threshold for target and anchor concepts
    pub safe_presence_threshold: f32,
    /// Oracle score threshold for distractor concepts
    pub distractor_presence_threshold: f32,
    /// Oracle score threshold for robot concepts
    pub robot_presence_threshold: f32,
    /// Gaussian feathering sigma; 0 selects hard binary compositing
    pub blend_sigma: f32,
    /// Dilation radius applied to the distractor mask for inpainting coverage
    pub distractor_dilation_px: u32,
    /// Dilation radius applied to the safe-set mask
    pub safe_dilation_px: u32,
    /// Re-issue the clean plate request every N steady frames (0 = never)
    pub cache_refresh_interval: u32,
    /// Target instances whose genuineness falls below this are dropped
    pub genuineness_margin: f32,
    /// IoU above which a distractor instance counts as overlapping a target instance
    pub cross_validation_iou: f32,
    /// Minimum IoU against the running union for a target detection to be accumulated
    pub iou_gate_threshold: f32,
    /// Frames below this index are accumulated without the IoU gate
    pub iou_gate_start_frame: u32,
    /// Components smaller than this are skipped during post-warmup cleanup
    pub min_component_pixels: usize,
    /// Upper bound on the distractor overlap penalty during cleanup
    pub overlap_penalty_cap: f32,
    /// Reserved; accepted and validated but has no effect on masking
    pub distractor_overlap_suppression_iou: f32,
    /// Ablation: do not protect target and anchor
    pub disable_safeset: bool,
    /// Ablation: substitute a flat fill for the inpainting oracle
    pub disable_inpaint: bool,
    /// Pass frames through untouched when the target is never found
    pub passthrough_on_missing_target: bool,
    /// Concept names of the clutter objects to remove
    pub distractor_concepts: Vec<String>,
    /// Concept names that segment the robot itself
    pub robot_concepts: Vec<String>,
    /// Attach per-stage masks and timings to every distilled step
    pub debug: bool,
}

impl Default for DistillConfig {
    fn default() -> Self {
        Self {
            warmup_frame_count: 10,
            deferred_detection_frame_count: 10,
            safe_presence_threshold: 0.3,
            distractor_presence_threshold: 0.3,
            robot_presence_threshold: 0.3,
            blend_sigma: 3.0,
            distractor_dilation_px: 10,
            safe_dilation_px: 5,
            cache_refresh_interval: 0,
            genuineness_margin: -0.1,
            cross_validation_iou: 0.3,
            iou_gate_threshold: 0.15,
            iou_gate_start_frame: 2,
            min_component_pixels: 20,
            overlap_penalty_cap: 0.7,
            distractor_overlap_suppression_iou: 0.0,
            disable_safeset: false,
            disable_inpaint: false,
            passthrough_on_missing_target: false,
            distractor_concepts: Vec::new(),
            robot_concepts: vec!["robot arm".to_string(), "robot gripper".to_string()],
            debug: false,
        }
    }
}

impl DistillConfig {
    /// Parse a TOML document; missing keys take their defaults
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: DistillConfig = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML configuration file
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    /// Safe dilation never smaller than the distractor expansion
    pub fn effective_safe_dilation(&self) -> u32 {
        self.safe_dilation_px.max(self.distractor_dilation_px)
    }

    /// Radius used to reinforce protected pixels against the plate
    pub fn reinforcement_radius(&self) -> u32 {
        let sigma_px = if self.blend_sigma >= crate::mask::MIN_BLUR_SIGMA {
            self.blend_sigma.min(MAX_BLEND_SIGMA).ceil() as u32
        } else {
            0
        };
        self.effective_safe_dilation()
            .saturating_add(sigma_px.saturating_mul(3))
    }

    /// Total frames the detection window may span
    pub fn max_warmup_frames(&self) -> u32 {
        self.warmup_frame_count
            .saturating_add(self.deferred_detection_frame_count)
    }

    /// Validate configuration, naming the first offending field
    pub fn validate(&self) -> Result<()> {
        if self.warmup_frame_count == 0 {
            return Err(VisionError::config(
                "warmup_frame_count",
                "must be at least 1",
            ));
        }

        let unit_fields: [(&'static str, f32); 7] = [
            ("safe_presence_threshold", self.safe_presence_threshold),
            ("distractor_presence_threshold", self.distractor_presence_threshold),
            ("robot_presence_threshold", self.robot_presence_threshold),
            ("cross_validation_iou", self.cross_validation_iou),
            ("iou_gate_threshold", self.iou_gate_threshold),
            ("overlap_penalty_cap", self.overlap_penalty_cap),
            (
                "distractor_overlap_suppression_iou",
                self.distractor_overlap_suppression_iou,
            ),
        ];
        for (field, value) in unit_fields {
            if !value.is_finite() || !(0.0..=1.0).contains(&value) {
                return Err(VisionError::config(
                    field,
                    format!("must be within [0, 1], got {}", value),
                ));
            }
        }

        if !self.genuineness_margin.is_finite() || !(-1.0..=1.0).contains(&self.genuineness_margin) {
            return Err(VisionError::config(
                "genuineness_margin",
                format!("must be within [-1, 1], got {}", self.genuineness_margin),
            ));
        }

        if !self.blend_sigma.is_finite() || !(0.0..=MAX_BLEND_SIGMA).contains(&self.blend_sigma) {
            return Err(VisionError::config(
                "blend_sigma",
                format!("must be within [0, {}], got {}", MAX_BLEND_SIGMA, self.blend_sigma),
            ));
        }

        let radii = [
            ("distractor_dilation_px", self.distractor_dilation_px),
            ("safe_dilation_px", self.safe_dilation_px),
        ];
        for (field, value) in radii {
            if value > MAX_DILATION_PX {
                return Err(VisionError::config(
                    field,
                    format!("must be at most {}, got {}", MAX_DILATION_PX, value),
                ));
            }
        }

        if self.distractor_concepts.iter().any(|c| c.trim().is_empty()) {
            return Err(VisionError::config(
                "distractor_concepts",
                "concept names must not be empty",
            ));
        }
        if self.robot_concepts.iter().any(|c| c.trim().is_empty()) {
            return Err(VisionError::config(
                "robot_concepts",
                "concept names must not be empty",
            ));
        }

        Ok(())
    }
}
