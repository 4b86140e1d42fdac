//! Debug surface: per-stage masks and latency

use crate::error::VisionError;
use crate::mask::{self, Mask};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// Latency by stage, in milliseconds
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StageTimings {
    pub segmentation_ms: f64,
    pub composition_ms: f64,
    pub inpaint_ms: f64,
    pub composite_ms: f64,
}

impl StageTimings {
    pub fn total_ms(&self) -> f64 {
        self.segmentation_ms + self.composition_ms + self.inpaint_ms + self.composite_ms
    }
}

pub(crate) fn millis(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1000.0
}

/// Intermediate masks of one distilled frame
#[derive(Debug, Clone)]
pub struct DebugFrame {
    pub frame_index: u32,
    pub alpha: Mask,
    pub compositing_mask: Mask,
    pub inpaint_mask: Mask,
    pub dilated_safe: Mask,
    pub live_robot: Mask,
    pub timings: StageTimings,
}

impl DebugFrame {
    /// Write every mask as `<prefix>_<stage>.png` plus `<prefix>_timings.json`
    pub fn write_to(&self, dir: &Path, prefix: &str) -> Result<(), VisionError> {
        std::fs::create_dir_all(dir)?;
        let stages: [(&str, &Mask); 5] = [
            ("alpha", &self.alpha),
            ("compositing", &self.compositing_mask),
            ("inpaint", &self.inpaint_mask),
            ("safe", &self.dilated_safe),
            ("robot", &self.live_robot),
        ];
        for (stage, m) in stages {
            let path = dir.join(format!("{}_{}.png", prefix, stage));
            mask::to_gray_image(m).save(&path)?;
        }
        let timings = serde_json::to_string_pretty(&self.timings)?;
        std::fs::write(dir.join(format!("{}_timings.json", prefix)), timings)?;
        debug!("Wrote debug frame {} to {}", self.frame_index, dir.display());
        Ok(())
    }
}
