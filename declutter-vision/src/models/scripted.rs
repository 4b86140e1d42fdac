//! Deterministic segmenter backed by a fixed script of detections

use super::{parse_concept_list, ConceptSegmenter, Detection, Segmentation};
use crate::error::VisionError;
use async_trait::async_trait;
use image::RgbImage;
use parking_lot::Mutex;
use std::collections::HashMap;

#[derive(Debug, Clone)]
struct ScriptEntry {
    detection: Detection,
    from_call: usize,
    until_call: Option<usize>,
}

/// Segmenter returning scripted detections.
///
/// Calls are counted per prompt string, so "the n-th call with this prompt"
/// plays the role of the frame index for that category. An entry is
/// returned when its base concept is in the prompt, its score meets the
/// threshold and the call index lies in `[from_call, until_call)`.
#[derive(Debug, Default)]
pub struct ScriptedSegmenter {
    entries: Vec<ScriptEntry>,
    calls: Mutex<HashMap<String, usize>>,
}

impl ScriptedSegmenter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Detection present on every call
    pub fn with_detection(self, detection: Detection) -> Self {
        self.with_detection_between(detection, 0, None)
    }

    /// Detection present from call `from_call` up to (excluding) `until_call`
    pub fn with_detection_between(
        mut self,
        detection: Detection,
        from_call: usize,
        until_call: Option<usize>,
    ) -> Self {
        self.entries.push(ScriptEntry {
            detection,
            from_call,
            until_call,
        });
        self
    }

    /// Total number of segment calls so far
    pub fn call_count(&self) -> usize {
        self.calls.lock().values().sum()
    }

    /// Number of calls made with exactly this prompt
    pub fn calls_for(&self, prompt: &str) -> usize {
        self.calls.lock().get(prompt).copied().unwrap_or(0)
    }
}

#[async_trait]
impl ConceptSegmenter for ScriptedSegmenter {
    async fn segment(
        &self,
        image: &RgbImage,
        concepts: &str,
        threshold: f32,
    ) -> Result<Segmentation, VisionError> {
        let call_index = {
            let mut calls = self.calls.lock();
            let counter = calls.entry(concepts.to_string()).or_insert(0);
            let index = *counter;
            *counter += 1;
            index
        };

        let (width, height) = image.dimensions();
        let (height, width) = (height as usize, width as usize);
        let wanted = parse_concept_list(concepts);

        let mut instances = Vec::new();
        for entry in &self.entries {
            let active = call_index >= entry.from_call
                && entry.until_call.map_or(true, |until| call_index < until);
            if !active
                || entry.detection.score < threshold
                || !wanted.iter().any(|c| *c == entry.detection.base_concept)
            {
                continue;
            }
            if entry.detection.mask.dim() != (height, width) {
                return Err(VisionError::Segmentation(format!(
                    "Scripted mask for {} is {:?}, frame is {}x{}",
                    entry.detection.name,
                    entry.detection.mask.dim(),
                    width,
                    height
                )));
            }
            instances.push(entry.detection.clone());
        }

        Ok(Segmentation::from_instances(height, width, instances))
    }
}
