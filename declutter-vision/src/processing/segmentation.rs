//! Per-category concept segmentation

use crate::config::DistillConfig;
use crate::error::VisionError;
use crate::instruction::{build_concept_prompt, join_concepts, ParsedInstruction};
use crate::models::{ConceptSegmenter, Segmentation};
use image::RgbImage;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Prompt and presence threshold for one category
#[derive(Debug, Clone, PartialEq)]
pub struct CategoryQuery {
    pub prompt: String,
    pub threshold: f32,
}

/// Results of one frame's segmentation calls; `None` where the category was not queried
#[derive(Debug, Clone)]
pub struct FrameSegmentation {
    pub safe: Option<Segmentation>,
    pub distractor: Option<Segmentation>,
    pub robot: Option<Segmentation>,
    pub elapsed: Duration,
}

/// Segmentation pipeline issuing one oracle call per category
pub struct SegmentationPipeline {
    segmenter: Arc<dyn ConceptSegmenter>,
    safe: Option<CategoryQuery>,
    distractor: Option<CategoryQuery>,
    robot: Option<CategoryQuery>,
}

impl SegmentationPipeline {
    /// Create a new segmentation pipeline for one episode's concepts
    pub fn new(
        segmenter: Arc<dyn ConceptSegmenter>,
        instruction: &ParsedInstruction,
        config: &DistillConfig,
    ) -> Self {
        let safe = (!config.disable_safeset).then(|| CategoryQuery {
            prompt: build_concept_prompt(&instruction.target, instruction.anchor.as_deref(), false),
            threshold: config.safe_presence_threshold,
        });
        let distractor = Some(join_concepts(&config.distractor_concepts))
            .filter(|p| !p.is_empty())
            .map(|prompt| CategoryQuery {
                prompt,
                threshold: config.distractor_presence_threshold,
            });
        let robot = Some(join_concepts(&config.robot_concepts))
            .filter(|p| !p.is_empty())
            .map(|prompt| CategoryQuery {
                prompt,
                threshold: config.robot_presence_threshold,
            });

        Self {
            segmenter,
            safe,
            distractor,
            robot,
        }
    }

    pub fn safe_query(&self) -> Option<&CategoryQuery> {
        self.safe.as_ref()
    }

    pub fn distractor_query(&self) -> Option<&CategoryQuery> {
        self.distractor.as_ref()
    }

    pub fn robot_query(&self) -> Option<&CategoryQuery> {
        self.robot.as_ref()
    }

    async fn run(&self, image: &RgbImage, query: Option<&CategoryQuery>) -> Result<Option<Segmentation>, VisionError> {
        match query {
            Some(query) => {
                let result = self
                    .segmenter
                    .segment(image, &query.prompt, query.threshold)
                    .await?;
                debug!(
                    "Segmented {:?}: {} instances",
                    query.prompt,
                    result.instances.len()
                );
                Ok(Some(result))
            }
            None => Ok(None),
        }
    }

    /// Segment safe-set, distractor and robot concepts, in that order
    pub async fn segment_all(&self, image: &RgbImage) -> Result<FrameSegmentation, VisionError> {
        let started = Instant::now();
        let safe = self.run(image, self.safe.as_ref()).await?;
        let distractor = self.run(image, self.distractor.as_ref()).await?;
        let robot = self.run(image, self.robot.as_ref()).await?;
        Ok(FrameSegmentation {
            safe,
            distractor,
            robot,
            elapsed: started.elapsed(),
        })
    }

    /// Segment only the robot, as done on every steady frame
    pub async fn segment_robot(&self, image: &RgbImage) -> Result<FrameSegmentation, VisionError> {
        let started = Instant::now();
        let robot = self.run(image, self.robot.as_ref()).await?;
        Ok(FrameSegmentation {
            safe: None,
            distractor: None,
            robot,
            elapsed: started.elapsed(),
        })
    }
}
