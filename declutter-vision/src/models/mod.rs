//! Perception oracle contracts and their backends
//!
//! The segmentation and inpainting models are black boxes reached through
//! two capability traits. Backends are chosen at construction time and
//! shared read-only across episodes.

pub mod detection;
pub mod flat_fill;
pub mod remote;
pub mod scripted;
pub mod shared;
pub mod wire;

use crate::error::VisionError;
use crate::mask::Mask;
use async_trait::async_trait;
use image::RgbImage;

pub use detection::{parse_concept_list, split_instance_name, Detection, Segmentation};
pub use flat_fill::FlatFillInpainter;
pub use remote::{RemoteInpainter, RemoteSegmenter};
pub use scripted::ScriptedSegmenter;
pub use shared::SharedOracles;

/// Open-vocabulary concept segmentation
#[async_trait]
pub trait ConceptSegmenter: Send + Sync {
    /// Segment every concept named in `concepts` ("spoon. towel") whose
    /// instances score at least `threshold`. Blocking from the caller's
    /// point of view; failures are fatal for the episode.
    async fn segment(
        &self,
        image: &RgbImage,
        concepts: &str,
        threshold: f32,
    ) -> Result<Segmentation, VisionError>;
}

/// Background inpainting
#[async_trait]
pub trait InpaintingOracle: Send + Sync {
    /// Fill the masked region of `image` with plausible background
    async fn inpaint(&self, image: &RgbImage, mask: &Mask, dilate: u32) -> Result<RgbImage, VisionError>;
}
