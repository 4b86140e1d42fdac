//! Per-frame processing stages

pub mod composer;
pub mod compositor;
pub mod plate;
pub mod segmentation;
pub mod tracker;

pub use composer::{ComposedMasks, DilationRadii, MaskComposer};
pub use compositor::{blend, CompositeFrame, Compositor, CompositorSettings};
pub use plate::CleanPlateManager;
pub use segmentation::{CategoryQuery, FrameSegmentation, SegmentationPipeline};
pub use tracker::{AccumulatedMask, CleanupReport, MaskTracker, TrackerSettings};
