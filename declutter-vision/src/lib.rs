//! declutter-vision: distractor removal for robot camera frames
//!
//! Sits between a camera and a manipulation policy. Distractor objects are
//! replaced by a once-inpainted background plate while the task target, the
//! anchor object and the robot itself are guaranteed to pass through from
//! the live frame untouched.
//!
//! Segmentation and inpainting models are external oracles reached through
//! the traits in [`models`].

pub mod config;
pub mod controller;
pub mod environment;
pub mod error;
pub mod instruction;
pub mod mask;
pub mod models;
pub mod processing;
pub mod telemetry;

pub use config::DistillConfig;
pub use controller::{DistilledReset, DistilledStep, Phase, PipelineController, PipelineState};
pub use environment::{EnvStep, Environment, Observation};
pub use error::{Result, VisionError};
pub use instruction::{build_concept_prompt, InstructionParser, ParsedInstruction};
pub use models::{ConceptSegmenter, Detection, InpaintingOracle, Segmentation, SharedOracles};
pub use telemetry::{DebugFrame, StageTimings};
