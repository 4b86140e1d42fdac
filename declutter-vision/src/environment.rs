//! Environment adapter contract
//!
//! The pipeline wraps a frame source driven by actions: a simulator, a
//! real robot, or a recorded episode. Only the camera frame is read.

use crate::error::VisionError;
use async_trait::async_trait;
use image::RgbImage;
use serde_json::Value;

/// One camera observation plus whatever the environment reports alongside it
#[derive(Debug, Clone)]
pub struct Observation {
    pub image: RgbImage,
    pub info: Value,
}

impl Observation {
    pub fn new(image: RgbImage) -> Self {
        Self {
            image,
            info: Value::Null,
        }
    }

    pub fn with_info(image: RgbImage, info: Value) -> Self {
        Self { image, info }
    }

    /// Raw camera frame
    pub fn frame(&self) -> &RgbImage {
        &self.image
    }
}

/// Result of advancing the environment by one action
#[derive(Debug, Clone)]
pub struct EnvStep {
    pub observation: Observation,
    pub reward: f64,
    pub terminated: bool,
    pub truncated: bool,
}

impl EnvStep {
    /// Episode over, either way
    pub fn is_done(&self) -> bool {
        self.terminated || self.truncated
    }
}

/// Frame source the pipeline sits in front of
#[async_trait]
pub trait Environment: Send {
    type Action: Send + Clone;

    /// Start a new episode
    async fn reset(&mut self) -> Result<Observation, VisionError>;

    /// Advance by one action
    async fn step(&mut self, action: Self::Action) -> Result<EnvStep, VisionError>;

    /// Natural-language task for the current episode
    fn instruction(&self) -> String;

    /// Action that leaves the scene unchanged, used during warmup
    fn neutral_action(&self) -> Self::Action;

    /// Grant extra steps to the episode so warmup does not eat into the policy's budget
    fn extend_step_budget(&mut self, _steps: u32) {}
}
