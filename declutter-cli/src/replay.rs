//! Directory of recorded frames replayed as an environment

use async_trait::async_trait;
use declutter_vision::{EnvStep, Environment, Observation, VisionError};
use image::RgbImage;
use serde_json::json;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Replays PNG frames in file-name order. Actions are ignored; the episode
/// is truncated after the last frame.
pub struct FrameDirEnv {
    frames: Vec<PathBuf>,
    instruction: String,
    cursor: usize,
    budget_extension: u32,
}

impl FrameDirEnv {
    pub fn open(dir: &Path, instruction: impl Into<String>) -> Result<Self, VisionError> {
        let mut frames: Vec<PathBuf> = std::fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.extension()
                    .and_then(|ext| ext.to_str())
                    .map_or(false, |ext| ext.eq_ignore_ascii_case("png"))
            })
            .collect();
        frames.sort();
        if frames.is_empty() {
            return Err(VisionError::Environment(format!(
                "No PNG frames in {}",
                dir.display()
            )));
        }
        Ok(Self {
            frames,
            instruction: instruction.into(),
            cursor: 0,
            budget_extension: 0,
        })
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    pub fn budget_extension(&self) -> u32 {
        self.budget_extension
    }

    fn load(&self, index: usize) -> Result<Observation, VisionError> {
        let path = &self.frames[index];
        let image: RgbImage = image::open(path)?.to_rgb8();
        debug!("Loaded frame {} from {}", index, path.display());
        Ok(Observation::with_info(
            image,
            json!({ "frame": index, "path": path.display().to_string() }),
        ))
    }
}

#[async_trait]
impl Environment for FrameDirEnv {
    type Action = ();

    async fn reset(&mut self) -> Result<Observation, VisionError> {
        self.cursor = 0;
        self.budget_extension = 0;
        self.load(0)
    }

    async fn step(&mut self, _action: ()) -> Result<EnvStep, VisionError> {
        if self.cursor + 1 < self.frames.len() {
            self.cursor += 1;
        }
        let observation = self.load(self.cursor)?;
        Ok(EnvStep {
            observation,
            reward: 0.0,
            terminated: false,
            truncated: self.cursor + 1 >= self.frames.len(),
        })
    }

    fn instruction(&self) -> String {
        self.instruction.clone()
    }

    fn neutral_action(&self) {}

    fn extend_step_budget(&mut self, steps: u32) {
        self.budget_extension += steps;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn write_frames(dir: &Path, count: u8) {
        for i in 0..count {
            let image = RgbImage::from_pixel(4, 3, Rgb([i, i, i]));
            image.save(dir.join(format!("frame_{:03}.png", i))).unwrap();
        }
        std::fs::write(dir.join("notes.txt"), "not a frame").unwrap();
    }

    #[tokio::test]
    async fn test_replays_in_name_order() {
        let dir = tempfile::tempdir().unwrap();
        write_frames(dir.path(), 3);
        let mut env = FrameDirEnv::open(dir.path(), "pick up the cup").unwrap();
        assert_eq!(env.frame_count(), 3);

        let first = env.reset().await.unwrap();
        assert_eq!(first.image.get_pixel(0, 0)[0], 0);
        assert_eq!(first.image.dimensions(), (4, 3));

        let second = env.step(()).await.unwrap();
        assert_eq!(second.observation.image.get_pixel(0, 0)[0], 1);
        assert!(!second.truncated);

        let last = env.step(()).await.unwrap();
        assert_eq!(last.observation.image.get_pixel(0, 0)[0], 2);
        assert!(last.truncated);
        assert_eq!(last.observation.info["frame"], 2);
    }

    #[test]
    fn test_empty_dir_is_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(FrameDirEnv::open(dir.path(), "x").is_err());
    }
}
