//! Clean plate caching

use crate::error::VisionError;
use crate::mask::{self, Mask};
use crate::models::InpaintingOracle;
use image::RgbImage;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Requests and caches the background-only plate for one episode
pub struct CleanPlateManager {
    inpainter: Arc<dyn InpaintingOracle>,
    refresh_interval: u32,
    plate: Option<RgbImage>,
    requests: u32,
    last_latency: Option<Duration>,
}

impl CleanPlateManager {
    /// Create a new manager; `refresh_interval` 0 disables periodic refresh
    pub fn new(inpainter: Arc<dyn InpaintingOracle>, refresh_interval: u32) -> Self {
        Self {
            inpainter,
            refresh_interval,
            plate: None,
            requests: 0,
            last_latency: None,
        }
    }

    /// Inpaint mask plus the robot dilated by the reinforcement radius
    pub fn build_request_mask(inpaint_mask: &Mask, robot_mask: &Mask, reinforcement_radius: u32) -> Mask {
        let robot = mask::dilate(robot_mask, reinforcement_radius);
        mask::union(&mask::binarize(inpaint_mask), &robot)
    }

    /// Ask the oracle for a plate and cache it. On failure the previous plate is kept.
    pub async fn request(
        &mut self,
        live: &RgbImage,
        inpaint_mask: &Mask,
        robot_mask: &Mask,
        reinforcement_radius: u32,
    ) -> Result<&RgbImage, VisionError> {
        let request_mask = Self::build_request_mask(inpaint_mask, robot_mask, reinforcement_radius);
        let started = Instant::now();
        self.requests += 1;
        debug!(
            "Requesting clean plate #{} ({} masked pixels)",
            self.requests,
            mask::count(&request_mask)
        );

        let plate = self.inpainter.inpaint(live, &request_mask, 0).await?;
        if plate.dimensions() != live.dimensions() {
            return Err(VisionError::Inpainting(format!(
                "Plate is {:?}, frame is {:?}",
                plate.dimensions(),
                live.dimensions()
            )));
        }

        let latency = started.elapsed();
        self.last_latency = Some(latency);
        info!("Clean plate #{} ready in {:?}", self.requests, latency);
        let cached = self.plate.insert(plate);
        Ok(&*cached)
    }

    /// Whether the plate should be re-requested at this steady frame (numbered from 1)
    pub fn due_for_refresh(&self, steady_index: u32) -> bool {
        self.refresh_interval > 0 && steady_index > 0 && steady_index % self.refresh_interval == 0
    }

    pub fn plate(&self) -> Option<&RgbImage> {
        self.plate.as_ref()
    }

    /// Oracle calls made this episode
    pub fn request_count(&self) -> u32 {
        self.requests
    }

    /// Oracle latency of the most recent successful request
    pub fn last_latency(&self) -> Option<Duration> {
        self.last_latency
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use image::Rgb;
    use mockall::mock;
    use ndarray::Array2;

    mock! {
        pub Inpainter {}

        #[async_trait]
        impl InpaintingOracle for Inpainter {
            async fn inpaint(&self, image: &RgbImage, mask: &Mask, dilate: u32) -> Result<RgbImage, VisionError>;
        }
    }

    fn dot(r: usize, c: usize) -> Mask {
        let mut m = mask::empty(16, 16);
        m[[r, c]] = 1.0;
        m
    }

    #[test]
    fn test_request_mask_includes_dilated_robot() {
        let inpaint = dot(2, 2);
        let robot = dot(10, 10);
        let request = CleanPlateManager::build_request_mask(&inpaint, &robot, 2);
        assert_eq!(request[[2, 2]], 1.0);
        assert_eq!(request[[10, 12]], 1.0);
        assert_eq!(request[[10, 13]], 0.0);
        assert_eq!(request[[3, 3]], 0.0);
    }

    #[test]
    fn test_due_for_refresh() {
        let manager = CleanPlateManager::new(Arc::new(MockInpainter::new()), 0);
        assert!(!manager.due_for_refresh(5));
        let manager = CleanPlateManager::new(Arc::new(MockInpainter::new()), 3);
        assert!(!manager.due_for_refresh(0));
        assert!(!manager.due_for_refresh(2));
        assert!(manager.due_for_refresh(3));
        assert!(manager.due_for_refresh(6));
    }

    #[tokio::test]
    async fn test_request_caches_plate() {
        let mut oracle = MockInpainter::new();
        oracle
            .expect_inpaint()
            .times(1)
            .withf(|_, mask, dilate| *dilate == 0 && mask[[1, 1]] == 1.0)
            .returning(|image, _, _| {
                let (w, h) = image.dimensions();
                Ok(RgbImage::from_pixel(w, h, Rgb([7, 8, 9])))
            });

        let mut manager = CleanPlateManager::new(Arc::new(oracle), 0);
        let live = RgbImage::new(16, 16);
        let plate = manager
            .request(&live, &dot(1, 1), &Array2::zeros((16, 16)), 3)
            .await
            .unwrap();
        assert_eq!(plate.get_pixel(0, 0), &Rgb([7, 8, 9]));
        assert_eq!(manager.request_count(), 1);
        assert!(manager.plate().is_some());
        assert!(manager.last_latency().is_some());
    }

    #[tokio::test]
    async fn test_oracle_failure_propagates() {
        let mut oracle = MockInpainter::new();
        oracle
            .expect_inpaint()
            .times(1)
            .returning(|_, _, _| Err(VisionError::Inpainting("model offline".to_string())));

        let mut manager = CleanPlateManager::new(Arc::new(oracle), 0);
        let live = RgbImage::new(16, 16);
        let err = manager
            .request(&live, &dot(1, 1), &dot(5, 5), 0)
            .await
            .unwrap_err();
        assert!(err.is_oracle_failure());
        assert!(manager.plate().is_none());
        assert!(manager.last_latency().is_none());
    }

    #[tokio::test]
    async fn test_wrong_plate_size_is_rejected() {
        let mut oracle = MockInpainter::new();
        oracle
            .expect_inpaint()
            .returning(|_, _, _| Ok(RgbImage::new(4, 4)));

        let mut manager = CleanPlateManager::new(Arc::new(oracle), 0);
        let live = RgbImage::new(16, 16);
        assert!(manager.request(&live, &dot(1, 1), &dot(5, 5), 0).await.is_err());
    }
}
