//! Five-stage compositing of the clean plate over the live frame
//!
//! 1. feather the compositing mask into an alpha map
//! 2. clamp alpha to 1 on the undilated distractor outside the safe buffer
//! 3. zero alpha on this frame's safe pixels and the reinforced frozen safe-set
//! 4. zero alpha on the robot, dilated in open space and raw inside distractor zones
//! 5. blend

use crate::config::DistillConfig;
use crate::error::VisionError;
use crate::mask::{self, Mask};
use crate::processing::composer::ComposedMasks;
use image::{Rgb, RgbImage};
use ndarray::Zip;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompositorSettings {
    pub blend_sigma: f32,
    pub reinforcement_radius: u32,
    pub robot_dilation: u32,
}

impl From<&DistillConfig> for CompositorSettings {
    fn from(config: &DistillConfig) -> Self {
        Self {
            blend_sigma: config.blend_sigma,
            reinforcement_radius: config.reinforcement_radius(),
            robot_dilation: config.effective_safe_dilation(),
        }
    }
}

/// Composited frame and the alpha that produced it
#[derive(Debug, Clone)]
pub struct CompositeFrame {
    pub image: RgbImage,
    pub alpha: Mask,
}

/// Per-episode compositor. The frame-independent part of the alpha map is
/// computed once from the frozen masks.
#[derive(Debug, Clone)]
pub struct Compositor {
    settings: CompositorSettings,
    /// Alpha after stages 1-2 and the frozen half of stage 3
    base_alpha: Mask,
    /// Dilated distractor region used as the stage-4 zone
    distractor_zone: Mask,
}

impl Compositor {
    /// Create a new compositor for frozen masks
    pub fn new(composed: &ComposedMasks, frozen_safe: &Mask, settings: CompositorSettings) -> Self {
        let mut alpha = if settings.blend_sigma >= mask::MIN_BLUR_SIGMA {
            mask::gaussian_blur(&composed.compositing_mask, settings.blend_sigma)
        } else {
            mask::binarize(&composed.compositing_mask)
        };

        Zip::from(&mut alpha)
            .and(&composed.distractor)
            .and(&composed.dilated_safe)
            .for_each(|a, &d, &s| {
                if d > mask::BINARY_THRESHOLD && s <= mask::BINARY_THRESHOLD {
                    *a = a.max(1.0);
                }
            });

        let reinforced = mask::union(
            &mask::binarize(frozen_safe),
            &mask::dilate(frozen_safe, settings.reinforcement_radius),
        );
        Zip::from(&mut alpha).and(&reinforced).for_each(|a, &r| {
            *a *= 1.0 - r;
        });

        Self {
            settings,
            base_alpha: alpha,
            distractor_zone: composed.dilated_distractor.clone(),
        }
    }

    pub fn settings(&self) -> &CompositorSettings {
        &self.settings
    }

    /// Alpha map for this frame's robot position
    pub fn alpha_for(&self, live_robot: &Mask) -> Mask {
        let raw_robot = mask::binarize(live_robot);
        let dilated_robot = mask::dilate(live_robot, self.settings.robot_dilation);

        let mut alpha = self.base_alpha.clone();
        // stage 3, per-frame half: the robot is part of this frame's safe set
        Zip::from(&mut alpha).and(&raw_robot).for_each(|a, &r| {
            *a *= 1.0 - r;
        });
        Zip::from(&mut alpha)
            .and(&dilated_robot)
            .and(&raw_robot)
            .and(&self.distractor_zone)
            .for_each(|a, &dilated, &raw, &zone| {
                let contribution = dilated * (1.0 - zone) + raw * zone;
                *a *= 1.0 - contribution;
            });
        alpha
    }

    /// Composite one frame
    pub fn composite(
        &self,
        live: &RgbImage,
        plate: &RgbImage,
        live_robot: &Mask,
    ) -> Result<CompositeFrame, VisionError> {
        if live_robot.dim() != self.base_alpha.dim() {
            return Err(VisionError::Processing(format!(
                "Robot mask is {:?}, compositor expects {:?}",
                live_robot.dim(),
                self.base_alpha.dim()
            )));
        }
        let alpha = self.alpha_for(live_robot);
        let image = blend(live, plate, &alpha)?;
        Ok(CompositeFrame { image, alpha })
    }
}

/// `alpha * plate + (1 - alpha) * live`, per pixel and channel
pub fn blend(live: &RgbImage, plate: &RgbImage, alpha: &Mask) -> Result<RgbImage, VisionError> {
    let (width, height) = live.dimensions();
    if plate.dimensions() != (width, height) || alpha.dim() != (height as usize, width as usize) {
        return Err(VisionError::Processing(format!(
            "Blend inputs disagree: live {}x{}, plate {:?}, alpha {:?}",
            width,
            height,
            plate.dimensions(),
            alpha.dim()
        )));
    }

    Ok(RgbImage::from_fn(width, height, |x, y| {
        let a = alpha[[y as usize, x as usize]].clamp(0.0, 1.0);
        let l = live.get_pixel(x, y);
        let p = plate.get_pixel(x, y);
        let mix = |ch: usize| (a * p[ch] as f32 + (1.0 - a) * l[ch] as f32).round().clamp(0.0, 255.0) as u8;
        Rgb([mix(0), mix(1), mix(2)])
    }))
}
