//! Flat-fill stand-in for the inpainting oracle

use super::InpaintingOracle;
use crate::error::VisionError;
use crate::mask::{self, Mask};
use async_trait::async_trait;
use image::{Rgb, RgbImage};

/// Fills the masked region with the mean color of the unmasked pixels
#[derive(Debug, Clone, Default)]
pub struct FlatFillInpainter;

impl FlatFillInpainter {
    pub fn new() -> Self {
        Self
    }

    /// Synchronous fill shared by the trait implementation
    pub fn fill(image: &RgbImage, mask: &Mask, dilate: u32) -> Result<RgbImage, VisionError> {
        let (width, height) = image.dimensions();
        if mask.dim() != (height as usize, width as usize) {
            return Err(VisionError::Inpainting(format!(
                "Mask shape {:?} does not match image {}x{}",
                mask.dim(),
                width,
                height
            )));
        }
        let region = mask::dilate(mask, dilate);

        let mut sum = [0u64; 3];
        let mut n = 0u64;
        for (x, y, pixel) in image.enumerate_pixels() {
            if region[[y as usize, x as usize]] == 0.0 {
                for ch in 0..3 {
                    sum[ch] += pixel[ch] as u64;
                }
                n += 1;
            }
        }
        let fill = if n == 0 {
            Rgb([0, 0, 0])
        } else {
            Rgb([
                (sum[0] / n) as u8,
                (sum[1] / n) as u8,
                (sum[2] / n) as u8,
            ])
        };

        let mut out = image.clone();
        for (x, y, pixel) in out.enumerate_pixels_mut() {
            if region[[y as usize, x as usize]] > 0.0 {
                *pixel = fill;
            }
        }
        Ok(out)
    }
}

#[async_trait]
impl InpaintingOracle for FlatFillInpainter {
    async fn inpaint(&self, image: &RgbImage, mask: &Mask, dilate: u32) -> Result<RgbImage, VisionError> {
        Self::fill(image, mask, dilate)
    }
}
