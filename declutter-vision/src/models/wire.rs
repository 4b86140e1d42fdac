//! Image and mask codec for the remote oracle protocol
//!
//! Images travel as base64 PNG; masks as base64 8-bit grayscale PNG
//! mapped linearly onto [0, 1].

use crate::error::VisionError;
use crate::mask::{self, Mask};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use image::{GrayImage, ImageFormat, ImageOutputFormat, RgbImage};
use std::io::Cursor;

/// Encode an RGB frame as base64 PNG
pub fn encode_rgb(image: &RgbImage) -> Result<String, VisionError> {
    let mut bytes = Vec::new();
    image.write_to(&mut Cursor::new(&mut bytes), ImageOutputFormat::Png)?;
    Ok(STANDARD.encode(bytes))
}

/// Decode a base64 PNG into an RGB frame
pub fn decode_rgb(payload: &str) -> Result<RgbImage, VisionError> {
    let bytes = decode_base64(payload)?;
    let image = image::load_from_memory_with_format(&bytes, ImageFormat::Png)?;
    Ok(image.to_rgb8())
}

/// Encode a mask as base64 grayscale PNG
pub fn encode_mask(mask: &Mask) -> Result<String, VisionError> {
    let gray: GrayImage = mask::to_gray_image(mask);
    let mut bytes = Vec::new();
    gray.write_to(&mut Cursor::new(&mut bytes), ImageOutputFormat::Png)?;
    Ok(STANDARD.encode(bytes))
}

/// Decode a base64 grayscale PNG into a mask
pub fn decode_mask(payload: &str) -> Result<Mask, VisionError> {
    let bytes = decode_base64(payload)?;
    let image = image::load_from_memory_with_format(&bytes, ImageFormat::Png)?;
    Ok(mask::from_gray_image(&image.to_luma8()))
}

fn decode_base64(payload: &str) -> Result<Vec<u8>, VisionError> {
    STANDARD
        .decode(payload.trim())
        .map_err(|e| VisionError::Processing(format!("Invalid base64 payload: {}", e)))
}
