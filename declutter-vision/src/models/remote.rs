//! HTTP backends talking to a separate inference process

use super::wire::{decode_mask, decode_rgb, encode_mask, encode_rgb};
use super::{ConceptSegmenter, Detection, InpaintingOracle, Segmentation};
use crate::error::VisionError;
use crate::mask::{self, Mask};
use async_trait::async_trait;
use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

const DEFAULT_TIMEOUT_SECS: u64 = 120;

#[derive(Debug, Serialize, Deserialize)]
pub struct SegmentRequest {
    /// base64 PNG
    pub image: String,
    /// Concept list, "spoon. towel"
    pub prompt: String,
    pub threshold: f32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct InstancePayload {
    pub name: String,
    #[serde(default)]
    pub base_concept: Option<String>,
    /// base64 grayscale PNG
    pub mask: String,
    pub score: f32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SegmentResponse {
    /// base64 grayscale PNG of the combined mask
    pub mask: String,
    #[serde(default)]
    pub instances: Vec<InstancePayload>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct InpaintRequest {
    pub image: String,
    pub mask: String,
    pub dilate: u32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct InpaintResponse {
    pub image: String,
}

fn build_client(timeout: Duration) -> Result<reqwest::Client, VisionError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(VisionError::Network)
}

fn validate_endpoint(endpoint: &str) -> Result<(), VisionError> {
    if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
        return Err(VisionError::config(
            "endpoint",
            format!("Oracle endpoint must be an http(s) URL, got {:?}", endpoint),
        ));
    }
    Ok(())
}

/// Segmenter served over HTTP (`POST {endpoint}` with a [`SegmentRequest`])
pub struct RemoteSegmenter {
    client: reqwest::Client,
    endpoint: String,
}

impl RemoteSegmenter {
    /// Create a new remote segmenter
    pub fn new(endpoint: impl Into<String>) -> Result<Self, VisionError> {
        Self::with_timeout(endpoint, Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    pub fn with_timeout(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, VisionError> {
        let endpoint = endpoint.into();
        validate_endpoint(&endpoint)?;
        Ok(Self {
            client: build_client(timeout)?,
            endpoint,
        })
    }

    /// Convert a wire response into a segmentation for a frame of the given size
    pub fn decode_response(
        response: SegmentResponse,
        height: usize,
        width: usize,
    ) -> Result<Segmentation, VisionError> {
        let check = |m: &Mask, what: &str| -> Result<(), VisionError> {
            if m.dim() != (height, width) {
                return Err(VisionError::Segmentation(format!(
                    "{} mask shape {:?} does not match frame {}x{}",
                    what,
                    m.dim(),
                    width,
                    height
                )));
            }
            Ok(())
        };

        let combined = decode_mask(&response.mask)?;
        check(&combined, "combined")?;

        let mut instances = Vec::with_capacity(response.instances.len());
        for payload in response.instances {
            let instance_mask = decode_mask(&payload.mask)?;
            check(&instance_mask, &payload.name)?;
            let mut detection = Detection::new(payload.name, instance_mask, payload.score);
            if let Some(base) = payload.base_concept {
                detection.base_concept = base;
            }
            instances.push(detection);
        }

        Ok(Segmentation {
            mask: mask::binarize(&combined),
            instances,
        })
    }
}

#[async_trait]
impl ConceptSegmenter for RemoteSegmenter {
    async fn segment(
        &self,
        image: &RgbImage,
        concepts: &str,
        threshold: f32,
    ) -> Result<Segmentation, VisionError> {
        let request = SegmentRequest {
            image: encode_rgb(image)?,
            prompt: concepts.to_string(),
            threshold,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| VisionError::Segmentation(format!("Request to {} failed: {}", self.endpoint, e)))?;

        if !response.status().is_success() {
            return Err(VisionError::Segmentation(format!(
                "Segmenter returned HTTP {}",
                response.status()
            )));
        }

        let body: SegmentResponse = response
            .json()
            .await
            .map_err(|e| VisionError::Segmentation(format!("Invalid segmenter response: {}", e)))?;
        debug!("Segmenter returned {} instances for {:?}", body.instances.len(), concepts);

        let (width, height) = image.dimensions();
        Self::decode_response(body, height as usize, width as usize)
    }
}

/// Inpainter served over HTTP (`POST {endpoint}` with an [`InpaintRequest`])
pub struct RemoteInpainter {
    client: reqwest::Client,
    endpoint: String,
}

impl RemoteInpainter {
    /// Create a new remote inpainter
    pub fn new(endpoint: impl Into<String>) -> Result<Self, VisionError> {
        Self::with_timeout(endpoint, Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    pub fn with_timeout(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, VisionError> {
        let endpoint = endpoint.into();
        validate_endpoint(&endpoint)?;
        Ok(Self {
            client: build_client(timeout)?,
            endpoint,
        })
    }
}

#[async_trait]
impl InpaintingOracle for RemoteInpainter {
    async fn inpaint(&self, image: &RgbImage, mask: &Mask, dilate: u32) -> Result<RgbImage, VisionError> {
        let request = InpaintRequest {
            image: encode_rgb(image)?,
            mask: encode_mask(mask)?,
            dilate,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| VisionError::Inpainting(format!("Request to {} failed: {}", self.endpoint, e)))?;

        if !response.status().is_success() {
            return Err(VisionError::Inpainting(format!(
                "Inpainter returned HTTP {}",
                response.status()
            )));
        }

        let body: InpaintResponse = response
            .json()
            .await
            .map_err(|e| VisionError::Inpainting(format!("Invalid inpainter response: {}", e)))?;
        let plate = decode_rgb(&body.image)?;
        if plate.dimensions() != image.dimensions() {
            return Err(VisionError::Inpainting(format!(
                "Inpainted image is {:?}, expected {:?}",
                plate.dimensions(),
                image.dimensions()
            )));
        }
        Ok(plate)
    }
}
