//! Per-pixel mask algebra
//!
//! Masks are `Array2<f32>` indexed `[row, col]` with values in [0, 1].
//! Binary results are encoded as exactly 0.0 / 1.0 so they compose with
//! the float alpha arithmetic of the compositor.

use image::{GrayImage, ImageBuffer, Luma};
use imageproc::distance_transform::euclidean_squared_distance_transform;
use imageproc::filter::gaussian_blur_f32;
use imageproc::region_labelling::{self, Connectivity};
use ndarray::{Array2, Zip};

/// Float mask in [0, 1], shape (height, width)
pub type Mask = Array2<f32>;

/// Values strictly above this are considered set
pub const BINARY_THRESHOLD: f32 = 0.5;

/// All-zero mask of the given size
pub fn empty(height: usize, width: usize) -> Mask {
    Array2::zeros((height, width))
}

#[inline]
fn is_set(value: f32) -> bool {
    value > BINARY_THRESHOLD
}

/// Binarize at 0.5
pub fn binarize(mask: &Mask) -> Mask {
    mask.mapv(|v| if is_set(v) { 1.0 } else { 0.0 })
}

/// Number of set pixels
pub fn count(mask: &Mask) -> usize {
    mask.iter().filter(|&&v| is_set(v)).count()
}

/// True when no pixel is set
pub fn is_empty(mask: &Mask) -> bool {
    !mask.iter().any(|&v| is_set(v))
}

/// Fold `other` into `acc` with a per-pixel max
pub fn union_in_place(acc: &mut Mask, other: &Mask) {
    Zip::from(acc).and(other).for_each(|a, &b| {
        if b > *a {
            *a = b;
        }
    });
}

/// Per-pixel max of two masks
pub fn union(a: &Mask, b: &Mask) -> Mask {
    let mut out = a.clone();
    union_in_place(&mut out, b);
    out
}

/// Binary `a AND NOT b`
pub fn and_not(a: &Mask, b: &Mask) -> Mask {
    Zip::from(a)
        .and(b)
        .map_collect(|&x, &y| if is_set(x) && !is_set(y) { 1.0 } else { 0.0 })
}

/// Binary intersection
pub fn intersect(a: &Mask, b: &Mask) -> Mask {
    Zip::from(a)
        .and(b)
        .map_collect(|&x, &y| if is_set(x) && is_set(y) { 1.0 } else { 0.0 })
}

/// Intersection over union of the binarized masks; 0 when both are empty
pub fn iou(a: &Mask, b: &Mask) -> f32 {
    if a.dim() != b.dim() {
        return 0.0;
    }
    let mut inter = 0usize;
    let mut uni = 0usize;
    Zip::from(a).and(b).for_each(|&x, &y| {
        let (x, y) = (is_set(x), is_set(y));
        if x && y {
            inter += 1;
        }
        if x || y {
            uni += 1;
        }
    });
    if uni == 0 {
        0.0
    } else {
        inter as f32 / uni as f32
    }
}

/// Sigmas below this select hard compositing; `2σ²` would underflow
pub const MIN_BLUR_SIGMA: f32 = f32::EPSILON;

/// Binarized mask as an 8-bit image, set pixels at 255
fn to_binary_image(mask: &Mask) -> GrayImage {
    let (height, width) = mask.dim();
    GrayImage::from_fn(width as u32, height as u32, |x, y| {
        if is_set(mask[[y as usize, x as usize]]) {
            Luma([u8::MAX])
        } else {
            Luma([0])
        }
    })
}

/// Binarize then dilate with a disk structuring element (x² + y² <= r²)
pub fn dilate(mask: &Mask, radius: u32) -> Mask {
    let binary = binarize(mask);
    if radius == 0 || is_empty(&binary) {
        return binary;
    }

    let distances = euclidean_squared_distance_transform(&to_binary_image(&binary));
    let limit = f64::from(radius) * f64::from(radius);
    let (height, width) = binary.dim();
    Array2::from_shape_fn((height, width), |(r, c)| {
        if distances.get_pixel(c as u32, r as u32)[0] <= limit {
            1.0
        } else {
            0.0
        }
    })
}

/// Gaussian feathering; sigma below [`MIN_BLUR_SIGMA`] returns the input unchanged
pub fn gaussian_blur(mask: &Mask, sigma: f32) -> Mask {
    if sigma.is_nan() || sigma < MIN_BLUR_SIGMA || mask.is_empty() {
        return mask.clone();
    }
    let (height, width) = mask.dim();
    let image: ImageBuffer<Luma<f32>, Vec<f32>> =
        ImageBuffer::from_fn(width as u32, height as u32, |x, y| Luma([mask[[y as usize, x as usize]]]));
    let blurred = gaussian_blur_f32(&image, sigma);
    Array2::from_shape_fn((height, width), |(r, c)| {
        blurred.get_pixel(c as u32, r as u32)[0].clamp(0.0, 1.0)
    })
}

/// One 4-connected region of set pixels
#[derive(Debug, Clone, PartialEq)]
pub struct Component {
    pub pixels: Vec<(usize, usize)>,
}

impl Component {
    pub fn len(&self) -> usize {
        self.pixels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty()
    }

    /// Fraction of this component's pixels that are set in `mask`
    pub fn overlap_fraction(&self, mask: &Mask) -> f32 {
        if self.pixels.is_empty() {
            return 0.0;
        }
        let covered = self
            .pixels
            .iter()
            .filter(|&&(r, c)| is_set(mask[[r, c]]))
            .count();
        covered as f32 / self.pixels.len() as f32
    }

    /// Rasterize back into a binary mask of the given shape
    pub fn to_mask(&self, height: usize, width: usize) -> Mask {
        let mut out = empty(height, width);
        for &(r, c) in &self.pixels {
            out[[r, c]] = 1.0;
        }
        out
    }
}

/// Label 4-connected components of the binarized mask, in raster order of their first pixel
pub fn connected_components(mask: &Mask) -> Vec<Component> {
    let (height, width) = mask.dim();
    let labels = region_labelling::connected_components(
        &to_binary_image(mask),
        Connectivity::Four,
        Luma([0u8]),
    );

    // label -> position in `components`
    let mut slots: Vec<Option<usize>> = Vec::new();
    let mut components: Vec<Component> = Vec::new();
    for row in 0..height {
        for col in 0..width {
            let label = labels.get_pixel(col as u32, row as u32)[0] as usize;
            if label == 0 {
                continue;
            }
            if slots.len() <= label {
                slots.resize(label + 1, None);
            }
            let slot = match slots[label] {
                Some(slot) => slot,
                None => {
                    components.push(Component { pixels: Vec::new() });
                    slots[label] = Some(components.len() - 1);
                    components.len() - 1
                }
            };
            components[slot].pixels.push((row, col));
        }
    }
    components
}

/// Render a mask as an 8-bit grayscale image
pub fn to_gray_image(mask: &Mask) -> GrayImage {
    let (height, width) = mask.dim();
    GrayImage::from_fn(width as u32, height as u32, |x, y| {
        let v = mask[[y as usize, x as usize]].clamp(0.0, 1.0);
        Luma([(v * 255.0).round() as u8])
    })
}

/// Read an 8-bit grayscale image as a mask in [0, 1]
pub fn from_gray_image(image: &GrayImage) -> Mask {
    let (width, height) = image.dimensions();
    Array2::from_shape_fn((height as usize, width as usize), |(r, c)| {
        image.get_pixel(c as u32, r as u32)[0] as f32 / 255.0
    })
}
