//! Segmentation results

use crate::mask::{self, Mask};

/// One segmented instance
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    /// Instance name, e.g. "spoon_1"; equal to `base_concept` when the oracle returned one instance
    pub name: String,
    /// Concept the instance belongs to, e.g. "spoon"
    pub base_concept: String,
    /// Per-pixel confidence in [0, 1]
    pub mask: Mask,
    pub score: f32,
}

impl Detection {
    /// Build a detection, deriving the base concept from the instance name
    pub fn new(name: impl Into<String>, mask: Mask, score: f32) -> Self {
        let name = name.into();
        let base_concept = split_instance_name(&name).0.to_string();
        Self {
            name,
            base_concept,
            mask,
            score,
        }
    }

    /// Numeric instance suffix, if the oracle returned several instances of this concept
    pub fn instance_index(&self) -> Option<u32> {
        split_instance_name(&self.name).1
    }
}

/// Output of one segmentation call
#[derive(Debug, Clone, PartialEq)]
pub struct Segmentation {
    /// Union of all instance masks, binarized at 0.5
    pub mask: Mask,
    pub instances: Vec<Detection>,
}

impl Segmentation {
    /// Empty result for a frame of the given size
    pub fn empty(height: usize, width: usize) -> Self {
        Self {
            mask: mask::empty(height, width),
            instances: Vec::new(),
        }
    }

    /// Build a result from instances, computing the combined mask
    pub fn from_instances(height: usize, width: usize, instances: Vec<Detection>) -> Self {
        let mut combined = mask::empty(height, width);
        for detection in &instances {
            mask::union_in_place(&mut combined, &detection.mask);
        }
        Self {
            mask: mask::binarize(&combined),
            instances,
        }
    }

    /// Instances belonging to a base concept
    pub fn instances_of<'a>(&'a self, concept: &'a str) -> impl Iterator<Item = &'a Detection> + 'a {
        self.instances
            .iter()
            .filter(move |d| d.base_concept == concept)
    }

    pub fn dim(&self) -> (usize, usize) {
        self.mask.dim()
    }
}

/// Split "spoon_1" into ("spoon", Some(1)); names without a numeric suffix are returned whole
pub fn split_instance_name(name: &str) -> (&str, Option<u32>) {
    if let Some((base, suffix)) = name.rsplit_once('_') {
        if !base.is_empty() && !suffix.is_empty() && suffix.chars().all(|c| c.is_ascii_digit()) {
            if let Ok(index) = suffix.parse::<u32>() {
                return (base, Some(index));
            }
        }
    }
    (name, None)
}

/// Split a "spoon. towel. robot arm" prompt into its concepts
pub fn parse_concept_list(prompt: &str) -> Vec<String> {
    prompt
        .split('.')
        .map(|c| c.trim())
        .filter(|c| !c.is_empty())
        .map(|c| c.to_string())
        .collect()
}
