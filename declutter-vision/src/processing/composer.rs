//! Mask composition: frozen masks to inpaint and compositing masks

use crate::mask::{self, Mask};
use serde::{Deserialize, Serialize};

/// Dilation radii used by the composer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DilationRadii {
    pub distractor: u32,
    pub safe: u32,
}

impl DilationRadii {
    /// Safe buffer is never smaller than the distractor expansion
    pub fn effective_safe(&self) -> u32 {
        self.safe.max(self.distractor)
    }
}

/// Output of [`MaskComposer::compute`]
#[derive(Debug, Clone, PartialEq)]
pub struct ComposedMasks {
    /// Region handed to the inpainting oracle
    pub inpaint_mask: Mask,
    /// Undilated distractor outside the safe buffer; source of the blend alpha
    pub compositing_mask: Mask,
    pub dilated_safe: Mask,
    pub dilated_distractor: Mask,
    /// Binarized undilated distractor
    pub distractor: Mask,
    pub effective_safe_radius: u32,
}

impl ComposedMasks {
    /// Nothing to remove
    pub fn is_noop(&self) -> bool {
        mask::is_empty(&self.inpaint_mask) && mask::is_empty(&self.compositing_mask)
    }
}

pub struct MaskComposer;

impl MaskComposer {
    /// Compose the inpaint and compositing masks. Pure: depends only on its arguments.
    pub fn compute(safe: &Mask, distractor: &Mask, radii: DilationRadii) -> ComposedMasks {
        let effective_safe_radius = radii.effective_safe();
        let dilated_distractor = mask::dilate(distractor, radii.distractor);
        let dilated_safe = mask::dilate(safe, effective_safe_radius);

        let inpaint_mask = mask::and_not(&dilated_distractor, &dilated_safe);
        let compositing_mask = mask::and_not(distractor, &dilated_safe);

        ComposedMasks {
            inpaint_mask,
            compositing_mask,
            dilated_safe,
            dilated_distractor,
            distractor: mask::binarize(distractor),
            effective_safe_radius,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;
    use proptest::prelude::*;

    fn rect(r0: usize, c0: usize, r1: usize, c1: usize) -> Mask {
        Array2::from_shape_fn((24, 24), |(r, c)| {
            if r >= r0 && r < r1 && c >= c0 && c < c1 {
                1.0
            } else {
                0.0
            }
        })
    }

    #[test]
    fn test_effective_radius() {
        let radii = DilationRadii { distractor: 6, safe: 2 };
        assert_eq!(radii.effective_safe(), 6);
        let composed = MaskComposer::compute(&rect(0, 0, 2, 2), &rect(10, 10, 12, 12), radii);
        assert_eq!(composed.effective_safe_radius, 6);
    }

    #[test]
    fn test_compositing_starts_at_true_edge() {
        let safe = mask::empty(24, 24);
        let distractor = rect(10, 10, 14, 14);
        let composed = MaskComposer::compute(&safe, &distractor, DilationRadii { distractor: 3, safe: 1 });
        // inpaint covers the buffer, compositing does not
        assert_eq!(composed.inpaint_mask[[10, 8]], 1.0);
        assert_eq!(composed.compositing_mask[[10, 8]], 0.0);
        assert_eq!(composed.compositing_mask[[11, 11]], 1.0);
        assert_eq!(mask::count(&composed.compositing_mask), 16);
    }

    #[test]
    fn test_safe_carves_out_distractor() {
        // spoon lying on a towel misdetected as distractor
        let safe = rect(10, 10, 12, 12);
        let distractor = rect(8, 8, 16, 16);
        let composed = MaskComposer::compute(&safe, &distractor, DilationRadii { distractor: 1, safe: 1 });
        assert_eq!(composed.compositing_mask[[11, 11]], 0.0);
        assert_eq!(composed.inpaint_mask[[11, 11]], 0.0);
        assert_eq!(composed.compositing_mask[[15, 15]], 1.0);
    }

    #[test]
    fn test_empty_distractor_is_noop() {
        let composed = MaskComposer::compute(
            &rect(0, 0, 4, 4),
            &mask::empty(24, 24),
            DilationRadii { distractor: 10, safe: 5 },
        );
        assert!(composed.is_noop());
    }

    fn arb_mask() -> impl Strategy<Value = Mask> {
        proptest::collection::vec(prop_oneof![Just(0.0f32), Just(1.0f32), 0.0f32..1.0], 12 * 12)
            .prop_map(|v| Array2::from_shape_vec((12, 12), v).unwrap())
    }

    proptest! {
        #[test]
        fn prop_compute_is_pure(safe in arb_mask(), distractor in arb_mask(), d in 0u32..4, s in 0u32..4) {
            let radii = DilationRadii { distractor: d, safe: s };
            let first = MaskComposer::compute(&safe, &distractor, radii);
            let second = MaskComposer::compute(&safe, &distractor, radii);
            prop_assert_eq!(first, second);
        }

        #[test]
        fn prop_compositing_disjoint_from_dilated_safe(safe in arb_mask(), distractor in arb_mask(), d in 0u32..4, s in 0u32..4) {
            let composed = MaskComposer::compute(&safe, &distractor, DilationRadii { distractor: d, safe: s });
            prop_assert!(mask::is_empty(&mask::intersect(&composed.compositing_mask, &composed.dilated_safe)));
            prop_assert!(mask::is_empty(&mask::intersect(&composed.inpaint_mask, &composed.dilated_safe)));
        }
    }
}
