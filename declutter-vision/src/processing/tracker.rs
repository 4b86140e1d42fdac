//! Multi-frame mask tracking
//!
//! Noisy per-frame segmentation results are folded into stable per-category
//! masks over the warmup window, then frozen for the rest of the episode.
//! Only the robot keeps being re-segmented after the freeze.

use crate::config::DistillConfig;
use crate::error::VisionError;
use crate::mask::{self, Mask};
use crate::models::{Detection, Segmentation};
use ndarray::{Array2, Zip};
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Slack used when comparing genuineness against the margin, so a value
/// that equals the margin up to float rounding is retained
const MARGIN_EPSILON: f32 = 1e-6;

/// Running union of one category's detections
#[derive(Debug, Clone, PartialEq)]
pub struct AccumulatedMask {
    union: Mask,
    votes: Array2<u32>,
    frozen: bool,
    accepted: u32,
}

impl AccumulatedMask {
    pub fn new(height: usize, width: usize) -> Self {
        Self {
            union: mask::empty(height, width),
            votes: Array2::zeros((height, width)),
            frozen: false,
            accepted: 0,
        }
    }

    /// Per-pixel union in [0, 1]
    pub fn union(&self) -> &Mask {
        &self.union
    }

    /// Number of accepted detections covering each pixel
    pub fn votes(&self) -> &Array2<u32> {
        &self.votes
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Number of detections folded in so far
    pub fn accepted_count(&self) -> u32 {
        self.accepted
    }

    pub fn is_empty(&self) -> bool {
        mask::is_empty(&self.union)
    }

    /// Fold a detection mask in with a per-pixel max. Never removes coverage.
    /// Returns false (and changes nothing) once frozen.
    pub fn accumulate(&mut self, detection: &Mask) -> bool {
        if self.frozen {
            warn!("Ignoring accumulation into a frozen mask");
            return false;
        }
        mask::union_in_place(&mut self.union, detection);
        Zip::from(&mut self.votes).and(detection).for_each(|v, &m| {
            if m > mask::BINARY_THRESHOLD {
                *v += 1;
            }
        });
        self.accepted += 1;
        true
    }

    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    /// Drop every pixel outside `keep` (union and votes)
    fn retain_only(&mut self, keep: &Mask) {
        Zip::from(&mut self.union)
            .and(&mut self.votes)
            .and(keep)
            .for_each(|u, v, &k| {
                if k <= mask::BINARY_THRESHOLD {
                    *u = 0.0;
                    *v = 0;
                }
            });
    }

    /// Drop all coverage
    fn clear(&mut self) {
        self.union.fill(0.0);
        self.votes.fill(0);
    }
}

/// Thresholds governing safe-set validation
#[derive(Debug, Clone, PartialEq)]
pub struct TrackerSettings {
    pub genuineness_margin: f32,
    pub cross_validation_iou: f32,
    pub iou_gate_threshold: f32,
    pub iou_gate_start_frame: u32,
    pub min_component_pixels: usize,
    pub overlap_penalty_cap: f32,
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self::from(&DistillConfig::default())
    }
}

impl From<&DistillConfig> for TrackerSettings {
    fn from(config: &DistillConfig) -> Self {
        Self {
            genuineness_margin: config.genuineness_margin,
            cross_validation_iou: config.cross_validation_iou,
            iou_gate_threshold: config.iou_gate_threshold,
            iou_gate_start_frame: config.iou_gate_start_frame,
            min_component_pixels: config.min_component_pixels,
            overlap_penalty_cap: config.overlap_penalty_cap,
        }
    }
}

/// Genuineness of one target candidate
#[derive(Debug, Clone, PartialEq)]
pub struct GenuinenessScore {
    pub name: String,
    pub score: f32,
    pub genuineness: f32,
    /// Strongest overlapping distractor instance, if any
    pub rival: Option<String>,
    pub retained: bool,
}

/// Result of cross-validating one frame's target candidates
#[derive(Debug, Clone, PartialEq)]
pub struct CrossValidation {
    pub survivors: Vec<Detection>,
    pub scores: Vec<GenuinenessScore>,
    /// Union of rejected candidates. Diagnostic only: it is never subtracted
    /// from the accumulated masks.
    pub false_positive_mask: Option<Mask>,
}

/// `own score - max score of distractors overlapping with IoU > overlap_iou`
pub fn genuineness(candidate: &Detection, distractors: &[Detection], overlap_iou: f32) -> (f32, Option<String>) {
    let rival = distractors
        .iter()
        .filter(|d| mask::iou(&candidate.mask, &d.mask) > overlap_iou)
        .max_by(|a, b| a.score.total_cmp(&b.score));
    match rival {
        Some(d) => (candidate.score - d.score, Some(d.name.clone())),
        None => (candidate.score, None),
    }
}

/// Drop candidates whose genuineness is below `margin`, always keeping the most genuine one
pub fn cross_validate(
    candidates: &[Detection],
    distractors: &[Detection],
    margin: f32,
    overlap_iou: f32,
) -> CrossValidation {
    let mut scores: Vec<GenuinenessScore> = candidates
        .iter()
        .map(|c| {
            let (g, rival) = genuineness(c, distractors, overlap_iou);
            GenuinenessScore {
                name: c.name.clone(),
                score: c.score,
                genuineness: g,
                rival,
                retained: g >= margin - MARGIN_EPSILON,
            }
        })
        .collect();

    if let Some(best) = scores
        .iter()
        .enumerate()
        .max_by(|(_, a), (_, b)| a.genuineness.total_cmp(&b.genuineness))
        .map(|(i, _)| i)
    {
        scores[best].retained = true;
    }

    let mut survivors = Vec::new();
    let mut false_positive_mask: Option<Mask> = None;
    for (candidate, score) in candidates.iter().zip(&scores) {
        if score.retained {
            survivors.push(candidate.clone());
        } else {
            debug!(
                "Rejecting {} (genuineness {:.3} < margin {:.3})",
                candidate.name, score.genuineness, margin
            );
            match false_positive_mask.as_mut() {
                Some(fp) => mask::union_in_place(fp, &candidate.mask),
                None => false_positive_mask = Some(mask::binarize(&candidate.mask)),
            }
        }
    }
    if let Some(fp) = false_positive_mask.as_mut() {
        *fp = mask::binarize(fp);
    }

    CrossValidation {
        survivors,
        scores,
        false_positive_mask,
    }
}

/// Keep the highest-scoring instance per base concept, in order of first appearance
pub fn select_top1(detections: Vec<Detection>) -> Vec<Detection> {
    let mut order: Vec<String> = Vec::new();
    let mut best: HashMap<String, Detection> = HashMap::new();
    for detection in detections {
        match best.get(&detection.base_concept) {
            Some(current) if current.score >= detection.score => {}
            Some(_) => {
                best.insert(detection.base_concept.clone(), detection);
            }
            None => {
                order.push(detection.base_concept.clone());
                best.insert(detection.base_concept.clone(), detection);
            }
        }
    }
    order.into_iter().filter_map(|c| best.remove(&c)).collect()
}

/// Cleanup score of a component: `mean_votes * (1 - min(overlap, cap))`
pub fn component_score(mean_votes: f32, overlap: f32, cap: f32) -> f32 {
    mean_votes * (1.0 - overlap.min(cap))
}

/// Outcome of the IoU gate for one target detection
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GateDecision {
    FirstDetection,
    GracePeriod,
    Accepted { iou: f32 },
    Rejected { iou: f32 },
}

impl GateDecision {
    pub fn accepted(&self) -> bool {
        !matches!(self, GateDecision::Rejected { .. })
    }
}

/// What happened to one warmup frame
#[derive(Debug, Clone, PartialEq)]
pub struct WarmupFrameReport {
    pub frame_index: u32,
    pub cross_validation: Option<CrossValidation>,
    pub gate: Option<GateDecision>,
    pub anchor_accumulated: bool,
}

/// Score of one target component during post-warmup cleanup
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentScore {
    pub pixels: usize,
    pub mean_votes: f32,
    pub distractor_overlap: f32,
    pub score: f32,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct CleanupReport {
    pub components: Vec<ComponentScore>,
    /// Index into `components` of the one kept
    pub kept: Option<usize>,
}

/// Stateful engine accumulating target, anchor, distractor and robot masks
#[derive(Debug, Clone)]
pub struct MaskTracker {
    settings: TrackerSettings,
    target_concept: String,
    anchor_concept: Option<String>,
    target: AccumulatedMask,
    anchor: AccumulatedMask,
    distractor: AccumulatedMask,
    robot: AccumulatedMask,
    live_robot: Mask,
    frames_observed: u32,
    cleanup: Option<CleanupReport>,
}

impl MaskTracker {
    /// Create a new tracker for frames of the given size
    pub fn new(
        height: usize,
        width: usize,
        target_concept: impl Into<String>,
        anchor_concept: Option<String>,
        settings: TrackerSettings,
    ) -> Self {
        Self {
            settings,
            target_concept: target_concept.into(),
            anchor_concept,
            target: AccumulatedMask::new(height, width),
            anchor: AccumulatedMask::new(height, width),
            distractor: AccumulatedMask::new(height, width),
            robot: AccumulatedMask::new(height, width),
            live_robot: mask::empty(height, width),
            frames_observed: 0,
            cleanup: None,
        }
    }

    pub fn dim(&self) -> (usize, usize) {
        self.target.union.dim()
    }

    fn check_dim(&self, segmentation: &Segmentation, category: &str) -> Result<(), VisionError> {
        if segmentation.dim() != self.dim() {
            return Err(VisionError::Processing(format!(
                "{} segmentation is {:?}, tracker expects {:?}",
                category,
                segmentation.dim(),
                self.dim()
            )));
        }
        Ok(())
    }

    /// Fold one warmup frame's raw results into the running masks.
    /// `None` means the category was not segmented this frame.
    pub fn observe_warmup(
        &mut self,
        frame_index: u32,
        safe: Option<&Segmentation>,
        distractor: Option<&Segmentation>,
        robot: Option<&Segmentation>,
    ) -> Result<WarmupFrameReport, VisionError> {
        for (seg, category) in [(safe, "safe"), (distractor, "distractor"), (robot, "robot")] {
            if let Some(seg) = seg {
                self.check_dim(seg, category)?;
            }
        }
        if self.is_frozen() {
            return Err(VisionError::Processing(
                "Warmup observation after masks were frozen".to_string(),
            ));
        }

        let mut report = WarmupFrameReport {
            frame_index,
            cross_validation: None,
            gate: None,
            anchor_accumulated: false,
        };

        if let Some(safe) = safe {
            let candidates: Vec<Detection> = safe.instances_of(&self.target_concept).cloned().collect();
            if !candidates.is_empty() {
                let distractors: &[Detection] = distractor.map(|d| d.instances.as_slice()).unwrap_or(&[]);
                let validation = cross_validate(
                    &candidates,
                    distractors,
                    self.settings.genuineness_margin,
                    self.settings.cross_validation_iou,
                );
                if let Some(chosen) = select_top1(validation.survivors.clone()).into_iter().next() {
                    let decision = self.gate(frame_index, &chosen.mask);
                    if decision.accepted() {
                        self.target.accumulate(&chosen.mask);
                    } else {
                        debug!("Frame {}: {} rejected by IoU gate ({:?})", frame_index, chosen.name, decision);
                    }
                    report.gate = Some(decision);
                }
                report.cross_validation = Some(validation);
            }

            if let Some(anchor) = self.anchor_concept.as_deref() {
                let (height, width) = self.dim();
                let mut combined = mask::empty(height, width);
                let mut any = false;
                for detection in safe.instances_of(anchor) {
                    mask::union_in_place(&mut combined, &detection.mask);
                    any = true;
                }
                if any {
                    self.anchor.accumulate(&combined);
                    report.anchor_accumulated = true;
                }
            }
        }

        if let Some(distractor) = distractor {
            if !distractor.instances.is_empty() || !mask::is_empty(&distractor.mask) {
                self.distractor.accumulate(&distractor.mask);
            }
        }

        if let Some(robot) = robot {
            self.live_robot = robot.mask.clone();
            if !mask::is_empty(&robot.mask) {
                self.robot.accumulate(&robot.mask);
            }
        }

        self.frames_observed += 1;
        Ok(report)
    }

    /// IoU gate for a target detection against the running union
    fn gate(&self, frame_index: u32, candidate: &Mask) -> GateDecision {
        if self.target.accepted_count() == 0 {
            return GateDecision::FirstDetection;
        }
        if frame_index < self.settings.iou_gate_start_frame {
            return GateDecision::GracePeriod;
        }
        let iou = mask::iou(candidate, &self.target.union);
        if iou > self.settings.iou_gate_threshold {
            GateDecision::Accepted { iou }
        } else {
            GateDecision::Rejected { iou }
        }
    }

    /// Whether any target detection has been accumulated
    pub fn target_found(&self) -> bool {
        self.target.accepted_count() > 0
    }

    pub fn frames_observed(&self) -> u32 {
        self.frames_observed
    }

    /// Run the one-time spatial cleanup of the target mask and freeze every category.
    /// Calling it again returns the first report without touching the masks.
    pub fn finalize(&mut self) -> CleanupReport {
        if let Some(report) = &self.cleanup {
            return report.clone();
        }

        let report = self.clean_target();
        self.target.freeze();
        self.anchor.freeze();
        self.distractor.freeze();
        self.robot.freeze();

        info!(
            "Masks frozen after {} warmup frames (target found: {}, components: {}, kept: {:?})",
            self.frames_observed,
            self.target_found(),
            report.components.len(),
            report.kept
        );
        self.cleanup = Some(report.clone());
        report
    }

    fn clean_target(&mut self) -> CleanupReport {
        let components = mask::connected_components(&self.target.union);
        if components.is_empty() {
            return CleanupReport::default();
        }

        let frames = self.frames_observed.max(1) as f32;
        let distractor = mask::binarize(&self.distractor.union);
        let large_enough = components
            .iter()
            .any(|c| c.len() >= self.settings.min_component_pixels);

        let mut scores = Vec::with_capacity(components.len());
        let mut kept: Option<usize> = None;
        for (index, component) in components.iter().enumerate() {
            let vote_sum: u64 = component
                .pixels
                .iter()
                .map(|&(r, c)| self.target.votes[[r, c]] as u64)
                .sum();
            let mean_votes = vote_sum as f32 / component.len() as f32 / frames;
            let overlap = component.overlap_fraction(&distractor);
            let score = component_score(mean_votes, overlap, self.settings.overlap_penalty_cap);
            scores.push(ComponentScore {
                pixels: component.len(),
                mean_votes,
                distractor_overlap: overlap,
                score,
            });

            let eligible = !large_enough || component.len() >= self.settings.min_component_pixels;
            if eligible && kept.map_or(true, |k| score > scores[k].score) {
                kept = Some(index);
            }
        }

        match kept {
            Some(index) => {
                let (height, width) = self.dim();
                let keep = components[index].to_mask(height, width);
                self.target.retain_only(&keep);
            }
            None => self.target.clear(),
        }
        for (index, score) in scores.iter().enumerate() {
            debug!(
                "Target component {}: {} px, votes {:.2}, overlap {:.2}, score {:.3}{}",
                index,
                score.pixels,
                score.mean_votes,
                score.distractor_overlap,
                score.score,
                if Some(index) == kept { " (kept)" } else { "" }
            );
        }

        CleanupReport {
            components: scores,
            kept,
        }
    }

    pub fn is_frozen(&self) -> bool {
        self.cleanup.is_some()
    }

    /// Report of the post-warmup cleanup, once it ran
    pub fn cleanup_report(&self) -> Option<&CleanupReport> {
        self.cleanup.as_ref()
    }

    /// Replace the live robot mask with a fresh steady-phase segmentation
    pub fn observe_robot(&mut self, robot: &Segmentation) -> Result<(), VisionError> {
        self.check_dim(robot, "robot")?;
        self.live_robot = robot.mask.clone();
        Ok(())
    }

    /// Target and anchor only; the robot is kept out of the frozen safe-set
    pub fn safe_mask(&self) -> Mask {
        mask::union(&self.target.union, &self.anchor.union)
    }

    pub fn target(&self) -> &AccumulatedMask {
        &self.target
    }

    pub fn anchor(&self) -> &AccumulatedMask {
        &self.anchor
    }

    pub fn distractor(&self) -> &AccumulatedMask {
        &self.distractor
    }

    /// Robot union over warmup, used to clear the arm's start pose from the plate
    pub fn robot(&self) -> &AccumulatedMask {
        &self.robot
    }

    /// Most recent robot segmentation
    pub fn live_robot(&self) -> &Mask {
        &self.live_robot
    }

    pub fn target_concept(&self) -> &str {
        &self.target_concept
    }

    pub fn anchor_concept(&self) -> Option<&str> {
        self.anchor_concept.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(height: usize, width: usize, r0: usize, c0: usize, r1: usize, c1: usize) -> Mask {
        Array2::from_shape_fn((height, width), |(r, c)| {
            if r >= r0 && r < r1 && c >= c0 && c < c1 {
                1.0
            } else {
                0.0
            }
        })
    }

    fn seg(instances: Vec<Detection>) -> Segmentation {
        Segmentation::from_instances(20, 20, instances)
    }

    fn tracker() -> MaskTracker {
        MaskTracker::new(20, 20, "spoon", Some("towel".to_string()), TrackerSettings::default())
    }

    #[test]
    fn test_accumulated_mask_monotone_and_votes() {
        let mut acc = AccumulatedMask::new(4, 4);
        acc.accumulate(&block(4, 4, 0, 0, 2, 2));
        acc.accumulate(&block(4, 4, 1, 1, 3, 3));
        assert_eq!(acc.union()[[0, 0]], 1.0);
        assert_eq!(acc.union()[[2, 2]], 1.0);
        assert_eq!(acc.votes()[[1, 1]], 2);
        assert_eq!(acc.votes()[[0, 0]], 1);
        assert_eq!(acc.accepted_count(), 2);
    }

    #[test]
    fn test_frozen_mask_ignores_accumulation() {
        let mut acc = AccumulatedMask::new(4, 4);
        acc.freeze();
        assert!(!acc.accumulate(&block(4, 4, 0, 0, 2, 2)));
        assert!(acc.is_empty());
    }

    #[test]
    fn test_genuineness_scenario() {
        // spoon_0 overlaps spatula with IoU 0.5
        let spoon_0 = Detection::new("spoon_0", block(20, 20, 0, 0, 4, 10), 0.6);
        let spatula = Detection::new("spatula", block(20, 20, 0, 5, 4, 15), 0.7);
        let spoon_1 = Detection::new("spoon_1", block(20, 20, 10, 10, 14, 14), 0.5);
        assert!((mask::iou(&spoon_0.mask, &spatula.mask) - 1.0 / 3.0).abs() < 1e-6);

        // make the overlap exactly 0.5
        let spatula = Detection::new("spatula", block(20, 20, 0, 0, 4, 5), 0.7);
        assert!((mask::iou(&spoon_0.mask, &spatula.mask) - 0.5).abs() < 1e-6);

        let distractors = vec![spatula];
        let (g0, rival) = genuineness(&spoon_0, &distractors, 0.3);
        assert!((g0 + 0.1).abs() < 1e-5);
        assert_eq!(rival.as_deref(), Some("spatula"));
        let (g1, rival) = genuineness(&spoon_1, &distractors, 0.3);
        assert!((g1 - 0.5).abs() < 1e-6);
        assert!(rival.is_none());

        let candidates = vec![spoon_0.clone(), spoon_1.clone()];
        let kept = cross_validate(&candidates, &distractors, -0.1, 0.3);
        assert_eq!(kept.survivors.len(), 2);
        assert!(kept.false_positive_mask.is_none());

        let strict = cross_validate(&candidates, &distractors, 0.0, 0.3);
        assert_eq!(strict.survivors.len(), 1);
        assert_eq!(strict.survivors[0].name, "spoon_1");
        assert!(strict.false_positive_mask.is_some());
    }

    #[test]
    fn test_cross_validation_keeps_best_even_if_negative() {
        let spoon = Detection::new("spoon_0", block(20, 20, 0, 0, 4, 4), 0.3);
        let fork = Detection::new("fork", block(20, 20, 0, 0, 4, 4), 0.9);
        let result = cross_validate(&[spoon], &[fork], -0.1, 0.3);
        assert_eq!(result.survivors.len(), 1);
        assert!(result.scores[0].genuineness < -0.5);
    }

    #[test]
    fn test_select_top1_per_concept() {
        let dets = vec![
            Detection::new("spoon_0", block(20, 20, 0, 0, 2, 2), 0.4),
            Detection::new("spoon_1", block(20, 20, 5, 5, 7, 7), 0.8),
            Detection::new("towel", block(20, 20, 9, 9, 12, 12), 0.5),
        ];
        let top = select_top1(dets);
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].name, "spoon_1");
        assert_eq!(top[1].name, "towel");
    }

    #[test]
    fn test_component_score_scenario() {
        let a = component_score(0.8, 0.2, 0.7);
        let b = component_score(0.4, 0.95, 0.7);
        assert!((a - 0.64).abs() < 1e-6);
        assert!((b - 0.12).abs() < 1e-6);
        assert!(a > b);
    }

    #[test]
    fn test_iou_gate_rejects_jump_after_grace() {
        let mut tracker = tracker();
        let home = Detection::new("spoon", block(20, 20, 0, 0, 5, 5), 0.9);
        let jump = Detection::new("spoon", block(20, 20, 12, 12, 17, 17), 0.9);

        let r0 = tracker.observe_warmup(0, Some(&seg(vec![home.clone()])), None, None).unwrap();
        assert_eq!(r0.gate, Some(GateDecision::FirstDetection));
        // frame 1 is still in the grace window
        let r1 = tracker.observe_warmup(1, Some(&seg(vec![jump.clone()])), None, None).unwrap();
        assert_eq!(r1.gate, Some(GateDecision::GracePeriod));
        let r2 = tracker.observe_warmup(2, Some(&seg(vec![home.clone()])), None, None).unwrap();
        assert!(matches!(r2.gate, Some(GateDecision::Accepted { .. })));

        let far = Detection::new("spoon", block(20, 20, 8, 0, 10, 3), 0.9);
        let r3 = tracker.observe_warmup(3, Some(&seg(vec![far])), None, None).unwrap();
        assert!(matches!(r3.gate, Some(GateDecision::Rejected { .. })));
        assert_eq!(tracker.target().union()[[9, 1]], 0.0);
        assert_eq!(tracker.target().accepted_count(), 3);
    }

    #[test]
    fn test_rejected_candidates_do_not_erase_history() {
        let mut tracker = tracker();
        let spoon = Detection::new("spoon_0", block(20, 20, 0, 0, 4, 4), 0.9);
        tracker.observe_warmup(0, Some(&seg(vec![spoon])), None, None).unwrap();

        // A look-alike over the same pixels loses to a stronger distractor, but a
        // second candidate wins; the earlier coverage must remain.
        let lookalike = Detection::new("spoon_0", block(20, 20, 0, 0, 4, 4), 0.2);
        let other = Detection::new("spoon_1", block(20, 20, 0, 0, 4, 5), 0.8);
        let spatula = Detection::new("spatula", block(20, 20, 0, 0, 4, 4), 0.9);
        tracker
            .observe_warmup(
                1,
                Some(&seg(vec![lookalike, other])),
                Some(&seg(vec![spatula])),
                None,
            )
            .unwrap();
        assert_eq!(tracker.target().union()[[0, 0]], 1.0);
        assert_eq!(tracker.target().union()[[3, 4]], 1.0);
    }

    #[test]
    fn test_anchor_accumulates_unconditionally() {
        let mut tracker = tracker();
        let towel_a = Detection::new("towel_0", block(20, 20, 10, 0, 12, 4), 0.5);
        let towel_b = Detection::new("towel_1", block(20, 20, 15, 15, 18, 18), 0.4);
        let report = tracker
            .observe_warmup(5, Some(&seg(vec![towel_a, towel_b])), None, None)
            .unwrap();
        assert!(report.anchor_accumulated);
        assert!(report.gate.is_none());
        assert_eq!(tracker.anchor().union()[[11, 1]], 1.0);
        assert_eq!(tracker.anchor().union()[[16, 16]], 1.0);
        assert!(!tracker.target_found());
    }

    #[test]
    fn test_cleanup_keeps_best_component() {
        let mut tracker = MaskTracker::new(
            20,
            20,
            "spoon",
            None,
            TrackerSettings {
                min_component_pixels: 1,
                ..TrackerSettings::default()
            },
        );
        let genuine = Detection::new("spoon", block(20, 20, 0, 0, 4, 4), 0.9);
        let ghost = Detection::new("spoon", block(20, 20, 10, 10, 14, 14), 0.9);
        let both = Detection::new(
            "spoon",
            mask::union(&genuine.mask, &ghost.mask),
            0.9,
        );
        let distractor = Segmentation::from_instances(
            20,
            20,
            vec![Detection::new("spatula", block(20, 20, 10, 10, 14, 14), 0.5)],
        );
        // genuine region seen on all 3 frames, ghost on one frame and under a distractor
        tracker.observe_warmup(0, Some(&seg(vec![both])), Some(&distractor), None).unwrap();
        tracker.observe_warmup(1, Some(&seg(vec![genuine.clone()])), Some(&distractor), None).unwrap();
        tracker.observe_warmup(2, Some(&seg(vec![genuine])), Some(&distractor), None).unwrap();

        let report = tracker.finalize();
        assert_eq!(report.components.len(), 2);
        assert_eq!(report.kept, Some(0));
        assert!((report.components[0].mean_votes - 1.0).abs() < 1e-6);
        assert!((report.components[1].score - (1.0 / 3.0) * 0.3).abs() < 1e-5);
        assert_eq!(tracker.target().union()[[12, 12]], 0.0);
        assert_eq!(tracker.target().union()[[1, 1]], 1.0);
        assert!(tracker.target().is_frozen());
        assert!(tracker.distractor().is_frozen());
    }

    #[test]
    fn test_cleanup_skips_small_components() {
        let mut tracker = MaskTracker::new(
            20,
            20,
            "spoon",
            None,
            TrackerSettings {
                min_component_pixels: 10,
                ..TrackerSettings::default()
            },
        );
        let mut speck = block(20, 20, 0, 0, 4, 4);
        speck[[18, 18]] = 1.0;
        tracker
            .observe_warmup(0, Some(&seg(vec![Detection::new("spoon", speck, 0.9)])), None, None)
            .unwrap();
        let report = tracker.finalize();
        assert_eq!(report.kept, Some(0));
        assert_eq!(tracker.target().union()[[18, 18]], 0.0);
    }

    #[test]
    fn test_finalize_is_idempotent() {
        let mut tracker = tracker();
        let spoon = Detection::new("spoon", block(20, 20, 0, 0, 6, 6), 0.9);
        tracker.observe_warmup(0, Some(&seg(vec![spoon])), None, None).unwrap();
        let first = tracker.finalize();
        let second = tracker.finalize();
        assert_eq!(first, second);
        assert!(tracker
            .observe_warmup(1, Some(&seg(vec![])), None, None)
            .is_err());
    }

    #[test]
    fn test_safe_mask_excludes_robot() {
        let mut tracker = tracker();
        let spoon = Detection::new("spoon", block(20, 20, 0, 0, 3, 3), 0.9);
        let towel = Detection::new("towel", block(20, 20, 5, 5, 8, 8), 0.9);
        let robot = seg(vec![Detection::new("robot arm", block(20, 20, 15, 0, 20, 20), 0.9)]);
        tracker
            .observe_warmup(0, Some(&seg(vec![spoon, towel])), None, Some(&robot))
            .unwrap();
        tracker.finalize();
        let safe = tracker.safe_mask();
        assert_eq!(safe[[1, 1]], 1.0);
        assert_eq!(safe[[6, 6]], 1.0);
        assert_eq!(safe[[17, 5]], 0.0);
        assert_eq!(tracker.robot().union()[[17, 5]], 1.0);
    }

    #[test]
    fn test_dimension_mismatch_is_error() {
        let mut tracker = tracker();
        let wrong = Segmentation::empty(10, 10);
        assert!(tracker.observe_warmup(0, Some(&wrong), None, None).is_err());
        assert!(tracker.observe_robot(&wrong).is_err());
    }
}
