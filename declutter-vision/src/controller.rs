//! Pipeline controller: warmup, freeze, steady-state distillation
//!
//! `reset()` drives the environment through the warmup window with neutral
//! actions while masks accumulate, then freezes them, requests the clean
//! plate once and returns the first distilled frame. `step()` forwards the
//! policy's action and returns distilled frames from then on.

use crate::config::DistillConfig;
use crate::environment::{Environment, Observation};
use crate::error::{Result, VisionError};
use crate::instruction::{InstructionParser, ParsedInstruction};
use crate::mask;
use crate::models::SharedOracles;
use crate::processing::{
    ComposedMasks, CleanPlateManager, Compositor, CompositorSettings, DilationRadii, MaskComposer,
    MaskTracker, SegmentationPipeline, TrackerSettings,
};
use crate::telemetry::{millis, DebugFrame, StageTimings};
use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Controller phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    ResetPending,
    Warmup,
    Steady,
}

/// Episode-scoped state; discarded on every reset
pub struct PipelineState {
    episode_id: Uuid,
    phase: Phase,
    instruction: ParsedInstruction,
    segmentation: SegmentationPipeline,
    tracker: MaskTracker,
    composed: Option<ComposedMasks>,
    compositor: Option<Compositor>,
    plate: CleanPlateManager,
    frame_index: u32,
    warmup_frames: u32,
    steady_index: u32,
    passthrough: bool,
    aborted: bool,
    terminated: bool,
    truncated: bool,
}

impl PipelineState {
    pub fn episode_id(&self) -> Uuid {
        self.episode_id
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn instruction(&self) -> &ParsedInstruction {
        &self.instruction
    }

    pub fn tracker(&self) -> &MaskTracker {
        &self.tracker
    }

    /// Frozen inpaint and compositing masks, once steady
    pub fn composed(&self) -> Option<&ComposedMasks> {
        self.composed.as_ref()
    }

    pub fn plate(&self) -> Option<&RgbImage> {
        self.plate.plate()
    }

    /// Inpainting oracle calls this episode
    pub fn plate_requests(&self) -> u32 {
        self.plate.request_count()
    }

    /// Frames seen this episode, warmup included
    pub fn frame_index(&self) -> u32 {
        self.frame_index
    }

    pub fn warmup_frames(&self) -> u32 {
        self.warmup_frames
    }

    /// Steady frames returned to the policy, numbered from 1
    pub fn steady_index(&self) -> u32 {
        self.steady_index
    }

    /// Frames are returned unmodified because the target was never found
    pub fn is_passthrough(&self) -> bool {
        self.passthrough
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted
    }

    /// The environment reported termination or truncation
    pub fn is_ended(&self) -> bool {
        self.terminated || self.truncated
    }
}

/// First distilled observation of an episode
#[derive(Debug, Clone)]
pub struct DistilledReset {
    pub observation: Observation,
    /// Set when the episode already ended during warmup
    pub terminated: bool,
    pub truncated: bool,
    pub debug: Option<DebugFrame>,
}

/// Distilled result of one policy step
#[derive(Debug, Clone)]
pub struct DistilledStep {
    pub observation: Observation,
    pub reward: f64,
    pub terminated: bool,
    pub truncated: bool,
    pub debug: Option<DebugFrame>,
}

/// Distractor-removal wrapper around an environment
pub struct PipelineController<E: Environment> {
    env: E,
    config: DistillConfig,
    oracles: SharedOracles,
    parser: InstructionParser,
    state: Option<PipelineState>,
    reset_failed: bool,
}

impl<E: Environment> PipelineController<E> {
    /// Create a new controller; fails fast on invalid configuration
    pub fn new(env: E, config: DistillConfig, oracles: SharedOracles) -> Result<Self> {
        config.validate()?;
        let oracles = if config.disable_inpaint {
            info!("Inpainting disabled, using flat fill");
            oracles.with_flat_fill()
        } else {
            oracles
        };
        Ok(Self {
            env,
            config,
            oracles,
            parser: InstructionParser::new(),
            state: None,
            reset_failed: false,
        })
    }

    pub fn config(&self) -> &DistillConfig {
        &self.config
    }

    /// Current episode state, if an episode was started
    pub fn state(&self) -> Option<&PipelineState> {
        self.state.as_ref()
    }

    pub fn phase(&self) -> Phase {
        self.state.as_ref().map_or(Phase::ResetPending, |s| s.phase)
    }

    pub fn env(&self) -> &E {
        &self.env
    }

    pub fn env_mut(&mut self) -> &mut E {
        &mut self.env
    }

    pub fn into_inner(self) -> E {
        self.env
    }

    /// Start a new episode. Warmup frames are consumed here and never returned.
    pub async fn reset(&mut self) -> Result<DistilledReset> {
        self.state = None;
        let result = self.reset_inner().await;
        self.reset_failed = result.is_err();
        if let Err(e) = &result {
            warn!("Reset failed: {}", e);
            if let Some(state) = self.state.as_mut() {
                state.aborted = true;
            }
        }
        result
    }

    async fn reset_inner(&mut self) -> Result<DistilledReset> {
        let first = self.env.reset().await?;
        let instruction = self.parser.parse(&self.env.instruction());
        let (width, height) = first.image.dimensions();
        let episode_id = Uuid::new_v4();
        info!(
            "Episode {} started: target={:?} anchor={:?} ({}x{})",
            episode_id, instruction.target, instruction.anchor, width, height
        );

        let state = self.state.insert(PipelineState {
            episode_id,
            phase: Phase::Warmup,
            segmentation: SegmentationPipeline::new(self.oracles.segmenter.clone(), &instruction, &self.config),
            tracker: MaskTracker::new(
                height as usize,
                width as usize,
                instruction.target.clone(),
                instruction.anchor.clone(),
                TrackerSettings::from(&self.config),
            ),
            instruction,
            composed: None,
            compositor: None,
            plate: CleanPlateManager::new(self.oracles.inpainter.clone(), self.config.cache_refresh_interval),
            frame_index: 0,
            warmup_frames: 0,
            steady_index: 0,
            passthrough: false,
            aborted: false,
            terminated: false,
            truncated: false,
        });

        let mut observation = first;
        let mut timings = StageTimings::default();
        let mut neutral_steps = 0u32;
        let mut deferred = false;
        loop {
            let frame = state.segmentation.segment_all(&observation.image).await?;
            timings.segmentation_ms += millis(frame.elapsed);
            let report = state.tracker.observe_warmup(
                state.warmup_frames,
                frame.safe.as_ref(),
                frame.distractor.as_ref(),
                frame.robot.as_ref(),
            )?;
            debug!("Warmup frame {}: gate {:?}", report.frame_index, report.gate);
            state.warmup_frames += 1;
            state.frame_index += 1;

            if state.is_ended() {
                break;
            }
            if state.warmup_frames == self.config.warmup_frame_count
                && !self.config.disable_safeset
                && !state.tracker.target_found()
                && self.config.deferred_detection_frame_count > 0
            {
                deferred = true;
                info!(
                    "Target {:?} not found after {} frames, extending detection by {}",
                    state.instruction.target,
                    state.warmup_frames,
                    self.config.deferred_detection_frame_count
                );
            }
            let limit = if deferred {
                self.config.max_warmup_frames()
            } else {
                self.config.warmup_frame_count
            };
            if state.warmup_frames >= limit {
                break;
            }

            let action = self.env.neutral_action();
            let step = self.env.step(action).await?;
            neutral_steps += 1;
            if step.is_done() {
                warn!(
                    "Episode {} ended during warmup after {} frames",
                    state.episode_id,
                    state.warmup_frames + 1
                );
                state.terminated = step.terminated;
                state.truncated = step.truncated;
            }
            observation = step.observation;
        }
        self.env.extend_step_budget(neutral_steps);

        let cleanup = state.tracker.finalize();
        let target_found = state.tracker.target_found();
        if !target_found && !self.config.disable_safeset {
            warn!(
                "Target {:?} never detected in {} frames; masking distractors only",
                state.instruction.target, state.warmup_frames
            );
        }
        debug!("Target cleanup: {:?}", cleanup);

        state.passthrough = !target_found && !self.config.disable_safeset && self.config.passthrough_on_missing_target;
        if state.passthrough {
            info!("Episode {} in pass-through mode", state.episode_id);
            state.phase = Phase::Steady;
            return Ok(DistilledReset {
                observation,
                terminated: state.terminated,
                truncated: state.truncated,
                debug: None,
            });
        }

        let composition_started = Instant::now();
        let safe = state.tracker.safe_mask();
        let composed = MaskComposer::compute(
            &safe,
            state.tracker.distractor().union(),
            DilationRadii {
                distractor: self.config.distractor_dilation_px,
                safe: self.config.safe_dilation_px,
            },
        );
        let compositor = Compositor::new(&composed, &safe, CompositorSettings::from(&self.config));
        timings.composition_ms = millis(composition_started.elapsed());

        let reinforcement_radius = self.config.reinforcement_radius();
        state
            .plate
            .request(
                &observation.image,
                &composed.inpaint_mask,
                state.tracker.robot().union(),
                reinforcement_radius,
            )
            .await?;
        timings.inpaint_ms = state.plate.last_latency().map_or(0.0, millis);

        info!(
            "Episode {} steady after {} warmup frames ({} px inpainted, {} px composited)",
            state.episode_id,
            state.warmup_frames,
            mask::count(&composed.inpaint_mask),
            mask::count(&composed.compositing_mask)
        );
        state.composed = Some(composed);
        state.compositor = Some(compositor);
        state.phase = Phase::Steady;

        let (image, debug) = render(state, &observation.image, timings, self.config.debug)?;
        Ok(DistilledReset {
            observation: Observation::with_info(image, observation.info),
            terminated: state.terminated,
            truncated: state.truncated,
            debug,
        })
    }

    /// Forward one policy action and distill the resulting frame
    pub async fn step(&mut self, action: E::Action) -> Result<DistilledStep> {
        match self.state.as_ref() {
            None if self.reset_failed => return Err(VisionError::EpisodeAborted),
            None => {
                return Err(VisionError::Processing(
                    "step() called before reset()".to_string(),
                ))
            }
            Some(state) if state.aborted => return Err(VisionError::EpisodeAborted),
            Some(state) if state.is_ended() => return Err(VisionError::EpisodeEnded),
            Some(state) if state.phase != Phase::Steady => {
                return Err(VisionError::Processing(format!(
                    "step() called in phase {:?}",
                    state.phase
                )))
            }
            Some(_) => {}
        }

        let result = self.step_inner(action).await;
        if let Err(e) = &result {
            if let Some(state) = self.state.as_mut() {
                warn!("Episode {} aborted: {}", state.episode_id, e);
                state.aborted = true;
            }
        }
        result
    }

    async fn step_inner(&mut self, action: E::Action) -> Result<DistilledStep> {
        let state = self
            .state
            .as_mut()
            .ok_or_else(|| VisionError::Processing("No active episode".to_string()))?;

        let step = self.env.step(action).await?;
        state.frame_index += 1;
        state.steady_index += 1;
        state.terminated = step.terminated;
        state.truncated = step.truncated;

        if state.passthrough {
            return Ok(DistilledStep {
                observation: step.observation,
                reward: step.reward,
                terminated: step.terminated,
                truncated: step.truncated,
                debug: None,
            });
        }

        let mut timings = StageTimings::default();
        let frame = state.segmentation.segment_robot(&step.observation.image).await?;
        timings.segmentation_ms = millis(frame.elapsed);
        if let Some(robot) = &frame.robot {
            state.tracker.observe_robot(robot)?;
        }

        if state.plate.due_for_refresh(state.steady_index) {
            let composed = state
                .composed
                .as_ref()
                .ok_or_else(|| VisionError::Processing("Steady phase without masks".to_string()))?;
            let robot = mask::union(state.tracker.robot().union(), state.tracker.live_robot());
            info!(
                "Episode {}: refreshing clean plate at steady frame {}",
                state.episode_id, state.steady_index
            );
            state
                .plate
                .request(
                    &step.observation.image,
                    &composed.inpaint_mask,
                    &robot,
                    self.config.reinforcement_radius(),
                )
                .await?;
            timings.inpaint_ms = state.plate.last_latency().map_or(0.0, millis);
        }

        let (image, debug) = render(state, &step.observation.image, timings, self.config.debug)?;
        Ok(DistilledStep {
            observation: Observation::with_info(image, step.observation.info),
            reward: step.reward,
            terminated: step.terminated,
            truncated: step.truncated,
            debug,
        })
    }
}

/// Composite `live` with the cached plate and the current robot mask
fn render(
    state: &PipelineState,
    live: &RgbImage,
    mut timings: StageTimings,
    with_debug: bool,
) -> Result<(RgbImage, Option<DebugFrame>)> {
    let missing = || VisionError::Processing("Compositing before masks were frozen".to_string());
    let compositor = state.compositor.as_ref().ok_or_else(missing)?;
    let composed = state.composed.as_ref().ok_or_else(missing)?;
    let plate = state
        .plate
        .plate()
        .ok_or_else(|| VisionError::Processing("No clean plate cached".to_string()))?;

    let started = Instant::now();
    let frame = compositor.composite(live, plate, state.tracker.live_robot())?;
    timings.composite_ms = millis(started.elapsed());

    let debug = with_debug.then(|| DebugFrame {
        frame_index: state.frame_index,
        alpha: frame.alpha.clone(),
        compositing_mask: composed.compositing_mask.clone(),
        inpaint_mask: composed.inpaint_mask.clone(),
        dilated_safe: composed.dilated_safe.clone(),
        live_robot: state.tracker.live_robot().clone(),
        timings,
    });
    Ok((frame.image, debug))
}
