// declutter command line interface
// Instruction parsing, config checks and offline replay of recorded frames

mod replay;

use anyhow::Context;
use clap::{Parser, Subcommand};
use declutter_vision::models::{FlatFillInpainter, RemoteInpainter, RemoteSegmenter};
use declutter_vision::{
    build_concept_prompt, DistillConfig, InstructionParser, PipelineController, SharedOracles,
};
use replay::FrameDirEnv;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "declutter")]
#[command(about = "Remove distractor objects from robot camera frames", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long, short, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the target, anchor and segmentation prompt for an instruction
    Parse {
        /// Task instruction, e.g. "put the spoon on the towel"
        instruction: String,

        /// Leave the robot concepts out of the prompt
        #[arg(long)]
        no_robot: bool,
    },

    /// Load and validate a configuration file
    CheckConfig {
        /// TOML configuration file
        path: PathBuf,
    },

    /// Replay a directory of PNG frames through the pipeline
    Run {
        /// Directory of input frames, processed in file-name order
        frames: PathBuf,

        /// Task instruction
        #[arg(long, short)]
        instruction: String,

        /// Output directory for distilled frames
        #[arg(long, short, default_value = "./distilled")]
        output: PathBuf,

        /// TOML configuration file
        #[arg(long, short)]
        config: Option<PathBuf>,

        /// Segmentation service endpoint
        #[arg(long, default_value = "http://localhost:8000/segment")]
        segmenter_url: String,

        /// Inpainting service endpoint
        #[arg(long, default_value = "http://localhost:8001/inpaint")]
        inpainter_url: String,

        /// Use a flat fill instead of the inpainting service
        #[arg(long)]
        flat_fill: bool,

        /// Write per-stage masks and timings here
        #[arg(long)]
        debug_dir: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    match cli.command {
        Commands::Parse {
            instruction,
            no_robot,
        } => {
            parse_instruction(&instruction, !no_robot);
        }
        Commands::CheckConfig { path } => {
            check_config(&path)?;
        }
        Commands::Run {
            frames,
            instruction,
            output,
            config,
            segmenter_url,
            inpainter_url,
            flat_fill,
            debug_dir,
        } => {
            run(
                &frames,
                &instruction,
                &output,
                config.as_deref(),
                &segmenter_url,
                &inpainter_url,
                flat_fill,
                debug_dir.as_deref(),
            )
            .await?;
        }
    }

    Ok(())
}

fn parse_instruction(instruction: &str, include_robot: bool) {
    let parsed = InstructionParser::new().parse(instruction);
    println!("target: {}", parsed.target);
    println!("anchor: {}", parsed.anchor.as_deref().unwrap_or("-"));
    println!(
        "prompt: {}",
        build_concept_prompt(&parsed.target, parsed.anchor.as_deref(), include_robot)
    );
}

fn check_config(path: &Path) -> anyhow::Result<()> {
    let config = DistillConfig::load(path)
        .with_context(|| format!("Invalid configuration {}", path.display()))?;
    println!("{} is valid", path.display());
    println!(
        "warmup: {} frames (+{} deferred), sigma {}, dilation {}/{} px, refresh every {}",
        config.warmup_frame_count,
        config.deferred_detection_frame_count,
        config.blend_sigma,
        config.distractor_dilation_px,
        config.effective_safe_dilation(),
        config.cache_refresh_interval
    );
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn run(
    frames: &Path,
    instruction: &str,
    output: &Path,
    config_path: Option<&Path>,
    segmenter_url: &str,
    inpainter_url: &str,
    flat_fill: bool,
    debug_dir: Option<&Path>,
) -> anyhow::Result<()> {
    let mut config = match config_path {
        Some(path) => DistillConfig::load(path)
            .with_context(|| format!("Invalid configuration {}", path.display()))?,
        None => DistillConfig::default(),
    };
    if flat_fill {
        config.disable_inpaint = true;
    }
    if debug_dir.is_some() {
        config.debug = true;
    }

    let oracles = SharedOracles::global_or_init(|| {
        let segmenter = RemoteSegmenter::new(segmenter_url)?;
        if flat_fill {
            Ok(SharedOracles::new(Arc::new(segmenter), Arc::new(FlatFillInpainter::new())))
        } else {
            Ok(SharedOracles::new(
                Arc::new(segmenter),
                Arc::new(RemoteInpainter::new(inpainter_url)?),
            ))
        }
    })?;

    let env = FrameDirEnv::open(frames, instruction)?;
    info!("Replaying {} frames from {}", env.frame_count(), frames.display());
    std::fs::create_dir_all(output)
        .with_context(|| format!("Cannot create {}", output.display()))?;

    let mut controller = PipelineController::new(env, config, oracles)?;
    let reset = controller.reset().await?;
    let mut written = 0usize;
    save_frame(output, written, &reset.observation.image)?;
    if let (Some(dir), Some(debug)) = (debug_dir, reset.debug.as_ref()) {
        debug.write_to(dir, &format!("frame_{:05}", written))?;
    }
    written += 1;
    let mut done = reset.terminated || reset.truncated;
    if done {
        info!("Replay ended during warmup");
    }

    while !done {
        let step = controller.step(()).await?;
        save_frame(output, written, &step.observation.image)?;
        if let (Some(dir), Some(debug)) = (debug_dir, step.debug.as_ref()) {
            debug.write_to(dir, &format!("frame_{:05}", written))?;
        }
        written += 1;
        done = step.terminated || step.truncated;
    }

    let warmup = controller.state().map_or(0, |s| s.warmup_frames());
    info!(
        "Wrote {} distilled frames to {} ({} warmup frames consumed, budget extended by {})",
        written,
        output.display(),
        warmup,
        controller.env().budget_extension()
    );
    Ok(())
}

fn save_frame(output: &Path, index: usize, image: &image::RgbImage) -> anyhow::Result<()> {
    let path = output.join(format!("frame_{:05}.png", index));
    image
        .save(&path)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}
