//! Process-wide oracle handles
//!
//! Oracle backends are expensive to set up and safe for concurrent calls,
//! so one set is installed per process and handed to every episode.
//! Episode state is never stored here.

use super::{ConceptSegmenter, FlatFillInpainter, InpaintingOracle};
use crate::error::VisionError;
use std::sync::{Arc, OnceLock};
use tracing::info;

/// Shared, read-only oracle backends
#[derive(Clone)]
pub struct SharedOracles {
    pub segmenter: Arc<dyn ConceptSegmenter>,
    pub inpainter: Arc<dyn InpaintingOracle>,
}

static GLOBAL_ORACLES: OnceLock<SharedOracles> = OnceLock::new();

impl SharedOracles {
    pub fn new(segmenter: Arc<dyn ConceptSegmenter>, inpainter: Arc<dyn InpaintingOracle>) -> Self {
        Self {
            segmenter,
            inpainter,
        }
    }

    /// Same segmenter, flat fill instead of the inpainting model
    pub fn with_flat_fill(&self) -> Self {
        Self {
            segmenter: self.segmenter.clone(),
            inpainter: Arc::new(FlatFillInpainter::new()),
        }
    }

    /// Process-wide oracles, built by `init` on first use
    pub fn global_or_init<F>(init: F) -> Result<SharedOracles, VisionError>
    where
        F: FnOnce() -> Result<SharedOracles, VisionError>,
    {
        if let Some(existing) = GLOBAL_ORACLES.get() {
            return Ok(existing.clone());
        }
        let oracles = init()?;
        // A concurrent initializer may have won; either way every caller sees the stored set
        let stored = GLOBAL_ORACLES.get_or_init(|| oracles);
        info!("Process-wide oracles initialized");
        Ok(stored.clone())
    }

    /// Previously installed process-wide oracles, if any
    pub fn global() -> Option<SharedOracles> {
        GLOBAL_ORACLES.get().cloned()
    }
}
