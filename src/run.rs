//! Whole-pipeline entry points.
//!
//! Stages run strictly in order:
//!
//! ```text
//! dispatch → refine (classify/extract passes) → text dedup → image dedup → cleanup
//! ```
//!
//! Only a missing input directory or an unusable work directory abort the
//! run. A stage that fails is logged, recorded in
//! [`PipelineSummary::stage_errors`], and the next stage still runs on
//! whatever is already staged.

use crate::config::PipelineConfig;
use crate::dedup::embed::{image_embedder_for, text_embedder_for, ImageEmbedder, TextEmbedder};
use crate::dedup::image::ImageDedup;
use crate::dedup::text::TextDedup;
use crate::dispatch::Dispatcher;
use crate::error::SiftError;
use crate::output::PipelineSummary;
use crate::pipeline::classify::{Classifier, UnavailableClassifier, VlmClassifier};
use crate::pipeline::extract::{Extractor, MineruExtractor};
use crate::pipeline::rasterize::{PageRasterizer, PdfiumRasterizer};
use crate::pipeline::refine::RefinementLoop;
use crate::progress::Stage;
use crate::staging;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};

/// The external capabilities a run depends on.
#[derive(Clone)]
pub struct Collaborators {
    pub rasterizer: Arc<dyn PageRasterizer>,
    pub classifier: Arc<dyn Classifier>,
    pub extractor: Arc<dyn Extractor>,
    pub text_embedder: Arc<dyn TextEmbedder>,
    pub image_embedder: Arc<dyn ImageEmbedder>,
}

impl Collaborators {
    /// Default collaborators for `config`.
    ///
    /// A classifier provider that cannot be resolved is not an error: every
    /// image will be treated as mixed and sent to the extractor.
    pub fn from_config(config: &PipelineConfig) -> Result<Self, SiftError> {
        let classifier: Arc<dyn Classifier> = match VlmClassifier::from_config(config) {
            Ok(c) => Arc::new(c),
            Err(e) => {
                error!("Classifier unavailable, all images will be treated as mixed: {}", e);
                Arc::new(UnavailableClassifier::new(e.to_string()))
            }
        };
        Ok(Self {
            rasterizer: Arc::new(PdfiumRasterizer::from_config(config)),
            classifier,
            extractor: Arc::new(MineruExtractor::from_config(config)),
            text_embedder: text_embedder_for(&config.text_embedding_model)?,
            image_embedder: image_embedder_for(&config.image_embedding_model)?,
        })
    }
}

/// Run the whole pipeline over `input_dir` with default collaborators.
///
/// # Errors
/// Only [`SiftError::InputNotFound`] and failures to create the work
/// directory layout. Everything else ends up in
/// [`PipelineSummary::stage_errors`].
pub async fn run_pipeline(
    input_dir: impl AsRef<Path>,
    config: &PipelineConfig,
) -> Result<PipelineSummary, SiftError> {
    let collaborators = Collaborators::from_config(config)?;
    run_with(input_dir, config, collaborators).await
}

/// Run the whole pipeline with explicit collaborators.
pub async fn run_with(
    input_dir: impl AsRef<Path>,
    config: &PipelineConfig,
    collaborators: Collaborators,
) -> Result<PipelineSummary, SiftError> {
    let start = Instant::now();
    let input_dir = input_dir.as_ref();
    if !input_dir.is_dir() {
        return Err(SiftError::InputNotFound {
            path: input_dir.to_path_buf(),
        });
    }
    let dirs = config.dirs();
    dirs.ensure()?;
    info!(
        "Starting pipeline: {} → {}",
        input_dir.display(),
        dirs.root.display()
    );

    let mut summary = PipelineSummary::default();

    // ── Step 1: Dispatch ─────────────────────────────────────────────────
    match Dispatcher::new(config, collaborators.rasterizer)
        .run(input_dir)
        .await
    {
        Ok(report) => summary.dispatch = report,
        Err(e) => absorb(&mut summary, "dispatch", e),
    }

    // ── Step 2: Refinement loop ──────────────────────────────────────────
    match RefinementLoop::new(config, collaborators.classifier, collaborators.extractor)
        .run()
        .await
    {
        Ok(report) => summary.refinement = report,
        Err(e) => absorb(&mut summary, "refine", e),
    }

    // ── Step 3: Text dedup ───────────────────────────────────────────────
    match TextDedup::new(config, collaborators.text_embedder).run() {
        Ok(s) => summary.text_dedup = s,
        Err(e) => absorb(&mut summary, "text dedup", e),
    }

    // ── Step 4: Image dedup ──────────────────────────────────────────────
    match ImageDedup::new(config, collaborators.image_embedder).run().await {
        Ok(s) => summary.image_dedup = s,
        Err(e) => absorb(&mut summary, "image dedup", e),
    }

    // ── Step 5: Cleanup ──────────────────────────────────────────────────
    if config.keep_intermediate {
        info!("Keeping intermediate directories under {}", dirs.root.display());
    } else {
        let targets = dirs.temporary();
        if let Some(ref cb) = config.progress_callback {
            cb.on_stage_start(Stage::Cleanup, targets.len());
        }
        summary.cleaned_dirs = staging::cleanup(&targets);
        if let Some(ref cb) = config.progress_callback {
            cb.on_stage_complete(Stage::Cleanup);
        }
        info!("Removed {} intermediate directories", summary.cleaned_dirs);
    }

    summary.duration_ms = start.elapsed().as_millis() as u64;
    info!(
        "Pipeline finished in {}ms with {} stage error(s)",
        summary.duration_ms,
        summary.stage_errors.len()
    );
    Ok(summary)
}

/// Synchronous wrapper around [`run_pipeline`].
///
/// Creates a temporary tokio runtime internally.
pub fn run_pipeline_sync(
    input_dir: impl AsRef<Path>,
    config: &PipelineConfig,
) -> Result<PipelineSummary, SiftError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| SiftError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(run_pipeline(input_dir, config))
}

fn absorb(summary: &mut PipelineSummary, stage: &str, err: SiftError) {
    error!("Stage '{}' failed: {}", stage, err);
    summary.stage_errors.push(format!("{stage}: {err}"));
}
