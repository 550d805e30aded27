//! # docsift
//!
//! Sift a heterogeneous document corpus (plain text, PDFs, images) into two
//! deduplicated sets: clean text and "pure" images.
//!
//! ## Pipeline Overview
//!
//! ```text
//! input/
//!  │
//!  ├─ 1. Dispatch  route by extension; PDFs rasterised via pdfium (spawn_blocking)
//!  ├─ 2. Refine    bounded passes: classify pure/mixed (VLM), extract mixed (OCR tool)
//!  ├─ 3. Text      streaming near-duplicate removal (sentence embedding cosine)
//!  ├─ 4. Images    batch near-duplicate removal (image embedding cosine, connected components)
//!  └─ 5. Cleanup   remove intermediate staging directories
//! ```
//!
//! Everything runs sequentially. Stage failures are recorded in the
//! [`PipelineSummary`] rather than aborting the run.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use docsift::{run_pipeline, PipelineConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Classifier provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / …
//!     let config = PipelineConfig::builder().work_dir("work").build()?;
//!     let summary = run_pipeline("input", &config).await?;
//!     eprintln!(
//!         "{} texts, {} images kept",
//!         summary.text_dedup.map_or(0, |s| s.kept),
//!         summary.image_dedup.map_or(0, |s| s.kept),
//!     );
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `docsift` binary (clap + indicatif + anyhow + tracing-subscriber) |
//!
//! ## Swapping collaborators
//!
//! Every external capability sits behind a trait: [`PageRasterizer`],
//! [`Classifier`], [`Extractor`], [`TextEmbedder`], [`ImageEmbedder`]. Build a
//! [`Collaborators`] by hand and call [`run_with`] to replace any of them.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod dedup;
pub mod dispatch;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod run;
pub mod staging;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{PipelineConfig, PipelineConfigBuilder, WorkDirs};
pub use dedup::cluster::{cluster_batch, Clustering, DuplicateGroup, SimilarityMatrix, StreamingDeduper};
pub use dedup::embed::{ImageEmbedder, TextEmbedder};
pub use error::SiftError;
pub use output::{DedupSummary, DispatchReport, PassReport, PipelineSummary, RefinementReport};
pub use pipeline::classify::{Classifier, Label};
pub use pipeline::extract::{Extraction, Extractor};
pub use pipeline::rasterize::PageRasterizer;
pub use progress::{NoopProgressCallback, PipelineProgressCallback, ProgressCallback, Stage};
pub use run::{run_pipeline, run_pipeline_sync, run_with, Collaborators};
