//! Error types for the docsift library.
//!
//! [`SiftError`] is the single error type returned by every fallible library
//! operation. Most variants are *absorbed* by the stage that sees them: the
//! refinement loop turns a classifier error into a `Mixed` label, an
//! extractor error into an empty batch, and the pipeline driver turns a
//! failed stage into an entry in [`crate::output::PipelineSummary::stage_errors`].
//!
//! Only two conditions stop [`crate::run::run_pipeline`] before any stage
//! runs: a missing input directory and a work directory that cannot be
//! created.

use std::path::PathBuf;
use thiserror::Error;

/// All errors returned by the docsift library.
#[derive(Debug, Error)]
pub enum SiftError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// The input root does not exist or is not a directory.
    #[error("Input directory not found: '{path}'\nCheck the path exists and is a directory.")]
    InputNotFound { path: PathBuf },

    /// Filesystem operation on a staged file failed.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\
Install libpdfium or set PDFIUM_LIB_PATH=/path/to/libpdfium."
    )]
    PdfiumBindingFailed(String),

    /// PDF header/trailer/xref is corrupt, or the password is wrong.
    #[error("PDF '{path}' could not be opened: {detail}")]
    CorruptPdf { path: PathBuf, detail: String },

    /// pdfium-render returned an error for a specific page.
    #[error("Rasterisation failed for '{path}' page {page}: {detail}")]
    RasterisationFailed {
        path: PathBuf,
        page: usize,
        detail: String,
    },

    // ── Classifier errors ─────────────────────────────────────────────────
    /// The configured vision provider is not initialised (missing API key etc.).
    #[error("Vision provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// The classifier could not produce a label for an image.
    #[error("Classification failed for '{path}': {detail}")]
    ClassifierFailed { path: PathBuf, detail: String },

    /// An image file could not be decoded.
    #[error("Cannot decode image '{path}': {detail}")]
    ImageDecodeFailed { path: PathBuf, detail: String },

    // ── Embedding errors ──────────────────────────────────────────────────
    /// The embedding model could not be loaded (download or ONNX init).
    /// Fails the whole dedup stage.
    #[error("Embedding model '{model}' could not be loaded: {detail}")]
    EmbeddingModelUnavailable { model: String, detail: String },

    /// The model loaded but rejected one input.
    #[error("Embedding failed for '{item}': {detail}")]
    EmbeddingFailed { item: String, detail: String },

    // ── Extractor errors ──────────────────────────────────────────────────
    /// The extraction tool binary could not be found.
    #[error("Extraction tool '{bin}' not found. Is it installed and in PATH?")]
    ExtractorNotFound { bin: String },

    /// The extraction tool exited unsuccessfully.
    #[error("Extraction tool '{bin}' failed with exit code {code:?}: {stderr}")]
    ExtractorFailed {
        bin: String,
        code: Option<i32>,
        stderr: String,
    },

    // ── Output errors ─────────────────────────────────────────────────────
    /// Could not write a duplicate report.
    #[error("Failed to write report '{path}': {source}")]
    ReportWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SiftError {
    /// Shorthand for wrapping an [`std::io::Error`] with the path it concerns.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SiftError::Io {
            path: path.into(),
            source,
        }
    }
}
