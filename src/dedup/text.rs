//! Text deduplication over the text intake directory.

use crate::config::{PipelineConfig, WorkDirs};
use crate::dedup::cluster::{Decision, ExactCosineIndex, StreamingDeduper};
use crate::dedup::embed::TextEmbedder;
use crate::dedup::report::DedupReport;
use crate::error::SiftError;
use crate::output::DedupSummary;
use crate::progress::Stage;
use crate::staging;
use encoding_rs::Encoding;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Decode `bytes` with the first encoding that accepts them without
/// replacement characters. A leading UTF-8 BOM is stripped first.
pub fn decode_text(bytes: &[u8], encodings: &[&'static Encoding]) -> Option<String> {
    let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    encodings.iter().find_map(|enc| {
        enc.decode_without_bom_handling_and_without_replacement(bytes)
            .map(|text| text.into_owned())
    })
}

/// Resolve encoding labels; unknown labels are dropped (config validation
/// already rejects them).
pub fn resolve_encodings(labels: &[String]) -> Vec<&'static Encoding> {
    labels
        .iter()
        .filter_map(|l| Encoding::for_label(l.as_bytes()))
        .collect()
}

/// Streaming near-duplicate removal for extracted and input text.
pub struct TextDedup<'a> {
    config: &'a PipelineConfig,
    dirs: WorkDirs,
    embedder: Arc<dyn TextEmbedder>,
}

impl<'a> TextDedup<'a> {
    pub fn new(config: &'a PipelineConfig, embedder: Arc<dyn TextEmbedder>) -> Self {
        Self {
            config,
            dirs: config.dirs(),
            embedder,
        }
    }

    /// Returns `Ok(None)` when there was nothing to deduplicate.
    pub fn run(&self) -> Result<Option<DedupSummary>, SiftError> {
        info!("Starting text deduplication...");
        let files = staging::list_files_with_extension(&self.dirs.text_intake, "txt")?;
        if files.is_empty() {
            warn!("No text files found to deduplicate.");
            return Ok(None);
        }

        let records = self.load(&files);
        let skipped = files.len() - records.len();
        if records.is_empty() {
            error!("No text files could be read. Skipping text deduplication.");
            return Ok(None);
        }

        let total = records.len();
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_stage_start(Stage::TextDedup, total);
        }

        let mut deduper = StreamingDeduper::new(
            ExactCosineIndex::new(),
            self.config.text_similarity_threshold,
        );
        let mut report = DedupReport::new();
        let mut kept = Vec::new();
        // Record index of each item offered to the deduper.
        let mut offered = Vec::with_capacity(total);
        for (i, (path, text)) in records.iter().enumerate() {
            let embedding = match self.embedder.embed(text) {
                Ok(v) => v,
                Err(e @ SiftError::EmbeddingModelUnavailable { .. }) => return Err(e),
                Err(e) => {
                    warn!("{}: {} (kept as unique)", path.display(), e);
                    kept.push(path);
                    continue;
                }
            };
            offered.push(i);
            match deduper.push(embedding) {
                Decision::Kept { .. } => kept.push(path),
                Decision::Duplicate { of, .. } => {
                    let source = &records[offered[of]].0;
                    debug!("{} duplicates {}", path.display(), source.display());
                    report.push(path, source);
                }
            }
            if let Some(ref cb) = self.config.progress_callback {
                cb.on_item_complete(Stage::TextDedup, i + 1, total);
            }
        }

        info!(
            "Total: {}, Kept: {}, Duplicates: {}",
            total,
            kept.len(),
            report.len()
        );
        for path in &kept {
            staging::safe_copy(path, &self.dirs.text_final)?;
        }
        info!("Copied {} unique files to {}", kept.len(), self.dirs.text_final.display());

        let report_path = report.write(&self.dirs.text_report)?;
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_stage_complete(Stage::TextDedup);
        }

        Ok(Some(DedupSummary {
            total,
            kept: kept.len(),
            duplicates: report.len(),
            skipped,
            report_path,
        }))
    }

    fn load(&self, files: &[PathBuf]) -> Vec<(PathBuf, String)> {
        let encodings = resolve_encodings(&self.config.text_encodings);
        files
            .iter()
            .filter_map(|p| match read_text(p, &encodings) {
                Ok(Some(text)) => Some((p.clone(), text)),
                Ok(None) => {
                    warn!("Encoding issue, skipping: {}", p.display());
                    None
                }
                Err(e) => {
                    warn!("{}", e);
                    None
                }
            })
            .collect()
    }
}

fn read_text(path: &Path, encodings: &[&'static Encoding]) -> Result<Option<String>, SiftError> {
    let bytes = fs::read(path).map_err(|e| SiftError::io(path, e))?;
    Ok(decode_text(&bytes, encodings))
}
