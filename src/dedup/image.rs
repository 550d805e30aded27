//! Image deduplication over the pending-dedup image directory.

use crate::config::{PipelineConfig, WorkDirs};
use crate::dedup::cluster::{cluster_batch, SimilarityMatrix};
use crate::dedup::embed::ImageEmbedder;
use crate::dedup::report::DedupReport;
use crate::error::SiftError;
use crate::output::DedupSummary;
use crate::progress::{ProgressCallback, Stage};
use crate::staging;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// Batch near-duplicate removal for pure images.
pub struct ImageDedup<'a> {
    config: &'a PipelineConfig,
    dirs: WorkDirs,
    embedder: Arc<dyn ImageEmbedder>,
}

impl<'a> ImageDedup<'a> {
    pub fn new(config: &'a PipelineConfig, embedder: Arc<dyn ImageEmbedder>) -> Self {
        Self {
            config,
            dirs: config.dirs(),
            embedder,
        }
    }

    /// Returns `Ok(None)` when there were no candidate images.
    pub async fn run(&self) -> Result<Option<DedupSummary>, SiftError> {
        info!("Starting image deduplication...");
        let files = staging::list_files(&self.dirs.images_pending)?;
        if files.is_empty() {
            warn!(
                "No image files found to deduplicate in {}.",
                self.dirs.images_pending.display()
            );
            return Ok(None);
        }

        let total = files.len();
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_stage_start(Stage::ImageDedup, total);
        }

        info!("Computing embeddings for {} images...", total);
        let embedded = embed_all(
            Arc::clone(&self.embedder),
            files.clone(),
            self.config.progress_callback.clone(),
        )
        .await?;
        let skipped = embedded.iter().filter(|e| e.vector.is_none()).count();

        info!(
            "Grouping duplicates with threshold {:.2}...",
            self.config.image_similarity_threshold
        );
        let vectors: Vec<_> = embedded.iter().map(|e| e.vector.clone()).collect();
        let mut matrix = SimilarityMatrix::cosine(&vectors);
        for (first, copy) in identical_pairs(&embedded) {
            matrix.set(first, copy, IDENTICAL);
        }
        let clustering = cluster_batch(&matrix, self.config.image_similarity_threshold);

        let mut report = DedupReport::new();
        for (dup, canonical) in clustering.duplicate_pairs() {
            report.push(&files[dup], &files[canonical]);
        }
        let kept = clustering.kept();
        info!(
            "Found {} duplicates. Kept: {}, Removed: {}",
            report.len(),
            kept.len(),
            report.len()
        );

        for &i in &kept {
            staging::safe_copy(&files[i], &self.dirs.images_final)?;
        }
        info!(
            "Copied {} unique images to {}",
            kept.len(),
            self.dirs.images_final.display()
        );

        let report_path = report.write(&self.dirs.image_report)?;
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_stage_complete(Stage::ImageDedup);
        }

        Ok(Some(DedupSummary {
            total,
            kept: kept.len(),
            duplicates: report.len(),
            skipped,
            report_path,
        }))
    }
}

/// Score given to byte-identical files, whatever their embeddings say.
const IDENTICAL: f32 = 1.0;

struct Embedded {
    /// `None` when the model could not embed the file.
    vector: Option<Vec<f32>>,
    /// SHA-256 of the file bytes; `None` when unreadable.
    digest: Option<[u8; 32]>,
}

/// Embed and hash every file on the blocking pool. A model that cannot be
/// loaded fails the whole batch; any other per-file error leaves that file
/// without a vector.
async fn embed_all(
    embedder: Arc<dyn ImageEmbedder>,
    files: Vec<PathBuf>,
    progress: Option<ProgressCallback>,
) -> Result<Vec<Embedded>, SiftError> {
    tokio::task::spawn_blocking(move || {
        let total = files.len();
        let mut out = Vec::with_capacity(total);
        for (i, path) in files.iter().enumerate() {
            let vector = match embedder.embed(path) {
                Ok(v) => Some(v),
                Err(e @ SiftError::EmbeddingModelUnavailable { .. }) => return Err(e),
                Err(e) => {
                    warn!("{} (kept as unique)", e);
                    None
                }
            };
            let digest = match content_digest(path) {
                Ok(d) => Some(d),
                Err(e) => {
                    warn!("{}", e);
                    None
                }
            };
            out.push(Embedded { vector, digest });
            if let Some(ref cb) = progress {
                cb.on_item_complete(Stage::ImageDedup, i + 1, total);
            }
        }
        Ok(out)
    })
    .await
    .map_err(|e| SiftError::Internal(format!("Embedding task panicked: {}", e)))?
}

fn content_digest(path: &Path) -> Result<[u8; 32], SiftError> {
    let mut file = File::open(path).map_err(|e| SiftError::io(path, e))?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher).map_err(|e| SiftError::io(path, e))?;
    Ok(hasher.finalize().into())
}

/// `(first, copy)` for every file whose bytes match an earlier file.
fn identical_pairs(embedded: &[Embedded]) -> Vec<(usize, usize)> {
    let mut first_seen: HashMap<[u8; 32], usize> = HashMap::new();
    let mut pairs = Vec::new();
    for (i, e) in embedded.iter().enumerate() {
        if let Some(digest) = e.digest {
            match first_seen.get(&digest) {
                Some(&first) => pairs.push((first, i)),
                None => {
                    first_seen.insert(digest, i);
                }
            }
        }
    }
    pairs
}
