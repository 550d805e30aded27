//! The refinement loop: classify, extract, feed sub-images back.
//!
//! ```text
//!            ┌────────── pass p working set ──────────┐
//!            │                                        │
//!   classify ├─ pure  ──▶ images_pending (done)       │
//!            └─ mixed ──▶ extract ──▶ texts ──▶ text intake
//!                                  └▶ sub-images ──▶ pass p+1 working set
//!                                                    (or images_pending when p == max)
//! ```
//!
//! Passes run strictly one after another. A pass ends only after the
//! extractor has returned and the mixed originals have left the working
//! directory, so pass p+1 never sees a half-processed pass p.
//!
//! Mixed originals are deleted only after their texts and sub-images are
//! saved. If saving fails the originals go to quarantine instead.

use crate::config::{PipelineConfig, WorkDirs};
use crate::error::SiftError;
use crate::output::{PassReport, RefinementReport};
use crate::pipeline::classify::{Classifier, Label};
use crate::pipeline::extract::{Extraction, Extractor};
use crate::progress::Stage;
use crate::staging;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Drives classification and extraction over bounded passes.
pub struct RefinementLoop<'a> {
    config: &'a PipelineConfig,
    dirs: WorkDirs,
    classifier: Arc<dyn Classifier>,
    extractor: Arc<dyn Extractor>,
}

impl<'a> RefinementLoop<'a> {
    pub fn new(
        config: &'a PipelineConfig,
        classifier: Arc<dyn Classifier>,
        extractor: Arc<dyn Extractor>,
    ) -> Self {
        Self {
            config,
            dirs: config.dirs(),
            classifier,
            extractor,
        }
    }

    /// Run passes starting from the image intake directory until one of the
    /// termination conditions holds.
    pub async fn run(&self) -> Result<RefinementReport, SiftError> {
        let mut report = RefinementReport::default();
        let max_passes = self.config.max_passes;

        for pass in 1..=max_passes {
            let working_dir = self.dirs.pass_dir(pass);
            let images = staging::list_files(&working_dir)?;
            if images.is_empty() {
                info!("Pass {}: no images in {}", pass, working_dir.display());
                break;
            }

            info!("--- Pass {}/{} on {} images ---", pass, max_passes, images.len());
            let mut pass_report = PassReport {
                pass,
                classified: images.len(),
                ..Default::default()
            };

            let (pure, mixed) = self.classify_all(pass, &images, &mut pass_report).await;
            pass_report.pure = pure.len();
            pass_report.mixed = mixed.len();
            info!("Pass {} result: pure={}, mixed={}", pass, pure.len(), mixed.len());

            for img in &pure {
                staging::safe_move(img, &self.dirs.images_pending)?;
            }

            if mixed.is_empty() {
                info!("No mixed images in pass {}. Finishing.", pass);
                report.passes.push(pass_report);
                break;
            }

            let Some(extraction) = self.extract_batch(pass, &mixed, &mut pass_report).await? else {
                report.passes.push(pass_report);
                break;
            };

            let last_pass = pass == max_passes;
            let next_dir = if last_pass {
                self.dirs.images_pending.clone()
            } else {
                self.dirs.pass_dir(pass + 1)
            };
            if let Err(e) = self.save_results(pass, &extraction, &next_dir, &mut pass_report) {
                error!("Saving extraction results of pass {} failed: {}", pass, e);
                self.quarantine(&mixed);
                return Err(e);
            }
            for img in &mixed {
                remove_processed(img)?;
            }

            if extraction.sub_images.is_empty() {
                info!("Extraction produced no sub-images in pass {}. Finishing.", pass);
                report.passes.push(pass_report);
                break;
            }
            if last_pass {
                info!(
                    "Pass limit reached: moved {} sub-images straight to {}",
                    extraction.sub_images.len(),
                    next_dir.display()
                );
                report.forwarded_unclassified = extraction.sub_images.len();
            }
            report.passes.push(pass_report);
        }

        Ok(report)
    }

    /// Label every image; classifier errors degrade to `Mixed`.
    async fn classify_all(
        &self,
        pass: usize,
        images: &[PathBuf],
        pass_report: &mut PassReport,
    ) -> (Vec<PathBuf>, Vec<PathBuf>) {
        let stage = Stage::Classify(pass);
        let total = images.len();
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_stage_start(stage, total);
        }

        let mut pure = Vec::new();
        let mut mixed = Vec::new();
        for (i, img) in images.iter().enumerate() {
            let label = match self.classifier.classify(img).await {
                Ok(label) => label,
                Err(e) => {
                    warn!("{}; treating as mixed", e);
                    pass_report.classifier_failures += 1;
                    Label::Mixed
                }
            };
            debug!("{} → {}", img.display(), label);
            match label {
                Label::Pure => pure.push(img.clone()),
                Label::Mixed => mixed.push(img.clone()),
            }
            if let Some(ref cb) = self.config.progress_callback {
                cb.on_item_complete(stage, i + 1, total);
            }
        }

        if let Some(ref cb) = self.config.progress_callback {
            cb.on_stage_complete(stage);
        }
        (pure, mixed)
    }

    /// Hand copies of the mixed images to the extractor as one directory.
    /// A failed call retires the originals and yields `None`; on success the
    /// originals are left in place for the caller.
    async fn extract_batch(
        &self,
        pass: usize,
        mixed: &[PathBuf],
        pass_report: &mut PassReport,
    ) -> Result<Option<Extraction>, SiftError> {
        let stage = Stage::Extract(pass);
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_stage_start(stage, mixed.len());
        }

        let input_dir = &self.dirs.extract_input;
        let output_dir = self.dirs.extract_output(pass);
        staging::reset_dir(input_dir)?;
        staging::reset_dir(&output_dir)?;
        for img in mixed {
            staging::safe_copy(img, input_dir)?;
        }

        let result = self.extractor.extract(input_dir, &output_dir).await;

        let extraction = match result {
            Ok(extraction) => Some(extraction),
            Err(e) => {
                error!(
                    "Extraction of {} mixed images failed in pass {}: {}",
                    mixed.len(),
                    pass,
                    e
                );
                pass_report.failed_extractions = mixed.len();
                self.retire_failed(mixed)?;
                None
            }
        };

        if let Some(ref cb) = self.config.progress_callback {
            cb.on_item_complete(stage, mixed.len(), mixed.len());
            cb.on_stage_complete(stage);
        }
        Ok(extraction)
    }

    /// Quarantine or delete images whose extraction failed.
    fn retire_failed(&self, mixed: &[PathBuf]) -> Result<(), SiftError> {
        for img in mixed {
            if self.config.quarantine_failed_extractions {
                let dst = staging::safe_move(img, &self.dirs.quarantine)?;
                error!("Quarantined {} → {}", img.display(), dst.display());
            } else {
                error!("Dropping {} after failed extraction", img.display());
                remove_processed(img)?;
            }
        }
        Ok(())
    }

    /// Best-effort quarantine; failures are only logged.
    fn quarantine(&self, images: &[PathBuf]) {
        for img in images {
            match staging::safe_move(img, &self.dirs.quarantine) {
                Ok(dst) => error!("Quarantined {} → {}", img.display(), dst.display()),
                Err(e) => error!("Could not quarantine {}: {}", img.display(), e),
            }
        }
    }

    /// Persist texts, then move sub-images into `next_dir`.
    fn save_results(
        &self,
        pass: usize,
        extraction: &Extraction,
        next_dir: &Path,
        pass_report: &mut PassReport,
    ) -> Result<(), SiftError> {
        pass_report.texts = self.persist_texts(pass, extraction)?;
        for sub in &extraction.sub_images {
            staging::safe_move(sub, next_dir)?;
        }
        pass_report.sub_images = extraction.sub_images.len();
        Ok(())
    }

    /// Write each extracted text unit into the text intake pool.
    fn persist_texts(&self, pass: usize, extraction: &Extraction) -> Result<usize, SiftError> {
        if extraction.texts.is_empty() {
            return Ok(0);
        }
        info!("Saving {} extracted text snippets.", extraction.texts.len());
        for text in &extraction.texts {
            let name = format!("extracted_p{}_{}.txt", pass, text.source);
            let path = staging::write_unique(&self.dirs.text_intake, &name, &text.content)?;
            debug!("Saved extracted text to {}", path.display());
        }
        Ok(extraction.texts.len())
    }
}

fn remove_processed(img: &Path) -> Result<(), SiftError> {
    std::fs::remove_file(img).map_err(|e| SiftError::io(img, e))
}
