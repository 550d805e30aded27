//! Result types returned by each stage and by the whole pipeline.
//!
//! Every type here is `Serialize` so the CLI can print a run as JSON
//! (`docsift --json`) and callers can diff two runs.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// What the dispatcher did with the input tree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchReport {
    /// `.txt` files copied to the text intake.
    pub texts: usize,
    /// Image files copied to the image intake.
    pub images: usize,
    /// PDFs handed to the rasterizer.
    pub pdfs: usize,
    /// Page images written by the rasterizer.
    pub pages_rendered: usize,
    /// Files skipped for an unsupported extension.
    pub skipped: Vec<PathBuf>,
    /// Files whose copy or rasterisation failed.
    pub failed: Vec<PathBuf>,
}

/// Counters for one classify/extract pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassReport {
    /// 1-indexed pass number.
    pub pass: usize,
    pub classified: usize,
    pub pure: usize,
    pub mixed: usize,
    /// Classifier errors that were degraded to `mixed`.
    pub classifier_failures: usize,
    /// Text snippets written to the text intake.
    pub texts: usize,
    pub sub_images: usize,
    /// Mixed images dropped because the extractor failed.
    pub failed_extractions: usize,
}

/// Outcome of the whole refinement loop.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefinementReport {
    pub passes: Vec<PassReport>,
    /// Sub-images of the last permitted pass forwarded without classification.
    pub forwarded_unclassified: usize,
}

impl RefinementReport {
    pub fn total_texts(&self) -> usize {
        self.passes.iter().map(|p| p.texts).sum()
    }

    pub fn total_pure(&self) -> usize {
        self.passes.iter().map(|p| p.pure).sum()
    }
}

/// Outcome of one deduplication stage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DedupSummary {
    /// Items loaded and clustered.
    pub total: usize,
    pub kept: usize,
    pub duplicates: usize,
    /// Files that could not be loaded (e.g. undecodable text).
    pub skipped: usize,
    /// Duplicate report, if any duplicates were found.
    pub report_path: Option<PathBuf>,
}

/// Everything a run did, stage by stage.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineSummary {
    pub dispatch: DispatchReport,
    pub refinement: RefinementReport,
    /// `None` when the stage had nothing to do.
    pub text_dedup: Option<DedupSummary>,
    /// `None` when the stage had nothing to do.
    pub image_dedup: Option<DedupSummary>,
    /// Errors absorbed at stage boundaries, formatted as `stage: message`.
    pub stage_errors: Vec<String>,
    /// Intermediate directories removed by cleanup.
    pub cleaned_dirs: usize,
    pub duration_ms: u64,
}

impl PipelineSummary {
    /// True when no stage had to absorb an error.
    pub fn is_clean(&self) -> bool {
        self.stage_errors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refinement_totals() {
        let report = RefinementReport {
            passes: vec![
                PassReport {
                    pass: 1,
                    pure: 2,
                    texts: 3,
                    ..Default::default()
                },
                PassReport {
                    pass: 2,
                    pure: 1,
                    texts: 1,
                    ..Default::default()
                },
            ],
            forwarded_unclassified: 0,
        };
        assert_eq!(report.total_texts(), 4);
        assert_eq!(report.total_pure(), 3);
    }

    #[test]
    fn summary_serialises() {
        let summary = PipelineSummary {
            stage_errors: vec!["text dedup: boom".into()],
            ..Default::default()
        };
        let json = serde_json::to_string(&summary).unwrap();
        assert!(json.contains("\"stage_errors\":[\"text dedup: boom\"]"));
        assert!(!summary.is_clean());
    }
}
