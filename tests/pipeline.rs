//! Whole-pipeline tests with in-process fake collaborators.
//!
//! No pdfium, vision model or OCR tool is needed: every capability is
//! replaced by a fake that decides by file name.

use async_trait::async_trait;
use docsift::pipeline::extract::ExtractedText;
use docsift::{
    run_with, Classifier, Collaborators, Extraction, Extractor, ImageEmbedder, Label,
    PageRasterizer, PipelineConfig, PipelineProgressCallback, SiftError, Stage, TextEmbedder,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

// ── Fakes ────────────────────────────────────────────────────────────────────

/// Two blank pages per PDF.
struct TwoPageRasterizer;

impl PageRasterizer for TwoPageRasterizer {
    fn rasterize(&self, pdf: &Path, out_dir: &Path) -> Result<Vec<PathBuf>, SiftError> {
        let stem = pdf.file_stem().unwrap().to_string_lossy().into_owned();
        (1..=2)
            .map(|n| -> Result<PathBuf, SiftError> {
                let p = out_dir.join(format!("{stem}_p{n}.png"));
                fs::write(&p, b"page").map_err(|e| SiftError::io(&p, e))?;
                Ok(p)
            })
            .collect()
    }
}

/// `mixed*` → Mixed, `boom*` → error, anything else → Pure.
struct NameClassifier;

#[async_trait]
impl Classifier for NameClassifier {
    async fn classify(&self, image: &Path) -> Result<Label, SiftError> {
        let name = image.file_name().unwrap().to_string_lossy();
        if name.starts_with("mixed") {
            Ok(Label::Mixed)
        } else if name.starts_with("boom") {
            Err(SiftError::ClassifierFailed {
                path: image.to_path_buf(),
                detail: "timeout".into(),
            })
        } else {
            Ok(Label::Pure)
        }
    }
}

/// One text per image; `mixed_deck_p1` also yields the sub-image `sub_a.png`.
struct DeckExtractor;

#[async_trait]
impl Extractor for DeckExtractor {
    async fn extract(&self, input: &Path, output: &Path) -> Result<Extraction, SiftError> {
        let mut extraction = Extraction::default();
        for img in docsift::staging::list_files(input)? {
            let stem = img.file_stem().unwrap().to_string_lossy().into_owned();
            extraction.texts.push(ExtractedText {
                source: stem.clone(),
                content: format!("Recovered paragraph from {stem}"),
            });
            if stem == "mixed_deck_p1" {
                let dir = output.join(&stem).join("ocr").join("images");
                fs::create_dir_all(&dir).unwrap();
                let sub = dir.join("sub_a.png");
                fs::write(&sub, b"sub").unwrap();
                extraction.sub_images.push(sub);
            }
        }
        Ok(extraction)
    }
}

struct BrokenExtractor;

#[async_trait]
impl Extractor for BrokenExtractor {
    async fn extract(&self, _input: &Path, _output: &Path) -> Result<Extraction, SiftError> {
        Err(SiftError::ExtractorFailed {
            bin: "magic-pdf".into(),
            code: Some(1),
            stderr: "CUDA out of memory".into(),
        })
    }
}

/// Vectors keyed by the letter after the last `_` in the stem.
/// `a` and `b` score 0.99; every other pair is orthogonal.
struct LetterEmbedder;

impl ImageEmbedder for LetterEmbedder {
    fn embed(&self, path: &Path) -> Result<Vec<f32>, SiftError> {
        let stem = path.file_stem().unwrap().to_string_lossy().into_owned();
        let letter = stem.rsplit('_').next().unwrap_or("");
        let b_off = (1.0f32 - 0.99 * 0.99).sqrt();
        Ok(match letter {
            "a" => vec![1.0, 0.0, 0.0, 0.0, 0.0, 0.0],
            "b" => vec![0.99, 0.0, 0.0, 0.0, 0.0, b_off],
            "c" => vec![0.0, 1.0, 0.0, 0.0, 0.0, 0.0],
            "d" => vec![0.0, 0.0, 1.0, 0.0, 0.0, 0.0],
            "e" => vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0],
            _ => {
                return Err(SiftError::ImageDecodeFailed {
                    path: path.to_path_buf(),
                    detail: "unknown".into(),
                })
            }
        })
    }
}

/// Exact-text embedder: identical strings → identical one-hot vectors.
struct ExactTextEmbedder {
    seen: Mutex<Vec<String>>,
}

impl TextEmbedder for ExactTextEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, SiftError> {
        let mut seen = self.seen.lock().unwrap();
        let key = text.trim().to_string();
        let slot = match seen.iter().position(|s| *s == key) {
            Some(i) => i,
            None => {
                seen.push(key);
                seen.len() - 1
            }
        };
        let mut v = vec![0.0; 32];
        v[slot] = 1.0;
        Ok(v)
    }
}

#[derive(Default)]
struct StageLog {
    started: Mutex<Vec<Stage>>,
}

impl PipelineProgressCallback for StageLog {
    fn on_stage_start(&self, stage: Stage, _total: usize) {
        self.started.lock().unwrap().push(stage);
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

fn collaborators(extractor: Arc<dyn Extractor>) -> Collaborators {
    Collaborators {
        rasterizer: Arc::new(TwoPageRasterizer),
        classifier: Arc::new(NameClassifier),
        extractor,
        text_embedder: Arc::new(ExactTextEmbedder {
            seen: Mutex::new(Vec::new()),
        }),
        image_embedder: Arc::new(LetterEmbedder),
    }
}

fn names(dir: &Path) -> Vec<String> {
    docsift::staging::list_files(dir)
        .unwrap()
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect()
}

fn corpus() -> TempDir {
    let input = TempDir::new().unwrap();
    let root = input.path();
    fs::create_dir_all(root.join("scans")).unwrap();
    for l in ["a", "b", "c", "d", "e"] {
        fs::write(root.join("scans").join(format!("photo_{l}.png")), b"px").unwrap();
    }
    fs::write(root.join("mixed_deck.pdf"), b"%PDF-1.7").unwrap();
    fs::write(root.join("notes.txt"), "Budget approved for Q3.").unwrap();
    fs::write(root.join("notes_copy.txt"), "\u{feff}Budget approved for Q3.\n").unwrap();
    let (euc_kr, _, _) = encoding_rs::EUC_KR.encode("회의록: 예산 승인");
    fs::write(root.join("minutes.txt"), &euc_kr).unwrap();
    fs::write(root.join("ledger.xlsx"), b"PK").unwrap();
    input
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn full_run_over_mixed_corpus() {
    let input = corpus();
    let work = TempDir::new().unwrap();
    let log = Arc::new(StageLog::default());
    let config = PipelineConfig::builder()
        .work_dir(work.path())
        .progress_callback(log.clone())
        .build()
        .unwrap();

    let summary = run_with(input.path(), &config, collaborators(Arc::new(DeckExtractor)))
        .await
        .unwrap();
    let dirs = config.dirs();

    assert!(summary.is_clean(), "{:?}", summary.stage_errors);

    // Dispatch
    assert_eq!(summary.dispatch.texts, 3);
    assert_eq!(summary.dispatch.images, 5);
    assert_eq!(summary.dispatch.pdfs, 1);
    assert_eq!(summary.dispatch.pages_rendered, 2);
    assert_eq!(summary.dispatch.skipped, vec![input.path().join("ledger.xlsx")]);

    // Refinement: both deck pages are mixed; page 1 yields a pure sub-image.
    assert_eq!(summary.refinement.passes.len(), 2);
    assert_eq!(summary.refinement.passes[0].mixed, 2);
    assert_eq!(summary.refinement.passes[0].pure, 5);
    assert_eq!(summary.refinement.passes[1].pure, 1);
    assert_eq!(summary.refinement.total_texts(), 2);

    // Images: photo_b and sub_a collapse onto photo_a.
    let images = summary.image_dedup.as_ref().unwrap();
    assert_eq!(images.total, 6);
    assert_eq!(images.duplicates, 2);
    assert_eq!(
        names(&dirs.images_final),
        vec!["photo_a.png", "photo_c.png", "photo_d.png", "photo_e.png"]
    );
    let report = fs::read_to_string(&dirs.image_report).unwrap();
    assert!(report.starts_with('\u{feff}'));
    assert!(report.contains("duplicate_file,source_file"));
    assert_eq!(report.matches("photo_a.png").count(), 2);

    // Text: notes_copy duplicates notes once the BOM is stripped.
    let texts = summary.text_dedup.as_ref().unwrap();
    assert_eq!(texts.total, 5);
    assert_eq!(texts.duplicates, 1);
    let kept = names(&dirs.text_final);
    assert!(kept.contains(&"notes.txt".to_string()));
    assert!(kept.contains(&"minutes.txt".to_string()));
    assert!(!kept.contains(&"notes_copy.txt".to_string()));
    let text_report = fs::read_to_string(&dirs.text_report).unwrap();
    assert!(text_report.contains("notes_copy.txt"));

    // Cleanup removed staging but kept results.
    assert!(!dirs.root.join("intake").exists());
    assert!(!dirs.images_pending.exists());
    assert!(!dirs.extract_root.exists());
    assert!(!dirs.refine_root.exists());
    assert!(dirs.images_final.is_dir() && dirs.text_final.is_dir());
    assert!(summary.cleaned_dirs >= 3);

    let started = log.started.lock().unwrap().clone();
    assert_eq!(started.first(), Some(&Stage::Dispatch));
    assert_eq!(started.last(), Some(&Stage::Cleanup));
    assert!(started.contains(&Stage::Classify(2)));
}

#[tokio::test]
async fn missing_input_is_fatal() {
    let work = TempDir::new().unwrap();
    let config = PipelineConfig::builder()
        .work_dir(work.path())
        .build()
        .unwrap();
    let err = run_with(
        work.path().join("nope"),
        &config,
        collaborators(Arc::new(DeckExtractor)),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, SiftError::InputNotFound { .. }));
}

#[tokio::test]
async fn failed_extraction_quarantines_and_run_continues() {
    let input = TempDir::new().unwrap();
    fs::write(input.path().join("mixed_form.png"), b"px").unwrap();
    fs::write(input.path().join("boom_scan.png"), b"px").unwrap();
    fs::write(input.path().join("photo_c.png"), b"px").unwrap();
    let work = TempDir::new().unwrap();
    let config = PipelineConfig::builder()
        .work_dir(work.path())
        .keep_intermediate(true)
        .build()
        .unwrap();

    let summary = run_with(input.path(), &config, collaborators(Arc::new(BrokenExtractor)))
        .await
        .unwrap();
    let dirs = config.dirs();

    // The classifier error degrades to mixed; both mixed images go to quarantine.
    let pass = &summary.refinement.passes[0];
    assert_eq!(pass.classifier_failures, 1);
    assert_eq!(pass.mixed, 2);
    assert_eq!(pass.failed_extractions, 2);
    assert_eq!(names(&dirs.quarantine), vec!["boom_scan.png", "mixed_form.png"]);

    assert!(summary.text_dedup.is_none());
    assert_eq!(names(&dirs.images_final), vec!["photo_c.png"]);
    assert!(!dirs.image_report.exists());

    // keep_intermediate leaves staging in place.
    assert_eq!(summary.cleaned_dirs, 0);
    assert!(dirs.images_pending.is_dir());
}
