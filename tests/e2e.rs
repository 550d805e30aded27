//! End-to-end tests against the real collaborators.
//!
//! These need libpdfium, a vision provider API key, the `magic-pdf`
//! binary and network access for the fastembed model download, and read
//! inputs from `./test_cases/corpus/`. They are gated behind the
//! `E2E_ENABLED` environment variable.
//!
//! Run with:
//!   E2E_ENABLED=1 cargo test --test e2e -- --nocapture

use docsift::dedup::cluster::cosine_similarity;
use docsift::dedup::embed::{text_embedder_for, DEFAULT_TEXT_MODEL};
use docsift::{run_pipeline, PipelineConfig, PipelineSummary, TextEmbedder};
use std::path::PathBuf;
use tempfile::TempDir;

fn corpus_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("test_cases/corpus")
}

/// Skip this test if E2E_ENABLED is not set or the corpus is missing.
macro_rules! e2e_skip_unless_ready {
    () => {{
        if std::env::var("E2E_ENABLED").is_err() {
            println!("SKIP: set E2E_ENABLED=1 to run e2e tests");
            return;
        }
        let p = corpus_dir();
        if !p.is_dir() {
            println!("SKIP: corpus not found: {}", p.display());
            return;
        }
        p
    }};
}

fn print_summary(summary: &PipelineSummary) {
    println!(
        "{}",
        serde_json::to_string_pretty(summary).unwrap_or_default()
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn e2e_full_corpus() {
    let input = e2e_skip_unless_ready!();
    let work = TempDir::new().unwrap();
    let config = PipelineConfig::builder()
        .work_dir(work.path())
        .build()
        .unwrap();

    let summary = run_pipeline(&input, &config).await.unwrap();
    print_summary(&summary);

    let dirs = config.dirs();
    let d = &summary.dispatch;
    assert!(d.texts + d.images + d.pdfs > 0, "corpus produced no inputs");
    assert!(d.failed.is_empty(), "dispatch failures: {:?}", d.failed);
    assert!(dirs.images_final.is_dir());
    assert!(dirs.text_final.is_dir());
    assert!(!dirs.images_pending.exists(), "cleanup must remove staging");
}

#[tokio::test(flavor = "multi_thread")]
async fn e2e_single_pass_keeps_intermediates() {
    let input = e2e_skip_unless_ready!();
    let work = TempDir::new().unwrap();
    let config = PipelineConfig::builder()
        .work_dir(work.path())
        .max_passes(1)
        .keep_intermediate(true)
        .build()
        .unwrap();

    let summary = run_pipeline(&input, &config).await.unwrap();
    print_summary(&summary);

    assert!(summary.refinement.passes.len() <= 1);
    assert_eq!(summary.cleaned_dirs, 0);
    assert!(config.dirs().root.join("intake").is_dir());
}

#[test]
fn e2e_text_model_scores_copies_above_threshold() {
    if std::env::var("E2E_ENABLED").is_err() {
        println!("SKIP: set E2E_ENABLED=1 to run e2e tests");
        return;
    }
    let embedder = text_embedder_for(DEFAULT_TEXT_MODEL).unwrap();
    let a = embedder.embed("회의록: 2024년 예산 승인").unwrap();
    let b = embedder.embed("회의록: 2024년 예산 승인\n").unwrap();
    let c = embedder.embed("The cat slept on the windowsill all afternoon.").unwrap();

    let threshold = PipelineConfig::default().text_similarity_threshold;
    assert!(cosine_similarity(&a, &b) > threshold);
    assert!(cosine_similarity(&a, &c) < threshold);
}
