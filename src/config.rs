//! Configuration types for a sifting run.
//!
//! All pipeline behaviour is controlled through [`PipelineConfig`], built via
//! its [`PipelineConfigBuilder`]. The built value is immutable and passed by
//! reference into every stage, so two stages can never disagree about a
//! threshold or a directory.
//!
//! The on-disk staging layout is derived from `work_dir` by
//! [`PipelineConfig::dirs`]; see [`WorkDirs`].

use crate::dedup::embed::{self, DEFAULT_IMAGE_MODEL, DEFAULT_TEXT_MODEL};
use crate::error::SiftError;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Model used when a provider is named or auto-detected without a model.
pub const DEFAULT_CLASSIFIER_MODEL: &str = "gpt-4.1-nano";

/// Configuration for a sifting run.
///
/// Built via [`PipelineConfig::builder()`] or using
/// [`PipelineConfig::default()`].
///
/// # Example
/// ```rust
/// use docsift::PipelineConfig;
///
/// let config = PipelineConfig::builder()
///     .work_dir("/tmp/sift-work")
///     .max_passes(3)
///     .image_similarity_threshold(0.95)
///     .build()
///     .unwrap();
/// assert_eq!(config.max_passes, 3);
/// ```
#[derive(Clone)]
pub struct PipelineConfig {
    /// Root of every staging directory, report and the run log. Default: `work`.
    pub work_dir: PathBuf,

    /// Cosine similarity above which two images are duplicates. Default: 0.98.
    ///
    /// The comparison is strict: a pair scoring exactly the threshold is kept apart.
    pub image_similarity_threshold: f32,

    /// Cosine similarity above which two texts are duplicates. Default: 0.99.
    pub text_similarity_threshold: f32,

    /// Maximum classify/extract rounds in the refinement loop. Default: 2.
    ///
    /// Sub-images produced by the last permitted pass go straight to the
    /// pending-dedup directory without another classification.
    pub max_passes: usize,

    /// Image embedding model id, e.g. `clip-vit-b32`. Default: `resnet50`.
    pub image_embedding_model: String,

    /// Text embedding model id. Default: `paraphrase-multilingual-minilm-l12-v2`.
    pub text_embedding_model: String,

    /// Vision model used by the pure/mixed classifier.
    /// If None, uses [`DEFAULT_CLASSIFIER_MODEL`].
    pub classifier_model: Option<String>,

    /// Vision provider name (e.g. "openai", "anthropic", "ollama").
    /// If None along with `classifier_provider`, the provider is auto-detected.
    pub classifier_provider_name: Option<String>,

    /// Pre-constructed vision provider. Takes precedence over `classifier_provider_name`.
    pub classifier_provider: Option<Arc<dyn LLMProvider>>,

    /// Longest edge (pixels) of the image sent to the classifier. Default: 1024.
    pub classifier_max_pixels: u32,

    /// Maximum retry attempts on a failed classifier call. Default: 2.
    pub classifier_max_retries: u32,

    /// Initial retry delay in milliseconds, doubled after each attempt. Default: 500.
    pub retry_backoff_ms: u64,

    /// Extraction tool binary name or path. Default: `magic-pdf`.
    pub extractor_bin: String,

    /// Language hint passed to the extraction tool. Default: `korean`.
    pub extractor_lang: String,

    /// Parse method passed to the extraction tool; also names its output
    /// sub-directory. Default: `ocr`.
    pub extractor_method: String,

    /// Encodings tried, in order, when reading text files. Default: `utf-8`, `euc-kr`.
    ///
    /// Labels follow the WHATWG Encoding Standard (`windows-949` is an alias of `euc-kr`).
    pub text_encodings: Vec<String>,

    /// Longest edge (pixels) of a rasterised PDF page. Default: 2000.
    pub max_rendered_pixels: u32,

    /// PDF user password for encrypted documents.
    pub pdf_password: Option<String>,

    /// Move images whose extraction batch failed into `quarantine/` instead
    /// of deleting them. Default: true.
    pub quarantine_failed_extractions: bool,

    /// Skip the cleanup stage, leaving every intermediate directory in place. Default: false.
    pub keep_intermediate: bool,

    /// Optional per-stage progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from("work"),
            image_similarity_threshold: 0.98,
            text_similarity_threshold: 0.99,
            max_passes: 2,
            image_embedding_model: DEFAULT_IMAGE_MODEL.to_string(),
            text_embedding_model: DEFAULT_TEXT_MODEL.to_string(),
            classifier_model: None,
            classifier_provider_name: None,
            classifier_provider: None,
            classifier_max_pixels: 1024,
            classifier_max_retries: 2,
            retry_backoff_ms: 500,
            extractor_bin: "magic-pdf".to_string(),
            extractor_lang: "korean".to_string(),
            extractor_method: "ocr".to_string(),
            text_encodings: vec!["utf-8".to_string(), "euc-kr".to_string()],
            max_rendered_pixels: 2000,
            pdf_password: None,
            quarantine_failed_extractions: true,
            keep_intermediate: false,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("work_dir", &self.work_dir)
            .field("image_similarity_threshold", &self.image_similarity_threshold)
            .field("text_similarity_threshold", &self.text_similarity_threshold)
            .field("max_passes", &self.max_passes)
            .field("image_embedding_model", &self.image_embedding_model)
            .field("text_embedding_model", &self.text_embedding_model)
            .field("classifier_model", &self.classifier_model)
            .field("classifier_provider_name", &self.classifier_provider_name)
            .field(
                "classifier_provider",
                &self.classifier_provider.as_ref().map(|_| "<dyn LLMProvider>"),
            )
            .field("extractor_bin", &self.extractor_bin)
            .field("extractor_lang", &self.extractor_lang)
            .field("extractor_method", &self.extractor_method)
            .field("text_encodings", &self.text_encodings)
            .field("quarantine_failed_extractions", &self.quarantine_failed_extractions)
            .field("keep_intermediate", &self.keep_intermediate)
            .finish()
    }
}

impl PipelineConfig {
    /// Create a new builder for `PipelineConfig`.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }

    /// The staging layout rooted at `work_dir`.
    pub fn dirs(&self) -> WorkDirs {
        WorkDirs::new(&self.work_dir)
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn work_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.work_dir = dir.into();
        self
    }

    pub fn image_similarity_threshold(mut self, t: f32) -> Self {
        self.config.image_similarity_threshold = t;
        self
    }

    pub fn text_similarity_threshold(mut self, t: f32) -> Self {
        self.config.text_similarity_threshold = t;
        self
    }

    pub fn max_passes(mut self, n: usize) -> Self {
        self.config.max_passes = n;
        self
    }

    pub fn image_embedding_model(mut self, id: impl Into<String>) -> Self {
        self.config.image_embedding_model = id.into();
        self
    }

    pub fn text_embedding_model(mut self, id: impl Into<String>) -> Self {
        self.config.text_embedding_model = id.into();
        self
    }

    pub fn classifier_model(mut self, model: impl Into<String>) -> Self {
        self.config.classifier_model = Some(model.into());
        self
    }

    pub fn classifier_provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.classifier_provider_name = Some(name.into());
        self
    }

    pub fn classifier_provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.classifier_provider = Some(provider);
        self
    }

    pub fn classifier_max_pixels(mut self, px: u32) -> Self {
        self.config.classifier_max_pixels = px.max(64);
        self
    }

    pub fn classifier_max_retries(mut self, n: u32) -> Self {
        self.config.classifier_max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn extractor_bin(mut self, bin: impl Into<String>) -> Self {
        self.config.extractor_bin = bin.into();
        self
    }

    pub fn extractor_lang(mut self, lang: impl Into<String>) -> Self {
        self.config.extractor_lang = lang.into();
        self
    }

    pub fn extractor_method(mut self, method: impl Into<String>) -> Self {
        self.config.extractor_method = method.into();
        self
    }

    pub fn text_encodings<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.text_encodings = labels.into_iter().map(Into::into).collect();
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn pdf_password(mut self, pwd: impl Into<String>) -> Self {
        self.config.pdf_password = Some(pwd.into());
        self
    }

    pub fn quarantine_failed_extractions(mut self, v: bool) -> Self {
        self.config.quarantine_failed_extractions = v;
        self
    }

    pub fn keep_intermediate(mut self, v: bool) -> Self {
        self.config.keep_intermediate = v;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, SiftError> {
        let c = &self.config;
        for (name, t) in [
            ("image similarity threshold", c.image_similarity_threshold),
            ("text similarity threshold", c.text_similarity_threshold),
        ] {
            if !(-1.0..=1.0).contains(&t) {
                return Err(SiftError::InvalidConfig(format!(
                    "{name} must be within -1.0–1.0, got {t}"
                )));
            }
        }
        if c.max_passes == 0 {
            return Err(SiftError::InvalidConfig("Max passes must be ≥ 1".into()));
        }
        if c.extractor_bin.trim().is_empty() {
            return Err(SiftError::InvalidConfig(
                "Extractor binary must not be empty".into(),
            ));
        }
        if c.text_encodings.is_empty() {
            return Err(SiftError::InvalidConfig(
                "At least one text encoding is required".into(),
            ));
        }
        for label in &c.text_encodings {
            if encoding_rs::Encoding::for_label(label.as_bytes()).is_none() {
                return Err(SiftError::InvalidConfig(format!(
                    "Unknown text encoding '{label}'"
                )));
            }
        }
        // Ids only; weights are fetched on first use.
        embed::text_model(&c.text_embedding_model)?;
        embed::image_model(&c.image_embedding_model)?;
        Ok(self.config)
    }
}

// ── Staging layout ───────────────────────────────────────────────────────

/// Every directory and file the pipeline reads or writes under `work_dir`.
///
/// ```text
/// work/
///  ├─ intake/images      image intake (pass 1 working set)
///  ├─ intake/text        text intake (extracted + dispatched .txt)
///  ├─ refine/pass{N}     working set of pass N ≥ 2
///  ├─ extract/input      isolated input of one extractor call
///  ├─ extract/output_pass{N}
///  ├─ images_pending     pure images awaiting dedup
///  ├─ images             final deduplicated images
///  ├─ text               final deduplicated text
///  ├─ quarantine         mixed images whose extraction failed
///  ├─ image_dedup_report.csv
///  ├─ text_dedup_report.csv
///  └─ run.log
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkDirs {
    pub root: PathBuf,
    pub image_intake: PathBuf,
    pub text_intake: PathBuf,
    pub refine_root: PathBuf,
    pub extract_root: PathBuf,
    pub extract_input: PathBuf,
    pub images_pending: PathBuf,
    pub images_final: PathBuf,
    pub text_final: PathBuf,
    pub quarantine: PathBuf,
    pub image_report: PathBuf,
    pub text_report: PathBuf,
    pub log_file: PathBuf,
}

impl WorkDirs {
    pub fn new(root: &Path) -> Self {
        let extract_root = root.join("extract");
        Self {
            root: root.to_path_buf(),
            image_intake: root.join("intake").join("images"),
            text_intake: root.join("intake").join("text"),
            refine_root: root.join("refine"),
            extract_input: extract_root.join("input"),
            extract_root,
            images_pending: root.join("images_pending"),
            images_final: root.join("images"),
            text_final: root.join("text"),
            quarantine: root.join("quarantine"),
            image_report: root.join("image_dedup_report.csv"),
            text_report: root.join("text_dedup_report.csv"),
            log_file: root.join("run.log"),
        }
    }

    /// Working set of the given pass (1-indexed). Pass 1 reads the image intake.
    pub fn pass_dir(&self, pass: usize) -> PathBuf {
        if pass <= 1 {
            self.image_intake.clone()
        } else {
            self.refine_root.join(format!("pass{pass}"))
        }
    }

    /// Extractor output directory for the given pass.
    pub fn extract_output(&self, pass: usize) -> PathBuf {
        self.extract_root.join(format!("output_pass{pass}"))
    }

    /// Directories that must exist before the first stage runs.
    pub fn ensure(&self) -> Result<(), SiftError> {
        for dir in [
            &self.root,
            &self.image_intake,
            &self.text_intake,
            &self.images_pending,
            &self.images_final,
            &self.text_final,
        ] {
            std::fs::create_dir_all(dir).map_err(|e| SiftError::io(dir, e))?;
        }
        Ok(())
    }

    /// Intermediate directories removed by the cleanup stage.
    pub fn temporary(&self) -> Vec<PathBuf> {
        vec![
            self.root.join("intake"),
            self.refine_root.clone(),
            self.extract_root.clone(),
            self.images_pending.clone(),
        ]
    }
}
