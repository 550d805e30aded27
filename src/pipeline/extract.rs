//! Text and sub-image extraction from mixed images.
//!
//! The extraction tool is directory-oriented: it is pointed at a directory
//! of images and writes one result tree per image into an output directory.
//! The refinement loop owns both directories (it resets them before every
//! call); an [`Extractor`] only runs the tool and collects what it wrote.
//!
//! [`MineruExtractor`] drives the MinerU `magic-pdf` CLI, whose layout is:
//!
//! ```text
//! output/
//!  └─ {image stem}/
//!      └─ {method}/            e.g. "ocr"
//!          ├─ {image stem}.md
//!          └─ images/
//!              ├─ 3f2a….jpg    sub-images cut out of the page
//!              └─ …
//! ```

use crate::config::PipelineConfig;
use crate::error::SiftError;
use crate::staging;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, info, warn};

/// One text unit recovered by the extraction tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedText {
    /// Name of the document (usually the source image stem) it came from.
    pub source: String,
    pub content: String,
}

/// Everything one extractor call produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extraction {
    pub texts: Vec<ExtractedText>,
    /// Sub-image files, still inside the extractor's output tree.
    pub sub_images: Vec<PathBuf>,
}

impl Extraction {
    pub fn is_empty(&self) -> bool {
        self.texts.is_empty() && self.sub_images.is_empty()
    }
}

/// Runs an OCR/layout tool over a directory of images.
#[async_trait]
pub trait Extractor: Send + Sync {
    async fn extract(&self, input_dir: &Path, output_dir: &Path) -> Result<Extraction, SiftError>;
}

/// [`Extractor`] backed by the MinerU `magic-pdf` command line.
#[derive(Debug, Clone)]
pub struct MineruExtractor {
    bin: String,
    lang: String,
    method: String,
}

impl MineruExtractor {
    pub fn new(bin: impl Into<String>, lang: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            bin: bin.into(),
            lang: lang.into(),
            method: method.into(),
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(
            config.extractor_bin.clone(),
            config.extractor_lang.clone(),
            config.extractor_method.clone(),
        )
    }
}

#[async_trait]
impl Extractor for MineruExtractor {
    async fn extract(&self, input_dir: &Path, output_dir: &Path) -> Result<Extraction, SiftError> {
        info!(
            "Running {} -p {} -o {} --lang {} --method {}",
            self.bin,
            input_dir.display(),
            output_dir.display(),
            self.lang,
            self.method
        );

        let output = Command::new(&self.bin)
            .arg("-p")
            .arg(input_dir)
            .arg("-o")
            .arg(output_dir)
            .arg("--lang")
            .arg(&self.lang)
            .arg("--method")
            .arg(&self.method)
            .output()
            .await
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => SiftError::ExtractorNotFound {
                    bin: self.bin.clone(),
                },
                _ => SiftError::Internal(format!("failed to spawn '{}': {}", self.bin, e)),
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        debug!("{} stdout:\n{}", self.bin, stdout);

        if !output.status.success() {
            return Err(SiftError::ExtractorFailed {
                bin: self.bin.clone(),
                code: output.status.code(),
                stderr: stderr.trim().to_string(),
            });
        }
        if !stderr.trim().is_empty() {
            warn!("{} stderr:\n{}", self.bin, stderr.trim());
        }

        collect_output(output_dir, &self.method)
    }
}

static IMAGE_LINK_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*!\[\]\(images/").expect("valid regex"));

/// Drop the tool's own `![](images/…)` references, which point at the
/// sub-images we collect separately.
pub fn strip_image_links(markdown: &str) -> String {
    markdown
        .lines()
        .filter(|line| !IMAGE_LINK_LINE.is_match(line))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Walk a finished output tree and gather texts and sub-images.
pub fn collect_output(output_dir: &Path, method: &str) -> Result<Extraction, SiftError> {
    let mut extraction = Extraction::default();
    if !output_dir.is_dir() {
        warn!("Extractor output directory {} not found", output_dir.display());
        return Ok(extraction);
    }

    let mut docs: Vec<PathBuf> = std::fs::read_dir(output_dir)
        .map_err(|e| SiftError::io(output_dir, e))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_dir())
        .collect();
    docs.sort();

    for doc_dir in docs {
        let method_dir = doc_dir.join(method);
        if !method_dir.is_dir() {
            continue;
        }
        let source = doc_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        if let Some(md_path) = staging::list_files_with_extension(&method_dir, "md")?
            .into_iter()
            .next()
        {
            debug!("Found markdown file: {}", md_path.display());
            let raw = std::fs::read_to_string(&md_path).map_err(|e| SiftError::io(&md_path, e))?;
            let cleaned = strip_image_links(&raw);
            if !cleaned.trim().is_empty() {
                extraction.texts.push(ExtractedText {
                    source: source.clone(),
                    content: cleaned,
                });
            }
        }

        let images = staging::list_files(&method_dir.join("images"))?;
        debug!("Found {} sub-images for {}", images.len(), source);
        extraction.sub_images.extend(images);
    }

    Ok(extraction)
}
