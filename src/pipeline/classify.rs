//! Pure/mixed classification of candidate images.
//!
//! The refinement loop only depends on the [`Classifier`] trait. The default
//! implementation, [`VlmClassifier`], sends the image to a vision model
//! through `edgequake-llm` and parses a one-word answer.
//!
//! ## Fail-safe
//!
//! A classifier may return `Err` for any reason (network, decode error,
//! unparseable answer after retries). The loop maps every `Err` to
//! [`Label::Mixed`], so an image is only ever discarded from extraction when
//! a model positively said it is pure.

use crate::config::{PipelineConfig, DEFAULT_CLASSIFIER_MODEL};
use crate::error::SiftError;
use crate::prompts::{CLASSIFIER_QUESTION, CLASSIFIER_SYSTEM_PROMPT};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider, ProviderFactory};
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::time::{sleep, Duration};
use tracing::{debug, warn};

/// Outcome of classifying one image for one pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Label {
    /// Purely visual; goes straight to the final image pool.
    Pure,
    /// Carries text or layout; goes to the extraction tool.
    Mixed,
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Label::Pure => write!(f, "pure"),
            Label::Mixed => write!(f, "mixed"),
        }
    }
}

/// Labels a single image as pure or mixed.
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, image: &Path) -> Result<Label, SiftError>;
}

/// Interpret a free-form model answer.
///
/// "mixed" anywhere wins, then "pure"; anything else is `None`.
pub fn parse_label(answer: &str) -> Option<Label> {
    let answer = answer.to_lowercase();
    if answer.contains("mixed") {
        Some(Label::Mixed)
    } else if answer.contains("pure") {
        Some(Label::Pure)
    } else {
        None
    }
}

// ── Vision-model classifier ──────────────────────────────────────────────

/// [`Classifier`] that asks a vision-language model.
pub struct VlmClassifier {
    provider: Arc<dyn LLMProvider>,
    max_pixels: u32,
    max_retries: u32,
    retry_backoff_ms: u64,
}

impl VlmClassifier {
    pub fn new(provider: Arc<dyn LLMProvider>, config: &PipelineConfig) -> Self {
        Self {
            provider,
            max_pixels: config.classifier_max_pixels,
            max_retries: config.classifier_max_retries,
            retry_backoff_ms: config.retry_backoff_ms,
        }
    }

    /// Resolve a provider from the config (see [`resolve_provider`]) and wrap it.
    pub fn from_config(config: &PipelineConfig) -> Result<Self, SiftError> {
        let provider = resolve_provider(config)?;
        Ok(Self::new(provider, config))
    }

    fn options() -> CompletionOptions {
        CompletionOptions {
            temperature: Some(0.0),
            max_tokens: Some(8),
            ..Default::default()
        }
    }
}

#[async_trait]
impl Classifier for VlmClassifier {
    async fn classify(&self, image: &Path) -> Result<Label, SiftError> {
        let path = image.to_path_buf();
        let max_pixels = self.max_pixels;
        let image_data = tokio::task::spawn_blocking(move || encode_image(&path, max_pixels))
            .await
            .map_err(|e| SiftError::Internal(format!("Encode task panicked: {}", e)))??;

        let messages = vec![
            ChatMessage::system(CLASSIFIER_SYSTEM_PROMPT),
            ChatMessage::user_with_images(CLASSIFIER_QUESTION, vec![image_data]),
        ];
        let options = Self::options();

        let mut last_err = String::from("no attempt made");
        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let backoff = self.retry_backoff_ms * 2u64.pow(attempt - 1);
                warn!(
                    "{}: classifier retry {}/{} after {}ms",
                    image.display(),
                    attempt,
                    self.max_retries,
                    backoff
                );
                sleep(Duration::from_millis(backoff)).await;
            }

            match self.provider.chat(&messages, Some(&options)).await {
                Ok(response) => match parse_label(&response.content) {
                    Some(label) => {
                        debug!("{} → {} ({:?})", image.display(), label, response.content);
                        return Ok(label);
                    }
                    None => {
                        last_err = format!("unrecognised answer {:?}", response.content);
                    }
                },
                Err(e) => last_err = e.to_string(),
            }
        }

        Err(SiftError::ClassifierFailed {
            path: image.to_path_buf(),
            detail: last_err,
        })
    }
}

/// Stand-in used when no vision provider could be configured.
///
/// Every call fails, which the refinement loop turns into `Mixed`.
#[derive(Debug, Clone)]
pub struct UnavailableClassifier {
    reason: String,
}

impl UnavailableClassifier {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl Classifier for UnavailableClassifier {
    async fn classify(&self, image: &Path) -> Result<Label, SiftError> {
        Err(SiftError::ClassifierFailed {
            path: image.to_path_buf(),
            detail: format!("classifier unavailable: {}", self.reason),
        })
    }
}

/// Load an image from disk, shrink it to `max_pixels` on the longest edge,
/// and wrap it as a base64 PNG for the vision API.
pub fn encode_image(path: &Path, max_pixels: u32) -> Result<ImageData, SiftError> {
    let img = image::open(path).map_err(|e| SiftError::ImageDecodeFailed {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })?;
    let img = if img.width() > max_pixels || img.height() > max_pixels {
        img.thumbnail(max_pixels, max_pixels)
    } else {
        img
    };
    encode_png(&img).map_err(|e| SiftError::ImageDecodeFailed {
        path: PathBuf::from(path),
        detail: e.to_string(),
    })
}

fn encode_png(img: &DynamicImage) -> Result<ImageData, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;
    let b64 = STANDARD.encode(&buf);
    debug!("Encoded image → {} bytes base64", b64.len());
    Ok(ImageData::new(b64, "image/png").with_detail("low"))
}

/// Resolve the vision provider, from most-specific to least-specific:
///
/// 1. `config.classifier_provider`: used as-is.
/// 2. `config.classifier_provider_name` (+ model) via [`ProviderFactory`].
/// 3. `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL` when both are set.
/// 4. `OPENAI_API_KEY` → OpenAI, else full auto-detection.
pub fn resolve_provider(config: &PipelineConfig) -> Result<Arc<dyn LLMProvider>, SiftError> {
    if let Some(ref provider) = config.classifier_provider {
        return Ok(Arc::clone(provider));
    }

    let model = config
        .classifier_model
        .as_deref()
        .unwrap_or(DEFAULT_CLASSIFIER_MODEL);

    if let Some(ref name) = config.classifier_provider_name {
        return create_vision_provider(name, model);
    }

    if let (Ok(prov), Ok(env_model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !env_model.is_empty() {
            return create_vision_provider(&prov, &env_model);
        }
    }

    if let Ok(openai_key) = std::env::var("OPENAI_API_KEY") {
        if !openai_key.is_empty() {
            return create_vision_provider("openai", model);
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| SiftError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No vision provider could be auto-detected from environment.\n\
                Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or configure a provider.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}

fn create_vision_provider(
    provider_name: &str,
    model: &str,
) -> Result<Arc<dyn LLMProvider>, SiftError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        SiftError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};
    use tempfile::TempDir;

    #[test]
    fn parse_plain_answers() {
        assert_eq!(parse_label("pure"), Some(Label::Pure));
        assert_eq!(parse_label("Mixed."), Some(Label::Mixed));
        assert_eq!(parse_label("  'PURE'\n"), Some(Label::Pure));
    }

    #[test]
    fn parse_prefers_mixed_when_both_appear() {
        assert_eq!(parse_label("not pure, mixed"), Some(Label::Mixed));
    }

    #[test]
    fn parse_garbage_is_none() {
        assert_eq!(parse_label("I cannot tell"), None);
        assert_eq!(parse_label(""), None);
    }

    #[tokio::test]
    async fn unavailable_classifier_always_errs() {
        let c = UnavailableClassifier::new("no API key");
        let err = c.classify(Path::new("a.png")).await.unwrap_err();
        assert!(err.to_string().contains("no API key"));
    }

    #[test]
    fn encode_downscales_large_images() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("big.png");
        RgbaImage::from_pixel(300, 100, Rgba([0, 0, 255, 255]))
            .save(&path)
            .unwrap();

        let data = encode_image(&path, 64).expect("encode should succeed");
        assert_eq!(data.mime_type, "image/png");
        let decoded = STANDARD.decode(&data.data).expect("valid base64");
        let img = image::load_from_memory(&decoded).unwrap();
        assert!(img.width() <= 64 && img.height() <= 64);
    }

    #[test]
    fn encode_rejects_non_images() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("fake.png");
        std::fs::write(&path, b"not an image").unwrap();
        assert!(matches!(
            encode_image(&path, 64),
            Err(SiftError::ImageDecodeFailed { .. })
        ));
    }
}
