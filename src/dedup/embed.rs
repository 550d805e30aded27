//! Embedding models used as similarity sources.
//!
//! Production embedders wrap `fastembed` ONNX models. A model is named by
//! id in the config; [`text_model`] and [`image_model`] validate the id
//! without touching the network, and the weights are fetched into the
//! fastembed cache the first time an embedder is used.
//!
//! | text id                                  | fastembed model            |
//! |------------------------------------------|----------------------------|
//! | `paraphrase-multilingual-minilm-l12-v2`  | `ParaphraseMLMiniLML12V2`  |
//! | `multilingual-e5-small`                  | `MultilingualE5Small`      |
//! | `all-minilm-l6-v2`                       | `AllMiniLML6V2`            |
//! | `bge-small-en-v1.5`                      | `BGESmallENV15`            |
//!
//! | image id          | fastembed model  |
//! |-------------------|------------------|
//! | `resnet50`        | `Resnet50`       |
//! | `clip-vit-b32`    | `ClipVitB32`     |
//! | `unicom-vit-b16`  | `UnicomVitB16`   |
//! | `unicom-vit-b32`  | `UnicomVitB32`   |

use crate::error::SiftError;
use fastembed::{
    EmbeddingModel, ImageEmbedding, ImageEmbeddingModel, ImageInitOptions, InitOptions,
    TextEmbedding,
};
use once_cell::sync::OnceCell;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Text → dense vector.
///
/// Blank text must embed to a zero vector so every blank text matches every
/// other one.
pub trait TextEmbedder: Send + Sync {
    fn embed(&self, text: &str) -> Result<Vec<f32>, SiftError>;
}

/// Image file → dense vector.
pub trait ImageEmbedder: Send + Sync {
    fn embed(&self, path: &Path) -> Result<Vec<f32>, SiftError>;
}

pub const DEFAULT_TEXT_MODEL: &str = "paraphrase-multilingual-minilm-l12-v2";
pub const DEFAULT_IMAGE_MODEL: &str = "resnet50";

pub const TEXT_MODEL_IDS: &[&str] = &[
    "paraphrase-multilingual-minilm-l12-v2",
    "multilingual-e5-small",
    "all-minilm-l6-v2",
    "bge-small-en-v1.5",
];

pub const IMAGE_MODEL_IDS: &[&str] = &["resnet50", "clip-vit-b32", "unicom-vit-b16", "unicom-vit-b32"];

fn unknown_model(id: &str, known: &[&str]) -> SiftError {
    SiftError::InvalidConfig(format!(
        "Unknown embedding model '{id}' (expected one of: {})",
        known.join(", ")
    ))
}

/// Resolve a text model id.
pub fn text_model(id: &str) -> Result<EmbeddingModel, SiftError> {
    Ok(match id {
        "paraphrase-multilingual-minilm-l12-v2" => EmbeddingModel::ParaphraseMLMiniLML12V2,
        "multilingual-e5-small" => EmbeddingModel::MultilingualE5Small,
        "all-minilm-l6-v2" => EmbeddingModel::AllMiniLML6V2,
        "bge-small-en-v1.5" => EmbeddingModel::BGESmallENV15,
        _ => return Err(unknown_model(id, TEXT_MODEL_IDS)),
    })
}

/// Resolve an image model id.
pub fn image_model(id: &str) -> Result<ImageEmbeddingModel, SiftError> {
    Ok(match id {
        "resnet50" => ImageEmbeddingModel::Resnet50,
        "clip-vit-b32" => ImageEmbeddingModel::ClipVitB32,
        "unicom-vit-b16" => ImageEmbeddingModel::UnicomVitB16,
        "unicom-vit-b32" => ImageEmbeddingModel::UnicomVitB32,
        _ => return Err(unknown_model(id, IMAGE_MODEL_IDS)),
    })
}

fn unavailable(id: &str, e: impl std::fmt::Display) -> SiftError {
    SiftError::EmbeddingModelUnavailable {
        model: id.to_string(),
        detail: e.to_string(),
    }
}

/// fastembed sentence model, loaded on first use.
pub struct FastTextEmbedder {
    id: String,
    model: EmbeddingModel,
    session: OnceCell<TextEmbedding>,
}

impl FastTextEmbedder {
    pub fn new(id: &str) -> Result<Self, SiftError> {
        Ok(Self {
            id: id.to_string(),
            model: text_model(id)?,
            session: OnceCell::new(),
        })
    }

    fn session(&self) -> Result<&TextEmbedding, SiftError> {
        self.session.get_or_try_init(|| {
            info!("Loading text embedding model '{}'...", self.id);
            let options = InitOptions::new(self.model.clone()).with_show_download_progress(false);
            TextEmbedding::try_new(options).map_err(|e| unavailable(&self.id, e))
        })
    }
}

impl TextEmbedder for FastTextEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, SiftError> {
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }
        let failed = |detail: String| SiftError::EmbeddingFailed {
            item: text.chars().take(40).collect(),
            detail,
        };
        self.session()?
            .embed(vec![text], None)
            .map_err(|e| failed(e.to_string()))?
            .into_iter()
            .next()
            .ok_or_else(|| failed("model returned no embedding".into()))
    }
}

/// fastembed vision model, loaded on first use.
pub struct FastImageEmbedder {
    id: String,
    model: ImageEmbeddingModel,
    session: OnceCell<ImageEmbedding>,
}

impl FastImageEmbedder {
    pub fn new(id: &str) -> Result<Self, SiftError> {
        Ok(Self {
            id: id.to_string(),
            model: image_model(id)?,
            session: OnceCell::new(),
        })
    }

    fn session(&self) -> Result<&ImageEmbedding, SiftError> {
        self.session.get_or_try_init(|| {
            info!("Loading image embedding model '{}'...", self.id);
            let options =
                ImageInitOptions::new(self.model.clone()).with_show_download_progress(false);
            ImageEmbedding::try_new(options).map_err(|e| unavailable(&self.id, e))
        })
    }
}

impl ImageEmbedder for FastImageEmbedder {
    fn embed(&self, path: &Path) -> Result<Vec<f32>, SiftError> {
        let session = self.session()?;
        let failed = |detail: String| SiftError::ImageDecodeFailed {
            path: path.to_path_buf(),
            detail,
        };
        session
            .embed(vec![path], None)
            .map_err(|e| failed(e.to_string()))?
            .into_iter()
            .next()
            .ok_or_else(|| failed("model returned no embedding".into()))
    }
}

/// Text embedder for a model id. Nothing is downloaded until first use.
pub fn text_embedder_for(id: &str) -> Result<Arc<dyn TextEmbedder>, SiftError> {
    Ok(Arc::new(FastTextEmbedder::new(id)?))
}

/// Image embedder for a model id. Nothing is downloaded until first use.
pub fn image_embedder_for(id: &str) -> Result<Arc<dyn ImageEmbedder>, SiftError> {
    Ok(Arc::new(FastImageEmbedder::new(id)?))
}
