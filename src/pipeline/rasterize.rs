//! PDF rasterisation: render every page of a PDF to a PNG via pdfium.
//!
//! The dispatcher never looks inside a PDF; it hands the file to a
//! [`PageRasterizer`] which drops one `{stem}_p{page}.png` per page into the
//! image intake directory. From there on a page is just another image.
//!
//! pdfium is not async-safe, so callers run [`PageRasterizer::rasterize`]
//! inside `tokio::task::spawn_blocking`.

use crate::config::PipelineConfig;
use crate::error::SiftError;
use crate::staging;
use image::ImageFormat;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Turns a PDF into one image file per page.
pub trait PageRasterizer: Send + Sync {
    /// Render every page of `pdf` into `out_dir`, returning the written paths
    /// in page order.
    fn rasterize(&self, pdf: &Path, out_dir: &Path) -> Result<Vec<PathBuf>, SiftError>;
}

/// [`PageRasterizer`] backed by the pdfium C++ library.
///
/// Binds to `PDFIUM_LIB_PATH` when set, otherwise to a pdfium library next
/// to the executable or on the system library path.
#[derive(Debug, Clone)]
pub struct PdfiumRasterizer {
    max_pixels: u32,
    password: Option<String>,
}

impl PdfiumRasterizer {
    pub fn new(max_pixels: u32, password: Option<String>) -> Self {
        Self {
            max_pixels,
            password,
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.max_rendered_pixels, config.pdf_password.clone())
    }

    fn bind() -> Result<Pdfium, SiftError> {
        let bindings = match std::env::var("PDFIUM_LIB_PATH") {
            Ok(path) if !path.is_empty() => Pdfium::bind_to_library(&path),
            _ => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
                .or_else(|_| Pdfium::bind_to_system_library()),
        }
        .map_err(|e| SiftError::PdfiumBindingFailed(format!("{:?}", e)))?;
        Ok(Pdfium::new(bindings))
    }
}

impl PageRasterizer for PdfiumRasterizer {
    fn rasterize(&self, pdf: &Path, out_dir: &Path) -> Result<Vec<PathBuf>, SiftError> {
        let pdfium = Self::bind()?;

        let document = pdfium
            .load_pdf_from_file(pdf, self.password.as_deref())
            .map_err(|e| SiftError::CorruptPdf {
                path: pdf.to_path_buf(),
                detail: format!("{:?}", e),
            })?;

        let stem = pdf
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document".to_string());

        let render_config = PdfRenderConfig::new()
            .set_target_width(self.max_pixels as i32)
            .set_maximum_height(self.max_pixels as i32);

        std::fs::create_dir_all(out_dir).map_err(|e| SiftError::io(out_dir, e))?;

        let pages = document.pages();
        info!("Rasterising {} ({} pages)", pdf.display(), pages.len());

        let mut written = Vec::with_capacity(pages.len() as usize);
        for (idx, page) in pages.iter().enumerate() {
            let page_num = idx + 1;
            let bitmap = page.render_with_config(&render_config).map_err(|e| {
                SiftError::RasterisationFailed {
                    path: pdf.to_path_buf(),
                    page: page_num,
                    detail: format!("{:?}", e),
                }
            })?;

            let image = bitmap.as_image();
            let target = page_file_name(&stem, page_num);
            let staged = staging::write_unique(out_dir, &target, "")?;
            image
                .save_with_format(&staged, ImageFormat::Png)
                .map_err(|e| SiftError::RasterisationFailed {
                    path: pdf.to_path_buf(),
                    page: page_num,
                    detail: e.to_string(),
                })?;
            debug!(
                "Rendered page {} → {} ({}x{} px)",
                page_num,
                staged.display(),
                image.width(),
                image.height()
            );
            written.push(staged);
        }

        Ok(written)
    }
}

/// File name for a rendered page (1-indexed).
pub fn page_file_name(stem: &str, page_num: usize) -> String {
    format!("{stem}_p{page_num}.png")
}
