//! Route raw input files to the intake directories.
//!
//! Routing is by extension only (case-insensitive): `.txt` → text intake,
//! `.pdf` → rasterizer → image intake, known image extensions → image
//! intake, anything else is logged and skipped. Inputs are always copied,
//! never moved; the input tree is left untouched.

use crate::config::{PipelineConfig, WorkDirs};
use crate::error::SiftError;
use crate::output::DispatchReport;
use crate::pipeline::rasterize::PageRasterizer;
use crate::progress::Stage;
use crate::staging;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

/// Image extensions accepted as-is.
pub const SUPPORTED_IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "gif", "tif", "tiff"];

/// Where a single input file goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Text,
    Pdf,
    Image,
    Rejected,
}

/// Decide the route of `path` from its extension.
pub fn route(path: &Path) -> Route {
    match staging::lowercase_extension(path).as_deref() {
        Some("txt") => Route::Text,
        Some("pdf") => Route::Pdf,
        Some(ext) if SUPPORTED_IMAGE_EXTENSIONS.contains(&ext) => Route::Image,
        _ => Route::Rejected,
    }
}

/// Walks an input root and fills the intake directories.
pub struct Dispatcher<'a> {
    config: &'a PipelineConfig,
    dirs: WorkDirs,
    rasterizer: Arc<dyn PageRasterizer>,
}

impl<'a> Dispatcher<'a> {
    pub fn new(config: &'a PipelineConfig, rasterizer: Arc<dyn PageRasterizer>) -> Self {
        Self {
            config,
            dirs: config.dirs(),
            rasterizer,
        }
    }

    /// Dispatch every file under `input_dir` (recursively).
    pub async fn run(&self, input_dir: &Path) -> Result<DispatchReport, SiftError> {
        let files = collect_files(input_dir)?;
        info!("Dispatching {} files from {}", files.len(), input_dir.display());

        let total = files.len();
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_stage_start(Stage::Dispatch, total);
        }

        let mut report = DispatchReport::default();
        for (i, file) in files.iter().enumerate() {
            self.dispatch_one(file, &mut report).await;
            if let Some(ref cb) = self.config.progress_callback {
                cb.on_item_complete(Stage::Dispatch, i + 1, total);
            }
        }

        if let Some(ref cb) = self.config.progress_callback {
            cb.on_stage_complete(Stage::Dispatch);
        }
        info!(
            "Dispatch complete: {} texts, {} images, {} PDFs ({} pages), {} skipped, {} failed",
            report.texts,
            report.images,
            report.pdfs,
            report.pages_rendered,
            report.skipped.len(),
            report.failed.len()
        );
        Ok(report)
    }

    /// Route a single file. Failures are recorded, never propagated.
    pub async fn dispatch_one(&self, file: &Path, report: &mut DispatchReport) {
        match route(file) {
            Route::Text => match staging::safe_copy(file, &self.dirs.text_intake) {
                Ok(dst) => {
                    debug!("TXT copied to intake → {}", dst.display());
                    report.texts += 1;
                }
                Err(e) => {
                    error!("{}", e);
                    report.failed.push(file.to_path_buf());
                }
            },
            Route::Image => match staging::safe_copy(file, &self.dirs.image_intake) {
                Ok(dst) => {
                    debug!("Image copied to intake → {}", dst.display());
                    report.images += 1;
                }
                Err(e) => {
                    error!("{}", e);
                    report.failed.push(file.to_path_buf());
                }
            },
            Route::Pdf => {
                report.pdfs += 1;
                match self.rasterize(file).await {
                    Ok(pages) => report.pages_rendered += pages.len(),
                    Err(e) => {
                        error!("{}", e);
                        report.failed.push(file.to_path_buf());
                    }
                }
            }
            Route::Rejected => {
                warn!("Unsupported file skipped: {}", file.display());
                report.skipped.push(file.to_path_buf());
            }
        }
    }

    async fn rasterize(&self, pdf: &Path) -> Result<Vec<PathBuf>, SiftError> {
        info!("Converting PDF → images: {}", pdf.display());
        let rasterizer = Arc::clone(&self.rasterizer);
        let pdf = pdf.to_path_buf();
        let out_dir = self.dirs.image_intake.clone();
        tokio::task::spawn_blocking(move || rasterizer.rasterize(&pdf, &out_dir))
            .await
            .map_err(|e| SiftError::Internal(format!("Rasterise task panicked: {}", e)))?
    }
}

/// All regular files under `root`, in a stable (name-sorted) walk order.
///
/// An entry below the root that cannot be read is logged and skipped; only
/// an unreadable root is an error.
fn collect_files(root: &Path) -> Result<Vec<PathBuf>, SiftError> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) if e.depth() == 0 => {
                let path = e.path().unwrap_or(root).to_path_buf();
                return Err(SiftError::io(path, e.into()));
            }
            Err(e) => {
                let path = e.path().unwrap_or(root).display().to_string();
                warn!("Skipping unreadable input '{}': {}", path, e);
                continue;
            }
        };
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Writes `pages` blank files per PDF; PDFs named `broken*` fail.
    struct FakeRasterizer {
        pages: usize,
        seen: Mutex<Vec<PathBuf>>,
    }

    impl PageRasterizer for FakeRasterizer {
        fn rasterize(&self, pdf: &Path, out_dir: &Path) -> Result<Vec<PathBuf>, SiftError> {
            self.seen.lock().unwrap().push(pdf.to_path_buf());
            let stem = pdf.file_stem().unwrap().to_string_lossy().into_owned();
            if stem.starts_with("broken") {
                return Err(SiftError::CorruptPdf {
                    path: pdf.to_path_buf(),
                    detail: "bad xref".into(),
                });
            }
            (1..=self.pages)
                .map(|n| {
                    let name = crate::pipeline::rasterize::page_file_name(&stem, n);
                    staging::write_unique(out_dir, &name, "")
                })
                .collect()
        }
    }

    fn fixture() -> (TempDir, TempDir, PipelineConfig) {
        let input = TempDir::new().unwrap();
        let work = TempDir::new().unwrap();
        let config = PipelineConfig::builder().work_dir(work.path()).build().unwrap();
        config.dirs().ensure().unwrap();
        (input, work, config)
    }

    #[test]
    fn routes_by_extension_case_insensitively() {
        assert_eq!(route(Path::new("a/notes.TXT")), Route::Text);
        assert_eq!(route(Path::new("paper.Pdf")), Route::Pdf);
        assert_eq!(route(Path::new("photo.JPEG")), Route::Image);
        assert_eq!(route(Path::new("scan.tif")), Route::Image);
        assert_eq!(route(Path::new("sheet.xlsx")), Route::Rejected);
        assert_eq!(route(Path::new("README")), Route::Rejected);
    }

    #[tokio::test]
    async fn dispatches_tree_into_intakes() {
        let (input, _work, config) = fixture();
        let root = input.path();
        fs::create_dir_all(root.join("nested")).unwrap();
        fs::write(root.join("a.txt"), "hello").unwrap();
        fs::write(root.join("nested/a.txt"), "again").unwrap();
        fs::write(root.join("nested/photo.PNG"), b"png").unwrap();
        fs::write(root.join("deck.pdf"), b"%PDF").unwrap();
        fs::write(root.join("data.csv"), "x,y").unwrap();

        let rasterizer = Arc::new(FakeRasterizer {
            pages: 3,
            seen: Mutex::new(Vec::new()),
        });
        let report = Dispatcher::new(&config, rasterizer.clone())
            .run(root)
            .await
            .unwrap();

        assert_eq!(report.texts, 2);
        assert_eq!(report.images, 1);
        assert_eq!(report.pdfs, 1);
        assert_eq!(report.pages_rendered, 3);
        assert_eq!(report.skipped, vec![root.join("data.csv")]);
        assert!(report.failed.is_empty());

        let dirs = config.dirs();
        assert_eq!(staging::list_files(&dirs.text_intake).unwrap().len(), 2);
        assert_eq!(staging::list_files(&dirs.image_intake).unwrap().len(), 4);
        assert!(dirs.image_intake.join("deck_p1.png").exists());
        assert!(root.join("a.txt").exists(), "inputs must be copied, not moved");
    }

    #[tokio::test]
    async fn rasterizer_failure_is_recorded_not_fatal() {
        let (input, _work, config) = fixture();
        fs::write(input.path().join("broken.pdf"), b"junk").unwrap();
        fs::write(input.path().join("ok.png"), b"png").unwrap();

        let rasterizer = Arc::new(FakeRasterizer {
            pages: 1,
            seen: Mutex::new(Vec::new()),
        });
        let report = Dispatcher::new(&config, rasterizer).run(input.path()).await.unwrap();

        assert_eq!(report.failed, vec![input.path().join("broken.pdf")]);
        assert_eq!(report.images, 1);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn unreadable_subdirectory_is_skipped() {
        use std::os::unix::fs::PermissionsExt;

        let (input, _work, config) = fixture();
        let root = input.path();
        let locked = root.join("locked");
        fs::create_dir_all(&locked).unwrap();
        fs::write(locked.join("hidden.txt"), "secret").unwrap();
        fs::write(root.join("visible.txt"), "hello").unwrap();
        fs::write(root.join("z_photo.png"), b"png").unwrap();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();

        let rasterizer = Arc::new(FakeRasterizer {
            pages: 1,
            seen: Mutex::new(Vec::new()),
        });
        let report = Dispatcher::new(&config, rasterizer).run(root).await;
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();

        // Root ignores permission bits, in which case hidden.txt is read too.
        let report = report.unwrap();
        assert!(report.texts >= 1);
        assert_eq!(report.images, 1);
        assert!(config.dirs().text_intake.join("visible.txt").exists());
    }

    #[test]
    fn missing_root_is_an_error() {
        let dir = TempDir::new().unwrap();
        assert!(collect_files(&dir.path().join("gone")).is_err());
    }
}
