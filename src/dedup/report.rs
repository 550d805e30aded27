//! Duplicate report writer.
//!
//! Format: UTF-8 with BOM (so spreadsheet tools detect the encoding), header
//! `duplicate_file,source_file`, one row per duplicate, RFC 4180 quoting.
//! The file is written to a temporary sibling and persisted in one rename.

use crate::error::SiftError;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::info;

const BOM: &str = "\u{feff}";
const HEADER: &str = "duplicate_file,source_file";

/// `(duplicate, source)` rows, in the order they were decided.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DedupReport {
    rows: Vec<(PathBuf, PathBuf)>,
}

impl DedupReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, duplicate: impl Into<PathBuf>, source: impl Into<PathBuf>) {
        self.rows.push((duplicate.into(), source.into()));
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[(PathBuf, PathBuf)] {
        &self.rows
    }

    /// Render the whole report, BOM included.
    pub fn to_csv(&self) -> String {
        let mut out = String::with_capacity(64 * (self.rows.len() + 1));
        out.push_str(BOM);
        out.push_str(HEADER);
        out.push_str("\r\n");
        for (dup, src) in &self.rows {
            out.push_str(&csv_field(&dup.to_string_lossy()));
            out.push(',');
            out.push_str(&csv_field(&src.to_string_lossy()));
            out.push_str("\r\n");
        }
        out
    }

    /// Write to `path` atomically. An empty report writes nothing and
    /// returns `Ok(None)`.
    pub fn write(&self, path: &Path) -> Result<Option<PathBuf>, SiftError> {
        if self.is_empty() {
            return Ok(None);
        }
        let fail = |source| SiftError::ReportWriteFailed {
            path: path.to_path_buf(),
            source,
        };
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let mut tmp = NamedTempFile::new_in(dir).map_err(fail)?;
        tmp.write_all(self.to_csv().as_bytes()).map_err(fail)?;
        tmp.persist(path).map_err(|e| fail(e.error))?;
        info!("Duplicate report ({} rows) saved to {}", self.len(), path.display());
        Ok(Some(path.to_path_buf()))
    }
}

/// Quote a field if it contains a delimiter, quote or line break.
fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
