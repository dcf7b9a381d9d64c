//! Upload intake: extension checks, scratch persistence and cleanup.
//!
//! A [`ScratchBatch`] owns every file written for one request. Files are
//! removed by [`ScratchBatch::cleanup`] on the normal path and by `Drop` on
//! any other path (early return, error, cancelled handler future).

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use axum::body::Bytes;
use regex::Regex;
use tracing::{debug, warn};

use crate::error::EvaluateError;

const ALLOWED_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

/// One uploaded file as received from the client.
#[derive(Debug, Clone)]
pub struct UploadedImage {
    pub filename: String,
    pub data: Bytes,
}

impl UploadedImage {
    pub fn new(filename: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            filename: filename.into(),
            data: data.into(),
        }
    }
}

/// Files persisted to scratch storage for a single request, in upload order.
#[derive(Debug, Default)]
pub struct ScratchBatch {
    paths: Vec<PathBuf>,
}

impl ScratchBatch {
    /// Validate and persist `images` into `dir`.
    ///
    /// Stops at the first rejected or unwritable file, removing everything
    /// already written for this batch before returning the error.
    pub async fn persist(dir: &Path, images: &[UploadedImage]) -> Result<Self, EvaluateError> {
        let mut batch = Self::default();

        for image in images {
            if let Err(e) = batch.persist_one(dir, image).await {
                warn!(
                    "Intake rejected '{}': {} (removing {} persisted files)",
                    image.filename,
                    e,
                    batch.len()
                );
                batch.cleanup().await;
                return Err(e);
            }
        }

        debug!("Persisted {} uploads to {:?}", batch.len(), dir);
        Ok(batch)
    }

    async fn persist_one(&mut self, dir: &Path, image: &UploadedImage) -> Result<(), EvaluateError> {
        if image.filename.is_empty() {
            return Err(EvaluateError::EmptySelection);
        }
        if !allowed_file(&image.filename) {
            return Err(EvaluateError::InvalidFileType(image.filename.clone()));
        }

        let path = dir.join(scratch_name(&image.filename));
        // Track before writing so a partial write is still removed.
        self.paths.push(path.clone());
        tokio::fs::write(&path, &image.data).await?;
        Ok(())
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    /// Remove every persisted file. Missing files are not an error.
    pub async fn cleanup(mut self) {
        for path in self.paths.drain(..) {
            if let Err(e) = tokio::fs::remove_file(&path).await {
                log_remove_failure(&path, &e);
            }
        }
    }
}

impl Drop for ScratchBatch {
    // Blocking removal; only reached when `cleanup` was skipped (error or cancellation).
    fn drop(&mut self) {
        for path in self.paths.drain(..) {
            if let Err(e) = std::fs::remove_file(&path) {
                log_remove_failure(&path, &e);
            }
        }
    }
}

fn log_remove_failure(path: &Path, err: &std::io::Error) {
    if err.kind() != std::io::ErrorKind::NotFound {
        warn!("Failed to remove scratch file {:?}: {}", path, err);
    }
}

/// True if the filename carries one of the accepted image extensions.
pub fn allowed_file(filename: &str) -> bool {
    filename
        .rsplit_once('.')
        .map(|(_, ext)| {
            ALLOWED_EXTENSIONS
                .iter()
                .any(|allowed| ext.eq_ignore_ascii_case(allowed))
        })
        .unwrap_or(false)
}

/// Reduce a client-supplied filename to a safe, flat ASCII name.
pub fn sanitize_filename(filename: &str) -> String {
    static WHITESPACE: OnceLock<Regex> = OnceLock::new();
    static DISALLOWED: OnceLock<Regex> = OnceLock::new();

    let whitespace = WHITESPACE.get_or_init(|| Regex::new(r"\s+").expect("valid regex"));
    let disallowed =
        DISALLOWED.get_or_init(|| Regex::new(r"[^A-Za-z0-9._-]").expect("valid regex"));

    let base = filename.rsplit(['/', '\\']).next().unwrap_or_default();
    let joined = whitespace.replace_all(base.trim(), "_");
    let cleaned = disallowed.replace_all(&joined, "");
    let trimmed = cleaned.trim_matches(|c| c == '.' || c == '_');

    if trimmed.is_empty() {
        "upload".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Unique on-disk name: concurrent requests may upload the same filename.
fn scratch_name(filename: &str) -> String {
    format!("{}_{}", uuid::Uuid::new_v4().simple(), sanitize_filename(filename))
}
