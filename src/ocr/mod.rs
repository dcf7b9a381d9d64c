//! Handwriting text extraction.
//!
//! Defines the [`TextDetector`] trait implemented by OCR backends and
//! [`extract_text`], which applies the per-image extraction contract on top of
//! whichever detector is configured.

pub mod google_vision;

use std::path::Path;

use tracing::{debug, info};

use crate::error::EvaluateError;

/// One recognized block of text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextAnnotation {
    pub description: String,
}

/// Raw detector output for one image.
///
/// Backends report service-level failures through `error` rather than
/// `Err`, mirroring how annotation APIs embed per-image errors in an
/// otherwise successful response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextDetection {
    /// Annotations ordered as returned; the first covers the whole image.
    pub annotations: Vec<TextAnnotation>,
    pub error: Option<String>,
}

/// Async trait implemented by each OCR backend.
#[async_trait::async_trait]
pub trait TextDetector: Send + Sync {
    fn name(&self) -> &str;
    async fn detect_text(&self, image: &[u8]) -> anyhow::Result<TextDetection>;
}

/// Recognize the text of one persisted image.
///
/// An image with no annotations yields an empty string.
pub async fn extract_text(
    detector: &dyn TextDetector,
    path: &Path,
) -> Result<String, EvaluateError> {
    let content = tokio::fs::read(path).await?;
    debug!("{}: detecting text in {:?} ({} bytes)", detector.name(), path, content.len());

    let detection = detector
        .detect_text(&content)
        .await
        .map_err(|e| EvaluateError::OcrService(format!("{:#}", e)))?;

    if let Some(message) = detection.error.filter(|m| !m.is_empty()) {
        return Err(EvaluateError::OcrService(message));
    }

    match detection.annotations.into_iter().next() {
        Some(top) => {
            info!("{}: recognized {} chars in {:?}", detector.name(), top.description.len(), path);
            Ok(top.description)
        }
        None => {
            info!("{}: no text found in {:?}", detector.name(), path);
            Ok(String::new())
        }
    }
}
