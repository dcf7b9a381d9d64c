//! Request pipeline: intake, extraction, correction, detection, evaluation.

use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use tracing::{error, info};

use crate::correction::Corrector;
use crate::detection::AiDetector;
use crate::error::EvaluateError;
use crate::evaluation::Evaluator;
use crate::intake::{ScratchBatch, UploadedImage};
use crate::ocr::{self, TextDetector};
use crate::openai::ChatModel;

/// Parsed `/evaluate` request.
#[derive(Debug, Clone, Default)]
pub struct EvaluationForm {
    pub images: Vec<UploadedImage>,
    pub aux_prompt: Option<String>,
    pub ai_detection: bool,
}

/// JSON body of a successful evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResponseEnvelope {
    pub competency_evaluation: String,
    pub final_score: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ai_detection: Option<String>,
}

/// Sequences the service calls for one request at a time.
pub struct Pipeline {
    detector: Arc<dyn TextDetector>,
    corrector: Corrector,
    evaluator: Evaluator,
    ai_detector: AiDetector,
    upload_dir: PathBuf,
}

impl Pipeline {
    pub fn new(
        detector: Arc<dyn TextDetector>,
        model: Arc<dyn ChatModel>,
        upload_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            detector,
            corrector: Corrector::new(model.clone()),
            evaluator: Evaluator::new(model.clone()),
            ai_detector: AiDetector::new(model),
            upload_dir: upload_dir.into(),
        }
    }

    /// Run a full evaluation. Scratch files are gone when this returns.
    pub async fn run(&self, form: EvaluationForm) -> Result<ResponseEnvelope, EvaluateError> {
        if form.images.is_empty() {
            return Err(EvaluateError::NoImages);
        }

        let batch = ScratchBatch::persist(&self.upload_dir, &form.images).await?;
        info!("Accepted {} images for evaluation", batch.len());

        let result = self.process(&batch, &form).await;
        batch.cleanup().await;

        if let Err(e) = &result {
            error!("Evaluation request failed: {}", e);
        }
        result
    }

    async fn process(
        &self,
        batch: &ScratchBatch,
        form: &EvaluationForm,
    ) -> Result<ResponseEnvelope, EvaluateError> {
        let texts = self.extract_all(batch).await?;
        let combined = texts.join("\n\n");
        info!("Extracted {} chars from {} images", combined.len(), texts.len());

        let corrected = self.corrector.correct(&combined).await?;

        let ai_detection = if form.ai_detection {
            Some(self.ai_detector.detect(&corrected).await?)
        } else {
            None
        };

        let evaluation = self
            .evaluator
            .evaluate(&corrected, form.aux_prompt.as_deref())
            .await?;

        Ok(ResponseEnvelope {
            competency_evaluation: evaluation.competency_evaluation,
            final_score: evaluation.final_score,
            ai_detection,
        })
    }

    /// One text per persisted image, in upload order.
    async fn extract_all(&self, batch: &ScratchBatch) -> Result<Vec<String>, EvaluateError> {
        let mut texts = Vec::with_capacity(batch.len());
        for path in batch.paths() {
            texts.push(ocr::extract_text(self.detector.as_ref(), path).await?);
        }
        Ok(texts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ocr::{TextAnnotation, TextDetection};
    use crate::openai::Message;
    use std::collections::VecDeque;
    use std::path::Path;
    use std::sync::Mutex;

    /// Returns queued detections in call order and counts calls.
    #[derive(Default)]
    struct FakeDetector {
        queue: Mutex<VecDeque<anyhow::Result<TextDetection>>>,
        calls: Mutex<usize>,
    }

    impl FakeDetector {
        fn with_texts(texts: &[&str]) -> Arc<Self> {
            let detector = Self::default();
            for text in texts {
                detector.push(Ok(TextDetection {
                    annotations: vec![TextAnnotation {
                        description: text.to_string(),
                    }],
                    error: None,
                }));
            }
            Arc::new(detector)
        }

        fn push(&self, item: anyhow::Result<TextDetection>) {
            self.queue.lock().unwrap().push_back(item);
        }

        fn calls(&self) -> usize {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait::async_trait]
    impl TextDetector for FakeDetector {
        fn name(&self) -> &str {
            "fake"
        }

        async fn detect_text(&self, _image: &[u8]) -> anyhow::Result<TextDetection> {
            *self.calls.lock().unwrap() += 1;
            self.queue
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(TextDetection::default()))
        }
    }

    /// Answers by system role so the stage of each call is visible.
    #[derive(Default)]
    struct FakeModel {
        fail_system: Option<&'static str>,
        calls: Mutex<Vec<Vec<Message>>>,
    }

    impl FakeModel {
        fn failing_on(system: &'static str) -> Arc<Self> {
            Arc::new(Self {
                fail_system: Some(system),
                ..Default::default()
            })
        }

        fn systems(&self) -> Vec<String> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .map(|m| m[0].content.clone())
                .collect()
        }

        fn user_prompt(&self, index: usize) -> String {
            self.calls.lock().unwrap()[index][1].content.clone()
        }
    }

    #[async_trait::async_trait]
    impl ChatModel for FakeModel {
        async fn complete(&self, messages: Vec<Message>) -> anyhow::Result<String> {
            let system = messages[0].content.clone();
            self.calls.lock().unwrap().push(messages);
            if self.fail_system == Some(system.as_str()) {
                anyhow::bail!("{} failed", system);
            }
            Ok(match system.as_str() {
                crate::prompts::CORRECTION_SYSTEM => "corrected essay",
                crate::prompts::EVALUATION_SYSTEM => "competency critique",
                crate::prompts::SCORING_SYSTEM => "score 920",
                crate::prompts::DETECTION_SYSTEM => "human, 90%",
                _ => "unexpected",
            }
            .to_string())
        }
    }

    fn png(name: &str) -> UploadedImage {
        UploadedImage::new(name, b"png bytes".to_vec())
    }

    fn form(images: Vec<UploadedImage>, ai_detection: bool) -> EvaluationForm {
        EvaluationForm {
            images,
            aux_prompt: None,
            ai_detection,
        }
    }

    fn residual_files(dir: &Path) -> usize {
        std::fs::read_dir(dir).unwrap().count()
    }

    #[tokio::test]
    async fn test_combined_text_reaches_correction_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let detector = FakeDetector::with_texts(&["Hello", "World"]);
        let model = Arc::new(FakeModel::default());
        let pipeline = Pipeline::new(detector.clone(), model.clone(), dir.path());

        let response = pipeline
            .run(form(vec![png("a.png"), png("b.png")], false))
            .await
            .unwrap();

        assert_eq!(detector.calls(), 2);
        assert_eq!(model.user_prompt(0), crate::prompts::correction("Hello\n\nWorld"));
        assert_eq!(response.competency_evaluation, "competency critique");
        assert_eq!(response.final_score, "score 920");
        assert_eq!(residual_files(dir.path()), 0);
    }

    #[tokio::test]
    async fn test_one_text_per_image_in_upload_order() {
        let dir = tempfile::tempdir().unwrap();
        let detector = FakeDetector::with_texts(&["first", "second", "third"]);
        let pipeline = Pipeline::new(detector, Arc::new(FakeModel::default()), dir.path());

        let batch = ScratchBatch::persist(dir.path(), &[png("1.png"), png("2.jpg"), png("3.jpeg")])
            .await
            .unwrap();
        let texts = pipeline.extract_all(&batch).await.unwrap();
        batch.cleanup().await;

        assert_eq!(texts, vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn test_no_annotations_proceeds_with_empty_text() {
        let dir = tempfile::tempdir().unwrap();
        let detector = Arc::new(FakeDetector::default());
        detector.push(Ok(TextDetection::default()));
        let model = Arc::new(FakeModel::default());
        let pipeline = Pipeline::new(detector, model.clone(), dir.path());

        pipeline.run(form(vec![png("blank.png")], false)).await.unwrap();

        assert_eq!(model.user_prompt(0), crate::prompts::correction(""));
    }

    #[tokio::test]
    async fn test_no_images_makes_no_service_calls() {
        let dir = tempfile::tempdir().unwrap();
        let detector = Arc::new(FakeDetector::default());
        let model = Arc::new(FakeModel::default());
        let pipeline = Pipeline::new(detector.clone(), model.clone(), dir.path());

        let err = pipeline.run(form(vec![], false)).await.unwrap_err();

        assert!(matches!(err, EvaluateError::NoImages));
        assert_eq!(err.status_code(), axum::http::StatusCode::BAD_REQUEST);
        assert_eq!(detector.calls(), 0);
        assert!(model.systems().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_type_leaves_no_files_and_no_calls() {
        let dir = tempfile::tempdir().unwrap();
        let detector = Arc::new(FakeDetector::default());
        let model = Arc::new(FakeModel::default());
        let pipeline = Pipeline::new(detector.clone(), model.clone(), dir.path());

        let err = pipeline
            .run(form(vec![png("a.png"), png("b.jpg"), png("c.bmp")], false))
            .await
            .unwrap_err();

        assert!(matches!(err, EvaluateError::InvalidFileType(ref n) if n == "c.bmp"));
        assert_eq!(err.status_code(), axum::http::StatusCode::BAD_REQUEST);
        assert_eq!(residual_files(dir.path()), 0);
        assert_eq!(detector.calls(), 0);
        assert!(model.systems().is_empty());
    }

    #[tokio::test]
    async fn test_detection_absent_unless_requested() {
        let dir = tempfile::tempdir().unwrap();
        let model = Arc::new(FakeModel::default());
        let pipeline = Pipeline::new(
            FakeDetector::with_texts(&["texto"]),
            model.clone(),
            dir.path(),
        );

        let response = pipeline.run(form(vec![png("a.png")], false)).await.unwrap();
        let json = serde_json::to_value(&response).unwrap();

        assert!(json.get("ai_detection").is_none());
        assert_eq!(json["competency_evaluation"], "competency critique");
        assert_eq!(json["final_score"], "score 920");
        assert!(!model
            .systems()
            .contains(&crate::prompts::DETECTION_SYSTEM.to_string()));
    }

    #[tokio::test]
    async fn test_detection_included_when_requested() {
        let dir = tempfile::tempdir().unwrap();
        let model = Arc::new(FakeModel::default());
        let pipeline = Pipeline::new(
            FakeDetector::with_texts(&["texto"]),
            model.clone(),
            dir.path(),
        );

        let response = pipeline.run(form(vec![png("a.png")], true)).await.unwrap();
        let json = serde_json::to_value(&response).unwrap();

        assert_eq!(json["ai_detection"], "human, 90%");
        assert_eq!(json["competency_evaluation"], "competency critique");
        assert_eq!(json["final_score"], "score 920");
        assert_eq!(
            model.systems(),
            vec![
                crate::prompts::CORRECTION_SYSTEM,
                crate::prompts::DETECTION_SYSTEM,
                crate::prompts::EVALUATION_SYSTEM,
                crate::prompts::SCORING_SYSTEM,
            ]
        );
        assert_eq!(model.user_prompt(1), crate::prompts::ai_detection("corrected essay"));
    }

    #[tokio::test]
    async fn test_aux_prompt_reaches_evaluation() {
        let dir = tempfile::tempdir().unwrap();
        let model = Arc::new(FakeModel::default());
        let pipeline = Pipeline::new(
            FakeDetector::with_texts(&["texto"]),
            model.clone(),
            dir.path(),
        );

        let mut request = form(vec![png("a.png")], false);
        request.aux_prompt = Some("Considere o tema X.".to_string());
        pipeline.run(request).await.unwrap();

        assert_eq!(
            model.user_prompt(1),
            crate::prompts::competency_evaluation("corrected essay", Some("Considere o tema X."))
        );
    }

    #[tokio::test]
    async fn test_ocr_failure_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let detector = FakeDetector::with_texts(&["ok"]);
        detector.push(Ok(TextDetection {
            annotations: vec![],
            error: Some("Bad image data.".to_string()),
        }));
        let model = Arc::new(FakeModel::default());
        let pipeline = Pipeline::new(detector.clone(), model.clone(), dir.path());

        let err = pipeline
            .run(form(vec![png("a.png"), png("b.png"), png("c.png")], false))
            .await
            .unwrap_err();

        assert!(matches!(err, EvaluateError::OcrService(ref m) if m == "Bad image data."));
        assert_eq!(err.status_code(), axum::http::StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(detector.calls(), 2);
        assert!(model.systems().is_empty());
        assert_eq!(residual_files(dir.path()), 0);
    }

    #[tokio::test]
    async fn test_every_stage_failure_cleans_up() {
        let stages = [
            crate::prompts::CORRECTION_SYSTEM,
            crate::prompts::DETECTION_SYSTEM,
            crate::prompts::EVALUATION_SYSTEM,
            crate::prompts::SCORING_SYSTEM,
        ];

        for stage in stages {
            let dir = tempfile::tempdir().unwrap();
            let pipeline = Pipeline::new(
                FakeDetector::with_texts(&["a", "b"]),
                FakeModel::failing_on(stage),
                dir.path(),
            );

            let err = pipeline
                .run(form(vec![png("a.png"), png("b.png")], true))
                .await
                .unwrap_err();

            let expected = match stage {
                crate::prompts::CORRECTION_SYSTEM => {
                    matches!(err, EvaluateError::CorrectionService(_))
                }
                crate::prompts::DETECTION_SYSTEM => {
                    matches!(err, EvaluateError::DetectionService(_))
                }
                _ => matches!(err, EvaluateError::EvaluationService(_)),
            };
            assert!(expected, "stage {} produced {:?}", stage, err);
            assert_eq!(err.status_code(), axum::http::StatusCode::INTERNAL_SERVER_ERROR);
            assert_eq!(residual_files(dir.path()), 0, "residual files after {}", stage);
        }
    }
}
