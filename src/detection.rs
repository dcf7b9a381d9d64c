//! Optional classification of the essay as machine- or human-authored.

use std::sync::Arc;

use tracing::error;

use crate::error::EvaluateError;
use crate::openai::{ChatModel, Message};
use crate::prompts;

pub struct AiDetector {
    model: Arc<dyn ChatModel>,
}

impl AiDetector {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self { model }
    }

    /// Free-text verdict: classification, confidence percentage and justification.
    pub async fn detect(&self, text: &str) -> Result<String, EvaluateError> {
        let messages = vec![
            Message::system(prompts::DETECTION_SYSTEM),
            Message::user(prompts::ai_detection(text)),
        ];

        self.model.complete(messages).await.map_err(|e| {
            error!("AI detection failed: {:#}", e);
            EvaluateError::DetectionService(format!("{:#}", e))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Verdict(Option<&'static str>);

    #[async_trait::async_trait]
    impl ChatModel for Verdict {
        async fn complete(&self, messages: Vec<Message>) -> anyhow::Result<String> {
            assert!(messages[1].content.ends_with("Redação:\n\nminha redação"));
            self.0
                .map(str::to_string)
                .ok_or_else(|| anyhow::anyhow!("connection reset"))
        }
    }

    #[tokio::test]
    async fn test_detect_returns_verdict() {
        let detector = AiDetector::new(Arc::new(Verdict(Some("Escrita por humano, 85%"))));
        assert_eq!(
            detector.detect("minha redação").await.unwrap(),
            "Escrita por humano, 85%"
        );
    }

    #[tokio::test]
    async fn test_detect_failure_is_classified() {
        let detector = AiDetector::new(Arc::new(Verdict(None)));
        let err = detector.detect("minha redação").await.unwrap_err();
        assert!(matches!(err, EvaluateError::DetectionService(_)));
    }
}
