//! Grammar and context correction of the transcribed essay.

use std::sync::Arc;

use tracing::{debug, error};

use crate::error::EvaluateError;
use crate::openai::{ChatModel, Message};
use crate::prompts;

pub struct Corrector {
    model: Arc<dyn ChatModel>,
}

impl Corrector {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self { model }
    }

    /// Return the model's corrected version of `text` verbatim.
    pub async fn correct(&self, text: &str) -> Result<String, EvaluateError> {
        debug!("Requesting correction for {} chars", text.len());

        let messages = vec![
            Message::system(prompts::CORRECTION_SYSTEM),
            Message::user(prompts::correction(text)),
        ];

        self.model.complete(messages).await.map_err(|e| {
            error!("Correction failed: {:#}", e);
            EvaluateError::CorrectionService(format!("{:#}", e))
        })
    }
}
