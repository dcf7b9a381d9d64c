//! Two-stage essay evaluation: competency critique, then final score.

use std::sync::Arc;

use tracing::{debug, error};

use crate::error::EvaluateError;
use crate::openai::{ChatModel, Message};
use crate::prompts;

/// Both artifacts of an evaluation. Never partially filled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvaluationResult {
    pub competency_evaluation: String,
    pub final_score: String,
}

pub struct Evaluator {
    model: Arc<dyn ChatModel>,
}

impl Evaluator {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self { model }
    }

    /// Critique `text` against the competency rubric, then score the critique.
    pub async fn evaluate(
        &self,
        text: &str,
        aux_prompt: Option<&str>,
    ) -> Result<EvaluationResult, EvaluateError> {
        let competency_evaluation = self
            .ask(
                prompts::EVALUATION_SYSTEM,
                prompts::competency_evaluation(text, aux_prompt),
            )
            .await?;
        debug!("Competency critique: {} chars", competency_evaluation.len());

        let final_score = self
            .ask(
                prompts::SCORING_SYSTEM,
                prompts::final_score(&competency_evaluation),
            )
            .await?;

        Ok(EvaluationResult {
            competency_evaluation,
            final_score,
        })
    }

    async fn ask(&self, system: &str, prompt: String) -> Result<String, EvaluateError> {
        let messages = vec![Message::system(system), Message::user(prompt)];
        self.model.complete(messages).await.map_err(|e| {
            error!("Evaluation failed: {:#}", e);
            EvaluateError::EvaluationService(format!("{:#}", e))
        })
    }
}
