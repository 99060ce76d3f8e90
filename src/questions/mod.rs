//! Stage question generation.
//!
//! Questions are produced once per token and stage, then pinned on the
//! record by the orchestrator. Sources are tried in order; the built-in
//! fallback guarantees every stage always gets a question.

pub mod llm;
pub mod pool;

pub use llm::LlmQuestionSource;
pub use pool::QuestionPool;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::pipeline::types::{CandidateRecord, Stage};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedQuestion {
    pub text: String,
    /// Only set for the coding stage.
    pub expected_output: Option<String>,
}

impl GeneratedQuestion {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            expected_output: None,
        }
    }

    pub fn with_expected(text: impl Into<String>, expected: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            expected_output: Some(expected.into()),
        }
    }
}

/// Somewhere questions come from.
#[async_trait]
pub trait QuestionSource: Send + Sync {
    fn name(&self) -> &str;

    async fn generate(&self, stage: Stage, token: &str, record: &CandidateRecord) -> anyhow::Result<GeneratedQuestion>;
}

/// The fixed question used when every source fails.
pub fn fallback_question(stage: Stage) -> GeneratedQuestion {
    match stage {
        Stage::CodingTest => GeneratedQuestion::with_expected(
            "Write a function to add two numbers and return the result.",
            "5 (for input 2, 3)",
        ),
        Stage::TechInterview => {
            GeneratedQuestion::new("Explain the difference between a list and a tuple in Python.")
        }
        Stage::HrInterview | Stage::IntakeMatch | Stage::Offer => GeneratedQuestion::new(
            "Tell me about a challenging situation you faced at work and how you handled it.",
        ),
    }
}

/// Ordered chain of question sources ending in the fixed fallback.
#[derive(Clone, Default)]
pub struct QuestionGenerator {
    sources: Vec<Arc<dyn QuestionSource>>,
}

impl QuestionGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_source(mut self, source: Arc<dyn QuestionSource>) -> Self {
        self.sources.push(source);
        self
    }

    pub fn source_names(&self) -> Vec<&str> {
        self.sources.iter().map(|s| s.name()).collect()
    }

    /// Produce a question for `stage`. Never fails.
    pub async fn generate(&self, stage: Stage, token: &str, record: &CandidateRecord) -> GeneratedQuestion {
        for source in &self.sources {
            match source.generate(stage, token, record).await {
                Ok(q) if !q.text.trim().is_empty() => {
                    debug!(token, %stage, source = source.name(), "Generated question");
                    return normalize(stage, q);
                }
                Ok(_) => warn!(token, %stage, source = source.name(), "Question source returned an empty question"),
                Err(e) => warn!(token, %stage, source = source.name(), "Question generation failed: {:#}", e),
            }
        }
        fallback_question(stage)
    }
}

/// Coding questions always carry an expected output; others never do.
fn normalize(stage: Stage, mut question: GeneratedQuestion) -> GeneratedQuestion {
    question.text = question.text.trim().to_string();
    if stage == Stage::CodingTest {
        let expected = question
            .expected_output
            .take()
            .map(|e| e.trim().to_string())
            .filter(|e| !e.is_empty());
        question.expected_output = Some(expected.unwrap_or_else(|| "Not specified".to_string()));
    } else {
        question.expected_output = None;
    }
    question
}
