//! Stage evaluation: turning free-text candidate input into a verdict.
//!
//! Two strategies sit behind [`Evaluator`]: the remote model
//! ([`LlmEvaluator`]) and a deterministic rubric scorer
//! ([`HeuristicEvaluator`]). [`GuardedEvaluator`] is the boundary the
//! pipeline calls; it always returns an [`Analysis`].

pub mod heuristic;
pub mod llm;

pub use heuristic::HeuristicEvaluator;
pub use llm::LlmEvaluator;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{info, warn};

use crate::llm::LlmError;
use crate::pipeline::types::{Analysis, Recommendation, Stage};

pub const DEFAULT_THRESHOLD: u8 = 80;

/// How a verdict is reached from an evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoringMode {
    /// Numeric 0-100 score; PASS at `score >= threshold`.
    Scored { threshold: u8 },
    /// Direct yes/no judgment, reported as a synthetic 100 or 0.
    Binary,
}

impl Default for ScoringMode {
    fn default() -> Self {
        ScoringMode::Scored {
            threshold: DEFAULT_THRESHOLD,
        }
    }
}

impl ScoringMode {
    pub fn threshold(self) -> u8 {
        match self {
            ScoringMode::Scored { threshold } => threshold,
            ScoringMode::Binary => DEFAULT_THRESHOLD,
        }
    }

    /// Make an analysis consistent with this mode.
    ///
    /// Scored mode recomputes the recommendation from the score. Binary mode
    /// collapses the score to 100 or 0.
    pub fn normalize(self, analysis: Analysis) -> Analysis {
        let recommendation = Recommendation::from_score(analysis.score, self.threshold());
        let score = match self {
            ScoringMode::Scored { .. } => analysis.score,
            ScoringMode::Binary if recommendation.is_pass() => 100,
            ScoringMode::Binary => 0,
        };
        Analysis::new(score, analysis.feedback, recommendation)
    }
}

/// Everything an evaluator may consult besides the question and the answer.
#[derive(Debug, Clone, Default)]
pub struct EvalContext {
    pub job_title: String,
    pub job_description: String,
    pub required_skills: Vec<String>,
    pub skills: String,
    pub resume_text: String,
    pub expected_output: Option<String>,
    pub run_output: Option<String>,
    pub language: Option<String>,
}

#[derive(Debug, Error)]
pub enum EvalError {
    /// The judging service could not be reached or refused for capacity.
    #[error("evaluator unavailable: {0}")]
    Unavailable(String),

    #[error("evaluator timed out after {0:?}")]
    TimedOut(Duration),

    /// The service answered, but not with a usable judgment.
    #[error("invalid judgment: {0}")]
    InvalidJudgment(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl EvalError {
    fn falls_back(&self) -> bool {
        matches!(self, EvalError::Unavailable(_) | EvalError::TimedOut(_))
    }
}

impl From<LlmError> for EvalError {
    fn from(err: LlmError) -> Self {
        match err {
            LlmError::Timeout(d) => EvalError::TimedOut(d),
            LlmError::Parse(_) | LlmError::EmptyContent => EvalError::InvalidJudgment(err.to_string()),
            e if e.is_unavailable() => EvalError::Unavailable(e.to_string()),
            e => EvalError::Other(anyhow::Error::new(e)),
        }
    }
}

/// A stage judgment strategy.
#[async_trait]
pub trait Evaluator: Send + Sync {
    fn name(&self) -> &str;

    async fn evaluate(
        &self,
        stage: Stage,
        question: &str,
        input: &str,
        ctx: &EvalContext,
    ) -> Result<Analysis, EvalError>;
}

/// Error boundary around the configured evaluator.
///
/// Unavailability and timeouts fall back to the rubric scorer; any other
/// failure becomes a zero-score FAIL carrying the error as feedback.
pub struct GuardedEvaluator {
    primary: Arc<dyn Evaluator>,
    fallback: HeuristicEvaluator,
    timeout: Duration,
    mode: ScoringMode,
}

impl GuardedEvaluator {
    pub fn new(primary: Arc<dyn Evaluator>, mode: ScoringMode, timeout: Duration) -> Self {
        Self {
            primary,
            fallback: HeuristicEvaluator::new(),
            timeout,
            mode,
        }
    }

    /// Rubric scoring only.
    pub fn heuristic(mode: ScoringMode) -> Self {
        Self::new(Arc::new(HeuristicEvaluator::new()), mode, Duration::from_secs(8))
    }

    pub fn mode(&self) -> ScoringMode {
        self.mode
    }

    pub fn primary_name(&self) -> &str {
        self.primary.name()
    }

    pub async fn evaluate(&self, stage: Stage, question: &str, input: &str, ctx: &EvalContext) -> Analysis {
        if stage != Stage::IntakeMatch && input.trim().is_empty() {
            return Analysis::failed("No answer was submitted.");
        }

        let attempt = tokio::time::timeout(self.timeout, self.primary.evaluate(stage, question, input, ctx)).await;
        let result = match attempt {
            Ok(result) => result,
            Err(_) => Err(EvalError::TimedOut(self.timeout)),
        };

        let analysis = match result {
            Ok(analysis) => analysis,
            Err(e) if e.falls_back() => {
                warn!(%stage, evaluator = self.primary.name(), "Evaluator degraded, using rubric fallback: {}", e);
                self.fallback.score(stage, question, input, ctx)
            }
            Err(e) => {
                warn!(%stage, evaluator = self.primary.name(), "Evaluation failed: {}", e);
                Analysis::failed(format!("Error during evaluation: {}", e))
            }
        };

        let analysis = self.mode.normalize(analysis);
        info!(
            %stage,
            score = analysis.score,
            recommendation = %analysis.recommendation,
            "Stage evaluated"
        );
        analysis
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scored_mode_recomputes_recommendation() {
        let mode = ScoringMode::default();
        let a = mode.normalize(Analysis::new(79, "close", Recommendation::Pass));
        assert_eq!(a.recommendation, Recommendation::Fail);
        assert_eq!(a.score, 79);
        let b = mode.normalize(Analysis::new(80, "ok", Recommendation::Fail));
        assert!(b.passed());
    }

    #[test]
    fn binary_mode_collapses_scores() {
        let a = ScoringMode::Binary.normalize(Analysis::new(85, "ok", Recommendation::Pass));
        assert_eq!((a.score, a.recommendation), (100, Recommendation::Pass));
        let b = ScoringMode::Binary.normalize(Analysis::new(40, "no", Recommendation::Pass));
        assert_eq!((b.score, b.recommendation), (0, Recommendation::Fail));
    }

    #[test]
    fn llm_errors_map_to_fallback_classes() {
        let quota: EvalError = LlmError::Api {
            status: 429,
            message: "insufficient_quota".into(),
        }
        .into();
        assert!(quota.falls_back());

        let denied: EvalError = LlmError::Api {
            status: 401,
            message: "bad key".into(),
        }
        .into();
        assert!(!denied.falls_back());

        let empty: EvalError = LlmError::EmptyContent.into();
        assert!(matches!(empty, EvalError::InvalidJudgment(_)));
    }
}
