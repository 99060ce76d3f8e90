use async_trait::async_trait;
use jsonschema::Validator;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

use crate::evaluator::{EvalContext, EvalError, Evaluator, ScoringMode};
use crate::llm::{LlmClient, extract_json_object, strip_json_fences};
use crate::pipeline::types::{Analysis, Recommendation, Stage};

const SYSTEM_PROMPT: &str = "You are a strict, fair technical recruiter scoring one step of a hiring \
pipeline. Judge only the material provided. Reply with a single JSON object and nothing else.";

#[derive(Debug, Deserialize)]
struct ScoredJudgment {
    score: f64,
    feedback: String,
}

#[derive(Debug, Deserialize)]
struct BinaryJudgment {
    verdict: String,
    #[serde(default)]
    feedback: String,
}

/// Evaluator backed by the remote chat model.
pub struct LlmEvaluator {
    client: LlmClient,
    mode: ScoringMode,
    validator: Validator,
}

impl LlmEvaluator {
    pub fn new(client: LlmClient, mode: ScoringMode) -> anyhow::Result<Self> {
        let validator = jsonschema::validator_for(&judgment_schema(mode))
            .map_err(|e| anyhow::anyhow!("Invalid judgment schema: {}", e))?;
        Ok(Self {
            client,
            mode,
            validator,
        })
    }

    /// Turn a raw model reply into an analysis, or explain why it cannot be.
    pub fn parse_reply(&self, reply: &str) -> Result<Analysis, EvalError> {
        let body = extract_json_object(reply).unwrap_or_else(|| strip_json_fences(reply));
        let value: Value = match serde_json::from_str(body) {
            Ok(value) => value,
            Err(e) => {
                if self.mode == ScoringMode::Binary
                    && let Some(analysis) = leading_verdict(reply)
                {
                    return Ok(analysis);
                }
                return Err(EvalError::InvalidJudgment(format!("reply is not JSON: {}", e)));
            }
        };

        let errors: Vec<String> = self
            .validator
            .iter_errors(&value)
            .map(|e| format!("{} at {}", e, e.instance_path()))
            .collect();
        if !errors.is_empty() {
            return Err(EvalError::InvalidJudgment(errors.join("; ")));
        }

        match self.mode {
            ScoringMode::Scored { threshold } => {
                let judgment: ScoredJudgment = serde_json::from_value(value)
                    .map_err(|e| EvalError::InvalidJudgment(e.to_string()))?;
                let score = judgment.score.round().clamp(0.0, 100.0) as u8;
                Ok(Analysis::new(
                    score,
                    judgment.feedback,
                    Recommendation::from_score(score, threshold),
                ))
            }
            ScoringMode::Binary => {
                let judgment: BinaryJudgment = serde_json::from_value(value)
                    .map_err(|e| EvalError::InvalidJudgment(e.to_string()))?;
                let pass = judgment.verdict.eq_ignore_ascii_case("yes");
                Ok(binary_analysis(pass, judgment.feedback))
            }
        }
    }

    fn prompt(&self, stage: Stage, question: &str, input: &str, ctx: &EvalContext) -> String {
        let material = match stage {
            Stage::IntakeMatch => format!(
                "Step: resume screening for the role '{}'.\n\nJob description:\n{}\n\nRequired skills: {}\n\n\
                 Candidate skills:\n{}\n\nCandidate resume:\n{}",
                ctx.job_title,
                ctx.job_description,
                ctx.required_skills.join(", "),
                ctx.skills,
                ctx.resume_text
            ),
            Stage::CodingTest => format!(
                "Step: coding test.\n\nQuestion:\n{}\n\nExpected output:\n{}\n\nCandidate code ({}):\n{}\n\n\
                 Output of running the code:\n{}",
                question,
                ctx.expected_output.as_deref().unwrap_or("(not specified)"),
                ctx.language.as_deref().unwrap_or("unspecified language"),
                input,
                ctx.run_output.as_deref().unwrap_or("(not executed)")
            ),
            Stage::TechInterview => format!(
                "Step: technical interview for the role '{}'.\n\nQuestion:\n{}\n\nCandidate answer:\n{}\n\n\
                 Judge correctness, depth and clarity.",
                ctx.job_title, question, input
            ),
            Stage::HrInterview | Stage::Offer => format!(
                "Step: HR interview.\n\nQuestion:\n{}\n\nCandidate answer:\n{}\n\n\
                 Judge communication, ownership, teamwork and problem solving.",
                question, input
            ),
        };

        let format = match self.mode {
            ScoringMode::Scored { .. } => {
                "Respond with JSON: {\"score\": <integer 0-100>, \"feedback\": \"<two or three sentences>\", \
                 \"recommendation\": \"PASS\" or \"FAIL\"}"
            }
            ScoringMode::Binary => {
                "Respond with JSON: {\"verdict\": \"yes\" or \"no\", \"feedback\": \"<one or two sentences>\"}"
            }
        };
        format!("{}\n\n{}", material, format)
    }
}

#[async_trait]
impl Evaluator for LlmEvaluator {
    fn name(&self) -> &str {
        "llm"
    }

    async fn evaluate(
        &self,
        stage: Stage,
        question: &str,
        input: &str,
        ctx: &EvalContext,
    ) -> Result<Analysis, EvalError> {
        let prompt = self.prompt(stage, question, input, ctx);
        let reply = self.client.complete(SYSTEM_PROMPT, &prompt).await?;
        debug!(%stage, reply_len = reply.len(), "Received judgment");
        self.parse_reply(&reply)
    }
}

fn judgment_schema(mode: ScoringMode) -> Value {
    match mode {
        ScoringMode::Scored { .. } => json!({
            "type": "object",
            "required": ["score", "feedback"],
            "properties": {
                "score": { "type": "number", "minimum": 0, "maximum": 100 },
                "feedback": { "type": "string" },
                "recommendation": { "type": "string" }
            }
        }),
        ScoringMode::Binary => json!({
            "type": "object",
            "required": ["verdict"],
            "properties": {
                "verdict": { "enum": ["yes", "no", "Yes", "No", "YES", "NO"] },
                "feedback": { "type": "string" }
            }
        }),
    }
}

fn binary_analysis(pass: bool, feedback: String) -> Analysis {
    if pass {
        Analysis::new(100, feedback, Recommendation::Pass)
    } else {
        Analysis::new(0, feedback, Recommendation::Fail)
    }
}

/// Plain-text "Yes, because..." / "No. ..." replies.
fn leading_verdict(reply: &str) -> Option<Analysis> {
    let trimmed = reply.trim();
    let word: String = trimmed
        .chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect::<String>()
        .to_ascii_lowercase();
    match word.as_str() {
        "yes" => Some(binary_analysis(true, trimmed.to_string())),
        "no" => Some(binary_analysis(false, trimmed.to_string())),
        _ => None,
    }
}
