use async_trait::async_trait;
use serde::Deserialize;

use crate::llm::LlmClient;
use crate::pipeline::types::{CandidateRecord, JobProfile, Stage};
use crate::questions::{GeneratedQuestion, QuestionSource};

const SYSTEM_PROMPT: &str =
    "You write interview questions for a hiring pipeline. Reply with a single JSON object and nothing else.";

#[derive(Debug, Deserialize)]
struct QuestionReply {
    question: String,
    #[serde(default)]
    expected_output: Option<String>,
}

/// Question source asking the chat model for a fresh question.
pub struct LlmQuestionSource {
    client: LlmClient,
    job: JobProfile,
}

impl LlmQuestionSource {
    pub fn new(client: LlmClient, job: JobProfile) -> Self {
        Self { client, job }
    }

    fn prompt(&self, stage: Stage, record: &CandidateRecord) -> String {
        let avoid = record.pinned_questions();
        let avoid = if avoid.is_empty() {
            String::new()
        } else {
            format!("\n\nDo not repeat any of these questions:\n- {}", avoid.join("\n- "))
        };

        match stage {
            Stage::CodingTest => format!(
                "Write one easy coding question for a {} interview. The solution must read two integers \
                 from standard input (\"2 3\") and print a single result. Reply with JSON: \
                 {{\"question\": \"...\", \"expected_output\": \"<output for input 2 3>\"}}{}",
                self.job.title, avoid
            ),
            Stage::TechInterview => {
                let resume: String = record.resume_text.chars().take(2000).collect();
                format!(
                    "Write one technical interview question for a {} candidate.\n\nJob description:\n{}\n\n\
                     Candidate skills: {}\n\nResume excerpt:\n{}\n\nReply with JSON: {{\"question\": \"...\"}}{}",
                    self.job.title, self.job.description, record.skills, resume, avoid
                )
            }
            Stage::HrInterview | Stage::IntakeMatch | Stage::Offer => format!(
                "Write one behavioural HR interview question for a {} candidate that asks about a real \
                 past situation. Reply with JSON: {{\"question\": \"...\"}}{}",
                self.job.title, avoid
            ),
        }
    }
}

#[async_trait]
impl QuestionSource for LlmQuestionSource {
    fn name(&self) -> &str {
        "llm"
    }

    async fn generate(&self, stage: Stage, _token: &str, record: &CandidateRecord) -> anyhow::Result<GeneratedQuestion> {
        let prompt = self.prompt(stage, record);
        let reply: QuestionReply = self.client.complete_json(SYSTEM_PROMPT, &prompt).await?;
        Ok(GeneratedQuestion {
            text: reply.question,
            expected_output: reply.expected_output,
        })
    }
}
