use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::pipeline::types::{CandidateRecord, Stage};
use crate::questions::{GeneratedQuestion, QuestionSource};

/// Static rotating question bank.
///
/// The starting position is derived from the token, so candidates spread
/// across the bank while one candidate always sees the same order. Questions
/// already pinned on the record are skipped.
#[derive(Debug, Clone)]
pub struct QuestionPool {
    coding: Vec<GeneratedQuestion>,
    technical: Vec<GeneratedQuestion>,
    hr: Vec<GeneratedQuestion>,
}

impl Default for QuestionPool {
    fn default() -> Self {
        let coding = [
            ("Write a function to add two numbers and return the result.", "5 (for input 2, 3)"),
            ("Write a function that returns the product of two numbers.", "6 (for input 2, 3)"),
            ("Write a function that returns the larger of two numbers.", "3 (for input 2, 3)"),
            ("Write a function that returns the difference of the second number minus the first.", "1 (for input 2, 3)"),
            ("Write a function that returns the sum of the squares of two numbers.", "13 (for input 2, 3)"),
        ];
        let technical = [
            "Explain the difference between a list and a tuple in Python.",
            "How does a dictionary lookup work in Python, and what makes a valid key?",
            "What is the difference between a shallow copy and a deep copy?",
            "Explain what a generator is and when you would use one instead of a list.",
            "How do exceptions propagate in Python, and when would you define your own exception type?",
        ];
        let hr = [
            "Tell me about a challenging situation you faced at work and how you handled it.",
            "Describe a time you disagreed with a teammate. How was it resolved?",
            "Tell me about a project you are proud of and the part you played in it.",
            "Describe a deadline you were at risk of missing and what you did about it.",
            "Tell me about a time you received critical feedback and how you responded.",
        ];
        Self {
            coding: coding
                .iter()
                .map(|(q, e)| GeneratedQuestion::with_expected(*q, *e))
                .collect(),
            technical: technical.iter().map(|q| GeneratedQuestion::new(*q)).collect(),
            hr: hr.iter().map(|q| GeneratedQuestion::new(*q)).collect(),
        }
    }
}

impl QuestionPool {
    pub fn new(
        coding: Vec<GeneratedQuestion>,
        technical: Vec<GeneratedQuestion>,
        hr: Vec<GeneratedQuestion>,
    ) -> Self {
        Self { coding, technical, hr }
    }

    fn bank(&self, stage: Stage) -> &[GeneratedQuestion] {
        match stage {
            Stage::CodingTest => &self.coding,
            Stage::TechInterview => &self.technical,
            Stage::HrInterview => &self.hr,
            Stage::IntakeMatch | Stage::Offer => &[],
        }
    }

    /// Deterministic pick for `token`, skipping questions the record already holds.
    pub fn pick(&self, stage: Stage, token: &str, record: &CandidateRecord) -> Option<GeneratedQuestion> {
        let bank = self.bank(stage);
        if bank.is_empty() {
            return None;
        }
        let start = (rotation_seed(token, stage) % bank.len() as u64) as usize;
        let pinned = record.pinned_questions();
        bank.iter()
            .cycle()
            .skip(start)
            .take(bank.len())
            .find(|q| !pinned.contains(&q.text.as_str()))
            .or_else(|| bank.get(start))
            .cloned()
    }
}

fn rotation_seed(token: &str, stage: Stage) -> u64 {
    let digest = Sha256::digest(format!("{}:{}", token, stage.key()).as_bytes());
    digest
        .iter()
        .take(8)
        .fold(0u64, |acc, byte| (acc << 8) | u64::from(*byte))
}

#[async_trait]
impl QuestionSource for QuestionPool {
    fn name(&self) -> &str {
        "pool"
    }

    async fn generate(&self, stage: Stage, token: &str, record: &CandidateRecord) -> anyhow::Result<GeneratedQuestion> {
        self.pick(stage, token, record)
            .ok_or_else(|| anyhow::anyhow!("No pooled questions for stage '{}'", stage))
    }
}
