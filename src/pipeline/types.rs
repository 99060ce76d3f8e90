use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Opaque, unguessable identifier routing a candidate to their record.
pub type Token = String;

/// Generate a fresh candidate token.
pub fn new_token() -> Token {
    uuid::Uuid::new_v4().to_string()
}

/// One gated step of the hiring pipeline, in pipeline order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    IntakeMatch,
    CodingTest,
    TechInterview,
    HrInterview,
    Offer,
}

impl Stage {
    /// Stages reached through an emailed, token-addressed link.
    pub const LINKED: [Stage; 3] = [Stage::CodingTest, Stage::TechInterview, Stage::HrInterview];

    /// Key used in persisted field names (`<key>_completed`).
    pub fn key(self) -> &'static str {
        match self {
            Stage::IntakeMatch => "intake_match",
            Stage::CodingTest => "coding_test",
            Stage::TechInterview => "tech_interview",
            Stage::HrInterview => "hr_interview",
            Stage::Offer => "offer",
        }
    }

    /// URL path segment of the stage endpoint.
    pub fn route(self) -> &'static str {
        match self {
            Stage::IntakeMatch => "form",
            Stage::CodingTest => "coding-test",
            Stage::TechInterview => "tech-interview",
            Stage::HrInterview => "hr-interview",
            Stage::Offer => "offer-letter",
        }
    }

    pub fn next(self) -> Option<Stage> {
        match self {
            Stage::IntakeMatch => Some(Stage::CodingTest),
            Stage::CodingTest => Some(Stage::TechInterview),
            Stage::TechInterview => Some(Stage::HrInterview),
            Stage::HrInterview => Some(Stage::Offer),
            Stage::Offer => None,
        }
    }

    pub fn previous(self) -> Option<Stage> {
        match self {
            Stage::IntakeMatch => None,
            Stage::CodingTest => Some(Stage::IntakeMatch),
            Stage::TechInterview => Some(Stage::CodingTest),
            Stage::HrInterview => Some(Stage::TechInterview),
            Stage::Offer => Some(Stage::HrInterview),
        }
    }

    pub fn is_linked(self) -> bool {
        Self::LINKED.contains(&self)
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

/// The gate's binary verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Recommendation {
    Pass,
    Fail,
}

impl Recommendation {
    pub fn from_score(score: u8, threshold: u8) -> Self {
        if score >= threshold {
            Recommendation::Pass
        } else {
            Recommendation::Fail
        }
    }

    pub fn is_pass(self) -> bool {
        matches!(self, Recommendation::Pass)
    }
}

impl std::fmt::Display for Recommendation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Recommendation::Pass => write!(f, "PASS"),
            Recommendation::Fail => write!(f, "FAIL"),
        }
    }
}

/// Stored outcome of one stage evaluation. Immutable once written to a record.
///
/// Decoding is lenient: older stores hold whatever the model returned, so
/// float or numeric-string scores are rounded and clamped, the verdict is
/// matched case-insensitively and missing feedback reads as empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawAnalysis")]
pub struct Analysis {
    pub score: u8,
    pub feedback: String,
    pub recommendation: Recommendation,
}

impl Analysis {
    pub fn new(score: u8, feedback: impl Into<String>, recommendation: Recommendation) -> Self {
        Self {
            score: score.min(100),
            feedback: feedback.into(),
            recommendation,
        }
    }

    /// A zero-score FAIL, used whenever no trustworthy judgment exists.
    pub fn failed(feedback: impl Into<String>) -> Self {
        Self::new(0, feedback, Recommendation::Fail)
    }

    pub fn passed(&self) -> bool {
        self.recommendation.is_pass()
    }
}

#[derive(Deserialize)]
struct RawAnalysis {
    #[serde(default)]
    score: serde_json::Value,
    #[serde(default)]
    feedback: Option<String>,
    #[serde(default)]
    recommendation: Option<String>,
}

impl TryFrom<RawAnalysis> for Analysis {
    type Error = String;

    fn try_from(raw: RawAnalysis) -> Result<Self, Self::Error> {
        let score = lenient_score(&raw.score)?;
        let recommendation = match raw.recommendation.as_deref().map(str::trim) {
            Some(r) if r.eq_ignore_ascii_case("pass") => Recommendation::Pass,
            Some(r) if r.eq_ignore_ascii_case("fail") => Recommendation::Fail,
            None | Some("") => Recommendation::Fail,
            Some(other) => return Err(format!("unknown recommendation '{}'", other)),
        };
        Ok(Analysis::new(score, raw.feedback.unwrap_or_default(), recommendation))
    }
}

/// Score as an integer in 0..=100. Missing or null reads as 0.
fn lenient_score(value: &serde_json::Value) -> Result<u8, String> {
    let number = match value {
        serde_json::Value::Null => return Ok(0),
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match number {
        Some(n) if n.is_finite() => Ok(n.round().clamp(0.0, 100.0) as u8),
        _ => Err(format!("score {} is not a number", value)),
    }
}

/// Where a candidate currently sits in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStatus {
    Applied,
    Shortlisted,
    CodingPassed,
    TechPassed,
    Offered,
    Rejected,
}

impl PipelineStatus {
    /// Status reached by passing `stage`.
    pub fn after_pass(stage: Stage) -> Self {
        match stage {
            Stage::IntakeMatch => PipelineStatus::Shortlisted,
            Stage::CodingTest => PipelineStatus::CodingPassed,
            Stage::TechInterview => PipelineStatus::TechPassed,
            Stage::HrInterview | Stage::Offer => PipelineStatus::Offered,
        }
    }

    /// Status a record must hold for `stage` to accept an answer.
    pub fn awaiting(stage: Stage) -> Option<Self> {
        match stage {
            Stage::IntakeMatch => Some(PipelineStatus::Applied),
            Stage::CodingTest => Some(PipelineStatus::Shortlisted),
            Stage::TechInterview => Some(PipelineStatus::CodingPassed),
            Stage::HrInterview => Some(PipelineStatus::TechPassed),
            Stage::Offer => None,
        }
    }

}

impl std::fmt::Display for PipelineStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineStatus::Applied => write!(f, "applied"),
            PipelineStatus::Shortlisted => write!(f, "shortlisted"),
            PipelineStatus::CodingPassed => write!(f, "coding_passed"),
            PipelineStatus::TechPassed => write!(f, "tech_passed"),
            PipelineStatus::Offered => write!(f, "offered"),
            PipelineStatus::Rejected => write!(f, "rejected"),
        }
    }
}

impl std::str::FromStr for PipelineStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "applied" => Ok(PipelineStatus::Applied),
            "shortlisted" => Ok(PipelineStatus::Shortlisted),
            "coding_passed" => Ok(PipelineStatus::CodingPassed),
            "tech_passed" => Ok(PipelineStatus::TechPassed),
            "offered" => Ok(PipelineStatus::Offered),
            "rejected" => Ok(PipelineStatus::Rejected),
            _ => Err(format!(
                "Invalid status '{}'. Use: shortlisted, coding_passed, tech_passed, offered, rejected",
                s
            )),
        }
    }
}

/// One applicant's durable pipeline record.
///
/// Field names follow the persisted JSON layout. Completion flags default to
/// `false` so records written before completion tracking still load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateRecord {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub skills: String,
    #[serde(default)]
    pub resume_text: String,
    #[serde(
        default,
        deserialize_with = "lenient_timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub applied_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intake_analysis: Option<Analysis>,

    #[serde(default)]
    pub question: Option<String>,
    #[serde(default)]
    pub expected_output: Option<String>,
    #[serde(default)]
    pub tech_question: Option<String>,
    #[serde(default)]
    pub hr_question: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coding_analysis: Option<Analysis>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tech_analysis: Option<Analysis>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hr_analysis: Option<Analysis>,

    #[serde(default)]
    pub coding_test_completed: bool,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub coding_test_completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub tech_interview_completed: bool,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub tech_interview_completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub hr_interview_completed: bool,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub hr_interview_completed_at: Option<DateTime<Utc>>,

    /// Offer document as emailed; served again on every offer link visit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offer_letter: Option<String>,

    /// Fields this version does not know about, kept so a save never drops them.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Mutable view of the per-stage fields of a record.
pub struct StageSlot<'a> {
    pub question: &'a mut Option<String>,
    pub analysis: &'a mut Option<Analysis>,
    pub completed: &'a mut bool,
    pub completed_at: &'a mut Option<DateTime<Utc>>,
}

impl CandidateRecord {
    pub fn new(application: &Application, resume_text: String) -> Self {
        Self {
            name: application.name.clone(),
            email: application.email.clone(),
            skills: application.skills.clone(),
            resume_text,
            applied_at: Some(Utc::now()),
            intake_analysis: None,
            question: None,
            expected_output: None,
            tech_question: None,
            hr_question: None,
            coding_analysis: None,
            tech_analysis: None,
            hr_analysis: None,
            coding_test_completed: false,
            coding_test_completed_at: None,
            tech_interview_completed: false,
            tech_interview_completed_at: None,
            hr_interview_completed: false,
            hr_interview_completed_at: None,
            offer_letter: None,
            extra: serde_json::Map::new(),
        }
    }

    /// Per-stage fields, or `None` for stages without a link.
    pub fn slot_mut(&mut self, stage: Stage) -> Option<StageSlot<'_>> {
        match stage {
            Stage::CodingTest => Some(StageSlot {
                question: &mut self.question,
                analysis: &mut self.coding_analysis,
                completed: &mut self.coding_test_completed,
                completed_at: &mut self.coding_test_completed_at,
            }),
            Stage::TechInterview => Some(StageSlot {
                question: &mut self.tech_question,
                analysis: &mut self.tech_analysis,
                completed: &mut self.tech_interview_completed,
                completed_at: &mut self.tech_interview_completed_at,
            }),
            Stage::HrInterview => Some(StageSlot {
                question: &mut self.hr_question,
                analysis: &mut self.hr_analysis,
                completed: &mut self.hr_interview_completed,
                completed_at: &mut self.hr_interview_completed_at,
            }),
            Stage::IntakeMatch | Stage::Offer => None,
        }
    }

    pub fn question(&self, stage: Stage) -> Option<&str> {
        match stage {
            Stage::CodingTest => self.question.as_deref(),
            Stage::TechInterview => self.tech_question.as_deref(),
            Stage::HrInterview => self.hr_question.as_deref(),
            Stage::IntakeMatch | Stage::Offer => None,
        }
        .filter(|q| !q.trim().is_empty())
    }

    pub fn analysis(&self, stage: Stage) -> Option<&Analysis> {
        match stage {
            Stage::IntakeMatch => self.intake_analysis.as_ref(),
            Stage::CodingTest => self.coding_analysis.as_ref(),
            Stage::TechInterview => self.tech_analysis.as_ref(),
            Stage::HrInterview => self.hr_analysis.as_ref(),
            Stage::Offer => None,
        }
    }

    pub fn is_completed(&self, stage: Stage) -> bool {
        match stage {
            Stage::IntakeMatch => self.intake_analysis.is_some(),
            Stage::CodingTest => self.coding_test_completed,
            Stage::TechInterview => self.tech_interview_completed,
            Stage::HrInterview => self.hr_interview_completed,
            Stage::Offer => self.hr_analysis.as_ref().is_some_and(Analysis::passed),
        }
    }

    /// Every question pinned on this record, across stages.
    pub fn pinned_questions(&self) -> Vec<&str> {
        Stage::LINKED
            .iter()
            .filter_map(|stage| self.question(*stage))
            .collect()
    }

    /// Derive the pipeline status from the stored analyses.
    ///
    /// Any FAIL is absorbing, so a later PASS can never outrank it.
    pub fn status(&self) -> PipelineStatus {
        let failed = self
            .intake_analysis
            .iter()
            .chain(self.coding_analysis.iter())
            .chain(self.tech_analysis.iter())
            .chain(self.hr_analysis.iter())
            .any(|a| !a.passed());
        if failed {
            return PipelineStatus::Rejected;
        }

        let passed = |a: &Option<Analysis>| a.as_ref().is_some_and(Analysis::passed);
        if passed(&self.hr_analysis) {
            PipelineStatus::Offered
        } else if passed(&self.tech_analysis) {
            PipelineStatus::TechPassed
        } else if passed(&self.coding_analysis) {
            PipelineStatus::CodingPassed
        } else {
            PipelineStatus::Shortlisted
        }
    }

    /// Bring a record written by an older version up to the current shape.
    ///
    /// A stage with a stored analysis is finished regardless of its flag.
    /// Returns whether anything changed.
    pub fn upgrade_legacy(&mut self) -> bool {
        let mut changed = false;
        for stage in Stage::LINKED {
            if let Some(slot) = self.slot_mut(stage)
                && slot.analysis.is_some()
                && !*slot.completed
            {
                *slot.completed = true;
                changed = true;
            }
        }
        changed
    }
}

/// Accept RFC 3339 timestamps as well as naive ISO timestamps (read as UTC).
/// Unparseable values become `None` rather than failing the whole document.
fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.and_then(|s| {
        DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
            .or_else(|| {
                NaiveDateTime::parse_from_str(&s, "%Y-%m-%dT%H:%M:%S%.f")
                    .ok()
                    .map(|naive| naive.and_utc())
            })
    }))
}

/// An intake form submission, after resume upload handling.
#[derive(Debug, Clone, Default)]
pub struct Application {
    pub name: String,
    pub email: String,
    pub skills: String,
    pub resume: Option<ResumeUpload>,
}

impl Application {
    /// Check the required intake fields.
    pub fn validate(&self) -> Result<(), String> {
        let mut missing = Vec::new();
        if self.name.trim().is_empty() {
            missing.push("name");
        }
        if self.email.trim().is_empty() {
            missing.push("email");
        }
        if self.skills.trim().is_empty() {
            missing.push("skills");
        }
        if self
            .resume
            .as_ref()
            .is_none_or(|r| r.filename.trim().is_empty())
        {
            missing.push("resume");
        }
        if !missing.is_empty() {
            return Err(format!("All fields are required (missing: {})", missing.join(", ")));
        }
        if !self.email.contains('@') {
            return Err(format!("Invalid email address '{}'", self.email));
        }
        Ok(())
    }
}

/// The role candidates are screened against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobProfile {
    pub title: String,
    pub description: String,
    pub required_skills: Vec<String>,
    pub company: String,
}

impl Default for JobProfile {
    fn default() -> Self {
        Self {
            title: "Python Developer".to_string(),
            description: "Entry level Python developer".to_string(),
            required_skills: vec!["python".to_string()],
            company: "Hiring Team".to_string(),
        }
    }
}

/// Raw uploaded resume file.
#[derive(Debug, Clone)]
pub struct ResumeUpload {
    pub filename: String,
    pub bytes: Vec<u8>,
}

/// A candidate's submission for a linked stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Answer {
    Text(String),
    Code { code: String, language: String },
}

impl Answer {
    /// The free text handed to the evaluator.
    pub fn as_text(&self) -> &str {
        match self {
            Answer::Text(text) => text,
            Answer::Code { code, .. } => code,
        }
    }

    pub fn language(&self) -> Option<&str> {
        match self {
            Answer::Text(_) => None,
            Answer::Code { language, .. } => Some(language),
        }
    }
}
