use std::collections::BTreeMap;
use std::sync::Arc;

use axum::Json;
use axum::extract::{Multipart, Path, State};
use axum::response::{Html, Redirect};
use serde::{Deserialize, Serialize};

use crate::pipeline::types::ResumeUpload;
use crate::pipeline::{
    Analysis, Answer, Application, CandidateSummary, IntakeOutcome, OfferView, PipelineStatus,
    Recommendation, Stage, StageOutcome, StageView,
};

use super::AppState;
use super::errors::AppError;

const INVALID_LINK: &str = "Invalid or expired link.";
const UNVIEWED: &str = "Open the question before submitting an answer.";

const FORM_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"><title>Apply</title></head>
<body>
<h1>Job Application</h1>
<form action="/form" method="post" enctype="multipart/form-data">
  <p><label>Name <input type="text" name="name" required></label></p>
  <p><label>Email <input type="email" name="email" required></label></p>
  <p><label>Skills <textarea name="skills" required></textarea></label></p>
  <p><label>Resume (PDF, DOCX or TXT) <input type="file" name="resume" required></label></p>
  <p><button type="submit">Apply</button></p>
</form>
</body>
</html>
"#;

// --- Request/Response types ---

/// Stage submission. Coding answers arrive as `code` + `language`, the
/// interviews as `answer`; either field is accepted for any stage.
#[derive(Debug, Default, Deserialize)]
pub struct AnswerForm {
    #[serde(default)]
    pub answer: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
}

impl AnswerForm {
    fn into_answer(self, stage: Stage) -> Answer {
        if stage == Stage::CodingTest {
            Answer::Code {
                code: self.code.or(self.answer).unwrap_or_default(),
                language: self
                    .language
                    .filter(|l| !l.trim().is_empty())
                    .unwrap_or_else(|| "python".to_string()),
            }
        } else {
            Answer::Text(self.answer.or(self.code).unwrap_or_default())
        }
    }
}

#[derive(Debug, Serialize)]
pub struct IntakeResponse {
    pub status: String,
    pub message: String,
    pub score: u8,
    pub recommendation: Recommendation,
    pub feedback: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StageResponse {
    pub stage: Stage,
    pub completed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub question: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<PipelineStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recommendation: Option<Recommendation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_link: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

impl StageResponse {
    fn question(stage: Stage, question: String) -> Self {
        Self {
            stage,
            completed: false,
            question: Some(question),
            status: None,
            score: None,
            recommendation: None,
            feedback: None,
            next_link: None,
            warning: None,
        }
    }

    fn result(stage: Stage, analysis: Option<Analysis>, next_link: Option<String>) -> Self {
        let (score, recommendation, feedback) = match analysis {
            Some(a) => (Some(a.score), Some(a.recommendation), Some(a.feedback)),
            None => (None, None, None),
        };
        Self {
            stage,
            completed: true,
            question: None,
            status: None,
            score,
            recommendation,
            feedback,
            next_link,
            warning: None,
        }
    }
}

#[derive(Serialize)]
pub struct DebugStatesResponse {
    pub total_states: usize,
    pub tokens: Vec<String>,
    pub states: BTreeMap<String, CandidateSummary>,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

fn locked(status: PipelineStatus) -> AppError {
    AppError::Conflict(format!(
        "This stage is not available for your application (status: {}).",
        status
    ))
}

// --- Handlers ---

/// GET /
pub async fn index() -> Redirect {
    Redirect::to("/form")
}

/// GET /form
pub async fn form_page() -> Html<&'static str> {
    Html(FORM_PAGE)
}

/// POST /form
pub async fn submit_form(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<IntakeResponse>, AppError> {
    let mut application = Application::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("Invalid form data: {}", e)))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "resume" => {
                let filename = field.file_name().unwrap_or_default().to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::BadRequest(format!("Failed to read resume upload: {}", e)))?;
                if !filename.is_empty() {
                    application.resume = Some(ResumeUpload {
                        filename,
                        bytes: bytes.to_vec(),
                    });
                }
            }
            "name" | "email" | "skills" => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| AppError::BadRequest(format!("Invalid field '{}': {}", name, e)))?;
                let value = value.trim().to_string();
                match name.as_str() {
                    "name" => application.name = value,
                    "email" => application.email = value,
                    _ => application.skills = value,
                }
            }
            _ => {}
        }
    }

    let outcome = state.pipeline.intake(application).await?;
    let response = match outcome {
        IntakeOutcome::Shortlisted { analysis, warning, .. } => IntakeResponse {
            status: "shortlisted".to_string(),
            message: "You have been shortlisted! Check your email for the coding test link.".to_string(),
            score: analysis.score,
            recommendation: analysis.recommendation,
            feedback: analysis.feedback,
            warning,
        },
        IntakeOutcome::Rejected { analysis, warning } => IntakeResponse {
            status: "rejected".to_string(),
            message: "Thank you for applying. Unfortunately, you do not match our requirements at this time."
                .to_string(),
            score: analysis.score,
            recommendation: analysis.recommendation,
            feedback: analysis.feedback,
            warning,
        },
    };
    Ok(Json(response))
}

async fn view_stage(state: &AppState, token: &str, stage: Stage) -> Result<Json<StageResponse>, AppError> {
    match state.pipeline.view_stage(token, stage).await? {
        StageView::Question(question) => Ok(Json(StageResponse::question(stage, question))),
        StageView::Completed { analysis, next_link } => Ok(Json(StageResponse::result(stage, analysis, next_link))),
        StageView::Locked(status) => Err(locked(status)),
        StageView::Invalid => Err(AppError::NotFound(INVALID_LINK.to_string())),
    }
}

async fn submit_stage(
    state: &AppState,
    token: &str,
    stage: Stage,
    form: AnswerForm,
) -> Result<Json<StageResponse>, AppError> {
    let answer = form.into_answer(stage);
    match state.pipeline.submit_stage(token, stage, answer).await? {
        StageOutcome::Decided {
            analysis,
            status,
            next_link,
            warning,
        } => {
            let mut response = StageResponse::result(stage, Some(analysis), next_link);
            response.status = Some(status);
            response.warning = warning;
            Ok(Json(response))
        }
        StageOutcome::AlreadyCompleted { analysis, next_link } => {
            Ok(Json(StageResponse::result(stage, analysis, next_link)))
        }
        StageOutcome::Locked(status) => Err(locked(status)),
        StageOutcome::Unviewed => Err(AppError::Conflict(UNVIEWED.to_string())),
        StageOutcome::Invalid => Err(AppError::NotFound(INVALID_LINK.to_string())),
    }
}

/// GET /coding-test/{token}
pub async fn view_coding_test(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
) -> Result<Json<StageResponse>, AppError> {
    view_stage(&state, &token, Stage::CodingTest).await
}

/// POST /coding-test/{token}
pub async fn submit_coding_test(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
    axum::Form(form): axum::Form<AnswerForm>,
) -> Result<Json<StageResponse>, AppError> {
    submit_stage(&state, &token, Stage::CodingTest, form).await
}

/// GET /tech-interview/{token}
pub async fn view_tech_interview(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
) -> Result<Json<StageResponse>, AppError> {
    view_stage(&state, &token, Stage::TechInterview).await
}

/// POST /tech-interview/{token}
pub async fn submit_tech_interview(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
    axum::Form(form): axum::Form<AnswerForm>,
) -> Result<Json<StageResponse>, AppError> {
    submit_stage(&state, &token, Stage::TechInterview, form).await
}

/// GET /hr-interview/{token}
pub async fn view_hr_interview(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
) -> Result<Json<StageResponse>, AppError> {
    view_stage(&state, &token, Stage::HrInterview).await
}

/// POST /hr-interview/{token}
pub async fn submit_hr_interview(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
    axum::Form(form): axum::Form<AnswerForm>,
) -> Result<Json<StageResponse>, AppError> {
    submit_stage(&state, &token, Stage::HrInterview, form).await
}

/// GET /offer-letter/{token}
pub async fn offer_letter(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
) -> Result<Html<String>, AppError> {
    match state.pipeline.offer_letter(&token).await? {
        OfferView::Letter(html) => Ok(Html(html)),
        OfferView::NotAvailable => Err(AppError::Conflict(
            "Offer letter is not available for this application.".to_string(),
        )),
        OfferView::Invalid => Err(AppError::NotFound(INVALID_LINK.to_string())),
    }
}

/// GET /debug/states
pub async fn debug_states(State(state): State<Arc<AppState>>) -> Result<Json<DebugStatesResponse>, AppError> {
    let summaries = state.pipeline.snapshot().await?;
    let tokens = summaries.iter().map(|s| s.token.clone()).collect();
    let states: BTreeMap<_, _> = summaries.into_iter().map(|s| (s.token.clone(), s)).collect();
    Ok(Json(DebugStatesResponse {
        total_states: states.len(),
        tokens,
        states,
    }))
}

/// GET /health
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
