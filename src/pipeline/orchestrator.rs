//! The pipeline driver.
//!
//! Every stage request runs under the token's lock. Viewing a stage pins its
//! question; submitting runs gate check, evaluation against the pinned
//! question, pure transition, persistence, and finally effect dispatch. A
//! failed notification never undoes a decision.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::collaborators::{
    CodeRunner, DisabledRunner, FileResumeExtractor, LogMailer, Notifier, OfferLetters, ResumeExtractor,
};
use crate::evaluator::heuristic::RUN_FAILED_OUTPUT;
use crate::evaluator::{EvalContext, GuardedEvaluator, ScoringMode};
use crate::pipeline::gate::{LinkGate, LinkStatus};
use crate::pipeline::locks::TokenLocks;
use crate::pipeline::machine::{self, Effect};
use crate::pipeline::notices;
use crate::pipeline::types::{
    Analysis, Answer, Application, CandidateRecord, JobProfile, PipelineStatus, Stage, Token, new_token,
};
use crate::questions::{QuestionGenerator, QuestionPool};
use crate::storage::CandidateStore;

pub const NOTIFICATION_WARNING: &str =
    "Your result was recorded, but we could not send the follow-up email. Please contact the hiring team.";

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("{0}")]
    InvalidApplication(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntakeOutcome {
    Shortlisted {
        token: Token,
        analysis: Analysis,
        warning: Option<String>,
    },
    Rejected {
        analysis: Analysis,
        warning: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageView {
    Invalid,
    Locked(PipelineStatus),
    Completed {
        analysis: Option<Analysis>,
        next_link: Option<String>,
    },
    Question(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageOutcome {
    Invalid,
    Locked(PipelineStatus),
    /// The stage question was never shown, so there is nothing to answer yet.
    Unviewed,
    AlreadyCompleted {
        analysis: Option<Analysis>,
        next_link: Option<String>,
    },
    Decided {
        analysis: Analysis,
        status: PipelineStatus,
        next_link: Option<String>,
        warning: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OfferView {
    Invalid,
    NotAvailable,
    Letter(String),
}

/// One line of the pipeline overview.
#[derive(Debug, Clone, Serialize)]
pub struct CandidateSummary {
    pub token: Token,
    pub name: String,
    pub email: String,
    pub status: PipelineStatus,
    pub applied_at: Option<chrono::DateTime<Utc>>,
    pub coding_test_completed: bool,
    pub tech_interview_completed: bool,
    pub hr_interview_completed: bool,
}

impl CandidateSummary {
    pub fn new(token: &str, record: &CandidateRecord) -> Self {
        Self {
            token: token.to_string(),
            name: record.name.clone(),
            email: record.email.clone(),
            status: record.status(),
            applied_at: record.applied_at,
            coding_test_completed: record.is_completed(Stage::CodingTest),
            tech_interview_completed: record.is_completed(Stage::TechInterview),
            hr_interview_completed: record.is_completed(Stage::HrInterview),
        }
    }
}

pub struct PipelineBuilder {
    store: Arc<dyn CandidateStore>,
    evaluator: GuardedEvaluator,
    questions: QuestionGenerator,
    notifier: Arc<dyn Notifier>,
    resumes: Arc<dyn ResumeExtractor>,
    runner: Arc<dyn CodeRunner>,
    offers: OfferLetters,
    job: JobProfile,
    public_url: String,
}

impl PipelineBuilder {
    pub fn evaluator(mut self, evaluator: GuardedEvaluator) -> Self {
        self.evaluator = evaluator;
        self
    }

    pub fn questions(mut self, questions: QuestionGenerator) -> Self {
        self.questions = questions;
        self
    }

    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn resumes(mut self, resumes: Arc<dyn ResumeExtractor>) -> Self {
        self.resumes = resumes;
        self
    }

    pub fn runner(mut self, runner: Arc<dyn CodeRunner>) -> Self {
        self.runner = runner;
        self
    }

    pub fn offers(mut self, offers: OfferLetters) -> Self {
        self.offers = offers;
        self
    }

    pub fn job(mut self, job: JobProfile) -> Self {
        self.job = job;
        self
    }

    pub fn public_url(mut self, url: impl Into<String>) -> Self {
        self.public_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn build(self) -> Pipeline {
        Pipeline {
            gate: LinkGate::new(self.store.clone()),
            store: self.store,
            locks: TokenLocks::new(),
            evaluator: self.evaluator,
            questions: self.questions,
            notifier: self.notifier,
            resumes: self.resumes,
            runner: self.runner,
            offers: self.offers,
            job: self.job,
            public_url: self.public_url,
        }
    }
}

pub struct Pipeline {
    store: Arc<dyn CandidateStore>,
    gate: LinkGate,
    locks: TokenLocks,
    evaluator: GuardedEvaluator,
    questions: QuestionGenerator,
    notifier: Arc<dyn Notifier>,
    resumes: Arc<dyn ResumeExtractor>,
    runner: Arc<dyn CodeRunner>,
    offers: OfferLetters,
    job: JobProfile,
    public_url: String,
}

impl Pipeline {
    /// Start a pipeline with rubric scoring, pooled questions, logged mail
    /// and no code execution.
    pub fn builder(store: Arc<dyn CandidateStore>) -> PipelineBuilder {
        PipelineBuilder {
            store,
            evaluator: GuardedEvaluator::heuristic(ScoringMode::default()),
            questions: QuestionGenerator::new().with_source(Arc::new(QuestionPool::default())),
            notifier: Arc::new(LogMailer),
            resumes: Arc::new(FileResumeExtractor),
            runner: Arc::new(DisabledRunner),
            offers: OfferLetters::default(),
            job: JobProfile::default(),
            public_url: "http://localhost:5000".to_string(),
        }
    }

    pub fn job(&self) -> &JobProfile {
        &self.job
    }

    /// Absolute link to `stage` for `token`.
    pub fn link(&self, stage: Stage, token: &str) -> String {
        format!("{}/{}/{}", self.public_url, stage.route(), token)
    }

    fn eval_context(&self, record: &CandidateRecord) -> EvalContext {
        EvalContext {
            job_title: self.job.title.clone(),
            job_description: self.job.description.clone(),
            required_skills: self.job.required_skills.clone(),
            skills: record.skills.clone(),
            resume_text: record.resume_text.clone(),
            ..EvalContext::default()
        }
    }

    /// Handle an intake form submission: extract the resume, run the skill
    /// match and either open a pipeline record or send a rejection.
    pub async fn intake(&self, application: Application) -> Result<IntakeOutcome, PipelineError> {
        application.validate().map_err(PipelineError::InvalidApplication)?;

        let resume_text = match &application.resume {
            Some(upload) => self.resumes.extract(upload).await,
            None => String::new(),
        };
        let mut record = CandidateRecord::new(&application, resume_text);

        let ctx = self.eval_context(&record);
        let analysis = self
            .evaluator
            .evaluate(Stage::IntakeMatch, &self.job.description, &application.skills, &ctx)
            .await;
        let transition = machine::intake(&analysis);

        if transition.to == PipelineStatus::Rejected {
            info!(email = %record.email, score = analysis.score, "Application rejected at skill match");
            let warning = self.dispatch("", &record, &transition.effects).await;
            return Ok(IntakeOutcome::Rejected { analysis, warning });
        }

        let token = new_token();
        machine::apply(&mut record, Stage::IntakeMatch, analysis.clone(), Utc::now());
        {
            let _guard = self.locks.acquire(&token).await;
            self.persist(&token, &record).await;
        }
        info!(token = %token, score = analysis.score, "Candidate shortlisted");

        let warning = self.dispatch(&token, &record, &transition.effects).await;
        Ok(IntakeOutcome::Shortlisted {
            token,
            analysis,
            warning,
        })
    }

    /// Render a stage link without scoring anything. Pins the stage question
    /// on first view.
    pub async fn view_stage(&self, token: &str, stage: Stage) -> Result<StageView, PipelineError> {
        if !stage.is_linked() {
            return Ok(StageView::Invalid);
        }
        let _guard = self.locks.acquire(token).await;
        let check = self.gate.check(token, stage).await?;

        match (check.status, check.record) {
            (LinkStatus::Open, Some(mut record)) => {
                let question = self.pin_question(token, &mut record, stage).await;
                Ok(StageView::Question(question))
            }
            (LinkStatus::Completed(analysis), _) => {
                let next_link = self.next_link(token, stage, analysis.as_ref());
                Ok(StageView::Completed { analysis, next_link })
            }
            (LinkStatus::Locked(status), _) => Ok(StageView::Locked(status)),
            (LinkStatus::Invalid, _) | (LinkStatus::Open, None) => Ok(StageView::Invalid),
        }
    }

    /// Score an answer for an open stage and advance or reject the candidate.
    ///
    /// A stage that was already decided replays its stored analysis. An
    /// answer to a question that was never shown is refused.
    pub async fn submit_stage(&self, token: &str, stage: Stage, answer: Answer) -> Result<StageOutcome, PipelineError> {
        if !stage.is_linked() {
            return Ok(StageOutcome::Invalid);
        }
        let _guard = self.locks.acquire(token).await;
        let check = self.gate.check(token, stage).await?;

        let mut record = match (check.status, check.record) {
            (LinkStatus::Open, Some(record)) => record,
            (LinkStatus::Completed(analysis), _) => {
                info!(token, %stage, "Replaying completed stage");
                let next_link = self.next_link(token, stage, analysis.as_ref());
                return Ok(StageOutcome::AlreadyCompleted { analysis, next_link });
            }
            (LinkStatus::Locked(status), _) => return Ok(StageOutcome::Locked(status)),
            (LinkStatus::Invalid, _) | (LinkStatus::Open, None) => return Ok(StageOutcome::Invalid),
        };

        let Some(question) = record.question(stage).map(str::to_string) else {
            info!(token, %stage, "Refusing answer for a question that was never shown");
            return Ok(StageOutcome::Unviewed);
        };

        let mut ctx = self.eval_context(&record);
        if stage == Stage::CodingTest {
            let language = answer.language().unwrap_or("python").to_string();
            ctx.expected_output = record.expected_output.clone();
            ctx.run_output = Some(self.run_code(token, answer.as_text(), &language).await);
            ctx.language = Some(language);
        }

        let analysis = self.evaluator.evaluate(stage, &question, answer.as_text(), &ctx).await;
        let transition = machine::decide(&record, stage, &analysis).map_err(anyhow::Error::from)?;
        machine::apply(&mut record, stage, analysis.clone(), Utc::now());
        if transition.effects.iter().any(|e| matches!(e, Effect::Offer { .. })) {
            record.offer_letter = Some(self.offers.render(&record, &self.job).await);
        }
        self.persist(token, &record).await;

        info!(
            token,
            %stage,
            from = %transition.from,
            to = %transition.to,
            score = analysis.score,
            "Stage decided"
        );

        let warning = self.dispatch(token, &record, &transition.effects).await;
        let next_link = self.next_link(token, stage, Some(&analysis));
        Ok(StageOutcome::Decided {
            analysis,
            status: transition.to,
            next_link,
            warning,
        })
    }

    /// The offer document, only for candidates whose HR stage passed.
    ///
    /// Serves the letter pinned when the offer went out. Records that passed
    /// before letters were pinned get one rendered and pinned on first visit.
    pub async fn offer_letter(&self, token: &str) -> Result<OfferView, PipelineError> {
        let _guard = self.locks.acquire(token).await;
        let check = self.gate.check(token, Stage::Offer).await?;

        let mut record = match (check.status, check.record) {
            (LinkStatus::Completed(_), Some(record)) => record,
            (LinkStatus::Invalid, _) | (_, None) => return Ok(OfferView::Invalid),
            _ => return Ok(OfferView::NotAvailable),
        };
        if let Some(letter) = &record.offer_letter {
            return Ok(OfferView::Letter(letter.clone()));
        }

        let letter = self.offers.render(&record, &self.job).await;
        record.offer_letter = Some(letter.clone());
        self.persist(token, &record).await;
        info!(token, "Pinned offer letter");
        Ok(OfferView::Letter(letter))
    }

    /// Overview of every record, ordered by token.
    pub async fn snapshot(&self) -> Result<Vec<CandidateSummary>, PipelineError> {
        let records = self.store.all().await?;
        Ok(records
            .iter()
            .map(|(token, record)| CandidateSummary::new(token, record))
            .collect())
    }

    fn next_link(&self, token: &str, stage: Stage, analysis: Option<&Analysis>) -> Option<String> {
        let next = stage.next()?;
        analysis
            .filter(|a| a.passed())
            .map(|_| self.link(next, token))
    }

    async fn pin_question(&self, token: &str, record: &mut CandidateRecord, stage: Stage) -> String {
        if let Some(question) = record.question(stage) {
            return question.to_string();
        }

        let generated = self.questions.generate(stage, token, record).await;
        if let Some(slot) = record.slot_mut(stage) {
            *slot.question = Some(generated.text.clone());
        }
        if stage == Stage::CodingTest && record.expected_output.is_none() {
            record.expected_output = generated.expected_output.clone();
        }
        self.persist(token, record).await;
        info!(token, %stage, "Pinned stage question");
        generated.text
    }

    async fn run_code(&self, token: &str, code: &str, language: &str) -> String {
        match self.runner.run(code, language).await {
            Ok(output) => output,
            Err(e) => {
                warn!(token, runner = self.runner.name(), "Code execution failed: {:#}", e);
                RUN_FAILED_OUTPUT.to_string()
            }
        }
    }

    async fn persist(&self, token: &str, record: &CandidateRecord) {
        if let Err(e) = self.store.put(token, record.clone()).await {
            error!(token, "Failed to persist candidate record: {:#}", e);
        }
    }

    /// Execute requested effects. Returns a warning for the caller when any
    /// of them failed.
    async fn dispatch(&self, token: &str, record: &CandidateRecord, effects: &[Effect]) -> Option<String> {
        let signature = self.job.company.as_str();
        let mut failed = false;

        for effect in effects {
            let email = match effect {
                Effect::Invite(stage) => {
                    let passed = stage
                        .previous()
                        .filter(|p| p.is_linked())
                        .and_then(|p| record.analysis(p).map(|a| (p, a.score)));
                    notices::invitation(record, *stage, &self.link(*stage, token), passed, signature)
                }
                Effect::Reject { stage, score } => notices::rejection(record, *stage, *score, signature),
                Effect::Offer { score } => {
                    let letter = match &record.offer_letter {
                        Some(letter) => letter.clone(),
                        None => self.offers.render(record, &self.job).await,
                    };
                    notices::offer(record, *score, &letter, &self.link(Stage::Offer, token), signature)
                }
            };

            if let Err(e) = self.notifier.send(&email).await {
                warn!(
                    token,
                    notifier = self.notifier.name(),
                    subject = %email.subject,
                    "Notification failed: {:#}",
                    e
                );
                failed = true;
            }
        }

        failed.then(|| NOTIFICATION_WARNING.to_string())
    }
}
