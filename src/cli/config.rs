use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context as _, Result};
use serde::Deserialize;
use tracing::{info, warn};

use crate::collaborators::{
    CodeRunner, DisabledRunner, Judge0Runner, LanguageMap, LlmOfferRenderer, LogMailer, Notifier,
    OfferLetters, SmtpMailer,
};
use crate::collaborators::judge::DEFAULT_JUDGE0_URL;
use crate::collaborators::mailer::SmtpSettings;
use crate::evaluator::{DEFAULT_THRESHOLD, GuardedEvaluator, LlmEvaluator, ScoringMode};
use crate::llm::{LlmClient, LlmSettings};
use crate::pipeline::Pipeline;
use crate::pipeline::types::JobProfile;
use crate::questions::{LlmQuestionSource, QuestionGenerator, QuestionPool};
use crate::storage::CandidateStore;

pub const DEFAULT_CONFIG_FILE: &str = "hirepipe.yaml";
pub const DEFAULT_STORE_PATH: &str = "candidate_states.json";
/// Store path selecting a non-persistent in-memory store.
pub const MEMORY_STORE: &str = ":memory:";
pub const DEFAULT_PORT: u16 = 5000;
/// Resumes are uploaded through the intake form, so the body limit is
/// well above a typical JSON request.
pub const DEFAULT_MAX_BODY: usize = 10 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoringModeName {
    Scored,
    Binary,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct ScoringConfig {
    pub mode: Option<ScoringModeName>,
    pub threshold: Option<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvaluatorKind {
    Llm,
    Heuristic,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct LlmConfig {
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub timeout_s: Option<f64>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct JobConfig {
    pub title: Option<String>,
    pub description: Option<String>,
    pub required_skills: Option<Vec<String>>,
    pub company: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct JudgeConfig {
    pub url: Option<String>,
    /// Language name to Judge0 id, layered over the built-in table.
    pub languages: Option<BTreeMap<String, u32>>,
    pub max_polls: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MailProvider {
    Smtp,
    Log,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct MailConfig {
    pub provider: Option<MailProvider>,
    pub from: Option<String>,
}

/// Configuration loaded from `hirepipe.yaml`.
/// All fields are optional; missing fields fall back to CLI/env/defaults.
/// Secrets are never read from this file.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct HirePipeConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub store_path: Option<String>,
    /// Base URL used in emailed stage links.
    pub public_url: Option<String>,
    pub max_body: Option<usize>,
    pub debug_endpoints: Option<bool>,
    pub scoring: Option<ScoringConfig>,
    pub evaluator: Option<EvaluatorKind>,
    pub llm: Option<LlmConfig>,
    pub job: Option<JobConfig>,
    pub judge: Option<JudgeConfig>,
    pub mail: Option<MailConfig>,
}

impl HirePipeConfig {
    /// Load configuration from a YAML file.
    ///
    /// - If `path` is `Some`, load that specific file (error if missing).
    /// - If `path` is `None`, auto-detect `hirepipe.yaml` in cwd; return defaults if absent.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file_path = match path {
            Some(p) => {
                if !p.exists() {
                    anyhow::bail!("Config file not found: {}", p.display());
                }
                p.to_path_buf()
            }
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_FILE);
                if !default_path.exists() {
                    return Ok(Self::default());
                }
                default_path.to_path_buf()
            }
        };

        let contents = std::fs::read_to_string(&file_path)
            .with_context(|| format!("Failed to read config file: {}", file_path.display()))?;

        Self::parse(&contents).with_context(|| format!("Failed to parse config file: {}", file_path.display()))
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let config: HirePipeConfig = serde_yml::from_str(contents)?;
        if let Some(threshold) = config.scoring.as_ref().and_then(|s| s.threshold)
            && threshold > 100
        {
            anyhow::bail!("scoring.threshold must be between 0 and 100, got {}", threshold);
        }
        Ok(config)
    }

    pub fn scoring_mode(&self) -> ScoringMode {
        let scoring = self.scoring.as_ref();
        match scoring.and_then(|s| s.mode) {
            Some(ScoringModeName::Binary) => ScoringMode::Binary,
            Some(ScoringModeName::Scored) | None => ScoringMode::Scored {
                threshold: scoring.and_then(|s| s.threshold).unwrap_or(DEFAULT_THRESHOLD),
            },
        }
    }

    pub fn job_profile(&self) -> JobProfile {
        let mut job = JobProfile::default();
        if let Some(cfg) = &self.job {
            if let Some(title) = &cfg.title {
                job.title = title.clone();
            }
            if let Some(description) = &cfg.description {
                job.description = description.clone();
            }
            if let Some(skills) = &cfg.required_skills {
                job.required_skills = skills.clone();
            }
            if let Some(company) = &cfg.company {
                job.company = company.clone();
            }
        }
        job
    }

    /// Chat-model settings: the API key from the environment, everything
    /// else layered from the `llm` section. `None` without a key.
    pub fn llm_settings(&self) -> Option<LlmSettings> {
        let mut settings = LlmSettings::from_env()?;
        if let Some(cfg) = &self.llm {
            if let Some(model) = &cfg.model {
                settings.model = model.clone();
            }
            if let Some(url) = &cfg.base_url {
                settings.base_url = url.clone();
            }
            if let Some(secs) = cfg.timeout_s.filter(|s| *s > 0.0) {
                settings.timeout = Duration::from_secs_f64(secs);
            }
        }
        Some(settings)
    }

    /// Evaluator in effect: the configured one, else `llm` when a key is
    /// available and `heuristic` otherwise.
    pub fn evaluator_kind(&self, has_llm_key: bool) -> EvaluatorKind {
        match self.evaluator {
            Some(kind) => kind,
            None if has_llm_key => EvaluatorKind::Llm,
            None => EvaluatorKind::Heuristic,
        }
    }

    /// Assemble the pipeline and its collaborators from this config and
    /// the environment.
    pub fn build_pipeline(&self, store: Arc<dyn CandidateStore>, public_url: &str) -> Result<Pipeline> {
        let mode = self.scoring_mode();
        let job = self.job_profile();
        let llm = self.llm_settings();

        let client = match (self.evaluator_kind(llm.is_some()), llm) {
            (EvaluatorKind::Llm, Some(settings)) => {
                Some(LlmClient::new(settings).context("Failed to build LLM client")?)
            }
            (EvaluatorKind::Llm, None) => {
                warn!("evaluator is 'llm' but OPENAI_API_KEY is not set; using heuristic scoring");
                None
            }
            (EvaluatorKind::Heuristic, _) => None,
        };

        let mut questions = QuestionGenerator::new();
        let mut offers = OfferLetters::default();
        let evaluator = match &client {
            Some(client) => {
                questions = questions.with_source(Arc::new(LlmQuestionSource::new(client.clone(), job.clone())));
                offers = OfferLetters::new(Some(Arc::new(LlmOfferRenderer::new(client.clone()))));
                let primary = LlmEvaluator::new(client.clone(), mode)?;
                GuardedEvaluator::new(Arc::new(primary), mode, client.timeout())
            }
            None => GuardedEvaluator::heuristic(mode),
        };
        questions = questions.with_source(Arc::new(QuestionPool::default()));

        info!(
            evaluator = evaluator.primary_name(),
            questions = ?questions.source_names(),
            threshold = mode.threshold(),
            "Pipeline collaborators configured"
        );

        Ok(Pipeline::builder(store)
            .evaluator(evaluator)
            .questions(questions)
            .notifier(self.notifier()?)
            .runner(self.runner()?)
            .offers(offers)
            .job(job)
            .public_url(public_url.trim_end_matches('/'))
            .build())
    }

    fn notifier(&self) -> Result<Arc<dyn Notifier>> {
        let mail = self.mail.as_ref();
        let from = mail.and_then(|m| m.from.as_deref());
        match mail.and_then(|m| m.provider) {
            Some(MailProvider::Log) => Ok(Arc::new(LogMailer)),
            provider => match SmtpSettings::from_env(from) {
                Some(settings) => {
                    info!(server = %settings.server, "Sending email through SMTP");
                    Ok(Arc::new(SmtpMailer::new(settings).context("Failed to configure SMTP")?))
                }
                None => {
                    if provider == Some(MailProvider::Smtp) {
                        warn!("mail provider is 'smtp' but SMTP_SERVER is not set; emails will only be logged");
                    }
                    Ok(Arc::new(LogMailer))
                }
            },
        }
    }

    fn runner(&self) -> Result<Arc<dyn CodeRunner>> {
        let judge = self.judge.as_ref();
        let api_key = std::env::var("JUDGE0_API_KEY").ok().filter(|k| !k.trim().is_empty());
        let url = std::env::var("JUDGE0_URL")
            .ok()
            .filter(|u| !u.trim().is_empty())
            .or_else(|| judge.and_then(|j| j.url.clone()));

        if url.is_none() && api_key.is_none() {
            info!("No Judge0 endpoint configured; coding answers are scored without execution");
            return Ok(Arc::new(DisabledRunner));
        }

        let languages = match judge.and_then(|j| j.languages.as_ref()) {
            Some(overrides) => LanguageMap::with_overrides(overrides),
            None => LanguageMap::default(),
        };
        let max_polls = judge.and_then(|j| j.max_polls).unwrap_or(20);
        let runner = Judge0Runner::new(url.unwrap_or_else(|| DEFAULT_JUDGE0_URL.to_string()), api_key)?
            .with_languages(languages)
            .with_polling(max_polls, Duration::from_secs(1));
        Ok(Arc::new(runner))
    }
}
