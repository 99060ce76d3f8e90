use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::{Context as _, Result};
use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as B64;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

pub const DEFAULT_JUDGE0_URL: &str = "https://judge0-ce.p.rapidapi.com";
/// Input fed to every submission; matches the coding questions' "2 3" convention.
pub const DEFAULT_STDIN: &str = "2 3\n";

/// Runs candidate code and reports its output.
#[async_trait]
pub trait CodeRunner: Send + Sync {
    fn name(&self) -> &str;

    async fn run(&self, code: &str, language: &str) -> Result<String>;
}

/// Runner used when no judge is configured.
#[derive(Debug, Default)]
pub struct DisabledRunner;

#[async_trait]
impl CodeRunner for DisabledRunner {
    fn name(&self) -> &str {
        "disabled"
    }

    async fn run(&self, _code: &str, _language: &str) -> Result<String> {
        anyhow::bail!("code execution is not configured")
    }
}

/// Language name to Judge0 language id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LanguageMap {
    ids: BTreeMap<String, u32>,
    default_id: u32,
}

impl Default for LanguageMap {
    fn default() -> Self {
        let ids = [
            ("python", 71),
            ("cpp", 54),
            ("c", 50),
            ("java", 62),
            ("javascript", 63),
            ("ruby", 72),
            ("go", 60),
            ("php", 68),
            ("csharp", 51),
            ("swift", 83),
            ("rust", 73),
        ]
        .into_iter()
        .map(|(name, id)| (name.to_string(), id))
        .collect();
        Self { ids, default_id: 71 }
    }
}

impl LanguageMap {
    /// Default table with `overrides` layered on top.
    pub fn with_overrides(overrides: &BTreeMap<String, u32>) -> Self {
        let mut map = Self::default();
        for (name, id) in overrides {
            map.ids.insert(name.to_ascii_lowercase(), *id);
        }
        map
    }

    /// Id for `language`; unknown languages run as Python.
    pub fn id_for(&self, language: &str) -> u32 {
        self.ids
            .get(&language.trim().to_ascii_lowercase())
            .copied()
            .unwrap_or(self.default_id)
    }
}

#[derive(Debug, Deserialize)]
struct SubmissionToken {
    token: String,
}

#[derive(Debug, Deserialize)]
struct SubmissionStatus {
    id: u32,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
struct SubmissionResult {
    status: SubmissionStatus,
    stdout: Option<String>,
    stderr: Option<String>,
    compile_output: Option<String>,
}

/// Judge0 HTTP client.
pub struct Judge0Runner {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    languages: LanguageMap,
    max_polls: u32,
    poll_interval: Duration,
    stdin: String,
}

impl Judge0Runner {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .context("Failed to build Judge0 HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            languages: LanguageMap::default(),
            max_polls: 20,
            poll_interval: Duration::from_secs(1),
            stdin: DEFAULT_STDIN.to_string(),
        })
    }

    pub fn with_languages(mut self, languages: LanguageMap) -> Self {
        self.languages = languages;
        self
    }

    pub fn with_polling(mut self, max_polls: u32, interval: Duration) -> Self {
        self.max_polls = max_polls.max(1);
        self.poll_interval = interval;
        self
    }

    fn request(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let Some(key) = &self.api_key else {
            return builder;
        };
        let builder = builder.header("X-RapidAPI-Key", key);
        match reqwest::Url::parse(&self.base_url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
        {
            Some(host) => builder.header("X-RapidAPI-Host", host),
            None => builder,
        }
    }

    async fn submit(&self, code: &str, language: &str) -> Result<String> {
        let url = format!("{}/submissions?base64_encoded=true&wait=false", self.base_url);
        let body = json!({
            "source_code": B64.encode(code),
            "language_id": self.languages.id_for(language),
            "stdin": B64.encode(&self.stdin),
        });
        let response = self
            .request(self.client.post(&url))
            .json(&body)
            .send()
            .await
            .context("Judge0 submission failed")?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("Judge0 submission returned {}: {}", status, text);
        }
        let token: SubmissionToken = response.json().await.context("Invalid Judge0 submission response")?;
        Ok(token.token)
    }

    async fn poll(&self, token: &str) -> Result<String> {
        let url = format!("{}/submissions/{}?base64_encoded=true", self.base_url, token);
        for attempt in 0..self.max_polls {
            if attempt > 0 {
                tokio::time::sleep(self.poll_interval).await;
            }
            let response = match self.request(self.client.get(&url)).send().await {
                Ok(r) if r.status().is_success() => r,
                Ok(r) => {
                    warn!(token, "Judge0 poll returned {}", r.status());
                    continue;
                }
                Err(e) => {
                    warn!(token, "Judge0 poll failed: {}", e);
                    continue;
                }
            };
            let result: SubmissionResult = response.json().await.context("Invalid Judge0 result")?;
            if matches!(result.status.id, 1 | 2) {
                debug!(token, attempt, "Judge0 submission still running");
                continue;
            }
            return Ok(render_output(&result));
        }
        anyhow::bail!("Judge0 result not ready after {} polls", self.max_polls)
    }
}

fn decode(field: &Option<String>) -> Option<String> {
    let raw = field.as_deref()?.replace('\n', "");
    let bytes = B64.decode(raw.trim()).ok()?;
    let text = String::from_utf8_lossy(&bytes).into_owned();
    (!text.trim().is_empty()).then_some(text)
}

fn render_output(result: &SubmissionResult) -> String {
    decode(&result.stdout)
        .or_else(|| decode(&result.stderr))
        .or_else(|| decode(&result.compile_output))
        .unwrap_or_else(|| result.status.description.clone())
}

#[async_trait]
impl CodeRunner for Judge0Runner {
    fn name(&self) -> &str {
        "judge0"
    }

    async fn run(&self, code: &str, language: &str) -> Result<String> {
        let token = self.submit(code, language).await?;
        debug!(%token, language, "Submitted code to Judge0");
        self.poll(&token).await
    }
}
