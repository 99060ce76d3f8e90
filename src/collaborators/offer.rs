use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tracing::warn;

use crate::llm::LlmClient;
use crate::pipeline::types::{CandidateRecord, JobProfile};

/// Produces the offer document for a candidate who passed every stage.
#[async_trait]
pub trait OfferRenderer: Send + Sync {
    fn name(&self) -> &str;

    async fn render(&self, record: &CandidateRecord, job: &JobProfile) -> Result<String>;
}

const STYLE: &str = "body { font-family: Arial, sans-serif; margin: 40px; } \
.header { text-align: center; margin-bottom: 30px; } \
.content { line-height: 1.6; } \
.signature { margin-top: 40px; }";

fn page(body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>Offer Letter</title>\n\
         <style>{}</style>\n</head>\n<body>\n{}\n</body>\n</html>\n",
        STYLE, body
    )
}

/// Fixed offer letter with the candidate's details filled in.
#[derive(Debug, Default)]
pub struct TemplateOfferRenderer;

impl TemplateOfferRenderer {
    pub fn render_now(&self, record: &CandidateRecord, job: &JobProfile) -> String {
        let name = ammonia::clean_text(&record.name);
        let title = ammonia::clean_text(&job.title);
        let company = ammonia::clean_text(&job.company);
        page(&format!(
            "<div class=\"header\">\n<h1>Congratulations!</h1>\n<h2>Offer Letter</h2>\n</div>\n\
             <div class=\"content\">\n\
             <p>Dear {name},</p>\n\
             <p>We are delighted to offer you the position of <strong>{title}</strong>.</p>\n\
             <p>Your results across the coding test, the technical interview and the HR interview \
             showed the skills and judgment we are looking for.</p>\n\
             <p>Please review this offer and let us know if you have any questions. \
             We look forward to welcoming you to the team.</p>\n\
             <div class=\"signature\">\n<p>Best regards,<br>\n{company}</p>\n</div>\n\
             </div>"
        ))
    }
}

#[async_trait]
impl OfferRenderer for TemplateOfferRenderer {
    fn name(&self) -> &str {
        "template"
    }

    async fn render(&self, record: &CandidateRecord, job: &JobProfile) -> Result<String> {
        Ok(self.render_now(record, job))
    }
}

const SYSTEM_PROMPT: &str = "You are an HR specialist writing professional offer letters. \
Reply with the letter body as simple HTML (paragraphs, headings, bold text) and nothing else.";

/// Offer letter drafted by the chat model. Model output is sanitized before
/// being placed in the page.
pub struct LlmOfferRenderer {
    client: LlmClient,
}

impl LlmOfferRenderer {
    pub fn new(client: LlmClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl OfferRenderer for LlmOfferRenderer {
    fn name(&self) -> &str {
        "llm"
    }

    async fn render(&self, record: &CandidateRecord, job: &JobProfile) -> Result<String> {
        let prompt = format!(
            "Write an offer letter for {} for the position of {} at {}. Congratulate the candidate on \
             passing the coding test, the technical interview and the HR interview, and invite them \
             to reply with any questions. Sign it from {}.",
            record.name, job.title, job.company, job.company
        );
        let reply = self.client.complete(SYSTEM_PROMPT, &prompt).await?;
        let body = strip_html_fences(&reply);
        let cleaned = ammonia::clean(body);
        if cleaned.trim().is_empty() {
            anyhow::bail!("offer letter was empty after sanitizing");
        }
        Ok(page(&format!("<div class=\"content\">\n{}\n</div>", cleaned)))
    }
}

fn strip_html_fences(text: &str) -> &str {
    let text = text.trim();
    let inner = text
        .strip_prefix("```html")
        .or_else(|| text.strip_prefix("```"));
    match inner {
        Some(rest) => rest.trim().strip_suffix("```").unwrap_or(rest).trim(),
        None => text,
    }
}

/// Offer rendering with a guaranteed result: the configured renderer first,
/// the fixed template when it fails.
#[derive(Clone)]
pub struct OfferLetters {
    primary: Option<Arc<dyn OfferRenderer>>,
    template: Arc<TemplateOfferRenderer>,
}

impl Default for OfferLetters {
    fn default() -> Self {
        Self {
            primary: None,
            template: Arc::new(TemplateOfferRenderer),
        }
    }
}

impl OfferLetters {
    pub fn new(primary: Option<Arc<dyn OfferRenderer>>) -> Self {
        Self {
            primary,
            ..Self::default()
        }
    }

    pub async fn render(&self, record: &CandidateRecord, job: &JobProfile) -> String {
        if let Some(primary) = &self.primary {
            match primary.render(record, job).await {
                Ok(html) => return html,
                Err(e) => warn!(renderer = primary.name(), "Offer letter rendering failed, using template: {:#}", e),
            }
        }
        self.template.render_now(record, job)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::types::Application;

    #[test]
    fn template_escapes_candidate_fields() {
        let app = Application {
            name: "<script>alert(1)</script>".into(),
            email: "x@example.com".into(),
            skills: "python".into(),
            resume: None,
        };
        let record = CandidateRecord::new(&app, String::new());
        let html = TemplateOfferRenderer.render_now(&record, &JobProfile::default());
        assert!(!html.contains("<script>"));
        assert!(html.contains("Python Developer"));
        assert!(html.contains("Offer Letter"));
    }

    #[test]
    fn html_fences_are_removed() {
        assert_eq!(strip_html_fences("```html\n<p>Hi</p>\n```"), "<p>Hi</p>");
        assert_eq!(strip_html_fences("<p>Hi</p>"), "<p>Hi</p>");
    }
}
