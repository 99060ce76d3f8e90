//! Outside services the pipeline talks to: mail, resume parsing, remote
//! code execution and offer-letter rendering. Each sits behind a trait so
//! the orchestrator can be driven with fakes.

pub mod judge;
pub mod mailer;
pub mod offer;
pub mod resume;

pub use judge::{CodeRunner, DisabledRunner, Judge0Runner, LanguageMap};
pub use mailer::{LogMailer, Notifier, OutgoingEmail, SmtpMailer};
pub use offer::{LlmOfferRenderer, OfferLetters, OfferRenderer, TemplateOfferRenderer};
pub use resume::{FileResumeExtractor, ResumeExtractor};
