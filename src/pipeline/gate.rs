//! Token-gated link validation.
//!
//! A link is single-use for submission, not for viewing: opening a stage
//! link any number of times is harmless until an answer has been scored.

use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, error, info};

use crate::pipeline::types::{Analysis, CandidateRecord, PipelineStatus, Stage};
use crate::storage::CandidateStore;

/// Result of checking a token against a stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkStatus {
    /// Unknown token. Render an invalid-link response and do nothing else.
    Invalid,
    /// Known token whose record cannot enter this stage (earlier stage not
    /// passed, or the candidate was rejected).
    Locked(PipelineStatus),
    /// Stage already scored; replay the stored analysis.
    Completed(Option<Analysis>),
    /// Stage open for a single scored submission.
    Open,
}

/// Classify a record for a stage without touching storage.
pub fn classify(record: Option<&CandidateRecord>, stage: Stage) -> LinkStatus {
    let Some(record) = record else {
        return LinkStatus::Invalid;
    };

    if record.is_completed(stage) {
        return LinkStatus::Completed(record.analysis(stage).cloned());
    }

    let status = record.status();
    match PipelineStatus::awaiting(stage) {
        Some(expected) if expected == status => LinkStatus::Open,
        _ => LinkStatus::Locked(status),
    }
}

/// A gate check together with the (possibly upgraded) record it was made on.
#[derive(Debug, Clone)]
pub struct GateCheck {
    pub status: LinkStatus,
    pub record: Option<CandidateRecord>,
}

/// Validator in front of every stage endpoint.
pub struct LinkGate {
    store: Arc<dyn CandidateStore>,
}

impl LinkGate {
    pub fn new(store: Arc<dyn CandidateStore>) -> Self {
        Self { store }
    }

    /// Check `token` for `stage`, upgrading a legacy record in place first.
    ///
    /// Callers must hold the token lock when they intend to act on the result.
    pub async fn check(&self, token: &str, stage: Stage) -> Result<GateCheck> {
        let Some(mut record) = self.store.get(token).await? else {
            debug!(token, %stage, "Unknown token");
            return Ok(GateCheck {
                status: LinkStatus::Invalid,
                record: None,
            });
        };

        if record.upgrade_legacy() {
            info!(token, "Upgraded legacy record completion fields");
            if let Err(e) = self.store.put(token, record.clone()).await {
                error!(token, "Failed to persist upgraded record: {:#}", e);
            }
        }

        let status = classify(Some(&record), stage);
        Ok(GateCheck {
            status,
            record: Some(record),
        })
    }
}
