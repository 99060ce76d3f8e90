//! The pipeline state machine: pure decisions, no I/O.
//!
//! A transition computes the next status and the side effects to request.
//! Effects are executed by the orchestrator after the new state is persisted.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::pipeline::types::{Analysis, CandidateRecord, PipelineStatus, Stage};

/// Side effect requested by a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Email the link to `stage`.
    Invite(Stage),
    /// Email a rejection notice for `stage`.
    Reject { stage: Stage, score: u8 },
    /// Render the offer document and email it.
    Offer { score: u8 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub from: PipelineStatus,
    pub to: PipelineStatus,
    pub effects: Vec<Effect>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("stage '{0}' does not accept answers")]
    NotGated(Stage),
    #[error("stage '{stage}' already decided")]
    AlreadyDecided { stage: Stage },
    #[error("record is '{status}', stage '{stage}' requires '{expected}'")]
    WrongStatus {
        stage: Stage,
        status: PipelineStatus,
        expected: PipelineStatus,
    },
}

/// Decide the intake skill-match gate.
pub fn intake(verdict: &Analysis) -> Transition {
    let (to, effect) = if verdict.passed() {
        (PipelineStatus::Shortlisted, Effect::Invite(Stage::CodingTest))
    } else {
        (
            PipelineStatus::Rejected,
            Effect::Reject {
                stage: Stage::IntakeMatch,
                score: verdict.score,
            },
        )
    };
    Transition {
        from: PipelineStatus::Applied,
        to,
        effects: vec![effect],
    }
}

/// Decide a linked stage for `record` given the evaluator's verdict.
pub fn decide(
    record: &CandidateRecord,
    stage: Stage,
    verdict: &Analysis,
) -> Result<Transition, TransitionError> {
    if !stage.is_linked() {
        return Err(TransitionError::NotGated(stage));
    }
    if record.is_completed(stage) || record.analysis(stage).is_some() {
        return Err(TransitionError::AlreadyDecided { stage });
    }

    let from = record.status();
    let expected = PipelineStatus::awaiting(stage).ok_or(TransitionError::NotGated(stage))?;
    if from != expected {
        return Err(TransitionError::WrongStatus {
            stage,
            status: from,
            expected,
        });
    }

    let transition = if verdict.passed() {
        let to = PipelineStatus::after_pass(stage);
        let effect = match stage.next() {
            Some(Stage::Offer) | None => Effect::Offer {
                score: verdict.score,
            },
            Some(next) => Effect::Invite(next),
        };
        Transition {
            from,
            to,
            effects: vec![effect],
        }
    } else {
        Transition {
            from,
            to: PipelineStatus::Rejected,
            effects: vec![Effect::Reject {
                stage,
                score: verdict.score,
            }],
        }
    };
    Ok(transition)
}

/// Write a decided verdict into the record and close the stage.
///
/// An existing analysis is never overwritten.
pub fn apply(record: &mut CandidateRecord, stage: Stage, verdict: Analysis, at: DateTime<Utc>) {
    if let Some(slot) = record.slot_mut(stage) {
        if slot.analysis.is_none() {
            *slot.analysis = Some(verdict);
        }
        *slot.completed = true;
        if slot.completed_at.is_none() {
            *slot.completed_at = Some(at);
        }
    } else if stage == Stage::IntakeMatch && record.intake_analysis.is_none() {
        record.intake_analysis = Some(verdict);
    }
}
