//! Candidate-facing notification texts.

use crate::collaborators::mailer::{EmailAttachment, OutgoingEmail};
use crate::pipeline::types::{CandidateRecord, Stage};

pub const OFFER_ATTACHMENT: &str = "OfferLetter.html";

fn phrase(stage: Stage) -> &'static str {
    match stage {
        Stage::IntakeMatch => "skill match",
        Stage::CodingTest => "coding test",
        Stage::TechInterview => "technical interview",
        Stage::HrInterview => "HR interview",
        Stage::Offer => "offer",
    }
}

/// Link to the next stage. `passed` carries the stage just passed and its score.
pub fn invitation(
    record: &CandidateRecord,
    stage: Stage,
    link: &str,
    passed: Option<(Stage, u8)>,
    signature: &str,
) -> OutgoingEmail {
    let subject = match stage {
        Stage::CodingTest => "Coding Assessment Link",
        Stage::TechInterview => "Technical Interview Link",
        Stage::HrInterview => "HR Interview Link",
        Stage::IntakeMatch | Stage::Offer => "Application Update",
    };
    let lead = match passed {
        Some((previous, score)) => format!(
            "Congratulations! You passed the {} with a score of {}/100.",
            phrase(previous),
            score
        ),
        None => "You have been shortlisted!".to_string(),
    };
    let call = match stage {
        Stage::CodingTest => format!("Please take your coding test here: {}", link),
        other => format!("Attend your {} here: {}", phrase(other), link),
    };
    OutgoingEmail::text(
        &record.email,
        subject,
        format!("Hi {},\n\n{} {}\n\nBest,\n{}", record.name, lead, call, signature),
    )
}

/// Rejection after `stage`.
pub fn rejection(record: &CandidateRecord, stage: Stage, score: u8, signature: &str) -> OutgoingEmail {
    let body = match stage {
        Stage::IntakeMatch => {
            "Thank you for applying. Unfortunately, you do not match our requirements at this time.".to_string()
        }
        other => format!(
            "Thank you for participating. Unfortunately, you did not pass the {}. Your score was {}/100.",
            phrase(other),
            score
        ),
    };
    OutgoingEmail::text(
        &record.email,
        "Application Update",
        format!("Hi {},\n\n{}\n\nBest,\n{}", record.name, body, signature),
    )
}

/// Offer email carrying the rendered letter as HTML body and attachment.
pub fn offer(record: &CandidateRecord, score: u8, letter_html: &str, link: &str, signature: &str) -> OutgoingEmail {
    OutgoingEmail {
        to: record.email.clone(),
        subject: "Congratulations! Your Offer Letter".to_string(),
        text: format!(
            "Hi {},\n\nCongratulations! You have cleared all rounds with a score of {}/100. \
             Your offer letter is attached and can also be viewed here: {}\n\nBest,\n{}",
            record.name, score, link, signature
        ),
        html: Some(letter_html.to_string()),
        attachments: vec![EmailAttachment {
            filename: OFFER_ATTACHMENT.to_string(),
            content_type: "text/html; charset=utf-8".to_string(),
            body: letter_html.as_bytes().to_vec(),
        }],
    }
}
