pub mod gate;
pub mod locks;
pub mod machine;
pub mod notices;
pub mod orchestrator;
pub mod types;

pub use gate::{LinkGate, LinkStatus};
pub use orchestrator::{
    CandidateSummary, IntakeOutcome, OfferView, Pipeline, PipelineBuilder, PipelineError, StageOutcome, StageView,
};
pub use types::{Analysis, Answer, Application, CandidateRecord, PipelineStatus, Recommendation, Stage};
