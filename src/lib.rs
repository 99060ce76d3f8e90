pub mod api;
pub mod cli;
pub mod collaborators;
pub mod evaluator;
pub mod llm;
pub mod pipeline;
pub mod questions;
pub mod storage;
