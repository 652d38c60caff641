//! Research pipeline orchestration engine.
//!
//! Turns a free-form research query into a cited markdown report through
//! four stages: intent analysis (with an optional clarification round),
//! multi-tier source gathering, synthesis, and report assembly. Every
//! stage result carries a confidence score, and the full session state is
//! persisted after each transition so interrupted sessions resume where
//! they left off.

pub mod analysis;
pub mod config;
pub mod confidence;
pub mod error;
pub mod extract;
pub mod gather;
pub mod intent;
pub mod model;
pub mod pipeline;
pub mod prompts;
pub mod report;
pub mod storage;

pub use config::Config;
pub use error::{AppError, AppResult};
pub use pipeline::{ResearchEngine, Session, SessionStatus};
