//! Session state and the pipeline engine.
//!
//! A session is the unit of persistence: the full document is written back
//! after every state transition, so a process crash at any point loses at
//! most the stage that was running.

mod engine;

pub use engine::ResearchEngine;

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::analysis::AnalysisResult;
use crate::confidence::ConfidenceScore;
use crate::gather::GatheringResult;
use crate::intent::{ClarifyingQuestion, IntentResult};
use crate::report::ReportResult;

/// The four pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageName {
    IntentAnalysis,
    DataGathering,
    Analysis,
    ReportGeneration,
}

impl StageName {
    /// Stages in the order the engine runs them.
    pub const ALL: [StageName; 4] = [
        StageName::IntentAnalysis,
        StageName::DataGathering,
        StageName::Analysis,
        StageName::ReportGeneration,
    ];
}

impl std::fmt::Display for StageName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StageName::IntentAnalysis => write!(f, "intent_analysis"),
            StageName::DataGathering => write!(f, "data_gathering"),
            StageName::Analysis => write!(f, "analysis"),
            StageName::ReportGeneration => write!(f, "report_generation"),
        }
    }
}

impl std::str::FromStr for StageName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "intent_analysis" => Ok(StageName::IntentAnalysis),
            "data_gathering" => Ok(StageName::DataGathering),
            "analysis" => Ok(StageName::Analysis),
            "report_generation" => Ok(StageName::ReportGeneration),
            other => Err(format!("unknown stage: {}", other)),
        }
    }
}

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Suspended awaiting clarification answers.
    PendingClarification,
    InProgress,
    Completed,
    Error,
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionStatus::PendingClarification => write!(f, "pending_clarification"),
            SessionStatus::InProgress => write!(f, "in_progress"),
            SessionStatus::Completed => write!(f, "completed"),
            SessionStatus::Error => write!(f, "error"),
        }
    }
}

impl std::str::FromStr for SessionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending_clarification" => Ok(SessionStatus::PendingClarification),
            "in_progress" => Ok(SessionStatus::InProgress),
            "completed" => Ok(SessionStatus::Completed),
            "error" => Ok(SessionStatus::Error),
            other => Err(format!("unknown session status: {}", other)),
        }
    }
}

/// State of a single stage within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Pending,
    Completed,
    Failed,
}

/// A finalized stage output; the tag keeps the persisted form
/// self-describing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StageResult {
    Intent(IntentResult),
    Gathering(GatheringResult),
    Analysis(AnalysisResult),
    Report(ReportResult),
}

/// Execution record for one stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageRecord {
    pub status: StageStatus,
    pub result: Option<StageResult>,
    pub confidence: Option<ConfidenceScore>,
    /// True when the stage completed on fallback data.
    #[serde(default)]
    pub degraded: bool,
    pub completed_at: Option<DateTime<Utc>>,
}

impl StageRecord {
    fn pending() -> Self {
        Self {
            status: StageStatus::Pending,
            result: None,
            confidence: None,
            degraded: false,
            completed_at: None,
        }
    }
}

/// Stage failure details persisted on the session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionError {
    pub stage: StageName,
    pub message: String,
}

/// The persisted research session document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    pub initial_query: String,
    pub status: SessionStatus,
    pub stages: BTreeMap<StageName, StageRecord>,
    /// Questions shown to the user while suspended.
    #[serde(default)]
    pub clarifying_questions: Vec<ClarifyingQuestion>,
    /// Answers supplied on resume, keyed by question text.
    #[serde(default)]
    pub clarification_answers: BTreeMap<String, String>,
    pub overall_confidence: Option<ConfidenceScore>,
    /// Path of the generated report, once report generation completes.
    pub final_report: Option<String>,
    pub error: Option<SessionError>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    /// Fresh session with every stage pending.
    pub fn new(initial_query: &str) -> Self {
        let now = Utc::now();
        let stages = StageName::ALL
            .iter()
            .map(|name| (*name, StageRecord::pending()))
            .collect();

        Self {
            session_id: uuid::Uuid::new_v4().to_string(),
            initial_query: initial_query.to_string(),
            status: SessionStatus::InProgress,
            stages,
            clarifying_questions: Vec::new(),
            clarification_answers: BTreeMap::new(),
            overall_confidence: None,
            final_report: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn stage_completed(&self, name: StageName) -> bool {
        self.stages
            .get(&name)
            .map(|record| record.status == StageStatus::Completed)
            .unwrap_or(false)
    }

    /// Finalize a stage with its result and score.
    pub fn complete_stage(
        &mut self,
        name: StageName,
        result: StageResult,
        confidence: ConfidenceScore,
        degraded: bool,
    ) {
        self.stages.insert(
            name,
            StageRecord {
                status: StageStatus::Completed,
                result: Some(result),
                confidence: Some(confidence),
                degraded,
                completed_at: Some(Utc::now()),
            },
        );
        self.touch();
    }

    /// Mark a stage failed and put the session into the error state.
    pub fn fail_stage(&mut self, name: StageName, message: &str) {
        if let Some(record) = self.stages.get_mut(&name) {
            record.status = StageStatus::Failed;
        }
        self.status = SessionStatus::Error;
        self.error = Some(SessionError {
            stage: name,
            message: message.to_string(),
        });
        self.touch();
    }

    /// The completed intent result, if intent analysis has run.
    pub fn intent(&self) -> Option<&IntentResult> {
        match self.stage_result(StageName::IntentAnalysis) {
            Some(StageResult::Intent(intent)) => Some(intent),
            _ => None,
        }
    }

    pub fn gathering(&self) -> Option<&GatheringResult> {
        match self.stage_result(StageName::DataGathering) {
            Some(StageResult::Gathering(gathering)) => Some(gathering),
            _ => None,
        }
    }

    pub fn analysis(&self) -> Option<&AnalysisResult> {
        match self.stage_result(StageName::Analysis) {
            Some(StageResult::Analysis(analysis)) => Some(analysis),
            _ => None,
        }
    }

    fn stage_result(&self, name: StageName) -> Option<&StageResult> {
        self.stages.get(&name).and_then(|record| record.result.as_ref())
    }

    /// Per-stage confidence scores for completed stages.
    pub fn stage_scores(&self) -> BTreeMap<StageName, ConfidenceScore> {
        self.stages
            .iter()
            .filter(|(_, record)| record.status == StageStatus::Completed)
            .filter_map(|(name, record)| {
                record.confidence.clone().map(|score| (*name, score))
            })
            .collect()
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_name_round_trips_through_display() {
        for stage in StageName::ALL {
            let parsed: StageName = stage.to_string().parse().unwrap();
            assert_eq!(parsed, stage);
        }
    }

    #[test]
    fn test_stage_name_serde_matches_display() {
        let json = serde_json::to_string(&StageName::DataGathering).unwrap();
        assert_eq!(json, "\"data_gathering\"");
    }

    #[test]
    fn test_session_status_round_trips() {
        for status in [
            SessionStatus::PendingClarification,
            SessionStatus::InProgress,
            SessionStatus::Completed,
            SessionStatus::Error,
        ] {
            let parsed: SessionStatus = status.to_string().parse().unwrap();
            assert_eq!(parsed, status);
        }
    }

    #[test]
    fn test_new_session_has_all_stages_pending() {
        let session = Session::new("a query");
        assert_eq!(session.status, SessionStatus::InProgress);
        assert_eq!(session.stages.len(), 4);
        for record in session.stages.values() {
            assert_eq!(record.status, StageStatus::Pending);
            assert!(record.result.is_none());
        }
        assert!(!session.stage_completed(StageName::IntentAnalysis));
    }

    #[test]
    fn test_fail_stage_sets_error_state() {
        let mut session = Session::new("q");
        session.fail_stage(StageName::DataGathering, "all tiers failed");

        assert_eq!(session.status, SessionStatus::Error);
        let error = session.error.as_ref().unwrap();
        assert_eq!(error.stage, StageName::DataGathering);
        assert_eq!(error.message, "all tiers failed");
        assert_eq!(
            session.stages[&StageName::DataGathering].status,
            StageStatus::Failed
        );
    }

    #[test]
    fn test_session_document_round_trips_through_json() {
        let mut session = Session::new("serialization check");
        session.clarifying_questions.push(ClarifyingQuestion {
            question: "Which years?".to_string(),
            purpose: "time frame".to_string(),
            examples: vec!["2020-2025".to_string()],
        });
        session.status = SessionStatus::PendingClarification;

        let json = serde_json::to_string(&session).unwrap();
        let back: Session = serde_json::from_str(&json).unwrap();

        assert_eq!(back.session_id, session.session_id);
        assert_eq!(back.status, SessionStatus::PendingClarification);
        assert_eq!(back.clarifying_questions.len(), 1);
        assert_eq!(back.stages.len(), 4);
    }
}
