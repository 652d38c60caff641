use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{error, info, instrument, warn};

use super::{Session, SessionStatus, StageName, StageResult};
use crate::analysis::Analyzer;
use crate::config::Config;
use crate::confidence::ConfidenceScorer;
use crate::error::{AppError, AppResult, StageError, StorageError};
use crate::gather::{PageFetcher, SourceCoordinator};
use crate::intent::{IntentAnalyzer, IntentOutcome};
use crate::model::ModelInvoker;
use crate::report::ReportGenerator;
use crate::storage::Storage;

/// Drives sessions through the four-stage pipeline.
///
/// The engine owns no session state between calls; everything it needs is
/// loaded from storage, and every transition is written back before the
/// call returns.
pub struct ResearchEngine {
    storage: Arc<dyn Storage>,
    intent: IntentAnalyzer,
    coordinator: SourceCoordinator,
    analyzer: Analyzer,
    report: ReportGenerator,
    scorer: ConfidenceScorer,
}

impl ResearchEngine {
    pub fn new(
        config: &Config,
        storage: Arc<dyn Storage>,
        model: Arc<dyn ModelInvoker>,
        fetcher: Arc<dyn PageFetcher>,
    ) -> Self {
        let max_attempts = config.request.max_extract_attempts;
        Self {
            storage,
            intent: IntentAnalyzer::new(
                Arc::clone(&model),
                config.confidence.threshold,
                max_attempts,
                5,
            ),
            coordinator: SourceCoordinator::new(
                Arc::clone(&model),
                fetcher,
                config.gather.clone(),
                max_attempts,
            ),
            analyzer: Analyzer::new(model, max_attempts),
            report: ReportGenerator::new(&config.report_dir),
            scorer: ConfidenceScorer::new(config.confidence.clone()),
        }
    }

    /// Create and persist a new session. Nothing runs until `advance`.
    pub async fn start_session(&self, query: &str) -> AppResult<String> {
        let session = Session::new(query);
        self.storage.save_session(&session).await?;
        info!(session_id = %session.session_id, "session created");
        Ok(session.session_id)
    }

    /// Load a session, failing with `SessionNotFound` if absent.
    pub async fn get_session(&self, session_id: &str) -> AppResult<Session> {
        self.storage
            .load_session(session_id)
            .await?
            .ok_or_else(|| {
                AppError::Storage(StorageError::SessionNotFound {
                    session_id: session_id.to_string(),
                })
            })
    }

    /// Run the session forward as far as it can go.
    ///
    /// Completed stages are never re-run. The call returns early when the
    /// intent stage suspends for clarification (and `answers` is how the
    /// caller supplies the user's replies on resume), or when a stage
    /// fails, which parks the session in the error state.
    #[instrument(skip_all, fields(session_id = %session_id))]
    pub async fn advance(
        &self,
        session_id: &str,
        answers: Option<BTreeMap<String, String>>,
    ) -> AppResult<SessionStatus> {
        let mut session = self.get_session(session_id).await?;

        match session.status {
            SessionStatus::Completed => return Ok(SessionStatus::Completed),
            SessionStatus::Error => {
                warn!("session is in the error state; not advancing");
                return Ok(SessionStatus::Error);
            }
            SessionStatus::PendingClarification if answers.is_none() => {
                // Without new input, re-running intent would just ask again.
                return Ok(SessionStatus::PendingClarification);
            }
            _ => {}
        }

        if let Some(answers) = answers {
            session.clarification_answers.extend(answers);
            session.touch();
        }
        session.status = SessionStatus::InProgress;

        for stage in StageName::ALL {
            if session.stage_completed(stage) {
                continue;
            }

            info!(stage = %stage, "running stage");
            match self.run_stage(stage, &mut session).await {
                Ok(StageOutcome::Completed) => {
                    self.storage.save_session(&session).await?;
                }
                Ok(StageOutcome::Suspended) => {
                    session.status = SessionStatus::PendingClarification;
                    session.touch();
                    self.storage.save_session(&session).await?;
                    return Ok(SessionStatus::PendingClarification);
                }
                Err(e) => {
                    error!(stage = %stage, error = %e, "stage failed");
                    session.fail_stage(stage, &e.message);
                    self.storage.save_session(&session).await?;
                    return Ok(SessionStatus::Error);
                }
            }
        }

        session.overall_confidence = Some(self.scorer.score_overall(&session.stage_scores()));
        session.status = SessionStatus::Completed;
        session.touch();
        self.storage.save_session(&session).await?;

        info!(
            confidence = session
                .overall_confidence
                .as_ref()
                .map(|c| c.score)
                .unwrap_or(0.0),
            "session completed"
        );
        Ok(SessionStatus::Completed)
    }

    async fn run_stage(
        &self,
        stage: StageName,
        session: &mut Session,
    ) -> Result<StageOutcome, StageError> {
        match stage {
            StageName::IntentAnalysis => self.run_intent(session).await,
            StageName::DataGathering => self.run_gathering(session).await,
            StageName::Analysis => self.run_analysis(session).await,
            StageName::ReportGeneration => self.run_report(session).await,
        }
    }

    async fn run_intent(&self, session: &mut Session) -> Result<StageOutcome, StageError> {
        let answers = if session.clarification_answers.is_empty() {
            None
        } else {
            Some(&session.clarification_answers)
        };

        match self.intent.analyze(&session.initial_query, answers).await {
            IntentOutcome::Ready(intent) => {
                let degraded = intent.degraded;
                let result = StageResult::Intent(intent);
                let score = self.scorer.score_stage(&result);
                session.complete_stage(StageName::IntentAnalysis, result, score, degraded);
                Ok(StageOutcome::Completed)
            }
            IntentOutcome::NeedsClarification { questions, .. } => {
                session.clarifying_questions = questions;
                Ok(StageOutcome::Suspended)
            }
        }
    }

    async fn run_gathering(&self, session: &mut Session) -> Result<StageOutcome, StageError> {
        let intent = session
            .intent()
            .cloned()
            .ok_or_else(|| missing_dependency(StageName::DataGathering, "intent analysis"))?;

        let gathering = self.coordinator.gather(&intent).await;
        let degraded = gathering.degraded;
        let result = StageResult::Gathering(gathering);
        let score = self.scorer.score_stage(&result);
        session.complete_stage(StageName::DataGathering, result, score, degraded);
        Ok(StageOutcome::Completed)
    }

    async fn run_analysis(&self, session: &mut Session) -> Result<StageOutcome, StageError> {
        let intent = session
            .intent()
            .cloned()
            .ok_or_else(|| missing_dependency(StageName::Analysis, "intent analysis"))?;
        let gathering = session
            .gathering()
            .cloned()
            .ok_or_else(|| missing_dependency(StageName::Analysis, "data gathering"))?;

        let analysis = self.analyzer.analyze(&intent, &gathering).await;
        let degraded = analysis.degraded;
        let result = StageResult::Analysis(analysis);
        let score = self.scorer.score_stage(&result);
        session.complete_stage(StageName::Analysis, result, score, degraded);
        Ok(StageOutcome::Completed)
    }

    async fn run_report(&self, session: &mut Session) -> Result<StageOutcome, StageError> {
        let intent = session
            .intent()
            .cloned()
            .ok_or_else(|| missing_dependency(StageName::ReportGeneration, "intent analysis"))?;
        let gathering = session
            .gathering()
            .cloned()
            .ok_or_else(|| missing_dependency(StageName::ReportGeneration, "data gathering"))?;
        let analysis = session
            .analysis()
            .cloned()
            .ok_or_else(|| missing_dependency(StageName::ReportGeneration, "analysis"))?;

        let report = self
            .report
            .generate(
                &session.session_id,
                &session.initial_query,
                &intent,
                &gathering,
                &analysis,
            )
            .await
            .map_err(|e| StageError::new(StageName::ReportGeneration, e.to_string()))?;

        session.final_report = Some(report.path.clone());
        let result = StageResult::Report(report);
        let score = self.scorer.score_stage(&result);
        session.complete_stage(StageName::ReportGeneration, result, score, false);
        Ok(StageOutcome::Completed)
    }
}

enum StageOutcome {
    Completed,
    Suspended,
}

fn missing_dependency(stage: StageName, dependency: &str) -> StageError {
    StageError::new(stage, format!("required {} result is missing", dependency))
}
