//! Intent analysis and the clarification loop.
//!
//! The analyzer turns a raw research query into a structured intent. When
//! the model's self-reported confidence is low or information is missing,
//! it produces clarifying questions instead; the engine suspends the
//! session until answers arrive. With answers in hand the analyzer always
//! proceeds, so one round of clarification is the ceiling.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};

use crate::extract::{extract_with_retry, ExpectedShape};
use crate::model::ModelInvoker;
use crate::prompts;

/// Output artifacts the query asked for beyond the standard report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputPreferences {
    #[serde(default)]
    pub comparison: bool,
    #[serde(default)]
    pub timeline: bool,
    #[serde(default)]
    pub pros_cons: bool,
}

/// Structured understanding of what the user wants researched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentResult {
    pub research_type: String,
    pub domain: String,
    /// "broad" or "specific".
    pub scope: String,
    pub key_entities: Vec<String>,
    pub research_questions: Vec<String>,
    pub output_preferences: OutputPreferences,
    /// Model-reported confidence in its own analysis, 0-100.
    pub analysis_confidence: f64,
    pub missing_information: Vec<String>,
    /// True when the analysis is the deterministic fallback.
    pub degraded: bool,
}

impl IntentResult {
    /// Deterministic fallback when extraction exhausts its attempts: treat
    /// the raw query as one broad research question with low confidence.
    pub fn fallback(query: &str) -> Self {
        Self {
            research_type: "general_research".to_string(),
            domain: "general".to_string(),
            scope: "broad".to_string(),
            key_entities: Vec::new(),
            research_questions: vec![query.to_string()],
            output_preferences: OutputPreferences::default(),
            analysis_confidence: 30.0,
            missing_information: vec![
                "scope of the research".to_string(),
                "time frame of interest".to_string(),
            ],
            degraded: true,
        }
    }

    /// Short plain-text rendering used when the full JSON form is not
    /// available.
    pub fn initial_summary(&self) -> String {
        format!(
            "{} research in {}: {}",
            self.research_type,
            self.domain,
            self.research_questions.join("; ")
        )
    }
}

/// One question to put to the user before research proceeds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClarifyingQuestion {
    pub question: String,
    #[serde(default)]
    pub purpose: String,
    #[serde(default)]
    pub examples: Vec<String>,
}

/// What intent analysis decided for this session.
#[derive(Debug, Clone)]
pub enum IntentOutcome {
    /// The intent is clear enough to research.
    Ready(IntentResult),
    /// Research should pause until the user answers.
    NeedsClarification {
        partial: IntentResult,
        questions: Vec<ClarifyingQuestion>,
    },
}

/// Wire shape of the model's intent analysis; everything is defaulted so a
/// partially conforming object still yields a usable intent.
#[derive(Debug, Deserialize)]
struct IntentWire {
    #[serde(default)]
    research_type: String,
    #[serde(default)]
    domain: String,
    #[serde(default)]
    scope: String,
    #[serde(default)]
    key_entities: Vec<String>,
    #[serde(default)]
    research_questions: Vec<String>,
    #[serde(default)]
    output_preferences: Vec<String>,
    #[serde(default)]
    analysis_confidence: f64,
    #[serde(default)]
    missing_information: Vec<String>,
}

pub struct IntentAnalyzer {
    model: Arc<dyn ModelInvoker>,
    /// Self-reported confidence below this triggers clarification.
    clarification_threshold: f64,
    max_extract_attempts: u32,
    max_questions: usize,
}

impl IntentAnalyzer {
    pub fn new(
        model: Arc<dyn ModelInvoker>,
        clarification_threshold: f64,
        max_extract_attempts: u32,
        max_questions: usize,
    ) -> Self {
        Self {
            model,
            clarification_threshold,
            max_extract_attempts,
            max_questions,
        }
    }

    /// Analyze the query, optionally with the user's clarification answers.
    ///
    /// With answers present the outcome is always `Ready`; the pipeline
    /// never asks twice.
    pub async fn analyze(
        &self,
        query: &str,
        answers: Option<&BTreeMap<String, String>>,
    ) -> IntentOutcome {
        let prompt = build_analysis_prompt(query, answers);

        let extracted = extract_with_retry(
            || self.model.invoke(&prompt),
            ExpectedShape::Object,
            fallback_value(query),
            self.max_extract_attempts,
        )
        .await;

        let mut intent = intent_from_value(query, extracted.value);
        intent.degraded = extracted.degraded;

        if answers.is_some() {
            debug!("clarification answers supplied, proceeding without further questions");
            return IntentOutcome::Ready(intent);
        }

        let needs_clarification = intent.analysis_confidence < self.clarification_threshold
            || !intent.missing_information.is_empty();
        if !needs_clarification {
            return IntentOutcome::Ready(intent);
        }

        let questions = self.generate_questions(query, &intent).await;
        if questions.is_empty() {
            // Nothing useful to ask; proceed with what we have.
            return IntentOutcome::Ready(intent);
        }

        info!(
            confidence = intent.analysis_confidence,
            questions = questions.len(),
            "intent needs clarification"
        );
        IntentOutcome::NeedsClarification {
            partial: intent,
            questions,
        }
    }

    async fn generate_questions(
        &self,
        query: &str,
        intent: &IntentResult,
    ) -> Vec<ClarifyingQuestion> {
        let context = json!({
            "query": query,
            "analysis_confidence": intent.analysis_confidence,
            "missing_information": intent.missing_information,
        });
        let prompt = format!("{}{}", prompts::CLARIFYING_QUESTIONS, context);

        let fallback: Vec<serde_json::Value> = intent
            .missing_information
            .iter()
            .map(|missing| {
                json!({
                    "question": format!("Could you clarify the {}?", missing),
                    "purpose": missing,
                    "examples": [],
                })
            })
            .collect();

        let extracted = extract_with_retry(
            || self.model.invoke(&prompt),
            ExpectedShape::Array,
            json!(fallback),
            self.max_extract_attempts,
        )
        .await;

        serde_json::from_value::<Vec<ClarifyingQuestion>>(extracted.value)
            .unwrap_or_default()
            .into_iter()
            .filter(|q| !q.question.trim().is_empty())
            .take(self.max_questions)
            .collect()
    }
}

fn build_analysis_prompt(query: &str, answers: Option<&BTreeMap<String, String>>) -> String {
    let mut prompt = format!("{} {}", prompts::INTENT_ANALYSIS, query);
    if let Some(answers) = answers {
        if !answers.is_empty() {
            prompt.push_str("\n\nThe user answered these clarifying questions:");
            for (question, answer) in answers {
                prompt.push_str(&format!("\n- {}: {}", question, answer));
            }
        }
    }
    prompt
}

fn fallback_value(query: &str) -> serde_json::Value {
    // Matches IntentResult::fallback modulo the degraded flag, which is
    // set from the extraction outcome.
    serde_json::to_value(IntentResult::fallback(query)).unwrap_or_else(|_| json!({}))
}

/// Map the extracted object into an IntentResult, filling gaps with the
/// fallback's conservative defaults.
fn intent_from_value(query: &str, value: serde_json::Value) -> IntentResult {
    let Ok(wire) = serde_json::from_value::<IntentWire>(value) else {
        return IntentResult::fallback(query);
    };

    let defaults = IntentResult::fallback(query);
    let prefs = OutputPreferences {
        comparison: wire.output_preferences.iter().any(|p| p == "comparison"),
        timeline: wire.output_preferences.iter().any(|p| p == "timeline"),
        pros_cons: wire.output_preferences.iter().any(|p| p == "pros_cons"),
    };

    IntentResult {
        research_type: non_empty_or(wire.research_type, defaults.research_type),
        domain: non_empty_or(wire.domain, defaults.domain),
        scope: non_empty_or(wire.scope, defaults.scope),
        key_entities: wire.key_entities,
        research_questions: if wire.research_questions.is_empty() {
            defaults.research_questions
        } else {
            wire.research_questions
        },
        output_preferences: prefs,
        analysis_confidence: wire.analysis_confidence.clamp(0.0, 100.0),
        missing_information: wire.missing_information,
        degraded: false,
    }
}

fn non_empty_or(value: String, default: String) -> String {
    if value.trim().is_empty() {
        default
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ModelError, ModelResult};
    use crate::model::SearchHit;
    use async_trait::async_trait;

    /// Model double that returns a fixed reply for analysis prompts.
    struct FixedModel {
        reply: String,
    }

    #[async_trait]
    impl ModelInvoker for FixedModel {
        async fn invoke(&self, _prompt: &str) -> ModelResult<String> {
            Ok(self.reply.clone())
        }

        async fn search(&self, _query: &str) -> ModelResult<Vec<SearchHit>> {
            Ok(Vec::new())
        }
    }

    /// Model double whose every call fails.
    struct DownModel;

    #[async_trait]
    impl ModelInvoker for DownModel {
        async fn invoke(&self, _prompt: &str) -> ModelResult<String> {
            Err(ModelError::Unavailable {
                message: "down".to_string(),
                retries: 3,
            })
        }

        async fn search(&self, _query: &str) -> ModelResult<Vec<SearchHit>> {
            Err(ModelError::Unavailable {
                message: "down".to_string(),
                retries: 3,
            })
        }
    }

    fn analyzer(model: Arc<dyn ModelInvoker>) -> IntentAnalyzer {
        IntentAnalyzer::new(model, 70.0, 2, 5)
    }

    fn confident_reply() -> String {
        json!({
            "research_type": "comparison",
            "domain": "technology",
            "scope": "specific",
            "key_entities": ["PostgreSQL", "MySQL"],
            "research_questions": ["How do they differ in replication?"],
            "output_preferences": ["comparison", "pros_cons"],
            "analysis_confidence": 90,
            "missing_information": []
        })
        .to_string()
    }

    #[tokio::test]
    async fn test_confident_analysis_is_ready() {
        let model = Arc::new(FixedModel {
            reply: confident_reply(),
        });
        let outcome = analyzer(model).analyze("postgres vs mysql", None).await;

        match outcome {
            IntentOutcome::Ready(intent) => {
                assert_eq!(intent.research_type, "comparison");
                assert!(intent.output_preferences.comparison);
                assert!(intent.output_preferences.pros_cons);
                assert!(!intent.output_preferences.timeline);
                assert!(!intent.degraded);
            }
            IntentOutcome::NeedsClarification { .. } => panic!("expected Ready"),
        }
    }

    #[tokio::test]
    async fn test_low_confidence_asks_questions() {
        // Single reply serves both the analysis call (object ignored fields)
        // and the question call would fail shape; use missing_information to
        // drive the fallback question path.
        let model = Arc::new(FixedModel {
            reply: json!({
                "research_type": "general_research",
                "domain": "general",
                "scope": "broad",
                "research_questions": ["what about it?"],
                "analysis_confidence": 40,
                "missing_information": ["time frame"]
            })
            .to_string(),
        });
        let outcome = analyzer(model).analyze("tell me about stuff", None).await;

        match outcome {
            IntentOutcome::NeedsClarification { partial, questions } => {
                assert_eq!(partial.analysis_confidence, 40.0);
                assert!(!questions.is_empty());
            }
            IntentOutcome::Ready(_) => panic!("expected NeedsClarification"),
        }
    }

    #[tokio::test]
    async fn test_answers_always_proceed() {
        let model = Arc::new(FixedModel {
            reply: json!({
                "analysis_confidence": 10,
                "missing_information": ["everything"]
            })
            .to_string(),
        });
        let mut answers = BTreeMap::new();
        answers.insert("time frame".to_string(), "last five years".to_string());

        let outcome = analyzer(model)
            .analyze("tell me about stuff", Some(&answers))
            .await;
        assert!(matches!(outcome, IntentOutcome::Ready(_)));
    }

    #[tokio::test]
    async fn test_model_outage_yields_degraded_fallback() {
        let outcome = analyzer(Arc::new(DownModel))
            .analyze("quantum computing outlook", None)
            .await;

        // Fallback has missing_information, so clarification is requested
        // with the deterministic questions.
        match outcome {
            IntentOutcome::NeedsClarification { partial, questions } => {
                assert!(partial.degraded);
                assert_eq!(
                    partial.research_questions,
                    vec!["quantum computing outlook".to_string()]
                );
                assert!(questions.iter().all(|q| q.question.contains("clarify")));
            }
            IntentOutcome::Ready(_) => panic!("expected NeedsClarification"),
        }
    }

    #[test]
    fn test_intent_from_partial_object_backfills_defaults() {
        let intent = intent_from_value(
            "the query",
            json!({"analysis_confidence": 80, "domain": "finance"}),
        );
        assert_eq!(intent.domain, "finance");
        assert_eq!(intent.research_type, "general_research");
        assert_eq!(intent.research_questions, vec!["the query".to_string()]);
    }

    #[test]
    fn test_confidence_is_clamped() {
        let intent = intent_from_value("q", json!({"analysis_confidence": 400}));
        assert_eq!(intent.analysis_confidence, 100.0);
    }
}
