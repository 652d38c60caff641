//! Synthesis over gathered sources: themes, summaries, and the optional
//! comparison/timeline/pros-cons artifacts the intent asked for.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};

use crate::extract::{extract_with_retry, ExpectedShape};
use crate::gather::{ConflictRecord, GatheringResult, SourceItem};
use crate::intent::IntentResult;
use crate::model::ModelInvoker;
use crate::prompts;

/// A recurring idea across sources, with supporting evidence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Theme {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub evidence: Vec<String>,
}

/// The written syntheses. The executive summary is always produced; the
/// rest only when the intent requested them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Summaries {
    pub executive: String,
    pub comparison: Option<serde_json::Value>,
    pub timeline: Option<serde_json::Value>,
    pub pros_cons: Option<serde_json::Value>,
}

/// Everything the analysis stage produced.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub themes: Vec<Theme>,
    /// Conflicts detected during gathering, carried through for reporting.
    pub conflicts: Vec<ConflictRecord>,
    pub summaries: Summaries,
    /// True when any synthesis fell back.
    pub degraded: bool,
}

pub struct Analyzer {
    model: Arc<dyn ModelInvoker>,
    max_extract_attempts: u32,
}

impl Analyzer {
    pub fn new(model: Arc<dyn ModelInvoker>, max_extract_attempts: u32) -> Self {
        Self {
            model,
            max_extract_attempts,
        }
    }

    /// Synthesize the gathered material against the analyzed intent.
    pub async fn analyze(
        &self,
        intent: &IntentResult,
        gathering: &GatheringResult,
    ) -> AnalysisResult {
        let mut result = AnalysisResult {
            conflicts: gathering.conflicts.clone(),
            ..AnalysisResult::default()
        };

        let digest = findings_digest(&gathering.sources);

        result.themes = self.extract_themes(&digest, &mut result.degraded).await;
        result.summaries.executive = self
            .executive_summary(intent, &result.themes, &digest, &mut result.degraded)
            .await;

        if intent.output_preferences.comparison {
            result.summaries.comparison = self
                .synthesize(prompts::COMPARISON, ExpectedShape::Object, &digest, &mut result.degraded)
                .await;
        }
        if intent.output_preferences.timeline {
            result.summaries.timeline = self
                .synthesize(prompts::TIMELINE, ExpectedShape::Array, &digest, &mut result.degraded)
                .await;
        }
        if intent.output_preferences.pros_cons {
            result.summaries.pros_cons = self
                .synthesize(prompts::PROS_CONS, ExpectedShape::Object, &digest, &mut result.degraded)
                .await;
        }

        debug!(
            themes = result.themes.len(),
            conflicts = result.conflicts.len(),
            degraded = result.degraded,
            "analysis complete"
        );
        result
    }

    async fn extract_themes(&self, digest: &str, degraded: &mut bool) -> Vec<Theme> {
        let prompt = format!("{}\n{}", prompts::THEME_EXTRACTION, digest);
        let extracted = extract_with_retry(
            || self.model.invoke(&prompt),
            ExpectedShape::Array,
            json!([]),
            self.max_extract_attempts,
        )
        .await;

        if extracted.degraded {
            *degraded = true;
        }

        serde_json::from_value::<Vec<Theme>>(extracted.value)
            .unwrap_or_default()
            .into_iter()
            .filter(|t| !t.name.trim().is_empty())
            .collect()
    }

    /// Plain-text summary; on model failure a deterministic sentence built
    /// from the themes stands in.
    async fn executive_summary(
        &self,
        intent: &IntentResult,
        themes: &[Theme],
        digest: &str,
        degraded: &mut bool,
    ) -> String {
        let prompt = format!("{}\n{}", prompts::EXECUTIVE_SUMMARY, digest);
        match self.model.invoke(&prompt).await {
            Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
            Ok(_) | Err(_) => {
                warn!("executive summary generation failed, using fallback text");
                *degraded = true;
                fallback_summary(intent, themes)
            }
        }
    }

    async fn synthesize(
        &self,
        template: &str,
        shape: ExpectedShape,
        digest: &str,
        degraded: &mut bool,
    ) -> Option<serde_json::Value> {
        let prompt = format!("{}\n{}", template, digest);
        let fallback = match shape {
            ExpectedShape::Array => json!([]),
            ExpectedShape::Object => json!({}),
        };

        let extracted = extract_with_retry(
            || self.model.invoke(&prompt),
            shape,
            fallback,
            self.max_extract_attempts,
        )
        .await;

        if extracted.degraded {
            *degraded = true;
            return None;
        }
        Some(extracted.value)
    }
}

fn fallback_summary(intent: &IntentResult, themes: &[Theme]) -> String {
    if themes.is_empty() {
        format!(
            "Research into \"{}\" completed, but the collected material did not support an automated summary.",
            intent.initial_summary()
        )
    } else {
        let names: Vec<&str> = themes.iter().map(|t| t.name.as_str()).collect();
        format!(
            "Research into \"{}\" surfaced the following themes: {}.",
            intent.initial_summary(),
            names.join(", ")
        )
    }
}

/// Bounded digest of source material fed to the synthesis prompts.
fn findings_digest(sources: &[SourceItem]) -> String {
    const PER_SOURCE: usize = 800;
    sources
        .iter()
        .map(|s| {
            let mut content = s.content.as_str();
            if content.len() > PER_SOURCE {
                let mut end = PER_SOURCE;
                while !content.is_char_boundary(end) {
                    end -= 1;
                }
                content = &content[..end];
            }
            format!("[{} | reliability {:.2}] {}: {}", s.kind, s.reliability, s.origin, content)
        })
        .collect::<Vec<_>>()
        .join("\n")
}
