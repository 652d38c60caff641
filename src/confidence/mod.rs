//! Confidence scoring for pipeline stages.
//!
//! Every factor is computed deterministically from the stage result and
//! clamped to [0,100]. The overall score is a weighted sum over the stages
//! that actually completed, renormalized so a stage that never ran does not
//! silently drag the score toward zero.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::analysis::AnalysisResult;
use crate::config::ConfidenceConfig;
use crate::gather::{GatheringResult, SourceKind};
use crate::intent::IntentResult;
use crate::pipeline::{StageName, StageResult};
use crate::report::ReportResult;

/// Discrete confidence band derived from configurable score thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceLevel {
    High,
    Medium,
    Low,
}

impl std::fmt::Display for ConfidenceLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfidenceLevel::High => write!(f, "high"),
            ConfidenceLevel::Medium => write!(f, "medium"),
            ConfidenceLevel::Low => write!(f, "low"),
        }
    }
}

/// Confidence assessment for one stage or for the whole session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfidenceScore {
    /// Overall numeric score, 0-100.
    pub score: f64,
    /// Band the score falls in.
    pub level: ConfidenceLevel,
    /// Named sub-scores, each in [0,100].
    pub factors: BTreeMap<String, f64>,
    /// Advisory text; never blocks pipeline progress.
    pub recommendations: Vec<String>,
}

/// Fixed aggregation weight for a stage, in percent. Sums to 100 across
/// the four stages.
fn stage_weight(stage: StageName) -> f64 {
    match stage {
        StageName::IntentAnalysis => 15.0,
        StageName::DataGathering => 35.0,
        StageName::Analysis => 30.0,
        StageName::ReportGeneration => 20.0,
    }
}

/// Computes per-stage and overall confidence scores.
#[derive(Debug, Clone)]
pub struct ConfidenceScorer {
    config: ConfidenceConfig,
}

impl ConfidenceScorer {
    pub fn new(config: ConfidenceConfig) -> Self {
        Self { config }
    }

    /// Score a finalized stage result.
    pub fn score_stage(&self, result: &StageResult) -> ConfidenceScore {
        match result {
            StageResult::Intent(intent) => self.score_intent(intent),
            StageResult::Gathering(gathering) => self.score_gathering(gathering),
            StageResult::Analysis(analysis) => self.score_analysis(analysis),
            StageResult::Report(report) => self.score_report(report),
        }
    }

    fn score_intent(&self, intent: &IntentResult) -> ConfidenceScore {
        let mut factors = BTreeMap::new();

        let mut clarity = 50.0;
        if !intent.research_questions.is_empty() {
            clarity += 20.0;
        }
        if intent.key_entities.len() >= 2 {
            clarity += 15.0;
        }
        if intent.scope == "specific" {
            clarity += 15.0;
        }
        factors.insert("clarity".to_string(), clamp(clarity));

        let mut completeness = 0.0;
        if !intent.research_type.is_empty() {
            completeness += 25.0;
        }
        if !intent.domain.is_empty() {
            completeness += 25.0;
        }
        if !intent.key_entities.is_empty() {
            completeness += 25.0;
        }
        if !intent.research_questions.is_empty() {
            completeness += 25.0;
        }
        factors.insert("completeness".to_string(), clamp(completeness));

        let mut specificity = 50.0;
        if intent.research_type != "general_research" {
            specificity += 20.0;
        }
        if intent.domain != "general" {
            specificity += 15.0;
        }
        if intent.key_entities.len() >= 3 {
            specificity += 15.0;
        }
        factors.insert("specificity".to_string(), clamp(specificity));

        factors.insert(
            "extraction_integrity".to_string(),
            if intent.degraded { 25.0 } else { 100.0 },
        );

        self.finish(StageName::IntentAnalysis, factors)
    }

    fn score_gathering(&self, gathering: &GatheringResult) -> ConfidenceScore {
        let mut factors = BTreeMap::new();

        let data_quality = if gathering.sources.is_empty() {
            0.0
        } else {
            let count_score = (gathering.sources.len() as f64 * 12.0).min(70.0);
            let avg_len = gathering
                .sources
                .iter()
                .map(|s| s.content.len())
                .sum::<usize>() as f64
                / gathering.sources.len() as f64;
            let depth_bonus = (avg_len / 100.0).min(30.0);
            count_score + depth_bonus
        };
        factors.insert("data_quality".to_string(), clamp(data_quality));

        let reliability = if gathering.sources.is_empty() {
            0.0
        } else {
            gathering
                .sources
                .iter()
                .map(|s| s.reliability * 100.0)
                .sum::<f64>()
                / gathering.sources.len() as f64
        };
        factors.insert("source_reliability".to_string(), clamp(reliability));

        // Document tier is a placeholder; it does not count toward coverage.
        let expected_tiers = [
            SourceKind::InternalKnowledge,
            SourceKind::GroundedSearch,
            SourceKind::ScrapedPage,
        ];
        let covered = expected_tiers
            .iter()
            .filter(|kind| gathering.sources.iter().any(|s| s.kind == **kind))
            .count();
        let coverage = covered as f64 / expected_tiers.len() as f64 * 100.0;
        factors.insert("coverage_completeness".to_string(), clamp(coverage));

        self.finish(StageName::DataGathering, factors)
    }

    fn score_analysis(&self, analysis: &AnalysisResult) -> ConfidenceScore {
        let mut factors = BTreeMap::new();

        factors.insert(
            "theme_coverage".to_string(),
            clamp((analysis.themes.len() as f64 * 25.0).min(100.0)),
        );

        // Finding conflicts is evidence the detection pass did real work;
        // an empty set is acceptable but proves nothing.
        let conflict_detection = if analysis.conflicts.is_empty() { 70.0 } else { 85.0 };
        factors.insert("conflict_detection".to_string(), conflict_detection);

        let mut breadth = 0.0;
        let exec_len = analysis.summaries.executive.len();
        if exec_len > 0 {
            breadth += 40.0;
        }
        if (200..=2000).contains(&exec_len) {
            breadth += 20.0;
        }
        for present in [
            analysis.summaries.comparison.is_some(),
            analysis.summaries.timeline.is_some(),
            analysis.summaries.pros_cons.is_some(),
        ] {
            if present {
                breadth += 15.0;
            }
        }
        factors.insert("synthesis_breadth".to_string(), clamp(breadth));

        factors.insert(
            "extraction_integrity".to_string(),
            if analysis.degraded { 25.0 } else { 100.0 },
        );

        self.finish(StageName::Analysis, factors)
    }

    fn score_report(&self, report: &ReportResult) -> ConfidenceScore {
        let mut factors = BTreeMap::new();

        factors.insert(
            "completeness".to_string(),
            clamp((report.sections as f64 * 25.0).min(100.0)),
        );

        let citation_quality = match report.citations {
            0 => 30.0,
            1..=2 => 50.0,
            3..=4 => 70.0,
            _ => 90.0,
        };
        factors.insert("citation_quality".to_string(), citation_quality);

        let structure = if (300..=10_000).contains(&report.word_count) {
            100.0
        } else {
            50.0
        };
        factors.insert("structure".to_string(), structure);

        self.finish(StageName::ReportGeneration, factors)
    }

    /// Aggregate per-stage scores into the session-level score using fixed
    /// weights renormalized over the stages that completed.
    pub fn score_overall(
        &self,
        stage_scores: &BTreeMap<StageName, ConfidenceScore>,
    ) -> ConfidenceScore {
        let mut weighted = 0.0;
        let mut total_weight = 0.0;
        let mut factors = BTreeMap::new();

        for (stage, score) in stage_scores {
            let weight = stage_weight(*stage);
            weighted += score.score * weight;
            total_weight += weight;
            factors.insert(stage.to_string(), clamp(score.score));
        }

        let score = if total_weight > 0.0 {
            clamp(weighted / total_weight)
        } else {
            0.0
        };

        let mut recommendations = Vec::new();
        if let Some((weakest, weakest_score)) = stage_scores
            .iter()
            .min_by(|a, b| a.1.score.total_cmp(&b.1.score))
        {
            if weakest_score.score < self.config.threshold {
                recommendations.push(format!(
                    "Consider improving {} (currently {:.1})",
                    weakest, weakest_score.score
                ));
            }
        }
        if score < self.config.threshold {
            recommendations.push(format!(
                "Overall confidence ({:.1}) is below threshold ({:.1}); consider additional research or a narrower scope",
                score, self.config.threshold
            ));
        }

        ConfidenceScore {
            score,
            level: self.level_for(score),
            factors,
            recommendations,
        }
    }

    fn finish(&self, stage: StageName, factors: BTreeMap<String, f64>) -> ConfidenceScore {
        let score = if factors.is_empty() {
            0.0
        } else {
            clamp(factors.values().sum::<f64>() / factors.len() as f64)
        };

        let mut recommendations = Vec::new();
        for (name, value) in &factors {
            if *value < self.config.threshold {
                recommendations.push(format!(
                    "{}: {} is weak ({:.1})",
                    stage, name, value
                ));
            }
        }

        ConfidenceScore {
            score,
            level: self.level_for(score),
            factors,
            recommendations,
        }
    }

    fn level_for(&self, score: f64) -> ConfidenceLevel {
        if score >= self.config.high_band {
            ConfidenceLevel::High
        } else if score >= self.config.medium_band {
            ConfidenceLevel::Medium
        } else {
            ConfidenceLevel::Low
        }
    }

    /// The clarification threshold this scorer was configured with.
    pub fn threshold(&self) -> f64 {
        self.config.threshold
    }
}

fn clamp(value: f64) -> f64 {
    value.clamp(0.0, 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gather::SourceItem;

    fn scorer() -> ConfidenceScorer {
        ConfidenceScorer::new(ConfidenceConfig::default())
    }

    fn score(value: f64) -> ConfidenceScore {
        ConfidenceScore {
            score: value,
            level: ConfidenceLevel::Medium,
            factors: BTreeMap::new(),
            recommendations: Vec::new(),
        }
    }

    #[test]
    fn test_overall_weights_renormalize_to_plain_average_shape() {
        // All four stages at the same score must yield exactly that score.
        let mut stages = BTreeMap::new();
        stages.insert(StageName::IntentAnalysis, score(80.0));
        stages.insert(StageName::DataGathering, score(80.0));
        stages.insert(StageName::Analysis, score(80.0));
        stages.insert(StageName::ReportGeneration, score(80.0));

        let overall = scorer().score_overall(&stages);
        assert!((overall.score - 80.0).abs() < 1e-9);
    }

    #[test]
    fn test_overall_is_weighted_when_scores_differ() {
        let mut stages = BTreeMap::new();
        stages.insert(StageName::IntentAnalysis, score(100.0));
        stages.insert(StageName::DataGathering, score(0.0));
        stages.insert(StageName::Analysis, score(100.0));
        stages.insert(StageName::ReportGeneration, score(100.0));

        // 15 + 30 + 20 = 65 out of 100.
        let overall = scorer().score_overall(&stages);
        assert!((overall.score - 65.0).abs() < 1e-9);
    }

    #[test]
    fn test_missing_stage_renormalizes_instead_of_counting_zero() {
        let mut stages = BTreeMap::new();
        stages.insert(StageName::IntentAnalysis, score(90.0));
        stages.insert(StageName::DataGathering, score(90.0));

        let overall = scorer().score_overall(&stages);
        assert!((overall.score - 90.0).abs() < 1e-9);
    }

    #[test]
    fn test_no_completed_stages_scores_zero() {
        let overall = scorer().score_overall(&BTreeMap::new());
        assert_eq!(overall.score, 0.0);
        assert_eq!(overall.level, ConfidenceLevel::Low);
    }

    #[test]
    fn test_empty_gathering_has_zero_data_quality() {
        let gathering = GatheringResult::default();
        let result = scorer().score_gathering(&gathering);
        assert_eq!(result.factors["data_quality"], 0.0);
        assert_eq!(result.factors["source_reliability"], 0.0);
    }

    #[test]
    fn test_gathering_factors_stay_in_range() {
        let mut gathering = GatheringResult::default();
        for i in 0..50 {
            gathering.sources.push(SourceItem {
                kind: SourceKind::ScrapedPage,
                origin: format!("https://example.com/{}", i),
                content: "x".repeat(10_000),
                reliability: 0.9,
                depth: 1,
            });
        }
        let result = scorer().score_gathering(&gathering);
        for (name, value) in &result.factors {
            assert!((0.0..=100.0).contains(value), "{} out of range: {}", name, value);
        }
        assert!((0.0..=100.0).contains(&result.score));
    }

    #[test]
    fn test_low_overall_emits_recommendations() {
        let mut stages = BTreeMap::new();
        stages.insert(StageName::DataGathering, score(20.0));

        let overall = scorer().score_overall(&stages);
        assert_eq!(overall.level, ConfidenceLevel::Low);
        assert!(overall
            .recommendations
            .iter()
            .any(|r| r.contains("data_gathering")));
    }

    #[test]
    fn test_level_bands() {
        let s = scorer();
        assert_eq!(s.level_for(92.0), ConfidenceLevel::High);
        assert_eq!(s.level_for(85.0), ConfidenceLevel::High);
        assert_eq!(s.level_for(70.0), ConfidenceLevel::Medium);
        assert_eq!(s.level_for(59.9), ConfidenceLevel::Low);
    }

    #[test]
    fn test_degraded_intent_lowers_extraction_integrity() {
        let mut intent = IntentResult::fallback("query");
        intent.degraded = true;
        let degraded = scorer().score_intent(&intent);
        intent.degraded = false;
        let clean = scorer().score_intent(&intent);
        assert!(degraded.score < clean.score);
        assert_eq!(degraded.factors["extraction_integrity"], 25.0);
    }
}
