//! Markdown report assembly.
//!
//! The generator renders the session's findings into a markdown document on
//! disk and returns counting metadata for confidence scoring. Every gathered
//! source appears in the bibliography, whether or not the synthesis cited it.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::analysis::AnalysisResult;
use crate::error::{AppError, AppResult};
use crate::gather::GatheringResult;
use crate::intent::IntentResult;

/// Where the report landed and what went into it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportResult {
    /// Path of the written markdown file.
    pub path: String,
    pub sections: u32,
    /// Bibliography entries.
    pub citations: u32,
    pub word_count: u32,
}

pub struct ReportGenerator {
    report_dir: PathBuf,
}

impl ReportGenerator {
    pub fn new(report_dir: &Path) -> Self {
        Self {
            report_dir: report_dir.to_path_buf(),
        }
    }

    /// Render and write the report for a session.
    pub async fn generate(
        &self,
        session_id: &str,
        query: &str,
        intent: &IntentResult,
        gathering: &GatheringResult,
        analysis: &AnalysisResult,
    ) -> AppResult<ReportResult> {
        let (markdown, sections) = render(query, intent, gathering, analysis);
        let word_count = markdown.split_whitespace().count() as u32;

        tokio::fs::create_dir_all(&self.report_dir)
            .await
            .map_err(|e| AppError::Internal {
                message: format!("creating report directory: {}", e),
            })?;

        let path = self.report_dir.join(format!("{}.md", session_id));
        tokio::fs::write(&path, &markdown)
            .await
            .map_err(|e| AppError::Internal {
                message: format!("writing report {}: {}", path.display(), e),
            })?;

        info!(path = %path.display(), sections, word_count, "report written");

        Ok(ReportResult {
            path: path.display().to_string(),
            sections,
            citations: gathering.sources.len() as u32,
            word_count,
        })
    }
}

/// Render the markdown document; returns the text and its section count.
fn render(
    query: &str,
    intent: &IntentResult,
    gathering: &GatheringResult,
    analysis: &AnalysisResult,
) -> (String, u32) {
    let mut out = String::new();
    let mut sections = 0u32;

    out.push_str(&format!("# Research Report: {}\n\n", query.trim()));

    sections += 1;
    out.push_str("## Executive Summary\n\n");
    out.push_str(analysis.summaries.executive.trim());
    out.push_str("\n\n");

    if !analysis.themes.is_empty() {
        sections += 1;
        out.push_str("## Key Findings\n\n");
        for theme in &analysis.themes {
            out.push_str(&format!("### {}\n\n{}\n\n", theme.name, theme.description));
            for evidence in &theme.evidence {
                out.push_str(&format!("- {}\n", evidence));
            }
            if !theme.evidence.is_empty() {
                out.push('\n');
            }
        }
    }

    if intent.output_preferences.comparison {
        if let Some(comparison) = &analysis.summaries.comparison {
            sections += 1;
            out.push_str("## Comparison\n\n");
            render_comparison(&mut out, comparison);
        }
    }

    if intent.output_preferences.timeline {
        if let Some(timeline) = &analysis.summaries.timeline {
            sections += 1;
            out.push_str("## Timeline\n\n");
            render_timeline(&mut out, timeline);
        }
    }

    if intent.output_preferences.pros_cons {
        if let Some(pros_cons) = &analysis.summaries.pros_cons {
            sections += 1;
            out.push_str("## Pros and Cons\n\n");
            render_pros_cons(&mut out, pros_cons);
        }
    }

    if !analysis.conflicts.is_empty() {
        sections += 1;
        out.push_str("## Conflicting Information\n\n");
        out.push_str("Sources disagreed on the following points; both positions are reported.\n\n");
        for conflict in &analysis.conflicts {
            out.push_str(&format!("### {}\n\n", conflict.topic));
            for claim in &conflict.claims {
                out.push_str(&format!("- **{}**: {}\n", claim.origin, claim.claim));
            }
            out.push('\n');
        }
    }

    sections += 1;
    out.push_str("## Bibliography\n\n");
    if gathering.sources.is_empty() {
        out.push_str("No sources were collected for this session.\n");
    } else {
        for (i, source) in gathering.sources.iter().enumerate() {
            out.push_str(&format!(
                "{}. [{}] {} (reliability {:.2})\n",
                i + 1,
                source.kind,
                source.origin,
                source.reliability
            ));
        }
    }

    (out, sections)
}

fn render_comparison(out: &mut String, value: &serde_json::Value) {
    let criteria: Vec<&str> = value
        .get("criteria")
        .and_then(|c| c.as_array())
        .map(|items| items.iter().filter_map(|v| v.as_str()).collect())
        .unwrap_or_default();
    let subjects = value
        .get("subjects")
        .and_then(|s| s.as_array())
        .cloned()
        .unwrap_or_default();

    if criteria.is_empty() || subjects.is_empty() {
        render_json_fallback(out, value);
        return;
    }

    out.push_str(&format!("| Subject | {} |\n", criteria.join(" | ")));
    out.push_str(&format!("|---|{}\n", "---|".repeat(criteria.len())));
    for subject in &subjects {
        let name = subject.get("name").and_then(|n| n.as_str()).unwrap_or("-");
        let cells: Vec<String> = criteria
            .iter()
            .map(|criterion| {
                subject
                    .get("assessments")
                    .and_then(|a| a.get(*criterion))
                    .and_then(|v| v.as_str())
                    .unwrap_or("-")
                    .to_string()
            })
            .collect();
        out.push_str(&format!("| {} | {} |\n", name, cells.join(" | ")));
    }
    out.push('\n');
}

fn render_timeline(out: &mut String, value: &serde_json::Value) {
    let Some(entries) = value.as_array() else {
        render_json_fallback(out, value);
        return;
    };
    for entry in entries {
        let date = entry.get("date").and_then(|v| v.as_str()).unwrap_or("?");
        let event = entry.get("event").and_then(|v| v.as_str()).unwrap_or("");
        match entry.get("significance").and_then(|v| v.as_str()) {
            Some(significance) => {
                out.push_str(&format!("- **{}**: {} ({})\n", date, event, significance))
            }
            None => out.push_str(&format!("- **{}**: {}\n", date, event)),
        }
    }
    out.push('\n');
}

fn render_pros_cons(out: &mut String, value: &serde_json::Value) {
    for (key, heading) in [("pros", "Pros"), ("cons", "Cons")] {
        let Some(points) = value.get(key).and_then(|v| v.as_array()) else {
            continue;
        };
        out.push_str(&format!("### {}\n\n", heading));
        for point in points {
            let text = point.get("point").and_then(|v| v.as_str()).unwrap_or("");
            match point.get("support").and_then(|v| v.as_str()) {
                Some(support) if !support.is_empty() => {
                    out.push_str(&format!("- {} ({})\n", text, support))
                }
                _ => out.push_str(&format!("- {}\n", text)),
            }
        }
        out.push('\n');
    }
}

/// When a synthesis artifact does not match the expected layout, embed it
/// verbatim rather than dropping it.
fn render_json_fallback(out: &mut String, value: &serde_json::Value) {
    let pretty = serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string());
    out.push_str(&format!("```json\n{}\n```\n\n", pretty));
}
