//! Prompt templates for every model-facing operation.
//!
//! Each template that expects structured output states the exact JSON shape
//! and forbids surrounding prose; the extractor still tolerates fenced or
//! chatty replies, but asking precisely keeps retry rates down.

/// Intent analysis over the initial query (optionally with clarification
/// answers appended by the caller). Expects a single JSON object.
pub const INTENT_ANALYSIS: &str = r#"Analyze the following research query and respond with ONLY a JSON object, no prose, using exactly this shape:
{
  "research_type": "comparison|historical|technical|market_analysis|general_research",
  "domain": "short domain label, e.g. technology, medicine, finance, general",
  "scope": "broad|specific",
  "key_entities": ["entity", ...],
  "research_questions": ["question to investigate", ...],
  "output_preferences": ["comparison", "timeline", "pros_cons"],
  "analysis_confidence": 0-100,
  "missing_information": ["what is unclear or absent from the query", ...]
}
Include only the output_preferences the query actually calls for. Set analysis_confidence to how well the query supports a focused research plan.

Query:"#;

/// Clarifying-question generation from an intent analysis. Expects a JSON
/// array of question objects.
pub const CLARIFYING_QUESTIONS: &str = r#"The research query below is ambiguous. Given the analysis, write the clarifying questions whose answers would most improve the research. Respond with ONLY a JSON array:
[
  {
    "question": "the question to ask",
    "purpose": "what the answer disambiguates",
    "examples": ["plausible answer", ...]
  }
]
Ask only what is genuinely needed, at most a handful of questions.

"#;

/// Search-query generation from an intent analysis. Expects a JSON array
/// of strings.
pub const SEARCH_QUERIES: &str = r#"Given this research intent, produce the web search queries that together cover the research questions. Respond with ONLY a JSON array of strings:
["query one", "query two", ...]

Intent:"#;

/// Internal-knowledge answer for a single research question. Plain text.
pub const INTERNAL_KNOWLEDGE: &str = r#"Answer the following research question from your own knowledge, concisely and factually. Note where your knowledge may be outdated or uncertain.

Question:"#;

/// Conflict detection across collected source material. Expects a JSON
/// array; an empty array means no conflicts were found.
pub const CONFLICT_DETECTION: &str = r#"Review the collected source material below and identify claims that contradict each other across sources. Respond with ONLY a JSON array (empty if there are no conflicts):
[
  {
    "topic": "what the disagreement is about",
    "claims": [
      {"origin": "source identifier", "claim": "what that source asserts"}
    ]
  }
]

Sources:"#;

/// Theme extraction across collected source material. Expects a JSON array.
pub const THEME_EXTRACTION: &str = r#"Identify the major themes in the source material below. Respond with ONLY a JSON array:
[
  {
    "name": "theme name",
    "description": "one or two sentences",
    "evidence": ["supporting point drawn from the sources", ...]
  }
]

Sources:"#;

/// Executive summary over themes and sources. Plain text, a few paragraphs.
pub const EXECUTIVE_SUMMARY: &str = r#"Write an executive summary of the research findings below: two to four paragraphs, plain text, no headings. Lead with the most decision-relevant findings and note significant disagreements between sources.

Findings:"#;

/// Comparison matrix synthesis. Expects a JSON object.
pub const COMPARISON: &str = r#"Build a comparison from the research findings below. Respond with ONLY a JSON object:
{
  "criteria": ["criterion", ...],
  "subjects": [
    {"name": "subject", "assessments": {"criterion": "assessment", ...}}
  ]
}

Findings:"#;

/// Timeline synthesis. Expects a JSON array in chronological order.
pub const TIMELINE: &str = r#"Extract a chronological timeline from the research findings below. Respond with ONLY a JSON array, earliest first:
[
  {"date": "date or period", "event": "what happened", "significance": "why it matters"}
]

Findings:"#;

/// Pros/cons synthesis. Expects a JSON object.
pub const PROS_CONS: &str = r#"Derive the pros and cons from the research findings below. Respond with ONLY a JSON object:
{
  "pros": [{"point": "advantage", "support": "evidence"}],
  "cons": [{"point": "disadvantage", "support": "evidence"}]
}

Findings:"#;
