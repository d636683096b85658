// file: src/models/summary.rs
// description: aggregated summary, task summary report and evaluation models
// reference: https://docs.rs/serde

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Parsed aggregation output. Models sometimes answer a string field with a
/// nested object or list; those are kept as their JSON text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregatedSummary {
    #[serde(deserialize_with = "string_or_json")]
    pub summary: String,
    #[serde(default, deserialize_with = "string_or_json")]
    pub justification: String,
    #[serde(default, deserialize_with = "string_or_json")]
    pub exclusion: String,
}

/// Terminal result of a task, delivered on the `summary` event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryReport {
    pub keyword: String,
    pub summary: String,
    pub justification: String,
    pub exclusion: String,
    pub prompt: String,
    pub sources: Vec<String>,
}

impl SummaryReport {
    pub fn new(
        keyword: &str,
        parsed: AggregatedSummary,
        prompt: &str,
        sources: Vec<String>,
    ) -> Self {
        Self {
            keyword: keyword.to_string(),
            summary: parsed.summary,
            justification: parsed.justification,
            exclusion: parsed.exclusion,
            prompt: prompt.replace(['*', '#'], ""),
            sources,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentenceScore {
    pub text: String,
    #[serde(default)]
    pub precision: f64,
    #[serde(default)]
    pub recall: f64,
    #[serde(default)]
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissingSentence {
    pub text: String,
    #[serde(default)]
    pub source: Vec<u32>,
    #[serde(default, deserialize_with = "string_or_json")]
    pub reasons: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    #[serde(default)]
    pub precision_recall: Vec<SentenceScore>,
    #[serde(default)]
    pub missing_sentences: Vec<MissingSentence>,
}

impl EvaluationReport {
    pub fn mean_precision(&self) -> f64 {
        mean(self.precision_recall.iter().map(|s| s.precision))
    }

    pub fn mean_recall(&self) -> f64 {
        mean(self.precision_recall.iter().map(|s| s.recall))
    }
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    if count == 0 { 0.0 } else { sum / count as f64 }
}

fn string_or_json<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(text)) => text,
        Some(other) => other.to_string(),
    })
}
