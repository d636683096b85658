// file: src/aggregate/evaluation.rs
// description: sentence-level precision/recall evaluation of a final summary against its sources

use crate::aggregate::prompt;
use crate::clients::TextGenerator;
use crate::error::{PipelineError, Result};
use crate::models::EvaluationReport;
use std::sync::Arc;
use tracing::info;

pub struct Evaluator {
    generator: Arc<dyn TextGenerator>,
}

impl Evaluator {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }

    pub async fn evaluate(&self, summary: &str, sources: &[String]) -> Result<EvaluationReport> {
        if summary.trim().is_empty() {
            return Err(PipelineError::Validation("Summary is empty".to_string()));
        }
        if sources.is_empty() {
            return Err(PipelineError::Validation(
                "At least one source summary is required".to_string(),
            ));
        }

        info!("Evaluating summary against {} sources", sources.len());
        let raw = self
            .generator
            .generate(&prompt::evaluation_prompt(summary, sources))
            .await?;

        let body = prompt::strip_code_fence(&raw);
        let report: EvaluationReport = serde_json::from_str(&body)
            .map_err(|e| PipelineError::AggregationParse(format!("evaluation response: {}", e)))?;

        info!(
            "Evaluation: mean precision {:.2}, mean recall {:.2}, {} missing sentences",
            report.mean_precision(),
            report.mean_recall(),
            report.missing_sentences.len()
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeGenerator;

    const REPORT: &str = r#"```json
{
    "precision_recall": [{"text": "Cats nap.", "precision": 1.0, "recall": 0.5, "errors": []}],
    "missing_sentences": [{"text": "Dogs bark.", "source": [2], "reasons": "omitted"}]
}
```"#;

    #[tokio::test]
    async fn test_evaluate_parses_fenced_report() {
        let generator = Arc::new(FakeGenerator::scripted(vec![REPORT.to_string()]));
        let evaluator = Evaluator::new(generator.clone());

        let report = evaluator
            .evaluate("Cats nap.", &["a cat".to_string(), "a dog".to_string()])
            .await
            .unwrap();

        assert_eq!(report.precision_recall.len(), 1);
        assert_eq!(report.missing_sentences[0].source, vec![2]);
        assert!(generator.prompts()[0].contains("2. a dog"));
    }

    #[tokio::test]
    async fn test_unparseable_report_is_aggregation_parse() {
        let generator = Arc::new(FakeGenerator::scripted(vec!["I cannot".to_string()]));
        let evaluator = Evaluator::new(generator);

        let err = evaluator
            .evaluate("Cats nap.", &["a cat".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::AggregationParse(_)));
    }

    #[tokio::test]
    async fn test_requires_sources() {
        let evaluator = Evaluator::new(Arc::new(FakeGenerator::with_tokens(1)));
        assert!(evaluator.evaluate("Cats nap.", &[]).await.is_err());
    }
}
