// file: src/aggregate/aggregator.rs
// description: token-aware batching and merge of item descriptions into one cited summary

use crate::aggregate::batching::{self, BatchPlan, COUNT_SEPARATOR};
use crate::aggregate::narrowing::Narrower;
use crate::aggregate::prompt;
use crate::clients::TextGenerator;
use crate::config::AggregationConfig;
use crate::error::{PipelineError, Result};
use crate::models::AggregatedSummary;
use crate::utils::validation::Validator;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Raw aggregation result; `text` still has to be parsed by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregationOutput {
    pub text: String,
    /// Prompt of the final generation call (batch prompt or merge prompt)
    pub prompt: String,
    /// Descriptions that went into the batches, after narrowing
    pub sources: Vec<String>,
    pub batch_count: usize,
}

pub struct Aggregator {
    generator: Arc<dyn TextGenerator>,
    narrower: Option<Narrower>,
    token_ceiling: u64,
}

impl Aggregator {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        narrower: Option<Narrower>,
        config: &AggregationConfig,
    ) -> Self {
        Self {
            generator,
            narrower: if config.narrowing_enabled { narrower } else { None },
            token_ceiling: config.token_ceiling.max(1),
        }
    }

    pub async fn aggregate(
        &self,
        keyword: &str,
        descriptions: Vec<String>,
    ) -> Result<AggregationOutput> {
        if descriptions.is_empty() {
            return Err(PipelineError::NoData {
                keyword: keyword.to_string(),
            });
        }

        let candidates = batching::normalize(self.narrow(keyword, descriptions).await);
        let total_tokens = self
            .generator
            .count_tokens(&batching::token_count_text(&candidates))
            .await?;

        let plan = BatchPlan::new(total_tokens, self.token_ceiling, candidates.len());
        info!(
            "Aggregating {} descriptions ({} tokens) in {} batch(es) of {}",
            candidates.len(),
            total_tokens,
            plan.batch_count,
            plan.batch_size
        );

        let dropped = plan.dropped(candidates.len());
        if dropped > 0 {
            warn!("{} trailing descriptions fall outside the batch plan", dropped);
        }

        let batch_prompt = prompt::batch_prompt(keyword);
        let mut outputs = Vec::with_capacity(plan.batch_count);
        for (idx, range) in plan.ranges(candidates.len()).into_iter().enumerate() {
            debug!("Generating batch {}/{} over {:?}", idx + 1, plan.batch_count, range);
            let content = format!("{}{}", batching::number_batch(&candidates[range]), batch_prompt);
            outputs.push(self.generator.generate(&content).await?);
        }

        let (text, used_prompt) = if plan.batch_count == 1 {
            let single = outputs.pop().unwrap_or_default();
            (prompt::strip_code_fence(&single), batch_prompt)
        } else {
            let merge_prompt = prompt::merge_prompt(keyword);
            let joined = outputs.join(COUNT_SEPARATOR);
            let content = format!("{}{}{}", joined, COUNT_SEPARATOR, merge_prompt);
            info!("Merging {} batch outputs", outputs.len());
            (self.generator.generate(&content).await?, merge_prompt)
        };

        Ok(AggregationOutput {
            text,
            prompt: used_prompt,
            sources: candidates,
            batch_count: plan.batch_count,
        })
    }

    /// Best effort: any narrowing failure falls back to the full set
    async fn narrow(&self, keyword: &str, descriptions: Vec<String>) -> Vec<String> {
        let Some(narrower) = &self.narrower else {
            return descriptions;
        };

        match narrower.narrow(keyword, descriptions.clone()).await {
            Ok(narrowed) if !narrowed.is_empty() => narrowed,
            Ok(_) => descriptions,
            Err(e) => {
                warn!("Narrowing failed, aggregating all descriptions: {}", e);
                descriptions
            }
        }
    }

    pub fn parse(text: &str) -> Result<AggregatedSummary> {
        let body = prompt::strip_code_fence(text);
        serde_json::from_str(&body).map_err(|e| {
            PipelineError::AggregationParse(format!(
                "{} in '{}'",
                e,
                Validator::truncate_text(&body, 120)
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeEmbedder, FakeGenerator};
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn config() -> AggregationConfig {
        AggregationConfig {
            narrowing_enabled: false,
            ..AggregationConfig::default()
        }
    }

    fn descriptions(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("video {}", i)).collect()
    }

    #[tokio::test]
    async fn test_single_batch_returns_output_verbatim() {
        let generator = Arc::new(FakeGenerator::with_tokens(1_000));
        let aggregator = Aggregator::new(generator.clone(), None, &config());

        let output = aggregator.aggregate("demo", descriptions(4)).await.unwrap();

        assert_eq!(output.batch_count, 1);
        assert_eq!(generator.generate_calls(), 1);
        assert_eq!(output.text, generator.outputs()[0]);
        assert_eq!(output.prompt, prompt::batch_prompt("demo"));
        assert_eq!(output.sources.len(), 4);
    }

    #[tokio::test]
    async fn test_multi_batch_issues_one_merge_call() {
        let generator = Arc::new(FakeGenerator::with_tokens(1_048_576 * 2 + 5));
        let aggregator = Aggregator::new(generator.clone(), None, &config());

        let output = aggregator.aggregate("demo", descriptions(25_000)).await.unwrap();

        assert_eq!(output.batch_count, 3);
        assert_eq!(generator.generate_calls(), 4);
        assert_eq!(output.text, generator.outputs()[3]);
        assert_eq!(output.prompt, prompt::merge_prompt("demo"));

        let prompts = generator.prompts();
        assert!(prompts[0].starts_with("1. video 0\n"));
        assert!(prompts[1].starts_with("1. video 8333\n"));
        assert!(prompts[2].starts_with("1. video 16666\n"));
        assert!(!prompts[2].contains("video 24999"));
        assert!(prompts[3].ends_with(&prompt::merge_prompt("demo")));
    }

    #[tokio::test]
    async fn test_fenced_single_output_is_unwrapped() {
        let generator = Arc::new(FakeGenerator::with_tokens(10).fenced());
        let aggregator = Aggregator::new(generator.clone(), None, &config());

        let output = aggregator.aggregate("demo", descriptions(1)).await.unwrap();
        assert!(output.text.starts_with('{'));
        assert!(Aggregator::parse(&output.text).is_ok());
    }

    #[tokio::test]
    async fn test_empty_input_is_no_data() {
        let generator = Arc::new(FakeGenerator::with_tokens(10));
        let aggregator = Aggregator::new(generator.clone(), None, &config());

        let err = aggregator.aggregate("demo", Vec::new()).await.unwrap_err();
        assert!(matches!(err, PipelineError::NoData { .. }));
        assert_eq!(generator.generate_calls(), 0);
    }

    #[tokio::test]
    async fn test_narrowing_failure_uses_full_set() {
        let generator = Arc::new(FakeGenerator::with_tokens(10));
        let narrower = Narrower::new(Arc::new(FakeEmbedder::failing()), 2, 5, Duration::ZERO);
        let aggregator = Aggregator::new(
            generator.clone(),
            Some(narrower),
            &AggregationConfig::default(),
        );

        let output = aggregator.aggregate("demo", descriptions(6)).await.unwrap();
        assert_eq!(output.sources.len(), 6);
    }

    #[tokio::test]
    async fn test_narrowing_limits_sources() {
        let generator = Arc::new(FakeGenerator::with_tokens(10));
        let narrower = Narrower::new(Arc::new(FakeEmbedder::new()), 3, 5, Duration::ZERO);
        let aggregator = Aggregator::new(
            generator.clone(),
            Some(narrower),
            &AggregationConfig::default(),
        );

        let output = aggregator.aggregate("demo", descriptions(20)).await.unwrap();
        assert_eq!(output.sources.len(), 3);
    }

    #[test]
    fn test_parse_errors_are_aggregation_parse() {
        let err = Aggregator::parse("not json").unwrap_err();
        assert!(matches!(err, PipelineError::AggregationParse(_)));

        let parsed = Aggregator::parse("```json\n{\"summary\": \"Cats nap [ALL].\"}\n```").unwrap();
        assert_eq!(parsed.summary, "Cats nap [ALL].");
    }
}
