// file: src/pipeline/describer.rs
// description: turns one downloaded item into a text description through the vision model

use crate::clients::VisionDescriber;
use crate::error::Result;
use crate::models::Item;
use crate::pipeline::retry::RetryingInvoker;
use std::sync::Arc;
use tracing::debug;

pub struct ItemDescriber {
    vision: Arc<dyn VisionDescriber>,
    invoker: RetryingInvoker,
}

impl ItemDescriber {
    pub fn new(vision: Arc<dyn VisionDescriber>, invoker: RetryingInvoker) -> Self {
        Self { vision, invoker }
    }

    /// One upload, then the retried generation call. No caching.
    pub async fn describe(&self, item: &Item, prompt: &str) -> Result<String> {
        let media = self.vision.prepare(&item.local_path).await?;
        debug!("Prepared {} as {}", item.item_id, media.uri);

        let label = format!("describe {}", item.item_id);
        let vision = self.vision.as_ref();
        let media = &media;
        self.invoker
            .invoke(&label, move || vision.generate(media, prompt))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineError;
    use crate::testing::FakeVision;
    use std::time::Duration;

    fn item() -> Item {
        Item::downloaded("42".to_string(), "media/demo/42.mp4".to_string())
    }

    #[tokio::test(start_paused = true)]
    async fn test_describe_uses_one_upload_and_retries_generation() {
        let vision = Arc::new(FakeVision::failing_first(2));
        let describer = ItemDescriber::new(
            vision.clone(),
            RetryingInvoker::with_policy(3, Duration::from_secs(5), Duration::from_secs(2)),
        );

        let text = describer.describe(&item(), "describe it").await.unwrap();

        assert_eq!(text, "description of media/demo/42.mp4");
        assert_eq!(vision.prepare_calls(), 1);
        assert_eq!(vision.generate_calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_describe_propagates_exhausted() {
        let vision = Arc::new(FakeVision::failing_first(10));
        let describer = ItemDescriber::new(
            vision.clone(),
            RetryingInvoker::with_policy(3, Duration::from_secs(5), Duration::from_secs(2)),
        );

        let err = describer.describe(&item(), "describe it").await.unwrap_err();
        assert!(matches!(err, PipelineError::Exhausted { attempts: 3, .. }));
    }
}
