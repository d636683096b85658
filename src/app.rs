// file: src/app.rs
// description: composition root building every collaborator from configuration once at start
// reference: application bootstrap and orchestration

use crate::aggregate::{Aggregator, Evaluator, Narrower};
use crate::broadcast::{ProgressBus, select_broker};
use crate::clients::{
    Embedder, GeminiClient, HttpMediaStore, OpenAiEmbeddingClient, TikApiClient,
};
use crate::config::{Config, EmbeddingProvider};
use crate::database::{
    DescriptionLog, InMemoryTaskTable, LanceDbDescriptionLog, PgTaskTable, TaskStateStore,
    TaskTable,
};
use crate::error::{PipelineError, Result};
use crate::pipeline::{ItemDescriber, PipelineDeps, RetryingInvoker};
use crate::service::TaskService;
use crate::utils::telemetry::{HealthCheck, HealthReport};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Everything a server instance or a one-shot CLI run shares
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<Config>,
    pub service: TaskService,
    pub log: Arc<dyn DescriptionLog>,
}

impl AppContext {
    pub async fn build(config: Config) -> Result<Self> {
        let timeout = Duration::from_secs(config.providers.request_timeout_secs);

        let table: Arc<dyn TaskTable> = match config.database.task_table_url.as_deref() {
            Some(url) => {
                Arc::new(PgTaskTable::connect(url, config.database.max_connections).await?)
            }
            None => {
                warn!("No task table configured; tasks are kept in memory");
                Arc::new(InMemoryTaskTable::new())
            }
        };
        let store = TaskStateStore::new(table);

        let log: Arc<dyn DescriptionLog> =
            Arc::new(LanceDbDescriptionLog::new(&config.database.description_log_uri).await?);

        let selection = select_broker(&config.broker).await;
        let bus = Arc::new(
            ProgressBus::new(
                selection.broker,
                config.broker.topic.clone(),
                config.server.subscriber_buffer,
            )
            .with_broker_error(selection.error),
        );
        if let Err(e) = bus.attach_broker().await {
            warn!("Broker subscription failed, relayed events will not arrive: {}", e);
        }

        let gemini_key = config.providers.gemini_api_key.clone().ok_or_else(|| {
            PipelineError::Config("providers.gemini_api_key is required".to_string())
        })?;
        let gemini = |model: &str| {
            GeminiClient::new(
                gemini_key.clone(),
                config.providers.gemini_base_url.clone(),
                config.providers.gemini_upload_url.clone(),
                model.to_string(),
                timeout,
            )
        };

        let vision = Arc::new(gemini(&config.providers.vision_model)?);
        let generator = Arc::new(gemini(&config.providers.generation_model)?);
        let evaluator = Arc::new(Evaluator::new(Arc::new(gemini(
            &config.providers.evaluation_model,
        )?)));

        let narrower = if config.aggregation.narrowing_enabled {
            build_embedder(&config, &gemini_key, timeout)?.map(|embedder| {
                Narrower::new(
                    embedder,
                    config.aggregation.narrow_top_k,
                    config.aggregation.embed_chunk_size,
                    Duration::from_millis(config.aggregation.embed_pacing_ms),
                )
            })
        } else {
            None
        };

        let tikapi_key = config.providers.tikapi_key.clone().unwrap_or_else(|| {
            warn!(
                "providers.tikapi_key is not set; video searches will fail and \
                 fall back to stored descriptions"
            );
            String::new()
        });
        let search = Arc::new(TikApiClient::new(
            config.providers.tikapi_base_url.clone(),
            tikapi_key,
            timeout,
        )?);
        let media = Arc::new(HttpMediaStore::new(
            config.providers.media_dir.clone(),
            timeout,
        )?);

        let deps = PipelineDeps {
            search,
            media,
            describer: Arc::new(ItemDescriber::new(
                vision,
                RetryingInvoker::new(&config.pipeline.retry),
            )),
            log: log.clone(),
            aggregator: Arc::new(Aggregator::new(generator, narrower, &config.aggregation)),
            store,
            bus,
        };

        let service = TaskService::new(deps, &config.pipeline, evaluator);
        info!("Application context ready");

        Ok(Self::from_parts(config, service, log))
    }

    pub fn from_parts(config: Config, service: TaskService, log: Arc<dyn DescriptionLog>) -> Self {
        Self {
            config: Arc::new(config),
            service,
            log,
        }
    }

    pub async fn health(&self) -> HealthReport {
        let store = self.service.store();
        let broker = self.service.bus().broker();

        let checks = vec![
            HealthCheck::probe("task_table", true, store.ping()).await,
            HealthCheck::probe("description_log", true, self.log.ping()).await,
            HealthCheck::probe("broker", false, broker.ping()).await,
        ];

        HealthReport::new(checks, env!("CARGO_PKG_VERSION").to_string())
    }
}

/// None when the selected provider has no credentials; narrowing is then skipped
fn build_embedder(
    config: &Config,
    gemini_key: &str,
    timeout: Duration,
) -> Result<Option<Arc<dyn Embedder>>> {
    let providers = &config.providers;
    let embedder: Arc<dyn Embedder> = match providers.embedding_provider {
        EmbeddingProvider::Gemini => Arc::new(GeminiClient::new(
            gemini_key.to_string(),
            providers.gemini_base_url.clone(),
            providers.gemini_upload_url.clone(),
            providers.embedding_model.clone(),
            timeout,
        )?),
        EmbeddingProvider::Openai => match providers.openai_api_key.clone() {
            Some(key) => Arc::new(OpenAiEmbeddingClient::new(
                key,
                providers.openai_base_url.clone(),
                providers.embedding_model.clone(),
            )),
            None => {
                warn!("providers.openai_api_key is not set; narrowing disabled");
                return Ok(None);
            }
        },
    };
    Ok(Some(embedder))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::telemetry::HealthStatus;
    use tempfile::TempDir;

    fn local_config(dir: &TempDir) -> Config {
        let mut config = Config::default_config();
        config.database.description_log_uri = dir.path().join("lance").display().to_string();
        config.providers.media_dir = dir.path().join("media");
        config.providers.gemini_api_key = Some("test-key".to_string());
        config
    }

    #[tokio::test]
    async fn test_build_requires_generation_credentials() {
        let dir = TempDir::new().unwrap();
        let mut config = local_config(&dir);
        config.providers.gemini_api_key = None;

        let err = AppContext::build(config).await.err().unwrap();
        assert!(matches!(err, PipelineError::Config(_)));
    }

    #[tokio::test]
    async fn test_local_setup_is_degraded_without_broker() {
        let dir = TempDir::new().unwrap();
        let app = AppContext::build(local_config(&dir)).await.unwrap();

        let report = app.health().await;
        assert_eq!(report.overall_status, HealthStatus::Degraded);
        assert_eq!(report.checks.len(), 3);
        assert!(!app.service.bus().broker_status().enabled);
    }

    #[test]
    fn test_openai_embedder_without_key_is_skipped() {
        let mut config = Config::default_config();
        config.providers.embedding_provider = EmbeddingProvider::Openai;

        let embedder = build_embedder(&config, "k", Duration::from_secs(1)).unwrap();
        assert!(embedder.is_none());
    }
}
