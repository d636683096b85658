// file: src/config.rs
// description: application configuration management with toml and environment support
// reference: https://docs.rs/config

use crate::error::{PipelineError, Result};
use crate::utils::validation::Validator;
use dotenvy::dotenv;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

pub const DEFAULT_DESCRIBE_PROMPT: &str = "Summarize this video. I hope to know the following, but it depends on you to decide if those are applicable. \
1. Tell what are the objects in the video, the properties of them, and what's the relationship between them. \
2. Tell what events are happening in this video. \
3. Tell what are the actions done in the video. \
4. Tell what's the vibe under this video. \
You don't need to satisfy all above, but just take a reference. No need to return result as a bullet, \
but just directly return the summary value, without any word like okay sure.";

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub broker: BrokerConfig,
    pub providers: ProviderConfig,
    pub pipeline: PipelineConfig,
    pub aggregation: AggregationConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub keepalive_secs: u64,
    pub subscriber_buffer: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Postgres URL for task metadata; tasks stay in memory when unset.
    pub task_table_url: Option<String>,
    pub max_connections: u32,
    /// LanceDB location of the keyword description log.
    pub description_log_uri: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BrokerConfig {
    pub redis_url: Option<String>,
    pub topic: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    Gemini,
    Openai,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub tikapi_base_url: String,
    pub tikapi_key: Option<String>,
    pub media_dir: PathBuf,
    pub gemini_base_url: String,
    pub gemini_upload_url: String,
    pub gemini_api_key: Option<String>,
    pub vision_model: String,
    pub generation_model: String,
    pub evaluation_model: String,
    pub embedding_provider: EmbeddingProvider,
    pub embedding_model: String,
    pub openai_base_url: String,
    pub openai_api_key: Option<String>,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub backoff_secs: u64,
    pub settle_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub max_query_attempts: usize,
    pub max_requested_count: usize,
    pub retry: RetryConfig,
    pub describe_prompt: String,
    pub task_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AggregationConfig {
    pub token_ceiling: u64,
    pub narrowing_enabled: bool,
    pub narrow_top_k: usize,
    pub embed_chunk_size: usize,
    pub embed_pacing_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            keepalive_secs: 30,
            subscriber_buffer: 256,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            task_table_url: None,
            max_connections: 5,
            description_log_uri: "data/lancedb".to_string(),
        }
    }
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            redis_url: None,
            topic: "task".to_string(),
        }
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            tikapi_base_url: "https://api.tikapi.io".to_string(),
            tikapi_key: None,
            media_dir: PathBuf::from("./media"),
            gemini_base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            gemini_upload_url: "https://generativelanguage.googleapis.com/upload/v1beta/files"
                .to_string(),
            gemini_api_key: None,
            vision_model: "gemini-2.0-flash".to_string(),
            generation_model: "gemini-2.0-flash".to_string(),
            evaluation_model: "gemini-1.5-pro".to_string(),
            embedding_provider: EmbeddingProvider::Gemini,
            embedding_model: "text-embedding-004".to_string(),
            openai_base_url: "https://api.groq.com/openai/v1".to_string(),
            openai_api_key: None,
            request_timeout_secs: 120,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_secs: 5,
            settle_secs: 2,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_query_attempts: 10,
            max_requested_count: 500,
            retry: RetryConfig::default(),
            describe_prompt: DEFAULT_DESCRIBE_PROMPT.to_string(),
            task_timeout_secs: None,
        }
    }
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            token_ceiling: 1_048_576,
            narrowing_enabled: true,
            narrow_top_k: 10,
            embed_chunk_size: 5,
            embed_pacing_ms: 1000,
        }
    }
}

impl RetryConfig {
    pub fn backoff(&self) -> Duration {
        Duration::from_secs(self.backoff_secs)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_secs(self.settle_secs)
    }
}

impl Config {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        dotenv().ok();

        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        } else {
            builder = builder
                .add_source(config::File::from(Path::new(DEFAULT_CONFIG_PATH)).required(false));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("VIDEO_SUMMARIZE")
                .separator("__")
                .try_parsing(true),
        );

        let settings = builder
            .build()
            .map_err(|e| PipelineError::Config(e.to_string()))?;

        let config: Config = settings
            .try_deserialize()
            .map_err(|e| PipelineError::Config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    pub fn default_config() -> Self {
        Self::default()
    }

    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(PipelineError::Config(
                "server.port must be greater than 0".to_string(),
            ));
        }

        if self.server.subscriber_buffer == 0 {
            return Err(PipelineError::Config(
                "server.subscriber_buffer must be greater than 0".to_string(),
            ));
        }

        if self.pipeline.retry.max_attempts == 0 {
            return Err(PipelineError::Config(
                "pipeline.retry.max_attempts must be greater than 0".to_string(),
            ));
        }

        if self.pipeline.max_query_attempts == 0 {
            return Err(PipelineError::Config(
                "pipeline.max_query_attempts must be greater than 0".to_string(),
            ));
        }

        if self.aggregation.token_ceiling == 0 {
            return Err(PipelineError::Config(
                "aggregation.token_ceiling must be greater than 0".to_string(),
            ));
        }

        if self.aggregation.narrow_top_k == 0 || self.aggregation.embed_chunk_size == 0 {
            return Err(PipelineError::Config(
                "aggregation.narrow_top_k and embed_chunk_size must be greater than 0"
                    .to_string(),
            ));
        }

        for url in [
            &self.providers.tikapi_base_url,
            &self.providers.gemini_base_url,
            &self.providers.gemini_upload_url,
            &self.providers.openai_base_url,
        ] {
            Validator::validate_url(url).map_err(|e| PipelineError::Config(e.to_string()))?;
        }

        Ok(())
    }
}
