// file: src/clients/mod.rs
// description: external collaborator interfaces and their HTTP implementations
// reference: https://docs.rs/async-trait

pub mod embeddings;
pub mod gemini;
pub mod media;
pub mod tikapi;

use crate::error::Result;
use crate::models::{ItemRef, SearchPage};
use async_trait::async_trait;

pub use embeddings::OpenAiEmbeddingClient;
pub use gemini::GeminiClient;
pub use media::HttpMediaStore;
pub use tikapi::TikApiClient;

/// Paginated video search
#[async_trait]
pub trait SearchProvider: Send + Sync {
    async fn search(&self, keyword: &str, cursor: Option<&str>) -> Result<SearchPage>;
}

/// Fetches a downloadable item to local storage and returns its path
#[async_trait]
pub trait MediaStore: Send + Sync {
    async fn download(&self, directory: &str, item: &ItemRef) -> Result<String>;
}

/// Handle to media that the vision model can read
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaRef {
    pub uri: String,
    pub mime_type: String,
}

#[async_trait]
pub trait VisionDescriber: Send + Sync {
    /// Makes a local file available to the model (upload). The returned
    /// reference may not be usable immediately.
    async fn prepare(&self, local_path: &str) -> Result<MediaRef>;

    async fn generate(&self, media: &MediaRef, prompt: &str) -> Result<String>;
}

#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String>;

    async fn count_tokens(&self, text: &str) -> Result<u64>;
}
