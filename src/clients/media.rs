// file: src/clients/media.rs
// description: HTTP media store writing downloaded videos under a per-keyword directory

use crate::clients::MediaStore;
use crate::error::{PipelineError, Result};
use crate::models::ItemRef;
use crate::utils::validation::Validator;
use async_trait::async_trait;
use reqwest::Client;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tracing::debug;

pub struct HttpMediaStore {
    client: Client,
    root: PathBuf,
}

impl HttpMediaStore {
    pub fn new(root: PathBuf, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PipelineError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client, root })
    }

    pub fn target_path(root: &Path, directory: &str, item_id: &str) -> PathBuf {
        root.join(Validator::sanitize_file_component(directory))
            .join(format!("{}.mp4", Validator::sanitize_file_component(item_id)))
    }
}

#[async_trait]
impl MediaStore for HttpMediaStore {
    async fn download(&self, directory: &str, item: &ItemRef) -> Result<String> {
        let url = item.download_url.as_deref().ok_or_else(|| {
            PipelineError::ProviderUnavailable(format!("Item {} is not downloadable", item.item_id))
        })?;

        let response = self.client.get(url).send().await.map_err(|e| {
            let message = format!("Download of {} failed: {}", item.item_id, e);
            PipelineError::ProviderUnavailable(message)
        })?;

        if !response.status().is_success() {
            return Err(PipelineError::ProviderUnavailable(format!(
                "Download of {} failed with status {}",
                item.item_id,
                response.status()
            )));
        }

        let bytes = response.bytes().await.map_err(|e| {
            let message = format!("Download of {} failed: {}", item.item_id, e);
            PipelineError::ProviderUnavailable(message)
        })?;

        let path = Self::target_path(&self.root, directory, &item.item_id);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&path, &bytes).await?;

        debug!("Downloaded {} ({} bytes) to {}", item.item_id, bytes.len(), path.display());
        Ok(path.display().to_string())
    }
}
