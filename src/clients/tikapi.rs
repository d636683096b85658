// file: src/clients/tikapi.rs
// description: TikAPI video search provider
// reference: https://tikapi.io/documentation

use crate::clients::SearchProvider;
use crate::error::{PipelineError, Result};
use crate::models::{ItemRef, SearchPage};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    item_list: Vec<RawItem>,
    #[serde(rename = "nextCursor")]
    next_cursor: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct RawItem {
    video: RawVideo,
}

#[derive(Debug, Deserialize)]
struct RawVideo {
    id: Value,
    #[serde(rename = "downloadAddr")]
    download_addr: Option<String>,
    #[serde(rename = "playAddr")]
    play_addr: Option<String>,
}

pub struct TikApiClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl TikApiClient {
    pub fn new(base_url: String, api_key: String, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PipelineError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }
}

fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Items without any address stay in the page as non-downloadable.
pub fn parse_search_page(body: &str) -> Result<SearchPage> {
    let response: SearchResponse = serde_json::from_str(body).map_err(|e| {
        PipelineError::ProviderUnavailable(format!("Malformed search response: {}", e))
    })?;

    let items = response
        .item_list
        .into_iter()
        .filter_map(|item| {
            let item_id = value_to_string(&item.video.id)?;
            let download_url = item
                .video
                .download_addr
                .filter(|a| !a.is_empty())
                .or(item.video.play_addr.filter(|a| !a.is_empty()));
            Some(ItemRef {
                item_id,
                download_url,
            })
        })
        .collect();

    Ok(SearchPage {
        items,
        next_cursor: response.next_cursor.as_ref().and_then(value_to_string),
    })
}

#[async_trait]
impl SearchProvider for TikApiClient {
    async fn search(&self, keyword: &str, cursor: Option<&str>) -> Result<SearchPage> {
        let url = format!("{}/public/search/videos", self.base_url);

        let mut request = self
            .client
            .get(&url)
            .header("X-API-KEY", &self.api_key)
            .query(&[("query", keyword)]);

        if let Some(cursor) = cursor {
            request = request.query(&[("nextCursor", cursor)]);
        }

        let response = request.send().await.map_err(|e| {
            PipelineError::ProviderUnavailable(format!("Search request failed: {}", e))
        })?;

        if !response.status().is_success() {
            return Err(PipelineError::ProviderUnavailable(format!(
                "Search failed with status {}",
                response.status()
            )));
        }

        let body = response.text().await.map_err(|e| {
            PipelineError::ProviderUnavailable(format!("Failed to read search response: {}", e))
        })?;

        let page = parse_search_page(&body)?;
        debug!(
            "Search '{}' returned {} items ({} downloadable)",
            keyword,
            page.items.len(),
            page.downloadable_count()
        );
        Ok(page)
    }
}
