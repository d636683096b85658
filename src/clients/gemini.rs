// file: src/clients/gemini.rs
// description: Gemini REST client for text generation, token counting, video description and embeddings
// reference: https://ai.google.dev/api

use crate::clients::{Embedder, MediaRef, TextGenerator, VisionDescriber};
use crate::error::{PipelineError, Result};
use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Part<'a> {
    Text { text: &'a str },
    File { file_data: FileData<'a> },
}

#[derive(Debug, Serialize)]
struct FileData<'a> {
    mime_type: &'a str,
    file_uri: &'a str,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CountTokensResponse {
    total_tokens: u64,
}

#[derive(Debug, Serialize)]
struct BatchEmbedRequest<'a> {
    requests: Vec<EmbedRequest<'a>>,
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: String,
    content: Content<'a>,
}

#[derive(Debug, Deserialize)]
struct BatchEmbedResponse {
    #[serde(default)]
    embeddings: Vec<EmbeddingValues>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingValues {
    values: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    file: UploadedFile,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadedFile {
    uri: String,
    mime_type: Option<String>,
}

/// One client per model; the pipeline builds separate instances for the
/// vision, generation, evaluation and embedding models.
#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    api_key: String,
    base_url: String,
    upload_url: String,
    model: String,
}

impl GeminiClient {
    pub fn new(
        api_key: String,
        base_url: String,
        upload_url: String,
        model: String,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PipelineError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            upload_url,
            model,
        })
    }

    fn model_url(&self, method: &str) -> String {
        format!("{}/models/{}:{}", self.base_url, self.model, method)
    }

    async fn post_json<B: Serialize, R: DeserializeOwned>(&self, url: &str, body: &B) -> Result<R> {
        let response = self
            .client
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                PipelineError::Generation(format!("Failed to send Gemini request: {}", e))
            })?;

        read_json(response).await
    }

    async fn generate_parts(&self, parts: Vec<Part<'_>>) -> Result<String> {
        let request = GenerateRequest {
            contents: vec![Content { parts }],
        };

        let response: GenerateResponse = self
            .post_json(&self.model_url("generateContent"), &request)
            .await?;

        let text = response
            .candidates
            .into_iter()
            .filter_map(|c| c.content)
            .flat_map(|c| c.parts)
            .filter_map(|p| p.text)
            .collect::<Vec<_>>()
            .join("");

        if text.is_empty() {
            return Err(PipelineError::Generation(format!(
                "Gemini model {} returned no text",
                self.model
            )));
        }

        debug!("Gemini {} returned {} chars", self.model, text.len());
        Ok(text)
    }
}

async fn read_json<R: DeserializeOwned>(response: Response) -> Result<R> {
    if !response.status().is_success() {
        let status = response.status();
        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        return Err(PipelineError::Generation(format!(
            "Gemini request failed with status {}: {}",
            status, error_text
        )));
    }

    response
        .json()
        .await
        .map_err(|e| PipelineError::Generation(format!("Failed to parse Gemini response: {}", e)))
}

fn mime_type_for(path: &str) -> &'static str {
    match Path::new(path).extension().and_then(|e| e.to_str()) {
        Some("mp4") => "video/mp4",
        Some("mov") => "video/quicktime",
        Some("webm") => "video/webm",
        _ => "application/octet-stream",
    }
}

#[async_trait]
impl TextGenerator for GeminiClient {
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.generate_parts(vec![Part::Text { text: prompt }]).await
    }

    async fn count_tokens(&self, text: &str) -> Result<u64> {
        let request = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part::Text { text }],
            }],
        };

        let response: CountTokensResponse = self
            .post_json(&self.model_url("countTokens"), &request)
            .await?;

        Ok(response.total_tokens)
    }
}

#[async_trait]
impl VisionDescriber for GeminiClient {
    async fn prepare(&self, local_path: &str) -> Result<MediaRef> {
        let bytes = tokio::fs::read(local_path).await?;
        let mime_type = mime_type_for(local_path);
        let display_name = Path::new(local_path)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("media");

        debug!("Uploading {} ({} bytes) to Gemini", local_path, bytes.len());

        let start = self
            .client
            .post(&self.upload_url)
            .header("x-goog-api-key", &self.api_key)
            .header("X-Goog-Upload-Protocol", "resumable")
            .header("X-Goog-Upload-Command", "start")
            .header("X-Goog-Upload-Header-Content-Length", bytes.len().to_string())
            .header("X-Goog-Upload-Header-Content-Type", mime_type)
            .json(&serde_json::json!({ "file": { "display_name": display_name } }))
            .send()
            .await
            .map_err(|e| PipelineError::Generation(format!("Failed to start upload: {}", e)))?;

        if !start.status().is_success() {
            return Err(PipelineError::Generation(format!(
                "Upload start failed with status {}",
                start.status()
            )));
        }

        let session_url = start
            .headers()
            .get("x-goog-upload-url")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| PipelineError::Generation("Upload session URL missing".to_string()))?;

        let response = self
            .client
            .post(session_url)
            .header("X-Goog-Upload-Offset", "0")
            .header("X-Goog-Upload-Command", "upload, finalize")
            .body(bytes)
            .send()
            .await
            .map_err(|e| PipelineError::Generation(format!("Failed to upload media: {}", e)))?;

        let uploaded: UploadResponse = read_json(response).await?;

        Ok(MediaRef {
            uri: uploaded.file.uri,
            mime_type: uploaded
                .file
                .mime_type
                .unwrap_or_else(|| mime_type.to_string()),
        })
    }

    async fn generate(&self, media: &MediaRef, prompt: &str) -> Result<String> {
        self.generate_parts(vec![
            Part::File {
                file_data: FileData {
                    mime_type: &media.mime_type,
                    file_uri: &media.uri,
                },
            },
            Part::Text { text: prompt },
        ])
        .await
    }
}

#[async_trait]
impl Embedder for GeminiClient {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let request = BatchEmbedRequest {
            requests: texts
                .iter()
                .map(|text| EmbedRequest {
                    model: format!("models/{}", self.model),
                    content: Content {
                        parts: vec![Part::Text {
                            text: text.as_str(),
                        }],
                    },
                })
                .collect(),
        };

        let response: BatchEmbedResponse = self
            .post_json(&self.model_url("batchEmbedContents"), &request)
            .await?;

        if response.embeddings.len() != texts.len() {
            return Err(PipelineError::Generation(format!(
                "Expected {} embeddings, got {}",
                texts.len(),
                response.embeddings.len()
            )));
        }

        Ok(response.embeddings.into_iter().map(|e| e.values).collect())
    }
}
