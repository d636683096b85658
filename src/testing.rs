// file: src/testing.rs
// description: deterministic fakes for external collaborators, with call counters

use crate::aggregate::{Aggregator, Evaluator};
use crate::app::AppContext;
use crate::broadcast::{Broker, MessageHandler, NullBroker, ProgressBus, RelayHealth};
use crate::clients::{
    Embedder, MediaRef, MediaStore, SearchProvider, TextGenerator, VisionDescriber,
};
use crate::config::{AggregationConfig, Config, PipelineConfig};
use crate::database::{InMemoryDescriptionLog, InMemoryTaskTable, TaskStateStore};
use crate::error::{PipelineError, Result};
use crate::models::{ItemRef, SearchPage};
use crate::pipeline::{ItemDescriber, PipelineDeps, RetryingInvoker};
use crate::service::TaskService;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;

pub struct FakeSearch {
    pages: Mutex<VecDeque<SearchPage>>,
    cursors: Mutex<Vec<Option<String>>>,
    fail: bool,
    calls: AtomicUsize,
}

impl FakeSearch {
    /// Serves `pages` in order, then empty pages without a cursor
    pub fn pages(pages: Vec<SearchPage>) -> Self {
        Self {
            pages: Mutex::new(pages.into()),
            cursors: Mutex::new(Vec::new()),
            fail: false,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::pages(Vec::new())
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn cursors(&self) -> Vec<Option<String>> {
        self.cursors.lock().unwrap().clone()
    }
}

#[async_trait]
impl SearchProvider for FakeSearch {
    async fn search(&self, _keyword: &str, cursor: Option<&str>) -> Result<SearchPage> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.cursors.lock().unwrap().push(cursor.map(str::to_string));

        if self.fail {
            return Err(PipelineError::ProviderUnavailable("search is down".to_string()));
        }
        Ok(self.pages.lock().unwrap().pop_front().unwrap_or_default())
    }
}

#[derive(Default)]
pub struct FakeMedia {
    calls: AtomicUsize,
}

impl FakeMedia {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MediaStore for FakeMedia {
    async fn download(&self, directory: &str, item: &ItemRef) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(format!("media/{}/{}.mp4", directory, item.item_id))
    }
}

pub struct FakeVision {
    failures_left: AtomicUsize,
    successes_left: Option<AtomicUsize>,
    prepare_calls: AtomicUsize,
    generate_calls: AtomicUsize,
}

impl FakeVision {
    pub fn new() -> Self {
        Self::failing_first(0)
    }

    /// The first `n` generate calls fail
    pub fn failing_first(n: usize) -> Self {
        Self {
            failures_left: AtomicUsize::new(n),
            successes_left: None,
            prepare_calls: AtomicUsize::new(0),
            generate_calls: AtomicUsize::new(0),
        }
    }

    /// The first `n` generate calls succeed, every later one fails
    pub fn failing_after(n: usize) -> Self {
        Self {
            successes_left: Some(AtomicUsize::new(n)),
            ..Self::failing_first(0)
        }
    }

    pub fn prepare_calls(&self) -> usize {
        self.prepare_calls.load(Ordering::SeqCst)
    }

    pub fn generate_calls(&self) -> usize {
        self.generate_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VisionDescriber for FakeVision {
    async fn prepare(&self, local_path: &str) -> Result<MediaRef> {
        self.prepare_calls.fetch_add(1, Ordering::SeqCst);
        Ok(MediaRef {
            uri: local_path.to_string(),
            mime_type: "video/mp4".to_string(),
        })
    }

    async fn generate(&self, media: &MediaRef, _prompt: &str) -> Result<String> {
        self.generate_calls.fetch_add(1, Ordering::SeqCst);
        let failed = match &self.successes_left {
            Some(successes) => successes
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_err(),
            None => self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok(),
        };

        if failed {
            Err(PipelineError::Generation("model overloaded".to_string()))
        } else {
            Ok(format!("description of {}", media.uri))
        }
    }
}

pub struct FakeGenerator {
    tokens: u64,
    fenced: bool,
    script: Mutex<VecDeque<String>>,
    prompts: Mutex<Vec<String>>,
    outputs: Mutex<Vec<String>>,
    token_calls: AtomicUsize,
}

impl FakeGenerator {
    /// `count_tokens` always answers `tokens`; generation answers valid JSON
    pub fn with_tokens(tokens: u64) -> Self {
        Self {
            tokens,
            fenced: false,
            script: Mutex::new(VecDeque::new()),
            prompts: Mutex::new(Vec::new()),
            outputs: Mutex::new(Vec::new()),
            token_calls: AtomicUsize::new(0),
        }
    }

    /// Answers with `responses` in order before falling back to valid JSON
    pub fn scripted(responses: Vec<String>) -> Self {
        Self {
            script: Mutex::new(responses.into()),
            ..Self::with_tokens(10)
        }
    }

    pub fn fenced(mut self) -> Self {
        self.fenced = true;
        self
    }

    pub fn generate_calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub fn token_calls(&self) -> usize {
        self.token_calls.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    pub fn outputs(&self) -> Vec<String> {
        self.outputs.lock().unwrap().clone()
    }
}

#[async_trait]
impl TextGenerator for FakeGenerator {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let call = {
            let mut prompts = self.prompts.lock().unwrap();
            prompts.push(prompt.to_string());
            prompts.len()
        };

        let output = match self.script.lock().unwrap().pop_front() {
            Some(scripted) => scripted,
            None => {
                let json = format!(
                    r#"{{"summary": "Summary {call} [ALL].", "justification": "All sources agree.", "exclusion": "Nothing excluded."}}"#
                );
                if self.fenced {
                    format!("```json\n{}\n```", json)
                } else {
                    json
                }
            }
        };

        self.outputs.lock().unwrap().push(output.clone());
        Ok(output)
    }

    async fn count_tokens(&self, _text: &str) -> Result<u64> {
        self.token_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.tokens)
    }
}

/// Embeds each text as a one-dimensional vector of its character count
pub struct FakeEmbedder {
    fail: bool,
    calls: AtomicUsize,
}

impl FakeEmbedder {
    pub fn new() -> Self {
        Self {
            fail: false,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Embedder for FakeEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(PipelineError::Generation("embedding quota exceeded".to_string()));
        }
        Ok(texts
            .iter()
            .map(|t| vec![t.chars().count() as f32])
            .collect())
    }
}

/// Process-local stand-in for a shared broker: every subscriber on a topic
/// sees every message, including its own.
pub struct InMemoryBroker {
    sender: broadcast::Sender<(String, String)>,
    published: AtomicUsize,
    relay: RelayHealth,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(256);
        Self {
            sender,
            published: AtomicUsize::new(0),
            relay: RelayHealth::default(),
        }
    }

    pub fn published(&self) -> usize {
        self.published.load(Ordering::SeqCst)
    }

    pub fn relay(&self) -> &RelayHealth {
        &self.relay
    }
}

#[async_trait]
impl Broker for InMemoryBroker {
    fn backend(&self) -> &'static str {
        "memory"
    }

    fn is_live(&self) -> bool {
        self.relay.error().is_none()
    }

    fn relay_error(&self) -> Option<String> {
        self.relay.error()
    }

    async fn publish(&self, topic: &str, message: &str) -> Result<()> {
        self.published.fetch_add(1, Ordering::SeqCst);
        let _ = self.sender.send((topic.to_string(), message.to_string()));
        Ok(())
    }

    async fn subscribe(&self, topic: &str, handler: MessageHandler) -> Result<()> {
        let mut receiver = self.sender.subscribe();
        let topic = topic.to_string();
        tokio::spawn(async move {
            while let Ok((message_topic, message)) = receiver.recv().await {
                if message_topic == topic {
                    handler(message).await;
                }
            }
        });
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

/// Default config over fakes: one downloadable item "1", in-memory stores,
/// and a bus without a broker
pub fn fake_app() -> AppContext {
    let search = FakeSearch::pages(vec![SearchPage {
        items: vec![ItemRef {
            item_id: "1".to_string(),
            download_url: Some("https://cdn.example.com/1".to_string()),
        }],
        next_cursor: None,
    }]);
    let log = Arc::new(InMemoryDescriptionLog::new());
    let aggregation = AggregationConfig {
        narrowing_enabled: false,
        ..AggregationConfig::default()
    };
    let deps = PipelineDeps {
        search: Arc::new(search),
        media: Arc::new(FakeMedia::new()),
        describer: Arc::new(ItemDescriber::new(
            Arc::new(FakeVision::new()),
            RetryingInvoker::with_policy(3, Duration::ZERO, Duration::ZERO),
        )),
        log: log.clone(),
        aggregator: Arc::new(Aggregator::new(
            Arc::new(FakeGenerator::with_tokens(10)),
            None,
            &aggregation,
        )),
        store: TaskStateStore::new(Arc::new(InMemoryTaskTable::new())),
        bus: Arc::new(ProgressBus::new(Arc::new(NullBroker), "task", 16)),
    };
    let service = TaskService::new(
        deps,
        &PipelineConfig::default(),
        Arc::new(Evaluator::new(Arc::new(FakeGenerator::with_tokens(1)))),
    );
    AppContext::from_parts(Config::default_config(), service, log)
}
