// file: src/broadcast/broker.rs
// description: distributed pub/sub capability with a redis-backed and a no-op variant
// reference: https://docs.rs/redis

use crate::config::BrokerConfig;
use crate::error::{PipelineError, Result};
use async_trait::async_trait;
use futures::StreamExt;
use futures::future::BoxFuture;
use redis::AsyncCommands;
use redis::aio::{ConnectionManager, PubSub};
use serde::Serialize;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Called once per message received on a subscribed topic
pub type MessageHandler = Arc<dyn Fn(String) -> BoxFuture<'static, ()> + Send + Sync>;

#[async_trait]
pub trait Broker: Send + Sync {
    fn backend(&self) -> &'static str;

    fn is_live(&self) -> bool;

    /// Set while a live broker has lost its subscription
    fn relay_error(&self) -> Option<String> {
        None
    }

    async fn publish(&self, topic: &str, message: &str) -> Result<()>;

    async fn subscribe(&self, topic: &str, handler: MessageHandler) -> Result<()>;

    async fn ping(&self) -> Result<()>;
}

/// Used when no broker is configured or the configured one is unreachable
#[derive(Debug, Default)]
pub struct NullBroker;

#[async_trait]
impl Broker for NullBroker {
    fn backend(&self) -> &'static str {
        "null"
    }

    fn is_live(&self) -> bool {
        false
    }

    async fn publish(&self, topic: &str, _message: &str) -> Result<()> {
        debug!("Null broker dropping message for topic {}", topic);
        Ok(())
    }

    async fn subscribe(&self, _topic: &str, _handler: MessageHandler) -> Result<()> {
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        Err(PipelineError::Broker("No live broker configured".to_string()))
    }
}

const RESUBSCRIBE_BASE: Duration = Duration::from_millis(500);
const RESUBSCRIBE_MAX: Duration = Duration::from_secs(30);

/// Last relay failure shared between a broker and its subscription task.
/// `None` while the relay is connected.
#[derive(Debug, Clone, Default)]
pub struct RelayHealth {
    error: Arc<RwLock<Option<String>>>,
}

impl RelayHealth {
    pub fn record(&self, error: impl Into<String>) {
        *self.error.write().unwrap_or_else(PoisonError::into_inner) = Some(error.into());
    }

    pub fn clear(&self) {
        *self.error.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    pub fn error(&self) -> Option<String> {
        self.error.read().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

/// Capped exponential wait before resubscribe attempt `attempt`
pub fn resubscribe_delay(attempt: u32) -> Duration {
    RESUBSCRIBE_BASE
        .saturating_mul(1u32 << attempt.min(8))
        .min(RESUBSCRIBE_MAX)
}

#[derive(Clone)]
pub struct RedisBroker {
    client: redis::Client,
    conn: ConnectionManager,
    relay: RelayHealth,
}

impl fmt::Debug for RedisBroker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisBroker")
            .field("connection", &"ConnectionManager")
            .field("relay_error", &self.relay.error())
            .finish()
    }
}

impl RedisBroker {
    pub async fn connect(redis_url: &str) -> Result<Self> {
        info!("Connecting to Redis broker");

        let client = redis::Client::open(redis_url)
            .map_err(|e| PipelineError::Broker(format!("Failed to create Redis client: {e}")))?;

        let conn = ConnectionManager::new(client.clone())
            .await
            .map_err(|e| PipelineError::Broker(format!("Failed to connect to Redis: {e}")))?;

        info!("Successfully connected to Redis broker");
        Ok(Self {
            client,
            conn,
            relay: RelayHealth::default(),
        })
    }
}

async fn open_pubsub(client: &redis::Client, topic: &str) -> Result<PubSub> {
    let mut pubsub = client
        .get_async_pubsub()
        .await
        .map_err(|e| PipelineError::Broker(format!("Failed to open Redis pubsub: {e}")))?;

    pubsub
        .subscribe(topic)
        .await
        .map_err(|e| PipelineError::Broker(format!("Redis SUBSCRIBE failed: {e}")))?;

    Ok(pubsub)
}

/// Returns once the pubsub connection drops
async fn drain(pubsub: PubSub, topic: &str, handler: &MessageHandler) {
    let mut messages = pubsub.into_on_message();
    while let Some(msg) = messages.next().await {
        match msg.get_payload::<String>() {
            Ok(payload) => handler(payload).await,
            Err(e) => warn!("Dropping undecodable broker message on {}: {}", topic, e),
        }
    }
}

async fn resubscribe(client: &redis::Client, topic: &str, relay: &RelayHealth) -> PubSub {
    let mut attempt = 0u32;
    loop {
        tokio::time::sleep(resubscribe_delay(attempt)).await;
        match open_pubsub(client, topic).await {
            Ok(pubsub) => {
                info!("Resubscribed to broker topic {} after {} attempts", topic, attempt + 1);
                return pubsub;
            }
            Err(e) => {
                warn!("Resubscribe to {} failed: {}", topic, e);
                relay.record(e.to_string());
                attempt = attempt.saturating_add(1);
            }
        }
    }
}

#[async_trait]
impl Broker for RedisBroker {
    fn backend(&self) -> &'static str {
        "redis"
    }

    fn is_live(&self) -> bool {
        self.relay.error().is_none()
    }

    fn relay_error(&self) -> Option<String> {
        self.relay.error()
    }

    async fn publish(&self, topic: &str, message: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let receivers: i64 = conn
            .publish(topic, message)
            .await
            .map_err(|e| PipelineError::Broker(format!("Redis PUBLISH failed: {e}")))?;

        debug!("Published to {} ({} receivers)", topic, receivers);
        Ok(())
    }

    /// The first subscribe failure is returned. Later drops are retried with
    /// backoff and reported through `relay_error` until the relay is back.
    async fn subscribe(&self, topic: &str, handler: MessageHandler) -> Result<()> {
        let mut pubsub = open_pubsub(&self.client, topic).await?;
        info!("Subscribed to broker topic {}", topic);

        let client = self.client.clone();
        let relay = self.relay.clone();
        let topic = topic.to_string();

        tokio::spawn(async move {
            loop {
                relay.clear();
                drain(pubsub, &topic, &handler).await;
                warn!("Broker subscription to {} dropped, resubscribing", topic);
                relay.record(format!("Subscription to {topic} dropped"));
                pubsub = resubscribe(&client, &topic, &relay).await;
            }
        });

        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        if let Some(error) = self.relay.error() {
            return Err(PipelineError::Broker(format!("Broker relay is down: {error}")));
        }

        let mut conn = self.conn.clone();
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map(|_| ())
            .map_err(|e| PipelineError::Broker(format!("Redis PING failed: {e}")))
    }
}

/// Reported by the broker-status endpoint
#[derive(Debug, Clone, Serialize)]
pub struct BrokerStatus {
    pub enabled: bool,
    pub backend: String,
    pub topic: String,
    pub error: Option<String>,
}

pub struct BrokerSelection {
    pub broker: Arc<dyn Broker>,
    pub error: Option<String>,
}

/// Picks the live broker when one is configured and reachable, otherwise
/// the null broker. Callers never branch on which one they got.
pub async fn select_broker(config: &BrokerConfig) -> BrokerSelection {
    let Some(url) = config.redis_url.as_deref() else {
        info!("No broker configured, progress stays instance-local");
        return BrokerSelection {
            broker: Arc::new(NullBroker),
            error: None,
        };
    };

    match RedisBroker::connect(url).await {
        Ok(broker) => BrokerSelection {
            broker: Arc::new(broker),
            error: None,
        },
        Err(e) => {
            warn!("Broker unavailable, running without cross-instance relay: {}", e);
            BrokerSelection {
                broker: Arc::new(NullBroker),
                error: Some(e.to_string()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;

    #[tokio::test]
    async fn test_null_broker_accepts_everything() {
        let broker = NullBroker;
        assert!(!broker.is_live());
        assert!(broker.publish("task", "{}").await.is_ok());

        let handler: MessageHandler = Arc::new(|_msg: String| async {}.boxed());
        assert!(broker.subscribe("task", handler).await.is_ok());
        assert!(broker.ping().await.is_err());
    }

    #[tokio::test]
    async fn test_select_without_url_is_null() {
        let selection = select_broker(&BrokerConfig::default()).await;
        assert_eq!(selection.broker.backend(), "null");
        assert!(selection.error.is_none());
    }

    #[tokio::test]
    async fn test_select_with_bad_url_falls_back() {
        let config = BrokerConfig {
            redis_url: Some("not-a-redis-url".to_string()),
            topic: "task".to_string(),
        };
        let selection = select_broker(&config).await;
        assert_eq!(selection.broker.backend(), "null");
        assert!(selection.error.is_some());
    }

    #[test]
    fn test_resubscribe_delay_backs_off_to_cap() {
        assert_eq!(resubscribe_delay(0), Duration::from_millis(500));
        assert_eq!(resubscribe_delay(1), Duration::from_secs(1));
        assert_eq!(resubscribe_delay(3), Duration::from_secs(4));
        assert_eq!(resubscribe_delay(6), RESUBSCRIBE_MAX);
        assert_eq!(resubscribe_delay(u32::MAX), RESUBSCRIBE_MAX);
    }

    #[test]
    fn test_relay_health_tracks_last_failure() {
        let relay = RelayHealth::default();
        let shared = relay.clone();
        assert!(relay.error().is_none());

        shared.record("connection reset");
        assert_eq!(relay.error().as_deref(), Some("connection reset"));

        shared.clear();
        assert!(relay.error().is_none());
    }
}
