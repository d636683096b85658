// file: src/server/websocket.rs
// description: per-task progress websocket with connection ack and keep-alive pings

use crate::app::AppContext;
use crate::broadcast::{ProgressBus, Subscription};
use crate::models::{ProgressEvent, TaskId};
use crate::server::handlers::ApiResult;
use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::Response;
use futures::{Sink, SinkExt, Stream, StreamExt};
use std::fmt;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

/// Unknown tasks are rejected before the upgrade
pub async fn progress_socket(
    ws: WebSocketUpgrade,
    State(app): State<AppContext>,
    Path(task_id): Path<TaskId>,
) -> ApiResult<Response> {
    app.service.get_task(task_id).await?;
    let keepalive = Duration::from_secs(app.config.server.keepalive_secs.max(1));

    Ok(ws.on_upgrade(move |socket| async move {
        let bus = app.service.bus();
        let subscription = bus.subscribe(task_id);
        let (sender, receiver) = socket.split();
        forward_progress(bus, sender, receiver, subscription, keepalive).await;
        debug!(
            "Progress socket for task {} closed, {} still watching",
            task_id,
            bus.subscriber_count(task_id)
        );
    }))
}

/// Runs one subscriber to completion and removes it from the bus
async fn forward_progress<S, R, E>(
    bus: &ProgressBus,
    sender: S,
    receiver: R,
    subscription: Subscription,
    keepalive: Duration,
) where
    S: Sink<Message> + Unpin,
    R: Stream<Item = Result<Message, E>> + Unpin,
    E: fmt::Display,
{
    let task_id = subscription.task_id;
    let id = subscription.id;
    stream_progress(sender, receiver, subscription, keepalive).await;
    bus.unsubscribe(task_id, id);
}

/// Forwards events until the terminal one, the client leaving, or a failed
/// send. A failed ping counts as a failed send.
async fn stream_progress<S, R, E>(
    mut sender: S,
    mut receiver: R,
    mut subscription: Subscription,
    keepalive: Duration,
) where
    S: Sink<Message> + Unpin,
    R: Stream<Item = Result<Message, E>> + Unpin,
    E: fmt::Display,
{
    let task_id = subscription.task_id;

    let mut ticker = tokio::time::interval(keepalive);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // the first tick completes immediately
    ticker.tick().await;

    loop {
        tokio::select! {
            event = subscription.receiver.recv() => {
                let Some(event) = event else {
                    // pruned by the bus
                    break;
                };
                let terminal = event.is_terminal();
                if send_event(&mut sender, &event).await.is_err() {
                    break;
                }
                if terminal {
                    let _ = sender.send(Message::Close(None)).await;
                    break;
                }
            }
            _ = ticker.tick() => {
                if sender.send(Message::Ping(Bytes::new())).await.is_err() {
                    debug!("Keep-alive failed for task {}", task_id);
                    break;
                }
            }
            incoming = receiver.next() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        warn!("Progress socket error for task {}: {}", task_id, e);
                        break;
                    }
                    Some(Ok(_)) => {}
                }
            }
        }
    }
}

async fn send_event<S>(sender: &mut S, event: &ProgressEvent) -> Result<(), ()>
where
    S: Sink<Message> + Unpin,
{
    let text = match serde_json::to_string(event) {
        Ok(text) => text,
        Err(e) => {
            warn!("Failed to encode progress event: {}", e);
            return Ok(());
        }
    };
    sender.send(Message::Text(text.into())).await.map_err(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::NullBroker;
    use crate::models::{EventKind, NewTask, SummaryReport};
    use crate::server::router;
    use crate::testing::fake_app;
    use futures::channel::mpsc;
    use std::net::SocketAddr;
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};
    use tokio::time::{Instant, timeout};

    const KEEPALIVE: Duration = Duration::from_secs(30);

    type Incoming = mpsc::UnboundedSender<Result<Message, axum::Error>>;

    struct Socket {
        bus: Arc<ProgressBus>,
        outgoing: mpsc::Receiver<Message>,
        incoming: Incoming,
        handle: tokio::task::JoinHandle<()>,
    }

    fn open(task_id: TaskId, before_start: impl FnOnce(&ProgressBus)) -> Socket {
        let bus = Arc::new(ProgressBus::new(Arc::new(NullBroker), "task", 16));
        let subscription = bus.subscribe(task_id);
        before_start(&bus);

        let (sink, outgoing) = mpsc::channel::<Message>(16);
        let (incoming, stream) = mpsc::unbounded::<Result<Message, axum::Error>>();

        let handle = tokio::spawn({
            let bus = bus.clone();
            async move { forward_progress(&bus, sink, stream, subscription, KEEPALIVE).await }
        });

        Socket {
            bus,
            outgoing,
            incoming,
            handle,
        }
    }

    fn event_kind(message: &Message) -> EventKind {
        match message {
            Message::Text(text) => serde_json::from_str::<ProgressEvent>(text.as_str())
                .unwrap()
                .kind(),
            other => panic!("expected a text frame, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_ping_is_sent_after_keepalive() {
        let mut socket = open(1, |_| {});
        let started = Instant::now();

        let ack = socket.outgoing.next().await.unwrap();
        assert_eq!(event_kind(&ack), EventKind::Connection);

        let ping = socket.outgoing.next().await.unwrap();
        assert!(matches!(ping, Message::Ping(_)));
        assert!(started.elapsed() >= KEEPALIVE);

        drop(socket.incoming);
        socket.handle.await.unwrap();
        assert_eq!(socket.bus.subscriber_count(1), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_ping_removes_subscriber() {
        let mut socket = open(4, |_| {});

        let ack = socket.outgoing.next().await.unwrap();
        assert_eq!(event_kind(&ack), EventKind::Connection);
        assert_eq!(socket.bus.subscriber_count(4), 1);

        // client side gone while the read half stays open
        drop(socket.outgoing);
        socket.handle.await.unwrap();

        assert_eq!(socket.bus.subscriber_count(4), 0);
        assert_eq!(socket.bus.task_count(), 0);
        drop(socket.incoming);
    }

    #[tokio::test(start_paused = true)]
    async fn test_summary_is_followed_by_close() {
        let report = SummaryReport {
            keyword: "demo".to_string(),
            summary: "Cats nap. [1]".to_string(),
            justification: String::new(),
            exclusion: String::new(),
            prompt: String::new(),
            sources: vec!["a cat naps".to_string()],
        };
        let mut socket = open(2, |bus| {
            bus.deliver_local(&ProgressEvent::progress(2, "Summarizing"));
            bus.deliver_local(&ProgressEvent::summary(2, report));
        });

        let mut kinds = Vec::new();
        let mut closed = false;
        while let Some(message) = socket.outgoing.next().await {
            if matches!(message, Message::Close(_)) {
                closed = true;
                continue;
            }
            assert!(!closed, "nothing may follow the close frame");
            kinds.push(event_kind(&message));
        }

        assert!(closed);
        assert_eq!(
            kinds,
            vec![EventKind::Connection, EventKind::Progress, EventKind::Summary]
        );
        socket.handle.await.unwrap();
        assert_eq!(socket.bus.subscriber_count(2), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_client_close_ends_stream() {
        let mut socket = open(3, |_| {});
        socket.outgoing.next().await.unwrap();

        socket.incoming.unbounded_send(Ok(Message::Close(None))).unwrap();
        socket.handle.await.unwrap();

        assert_eq!(socket.bus.subscriber_count(3), 0);
    }

    async fn serve(app: AppContext) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, router(app)).await });
        addr
    }

    /// Sends an upgrade request and returns the stream with the response head
    async fn upgrade(addr: SocketAddr, task_id: TaskId) -> (TcpStream, String) {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let request = format!(
            "GET /ws/progress/{task_id} HTTP/1.1\r\n\
             Host: {addr}\r\n\
             Connection: Upgrade\r\n\
             Upgrade: websocket\r\n\
             Sec-WebSocket-Version: 13\r\n\
             Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\r\n"
        );
        stream.write_all(request.as_bytes()).await.unwrap();

        let mut head = Vec::new();
        let mut byte = [0u8; 1];
        while !head.ends_with(b"\r\n\r\n") {
            stream.read_exact(&mut byte).await.unwrap();
            head.push(byte[0]);
        }
        (stream, String::from_utf8(head).unwrap())
    }

    async fn wait_for_subscribers(app: &AppContext, task_id: TaskId, expected: usize) {
        timeout(Duration::from_secs(2), async {
            while app.service.bus().subscriber_count(task_id) != expected {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_unknown_task_is_rejected_without_subscribing() {
        let app = fake_app();
        let addr = serve(app.clone()).await;

        let (_stream, head) = upgrade(addr, 404).await;

        assert!(head.starts_with("HTTP/1.1 404"), "unexpected response: {}", head);
        assert_eq!(app.service.bus().task_count(), 0);
    }

    #[tokio::test]
    async fn test_subscription_lives_as_long_as_the_socket() {
        let app = fake_app();
        let task = app
            .service
            .create(NewTask {
                requester: "a@example.com".to_string(),
                keyword: "demo".to_string(),
                requested_count: Some(1),
                skip_download: false,
            })
            .await
            .unwrap();
        let addr = serve(app.clone()).await;

        let (mut stream, head) = upgrade(addr, task.task_id).await;
        assert!(head.starts_with("HTTP/1.1 101"), "unexpected response: {}", head);

        // unmasked text frame carrying the connection ack
        let mut first = [0u8; 1];
        stream.read_exact(&mut first).await.unwrap();
        assert_eq!(first[0], 0x81);
        assert_eq!(app.service.bus().subscriber_count(task.task_id), 1);

        drop(stream);
        wait_for_subscribers(&app, task.task_id, 0).await;
        assert_eq!(app.service.bus().task_count(), 0);
    }
}
