//! Supabase Realtime change feed.
//!
//! Speaks the Phoenix channel protocol over a websocket: one channel per
//! record kind, each joined with a `postgres_changes` filter on its table.
//! Row payloads are ignored; every change becomes a bare `ChangeEvent`.
//!
//! Endpoint: `wss://{host}/realtime/v1/websocket?apikey={key}&vsn=1.0.0`
//!
//! A dropped session is reconnected after `reconnect_delay`, doubled for
//! every consecutive session that ended before all channels joined. On a
//! reconnect, each channel emits a `Resync` event once the server accepts
//! its join, since changes made while disconnected were never delivered.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use super::{ChangeFeed, StoreError, Subscription, TableNames};
use crate::types::{ChangeEvent, ChangeKind, RecordKind};

/// Buffered change events per subscription.
const EVENT_BUFFER: usize = 64;

/// Phoenix topic for server heartbeats.
const PHOENIX_TOPIC: &str = "phoenix";

/// Reconnect delay stops doubling after this many consecutive failures.
const MAX_BACKOFF_DOUBLINGS: u32 = 6;

/// Delay before the next connection attempt after `failures` consecutive
/// failed sessions.
fn reconnect_backoff(base: Duration, failures: u32) -> Duration {
    let doublings = failures.saturating_sub(1).min(MAX_BACKOFF_DOUBLINGS);
    base.saturating_mul(1 << doublings)
}

// ---------------------------------------------------------------------------
// Wire frames
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct PhoenixFrame {
    topic: String,
    event: String,
    #[serde(default)]
    payload: Value,
}

/// What a received frame means for the subscription.
#[derive(Debug, PartialEq)]
enum Frame {
    Change(ChangeEvent),
    Joined(RecordKind),
    /// The server refused or closed one of our channels.
    ChannelFailed(String),
    Ignored,
}

/// Build the websocket URL from the project's HTTP base URL.
pub fn realtime_url(base_url: &str, api_key: &str) -> Result<String, StoreError> {
    let base = base_url.trim().trim_end_matches('/');
    let host = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        return Err(StoreError::InvalidUrl(base.to_string()));
    };
    Ok(format!(
        "{host}/realtime/v1/websocket?apikey={}&vsn=1.0.0",
        urlencoding::encode(api_key)
    ))
}

fn topic_for(kind: RecordKind) -> String {
    format!("realtime:{}", kind.channel())
}

fn kind_for_topic(topic: &str) -> Option<RecordKind> {
    RecordKind::ALL
        .iter()
        .copied()
        .find(|k| topic_for(*k) == topic)
}

fn join_frame(kind: RecordKind, schema: &str, table: &str, api_key: &str, msg_ref: u64) -> Value {
    json!({
        "topic": topic_for(kind),
        "event": "phx_join",
        "payload": {
            "config": {
                "broadcast": { "self": false },
                "presence": { "key": "" },
                "postgres_changes": [
                    { "event": "*", "schema": schema, "table": table }
                ]
            },
            "access_token": api_key
        },
        "ref": msg_ref.to_string(),
        "join_ref": msg_ref.to_string()
    })
}

fn leave_frame(kind: RecordKind, msg_ref: u64) -> Value {
    json!({
        "topic": topic_for(kind),
        "event": "phx_leave",
        "payload": {},
        "ref": msg_ref.to_string()
    })
}

fn heartbeat_frame(msg_ref: u64) -> Value {
    json!({
        "topic": PHOENIX_TOPIC,
        "event": "heartbeat",
        "payload": {},
        "ref": msg_ref.to_string()
    })
}

fn parse_frame(raw: &str) -> Result<Frame, serde_json::Error> {
    let frame: PhoenixFrame = serde_json::from_str(raw)?;
    let Some(kind) = kind_for_topic(&frame.topic) else {
        return Ok(Frame::Ignored);
    };

    let frame = match frame.event.as_str() {
        "postgres_changes" => {
            let tag = frame.payload["data"]["type"].as_str().unwrap_or_default();
            match ChangeKind::from_tag(tag) {
                Some(change) => Frame::Change(ChangeEvent::new(kind, change)),
                None => {
                    debug!(%kind, tag, "Ignoring unrecognised change type");
                    Frame::Ignored
                }
            }
        }
        "phx_reply" => match frame.payload["status"].as_str() {
            Some("ok") => Frame::Joined(kind),
            Some("error") => Frame::ChannelFailed(format!(
                "{kind} join rejected: {}",
                frame.payload["response"]
            )),
            _ => Frame::Ignored,
        },
        "system" if frame.payload["status"].as_str() == Some("error") => Frame::ChannelFailed(
            format!(
                "{kind} channel error: {}",
                frame.payload["message"].as_str().unwrap_or("unknown")
            ),
        ),
        "phx_error" => Frame::ChannelFailed(format!("{kind} channel crashed")),
        "phx_close" => Frame::ChannelFailed(format!("{kind} channel closed")),
        _ => Frame::Ignored,
    };
    Ok(frame)
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Realtime change-feed client.
pub struct RealtimeClient {
    ws_url: String,
    api_key: SecretString,
    schema: String,
    tables: TableNames,
    heartbeat: Duration,
    reconnect_delay: Duration,
}

impl RealtimeClient {
    pub fn new(
        base_url: &str,
        api_key: SecretString,
        schema: &str,
        tables: TableNames,
        heartbeat: Duration,
        reconnect_delay: Duration,
    ) -> Result<Self, StoreError> {
        let ws_url = realtime_url(base_url, api_key.expose_secret())?;
        Ok(Self {
            ws_url,
            api_key,
            schema: schema.to_string(),
            tables,
            heartbeat,
            reconnect_delay,
        })
    }
}

#[async_trait]
impl ChangeFeed for RealtimeClient {
    async fn subscribe(&self, kinds: &[RecordKind]) -> Result<Subscription, StoreError> {
        if kinds.is_empty() {
            return Err(StoreError::Realtime("no record kinds to subscribe".into()));
        }

        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let (subscription, shutdown) = Subscription::new(rx);

        let worker = Worker {
            ws_url: self.ws_url.clone(),
            api_key: self.api_key.clone(),
            schema: self.schema.clone(),
            tables: self.tables.clone(),
            kinds: kinds.to_vec(),
            heartbeat: self.heartbeat,
            reconnect_delay: self.reconnect_delay,
            tx,
            next_ref: 0,
            failures: 0,
        };
        tokio::spawn(worker.run(shutdown));

        info!(kinds = ?kinds, "Realtime subscription started");
        Ok(subscription)
    }
}

// ---------------------------------------------------------------------------
// Connection worker
// ---------------------------------------------------------------------------

enum SessionEnd {
    Shutdown,
    Closed,
}

struct Worker {
    ws_url: String,
    api_key: SecretString,
    schema: String,
    tables: TableNames,
    kinds: Vec<RecordKind>,
    heartbeat: Duration,
    reconnect_delay: Duration,
    tx: mpsc::Sender<ChangeEvent>,
    next_ref: u64,
    /// Sessions ended since all channels were last joined.
    failures: u32,
}

impl Worker {
    async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let mut reconnecting = false;

        loop {
            if *shutdown.borrow() {
                break;
            }

            match self.session(&mut shutdown, reconnecting).await {
                Ok(SessionEnd::Shutdown) => break,
                Ok(SessionEnd::Closed) => warn!("Realtime connection closed by server"),
                Err(e) => warn!(error = %e, "Realtime session failed"),
            }

            if self.tx.is_closed() {
                break;
            }
            reconnecting = true;
            self.failures = self.failures.saturating_add(1);
            let delay = reconnect_backoff(self.reconnect_delay, self.failures);
            info!(
                delay_ms = delay.as_millis() as u64,
                failures = self.failures,
                "Reconnecting realtime feed"
            );

            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }

        info!("Realtime subscription stopped");
    }

    fn bump_ref(&mut self) -> u64 {
        self.next_ref += 1;
        self.next_ref
    }

    async fn session(
        &mut self,
        shutdown: &mut watch::Receiver<bool>,
        resync: bool,
    ) -> Result<SessionEnd, StoreError> {
        let (ws, _) = tokio_tungstenite::connect_async(self.ws_url.as_str()).await?;
        let (mut write, mut read) = ws.split();
        debug!("Realtime websocket connected");

        for kind in self.kinds.clone() {
            let msg_ref = self.bump_ref();
            let frame = join_frame(
                kind,
                &self.schema,
                self.tables.table(kind),
                self.api_key.expose_secret(),
                msg_ref,
            );
            write.send(Message::Text(frame.to_string().into())).await?;
        }

        let mut joined: Vec<RecordKind> = Vec::with_capacity(self.kinds.len());

        let mut heartbeat = tokio::time::interval(self.heartbeat);
        // The first tick completes immediately.
        heartbeat.tick().await;

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        for kind in self.kinds.clone() {
                            let msg_ref = self.bump_ref();
                            let _ = write
                                .send(Message::Text(leave_frame(kind, msg_ref).to_string().into()))
                                .await;
                        }
                        let _ = write.send(Message::Close(None)).await;
                        return Ok(SessionEnd::Shutdown);
                    }
                }
                _ = heartbeat.tick() => {
                    let msg_ref = self.bump_ref();
                    write
                        .send(Message::Text(heartbeat_frame(msg_ref).to_string().into()))
                        .await?;
                }
                msg = read.next() => match msg {
                    Some(Ok(Message::Text(text))) => match parse_frame(text.as_str()) {
                        Ok(Frame::Change(event)) => {
                            debug!(kind = %event.kind, change = %event.change, "Row change received");
                            if self.tx.send(event).await.is_err() {
                                return Ok(SessionEnd::Shutdown);
                            }
                        }
                        Ok(Frame::Joined(kind)) if !joined.contains(&kind) => {
                            debug!(%kind, "Realtime channel joined");
                            joined.push(kind);
                            if joined.len() == self.kinds.len() {
                                self.failures = 0;
                            }
                            if resync
                                && self
                                    .tx
                                    .send(ChangeEvent::new(kind, ChangeKind::Resync))
                                    .await
                                    .is_err()
                            {
                                return Ok(SessionEnd::Shutdown);
                            }
                        }
                        Ok(Frame::Joined(_)) => {}
                        Ok(Frame::ChannelFailed(reason)) => {
                            return Err(StoreError::Realtime(reason));
                        }
                        Ok(Frame::Ignored) => {}
                        Err(e) => warn!(error = %e, "Unparseable realtime frame"),
                    },
                    Some(Ok(Message::Ping(payload))) => {
                        write.send(Message::Pong(payload)).await?;
                    }
                    Some(Ok(Message::Close(_))) | None => return Ok(SessionEnd::Closed),
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(e.into()),
                },
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
