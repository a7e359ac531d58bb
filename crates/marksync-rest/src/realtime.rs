//! Change feed over the realtime WebSocket service.
//!
//! The service speaks the Phoenix channel protocol: JSON frames of
//! `{topic, event, payload, ref}`. A subscription joins topic
//! `realtime:<channel>` asking for every `postgres_changes` event on one
//! table, then receives one frame per row change.

use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::time::{Instant, interval_at, sleep};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::{debug, error, info, instrument, trace, warn};

use marksync_core::error::{Error, SubscriptionError};
use marksync_core::traits::ChangeFeed;
use marksync_core::{
    AccessToken, ApiKey, FeedMessage, FeedScope, RawChange, Result, StoreUrl, SubscriptionStatus,
};

/// How long the service has to confirm a join.
pub const DEFAULT_JOIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Interval between heartbeats on the `phoenix` topic.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(25);

const PROTOCOL_VERSION: &str = "1.0.0";

/// Ref of the join frame; heartbeats count up from the next number.
const JOIN_REF: &str = "1";

/// One Phoenix channel frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct PhoenixMessage {
    topic: String,
    event: String,
    #[serde(default)]
    payload: Value,
    #[serde(rename = "ref", default)]
    reference: Option<String>,
}

/// Why the socket loop woke up.
enum Wake {
    JoinTimeout,
    Heartbeat,
    Socket(Option<std::result::Result<Message, WsError>>),
}

/// What a received frame means for the subscription.
#[derive(Debug, Clone, PartialEq)]
enum Frame {
    Joined,
    JoinRejected(String),
    Change(RawChange),
    ChannelError(String),
    Closed,
    Other,
}

fn join_message(scope: &FeedScope, access_token: Option<&AccessToken>, reference: &str) -> PhoenixMessage {
    let mut payload = json!({
        "config": {
            "broadcast": { "self": false },
            "presence": { "key": "" },
            "postgres_changes": [{
                "event": "*",
                "schema": scope.schema(),
                "table": scope.table(),
            }],
        }
    });
    if let Some(token) = access_token {
        payload["access_token"] = Value::String(token.as_str().to_string());
    }

    PhoenixMessage {
        topic: format!("realtime:{}", scope.channel()),
        event: "phx_join".to_string(),
        payload,
        reference: Some(reference.to_string()),
    }
}

fn heartbeat_message(reference: &str) -> PhoenixMessage {
    PhoenixMessage {
        topic: "phoenix".to_string(),
        event: "heartbeat".to_string(),
        payload: json!({}),
        reference: Some(reference.to_string()),
    }
}

fn reason(payload: &Value, fallback: &str) -> String {
    payload
        .pointer("/response/reason")
        .or_else(|| payload.get("message"))
        .or_else(|| payload.get("reason"))
        .and_then(Value::as_str)
        .unwrap_or(fallback)
        .to_string()
}

fn classify(message: &PhoenixMessage, topic: &str, join_ref: &str) -> Frame {
    if message.topic != topic {
        return Frame::Other;
    }

    match message.event.as_str() {
        "phx_reply" if message.reference.as_deref() == Some(join_ref) => {
            match message.payload.get("status").and_then(Value::as_str) {
                Some("ok") => Frame::Joined,
                status => Frame::JoinRejected(reason(&message.payload, status.unwrap_or("no status"))),
            }
        }
        "postgres_changes" => {
            // Undecodable data becomes an empty change, which the reconciler
            // rejects as malformed.
            let data = message.payload.get("data").cloned().unwrap_or(Value::Null);
            Frame::Change(serde_json::from_value(data).unwrap_or_default())
        }
        "system" if message.payload.get("status").and_then(Value::as_str) == Some("error") => {
            Frame::ChannelError(reason(&message.payload, "system error"))
        }
        "phx_error" => Frame::ChannelError(reason(&message.payload, "channel error")),
        "phx_close" => Frame::Closed,
        _ => Frame::Other,
    }
}

fn encode(message: &PhoenixMessage) -> Result<Message> {
    let text = serde_json::to_string(message).map_err(|e| SubscriptionError::Connection {
        message: e.to_string(),
    })?;
    Ok(Message::Text(text.into()))
}

fn connection_error(err: impl std::fmt::Display) -> Error {
    SubscriptionError::Connection {
        message: err.to_string(),
    }
    .into()
}

/// Realtime change feed for a hosted store.
#[derive(Clone)]
pub struct RealtimeFeed {
    socket_url: String,
    api_key: ApiKey,
    access_token: Option<AccessToken>,
    join_timeout: Duration,
    heartbeat_interval: Duration,
}

impl RealtimeFeed {
    /// Create a feed for `store`.
    pub fn new(store: &StoreUrl, api_key: ApiKey, access_token: Option<AccessToken>) -> Self {
        Self {
            socket_url: store.realtime_url(),
            api_key,
            access_token,
            join_timeout: DEFAULT_JOIN_TIMEOUT,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
        }
    }

    /// Override how long a join may stay unconfirmed.
    pub fn with_join_timeout(mut self, timeout: Duration) -> Self {
        self.join_timeout = timeout;
        self
    }

    /// Override the heartbeat interval.
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    fn connect_url(&self) -> String {
        format!(
            "{}?apikey={}&vsn={}",
            self.socket_url,
            self.api_key.as_str(),
            PROTOCOL_VERSION
        )
    }
}

impl std::fmt::Debug for RealtimeFeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealtimeFeed")
            .field("socket_url", &self.socket_url)
            .field("join_timeout", &self.join_timeout)
            .field("heartbeat_interval", &self.heartbeat_interval)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ChangeFeed for RealtimeFeed {
    type Stream = RealtimeStream;

    #[instrument(skip(self), fields(channel = scope.channel()))]
    async fn subscribe(&self, scope: &FeedScope) -> Result<Self::Stream> {
        info!(url = %self.socket_url, "Connecting to realtime");

        let (ws_stream, _) = connect_async(self.connect_url())
            .await
            .map_err(connection_error)?;

        debug!("WebSocket connected, joining channel");

        let topic = format!("realtime:{}", scope.channel());
        let join = encode(&join_message(scope, self.access_token.as_ref(), JOIN_REF))?;
        let join_timeout = self.join_timeout;
        let heartbeat_every = self.heartbeat_interval;

        let stream = async_stream::stream! {
            let (mut write, mut read) = ws_stream.split();
            let mut next_ref: u64 = 2;

            yield Ok(FeedMessage::Status(SubscriptionStatus::Connecting));

            if let Err(e) = write.send(join).await {
                yield Err(connection_error(e));
                return;
            }

            let deadline = sleep(join_timeout);
            tokio::pin!(deadline);
            let mut joined = false;
            let mut heartbeat = interval_at(Instant::now() + heartbeat_every, heartbeat_every);

            loop {
                let wake = tokio::select! {
                    _ = &mut deadline, if !joined => Wake::JoinTimeout,
                    _ = heartbeat.tick() => Wake::Heartbeat,
                    message = read.next() => Wake::Socket(message),
                };

                match wake {
                    Wake::JoinTimeout => {
                        warn!(%topic, "Channel join timed out");
                        yield Ok(FeedMessage::Status(SubscriptionStatus::TimedOut));
                        break;
                    }
                    Wake::Heartbeat => {
                        let beat = match encode(&heartbeat_message(&next_ref.to_string())) {
                            Ok(beat) => beat,
                            Err(e) => {
                                yield Err(e);
                                break;
                            }
                        };
                        next_ref += 1;
                        trace!("Sending heartbeat");
                        if let Err(e) = write.send(beat).await {
                            yield Err(connection_error(e));
                            break;
                        }
                    }
                    Wake::Socket(Some(Ok(Message::Text(text)))) => {
                        let message = match serde_json::from_str::<PhoenixMessage>(text.as_str()) {
                            Ok(message) => message,
                            Err(e) => {
                                warn!(error = %e, "Ignoring undecodable realtime frame");
                                continue;
                            }
                        };

                        match classify(&message, &topic, JOIN_REF) {
                            Frame::Joined => {
                                joined = true;
                                yield Ok(FeedMessage::Status(SubscriptionStatus::Active));
                            }
                            Frame::JoinRejected(reason) => {
                                yield Ok(FeedMessage::Status(SubscriptionStatus::Error(reason)));
                                break;
                            }
                            Frame::Change(change) => yield Ok(FeedMessage::Change(change)),
                            Frame::ChannelError(reason) => {
                                error!(%topic, %reason, "Channel error");
                                yield Ok(FeedMessage::Status(SubscriptionStatus::Error(reason)));
                                break;
                            }
                            Frame::Closed => {
                                info!(%topic, "Channel closed by server");
                                yield Ok(FeedMessage::Status(SubscriptionStatus::Closed));
                                break;
                            }
                            Frame::Other => trace!(event = %message.event, "Ignoring frame"),
                        }
                    }
                    Wake::Socket(Some(Ok(Message::Ping(data)))) => {
                        if let Err(e) = write.send(Message::Pong(data)).await {
                            warn!(error = %e, "Failed to send pong");
                        }
                    }
                    Wake::Socket(Some(Ok(Message::Close(frame)))) => {
                        info!(?frame, "WebSocket closed by server");
                        yield Ok(FeedMessage::Status(SubscriptionStatus::Closed));
                        break;
                    }
                    Wake::Socket(Some(Ok(_))) => {}
                    Wake::Socket(Some(Err(e))) => {
                        error!(error = %e, "WebSocket error");
                        yield Err(connection_error(e));
                        break;
                    }
                    Wake::Socket(None) => {
                        yield Ok(FeedMessage::Status(SubscriptionStatus::Closed));
                        break;
                    }
                }
            }
        };

        Ok(RealtimeStream {
            inner: Box::pin(stream),
        })
    }
}

/// Messages from one realtime channel. Dropping it closes the socket.
pub struct RealtimeStream {
    inner: Pin<Box<dyn Stream<Item = Result<FeedMessage>> + Send>>,
}

impl Stream for RealtimeStream {
    type Item = Result<FeedMessage>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

impl std::fmt::Debug for RealtimeStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealtimeStream").finish_non_exhaustive()
    }
}
