//! Realtime feed against a local WebSocket server.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::time::timeout;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

use marksync_core::traits::ChangeFeed;
use marksync_core::{
    ApiKey, BookmarkList, FeedMessage, FeedScope, OwnerId, StoreUrl, SubscriptionStatus,
};
use marksync_rest::RealtimeFeed;

const WAIT: Duration = Duration::from_secs(5);

enum Server {
    /// Confirm the join, then send these frames.
    Accept(Vec<Value>),
    /// Never answer the join.
    Silent,
    /// Reject the join.
    Reject,
}

/// Serve one realtime client; returns the store URL and the join frame.
async fn serve(behaviour: Server) -> (StoreUrl, tokio::sync::oneshot::Receiver<Value>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let (join_tx, join_rx) = tokio::sync::oneshot::channel();

    tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(tcp).await.unwrap();

        let join: Value = loop {
            match ws.next().await {
                Some(Ok(Message::Text(text))) => break serde_json::from_str(text.as_str()).unwrap(),
                Some(Ok(_)) => continue,
                _ => return,
            }
        };
        let topic = join["topic"].clone();
        let join_ref = join["ref"].clone();
        let _ = join_tx.send(join);

        let frames = match behaviour {
            Server::Silent => Vec::new(),
            Server::Reject => vec![json!({
                "topic": topic,
                "event": "phx_reply",
                "payload": { "status": "error", "response": { "reason": "unauthorized" } },
                "ref": join_ref
            })],
            Server::Accept(changes) => {
                let mut frames = vec![json!({
                    "topic": topic,
                    "event": "phx_reply",
                    "payload": { "status": "ok", "response": { "postgres_changes": [] } },
                    "ref": join_ref
                })];
                frames.extend(changes.into_iter().map(|data| {
                    json!({
                        "topic": topic,
                        "event": "postgres_changes",
                        "payload": { "data": data, "ids": [1] },
                        "ref": null
                    })
                }));
                frames
            }
        };

        for frame in frames {
            ws.send(Message::Text(frame.to_string().into())).await.unwrap();
        }

        // Keep the socket open until the client goes away.
        while let Some(Ok(_)) = ws.next().await {}
    });

    let url = StoreUrl::new(format!("http://127.0.0.1:{}", port)).unwrap();
    (url, join_rx)
}

fn scope() -> FeedScope {
    FeedScope::for_owner(&OwnerId::new("u1").unwrap())
}

fn insert_data(id: u32, user: &str) -> Value {
    json!({
        "type": "INSERT",
        "schema": "public",
        "table": "bookmarks",
        "commit_timestamp": "2024-05-01T10:00:00Z",
        "record": {
            "id": id,
            "user_id": user,
            "title": format!("Title {}", id),
            "url": format!("https://example.com/{}", id),
            "created_at": "2024-05-01T10:00:00+00:00"
        },
        "old_record": null
    })
}

#[tokio::test]
async fn test_join_then_changes() {
    let (url, join_rx) = serve(Server::Accept(vec![insert_data(1, "u1"), insert_data(2, "u2")])).await;
    let feed = RealtimeFeed::new(&url, ApiKey::new("anon"), None);
    let scope = scope();

    let mut stream = feed.subscribe(&scope).await.unwrap();

    let mut messages = Vec::new();
    for _ in 0..4 {
        let message = timeout(WAIT, stream.next()).await.unwrap().unwrap().unwrap();
        messages.push(message);
    }

    assert_eq!(messages[0], FeedMessage::Status(SubscriptionStatus::Connecting));
    assert_eq!(messages[1], FeedMessage::Status(SubscriptionStatus::Active));

    // The feed is not owner-scoped; both changes arrive and the list keeps
    // only the session owner's row.
    let owner = OwnerId::new("u1").unwrap();
    let mut list = BookmarkList::new();
    for message in &messages[2..] {
        let FeedMessage::Change(raw) = message else {
            panic!("expected change, got {:?}", message);
        };
        list.apply_remote_event(raw, &owner);
    }
    assert_eq!(list.len(), 1);
    assert_eq!(list.as_slice()[0].id.as_str(), "1");

    let join = join_rx.await.unwrap();
    assert_eq!(join["event"], "phx_join");
    assert_eq!(join["topic"], format!("realtime:{}", scope.channel()));
    assert_eq!(
        join["payload"]["config"]["postgres_changes"],
        json!([{ "event": "*", "schema": "public", "table": "bookmarks" }])
    );
}

#[tokio::test]
async fn test_unanswered_join_times_out() {
    let (url, _join_rx) = serve(Server::Silent).await;
    let feed = RealtimeFeed::new(&url, ApiKey::new("anon"), None)
        .with_join_timeout(Duration::from_millis(200));

    let stream = feed.subscribe(&scope()).await.unwrap();
    let messages: Vec<_> = timeout(WAIT, stream.collect::<Vec<_>>()).await.unwrap();

    let statuses: Vec<_> = messages.into_iter().map(Result::unwrap).collect();
    assert_eq!(
        statuses,
        vec![
            FeedMessage::Status(SubscriptionStatus::Connecting),
            FeedMessage::Status(SubscriptionStatus::TimedOut),
        ]
    );
}

#[tokio::test]
async fn test_rejected_join_reports_error() {
    let (url, _join_rx) = serve(Server::Reject).await;
    let feed = RealtimeFeed::new(&url, ApiKey::new("anon"), None);

    let stream = feed.subscribe(&scope()).await.unwrap();
    let messages: Vec<_> = timeout(WAIT, stream.collect::<Vec<_>>()).await.unwrap();

    let last = messages.into_iter().last().unwrap().unwrap();
    assert_eq!(
        last,
        FeedMessage::Status(SubscriptionStatus::Error("unauthorized".to_string()))
    );
}

#[tokio::test]
async fn test_unreachable_socket_fails_subscribe() {
    let url = StoreUrl::new("http://127.0.0.1:1").unwrap();
    let feed = RealtimeFeed::new(&url, ApiKey::new("anon"), None);

    let err = feed.subscribe(&scope()).await.unwrap_err();
    assert!(matches!(err, marksync_core::Error::Subscription(_)));
}
