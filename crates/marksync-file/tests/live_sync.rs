//! Two sessions sharing one file store.

use std::time::Duration;

use futures_util::StreamExt;
use tempfile::TempDir;
use tokio::time::timeout;

use marksync_core::traits::ChangeFeed;
use marksync_core::{
    BookmarkList, BookmarkSession, FeedMessage, FeedScope, NewBookmark, OwnerId,
    SubscriptionStatus,
};
use marksync_file::FileBackend;

const WAIT: Duration = Duration::from_secs(5);

fn owner(s: &str) -> OwnerId {
    OwnerId::new(s).unwrap()
}

async fn open(root: &TempDir, user: &str) -> BookmarkSession<FileBackend, FileBackend> {
    let backend = FileBackend::new(root.path());
    BookmarkSession::open(backend.clone(), backend, owner(user))
        .await
        .unwrap()
}

async fn wait_for_list(
    session: &BookmarkSession<FileBackend, FileBackend>,
    predicate: impl Fn(&BookmarkList) -> bool,
) {
    let mut rx = session.updates();
    timeout(WAIT, rx.wait_for(|list| predicate(list)))
        .await
        .expect("timed out waiting for list")
        .expect("session dropped");
}

#[tokio::test]
async fn test_feed_reports_active_then_changes() {
    let tmp = TempDir::new().unwrap();
    let backend = FileBackend::new(tmp.path());
    let mut stream = backend
        .subscribe(&FeedScope::for_owner(&owner("u1")))
        .await
        .unwrap();

    let first = stream.next().await.unwrap().unwrap();
    let second = stream.next().await.unwrap().unwrap();
    assert_eq!(first, FeedMessage::Status(SubscriptionStatus::Connecting));
    assert_eq!(second, FeedMessage::Status(SubscriptionStatus::Active));

    let other = FileBackend::new(tmp.path());
    let row = other
        .store()
        .insert(&owner("u2"), &NewBookmark::new("Docs", "https://docs.rs").unwrap())
        .unwrap();

    let change = timeout(WAIT, stream.next()).await.unwrap().unwrap().unwrap();
    match change {
        FeedMessage::Change(raw) => {
            assert_eq!(raw.event_type.as_deref(), Some("INSERT"));
            assert_eq!(raw.new.unwrap()["id"], row.id.as_str());
        }
        other => panic!("expected change, got {:?}", other),
    }
}

#[tokio::test]
async fn test_other_session_insert_and_delete_propagate() {
    let tmp = TempDir::new().unwrap();
    let tab_a = open(&tmp, "u1").await;
    let tab_b = open(&tmp, "u1").await;

    let record = tab_a.add("Rust", "https://rust-lang.org").await.unwrap();
    assert_eq!(tab_a.bookmarks().len(), 1);

    wait_for_list(&tab_b, |list| list.contains(&record.id)).await;
    assert_eq!(tab_b.bookmarks().as_slice(), &[record.clone()]);

    tab_b.remove(&record.id).await.unwrap();
    assert!(tab_b.bookmarks().is_empty());

    wait_for_list(&tab_a, |list| list.is_empty()).await;

    tab_a.close();
    tab_b.close();
}

#[tokio::test]
async fn test_own_echo_is_not_duplicated() {
    let tmp = TempDir::new().unwrap();
    let session = open(&tmp, "u1").await;
    let other = open(&tmp, "u1").await;

    let mine = session.add("Mine", "https://mine.test").await.unwrap();
    let theirs = other.add("Theirs", "https://theirs.test").await.unwrap();

    // The other tab's insert is logged after our own, so once it arrives our
    // echo has been merged too.
    wait_for_list(&session, |list| list.contains(&theirs.id)).await;

    let list = session.bookmarks();
    assert_eq!(list.len(), 2);
    assert_eq!(list.iter().filter(|b| b.id == mine.id).count(), 1);
}

#[tokio::test]
async fn test_other_owner_rows_stay_out() {
    let tmp = TempDir::new().unwrap();
    let alice = open(&tmp, "alice").await;
    let bob = open(&tmp, "bob").await;

    bob.add("Bob's", "https://bob.test").await.unwrap();
    let marker = alice.add("Alice's", "https://alice.test").await.unwrap();
    let later = bob.add("Bob again", "https://bob.test/2").await.unwrap();

    wait_for_list(&bob, |list| list.contains(&later.id)).await;
    tokio::time::sleep(Duration::from_millis(700)).await;

    let list = alice.bookmarks();
    assert_eq!(list.len(), 1);
    assert!(list.contains(&marker.id));
    assert!(list.iter().all(|b| b.owner.as_str() == "alice"));
}

#[tokio::test]
async fn test_reopen_loads_persisted_rows() {
    let tmp = TempDir::new().unwrap();
    let first = open(&tmp, "u1").await;
    first.add("One", "https://one.test").await.unwrap();
    first.add("Two", "https://two.test").await.unwrap();
    first.close();

    let second = open(&tmp, "u1").await;
    let titles: Vec<_> = second.bookmarks().iter().map(|b| b.title.clone()).collect();
    assert_eq!(titles.len(), 2);
    assert!(titles.contains(&"One".to_string()));
}
