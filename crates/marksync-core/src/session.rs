//! Live bookmark session.
//!
//! A [`BookmarkSession`] owns the list state of one signed-in user, exactly
//! one change feed subscription, and the store handle used for local
//! mutations. Every write to the list (initial fetch, local results, feed
//! events) goes through one serialized cell, so callbacks never race.
//!
//! # Example
//!
//! ```no_run
//! use marksync_core::{BookmarkSession, BookmarkStore, ChangeFeed, OwnerId};
//!
//! # async fn example<S, F>(store: S, feed: F) -> marksync_core::Result<()>
//! # where S: BookmarkStore + 'static, F: ChangeFeed + 'static {
//! let owner = OwnerId::new("2f1c0d9e-user")?;
//! let session = BookmarkSession::open(store, feed, owner).await?;
//!
//! session.add("Rust", "https://rust-lang.org").await?;
//! for bookmark in session.bookmarks().iter() {
//!     println!("{} {}", bookmark.title, bookmark.url);
//! }
//!
//! session.close();
//! # Ok(())
//! # }
//! ```

use std::mem;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures_util::StreamExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use crate::error::Error;
use crate::feed::{FeedMessage, FeedScope, RawChange, SubscriptionStatus};
use crate::reconcile::{BookmarkList, MergeOutcome};
use crate::traits::{BookmarkStore, ChangeFeed, FeedStream};
use crate::types::{Bookmark, BookmarkId, NewBookmark, OwnerId};
use crate::Result;

/// A change waiting to be merged into the list.
#[derive(Debug, Clone)]
enum PendingChange {
    LocalInsert(Bookmark),
    LocalDelete(BookmarkId),
    Remote(RawChange),
}

#[derive(Debug)]
enum Phase {
    /// A fetch is in flight; changes are buffered until it lands.
    Loading {
        generation: u64,
        pending: Vec<PendingChange>,
    },
    Live,
    Closed,
}

/// List state shared between the session and its feed pump.
#[derive(Debug)]
struct SharedState {
    owner: OwnerId,
    list: watch::Sender<BookmarkList>,
    status: watch::Sender<SubscriptionStatus>,
    phase: Mutex<Phase>,
    load_generation: AtomicU64,
    /// Id of the subscription allowed to report status.
    current_subscription: AtomicU64,
}

impl SharedState {
    fn new(owner: OwnerId) -> Self {
        let (list, _) = watch::channel(BookmarkList::new());
        let (status, _) = watch::channel(SubscriptionStatus::Closed);
        Self {
            owner,
            list,
            status,
            phase: Mutex::new(Phase::Loading {
                generation: 0,
                pending: Vec::new(),
            }),
            load_generation: AtomicU64::new(0),
            current_subscription: AtomicU64::new(0),
        }
    }

    fn phase(&self) -> MutexGuard<'_, Phase> {
        self.phase.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_closed(&self) -> bool {
        matches!(*self.phase(), Phase::Closed)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(Error::SessionClosed);
        }
        Ok(())
    }

    /// Merge a change now, buffer it during a load, or drop it after close.
    fn submit(&self, change: PendingChange) -> Option<MergeOutcome> {
        let mut phase = self.phase();
        match &mut *phase {
            Phase::Closed => {
                debug!(?change, "Discarding change for closed session");
                None
            }
            Phase::Loading { pending, .. } => {
                pending.push(change);
                None
            }
            Phase::Live => Some(self.merge(change)),
        }
    }

    /// Apply one change to the list. Callers hold the phase lock.
    fn merge(&self, change: PendingChange) -> MergeOutcome {
        let mut outcome = MergeOutcome::Ignored;
        self.list.send_if_modified(|list| {
            outcome = match change {
                PendingChange::LocalInsert(record) => list.apply_local_insert(record),
                PendingChange::LocalDelete(id) => list.apply_local_delete(&id),
                PendingChange::Remote(raw) => list.apply_remote_event(&raw, &self.owner),
            };
            outcome.changed()
        });
        outcome
    }

    fn begin_load(&self) -> Result<u64> {
        let mut phase = self.phase();
        let generation = self.load_generation.fetch_add(1, Ordering::SeqCst) + 1;
        match &mut *phase {
            Phase::Closed => return Err(Error::SessionClosed),
            Phase::Loading {
                generation: current,
                ..
            } => {
                // A newer fetch supersedes the one in flight; keep its buffer.
                *current = generation;
                return Ok(generation);
            }
            Phase::Live => {}
        }

        *phase = Phase::Loading {
            generation,
            pending: Vec::new(),
        };
        Ok(generation)
    }

    /// Replace the list with a fetch result and replay what arrived meanwhile.
    fn finish_load(&self, generation: u64, records: Vec<Bookmark>) {
        let mut phase = self.phase();
        let pending = match &mut *phase {
            Phase::Loading {
                generation: current,
                pending,
            } if *current == generation => mem::take(pending),
            Phase::Loading { .. } => {
                debug!(generation, "Discarding superseded fetch result");
                return;
            }
            Phase::Live | Phase::Closed => {
                debug!(generation, "Discarding fetch result for inactive load");
                return;
            }
        };

        self.list.send_modify(|list| list.replace(&self.owner, records));
        let replayed = pending.len();
        for change in pending {
            self.merge(change);
        }
        *phase = Phase::Live;

        debug!(
            count = self.list.borrow().len(),
            replayed, "Bookmark list loaded"
        );
    }

    /// Leave the loading phase without replacing the list.
    fn abort_load(&self, generation: u64) {
        let mut phase = self.phase();
        let pending = match &mut *phase {
            Phase::Loading {
                generation: current,
                pending,
            } if *current == generation => mem::take(pending),
            _ => return,
        };

        for change in pending {
            self.merge(change);
        }
        *phase = Phase::Live;
    }

    /// Stop accepting changes and status reports.
    fn mark_closed(&self) {
        let mut phase = self.phase();
        *phase = Phase::Closed;
        self.current_subscription.store(0, Ordering::SeqCst);
    }

    /// Make `subscription` the one allowed to report status.
    fn claim_subscription(&self, subscription: u64) -> Result<()> {
        let phase = self.phase();
        if matches!(*phase, Phase::Closed) {
            return Err(Error::SessionClosed);
        }
        self.current_subscription.store(subscription, Ordering::SeqCst);
        Ok(())
    }

    fn discard(&self) {
        self.list.send_modify(BookmarkList::clear);
        self.status.send_replace(SubscriptionStatus::Closed);
    }

    fn set_status(&self, subscription: u64, channel: &str, status: SubscriptionStatus) {
        // Held so a concurrent close cannot slip in between check and send.
        let phase = self.phase();
        if matches!(*phase, Phase::Closed)
            || self.current_subscription.load(Ordering::SeqCst) != subscription
        {
            return;
        }

        match &status {
            SubscriptionStatus::Active => info!(channel, "Realtime subscription active"),
            SubscriptionStatus::Error(reason) => {
                error!(channel, %reason, "Realtime subscription failed")
            }
            SubscriptionStatus::TimedOut => error!(channel, "Realtime subscription timed out"),
            SubscriptionStatus::Connecting | SubscriptionStatus::Closed => {
                debug!(channel, %status, "Subscription status")
            }
        }

        self.status.send_replace(status);
    }
}

/// A running feed subscription. Dropping it unsubscribes.
#[derive(Debug)]
struct Subscription {
    scope: FeedScope,
    task: JoinHandle<()>,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}

struct SessionInner<S, F> {
    store: S,
    feed: F,
    state: Arc<SharedState>,
    subscription: Mutex<Option<Subscription>>,
    /// Serializes subscribe/resubscribe so only one can be opening at once.
    subscribing: tokio::sync::Mutex<()>,
    next_subscription: AtomicU64,
}

impl<S, F> SessionInner<S, F> {
    fn slot(&self) -> MutexGuard<'_, Option<Subscription>> {
        self.subscription
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// The live bookmark list of one signed-in user.
///
/// Cloning yields another handle to the same session.
pub struct BookmarkSession<S, F> {
    inner: Arc<SessionInner<S, F>>,
}

impl<S, F> Clone for BookmarkSession<S, F> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S, F> BookmarkSession<S, F>
where
    S: BookmarkStore + 'static,
    F: ChangeFeed + 'static,
{
    /// Start a session for `owner`.
    ///
    /// Opens one feed subscription on a fresh channel, then fetches the
    /// owner's bookmarks. Changes that arrive while the fetch is in flight
    /// are replayed on top of its result.
    ///
    /// # Errors
    ///
    /// Fails if the feed cannot be subscribed or the initial fetch fails; in
    /// both cases nothing is left subscribed.
    #[instrument(skip(store, feed))]
    pub async fn open(store: S, feed: F, owner: OwnerId) -> Result<Self> {
        let session = Self {
            inner: Arc::new(SessionInner {
                store,
                feed,
                state: Arc::new(SharedState::new(owner)),
                subscription: Mutex::new(None),
                subscribing: tokio::sync::Mutex::new(()),
                next_subscription: AtomicU64::new(1),
            }),
        };

        // Initial load generation: the state starts in Loading.
        let generation = session.inner.state.begin_load()?;

        if let Err(e) = session.resubscribe().await {
            session.close();
            return Err(e);
        }

        match session.inner.store.fetch_all(session.owner()).await {
            Ok(records) => session.inner.state.finish_load(generation, records),
            Err(e) => {
                warn!(error = %e, "Initial fetch failed");
                session.close();
                return Err(e);
            }
        }

        info!(count = session.bookmarks().len(), "Session opened");
        Ok(session)
    }

    /// Create a bookmark and merge it into the list.
    ///
    /// # Errors
    ///
    /// [`Error::Validation`] for a blank title or URL (the store is not
    /// called), [`Error::Store`] if the store rejects the insert. The list is
    /// unchanged on error.
    #[instrument(skip(self), fields(owner = %self.owner()))]
    pub async fn add(&self, title: &str, url: &str) -> Result<Bookmark> {
        let new = NewBookmark::new(title, url)?;
        self.inner.state.ensure_open()?;

        let record = self.inner.store.insert(self.owner(), &new).await?;
        debug!(id = %record.id, "Bookmark inserted");

        self.inner
            .state
            .submit(PendingChange::LocalInsert(record.clone()));
        Ok(record)
    }

    /// Delete a bookmark and remove it from the list.
    ///
    /// # Errors
    ///
    /// [`Error::Store`] if the store rejects the delete; the list is unchanged.
    #[instrument(skip(self), fields(owner = %self.owner()))]
    pub async fn remove(&self, id: &BookmarkId) -> Result<()> {
        self.inner.state.ensure_open()?;

        self.inner.store.delete(id).await?;
        debug!("Bookmark deleted");

        self.inner
            .state
            .submit(PendingChange::LocalDelete(id.clone()));
        Ok(())
    }

    /// Refetch the list and replace it wholesale.
    #[instrument(skip(self), fields(owner = %self.owner()))]
    pub async fn reload(&self) -> Result<()> {
        let generation = self.inner.state.begin_load()?;

        match self.inner.store.fetch_all(self.owner()).await {
            Ok(records) => {
                self.inner.state.finish_load(generation, records);
                Ok(())
            }
            Err(e) => {
                self.inner.state.abort_load(generation);
                Err(e)
            }
        }
    }

    /// Close the current subscription and open a new one on a fresh channel.
    ///
    /// Used to recover after the feed reported an error or timed out. The
    /// old subscription is gone before the new one is requested.
    #[instrument(skip(self), fields(owner = %self.owner()))]
    pub async fn resubscribe(&self) -> Result<()> {
        let _guard = self.inner.subscribing.lock().await;
        self.inner.state.ensure_open()?;

        if let Some(old) = self.inner.slot().take() {
            debug!(channel = old.scope.channel(), "Closing previous subscription");
            drop(old);
        }

        let id = self.inner.next_subscription.fetch_add(1, Ordering::SeqCst);
        let scope = FeedScope::for_owner(self.owner());
        let state = Arc::clone(&self.inner.state);
        state.claim_subscription(id)?;
        state.set_status(id, scope.channel(), SubscriptionStatus::Connecting);

        info!(channel = scope.channel(), "Setting up realtime subscription");

        let stream = match self.inner.feed.subscribe(&scope).await {
            Ok(stream) => stream,
            Err(e) => {
                state.set_status(id, scope.channel(), SubscriptionStatus::Error(e.to_string()));
                return Err(e);
            }
        };

        let task = tokio::spawn(pump(stream, state, id, scope.channel().to_string()));
        let subscription = Subscription { scope, task };

        let mut slot = self.inner.slot();
        if self.inner.state.is_closed() {
            // Closed while we were subscribing; dropping aborts the pump.
            drop(subscription);
            return Err(Error::SessionClosed);
        }
        *slot = Some(subscription);
        Ok(())
    }
}

impl<S, F> BookmarkSession<S, F> {
    /// Tear the session down.
    ///
    /// Unsubscribes synchronously, then discards the list. Store requests
    /// still in flight complete, but their results are not merged.
    pub fn close(&self) {
        let subscription = {
            let mut slot = self.inner.slot();
            self.inner.state.mark_closed();
            slot.take()
        };

        if let Some(subscription) = subscription {
            info!(channel = subscription.scope.channel(), "Cleaning up realtime subscription");
            drop(subscription);
        }

        self.inner.state.discard();
    }

    /// The session owner.
    pub fn owner(&self) -> &OwnerId {
        &self.inner.state.owner
    }

    /// Snapshot of the current list.
    pub fn bookmarks(&self) -> BookmarkList {
        self.inner.state.list.borrow().clone()
    }

    /// Receiver that observes every list change.
    pub fn updates(&self) -> watch::Receiver<BookmarkList> {
        self.inner.state.list.subscribe()
    }

    /// Receiver that observes subscription status changes.
    pub fn status(&self) -> watch::Receiver<SubscriptionStatus> {
        self.inner.state.status.subscribe()
    }

    /// Name of the active channel, if subscribed.
    pub fn channel(&self) -> Option<String> {
        self.inner
            .slot()
            .as_ref()
            .map(|s| s.scope.channel().to_string())
    }

    /// Returns an error if the feed is in a degraded state.
    pub fn check_subscription(&self) -> Result<()> {
        let status = self.inner.state.status.borrow().clone();
        let channel = self.channel().unwrap_or_default();
        match status.to_error(&channel) {
            Some(err) => Err(err.into()),
            None => Ok(()),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.state.is_closed()
    }
}

impl<S, F> std::fmt::Debug for BookmarkSession<S, F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BookmarkSession")
            .field("owner", &self.inner.state.owner)
            .field("channel", &self.channel())
            .finish()
    }
}

/// Feed messages into the shared state until the stream ends.
async fn pump<T>(mut stream: T, state: Arc<SharedState>, id: u64, channel: String)
where
    T: FeedStream + Unpin,
{
    while let Some(message) = stream.next().await {
        match message {
            Ok(FeedMessage::Status(status)) => state.set_status(id, &channel, status),
            Ok(FeedMessage::Change(raw)) => {
                debug!(channel, event_type = ?raw.event_type, "Realtime event received");
                if let Some(outcome) = state.submit(PendingChange::Remote(raw)) {
                    debug!(channel, ?outcome, "Realtime event merged");
                }
            }
            Err(e) => {
                state.set_status(id, &channel, SubscriptionStatus::Error(e.to_string()));
                return;
            }
        }
    }

    // A feed that gave up after an error or timeout keeps reporting it.
    let degraded = state.status.borrow().is_degraded();
    if !degraded {
        state.set_status(id, &channel, SubscriptionStatus::Closed);
    }
}
