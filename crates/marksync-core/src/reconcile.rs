//! Reconciliation of local results and feed events into the bookmark list.
//!
//! The same logical mutation reaches a session twice: once as the direct
//! result of a store request the session made, and again when the change feed
//! broadcasts the row change back. Every merge here is keyed by
//! [`BookmarkId`], so applying an insert a second time is a no-op and
//! removing an absent id is a no-op. Arrival order between the two channels
//! therefore never matters.
//!
//! The feed is not owner-scoped. Remote events whose owner differs from the
//! session owner are discarded before anything else is looked at; this
//! filter is the only thing keeping one user's rows out of another's list.

use std::collections::HashSet;

use tracing::{debug, warn};

use crate::error::MalformedEventError;
use crate::feed::{ChangeEvent, RawChange};
use crate::types::{Bookmark, BookmarkId, OwnerId};

/// What a merge did to the list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    /// The record was prepended.
    Inserted,
    /// A record with the same id was already present.
    Duplicate,
    /// The record was removed.
    Removed,
    /// No record with that id was present.
    Absent,
    /// The event belonged to another owner.
    ForeignOwner,
    /// The event could not be validated.
    Malformed(MalformedEventError),
    /// A well-formed event this list does not track.
    Ignored,
}

impl MergeOutcome {
    /// Returns true if the list changed.
    pub fn changed(&self) -> bool {
        matches!(self, MergeOutcome::Inserted | MergeOutcome::Removed)
    }
}

/// The session's ordered bookmark list.
///
/// Newest first: the initial fetch arrives sorted by creation time
/// descending, and every later insert is prepended. Ids are unique and every
/// record belongs to the session owner.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookmarkList {
    items: Vec<Bookmark>,
}

impl BookmarkList {
    /// An empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole list with a fetch result for `owner`.
    ///
    /// Rows of other owners and repeated ids are dropped so the list
    /// invariants hold even if the store misbehaves.
    pub fn replace(&mut self, owner: &OwnerId, records: Vec<Bookmark>) {
        let mut seen = HashSet::with_capacity(records.len());
        let mut items = Vec::with_capacity(records.len());

        for record in records {
            if &record.owner != owner {
                warn!(id = %record.id, owner = %record.owner, "Dropping fetched bookmark of another owner");
                continue;
            }
            if !seen.insert(record.id.clone()) {
                warn!(id = %record.id, "Dropping repeated bookmark id from fetch");
                continue;
            }
            items.push(record);
        }

        self.items = items;
    }

    /// Merge the result of a successful local insert.
    pub fn apply_local_insert(&mut self, record: Bookmark) -> MergeOutcome {
        self.prepend_unique(record)
    }

    /// Merge the result of a successful local delete.
    pub fn apply_local_delete(&mut self, id: &BookmarkId) -> MergeOutcome {
        self.remove(id)
    }

    /// Merge a change delivered by the feed.
    ///
    /// Malformed events are logged and discarded; nothing here fails.
    pub fn apply_remote_event(&mut self, raw: &RawChange, session_owner: &OwnerId) -> MergeOutcome {
        let event = match ChangeEvent::from_raw(raw) {
            Ok(Some(event)) => event,
            Ok(None) => {
                debug!(event_type = ?raw.event_type, "Ignoring untracked change type");
                return MergeOutcome::Ignored;
            }
            Err(err) => {
                warn!(error = %err, "Discarding malformed change event");
                return MergeOutcome::Malformed(err);
            }
        };

        self.apply_event(event, session_owner)
    }

    /// Merge an already validated change event.
    pub fn apply_event(&mut self, event: ChangeEvent, session_owner: &OwnerId) -> MergeOutcome {
        if event.owner() != session_owner {
            debug!(id = %event.id(), "Ignoring change for different owner");
            return MergeOutcome::ForeignOwner;
        }

        match event {
            ChangeEvent::Insert(record) => {
                let outcome = self.prepend_unique(record);
                if outcome == MergeOutcome::Duplicate {
                    debug!("Duplicate bookmark detected, skipping insert");
                }
                outcome
            }
            ChangeEvent::Delete { id, .. } => self.remove(&id),
        }
    }

    fn prepend_unique(&mut self, record: Bookmark) -> MergeOutcome {
        if self.contains(&record.id) {
            return MergeOutcome::Duplicate;
        }
        self.items.insert(0, record);
        MergeOutcome::Inserted
    }

    fn remove(&mut self, id: &BookmarkId) -> MergeOutcome {
        let before = self.items.len();
        self.items.retain(|b| &b.id != id);
        if self.items.len() < before {
            MergeOutcome::Removed
        } else {
            MergeOutcome::Absent
        }
    }

    /// Returns true if a bookmark with this id is present.
    pub fn contains(&self, id: &BookmarkId) -> bool {
        self.items.iter().any(|b| &b.id == id)
    }

    /// Look up a bookmark by id.
    pub fn get(&self, id: &BookmarkId) -> Option<&Bookmark> {
        self.items.iter().find(|b| &b.id == id)
    }

    /// Returns the bookmarks, newest first.
    pub fn as_slice(&self) -> &[Bookmark] {
        &self.items
    }

    /// Iterate the bookmarks, newest first.
    pub fn iter(&self) -> std::slice::Iter<'_, Bookmark> {
        self.items.iter()
    }

    /// Number of bookmarks held.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns true if the list holds no bookmarks.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Drop every bookmark.
    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Consume the list, yielding the bookmarks newest first.
    pub fn into_vec(self) -> Vec<Bookmark> {
        self.items
    }
}

impl<'a> IntoIterator for &'a BookmarkList {
    type Item = &'a Bookmark;
    type IntoIter = std::slice::Iter<'a, Bookmark>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}
