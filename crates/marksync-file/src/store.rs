//! Filesystem storage for bookmark rows and the change log.

use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use fs2::FileExt;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use marksync_core::error::{Error, StoreError};
use marksync_core::{Bookmark, BookmarkId, NewBookmark, OwnerId, RawChange, Result};

pub(crate) const LOG_FILE_NAME: &str = "changes.jsonl";

fn map_io(err: std::io::Error) -> Error {
    Error::Store(StoreError::Io {
        message: err.to_string(),
    })
}

fn map_json(err: serde_json::Error) -> Error {
    Error::Store(StoreError::Encoding {
        message: err.to_string(),
    })
}

/// Exclusive hold on the change log; released on drop.
struct LogLock(File);

impl Drop for LogLock {
    fn drop(&mut self) {
        if let Err(e) = self.0.unlock() {
            warn!(error = %e, "Failed to unlock change log");
        }
    }
}

/// Ids the store writes are hex; anything else is never a row file name.
fn is_safe_id(id: &BookmarkId) -> bool {
    id.as_str()
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Filesystem-backed bookmark table.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Create a new file store at the given root directory.
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Get the root directory path.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding the table's rows and change log.
    pub(crate) fn table_dir(&self) -> PathBuf {
        self.root.join("bookmarks")
    }

    fn rows_dir(&self) -> PathBuf {
        self.table_dir().join("rows")
    }

    fn row_path(&self, id: &BookmarkId) -> Option<PathBuf> {
        is_safe_id(id).then(|| self.rows_dir().join(format!("{}.json", id)))
    }

    /// Get the change log path.
    pub(crate) fn log_path(&self) -> PathBuf {
        self.table_dir().join(LOG_FILE_NAME)
    }

    fn lock_path(&self) -> PathBuf {
        self.table_dir().join("changes.lock")
    }

    /// Take the exclusive lock that serializes every table mutation.
    fn lock_log(&self) -> Result<LogLock> {
        fs::create_dir_all(self.table_dir()).map_err(map_io)?;

        let lock_file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(self.lock_path())
            .map_err(map_io)?;

        lock_file.lock_exclusive().map_err(map_io)?;
        Ok(LogLock(lock_file))
    }

    /// Append a change to the log. Callers hold the [`LogLock`].
    fn append_change(&self, _lock: &LogLock, change: &RawChange) -> Result<()> {
        let line = serde_json::to_string(change).map_err(map_json)?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.log_path())
            .map_err(map_io)?;

        writeln!(file, "{}", line).map_err(map_io)?;
        file.sync_data().map_err(map_io)?;
        Ok(())
    }

    fn read_row(&self, path: &Path) -> Result<Bookmark> {
        let content = fs::read_to_string(path).map_err(map_io)?;
        serde_json::from_str(&content).map_err(map_json)
    }

    /// All rows of `owner`, newest first.
    #[instrument(skip(self))]
    pub fn fetch_all(&self, owner: &OwnerId) -> Result<Vec<Bookmark>> {
        let dir = self.rows_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut rows = Vec::new();
        for entry in fs::read_dir(&dir).map_err(map_io)? {
            let path = entry.map_err(map_io)?.path();
            if !path.extension().is_some_and(|ext| ext == "json") {
                continue;
            }

            match self.read_row(&path) {
                Ok(row) if &row.owner == owner => rows.push(row),
                Ok(_) => {}
                Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable row"),
            }
        }

        rows.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.cmp(&a.id))
        });

        debug!(count = rows.len(), "Fetched rows");
        Ok(rows)
    }

    /// Write a new row for `owner` and log its insert.
    #[instrument(skip(self, bookmark), fields(title = bookmark.title()))]
    pub fn insert(&self, owner: &OwnerId, bookmark: &NewBookmark) -> Result<Bookmark> {
        let id = BookmarkId::new(Uuid::new_v4().simple().to_string())?;
        let row = Bookmark {
            id,
            owner: owner.clone(),
            title: bookmark.title().to_string(),
            url: bookmark.url().to_string(),
            created_at: Utc::now(),
        };

        let path = self
            .row_path(&row.id)
            .ok_or_else(|| StoreError::Io {
                message: format!("cannot store row {}", row.id),
            })?;
        fs::create_dir_all(self.rows_dir()).map_err(map_io)?;

        let content = serde_json::to_string_pretty(&row).map_err(map_json)?;

        let lock = self.lock_log()?;
        let temp_path = path.with_extension("tmp");
        fs::write(&temp_path, &content).map_err(map_io)?;
        fs::rename(&temp_path, &path).map_err(map_io)?;

        // A row nobody was told about must not survive.
        if let Err(e) = self.append_change(&lock, &RawChange::insert(&row)) {
            if let Err(remove) = fs::remove_file(&path) {
                warn!(id = %row.id, error = %remove, "Failed to roll back row");
            }
            return Err(e);
        }

        debug!(id = %row.id, "Created row");
        Ok(row)
    }

    /// Remove a row and log its delete. Absent ids succeed without logging.
    #[instrument(skip(self))]
    pub fn delete(&self, id: &BookmarkId) -> Result<()> {
        let Some(path) = self.row_path(id) else {
            debug!("No row for unsafe id");
            return Ok(());
        };

        let lock = self.lock_log()?;
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(map_io(e)),
        };
        let row: Bookmark = serde_json::from_str(&content).map_err(map_json)?;

        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(map_io(e)),
        }

        if let Err(e) = self.append_change(&lock, &RawChange::delete(&row)) {
            if let Err(restore) = fs::write(&path, &content) {
                warn!(error = %restore, "Failed to restore row");
            }
            return Err(e);
        }

        debug!("Deleted row");
        Ok(())
    }
}
