//! Change feed that tails the file store's change log.

use std::io::SeekFrom;
use std::path::Path;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use futures_util::Stream;
use notify::{RecursiveMode, Watcher};
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use marksync_core::error::{Error, StoreError, SubscriptionError};
use marksync_core::{FeedMessage, RawChange, Result, SubscriptionStatus};

use crate::store::{FileStore, LOG_FILE_NAME};

const POLL_INTERVAL: Duration = Duration::from_millis(500);

fn watch_error(err: impl std::fmt::Display) -> Error {
    Error::Subscription(SubscriptionError::Connection {
        message: format!("Failed to watch change log: {}", err),
    })
}

/// Live stream of changes appended to a file store's log.
///
/// Starts at the current end of the log, so only changes made after
/// subscribing are delivered. Dropping the stream stops the watcher.
pub struct FileChangeStream {
    inner: Pin<Box<dyn Stream<Item = Result<FeedMessage>> + Send>>,
}

impl FileChangeStream {
    pub(crate) fn tail(store: &FileStore) -> Result<Self> {
        let table_dir = store.table_dir();
        let log_path = store.log_path();

        std::fs::create_dir_all(&table_dir).map_err(watch_error)?;

        let start = std::fs::metadata(&log_path).map(|m| m.len()).unwrap_or(0);

        let (nudge_tx, mut nudge_rx) = mpsc::unbounded_channel::<()>();

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            let Ok(event) = res else { return };
            if !matches!(
                event.kind,
                notify::EventKind::Modify(_) | notify::EventKind::Create(_)
            ) {
                return;
            }

            let is_log = event
                .paths
                .iter()
                .any(|p| p.file_name().is_some_and(|n| n == LOG_FILE_NAME));
            if is_log {
                let _ = nudge_tx.send(());
            }
        })
        .map_err(watch_error)?;

        watcher
            .watch(&table_dir, RecursiveMode::NonRecursive)
            .map_err(watch_error)?;

        let stream = async_stream::stream! {
            let _watcher = watcher;
            let mut position = start;
            let mut interval = tokio::time::interval(POLL_INTERVAL);

            yield Ok(FeedMessage::Status(SubscriptionStatus::Connecting));
            yield Ok(FeedMessage::Status(SubscriptionStatus::Active));

            loop {
                tokio::select! {
                    _ = interval.tick() => {}
                    Some(()) = nudge_rx.recv() => {}
                }

                match read_new_changes(&log_path, &mut position).await {
                    Ok(changes) => {
                        for change in changes {
                            yield Ok(FeedMessage::Change(change));
                        }
                    }
                    Err(e) => {
                        yield Err(e);
                        break;
                    }
                }
            }
        };

        Ok(Self {
            inner: Box::pin(stream),
        })
    }
}

impl Stream for FileChangeStream {
    type Item = Result<FeedMessage>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

impl std::fmt::Debug for FileChangeStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileChangeStream").finish_non_exhaustive()
    }
}

/// Read complete lines appended since `position` and advance it past them.
///
/// A trailing line without its newline is still being written and is left
/// for the next read.
async fn read_new_changes(path: &Path, position: &mut u64) -> Result<Vec<RawChange>> {
    let mut file = match tokio::fs::File::open(path).await {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(io_error(path, e)),
    };

    let len = file.metadata().await.map_err(|e| io_error(path, e))?.len();
    if len < *position {
        debug!(path = %path.display(), "Change log truncated, restarting from the top");
        *position = 0;
    }
    if len == *position {
        return Ok(Vec::new());
    }

    file.seek(SeekFrom::Start(*position))
        .await
        .map_err(|e| io_error(path, e))?;
    let mut buf = Vec::new();
    file.read_to_end(&mut buf)
        .await
        .map_err(|e| io_error(path, e))?;

    let Some(end) = buf.iter().rposition(|b| *b == b'\n') else {
        return Ok(Vec::new());
    };
    *position += end as u64 + 1;

    let changes = String::from_utf8_lossy(&buf[..end])
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| match serde_json::from_str::<RawChange>(line) {
            Ok(change) => Some(change),
            Err(e) => {
                warn!(error = %e, "Skipping unparseable change log line");
                None
            }
        })
        .collect();

    Ok(changes)
}

fn io_error(path: &Path, err: std::io::Error) -> Error {
    Error::Store(StoreError::Io {
        message: format!("{}: {}", path.display(), err),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn append(path: &Path, text: &str) {
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .unwrap();
        file.write_all(text.as_bytes()).unwrap();
    }

    #[tokio::test]
    async fn test_partial_lines_wait_for_newline() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(LOG_FILE_NAME);
        let mut position = 0;

        append(&path, r#"{"type":"DELETE","old_record":{"id":"a","user_id":"u1"}}"#);
        assert!(read_new_changes(&path, &mut position).await.unwrap().is_empty());
        assert_eq!(position, 0);

        append(&path, "\n");
        let changes = read_new_changes(&path, &mut position).await.unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].event_type.as_deref(), Some("DELETE"));
        assert!(read_new_changes(&path, &mut position).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_garbage_lines_are_skipped() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(LOG_FILE_NAME);
        let mut position = 0;

        append(&path, "not json\n\n{\"type\":\"UPDATE\"}\n");
        let changes = read_new_changes(&path, &mut position).await.unwrap();

        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].event_type.as_deref(), Some("UPDATE"));
    }

    #[tokio::test]
    async fn test_missing_log_yields_nothing() {
        let tmp = TempDir::new().unwrap();
        let mut position = 0;

        let changes = read_new_changes(&tmp.path().join("absent.jsonl"), &mut position)
            .await
            .unwrap();
        assert!(changes.is_empty());
    }
}
