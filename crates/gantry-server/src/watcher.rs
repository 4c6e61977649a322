//! File watching for rebuilds.

use std::path::{Path, PathBuf};
use std::sync::mpsc;

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc as async_mpsc;

/// Events emitted by the file watcher.
#[derive(Debug, Clone, PartialEq)]
pub enum WatchEvent {
    /// File was created
    Created(PathBuf),

    /// File was modified
    Modified(PathBuf),

    /// File was deleted
    Deleted(PathBuf),
}

impl WatchEvent {
    pub fn path(&self) -> &Path {
        match self {
            WatchEvent::Created(p) | WatchEvent::Modified(p) | WatchEvent::Deleted(p) => p,
        }
    }
}

/// File watcher for detecting changes.
///
/// Every filesystem event is forwarded; nothing is debounced or coalesced.
/// Dropping the watcher closes the event channel.
pub struct FileWatcher {
    _watcher: RecommendedWatcher,
}

impl FileWatcher {
    /// Create a new file watcher for the given paths.
    ///
    /// A path that does not exist yet is covered by watching its nearest
    /// existing ancestor, so it is picked up once created. Returns the
    /// watcher and a channel to receive events.
    pub fn new(
        paths: &[PathBuf],
    ) -> Result<(Self, async_mpsc::Receiver<WatchEvent>), std::io::Error> {
        let (sync_tx, sync_rx) = mpsc::channel();
        let (async_tx, async_rx) = async_mpsc::channel(100);

        let mut watcher = notify::recommended_watcher(move |res: Result<notify::Event, _>| {
            if let Ok(event) = res {
                let _ = sync_tx.send(event);
            }
        })
        .map_err(std::io::Error::other)?;

        for path in watch_roots(paths) {
            watcher
                .watch(&path, RecursiveMode::Recursive)
                .map_err(std::io::Error::other)?;
        }

        // notify calls back on its own thread; hop onto the async channel here.
        std::thread::spawn(move || {
            while let Ok(event) = sync_rx.recv() {
                for path in event.paths {
                    if let Some(e) = classify_event(&path, &event.kind) {
                        if async_tx.blocking_send(e).is_err() {
                            return;
                        }
                    }
                }
            }
        });

        Ok((Self { _watcher: watcher }, async_rx))
    }
}

/// Existing directories covering `paths`, with nested entries folded into
/// their parents.
fn watch_roots(paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut roots: Vec<PathBuf> = Vec::new();
    for path in paths {
        let Some(existing) = path.ancestors().find(|p| p.exists()) else {
            tracing::warn!("Not watching {}: no existing parent", path.display());
            continue;
        };
        if existing != path.as_path() {
            tracing::warn!(
                "{} does not exist yet, watching {} instead",
                path.display(),
                existing.display()
            );
        }

        if !roots.iter().any(|r| existing.starts_with(r)) {
            roots.retain(|r| !r.starts_with(existing));
            roots.push(existing.to_path_buf());
        }
    }
    roots
}

/// Classify a notify event into a WatchEvent.
fn classify_event(path: &Path, kind: &notify::EventKind) -> Option<WatchEvent> {
    use notify::EventKind;

    match kind {
        EventKind::Create(_) => Some(WatchEvent::Created(path.to_path_buf())),
        EventKind::Remove(_) => Some(WatchEvent::Deleted(path.to_path_buf())),
        EventKind::Modify(_) => Some(WatchEvent::Modified(path.to_path_buf())),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::Duration;
    use tempfile::tempdir;

    #[test]
    fn ignores_access_events() {
        use notify::event::{AccessKind, CreateKind};
        use notify::EventKind;

        let path = Path::new("app/views/index.haml");

        assert_eq!(
            classify_event(path, &EventKind::Create(CreateKind::File)),
            Some(WatchEvent::Created(path.to_path_buf()))
        );
        assert_eq!(
            classify_event(path, &EventKind::Access(AccessKind::Any)),
            None
        );
    }

    #[test]
    fn missing_paths_fall_back_to_existing_parent() {
        let temp = tempdir().unwrap();
        let views = temp.path().join("app/views");
        fs::create_dir_all(&views).unwrap();
        let fonts = temp.path().join("app/assets/fonts");

        assert_eq!(watch_roots(&[views.clone()]), vec![views.clone()]);
        // The fallback parent covers the views directory too.
        assert_eq!(watch_roots(&[views, fonts]), vec![temp.path().join("app")]);
    }

    #[tokio::test]
    async fn sees_files_in_directories_created_later() {
        let temp = tempdir().unwrap();
        let fonts = temp.path().join("assets/fonts");

        let (watcher, mut rx) = FileWatcher::new(&[fonts.clone()]).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        fs::create_dir_all(&fonts).unwrap();
        fs::write(fonts.join("icons.woff"), "font").unwrap();

        let event = tokio::time::timeout(Duration::from_secs(3), rx.recv()).await;
        drop(watcher);

        let event = event.expect("timeout waiting for file watch event").unwrap();
        assert!(event.path().starts_with(temp.path()));
    }

    #[tokio::test]
    async fn watches_file_changes() {
        let temp = tempdir().unwrap();
        let test_file = temp.path().join("index.haml");

        // Create the watcher first (so it catches file creation)
        let (watcher, mut rx) = FileWatcher::new(&[temp.path().to_path_buf()]).unwrap();

        // Give inotify time to set up
        tokio::time::sleep(Duration::from_millis(100)).await;

        fs::write(&test_file, "Created").unwrap();

        let event = tokio::time::timeout(Duration::from_secs(3), rx.recv()).await;

        // Keep watcher alive until we're done
        drop(watcher);

        assert!(event.is_ok(), "timeout waiting for file watch event");
        assert!(event.unwrap().is_some(), "channel should not be closed");
    }
}
