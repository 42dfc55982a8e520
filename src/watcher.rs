//! Filesystem watching
//!
//! Wraps `notify` with per-directory (non-recursive) watches so new
//! directories are picked up explicitly by the event loop, the way inotify
//! works natively. Events and errors arrive on two independent channels.

use std::path::{Path, PathBuf};

use notify::event::{CreateKind, ModifyKind, RemoveKind};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::error::{LoftusError, Result};
use crate::types::{WatchEvent, WatchEventKind};

/// Something that can start watching a directory
pub trait WatchRegistry: Send {
    fn add_watch(&mut self, path: &Path) -> Result<()>;
}

/// Receiving ends of a watcher
pub struct WatchStreams {
    pub events: mpsc::UnboundedReceiver<WatchEvent>,
    pub errors: mpsc::UnboundedReceiver<notify::Error>,
}

/// `notify`-backed watcher
pub struct FsWatcher {
    watcher: RecommendedWatcher,
}

impl FsWatcher {
    pub fn new() -> Result<(Self, WatchStreams)> {
        let (event_tx, events) = mpsc::unbounded_channel();
        let (error_tx, errors) = mpsc::unbounded_channel();

        let watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => {
                for watch_event in translate(event) {
                    let _ = event_tx.send(watch_event);
                }
            }
            Err(e) => {
                let _ = error_tx.send(e);
            }
        })?;

        Ok((Self { watcher }, WatchStreams { events, errors }))
    }
}

impl WatchRegistry for FsWatcher {
    fn add_watch(&mut self, path: &Path) -> Result<()> {
        self.watcher.watch(path, RecursiveMode::NonRecursive)?;
        Ok(())
    }
}

/// Map a `notify` event onto the mutations the daemon cares about.
///
/// Access and metadata-only events are dropped.
pub fn translate(event: Event) -> Vec<WatchEvent> {
    let (kind, known_dir) = match event.kind {
        EventKind::Create(CreateKind::Folder) => (WatchEventKind::Create, Some(true)),
        EventKind::Create(CreateKind::File) => (WatchEventKind::Create, Some(false)),
        EventKind::Create(_) => (WatchEventKind::Create, None),
        EventKind::Modify(ModifyKind::Name(_)) => (WatchEventKind::Move, None),
        EventKind::Modify(ModifyKind::Metadata(_)) => return Vec::new(),
        EventKind::Modify(_) => (WatchEventKind::Modify, Some(false)),
        EventKind::Remove(RemoveKind::Folder) => (WatchEventKind::Delete, Some(true)),
        EventKind::Remove(_) => (WatchEventKind::Delete, Some(false)),
        EventKind::Access(_) | EventKind::Other => return Vec::new(),
        EventKind::Any => (WatchEventKind::Modify, None),
    };

    event
        .paths
        .into_iter()
        .map(|path| {
            let is_dir = known_dir.unwrap_or_else(|| path.is_dir());
            WatchEvent { path, kind, is_dir }
        })
        .collect()
}

/// Watch `root` and every directory below it that `should_watch` accepts.
///
/// Symlinks are not followed. Any failure is a `WatchSetup` error: without
/// full coverage changes would be missed.
pub fn add_watches_recursive<W, F>(root: &Path, registry: &mut W, should_watch: F) -> Result<usize>
where
    W: WatchRegistry + ?Sized,
    F: Fn(&Path) -> bool,
{
    let mut pending: Vec<PathBuf> = vec![root.to_path_buf()];
    let mut count = 0;

    while let Some(dir) = pending.pop() {
        if !should_watch(&dir) {
            continue;
        }

        tracing::debug!("Watching {}", dir.display());
        registry.add_watch(&dir).map_err(|e| setup_error(&dir, e))?;
        count += 1;

        let entries = std::fs::read_dir(&dir).map_err(|e| setup_error(&dir, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| setup_error(&dir, e))?;
            let file_type = entry.file_type().map_err(|e| setup_error(&entry.path(), e))?;
            if file_type.is_dir() {
                pending.push(entry.path());
            }
        }
    }

    tracing::info!("Watching {} directories under {}", count, root.display());
    Ok(count)
}

fn setup_error(path: &Path, reason: impl std::fmt::Display) -> LoftusError {
    LoftusError::WatchSetup {
        path: path.display().to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::is_git_metadata;
    use notify::event::{DataChange, MetadataKind, RenameMode};

    #[derive(Default)]
    struct RecordingRegistry {
        watched: Vec<PathBuf>,
        fail_on: Option<PathBuf>,
    }

    impl WatchRegistry for RecordingRegistry {
        fn add_watch(&mut self, path: &Path) -> Result<()> {
            if self.fail_on.as_deref() == Some(path) {
                return Err(LoftusError::Watch(notify::Error::generic("no space left")));
            }
            self.watched.push(path.to_path_buf());
            Ok(())
        }
    }

    #[test]
    fn test_translate_kinds() {
        let create = Event::new(EventKind::Create(CreateKind::Folder)).add_path("/repo/sub".into());
        assert_eq!(
            translate(create),
            vec![WatchEvent::new("/repo/sub", WatchEventKind::Create, true)]
        );

        let write = Event::new(EventKind::Modify(ModifyKind::Data(DataChange::Content)))
            .add_path("/repo/a.txt".into());
        assert_eq!(translate(write)[0].kind, WatchEventKind::Modify);

        let rename = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::Both)))
            .add_path("/nonexistent/old".into())
            .add_path("/nonexistent/new".into());
        let moved = translate(rename);
        assert_eq!(moved.len(), 2);
        assert!(moved.iter().all(|e| e.kind == WatchEventKind::Move && !e.is_dir));

        let removed = Event::new(EventKind::Remove(RemoveKind::File)).add_path("/repo/b".into());
        assert_eq!(translate(removed)[0].kind, WatchEventKind::Delete);
    }

    #[test]
    fn test_translate_drops_noise() {
        let chmod = Event::new(EventKind::Modify(ModifyKind::Metadata(MetadataKind::Permissions)))
            .add_path("/repo/a.txt".into());
        assert!(translate(chmod).is_empty());

        let open = Event::new(EventKind::Access(notify::event::AccessKind::Any))
            .add_path("/repo/a.txt".into());
        assert!(translate(open).is_empty());
    }

    #[test]
    fn test_recursive_walk_skips_git() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("notes/2024")).unwrap();
        std::fs::create_dir_all(root.join(".git/objects")).unwrap();
        std::fs::write(root.join("notes/a.txt"), "a").unwrap();

        let mut registry = RecordingRegistry::default();
        let count = add_watches_recursive(root, &mut registry, |p| !is_git_metadata(p)).unwrap();

        assert_eq!(count, 3);
        let mut watched = registry.watched.clone();
        watched.sort();
        let mut expected = vec![
            root.to_path_buf(),
            root.join("notes"),
            root.join("notes/2024"),
        ];
        expected.sort();
        assert_eq!(watched, expected);
    }

    #[test]
    fn test_recursive_walk_failure_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("sub")).unwrap();

        let mut registry = RecordingRegistry {
            fail_on: Some(root.join("sub")),
            ..Default::default()
        };
        let err = add_watches_recursive(root, &mut registry, |_| true).unwrap_err();
        assert!(matches!(err, LoftusError::WatchSetup { .. }));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_missing_root_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("gone");
        let mut registry = RecordingRegistry::default();
        let err = add_watches_recursive(&missing, &mut registry, |_| true).unwrap_err();
        assert!(matches!(err, LoftusError::WatchSetup { .. }));
    }

    #[tokio::test]
    async fn test_fs_watcher_reports_new_file() {
        let dir = tempfile::tempdir().unwrap();
        let (mut watcher, mut streams) = FsWatcher::new().unwrap();
        watcher.add_watch(dir.path()).unwrap();

        std::fs::write(dir.path().join("a.txt"), "hello").unwrap();

        let event = tokio::time::timeout(std::time::Duration::from_secs(5), streams.events.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(event.path.ends_with("a.txt"));
    }
}
