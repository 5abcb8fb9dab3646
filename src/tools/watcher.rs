//! Directory-change notifications.

use std::path::{Path, PathBuf};

use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};

/// Keeps a recursive watch on one directory alive for as long as it exists.
pub struct DirectoryWatcher {
    root: PathBuf,
    _watcher: RecommendedWatcher,
}

impl DirectoryWatcher {
    /// Call `on_change` with every path touched under `root`. The callback
    /// runs on the notifier's thread.
    pub fn watch<F>(root: &Path, on_change: F) -> notify::Result<Self>
    where
        F: Fn(PathBuf) + Send + 'static,
    {
        let mut watcher = RecommendedWatcher::new(
            move |res: Result<Event, notify::Error>| match res {
                Ok(event) => {
                    if !is_content_change(&event.kind) {
                        return;
                    }
                    for path in event.paths {
                        on_change(path);
                    }
                }
                Err(e) => tracing::warn!("watch error: {e}"),
            },
            Config::default(),
        )?;
        watcher.watch(root, RecursiveMode::Recursive)?;
        tracing::debug!("watching {}", root.display());
        Ok(Self {
            root: root.to_path_buf(),
            _watcher: watcher,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

fn is_content_change(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Any
    )
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;
    use std::time::Duration;

    use notify::event::{AccessKind, CreateKind, ModifyKind, RemoveKind};

    use super::*;

    #[test]
    fn only_content_changes_count() {
        assert!(is_content_change(&EventKind::Create(CreateKind::File)));
        assert!(is_content_change(&EventKind::Modify(ModifyKind::Any)));
        assert!(!is_content_change(&EventKind::Access(AccessKind::Any)));
        assert!(!is_content_change(&EventKind::Remove(RemoveKind::File)));
    }

    #[test]
    fn reports_written_file() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, rx) = mpsc::channel();
        let watcher = DirectoryWatcher::watch(dir.path(), move |path| {
            let _ = tx.send(path);
        })
        .unwrap();
        assert_eq!(watcher.root(), dir.path());

        std::fs::write(dir.path().join("A.swift"), "class A {}").unwrap();

        let path = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(path.file_name().unwrap(), "A.swift");
    }
}
