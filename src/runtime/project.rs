use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::bus::EventBus;
use crate::tools::{BuildTool, DirectoryWatcher, PreviewSource};

use super::orchestrator::{Orchestrator, OrchestratorSettings};

/// Directory that precedes the first `marker` component of `path`, or `path`
/// itself when there is none.
pub fn project_root(path: &Path, marker: &str) -> PathBuf {
    let mut root = PathBuf::new();
    for component in path.components() {
        if component.as_os_str() == marker {
            return root;
        }
        root.push(component);
    }
    path.to_path_buf()
}

/// A project root under watch, with the orchestrator its changes feed.
pub struct WatchedProject {
    orchestrator: Orchestrator,
    _watcher: DirectoryWatcher,
}

impl WatchedProject {
    /// Watch `<root>/<marker>` recursively and route every change into a
    /// fresh orchestrator.
    pub fn open(
        root_directory: &Path,
        bus: Arc<EventBus>,
        tool: Arc<dyn BuildTool>,
        source: Arc<dyn PreviewSource>,
        settings: OrchestratorSettings,
    ) -> notify::Result<Self> {
        let tool_path = settings.tool_path.clone();
        let sources = root_directory.join(&settings.source_root_marker);
        let orchestrator = Orchestrator::new(bus, tool, source, settings);
        let on_change = orchestrator.clone();
        let watcher = DirectoryWatcher::watch(&sources, move |path| on_change.changed(&path))?;
        tracing::info!(
            "watching project {} with {}",
            root_directory.display(),
            tool_path.display()
        );
        Ok(Self {
            orchestrator,
            _watcher: watcher,
        })
    }

}

impl Drop for WatchedProject {
    fn drop(&mut self) {
        self.orchestrator.cancel_build();
    }
}
