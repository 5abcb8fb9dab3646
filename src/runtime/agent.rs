//! The long-running side of the channel: answers liveness probes, grants
//! access to project directories and keeps one watched project per root.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::bus::{
    AccessGranted, AccessNotGranted, AgentLaunched, AgentQuited, BusError, EventBus, SetPreviewPath,
};
use crate::config::AgentConfig;
use crate::tools::{resolve_tool_path, BuildTool, PreviewSource};

use super::project::{project_root, WatchedProject};

#[derive(Clone)]
pub struct Agent {
    config: Arc<AgentConfig>,
    bus: Arc<EventBus>,
    tool: Arc<dyn BuildTool>,
    source: Arc<dyn PreviewSource>,
    projects: Arc<Mutex<HashMap<PathBuf, WatchedProject>>>,
}

impl Agent {
    pub fn new(
        config: AgentConfig,
        bus: Arc<EventBus>,
        tool: Arc<dyn BuildTool>,
        source: Arc<dyn PreviewSource>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            bus,
            tool,
            source,
            projects: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Register bus handlers and announce the agent.
    pub fn attach(&self) -> Result<(), BusError> {
        let agent = self.clone();
        self.bus
            .on::<SetPreviewPath, _>(move |request| agent.set_preview_path(&request.path));
        self.bus.publish(&AgentLaunched {})?;
        Ok(())
    }

    pub fn shutdown(&self) -> Result<(), BusError> {
        self.projects
            .lock()
            .expect("agent mutex poisoned")
            .clear();
        self.bus.publish(&AgentQuited {})?;
        Ok(())
    }

    pub fn set_preview_path(&self, path: &Path) {
        tracing::info!("preview requested for {}", path.display());
        if let Err(e) = self.bus.publish(&AgentLaunched {}) {
            tracing::warn!("failed to announce agent: {e}");
        }

        let root = project_root(path, &self.config.source_root);
        if let Err(e) = std::fs::read_dir(&root) {
            tracing::warn!("no access to {}: {e}", root.display());
            self.publish_access(&AccessNotGranted {
                path: path.to_path_buf(),
            });
            return;
        }

        self.publish_access(&AccessGranted {
            path: path.to_path_buf(),
        });
        self.watch(&root);
    }

    pub fn is_watching(&self, root: &Path) -> bool {
        self.projects
            .lock()
            .expect("agent mutex poisoned")
            .contains_key(root)
    }

    pub fn watched_roots(&self) -> Vec<PathBuf> {
        self.projects
            .lock()
            .expect("agent mutex poisoned")
            .keys()
            .cloned()
            .collect()
    }

    fn watch(&self, root: &Path) {
        let mut projects = self.projects.lock().expect("agent mutex poisoned");
        if projects.contains_key(root) {
            return;
        }

        let tool_path = resolve_tool_path(&self.config.build_tool).unwrap_or_else(|| {
            tracing::warn!(
                "build tool {} not found on PATH; builds will fail",
                self.config.build_tool
            );
            PathBuf::from(&self.config.build_tool)
        });
        match WatchedProject::open(
            root,
            self.bus.clone(),
            self.tool.clone(),
            self.source.clone(),
            self.config.orchestrator_settings(tool_path),
        ) {
            Ok(project) => {
                projects.insert(root.to_path_buf(), project);
            }
            Err(e) => tracing::error!("cannot watch {}: {e}", root.display()),
        }
    }

    fn publish_access<P: crate::bus::EventPayload>(&self, payload: &P) {
        if let Err(e) = self.bus.publish(payload) {
            tracing::warn!("failed to publish {}: {e}", P::KIND);
        }
    }
}
