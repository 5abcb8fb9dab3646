//! One debounced, cancellable build of a module's previews.

use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::bus::Preview;
use crate::tools::{BuildError, BuildRequest, BuildTool, PreviewSource};

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);

/// Where a source file sits in its package: `<project_root>/<marker>/<module>/...`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildTarget {
    pub project_root: PathBuf,
    pub module: String,
    pub source_path: PathBuf,
}

impl BuildTarget {
    /// `None` unless `path` has a `marker` component followed by a module
    /// directory and at least one more component below it.
    pub fn from_path(path: &Path, marker: &str) -> Option<Self> {
        let components: Vec<Component<'_>> = path.components().collect();
        let index = components
            .iter()
            .position(|component| component.as_os_str() == marker)?;
        if components.len() < index + 3 {
            return None;
        }
        let module = components[index + 1].as_os_str().to_str()?.to_string();
        let project_root: PathBuf = components[..index].iter().collect();
        Some(Self {
            project_root,
            module,
            source_path: path.to_path_buf(),
        })
    }

    pub fn module_dir(&self, marker: &str) -> PathBuf {
        self.project_root.join(marker).join(&self.module)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildPhase {
    Debouncing,
    Building,
}

/// Delivered once per task that ran to completion without being cancelled.
#[derive(Debug)]
pub struct BuildOutcome {
    pub task_id: Uuid,
    pub path: PathBuf,
    pub fingerprint: String,
    pub result: Result<Vec<Preview>, BuildError>,
}

pub struct BuildTask {
    id: Uuid,
    target: BuildTarget,
    tool_path: PathBuf,
    preview_names: Vec<String>,
    fingerprint: String,
    debounce: Duration,
    started_at: Instant,
    token: CancellationToken,
    building: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl BuildTask {
    pub fn new(
        path: &Path,
        fingerprint: impl Into<String>,
        preview_names: Vec<String>,
        tool_path: impl Into<PathBuf>,
        source_root_marker: &str,
        debounce: Duration,
    ) -> Option<Self> {
        let target = BuildTarget::from_path(path, source_root_marker)?;
        Some(Self {
            id: Uuid::new_v4(),
            target,
            tool_path: tool_path.into(),
            preview_names,
            fingerprint: fingerprint.into(),
            debounce,
            started_at: Instant::now(),
            token: CancellationToken::new(),
            building: Arc::new(AtomicBool::new(false)),
            handle: None,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn target(&self) -> &BuildTarget {
        &self.target
    }

    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn phase(&self) -> BuildPhase {
        if self.building.load(Ordering::SeqCst) {
            BuildPhase::Building
        } else {
            BuildPhase::Debouncing
        }
    }

    pub fn request(&self) -> BuildRequest {
        BuildRequest {
            tool_path: self.tool_path.clone(),
            project_root: self.target.project_root.clone(),
            module_name: self.target.module.clone(),
            preview_names: self.preview_names.clone(),
        }
    }

    /// Spawn the debounce-then-build work. `on_complete` is not called when
    /// the task is cancelled before the build tool returns. A task starts at
    /// most once.
    pub fn start<F>(
        &mut self,
        runtime: &Handle,
        tool: Arc<dyn BuildTool>,
        source: Arc<dyn PreviewSource>,
        on_complete: F,
    ) where
        F: FnOnce(BuildOutcome) + Send + 'static,
    {
        if self.handle.is_some() {
            tracing::warn!("build task {} already started", self.id);
            return;
        }
        let id = self.id;
        let token = self.token.clone();
        let building = self.building.clone();
        let request = self.request();
        let path = self.target.source_path.clone();
        let fingerprint = self.fingerprint.clone();
        let debounce = self.debounce;

        self.handle = Some(runtime.spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {
                    tracing::trace!("build task {id} cancelled while debouncing");
                    return;
                }
                _ = tokio::time::sleep(debounce) => {}
            }

            building.store(true, Ordering::SeqCst);
            tracing::debug!(
                "building module {} for {} ({} preview(s))",
                request.module_name,
                path.display(),
                request.preview_names.len()
            );
            let result = tool.build_previews(&request, token.clone()).await;
            if token.is_cancelled() {
                tracing::trace!("build task {id} cancelled while building");
                return;
            }
            let result = result.map(|previews| source.resolve_embedded_resources(&path, previews));
            on_complete(BuildOutcome {
                task_id: id,
                path,
                fingerprint,
                result,
            });
        }));
    }

    /// Idempotent. A running build tool sees the token and stops its process.
    pub fn cancel(&self) {
        if !self.token.is_cancelled() {
            tracing::trace!("cancelling build task {}", self.id);
            self.token.cancel();
        }
    }
}

impl Drop for BuildTask {
    fn drop(&mut self) {
        self.cancel();
    }
}
