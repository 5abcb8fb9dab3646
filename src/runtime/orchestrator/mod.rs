//! Preview build orchestrator for one watched project.
//!
//! The orchestrator turns file-change signals into preview builds:
//! - Tracks the observed file, its fingerprint and preview names
//! - Replays cached previews when switching files or re-saving unchanged content
//! - Starts a debounced build when content changes, cancelling the previous one
//! - Publishes build status for the observed file on the event bus
//!
//! # Sub-modules
//!
//! - `task_lifecycle`: Starting, cancelling and completing build tasks
//!
//! Every transition runs under one mutex, as does result delivery, so a
//! cancelled task can never report after its replacement was started.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::runtime::Handle;

use crate::bus::{BuildFailed, BuildStarted, BuildSucceeded, EventBus, EventPayload, Preview};
use crate::tools::{BuildTool, PreviewSource};

use super::build_task::{BuildPhase, BuildTask, DEFAULT_DEBOUNCE};
use super::cache::{CachedPreviewSet, PreviewCache};
use super::context::PreviewContext;

mod task_lifecycle;

pub const DEFAULT_SOURCE_ROOT: &str = "Sources";
pub const DEFAULT_SOURCE_EXTENSION: &str = "swift";

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub tool_path: PathBuf,
    pub source_root_marker: String,
    pub source_extension: String,
    pub debounce: Duration,
    pub cache_capacity: Option<usize>,
}

impl OrchestratorSettings {
    pub fn new(tool_path: impl Into<PathBuf>) -> Self {
        Self {
            tool_path: tool_path.into(),
            source_root_marker: DEFAULT_SOURCE_ROOT.to_string(),
            source_extension: DEFAULT_SOURCE_EXTENSION.to_string(),
            debounce: DEFAULT_DEBOUNCE,
            cache_capacity: None,
        }
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    fn is_source_file(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext == self.source_extension)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStatus {
    Idle,
    Debouncing,
    Building,
}

struct PipelineState {
    context: Option<PreviewContext>,
    cache: PreviewCache,
    active: Option<BuildTask>,
}

#[derive(Clone)]
pub struct Orchestrator {
    bus: Arc<EventBus>,
    tool: Arc<dyn BuildTool>,
    source: Arc<dyn PreviewSource>,
    settings: Arc<OrchestratorSettings>,
    runtime: Handle,
    state: Arc<Mutex<PipelineState>>,
}

impl Orchestrator {
    pub fn new(
        bus: Arc<EventBus>,
        tool: Arc<dyn BuildTool>,
        source: Arc<dyn PreviewSource>,
        settings: OrchestratorSettings,
    ) -> Self {
        let runtime = bus.runtime().clone();
        let cache = PreviewCache::with_capacity(settings.cache_capacity);
        Self {
            bus,
            tool,
            source,
            settings: Arc::new(settings),
            runtime,
            state: Arc::new(Mutex::new(PipelineState {
                context: None,
                cache,
                active: None,
            })),
        }
    }

    /// React to a change reported for `path`.
    pub fn changed(&self, path: &Path) {
        let mut state = self.lock_state();

        let path = if self.settings.is_source_file(path) {
            path.to_path_buf()
        } else {
            let enclosing = state
                .context
                .as_ref()
                .filter(|context| context.encloses(path))
                .map(|context| context.observed_path.clone());
            match enclosing {
                Some(observed) => observed,
                None => {
                    tracing::trace!("ignoring change outside sources: {}", path.display());
                    state.context = Some(PreviewContext::placeholder(path));
                    return;
                }
            }
        };

        let info = match self.source.extract_preview_info(&path) {
            Ok(info) => info,
            Err(e) => {
                tracing::debug!("no previews for {}: {e}", path.display());
                self.cancel_active_for(&mut state, &path);
                state.context = Some(PreviewContext::placeholder(&path));
                self.notify_succeeded(&state, &path, Vec::new());
                return;
            }
        };

        if info.preview_names.is_empty() {
            tracing::debug!("{} declares no previews", path.display());
            self.cancel_active_for(&mut state, &path);
            state.context = Some(PreviewContext::new(&path, Vec::new(), info.fingerprint));
            self.notify_succeeded(&state, &path, Vec::new());
            return;
        }

        let previous = state.context.replace(PreviewContext::new(
            &path,
            info.preview_names,
            info.fingerprint.clone(),
        ));
        let same_file = previous.as_ref().is_some_and(|context| context.observes(&path));

        if same_file {
            let unchanged = previous
                .as_ref()
                .is_some_and(|context| context.content_fingerprint == info.fingerprint);
            if unchanged {
                tracing::trace!("{} unchanged", path.display());
                let cached = state.cache.lookup(&path).cloned();
                if let Some(cached) = cached {
                    self.notify_succeeded(&state, &path, cached.previews);
                }
                return;
            }
            self.start_build(&mut state, &path);
            return;
        }

        let cached = state.cache.lookup(&path).cloned();
        let fresh = cached
            .as_ref()
            .is_some_and(|cached| cached.fingerprint == info.fingerprint);
        if let Some(cached) = cached {
            self.notify_succeeded(&state, &path, cached.previews);
        }
        if !fresh {
            self.start_build(&mut state, &path);
        }
    }

    pub fn status(&self) -> PipelineStatus {
        let state = self.lock_state();
        match state.active.as_ref() {
            None => PipelineStatus::Idle,
            Some(task) if task.is_cancelled() => PipelineStatus::Idle,
            Some(task) => match task.phase() {
                BuildPhase::Debouncing => PipelineStatus::Debouncing,
                BuildPhase::Building => PipelineStatus::Building,
            },
        }
    }

    pub fn context(&self) -> Option<PreviewContext> {
        self.lock_state().context.clone()
    }

    pub fn cached(&self, path: &Path) -> Option<CachedPreviewSet> {
        self.lock_state().cache.lookup(path).cloned()
    }

    fn lock_state(&self) -> MutexGuard<'_, PipelineState> {
        self.state.lock().expect("orchestrator mutex poisoned")
    }

    fn notify_started(&self, state: &PipelineState, path: &Path) {
        let (directory, file_name) = split_path(path);
        self.publish_for(state, path, &BuildStarted {
            directory,
            file_name,
        });
    }

    fn notify_failed(&self, state: &PipelineState, path: &Path) {
        let (directory, file_name) = split_path(path);
        self.publish_for(state, path, &BuildFailed {
            directory,
            file_name,
        });
    }

    fn notify_succeeded(&self, state: &PipelineState, path: &Path, previews: Vec<Preview>) {
        let (directory, file_name) = split_path(path);
        self.publish_for(state, path, &BuildSucceeded {
            directory,
            file_name,
            previews,
        });
    }

    /// Status for a file nobody is looking at any more is dropped.
    fn publish_for<P: EventPayload>(&self, state: &PipelineState, path: &Path, payload: &P) {
        let observed = state
            .context
            .as_ref()
            .is_some_and(|context| context.observes(path));
        if !observed {
            tracing::trace!("not publishing {} for unobserved {}", P::KIND, path.display());
            return;
        }
        if let Err(e) = self.bus.publish(payload) {
            tracing::warn!("failed to publish {}: {e}", P::KIND);
        }
    }
}

/// `(directory, file name)` as carried by build status events.
pub fn split_path(path: &Path) -> (String, String) {
    let directory = path
        .parent()
        .map(|parent| parent.to_string_lossy().into_owned())
        .unwrap_or_default();
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    (directory, file_name)
}
