//! Fakes for the orchestrator's collaborators.
//!
//! - `ScriptedSource`: preview info per path, set by the test
//! - `ScriptedBuildTool`: renders one preview per requested name, optionally
//!   held until released or failing on demand
//! - `RecordingTransport`: keeps every envelope published on the bus

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{broadcast, Notify};
use tokio_util::sync::CancellationToken;

use crate::bus::{
    BuildSucceeded, BusError, BusRole, Envelope, EventBus, EventKind, Preview, Transport,
};
use crate::runtime::{Orchestrator, OrchestratorSettings};
use crate::tools::{
    BuildError, BuildRequest, BuildTool, ExtractionError, PreviewInfo, PreviewSource,
};

pub const TEST_DEBOUNCE: Duration = Duration::from_millis(20);

pub fn preview(module: &str, class_name: &str) -> Preview {
    Preview {
        module_name: module.to_string(),
        class_name: class_name.to_string(),
        title: class_name.trim_end_matches("_Previews").to_string(),
        width: 320.0,
        height: 240.0,
        html: String::new(),
    }
}

#[derive(Default)]
pub struct ScriptedSource {
    files: Mutex<HashMap<PathBuf, PreviewInfo>>,
    resolved: AtomicUsize,
}

impl ScriptedSource {
    pub fn set(&self, path: &Path, fingerprint: &str, names: &[&str]) {
        self.files.lock().unwrap().insert(
            path.to_path_buf(),
            PreviewInfo {
                preview_names: names.iter().map(|n| n.to_string()).collect(),
                fingerprint: fingerprint.to_string(),
            },
        );
    }

    pub fn remove(&self, path: &Path) {
        self.files.lock().unwrap().remove(path);
    }

    pub fn resolved(&self) -> usize {
        self.resolved.load(Ordering::SeqCst)
    }
}

impl PreviewSource for ScriptedSource {
    fn extract_preview_info(&self, path: &Path) -> Result<PreviewInfo, ExtractionError> {
        self.files
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| ExtractionError::Parse(path.to_path_buf()))
    }

    fn resolve_embedded_resources(&self, _path: &Path, previews: Vec<Preview>) -> Vec<Preview> {
        self.resolved.fetch_add(1, Ordering::SeqCst);
        previews
    }
}

#[derive(Default)]
pub struct ScriptedBuildTool {
    requests: Mutex<Vec<BuildRequest>>,
    hold: AtomicBool,
    release: Notify,
    failure: Mutex<Option<BuildError>>,
    started: Notify,
}

impl ScriptedBuildTool {
    /// Builds block until `release` is called.
    pub fn held() -> Self {
        let tool = Self::default();
        tool.hold.store(true, Ordering::SeqCst);
        tool
    }

    pub fn fail_with(&self, error: BuildError) {
        *self.failure.lock().unwrap() = Some(error);
    }

    pub fn release(&self) {
        self.hold.store(false, Ordering::SeqCst);
        self.release.notify_waiters();
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<BuildRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub async fn wait_started(&self, count: usize) {
        while self.calls() < count {
            let notified = self.started.notified();
            if self.calls() >= count {
                break;
            }
            let _ = tokio::time::timeout(Duration::from_millis(50), notified).await;
        }
    }
}

#[async_trait]
impl BuildTool for ScriptedBuildTool {
    async fn build_previews(
        &self,
        request: &BuildRequest,
        cancel: CancellationToken,
    ) -> Result<Vec<Preview>, BuildError> {
        self.requests.lock().unwrap().push(request.clone());
        self.started.notify_waiters();

        while self.hold.load(Ordering::SeqCst) {
            let released = self.release.notified();
            tokio::select! {
                _ = cancel.cancelled() => return Err(BuildError::Unknown("cancelled".into())),
                _ = released => {}
                _ = tokio::time::sleep(Duration::from_millis(10)) => {}
            }
        }

        if let Some(error) = self.failure.lock().unwrap().clone() {
            return Err(error);
        }
        Ok(request
            .preview_names
            .iter()
            .map(|name| preview(&request.module_name, name))
            .collect())
    }
}

/// Transport that records every message sent and delivers nothing.
#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<Envelope>>,
    inbound: Mutex<Option<broadcast::Sender<String>>>,
}

impl RecordingTransport {
    pub fn envelopes(&self) -> Vec<Envelope> {
        self.sent.lock().unwrap().clone()
    }

    pub fn kinds(&self) -> Vec<EventKind> {
        self.envelopes().iter().map(|e| e.kind).collect()
    }

    pub fn count(&self, kind: EventKind) -> usize {
        self.kinds().into_iter().filter(|k| *k == kind).count()
    }

    pub fn succeeded(&self) -> Vec<BuildSucceeded> {
        self.envelopes()
            .iter()
            .filter(|e| e.kind == EventKind::BuildSucceeded)
            .map(|e| e.payload_as::<BuildSucceeded>().unwrap())
            .collect()
    }

    pub fn clear(&self) {
        self.sent.lock().unwrap().clear();
    }

    pub async fn wait_for(&self, kind: EventKind, count: usize) {
        let waited = tokio::time::timeout(Duration::from_secs(5), async {
            while self.count(kind) < count {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await;
        assert!(
            waited.is_ok(),
            "timed out waiting for {count} {kind} event(s), saw {:?}",
            self.kinds()
        );
    }
}

impl Transport for RecordingTransport {
    fn send(&self, raw: String) -> Result<(), BusError> {
        let envelope = Envelope::decode(&raw)?;
        self.sent.lock().unwrap().push(envelope);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<String> {
        let mut guard = self.inbound.lock().unwrap();
        guard
            .get_or_insert_with(|| broadcast::channel(16).0)
            .subscribe()
    }
}

pub struct Harness {
    pub transport: Arc<RecordingTransport>,
    pub source: Arc<ScriptedSource>,
    pub tool: Arc<ScriptedBuildTool>,
    pub orchestrator: Orchestrator,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_tool(ScriptedBuildTool::default())
    }

    pub fn with_tool(tool: ScriptedBuildTool) -> Self {
        let transport = Arc::new(RecordingTransport::default());
        let bus = Arc::new(EventBus::new(transport.clone(), BusRole::Agent).unwrap());
        let source = Arc::new(ScriptedSource::default());
        let tool = Arc::new(tool);
        let settings = OrchestratorSettings::new("/usr/bin/swift").with_debounce(TEST_DEBOUNCE);
        let orchestrator = Orchestrator::new(bus, tool.clone(), source.clone(), settings);
        Self {
            transport,
            source,
            tool,
            orchestrator,
        }
    }
}
