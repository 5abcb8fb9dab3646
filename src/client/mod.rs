//! Client side of the channel: asks the agent for previews of one file and
//! follows the resulting status events.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::mpsc;

use crate::bus::{
    AccessGranted, AccessNotGranted, Activate, AgentLaunched, AgentQuited, BuildFailed,
    BuildStarted, BuildSucceeded, BusError, DetectedCurrentFile, EventBus, Preview,
    SetPreviewPath,
};

pub use board::{BoardChange, BoardStatus, PreviewBoard};

mod board;

/// Observable transitions, in the order they were applied.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientUpdate {
    AgentLaunched,
    AgentQuit,
    AccessGranted,
    AccessNotGranted,
    /// Preview names announced for the file being edited.
    Activated(Vec<String>),
    CurrentFile(PathBuf),
    Status(BoardStatus),
    Previews(BoardChange),
}

#[derive(Debug, Default)]
struct ClientState {
    agent_launched: bool,
    access_granted: Option<bool>,
    board: PreviewBoard,
}

#[derive(Clone)]
pub struct PreviewClient {
    bus: Arc<EventBus>,
    file: PathBuf,
    directory: PathBuf,
    state: Arc<Mutex<ClientState>>,
}

impl PreviewClient {
    /// Follow events for `file`. Handlers are registered on `bus`, replacing
    /// any previous ones for the same kinds.
    pub fn attach(bus: Arc<EventBus>, file: &Path) -> (Self, mpsc::UnboundedReceiver<ClientUpdate>) {
        let directory = file
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        let client = Self {
            bus,
            file: file.to_path_buf(),
            directory,
            state: Arc::new(Mutex::new(ClientState::default())),
        };
        let (tx, rx) = mpsc::unbounded_channel();
        client.register(tx);
        (client, rx)
    }

    pub fn file(&self) -> &Path {
        &self.file
    }

    /// Probe the agent and remember the answer.
    pub async fn is_agent_launched(&self) -> bool {
        let launched = self.bus.is_agent_launched().await;
        self.lock_state().agent_launched = launched;
        launched
    }

    /// Ask the agent to watch the project containing the file.
    pub fn request_preview(&self) -> Result<(), BusError> {
        tracing::debug!("requesting previews for {}", self.file.display());
        self.bus.publish(&SetPreviewPath {
            path: self.directory.clone(),
        })?;
        Ok(())
    }

    pub fn agent_launched(&self) -> bool {
        self.lock_state().agent_launched
    }

    pub fn access_granted(&self) -> Option<bool> {
        self.lock_state().access_granted
    }

    pub fn status(&self) -> BoardStatus {
        self.lock_state().board.status()
    }

    pub fn previews(&self) -> Vec<Preview> {
        self.lock_state().board.previews().to_vec()
    }

    fn lock_state(&self) -> MutexGuard<'_, ClientState> {
        self.state.lock().expect("client mutex poisoned")
    }

    fn is_ours(&self, directory: &str) -> bool {
        Path::new(directory) == self.directory
    }

    fn register(&self, tx: mpsc::UnboundedSender<ClientUpdate>) {
        let emit = move |update: ClientUpdate| {
            let _ = tx.send(update);
        };

        let (client, emit_launch) = (self.clone(), emit.clone());
        self.bus.on::<AgentLaunched, _>(move |_| {
            let mut state = client.lock_state();
            if !state.agent_launched {
                state.agent_launched = true;
                emit_launch(ClientUpdate::AgentLaunched);
            }
        });

        let (client, emit_quit) = (self.clone(), emit.clone());
        self.bus.on::<AgentQuited, _>(move |_| {
            client.lock_state().agent_launched = false;
            emit_quit(ClientUpdate::AgentQuit);
        });

        let (client, emit_granted) = (self.clone(), emit.clone());
        self.bus.on::<AccessGranted, _>(move |event| {
            if event.path != client.directory {
                return;
            }
            client.lock_state().access_granted = Some(true);
            emit_granted(ClientUpdate::AccessGranted);
        });

        let (client, emit_denied) = (self.clone(), emit.clone());
        self.bus.on::<AccessNotGranted, _>(move |event| {
            if event.path != client.directory {
                return;
            }
            client.lock_state().access_granted = Some(false);
            emit_denied(ClientUpdate::AccessNotGranted);
        });

        let emit_activated = emit.clone();
        self.bus.on::<Activate, _>(move |event| {
            emit_activated(ClientUpdate::Activated(event.preview_names));
        });

        let emit_current = emit.clone();
        self.bus.on::<DetectedCurrentFile, _>(move |event| {
            emit_current(ClientUpdate::CurrentFile(event.path));
        });

        let (client, emit_started) = (self.clone(), emit.clone());
        self.bus.on::<BuildStarted, _>(move |event| {
            if !client.is_ours(&event.directory) {
                return;
            }
            client.lock_state().board.building();
            emit_started(ClientUpdate::Status(BoardStatus::Building));
        });

        let (client, emit_failed) = (self.clone(), emit.clone());
        self.bus.on::<BuildFailed, _>(move |event| {
            if !client.is_ours(&event.directory) {
                return;
            }
            client.lock_state().board.failed();
            emit_failed(ClientUpdate::Status(BoardStatus::Error));
        });

        let client = self.clone();
        self.bus.on::<BuildSucceeded, _>(move |event| {
            if !client.is_ours(&event.directory) {
                return;
            }
            let change = client
                .lock_state()
                .board
                .apply(&event.file_name, event.previews);
            emit(ClientUpdate::Status(BoardStatus::Ready));
            emit(ClientUpdate::Previews(change));
        });
    }
}
