//! Event kinds and their payload shapes.
//!
//! Single source of truth for the wire discriminants and for which payload
//! type belongs to which kind. A payload's shape is determined solely by its
//! kind, so every payload type is bound to exactly one [`EventKind`] through
//! [`EventPayload::KIND`].

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Kinds
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EventKind {
    Acknowledgment,
    IsAgentLaunched,
    AgentLaunched,
    AgentQuited,
    Activate,
    SetPreviewPath,
    DetectedCurrentFile,
    AccessNotGranted,
    AccessGranted,
    BuildStarted,
    BuildFailed,
    BuildSucceeded,
}

impl EventKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Acknowledgment => "acknowledgment",
            Self::IsAgentLaunched => "isAgentLaunched",
            Self::AgentLaunched => "agentLaunched",
            Self::AgentQuited => "agentQuited",
            Self::Activate => "activate",
            Self::SetPreviewPath => "setPreviewPath",
            Self::DetectedCurrentFile => "detectedCurrentFile",
            Self::AccessNotGranted => "accessNotGranted",
            Self::AccessGranted => "accessGranted",
            Self::BuildStarted => "buildStarted",
            Self::BuildFailed => "buildFailed",
            Self::BuildSucceeded => "buildSucceeded",
        }
    }

    pub const fn all() -> &'static [EventKind] {
        &[
            EventKind::Acknowledgment,
            EventKind::IsAgentLaunched,
            EventKind::AgentLaunched,
            EventKind::AgentQuited,
            EventKind::Activate,
            EventKind::SetPreviewPath,
            EventKind::DetectedCurrentFile,
            EventKind::AccessNotGranted,
            EventKind::AccessGranted,
            EventKind::BuildStarted,
            EventKind::BuildFailed,
            EventKind::BuildSucceeded,
        ]
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::all()
            .iter()
            .copied()
            .find(|kind| kind.as_str() == value)
            .ok_or_else(|| format!("unknown event kind: {value}"))
    }
}

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

/// A typed payload that travels inside an envelope of kind [`Self::KIND`].
pub trait EventPayload: Serialize + DeserializeOwned + Send + 'static {
    const KIND: EventKind;
}

macro_rules! event_payload {
    ($($ty:ty => $kind:ident),* $(,)?) => {
        $(
            impl EventPayload for $ty {
                const KIND: EventKind = EventKind::$kind;
            }
        )*
    };
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Acknowledgment {}

/// Liveness probe. Only the agent answers it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IsAgentLaunched {}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentLaunched {}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentQuited {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Activate {
    pub content_fingerprint: String,
    pub preview_names: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetPreviewPath {
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectedCurrentFile {
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessNotGranted {
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessGranted {
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildStarted {
    pub directory: String,
    pub file_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildFailed {
    pub directory: String,
    pub file_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildSucceeded {
    pub directory: String,
    pub file_name: String,
    pub previews: Vec<Preview>,
}

event_payload! {
    Acknowledgment => Acknowledgment,
    IsAgentLaunched => IsAgentLaunched,
    AgentLaunched => AgentLaunched,
    AgentQuited => AgentQuited,
    Activate => Activate,
    SetPreviewPath => SetPreviewPath,
    DetectedCurrentFile => DetectedCurrentFile,
    AccessNotGranted => AccessNotGranted,
    AccessGranted => AccessGranted,
    BuildStarted => BuildStarted,
    BuildFailed => BuildFailed,
    BuildSucceeded => BuildSucceeded,
}

/// One rendered preview produced by the build tool.
///
/// `class_name` is the identity key inside a preview set: title, size and
/// markup may change between rebuilds while the identity stays stable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Preview {
    pub module_name: String,
    pub class_name: String,
    pub title: String,
    pub width: f64,
    pub height: f64,
    /// Base64-encoded html markup.
    pub html: String,
}

impl Preview {
    pub fn identity_key(&self) -> &str {
        &self.class_name
    }
}
