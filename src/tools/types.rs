//! Shared types and traits for the external collaborators.
//!
//! This module defines the seams the orchestrator talks through:
//! - `PreviewSource`: fingerprints a source file, lists its previews, and
//!   inlines resources referenced by rendered previews
//! - `BuildTool`: runs the external build tool for one module
//! - Error types for both

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::bus::Preview;

/// What a source file declares, and the digest of its bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewInfo {
    pub preview_names: Vec<String>,
    pub fingerprint: String,
}

/// One build-tool invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildRequest {
    pub tool_path: PathBuf,
    pub project_root: PathBuf,
    pub module_name: String,
    pub preview_names: Vec<String>,
}

/// Reading or parsing a source file failed. Treated as "no previews".
#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot parse {0}")]
    Parse(PathBuf),
}

/// Why a build produced no previews. The distinction is for logs only; every
/// variant surfaces as the same failure status on the bus.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BuildError {
    #[error("failed to launch build tool: {0}")]
    Launch(String),
    #[error("build produced {} compiler error(s)", .0.len())]
    Diagnostics(Vec<String>),
    #[error("build failed: {0}")]
    Unknown(String),
}

/// Filesystem-side collaborator of the orchestrator.
pub trait PreviewSource: Send + Sync {
    /// Preview names and content fingerprint for `path`. Byte-identical
    /// content must yield the identical fingerprint.
    fn extract_preview_info(&self, path: &Path) -> Result<PreviewInfo, ExtractionError>;

    /// Rewrite resource references inside the previews' markup into a
    /// self-contained form. `path` is the source file the previews came from.
    fn resolve_embedded_resources(&self, path: &Path, previews: Vec<Preview>) -> Vec<Preview>;
}

/// External build tool. Implementations must stop work promptly once
/// `cancel` fires.
#[async_trait]
pub trait BuildTool: Send + Sync {
    async fn build_previews(
        &self,
        request: &BuildRequest,
        cancel: CancellationToken,
    ) -> Result<Vec<Preview>, BuildError>;
}
