//! External collaborators of the preview pipeline.
//!
//! This module provides:
//! - `PreviewSource` and `BuildTool`, the seams the orchestrator depends on
//! - Filesystem implementation: preview discovery, fingerprints, resource
//!   inlining
//! - Process implementation of the build tool
//! - Recursive directory watching
//!
//! # Module Structure
//!
//! - `types`: Collaborator traits, requests, and error types
//! - `fs`: `SourcePreviewScanner`
//! - `build_tool`: `ProcessBuildTool` and tool path lookup
//! - `watcher`: `DirectoryWatcher`

pub use build_tool::{resolve_tool_path, ProcessBuildTool};
pub use fs::{fingerprint, SourcePreviewScanner};
pub use types::{BuildError, BuildRequest, BuildTool, ExtractionError, PreviewInfo, PreviewSource};
pub use watcher::DirectoryWatcher;

mod build_tool;
mod fs;
mod types;
mod watcher;
