//! External build tool invocation.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command as TokioCommand;
use tokio_util::sync::CancellationToken;

use crate::bus::Preview;
use crate::tools::types::{BuildError, BuildRequest, BuildTool};

/// Resolve `tool` to an executable path: paths containing a separator are
/// used as-is, bare names are searched on `PATH`.
pub fn resolve_tool_path(tool: &str) -> Option<PathBuf> {
    let candidate = Path::new(tool);
    if candidate.components().count() > 1 || candidate.is_absolute() {
        return candidate.is_file().then(|| candidate.to_path_buf());
    }
    let search = std::env::var_os("PATH")?;
    std::env::split_paths(&search)
        .flat_map(|dir| executable_names(tool).into_iter().map(move |name| dir.join(name)))
        .find(|path| path.is_file())
}

fn executable_names(tool: &str) -> Vec<String> {
    if cfg!(windows) {
        vec![format!("{tool}.exe"), tool.to_string()]
    } else {
        vec![tool.to_string()]
    }
}

/// Runs `<tool> previews --package-path <root> --module <module>
/// [--preview <name>]...` and reads a JSON array of previews from stdout.
#[derive(Debug, Clone, Default)]
pub struct ProcessBuildTool;

impl ProcessBuildTool {
    pub fn new() -> Self {
        Self
    }

    fn command(request: &BuildRequest) -> TokioCommand {
        let mut command = TokioCommand::new(&request.tool_path);
        command
            .arg("previews")
            .arg("--package-path")
            .arg(&request.project_root)
            .arg("--module")
            .arg(&request.module_name);
        for name in &request.preview_names {
            command.arg("--preview").arg(name);
        }
        command
            .current_dir(&request.project_root)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        command
    }
}

#[async_trait]
impl BuildTool for ProcessBuildTool {
    async fn build_previews(
        &self,
        request: &BuildRequest,
        cancel: CancellationToken,
    ) -> Result<Vec<Preview>, BuildError> {
        let child = Self::command(request).spawn().map_err(|e| {
            BuildError::Launch(format!("{}: {e}", request.tool_path.display()))
        })?;
        tracing::debug!(
            "build tool pid {:?} started for module {}",
            child.id(),
            request.module_name
        );

        // Dropping the wait future drops the child, and kill_on_drop ends it.
        let output = tokio::select! {
            _ = cancel.cancelled() => {
                tracing::debug!("build for module {} cancelled", request.module_name);
                return Err(BuildError::Unknown("cancelled".into()));
            }
            output = child.wait_with_output() => output
                .map_err(|e| BuildError::Unknown(format!("failed to wait for build tool: {e}")))?,
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(classify_failure(&stderr, output.status.code()));
        }
        parse_previews(&output.stdout)
    }
}

/// Compiler diagnostics are stderr lines carrying `error:`.
pub fn classify_failure(stderr: &str, code: Option<i32>) -> BuildError {
    let diagnostics: Vec<String> = stderr
        .lines()
        .filter(|line| line.contains("error:"))
        .map(|line| line.trim().to_string())
        .collect();
    if !diagnostics.is_empty() {
        return BuildError::Diagnostics(diagnostics);
    }
    let tail = stderr.lines().last().unwrap_or("").trim();
    match code {
        Some(code) => BuildError::Unknown(format!("exit status {code}: {tail}")),
        None => BuildError::Unknown(format!("terminated by signal: {tail}")),
    }
}

pub fn parse_previews(stdout: &[u8]) -> Result<Vec<Preview>, BuildError> {
    serde_json::from_slice(stdout)
        .map_err(|e| BuildError::Unknown(format!("unreadable build output: {e}")))
}
