use super::*;
use crate::runtime::build_task::BuildOutcome;

impl Orchestrator {
    /// Announce and start a build for `path`, superseding whatever is
    /// running. A path that cannot be built is reported as failed and leaves
    /// the running task alone. The announcement always precedes any result of
    /// the new task.
    pub(super) fn start_build(&self, state: &mut PipelineState, path: &Path) {
        let Some(context) = state.context.as_ref() else {
            return;
        };
        let Some(mut task) = BuildTask::new(
            path,
            context.content_fingerprint.clone(),
            context.preview_names.clone(),
            self.settings.tool_path.clone(),
            &self.settings.source_root_marker,
            self.settings.debounce,
        ) else {
            tracing::warn!(
                "{} is not inside a module under {}; not building",
                path.display(),
                self.settings.source_root_marker
            );
            self.notify_failed(state, path);
            return;
        };

        self.cancel_active(state);
        self.notify_started(state, path);
        let orchestrator = self.clone();
        task.start(
            &self.runtime,
            self.tool.clone(),
            self.source.clone(),
            move |outcome| orchestrator.finish(outcome),
        );
        tracing::debug!("build task {} scheduled for {}", task.id(), path.display());
        state.active = Some(task);
    }

    fn finish(&self, outcome: BuildOutcome) {
        let mut state = self.lock_state();
        let current = state
            .active
            .as_ref()
            .is_some_and(|task| task.id() == outcome.task_id && !task.is_cancelled());
        if !current {
            tracing::trace!("dropping result of superseded build task {}", outcome.task_id);
            return;
        }
        if let Some(task) = state.active.take() {
            tracing::debug!(
                "build task {} finished in {:?}",
                task.id(),
                task.started_at().elapsed()
            );
        }

        match outcome.result {
            Ok(previews) => {
                state
                    .cache
                    .store(&outcome.path, outcome.fingerprint, previews.clone());
                self.notify_succeeded(&state, &outcome.path, previews);
            }
            Err(e) => {
                tracing::warn!("build for {} failed: {e}", outcome.path.display());
                if let crate::tools::BuildError::Diagnostics(lines) = &e {
                    for line in lines {
                        tracing::debug!("{line}");
                    }
                }
                self.notify_failed(&state, &outcome.path);
            }
        }
    }

    pub fn cancel_build(&self) {
        let mut state = self.lock_state();
        self.cancel_active(&mut state);
    }

    pub(super) fn cancel_active(&self, state: &mut PipelineState) {
        if let Some(task) = state.active.take() {
            task.cancel();
        }
    }

    pub(super) fn cancel_active_for(&self, state: &mut PipelineState, path: &Path) {
        let targets_path = state
            .active
            .as_ref()
            .is_some_and(|task| task.target().source_path == path);
        if targets_path {
            self.cancel_active(state);
        }
    }
}
