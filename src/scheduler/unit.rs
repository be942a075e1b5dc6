use anyhow::Result;

use crate::scheduler::progress::ProgressHandle;
use crate::scheduler::CancelToken;

type Task<'a> = Box<dyn FnOnce(&UnitContext) -> Result<()> + Send + 'a>;

/// A named, cancellable piece of work.
pub struct WorkUnit<'a> {
    pub(crate) name: String,
    pub(crate) task: Task<'a>,
}

impl<'a> WorkUnit<'a> {
    pub fn new(
        name: impl Into<String>,
        task: impl FnOnce(&UnitContext) -> Result<()> + Send + 'a,
    ) -> Self {
        WorkUnit {
            name: name.into(),
            task: Box::new(task),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Debug for WorkUnit<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkUnit").field("name", &self.name).finish()
    }
}

/// What a running unit can see of the scheduler.
pub struct UnitContext {
    name: String,
    cancel: CancelToken,
    progress: ProgressHandle,
}

impl UnitContext {
    pub(crate) fn new(name: String, cancel: CancelToken, progress: ProgressHandle) -> Self {
        UnitContext {
            name,
            cancel,
            progress,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Report completion in [0, 1]; out-of-range values are clamped.
    pub fn report(&self, fraction: f64) {
        self.progress.report(fraction);
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Handle to pass to collaborators that report their own progress.
    pub fn progress(&self) -> &ProgressHandle {
        &self.progress
    }

    /// Bail out early if the run has been cancelled.
    pub fn check_cancelled(&self) -> Result<()> {
        self.cancel.check()?;
        Ok(())
    }
}
