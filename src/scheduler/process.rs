use std::fmt;
use std::sync::Mutex;

use anyhow::{Context, Result};

use crate::core::KraftError;
use crate::scheduler::progress::{ProgressHandle, ProgressView};
use crate::scheduler::unit::{UnitContext, WorkUnit};
use crate::scheduler::CancelToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseKind {
    /// Read-only fact gathering, e.g. catalog queries.
    Search,
    /// Filesystem-mutating work: fetch, configure, build, package.
    Action,
}

impl fmt::Display for PhaseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PhaseKind::Search => f.write_str("search"),
            PhaseKind::Action => f.write_str("action"),
        }
    }
}

/// An ordered group of units that completes before the next phase starts.
#[derive(Debug)]
pub struct Phase<'a> {
    name: String,
    kind: PhaseKind,
    units: Vec<WorkUnit<'a>>,
    sequential: bool,
}

impl<'a> Phase<'a> {
    pub fn search(name: impl Into<String>) -> Self {
        Phase {
            name: name.into(),
            kind: PhaseKind::Search,
            units: Vec::new(),
            sequential: false,
        }
    }

    pub fn action(name: impl Into<String>) -> Self {
        Phase {
            kind: PhaseKind::Action,
            ..Phase::search(name)
        }
    }

    /// An action phase whose units never overlap, whatever the parallelism flag.
    ///
    /// Builds share intermediate artifacts across targets of one architecture
    /// and may depend on images pulled by earlier units.
    pub fn build(name: impl Into<String>) -> Self {
        Phase::action(name).sequential()
    }

    pub fn sequential(mut self) -> Self {
        self.sequential = true;
        self
    }

    pub fn push(&mut self, unit: WorkUnit<'a>) {
        self.units.push(unit);
    }

    pub fn with_unit(mut self, unit: WorkUnit<'a>) -> Self {
        self.push(unit);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> PhaseKind {
        self.kind
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct ProcessOptions {
    /// Run units of non-sequential phases on a worker pool.
    pub parallel: bool,
    /// Abort a phase at its first failure.
    pub fail_fast: bool,
    /// Draw live progress bars instead of log lines.
    pub render: bool,
    /// Worker pool size; `None` lets rayon decide.
    pub jobs: Option<usize>,
}

impl Default for ProcessOptions {
    fn default() -> Self {
        ProcessOptions {
            parallel: true,
            fail_fast: true,
            render: false,
            jobs: None,
        }
    }
}

#[derive(Debug)]
pub enum UnitOutcome {
    Succeeded,
    Failed(anyhow::Error),
    /// Never started: the run was cancelled or an earlier unit failed.
    Skipped,
}

#[derive(Debug)]
pub struct UnitReport {
    pub name: String,
    pub outcome: UnitOutcome,
    pub progress: f64,
}

/// Every unit's result, in the order the units were added.
#[derive(Debug)]
pub struct PhaseReport {
    pub name: String,
    pub kind: PhaseKind,
    pub units: Vec<UnitReport>,
}

impl PhaseReport {
    pub fn succeeded(&self) -> usize {
        self.count(|o| matches!(o, UnitOutcome::Succeeded))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, UnitOutcome::Skipped))
    }

    pub fn failures(&self) -> impl Iterator<Item = (&str, &anyhow::Error)> {
        self.units.iter().filter_map(|u| match &u.outcome {
            UnitOutcome::Failed(e) => Some((u.name.as_str(), e)),
            _ => None,
        })
    }

    pub fn is_success(&self) -> bool {
        self.succeeded() == self.units.len()
    }

    /// Mean completion across units, in [0, 1].
    pub fn progress(&self) -> f64 {
        if self.units.is_empty() {
            return 1.0;
        }
        let total: f64 = self.units.iter().map(|u| u.progress).sum();
        (total / self.units.len() as f64).clamp(0.0, 1.0)
    }

    fn count(&self, pred: impl Fn(&UnitOutcome) -> bool) -> usize {
        self.units.iter().filter(|u| pred(&u.outcome)).count()
    }

    pub fn summary(&self) -> PhaseSummary {
        PhaseSummary {
            name: self.name.clone(),
            kind: self.kind,
            succeeded: self.succeeded(),
            failed: self.failures().count(),
            skipped: self.skipped(),
        }
    }
}

/// Counts kept for phases that already ran.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseSummary {
    pub name: String,
    pub kind: PhaseKind,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// Runs phases strictly one after another, created per command invocation.
pub struct ProcessModel {
    options: ProcessOptions,
    cancel: CancelToken,
    history: Vec<PhaseSummary>,
}

/// Completion record shared between workers.
struct Slot {
    index: usize,
    outcome: UnitOutcome,
}

impl ProcessModel {
    pub fn new(options: ProcessOptions) -> Self {
        ProcessModel {
            options,
            cancel: CancelToken::new(),
            history: Vec::new(),
        }
    }

    /// Share an externally owned token, e.g. one tripped by an interrupt handler.
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn options(&self) -> &ProcessOptions {
        &self.options
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    pub fn history(&self) -> &[PhaseSummary] {
        &self.history
    }

    /// Run phases in order, stopping at the first that fails.
    pub fn run_all(&mut self, phases: Vec<Phase<'_>>) -> Result<Vec<PhaseReport>> {
        phases.into_iter().map(|phase| self.run(phase)).collect()
    }

    /// Run one phase to completion.
    ///
    /// Under fail-fast the first failure (in completion order) trips the
    /// cancellation token, units not yet started are skipped, and that
    /// failure is returned. Otherwise failures stay in the report.
    pub fn run(&mut self, phase: Phase<'_>) -> Result<PhaseReport> {
        self.cancel.check()?;

        let Phase {
            name,
            kind,
            units,
            sequential,
        } = phase;

        let parallel = self.options.parallel && !sequential && units.len() > 1;
        tracing::debug!(
            "{} phase `{}`: {} unit(s), {}",
            kind,
            name,
            units.len(),
            if parallel { "parallel" } else { "sequential" }
        );

        let view = ProgressView::new(&name, self.options.render);
        let names: Vec<String> = units.iter().map(|u| u.name.clone()).collect();
        let handles: Vec<ProgressHandle> = names.iter().map(|n| view.unit(n)).collect();
        let slots: Mutex<Vec<Slot>> = Mutex::new(Vec::with_capacity(units.len()));
        let first_failure: Mutex<Option<usize>> = Mutex::new(None);

        let execute = |index: usize, unit: WorkUnit<'_>| {
            let handle = handles[index].clone();
            let outcome = if self.cancel.is_cancelled() {
                UnitOutcome::Skipped
            } else {
                handle.started();
                let ctx = UnitContext::new(unit.name, self.cancel.clone(), handle.clone());
                match (unit.task)(&ctx) {
                    Ok(()) => {
                        handle.finished(true);
                        UnitOutcome::Succeeded
                    }
                    Err(err) => {
                        handle.finished(false);
                        if let Ok(mut first) = first_failure.lock() {
                            first.get_or_insert(index);
                        }
                        if self.options.fail_fast {
                            self.cancel.cancel();
                        }
                        UnitOutcome::Failed(err)
                    }
                }
            };
            if let Ok(mut slots) = slots.lock() {
                slots.push(Slot { index, outcome });
            }
        };

        if parallel {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(self.options.jobs.unwrap_or(0))
                .build()
                .context("failed to start worker pool")?;
            pool.scope(|s| {
                for (index, unit) in units.into_iter().enumerate() {
                    let execute = &execute;
                    s.spawn(move |_| execute(index, unit));
                }
            });
        } else {
            for (index, unit) in units.into_iter().enumerate() {
                execute(index, unit);
            }
        }

        let mut slots = slots.into_inner().unwrap_or_else(|e| e.into_inner());
        slots.sort_by_key(|s| s.index);
        let first_failure = first_failure.into_inner().unwrap_or_else(|e| e.into_inner());

        let mut report = PhaseReport {
            name,
            kind,
            units: slots
                .into_iter()
                .map(|slot| UnitReport {
                    name: names[slot.index].clone(),
                    progress: handles[slot.index].fraction(),
                    outcome: slot.outcome,
                })
                .collect(),
        };
        self.history.push(report.summary());

        if self.options.fail_fast {
            if let Some(index) = first_failure {
                let failed = std::mem::replace(&mut report.units[index].outcome, UnitOutcome::Skipped);
                if let UnitOutcome::Failed(err) = failed {
                    tracing::debug!("phase `{}` aborted by `{}`", report.name, names[index]);
                    return Err(err);
                }
            }
        }

        if report.skipped() > 0 && self.cancel.is_cancelled() {
            return Err(KraftError::Cancelled.into());
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    fn options(parallel: bool, fail_fast: bool) -> ProcessOptions {
        ProcessOptions {
            parallel,
            fail_fast,
            render: false,
            jobs: Some(4),
        }
    }

    #[test]
    fn test_sequential_fail_fast_skips_rest() {
        let ran = AtomicUsize::new(0);
        let mut phase = Phase::action("fetch");
        for i in 0..4 {
            let ran = &ran;
            phase.push(WorkUnit::new(format!("unit-{}", i), move |_| {
                ran.fetch_add(1, Ordering::SeqCst);
                if i == 1 {
                    anyhow::bail!("could not fetch unit-1");
                }
                Ok(())
            }));
        }

        let mut model = ProcessModel::new(options(false, true));
        let err = model.run(phase).unwrap_err();

        assert_eq!(err.to_string(), "could not fetch unit-1");
        assert_eq!(ran.load(Ordering::SeqCst), 2);
        assert_eq!(
            model.history()[0],
            PhaseSummary {
                name: "fetch".into(),
                kind: PhaseKind::Action,
                succeeded: 1,
                failed: 1,
                skipped: 2,
            }
        );
    }

    #[test]
    fn test_best_effort_collects_failures() {
        let phase = Phase::action("pull")
            .with_unit(WorkUnit::new("lib/a", |_| Ok(())))
            .with_unit(WorkUnit::new("lib/b", |_| anyhow::bail!("could not find: lib/b")))
            .with_unit(WorkUnit::new("lib/c", |_| Ok(())));

        let mut model = ProcessModel::new(options(true, false));
        let report = model.run(phase).unwrap();

        assert_eq!(report.succeeded(), 2);
        let failures: Vec<_> = report.failures().map(|(n, _)| n).collect();
        assert_eq!(failures, vec!["lib/b"]);
        assert!(!report.is_success());
        assert!(!model.cancel_token().is_cancelled());
    }

    #[test]
    fn test_parallel_failure_cancels_running_units() {
        let observed_cancel = Arc::new(AtomicUsize::new(0));
        let observed = Arc::clone(&observed_cancel);

        let phase = Phase::search("search")
            .with_unit(WorkUnit::new("slow", move |ctx| {
                for _ in 0..500 {
                    if ctx.cancel_token().is_cancelled() {
                        observed.fetch_add(1, Ordering::SeqCst);
                        return ctx.check_cancelled();
                    }
                    std::thread::sleep(Duration::from_millis(5));
                }
                Ok(())
            }))
            .with_unit(WorkUnit::new("broken", |_| {
                std::thread::sleep(Duration::from_millis(20));
                anyhow::bail!("catalog unreachable")
            }));

        let mut model = ProcessModel::new(options(true, true));
        let err = model.run(phase).unwrap_err();

        assert_eq!(err.to_string(), "catalog unreachable");
        assert_eq!(observed_cancel.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_build_phase_never_overlaps() {
        let active = AtomicUsize::new(0);
        let peak = AtomicUsize::new(0);
        let mut phase = Phase::build("build");
        for i in 0..4 {
            let (active, peak) = (&active, &peak);
            phase.push(WorkUnit::new(format!("target-{}", i), move |_| {
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                std::thread::sleep(Duration::from_millis(10));
                active.fetch_sub(1, Ordering::SeqCst);
                Ok(())
            }));
        }

        let mut model = ProcessModel::new(options(true, true));
        let report = model.run(phase).unwrap();

        assert!(report.is_success());
        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_progress_aggregation() {
        let phase = Phase::action("fetch")
            .with_unit(WorkUnit::new("a", |ctx| {
                ctx.report(0.5);
                Ok(())
            }))
            .with_unit(WorkUnit::new("b", |ctx| {
                ctx.report(0.3);
                anyhow::bail!("nope")
            }));

        let mut model = ProcessModel::new(options(false, false));
        let report = model.run(phase).unwrap();
        assert_eq!(report.units[0].progress, 1.0);
        assert_eq!(report.units[1].progress, 0.3);
        assert!((report.progress() - 0.65).abs() < 1e-9);
    }

    #[test]
    fn test_cancelled_model_refuses_phases() {
        let token = CancelToken::new();
        let mut model = ProcessModel::new(options(true, true)).with_cancel(token.clone());
        token.cancel();

        let err = model
            .run(Phase::search("search").with_unit(WorkUnit::new("q", |_| Ok(()))))
            .unwrap_err();
        assert!(matches!(err.downcast_ref::<KraftError>(), Some(KraftError::Cancelled)));
    }

    #[test]
    fn test_run_all_orders_phases() {
        let log = Mutex::new(Vec::new());
        let phases = vec![
            Phase::search("search").with_unit(WorkUnit::new("q", |_| {
                log.lock().unwrap().push("search");
                Ok(())
            })),
            Phase::action("fetch").with_unit(WorkUnit::new("f", |_| {
                log.lock().unwrap().push("fetch");
                Ok(())
            })),
        ];

        let mut model = ProcessModel::new(ProcessOptions::default());
        let reports = model.run_all(phases).unwrap();
        assert_eq!(reports.len(), 2);
        assert_eq!(*log.lock().unwrap(), vec!["search", "fetch"]);
    }
}
