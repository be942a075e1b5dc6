//! Per-unit progress: live bars when rendering, log lines otherwise.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};

/// Bar resolution; fractions are scaled to this many steps.
const STEPS: u64 = 1000;

/// Creates one [`ProgressHandle`] per unit of a phase.
pub struct ProgressView {
    multi: Option<MultiProgress>,
    phase: String,
}

impl ProgressView {
    pub fn new(phase: &str, render: bool) -> Self {
        let multi = render.then(|| MultiProgress::with_draw_target(ProgressDrawTarget::stderr()));
        ProgressView {
            multi,
            phase: phase.to_string(),
        }
    }

    pub fn unit(&self, name: &str) -> ProgressHandle {
        let bar = self.multi.as_ref().map(|multi| {
            let bar = multi.add(ProgressBar::new(STEPS));
            if let Ok(style) =
                ProgressStyle::default_bar().template("{spinner:.green} {msg:40} [{bar:30.cyan/blue}] {percent:>3}%")
            {
                bar.set_style(style.progress_chars("#>-"));
            }
            bar.set_message(name.to_string());
            bar
        });

        ProgressHandle {
            fraction: Arc::new(AtomicU64::new(0f64.to_bits())),
            bar,
            label: format!("{}: {}", self.phase, name),
        }
    }
}

/// Reports one unit's completion fraction.
#[derive(Clone)]
pub struct ProgressHandle {
    fraction: Arc<AtomicU64>,
    bar: Option<ProgressBar>,
    label: String,
}

impl ProgressHandle {
    /// A handle that only records, with nothing drawn.
    pub fn detached(label: impl Into<String>) -> Self {
        ProgressHandle {
            fraction: Arc::new(AtomicU64::new(0f64.to_bits())),
            bar: None,
            label: label.into(),
        }
    }

    pub fn report(&self, fraction: f64) {
        let fraction = if fraction.is_nan() { 0.0 } else { fraction.clamp(0.0, 1.0) };
        self.fraction.store(fraction.to_bits(), Ordering::SeqCst);
        if let Some(bar) = &self.bar {
            bar.set_position((fraction * STEPS as f64) as u64);
        }
    }

    pub fn fraction(&self) -> f64 {
        f64::from_bits(self.fraction.load(Ordering::SeqCst))
    }

    pub(crate) fn started(&self) {
        match &self.bar {
            Some(bar) => bar.tick(),
            None => tracing::info!("{}", self.label),
        }
    }

    pub(crate) fn finished(&self, ok: bool) {
        if ok {
            self.report(1.0);
        }
        match &self.bar {
            Some(bar) if ok => bar.finish(),
            Some(bar) => bar.abandon_with_message(format!("{} (failed)", self.label)),
            None if ok => tracing::debug!("{}: done", self.label),
            None => tracing::warn!("{}: failed", self.label),
        }
    }
}
