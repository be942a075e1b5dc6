//! Phased execution of named work units.
//!
//! A [`ProcessModel`] runs [`Phase`]s one after another. Units inside a phase
//! run on a bounded rayon pool or inline, depending on the parallelism flag
//! and on whether the phase is marked sequential. Every unit receives a
//! [`UnitContext`] carrying the model-wide [`CancelToken`] and a progress
//! handle.

mod process;
pub mod progress;
mod unit;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::core::KraftError;

pub use process::{Phase, PhaseKind, PhaseReport, PhaseSummary, ProcessModel, ProcessOptions, UnitOutcome, UnitReport};
pub use progress::ProgressHandle;
pub use unit::{UnitContext, WorkUnit};

/// Shared cooperative cancellation flag.
///
/// Cloning yields a handle to the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        CancelToken::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// `Err(Cancelled)` once the token has tripped.
    pub fn check(&self) -> Result<(), KraftError> {
        if self.is_cancelled() {
            Err(KraftError::Cancelled)
        } else {
            Ok(())
        }
    }
}
