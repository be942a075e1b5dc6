//! First-capable selection for the builder and packager chains.

use anyhow::Result;

use crate::core::errors::KraftError;

/// Answer of a strategy's capability probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Capability {
    Capable,
    /// Not applicable, with the reason shown when the whole chain fails.
    Incapable(String),
}

impl Capability {
    /// `Capable` when `cond` holds, otherwise `Incapable(reason())`.
    pub fn when(cond: bool, reason: impl FnOnce() -> String) -> Self {
        if cond {
            Capability::Capable
        } else {
            Capability::Incapable(reason())
        }
    }

    pub fn is_capable(&self) -> bool {
        matches!(self, Capability::Capable)
    }
}

/// Walk `chain` in order and return the first strategy whose probe passes.
///
/// `probe` yields the strategy's name and its answer. When nothing is
/// capable the error is [`KraftError::StrategyUnavailable`] for `action`,
/// carrying one `name: reason` line per strategy.
pub fn select_first_capable<'s, T: ?Sized>(
    action: &str,
    chain: &'s [Box<T>],
    probe: impl Fn(&T) -> (&'static str, Capability),
) -> Result<&'s T> {
    let mut reasons = Vec::with_capacity(chain.len());
    for strategy in chain {
        match probe(strategy) {
            (name, Capability::Capable) => {
                tracing::debug!("using {} strategy to {}", name, action);
                return Ok(strategy.as_ref());
            }
            (name, Capability::Incapable(reason)) => {
                tracing::debug!("{} strategy cannot {}: {}", name, action, reason);
                reasons.push(format!("{}: {}", name, reason));
            }
        }
    }

    Err(KraftError::StrategyUnavailable {
        action: action.to_string(),
        reasons,
    }
    .into())
}
