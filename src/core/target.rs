//! Build targets and target selection.

use std::fmt;
use std::path::PathBuf;

use anyhow::Result;
use serde::Serialize;

use crate::core::errors::KraftError;
use crate::core::kconfig::KConfig;
use crate::util::prompt::Prompter;

/// A concrete (architecture, platform, name) configuration producing one kernel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Target {
    pub name: String,
    pub architecture: String,
    pub platform: String,
    /// Kernel image the build produces (or a prebuilt runtime provides).
    pub kernel: PathBuf,
    pub kconfig: KConfig,
    /// Default command line, if the target declares one.
    pub command: Vec<String>,
}

impl Target {
    /// The identity a project guarantees to be unique.
    pub fn id(&self) -> (&str, &str, &str) {
        (&self.architecture, &self.platform, &self.name)
    }

    /// `plat/arch`
    pub fn platarch(&self) -> String {
        format!("{}/{}", self.platform, self.architecture)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.platarch())
    }
}

/// User-supplied narrowing of a target set. Empty strings mean "unset".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TargetConstraints {
    pub architecture: String,
    pub platform: String,
    pub name: String,
}

impl TargetConstraints {
    pub fn new(
        architecture: impl Into<String>,
        platform: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        TargetConstraints {
            architecture: architecture.into(),
            platform: platform.into(),
            name: name.into(),
        }
    }

    /// Reject a target name combined with an architecture or platform.
    pub fn validate(&self) -> Result<(), KraftError> {
        if !self.name.is_empty() && (!self.architecture.is_empty() || !self.platform.is_empty()) {
            return Err(KraftError::IncompatibleArguments(
                "the `--arch` and `--plat` options are not supported in addition to `--target`"
                    .to_string(),
            ));
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.architecture.is_empty() && self.platform.is_empty() && self.name.is_empty()
    }
}

type Condition = fn(&Target, &str, &str, &str) -> bool;

/// Clauses are tried in order; a target matching any of them is kept.
const CONDITIONS: [Condition; 5] = [
    // No constraints at all
    |_, arch, plat, name| name.is_empty() && arch.is_empty() && plat.is_empty(),
    // Target name
    |t, _, _, name| !name.is_empty() && t.name == name,
    // Architecture only
    |t, arch, plat, _| !arch.is_empty() && plat.is_empty() && t.architecture == arch,
    // Platform only
    |t, arch, plat, _| !plat.is_empty() && arch.is_empty() && t.platform == plat,
    // Architecture and platform
    |t, arch, plat, _| {
        !arch.is_empty() && !plat.is_empty() && t.architecture == arch && t.platform == plat
    },
];

/// Narrow `targets` by `constraints`, preserving declaration order.
pub fn filter(targets: &[Target], constraints: &TargetConstraints) -> Result<Vec<Target>, KraftError> {
    constraints.validate()?;

    let TargetConstraints {
        architecture: arch,
        platform: plat,
        name,
    } = constraints;

    Ok(targets
        .iter()
        .filter(|t| CONDITIONS.iter().any(|c| c(t, arch, plat, name)))
        .cloned()
        .collect())
}

/// Filter, then ask the user to pick one when several remain.
///
/// Without a prompter every remaining target is kept. An empty result is
/// [`KraftError::NoTargetsSelected`] for `action`.
pub fn select(
    targets: &[Target],
    constraints: &TargetConstraints,
    prompter: Option<&dyn Prompter>,
    action: &str,
) -> Result<Vec<Target>> {
    let mut selected = filter(targets, constraints)?;

    if selected.len() > 1 {
        if let Some(prompter) = prompter {
            let options: Vec<String> = selected.iter().map(|t| t.to_string()).collect();
            let index = prompter.select(&format!("select target to {}", action), &options)?;
            selected = vec![selected.swap_remove(index)];
        }
    }

    if selected.is_empty() {
        return Err(KraftError::NoTargetsSelected {
            action: action.to_string(),
        }
        .into());
    }

    tracing::debug!(
        "selected {} target(s): {}",
        selected.len(),
        selected.iter().map(|t| t.name.as_str()).collect::<Vec<_>>().join(", ")
    );
    Ok(selected)
}
