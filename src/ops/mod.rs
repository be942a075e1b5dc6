//! High-level operations.
//!
//! Each operation loads what it needs from a working directory and drives
//! the library. Collaborators that touch the network, spawn processes or
//! ask the user are passed in, so the binary wires real ones and tests
//! wire mocks.

pub mod build;
pub mod pkg;
pub mod pull;
pub mod rootfs;
pub mod source;
pub mod update;

use std::io::IsTerminal;

use crate::scheduler::ProcessOptions;
use crate::util::prompt::{Prompter, TerminalPrompter};
use crate::util::Config;

pub use build::{build, BuildOutcome};
pub use pkg::{package, PackageOutcome};
pub use pull::{host_architecture, host_platform, pull, PullRequest};
pub use rootfs::{build_rootfs, RootfsRequest};
pub use source::{add_source, list_sources, remove_source};
pub use update::update;

/// Who to ask when a choice is ambiguous, or `None` when prompting is off.
///
/// Prompting is also off when stdin is not a terminal.
pub fn prompter(no_prompt: bool, config: &Config) -> Option<&'static dyn Prompter> {
    if no_prompt || config.no_prompt || !std::io::stdin().is_terminal() {
        None
    } else {
        Some(&TerminalPrompter)
    }
}

/// Scheduler settings from the configuration and command-line flags.
pub fn process_options(
    config: &Config,
    no_parallel: bool,
    jobs: Option<usize>,
    is_terminal: bool,
) -> ProcessOptions {
    ProcessOptions {
        parallel: !no_parallel && config.parallel(),
        fail_fast: true,
        render: config.render_fancy(is_terminal),
        jobs: jobs.or(config.build.jobs),
    }
}
