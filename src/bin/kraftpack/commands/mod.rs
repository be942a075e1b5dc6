//! Command implementations

pub mod build;
pub mod completions;
pub mod pkg;
pub mod pull;
pub mod rootfs;
pub mod source;
pub mod update;

use kraftpack::scheduler::ProcessOptions;
use kraftpack::util::{Config, Shell};

/// Scheduler settings for a command. Progress bars only draw on an
/// interactive stderr and never in verbose or quiet mode.
fn process_options(config: &Config, shell: &Shell, no_parallel: bool) -> ProcessOptions {
    let live = shell.is_terminal() && !shell.is_verbose() && !shell.is_quiet();
    kraftpack::ops::process_options(config, no_parallel, None, live)
}
