//! `kraftpack pull` command

use anyhow::Result;

use crate::cli::PullArgs;
use kraftpack::catalog::default_registry;
use kraftpack::ops::{self, PullRequest};
use kraftpack::util::{GlobalContext, Shell, Status};

pub fn execute(args: PullArgs, shell: &Shell) -> Result<()> {
    let ctx = GlobalContext::new()?;
    let config = ctx.config();
    let registry = default_registry(&ctx)?;

    let mut request = PullRequest::new(ctx.cwd(), &args.subject);
    request.architecture = args.arch;
    request.platform = args.plat;
    request.kind = args.kind;
    request.all = args.all;
    request.force_pull = args.force_pull;
    request.use_cache = !args.no_cache && config.use_cache();
    request.prompter = ops::prompter(args.no_prompt, config);
    request.process = super::process_options(config, shell, false);

    shell.status(Status::Pulling, &args.subject);
    let resolution = ops::pull(&registry, &request)?;

    for package in &resolution.fetched {
        shell.status(Status::Finished, package);
    }
    for component in &resolution.skipped {
        shell.status(Status::Skipped, component);
    }
    if !resolution.skipped.is_empty() {
        shell.warn(format!(
            "{} component(s) could not be pulled",
            resolution.skipped.len()
        ));
    } else if resolution.fetched.is_empty() {
        shell.note("nothing to pull");
    }

    Ok(())
}
