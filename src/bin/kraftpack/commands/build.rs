//! `kraftpack build` command

use anyhow::Result;

use crate::cli::BuildArgs;
use kraftpack::builder::{BuildOptions, MakeCli};
use kraftpack::catalog::default_registry;
use kraftpack::ops;
use kraftpack::rootfs::DockerCli;
use kraftpack::scheduler::CancelToken;
use kraftpack::util::fs::{relative_path, resolve_against};
use kraftpack::util::{GlobalContext, Shell, Status};

pub fn execute(args: BuildArgs, shell: &Shell) -> Result<()> {
    let ctx = GlobalContext::new()?;
    let config = ctx.config();
    let workdir = resolve_against(ctx.cwd(), &args.dir);

    let registry = default_registry(&ctx)?;
    let driver = MakeCli::new();

    let options = BuildOptions {
        constraints: args.targets.constraints(),
        force_pull: args.force_pull,
        use_cache: !args.no_cache && config.use_cache(),
        no_update: args.no_update || config.catalog.no_update,
        // Make jobs: CLI > config > None
        jobs: args.jobs.or(config.build.jobs),
        fast: args.fast,
        env: args.env,
        rootfs: args.rootfs,
        log_file: args.save_build_log,
        prompter: ops::prompter(args.no_prompt, config),
        process: super::process_options(config, shell, args.no_parallel),
        cancel: CancelToken::new(),
    };

    let span = shell.span(Status::Building, workdir.display());
    let outcome = ops::build(&workdir, &registry, &driver, &DockerCli, options)?;

    for path in outcome.artifacts.binaries.iter().chain(&outcome.artifacts.initramfs) {
        shell.status(Status::Finished, relative_path(ctx.cwd(), path).display());
    }
    span.finish(format!("{} with the {} builder", outcome.project, outcome.builder));

    if args.output_json {
        println!("{}", outcome.artifacts.to_json()?);
    }

    Ok(())
}
