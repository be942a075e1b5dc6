//! `kraftpack pkg` command

use anyhow::Result;

use crate::cli::PkgArgs;
use kraftpack::catalog::default_registry;
use kraftpack::ops;
use kraftpack::packager::PackageOptions;
use kraftpack::rootfs::DockerCli;
use kraftpack::scheduler::CancelToken;
use kraftpack::util::fs::resolve_against;
use kraftpack::util::{GlobalContext, Shell, Status};

pub fn execute(args: PkgArgs, shell: &Shell) -> Result<()> {
    let ctx = GlobalContext::new()?;
    let config = ctx.config();
    let workdir = resolve_against(ctx.cwd(), &args.dir);

    let registry = default_registry(&ctx)?;

    let options = PackageOptions {
        name: args.name,
        constraints: args.targets.constraints(),
        kernel: args.kernel,
        rootfs: args.rootfs,
        compress: args.compress,
        args: args.args,
        env: args.env,
        labels: args.label,
        strategy: args.strategy,
        push: args.push,
        no_kconfig: args.no_kconfig,
        runtime: args.runtime,
        output: args.output.map(|o| resolve_against(ctx.cwd(), o)),
        use_cache: config.use_cache(),
        prompter: ops::prompter(args.no_prompt, config),
        process: super::process_options(config, shell, false),
        cancel: CancelToken::new(),
        ..PackageOptions::default()
    };

    shell.status(Status::Packaging, &options.name);
    let push = options.push;
    let outcome = ops::package(&workdir, &registry, &args.format, &DockerCli, options)?;

    for package in &outcome.packages {
        shell.status(Status::Packaged, package);
        if push {
            shell.status(Status::Pushed, package.label());
        }
    }

    Ok(())
}
