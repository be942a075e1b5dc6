//! `kraftpack rootfs` command

use anyhow::Result;

use crate::cli::RootfsArgs;
use kraftpack::ops::{self, RootfsRequest};
use kraftpack::rootfs::DockerCli;
use kraftpack::scheduler::CancelToken;
use kraftpack::util::{GlobalContext, Shell, Status};

pub fn execute(args: RootfsArgs, shell: &Shell) -> Result<()> {
    let ctx = GlobalContext::new()?;

    let request = RootfsRequest {
        workdir: ctx.cwd().to_path_buf(),
        spec: args.spec,
        architecture: args.arch.unwrap_or_else(ops::host_architecture),
        compress: args.compress,
        output: args.output,
        cancel: CancelToken::new(),
    };

    let built = ops::build_rootfs(&request, &DockerCli)?;
    if let Some(path) = built.path {
        let note = if built.cached { " (cached)" } else { "" };
        shell.status(Status::Finished, format!("{}{}", path.display(), note));
    }

    Ok(())
}
