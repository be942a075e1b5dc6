//! `kraftpack source` command

use anyhow::Result;

use crate::cli::{SourceArgs, SourceCommands};
use kraftpack::catalog::default_registry;
use kraftpack::ops;
use kraftpack::util::{GlobalContext, Shell, Status};

pub fn execute(args: SourceArgs, shell: &Shell) -> Result<()> {
    let ctx = GlobalContext::new()?;
    let registry = default_registry(&ctx)?;
    let config_path = ctx.config_path();

    match args.command {
        SourceCommands::Add { uri } => {
            if ops::add_source(&config_path, &registry, &uri)? {
                shell.status(Status::Added, &uri);
            } else {
                shell.note(format!("{} is already a source", uri));
            }
        }
        SourceCommands::Remove { uri } => {
            if ops::remove_source(&config_path, &registry, &uri)? {
                shell.status(Status::Removed, &uri);
            } else {
                shell.note(format!("{} is not a configured source", uri));
            }
        }
        SourceCommands::List => {
            for source in ops::list_sources(&registry) {
                println!("{}", source);
            }
        }
    }

    Ok(())
}
