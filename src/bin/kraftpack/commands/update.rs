//! `kraftpack update` command

use anyhow::Result;

use crate::cli::UpdateArgs;
use kraftpack::catalog::{default_registry, PackageManager};
use kraftpack::ops;
use kraftpack::util::{GlobalContext, Shell, Status};

pub fn execute(args: UpdateArgs, shell: &Shell) -> Result<()> {
    let ctx = GlobalContext::new()?;
    let registry = default_registry(&ctx)?;

    let catalog: &dyn PackageManager = match &args.format {
        Some(format) => registry.from_format(format)?,
        None => &registry,
    };
    ops::update(catalog)?;
    shell.status(Status::Updated, format!("{} catalog", catalog.format()));

    Ok(())
}
