//! Using a prebuilt runtime package instead of compiling a kernel.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::builder::{BuildContext, Builder};
use crate::catalog::policy::resolve_one;
use crate::catalog::{CatalogQuery, PackageManager, PullOptions};
use crate::core::{Capability, Component, ComponentType, Package, Target};
use crate::util::prompt::Prompter;

/// Platform whose runtimes live under their own namespace.
const KRAFTCLOUD: &str = "kraftcloud";

/// The catalog query for `runtime` on the given architecture and platform.
/// Either may be empty.
pub fn runtime_query(runtime: &Component, architecture: &str, platform: &str) -> CatalogQuery {
    let mut name = runtime.name.clone();
    if platform == KRAFTCLOUD && !name.contains('/') {
        name = format!("{}/{}", KRAFTCLOUD, name);
    }

    CatalogQuery::new(name)
        .with_version(&runtime.version)
        .with_types([ComponentType::Runtime])
        .with_architecture(architecture)
        .with_platform(platform)
        .with_kconfig(runtime.kconfig.to_lines())
}

/// Find exactly one runtime package.
pub fn find_runtime(
    catalog: &dyn PackageManager,
    runtime: &Component,
    architecture: &str,
    platform: &str,
    prompter: Option<&dyn Prompter>,
) -> Result<Package> {
    let query = runtime_query(runtime, architecture, platform);
    let package = resolve_one(catalog, &query, prompter)?;
    tracing::debug!("using runtime {}", package);
    Ok(package)
}

/// The runtime as a build target, with its files found under `root`.
pub fn runtime_target(package: &Package, root: &Path) -> Result<Target> {
    package
        .as_target(root)
        .with_context(|| format!("runtime {} does not describe a kernel image for a target", package))
}

/// Where the runtime's files are, or will be once pulled.
pub fn runtime_root(package: &Package, runtime: &Component) -> PathBuf {
    package
        .local_path
        .clone()
        .unwrap_or_else(|| runtime.path.clone())
}

pub struct RuntimeBuilder;

impl Builder for RuntimeBuilder {
    fn name(&self) -> &'static str {
        "runtime"
    }

    fn capable(&self, ctx: &BuildContext<'_>) -> Capability {
        Capability::when(ctx.project.runtime.is_some(), || {
            "project declares no runtime".to_string()
        })
    }

    fn prepare(&self, ctx: &mut BuildContext<'_>) -> Result<()> {
        ctx.options.constraints.validate()?;
        let runtime = ctx
            .project
            .runtime
            .clone()
            .with_context(|| format!("project {} declares no runtime", ctx.project.name))?;

        let constraints = &ctx.options.constraints;
        let package = find_runtime(
            ctx.catalog,
            &runtime,
            &constraints.architecture,
            &constraints.platform,
            ctx.options.prompter,
        )?;

        let target = runtime_target(&package, &runtime_root(&package, &runtime))?;
        ctx.targets = vec![target];
        ctx.runtime = Some(package);
        Ok(())
    }

    fn build(&self, ctx: &mut BuildContext<'_>) -> Result<()> {
        let (Some(package), Some(runtime)) = (ctx.runtime.clone(), ctx.project.runtime.clone()) else {
            anyhow::bail!("runtime builder used before prepare");
        };

        let needs_pull = ctx.options.force_pull || ctx.targets.iter().any(|t| !t.kernel.is_file());
        if needs_pull {
            tracing::info!("pulling runtime {}", package);
            let opts = PullOptions::new(&ctx.project.workdir)
                .destination(&runtime.path)
                .use_cache(ctx.options.use_cache)
                .cancel(ctx.options.cancel.clone());
            ctx.catalog.pull(&package, &opts)?;
            ctx.targets = vec![runtime_target(&package, &runtime.path)?];
        }

        for target in &ctx.targets {
            ctx.artifacts.add_binary(&target.kernel);
        }
        Ok(())
    }
}
