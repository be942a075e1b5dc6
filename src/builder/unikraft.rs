//! Building a unikernel from source with the unikraft build system.

use std::path::Path;

use anyhow::{bail, Context, Result};

use crate::builder::env::{env_kconfig, merged_env};
use crate::builder::{BuildContext, Builder, MakeOptions};
use crate::core::target::{filter, select};
use crate::core::{Capability, KraftError};
use crate::resolver::{DependencyResolver, ResolveOptions};
use crate::scheduler::{Phase, ProcessModel, ProcessOptions, WorkUnit};

pub struct UnikraftBuilder;

impl Builder for UnikraftBuilder {
    fn name(&self) -> &'static str {
        "unikraft"
    }

    fn capable(&self, ctx: &BuildContext<'_>) -> Capability {
        let project = &ctx.project;
        Capability::when(project.core.is_some() || project.template.is_some(), || {
            "project declares no unikraft core or template".to_string()
        })
    }

    fn prepare(&self, ctx: &mut BuildContext<'_>) -> Result<()> {
        let opts = &ctx.options;
        opts.constraints.validate()?;

        if opts.force_pull || !opts.no_update {
            tracing::info!("updating package catalog");
            ctx.catalog.update().context("could not update the package catalog")?;
        }

        // Hints for the catalog come from the targets declared before any
        // template is merged in.
        let hinted = filter(&ctx.project.targets, &opts.constraints)?;
        let resolver = DependencyResolver::new(
            ctx.catalog,
            ResolveOptions {
                force_pull: opts.force_pull,
                use_cache: opts.use_cache,
                prompter: opts.prompter,
                process: opts.process.clone(),
                cancel: opts.cancel.clone(),
            },
        );
        let resolution = resolver.resolve(&mut ctx.project, &hinted)?;
        if !resolution.fetched.is_empty() {
            tracing::info!("fetched {} component(s)", resolution.fetched.len());
        }

        ctx.targets = select(
            &ctx.project.targets,
            &ctx.options.constraints,
            ctx.options.prompter,
            "build",
        )?;
        Ok(())
    }

    fn build(&self, ctx: &mut BuildContext<'_>) -> Result<()> {
        let env = merged_env(&ctx.project.env, &ctx.options.env);
        let jobs = ctx.make_jobs();
        let log_file = ctx.options.log_file.as_deref();
        let project = &ctx.project;
        let driver = ctx.driver;

        let mut phase = Phase::build("building");
        for target in &ctx.targets {
            let extra = env_kconfig(&env, &project.kconfig_for(target));
            let make_opts = move |cancel: &crate::scheduler::CancelToken| MakeOptions {
                jobs,
                log_file: log_file.map(Path::to_path_buf),
                cancel: cancel.clone(),
            };

            phase.push(WorkUnit::new(format!("configuring {}", target.name), move |unit| {
                driver
                    .configure(project, target, &extra, &make_opts(unit.cancel_token()))
                    .map_err(|e| KraftError::external("configure", &target.name, e))
            }));
            phase.push(WorkUnit::new(format!("building {}", target.name), move |unit| {
                driver
                    .build(project, target, &make_opts(unit.cancel_token()))
                    .map_err(|e| KraftError::external("build", &target.name, e))?;
                if !target.kernel.is_file() {
                    bail!(
                        "build of {} finished but the kernel was not produced at {}",
                        target.name,
                        target.kernel.display()
                    );
                }
                Ok(())
            }));
        }

        // A failed build is never skipped over.
        let options = ProcessOptions {
            fail_fast: true,
            ..ctx.options.process.clone()
        };
        ProcessModel::new(options)
            .with_cancel(ctx.options.cancel.clone())
            .run(phase)?;

        for target in &ctx.targets {
            let size = std::fs::metadata(&target.kernel)
                .with_context(|| format!("failed to stat {}", target.kernel.display()))?
                .len();
            tracing::info!("{}: {} ({} bytes)", target.name, target.kernel.display(), size);
            ctx.artifacts.statistics.insert(target.name.clone(), size);
            ctx.artifacts.add_binary(&target.kernel);
        }
        Ok(())
    }
}
