//! Packaging a kernel given on the command line, outside of any project.

use anyhow::{bail, Result};

use crate::builder::env::parse_env;
use crate::core::{Capability, KConfig, Target};
use crate::packager::{pack_targets, PackContext, Packager, Packed, TargetDefaults};
use crate::util::fs::resolve_against;

pub struct CliKernelPackager;

impl Packager for CliKernelPackager {
    fn name(&self) -> &'static str {
        "kernel"
    }

    fn capable(&self, ctx: &PackContext<'_>) -> Capability {
        if ctx.project.is_some() {
            return Capability::Incapable("a project is present".to_string());
        }
        let c = &ctx.options.constraints;
        Capability::when(
            ctx.options.kernel.is_some() && !c.architecture.is_empty() && !c.platform.is_empty(),
            || "requires `--kernel`, `--arch` and `--plat`".to_string(),
        )
    }

    fn pack(&self, ctx: &PackContext<'_>) -> Result<Packed> {
        let Some(kernel) = &ctx.options.kernel else {
            bail!("no kernel given");
        };
        let kernel = resolve_against(&ctx.workdir, kernel);
        if !kernel.is_file() {
            bail!("kernel not found: {}", kernel.display());
        }

        let c = &ctx.options.constraints;
        let target = Target {
            name: ctx.options.name.clone(),
            architecture: c.architecture.clone(),
            platform: c.platform.clone(),
            kernel,
            kconfig: KConfig::new(),
            command: Vec::new(),
        };
        let defaults = TargetDefaults {
            command: Vec::new(),
            env: parse_env(&ctx.options.env),
        };
        pack_targets(ctx, &[target], &defaults)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{KraftError, MergeStrategy, Project, TargetConstraints};
    use crate::packager::{packagers, run, select, PackageOptions};
    use crate::rootfs::DockerCli;
    use crate::test_support::{write_file, write_kraftfile, MockPackageManager, UNIKRAFT_KRAFTFILE};
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn kernel_options() -> PackageOptions<'static> {
        PackageOptions {
            name: "raw".into(),
            kernel: Some(PathBuf::from("build/kernel")),
            constraints: TargetConstraints::new("x86_64", "qemu", ""),
            args: vec!["-v".into()],
            env: vec!["MODE=debug".into()],
            ..PackageOptions::default()
        }
    }

    #[test]
    fn test_packs_given_kernel() {
        let tmp = TempDir::new().unwrap();
        write_file(&tmp.path().join("build/kernel"), "kernel");
        let pm = MockPackageManager::new("archive");
        let counters = pm.counters();

        let mut ctx = PackContext::new(tmp.path(), None, &pm, &pm, &DockerCli, kernel_options());
        assert_eq!(select(&packagers(), &ctx).unwrap().name(), "kernel");
        let packages = run(&mut ctx).unwrap();

        assert_eq!(packages.len(), 1);
        assert_eq!(counters.packed_targets(), vec!["raw"]);
        assert_eq!(counters.pack_strategies(), vec![MergeStrategy::Overwrite]);
    }

    #[test]
    fn test_missing_kernel_file() {
        let tmp = TempDir::new().unwrap();
        let pm = MockPackageManager::new("archive");
        let mut ctx = PackContext::new(tmp.path(), None, &pm, &pm, &DockerCli, kernel_options());
        let err = run(&mut ctx).unwrap_err();
        assert!(err.to_string().starts_with("kernel not found:"));
    }

    #[test]
    fn test_requires_arch_and_plat() {
        let tmp = TempDir::new().unwrap();
        let pm = MockPackageManager::new("archive");
        let mut opts = kernel_options();
        opts.constraints = TargetConstraints::new("x86_64", "", "");
        let ctx = PackContext::new(tmp.path(), None, &pm, &pm, &DockerCli, opts);
        let chain = packagers();
        let err = select(&chain, &ctx).err().unwrap();
        let Some(KraftError::StrategyUnavailable { reasons, .. }) = err.downcast_ref::<KraftError>()
        else {
            panic!("unexpected error: {err}");
        };
        assert_eq!(reasons.len(), 4);
        assert_eq!(reasons[3], "kernel: requires `--kernel`, `--arch` and `--plat`");
    }

    #[test]
    fn test_not_used_inside_a_project() {
        let tmp = TempDir::new().unwrap();
        write_kraftfile(tmp.path(), UNIKRAFT_KRAFTFILE);
        let project = Project::load(tmp.path()).unwrap();
        let pm = MockPackageManager::new("archive");
        let ctx = PackContext::new(tmp.path(), Some(project), &pm, &pm, &DockerCli, kernel_options());
        assert_eq!(CliKernelPackager.capable(&ctx), Capability::Incapable("a project is present".into()));
    }
}
