//! Packaging the kernels of a unikraft project.

use anyhow::{Context, Result};

use crate::builder::env::merged_env;
use crate::core::target::select;
use crate::core::{Capability, Target};
use crate::packager::{pack_targets, PackContext, Packager, Packed, TargetDefaults};

pub struct UnikraftPackager;

impl Packager for UnikraftPackager {
    fn name(&self) -> &'static str {
        "unikraft"
    }

    fn capable(&self, ctx: &PackContext<'_>) -> Capability {
        let declared = ctx
            .project
            .as_ref()
            .is_some_and(|p| p.core.is_some() || p.template.is_some());
        Capability::when(declared, || {
            "no project with a unikraft core or template".to_string()
        })
    }

    fn pack(&self, ctx: &PackContext<'_>) -> Result<Packed> {
        let project = ctx.project.as_ref().context("no project to package")?;
        let selected = select(
            &project.targets,
            &ctx.options.constraints,
            ctx.options.prompter,
            "package",
        )?;

        // Package with the full configuration each kernel was built with.
        let built: Vec<Target> = selected
            .into_iter()
            .filter(|t| {
                let exists = t.kernel.is_file();
                if !exists {
                    tracing::warn!(
                        "{} has not been built ({} is missing), skipping",
                        t.name,
                        t.kernel.display()
                    );
                }
                exists
            })
            .map(|t| {
                let kconfig = project.kconfig_for(&t);
                Target { kconfig, ..t }
            })
            .collect();
        if built.is_empty() {
            return Ok(Packed::default());
        }

        let defaults = TargetDefaults {
            command: project.command.clone(),
            env: merged_env(&project.env, &ctx.options.env),
        };
        pack_targets(ctx, &built, &defaults)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{KraftError, MergeStrategy, Project, TargetConstraints};
    use crate::packager::{run, PackageOptions};
    use crate::rootfs::DockerCli;
    use crate::test_support::{rootfs_tree, write_file, write_kraftfile, MockPackageManager};
    use tempfile::TempDir;

    const THREE_TARGETS: &str = "name: app\nunikraft: stable\ncmd: [\"/app\"]\ntargets:\n  - qemu/x86_64\n  - fc/x86_64\n  - qemu/arm64\n";

    fn built_project(tmp: &TempDir, kraftfile: &str) -> Project {
        write_kraftfile(tmp.path(), kraftfile);
        let project = Project::load(tmp.path()).unwrap();
        for target in &project.targets {
            write_file(&target.kernel, "kernel");
        }
        project
    }

    fn options(strategy: MergeStrategy) -> PackageOptions<'static> {
        PackageOptions {
            name: "app".into(),
            strategy,
            ..PackageOptions::default()
        }
    }

    #[test]
    fn test_strategy_applies_to_first_target_only() {
        let tmp = TempDir::new().unwrap();
        let project = built_project(&tmp, THREE_TARGETS);
        let pm = MockPackageManager::new("archive");
        let counters = pm.counters();

        let mut ctx = PackContext::new(
            tmp.path(),
            Some(project),
            &pm,
            &pm,
            &DockerCli,
            options(MergeStrategy::Overwrite),
        );
        let packages = run(&mut ctx).unwrap();

        assert_eq!(packages.len(), 3);
        assert_eq!(
            counters.pack_strategies(),
            vec![MergeStrategy::Overwrite, MergeStrategy::Merge, MergeStrategy::Merge]
        );
        assert_eq!(ctx.artifacts.packages.len(), 3);
    }

    #[test]
    fn test_arch_constraint_packs_one_target() {
        let tmp = TempDir::new().unwrap();
        let project = built_project(
            &tmp,
            "name: app\nunikraft: stable\ntargets:\n  - a/x86_64\n  - b/arm64\n",
        );
        let pm = MockPackageManager::new("archive");
        let counters = pm.counters();
        let mut opts = options(MergeStrategy::Overwrite);
        opts.constraints = TargetConstraints::new("x86_64", "", "");

        let mut ctx = PackContext::new(tmp.path(), Some(project), &pm, &pm, &DockerCli, opts);
        run(&mut ctx).unwrap();

        assert_eq!(counters.packed_targets(), vec!["app-a-x86_64"]);
        assert_eq!(counters.pack_strategies(), vec![MergeStrategy::Overwrite]);
    }

    #[test]
    fn test_unbuilt_targets_yield_no_match() {
        let tmp = TempDir::new().unwrap();
        write_kraftfile(tmp.path(), THREE_TARGETS);
        let project = Project::load(tmp.path()).unwrap();
        let pm = MockPackageManager::new("archive");

        let mut ctx = PackContext::new(
            tmp.path(),
            Some(project),
            &pm,
            &pm,
            &DockerCli,
            options(MergeStrategy::Overwrite),
        );
        let err = run(&mut ctx).unwrap_err();
        assert_eq!(err.to_string(), "no matching targets found for: app");
    }

    #[test]
    fn test_rootfs_attached_per_architecture() {
        let tmp = TempDir::new().unwrap();
        rootfs_tree(tmp.path());
        let project = built_project(
            &tmp,
            "name: app\nunikraft: stable\nrootfs: ./rootfs\ntargets:\n  - qemu/x86_64\n  - qemu/arm64\n",
        );
        let pm = MockPackageManager::new("archive");

        let mut ctx = PackContext::new(
            tmp.path(),
            Some(project),
            &pm,
            &pm,
            &DockerCli,
            options(MergeStrategy::Merge),
        );
        run(&mut ctx).unwrap();

        assert_eq!(ctx.artifacts.initramfs.len(), 2);
        assert!(tmp.path().join(".unikraft/build/initramfs-x86_64.cpio").is_file());
        assert!(tmp.path().join(".unikraft/build/initramfs-arm64.cpio").is_file());
    }

    #[test]
    fn test_embedded_initrd_skips_rootfs() {
        let tmp = TempDir::new().unwrap();
        rootfs_tree(tmp.path());
        let project = built_project(
            &tmp,
            "name: app\nunikraft:\n  version: stable\n  kconfig:\n    CONFIG_LIBVFSCORE_AUTOMOUNT_EINITRD: y\nrootfs: ./rootfs\ntargets:\n  - qemu/x86_64\n",
        );
        let pm = MockPackageManager::new("archive");

        let mut ctx = PackContext::new(
            tmp.path(),
            Some(project),
            &pm,
            &pm,
            &DockerCli,
            options(MergeStrategy::Overwrite),
        );
        run(&mut ctx).unwrap();
        assert!(ctx.artifacts.initramfs.is_empty());
    }

    #[test]
    fn test_push_after_pack() {
        let tmp = TempDir::new().unwrap();
        let project = built_project(&tmp, THREE_TARGETS);
        let pm = MockPackageManager::new("archive");
        let counters = pm.counters();
        let mut opts = options(MergeStrategy::Overwrite);
        opts.push = true;

        let mut ctx = PackContext::new(tmp.path(), Some(project), &pm, &pm, &DockerCli, opts);
        run(&mut ctx).unwrap();
        assert_eq!(counters.pushes(), 3);
    }

    #[test]
    fn test_bad_label_is_reported() {
        let tmp = TempDir::new().unwrap();
        let project = built_project(&tmp, THREE_TARGETS);
        let pm = MockPackageManager::new("archive");
        let mut opts = options(MergeStrategy::Overwrite);
        opts.labels = vec!["no-equals".into()];

        let mut ctx = PackContext::new(tmp.path(), Some(project), &pm, &pm, &DockerCli, opts);
        let err = run(&mut ctx).unwrap_err();
        assert!(err.to_string().contains("no-equals"));
        assert!(!matches!(
            err.downcast_ref::<KraftError>(),
            Some(KraftError::StrategyUnavailable { .. })
        ));
    }
}
