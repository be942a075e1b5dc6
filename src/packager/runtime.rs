//! Packaging a prebuilt runtime together with the project's rootfs.

use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::builder::env::{merged_env, parse_env};
use crate::builder::runtime::{find_runtime, runtime_root, runtime_target};
use crate::catalog::PullOptions;
use crate::core::{Capability, Component, ComponentType};
use crate::packager::{pack_targets, PackContext, Packager, Packed, TargetDefaults};

pub struct RuntimePackager;

impl Packager for RuntimePackager {
    fn name(&self) -> &'static str {
        "runtime"
    }

    fn capable(&self, ctx: &PackContext<'_>) -> Capability {
        let declared = ctx.options.runtime.is_some()
            || ctx.project.as_ref().is_some_and(|p| p.runtime.is_some());
        Capability::when(declared, || "no runtime given or declared".to_string())
    }

    fn pack(&self, ctx: &PackContext<'_>) -> Result<Packed> {
        let runtime = requested_runtime(ctx)
            .or_else(|| ctx.project.as_ref().and_then(|p| p.runtime.clone()))
            .context("no runtime to package")?;
        pack_runtime(ctx, &runtime)
    }
}

/// The `--runtime` override, as a component placed in the workdir.
pub(crate) fn requested_runtime(ctx: &PackContext<'_>) -> Option<Component> {
    let spec = ctx.options.runtime.as_deref()?;
    let (name, version) = spec.split_once(':').unwrap_or((spec, ""));
    Some(Component::new(&ctx.workdir, ComponentType::Runtime, name, version, None))
}

/// Find exactly one `runtime` package for the requested platform and
/// architecture and pack its kernel as the only target.
pub(crate) fn pack_runtime(ctx: &PackContext<'_>, runtime: &Component) -> Result<Packed> {
    let c = &ctx.options.constraints;
    let package = find_runtime(ctx.catalog, runtime, &c.architecture, &c.platform, None)?;

    let on_disk: Option<PathBuf> = [runtime_root(&package, runtime), runtime.path.clone()]
        .into_iter()
        .find(|root| runtime_target(&package, root).is_ok_and(|t| t.kernel.is_file()));

    let staging;
    let root = match on_disk {
        Some(root) => root,
        None => {
            staging = tempfile::Builder::new()
                .prefix("kraftpack-runtime-")
                .tempdir()
                .context("failed to create staging directory for runtime")?;
            tracing::info!("pulling runtime {}", package);
            let opts = PullOptions::new(&ctx.workdir)
                .destination(staging.path())
                .use_cache(ctx.options.use_cache)
                .cancel(ctx.options.cancel.clone());
            ctx.catalog.pull(&package, &opts)?;
            staging.path().to_path_buf()
        }
    };

    let target = runtime_target(&package, &root)?;
    let defaults = match &ctx.project {
        Some(project) => TargetDefaults {
            command: project.command.clone(),
            env: merged_env(&project.env, &ctx.options.env),
        },
        None => TargetDefaults {
            command: Vec::new(),
            env: parse_env(&ctx.options.env),
        },
    };
    pack_targets(ctx, &[target], &defaults)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{KraftError, MergeStrategy, Package, Project};
    use crate::packager::{run, PackageOptions};
    use crate::rootfs::DockerCli;
    use crate::test_support::{rootfs_tree, write_kraftfile, MockPackageManager, RUNTIME_KRAFTFILE};
    use tempfile::TempDir;

    fn nginx(plat: &str, arch: &str) -> Package {
        Package::new(ComponentType::Runtime, "nginx", "1.25")
            .with_platarch(plat, arch)
            .with_kernel(format!("nginx_{}-{}", plat, arch))
    }

    fn options() -> PackageOptions<'static> {
        PackageOptions {
            name: "my-nginx".into(),
            ..PackageOptions::default()
        }
    }

    #[test]
    fn test_pulls_runtime_to_staging_and_packs() {
        let tmp = TempDir::new().unwrap();
        write_kraftfile(tmp.path(), RUNTIME_KRAFTFILE);
        rootfs_tree(tmp.path());
        let project = Project::load(tmp.path()).unwrap();

        let catalog = MockPackageManager::new("manifest")
            .with_remote(vec![nginx("qemu", "x86_64")])
            .materialize();
        let catalog_counters = catalog.counters();
        let backend = MockPackageManager::new("archive");
        let backend_counters = backend.counters();

        let mut ctx = PackContext::new(tmp.path(), Some(project), &catalog, &backend, &DockerCli, options());
        let packages = run(&mut ctx).unwrap();

        assert_eq!(packages.len(), 1);
        assert_eq!(catalog_counters.pulls(), 1);
        assert_eq!(backend_counters.packed_targets(), vec!["nginx"]);
        assert_eq!(ctx.artifacts.initramfs.len(), 1);
        // staging is gone once packing is done
        assert!(!tmp.path().join(".unikraft/runtimes/nginx").exists());
    }

    #[test]
    fn test_materialized_runtime_is_not_pulled() {
        let tmp = TempDir::new().unwrap();
        write_kraftfile(tmp.path(), RUNTIME_KRAFTFILE);
        rootfs_tree(tmp.path());
        crate::test_support::write_file(
            &tmp.path().join(".unikraft/runtimes/nginx/nginx_qemu-x86_64"),
            "kernel",
        );
        let project = Project::load(tmp.path()).unwrap();

        let catalog = MockPackageManager::new("manifest").with_local(vec![nginx("qemu", "x86_64")]);
        let counters = catalog.counters();
        let backend = MockPackageManager::new("archive");

        let mut ctx = PackContext::new(tmp.path(), Some(project), &catalog, &backend, &DockerCli, options());
        run(&mut ctx).unwrap();
        assert_eq!(counters.pulls(), 0);
    }

    #[test]
    fn test_several_runtimes_are_ambiguous() {
        let tmp = TempDir::new().unwrap();
        write_kraftfile(tmp.path(), RUNTIME_KRAFTFILE);
        let project = Project::load(tmp.path()).unwrap();
        let catalog = MockPackageManager::new("manifest")
            .with_local(vec![nginx("qemu", "x86_64"), nginx("fc", "x86_64")]);
        let backend = MockPackageManager::new("archive");
        let prompter = crate::test_support::ScriptedPrompter::new([0]);
        let mut opts = options();
        opts.prompter = Some(&prompter);

        let mut ctx = PackContext::new(tmp.path(), Some(project), &catalog, &backend, &DockerCli, opts);
        let err = run(&mut ctx).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<KraftError>(),
            Some(KraftError::ResolutionAmbiguous { .. })
        ));
        assert!(prompter.asked().is_empty());
    }

    #[test]
    fn test_runtime_flag_without_project() {
        let tmp = TempDir::new().unwrap();
        let catalog = MockPackageManager::new("manifest")
            .with_remote(vec![nginx("qemu", "x86_64")])
            .materialize();
        let backend = MockPackageManager::new("archive");
        let counters = backend.counters();
        let mut opts = options();
        opts.runtime = Some("nginx:1.25".into());
        opts.strategy = MergeStrategy::Merge;

        let mut ctx = PackContext::new(tmp.path(), None, &catalog, &backend, &DockerCli, opts);
        run(&mut ctx).unwrap();
        assert_eq!(counters.pack_strategies(), vec![MergeStrategy::Merge]);
    }
}
