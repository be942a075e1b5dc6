//! Implementation of `kraftpack build`.

use std::path::Path;

use anyhow::{Context, Result};

use crate::builder::{self, BuildContext, BuildOptions, MakeDriver};
use crate::catalog::PackageManager;
use crate::core::{Artifacts, Project};
use crate::rootfs::{self, ImageExporter, RootfsOptions};

/// What a build produced.
#[derive(Debug)]
pub struct BuildOutcome {
    pub project: String,
    /// Name of the builder strategy that ran.
    pub builder: &'static str,
    pub artifacts: Artifacts,
}

/// Build the project in `workdir`, then its rootfs for every built architecture.
pub fn build(
    workdir: &Path,
    catalog: &dyn PackageManager,
    driver: &dyn MakeDriver,
    exporter: &dyn ImageExporter,
    options: BuildOptions<'_>,
) -> Result<BuildOutcome> {
    let project = Project::load(workdir)
        .with_context(|| format!("could not load project in {}", workdir.display()))?;
    let name = project.name.clone();

    let mut ctx = BuildContext::new(project, catalog, driver, options);
    let builder = builder::run(&mut ctx)?;
    attach_rootfs(&mut ctx, exporter)?;

    Ok(BuildOutcome {
        project: name,
        builder,
        artifacts: ctx.artifacts,
    })
}

fn attach_rootfs(ctx: &mut BuildContext<'_>, exporter: &dyn ImageExporter) -> Result<()> {
    let Some(spec) = ctx.rootfs_spec().map(str::to_string) else {
        return Ok(());
    };

    let mut architectures: Vec<String> = ctx.targets.iter().map(|t| t.architecture.clone()).collect();
    architectures.sort();
    architectures.dedup();

    for arch in architectures {
        let mut opts = RootfsOptions::new(&ctx.project.workdir, &arch);
        opts.cancel = ctx.options.cancel.clone();
        let built = rootfs::build(&spec, &opts, exporter)?;
        if let Some(path) = built.path {
            tracing::info!(
                "initramfs for {} at {}{}",
                arch,
                path.display(),
                if built.cached { " (cached)" } else { "" }
            );
            ctx.artifacts.add_initramfs(path);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ComponentType, Package};
    use crate::rootfs::DockerCli;
    use crate::test_support::{
        rootfs_tree, write_kraftfile, MockDriver, MockPackageManager, UNIKRAFT_KRAFTFILE,
    };
    use tempfile::TempDir;

    fn catalog() -> MockPackageManager {
        MockPackageManager::new("manifest")
            .with_remote(vec![
                Package::new(ComponentType::Core, "unikraft", "stable"),
                Package::new(ComponentType::Lib, "musl", "stable"),
            ])
            .materialize()
    }

    #[test]
    fn test_fetches_builds_and_attaches_rootfs() {
        let tmp = TempDir::new().unwrap();
        write_kraftfile(
            tmp.path(),
            &format!("{}rootfs: ./rootfs\n", UNIKRAFT_KRAFTFILE),
        );
        rootfs_tree(tmp.path());
        let pm = catalog();
        let counters = pm.counters();
        let driver = MockDriver::new();

        let outcome = build(tmp.path(), &pm, &driver, &DockerCli, BuildOptions::default()).unwrap();

        assert_eq!(outcome.project, "helloworld");
        assert_eq!(outcome.builder, "unikraft");
        assert_eq!(counters.pulls(), 2);
        assert_eq!(outcome.artifacts.binaries.len(), 2);
        assert_eq!(outcome.artifacts.initramfs.len(), 2);
        assert!(tmp.path().join(".unikraft/build/initramfs-arm64.cpio").is_file());
    }

    #[test]
    fn test_without_rootfs() {
        let tmp = TempDir::new().unwrap();
        write_kraftfile(tmp.path(), UNIKRAFT_KRAFTFILE);
        let pm = catalog();
        let driver = MockDriver::new();

        let outcome = build(tmp.path(), &pm, &driver, &DockerCli, BuildOptions::default()).unwrap();
        assert!(outcome.artifacts.initramfs.is_empty());
        assert_eq!(outcome.artifacts.binaries.len(), 2);
    }

    #[test]
    fn test_missing_project() {
        let tmp = TempDir::new().unwrap();
        let pm = catalog();
        let err = build(tmp.path(), &pm, &MockDriver::new(), &DockerCli, BuildOptions::default())
            .unwrap_err();
        assert!(format!("{:#}", err).contains("could not load project"));
    }
}
