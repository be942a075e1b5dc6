//! Implementation of `kraftpack pkg`.

use std::path::Path;

use anyhow::Result;

use crate::catalog::PackageManagerRegistry;
use crate::core::{Artifacts, Package, Project};
use crate::packager::{self, PackContext, PackageOptions};
use crate::rootfs::ImageExporter;

#[derive(Debug)]
pub struct PackageOutcome {
    pub packages: Vec<Package>,
    pub artifacts: Artifacts,
}

/// Package whatever `workdir` holds into `format`.
///
/// A Kraftfile in `workdir` is optional: without one only the runtime and
/// command-line kernel packagers apply.
pub fn package(
    workdir: &Path,
    registry: &PackageManagerRegistry,
    format: &str,
    exporter: &dyn ImageExporter,
    options: PackageOptions<'_>,
) -> Result<PackageOutcome> {
    let project = Project::load_optional(workdir)?;
    if project.is_none() {
        tracing::debug!("no Kraftfile in {}", workdir.display());
    }
    let backend = registry.from_format(format)?;

    let mut ctx = PackContext::new(workdir, project, registry, backend, exporter, options);
    let packages = packager::run(&mut ctx)?;
    Ok(PackageOutcome {
        packages,
        artifacts: ctx.artifacts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{KraftError, MergeStrategy};
    use crate::rootfs::DockerCli;
    use crate::test_support::{write_file, MockPackageManager};
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn registry() -> (PackageManagerRegistry, crate::test_support::MockCounters) {
        let archive = MockPackageManager::new("archive");
        let counters = archive.counters();
        let registry = PackageManagerRegistry::new()
            .with(Box::new(MockPackageManager::new("manifest")))
            .with(Box::new(archive));
        (registry, counters)
    }

    fn kernel_options() -> PackageOptions<'static> {
        PackageOptions {
            name: "raw".into(),
            kernel: Some(PathBuf::from("kernel")),
            constraints: crate::core::TargetConstraints::new("x86_64", "qemu", ""),
            push: true,
            ..PackageOptions::default()
        }
    }

    #[test]
    fn test_packs_and_pushes_through_format_backend() {
        let tmp = TempDir::new().unwrap();
        write_file(&tmp.path().join("kernel"), "kernel");
        let (registry, counters) = registry();

        let outcome = package(tmp.path(), &registry, "archive", &DockerCli, kernel_options()).unwrap();
        assert_eq!(outcome.packages.len(), 1);
        assert_eq!(outcome.artifacts.packages.len(), 1);
        assert_eq!(counters.packed_targets(), vec!["raw"]);
        assert_eq!(counters.pack_strategies(), vec![MergeStrategy::Overwrite]);
        assert_eq!(counters.pushes(), 1);
    }

    #[test]
    fn test_unknown_format() {
        let tmp = TempDir::new().unwrap();
        let (registry, _) = registry();
        let err = package(tmp.path(), &registry, "oci", &DockerCli, kernel_options()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<KraftError>(),
            Some(KraftError::StrategyUnavailable { .. })
        ));
    }

    #[test]
    fn test_nothing_to_package() {
        let tmp = TempDir::new().unwrap();
        let (registry, _) = registry();
        let options = PackageOptions {
            name: "empty".into(),
            ..PackageOptions::default()
        };
        let err = package(tmp.path(), &registry, "archive", &DockerCli, options).unwrap_err();
        assert_eq!(err.to_string(), "could not determine how to package");
    }
}
