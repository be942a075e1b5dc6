//! Archive catalog: a local store of packaged unikernels.
//!
//! Each package lives in `<cache>/packages/<name>/` with an `index.toml`
//! listing one entry per platform/architecture. The kernel and initramfs of
//! an entry sit in a `<plat>-<arch>/` directory next to the index.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::catalog::manager::{is_populated, PackOptions, PackageManager, PullOptions};
use crate::catalog::query::CatalogQuery;
use crate::core::component::ComponentType;
use crate::core::errors::KraftError;
use crate::core::merge::MergeStrategy;
use crate::core::package::Package;
use crate::core::target::Target;
use crate::util::archive::pack_tar_gz;
use crate::util::fs::{copy_dir_all, remove_dir_all_if_exists, write_atomic};

pub const FORMAT: &str = "archive";

const INDEX_FILE: &str = "index.toml";
const KERNEL_FILE: &str = "kernel";
const INITRAMFS_FILE: &str = "initramfs";

#[derive(Debug, Default, Serialize, Deserialize)]
struct ArchiveIndex {
    #[serde(default, rename = "target")]
    targets: Vec<Package>,
}

/// Store of packaged unikernels, optionally published to a registry.
pub struct ArchiveManager {
    packages_dir: PathBuf,
    registry: Option<String>,
    client: reqwest::blocking::Client,
}

impl ArchiveManager {
    pub fn new(cache_dir: &Path, registry: Option<String>, timeout: Option<Duration>) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to create HTTP client")?;

        Ok(ArchiveManager {
            packages_dir: cache_dir.join("packages"),
            registry,
            client,
        })
    }

    pub fn package_dir(&self, name: &str) -> PathBuf {
        self.packages_dir.join(name)
    }

    /// Whether a package called `name` has been created.
    pub fn exists(&self, name: &str) -> bool {
        self.package_dir(name).join(INDEX_FILE).is_file()
    }

    fn load_index(&self, name: &str) -> Result<ArchiveIndex> {
        let path = self.package_dir(name).join(INDEX_FILE);
        if !path.exists() {
            return Ok(ArchiveIndex::default());
        }
        let contents = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        toml::from_str(&contents).with_context(|| format!("failed to parse {}", path.display()))
    }

    fn save_index(&self, name: &str, index: &ArchiveIndex) -> Result<()> {
        let path = self.package_dir(name).join(INDEX_FILE);
        let contents = toml::to_string_pretty(index).context("failed to serialize package index")?;
        write_atomic(&path, contents.as_bytes()).map_err(|e| KraftError::cache_write(&path, e))
    }

    fn package_names(&self) -> Result<Vec<String>> {
        if !self.packages_dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut names = Vec::new();
        for entry in std::fs::read_dir(&self.packages_dir)
            .with_context(|| format!("failed to list {}", self.packages_dir.display()))?
        {
            let entry = entry?;
            if entry.path().join(INDEX_FILE).is_file() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }

    /// Apply `strategy` to the package directory before adding an entry.
    fn prepare(&self, name: &str, strategy: MergeStrategy) -> Result<ArchiveIndex> {
        let exists = self.exists(name);
        match strategy {
            MergeStrategy::Overwrite => {
                remove_dir_all_if_exists(&self.package_dir(name))?;
                Ok(ArchiveIndex::default())
            }
            MergeStrategy::Merge => self.load_index(name),
            MergeStrategy::Abort | MergeStrategy::Exit if exists => {
                bail!("package {} already exists (merge strategy: {})", name, strategy)
            }
            MergeStrategy::Abort | MergeStrategy::Exit => Ok(ArchiveIndex::default()),
            MergeStrategy::Prompt => {
                bail!("merge strategy 'prompt' must be resolved before packaging {}", name)
            }
        }
    }

    fn publish(&self, registry: &str, name: &str, data: Vec<u8>) -> Result<()> {
        let file = format!("{}.tar.gz", name);
        if registry.starts_with("http://") || registry.starts_with("https://") {
            let url = format!("{}/{}", registry.trim_end_matches('/'), file);
            let response = self
                .client
                .put(&url)
                .body(data)
                .send()
                .with_context(|| format!("failed to upload {}", url))?;
            if !response.status().is_success() {
                bail!("failed to upload {}: HTTP {}", url, response.status());
            }
        } else {
            let dest = Path::new(registry).join(file);
            std::fs::create_dir_all(registry)
                .and_then(|_| write_atomic(&dest, &data))
                .with_context(|| format!("failed to publish to {}", dest.display()))?;
        }
        Ok(())
    }
}

impl PackageManager for ArchiveManager {
    fn format(&self) -> &str {
        FORMAT
    }

    fn catalog(&self, query: &CatalogQuery) -> Result<Vec<Package>> {
        let mut found = Vec::new();
        for name in self.package_names()? {
            if !query.name.is_empty() && query.name != name {
                continue;
            }
            for mut pkg in self.load_index(&name)?.targets {
                pkg.format = FORMAT.to_string();
                if let (Some(plat), Some(arch)) = (&pkg.platform, &pkg.architecture) {
                    pkg.local_path = Some(self.package_dir(&name).join(platarch_dir(plat, arch)));
                }
                if query.matches(&pkg) {
                    found.push(pkg);
                }
            }
        }
        Ok(found)
    }

    fn pull(&self, pkg: &Package, opts: &PullOptions) -> Result<()> {
        let local = match (&pkg.local_path, &pkg.platform, &pkg.architecture) {
            (Some(path), _, _) => path.clone(),
            (None, Some(plat), Some(arch)) => self.package_dir(&pkg.name).join(platarch_dir(plat, arch)),
            _ => bail!("{} does not name a platform and architecture", pkg),
        };
        if !is_populated(&local) {
            bail!("{} is not in the local package store", pkg);
        }

        opts.cancel.check()?;
        let dest = opts.destination_for(pkg);
        remove_dir_all_if_exists(&dest)?;
        copy_dir_all(&local, &dest)?;
        opts.report(1.0);
        Ok(())
    }

    fn push(&self, pkg: &Package) -> Result<()> {
        let Some(registry) = &self.registry else {
            bail!("no registry configured to push {}; set `catalog.registry`", pkg.label());
        };
        let dir = self.package_dir(&pkg.name);
        if !self.exists(&pkg.name) {
            bail!("{} has not been packaged", pkg.label());
        }

        let mut data = Vec::new();
        pack_tar_gz(&dir, &mut data)?;
        self.publish(registry, &pkg.name, data)?;
        tracing::info!("Pushed {} to {}", pkg.label(), registry);
        Ok(())
    }

    fn update(&self) -> Result<()> {
        tracing::debug!("archive store is local; nothing to update");
        Ok(())
    }

    fn add_source(&self, source: &str) -> Result<()> {
        bail!("the archive store does not take sources: {}", source)
    }

    fn remove_source(&self, _source: &str) -> Result<()> {
        Ok(())
    }

    fn pack(&self, target: &Target, opts: &PackOptions) -> Result<Vec<Package>> {
        if opts.name.is_empty() {
            bail!("cannot package {} without a name", target);
        }
        if !target.kernel.is_file() {
            bail!("kernel for {} not found at {}", target, target.kernel.display());
        }

        let mut index = self.prepare(&opts.name, opts.strategy)?;
        let entry_dir = self
            .package_dir(&opts.name)
            .join(platarch_dir(&target.platform, &target.architecture));
        remove_dir_all_if_exists(&entry_dir)?;
        std::fs::create_dir_all(&entry_dir).map_err(|e| KraftError::cache_write(&entry_dir, e))?;

        let kernel = entry_dir.join(KERNEL_FILE);
        std::fs::copy(&target.kernel, &kernel)
            .map_err(|e| KraftError::cache_write(&kernel, e))?;

        let mut pkg = Package::new(ComponentType::Runtime, &opts.name, &opts.version)
            .with_format(FORMAT)
            .with_platarch(&target.platform, &target.architecture)
            .with_kernel(KERNEL_FILE);
        if let Some(initramfs) = &opts.initramfs {
            let dest = entry_dir.join(INITRAMFS_FILE);
            std::fs::copy(initramfs, &dest).with_context(|| {
                format!("failed to copy initramfs {}", initramfs.display())
            })?;
            pkg.initramfs = Some(PathBuf::from(INITRAMFS_FILE));
        }
        if !opts.no_kconfig {
            pkg.kconfig = target.kconfig.clone();
        }
        pkg.command = opts.args.clone();
        pkg.env = opts.env.clone();
        pkg.labels = opts.labels.clone();

        index.targets.retain(|t| {
            t.platform.as_deref() != Some(target.platform.as_str())
                || t.architecture.as_deref() != Some(target.architecture.as_str())
        });
        index.targets.push(pkg.clone());
        self.save_index(&opts.name, &index)?;

        if let Some(output) = &opts.output {
            let mut data = Vec::new();
            pack_tar_gz(&self.package_dir(&opts.name), &mut data)?;
            write_atomic(output, &data).map_err(|e| KraftError::cache_write(output, e))?;
        }

        tracing::info!("Packaged {} ({})", pkg.label(), target.platarch());
        pkg.local_path = Some(entry_dir);
        Ok(vec![pkg])
    }

    fn is_compatible(&self, _source: &str) -> bool {
        false
    }
}

fn platarch_dir(plat: &str, arch: &str) -> String {
    format!("{}-{}", plat, arch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::target;
    use tempfile::TempDir;

    fn built_target(tmp: &TempDir, name: &str, arch: &str, plat: &str) -> Target {
        let mut t = target(name, arch, plat);
        t.kernel = tmp.path().join(format!("{}_{}-{}", name, plat, arch));
        std::fs::write(&t.kernel, format!("kernel {}", t.platarch())).unwrap();
        t
    }

    fn opts(strategy: MergeStrategy) -> PackOptions {
        PackOptions {
            name: "hello".into(),
            version: "0.1.0".into(),
            strategy,
            ..PackOptions::default()
        }
    }

    #[test]
    fn test_pack_then_catalog() {
        let tmp = TempDir::new().unwrap();
        let pm = ArchiveManager::new(&tmp.path().join("cache"), None, None).unwrap();
        let t = built_target(&tmp, "hello", "x86_64", "qemu");

        let packed = pm.pack(&t, &opts(MergeStrategy::Overwrite)).unwrap();
        assert_eq!(packed.len(), 1);
        assert!(pm.exists("hello"));

        let found = pm.catalog(&CatalogQuery::new("hello")).unwrap();
        assert_eq!(found.len(), 1);
        let as_target = found[0].as_target(found[0].local_path.as_ref().unwrap()).unwrap();
        assert_eq!(std::fs::read_to_string(as_target.kernel).unwrap(), "kernel qemu/x86_64");
    }

    #[test]
    fn test_merge_adds_entries_overwrite_replaces() {
        let tmp = TempDir::new().unwrap();
        let pm = ArchiveManager::new(&tmp.path().join("cache"), None, None).unwrap();
        let a = built_target(&tmp, "hello", "x86_64", "qemu");
        let b = built_target(&tmp, "hello", "arm64", "fc");

        pm.pack(&a, &opts(MergeStrategy::Overwrite)).unwrap();
        pm.pack(&b, &opts(MergeStrategy::Merge)).unwrap();
        assert_eq!(pm.catalog(&CatalogQuery::new("hello")).unwrap().len(), 2);

        pm.pack(&b, &opts(MergeStrategy::Overwrite)).unwrap();
        let found = pm.catalog(&CatalogQuery::new("hello")).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].architecture.as_deref(), Some("arm64"));
    }

    #[test]
    fn test_abort_on_existing() {
        let tmp = TempDir::new().unwrap();
        let pm = ArchiveManager::new(&tmp.path().join("cache"), None, None).unwrap();
        let t = built_target(&tmp, "hello", "x86_64", "qemu");

        pm.pack(&t, &opts(MergeStrategy::Abort)).unwrap();
        let err = pm.pack(&t, &opts(MergeStrategy::Abort)).unwrap_err();
        assert!(err.to_string().contains("already exists"));
        assert!(pm.pack(&t, &opts(MergeStrategy::Prompt)).is_err());
    }

    #[test]
    fn test_pull_into_workdir() {
        let tmp = TempDir::new().unwrap();
        let pm = ArchiveManager::new(&tmp.path().join("cache"), None, None).unwrap();
        pm.pack(&built_target(&tmp, "hello", "x86_64", "qemu"), &opts(MergeStrategy::Overwrite))
            .unwrap();

        let pkg = pm.catalog(&CatalogQuery::new("hello")).unwrap().remove(0);
        let dest = tmp.path().join("pulled");
        pm.pull(&pkg, &PullOptions::new(tmp.path()).destination(&dest)).unwrap();
        assert!(dest.join(KERNEL_FILE).is_file());
    }

    #[test]
    fn test_push_to_local_registry() {
        let tmp = TempDir::new().unwrap();
        let registry = tmp.path().join("registry");
        let pm = ArchiveManager::new(
            &tmp.path().join("cache"),
            Some(registry.display().to_string()),
            None,
        )
        .unwrap();
        let packed = pm
            .pack(&built_target(&tmp, "hello", "x86_64", "qemu"), &opts(MergeStrategy::Overwrite))
            .unwrap();

        pm.push(&packed[0]).unwrap();
        assert!(registry.join("hello.tar.gz").is_file());
    }

    #[test]
    fn test_push_without_registry() {
        let tmp = TempDir::new().unwrap();
        let pm = ArchiveManager::new(&tmp.path().join("cache"), None, None).unwrap();
        let pkg = Package::new(ComponentType::Runtime, "hello", "0.1.0");
        assert!(pm.push(&pkg).unwrap_err().to_string().contains("no registry"));
    }
}
