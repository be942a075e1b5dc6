//! Root filesystem to initramfs materialization.
//!
//! A rootfs spec is a directory, a Dockerfile or an existing archive
//! (`.cpio`, `.tar`, `.tar.gz`, `.tgz`). Each is turned into one `newc`
//! cpio archive at a per-architecture path under the build directory, with
//! a content-keyed cache in front of the work.

pub mod cache;
pub mod cpio;
pub mod dockerfile;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

use crate::core::component::VENDOR_DIR;
use crate::core::errors::KraftError;
use crate::core::project::build_dir;
use crate::scheduler::CancelToken;
use crate::util::fs::{resolve_against, write_atomic};
use crate::util::hash::{sha256_file, Fingerprint};

pub use cache::{RootfsCache, RootfsMeta};
pub use dockerfile::{DockerCli, ImageExporter};

/// What a rootfs spec points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RootfsSource {
    Directory(PathBuf),
    Dockerfile(PathBuf),
    Cpio(PathBuf),
    Tarball(PathBuf),
}

impl RootfsSource {
    /// Classify `spec`, resolved against `workdir`.
    pub fn classify(spec: &str, workdir: &Path) -> Result<Self> {
        let path = resolve_against(workdir, spec);
        if !path.exists() {
            bail!("rootfs not found: {}", path.display());
        }
        if path.is_dir() {
            return Ok(RootfsSource::Directory(path));
        }
        if dockerfile::is_dockerfile(spec) {
            return Ok(RootfsSource::Dockerfile(path));
        }

        let name = path.to_string_lossy().to_lowercase();
        if name.ends_with(".cpio") || name.ends_with(".cpio.gz") {
            Ok(RootfsSource::Cpio(path))
        } else if name.ends_with(".tar") || name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            Ok(RootfsSource::Tarball(path))
        } else {
            bail!("unsupported rootfs: {}", path.display())
        }
    }
}

#[derive(Debug, Clone)]
pub struct RootfsOptions {
    pub workdir: PathBuf,
    /// Defaults to `<workdir>/.unikraft/rootfs-cache`.
    pub cache_dir: Option<PathBuf>,
    pub architecture: String,
    pub compress: bool,
    /// Defaults to [`output_path`].
    pub output: Option<PathBuf>,
    pub cancel: CancelToken,
}

impl RootfsOptions {
    pub fn new(workdir: impl Into<PathBuf>, architecture: impl Into<String>) -> Self {
        RootfsOptions {
            workdir: workdir.into(),
            cache_dir: None,
            architecture: architecture.into(),
            compress: false,
            output: None,
            cancel: CancelToken::new(),
        }
    }

    pub fn compress(mut self, compress: bool) -> Self {
        self.compress = compress;
        self
    }

    fn output(&self) -> PathBuf {
        self.output
            .clone()
            .unwrap_or_else(|| output_path(&self.workdir, &self.architecture, self.compress))
    }

    fn cache(&self) -> RootfsCache {
        RootfsCache::new(
            self.cache_dir
                .clone()
                .unwrap_or_else(|| default_cache_dir(&self.workdir)),
        )
    }
}

/// A materialized initramfs and the defaults found in its source.
#[derive(Debug, Clone, Default)]
pub struct Rootfs {
    /// `None` when no rootfs was requested.
    pub path: Option<PathBuf>,
    pub command: Vec<String>,
    pub env: BTreeMap<String, String>,
    /// Served from the cache without rebuilding.
    pub cached: bool,
}

pub fn output_path(workdir: &Path, architecture: &str, compress: bool) -> PathBuf {
    let ext = if compress { "cpio.gz" } else { "cpio" };
    build_dir(workdir).join(format!("initramfs-{}.{}", architecture, ext))
}

pub fn default_cache_dir(workdir: &Path) -> PathBuf {
    workdir.join(VENDOR_DIR).join("rootfs-cache")
}

/// Turn `spec` into an initramfs. An empty spec does nothing.
pub fn build(spec: &str, opts: &RootfsOptions, exporter: &dyn ImageExporter) -> Result<Rootfs> {
    if spec.trim().is_empty() {
        return Ok(Rootfs::default());
    }

    let source = RootfsSource::classify(spec, &opts.workdir)?;
    let key = cache_key(&source, opts)?;
    let cache = opts.cache();
    let output = opts.output();

    if let Some(hit) = cache.lookup(&key, opts.compress) {
        tracing::debug!("rootfs cache hit for {} ({})", spec, &key[..16]);
        publish(&hit.archive, &output)?;
        return Ok(Rootfs {
            path: Some(output),
            command: hit.meta.command,
            env: hit.meta.env,
            cached: true,
        });
    }

    tracing::info!("Building initramfs from {} for {}", spec, opts.architecture);
    opts.cancel.check()?;
    let (archive, meta) = materialize(&source, opts, exporter)?;
    let data = if opts.compress {
        cpio::gzip(&archive)?
    } else {
        archive
    };

    let stored = cache.store(&key, opts.compress, &data, &meta)?;
    publish(&stored, &output)?;

    Ok(Rootfs {
        path: Some(output),
        command: meta.command,
        env: meta.env,
        cached: false,
    })
}

fn cache_key(source: &RootfsSource, opts: &RootfsOptions) -> Result<String> {
    let mut fp = Fingerprint::new();
    match source {
        RootfsSource::Directory(dir) => {
            fp.update_str("dir");
            cache::fingerprint_dir(&mut fp, dir, &own_outputs(dir, opts))?;
        }
        RootfsSource::Dockerfile(file) => {
            fp.update_str("dockerfile");
            fp.update_str(&sha256_file(file)?);
            if let Some(context) = file.parent() {
                let skip = [context.join(VENDOR_DIR), context.join(".git")];
                cache::fingerprint_dir(&mut fp, context, &skip)?;
            }
        }
        RootfsSource::Cpio(file) | RootfsSource::Tarball(file) => {
            fp.update_str("archive");
            fp.update_str(&sha256_file(file)?);
        }
    }
    fp.update_str(&opts.architecture).update_bool(opts.compress);
    Ok(fp.finish())
}

/// Paths under `dir` that a build writes: the vendor dir, the cache and the output.
fn own_outputs(dir: &Path, opts: &RootfsOptions) -> Vec<PathBuf> {
    [
        opts.workdir.join(VENDOR_DIR),
        opts.cache().dir().to_path_buf(),
        opts.output(),
    ]
    .into_iter()
    .filter(|p| p.starts_with(dir))
    .collect()
}

/// Produce an uncompressed cpio archive for `source`.
fn materialize(
    source: &RootfsSource,
    opts: &RootfsOptions,
    exporter: &dyn ImageExporter,
) -> Result<(Vec<u8>, RootfsMeta)> {
    match source {
        RootfsSource::Directory(dir) => {
            let archive = cpio::from_dir(dir, &own_outputs(dir, opts))?;
            Ok((archive, RootfsMeta::default()))
        }
        RootfsSource::Tarball(file) => {
            let data =
                std::fs::read(file).with_context(|| format!("failed to read {}", file.display()))?;
            Ok((cpio::from_tar(&data)?, RootfsMeta::default()))
        }
        RootfsSource::Cpio(file) => {
            let data =
                std::fs::read(file).with_context(|| format!("failed to read {}", file.display()))?;
            let data = if crate::util::archive::is_gzip(&data) {
                let mut plain = Vec::new();
                std::io::Read::read_to_end(
                    &mut flate2::read::GzDecoder::new(data.as_slice()),
                    &mut plain,
                )
                .with_context(|| format!("failed to decompress {}", file.display()))?;
                plain
            } else {
                data
            };
            cpio::list_entries(&data)
                .with_context(|| format!("invalid initramfs {}", file.display()))?;
            Ok((data, RootfsMeta::default()))
        }
        RootfsSource::Dockerfile(file) => {
            let contents = std::fs::read_to_string(file)
                .with_context(|| format!("failed to read {}", file.display()))?;
            let directives = dockerfile::Directives::parse(&contents);
            let context = file.parent().unwrap_or(opts.workdir.as_path());

            let tmp = tempfile::tempdir().context("failed to create export directory")?;
            let exported = tmp.path().join("rootfs.tar");
            exporter
                .export(file, context, &opts.architecture, &exported, &opts.cancel)
                .map_err(|e| KraftError::external("image export", file.display().to_string(), e))?;
            let data = std::fs::read(&exported)
                .with_context(|| format!("exporter produced no tarball for {}", file.display()))?;

            let meta = RootfsMeta {
                command: directives.argv(),
                env: directives.env,
            };
            Ok((cpio::from_tar(&data)?, meta))
        }
    }
}

/// Copy the cached archive to `output` unless it is already identical.
fn publish(archive: &Path, output: &Path) -> Result<()> {
    let data = std::fs::read(archive)
        .with_context(|| format!("failed to read {}", archive.display()))?;
    if std::fs::read(output).is_ok_and(|existing| existing == data) {
        return Ok(());
    }
    write_atomic(output, &data).map_err(|e| KraftError::cache_write(output, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{rootfs_tree, write_file, DirExporter};
    use tempfile::TempDir;

    #[test]
    fn test_empty_spec_is_noop() {
        let tmp = TempDir::new().unwrap();
        let out = build("", &RootfsOptions::new(tmp.path(), "x86_64"), &DockerCli).unwrap();
        assert!(out.path.is_none());
        assert!(!tmp.path().join(VENDOR_DIR).exists());
    }

    #[test]
    fn test_missing_rootfs_names_path() {
        let tmp = TempDir::new().unwrap();
        let err = build("./nope", &RootfsOptions::new(tmp.path(), "x86_64"), &DockerCli)
            .unwrap_err();
        assert!(err.to_string().contains("nope"));
    }

    #[test]
    fn test_directory_build_is_deterministic_and_cached() {
        let tmp = TempDir::new().unwrap();
        rootfs_tree(tmp.path());
        let opts = RootfsOptions::new(tmp.path(), "x86_64");

        let first = build("./rootfs", &opts, &DockerCli).unwrap();
        let path = first.path.clone().unwrap();
        assert!(!first.cached);
        assert_eq!(path, tmp.path().join(".unikraft/build/initramfs-x86_64.cpio"));
        let bytes = std::fs::read(&path).unwrap();

        let second = build("./rootfs", &opts, &DockerCli).unwrap();
        assert!(second.cached);
        assert_eq!(std::fs::read(&path).unwrap(), bytes);
    }

    #[test]
    fn test_workdir_as_rootfs_leaves_out_own_outputs() {
        let tmp = TempDir::new().unwrap();
        write_file(&tmp.path().join("etc/hostname"), "unikernel\n");
        let opts = RootfsOptions::new(tmp.path(), "x86_64");

        let first = build(".", &opts, &DockerCli).unwrap();
        let path = first.path.unwrap();
        let bytes = std::fs::read(&path).unwrap();
        let names = cpio::list_entries(&bytes).unwrap();
        assert!(names.iter().all(|n| !n.starts_with(VENDOR_DIR)));

        let second = build(".", &opts, &DockerCli).unwrap();
        assert!(second.cached);
        assert_eq!(std::fs::read(&path).unwrap(), bytes);
    }

    #[test]
    fn test_architectures_do_not_collide() {
        let tmp = TempDir::new().unwrap();
        rootfs_tree(tmp.path());

        let x86 = build("rootfs", &RootfsOptions::new(tmp.path(), "x86_64"), &DockerCli).unwrap();
        let arm = build("rootfs", &RootfsOptions::new(tmp.path(), "arm64"), &DockerCli).unwrap();
        assert_ne!(x86.path, arm.path);
        assert!(!arm.cached);
    }

    #[test]
    fn test_content_change_invalidates_cache() {
        let tmp = TempDir::new().unwrap();
        let root = rootfs_tree(tmp.path());
        let opts = RootfsOptions::new(tmp.path(), "x86_64").compress(true);

        build("rootfs", &opts, &DockerCli).unwrap();
        write_file(&root.join("etc/motd"), "hello\n");
        let rebuilt = build("rootfs", &opts, &DockerCli).unwrap();
        assert!(!rebuilt.cached);
        assert!(rebuilt.path.unwrap().to_string_lossy().ends_with(".cpio.gz"));
    }

    #[test]
    fn test_dockerfile_extracts_defaults() {
        let tmp = TempDir::new().unwrap();
        let image_root = rootfs_tree(tmp.path());
        write_file(
            &tmp.path().join("image/Dockerfile"),
            "FROM scratch\nENV GREETING=hi\nCMD [\"/usr/bin/app\"]\n",
        );
        let exporter = DirExporter::new(image_root);
        let mut opts = RootfsOptions::new(tmp.path(), "x86_64");
        opts.cache_dir = Some(tmp.path().join("cache"));

        let out = build("image/Dockerfile", &opts, &exporter).unwrap();
        assert_eq!(out.command, vec!["/usr/bin/app"]);
        assert_eq!(out.env["GREETING"], "hi");
        let names = cpio::list_entries(&std::fs::read(out.path.unwrap()).unwrap()).unwrap();
        assert!(names.contains(&"usr/bin/app".to_string()));

        let again = build("image/Dockerfile", &opts, &exporter).unwrap();
        assert!(again.cached);
        assert_eq!(again.command, vec!["/usr/bin/app"]);
        assert_eq!(exporter.calls(), 1);
    }

    #[test]
    fn test_cpio_input_is_validated() {
        let tmp = TempDir::new().unwrap();
        write_file(&tmp.path().join("bad.cpio"), "garbage");
        assert!(build("bad.cpio", &RootfsOptions::new(tmp.path(), "x86_64"), &DockerCli).is_err());
    }
}
