//! Manifest catalog: TOML index files listing where each component lives.
//!
//! An index is a list of `[[package]]` tables:
//!
//! ```toml
//! [[package]]
//! name = "musl"
//! version = "stable"
//! type = "lib"
//!
//! [package.origin]
//! git = "https://github.com/unikraft/lib-musl.git"
//! rev = "stable"
//! ```
//!
//! An origin is a `git` repository (optionally pinned by `rev`), a
//! `tarball` URL (optionally checked against `sha256`), or a `path`
//! relative to a local index. The local view of the catalog is the set of
//! index copies under `<cache>/manifests`; `update` refreshes them.

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use git2::ResetType;
use serde::Deserialize;
use url::Url;

use crate::catalog::manager::{PackOptions, PackageManager, PullOptions};
use crate::catalog::query::CatalogQuery;
use crate::core::component::ComponentType;
use crate::core::errors::KraftError;
use crate::core::kconfig::KConfig;
use crate::core::package::Package;
use crate::core::target::Target;
use crate::util::archive::extract_tarball;
use crate::util::fs::{copy_dir_all, remove_dir_all_if_exists, resolve_against, write_atomic};
use crate::util::hash::{sha256_bytes, sha256_str};

pub const FORMAT: &str = "manifest";

#[derive(Debug, Default, Deserialize)]
struct IndexFile {
    #[serde(default, rename = "package")]
    packages: Vec<IndexEntry>,
}

#[derive(Debug, Clone, Deserialize)]
struct IndexEntry {
    name: String,
    #[serde(default)]
    version: String,
    #[serde(rename = "type")]
    kind: ComponentType,
    #[serde(default, alias = "arch")]
    architecture: Option<String>,
    #[serde(default, alias = "plat")]
    platform: Option<String>,
    #[serde(default)]
    kernel: Option<PathBuf>,
    #[serde(default)]
    kconfig: KConfig,
    #[serde(default)]
    origin: Origin,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct Origin {
    git: Option<String>,
    rev: Option<String>,
    tarball: Option<String>,
    sha256: Option<String>,
    /// Leading path components dropped from tarball entries.
    #[serde(default = "default_strip")]
    strip: usize,
    path: Option<String>,
}

fn default_strip() -> usize {
    1
}

impl Origin {
    fn locator(&self) -> Option<String> {
        self.git
            .clone()
            .or_else(|| self.tarball.clone())
            .or_else(|| self.path.clone())
    }
}

impl IndexEntry {
    fn to_package(&self) -> Package {
        let mut pkg = Package::new(self.kind, &self.name, &self.version).with_format(FORMAT);
        pkg.source = self.origin.locator();
        pkg.architecture = self.architecture.clone();
        pkg.platform = self.platform.clone();
        pkg.kernel = self.kernel.clone();
        pkg.kconfig = self.kconfig.clone();
        pkg
    }

    fn is(&self, pkg: &Package) -> bool {
        self.name == pkg.name
            && self.version == pkg.version
            && self.kind == pkg.kind
            && self.origin.locator() == pkg.source
    }
}

/// Catalog backed by TOML index files.
pub struct ManifestManager {
    sources: Mutex<Vec<String>>,
    manifests_dir: PathBuf,
    downloads_dir: PathBuf,
    client: reqwest::blocking::Client,
    /// Remote queries refresh the indexes at most once per instance.
    refreshed: Mutex<bool>,
}

impl ManifestManager {
    pub fn new(
        sources: Vec<String>,
        cache_dir: &Path,
        timeout: Option<Duration>,
    ) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to create HTTP client")?;

        Ok(ManifestManager {
            sources: Mutex::new(sources),
            manifests_dir: cache_dir.join("manifests"),
            downloads_dir: cache_dir.join("downloads"),
            client,
            refreshed: Mutex::new(false),
        })
    }

    fn source_list(&self) -> Vec<String> {
        self.sources.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// Where the local copy of `source` lives.
    pub fn cached_index_path(&self, source: &str) -> PathBuf {
        self.manifests_dir
            .join(format!("{}.toml", cache_name(source)))
    }

    /// Every entry in the local view, with relative path origins made absolute.
    fn entries(&self) -> Result<Vec<IndexEntry>> {
        let mut entries = Vec::new();
        for source in self.source_list() {
            let cached = self.cached_index_path(&source);
            if !cached.exists() {
                tracing::debug!("no local copy of {} yet", source);
                continue;
            }
            let contents = std::fs::read_to_string(&cached)
                .with_context(|| format!("failed to read index: {}", cached.display()))?;
            let index: IndexFile = toml::from_str(&contents)
                .with_context(|| format!("failed to parse index from {}", source))?;

            let base = local_index_dir(&source);
            for mut entry in index.packages {
                if let Some(base) = &base {
                    if let Some(path) = entry.origin.path.take() {
                        entry.origin.path =
                            Some(resolve_against(base, &path).display().to_string());
                    }
                }
                entries.push(entry);
            }
        }
        Ok(entries)
    }

    fn refresh_once(&self) -> Result<()> {
        let mut refreshed = self
            .refreshed
            .lock()
            .map_err(|_| anyhow::anyhow!("manifest refresh lock poisoned"))?;
        if !*refreshed {
            self.update()?;
            *refreshed = true;
        }
        Ok(())
    }

    fn fetch_index(&self, source: &str) -> Result<Vec<u8>> {
        if is_remote(source) {
            download(&self.client, source)
        } else {
            std::fs::read(source).with_context(|| format!("failed to read index: {}", source))
        }
    }

    fn pull_git(&self, url: &str, rev: Option<&str>, dest: &Path, opts: &PullOptions) -> Result<()> {
        tracing::info!("Cloning {}", url);

        let cancel = opts.cancel.clone();
        let progress = opts.progress.clone();
        let mut callbacks = git2::RemoteCallbacks::new();
        callbacks.transfer_progress(move |stats| {
            let total = stats.total_objects();
            if let Some(progress) = progress.as_ref().filter(|_| total > 0) {
                progress.report(stats.received_objects() as f64 / total as f64 * 0.9);
            }
            !cancel.is_cancelled()
        });
        let mut fetch = git2::FetchOptions::new();
        fetch.remote_callbacks(callbacks);

        let repo = git2::build::RepoBuilder::new()
            .fetch_options(fetch)
            .clone(url, dest);
        opts.cancel.check()?;
        let repo = repo.with_context(|| format!("failed to clone {}", url))?;

        if let Some(rev) = rev {
            let object = repo
                .revparse_single(rev)
                .or_else(|_| repo.revparse_single(&format!("origin/{}", rev)))
                .with_context(|| format!("revision {} not found in {}", rev, url))?;
            let commit = object.peel_to_commit()?;
            repo.reset(commit.as_object(), ResetType::Hard, None)?;
        }

        Ok(())
    }

    fn pull_tarball(
        &self,
        url: &str,
        sha256: Option<&str>,
        strip: usize,
        dest: &Path,
        opts: &PullOptions,
    ) -> Result<()> {
        let cached = self
            .downloads_dir
            .join(format!("{}.tar.gz", sha256.map(str::to_string).unwrap_or_else(|| sha256_str(url))));

        let data = match std::fs::read(&cached) {
            Ok(data) if opts.use_cache && sha256.map_or(true, |s| sha256_bytes(&data) == s) => {
                tracing::debug!("reusing downloaded {}", cached.display());
                data
            }
            _ => {
                tracing::info!("Fetching tarball from {}", url);
                let data = download(&self.client, url)?;
                if let Some(expected) = sha256 {
                    let actual = sha256_bytes(&data);
                    if actual != expected {
                        bail!(
                            "tarball hash mismatch for {}:\n  expected: {}\n  actual:   {}",
                            url,
                            expected,
                            actual
                        );
                    }
                }
                std::fs::create_dir_all(&self.downloads_dir)
                    .and_then(|_| write_atomic(&cached, &data))
                    .map_err(|e| KraftError::cache_write(&cached, e))?;
                data
            }
        };
        opts.report(0.7);
        opts.cancel.check()?;

        extract_tarball(&data, dest, strip)
            .with_context(|| format!("failed to extract tarball from {}", url))
    }
}

impl PackageManager for ManifestManager {
    fn format(&self) -> &str {
        FORMAT
    }

    fn catalog(&self, query: &CatalogQuery) -> Result<Vec<Package>> {
        if query.remote {
            self.refresh_once()?;
        }

        let found: Vec<Package> = self
            .entries()?
            .iter()
            .map(IndexEntry::to_package)
            .filter(|pkg| query.matches(pkg))
            .collect();
        tracing::debug!(
            "manifest catalog: {} result(s) for {} (remote: {})",
            found.len(),
            query,
            query.remote
        );
        Ok(found)
    }

    fn pull(&self, pkg: &Package, opts: &PullOptions) -> Result<()> {
        let entry = self
            .entries()?
            .into_iter()
            .find(|e| e.is(pkg))
            .with_context(|| format!("{} is not listed in any manifest", pkg.label()))?;

        let dest = opts.destination_for(pkg);
        opts.cancel.check()?;
        remove_dir_all_if_exists(&dest)?;
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| KraftError::cache_write(parent, e))?;
        }

        let origin = &entry.origin;
        if let Some(url) = &origin.git {
            self.pull_git(url, origin.rev.as_deref(), &dest, opts)?;
        } else if let Some(url) = &origin.tarball {
            self.pull_tarball(url, origin.sha256.as_deref(), origin.strip, &dest, opts)?;
        } else if let Some(path) = &origin.path {
            copy_dir_all(Path::new(path), &dest)?;
        } else {
            bail!("{} has no origin to pull from", pkg.label());
        }

        opts.report(1.0);
        tracing::info!("Pulled {} into {}", pkg.label(), dest.display());
        Ok(())
    }

    fn push(&self, pkg: &Package) -> Result<()> {
        bail!("cannot push {}: manifest catalogs are read-only", pkg.label())
    }

    fn update(&self) -> Result<()> {
        for source in self.source_list() {
            tracing::info!("Updating index {}", source);
            let data = self.fetch_index(&source)?;
            let text = std::str::from_utf8(&data)
                .with_context(|| format!("index {} is not valid UTF-8", source))?;
            toml::from_str::<IndexFile>(text)
                .with_context(|| format!("failed to parse index from {}", source))?;

            let cached = self.cached_index_path(&source);
            std::fs::create_dir_all(&self.manifests_dir)
                .and_then(|_| write_atomic(&cached, &data))
                .map_err(|e| KraftError::cache_write(&cached, e))?;
        }
        Ok(())
    }

    fn add_source(&self, source: &str) -> Result<()> {
        if !self.is_compatible(source) {
            bail!("{} is not a manifest index", source);
        }
        let mut sources = self
            .sources
            .lock()
            .map_err(|_| anyhow::anyhow!("manifest sources lock poisoned"))?;
        if !sources.iter().any(|s| s == source) {
            sources.push(source.to_string());
        }
        Ok(())
    }

    fn remove_source(&self, source: &str) -> Result<()> {
        let mut sources = self
            .sources
            .lock()
            .map_err(|_| anyhow::anyhow!("manifest sources lock poisoned"))?;
        sources.retain(|s| s != source);

        let cached = self.cached_index_path(source);
        if cached.exists() {
            std::fs::remove_file(&cached)
                .with_context(|| format!("failed to remove {}", cached.display()))?;
        }
        Ok(())
    }

    fn pack(&self, target: &Target, _opts: &PackOptions) -> Result<Vec<Package>> {
        bail!("cannot package {}: manifest catalogs are read-only", target)
    }

    fn is_compatible(&self, source: &str) -> bool {
        is_remote(source) || source.ends_with(".toml") || Path::new(source).is_file()
    }

    fn sources(&self) -> Vec<String> {
        self.source_list()
    }
}

fn is_remote(source: &str) -> bool {
    Url::parse(source).is_ok_and(|u| matches!(u.scheme(), "http" | "https"))
}

/// Directory of a local index, against which `path` origins resolve.
fn local_index_dir(source: &str) -> Option<PathBuf> {
    if is_remote(source) {
        return None;
    }
    Path::new(source).parent().map(Path::to_path_buf)
}

/// Cache file stem for `source`.
fn cache_name(source: &str) -> String {
    match Url::parse(source) {
        Ok(url) if is_remote(source) => sanitize_url_for_path(&url),
        _ => format!("local-{}", &sha256_str(source)[..16]),
    }
}

/// Sanitize a URL for use as a file name.
fn sanitize_url_for_path(url: &Url) -> String {
    let mut name = String::new();

    if let Some(host) = url.host_str() {
        name.push_str(host);
    }

    let path = url.path().trim_matches('/');
    if !path.is_empty() {
        name.push('-');
        name.push_str(&path.replace('/', "-"));
    }

    for suffix in [".toml", ".git"] {
        if let Some(stripped) = name.strip_suffix(suffix) {
            name.truncate(stripped.len());
        }
    }

    name
}

/// GET `url`, failing on non-success statuses.
pub(crate) fn download(client: &reqwest::blocking::Client, url: &str) -> Result<Vec<u8>> {
    let response = client
        .get(url)
        .send()
        .with_context(|| format!("failed to download {}", url))?;

    if !response.status().is_success() {
        bail!("failed to download {}: HTTP {}", url, response.status());
    }

    let bytes = response
        .bytes()
        .with_context(|| format!("failed to read response body from {}", url))?;
    Ok(bytes.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_index(dir: &Path, contents: &str) -> String {
        std::fs::create_dir_all(dir).unwrap();
        let path = dir.join("index.toml");
        std::fs::write(&path, contents).unwrap();
        path.display().to_string()
    }

    const INDEX: &str = r#"
[[package]]
name = "musl"
version = "stable"
type = "lib"

[package.origin]
path = "pkgs/musl"

[[package]]
name = "base"
version = "latest"
type = "runtime"
arch = "x86_64"
plat = "qemu"
kernel = "base_qemu-x86_64"

[package.origin]
path = "pkgs/base"
"#;

    fn manager(tmp: &TempDir) -> (ManifestManager, String) {
        let index = write_index(&tmp.path().join("index"), INDEX);
        let pm = ManifestManager::new(vec![index.clone()], &tmp.path().join("cache"), None).unwrap();
        (pm, index)
    }

    #[test]
    fn test_local_view_empty_until_update() {
        let tmp = TempDir::new().unwrap();
        let (pm, _) = manager(&tmp);

        assert!(pm.catalog(&CatalogQuery::new("musl")).unwrap().is_empty());
        let found = pm.catalog(&CatalogQuery::new("musl").remote(true)).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].format, FORMAT);

        // the refreshed copy now serves local queries
        assert_eq!(pm.catalog(&CatalogQuery::new("musl")).unwrap().len(), 1);
    }

    #[test]
    fn test_catalog_filters_platarch() {
        let tmp = TempDir::new().unwrap();
        let (pm, _) = manager(&tmp);
        pm.update().unwrap();

        let q = CatalogQuery::new("base").with_platform("qemu").with_architecture("x86_64");
        let found = pm.catalog(&q).unwrap();
        assert_eq!(found.len(), 1);
        assert!(found[0].is_target());

        let q = CatalogQuery::new("base").with_platform("fc").with_architecture("x86_64");
        assert!(pm.catalog(&q).unwrap().is_empty());
    }

    #[test]
    fn test_pull_path_origin() {
        let tmp = TempDir::new().unwrap();
        let (pm, _) = manager(&tmp);
        let pkg_dir = tmp.path().join("index/pkgs/musl");
        std::fs::create_dir_all(&pkg_dir).unwrap();
        std::fs::write(pkg_dir.join("Makefile.uk"), "# musl").unwrap();
        pm.update().unwrap();

        let pkg = pm.catalog(&CatalogQuery::new("musl")).unwrap().remove(0);
        let workdir = tmp.path().join("app");
        pm.pull(&pkg, &PullOptions::new(&workdir)).unwrap();

        assert!(workdir.join(".unikraft/libs/musl/Makefile.uk").is_file());
    }

    #[test]
    fn test_sources_add_remove() {
        let tmp = TempDir::new().unwrap();
        let (pm, index) = manager(&tmp);
        pm.update().unwrap();
        assert!(pm.cached_index_path(&index).exists());

        pm.add_source("https://example.com/index.toml").unwrap();
        pm.add_source("https://example.com/index.toml").unwrap();
        assert_eq!(pm.sources().len(), 2);
        assert!(pm.add_source("not-an-index").is_err());

        pm.remove_source(&index).unwrap();
        assert_eq!(pm.sources(), vec!["https://example.com/index.toml"]);
        assert!(!pm.cached_index_path(&index).exists());
    }

    #[test]
    fn test_sanitize_url() {
        let url = Url::parse("https://example.com/unikraft/index.toml").unwrap();
        assert_eq!(sanitize_url_for_path(&url), "example.com-unikraft-index");
        assert!(cache_name("/srv/index.toml").starts_with("local-"));
    }

    #[test]
    fn test_pack_and_push_unsupported() {
        let tmp = TempDir::new().unwrap();
        let (pm, _) = manager(&tmp);
        let pkg = Package::new(ComponentType::Lib, "musl", "stable");
        assert!(pm.push(&pkg).is_err());
    }
}
