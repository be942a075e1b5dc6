//! The interface every catalog backend implements.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Result;

use crate::catalog::query::CatalogQuery;
use crate::core::component::placement;
use crate::core::merge::MergeStrategy;
use crate::core::package::Package;
use crate::core::target::Target;
use crate::scheduler::{CancelToken, ProgressHandle};

/// How and where to materialize a package.
#[derive(Clone)]
pub struct PullOptions {
    pub workdir: PathBuf,
    /// Reuse previously downloaded archives.
    pub use_cache: bool,
    /// Overrides the package's default placement in `workdir`.
    pub destination: Option<PathBuf>,
    pub cancel: CancelToken,
    pub progress: Option<ProgressHandle>,
}

impl PullOptions {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        PullOptions {
            workdir: workdir.into(),
            use_cache: true,
            destination: None,
            cancel: CancelToken::new(),
            progress: None,
        }
    }

    pub fn use_cache(mut self, use_cache: bool) -> Self {
        self.use_cache = use_cache;
        self
    }

    pub fn destination(mut self, dest: impl Into<PathBuf>) -> Self {
        self.destination = Some(dest.into());
        self
    }

    pub fn cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn progress(mut self, progress: ProgressHandle) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Where `pkg` ends up.
    pub fn destination_for(&self, pkg: &Package) -> PathBuf {
        self.destination
            .clone()
            .unwrap_or_else(|| placement(&self.workdir, pkg.kind, &pkg.name))
    }

    pub(crate) fn report(&self, fraction: f64) {
        if let Some(progress) = &self.progress {
            progress.report(fraction);
        }
    }
}

/// Everything a backend needs to turn a built target into a package.
#[derive(Debug, Clone, Default)]
pub struct PackOptions {
    pub name: String,
    /// Version recorded on the package (e.g. the kernel's full version).
    pub version: String,
    pub initramfs: Option<PathBuf>,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
    pub labels: BTreeMap<String, String>,
    /// Omit the target's key-config from the package.
    pub no_kconfig: bool,
    pub strategy: MergeStrategy,
    /// Also write the package archive here.
    pub output: Option<PathBuf>,
}

/// A catalog backend, selected by [`PackageManager::format`].
///
/// Implementations are shared across worker threads during search and
/// fetch phases.
pub trait PackageManager: Send + Sync {
    /// Format name this backend handles (e.g. `manifest`, `archive`).
    fn format(&self) -> &str;

    /// Packages matching `query`, from the local view unless `query.remote`.
    fn catalog(&self, query: &CatalogQuery) -> Result<Vec<Package>>;

    /// Materialize `pkg` on disk.
    fn pull(&self, pkg: &Package, opts: &PullOptions) -> Result<()>;

    /// Publish `pkg` to the configured remote.
    fn push(&self, pkg: &Package) -> Result<()>;

    /// Refresh the local view of every source.
    fn update(&self) -> Result<()>;

    fn add_source(&self, source: &str) -> Result<()>;

    fn remove_source(&self, source: &str) -> Result<()>;

    /// Package `target`, honouring `opts.strategy` against existing packages.
    fn pack(&self, target: &Target, opts: &PackOptions) -> Result<Vec<Package>>;

    /// Whether `source` is something this backend can add.
    fn is_compatible(&self, source: &str) -> bool;

    /// Configured source locators.
    fn sources(&self) -> Vec<String> {
        Vec::new()
    }
}

/// Returns true when `path` is a non-empty directory.
pub(crate) fn is_populated(path: &Path) -> bool {
    std::fs::read_dir(path)
        .map(|mut entries| entries.next().is_some())
        .unwrap_or(false)
}
