//! Test utilities and mocks for kraftpack unit tests.
//!
//! The mocks stand in for the collaborators that touch the network or
//! spawn processes: catalog backends, the make driver and the user.
//!
//! ```rust,ignore
//! use crate::test_support::{MockPackageManager, ScriptedPrompter};
//!
//! let pm = MockPackageManager::new("manifest").with_remote(vec![musl]);
//! let counters = pm.counters();
//! // ... resolve ...
//! assert_eq!(counters.catalog_calls(), 2);
//! ```

pub mod fixtures;

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{bail, Result};

use crate::builder::driver::{MakeDriver, MakeOptions};
use crate::catalog::{CatalogQuery, PackOptions, PackageManager, PullOptions};
use crate::core::{ComponentType, KConfig, MergeStrategy, Package, Project, Target};
use crate::rootfs::ImageExporter;
use crate::scheduler::CancelToken;
use crate::util::prompt::Prompter;

pub use fixtures::*;

/// A target with a kernel path derived from its identity.
pub fn target(name: &str, arch: &str, plat: &str) -> Target {
    Target {
        name: name.to_string(),
        architecture: arch.to_string(),
        platform: plat.to_string(),
        kernel: PathBuf::from(format!("{}_{}-{}", name, plat, arch)),
        kconfig: KConfig::new(),
        command: Vec::new(),
    }
}

// ============================================================================
// Catalog
// ============================================================================

#[derive(Default)]
struct CounterState {
    catalog: AtomicUsize,
    remote: AtomicUsize,
    pulls: AtomicUsize,
    pushes: AtomicUsize,
    updates: AtomicUsize,
    pulled: Mutex<Vec<String>>,
    packs: Mutex<Vec<(String, MergeStrategy)>>,
}

/// Shared view of a [`MockPackageManager`]'s calls, usable after the mock
/// has been moved into a registry.
#[derive(Clone, Default)]
pub struct MockCounters {
    inner: Arc<CounterState>,
}

impl MockCounters {
    /// Every `catalog` call, local and remote.
    pub fn catalog_calls(&self) -> usize {
        self.inner.catalog.load(Ordering::SeqCst)
    }

    pub fn remote_calls(&self) -> usize {
        self.inner.remote.load(Ordering::SeqCst)
    }

    pub fn pulls(&self) -> usize {
        self.inner.pulls.load(Ordering::SeqCst)
    }

    pub fn pushes(&self) -> usize {
        self.inner.pushes.load(Ordering::SeqCst)
    }

    pub fn updates(&self) -> usize {
        self.inner.updates.load(Ordering::SeqCst)
    }

    /// Labels of pulled packages, in call order.
    pub fn pulled(&self) -> Vec<String> {
        self.inner.pulled.lock().unwrap().clone()
    }

    /// Strategy passed to each `pack` call, in call order.
    pub fn pack_strategies(&self) -> Vec<MergeStrategy> {
        self.inner.packs.lock().unwrap().iter().map(|(_, s)| *s).collect()
    }

    /// Names of targets passed to `pack`, in call order.
    pub fn packed_targets(&self) -> Vec<String> {
        self.inner.packs.lock().unwrap().iter().map(|(t, _)| t.clone()).collect()
    }
}

/// Package manager with scripted catalog results.
///
/// Local queries see `local`; remote queries see `local` and `remote`.
pub struct MockPackageManager {
    format: String,
    local: Vec<Package>,
    remote: Vec<Package>,
    failing_pulls: Vec<String>,
    materialize: bool,
    sources: Mutex<Vec<String>>,
    counters: MockCounters,
}

impl MockPackageManager {
    pub fn new(format: &str) -> Self {
        MockPackageManager {
            format: format.to_string(),
            local: Vec::new(),
            remote: Vec::new(),
            failing_pulls: Vec::new(),
            materialize: false,
            sources: Mutex::new(Vec::new()),
            counters: MockCounters::default(),
        }
    }

    pub fn with_local(mut self, packages: Vec<Package>) -> Self {
        self.local = packages;
        self
    }

    pub fn with_remote(mut self, packages: Vec<Package>) -> Self {
        self.remote = packages;
        self
    }

    /// Make pulls of `name` fail.
    pub fn failing_pull(mut self, name: &str) -> Self {
        self.failing_pulls.push(name.to_string());
        self
    }

    /// Create the destination directory (and kernel, if any) on pull.
    pub fn materialize(mut self) -> Self {
        self.materialize = true;
        self
    }

    pub fn counters(&self) -> MockCounters {
        self.counters.clone()
    }
}

impl PackageManager for MockPackageManager {
    fn format(&self) -> &str {
        &self.format
    }

    fn catalog(&self, query: &CatalogQuery) -> Result<Vec<Package>> {
        self.counters.inner.catalog.fetch_add(1, Ordering::SeqCst);
        let pool: Vec<&Package> = if query.remote {
            self.counters.inner.remote.fetch_add(1, Ordering::SeqCst);
            self.local.iter().chain(self.remote.iter()).collect()
        } else {
            self.local.iter().collect()
        };

        Ok(pool
            .into_iter()
            .filter(|p| query.matches(p))
            .map(|p| {
                let mut p = p.clone();
                if p.format.is_empty() {
                    p.format = self.format.clone();
                }
                p
            })
            .collect())
    }

    fn pull(&self, pkg: &Package, opts: &PullOptions) -> Result<()> {
        self.counters.inner.pulls.fetch_add(1, Ordering::SeqCst);
        self.counters.inner.pulled.lock().unwrap().push(pkg.label());
        if self.failing_pulls.contains(&pkg.name) {
            bail!("mock pull failure for {}", pkg.name);
        }

        if self.materialize {
            let dest = opts.destination_for(pkg);
            std::fs::create_dir_all(&dest)?;
            std::fs::write(dest.join(".pulled"), pkg.label())?;
            if let Some(kernel) = &pkg.kernel {
                std::fs::write(dest.join(kernel), b"kernel")?;
            }
        }
        opts.report(1.0);
        Ok(())
    }

    fn push(&self, _pkg: &Package) -> Result<()> {
        self.counters.inner.pushes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn update(&self) -> Result<()> {
        self.counters.inner.updates.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn add_source(&self, source: &str) -> Result<()> {
        self.sources.lock().unwrap().push(source.to_string());
        Ok(())
    }

    fn remove_source(&self, source: &str) -> Result<()> {
        self.sources.lock().unwrap().retain(|s| s != source);
        Ok(())
    }

    fn pack(&self, target: &Target, opts: &PackOptions) -> Result<Vec<Package>> {
        self.counters
            .inner
            .packs
            .lock()
            .unwrap()
            .push((target.name.clone(), opts.strategy));
        Ok(vec![Package::new(ComponentType::Runtime, &opts.name, &opts.version)
            .with_format(&self.format)
            .with_platarch(&target.platform, &target.architecture)])
    }

    fn is_compatible(&self, _source: &str) -> bool {
        true
    }

    fn sources(&self) -> Vec<String> {
        self.sources.lock().unwrap().clone()
    }
}

// ============================================================================
// Make driver
// ============================================================================

/// Make driver that records calls and writes a fake kernel on build.
#[derive(Clone, Default)]
pub struct MockDriver {
    calls: Arc<Mutex<Vec<String>>>,
    fail_on: Option<String>,
    skip_kernel: bool,
}

impl MockDriver {
    pub fn new() -> Self {
        MockDriver::default()
    }

    /// Fail builds of the target named `name`.
    pub fn failing(mut self, name: &str) -> Self {
        self.fail_on = Some(name.to_string());
        self
    }

    /// Succeed without producing a kernel.
    pub fn without_kernel(mut self) -> Self {
        self.skip_kernel = true;
        self
    }

    /// `configure <target>` / `build <target>` entries, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl MakeDriver for MockDriver {
    fn configure(
        &self,
        _project: &Project,
        target: &Target,
        _extra: &KConfig,
        _opts: &MakeOptions,
    ) -> Result<()> {
        self.calls.lock().unwrap().push(format!("configure {}", target.name));
        Ok(())
    }

    fn build(&self, _project: &Project, target: &Target, _opts: &MakeOptions) -> Result<()> {
        self.calls.lock().unwrap().push(format!("build {}", target.name));
        if self.fail_on.as_deref() == Some(target.name.as_str()) {
            bail!("make exited with status 2");
        }
        if !self.skip_kernel {
            write_file(&target.kernel, "kernel");
        }
        Ok(())
    }

    fn is_available(&self) -> bool {
        true
    }
}

// ============================================================================
// Image export
// ============================================================================

/// Exporter that packs a fixed directory instead of running docker.
pub struct DirExporter {
    root: PathBuf,
    calls: AtomicUsize,
}

impl DirExporter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        DirExporter {
            root: root.into(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ImageExporter for DirExporter {
    fn export(&self, _: &Path, _: &Path, _: &str, output: &Path, _: &CancelToken) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut data = Vec::new();
        crate::util::archive::pack_tar_gz(&self.root, &mut data)?;
        std::fs::write(output, data)?;
        Ok(())
    }

    fn is_available(&self) -> bool {
        true
    }
}

// ============================================================================
// Prompting
// ============================================================================

/// Answers prompts from a fixed script and records the questions.
pub struct ScriptedPrompter {
    answers: Mutex<VecDeque<usize>>,
    asked: Mutex<Vec<String>>,
}

impl ScriptedPrompter {
    pub fn new(answers: impl IntoIterator<Item = usize>) -> Self {
        ScriptedPrompter {
            answers: Mutex::new(answers.into_iter().collect()),
            asked: Mutex::new(Vec::new()),
        }
    }

    pub fn asked(&self) -> Vec<String> {
        self.asked.lock().unwrap().clone()
    }
}

impl Prompter for ScriptedPrompter {
    fn select(&self, question: &str, options: &[String]) -> Result<usize> {
        self.asked.lock().unwrap().push(question.to_string());
        match self.answers.lock().unwrap().pop_front() {
            Some(index) if index < options.len() => Ok(index),
            Some(index) => bail!("scripted answer {} out of range", index),
            None => bail!("no scripted answer for: {}", question),
        }
    }
}

/// Write `contents` to `path`, creating parent directories.
pub fn write_file(path: &Path, contents: &str) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, contents).unwrap();
}
