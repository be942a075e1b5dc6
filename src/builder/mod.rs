//! Builder strategy chain.
//!
//! A project is built by the first strategy, in priority order, whose
//! capability probe accepts it:
//!
//! 1. [`UnikraftBuilder`]: the project declares a unikraft core (or a
//!    template that brings one) and is compiled from source.
//! 2. [`RuntimeBuilder`]: the project names a prebuilt runtime package.
//! 3. [`DockerfileBuilder`]: the rootfs is a Dockerfile, packaged on top
//!    of a prebuilt runtime.
//!
//! Every strategy is driven the same way: `prepare` settles the target set
//! (resolving and fetching whatever is missing), then `build` produces the
//! kernels and records them in the context's [`Artifacts`].

pub mod dockerfile;
pub mod driver;
pub mod env;
pub mod runtime;
pub mod unikraft;

use std::path::PathBuf;

use anyhow::Result;

use crate::catalog::PackageManager;
use crate::core::{select_first_capable, Artifacts, Capability, Package, Project, Target, TargetConstraints};
use crate::scheduler::{CancelToken, ProcessOptions};
use crate::util::prompt::Prompter;

pub use dockerfile::DockerfileBuilder;
pub use driver::{MakeCli, MakeDriver, MakeOptions};
pub use runtime::RuntimeBuilder;
pub use unikraft::UnikraftBuilder;

/// What the caller asked for.
#[derive(Clone)]
pub struct BuildOptions<'a> {
    pub constraints: TargetConstraints,
    pub force_pull: bool,
    pub use_cache: bool,
    /// Skip refreshing the catalog before resolving.
    pub no_update: bool,
    pub jobs: Option<usize>,
    /// Use every CPU for make when `jobs` is unset.
    pub fast: bool,
    /// `KEY=VALUE` or bare `KEY` entries from the command line.
    pub env: Vec<String>,
    /// Overrides the project's rootfs.
    pub rootfs: Option<String>,
    pub log_file: Option<PathBuf>,
    pub prompter: Option<&'a dyn Prompter>,
    pub process: ProcessOptions,
    pub cancel: CancelToken,
}

impl Default for BuildOptions<'_> {
    fn default() -> Self {
        BuildOptions {
            constraints: TargetConstraints::default(),
            force_pull: false,
            use_cache: true,
            no_update: false,
            jobs: None,
            fast: false,
            env: Vec::new(),
            rootfs: None,
            log_file: None,
            prompter: None,
            process: ProcessOptions::default(),
            cancel: CancelToken::new(),
        }
    }
}

/// Everything a builder reads and writes during one run.
pub struct BuildContext<'a> {
    pub project: Project,
    /// Targets selected by `prepare`.
    pub targets: Vec<Target>,
    /// The prebuilt runtime chosen by the runtime strategies.
    pub runtime: Option<Package>,
    pub catalog: &'a dyn PackageManager,
    pub driver: &'a dyn MakeDriver,
    pub options: BuildOptions<'a>,
    pub artifacts: Artifacts,
}

impl<'a> BuildContext<'a> {
    pub fn new(
        project: Project,
        catalog: &'a dyn PackageManager,
        driver: &'a dyn MakeDriver,
        options: BuildOptions<'a>,
    ) -> Self {
        BuildContext {
            project,
            targets: Vec::new(),
            runtime: None,
            catalog,
            driver,
            options,
            artifacts: Artifacts::default(),
        }
    }

    /// The rootfs to use: the command line's, else the project's.
    pub fn rootfs_spec(&self) -> Option<&str> {
        self.options
            .rootfs
            .as_deref()
            .or(self.project.rootfs.as_deref())
            .filter(|s| !s.is_empty())
    }

    /// `-j` for make.
    pub fn make_jobs(&self) -> Option<usize> {
        self.options.jobs.or_else(|| {
            self.options
                .fast
                .then(|| std::thread::available_parallelism().map_or(1, |n| n.get()))
        })
    }
}

pub trait Builder: Send + Sync {
    fn name(&self) -> &'static str;

    /// Side-effect free check of whether this strategy applies.
    fn capable(&self, ctx: &BuildContext<'_>) -> Capability;

    fn prepare(&self, ctx: &mut BuildContext<'_>) -> Result<()>;

    fn build(&self, ctx: &mut BuildContext<'_>) -> Result<()>;
}

/// The chain in priority order.
pub fn builders() -> Vec<Box<dyn Builder>> {
    vec![
        Box::new(UnikraftBuilder),
        Box::new(RuntimeBuilder),
        Box::new(DockerfileBuilder),
    ]
}

pub fn select<'c>(chain: &'c [Box<dyn Builder>], ctx: &BuildContext<'_>) -> Result<&'c dyn Builder> {
    select_first_capable("build", chain, |b| (b.name(), b.capable(ctx)))
}

/// Select a builder, prepare, then build. Returns the builder's name.
pub fn run(ctx: &mut BuildContext<'_>) -> Result<&'static str> {
    let chain = builders();
    let builder = select(&chain, ctx)?;
    tracing::info!("building {} with the {} builder", ctx.project.name, builder.name());

    builder.prepare(ctx)?;
    builder.build(ctx)?;
    Ok(builder.name())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::KraftError;
    use crate::test_support::{write_kraftfile, MockDriver, MockPackageManager};
    use tempfile::TempDir;

    fn chosen(kraftfile: &str, rootfs: Option<&str>) -> Result<&'static str> {
        let tmp = TempDir::new().unwrap();
        write_kraftfile(tmp.path(), kraftfile);
        let project = Project::load(tmp.path()).unwrap();
        let pm = MockPackageManager::new("manifest");
        let driver = MockDriver::new();
        let ctx = BuildContext::new(
            project,
            &pm,
            &driver,
            BuildOptions {
                rootfs: rootfs.map(String::from),
                ..BuildOptions::default()
            },
        );
        let chain = builders();
        select(&chain, &ctx).map(|b| b.name())
    }

    #[test]
    fn test_core_wins_over_runtime() {
        let name = chosen(
            "name: app\nunikraft: stable\nruntime: base:latest\ntargets:\n  - qemu/x86_64\n",
            None,
        )
        .unwrap();
        assert_eq!(name, "unikraft");
    }

    #[test]
    fn test_runtime_wins_over_dockerfile() {
        let name = chosen("name: app\nruntime: base:latest\n", Some("./Dockerfile")).unwrap();
        assert_eq!(name, "runtime");
    }

    #[test]
    fn test_dockerfile_last() {
        let name = chosen("name: app\n", Some("./Dockerfile")).unwrap();
        assert_eq!(name, "dockerfile");
    }

    #[test]
    fn test_nothing_capable() {
        let err = chosen("name: app\nrootfs: ./rootfs\n", None).unwrap_err();
        match err.downcast_ref::<KraftError>() {
            Some(KraftError::StrategyUnavailable { action, reasons }) => {
                assert_eq!(action, "build");
                assert_eq!(reasons.len(), 3);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_make_jobs() {
        let tmp = TempDir::new().unwrap();
        write_kraftfile(tmp.path(), "name: app\n");
        let project = Project::load(tmp.path()).unwrap();
        let pm = MockPackageManager::new("manifest");
        let driver = MockDriver::new();

        let mut ctx = BuildContext::new(project, &pm, &driver, BuildOptions::default());
        assert_eq!(ctx.make_jobs(), None);
        ctx.options.fast = true;
        assert!(ctx.make_jobs().unwrap() >= 1);
        ctx.options.jobs = Some(3);
        assert_eq!(ctx.make_jobs(), Some(3));
    }
}
