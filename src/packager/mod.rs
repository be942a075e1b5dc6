//! Packager strategy chain.
//!
//! Mirrors the builder chain with one extra, lowest-priority strategy:
//!
//! 1. [`UnikraftPackager`]: package the kernels a unikraft project built.
//! 2. [`RuntimePackager`]: package a prebuilt runtime with the project's rootfs.
//! 3. [`DockerfilePackager`]: a Dockerfile rootfs on a prebuilt runtime.
//! 4. [`CliKernelPackager`]: a kernel named on the command line, no project.
//!
//! Packaging runs as one sequential phase with a unit per target. The
//! requested [`MergeStrategy`] applies to the first target only; later
//! targets merge into the package the first one created.

pub mod cli_kernel;
pub mod dockerfile;
pub mod runtime;
pub mod unikraft;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{bail, Result};

use crate::catalog::{CatalogQuery, PackOptions, PackageManager};
use crate::core::{
    select_first_capable, Artifacts, Capability, KConfig, KraftError, MergeStrategy, Package,
    Project, Target, TargetConstraints,
};
use crate::rootfs::dockerfile::ImageExporter;
use crate::rootfs::{self, Rootfs, RootfsOptions};
use crate::scheduler::{CancelToken, Phase, ProcessModel, ProcessOptions, WorkUnit};
use crate::util::prompt::Prompter;

pub use cli_kernel::CliKernelPackager;
pub use dockerfile::DockerfilePackager;
pub use runtime::RuntimePackager;
pub use unikraft::UnikraftPackager;

/// Options that make a kernel carry its initramfs inside the image.
const EINITRD_OPTIONS: [&str; 3] = [
    "CONFIG_LIBVFSCORE_ROOTFS_EINITRD",
    "CONFIG_LIBVFSCORE_AUTOMOUNT_EINITRD",
    "CONFIG_LIBVFSCORE_AUTOMOUNT_CI_EINITRD",
];

#[derive(Clone)]
pub struct PackageOptions<'a> {
    pub name: String,
    /// Used when the kernel does not report its own version.
    pub version: String,
    pub constraints: TargetConstraints,
    /// A prebuilt kernel, used only without a project.
    pub kernel: Option<PathBuf>,
    pub rootfs: Option<String>,
    pub compress: bool,
    pub args: Vec<String>,
    pub env: Vec<String>,
    /// `key=value` labels.
    pub labels: Vec<String>,
    pub strategy: MergeStrategy,
    pub push: bool,
    pub no_kconfig: bool,
    /// `name[:version]` of a runtime overriding the project's.
    pub runtime: Option<String>,
    pub output: Option<PathBuf>,
    pub use_cache: bool,
    pub prompter: Option<&'a dyn Prompter>,
    pub process: ProcessOptions,
    pub cancel: CancelToken,
}

impl Default for PackageOptions<'_> {
    fn default() -> Self {
        PackageOptions {
            name: String::new(),
            version: "latest".to_string(),
            constraints: TargetConstraints::default(),
            kernel: None,
            rootfs: None,
            compress: false,
            args: Vec::new(),
            env: Vec::new(),
            labels: Vec::new(),
            strategy: MergeStrategy::default(),
            push: false,
            no_kconfig: false,
            runtime: None,
            output: None,
            use_cache: true,
            prompter: None,
            process: ProcessOptions::default(),
            cancel: CancelToken::new(),
        }
    }
}

impl PackageOptions<'_> {
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            bail!("a package name is required (use `--name`)");
        }
        self.constraints.validate()?;
        if self.strategy == MergeStrategy::Prompt && self.prompter.is_none() {
            return Err(KraftError::IncompatibleArguments(
                "cannot use `--strategy prompt` with `--no-prompt`".to_string(),
            )
            .into());
        }
        Ok(())
    }
}

pub struct PackContext<'a> {
    pub workdir: PathBuf,
    pub project: Option<Project>,
    /// Where runtimes are looked up, pulled from and pushed to.
    pub catalog: &'a dyn PackageManager,
    /// The backend of the selected package format.
    pub backend: &'a dyn PackageManager,
    pub exporter: &'a dyn ImageExporter,
    pub options: PackageOptions<'a>,
    pub artifacts: Artifacts,
}

impl<'a> PackContext<'a> {
    pub fn new(
        workdir: impl Into<PathBuf>,
        project: Option<Project>,
        catalog: &'a dyn PackageManager,
        backend: &'a dyn PackageManager,
        exporter: &'a dyn ImageExporter,
        options: PackageOptions<'a>,
    ) -> Self {
        PackContext {
            workdir: workdir.into(),
            project,
            catalog,
            backend,
            exporter,
            options,
            artifacts: Artifacts::default(),
        }
    }

    pub fn rootfs_spec(&self) -> Option<&str> {
        self.options
            .rootfs
            .as_deref()
            .or(self.project.as_ref().and_then(|p| p.rootfs.as_deref()))
            .filter(|s| !s.is_empty())
    }
}

/// What a packager produced.
#[derive(Debug, Default)]
pub struct Packed {
    pub packages: Vec<Package>,
    pub initramfs: Vec<PathBuf>,
}

pub trait Packager: Send + Sync {
    fn name(&self) -> &'static str;

    fn capable(&self, ctx: &PackContext<'_>) -> Capability;

    fn pack(&self, ctx: &PackContext<'_>) -> Result<Packed>;
}

/// The chain in priority order.
pub fn packagers() -> Vec<Box<dyn Packager>> {
    vec![
        Box::new(UnikraftPackager),
        Box::new(RuntimePackager),
        Box::new(DockerfilePackager),
        Box::new(CliKernelPackager),
    ]
}

pub fn select<'c>(chain: &'c [Box<dyn Packager>], ctx: &PackContext<'_>) -> Result<&'c dyn Packager> {
    select_first_capable("package", chain, |p| (p.name(), p.capable(ctx)))
}

/// Validate, settle the merge strategy, pack, and push when asked.
pub fn run(ctx: &mut PackContext<'_>) -> Result<Vec<Package>> {
    ctx.options.validate()?;

    let chain = packagers();
    let packager = select(&chain, ctx)?;
    ctx.options.strategy = resolve_strategy(
        ctx.backend,
        &ctx.options.name,
        ctx.options.strategy,
        ctx.options.prompter,
    )?;
    tracing::info!(
        "packaging {} with the {} packager (strategy: {})",
        ctx.options.name,
        packager.name(),
        ctx.options.strategy
    );

    let packed = packager.pack(ctx)?;
    if packed.packages.is_empty() {
        bail!("no matching targets found for: {}", describe(ctx));
    }

    if ctx.options.push {
        for package in &packed.packages {
            tracing::info!("pushing {}", package);
            ctx.catalog.push(package)?;
        }
    }

    for path in packed.initramfs {
        ctx.artifacts.add_initramfs(path);
    }
    ctx.artifacts
        .packages
        .extend(packed.packages.iter().map(|p| p.to_string()));
    Ok(packed.packages)
}

/// The strategy to pack with, given whether `name` already exists.
///
/// `prompt` asks which strategy to use and `exit` refuses, both only when
/// the package exists. Anything else passes through.
pub fn resolve_strategy(
    backend: &dyn PackageManager,
    name: &str,
    requested: MergeStrategy,
    prompter: Option<&dyn Prompter>,
) -> Result<MergeStrategy> {
    let exists = !backend.catalog(&CatalogQuery::new(name))?.is_empty();
    if !exists {
        return Ok(match requested {
            MergeStrategy::Prompt => MergeStrategy::Overwrite,
            other => other,
        });
    }

    match requested {
        MergeStrategy::Prompt => {
            let Some(prompter) = prompter else {
                return Err(KraftError::IncompatibleArguments(
                    "cannot prompt for a merge strategy when prompting is disabled".to_string(),
                )
                .into());
            };
            let options: Vec<String> = MergeStrategy::CHOICES
                .iter()
                .map(|s| s.to_string())
                .collect();
            let index = prompter.select(
                &format!("package {} already exists, how should it be updated?", name),
                &options,
            )?;
            Ok(MergeStrategy::CHOICES[index])
        }
        MergeStrategy::Exit => {
            bail!("package already exists and merge strategy set to exit on conflict")
        }
        other => Ok(other),
    }
}

fn describe(ctx: &PackContext<'_>) -> String {
    let c = &ctx.options.constraints;
    let parts: Vec<String> = [
        ("arch", &c.architecture),
        ("plat", &c.platform),
        ("target", &c.name),
    ]
    .into_iter()
    .filter(|(_, v)| !v.is_empty())
    .map(|(k, v)| format!("{}={}", k, v))
    .collect();

    if parts.is_empty() {
        ctx.options.name.clone()
    } else {
        parts.join(", ")
    }
}

/// Parse `key=value` labels.
pub fn parse_labels(labels: &[String]) -> Result<BTreeMap<String, String>> {
    let mut map = BTreeMap::new();
    for label in labels {
        match label.split_once('=') {
            Some((k, v)) if !k.is_empty() => {
                map.insert(k.to_string(), v.to_string());
            }
            _ => bail!("invalid label format: {} (expected key=value)", label),
        }
    }
    Ok(map)
}

/// Whether the kernel embeds its own initrd.
pub fn embeds_initrd(kconfig: &KConfig) -> bool {
    EINITRD_OPTIONS.iter().any(|k| kconfig.is_yes(k))
}

/// Version reported by the kernel's configuration.
pub fn kernel_version(kconfig: &KConfig) -> Option<String> {
    kconfig
        .get("UK_FULLVERSION")
        .or_else(|| kconfig.get("CONFIG_UK_FULLVERSION"))
        .map(|v| v.trim_matches('"').to_string())
        .filter(|v| !v.is_empty())
}

/// Defaults a packager supplies for every target it packs.
#[derive(Debug, Default)]
pub(crate) struct TargetDefaults {
    pub command: Vec<String>,
    pub env: BTreeMap<String, String>,
}

/// Pack each target in a sequential phase.
pub(crate) fn pack_targets(
    ctx: &PackContext<'_>,
    targets: &[Target],
    defaults: &TargetDefaults,
) -> Result<Packed> {
    let labels = parse_labels(&ctx.options.labels)?;
    let rootfs_spec = ctx.rootfs_spec();
    let options = &ctx.options;
    let workdir = ctx.workdir.as_path();
    let (backend, exporter) = (ctx.backend, ctx.exporter);

    let packed: Mutex<Packed> = Mutex::new(Packed::default());
    let mut phase = Phase::build("packaging");
    for (index, target) in targets.iter().enumerate() {
        let (labels, packed) = (&labels, &packed);
        phase.push(WorkUnit::new(format!("packaging {}", target.name), move |unit| {
            let rootfs = match rootfs_spec {
                Some(_) if embeds_initrd(&target.kconfig) => {
                    tracing::info!("{} embeds its initrd, not attaching a rootfs", target.name);
                    Rootfs::default()
                }
                Some(spec) => {
                    let mut opts = RootfsOptions::new(workdir, &target.architecture)
                        .compress(options.compress);
                    opts.cancel = unit.cancel_token().clone();
                    rootfs::build(spec, &opts, exporter)?
                }
                None => Rootfs::default(),
            };

            let args = [&options.args, &defaults.command, &target.command, &rootfs.command]
                .into_iter()
                .find(|a| !a.is_empty())
                .cloned()
                .unwrap_or_default();
            let mut env = defaults.env.clone();
            for (k, v) in &rootfs.env {
                env.entry(k.clone()).or_insert_with(|| v.clone());
            }

            let pack_opts = PackOptions {
                name: options.name.clone(),
                version: kernel_version(&target.kconfig).unwrap_or_else(|| options.version.clone()),
                initramfs: rootfs.path.clone(),
                args,
                env,
                labels: labels.clone(),
                no_kconfig: options.no_kconfig,
                strategy: options.strategy.for_target(index),
                output: options.output.clone(),
            };
            tracing::debug!("packing {} with strategy {}", target.name, pack_opts.strategy);
            let packages = backend
                .pack(target, &pack_opts)
                .map_err(|e| KraftError::external("package", &target.name, e))?;

            let mut packed = packed.lock().map_err(|_| anyhow::anyhow!("packaging state poisoned"))?;
            packed.packages.extend(packages);
            packed.initramfs.extend(rootfs.path);
            Ok(())
        }));
    }

    let options = ProcessOptions {
        fail_fast: true,
        ..ctx.options.process.clone()
    };
    ProcessModel::new(options)
        .with_cancel(ctx.options.cancel.clone())
        .run(phase)?;

    Ok(packed.into_inner().unwrap_or_else(|e| e.into_inner()))
}
