//! CLI definitions using clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use kraftpack::core::{ComponentType, MergeStrategy, TargetConstraints};
use kraftpack::util::shell::ColorChoice;

/// kraftpack - resolve, fetch, build and package unikernels
#[derive(Parser)]
#[command(name = "kraftpack")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Only print errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Coloring: auto, always, never
    #[arg(long, global = true, default_value = "auto")]
    pub color: ColorChoice,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Fetch the project's components and build its unikernels
    Build(BuildArgs),

    /// Package built unikernels, a runtime or a prebuilt kernel
    Pkg(PkgArgs),

    /// Fetch a project's components, or a single package
    Pull(PullArgs),

    /// Build an initramfs from a directory, Dockerfile or archive
    Rootfs(RootfsArgs),

    /// Manage catalog sources
    Source(SourceArgs),

    /// Refresh the package catalog
    Update(UpdateArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

/// Which of the project's targets to act on.
#[derive(Args)]
pub struct TargetArgs {
    /// Architecture to select (e.g. x86_64, arm64)
    #[arg(short = 'm', long = "arch", default_value = "")]
    pub arch: String,

    /// Platform to select (e.g. qemu, fc, xen)
    #[arg(short, long = "plat", default_value = "")]
    pub plat: String,

    /// Target name; not combinable with --arch or --plat
    #[arg(short, long, default_value = "")]
    pub target: String,
}

impl TargetArgs {
    pub fn constraints(&self) -> TargetConstraints {
        TargetConstraints::new(&self.arch, &self.plat, &self.target)
    }
}

#[derive(Args)]
pub struct BuildArgs {
    /// Project directory
    #[arg(default_value = ".")]
    pub dir: PathBuf,

    #[command(flatten)]
    pub targets: TargetArgs,

    /// Number of make jobs
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Use every CPU for make
    #[arg(long)]
    pub fast: bool,

    /// Search and fetch one component at a time
    #[arg(long)]
    pub no_parallel: bool,

    /// Re-fetch components that are already present
    #[arg(long)]
    pub force_pull: bool,

    /// Ignore previously downloaded archives
    #[arg(long)]
    pub no_cache: bool,

    /// Do not refresh the catalog before resolving
    #[arg(long)]
    pub no_update: bool,

    /// Never ask; ambiguity becomes an error
    #[arg(long)]
    pub no_prompt: bool,

    /// Root filesystem overriding the project's
    #[arg(long)]
    pub rootfs: Option<String>,

    /// Environment variable to compile in (KEY=VALUE, or KEY to read it)
    #[arg(short, long)]
    pub env: Vec<String>,

    /// Write the make output to this file
    #[arg(long)]
    pub save_build_log: Option<PathBuf>,

    /// Print the build artifacts as JSON on stdout
    #[arg(long)]
    pub output_json: bool,
}

#[derive(Args)]
pub struct PkgArgs {
    /// Project directory
    #[arg(default_value = ".")]
    pub dir: PathBuf,

    /// Package name
    #[arg(short, long, default_value = "")]
    pub name: String,

    /// Package format
    #[arg(short = 'M', long, default_value = "archive")]
    pub format: String,

    #[command(flatten)]
    pub targets: TargetArgs,

    /// Prebuilt kernel to package when there is no project
    #[arg(short, long)]
    pub kernel: Option<PathBuf>,

    /// Root filesystem overriding the project's
    #[arg(long)]
    pub rootfs: Option<String>,

    /// Gzip the initramfs
    #[arg(long)]
    pub compress: bool,

    /// Arguments passed to the application
    #[arg(short, long, num_args = 1.., allow_hyphen_values = true)]
    pub args: Vec<String>,

    /// Environment variable (KEY=VALUE, or KEY to read it)
    #[arg(short, long)]
    pub env: Vec<String>,

    /// Label attached to the package (key=value)
    #[arg(short, long)]
    pub label: Vec<String>,

    /// What to do when the package already exists
    #[arg(short, long, default_value = "overwrite")]
    pub strategy: MergeStrategy,

    /// Push the packages after packing
    #[arg(long)]
    pub push: bool,

    /// Never ask; ambiguity becomes an error
    #[arg(long)]
    pub no_prompt: bool,

    /// Do not embed the kernel configuration
    #[arg(long)]
    pub no_kconfig: bool,

    /// Runtime to package with, as name[:version]
    #[arg(short, long)]
    pub runtime: Option<String>,

    /// Write the package here instead of the package store
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Args)]
pub struct PullArgs {
    /// Project directory or package, as name[:version]
    #[arg(default_value = ".")]
    pub subject: String,

    /// Architecture (defaults to the host's)
    #[arg(short = 'm', long, default_value = "")]
    pub arch: String,

    /// Platform (defaults to the host's)
    #[arg(short, long, default_value = "")]
    pub plat: String,

    /// Only consider packages of this type
    #[arg(long = "type")]
    pub kind: Option<ComponentType>,

    /// Re-fetch packages that are already present
    #[arg(long)]
    pub force_pull: bool,

    /// Ignore previously downloaded archives
    #[arg(long)]
    pub no_cache: bool,

    /// Do not default architecture and platform to the host's
    #[arg(long)]
    pub all: bool,

    /// Never ask; ambiguity becomes an error
    #[arg(long)]
    pub no_prompt: bool,
}

#[derive(Args)]
pub struct RootfsArgs {
    /// Directory, Dockerfile, cpio or tar archive
    pub spec: String,

    /// Architecture to build for (defaults to the host's)
    #[arg(short = 'm', long)]
    pub arch: Option<String>,

    /// Gzip the initramfs
    #[arg(long)]
    pub compress: bool,

    /// Where to write the initramfs
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Args)]
pub struct SourceArgs {
    #[command(subcommand)]
    pub command: SourceCommands,
}

#[derive(Subcommand)]
pub enum SourceCommands {
    /// Add a catalog index
    Add {
        /// Index URL or path
        uri: String,
    },

    /// Remove a catalog index
    Remove {
        /// Index URL or path
        uri: String,
    },

    /// List catalog indexes
    List,
}

#[derive(Args)]
pub struct UpdateArgs {
    /// Only update the catalog of this format
    #[arg(short = 'M', long)]
    pub format: Option<String>,
}

#[derive(Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
