//! The make driver: configures and compiles one target of a unikraft project.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

use crate::core::project::build_dir;
use crate::core::{KConfig, Project, Target};
use crate::scheduler::CancelToken;
use crate::util::fs::write_string;
use crate::util::process::{find_executable, ProcessBuilder};

/// Defconfig written into the workdir before `olddefconfig`.
pub const DEFCONFIG_FILE: &str = ".config.kraftpack";

#[derive(Debug, Clone, Default)]
pub struct MakeOptions {
    /// `-j` value; `None` leaves make single-jobbed.
    pub jobs: Option<usize>,
    /// Where make's combined output goes.
    pub log_file: Option<PathBuf>,
    pub cancel: CancelToken,
}

/// Configure and build calls against the unikraft build system.
///
/// Both calls may run for minutes and must return promptly once
/// `opts.cancel` trips.
pub trait MakeDriver: Send + Sync {
    fn configure(
        &self,
        project: &Project,
        target: &Target,
        extra: &KConfig,
        opts: &MakeOptions,
    ) -> Result<()>;

    fn build(&self, project: &Project, target: &Target, opts: &MakeOptions) -> Result<()>;

    fn is_available(&self) -> bool;
}

/// Drives `make` from `PATH`.
#[derive(Debug, Clone)]
pub struct MakeCli {
    make: Option<PathBuf>,
}

impl MakeCli {
    pub fn new() -> Self {
        MakeCli {
            make: find_executable("make"),
        }
    }

    fn command(&self, project: &Project, target: &Target) -> Result<ProcessBuilder> {
        let Some(make) = &self.make else {
            bail!("`make` not found in PATH");
        };
        let core = project
            .core
            .as_ref()
            .with_context(|| format!("project {} declares no unikraft core", project.name))?;

        let libs: Vec<String> = project
            .libraries
            .iter()
            .map(|l| l.path.display().to_string())
            .collect();

        let mut cmd = ProcessBuilder::new(make)
            .arg("-C")
            .arg(&core.path)
            .arg(format!("A={}", project.workdir.display()))
            .arg(format!("O={}", build_dir(&project.workdir).display()))
            .arg(format!("UK_ARCH={}", target.architecture));
        if !libs.is_empty() {
            cmd = cmd.arg(format!("L={}", libs.join(":")));
        }
        Ok(cmd.cwd(&project.workdir))
    }
}

impl Default for MakeCli {
    fn default() -> Self {
        Self::new()
    }
}

impl MakeDriver for MakeCli {
    fn configure(
        &self,
        project: &Project,
        target: &Target,
        extra: &KConfig,
        opts: &MakeOptions,
    ) -> Result<()> {
        let mut kconfig = project.kconfig_for(target);
        kconfig.extend_override(&platform_kconfig(&target.platform));
        kconfig.extend_override(extra);

        let defconfig = project.workdir.join(DEFCONFIG_FILE);
        write_defconfig(&defconfig, target, &kconfig)?;

        self.command(project, target)?
            .arg(format!("UK_DEFCONFIG={}", defconfig.display()))
            .arg("defconfig")
            .exec_cancellable(&opts.cancel, opts.log_file.as_deref())?;
        self.command(project, target)?
            .arg("olddefconfig")
            .exec_cancellable(&opts.cancel, opts.log_file.as_deref())
    }

    fn build(&self, project: &Project, target: &Target, opts: &MakeOptions) -> Result<()> {
        let mut cmd = self.command(project, target)?;
        if let Some(jobs) = opts.jobs {
            cmd = cmd.arg(format!("-j{}", jobs));
        }
        cmd.exec_cancellable(&opts.cancel, opts.log_file.as_deref())
    }

    fn is_available(&self) -> bool {
        self.make.is_some()
    }
}

/// Platform selection options for a kraft platform name.
fn platform_kconfig(platform: &str) -> KConfig {
    let option = match platform {
        "qemu" | "fc" | "firecracker" | "kvm" => "CONFIG_PLAT_KVM",
        "xen" => "CONFIG_PLAT_XEN",
        "linuxu" => "CONFIG_PLAT_LINUXU",
        _ => return KConfig::new(),
    };
    [(option, "y")].into_iter().collect()
}

fn write_defconfig(path: &Path, target: &Target, kconfig: &KConfig) -> Result<()> {
    let mut contents = format!("# {} ({})\n", target.name, target.platarch());
    contents.push_str(&kconfig.to_string());
    write_string(path, &contents)
        .with_context(|| format!("failed to write defconfig for {}", target.name))
}
