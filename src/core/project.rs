//! The loaded project model and template merging.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

use crate::core::component::{placement, Component, ComponentType, VENDOR_DIR};
use crate::core::kconfig::KConfig;
use crate::core::kraftfile::{find_kraftfile, ComponentSpec, Kraftfile, TargetSpec};
use crate::core::target::Target;

/// Build output directory inside the workdir.
pub fn build_dir(workdir: &Path) -> PathBuf {
    workdir.join(VENDOR_DIR).join("build")
}

/// Where the kernel for `plat/arch` of project `name` is linked.
pub fn kernel_path(workdir: &Path, name: &str, plat: &str, arch: &str) -> PathBuf {
    build_dir(workdir).join(format!("{}_{}-{}", name, plat, arch))
}

/// A project loaded from a Kraftfile.
#[derive(Debug, Clone)]
pub struct Project {
    pub name: String,
    pub workdir: PathBuf,
    pub kraftfile: PathBuf,
    /// The unikernel core (`unikraft:` in the Kraftfile).
    pub core: Option<Component>,
    pub template: Option<Component>,
    pub runtime: Option<Component>,
    pub libraries: Vec<Component>,
    pub targets: Vec<Target>,
    pub rootfs: Option<String>,
    pub command: Vec<String>,
    pub env: BTreeMap<String, String>,
    pub labels: BTreeMap<String, String>,
}

impl Project {
    /// Load the project whose Kraftfile lives in `workdir`.
    pub fn load(workdir: &Path) -> Result<Self> {
        let path = find_kraftfile(workdir)
            .with_context(|| format!("no Kraftfile found in {}", workdir.display()))?;
        let kraftfile = Kraftfile::load(&path)?;
        Self::from_kraftfile(workdir, &path, kraftfile)
    }

    /// Load if a Kraftfile is present; `Ok(None)` otherwise.
    pub fn load_optional(workdir: &Path) -> Result<Option<Self>> {
        match find_kraftfile(workdir) {
            Some(_) => Self::load(workdir).map(Some),
            None => Ok(None),
        }
    }

    pub fn from_kraftfile(workdir: &Path, path: &Path, kf: Kraftfile) -> Result<Self> {
        let name = kf
            .name
            .clone()
            .or_else(|| {
                workdir
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
            })
            .unwrap_or_else(|| "app".to_string());

        let component = |spec: &ComponentSpec, kind: ComponentType, default_name: &str| {
            let decl = spec.expand(kind);
            let name = decl.name.unwrap_or_else(|| default_name.to_string());
            Component::new(workdir, kind, name, decl.version, decl.source)
                .with_kconfig(decl.kconfig)
        };

        let core = kf
            .unikraft
            .as_ref()
            .map(|s| component(s, ComponentType::Core, "unikraft"));
        let template = kf
            .template
            .as_ref()
            .map(|s| component(s, ComponentType::Template, "template"));
        let runtime = kf
            .runtime
            .as_ref()
            .map(|s| component(s, ComponentType::Runtime, "base"));
        let libraries = kf
            .libraries
            .iter()
            .map(|(lib, spec)| component(spec, ComponentType::Lib, lib))
            .collect();

        let mut targets: Vec<Target> = Vec::with_capacity(kf.targets.len());
        for spec in &kf.targets {
            let target = target_from_spec(workdir, &name, spec)?;
            if targets.iter().any(|t| t.id() == target.id()) {
                bail!(
                    "duplicate target `{}` in {}",
                    target,
                    path.display()
                );
            }
            targets.push(target);
        }

        Ok(Project {
            workdir: workdir.to_path_buf(),
            kraftfile: path.to_path_buf(),
            core,
            template,
            runtime,
            libraries,
            targets,
            rootfs: kf.rootfs.filter(|r| !r.is_empty()),
            command: kf.cmd.map(|c| c.to_argv()).unwrap_or_default(),
            env: kf.env.to_map(),
            labels: kf.labels,
            name,
        })
    }

    /// Source components the core build depends on: the core, then libraries.
    pub fn components(&self) -> Vec<&Component> {
        self.core.iter().chain(self.libraries.iter()).collect()
    }

    /// The options a target is configured with: the core's, every library's,
    /// then the target's own, later entries overriding earlier ones.
    pub fn kconfig_for(&self, target: &Target) -> KConfig {
        let mut kconfig = KConfig::new();
        for component in self.components() {
            kconfig.extend_override(&component.kconfig);
        }
        kconfig.extend_override(&target.kconfig);
        kconfig
    }

    /// Union a resolved template project into this one.
    ///
    /// Whatever this project already declares wins; entries only the
    /// template has are added and re-placed into this project's workdir.
    pub fn merge_template(&mut self, template: Project) {
        let workdir = self.workdir.clone();
        let replace = |c: Component| -> Component {
            if c.is_local_override() {
                c
            } else {
                let path = placement(&workdir, c.kind, &c.name);
                Component { path, ..c }
            }
        };

        if self.core.is_none() {
            self.core = template.core.map(replace);
        }
        if self.runtime.is_none() {
            self.runtime = template.runtime;
        }

        for lib in template.libraries {
            if !self.libraries.iter().any(|l| l.name == lib.name) {
                self.libraries.push(replace(lib));
            }
        }

        for mut t in template.targets {
            if t.name == default_target_name(&template.name, &t.platform, &t.architecture) {
                t.name = default_target_name(&self.name, &t.platform, &t.architecture);
            }
            if !self.targets.iter().any(|own| own.id() == t.id()) {
                t.kernel = kernel_path(&self.workdir, &self.name, &t.platform, &t.architecture);
                self.targets.push(t);
            }
        }

        if self.rootfs.is_none() {
            self.rootfs = template.rootfs;
        }
        if self.command.is_empty() {
            self.command = template.command;
        }
        for (k, v) in template.env {
            self.env.entry(k).or_insert(v);
        }
        for (k, v) in template.labels {
            self.labels.entry(k).or_insert(v);
        }
    }
}

/// `<project>-<plat>-<arch>`, the name of a target that declares none.
fn default_target_name(project: &str, plat: &str, arch: &str) -> String {
    format!("{}-{}-{}", project, plat, arch)
}

fn target_from_spec(workdir: &Path, project: &str, spec: &TargetSpec) -> Result<Target> {
    let (name, arch, plat, kconfig, command) = match spec {
        TargetSpec::Short(s) => {
            let (plat, arch) = s
                .split_once('/')
                .with_context(|| format!("invalid target `{}`, expected `plat/arch`", s))?;
            (None, arch.to_string(), plat.to_string(), KConfig::new(), Vec::new())
        }
        TargetSpec::Full {
            name,
            architecture,
            platform,
            kconfig,
            cmd,
        } => (
            name.clone(),
            architecture.clone(),
            platform.clone(),
            kconfig.clone(),
            cmd.as_ref().map(|c| c.to_argv()).unwrap_or_default(),
        ),
    };

    Ok(Target {
        name: name.unwrap_or_else(|| default_target_name(project, &plat, &arch)),
        kernel: kernel_path(workdir, project, &plat, &arch),
        architecture: arch,
        platform: plat,
        kconfig,
        command,
    })
}
