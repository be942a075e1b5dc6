//! Components: the named, versioned units of source a project depends on.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::core::kconfig::KConfig;

/// Directory under the workdir holding fetched components and build output.
pub const VENDOR_DIR: &str = ".unikraft";

/// Declared type of a component or package.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentType {
    App,
    Lib,
    Core,
    Template,
    Runtime,
}

impl ComponentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComponentType::App => "app",
            ComponentType::Lib => "lib",
            ComponentType::Core => "core",
            ComponentType::Template => "template",
            ComponentType::Runtime => "runtime",
        }
    }
}

impl fmt::Display for ComponentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ComponentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "app" | "application" => Ok(ComponentType::App),
            "lib" | "library" => Ok(ComponentType::Lib),
            "core" | "unikraft" => Ok(ComponentType::Core),
            "template" => Ok(ComponentType::Template),
            "runtime" => Ok(ComponentType::Runtime),
            _ => Err(format!("unknown component type '{}'", s)),
        }
    }
}

/// Where a component of `kind` named `name` lives inside `workdir`.
pub fn placement(workdir: &Path, kind: ComponentType, name: &str) -> PathBuf {
    let vendor = workdir.join(VENDOR_DIR);
    match kind {
        ComponentType::Core => vendor.join("unikraft"),
        ComponentType::Lib => vendor.join("libs").join(name),
        ComponentType::App | ComponentType::Template => vendor.join("apps").join(name),
        ComponentType::Runtime => vendor.join("runtimes").join(name),
    }
}

/// A declared dependency of a project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Component {
    pub name: String,
    pub version: String,
    /// Where the component comes from: a URL, a local directory, or nothing.
    pub source: Option<String>,
    pub kind: ComponentType,
    /// On-disk location once materialized.
    pub path: PathBuf,
    pub kconfig: KConfig,
}

impl Component {
    /// Create a component placed at its default location in `workdir`.
    ///
    /// A `source` naming an existing directory (relative to `workdir`) is used
    /// in place, making `path == source`.
    pub fn new(
        workdir: &Path,
        kind: ComponentType,
        name: impl Into<String>,
        version: impl Into<String>,
        source: Option<String>,
    ) -> Self {
        let name = name.into();
        let local = source
            .as_deref()
            .map(|s| crate::util::fs::resolve_against(workdir, s))
            .filter(|p| p.is_dir());

        let (path, source) = match local {
            Some(dir) => (dir.clone(), Some(dir.display().to_string())),
            None => (placement(workdir, kind, &name), source),
        };

        Component {
            name,
            version: version.into(),
            source,
            kind,
            path,
            kconfig: KConfig::new(),
        }
    }

    pub fn with_kconfig(mut self, kconfig: KConfig) -> Self {
        self.kconfig = kconfig;
        self
    }

    /// The developer has pointed this component at a local checkout.
    pub fn is_local_override(&self) -> bool {
        self.source
            .as_deref()
            .is_some_and(|s| Path::new(s) == self.path)
    }

    /// The component's directory already exists.
    pub fn is_materialized(&self) -> bool {
        self.path.is_dir()
    }

    /// Whether resolution has to go to the catalog for this component.
    pub fn needs_fetch(&self, force_pull: bool) -> bool {
        if self.is_local_override() {
            return false;
        }
        force_pull || !self.is_materialized()
    }

    /// `type/name:version`, used in messages and prompts.
    pub fn label(&self) -> String {
        type_name_version(self.kind, &self.name, &self.version)
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

pub fn type_name_version(kind: ComponentType, name: &str, version: &str) -> String {
    if version.is_empty() {
        format!("{}/{}", kind, name)
    } else {
        format!("{}/{}:{}", kind, name, version)
    }
}
