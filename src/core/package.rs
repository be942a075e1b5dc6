//! Packages as the catalog reports them.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::component::{type_name_version, ComponentType};
use crate::core::kconfig::KConfig;
use crate::core::target::Target;

/// A catalog entry.
///
/// The core never looks inside package bytes; `format` names the catalog
/// backend that knows how to pull, pack or push it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Package {
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(rename = "type")]
    pub kind: ComponentType,
    #[serde(default)]
    pub format: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub architecture: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    /// Kernel image path, relative to where the package is pulled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kernel: Option<PathBuf>,
    /// Initramfs path, relative to where the package is pulled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initramfs: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "KConfig::is_empty")]
    pub kconfig: KConfig,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub command: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    /// Where the package is already available on disk, if anywhere.
    #[serde(skip)]
    pub local_path: Option<PathBuf>,
}

impl Package {
    pub fn new(kind: ComponentType, name: impl Into<String>, version: impl Into<String>) -> Self {
        Package {
            name: name.into(),
            version: version.into(),
            kind,
            format: String::new(),
            source: None,
            architecture: None,
            platform: None,
            kernel: None,
            initramfs: None,
            kconfig: KConfig::new(),
            command: Vec::new(),
            env: BTreeMap::new(),
            labels: BTreeMap::new(),
            local_path: None,
        }
    }

    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = format.into();
        self
    }

    pub fn with_platarch(mut self, plat: impl Into<String>, arch: impl Into<String>) -> Self {
        self.platform = Some(plat.into());
        self.architecture = Some(arch.into());
        self
    }

    pub fn with_kernel(mut self, kernel: impl Into<PathBuf>) -> Self {
        self.kernel = Some(kernel.into());
        self
    }

    /// `type/name:version`
    pub fn label(&self) -> String {
        type_name_version(self.kind, &self.name, &self.version)
    }

    /// Whether this package carries enough metadata to stand in for a target.
    pub fn is_target(&self) -> bool {
        self.kernel.is_some() && self.architecture.is_some() && self.platform.is_some()
    }

    /// Reuse this package as a build target, with files found under `root`.
    pub fn as_target(&self, root: &Path) -> Option<Target> {
        let (kernel, arch, plat) = (
            self.kernel.as_ref()?,
            self.architecture.as_ref()?,
            self.platform.as_ref()?,
        );
        Some(Target {
            name: self.name.clone(),
            architecture: arch.clone(),
            platform: plat.clone(),
            kernel: crate::util::fs::resolve_against(root, kernel),
            kconfig: self.kconfig.clone(),
            command: self.command.clone(),
        })
    }
}

impl fmt::Display for Package {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())?;
        if let (Some(plat), Some(arch)) = (&self.platform, &self.architecture) {
            write!(f, " ({}/{})", plat, arch)?;
        }
        if !self.format.is_empty() {
            write!(f, " [{}]", self.format)?;
        }
        Ok(())
    }
}
