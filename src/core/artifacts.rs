//! The named outputs handed back to whoever invoked a build or packaging run.

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::Serialize;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Artifacts {
    /// Kernel images, one per built target.
    pub binaries: Vec<PathBuf>,
    pub initramfs: Vec<PathBuf>,
    /// Packages produced, as `type/name:version (plat/arch) [format]`.
    pub packages: Vec<String>,
    /// Kernel size in bytes, keyed by target name.
    pub statistics: BTreeMap<String, u64>,
}

impl Artifacts {
    pub fn is_empty(&self) -> bool {
        self.binaries.is_empty() && self.initramfs.is_empty() && self.packages.is_empty()
    }

    pub fn add_binary(&mut self, path: impl Into<PathBuf>) {
        let path = path.into();
        if !self.binaries.contains(&path) {
            self.binaries.push(path);
        }
    }

    pub fn add_initramfs(&mut self, path: impl Into<PathBuf>) {
        let path = path.into();
        if !self.initramfs.contains(&path) {
            self.initramfs.push(path);
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("failed to serialize artifacts")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_shape() {
        let mut artifacts = Artifacts::default();
        artifacts.add_binary("/w/.unikraft/build/app_qemu-x86_64");
        artifacts.add_binary("/w/.unikraft/build/app_qemu-x86_64");
        artifacts.statistics.insert("app-qemu-x86_64".into(), 1024);

        let json: serde_json::Value = serde_json::from_str(&artifacts.to_json().unwrap()).unwrap();
        assert_eq!(json["binaries"].as_array().unwrap().len(), 1);
        assert_eq!(json["statistics"]["app-qemu-x86_64"], 1024);
        assert!(json["packages"].as_array().unwrap().is_empty());
    }
}
