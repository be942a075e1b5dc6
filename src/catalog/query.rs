//! Catalog queries.

use std::fmt;

use crate::core::component::{type_name_version, Component, ComponentType};
use crate::core::kconfig::KConfig;
use crate::core::package::Package;

/// What to look for in a catalog. Empty fields match anything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogQuery {
    pub name: String,
    pub version: String,
    pub types: Vec<ComponentType>,
    pub source: Option<String>,
    pub architecture: Option<String>,
    pub platform: Option<String>,
    /// `KEY=VALUE` options a candidate must carry.
    pub kconfig: Vec<String>,
    /// Refresh from the remote catalog instead of the local view.
    pub remote: bool,
}

impl CatalogQuery {
    pub fn new(name: impl Into<String>) -> Self {
        CatalogQuery {
            name: name.into(),
            ..CatalogQuery::default()
        }
    }

    /// Query scoped to a declared component.
    pub fn for_component(component: &Component) -> Self {
        CatalogQuery::new(&component.name)
            .with_version(&component.version)
            .with_types([component.kind])
            .with_source(component.source.clone())
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn with_types(mut self, types: impl IntoIterator<Item = ComponentType>) -> Self {
        self.types = types.into_iter().collect();
        self
    }

    pub fn with_source(mut self, source: Option<String>) -> Self {
        self.source = source.filter(|s| !s.is_empty());
        self
    }

    pub fn with_architecture(mut self, arch: impl Into<String>) -> Self {
        self.architecture = Some(arch.into()).filter(|a: &String| !a.is_empty());
        self
    }

    pub fn with_platform(mut self, plat: impl Into<String>) -> Self {
        self.platform = Some(plat.into()).filter(|p: &String| !p.is_empty());
        self
    }

    pub fn with_kconfig(mut self, kconfig: impl IntoIterator<Item = String>) -> Self {
        self.kconfig = kconfig.into_iter().collect();
        self
    }

    pub fn remote(mut self, remote: bool) -> Self {
        self.remote = remote;
        self
    }

    /// Whether `pkg` satisfies every constraint of this query.
    ///
    /// Packages that do not declare an architecture, platform or source
    /// are treated as compatible with any.
    pub fn matches(&self, pkg: &Package) -> bool {
        if !self.name.is_empty() && pkg.name != self.name {
            return false;
        }
        if !self.version.is_empty() && !version_matches(&self.version, &pkg.version) {
            return false;
        }
        if !self.types.is_empty() && !self.types.contains(&pkg.kind) {
            return false;
        }
        let field = |want: &Option<String>, have: &Option<String>| match (want, have) {
            (Some(w), Some(h)) => w == h,
            _ => true,
        };
        if !field(&self.architecture, &pkg.architecture)
            || !field(&self.platform, &pkg.platform)
            || !field(&self.source, &pkg.source)
        {
            return false;
        }
        if !self.kconfig.is_empty() && !pkg.kconfig.is_empty() {
            let wanted: KConfig = self
                .kconfig
                .iter()
                .map(|kv| kv.split_once('=').unwrap_or((kv.as_str(), "y")))
                .collect();
            if !wanted.is_subset_of(&pkg.kconfig) {
                return false;
            }
        }
        true
    }
}

/// Exact match, or a semver requirement matched against a semver version.
fn version_matches(wanted: &str, have: &str) -> bool {
    if wanted == have {
        return true;
    }
    match (semver::VersionReq::parse(wanted), semver::Version::parse(have)) {
        (Ok(req), Ok(version)) => req.matches(&version),
        _ => false,
    }
}

impl fmt::Display for CatalogQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.types.as_slice() {
            [kind] => f.write_str(&type_name_version(*kind, &self.name, &self.version))?,
            _ if self.version.is_empty() => f.write_str(&self.name)?,
            _ => write!(f, "{}:{}", self.name, self.version)?,
        }
        match (&self.platform, &self.architecture) {
            (Some(p), Some(a)) => write!(f, " ({}/{})", p, a),
            (Some(p), None) => write!(f, " ({})", p),
            (None, Some(a)) => write!(f, " ({})", a),
            (None, None) => Ok(()),
        }
    }
}
