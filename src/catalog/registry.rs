//! Registry of catalog backends, keyed by format.
//!
//! Built once per invocation and passed by reference; there is no global
//! registration. The registry is itself a [`PackageManager`] that fans
//! queries out to every backend and routes package operations by format.

use anyhow::{bail, Result};

use crate::catalog::manager::{PackOptions, PackageManager, PullOptions};
use crate::catalog::query::CatalogQuery;
use crate::core::errors::KraftError;
use crate::core::package::Package;
use crate::core::target::Target;

/// Ordered collection of package managers. Earlier backends are searched first.
#[derive(Default)]
pub struct PackageManagerRegistry {
    managers: Vec<Box<dyn PackageManager>>,
}

impl PackageManagerRegistry {
    pub fn new() -> Self {
        PackageManagerRegistry::default()
    }

    /// Register a backend; a later one with the same format replaces it.
    pub fn register(&mut self, manager: Box<dyn PackageManager>) {
        self.managers.retain(|m| m.format() != manager.format());
        self.managers.push(manager);
    }

    pub fn with(mut self, manager: Box<dyn PackageManager>) -> Self {
        self.register(manager);
        self
    }

    /// The backend for `format`.
    pub fn from_format(&self, format: &str) -> Result<&dyn PackageManager> {
        self.managers
            .iter()
            .find(|m| m.format() == format)
            .map(|m| m.as_ref())
            .ok_or_else(|| {
                KraftError::StrategyUnavailable {
                    action: format!("handle package format '{}'", format),
                    reasons: vec![format!("registered formats: {}", self.formats().join(", "))],
                }
                .into()
            })
    }

    pub fn formats(&self) -> Vec<&str> {
        self.managers.iter().map(|m| m.format()).collect()
    }

    pub fn len(&self) -> usize {
        self.managers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.managers.is_empty()
    }

    fn for_package(&self, pkg: &Package) -> Result<&dyn PackageManager> {
        if pkg.format.is_empty() {
            bail!("package {} does not name a format", pkg);
        }
        self.from_format(&pkg.format)
    }
}

impl PackageManager for PackageManagerRegistry {
    fn format(&self) -> &str {
        "all"
    }

    fn catalog(&self, query: &CatalogQuery) -> Result<Vec<Package>> {
        let mut found = Vec::new();
        for manager in &self.managers {
            let packages = manager
                .catalog(query)
                .map_err(|e| KraftError::external("catalog query", format!("{} ({})", query, manager.format()), e))?;
            tracing::debug!(
                "{} catalog returned {} result(s) for {}{}",
                manager.format(),
                packages.len(),
                query,
                if query.remote { " (remote)" } else { "" }
            );
            found.extend(packages);
        }
        Ok(found)
    }

    fn pull(&self, pkg: &Package, opts: &PullOptions) -> Result<()> {
        self.for_package(pkg)?
            .pull(pkg, opts)
            .map_err(|e| KraftError::external("pull", pkg.label(), e))
    }

    fn push(&self, pkg: &Package) -> Result<()> {
        self.for_package(pkg)?
            .push(pkg)
            .map_err(|e| KraftError::external("push", pkg.label(), e))
    }

    fn update(&self) -> Result<()> {
        for manager in &self.managers {
            manager
                .update()
                .map_err(|e| KraftError::external("catalog update", manager.format(), e))?;
        }
        Ok(())
    }

    fn add_source(&self, source: &str) -> Result<()> {
        match self.managers.iter().find(|m| m.is_compatible(source)) {
            Some(manager) => manager.add_source(source),
            None => bail!("no package manager is compatible with source: {}", source),
        }
    }

    fn remove_source(&self, source: &str) -> Result<()> {
        for manager in &self.managers {
            manager.remove_source(source)?;
        }
        Ok(())
    }

    fn pack(&self, _target: &Target, _opts: &PackOptions) -> Result<Vec<Package>> {
        bail!("a package format must be selected before packaging")
    }

    fn is_compatible(&self, source: &str) -> bool {
        self.managers.iter().any(|m| m.is_compatible(source))
    }

    fn sources(&self) -> Vec<String> {
        let mut all: Vec<String> = Vec::new();
        for source in self.managers.iter().flat_map(|m| m.sources()) {
            if !all.contains(&source) {
                all.push(source);
            }
        }
        all
    }
}
