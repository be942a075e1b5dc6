//! Implementation of `kraftpack source`.
//!
//! Sources are index locations for the catalog. Adding or removing one
//! updates the running catalog and the global configuration file.

use std::path::Path;

use anyhow::{Context, Result};

use crate::catalog::PackageManager;
use crate::util::Config;

/// Register `source` with a compatible backend and persist it.
///
/// Returns `false` when the source was already configured.
pub fn add_source(config_path: &Path, catalog: &dyn PackageManager, source: &str) -> Result<bool> {
    catalog
        .add_source(source)
        .with_context(|| format!("could not add source {}", source))?;

    let mut config = Config::load_or_default(config_path);
    if config.catalog.sources.iter().any(|s| s == source) {
        return Ok(false);
    }
    config.catalog.sources.push(source.to_string());
    config.save(config_path)?;
    tracing::debug!("saved {} to {}", source, config_path.display());
    Ok(true)
}

/// Forget `source`. Returns `false` when it was not configured.
pub fn remove_source(config_path: &Path, catalog: &dyn PackageManager, source: &str) -> Result<bool> {
    catalog.remove_source(source)?;

    let mut config = Config::load_or_default(config_path);
    let before = config.catalog.sources.len();
    config.catalog.sources.retain(|s| s != source);
    if config.catalog.sources.len() == before {
        return Ok(false);
    }
    config.save(config_path)?;
    Ok(true)
}

pub fn list_sources(catalog: &dyn PackageManager) -> Vec<String> {
    catalog.sources()
}
