//! Catalog client: package managers, queries and the lookup policy.

pub mod archive;
pub mod manager;
pub mod manifest;
pub mod policy;
pub mod query;
pub mod registry;

use std::time::Duration;

use anyhow::Result;

pub use archive::ArchiveManager;
pub use manager::{PackOptions, PackageManager, PullOptions};
pub use manifest::ManifestManager;
pub use query::CatalogQuery;
pub use registry::PackageManagerRegistry;

use crate::util::GlobalContext;

/// Build the registry of every catalog backend, configured from `ctx`.
pub fn default_registry(ctx: &GlobalContext) -> Result<PackageManagerRegistry> {
    let config = ctx.config();
    let timeout = config.net.timeout_secs.map(Duration::from_secs);
    let cache = ctx.cache_dir();

    let manifest = ManifestManager::new(config.catalog.sources.clone(), &cache, timeout)?;
    let archive = ArchiveManager::new(&cache, config.catalog.registry.clone(), timeout)?;

    Ok(PackageManagerRegistry::new()
        .with(Box::new(manifest))
        .with(Box::new(archive)))
}
