//! Implementation of `kraftpack update`.

use anyhow::{Context, Result};

use crate::catalog::PackageManager;

/// Refresh the catalog's view of every source.
pub fn update(catalog: &dyn PackageManager) -> Result<()> {
    tracing::info!("updating {} catalog", catalog.format());
    catalog
        .update()
        .context("could not update the package catalog")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::PackageManagerRegistry;
    use crate::test_support::MockPackageManager;

    #[test]
    fn test_updates_every_backend() {
        let manifest = MockPackageManager::new("manifest");
        let archive = MockPackageManager::new("archive");
        let (a, b) = (manifest.counters(), archive.counters());
        let registry = PackageManagerRegistry::new()
            .with(Box::new(manifest))
            .with(Box::new(archive));

        update(&registry).unwrap();
        assert_eq!((a.updates(), b.updates()), (1, 1));

        update(registry.from_format("archive").unwrap()).unwrap();
        assert_eq!((a.updates(), b.updates()), (1, 2));
    }
}
