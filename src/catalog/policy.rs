//! How query results become a single package.
//!
//! A query first runs against the local view of the catalog; only an empty
//! answer triggers a second, remote query. Exactly one candidate is
//! accepted, none is [`KraftError::ResolutionNotFound`], and several need a
//! human choice or fail as [`KraftError::ResolutionAmbiguous`].

use anyhow::Result;

use crate::catalog::manager::PackageManager;
use crate::catalog::query::CatalogQuery;
use crate::core::errors::KraftError;
use crate::core::package::Package;
use crate::util::prompt::Prompter;

/// Query locally, then remotely if nothing was found.
pub fn search(pm: &dyn PackageManager, query: &CatalogQuery) -> Result<Vec<Package>> {
    let local = query.clone().remote(false);
    let found = pm.catalog(&local)?;
    if !found.is_empty() {
        return Ok(found);
    }

    tracing::debug!("{} not found locally, querying remote catalog", query);
    pm.catalog(&query.clone().remote(true))
}

/// Reduce candidates for `subject` to one.
pub fn choose_one(
    mut candidates: Vec<Package>,
    subject: &str,
    prompter: Option<&dyn Prompter>,
) -> Result<Package> {
    match candidates.len() {
        0 => Err(KraftError::ResolutionNotFound {
            component: subject.to_string(),
        }
        .into()),
        1 => Ok(candidates.remove(0)),
        _ => match prompter {
            Some(prompter) => {
                let options: Vec<String> = candidates.iter().map(|p| p.to_string()).collect();
                let index = prompter.select(&format!("select package for {}", subject), &options)?;
                Ok(candidates.swap_remove(index))
            }
            None => Err(KraftError::ResolutionAmbiguous {
                component: subject.to_string(),
                candidates: candidates.iter().map(|p| p.to_string()).collect(),
            }
            .into()),
        },
    }
}

/// [`search`] followed by [`choose_one`], naming `query` in errors.
pub fn resolve_one(
    pm: &dyn PackageManager,
    query: &CatalogQuery,
    prompter: Option<&dyn Prompter>,
) -> Result<Package> {
    let candidates = search(pm, query)?;
    choose_one(candidates, &query.to_string(), prompter)
}
