//! Dependency resolution: find what a project is missing and fetch it.
//!
//! Resolution never backtracks. Each missing component becomes one catalog
//! lookup that must yield exactly one package (or a human choice among
//! several); the chosen packages are then pulled in one fetch phase.
//!
//! Lookups run as a search phase and pulls as an action phase on a fresh
//! [`ProcessModel`], so both honour the parallelism, fail-fast and
//! cancellation settings in [`ResolveOptions`].

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::Result;

use crate::catalog::policy::{choose_one, search};
use crate::catalog::{CatalogQuery, PackageManager, PullOptions};
use crate::core::errors::KraftError;
use crate::core::kraftfile::find_kraftfile;
use crate::core::{Component, Package, Project, Target};
use crate::scheduler::{CancelToken, Phase, ProcessModel, ProcessOptions, UnitOutcome, WorkUnit};
use crate::util::prompt::Prompter;

/// Settings for one resolution run.
#[derive(Clone)]
pub struct ResolveOptions<'a> {
    /// Re-fetch components that are already on disk.
    pub force_pull: bool,
    /// Reuse previously downloaded archives.
    pub use_cache: bool,
    /// Who to ask when a lookup is ambiguous. `None` makes ambiguity an error.
    pub prompter: Option<&'a dyn Prompter>,
    pub process: ProcessOptions,
    pub cancel: CancelToken,
}

impl Default for ResolveOptions<'_> {
    fn default() -> Self {
        ResolveOptions {
            force_pull: false,
            use_cache: true,
            prompter: None,
            process: ProcessOptions::default(),
            cancel: CancelToken::new(),
        }
    }
}

/// A catalog lookup for one named subject.
#[derive(Debug, Clone)]
pub struct Lookup {
    /// How the subject is named in errors, e.g. `lib/musl:stable`.
    pub label: String,
    pub query: CatalogQuery,
}

/// A package chosen for a subject, and where it goes.
#[derive(Debug, Clone)]
pub struct FetchItem {
    pub label: String,
    pub package: Package,
    pub destination: PathBuf,
}

/// What a resolution (or a best-effort fetch) did.
#[derive(Debug, Default)]
pub struct Resolution {
    pub fetched: Vec<Package>,
    /// Subjects dropped in best-effort mode.
    pub skipped: Vec<String>,
}

pub struct DependencyResolver<'a> {
    catalog: &'a dyn PackageManager,
    options: ResolveOptions<'a>,
}

impl<'a> DependencyResolver<'a> {
    pub fn new(catalog: &'a dyn PackageManager, options: ResolveOptions<'a>) -> Self {
        DependencyResolver { catalog, options }
    }

    fn model(&self) -> ProcessModel {
        ProcessModel::new(self.options.process.clone()).with_cancel(self.options.cancel.clone())
    }

    /// Bring every declared component of `project` onto disk.
    ///
    /// A declared template is resolved first and merged into the project,
    /// so the components it contributes are resolved too.
    pub fn resolve(&self, project: &mut Project, targets: &[Target]) -> Result<Resolution> {
        let mut resolution = Resolution::default();

        if let Some(template) = project.template.clone() {
            if template.needs_fetch(self.options.force_pull) {
                let fetched = self.fetch_components(&project.workdir, &[&template], targets)?;
                resolution.fetched.extend(fetched.fetched);
                resolution.skipped.extend(fetched.skipped);
            }
            self.merge_template(project, &template)?;
        }

        let missing: Vec<&Component> = project
            .components()
            .into_iter()
            .filter(|c| c.needs_fetch(self.options.force_pull))
            .collect();
        if missing.is_empty() {
            tracing::debug!("all components of {} are present", project.name);
            return Ok(resolution);
        }

        let fetched = self.fetch_components(&project.workdir, &missing, targets)?;
        resolution.fetched.extend(fetched.fetched);
        resolution.skipped.extend(fetched.skipped);
        Ok(resolution)
    }

    fn merge_template(&self, project: &mut Project, template: &Component) -> Result<()> {
        if find_kraftfile(&template.path).is_none() {
            tracing::warn!(
                "template {} has no Kraftfile at {}",
                template.label(),
                template.path.display()
            );
            return Ok(());
        }
        let loaded = Project::load(&template.path)?;
        tracing::debug!("merging template {} into {}", template.label(), project.name);
        project.merge_template(loaded);
        Ok(())
    }

    fn fetch_components(
        &self,
        workdir: &Path,
        components: &[&Component],
        targets: &[Target],
    ) -> Result<Resolution> {
        let lookups = components
            .iter()
            .map(|c| Lookup {
                label: c.label(),
                query: query_for(c, targets),
            })
            .collect();
        let (found, skipped) = self.lookup(lookups)?;

        let items = found
            .into_iter()
            .filter_map(|(label, package)| {
                let component = components.iter().find(|c| c.label() == label)?;
                Some(FetchItem {
                    label,
                    package,
                    destination: component.path.clone(),
                })
            })
            .collect();

        let mut resolution = self.fetch(workdir, items)?;
        resolution.skipped.splice(0..0, skipped);
        Ok(resolution)
    }

    /// Run `lookups` as one search phase and pick one package for each.
    ///
    /// Returns the choices and, in best-effort mode, the labels of lookups
    /// that failed.
    pub fn lookup(&self, lookups: Vec<Lookup>) -> Result<(Vec<(String, Package)>, Vec<String>)> {
        let results: Mutex<Vec<Option<Vec<Package>>>> = Mutex::new(vec![None; lookups.len()]);

        let mut phase = Phase::search("searching");
        for (index, lookup) in lookups.iter().enumerate() {
            let results = &results;
            let catalog = self.catalog;
            phase.push(WorkUnit::new(lookup.label.clone(), move |ctx| {
                ctx.check_cancelled()?;
                let candidates = search(catalog, &lookup.query)?;
                if candidates.is_empty() {
                    return Err(KraftError::ResolutionNotFound {
                        component: lookup.label.clone(),
                    }
                    .into());
                }
                ctx.report(1.0);
                if let Ok(mut results) = results.lock() {
                    results[index] = Some(candidates);
                }
                Ok(())
            }));
        }

        let report = self.model().run(phase)?;
        let mut skipped = Vec::new();
        for (name, err) in report.failures() {
            tracing::warn!("skipping {}: {:#}", name, err);
            skipped.push(name.to_string());
        }

        let results = results.into_inner().unwrap_or_else(|e| e.into_inner());
        let mut found = Vec::new();
        for (lookup, candidates) in lookups.into_iter().zip(results) {
            let Some(candidates) = candidates else {
                continue;
            };
            let package = choose_one(candidates, &lookup.label, self.options.prompter)?;
            tracing::debug!("{} resolved to {}", lookup.label, package);
            found.push((lookup.label, package));
        }
        Ok((found, skipped))
    }

    /// Pull every item as one fetch phase.
    pub fn fetch(&self, workdir: &Path, items: Vec<FetchItem>) -> Result<Resolution> {
        if items.is_empty() {
            return Ok(Resolution::default());
        }

        let mut phase = Phase::action("pulling");
        for item in &items {
            let catalog = self.catalog;
            let use_cache = self.options.use_cache;
            phase.push(WorkUnit::new(item.label.clone(), move |ctx| {
                let opts = PullOptions::new(workdir)
                    .use_cache(use_cache)
                    .destination(&item.destination)
                    .cancel(ctx.cancel_token().clone())
                    .progress(ctx.progress().clone());
                catalog.pull(&item.package, &opts)
            }));
        }

        let report = self.model().run(phase)?;
        let mut resolution = Resolution::default();
        for (item, unit) in items.into_iter().zip(report.units.iter()) {
            match &unit.outcome {
                UnitOutcome::Succeeded => resolution.fetched.push(item.package),
                UnitOutcome::Failed(err) => {
                    tracing::warn!("could not pull {}: {:#}", item.label, err);
                    resolution.skipped.push(item.label);
                }
                UnitOutcome::Skipped => resolution.skipped.push(item.label),
            }
        }
        Ok(resolution)
    }
}

/// The query for a declared component. Platform and architecture hints are
/// only added when a single target is being resolved.
pub fn query_for(component: &Component, targets: &[Target]) -> CatalogQuery {
    let query = CatalogQuery::for_component(component);
    match targets {
        [target] => query
            .with_architecture(&target.architecture)
            .with_platform(&target.platform),
        _ => query,
    }
}
