//! Implementation of `kraftpack pull`.
//!
//! Pulling is best effort: a component that cannot be found or fetched is
//! reported and skipped, and the run goes on with the rest.

use std::path::PathBuf;

use anyhow::Result;

use crate::catalog::{CatalogQuery, PackageManager};
use crate::core::component::placement;
use crate::core::kraftfile::find_kraftfile;
use crate::core::target::filter;
use crate::core::{ComponentType, Project, TargetConstraints};
use crate::resolver::{DependencyResolver, FetchItem, Lookup, ResolveOptions, Resolution};
use crate::scheduler::{CancelToken, ProcessOptions};
use crate::util::fs::resolve_against;
use crate::util::prompt::Prompter;

pub struct PullRequest<'a> {
    pub workdir: PathBuf,
    /// A project directory, or `name[:version]`.
    pub subject: String,
    pub architecture: String,
    pub platform: String,
    pub kind: Option<ComponentType>,
    /// Do not default architecture and platform to the host's.
    pub all: bool,
    pub force_pull: bool,
    pub use_cache: bool,
    pub prompter: Option<&'a dyn Prompter>,
    pub process: ProcessOptions,
    pub cancel: CancelToken,
}

impl<'a> PullRequest<'a> {
    pub fn new(workdir: impl Into<PathBuf>, subject: impl Into<String>) -> Self {
        PullRequest {
            workdir: workdir.into(),
            subject: subject.into(),
            architecture: String::new(),
            platform: String::new(),
            kind: None,
            all: false,
            force_pull: false,
            use_cache: true,
            prompter: None,
            process: ProcessOptions::default(),
            cancel: CancelToken::new(),
        }
    }

    fn constraints(&self) -> TargetConstraints {
        let or_host = |value: &str, host: fn() -> String| {
            if value.is_empty() && !self.all {
                host()
            } else {
                value.to_string()
            }
        };
        TargetConstraints::new(
            or_host(&self.architecture, host_architecture),
            or_host(&self.platform, host_platform),
            "",
        )
    }
}

/// The host CPU under its unikraft architecture name.
pub fn host_architecture() -> String {
    match std::env::consts::ARCH {
        "aarch64" => "arm64",
        "x86" => "x86_32",
        other => other,
    }
    .to_string()
}

/// The platform a host kernel runs unikernels on.
pub fn host_platform() -> String {
    match std::env::consts::OS {
        "linux" => "qemu",
        other => other,
    }
    .to_string()
}

/// Pull a project's missing components, or a single named package.
pub fn pull(catalog: &dyn PackageManager, request: &PullRequest<'_>) -> Result<Resolution> {
    let constraints = request.constraints();
    let resolver = DependencyResolver::new(
        catalog,
        ResolveOptions {
            force_pull: request.force_pull,
            use_cache: request.use_cache,
            prompter: request.prompter,
            process: ProcessOptions {
                fail_fast: false,
                ..request.process.clone()
            },
            cancel: request.cancel.clone(),
        },
    );

    let dir = resolve_against(&request.workdir, &request.subject);
    let resolution = if dir.is_dir() && find_kraftfile(&dir).is_some() {
        let mut project = Project::load(&dir)?;
        let hinted = filter(&project.targets, &constraints)?;
        tracing::info!("pulling components of {}", project.name);
        resolver.resolve(&mut project, &hinted)?
    } else {
        let (name, version) = request
            .subject
            .split_once(':')
            .unwrap_or((request.subject.as_str(), ""));
        let query = CatalogQuery::new(name)
            .with_version(version)
            .with_types(request.kind)
            .with_architecture(&constraints.architecture)
            .with_platform(&constraints.platform);
        let lookup = Lookup {
            label: query.to_string(),
            query,
        };

        let (found, skipped) = resolver.lookup(vec![lookup])?;
        let items = found
            .into_iter()
            .map(|(label, package)| FetchItem {
                label,
                destination: placement(&request.workdir, package.kind, &package.name),
                package,
            })
            .collect();
        let mut resolution = resolver.fetch(&request.workdir, items)?;
        resolution.skipped.splice(0..0, skipped);
        resolution
    };

    if !resolution.skipped.is_empty() {
        tracing::warn!(
            "skipped {} component(s): {}",
            resolution.skipped.len(),
            resolution.skipped.join(", ")
        );
    }
    Ok(resolution)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Package;
    use crate::test_support::{materialize, write_kraftfile, MockPackageManager, UNIKRAFT_KRAFTFILE};
    use tempfile::TempDir;

    fn musl() -> Package {
        Package::new(ComponentType::Lib, "musl", "stable")
    }

    #[test]
    fn test_named_package_lands_in_workdir() {
        let tmp = TempDir::new().unwrap();
        let pm = MockPackageManager::new("manifest")
            .with_remote(vec![musl()])
            .materialize();
        let counters = pm.counters();

        let mut request = PullRequest::new(tmp.path(), "musl:stable");
        request.all = true;
        let resolution = pull(&pm, &request).unwrap();

        assert_eq!(resolution.fetched.len(), 1);
        assert!(resolution.skipped.is_empty());
        assert_eq!(counters.pulled(), vec!["lib/musl:stable"]);
        assert!(tmp.path().join(".unikraft/libs/musl/.pulled").is_file());
    }

    #[test]
    fn test_unknown_package_is_skipped() {
        let tmp = TempDir::new().unwrap();
        let pm = MockPackageManager::new("manifest");
        let mut request = PullRequest::new(tmp.path(), "nothing");
        request.all = true;

        let resolution = pull(&pm, &request).unwrap();
        assert!(resolution.fetched.is_empty());
        assert_eq!(resolution.skipped, vec!["nothing"]);
    }

    #[test]
    fn test_project_pull_is_best_effort() {
        let tmp = TempDir::new().unwrap();
        write_kraftfile(tmp.path(), UNIKRAFT_KRAFTFILE);
        materialize(&tmp.path().join(".unikraft/unikraft"));
        let pm = MockPackageManager::new("manifest")
            .with_remote(vec![musl()])
            .failing_pull("musl");

        let mut request = PullRequest::new(tmp.path(), ".");
        request.all = true;
        let resolution = pull(&pm, &request).unwrap();
        assert!(resolution.fetched.is_empty());
        assert_eq!(resolution.skipped, vec!["lib/musl:stable"]);
    }

    #[test]
    fn test_type_narrows_named_lookup() {
        let tmp = TempDir::new().unwrap();
        let pm = MockPackageManager::new("manifest")
            .with_remote(vec![musl(), Package::new(ComponentType::App, "musl", "stable")])
            .materialize();
        let mut request = PullRequest::new(tmp.path(), "musl");
        request.all = true;
        request.kind = Some(ComponentType::App);

        let resolution = pull(&pm, &request).unwrap();
        assert_eq!(resolution.fetched.len(), 1);
        assert_eq!(resolution.fetched[0].kind, ComponentType::App);
    }

    #[test]
    fn test_host_defaults_unless_all() {
        let request = PullRequest::new("/tmp", "musl");
        let c = request.constraints();
        assert_eq!(c.architecture, host_architecture());
        assert_eq!(c.platform, host_platform());

        let mut request = PullRequest::new("/tmp", "musl");
        request.all = true;
        request.platform = "fc".into();
        let c = request.constraints();
        assert!(c.architecture.is_empty());
        assert_eq!(c.platform, "fc");
    }
}
