//! On-disk Kraftfile schema.
//!
//! These types mirror the YAML document; `core::project` turns them into the
//! resolved [`Project`](crate::core::project::Project) model.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::core::component::ComponentType;
use crate::core::kconfig::KConfig;
use crate::util::diagnostic::KraftfileParseError;

/// File names recognised as a project specification, in lookup order.
pub const KRAFTFILE_NAMES: &[&str] = &[
    "Kraftfile",
    "Kraftfile.yaml",
    "Kraftfile.yml",
    "kraft.yaml",
    "kraft.yml",
];

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Kraftfile {
    pub spec: Option<String>,
    pub name: Option<String>,
    pub unikraft: Option<ComponentSpec>,
    pub template: Option<ComponentSpec>,
    pub runtime: Option<ComponentSpec>,
    pub rootfs: Option<String>,
    pub cmd: Option<CommandSpec>,
    pub env: EnvSpec,
    pub labels: BTreeMap<String, String>,
    pub libraries: BTreeMap<String, ComponentSpec>,
    pub targets: Vec<TargetSpec>,
}

/// A component given either as a short string or as a full table.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ComponentSpec {
    Short(String),
    Full {
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        version: Option<String>,
        #[serde(default)]
        source: Option<String>,
        #[serde(default)]
        kconfig: KConfig,
    },
}

/// Fully expanded component declaration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ComponentDecl {
    pub name: Option<String>,
    pub version: String,
    pub source: Option<String>,
    pub kconfig: KConfig,
}

impl ComponentSpec {
    /// Expand a short form.
    ///
    /// URLs and paths become the source. `name:version` splits. A bare word
    /// is a version for cores and libraries and a name for everything else.
    pub fn expand(&self, kind: ComponentType) -> ComponentDecl {
        match self {
            ComponentSpec::Full {
                name,
                version,
                source,
                kconfig,
            } => ComponentDecl {
                name: name.clone(),
                version: version.clone().unwrap_or_default(),
                source: source.clone(),
                kconfig: kconfig.clone(),
            },
            ComponentSpec::Short(s) if looks_like_source(s) => ComponentDecl {
                source: Some(s.clone()),
                ..ComponentDecl::default()
            },
            ComponentSpec::Short(s) => match s.split_once(':') {
                Some((name, version)) => ComponentDecl {
                    name: Some(name.to_string()),
                    version: version.to_string(),
                    ..ComponentDecl::default()
                },
                None if matches!(kind, ComponentType::Core | ComponentType::Lib) => ComponentDecl {
                    version: s.clone(),
                    ..ComponentDecl::default()
                },
                None => ComponentDecl {
                    name: Some(s.clone()),
                    ..ComponentDecl::default()
                },
            },
        }
    }
}

fn looks_like_source(s: &str) -> bool {
    s.contains("://") || s.starts_with('.') || s.starts_with('/') || s.starts_with('~')
}

/// `cmd` given as a shell-like string or an argv list.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum CommandSpec {
    Line(String),
    Argv(Vec<String>),
}

impl CommandSpec {
    pub fn to_argv(&self) -> Vec<String> {
        match self {
            CommandSpec::Line(line) => line.split_whitespace().map(str::to_string).collect(),
            CommandSpec::Argv(argv) => argv.clone(),
        }
    }
}

/// `env` given as a map or a `KEY=VALUE` list. A missing value is read
/// from the host environment at build time.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(untagged)]
pub enum EnvSpec {
    #[default]
    #[serde(skip)]
    Empty,
    Map(BTreeMap<String, Option<String>>),
    List(Vec<String>),
}

impl EnvSpec {
    pub fn to_map(&self) -> BTreeMap<String, String> {
        let entries: Vec<(String, Option<String>)> = match self {
            EnvSpec::Empty => Vec::new(),
            EnvSpec::Map(map) => map.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            EnvSpec::List(list) => list
                .iter()
                .map(|item| match item.split_once('=') {
                    Some((k, v)) => (k.to_string(), Some(v.to_string())),
                    None => (item.clone(), None),
                })
                .collect(),
        };

        entries
            .into_iter()
            .map(|(k, v)| match v.filter(|v| !v.is_empty()) {
                Some(v) => (k, v),
                None => {
                    let host = std::env::var(&k).unwrap_or_default();
                    (k, host)
                }
            })
            .collect()
    }
}

/// A target given as `plat/arch` or as a table.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TargetSpec {
    Short(String),
    Full {
        #[serde(default)]
        name: Option<String>,
        #[serde(alias = "arch")]
        architecture: String,
        #[serde(alias = "plat")]
        platform: String,
        #[serde(default)]
        kconfig: KConfig,
        #[serde(default)]
        cmd: Option<CommandSpec>,
    },
}

/// Locate the Kraftfile in `dir`.
pub fn find_kraftfile(dir: &Path) -> Option<PathBuf> {
    KRAFTFILE_NAMES
        .iter()
        .map(|name| dir.join(name))
        .find(|p| p.is_file())
}

impl Kraftfile {
    pub fn parse(path: &Path, contents: &str) -> Result<Self> {
        serde_yaml::from_str(contents)
            .map_err(|e| anyhow::Error::new(KraftfileParseError::new(path, contents, &e)))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = crate::util::fs::read_to_string(path)?;
        Self::parse(path, &contents)
            .with_context(|| format!("failed to load project from {}", path.display()))
    }
}
