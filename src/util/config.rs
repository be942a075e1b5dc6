//! Configuration file support for kraftpack.
//!
//! Two configuration file locations are read:
//! - Global: `<home>/config.toml` - User-wide defaults
//! - Project: `.kraftpack/config.toml` - Project-specific overrides
//!
//! Project config takes precedence over global config.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// kraftpack configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Build settings
    pub build: BuildConfig,

    /// Catalog settings
    pub catalog: CatalogConfig,

    /// Network settings
    pub net: NetConfig,

    /// Never ask the user to disambiguate; ambiguity becomes an error.
    pub no_prompt: bool,
}

/// Build-related configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Default number of parallel jobs (None = auto-detect)
    pub jobs: Option<usize>,

    /// Run search and fetch phases in parallel (default: true)
    pub parallel: Option<bool>,

    /// Progress rendering: "auto", "fancy" or "basic"
    pub render: Option<String>,
}

/// Catalog-related configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// Index sources (URLs or local paths)
    pub sources: Vec<String>,

    /// Skip refreshing the catalog before resolving
    pub no_update: bool,

    /// Reuse downloaded archives (default: true)
    pub cache: Option<bool>,

    /// Where `--push` publishes packages (URL or local directory)
    pub registry: Option<String>,
}

/// Network-related configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NetConfig {
    /// HTTP timeout in seconds
    pub timeout_secs: Option<u64>,
}

impl Config {
    /// Load configuration from a file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;

        toml::from_str(&contents)
            .with_context(|| format!("failed to parse config file: {}", path.display()))
    }

    /// Load configuration with fallback to defaults if file doesn't exist.
    pub fn load_or_default(path: &Path) -> Self {
        if path.exists() {
            Self::load(path).unwrap_or_else(|e| {
                tracing::warn!("Failed to load config from {}: {:#}", path.display(), e);
                Self::default()
            })
        } else {
            Self::default()
        }
    }

    /// Save configuration to a file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create config directory: {}", parent.display())
            })?;
        }

        let contents =
            toml::to_string_pretty(self).with_context(|| "failed to serialize config")?;

        std::fs::write(path, contents)
            .with_context(|| format!("failed to write config file: {}", path.display()))
    }

    /// Merge another config into this one (other takes precedence).
    pub fn merge(&mut self, other: Config) {
        if other.build.jobs.is_some() {
            self.build.jobs = other.build.jobs;
        }
        if other.build.parallel.is_some() {
            self.build.parallel = other.build.parallel;
        }
        if other.build.render.is_some() {
            self.build.render = other.build.render;
        }

        // Sources accumulate: project sources are searched after global ones.
        for source in other.catalog.sources {
            if !self.catalog.sources.contains(&source) {
                self.catalog.sources.push(source);
            }
        }
        if other.catalog.no_update {
            self.catalog.no_update = true;
        }
        if other.catalog.cache.is_some() {
            self.catalog.cache = other.catalog.cache;
        }
        if other.catalog.registry.is_some() {
            self.catalog.registry = other.catalog.registry;
        }

        if other.net.timeout_secs.is_some() {
            self.net.timeout_secs = other.net.timeout_secs;
        }
        if other.no_prompt {
            self.no_prompt = true;
        }
    }

    pub fn parallel(&self) -> bool {
        self.build.parallel.unwrap_or(true)
    }

    pub fn use_cache(&self) -> bool {
        self.catalog.cache.unwrap_or(true)
    }

    /// Whether progress should be drawn as live bars rather than log lines.
    pub fn render_fancy(&self, is_terminal: bool) -> bool {
        match self.build.render.as_deref() {
            Some("fancy") => true,
            Some("basic") => false,
            _ => is_terminal,
        }
    }
}

/// Load merged configuration from global and project locations.
///
/// Order of precedence (highest to lowest):
/// 1. Project config (.kraftpack/config.toml)
/// 2. Global config (<home>/config.toml)
/// 3. Defaults
pub fn load_config(global_path: &Path, project_path: &Path) -> Config {
    let mut config = Config::default();

    if global_path.exists() {
        config.merge(Config::load_or_default(global_path));
    }

    if project_path.exists() {
        config.merge(Config::load_or_default(project_path));
    }

    config
}

/// Get the project config path (.kraftpack/config.toml).
pub fn project_config_path(project_root: &Path) -> PathBuf {
    project_root.join(".kraftpack").join("config.toml")
}
