//! Global context for kraftpack operations.
//!
//! Provides centralized access to configuration, paths, and environment.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use anyhow::{Context, Result};
use directories::ProjectDirs;

use crate::util::config::{load_config, project_config_path, Config};

/// Environment variable overriding the kraftpack home directory.
pub const HOME_ENV: &str = "KRAFTPACK_HOME";

/// Project directories for kraftpack
static PROJECT_DIRS: LazyLock<Option<ProjectDirs>> =
    LazyLock::new(|| ProjectDirs::from("sh", "kraftpack", "kraftpack"));

/// Global context containing configuration and paths.
#[derive(Debug, Clone)]
pub struct GlobalContext {
    /// Current working directory
    cwd: PathBuf,

    /// Home directory for global kraftpack data
    home: PathBuf,

    /// Merged global and project configuration
    config: Config,
}

impl GlobalContext {
    /// Create a new GlobalContext rooted at the process working directory.
    pub fn new() -> Result<Self> {
        let cwd = std::env::current_dir().context("failed to get current directory")?;
        Self::with_cwd(cwd)
    }

    /// Create a GlobalContext with a specific working directory.
    pub fn with_cwd(cwd: PathBuf) -> Result<Self> {
        let home = match std::env::var_os(HOME_ENV) {
            Some(dir) if !dir.is_empty() => PathBuf::from(dir),
            _ => match PROJECT_DIRS.as_ref() {
                Some(dirs) => dirs.cache_dir().to_path_buf(),
                None => cwd.join(".kraftpack-home"),
            },
        };

        let config = load_config(&home.join("config.toml"), &project_config_path(&cwd));

        Ok(GlobalContext {
            cwd,
            home,
            config,
        })
    }

    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    /// Get the kraftpack home directory.
    pub fn home(&self) -> &Path {
        &self.home
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get the global configuration file path.
    pub fn config_path(&self) -> PathBuf {
        self.home.join("config.toml")
    }

    /// Get the global cache directory.
    pub fn cache_dir(&self) -> PathBuf {
        self.home.join("cache")
    }

    /// Local copies of catalog index files.
    pub fn manifests_dir(&self) -> PathBuf {
        self.cache_dir().join("manifests")
    }

    /// Downloaded component archives.
    pub fn downloads_dir(&self) -> PathBuf {
        self.cache_dir().join("downloads")
    }

    /// Store for packaged unikernels.
    pub fn packages_dir(&self) -> PathBuf {
        self.cache_dir().join("packages")
    }
}
