//! Runtime environment variables and how they reach the kernel.
//!
//! Unikraft bakes the initial environment into the image through the
//! `CONFIG_LIBPOSIX_ENVIRON_ENVP<n>` options, so variables are compiled
//! into kconfig rather than passed at boot.

use std::collections::BTreeMap;

use crate::core::KConfig;

/// Number of `ENVP` slots the environ library provides.
pub const MAX_ENV_VARS: usize = 16;

const ENVP_PREFIX: &str = "CONFIG_LIBPOSIX_ENVIRON_ENVP";

/// Parse `KEY=VALUE` entries. A bare `KEY` takes its value from the
/// process environment and is dropped when unset there.
pub fn parse_env<S: AsRef<str>>(entries: &[S]) -> BTreeMap<String, String> {
    let mut env = BTreeMap::new();
    for entry in entries {
        let entry = entry.as_ref();
        match entry.split_once('=') {
            Some((key, value)) => {
                env.insert(key.to_string(), value.to_string());
            }
            None => match std::env::var(entry) {
                Ok(value) => {
                    env.insert(entry.to_string(), value);
                }
                Err(_) => tracing::warn!("environment variable {} is not set, ignoring", entry),
            },
        }
    }
    env
}

/// Project variables overlaid with command-line ones.
pub fn merged_env<S: AsRef<str>>(
    project: &BTreeMap<String, String>,
    cli: &[S],
) -> BTreeMap<String, String> {
    let mut env = project.clone();
    env.extend(parse_env(cli));
    env
}

/// Options that place `env` into the free `ENVP` slots of `existing`.
///
/// Slots already set in `existing` are left alone. Variables that find no
/// free slot are reported and dropped.
pub fn env_kconfig(env: &BTreeMap<String, String>, existing: &KConfig) -> KConfig {
    let mut kconfig = KConfig::new();
    let mut free = (0..MAX_ENV_VARS)
        .map(|i| format!("{}{}", ENVP_PREFIX, i))
        .filter(|key| !existing.contains(key));

    for (key, value) in env {
        match free.next() {
            Some(slot) => kconfig.set(slot, format!("\"{}={}\"", key, value)),
            None => tracing::warn!(
                "too many environment variables, {} is not compiled into the kernel (limit {})",
                key,
                MAX_ENV_VARS
            ),
        }
    }
    kconfig
}
