//! Dockerfile rootfs sources.
//!
//! The image is built and exported as a filesystem tarball by an
//! [`ImageExporter`]; `CMD`, `ENTRYPOINT` and `ENV` are read from the
//! Dockerfile itself so packaging can default to them.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::LazyLock;

use anyhow::{bail, Result};
use regex::Regex;

use crate::scheduler::CancelToken;
use crate::util::process::{find_executable, ProcessBuilder};

static DIRECTIVE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)^\s*(CMD|ENTRYPOINT|ENV)\s+(.+?)\s*$").expect("valid directive regex")
});

static ENV_PAIR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"([A-Za-z_][A-Za-z0-9_]*)=(?:"((?:[^"\\]|\\.)*)"|(\S*))"#)
        .expect("valid env regex")
});

/// Defaults declared by a Dockerfile. The last `CMD`/`ENTRYPOINT` wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Directives {
    pub entrypoint: Vec<String>,
    pub command: Vec<String>,
    pub env: BTreeMap<String, String>,
}

impl Directives {
    pub fn parse(contents: &str) -> Self {
        let joined = contents.replace("\\\r\n", " ").replace("\\\n", " ");
        let mut directives = Directives::default();

        for caps in DIRECTIVE.captures_iter(&joined) {
            let rest = &caps[2];
            match caps[1].to_ascii_uppercase().as_str() {
                "CMD" => directives.command = parse_argv(rest),
                "ENTRYPOINT" => directives.entrypoint = parse_argv(rest),
                _ => parse_env(rest, &mut directives.env),
            }
        }
        directives
    }

    /// The argv a container would start with.
    pub fn argv(&self) -> Vec<String> {
        self.entrypoint
            .iter()
            .chain(self.command.iter())
            .cloned()
            .collect()
    }
}

/// Exec form (`["a", "b"]`) or shell form (`a b`).
fn parse_argv(rest: &str) -> Vec<String> {
    if rest.starts_with('[') {
        if let Ok(argv) = serde_json::from_str::<Vec<String>>(rest) {
            return argv;
        }
    }
    vec!["/bin/sh".to_string(), "-c".to_string(), rest.to_string()]
}

/// `ENV K=V K2="v 2"` or the legacy `ENV K value`.
fn parse_env(rest: &str, env: &mut BTreeMap<String, String>) {
    let first = rest.split_whitespace().next().unwrap_or_default();
    if first.contains('=') {
        for caps in ENV_PAIR.captures_iter(rest) {
            let value = caps
                .get(2)
                .or_else(|| caps.get(3))
                .map(|m| m.as_str().replace("\\\"", "\""))
                .unwrap_or_default();
            env.insert(caps[1].to_string(), value);
        }
    } else if let Some((key, value)) = rest.split_once(char::is_whitespace) {
        env.insert(key.to_string(), value.trim().to_string());
    }
}

/// Builds a Dockerfile and writes the resulting filesystem as a tarball.
pub trait ImageExporter: Send + Sync {
    fn export(
        &self,
        dockerfile: &Path,
        context: &Path,
        architecture: &str,
        output: &Path,
        cancel: &CancelToken,
    ) -> Result<()>;

    fn is_available(&self) -> bool;
}

/// Exports through `docker buildx build --output type=tar`.
#[derive(Debug, Clone, Default)]
pub struct DockerCli;

impl ImageExporter for DockerCli {
    fn export(
        &self,
        dockerfile: &Path,
        context: &Path,
        architecture: &str,
        output: &Path,
        cancel: &CancelToken,
    ) -> Result<()> {
        let Some(docker) = find_executable("docker") else {
            bail!("`docker` is required to build {}", dockerfile.display());
        };

        ProcessBuilder::new(docker)
            .args(["buildx", "build", "--quiet"])
            .arg("--platform")
            .arg(format!("linux/{}", docker_arch(architecture)))
            .arg("--file")
            .arg(dockerfile)
            .arg("--output")
            .arg(format!("type=tar,dest={}", output.display()))
            .arg(context)
            .exec_cancellable(cancel, None)
    }

    fn is_available(&self) -> bool {
        find_executable("docker").is_some()
    }
}

fn docker_arch(architecture: &str) -> &str {
    match architecture {
        "x86_64" => "amd64",
        "arm" => "arm/v7",
        other => other,
    }
}

/// Whether `spec` names a Dockerfile.
pub fn is_dockerfile(spec: &str) -> bool {
    Path::new(spec)
        .file_name()
        .is_some_and(|name| name.to_string_lossy().to_lowercase().contains("dockerfile"))
}
