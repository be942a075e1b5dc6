//! Implementation of `kraftpack rootfs`.

use std::path::PathBuf;

use anyhow::{bail, Result};

use crate::rootfs::{self, ImageExporter, Rootfs, RootfsOptions};
use crate::scheduler::CancelToken;

#[derive(Debug, Clone)]
pub struct RootfsRequest {
    pub workdir: PathBuf,
    /// A directory, Dockerfile, cpio or tar archive.
    pub spec: String,
    pub architecture: String,
    pub compress: bool,
    pub output: Option<PathBuf>,
    pub cancel: CancelToken,
}

/// Build an initramfs without a project.
pub fn build_rootfs(request: &RootfsRequest, exporter: &dyn ImageExporter) -> Result<Rootfs> {
    if request.spec.trim().is_empty() {
        bail!("a rootfs is required");
    }

    let mut opts = RootfsOptions::new(&request.workdir, &request.architecture).compress(request.compress);
    opts.output = request
        .output
        .as_ref()
        .map(|p| crate::util::fs::resolve_against(&request.workdir, p));
    opts.cancel = request.cancel.clone();

    let built = rootfs::build(&request.spec, &opts, exporter)?;
    if let Some(path) = &built.path {
        tracing::debug!("initramfs written to {}", path.display());
    }
    Ok(built)
}
