//! A Dockerfile rootfs packaged on top of a prebuilt runtime.

use anyhow::Result;

use crate::builder::dockerfile::{runtime_or_default, DEFAULT_RUNTIME};
use crate::core::{Capability, Component, ComponentType};
use crate::packager::runtime::pack_runtime;
use crate::packager::{PackContext, Packager, Packed};
use crate::rootfs::dockerfile::is_dockerfile;

pub struct DockerfilePackager;

impl Packager for DockerfilePackager {
    fn name(&self) -> &'static str {
        "dockerfile"
    }

    fn capable(&self, ctx: &PackContext<'_>) -> Capability {
        Capability::when(ctx.rootfs_spec().is_some_and(is_dockerfile), || {
            "rootfs is not a Dockerfile".to_string()
        })
    }

    fn pack(&self, ctx: &PackContext<'_>) -> Result<Packed> {
        // A runtime given or declared is taken by the runtime packager first.
        let runtime = match &ctx.project {
            Some(project) => runtime_or_default(project),
            None => {
                let (name, version) = DEFAULT_RUNTIME;
                Component::new(&ctx.workdir, ComponentType::Runtime, name, version, None)
            }
        };
        tracing::info!("packaging Dockerfile rootfs on {}", runtime.label());
        pack_runtime(ctx, &runtime)
    }
}
