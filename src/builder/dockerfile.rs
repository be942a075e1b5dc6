//! Treating a Dockerfile rootfs as the application, run on a prebuilt runtime.

use anyhow::Result;

use crate::builder::{BuildContext, Builder, RuntimeBuilder};
use crate::core::{Capability, Component, ComponentType, Project};
use crate::rootfs::dockerfile::is_dockerfile;

/// Runtime used when a Dockerfile project does not name one.
pub const DEFAULT_RUNTIME: (&str, &str) = ("base", "latest");

/// The project's runtime, or the default one placed in its workdir.
pub fn runtime_or_default(project: &Project) -> Component {
    project.runtime.clone().unwrap_or_else(|| {
        let (name, version) = DEFAULT_RUNTIME;
        Component::new(&project.workdir, ComponentType::Runtime, name, version, None)
    })
}

pub struct DockerfileBuilder;

impl Builder for DockerfileBuilder {
    fn name(&self) -> &'static str {
        "dockerfile"
    }

    fn capable(&self, ctx: &BuildContext<'_>) -> Capability {
        Capability::when(ctx.rootfs_spec().is_some_and(is_dockerfile), || {
            "rootfs is not a Dockerfile".to_string()
        })
    }

    fn prepare(&self, ctx: &mut BuildContext<'_>) -> Result<()> {
        if ctx.project.runtime.is_none() {
            let runtime = runtime_or_default(&ctx.project);
            tracing::info!("no runtime declared, using {}", runtime.label());
            ctx.project.runtime = Some(runtime);
        }
        RuntimeBuilder.prepare(ctx)
    }

    fn build(&self, ctx: &mut BuildContext<'_>) -> Result<()> {
        RuntimeBuilder.build(ctx)
    }
}
