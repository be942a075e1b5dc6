//! kraftpack - resolve, fetch, build and package unikernels
//!
//! This crate provides the library behind the `kraftpack` binary: the
//! Kraftfile project model, the catalog client and its lookup policy, the
//! dependency resolver, the builder and packager strategy chains, the
//! initramfs builder and the phased scheduler they all run on.

pub mod builder;
pub mod catalog;
pub mod core;
pub mod ops;
pub mod packager;
pub mod resolver;
pub mod rootfs;
pub mod scheduler;
pub mod util;

/// Test utilities and mocks for kraftpack unit tests.
///
/// This module is only available when compiling with `--cfg test` or
/// running tests. It provides mock catalogs, make drivers, image exporters
/// and prompters.
#[cfg(test)]
pub mod test_support;

pub use core::{Artifacts, Component, KraftError, MergeStrategy, Package, Project, Target};
pub use util::context::GlobalContext;
