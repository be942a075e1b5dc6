//! Core data structures: projects, components, targets and packages.

pub mod artifacts;
pub mod component;
pub mod errors;
pub mod kconfig;
pub mod kraftfile;
pub mod merge;
pub mod package;
pub mod project;
pub mod strategy;
pub mod target;

pub use artifacts::Artifacts;
pub use component::{Component, ComponentType};
pub use errors::KraftError;
pub use kconfig::KConfig;
pub use merge::MergeStrategy;
pub use package::Package;
pub use project::Project;
pub use strategy::{select_first_capable, Capability};
pub use target::{Target, TargetConstraints};
