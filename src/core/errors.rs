//! Error taxonomy shared by resolution, scheduling and the strategy chains.
//!
//! Operations return `anyhow::Result`; these typed errors travel inside it
//! and can be recovered with `err.downcast_ref::<KraftError>()`.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::util::diagnostic::{suggestions, Diagnostic};

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum KraftError {
    /// The catalog offered more than one candidate and nobody could choose.
    #[error("too many options for {component}")]
    ResolutionAmbiguous {
        component: String,
        candidates: Vec<String>,
    },

    /// The catalog returned nothing, locally or remotely.
    #[error("could not find: {component}")]
    ResolutionNotFound { component: String },

    #[error("no targets selected to {action}")]
    NoTargetsSelected { action: String },

    #[error("{0}")]
    IncompatibleArguments(String),

    /// No strategy in a chain reported itself capable.
    #[error("could not determine how to {action}")]
    StrategyUnavailable { action: String, reasons: Vec<String> },

    #[error("{operation} failed for {subject}")]
    ExternalToolFailure {
        operation: String,
        subject: String,
        #[source]
        source: BoxError,
    },

    #[error("could not write cache at {}", path.display())]
    CacheWriteFailure {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("operation cancelled")]
    Cancelled,
}

impl KraftError {
    /// Wrap an external tool or catalog failure, keeping its cause.
    pub fn external(
        operation: impl Into<String>,
        subject: impl Into<String>,
        source: anyhow::Error,
    ) -> anyhow::Error {
        KraftError::ExternalToolFailure {
            operation: operation.into(),
            subject: subject.into(),
            source: source.into(),
        }
        .into()
    }

    pub fn cache_write(path: impl Into<PathBuf>, source: io::Error) -> anyhow::Error {
        KraftError::CacheWriteFailure {
            path: path.into(),
            source,
        }
        .into()
    }

    /// Convert to a user-friendly diagnostic.
    pub fn to_diagnostic(&self) -> Diagnostic {
        match self {
            KraftError::ResolutionAmbiguous {
                component,
                candidates,
            } => {
                let mut diag = Diagnostic::error(self.to_string());
                for candidate in candidates {
                    diag = diag.with_context(format!("candidate: {}", candidate));
                }
                diag.with_suggestion(format!("pin an exact version for {}", component))
                    .with_suggestion(suggestions::INTERACTIVE)
            }

            KraftError::ResolutionNotFound { .. } => Diagnostic::error(self.to_string())
                .with_context("searched the local catalog, then the remote catalog")
                .with_suggestion(suggestions::UPDATE_CATALOG)
                .with_suggestion(suggestions::ADD_SOURCE),

            KraftError::NoTargetsSelected { .. } => {
                Diagnostic::error(self.to_string()).with_suggestion(suggestions::NARROW_TARGETS)
            }

            KraftError::IncompatibleArguments(_) => Diagnostic::error(self.to_string()),

            KraftError::StrategyUnavailable { reasons, .. } => {
                let mut diag = Diagnostic::error(self.to_string());
                for reason in reasons {
                    diag = diag.with_context(reason.clone());
                }
                diag.with_suggestion(suggestions::NO_KRAFTFILE)
            }

            KraftError::ExternalToolFailure { source, .. } => Diagnostic::error(self.to_string())
                .with_context(source.to_string())
                .with_suggestion(suggestions::BUILD_LOG),

            KraftError::CacheWriteFailure { path, source } => {
                Diagnostic::error(self.to_string())
                    .with_context(source.to_string())
                    .with_location(path.clone())
            }

            KraftError::Cancelled => Diagnostic::error(self.to_string()),
        }
    }
}
