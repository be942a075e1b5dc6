//! User-facing diagnostic messages.
//!
//! Every error shown to a user should name what failed and, where one
//! exists, the command that fixes it.

use std::fmt;
use std::path::PathBuf;

use miette::{Diagnostic as MietteDiagnostic, NamedSource, SourceSpan};
use thiserror::Error;

/// Common suggestion messages for consistent error handling.
pub mod suggestions {
    pub const NO_KRAFTFILE: &str = "create a Kraftfile in the project directory";

    pub const UPDATE_CATALOG: &str = "run `kraftpack update` to refresh the package catalog";

    pub const ADD_SOURCE: &str = "add a catalog index with `kraftpack source add <uri>`";

    pub const NARROW_TARGETS: &str = "select a single target with `--target`, or `--arch` and `--plat`";

    pub const INTERACTIVE: &str = "re-run without `--no-prompt` to choose interactively";

    pub const BUILD_LOG: &str = "re-run with `--save-build-log <file>` to capture the full output";
}

/// A diagnostic message with optional suggestions.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub message: String,
    /// Additional context lines
    pub context: Vec<String>,
    /// Suggested fixes
    pub suggestions: Vec<String>,
    /// Related file
    pub location: Option<PathBuf>,
}

impl Diagnostic {
    pub fn error(message: impl Into<String>) -> Self {
        Diagnostic {
            message: message.into(),
            context: Vec::new(),
            suggestions: Vec::new(),
            location: None,
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context.push(context.into());
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }

    pub fn with_location(mut self, path: impl Into<PathBuf>) -> Self {
        self.location = Some(path.into());
        self
    }

    /// Format the diagnostic for terminal output.
    pub fn format(&self, color: bool) -> String {
        let mut output = String::new();

        let prefix = if color { "\x1b[1;31merror\x1b[0m" } else { "error" };
        output.push_str(&format!("{}: {}\n", prefix, self.message));

        if let Some(ref path) = self.location {
            output.push_str(&format!("  --> {}\n", path.display()));
        }

        for ctx in &self.context {
            output.push_str(&format!("  = {}\n", ctx));
        }

        if !self.suggestions.is_empty() {
            let help_prefix = if color { "\x1b[1;32mhelp\x1b[0m" } else { "help" };
            output.push_str(&format!("{}: consider:\n", help_prefix));
            for (i, suggestion) in self.suggestions.iter().enumerate() {
                output.push_str(&format!("  {}. {}\n", i + 1, suggestion));
            }
        }

        output
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format(false))
    }
}

/// A Kraftfile that could not be parsed, with the offending snippet.
#[derive(Debug, Error, MietteDiagnostic)]
#[error("invalid Kraftfile: {message}")]
#[diagnostic(code(kraftpack::kraftfile::parse))]
pub struct KraftfileParseError {
    pub message: String,
    #[source_code]
    pub src: NamedSource<String>,
    #[label("here")]
    pub span: Option<SourceSpan>,
}

impl KraftfileParseError {
    pub fn new(path: &std::path::Path, contents: &str, err: &serde_yaml::Error) -> Self {
        let span = err
            .location()
            .map(|loc| SourceSpan::from((loc.index().min(contents.len()), 1)));
        KraftfileParseError {
            message: err.to_string(),
            src: NamedSource::new(path.display().to_string(), contents.to_string()),
            span,
        }
    }

    /// Render with source snippet for terminal output.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let handler = miette::GraphicalReportHandler::new();
        if handler.render_report(&mut out, self).is_err() {
            out = self.to_string();
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagnostic_formatting() {
        let diag = Diagnostic::error("could not find: lib/musl:stable")
            .with_context("searched the local and remote catalog")
            .with_suggestion(suggestions::UPDATE_CATALOG)
            .with_location("/work/Kraftfile");

        let output = diag.format(false);
        assert!(output.starts_with("error: could not find: lib/musl:stable"));
        assert!(output.contains("--> /work/Kraftfile"));
        assert!(output.contains("= searched the local"));
        assert!(output.contains("1. run `kraftpack update`"));
    }

    #[test]
    fn test_kraftfile_parse_error_has_span() {
        let contents = "name: app\ntargets: [\n";
        let err = serde_yaml::from_str::<serde_yaml::Value>(contents).unwrap_err();
        let diag = KraftfileParseError::new(std::path::Path::new("Kraftfile"), contents, &err);
        assert!(diag.to_string().starts_with("invalid Kraftfile"));
        assert!(!diag.render().is_empty());
    }
}
