//! Conflict policy when a package being created already exists.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeStrategy {
    /// Replace the existing package entirely.
    #[default]
    Overwrite,
    /// Add to (or replace matching entries in) the existing package.
    Merge,
    /// Fail when packing finds the package already present.
    Abort,
    /// Fail before any work is done.
    Exit,
    /// Ask the user which of the other strategies to use.
    Prompt,
}

impl MergeStrategy {
    /// Strategies a user may be offered when prompted.
    pub const CHOICES: [MergeStrategy; 3] = [
        MergeStrategy::Overwrite,
        MergeStrategy::Merge,
        MergeStrategy::Abort,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MergeStrategy::Overwrite => "overwrite",
            MergeStrategy::Merge => "merge",
            MergeStrategy::Abort => "abort",
            MergeStrategy::Exit => "exit",
            MergeStrategy::Prompt => "prompt",
        }
    }

    /// The strategy for the `index`-th target of one packaging run.
    ///
    /// Only the first target applies the requested strategy; the rest join
    /// the package it created.
    pub fn for_target(self, index: usize) -> MergeStrategy {
        if index == 0 {
            self
        } else {
            MergeStrategy::Merge
        }
    }
}

impl fmt::Display for MergeStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MergeStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "overwrite" => Ok(MergeStrategy::Overwrite),
            "merge" => Ok(MergeStrategy::Merge),
            "abort" => Ok(MergeStrategy::Abort),
            "exit" => Ok(MergeStrategy::Exit),
            "prompt" => Ok(MergeStrategy::Prompt),
            _ => Err(format!(
                "invalid merge strategy '{}'; expected one of overwrite, merge, abort, exit, prompt",
                s
            )),
        }
    }
}
