//! Interactive single-choice selection.
//!
//! Ambiguity is never resolved automatically: callers either hold a
//! [`Prompter`] that asks a human, or they hold none and fail.

use std::io::{self, BufRead, Write};

use anyhow::{bail, Context, Result};

/// Attempts a user gets before an invalid answer becomes an error.
const MAX_ATTEMPTS: usize = 3;

/// Asks the user to pick exactly one of `options`, returning its index.
pub trait Prompter: Send + Sync {
    fn select(&self, question: &str, options: &[String]) -> Result<usize>;
}

/// Numbered menu on stderr, answer read from stdin.
#[derive(Debug, Default)]
pub struct TerminalPrompter;

impl Prompter for TerminalPrompter {
    fn select(&self, question: &str, options: &[String]) -> Result<usize> {
        if options.is_empty() {
            bail!("nothing to select for: {}", question);
        }

        let stdin = io::stdin();
        let mut stderr = io::stderr();

        for _ in 0..MAX_ATTEMPTS {
            writeln!(stderr, "{}", question)?;
            for (i, option) in options.iter().enumerate() {
                writeln!(stderr, "  {}) {}", i + 1, option)?;
            }
            write!(stderr, "Select [1-{}]: ", options.len())?;
            stderr.flush()?;

            let mut input = String::new();
            let read = stdin
                .lock()
                .read_line(&mut input)
                .context("failed to read selection from stdin")?;
            if read == 0 {
                bail!("no selection made for: {}", question);
            }

            match parse_choice(&input, options.len()) {
                Some(index) => return Ok(index),
                None => writeln!(stderr, "invalid selection: {}", input.trim())?,
            }
        }

        bail!("no valid selection made for: {}", question)
    }
}

/// Parse a 1-based answer into a 0-based index.
fn parse_choice(input: &str, len: usize) -> Option<usize> {
    let n: usize = input.trim().parse().ok()?;
    (1..=len).contains(&n).then(|| n - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_choice() {
        assert_eq!(parse_choice("1\n", 3), Some(0));
        assert_eq!(parse_choice(" 3 ", 3), Some(2));
        assert_eq!(parse_choice("0", 3), None);
        assert_eq!(parse_choice("4", 3), None);
        assert_eq!(parse_choice("qemu", 3), None);
    }
}
