//! Parsing of raw caller submissions.
//!
//! A submission is source code, optionally preceded by a first line holding
//! stdin as a JSON string literal:
//!
//! ```text
//! "3 4\n"
//! a, b = map(int, input().split())
//! print(a + b)
//! ```

use thiserror::Error;

/// Submission rejected before any remote interaction.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SubmissionError {
    #[error("Submission contains no source code")]
    EmptySource,
}

/// Source code plus stdin extracted from a raw submission.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Submission {
    /// Source code.
    pub code: String,
    /// Text fed to the program; empty when none was given.
    pub stdin: String,
}

impl Submission {
    /// Create a submission directly.
    #[must_use]
    pub fn new(code: impl Into<String>, stdin: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            stdin: stdin.into(),
        }
    }

    /// Parse a raw submission.
    ///
    /// A first line that is not a complete JSON string literal is treated as
    /// code.
    ///
    /// # Errors
    /// Returns error if no source code remains.
    pub fn parse(raw: &str) -> Result<Self, SubmissionError> {
        let raw = raw.trim();
        let submission = match raw.split_once('\n') {
            Some((first, rest)) if first.starts_with('"') => {
                match serde_json::from_str::<String>(first) {
                    Ok(stdin) => Self::new(rest, stdin),
                    Err(e) => {
                        tracing::debug!("First line is not a stdin literal: {e}");
                        Self::new(raw, "")
                    }
                }
            }
            _ => Self::new(raw, ""),
        };

        if submission.code.trim().is_empty() {
            return Err(SubmissionError::EmptySource);
        }
        Ok(submission)
    }
}
