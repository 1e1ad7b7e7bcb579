//! Errors shared by wire-level parsing.

use thiserror::Error;

/// Raised when an identifier's canonical string form fails the
/// `type/key` (or `type/source`) grammar.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("malformed identifier: {0:?}")]
pub struct FormatError(String);

impl FormatError {
    pub fn malformed(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn raw(&self) -> &str {
        &self.0
    }
}
