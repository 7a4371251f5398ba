//! Error types for macro expansion.

use thiserror::Error;

use crate::ast::Span;

/// Result type for expansion operations.
pub type Result<T> = std::result::Result<T, ExpandError>;

/// Errors that abort expansion of the current file.
///
/// Both variants are fatal for the file being expanded and leave the shared
/// build snapshots untouched.
#[derive(Error, Debug)]
pub enum ExpandError {
    /// A macro call site could not be reduced to a literal where one is required
    #[error("{file}:{line}:{column}: {reason}")]
    StaticEvaluation {
        /// File being expanded
        file: String,
        /// Source line of the offending call site
        line: u32,
        /// Source column of the offending call site
        column: u32,
        /// What could not be reduced
        reason: String,
    },

    /// Fixpoint iteration exceeded its bound
    #[error("macro expansion did not converge in {file} after {passes} passes")]
    NonConvergence {
        /// File being expanded
        file: String,
        /// Number of passes attempted
        passes: u32,
    },
}

impl ExpandError {
    pub(crate) fn static_eval(file: &str, span: Span, reason: impl Into<String>) -> Self {
        ExpandError::StaticEvaluation {
            file: file.to_string(),
            line: span.line,
            column: span.column,
            reason: reason.into(),
        }
    }
}
