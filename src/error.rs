//! Error types for the rlcc pipeline
//!
//! Only the fatal kinds live here. Recoverable findings (syntax errors,
//! semantic diagnostics) are collected as data by their stages and reported
//! through [`crate::pipeline::CompilationData`] rather than returned as `Err`.

use thiserror::Error;

/// Fatal pipeline errors
#[derive(Error, Debug)]
pub enum Error {
    /// Lexical error that aborts tokenization
    ///
    /// Lexing is the one stage that fails fast: an unterminated string or a
    /// stray character leaves no meaningful way to recover token boundaries.
    #[error("Lex error at line {line}, column {column}: {message}")]
    Lex {
        /// Line number where scanning stopped (1-indexed)
        line: usize,
        /// Column number where scanning stopped (1-indexed)
        column: usize,
        /// Error description
        message: String,
    },

    /// An empty compilation request
    #[error("No source code provided")]
    EmptySource,

    /// Code generation was asked to run on an invalid program
    ///
    /// The pipeline refuses to generate target code while syntax errors or
    /// error-severity diagnostics remain.
    #[error("Code generation refused: {reason}")]
    CodegenRefused {
        /// Why generation was refused
        reason: String,
    },

    /// Sandbox process could not be started
    #[error("Sandbox error: {0}")]
    Sandbox(#[from] std::io::Error),

    /// A serialized result could not be produced
    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl Error {
    /// Create a lex error with a message at a source position
    pub fn lex(line: usize, column: usize, msg: impl Into<String>) -> Self {
        Error::Lex {
            line,
            column,
            message: msg.into(),
        }
    }
}

/// Result type for rlcc operations
pub type Result<T> = std::result::Result<T, Error>;
