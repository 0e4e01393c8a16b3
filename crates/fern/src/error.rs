//! Error types for every phase of the pipeline.
//!
//! Compile-time failures (lexing, parsing, module loading) are fatal and are
//! reported as a [`CompileError`]. Runtime faults are split between
//! recoverable ones, which produce a sentinel value and a diagnostic
//! (see [`crate::diagnostics`]), and fatal ones that halt the VM.

use std::fmt;

use crate::token::CodeRange;

/// Result type for anything that can fail before the VM starts running.
pub type CompileResult<T> = Result<T, CompileError>;

/// Result type for fallible runtime operations.
pub type RunResult<T> = Result<T, RunError>;

/// A fatal error encountered while turning source text into bytecode, or
/// while resolving an import. Exits the process with code 2.
#[derive(Debug, Clone)]
pub enum CompileError {
    Lex { message: String, at: CodeRange },
    Parse { message: String, at: CodeRange },
    Load { message: String, module: String },
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lex { message, at } => write!(f, "lex error at {at}: {message}"),
            Self::Parse { message, at } => write!(f, "parse error at {at}: {message}"),
            Self::Load { message, module } => write!(f, "could not load module `{module}`: {message}"),
        }
    }
}

impl std::error::Error for CompileError {}

/// A runtime fault.
///
/// Most variants are recoverable: the operation that triggered them yields
/// a defined sentinel value and the VM keeps running.
/// [`RunError::StackOverflow`] is fatal and unwinds the whole run.
#[derive(Debug, Clone, strum::Display)]
pub enum RunError {
    /// Arithmetic or comparison attempted on a value with no sensible integer
    /// coercion, or a call target that is not a function.
    #[strum(to_string = "type mismatch: {0}")]
    TypeMismatch(String),
    /// An array index was out of `0..length`.
    #[strum(to_string = "index {index} out of bounds (length {length})")]
    IndexOutOfBounds { index: i32, length: i32 },
    /// A reactive read re-entered a location that is already being evaluated.
    #[strum(to_string = "reactive cycle detected")]
    ReactiveCycle,
    /// Division or modulo by zero.
    #[strum(to_string = "division by zero")]
    DivisionByZero,
    /// The non-reactive call stack grew past its limit. Fatal.
    #[strum(to_string = "stack overflow")]
    StackOverflow,
}

impl RunError {
    /// Whether this error halts the VM (exit code 1) instead of being
    /// recovered with a sentinel value.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::StackOverflow)
    }
}

impl std::error::Error for RunError {}
