//! Compiler errors
//!
//! A failed rule aborts only that rule; the artifact is never handed out
//! before its final section has closed.

use thiserror::Error;

use rulec_emitter::EmitError;

/// Result type for compilation
pub type CompileResult<T> = Result<T, CompileError>;

/// Errors raised while dissecting a rule
#[derive(Debug, Error)]
pub enum CompileError {
    /// Emitter failure (missing fragment, write before init, catalog I/O)
    #[error(transparent)]
    Emit(#[from] EmitError),

    /// The position/real_position invariant broke at section close; a
    /// dissection defect or an unsupported input shape
    #[error("consistency failure in {section} section: {actual} slot entities for real position {expected}")]
    Consistency {
        section: &'static str,
        expected: usize,
        actual: usize,
    },

    /// An expected-value reference would be ambiguous among its siblings
    #[error("duplicate entity name among reference siblings: {name}")]
    DuplicateEntityName { name: String },

    /// An entity carried a present-but-empty expected value
    #[error("expected value for entity '{name}' is present but empty")]
    EmptyExpectedValue { name: String },
}
