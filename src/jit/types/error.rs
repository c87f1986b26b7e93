//! JIT error types.
//!
//! This module defines [`JitError`] and [`JitResult`]. Every variant is a
//! compile-time failure; errors raised while generated code runs belong to
//! the host runtime.

use std::fmt;

// =============================================================================
// JitResult and JitError
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JitError {
    /// The produced IR failed the Cranelift verifier
    Verification(String),

    /// Cranelift could not declare, define, or finalize the function
    Backend(String),

    /// The program breaks a bytecode invariant at `offset`
    MalformedProgram { offset: usize, reason: String },

    /// Unknown six-bit opcode field
    InvalidOpcode { offset: usize, raw: u8 },

    /// A translator tried to store into the constant pool
    ConstantWrite { offset: usize, index: u32 },

    /// A host entry point the program needs could not be bound
    MissingSymbol(&'static str),

    /// Invalid `JitConfig`
    Config(String),

    /// Compilation of this program failed before and will not be retried
    PreviouslyFailed,
}

impl JitError {
    pub(crate) fn malformed(offset: usize, reason: impl Into<String>) -> Self {
        JitError::MalformedProgram {
            offset,
            reason: reason.into(),
        }
    }

    /// Backend-stage error wrapping a Cranelift error with context
    pub(crate) fn backend(context: &str, err: impl fmt::Display) -> Self {
        JitError::Backend(format!("{}: {}", context, err))
    }
}

impl fmt::Display for JitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JitError::Verification(msg) => write!(f, "Verifier errors:\n{}", msg),
            JitError::Backend(msg) => write!(f, "Backend error: {}", msg),
            JitError::MalformedProgram { offset, reason } => {
                write!(f, "Malformed program at pc {}: {}", offset, reason)
            }
            JitError::InvalidOpcode { offset, raw } => {
                write!(f, "Invalid opcode {} at pc {}", raw, offset)
            }
            JitError::ConstantWrite { offset, index } => {
                write!(f, "Write to constant K{} at pc {}", index, offset)
            }
            JitError::MissingSymbol(name) => write!(f, "Missing runtime symbol: {}", name),
            JitError::Config(msg) => write!(f, "Invalid JIT configuration: {}", msg),
            JitError::PreviouslyFailed => write!(f, "Compilation previously failed"),
        }
    }
}

impl std::error::Error for JitError {}

/// Result type for JIT operations
pub type JitResult<T> = Result<T, JitError>;
