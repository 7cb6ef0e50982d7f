//! Error handling for the SBC compiler
//!
//! The frontend guarantees semantic validity before IR reaches this
//! pipeline, so user-facing diagnostics never originate here. Everything
//! that can go wrong is either an internal-invariant violation or one of
//! the documented unimplemented instruction shapes; both abort compilation
//! of the current unit.

use thiserror::Error;

/// Compiler error type shared by every pipeline stage
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompilerError {
    #[error("internal compiler error: {message}")]
    Internal { message: String },

    #[error("unsupported construct: {message}")]
    Unsupported { message: String },
}

impl CompilerError {
    /// Create an internal-invariant violation error
    pub fn internal(message: impl Into<String>) -> Self {
        CompilerError::Internal {
            message: message.into(),
        }
    }

    /// Create an error for an explicitly unimplemented instruction shape
    pub fn unsupported(message: impl Into<String>) -> Self {
        CompilerError::Unsupported {
            message: message.into(),
        }
    }
}

impl From<String> for CompilerError {
    fn from(message: String) -> Self {
        CompilerError::Internal { message }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CompilerError::internal("variable 3 written twice in one basic block");
        assert_eq!(
            err.to_string(),
            "internal compiler error: variable 3 written twice in one basic block"
        );

        let err = CompilerError::unsupported("indirect call");
        assert_eq!(err.to_string(), "unsupported construct: indirect call");
    }

    #[test]
    fn test_from_string() {
        let err: CompilerError = "oops".to_string().into();
        assert_eq!(err, CompilerError::internal("oops"));
    }
}
