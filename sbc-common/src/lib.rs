//! Structured Bytecode Compiler - Common Types and Utilities
//!
//! This crate contains the shared vocabulary used across all components of
//! the SBC compiler: identifier aliases, value types, operator enums,
//! function signatures, and the common error type.

pub mod error;
pub mod types;

pub use error::CompilerError;
pub use types::*;
