//! SVM - Reference Interpreter
//!
//! Executes compiled stack modules directly, without going through the
//! binary encoding. Intended for compiler tests and for running small
//! programs from the command line; not a performance-oriented runtime.

pub mod vm;

pub use vm::{Vm, VmError, VmValue, MEMORY_SIZE};
