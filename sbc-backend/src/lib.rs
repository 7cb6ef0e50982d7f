//! Structured Bytecode Compiler - Backend
//!
//! Takes SSA-form functions and lowers them to stack machine code in two
//! stages: live-range bucket allocation assigns every SSA name a local
//! slot, and stack codegen emits the instruction sequence, keeping values
//! on the operand stack when their next use allows it.

pub mod buckets;
pub mod codegen;
pub mod compile;

#[cfg(test)]
mod codegen_tests;

pub use buckets::{allocate_buckets, BucketAllocation, Span};
pub use codegen::generate_function;
pub use compile::{compile, FunctionIndex};
