//! Structured Bytecode Compiler - Intermediate Representation
//!
//! This crate defines the structured IR handed over by the frontend and the
//! SSA transformer that rewrites function bodies into single-static-
//! assignment form. Control flow in this IR is a tree of properly nested
//! regions (loop/breakable/if), never an arbitrary jump graph.

pub mod ir;
pub mod ssa;


pub use ir::{
    Block, CompilationUnit, DataSegment, FunctionDeclaration, FunctionDefinition,
    GlobalVariable, Instruction,
};
pub use ssa::{to_ssa, SsaTable};
