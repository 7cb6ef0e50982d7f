//! Structured Bytecode Compiler - SVM Target Definitions
//!
//! This crate defines the instruction set and module structure of the SVM
//! stack machine. It is consumed by the compiler backend (which emits these
//! instructions) and by the reference interpreter and the external wire
//! encoder (which execute or serialize them).

pub mod inst;
pub mod module;

pub use inst::StackInst;
pub use module::{
    DataSegment, ExportDecl, GlobalDecl, ImportDecl, StackFunction, StackModule,
};
