//! SVM Module Structure
//!
//! The output of the compiler core: per-function instruction sequences and
//! slot declarations, together with the unit-level metadata (globals, data
//! segments, import/export tables) the external wire encoder needs to frame
//! a binary module.

use crate::inst::StackInst;
use sbc_common::{ConstValue, FuncId, FunctionType, ValueType};
use serde::{Deserialize, Serialize};

/// A mutable module global with its initial value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalDecl {
    pub ty: ValueType,
    pub init: ConstValue,
}

/// A constant data segment placed at a fixed linear-memory offset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSegment {
    pub offset: u32,
    pub bytes: Vec<u8>,
}

/// An imported (external) function slot. Imports occupy the low function
/// indices, in declaration order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportDecl {
    pub name: String,
    pub ty: FunctionType,
}

/// An exported internal function
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportDecl {
    pub name: String,
    pub func: FuncId,
}

/// A compiled internal function
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackFunction {
    pub name: String,
    pub ty: FunctionType,
    /// Declared non-argument slot types, in slot order. Arguments occupy
    /// slots `0..params.len()` and are not re-declared here.
    pub locals: Vec<ValueType>,
    pub code: Vec<StackInst>,
}

/// A complete compiled module, ready for the external encoder
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StackModule {
    pub globals: Vec<GlobalDecl>,
    pub data: Vec<DataSegment>,
    pub imports: Vec<ImportDecl>,
    pub exports: Vec<ExportDecl>,
    /// Functions usable as indirect-call targets, by function index
    pub indirect_table: Vec<FuncId>,
    pub functions: Vec<StackFunction>,
}

impl StackModule {
    /// Look up a compiled function by name
    pub fn function(&self, name: &str) -> Option<&StackFunction> {
        self.functions.iter().find(|f| f.name == name)
    }

    /// Resolve a function index to its signature, across the combined
    /// import + internal index space
    pub fn signature(&self, func: FuncId) -> Option<&FunctionType> {
        let idx = func as usize;
        if idx < self.imports.len() {
            Some(&self.imports[idx].ty)
        } else {
            self.functions.get(idx - self.imports.len()).map(|f| &f.ty)
        }
    }

    /// Number of imported functions (the offset of internal indices)
    pub fn import_count(&self) -> u32 {
        self.imports.len() as u32
    }
}
