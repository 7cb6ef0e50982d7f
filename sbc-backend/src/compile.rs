//! Unit Compilation
//!
//! Drives the per-function pipeline (SSA, bucket allocation, stack
//! codegen) across a compilation unit and assembles the output module:
//! imports in declaration order followed by internal functions, exports
//! and the indirect-call table derived from the declarations.

use crate::buckets::allocate_buckets;
use crate::codegen::generate_function;
use log::{debug, info};
use sbc_codegen::module::{
    DataSegment, ExportDecl, GlobalDecl, ImportDecl, StackModule,
};
use sbc_common::{CompilerError, FuncId, FunctionType};
use sbc_ir::ssa::to_ssa;
use sbc_ir::CompilationUnit;
use std::collections::HashMap;

/// Name-to-index mapping over the combined import + internal index space
pub struct FunctionIndex {
    map: HashMap<String, (FuncId, FunctionType)>,
}

impl FunctionIndex {
    pub fn build(unit: &CompilationUnit) -> Result<Self, CompilerError> {
        let mut map = HashMap::new();
        let mut next: FuncId = 0;
        for decl in unit
            .external_functions
            .iter()
            .chain(unit.function_declarations.iter())
        {
            if map
                .insert(decl.name.clone(), (next, decl.ty.clone()))
                .is_some()
            {
                return Err(CompilerError::internal(format!(
                    "function '{}' declared twice",
                    decl.name
                )));
            }
            next += 1;
        }
        Ok(Self { map })
    }

    pub fn resolve(&self, name: &str) -> Result<(FuncId, &FunctionType), CompilerError> {
        self.map
            .get(name)
            .map(|(id, ty)| (*id, ty))
            .ok_or_else(|| {
                CompilerError::internal(format!("call to undeclared function '{name}'"))
            })
    }
}

/// Compile a whole unit down to a stack module
pub fn compile(mut unit: CompilationUnit) -> Result<StackModule, CompilerError> {
    info!(
        "compiling unit: {} functions, {} imports, {} globals",
        unit.function_declarations.len(),
        unit.external_functions.len(),
        unit.globals.len()
    );
    let index = FunctionIndex::build(&unit)?;

    let imports: Vec<ImportDecl> = unit
        .external_functions
        .iter()
        .map(|d| ImportDecl {
            name: d.name.clone(),
            ty: d.ty.clone(),
        })
        .collect();
    let import_count = imports.len() as FuncId;

    let mut exports = Vec::new();
    let mut indirect_table = Vec::new();
    let mut functions = Vec::new();
    for (i, decl) in unit.function_declarations.iter().enumerate() {
        let func = import_count + i as FuncId;
        if let Some(name) = &decl.export_name {
            exports.push(ExportDecl {
                name: name.clone(),
                func,
            });
        }
        if decl.indirect_target {
            indirect_table.push(func);
        }
        let def = unit
            .function_definitions
            .iter_mut()
            .find(|d| d.name == decl.name)
            .ok_or_else(|| {
                CompilerError::internal(format!(
                    "function '{}' declared but never defined",
                    decl.name
                ))
            })?;

        let table = to_ssa(def, decl)?;
        let alloc = allocate_buckets(&def.body, &table, decl.ty.params.len())?;
        debug!(
            "function '{}': {} names, {} local slots",
            def.name,
            table.len(),
            alloc.locals.len()
        );
        functions.push(generate_function(def, decl, &table, &alloc, &index)?);
    }

    Ok(StackModule {
        globals: unit
            .globals
            .into_iter()
            .map(|g| GlobalDecl {
                ty: g.ty,
                init: g.init,
            })
            .collect(),
        data: unit
            .data_segments
            .into_iter()
            .map(|d| DataSegment {
                offset: d.offset,
                bytes: d.bytes,
            })
            .collect(),
        imports,
        exports,
        indirect_table,
        functions,
    })
}
