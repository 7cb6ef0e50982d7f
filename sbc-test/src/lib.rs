//! Test harness: small builders for compilation units and a helper that
//! compiles a unit and runs its `main` export on the interpreter with a
//! capturing `print` binding.

use sbc_codegen::module::StackModule;
use sbc_common::{FunctionType, ValueType};
use sbc_ir::FunctionDeclaration;
use svm::{Vm, VmError, VmValue};

/// The standard `print(i32)` import used by most test programs
pub fn print_import() -> FunctionDeclaration {
    FunctionDeclaration::new(
        "print",
        FunctionType::new(vec![ValueType::I32], vec![]),
    )
}

/// Declaration for an exported `main`
pub fn main_decl(params: Vec<ValueType>, results: Vec<ValueType>) -> FunctionDeclaration {
    FunctionDeclaration::new("main", FunctionType::new(params, results)).exported_as("main")
}

/// Run the module's `main` export, capturing everything passed to `print`.
/// Returns the results and the captured values, in call order.
pub fn run_main(
    module: &StackModule,
    args: Vec<VmValue>,
) -> Result<(Vec<VmValue>, Vec<i32>), VmError> {
    let mut printed = Vec::new();
    let results = {
        let mut vm = Vm::new(module)?;
        vm.bind_host("print", |values| {
            if let Some(VmValue::I32(v)) = values.first() {
                printed.push(*v);
            }
            None
        });
        vm.run_export("main", args)?
    };
    Ok((results, printed))
}
