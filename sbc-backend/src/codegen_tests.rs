//! Codegen tests, driven through `compile` so that SSA and allocation run
//! the same way they do in production.

use crate::compile::compile;
use pretty_assertions::assert_eq;
use sbc_codegen::inst::StackInst;
use sbc_common::{
    BinaryOp, CompilerError, ConstValue, FunctionType, ValueType,
};
use sbc_ir::{
    Block, CompilationUnit, FunctionDeclaration, FunctionDefinition, Instruction,
};

fn unit(
    params: Vec<ValueType>,
    results: Vec<ValueType>,
    locals: Vec<ValueType>,
    body: Vec<Block>,
    externals: Vec<(&str, FunctionType)>,
) -> CompilationUnit {
    CompilationUnit {
        external_functions: externals
            .into_iter()
            .map(|(name, ty)| FunctionDeclaration::new(name, ty))
            .collect(),
        function_declarations: vec![
            FunctionDeclaration::new("main", FunctionType::new(params, results))
                .exported_as("main"),
        ],
        function_definitions: vec![FunctionDefinition {
            name: "main".to_string(),
            local_types: locals,
            body,
        }],
        ..Default::default()
    }
}

fn konst(result: u32, value: i32) -> Instruction {
    Instruction::Const {
        result,
        value: ConstValue::I32(value),
    }
}

#[test]
fn test_buried_operand_is_stored_and_reloaded() {
    // add(a, 1): the constant sits on top of the stack but has to end up
    // as the right-hand operand, so it goes through its slot
    let unit = unit(
        vec![ValueType::I32],
        vec![ValueType::I32],
        vec![ValueType::I32, ValueType::I32],
        vec![Block::basic(vec![
            konst(1, 1),
            Instruction::Binary {
                result: 2,
                op: BinaryOp::Add,
                lhs: 0,
                rhs: 1,
            },
            Instruction::Return { values: vec![2] },
        ])],
        vec![],
    );
    let module = compile(unit).unwrap();
    assert_eq!(
        module.functions[0].code,
        vec![
            StackInst::Const(ConstValue::I32(1)),
            StackInst::LocalSet(1),
            StackInst::LocalGet(0),
            StackInst::LocalGet(1),
            StackInst::Binary(ValueType::I32, BinaryOp::Add),
            StackInst::Return,
        ]
    );
}

#[test]
fn test_adjacent_values_stay_on_stack() {
    // both operands are produced immediately before their use and are
    // consumed straight off the stack, no stores at all
    let unit = unit(
        vec![],
        vec![ValueType::I32],
        vec![ValueType::I32; 4],
        vec![Block::basic(vec![
            konst(1, 2),
            konst(2, 3),
            Instruction::Binary {
                result: 3,
                op: BinaryOp::Add,
                lhs: 1,
                rhs: 2,
            },
            Instruction::Return { values: vec![3] },
        ])],
        vec![],
    );
    let module = compile(unit).unwrap();
    assert_eq!(
        module.functions[0].code,
        vec![
            StackInst::Const(ConstValue::I32(2)),
            StackInst::Const(ConstValue::I32(3)),
            StackInst::Binary(ValueType::I32, BinaryOp::Add),
            StackInst::Return,
        ]
    );
}

#[test]
fn test_duplicate_operand_forces_store() {
    // square(x) reads the pending value twice; the only safe rendering is
    // store once, load twice
    let unit = unit(
        vec![],
        vec![ValueType::I32],
        vec![ValueType::I32; 3],
        vec![Block::basic(vec![
            konst(1, 3),
            Instruction::Binary {
                result: 2,
                op: BinaryOp::Mul,
                lhs: 1,
                rhs: 1,
            },
            Instruction::Return { values: vec![2] },
        ])],
        vec![],
    );
    let module = compile(unit).unwrap();
    assert_eq!(
        module.functions[0].code,
        vec![
            StackInst::Const(ConstValue::I32(3)),
            StackInst::LocalSet(0),
            StackInst::LocalGet(0),
            StackInst::LocalGet(0),
            StackInst::Binary(ValueType::I32, BinaryOp::Mul),
            StackInst::Return,
        ]
    );
}

#[test]
fn test_dead_value_dropped_at_region_boundary() {
    let unit = unit(
        vec![ValueType::I32],
        vec![],
        vec![ValueType::I32],
        vec![
            Block::basic(vec![konst(1, 5)]),
            Block::If {
                cond: 0,
                then_body: vec![],
            },
            Block::basic(vec![Instruction::Return { values: vec![] }]),
        ],
        vec![],
    );
    let module = compile(unit).unwrap();
    assert_eq!(
        module.functions[0].code,
        vec![
            StackInst::Const(ConstValue::I32(5)),
            StackInst::Drop,
            StackInst::LocalGet(0),
            StackInst::If {
                then_body: vec![],
                else_body: vec![],
            },
            StackInst::Return,
        ]
    );
}

#[test]
fn test_break_depth_counts_regions() {
    let unit = unit(
        vec![ValueType::I32],
        vec![],
        vec![],
        vec![
            Block::Breakable {
                body: vec![Block::Loop {
                    body: vec![Block::basic(vec![Instruction::BreakIf { cond: 0 }])],
                }],
            },
            Block::basic(vec![Instruction::Return { values: vec![] }]),
        ],
        vec![],
    );
    let module = compile(unit).unwrap();
    assert_eq!(
        module.functions[0].code,
        vec![
            StackInst::Block(vec![StackInst::Loop(vec![
                StackInst::LocalGet(0),
                StackInst::BrIf(1),
            ])]),
            StackInst::Return,
        ]
    );
}

#[test]
fn test_unbound_call_result_is_dropped() {
    let unit = unit(
        vec![],
        vec![],
        vec![],
        vec![Block::basic(vec![
            Instruction::Call {
                result: None,
                function: "rand".to_string(),
                args: vec![],
            },
            Instruction::Return { values: vec![] },
        ])],
        vec![("rand", FunctionType::new(vec![], vec![ValueType::I32]))],
    );
    let module = compile(unit).unwrap();
    assert_eq!(
        module.functions[0].code,
        vec![StackInst::Call(0), StackInst::Drop, StackInst::Return]
    );
}

#[test]
fn test_call_arity_mismatch_is_rejected() {
    let unit = unit(
        vec![],
        vec![],
        vec![],
        vec![Block::basic(vec![
            Instruction::Call {
                result: None,
                function: "print".to_string(),
                args: vec![],
            },
            Instruction::Return { values: vec![] },
        ])],
        vec![("print", FunctionType::new(vec![ValueType::I32], vec![]))],
    );
    let err = compile(unit).unwrap_err();
    assert!(matches!(err, CompilerError::Internal { .. }));
}

#[test]
fn test_indirect_call_is_unsupported() {
    let unit = unit(
        vec![ValueType::FuncPtr],
        vec![],
        vec![],
        vec![Block::basic(vec![
            Instruction::CallIndirect {
                result: None,
                target: 0,
                args: vec![],
            },
            Instruction::Return { values: vec![] },
        ])],
        vec![],
    );
    let err = compile(unit).unwrap_err();
    assert!(matches!(err, CompilerError::Unsupported { .. }));
}

#[test]
fn test_module_tables() {
    let mut helper =
        FunctionDeclaration::new("helper", FunctionType::new(vec![], vec![]));
    helper.indirect_target = true;
    let unit = CompilationUnit {
        external_functions: vec![FunctionDeclaration::new(
            "print",
            FunctionType::new(vec![ValueType::I32], vec![]),
        )],
        function_declarations: vec![
            FunctionDeclaration::new("main", FunctionType::new(vec![], vec![]))
                .exported_as("main"),
            helper,
        ],
        function_definitions: vec![
            FunctionDefinition {
                name: "main".to_string(),
                local_types: vec![],
                body: vec![Block::basic(vec![Instruction::Return { values: vec![] }])],
            },
            FunctionDefinition {
                name: "helper".to_string(),
                local_types: vec![],
                body: vec![Block::basic(vec![Instruction::Return { values: vec![] }])],
            },
        ],
        ..Default::default()
    };
    let module = compile(unit).unwrap();

    assert_eq!(module.imports.len(), 1);
    assert_eq!(module.imports[0].name, "print");
    assert_eq!(module.exports.len(), 1);
    assert_eq!(module.exports[0].name, "main");
    assert_eq!(module.exports[0].func, 1);
    assert_eq!(module.indirect_table, vec![2]);
    assert_eq!(module.import_count(), 1);
}
