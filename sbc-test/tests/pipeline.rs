//! Whole-pipeline tests: structured IR in, interpreted execution out.

use pretty_assertions::assert_eq;
use sbc_backend::compile;
use sbc_common::{BinaryOp, CompareOp, ConstValue, ValueType};
use sbc_ir::{
    Block, CompilationUnit, DataSegment, FunctionDefinition, GlobalVariable, Instruction,
};
use sbc_test::{main_decl, print_import, run_main};
use svm::VmValue;

fn konst(result: u32, value: i32) -> Instruction {
    Instruction::Const {
        result,
        value: ConstValue::I32(value),
    }
}

/// main(n): i = 0; while (i < n) { print(i); i = i + 2; }
fn even_numbers_unit() -> CompilationUnit {
    CompilationUnit {
        external_functions: vec![print_import()],
        function_declarations: vec![main_decl(vec![ValueType::I32], vec![])],
        function_definitions: vec![FunctionDefinition {
            name: "main".to_string(),
            local_types: vec![ValueType::I32; 3],
            body: vec![
                Block::basic(vec![konst(1, 0)]),
                Block::Breakable {
                    body: vec![Block::Loop {
                        body: vec![Block::basic(vec![
                            Instruction::Compare {
                                result: 2,
                                op: CompareOp::Lt,
                                lhs: 1,
                                rhs: 0,
                            },
                            Instruction::BreakIfFalse { cond: 2 },
                            Instruction::Call {
                                result: None,
                                function: "print".to_string(),
                                args: vec![1],
                            },
                            konst(3, 2),
                            Instruction::Binary {
                                result: 1,
                                op: BinaryOp::Add,
                                lhs: 1,
                                rhs: 3,
                            },
                        ])],
                    }],
                },
                Block::basic(vec![Instruction::Return { values: vec![] }]),
            ],
        }],
        ..Default::default()
    }
}

#[test]
fn test_even_numbers_loop() {
    let module = compile(even_numbers_unit()).unwrap();
    let (results, printed) = run_main(&module, vec![VmValue::I32(12)]).unwrap();
    assert_eq!(results, vec![]);
    assert_eq!(printed, vec![0, 2, 4, 6, 8, 10]);

    let (_, printed) = run_main(&module, vec![VmValue::I32(10)]).unwrap();
    assert_eq!(printed, vec![0, 2, 4, 6, 8]);

    // odd bound: the last even number below it is still printed
    let (_, printed) = run_main(&module, vec![VmValue::I32(7)]).unwrap();
    assert_eq!(printed, vec![0, 2, 4, 6]);
}

#[test]
fn test_loop_with_zero_iterations() {
    let module = compile(even_numbers_unit()).unwrap();
    let (_, printed) = run_main(&module, vec![VmValue::I32(0)]).unwrap();
    assert_eq!(printed, Vec::<i32>::new());
}

#[test]
fn test_if_else_selects_branch() {
    // main(a): if (a) { r = 10 } else { r = 20 }; return r
    let unit = CompilationUnit {
        function_declarations: vec![main_decl(vec![ValueType::I32], vec![ValueType::I32])],
        function_definitions: vec![FunctionDefinition {
            name: "main".to_string(),
            local_types: vec![ValueType::I32],
            body: vec![
                Block::IfElse {
                    cond: 0,
                    then_body: vec![Block::basic(vec![konst(1, 10)])],
                    else_body: vec![Block::basic(vec![konst(1, 20)])],
                },
                Block::basic(vec![Instruction::Return { values: vec![1] }]),
            ],
        }],
        ..Default::default()
    };
    let module = compile(unit).unwrap();

    let (results, _) = run_main(&module, vec![VmValue::I32(5)]).unwrap();
    assert_eq!(results, vec![VmValue::I32(10)]);
    let (results, _) = run_main(&module, vec![VmValue::I32(0)]).unwrap();
    assert_eq!(results, vec![VmValue::I32(20)]);
}

#[test]
fn test_globals_and_data_segments() {
    // return g + *data, with g = 11 and the segment holding a 2
    let unit = CompilationUnit {
        globals: vec![GlobalVariable {
            ty: ValueType::I32,
            init: ConstValue::I32(11),
        }],
        data_segments: vec![DataSegment {
            offset: 8,
            bytes: vec![2, 0, 0, 0],
        }],
        function_declarations: vec![main_decl(vec![], vec![ValueType::I32])],
        function_definitions: vec![FunctionDefinition {
            name: "main".to_string(),
            local_types: vec![
                ValueType::I32,
                ValueType::Ptr,
                ValueType::I32,
                ValueType::I32,
            ],
            body: vec![Block::basic(vec![
                Instruction::LoadGlobal {
                    result: 0,
                    global: 0,
                },
                Instruction::LoadDataAddr {
                    result: 1,
                    segment: 0,
                },
                Instruction::Load {
                    result: 2,
                    ty: ValueType::I32,
                    addr: 1,
                },
                Instruction::Binary {
                    result: 3,
                    op: BinaryOp::Add,
                    lhs: 0,
                    rhs: 2,
                },
                Instruction::Return { values: vec![3] },
            ])],
        }],
        ..Default::default()
    };
    let module = compile(unit).unwrap();
    let (results, _) = run_main(&module, vec![]).unwrap();
    assert_eq!(results, vec![VmValue::I32(13)]);
}

#[test]
fn test_internal_function_call() {
    // helper(a) = a + 1; main() = helper(41)
    let unit = CompilationUnit {
        function_declarations: vec![
            main_decl(vec![], vec![ValueType::I32]),
            sbc_ir::FunctionDeclaration::new(
                "helper",
                sbc_common::FunctionType::new(vec![ValueType::I32], vec![ValueType::I32]),
            ),
        ],
        function_definitions: vec![
            FunctionDefinition {
                name: "main".to_string(),
                local_types: vec![ValueType::I32, ValueType::I32],
                body: vec![Block::basic(vec![
                    konst(0, 41),
                    Instruction::Call {
                        result: Some(1),
                        function: "helper".to_string(),
                        args: vec![0],
                    },
                    Instruction::Return { values: vec![1] },
                ])],
            },
            FunctionDefinition {
                name: "helper".to_string(),
                local_types: vec![ValueType::I32, ValueType::I32],
                body: vec![Block::basic(vec![
                    konst(1, 1),
                    Instruction::Binary {
                        result: 2,
                        op: BinaryOp::Add,
                        lhs: 0,
                        rhs: 1,
                    },
                    Instruction::Return { values: vec![2] },
                ])],
            },
        ],
        ..Default::default()
    };
    let module = compile(unit).unwrap();
    let (results, _) = run_main(&module, vec![]).unwrap();
    assert_eq!(results, vec![VmValue::I32(42)]);
}

#[test]
fn test_nested_breakables() {
    // main(a): two nested breakables; the inner break leaves only the
    // inner region, the outer break leaves both
    let unit = CompilationUnit {
        external_functions: vec![print_import()],
        function_declarations: vec![main_decl(vec![ValueType::I32], vec![])],
        function_definitions: vec![FunctionDefinition {
            name: "main".to_string(),
            local_types: vec![],
            body: vec![
                Block::Breakable {
                    body: vec![
                        Block::Breakable {
                            body: vec![Block::basic(vec![
                                Instruction::BreakIf { cond: 0 },
                                Instruction::Call {
                                    result: None,
                                    function: "print".to_string(),
                                    args: vec![0],
                                },
                            ])],
                        },
                        Block::basic(vec![Instruction::Call {
                            result: None,
                            function: "print".to_string(),
                            args: vec![0],
                        }]),
                    ],
                },
                Block::basic(vec![Instruction::Return { values: vec![] }]),
            ],
        }],
        ..Default::default()
    };
    let module = compile(unit).unwrap();

    // taken inner break skips the first print only
    let (_, printed) = run_main(&module, vec![VmValue::I32(9)]).unwrap();
    assert_eq!(printed, vec![9]);
    // no break: both prints run
    let (_, printed) = run_main(&module, vec![VmValue::I32(0)]).unwrap();
    assert_eq!(printed, vec![0, 0]);
}

#[test]
fn test_compilation_is_deterministic() {
    let a = compile(even_numbers_unit()).unwrap();
    let b = compile(even_numbers_unit()).unwrap();
    assert_eq!(
        serde_json::to_string(&a).unwrap(),
        serde_json::to_string(&b).unwrap()
    );
}
