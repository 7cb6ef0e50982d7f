//! Structured Intermediate Representation
//!
//! This module defines the IR produced by the frontend: a compilation unit
//! of globals, data segments, function declarations, and function
//! definitions whose bodies are trees of structured blocks. Variables are
//! plain (non-SSA) until the SSA transformer rewrites them.
//!
//! Every instruction tag fixes which of its fields are written variables
//! and which are read variables; the `written*`/`reads*` accessors are the
//! single source of truth for that distinction and every later pass relies
//! on them.

use sbc_common::{
    BinaryOp, CompareOp, ConstValue, DataId, FloatBinaryOp, FloatUnaryOp, FunctionType,
    GlobalId, ValueType, VarId,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// IR Instruction, one tag per operation kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Instruction {
    /// Merge-point pseudo-instruction: `result` takes the value of
    /// whichever operand reached this point
    Phi { result: VarId, operands: Vec<VarId> },

    /// Jump to the exit of the innermost enclosing breakable
    Break,
    /// Jump to the exit of the innermost enclosing breakable if `cond` is
    /// nonzero
    BreakIf { cond: VarId },
    /// Jump to the exit of the innermost enclosing breakable if `cond` is
    /// zero
    BreakIfFalse { cond: VarId },

    /// Direct call by function identifier
    Call {
        result: Option<VarId>,
        function: String,
        args: Vec<VarId>,
    },
    /// Call through a function pointer
    CallIndirect {
        result: Option<VarId>,
        target: VarId,
        args: Vec<VarId>,
    },

    /// Load a constant
    Const { result: VarId, value: ConstValue },
    /// Load the value of a module global
    LoadGlobal { result: VarId, global: GlobalId },
    /// Load the base address of a constant data segment
    LoadDataAddr { result: VarId, segment: DataId },
    /// Copy one variable into another
    Copy { result: VarId, source: VarId },

    /// Load a value of type `ty` from linear memory
    Load {
        result: VarId,
        ty: ValueType,
        addr: VarId,
    },
    /// Store a value of type `ty` to linear memory
    Store {
        ty: ValueType,
        addr: VarId,
        value: VarId,
    },

    /// Numeric conversion to type `to`
    Convert {
        result: VarId,
        to: ValueType,
        operand: VarId,
    },

    /// Comparison, producing an i32 boolean
    Compare {
        result: VarId,
        op: CompareOp,
        lhs: VarId,
        rhs: VarId,
    },
    /// Integer arithmetic, bitwise, or shift operation
    Binary {
        result: VarId,
        op: BinaryOp,
        lhs: VarId,
        rhs: VarId,
    },
    /// Floating-point unary operation
    FloatUnary {
        result: VarId,
        op: FloatUnaryOp,
        operand: VarId,
    },
    /// Floating-point binary operation
    FloatBinary {
        result: VarId,
        op: FloatBinaryOp,
        lhs: VarId,
        rhs: VarId,
    },

    /// Return from the function
    Return { values: Vec<VarId> },
}

impl Instruction {
    /// The variable written by this instruction, if any. No instruction
    /// writes more than one variable.
    pub fn written(&self) -> Option<VarId> {
        self.written_ref().copied()
    }

    fn written_ref(&self) -> Option<&VarId> {
        match self {
            Instruction::Phi { result, .. }
            | Instruction::Const { result, .. }
            | Instruction::LoadGlobal { result, .. }
            | Instruction::LoadDataAddr { result, .. }
            | Instruction::Copy { result, .. }
            | Instruction::Load { result, .. }
            | Instruction::Convert { result, .. }
            | Instruction::Compare { result, .. }
            | Instruction::Binary { result, .. }
            | Instruction::FloatUnary { result, .. }
            | Instruction::FloatBinary { result, .. } => Some(result),
            Instruction::Call { result, .. } | Instruction::CallIndirect { result, .. } => {
                result.as_ref()
            }
            Instruction::Break
            | Instruction::BreakIf { .. }
            | Instruction::BreakIfFalse { .. }
            | Instruction::Store { .. }
            | Instruction::Return { .. } => None,
        }
    }

    /// Mutable access to the written variable, used by the SSA write pass
    pub fn written_mut(&mut self) -> Option<&mut VarId> {
        match self {
            Instruction::Phi { result, .. }
            | Instruction::Const { result, .. }
            | Instruction::LoadGlobal { result, .. }
            | Instruction::LoadDataAddr { result, .. }
            | Instruction::Copy { result, .. }
            | Instruction::Load { result, .. }
            | Instruction::Convert { result, .. }
            | Instruction::Compare { result, .. }
            | Instruction::Binary { result, .. }
            | Instruction::FloatUnary { result, .. }
            | Instruction::FloatBinary { result, .. } => Some(result),
            Instruction::Call { result, .. } | Instruction::CallIndirect { result, .. } => {
                result.as_mut()
            }
            Instruction::Break
            | Instruction::BreakIf { .. }
            | Instruction::BreakIfFalse { .. }
            | Instruction::Store { .. }
            | Instruction::Return { .. } => None,
        }
    }

    /// The variables read by this instruction, in operand order
    pub fn reads(&self) -> Vec<VarId> {
        let mut reads = Vec::new();
        let mut clone = self.clone();
        clone.for_each_read_mut(|r| reads.push(*r));
        reads
    }

    /// Visit every read operand mutably, in operand order. Used by the SSA
    /// read pass to rewrite reads to their current SSA names.
    pub fn for_each_read_mut(&mut self, mut f: impl FnMut(&mut VarId)) {
        match self {
            Instruction::Phi { operands, .. } => {
                for op in operands {
                    f(op);
                }
            }
            Instruction::Break => {}
            Instruction::BreakIf { cond } | Instruction::BreakIfFalse { cond } => f(cond),
            Instruction::Call { args, .. } => {
                for arg in args {
                    f(arg);
                }
            }
            Instruction::CallIndirect { target, args, .. } => {
                f(target);
                for arg in args {
                    f(arg);
                }
            }
            Instruction::Const { .. }
            | Instruction::LoadGlobal { .. }
            | Instruction::LoadDataAddr { .. } => {}
            Instruction::Copy { source, .. } => f(source),
            Instruction::Load { addr, .. } => f(addr),
            Instruction::Store { addr, value, .. } => {
                f(addr);
                f(value);
            }
            Instruction::Convert { operand, .. } => f(operand),
            Instruction::Compare { lhs, rhs, .. } | Instruction::Binary { lhs, rhs, .. } => {
                f(lhs);
                f(rhs);
            }
            Instruction::FloatUnary { operand, .. } => f(operand),
            Instruction::FloatBinary { lhs, rhs, .. } => {
                f(lhs);
                f(rhs);
            }
            Instruction::Return { values } => {
                for value in values {
                    f(value);
                }
            }
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn list(vars: &[VarId]) -> String {
            vars.iter()
                .map(|v| format!("%{v}"))
                .collect::<Vec<_>>()
                .join(", ")
        }
        match self {
            Instruction::Phi { result, operands } => {
                write!(f, "%{result} = phi [{}]", list(operands))
            }
            Instruction::Break => write!(f, "break"),
            Instruction::BreakIf { cond } => write!(f, "break_if %{cond}"),
            Instruction::BreakIfFalse { cond } => write!(f, "break_if_false %{cond}"),
            Instruction::Call {
                result,
                function,
                args,
            } => {
                if let Some(result) = result {
                    write!(f, "%{result} = ")?;
                }
                write!(f, "call @{function}({})", list(args))
            }
            Instruction::CallIndirect {
                result,
                target,
                args,
            } => {
                if let Some(result) = result {
                    write!(f, "%{result} = ")?;
                }
                write!(f, "call_indirect %{target}({})", list(args))
            }
            Instruction::Const { result, value } => write!(f, "%{result} = const {value}"),
            Instruction::LoadGlobal { result, global } => {
                write!(f, "%{result} = global.get {global}")
            }
            Instruction::LoadDataAddr { result, segment } => {
                write!(f, "%{result} = data.addr {segment}")
            }
            Instruction::Copy { result, source } => write!(f, "%{result} = copy %{source}"),
            Instruction::Load { result, ty, addr } => {
                write!(f, "%{result} = {ty}.load %{addr}")
            }
            Instruction::Store { ty, addr, value } => {
                write!(f, "{ty}.store %{addr}, %{value}")
            }
            Instruction::Convert {
                result,
                to,
                operand,
            } => write!(f, "%{result} = convert %{operand} to {to}"),
            Instruction::Compare {
                result,
                op,
                lhs,
                rhs,
            } => write!(f, "%{result} = {op} %{lhs}, %{rhs}"),
            Instruction::Binary {
                result,
                op,
                lhs,
                rhs,
            } => write!(f, "%{result} = {op} %{lhs}, %{rhs}"),
            Instruction::FloatUnary {
                result,
                op,
                operand,
            } => write!(f, "%{result} = {op} %{operand}"),
            Instruction::FloatBinary {
                result,
                op,
                lhs,
                rhs,
            } => write!(f, "%{result} = f{op} %{lhs}, %{rhs}"),
            Instruction::Return { values } => write!(f, "ret [{}]", list(values)),
        }
    }
}

/// A structured block. Blocks form a tree; nesting is the only
/// control-flow mechanism.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Block {
    /// Flat instruction list
    Basic { instructions: Vec<Instruction> },
    /// Repeats its body; escape is only possible by breaking past it
    Loop { body: Vec<Block> },
    /// Single escape target for nested breaks
    Breakable { body: Vec<Block> },
    /// One conditional branch
    If { cond: VarId, then_body: Vec<Block> },
    /// Two conditional branches
    IfElse {
        cond: VarId,
        then_body: Vec<Block>,
        else_body: Vec<Block>,
    },
}

impl Block {
    pub fn basic(instructions: Vec<Instruction>) -> Self {
        Block::Basic { instructions }
    }
}

/// Definition of an internal function: its body and the types of its
/// non-argument locals. Argument types come from the matching declaration;
/// variable ids are dense, with arguments occupying `0..argc`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDefinition {
    pub name: String,
    pub local_types: Vec<ValueType>,
    pub body: Vec<Block>,
}

impl FunctionDefinition {
    /// The full variable type array: argument types followed by local types
    pub fn var_types(&self, decl: &FunctionDeclaration) -> Vec<ValueType> {
        let mut types = decl.ty.params.clone();
        types.extend(self.local_types.iter().copied());
        types
    }
}

/// Declaration of an internal or external function
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDeclaration {
    pub name: String,
    pub ty: FunctionType,
    /// Eligible for inlining by the frontend
    pub inline: bool,
    /// Exported under this name in the output module
    pub export_name: Option<String>,
    /// Referenced as an indirect-call target somewhere in the unit
    pub indirect_target: bool,
    /// May write module globals (relevant for external functions)
    pub mutates_globals: bool,
}

impl FunctionDeclaration {
    pub fn new(name: impl Into<String>, ty: FunctionType) -> Self {
        Self {
            name: name.into(),
            ty,
            inline: false,
            export_name: None,
            indirect_target: false,
            mutates_globals: false,
        }
    }

    pub fn exported_as(mut self, name: impl Into<String>) -> Self {
        self.export_name = Some(name.into());
        self
    }
}

/// A mutable module global
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalVariable {
    pub ty: ValueType,
    pub init: ConstValue,
}

/// A constant data segment at a fixed linear-memory offset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSegment {
    pub offset: u32,
    pub bytes: Vec<u8>,
}

/// A complete compilation unit, produced once by the frontend and
/// destructively rewritten in place by each pipeline stage
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CompilationUnit {
    pub globals: Vec<GlobalVariable>,
    pub data_segments: Vec<DataSegment>,
    pub external_functions: Vec<FunctionDeclaration>,
    pub function_declarations: Vec<FunctionDeclaration>,
    pub function_definitions: Vec<FunctionDefinition>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use sbc_common::BinaryOp;

    #[test]
    fn test_written_and_reads() {
        let inst = Instruction::Binary {
            result: 5,
            op: BinaryOp::Add,
            lhs: 1,
            rhs: 2,
        };
        assert_eq!(inst.written(), Some(5));
        assert_eq!(inst.reads(), vec![1, 2]);

        let inst = Instruction::Store {
            ty: ValueType::I32,
            addr: 3,
            value: 4,
        };
        assert_eq!(inst.written(), None);
        assert_eq!(inst.reads(), vec![3, 4]);

        let inst = Instruction::Call {
            result: None,
            function: "print".to_string(),
            args: vec![7],
        };
        assert_eq!(inst.written(), None);
        assert_eq!(inst.reads(), vec![7]);
    }

    #[test]
    fn test_read_rewriting_preserves_order() {
        let mut inst = Instruction::CallIndirect {
            result: Some(9),
            target: 0,
            args: vec![1, 2],
        };
        let mut seen = Vec::new();
        inst.for_each_read_mut(|r| {
            seen.push(*r);
            *r += 10;
        });
        assert_eq!(seen, vec![0, 1, 2]);
        assert_eq!(inst.reads(), vec![10, 11, 12]);
    }

    #[test]
    fn test_var_types_concatenation() {
        let decl = FunctionDeclaration::new(
            "f",
            FunctionType::new(vec![ValueType::I32, ValueType::Ptr], vec![]),
        );
        let def = FunctionDefinition {
            name: "f".to_string(),
            local_types: vec![ValueType::F64],
            body: vec![],
        };
        assert_eq!(
            def.var_types(&decl),
            vec![ValueType::I32, ValueType::Ptr, ValueType::F64]
        );
    }

    #[test]
    fn test_instruction_display() {
        let inst = Instruction::Phi {
            result: 4,
            operands: vec![1, 3],
        };
        assert_eq!(inst.to_string(), "%4 = phi [%1, %3]");

        let inst = Instruction::Call {
            result: Some(2),
            function: "f".to_string(),
            args: vec![0, 1],
        };
        assert_eq!(inst.to_string(), "%2 = call @f(%0, %1)");
    }
}
