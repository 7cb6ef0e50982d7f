//! Common types used throughout the compiler
//!
//! This module defines the data types shared across multiple compiler
//! phases: identifier aliases, the value type lattice of the SVM target,
//! constants, operator enums, and function signatures.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Pre-SSA variable identifier, dense and contiguous per function.
/// Function arguments occupy `0..argc`.
pub type VarId = u32;

/// SSA name. After the SSA transform every name has exactly one static
/// writer. Arguments are pre-seeded to names equal to their index.
pub type SsaId = u32;

/// Function index into the unit's combined import + definition space
pub type FuncId = u32;

/// Global variable index
pub type GlobalId = u32;

/// Constant data segment index
pub type DataId = u32;

/// Local slot index of a compiled SVM function
pub type SlotId = u32;

/// Value types representable in an SVM slot or on the operand stack
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ValueType {
    U32,
    I32,
    U64,
    I64,
    F32,
    F64,
    /// Data pointer (32-bit at runtime)
    Ptr,
    /// Function pointer (32-bit at runtime)
    FuncPtr,
}

impl ValueType {
    /// Check if this type is an integer type (pointers included)
    pub fn is_integer(&self) -> bool {
        !self.is_float()
    }

    /// Check if this type is a floating-point type
    pub fn is_float(&self) -> bool {
        matches!(self, ValueType::F32 | ValueType::F64)
    }

    /// Check if this type is signed
    pub fn is_signed(&self) -> bool {
        matches!(
            self,
            ValueType::I32 | ValueType::I64 | ValueType::F32 | ValueType::F64
        )
    }

    /// Check if this type occupies a 64-bit slot at runtime
    pub fn is_wide(&self) -> bool {
        matches!(self, ValueType::U64 | ValueType::I64 | ValueType::F64)
    }

    /// Size of a value of this type in linear memory, in bytes
    pub fn size_in_bytes(&self) -> u32 {
        if self.is_wide() {
            8
        } else {
            4
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueType::U32 => write!(f, "u32"),
            ValueType::I32 => write!(f, "i32"),
            ValueType::U64 => write!(f, "u64"),
            ValueType::I64 => write!(f, "i64"),
            ValueType::F32 => write!(f, "f32"),
            ValueType::F64 => write!(f, "f64"),
            ValueType::Ptr => write!(f, "ptr"),
            ValueType::FuncPtr => write!(f, "funcptr"),
        }
    }
}

/// A constant operand. Integer constants carry raw bits; signedness comes
/// from the destination variable's declared type.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ConstValue {
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    /// Address of a function, for seeding function-pointer variables
    Func(FuncId),
}

impl fmt::Display for ConstValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstValue::I32(v) => write!(f, "{v}"),
            ConstValue::I64(v) => write!(f, "{v}"),
            ConstValue::F32(v) => write!(f, "{v}"),
            ConstValue::F64(v) => write!(f, "{v}"),
            ConstValue::Func(id) => write!(f, "&fn{id}"),
        }
    }
}

/// Integer arithmetic, bitwise, and shift operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    /// Division; signedness taken from the operand type
    Div,
    /// Remainder; signedness taken from the operand type
    Rem,
    And,
    Or,
    Xor,
    Shl,
    /// Shift right; arithmetic for signed types, logical for unsigned
    Shr,
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op_str = match self {
            BinaryOp::Add => "add",
            BinaryOp::Sub => "sub",
            BinaryOp::Mul => "mul",
            BinaryOp::Div => "div",
            BinaryOp::Rem => "rem",
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
            BinaryOp::Xor => "xor",
            BinaryOp::Shl => "shl",
            BinaryOp::Shr => "shr",
        };
        write!(f, "{op_str}")
    }
}

/// Comparison operations; all produce an i32 boolean (0 or 1).
/// Orderings take their signedness from the operand type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op_str = match self {
            CompareOp::Eq => "eq",
            CompareOp::Ne => "ne",
            CompareOp::Lt => "lt",
            CompareOp::Le => "le",
            CompareOp::Gt => "gt",
            CompareOp::Ge => "ge",
        };
        write!(f, "{op_str}")
    }
}

/// Floating-point unary operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FloatUnaryOp {
    Neg,
    Abs,
    Sqrt,
    Ceil,
    Floor,
    Trunc,
    Nearest,
}

impl fmt::Display for FloatUnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op_str = match self {
            FloatUnaryOp::Neg => "neg",
            FloatUnaryOp::Abs => "abs",
            FloatUnaryOp::Sqrt => "sqrt",
            FloatUnaryOp::Ceil => "ceil",
            FloatUnaryOp::Floor => "floor",
            FloatUnaryOp::Trunc => "trunc",
            FloatUnaryOp::Nearest => "nearest",
        };
        write!(f, "{op_str}")
    }
}

/// Floating-point binary operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FloatBinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Min,
    Max,
    CopySign,
}

impl fmt::Display for FloatBinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op_str = match self {
            FloatBinaryOp::Add => "add",
            FloatBinaryOp::Sub => "sub",
            FloatBinaryOp::Mul => "mul",
            FloatBinaryOp::Div => "div",
            FloatBinaryOp::Min => "min",
            FloatBinaryOp::Max => "max",
            FloatBinaryOp::CopySign => "copysign",
        };
        write!(f, "{op_str}")
    }
}

/// A function signature: argument types and result types
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FunctionType {
    pub params: Vec<ValueType>,
    pub results: Vec<ValueType>,
}

impl FunctionType {
    pub fn new(params: Vec<ValueType>, results: Vec<ValueType>) -> Self {
        Self { params, results }
    }
}

impl fmt::Display for FunctionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, param) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{param}")?;
        }
        write!(f, ") -> (")?;
        for (i, result) in self.results.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{result}")?;
        }
        write!(f, ")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_type_classification() {
        assert!(ValueType::I32.is_integer());
        assert!(ValueType::Ptr.is_integer());
        assert!(ValueType::F64.is_float());
        assert!(!ValueType::F64.is_integer());

        assert!(ValueType::I64.is_signed());
        assert!(!ValueType::U64.is_signed());

        assert!(ValueType::I64.is_wide());
        assert!(!ValueType::Ptr.is_wide());

        assert_eq!(ValueType::U32.size_in_bytes(), 4);
        assert_eq!(ValueType::F64.size_in_bytes(), 8);
    }

    #[test]
    fn test_function_type_display() {
        let ty = FunctionType::new(vec![ValueType::I32, ValueType::Ptr], vec![ValueType::I64]);
        assert_eq!(ty.to_string(), "(i32, ptr) -> (i64)");

        let ty = FunctionType::new(vec![], vec![]);
        assert_eq!(ty.to_string(), "() -> ()");
    }

    #[test]
    fn test_const_value_display() {
        assert_eq!(ConstValue::I32(-7).to_string(), "-7");
        assert_eq!(ConstValue::Func(3).to_string(), "&fn3");
    }
}
