//! SVM Instruction Definitions
//!
//! The SVM is a structured stack machine: instructions consume and produce
//! values through an implicit operand stack, locals are indexed mutable
//! slots (arguments occupy the first slots), and control flow is expressed
//! through properly nested `Block`/`Loop`/`If` constructs rather than
//! arbitrary jumps. Branches are depth-relative: `Br(n)` exits the n-th
//! enclosing construct, counting from the innermost at depth 0.
//!
//! A `Loop` repeats its body when execution falls off the end; the only way
//! out is a branch past it. Every structural construct requires an empty
//! operand-stack signature at its boundary.

use sbc_common::{
    BinaryOp, CompareOp, ConstValue, DataId, FloatBinaryOp, FloatUnaryOp, FuncId, GlobalId,
    SlotId, ValueType,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One SVM instruction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StackInst {
    /// Push a constant
    Const(ConstValue),

    /// Push the value of a local slot
    LocalGet(SlotId),
    /// Pop into a local slot
    LocalSet(SlotId),
    /// Pop and discard the top of stack
    Drop,

    /// Push the value of a module global
    GlobalGet(GlobalId),
    /// Push the base address of a constant data segment
    DataAddr(DataId),

    /// Pop an address, push the value loaded from linear memory
    Load(ValueType),
    /// Pop a value then an address, store the value to linear memory
    Store(ValueType),

    /// Pop a value of type `from`, push it converted to type `to`
    Convert { from: ValueType, to: ValueType },

    /// Pop two operands of the given type, push an i32 boolean
    Compare(ValueType, CompareOp),
    /// Pop two integer operands, push the result
    Binary(ValueType, BinaryOp),
    /// Pop one float operand, push the result
    FloatUnary(ValueType, FloatUnaryOp),
    /// Pop two float operands, push the result
    FloatBinary(ValueType, FloatBinaryOp),

    /// Breakable region; a branch targeting it resumes after its end
    Block(Vec<StackInst>),
    /// Looping region; falls through back to its own start
    Loop(Vec<StackInst>),
    /// Pop an i32 condition; run `then_body` if nonzero, else `else_body`
    If {
        then_body: Vec<StackInst>,
        else_body: Vec<StackInst>,
    },

    /// Exit the n-th enclosing construct
    Br(u32),
    /// Pop an i32 condition; exit the n-th enclosing construct if nonzero
    BrIf(u32),

    /// Call a function by index (imports first, then internal functions)
    Call(FuncId),
    /// Return from the current function, with its results on the stack
    Return,
}

impl StackInst {
    /// Render a nested instruction sequence with one instruction per line
    pub fn render(code: &[StackInst]) -> String {
        let mut out = String::new();
        Self::render_into(code, 0, &mut out);
        out
    }

    fn render_into(code: &[StackInst], depth: usize, out: &mut String) {
        for inst in code {
            for _ in 0..depth {
                out.push_str("  ");
            }
            match inst {
                StackInst::Block(body) => {
                    out.push_str("block\n");
                    Self::render_into(body, depth + 1, out);
                    for _ in 0..depth {
                        out.push_str("  ");
                    }
                    out.push_str("end\n");
                }
                StackInst::Loop(body) => {
                    out.push_str("loop\n");
                    Self::render_into(body, depth + 1, out);
                    for _ in 0..depth {
                        out.push_str("  ");
                    }
                    out.push_str("end\n");
                }
                StackInst::If {
                    then_body,
                    else_body,
                } => {
                    out.push_str("if\n");
                    Self::render_into(then_body, depth + 1, out);
                    if !else_body.is_empty() {
                        for _ in 0..depth {
                            out.push_str("  ");
                        }
                        out.push_str("else\n");
                        Self::render_into(else_body, depth + 1, out);
                    }
                    for _ in 0..depth {
                        out.push_str("  ");
                    }
                    out.push_str("end\n");
                }
                other => {
                    out.push_str(&other.to_string());
                    out.push('\n');
                }
            }
        }
    }
}

impl fmt::Display for StackInst {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StackInst::Const(v) => write!(f, "const {v}"),
            StackInst::LocalGet(slot) => write!(f, "local.get {slot}"),
            StackInst::LocalSet(slot) => write!(f, "local.set {slot}"),
            StackInst::Drop => write!(f, "drop"),
            StackInst::GlobalGet(id) => write!(f, "global.get {id}"),
            StackInst::DataAddr(id) => write!(f, "data.addr {id}"),
            StackInst::Load(ty) => write!(f, "{ty}.load"),
            StackInst::Store(ty) => write!(f, "{ty}.store"),
            StackInst::Convert { from, to } => write!(f, "convert {from} -> {to}"),
            StackInst::Compare(ty, op) => write!(f, "{ty}.{op}"),
            StackInst::Binary(ty, op) => write!(f, "{ty}.{op}"),
            StackInst::FloatUnary(ty, op) => write!(f, "{ty}.{op}"),
            StackInst::FloatBinary(ty, op) => write!(f, "{ty}.{op}"),
            StackInst::Block(_) => write!(f, "block ... end"),
            StackInst::Loop(_) => write!(f, "loop ... end"),
            StackInst::If { .. } => write!(f, "if ... end"),
            StackInst::Br(depth) => write!(f, "br {depth}"),
            StackInst::BrIf(depth) => write!(f, "br_if {depth}"),
            StackInst::Call(id) => write!(f, "call {id}"),
            StackInst::Return => write!(f, "return"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sbc_common::ValueType;

    #[test]
    fn test_display() {
        assert_eq!(StackInst::LocalGet(2).to_string(), "local.get 2");
        assert_eq!(
            StackInst::Binary(ValueType::I32, BinaryOp::Add).to_string(),
            "i32.add"
        );
        assert_eq!(
            StackInst::Compare(ValueType::U32, CompareOp::Lt).to_string(),
            "u32.lt"
        );
        assert_eq!(
            StackInst::Convert {
                from: ValueType::I32,
                to: ValueType::F64
            }
            .to_string(),
            "convert i32 -> f64"
        );
    }

    #[test]
    fn test_render_nesting() {
        let code = vec![StackInst::Block(vec![StackInst::Loop(vec![
            StackInst::LocalGet(0),
            StackInst::BrIf(1),
        ])])];
        let rendered = StackInst::render(&code);
        assert_eq!(
            rendered,
            "block\n  loop\n    local.get 0\n    br_if 1\n  end\nend\n"
        );
    }
}
