//! Stack machine interpreter.
//!
//! Values live on a per-frame operand stack; structured instructions
//! (block, loop, if) are executed by recursing into their bodies and
//! propagating a `Flow` outcome upwards. A branch of depth `n` unwinds
//! `n` nested regions before being consumed; the operand stack is
//! truncated to the region's entry height whenever a region is left, so
//! branches can never leak values.
//!
//! Imported functions are bound to host closures by name before running.

use log::trace;
use sbc_codegen::inst::StackInst;
use sbc_codegen::module::StackModule;
use sbc_common::{BinaryOp, CompareOp, ConstValue, FloatBinaryOp, FloatUnaryOp, FuncId, ValueType};
use std::collections::HashMap;
use thiserror::Error;

/// Linear memory size, one 64 KiB page
pub const MEMORY_SIZE: usize = 64 * 1024;

/// A runtime value. Narrow integers (and pointers) are i32-backed; their
/// signedness is reinterpreted per instruction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum VmValue {
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
}

impl VmValue {
    fn from_const(value: &ConstValue) -> VmValue {
        match value {
            ConstValue::I32(v) => VmValue::I32(*v),
            ConstValue::I64(v) => VmValue::I64(*v),
            ConstValue::F32(v) => VmValue::F32(*v),
            ConstValue::F64(v) => VmValue::F64(*v),
            ConstValue::Func(id) => VmValue::I32(*id as i32),
        }
    }

    fn zero(ty: ValueType) -> VmValue {
        match ty {
            ValueType::F32 => VmValue::F32(0.0),
            ValueType::F64 => VmValue::F64(0.0),
            _ if ty.is_wide() => VmValue::I64(0),
            _ => VmValue::I32(0),
        }
    }
}

#[derive(Debug, Error)]
pub enum VmError {
    #[error("operand stack underflow")]
    StackUnderflow,
    #[error("type mismatch: expected {expected} operand")]
    TypeMismatch { expected: &'static str },
    #[error("memory access out of bounds at address {addr:#x}")]
    OutOfBounds { addr: u32 },
    #[error("integer division by zero")]
    DivisionByZero,
    #[error("unknown function index {0}")]
    UnknownFunction(FuncId),
    #[error("unknown export '{0}'")]
    UnknownExport(String),
    #[error("no host binding for import '{0}'")]
    MissingHost(String),
    #[error("function '{0}' called with the wrong number of arguments")]
    ArityMismatch(String),
    #[error("unknown global index {0}")]
    UnknownGlobal(u32),
    #[error("unknown data segment index {0}")]
    UnknownSegment(u32),
    #[error("branch depth {0} escapes the function body")]
    BranchEscape(u32),
}

/// Outcome of executing an instruction sequence
enum Flow {
    Next,
    Br(u32),
    Return,
}

struct Frame {
    locals: Vec<VmValue>,
    stack: Vec<VmValue>,
}

impl Frame {
    fn pop(&mut self) -> Result<VmValue, VmError> {
        self.stack.pop().ok_or(VmError::StackUnderflow)
    }

    fn pop_i32(&mut self) -> Result<i32, VmError> {
        match self.pop()? {
            VmValue::I32(v) => Ok(v),
            _ => Err(VmError::TypeMismatch { expected: "i32" }),
        }
    }
}

type HostFn<'h> = Box<dyn FnMut(&[VmValue]) -> Option<VmValue> + 'h>;

/// An instantiated module: globals, linear memory, and host bindings
pub struct Vm<'m, 'h> {
    module: &'m StackModule,
    pub globals: Vec<VmValue>,
    pub memory: Vec<u8>,
    hosts: HashMap<String, HostFn<'h>>,
}

impl<'m, 'h> Vm<'m, 'h> {
    pub fn new(module: &'m StackModule) -> Result<Self, VmError> {
        let globals = module
            .globals
            .iter()
            .map(|g| VmValue::from_const(&g.init))
            .collect();
        let mut memory = vec![0u8; MEMORY_SIZE];
        for segment in &module.data {
            let start = segment.offset as usize;
            let end = start + segment.bytes.len();
            if end > memory.len() {
                return Err(VmError::OutOfBounds {
                    addr: segment.offset,
                });
            }
            memory[start..end].copy_from_slice(&segment.bytes);
        }
        Ok(Self {
            module,
            globals,
            memory,
            hosts: HashMap::new(),
        })
    }

    /// Bind a host closure to an imported function name
    pub fn bind_host(
        &mut self,
        name: impl Into<String>,
        host: impl FnMut(&[VmValue]) -> Option<VmValue> + 'h,
    ) {
        self.hosts.insert(name.into(), Box::new(host));
    }

    /// Run an exported function
    pub fn run_export(&mut self, name: &str, args: Vec<VmValue>) -> Result<Vec<VmValue>, VmError> {
        let func = self
            .module
            .exports
            .iter()
            .find(|e| e.name == name)
            .map(|e| e.func)
            .ok_or_else(|| VmError::UnknownExport(name.to_string()))?;
        self.call(func, args)
    }

    /// Call a function by index (imports bound to hosts, internal
    /// functions interpreted)
    pub fn call(&mut self, func: FuncId, args: Vec<VmValue>) -> Result<Vec<VmValue>, VmError> {
        let module = self.module;
        let import_count = module.import_count();
        if func < import_count {
            let name = &module.imports[func as usize].name;
            trace!("vm: host call '{name}'");
            let host = self
                .hosts
                .get_mut(name)
                .ok_or_else(|| VmError::MissingHost(name.clone()))?;
            return Ok(host(&args).into_iter().collect());
        }

        let function = module
            .functions
            .get((func - import_count) as usize)
            .ok_or(VmError::UnknownFunction(func))?;
        if args.len() != function.ty.params.len() {
            return Err(VmError::ArityMismatch(function.name.clone()));
        }
        trace!("vm: enter '{}'", function.name);
        let mut locals = args;
        locals.extend(function.locals.iter().map(|ty| VmValue::zero(*ty)));
        let mut frame = Frame {
            locals,
            stack: Vec::new(),
        };
        match self.run_seq(&function.code, &mut frame)? {
            Flow::Br(depth) => return Err(VmError::BranchEscape(depth)),
            Flow::Next | Flow::Return => {}
        }
        let mut results = Vec::with_capacity(function.ty.results.len());
        for _ in 0..function.ty.results.len() {
            results.push(frame.pop()?);
        }
        results.reverse();
        Ok(results)
    }

    fn run_seq(&mut self, code: &[StackInst], frame: &mut Frame) -> Result<Flow, VmError> {
        for inst in code {
            match self.step(inst, frame)? {
                Flow::Next => {}
                flow => return Ok(flow),
            }
        }
        Ok(Flow::Next)
    }

    fn step(&mut self, inst: &StackInst, frame: &mut Frame) -> Result<Flow, VmError> {
        match inst {
            StackInst::Const(value) => frame.stack.push(VmValue::from_const(value)),
            StackInst::LocalGet(slot) => {
                let value = *frame
                    .locals
                    .get(*slot as usize)
                    .ok_or(VmError::StackUnderflow)?;
                frame.stack.push(value);
            }
            StackInst::LocalSet(slot) => {
                let value = frame.pop()?;
                let dst = frame
                    .locals
                    .get_mut(*slot as usize)
                    .ok_or(VmError::StackUnderflow)?;
                *dst = value;
            }
            StackInst::Drop => {
                frame.pop()?;
            }
            StackInst::GlobalGet(global) => {
                let value = *self
                    .globals
                    .get(*global as usize)
                    .ok_or(VmError::UnknownGlobal(*global))?;
                frame.stack.push(value);
            }
            StackInst::DataAddr(segment) => {
                let seg = self
                    .module
                    .data
                    .get(*segment as usize)
                    .ok_or(VmError::UnknownSegment(*segment))?;
                frame.stack.push(VmValue::I32(seg.offset as i32));
            }
            StackInst::Load(ty) => {
                let addr = frame.pop_i32()? as u32;
                let value = self.load(*ty, addr)?;
                frame.stack.push(value);
            }
            StackInst::Store(ty) => {
                let value = frame.pop()?;
                let addr = frame.pop_i32()? as u32;
                self.store(*ty, addr, value)?;
            }
            StackInst::Convert { from, to } => {
                let value = frame.pop()?;
                frame.stack.push(convert(*from, *to, value)?);
            }
            StackInst::Compare(ty, op) => {
                let rhs = frame.pop()?;
                let lhs = frame.pop()?;
                frame.stack.push(compare(*ty, *op, lhs, rhs)?);
            }
            StackInst::Binary(ty, op) => {
                let rhs = frame.pop()?;
                let lhs = frame.pop()?;
                frame.stack.push(binary(*ty, *op, lhs, rhs)?);
            }
            StackInst::FloatUnary(ty, op) => {
                let value = frame.pop()?;
                frame.stack.push(float_unary(*ty, *op, value)?);
            }
            StackInst::FloatBinary(ty, op) => {
                let rhs = frame.pop()?;
                let lhs = frame.pop()?;
                frame.stack.push(float_binary(*ty, *op, lhs, rhs)?);
            }
            StackInst::Block(body) => {
                let height = frame.stack.len();
                match self.run_seq(body, frame)? {
                    Flow::Next | Flow::Br(0) => frame.stack.truncate(height),
                    Flow::Br(depth) => return Ok(Flow::Br(depth - 1)),
                    Flow::Return => return Ok(Flow::Return),
                }
            }
            StackInst::Loop(body) => {
                let height = frame.stack.len();
                loop {
                    match self.run_seq(body, frame)? {
                        // falling off the end repeats the loop
                        Flow::Next => frame.stack.truncate(height),
                        Flow::Br(0) => {
                            frame.stack.truncate(height);
                            break;
                        }
                        Flow::Br(depth) => return Ok(Flow::Br(depth - 1)),
                        Flow::Return => return Ok(Flow::Return),
                    }
                }
            }
            StackInst::If {
                then_body,
                else_body,
            } => {
                let cond = frame.pop_i32()?;
                let body = if cond != 0 { then_body } else { else_body };
                let height = frame.stack.len();
                match self.run_seq(body, frame)? {
                    Flow::Next | Flow::Br(0) => frame.stack.truncate(height),
                    Flow::Br(depth) => return Ok(Flow::Br(depth - 1)),
                    Flow::Return => return Ok(Flow::Return),
                }
            }
            StackInst::Br(depth) => return Ok(Flow::Br(*depth)),
            StackInst::BrIf(depth) => {
                if frame.pop_i32()? != 0 {
                    return Ok(Flow::Br(*depth));
                }
            }
            StackInst::Call(func) => {
                let params = self
                    .module
                    .signature(*func)
                    .ok_or(VmError::UnknownFunction(*func))?
                    .params
                    .len();
                let mut args = Vec::with_capacity(params);
                for _ in 0..params {
                    args.push(frame.pop()?);
                }
                args.reverse();
                let results = self.call(*func, args)?;
                frame.stack.extend(results);
            }
            StackInst::Return => return Ok(Flow::Return),
        }
        Ok(Flow::Next)
    }

    fn load(&self, ty: ValueType, addr: u32) -> Result<VmValue, VmError> {
        let bytes = self.slice(addr, ty.size_in_bytes())?;
        Ok(match ty {
            ValueType::F32 => {
                VmValue::F32(f32::from_le_bytes(bytes.try_into().unwrap_or([0; 4])))
            }
            ValueType::F64 => {
                VmValue::F64(f64::from_le_bytes(bytes.try_into().unwrap_or([0; 8])))
            }
            _ if ty.is_wide() => {
                VmValue::I64(i64::from_le_bytes(bytes.try_into().unwrap_or([0; 8])))
            }
            _ => VmValue::I32(i32::from_le_bytes(bytes.try_into().unwrap_or([0; 4]))),
        })
    }

    fn store(&mut self, ty: ValueType, addr: u32, value: VmValue) -> Result<(), VmError> {
        let size = ty.size_in_bytes();
        // bounds are checked before the value shape
        self.slice(addr, size)?;
        let start = addr as usize;
        match (ty, value) {
            (ValueType::F32, VmValue::F32(v)) => {
                self.memory[start..start + 4].copy_from_slice(&v.to_le_bytes());
            }
            (ValueType::F64, VmValue::F64(v)) => {
                self.memory[start..start + 8].copy_from_slice(&v.to_le_bytes());
            }
            (_, VmValue::I64(v)) if ty.is_wide() => {
                self.memory[start..start + 8].copy_from_slice(&v.to_le_bytes());
            }
            (_, VmValue::I32(v)) if ty.is_integer() && !ty.is_wide() => {
                self.memory[start..start + 4].copy_from_slice(&v.to_le_bytes());
            }
            _ => {
                return Err(VmError::TypeMismatch {
                    expected: "matching store operand",
                })
            }
        }
        Ok(())
    }

    fn slice(&self, addr: u32, size: u32) -> Result<&[u8], VmError> {
        let start = addr as usize;
        let end = start
            .checked_add(size as usize)
            .ok_or(VmError::OutOfBounds { addr })?;
        if end > self.memory.len() {
            return Err(VmError::OutOfBounds { addr });
        }
        Ok(&self.memory[start..end])
    }
}

fn binary(ty: ValueType, op: BinaryOp, lhs: VmValue, rhs: VmValue) -> Result<VmValue, VmError> {
    if ty.is_float() {
        return Err(VmError::TypeMismatch {
            expected: "integer",
        });
    }
    if ty.is_wide() {
        let (a, b) = match (lhs, rhs) {
            (VmValue::I64(a), VmValue::I64(b)) => (a, b),
            _ => return Err(VmError::TypeMismatch { expected: "i64" }),
        };
        Ok(VmValue::I64(int64_op(op, a, b, ty.is_signed())?))
    } else {
        let (a, b) = match (lhs, rhs) {
            (VmValue::I32(a), VmValue::I32(b)) => (a, b),
            _ => return Err(VmError::TypeMismatch { expected: "i32" }),
        };
        Ok(VmValue::I32(int32_op(op, a, b, ty.is_signed())?))
    }
}

fn int32_op(op: BinaryOp, a: i32, b: i32, signed: bool) -> Result<i32, VmError> {
    Ok(match op {
        BinaryOp::Add => a.wrapping_add(b),
        BinaryOp::Sub => a.wrapping_sub(b),
        BinaryOp::Mul => a.wrapping_mul(b),
        BinaryOp::Div => {
            if b == 0 {
                return Err(VmError::DivisionByZero);
            }
            if signed {
                a.wrapping_div(b)
            } else {
                ((a as u32) / (b as u32)) as i32
            }
        }
        BinaryOp::Rem => {
            if b == 0 {
                return Err(VmError::DivisionByZero);
            }
            if signed {
                a.wrapping_rem(b)
            } else {
                ((a as u32) % (b as u32)) as i32
            }
        }
        BinaryOp::And => a & b,
        BinaryOp::Or => a | b,
        BinaryOp::Xor => a ^ b,
        BinaryOp::Shl => a.wrapping_shl(b as u32),
        BinaryOp::Shr => {
            if signed {
                a.wrapping_shr(b as u32)
            } else {
                ((a as u32).wrapping_shr(b as u32)) as i32
            }
        }
    })
}

fn int64_op(op: BinaryOp, a: i64, b: i64, signed: bool) -> Result<i64, VmError> {
    Ok(match op {
        BinaryOp::Add => a.wrapping_add(b),
        BinaryOp::Sub => a.wrapping_sub(b),
        BinaryOp::Mul => a.wrapping_mul(b),
        BinaryOp::Div => {
            if b == 0 {
                return Err(VmError::DivisionByZero);
            }
            if signed {
                a.wrapping_div(b)
            } else {
                ((a as u64) / (b as u64)) as i64
            }
        }
        BinaryOp::Rem => {
            if b == 0 {
                return Err(VmError::DivisionByZero);
            }
            if signed {
                a.wrapping_rem(b)
            } else {
                ((a as u64) % (b as u64)) as i64
            }
        }
        BinaryOp::And => a & b,
        BinaryOp::Or => a | b,
        BinaryOp::Xor => a ^ b,
        BinaryOp::Shl => a.wrapping_shl(b as u32),
        BinaryOp::Shr => {
            if signed {
                a.wrapping_shr(b as u32)
            } else {
                ((a as u64).wrapping_shr(b as u32)) as i64
            }
        }
    })
}

fn compare(ty: ValueType, op: CompareOp, lhs: VmValue, rhs: VmValue) -> Result<VmValue, VmError> {
    fn decide<T: PartialOrd>(op: CompareOp, a: T, b: T) -> bool {
        match op {
            CompareOp::Eq => a == b,
            CompareOp::Ne => a != b,
            CompareOp::Lt => a < b,
            CompareOp::Le => a <= b,
            CompareOp::Gt => a > b,
            CompareOp::Ge => a >= b,
        }
    }
    let hit = match (lhs, rhs) {
        (VmValue::F32(a), VmValue::F32(b)) if ty == ValueType::F32 => decide(op, a, b),
        (VmValue::F64(a), VmValue::F64(b)) if ty == ValueType::F64 => decide(op, a, b),
        (VmValue::I64(a), VmValue::I64(b)) if ty.is_wide() && ty.is_integer() => {
            if ty.is_signed() {
                decide(op, a, b)
            } else {
                decide(op, a as u64, b as u64)
            }
        }
        (VmValue::I32(a), VmValue::I32(b)) if ty.is_integer() && !ty.is_wide() => {
            if ty.is_signed() {
                decide(op, a, b)
            } else {
                decide(op, a as u32, b as u32)
            }
        }
        _ => {
            return Err(VmError::TypeMismatch {
                expected: "comparable pair",
            })
        }
    };
    Ok(VmValue::I32(hit as i32))
}

fn convert(from: ValueType, to: ValueType, value: VmValue) -> Result<VmValue, VmError> {
    // widen the source into both domains, then narrow to the target
    let (as_int, as_float): (i64, f64) = match (value, from) {
        (VmValue::I32(v), _) if from.is_integer() && !from.is_wide() => {
            if from.is_signed() {
                (v as i64, v as f64)
            } else {
                ((v as u32) as i64, (v as u32) as f64)
            }
        }
        (VmValue::I64(v), _) if from.is_integer() && from.is_wide() => {
            if from.is_signed() {
                (v, v as f64)
            } else {
                (v, (v as u64) as f64)
            }
        }
        (VmValue::F32(v), ValueType::F32) => (v as i64, v as f64),
        (VmValue::F64(v), ValueType::F64) => (v as i64, v),
        _ => {
            return Err(VmError::TypeMismatch {
                expected: "convert source",
            })
        }
    };
    Ok(match to {
        ValueType::F32 => VmValue::F32(if from.is_float() {
            as_float as f32
        } else {
            as_int as f32
        }),
        ValueType::F64 => VmValue::F64(if from.is_float() { as_float } else { as_int as f64 }),
        ValueType::I64 | ValueType::U64 => {
            VmValue::I64(if from.is_float() { as_float as i64 } else { as_int })
        }
        ValueType::U32 | ValueType::Ptr | ValueType::FuncPtr => VmValue::I32(if from.is_float() {
            as_float as u32 as i32
        } else {
            as_int as u32 as i32
        }),
        ValueType::I32 => VmValue::I32(if from.is_float() {
            as_float as i32
        } else {
            as_int as i32
        }),
    })
}

fn float_unary(ty: ValueType, op: FloatUnaryOp, value: VmValue) -> Result<VmValue, VmError> {
    fn apply(op: FloatUnaryOp, v: f64) -> f64 {
        match op {
            FloatUnaryOp::Neg => -v,
            FloatUnaryOp::Abs => v.abs(),
            FloatUnaryOp::Sqrt => v.sqrt(),
            FloatUnaryOp::Ceil => v.ceil(),
            FloatUnaryOp::Floor => v.floor(),
            FloatUnaryOp::Trunc => v.trunc(),
            FloatUnaryOp::Nearest => {
                // ties to even, matching the usual target semantics
                let r = v.round();
                if (v - v.trunc()).abs() == 0.5 && r % 2.0 != 0.0 {
                    r - v.signum()
                } else {
                    r
                }
            }
        }
    }
    match (ty, value) {
        (ValueType::F32, VmValue::F32(v)) => Ok(VmValue::F32(apply(op, v as f64) as f32)),
        (ValueType::F64, VmValue::F64(v)) => Ok(VmValue::F64(apply(op, v))),
        _ => Err(VmError::TypeMismatch { expected: "float" }),
    }
}

fn float_binary(
    ty: ValueType,
    op: FloatBinaryOp,
    lhs: VmValue,
    rhs: VmValue,
) -> Result<VmValue, VmError> {
    fn apply(op: FloatBinaryOp, a: f64, b: f64) -> f64 {
        match op {
            FloatBinaryOp::Add => a + b,
            FloatBinaryOp::Sub => a - b,
            FloatBinaryOp::Mul => a * b,
            FloatBinaryOp::Div => a / b,
            FloatBinaryOp::Min => a.min(b),
            FloatBinaryOp::Max => a.max(b),
            FloatBinaryOp::CopySign => a.copysign(b),
        }
    }
    match (ty, lhs, rhs) {
        (ValueType::F32, VmValue::F32(a), VmValue::F32(b)) => {
            Ok(VmValue::F32(apply(op, a as f64, b as f64) as f32))
        }
        (ValueType::F64, VmValue::F64(a), VmValue::F64(b)) => Ok(VmValue::F64(apply(op, a, b))),
        _ => Err(VmError::TypeMismatch { expected: "float" }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sbc_codegen::module::{ExportDecl, ImportDecl, StackFunction, StackModule};
    use sbc_common::FunctionType;

    fn module_with_main(
        ty: FunctionType,
        locals: Vec<ValueType>,
        code: Vec<StackInst>,
    ) -> StackModule {
        StackModule {
            exports: vec![ExportDecl {
                name: "main".to_string(),
                func: 0,
            }],
            functions: vec![StackFunction {
                name: "main".to_string(),
                ty,
                locals,
                code,
            }],
            ..Default::default()
        }
    }

    #[test]
    fn test_arithmetic_and_return() {
        let module = module_with_main(
            FunctionType::new(vec![ValueType::I32], vec![ValueType::I32]),
            vec![],
            vec![
                StackInst::LocalGet(0),
                StackInst::Const(ConstValue::I32(4)),
                StackInst::Binary(ValueType::I32, BinaryOp::Mul),
                StackInst::Return,
            ],
        );
        let mut vm = Vm::new(&module).unwrap();
        let out = vm.run_export("main", vec![VmValue::I32(10)]).unwrap();
        assert_eq!(out, vec![VmValue::I32(40)]);
    }

    #[test]
    fn test_branch_unwinds_operand_stack() {
        // the constant pushed inside the block is discarded by the branch
        let module = module_with_main(
            FunctionType::new(vec![], vec![ValueType::I32]),
            vec![],
            vec![
                StackInst::Const(ConstValue::I32(1)),
                StackInst::Block(vec![
                    StackInst::Const(ConstValue::I32(99)),
                    StackInst::Br(0),
                ]),
                StackInst::Return,
            ],
        );
        let mut vm = Vm::new(&module).unwrap();
        let out = vm.run_export("main", vec![]).unwrap();
        assert_eq!(out, vec![VmValue::I32(1)]);
    }

    #[test]
    fn test_loop_repeats_until_branch() {
        // count down from 5; the loop repeats on fall-through and exits
        // through the enclosing block
        let module = module_with_main(
            FunctionType::new(vec![], vec![ValueType::I32]),
            vec![ValueType::I32],
            vec![
                StackInst::Const(ConstValue::I32(5)),
                StackInst::LocalSet(0),
                StackInst::Block(vec![StackInst::Loop(vec![
                    StackInst::LocalGet(0),
                    StackInst::Const(ConstValue::I32(0)),
                    StackInst::Compare(ValueType::I32, CompareOp::Eq),
                    StackInst::BrIf(1),
                    StackInst::LocalGet(0),
                    StackInst::Const(ConstValue::I32(1)),
                    StackInst::Binary(ValueType::I32, BinaryOp::Sub),
                    StackInst::LocalSet(0),
                ])]),
                StackInst::LocalGet(0),
                StackInst::Return,
            ],
        );
        let mut vm = Vm::new(&module).unwrap();
        let out = vm.run_export("main", vec![]).unwrap();
        assert_eq!(out, vec![VmValue::I32(0)]);
    }

    #[test]
    fn test_host_call_receives_arguments() {
        let mut module = module_with_main(
            FunctionType::new(vec![], vec![]),
            vec![],
            vec![
                StackInst::Const(ConstValue::I32(42)),
                StackInst::Call(0),
                StackInst::Return,
            ],
        );
        module.imports = vec![ImportDecl {
            name: "print".to_string(),
            ty: FunctionType::new(vec![ValueType::I32], vec![]),
        }];
        module.exports[0].func = 1;

        let mut seen = Vec::new();
        {
            let mut vm = Vm::new(&module).unwrap();
            vm.bind_host("print", |args| {
                seen.push(args[0]);
                None
            });
            vm.run_export("main", vec![]).unwrap();
        }
        assert_eq!(seen, vec![VmValue::I32(42)]);
    }

    #[test]
    fn test_memory_load_store_roundtrip() {
        let module = module_with_main(
            FunctionType::new(vec![], vec![ValueType::I32]),
            vec![],
            vec![
                StackInst::Const(ConstValue::I32(16)),
                StackInst::Const(ConstValue::I32(-7)),
                StackInst::Store(ValueType::I32),
                StackInst::Const(ConstValue::I32(16)),
                StackInst::Load(ValueType::I32),
                StackInst::Return,
            ],
        );
        let mut vm = Vm::new(&module).unwrap();
        let out = vm.run_export("main", vec![]).unwrap();
        assert_eq!(out, vec![VmValue::I32(-7)]);
    }

    #[test]
    fn test_data_segment_initialises_memory() {
        let mut module = module_with_main(
            FunctionType::new(vec![], vec![ValueType::I32]),
            vec![],
            vec![
                StackInst::DataAddr(0),
                StackInst::Load(ValueType::I32),
                StackInst::Return,
            ],
        );
        module.data = vec![sbc_codegen::module::DataSegment {
            offset: 64,
            bytes: vec![1, 0, 0, 0],
        }];
        let mut vm = Vm::new(&module).unwrap();
        let out = vm.run_export("main", vec![]).unwrap();
        assert_eq!(out, vec![VmValue::I32(1)]);
    }

    #[test]
    fn test_division_by_zero_traps() {
        let module = module_with_main(
            FunctionType::new(vec![], vec![ValueType::I32]),
            vec![],
            vec![
                StackInst::Const(ConstValue::I32(1)),
                StackInst::Const(ConstValue::I32(0)),
                StackInst::Binary(ValueType::I32, BinaryOp::Div),
                StackInst::Return,
            ],
        );
        let mut vm = Vm::new(&module).unwrap();
        let err = vm.run_export("main", vec![]).unwrap_err();
        assert!(matches!(err, VmError::DivisionByZero));
    }

    #[test]
    fn test_unsigned_compare_uses_unsigned_order() {
        let module = module_with_main(
            FunctionType::new(vec![], vec![ValueType::I32]),
            vec![],
            vec![
                StackInst::Const(ConstValue::I32(-1)),
                StackInst::Const(ConstValue::I32(1)),
                StackInst::Compare(ValueType::U32, CompareOp::Gt),
                StackInst::Return,
            ],
        );
        let mut vm = Vm::new(&module).unwrap();
        let out = vm.run_export("main", vec![]).unwrap();
        // 0xffff_ffff > 1 when unsigned
        assert_eq!(out, vec![VmValue::I32(1)]);
    }

    #[test]
    fn test_convert_int_to_float() {
        let module = module_with_main(
            FunctionType::new(vec![], vec![ValueType::F64]),
            vec![],
            vec![
                StackInst::Const(ConstValue::I32(-3)),
                StackInst::Convert {
                    from: ValueType::I32,
                    to: ValueType::F64,
                },
                StackInst::Return,
            ],
        );
        let mut vm = Vm::new(&module).unwrap();
        let out = vm.run_export("main", vec![]).unwrap();
        assert_eq!(out, vec![VmValue::F64(-3.0)]);
    }
}
