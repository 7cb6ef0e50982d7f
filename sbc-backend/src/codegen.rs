//! Stack Code Generation
//!
//! Lowers an SSA function body onto the stack machine. Values produced by
//! instructions are left on the operand stack as long as possible; a
//! shadow stack of `StackEntry` records what is pending. When an
//! instruction needs operands, `reconcile` matches the longest usable
//! stack suffix against the desired operand list and fetches the rest from
//! slots; values that have to come off the stack are stored to their
//! bucket slot if the bucket is still live, and dropped otherwise.
//!
//! Region boundaries (loop, breakable, if) flush the pending stack
//! completely, as do branches: whatever survives a region transfer does so
//! through its slot, never on the operand stack.
//!
//! Instruction index assignment mirrors the allocator's scan exactly; the
//! store/drop decisions are only sound if both sides count the same way.

use crate::buckets::BucketAllocation;
use crate::compile::FunctionIndex;
use log::debug;
use sbc_codegen::inst::StackInst;
use sbc_codegen::module::StackFunction;
use sbc_common::{CompareOp, CompilerError, ConstValue, SsaId, ValueType};
use sbc_ir::ssa::SsaTable;
use sbc_ir::{Block, FunctionDeclaration, FunctionDefinition, Instruction};

/// One pending value on the operand stack
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StackEntry {
    /// Holds the current value of this SSA name
    Live(SsaId),
    /// Superseded by a later store to the same slot; only droppable
    Stale,
}

/// Enclosing emission regions, innermost last. Every region is one branch
/// level in the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Region {
    Breakable,
    Loop,
    Conditional,
}

/// Lower one SSA function to stack code
pub fn generate_function(
    def: &FunctionDefinition,
    decl: &FunctionDeclaration,
    table: &SsaTable,
    alloc: &BucketAllocation,
    index: &FunctionIndex,
) -> Result<StackFunction, CompilerError> {
    debug!("codegen: lowering function '{}'", def.name);
    let mut gen = FunctionCodegen {
        table,
        alloc,
        index,
        idx: 0,
        stack: Vec::new(),
        regions: Vec::new(),
    };
    let mut code = Vec::new();
    gen.gen_seq(&def.body, &mut code)?;
    let end = gen.idx;
    gen.flush(end, &mut code);
    Ok(StackFunction {
        name: def.name.clone(),
        ty: decl.ty.clone(),
        locals: alloc.locals.clone(),
        code,
    })
}

struct FunctionCodegen<'a> {
    table: &'a SsaTable,
    alloc: &'a BucketAllocation,
    index: &'a FunctionIndex,
    /// Next instruction index, counted like the allocator counts
    idx: u32,
    stack: Vec<StackEntry>,
    regions: Vec<Region>,
}

impl<'a> FunctionCodegen<'a> {
    fn bump(&mut self) -> u32 {
        let idx = self.idx;
        self.idx += 1;
        idx
    }

    fn gen_seq(&mut self, blocks: &[Block], out: &mut Vec<StackInst>) -> Result<(), CompilerError> {
        for block in blocks {
            self.gen_block(block, out)?;
        }
        Ok(())
    }

    fn gen_block(&mut self, block: &Block, out: &mut Vec<StackInst>) -> Result<(), CompilerError> {
        match block {
            Block::Basic { instructions } => {
                for inst in instructions {
                    self.gen_inst(inst, out)?;
                }
                Ok(())
            }
            Block::Loop { body } => {
                let t = self.idx;
                self.flush(t, out);
                self.regions.push(Region::Loop);
                let mut inner = Vec::new();
                self.gen_seq(body, &mut inner)?;
                let end = self.idx;
                self.flush(end, &mut inner);
                self.regions.pop();
                out.push(StackInst::Loop(inner));
                Ok(())
            }
            Block::Breakable { body } => {
                let t = self.idx;
                self.flush(t, out);
                self.regions.push(Region::Breakable);
                let mut inner = Vec::new();
                self.gen_seq(body, &mut inner)?;
                let end = self.idx;
                self.flush(end, &mut inner);
                self.regions.pop();
                out.push(StackInst::Block(inner));
                Ok(())
            }
            Block::If { cond, then_body } => {
                let t = self.bump();
                self.check_condition(*cond)?;
                self.flush(t, out);
                out.push(StackInst::LocalGet(self.alloc.slot(*cond)));
                self.regions.push(Region::Conditional);
                let mut inner = Vec::new();
                self.gen_seq(then_body, &mut inner)?;
                let end = self.idx;
                self.flush(end, &mut inner);
                self.regions.pop();
                out.push(StackInst::If {
                    then_body: inner,
                    else_body: Vec::new(),
                });
                Ok(())
            }
            Block::IfElse {
                cond,
                then_body,
                else_body,
            } => {
                let t = self.bump();
                self.check_condition(*cond)?;
                self.flush(t, out);
                out.push(StackInst::LocalGet(self.alloc.slot(*cond)));
                self.regions.push(Region::Conditional);
                let mut then_code = Vec::new();
                self.gen_seq(then_body, &mut then_code)?;
                let end = self.idx;
                self.flush(end, &mut then_code);
                let mut else_code = Vec::new();
                self.gen_seq(else_body, &mut else_code)?;
                let end = self.idx;
                self.flush(end, &mut else_code);
                self.regions.pop();
                out.push(StackInst::If {
                    then_body: then_code,
                    else_body: else_code,
                });
                Ok(())
            }
        }
    }

    fn gen_inst(&mut self, inst: &Instruction, out: &mut Vec<StackInst>) -> Result<(), CompilerError> {
        match inst {
            // The phi's value travels through the bucket's shared slot
            Instruction::Phi { .. } => {
                self.bump();
                Ok(())
            }
            Instruction::Break => {
                let t = self.bump();
                self.flush(t, out);
                out.push(StackInst::Br(self.break_depth()?));
                Ok(())
            }
            Instruction::BreakIf { cond } => {
                let t = self.bump();
                self.check_condition(*cond)?;
                self.flush(t, out);
                out.push(StackInst::LocalGet(self.alloc.slot(*cond)));
                out.push(StackInst::BrIf(self.break_depth()?));
                Ok(())
            }
            Instruction::BreakIfFalse { cond } => {
                let t = self.bump();
                self.check_condition(*cond)?;
                self.flush(t, out);
                out.push(StackInst::LocalGet(self.alloc.slot(*cond)));
                out.push(StackInst::Const(ConstValue::I32(0)));
                out.push(StackInst::Compare(ValueType::I32, CompareOp::Eq));
                out.push(StackInst::BrIf(self.break_depth()?));
                Ok(())
            }
            Instruction::Const { result, value } => {
                self.bump();
                out.push(StackInst::Const(value.clone()));
                self.stack.push(StackEntry::Live(*result));
                Ok(())
            }
            Instruction::LoadGlobal { result, global } => {
                self.bump();
                out.push(StackInst::GlobalGet(*global));
                self.stack.push(StackEntry::Live(*result));
                Ok(())
            }
            Instruction::LoadDataAddr { result, segment } => {
                self.bump();
                out.push(StackInst::DataAddr(*segment));
                self.stack.push(StackEntry::Live(*result));
                Ok(())
            }
            // A copy is a relabeling: if the source is consumable off the
            // stack this emits nothing at all
            Instruction::Copy { result, source } => {
                let t = self.bump();
                self.reconcile(&[*source], t, out);
                self.stack.push(StackEntry::Live(*result));
                Ok(())
            }
            Instruction::Load { result, ty, addr } => {
                let t = self.bump();
                self.reconcile(&[*addr], t, out);
                out.push(StackInst::Load(*ty));
                self.stack.push(StackEntry::Live(*result));
                Ok(())
            }
            Instruction::Store { ty, addr, value } => {
                let t = self.bump();
                self.reconcile(&[*addr, *value], t, out);
                out.push(StackInst::Store(*ty));
                Ok(())
            }
            Instruction::Convert {
                result,
                to,
                operand,
            } => {
                let t = self.bump();
                self.reconcile(&[*operand], t, out);
                let from = self.table.ty(*operand);
                if from != *to {
                    out.push(StackInst::Convert { from, to: *to });
                }
                self.stack.push(StackEntry::Live(*result));
                Ok(())
            }
            Instruction::Compare {
                result,
                op,
                lhs,
                rhs,
            } => {
                let t = self.bump();
                self.reconcile(&[*lhs, *rhs], t, out);
                out.push(StackInst::Compare(self.table.ty(*lhs), *op));
                self.stack.push(StackEntry::Live(*result));
                Ok(())
            }
            Instruction::Binary {
                result,
                op,
                lhs,
                rhs,
            } => {
                let t = self.bump();
                self.reconcile(&[*lhs, *rhs], t, out);
                out.push(StackInst::Binary(self.table.ty(*lhs), *op));
                self.stack.push(StackEntry::Live(*result));
                Ok(())
            }
            Instruction::FloatUnary {
                result,
                op,
                operand,
            } => {
                let t = self.bump();
                self.reconcile(&[*operand], t, out);
                out.push(StackInst::FloatUnary(self.table.ty(*operand), *op));
                self.stack.push(StackEntry::Live(*result));
                Ok(())
            }
            Instruction::FloatBinary {
                result,
                op,
                lhs,
                rhs,
            } => {
                let t = self.bump();
                self.reconcile(&[*lhs, *rhs], t, out);
                out.push(StackInst::FloatBinary(self.table.ty(*lhs), *op));
                self.stack.push(StackEntry::Live(*result));
                Ok(())
            }
            Instruction::Call {
                result,
                function,
                args,
            } => {
                let t = self.bump();
                let (func, sig) = self.index.resolve(function)?;
                if sig.params.len() != args.len() {
                    return Err(CompilerError::internal(format!(
                        "call to '{function}' passes {} arguments, declared with {}",
                        args.len(),
                        sig.params.len()
                    )));
                }
                for (arg, param) in args.iter().zip(&sig.params) {
                    if self.table.ty(*arg) != *param {
                        return Err(CompilerError::internal(format!(
                            "call to '{function}' passes {} where {param} is declared",
                            self.table.ty(*arg)
                        )));
                    }
                }
                if sig.results.len() > 1 {
                    return Err(CompilerError::unsupported(format!(
                        "call to '{function}' with {} results",
                        sig.results.len()
                    )));
                }
                let results = sig.results.len();
                let result_ty = sig.results.first().copied();
                self.reconcile(args, t, out);
                out.push(StackInst::Call(func));
                match (result, results) {
                    (Some(r), 1) => {
                        let want = self.table.ty(*r);
                        let got = result_ty.unwrap_or(want);
                        if want != got {
                            return Err(CompilerError::internal(format!(
                                "call to '{function}' binds a {got} result to a {want} variable"
                            )));
                        }
                        self.stack.push(StackEntry::Live(*r));
                    }
                    (Some(_), 0) => {
                        return Err(CompilerError::internal(format!(
                            "call to '{function}' binds a result, but none is declared"
                        )));
                    }
                    (None, 1) => out.push(StackInst::Drop),
                    _ => {}
                }
                Ok(())
            }
            Instruction::CallIndirect { .. } => Err(CompilerError::unsupported(
                "indirect calls are not lowered yet",
            )),
            Instruction::Return { values } => {
                let t = self.bump();
                self.reconcile(values, t, out);
                out.push(StackInst::Return);
                // nothing past a return runs; pending values need no code
                self.stack.clear();
                Ok(())
            }
        }
    }

    /// Branch depth of the innermost breakable, counting every region
    /// between it and the branch site
    fn break_depth(&self) -> Result<u32, CompilerError> {
        self.regions
            .iter()
            .rev()
            .position(|r| *r == Region::Breakable)
            .map(|d| d as u32)
            .ok_or_else(|| CompilerError::internal("break outside of any breakable block"))
    }

    fn check_condition(&self, cond: SsaId) -> Result<(), CompilerError> {
        let ty = self.table.ty(cond);
        if ty.is_float() || ty.is_wide() {
            return Err(CompilerError::unsupported(format!(
                "{ty} value used as a branch condition"
            )));
        }
        Ok(())
    }

    /// Arrange the desired operands on top of the operand stack, in order.
    ///
    /// The longest stack suffix whose entries are consumable (live, last
    /// use at or before `t`) and equal to a prefix of `desired` stays; the
    /// rest is fetched from slots. If any operand that has to be fetched
    /// is itself still pending on the stack, its slot would be stale, so
    /// the whole stack is flushed first.
    fn reconcile(&mut self, desired: &[SsaId], t: u32, out: &mut Vec<StackInst>) {
        let max_k = self.stack.len().min(desired.len());
        let mut matched = 0;
        for k in (1..=max_k).rev() {
            let base = self.stack.len() - k;
            let ok = (0..k).all(|i| {
                self.stack[base + i] == StackEntry::Live(desired[i])
                    && self.alloc.end(desired[i]) <= t
            });
            if ok {
                matched = k;
                break;
            }
        }
        let fetched = &desired[matched..];
        let overlaps = fetched
            .iter()
            .any(|d| self.stack.contains(&StackEntry::Live(*d)));
        if overlaps {
            self.flush(t, out);
            self.push_from_slots(desired, out);
            return;
        }
        self.stack.truncate(self.stack.len() - matched);
        self.push_from_slots(fetched, out);
    }

    fn push_from_slots(&self, names: &[SsaId], out: &mut Vec<StackInst>) {
        for &name in names {
            out.push(StackInst::LocalGet(self.alloc.slot(name)));
        }
    }

    /// Empty the pending stack: store values whose bucket is still live at
    /// index `t`, drop everything else
    fn flush(&mut self, t: u32, out: &mut Vec<StackInst>) {
        while let Some(entry) = self.stack.pop() {
            match entry {
                StackEntry::Stale => out.push(StackInst::Drop),
                StackEntry::Live(name) => {
                    if self.alloc.end(name) >= t {
                        let slot = self.alloc.slot(name);
                        out.push(StackInst::LocalSet(slot));
                        // older pending values of the same slot are now
                        // out of date
                        for entry in &mut self.stack {
                            if matches!(entry, StackEntry::Live(other) if self.alloc.slot(*other) == slot)
                            {
                                *entry = StackEntry::Stale;
                            }
                        }
                    } else {
                        out.push(StackInst::Drop);
                    }
                }
            }
        }
    }
}
