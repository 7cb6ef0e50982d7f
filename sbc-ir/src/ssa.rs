//! SSA Construction for Structured Control Flow
//!
//! Rewrites a function body with plain, possibly multiply-written
//! variables into SSA form: every write produces a fresh name, every read
//! refers to the statically correct name, and phi instructions appear at
//! the merge points the block tree induces (after an if/ifelse, after a
//! breakable, and at a loop header for loop-carried values).
//!
//! The transform runs two passes over the tree, each written as a
//! recursive function returning `(new block, exit variable mapping)` so
//! data flow between calls is explicit:
//!
//! - The *write pass* walks depth-first, gives every written variable a
//!   fresh monotonically increasing name, and records variable mappings at
//!   loop back edges. Merge points are identified by pre-order numbering
//!   of structural blocks, which both passes reproduce identically.
//! - The *read pass* re-walks the tree with a running variable-to-name
//!   map, synthesizes phis where more than one distinct name reaches a
//!   merge, aliases variables with a single incoming name, and rewrites
//!   every read operand. Loop headers are the one place the write pass's
//!   records are consulted: they tell the read pass which variables are
//!   loop-mutated before the body has been walked; the header phis are
//!   created up front and their operand lists patched with the true
//!   end-of-iteration names afterwards.
//!
//! All per-function state (the name counter included) lives in a builder
//! owned by the single `to_ssa` call, so the transform is re-entrant.

use crate::ir::{Block, FunctionDeclaration, FunctionDefinition, Instruction};
use log::{debug, trace};
use sbc_common::{CompilerError, SsaId, ValueType, VarId};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

/// Side table produced by the transform: the declared type and the
/// originating pre-SSA variable of every SSA name
#[derive(Debug, Clone, PartialEq)]
pub struct SsaTable {
    pub types: Vec<ValueType>,
    pub origins: Vec<VarId>,
}

impl SsaTable {
    /// Number of SSA names in the function
    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Declared type of an SSA name
    pub fn ty(&self, name: SsaId) -> ValueType {
        self.types[name as usize]
    }

    /// Pre-SSA variable an SSA name originated from
    pub fn origin(&self, name: SsaId) -> VarId {
        self.origins[name as usize]
    }
}

/// Running variable-to-current-name mapping. A BTreeMap keeps iteration
/// order (and therefore phi operand order) deterministic.
type Env = BTreeMap<VarId, SsaId>;

/// Pre-order number of a structural block, identical across both passes
type MergeId = u32;

/// Incoming names accumulated at one merge point, one entry per source
/// variable per predecessor, in predecessor order
#[derive(Debug, Clone, Default)]
struct MergeRecord {
    incoming: BTreeMap<VarId, Vec<SsaId>>,
}

impl MergeRecord {
    fn record(&mut self, env: &Env) {
        for (&var, &name) in env {
            self.incoming.entry(var).or_default().push(name);
        }
    }
}

fn dedup_in_order(names: &[SsaId]) -> Vec<SsaId> {
    let mut out = Vec::new();
    for &n in names {
        if !out.contains(&n) {
            out.push(n);
        }
    }
    out
}

/// Transform a function body into SSA form in place, returning the side
/// table. The declaration supplies argument types; `local_types` is
/// refreshed to cover all non-argument SSA names afterwards.
pub fn to_ssa(
    def: &mut FunctionDefinition,
    decl: &FunctionDeclaration,
) -> Result<SsaTable, CompilerError> {
    debug!("ssa: transforming function '{}'", def.name);
    let argc = decl.ty.params.len();
    let mut builder = SsaBuilder {
        var_types: def.var_types(decl),
        types: Vec::new(),
        origins: Vec::new(),
        loop_changed: HashMap::new(),
        break_records: HashMap::new(),
        next_merge_id: 0,
    };

    // Arguments are pre-seeded to SSA names equal to their index
    let mut env = Env::new();
    for (i, ty) in decl.ty.params.iter().enumerate() {
        builder.types.push(*ty);
        builder.origins.push(i as VarId);
        env.insert(i as VarId, i as SsaId);
    }

    let body = std::mem::take(&mut def.body);
    let (body, _exit, _ft) = builder.write_seq(body, env.clone())?;

    builder.next_merge_id = 0;
    let mut breakables = Vec::new();
    let (body, _exit, _ft) = builder.read_seq(body, env, &mut breakables)?;

    def.body = body;
    def.local_types = builder.types[argc..].to_vec();
    trace!(
        "ssa: function '{}' has {} names",
        def.name,
        builder.types.len()
    );
    Ok(SsaTable {
        types: builder.types,
        origins: builder.origins,
    })
}

struct SsaBuilder {
    /// Pre-SSA variable types (arguments followed by declared locals)
    var_types: Vec<ValueType>,
    /// SSA name -> declared type
    types: Vec<ValueType>,
    /// SSA name -> originating pre-SSA variable
    origins: Vec<VarId>,
    /// Write-pass records at loop headers (pre-loop and back-edge envs)
    loop_changed: HashMap<MergeId, MergeRecord>,
    /// Read-pass records of break-site envs, per open breakable
    break_records: HashMap<MergeId, MergeRecord>,
    next_merge_id: MergeId,
}

impl SsaBuilder {
    fn fresh(&mut self, origin: VarId) -> Result<SsaId, CompilerError> {
        let ty = *self.var_types.get(origin as usize).ok_or_else(|| {
            CompilerError::internal(format!("variable {origin} has no declared type"))
        })?;
        let name = self.types.len() as SsaId;
        self.types.push(ty);
        self.origins.push(origin);
        Ok(name)
    }

    fn next_merge(&mut self) -> MergeId {
        let id = self.next_merge_id;
        self.next_merge_id += 1;
        id
    }

    // === Write pass ===

    fn write_seq(
        &mut self,
        blocks: Vec<Block>,
        mut env: Env,
    ) -> Result<(Vec<Block>, Env, bool), CompilerError> {
        let mut out = Vec::with_capacity(blocks.len());
        let mut falls_through = true;
        for block in blocks {
            let (block, new_env, ft) = self.write_block(block, env)?;
            out.push(block);
            env = new_env;
            falls_through = falls_through && ft;
        }
        Ok((out, env, falls_through))
    }

    fn write_block(
        &mut self,
        block: Block,
        env: Env,
    ) -> Result<(Block, Env, bool), CompilerError> {
        match block {
            Block::Basic { mut instructions } => {
                let mut env = env;
                let mut written_here: HashSet<VarId> = HashSet::new();
                let mut falls_through = true;
                for inst in &mut instructions {
                    if matches!(inst, Instruction::Break | Instruction::Return { .. }) {
                        falls_through = false;
                    }
                    if let Some(slot) = inst.written_mut() {
                        let origin = *slot;
                        if !written_here.insert(origin) {
                            return Err(CompilerError::internal(format!(
                                "variable {origin} written twice in one basic block"
                            )));
                        }
                        let name = self.fresh(origin)?;
                        *slot = name;
                        env.insert(origin, name);
                    }
                }
                Ok((Block::Basic { instructions }, env, falls_through))
            }
            Block::Loop { body } => {
                let merge = self.next_merge();
                self.loop_changed.entry(merge).or_default().record(&env);
                let (body, exit, body_ft) = self.write_seq(body, env)?;
                if body_ft {
                    // back edge: the mapping at the end of one iteration
                    self.loop_changed.entry(merge).or_default().record(&exit);
                }
                Ok((Block::Loop { body }, exit, false))
            }
            Block::Breakable { body } => {
                let _merge = self.next_merge();
                let (body, exit, _body_ft) = self.write_seq(body, env)?;
                Ok((Block::Breakable { body }, exit, true))
            }
            Block::If { cond, then_body } => {
                let _merge = self.next_merge();
                // Threading the branch exit keeps any rename on the branch
                // visible to enclosing loop records; untouched variables
                // still map to their incoming names inside it.
                let (then_body, then_exit, _then_ft) = self.write_seq(then_body, env)?;
                Ok((Block::If { cond, then_body }, then_exit, true))
            }
            Block::IfElse {
                cond,
                then_body,
                else_body,
            } => {
                let _merge = self.next_merge();
                let incoming = env.clone();
                let (then_body, then_exit, then_ft) = self.write_seq(then_body, env)?;
                let (else_body, else_exit, else_ft) =
                    self.write_seq(else_body, incoming.clone())?;
                let vars: BTreeSet<VarId> = then_exit
                    .keys()
                    .chain(else_exit.keys())
                    .copied()
                    .collect();
                let mut merged = Env::new();
                for var in vars {
                    let inc = incoming.get(&var).copied();
                    let then_name = then_exit.get(&var).copied();
                    let else_name = else_exit.get(&var).copied();
                    let name = match (then_name, else_name) {
                        (Some(t), _) if Some(t) != inc => t,
                        (_, Some(e)) if Some(e) != inc => e,
                        (Some(t), _) => t,
                        (None, Some(e)) => e,
                        (None, None) => continue,
                    };
                    merged.insert(var, name);
                }
                Ok((
                    Block::IfElse {
                        cond,
                        then_body,
                        else_body,
                    },
                    merged,
                    then_ft || else_ft,
                ))
            }
        }
    }

    // === Read pass ===

    fn read_seq(
        &mut self,
        blocks: Vec<Block>,
        mut env: Env,
        breakables: &mut Vec<MergeId>,
    ) -> Result<(Vec<Block>, Env, bool), CompilerError> {
        let mut out = Vec::with_capacity(blocks.len());
        let mut falls_through = true;
        for block in blocks {
            let (block, merge_phis, new_env, ft) = self.read_block(block, env, breakables)?;
            out.push(block);
            if !merge_phis.is_empty() {
                out.push(Block::Basic {
                    instructions: merge_phis,
                });
            }
            env = new_env;
            falls_through = falls_through && ft;
        }
        Ok((out, env, falls_through))
    }

    /// Returns the rewritten block, phi instructions to splice in after it,
    /// the exit mapping, and whether execution can fall through its end.
    fn read_block(
        &mut self,
        block: Block,
        env: Env,
        breakables: &mut Vec<MergeId>,
    ) -> Result<(Block, Vec<Instruction>, Env, bool), CompilerError> {
        match block {
            Block::Basic { mut instructions } => {
                let mut env = env;
                let mut falls_through = true;
                for inst in &mut instructions {
                    let mut undefined = None;
                    inst.for_each_read_mut(|r| match env.get(r) {
                        Some(&name) => *r = name,
                        None => undefined = Some(*r),
                    });
                    if let Some(var) = undefined {
                        return Err(CompilerError::internal(format!(
                            "variable {var} read before any write"
                        )));
                    }
                    match inst {
                        Instruction::Break
                        | Instruction::BreakIf { .. }
                        | Instruction::BreakIfFalse { .. } => {
                            let merge = *breakables.last().ok_or_else(|| {
                                CompilerError::internal("break outside of any breakable block")
                            })?;
                            self.break_records.entry(merge).or_default().record(&env);
                            if matches!(inst, Instruction::Break) {
                                falls_through = false;
                            }
                        }
                        Instruction::Return { .. } => falls_through = false,
                        _ => {}
                    }
                    if let Some(name) = inst.written() {
                        let origin = self.origins[name as usize];
                        env.insert(origin, name);
                    }
                }
                Ok((Block::Basic { instructions }, Vec::new(), env, falls_through))
            }
            Block::Loop { body } => {
                let merge = self.next_merge();
                let record = self
                    .loop_changed
                    .get(&merge)
                    .cloned()
                    .unwrap_or_default();

                // The loop body is its own merge block: it receives the
                // pre-loop mapping and the back-edge mapping. The write
                // pass tells us which variables differ between the two;
                // those get a header phi whose back-edge operand is filled
                // in after the body walk.
                let mut header_env = env.clone();
                let mut pending: Vec<(VarId, SsaId, Option<SsaId>)> = Vec::new();
                for (&var, names) in &record.incoming {
                    if dedup_in_order(names).len() > 1 {
                        let phi = self.fresh(var)?;
                        pending.push((var, phi, env.get(&var).copied()));
                        header_env.insert(var, phi);
                    }
                }

                let (body, exit, body_ft) = self.read_seq(body, header_env, breakables)?;

                let mut phis = Vec::with_capacity(pending.len());
                for (var, phi, incoming) in pending {
                    let mut operands = Vec::new();
                    if let Some(inc) = incoming {
                        operands.push(inc);
                    }
                    if body_ft {
                        if let Some(&back) = exit.get(&var) {
                            if !operands.contains(&back) {
                                operands.push(back);
                            }
                        }
                    }
                    phis.push(Instruction::Phi {
                        result: phi,
                        operands,
                    });
                }
                let mut body = body;
                if !phis.is_empty() {
                    body.insert(0, Block::Basic { instructions: phis });
                }
                Ok((Block::Loop { body }, Vec::new(), exit, false))
            }
            Block::Breakable { body } => {
                let merge = self.next_merge();
                self.break_records.insert(merge, MergeRecord::default());
                breakables.push(merge);
                let (body, exit, body_ft) = self.read_seq(body, env.clone(), breakables)?;
                breakables.pop();

                let mut record = self.break_records.remove(&merge).unwrap_or_default();
                let had_breaks = !record.incoming.is_empty();
                if body_ft {
                    record.record(&exit);
                }
                let falls_through = had_breaks || body_ft;
                if !falls_through {
                    return Ok((Block::Breakable { body }, Vec::new(), env, false));
                }
                let (phis, out_env) = self.resolve_merge(&record)?;
                Ok((Block::Breakable { body }, phis, out_env, true))
            }
            Block::If { cond, then_body } => {
                let _merge = self.next_merge();
                let cond = self.lookup(&env, cond)?;
                let mut record = MergeRecord::default();
                record.record(&env); // the fall-through (false) path
                let (then_body, then_exit, then_ft) =
                    self.read_seq(then_body, env.clone(), breakables)?;
                if then_ft {
                    record.record(&then_exit);
                }
                let (phis, out_env) = self.resolve_merge(&record)?;
                Ok((Block::If { cond, then_body }, phis, out_env, true))
            }
            Block::IfElse {
                cond,
                then_body,
                else_body,
            } => {
                let _merge = self.next_merge();
                let cond = self.lookup(&env, cond)?;
                let (then_body, then_exit, then_ft) =
                    self.read_seq(then_body, env.clone(), breakables)?;
                let (else_body, else_exit, else_ft) =
                    self.read_seq(else_body, env.clone(), breakables)?;

                let mut record = MergeRecord::default();
                if then_ft {
                    record.record(&then_exit);
                }
                if else_ft {
                    record.record(&else_exit);
                }
                let falls_through = then_ft || else_ft;
                let block = Block::IfElse {
                    cond,
                    then_body,
                    else_body,
                };
                if !falls_through {
                    return Ok((block, Vec::new(), env, false));
                }
                let (phis, out_env) = self.resolve_merge(&record)?;
                Ok((block, phis, out_env, true))
            }
        }
    }

    fn lookup(&self, env: &Env, var: VarId) -> Result<SsaId, CompilerError> {
        env.get(&var).copied().ok_or_else(|| {
            CompilerError::internal(format!("variable {var} read before any write"))
        })
    }

    /// Synthesize phis for variables with more than one distinct incoming
    /// name; alias single-name variables without emitting anything.
    fn resolve_merge(
        &mut self,
        record: &MergeRecord,
    ) -> Result<(Vec<Instruction>, Env), CompilerError> {
        let mut phis = Vec::new();
        let mut out = Env::new();
        for (&var, names) in &record.incoming {
            let distinct = dedup_in_order(names);
            match distinct.len() {
                0 => {}
                1 => {
                    out.insert(var, distinct[0]);
                }
                _ => {
                    let phi = self.fresh(var)?;
                    phis.push(Instruction::Phi {
                        result: phi,
                        operands: distinct,
                    });
                    out.insert(var, phi);
                }
            }
        }
        Ok((phis, out))
    }
}
