//! Live-Range Bucket Allocation
//!
//! Maps SSA names onto local slots. Every name starts in its own bucket;
//! phi instructions union their result and operands into one bucket, so
//! that all members share a single slot and the phi itself needs no code.
//! Each bucket carries an aggregate usage span; the span's end index is
//! what codegen later consults to decide between storing and dropping a
//! value it has to take off the operand stack.
//!
//! Instruction indices here must agree exactly with the order codegen
//! assigns them: one index per instruction, one for each if/ifelse header
//! (where the condition is read), none for loop or breakable headers.

use log::trace;
use sbc_common::{CompilerError, SlotId, SsaId, ValueType};
use sbc_ir::ssa::SsaTable;
use sbc_ir::{Block, Instruction};
use std::collections::HashMap;

/// Usage span of one SSA name, in instruction indices
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub write: u32,
    pub last_read: u32,
}

/// Result of allocation: a slot and a bucket end index per SSA name, plus
/// the declared types of the non-argument slots in slot order
#[derive(Debug, Clone, PartialEq)]
pub struct BucketAllocation {
    slots: Vec<SlotId>,
    ends: Vec<u32>,
    pub spans: Vec<Span>,
    pub locals: Vec<ValueType>,
}

impl BucketAllocation {
    /// Slot assigned to an SSA name
    pub fn slot(&self, name: SsaId) -> SlotId {
        self.slots[name as usize]
    }

    /// Last instruction index at which any member of the name's bucket is
    /// used. A value whose bucket end precedes the current index is dead.
    pub fn end(&self, name: SsaId) -> u32 {
        self.ends[name as usize]
    }

    pub fn slot_count(&self, argc: usize) -> u32 {
        (argc + self.locals.len()) as u32
    }
}

/// Allocate slots for every SSA name in a function body.
///
/// Arguments (names `0..argc`) keep their argument slots; a bucket that
/// contains an argument is pinned to that slot. All other buckets receive
/// fresh slots starting at `argc`, grouped by value type.
pub fn allocate_buckets(
    body: &[Block],
    table: &SsaTable,
    argc: usize,
) -> Result<BucketAllocation, CompilerError> {
    let n = table.len();
    let mut scan = UsageScan {
        write_idx: vec![0; n],
        last_read: vec![0; n],
        phis: Vec::new(),
        next: 0,
    };
    scan.scan_seq(body);

    // Phi operands must survive until the phi's merge point is reached,
    // including along a loop back edge where the operand is written after
    // the phi. Extending the operand's last read past its own write makes
    // the store decision at the back edge come out right.
    for (phi_idx, _result, operands) in &scan.phis {
        for &op in operands {
            let keep_until = (*phi_idx).max(scan.write_idx[op as usize] + 1);
            let entry = &mut scan.last_read[op as usize];
            *entry = (*entry).max(keep_until);
        }
    }

    let mut parent: Vec<SsaId> = (0..n as SsaId).collect();
    for (_, result, operands) in &scan.phis {
        for &op in operands {
            union(&mut parent, *result, op);
        }
    }

    // Buckets in first-encounter order of their members
    let mut order: Vec<SsaId> = Vec::new();
    let mut members: HashMap<SsaId, Vec<SsaId>> = HashMap::new();
    for name in 0..n as SsaId {
        let root = find(&mut parent, name);
        let entry = members.entry(root).or_default();
        if entry.is_empty() {
            order.push(root);
        }
        entry.push(name);
    }

    let mut slot_of_root: HashMap<SsaId, SlotId> = HashMap::new();
    for &root in &order {
        let bucket = &members[&root];
        let ty = table.ty(bucket[0]);
        for &m in bucket {
            if table.ty(m) != ty {
                return Err(CompilerError::internal(format!(
                    "bucket mixes value types ({} vs {})",
                    ty,
                    table.ty(m)
                )));
            }
        }
        let mut args = bucket.iter().filter(|&&m| (m as usize) < argc);
        if let Some(&arg) = args.next() {
            if args.next().is_some() {
                return Err(CompilerError::internal(
                    "two arguments merged into one live-range bucket",
                ));
            }
            slot_of_root.insert(root, arg as SlotId);
        }
    }

    // Remaining buckets grouped by type; the sort is stable, so buckets of
    // one type keep their first-encounter order
    let mut typed: Vec<(ValueType, SsaId)> = order
        .iter()
        .filter(|root| !slot_of_root.contains_key(root))
        .map(|&root| (table.ty(root), root))
        .collect();
    typed.sort_by_key(|(ty, _)| *ty);

    let mut locals = Vec::with_capacity(typed.len());
    for (ty, root) in typed {
        slot_of_root.insert(root, (argc + locals.len()) as SlotId);
        locals.push(ty);
    }

    let mut slots = vec![0; n];
    let mut ends = vec![0; n];
    let mut spans = Vec::with_capacity(n);
    for (&root, bucket) in &members {
        let slot = slot_of_root[&root];
        let end = bucket
            .iter()
            .map(|&m| {
                scan.last_read[m as usize].max(scan.write_idx[m as usize])
            })
            .max()
            .unwrap_or(0);
        for &m in bucket {
            slots[m as usize] = slot;
            ends[m as usize] = end;
        }
    }
    for name in 0..n {
        spans.push(Span {
            write: scan.write_idx[name],
            last_read: scan.last_read[name],
        });
        trace!(
            "bucket: %{name} -> slot {} (end {})",
            slots[name],
            ends[name]
        );
    }

    Ok(BucketAllocation {
        slots,
        ends,
        spans,
        locals,
    })
}

struct UsageScan {
    write_idx: Vec<u32>,
    last_read: Vec<u32>,
    phis: Vec<(u32, SsaId, Vec<SsaId>)>,
    next: u32,
}

impl UsageScan {
    fn bump(&mut self) -> u32 {
        let idx = self.next;
        self.next += 1;
        idx
    }

    fn read(&mut self, name: SsaId, idx: u32) {
        let entry = &mut self.last_read[name as usize];
        *entry = (*entry).max(idx);
    }

    fn scan_seq(&mut self, blocks: &[Block]) {
        for block in blocks {
            match block {
                Block::Basic { instructions } => {
                    for inst in instructions {
                        let idx = self.bump();
                        for r in inst.reads() {
                            self.read(r, idx);
                        }
                        if let Some(w) = inst.written() {
                            self.write_idx[w as usize] = idx;
                            self.read(w, idx);
                        }
                        if let Instruction::Phi { result, operands } = inst {
                            self.phis.push((idx, *result, operands.clone()));
                        }
                    }
                }
                Block::Loop { body } | Block::Breakable { body } => self.scan_seq(body),
                Block::If { cond, then_body } => {
                    let idx = self.bump();
                    self.read(*cond, idx);
                    self.scan_seq(then_body);
                }
                Block::IfElse {
                    cond,
                    then_body,
                    else_body,
                } => {
                    let idx = self.bump();
                    self.read(*cond, idx);
                    self.scan_seq(then_body);
                    self.scan_seq(else_body);
                }
            }
        }
    }
}

fn find(parent: &mut [SsaId], mut x: SsaId) -> SsaId {
    while parent[x as usize] != x {
        let grand = parent[parent[x as usize] as usize];
        parent[x as usize] = grand;
        x = grand;
    }
    x
}

fn union(parent: &mut [SsaId], a: SsaId, b: SsaId) {
    let ra = find(parent, a);
    let rb = find(parent, b);
    if ra == rb {
        return;
    }
    // smaller member wins the root, keeping bucket identity deterministic
    if ra < rb {
        parent[rb as usize] = ra;
    } else {
        parent[ra as usize] = rb;
    }
}
