//! Per-function liveness analysis (spec §4.2): iterative backward dataflow
//! over the MIR block list, producing block live-in/live-out sets and, per
//! vreg, a pseudo-linear interval consumed by the linear-scan allocator in
//! `crate::regalloc`.
//!
//! Positions are global integers assigned in reverse postorder over the
//! block list rather than a true SSA dominance-based liveness; this
//! approximates real liveness closely enough for a single linear-scan pass
//! without requiring a dominator tree (spec §4.2).

use crate::mir::{MBlock, MFunction, MInst, VReg};
use cranelift_entity::SecondaryMap;
use std::collections::BTreeSet;

/// A vreg's live range: a single def position, the positions of every use,
/// and the furthest of those (or the def itself, if the vreg is never
/// used) — the "end" the allocator treats as the interval's extent.
#[derive(Clone, Debug)]
pub struct Interval {
    pub def: u32,
    pub uses: Vec<u32>,
    pub end: u32,
}

pub struct Liveness {
    pub order: Vec<MBlock>,
    pub position: SecondaryMap<MInst, u32>,
    pub block_live_in: SecondaryMap<MBlock, BTreeSet<VReg>>,
    pub block_live_out: SecondaryMap<MBlock, BTreeSet<VReg>>,
    pub intervals: SecondaryMap<VReg, Option<Interval>>,
    /// Global positions of `bl`/`blr` instructions, consulted by the
    /// allocator's callee-saved preference for call-crossing intervals
    /// (spec §4.3).
    pub call_positions: BTreeSet<u32>,
}

impl Liveness {
    pub fn compute(mfunc: &MFunction) -> Liveness {
        let order = mfunc.rpo();

        let mut position: SecondaryMap<MInst, u32> = SecondaryMap::new();
        let mut call_positions = BTreeSet::new();
        let mut pos = 0u32;
        for &b in &order {
            for &mi in &mfunc.blocks[b].insts {
                position[mi] = pos;
                if mfunc.insts[mi].is_call() {
                    call_positions.insert(pos);
                }
                pos += 1;
            }
        }

        let mut block_live_in: SecondaryMap<MBlock, BTreeSet<VReg>> = SecondaryMap::new();
        let mut block_live_out: SecondaryMap<MBlock, BTreeSet<VReg>> = SecondaryMap::new();

        let mut changed = true;
        while changed {
            changed = false;
            for &b in order.iter().rev() {
                let mut live_out: BTreeSet<VReg> = BTreeSet::new();
                for succ in mfunc.successors(b) {
                    live_out.extend(block_live_in[succ].iter().copied());
                }
                let mut live = live_out.clone();
                for &mi in mfunc.blocks[b].insts.iter().rev() {
                    for d in mfunc.insts[mi].defs() {
                        if let Some(v) = d.as_vreg() {
                            live.remove(&v);
                        }
                    }
                    for u in mfunc.insts[mi].uses() {
                        if let Some(v) = u.as_vreg() {
                            live.insert(v);
                        }
                    }
                }
                if live != block_live_in[b] || live_out != block_live_out[b] {
                    changed = true;
                }
                block_live_in[b] = live;
                block_live_out[b] = live_out;
            }
        }

        let mut intervals: SecondaryMap<VReg, Option<Interval>> = SecondaryMap::new();
        for &b in &order {
            let live_out = block_live_out[b].clone();
            let last_pos = mfunc.blocks[b]
                .insts
                .last()
                .map(|&mi| position[mi])
                .unwrap_or(0);
            for &v in &live_out {
                touch(&mut intervals, v, last_pos);
            }
            let mut live = live_out;
            for &mi in mfunc.blocks[b].insts.iter().rev() {
                let p = position[mi];
                for d in mfunc.insts[mi].defs() {
                    if let Some(v) = d.as_vreg() {
                        live.remove(&v);
                        let e = intervals[v]
                            .get_or_insert_with(|| Interval { def: p, uses: Vec::new(), end: p });
                        e.def = p;
                        if e.end < p {
                            e.end = p;
                        }
                    }
                }
                for u in mfunc.insts[mi].uses() {
                    if let Some(v) = u.as_vreg() {
                        live.insert(v);
                        touch(&mut intervals, v, p);
                    }
                }
            }
        }

        Liveness {
            order,
            position,
            block_live_in,
            block_live_out,
            intervals,
            call_positions,
        }
    }
}

fn touch(intervals: &mut SecondaryMap<VReg, Option<Interval>>, v: VReg, pos: u32) {
    let e = intervals[v].get_or_insert_with(|| Interval { def: pos, uses: Vec::new(), end: pos });
    e.uses.push(pos);
    if e.end < pos {
        e.end = pos;
    }
}
