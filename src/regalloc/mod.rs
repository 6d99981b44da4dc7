//! Linear-scan register allocation (spec §4.3).
//!
//! Grounded in the shape of the teacher's old `regalloc/register_set.rs`
//! (a pool of free physical registers handed out and reclaimed as
//! intervals open and close) generalized from graph-coloring to a linear
//! scan over intervals sorted by start position, per spec §4.3. Two
//! independent pools (GPR, FPR) are scanned separately; each prefers a
//! caller-saved register unless the interval crosses a call, in which case
//! it prefers callee-saved (avoiding a caller-saved save/restore around
//! every call site). When a pool is exhausted, the interval ending
//! furthest away is spilled — whichever of the incoming interval and the
//! worst active one that is.

pub mod liveness;

use crate::diag::Diagnostics;
use crate::error::CodegenResult;
use crate::isa::aarch64::regs::{self, PReg, RegClass};
use crate::mir::{Inst, MFunction, MInst, Reg, Slot, VReg, Width};
use liveness::{Interval, Liveness};
use std::collections::HashMap;

/// An instruction whose immediate still needs patching once `crate::frame`
/// assigns `slot` its final frame-pointer-relative offset. Produced by the
/// spill rewrite below for every reload/store it inserts; consumed by the
/// frame builder once stack layout is final.
#[derive(Copy, Clone, Debug)]
pub struct SpillFixup {
    pub inst: MInst,
    pub slot: Slot,
}

struct ClassAlloc {
    free: Vec<PReg>,
    callee_saved: Vec<PReg>,
    active: Vec<(u32, VReg, PReg)>,
    assignment: HashMap<VReg, PReg>,
    spilled: std::collections::HashSet<VReg>,
    save_set: std::collections::BTreeSet<PReg>,
}

impl ClassAlloc {
    fn new(caller: &[PReg], callee: &[PReg]) -> ClassAlloc {
        let mut free = Vec::with_capacity(caller.len() + callee.len());
        free.extend_from_slice(caller);
        free.extend_from_slice(callee);
        ClassAlloc {
            free,
            callee_saved: callee.to_vec(),
            active: Vec::new(),
            assignment: HashMap::new(),
            spilled: Default::default(),
            save_set: Default::default(),
        }
    }

    /// Returns expired physical registers to the free pool. An active
    /// interval whose end position equals `start` is expired too: `end`
    /// and `start` are whole-instruction positions (spec §4.2), so an
    /// interval ending at exactly the instruction that defines the new one
    /// is read and retired in that same instruction — the destination is
    /// free to reuse its register, which is how `add x0, x0, #1` (operand
    /// and result sharing a register) falls out of allocation instead of
    /// needing a dedicated coalescing pass.
    fn expire(&mut self, start: u32) {
        let mut i = 0;
        while i < self.active.len() {
            if self.active[i].0 <= start {
                let (_, _, preg) = self.active.remove(i);
                self.free.push(preg);
            } else {
                i += 1;
            }
        }
    }

    /// `prefer_callee` is a hard requirement, not a preference that falls
    /// back: a call-crossing interval that can't get a callee-saved
    /// register must be spilled rather than handed a caller-saved one,
    /// which would be silently clobbered by the call it crosses.
    fn take(&mut self, prefer_callee: bool) -> Option<PReg> {
        if prefer_callee {
            let pos = self.free.iter().position(|r| self.callee_saved.contains(r));
            pos.map(|i| self.free.remove(i))
        } else {
            let pos = self.free.iter().position(|r| !self.callee_saved.contains(r));
            match pos {
                Some(i) => Some(self.free.remove(i)),
                None => self.free.pop(),
            }
        }
    }

    fn record_assignment(&mut self, vreg: VReg, end: u32, preg: PReg) {
        if self.callee_saved.contains(&preg) {
            self.save_set.insert(preg);
        }
        self.assignment.insert(vreg, preg);
        self.active.push((end, vreg, preg));
    }

    fn assign(&mut self, vreg: VReg, interval: &Interval, crosses_call: bool) -> bool {
        match self.take(crosses_call) {
            Some(preg) => {
                self.record_assignment(vreg, interval.end, preg);
                true
            }
            None => false,
        }
    }

    /// Spills whichever of `vreg` or the worst active interval ends later
    /// (spec §4.3's furthest-endpoint victim selection), reusing the
    /// freed-up register for the other. When `require_callee` is set, only
    /// an active interval already holding a callee-saved register is a
    /// valid victim: evicting a caller-saved one would just hand `vreg` a
    /// register the call it crosses is free to clobber. If no such victim
    /// exists, `vreg` itself spills.
    fn spill_victim(&mut self, vreg: VReg, interval: &Interval, require_callee: bool) {
        let callee_saved = &self.callee_saved;
        let worst = self
            .active
            .iter()
            .enumerate()
            .filter(|(_, (_, _, preg))| !require_callee || callee_saved.contains(preg))
            .max_by_key(|(_, (end, _, _))| *end)
            .map(|(i, &(end, v, p))| (i, end, v, p));
        match worst {
            Some((i, end, victim, preg)) if end > interval.end => {
                self.active.remove(i);
                self.assignment.remove(&victim);
                self.spilled.insert(victim);
                self.record_assignment(vreg, interval.end, preg);
            }
            _ => {
                self.spilled.insert(vreg);
            }
        }
    }
}

/// Runs liveness, then linear-scan allocation, then rewrites every
/// `Reg::Virtual` operand in `mfunc` into a `Reg::Physical` one — spilled
/// vregs are rewritten to one of a small set of dedicated reload
/// temporaries, with explicit `Ldr`/`Str` (or, for cheap constants,
/// rematerializing `MovRI`) instructions spliced in around their use/def
/// sites. Returns the list of instructions whose frame-relative immediate
/// still needs patching once `crate::frame` finalizes the stack layout.
pub fn allocate(mfunc: &mut MFunction, diags: &mut Diagnostics) -> CodegenResult<Vec<SpillFixup>> {
    log::debug!("regalloc: allocating `{}`", mfunc.name);

    let live = Liveness::compute(mfunc);

    let mut gpr = ClassAlloc::new(&regs::CALLER_SAVED_GPRS, &regs::CALLEE_SAVED_GPRS);
    let fpr_caller = regs::caller_saved_fprs();
    let mut fpr = ClassAlloc::new(&fpr_caller, &regs::CALLEE_SAVED_FPRS);

    let mut order: Vec<(VReg, Interval)> = mfunc
        .vregs
        .keys()
        .filter_map(|v| live.intervals[v].clone().map(|iv| (v, iv)))
        .collect();
    order.sort_by_key(|(_, iv)| iv.def);

    for (vreg, interval) in &order {
        let class = mfunc.vregs[*vreg].class;
        let alloc = if class == RegClass::Gpr { &mut gpr } else { &mut fpr };
        alloc.expire(interval.def);
        let crosses_call = live.call_positions.range(interval.def..=interval.end).next().is_some();
        if !alloc.assign(*vreg, interval, crosses_call) {
            alloc.spill_victim(*vreg, interval, crosses_call);
        }
    }

    let mut assignment: HashMap<VReg, PReg> = HashMap::new();
    assignment.extend(gpr.assignment.iter().map(|(&k, &v)| (k, v)));
    assignment.extend(fpr.assignment.iter().map(|(&k, &v)| (k, v)));

    let mut spilled: std::collections::HashSet<VReg> = gpr.spilled.clone();
    spilled.extend(fpr.spilled.iter().copied());

    for (&v, &p) in &assignment {
        mfunc.assignment[v] = Some(p);
    }
    mfunc.save_set = gpr.save_set.into_iter().chain(fpr.save_set).collect();

    if !spilled.is_empty() {
        diags.warn(format!(
            "{} value(s) spilled to the stack in `{}`",
            spilled.len(),
            mfunc.name
        ));
        log::debug!("regalloc: {} spill(s) in `{}`", spilled.len(), mfunc.name);
    }

    let remat = rematerializable(mfunc, &spilled);
    let fixups = rewrite_spills(mfunc, &assignment, &spilled, &remat);
    Ok(fixups)
}

/// A spilled vreg whose sole definition is a side-effect-free `MovRI` is
/// reconstructed at each use instead of reloaded from memory, avoiding a
/// stack slot entirely (spec §4.3, §9).
fn rematerializable(mfunc: &MFunction, spilled: &std::collections::HashSet<VReg>) -> HashMap<VReg, (Width, i64)> {
    let mut out = HashMap::new();
    for b in mfunc.block_order() {
        for &mi in &mfunc.blocks[b].insts {
            let movri = match &mfunc.insts[mi] {
                Inst::MovRI { width, rd, imm } => Some((*width, *rd, *imm)),
                _ => None,
            };
            if let Some((width, rd, imm)) = movri {
                if let Some(v) = rd.as_vreg() {
                    if spilled.contains(&v) {
                        out.insert(v, (width, imm));
                    }
                }
            }
        }
    }
    out
}

fn pick_temp(class: RegClass, next: &mut usize, gprs: &[PReg; 3], fprs: &[PReg; 3]) -> PReg {
    let r = if class == RegClass::Gpr { gprs[*next % gprs.len()] } else { fprs[*next % fprs.len()] };
    *next += 1;
    r
}

fn rewrite_spills(
    mfunc: &mut MFunction,
    assignment: &HashMap<VReg, PReg>,
    spilled: &std::collections::HashSet<VReg>,
    remat: &HashMap<VReg, (Width, i64)>,
) -> Vec<SpillFixup> {
    let mut slots: HashMap<VReg, Slot> = HashMap::new();
    let mut fixups = Vec::new();
    let reload_gprs = regs::reload_gprs();
    let reload_fprs = regs::reload_fprs();

    for b in mfunc.block_order() {
        let original: Vec<MInst> = mfunc.blocks[b].insts.clone();
        let mut new_insts: Vec<MInst> = Vec::with_capacity(original.len());

        for mi in original {
            let mut inst = mfunc.insts[mi].clone();
            let mut local: HashMap<VReg, Reg> = HashMap::new();
            let mut pre: Vec<(Inst, Option<Slot>)> = Vec::new();
            let mut post: Vec<(Inst, Option<Slot>)> = Vec::new();
            let mut next_gpr = 0usize;
            let mut next_fpr = 0usize;

            for u in inst.uses() {
                let Some(v) = u.as_vreg() else { continue };
                if !spilled.contains(&v) || local.contains_key(&v) {
                    continue;
                }
                let class = mfunc.vregs[v].class;
                let width = Width::from_bits(mfunc.vregs[v].size);
                let temp = pick_temp(class, if class == RegClass::Gpr { &mut next_gpr } else { &mut next_fpr }, &reload_gprs, &reload_fprs);
                let rd = Reg::Physical(temp);
                if let Some(&(rw, imm)) = remat.get(&v) {
                    pre.push((Inst::MovRI { width: rw, rd, imm }, None));
                } else {
                    let slot = *slots.entry(v).or_insert_with(|| mfunc.create_slot(8, 8));
                    pre.push((reload_inst(class, width, rd), Some(slot)));
                }
                local.insert(v, rd);
            }

            for d in inst.defs() {
                let Some(v) = d.as_vreg() else { continue };
                if !spilled.contains(&v) || local.contains_key(&v) {
                    continue;
                }
                let class = mfunc.vregs[v].class;
                let width = Width::from_bits(mfunc.vregs[v].size);
                let temp = pick_temp(class, if class == RegClass::Gpr { &mut next_gpr } else { &mut next_fpr }, &reload_gprs, &reload_fprs);
                let rd = Reg::Physical(temp);
                local.insert(v, rd);
                if !remat.contains_key(&v) {
                    let slot = *slots.entry(v).or_insert_with(|| mfunc.create_slot(8, 8));
                    post.push((spill_inst(class, width, rd), Some(slot)));
                }
            }

            inst.rewrite_regs(&mut |r| match r {
                Reg::Virtual(v) => assignment
                    .get(&v)
                    .copied()
                    .map(Reg::Physical)
                    .or_else(|| local.get(&v).copied())
                    .unwrap_or_else(|| unreachable!("vreg {:?} neither assigned nor spilled-with-temp", v)),
                other => other,
            });

            for (data, slot) in pre {
                let id = mfunc.insts.push(data);
                new_insts.push(id);
                if let Some(s) = slot {
                    fixups.push(SpillFixup { inst: id, slot: s });
                }
            }
            let id = mfunc.insts.push(inst);
            new_insts.push(id);
            for (data, slot) in post {
                let id = mfunc.insts.push(data);
                new_insts.push(id);
                if let Some(s) = slot {
                    fixups.push(SpillFixup { inst: id, slot: s });
                }
            }
        }

        mfunc.blocks[b].insts = new_insts;
    }

    fixups
}

/// Built with a placeholder immediate of 0; `crate::frame` patches it via
/// the returned `SpillFixup` once the slot's offset is known.
fn reload_inst(class: RegClass, width: Width, rd: Reg) -> Inst {
    Inst::LdrRegFpImm { width, is_fpr: class == RegClass::Fpr, rd, imm: 0 }
}

fn spill_inst(class: RegClass, width: Width, rd: Reg) -> Inst {
    Inst::StrRegFpImm { width, is_fpr: class == RegClass::Fpr, rd, imm: 0 }
}
