//! Post-allocation peephole pass (spec §4.5): pattern rewrites applied to a
//! fixed point within each block, on physical-register-only MIR.
//!
//! Every pattern below strictly reduces instruction count when it fires, so
//! a block's instruction count no longer shrinking is a sufficient fixed-
//! point test (spec §8's "peephole is idempotent: a second application
//! produces the identical MIR" follows directly: once nothing shrinks,
//! none of the patterns below match any more).

use crate::isa::aarch64::regs;
use crate::mir::{Cond, Inst, MFunction, Reg, Width};
use crate::settings::PeepholeFlags;

pub fn run(mfunc: &mut MFunction, flags: &PeepholeFlags) {
    log::debug!("peephole: rewriting `{}`", mfunc.name);
    for b in mfunc.block_order() {
        loop {
            let before = mfunc.blocks[b].insts.len();
            let mut insts: Vec<Inst> =
                mfunc.blocks[b].insts.iter().map(|&mi| mfunc.insts[mi].clone()).collect();

            if flags.fold_imm {
                fold_mov_into_alu(&mut insts);
            }
            if flags.cbz_fusion {
                cmp_zero_to_cbz(&mut insts);
            }
            if flags.madd_msub_fusion {
                fuse_madd_msub(&mut insts);
            }
            if flags.ldp_stp_fusion {
                fuse_ldp_stp(&mut insts);
            }
            if flags.dead_def_elim {
                remove_dead_defs(&mut insts);
            }

            mfunc.blocks[b].insts.clear();
            for inst in insts {
                mfunc.push(b, inst);
            }
            if mfunc.blocks[b].insts.len() == before {
                break;
            }
        }
    }
    if flags.branch_inversion {
        invert_redundant_branch(mfunc);
    }
}

fn used_after(insts: &[Inst], from: usize, r: Reg) -> bool {
    insts[from..].iter().any(|inst| inst.uses().contains(&r))
}

/// `mov xT, #imm; add/sub/cmp xA, xB, xT` → the `*RI` form, when `imm` fits
/// the 12-bit add/sub/cmp immediate field and `xT` is not read again.
fn fold_mov_into_alu(insts: &mut Vec<Inst>) {
    let mut i = 0;
    while i + 1 < insts.len() {
        let repl = match (&insts[i], &insts[i + 1]) {
            (Inst::MovRI { width: w1, rd: t, imm }, next)
                if crate::lower::fastpath::fits_add_sub_imm(*imm)
                    && !used_after(insts, i + 2, *t) =>
            {
                fold_candidate(*t, *imm, *w1, next)
            }
            _ => None,
        };
        if let Some(new_inst) = repl {
            insts.splice(i..i + 2, [new_inst]);
        } else {
            i += 1;
        }
    }
}

fn fold_candidate(t: Reg, imm: i64, width: Width, next: &Inst) -> Option<Inst> {
    match *next {
        Inst::AddRRR { width: w2, rd, rn, rm } if w2 == width && rm == t => {
            Some(Inst::AddRI { width, rd, rn, imm })
        }
        Inst::AddRRR { width: w2, rd, rn, rm } if w2 == width && rn == t => {
            Some(Inst::AddRI { width, rd, rn: rm, imm })
        }
        Inst::SubRRR { width: w2, rd, rn, rm } if w2 == width && rm == t => {
            Some(Inst::SubRI { width, rd, rn, imm })
        }
        Inst::CmpRR { width: w2, rn, rm } if w2 == width && rm == t => {
            Some(Inst::CmpRI { width, rn, imm })
        }
        Inst::CmpRR { width: w2, rn, rm } if w2 == width && rn == t => {
            Some(Inst::CmpRI { width, rn: rm, imm })
        }
        _ => None,
    }
}

/// `cmp xA, #0; b.eq L` → `cbz xA, L` (and `b.ne` → `cbnz`).
fn cmp_zero_to_cbz(insts: &mut Vec<Inst>) {
    let mut i = 0;
    while i + 1 < insts.len() {
        let repl = match (&insts[i], &insts[i + 1]) {
            (Inst::CmpRI { rn, imm: 0, .. }, Inst::BCond { cond: Cond::Eq, target }) => {
                Some(Inst::Cbz { rn: *rn, target: *target })
            }
            (Inst::CmpRI { rn, imm: 0, .. }, Inst::BCond { cond: Cond::Ne, target }) => {
                Some(Inst::Cbnz { rn: *rn, target: *target })
            }
            _ => None,
        };
        if let Some(r) = repl {
            insts.splice(i..i + 2, [r]);
        } else {
            i += 1;
        }
    }
}

/// `mul xT, xA, xB; add xR, xC, xT` → `madd xR, xA, xB, xC` (and the `sub`
/// form → `msub`), when `xT` is not read again.
fn fuse_madd_msub(insts: &mut Vec<Inst>) {
    let mut i = 0;
    while i + 1 < insts.len() {
        let repl = match (&insts[i], &insts[i + 1]) {
            (Inst::MulRRR { width: w1, rd: t, rn: a, rm: b }, Inst::AddRRR { width: w2, rd: r, rn: c, rm })
                if w1 == w2 && *rm == *t && !used_after(insts, i + 2, *t) =>
            {
                Some(Inst::MAddRRRR { width: *w1, rd: *r, rn: *a, rm: *b, ra: *c })
            }
            (Inst::MulRRR { width: w1, rd: t, rn: a, rm: b }, Inst::AddRRR { width: w2, rd: r, rn, rm: c })
                if w1 == w2 && *rn == *t && !used_after(insts, i + 2, *t) =>
            {
                Some(Inst::MAddRRRR { width: *w1, rd: *r, rn: *a, rm: *b, ra: *c })
            }
            (Inst::MulRRR { width: w1, rd: t, rn: a, rm: b }, Inst::SubRRR { width: w2, rd: r, rn: c, rm })
                if w1 == w2 && *rm == *t && !used_after(insts, i + 2, *t) =>
            {
                Some(Inst::MSubRRRR { width: *w1, rd: *r, rn: *a, rm: *b, ra: *c })
            }
            _ => None,
        };
        if let Some(m) = repl {
            insts.splice(i..i + 2, [m]);
        } else {
            i += 1;
        }
    }
}

/// Adjacent `ldr`/`str` with consecutive FP-relative offsets → `ldp`/`stp`.
fn fuse_ldp_stp(insts: &mut Vec<Inst>) {
    let mut i = 0;
    while i + 1 < insts.len() {
        let repl = match (&insts[i], &insts[i + 1]) {
            (
                Inst::LdrRegFpImm { width: w1, is_fpr: f1, rd: rd1, imm: imm1 },
                Inst::LdrRegFpImm { width: w2, is_fpr: f2, rd: rd2, imm: imm2 },
            ) if w1 == w2
                && f1 == f2
                && rd1 != rd2
                && (imm2 - imm1).unsigned_abs() == size_bytes(*w1) =>
            {
                let (lo_reg, hi_reg) = if imm1 < imm2 { (*rd1, *rd2) } else { (*rd2, *rd1) };
                Some(Inst::LdpRegFpImm {
                    width: *w1,
                    is_fpr: *f1,
                    rd1: lo_reg,
                    rd2: hi_reg,
                    imm: (*imm1).min(*imm2),
                })
            }
            (
                Inst::StrRegFpImm { width: w1, is_fpr: f1, rd: rd1, imm: imm1 },
                Inst::StrRegFpImm { width: w2, is_fpr: f2, rd: rd2, imm: imm2 },
            ) if w1 == w2 && f1 == f2 && (imm2 - imm1).unsigned_abs() == size_bytes(*w1) => {
                let (lo_reg, hi_reg) = if imm1 < imm2 { (*rd1, *rd2) } else { (*rd2, *rd1) };
                Some(Inst::StpRegFpImm {
                    width: *w1,
                    is_fpr: *f1,
                    rd1: lo_reg,
                    rd2: hi_reg,
                    imm: (*imm1).min(*imm2),
                })
            }
            _ => None,
        };
        if let Some(m) = repl {
            insts.splice(i..i + 2, [m]);
        } else {
            i += 1;
        }
    }
}

fn size_bytes(w: Width) -> u32 {
    match w {
        Width::W32 => 4,
        Width::W64 => 8,
    }
}

/// Dead `cset`/`mov` whose destination is never read again in this block
/// are removed — conservatively never touching argument or return
/// registers, whose real liveness extends into an ABI call/return this
/// block-local scan cannot see.
fn remove_dead_defs(insts: &mut Vec<Inst>) {
    let protected: Vec<Reg> = regs::ARG_GPRS
        .iter()
        .chain(regs::ARG_FPRS.iter())
        .copied()
        .map(Reg::Physical)
        .chain([Reg::Physical(regs::ret_gpr()), Reg::Physical(regs::ret_fpr())])
        .collect();

    let mut i = 0;
    while i < insts.len() {
        let dead = insts[i].is_pure_def() && {
            let defs = insts[i].defs();
            defs.len() == 1 && !protected.contains(&defs[0]) && !used_after(insts, i + 1, defs[0])
        };
        if dead {
            insts.remove(i);
        } else {
            i += 1;
        }
    }
}

/// `b.cond L1; b L2; L1:` → `b.!cond L2; L1:`, recognized as a `BCond`
/// immediately followed by an unconditional `Br` whose target is the very
/// next block in layout order — so dropping the `Br` costs nothing, the
/// next block is reached by the plain text fallthrough.
fn invert_redundant_branch(mfunc: &mut MFunction) {
    let order = mfunc.block_order();
    for w in order.windows(2) {
        let (b, next) = (w[0], w[1]);
        if mfunc.blocks[b].insts.len() < 2 {
            continue;
        }
        let last = mfunc.blocks[b].insts[mfunc.blocks[b].insts.len() - 1];
        let second_last = mfunc.blocks[b].insts[mfunc.blocks[b].insts.len() - 2];
        let rewrite = match (&mfunc.insts[second_last], &mfunc.insts[last]) {
            (Inst::BCond { cond, target }, Inst::Br { target: l2 }) if *target == next => {
                Some((cond.invert(), *l2))
            }
            _ => None,
        };
        if let Some((cond, l2)) = rewrite {
            mfunc.insts[second_last] = Inst::BCond { cond, target: l2 };
            mfunc.blocks[b].insts.pop();
        }
    }
}
