//! Sequentialization of a parallel register copy into an ordered sequence
//! of `mov`/`fmov` instructions, breaking cycles (e.g. a block-parameter
//! swap `br loop(v2, v1)` where the loop header's params are `(v1, v2)`)
//! with a dedicated scratch register per class (spec §4.1, §8's "parallel
//! copies are always resolved into a cycle-free move sequence").

use crate::isa::aarch64::regs::RegClass;
use crate::mir::{Inst, Reg, Width};

/// Expands a set of simultaneous `dst := src` assignments into a sequence
/// of ordinary moves. `class_of` classifies a register as GPR or FPR so the
/// two classes can be sequentialized independently, each with its own
/// scratch register.
pub fn resolve(
    pairs: &[(Reg, Reg)],
    scratch_gpr: Reg,
    scratch_fpr: Reg,
    class_of: impl Fn(Reg) -> RegClass,
) -> Vec<Inst> {
    let gpr: Vec<(Reg, Reg)> = pairs
        .iter()
        .copied()
        .filter(|(d, _)| class_of(*d) == RegClass::Gpr)
        .collect();
    let fpr: Vec<(Reg, Reg)> = pairs
        .iter()
        .copied()
        .filter(|(d, _)| class_of(*d) == RegClass::Fpr)
        .collect();
    let mut out = sequentialize(&gpr, scratch_gpr, false);
    out.extend(sequentialize(&fpr, scratch_fpr, true));
    out
}

fn mk_mov(dst: Reg, src: Reg, is_fpr: bool) -> Inst {
    if is_fpr {
        Inst::FMovRR {
            width: Width::W64,
            rd: dst,
            rn: src,
        }
    } else {
        Inst::MovRR {
            width: Width::W64,
            rd: dst,
            rm: src,
        }
    }
}

/// Repeatedly strips "leaf" copies (destinations nobody else still needs
/// as a source) until only cycles remain, then breaks one cycle at a time
/// through `scratch`. Quadratic in the number of pending copies, which is
/// always small (bounded by a block's parameter count).
fn sequentialize(pairs: &[(Reg, Reg)], scratch: Reg, is_fpr: bool) -> Vec<Inst> {
    let mut pending: Vec<(Reg, Reg)> = pairs.iter().copied().filter(|(d, s)| d != s).collect();
    let mut out = Vec::new();

    while !pending.is_empty() {
        let mut progressed = true;
        while progressed {
            progressed = false;
            let mut i = 0;
            while i < pending.len() {
                let (d, s) = pending[i];
                let needed_elsewhere = pending
                    .iter()
                    .enumerate()
                    .any(|(j, &(_, s2))| j != i && s2 == d);
                if !needed_elsewhere {
                    out.push(mk_mov(d, s, is_fpr));
                    pending.remove(i);
                    progressed = true;
                } else {
                    i += 1;
                }
            }
        }
        if let Some(&(d, _)) = pending.first() {
            out.push(mk_mov(scratch, d, is_fpr));
            for pair in pending.iter_mut() {
                if pair.1 == d {
                    pair.1 = scratch;
                }
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isa::aarch64::regs::xreg;
    use crate::mir::VReg;
    use cranelift_entity::EntityRef;

    fn v(i: u32) -> Reg {
        Reg::Virtual(VReg::new(i as usize))
    }

    #[test]
    fn fan_out_no_cycle() {
        let s = v(0);
        let d1 = v(1);
        let d2 = v(2);
        let moves = resolve(&[(d1, s), (d2, s)], Reg::Physical(xreg(16)), Reg::Physical(xreg(16)), |_| {
            RegClass::Gpr
        });
        assert_eq!(moves.len(), 2);
    }

    #[test]
    fn two_cycle_uses_scratch() {
        let a = v(0);
        let b = v(1);
        let scratch = Reg::Physical(xreg(16));
        let moves = resolve(&[(a, b), (b, a)], scratch, scratch, |_| RegClass::Gpr);
        assert_eq!(moves.len(), 3);
        assert!(matches!(moves[0], Inst::MovRR { rd, .. } if rd == scratch));
    }

    #[test]
    fn identity_pairs_produce_no_moves() {
        let a = v(0);
        let moves = resolve(&[(a, a)], Reg::Physical(xreg(16)), Reg::Physical(xreg(16)), |_| {
            RegClass::Gpr
        });
        assert!(moves.is_empty());
    }
}
