//! Lowering of checked arithmetic (`add.ovf`, `sub.ovf`, `mul.ovf`,
//! `sdiv.chk0`, `srem.chk0`) to flag-setting MIR plus a conditional branch
//! to a per-function trap block (spec §4.1's checked-arithmetic note, §9's
//! trap-trampoline design).
//!
//! Each trap block is created lazily, once per function, and contains a
//! single `bl` to the runtime helper followed by nothing else: the helper
//! is documented (spec §7) never to return.

use crate::mir::{Cond, Inst, MBlock, MFunction, Reg, Width};

pub const TRAP_OVERFLOW_SYMBOL: &str = "__viper_trap_overflow";
pub const TRAP_DIVZERO_SYMBOL: &str = "__viper_trap_divzero";

/// Per-function cache of the two trap blocks, so multiple checked ops share
/// one `bl` site instead of growing with the number of checks.
#[derive(Default)]
pub struct TrapBlocks {
    overflow: Option<MBlock>,
    divzero: Option<MBlock>,
}

impl TrapBlocks {
    pub fn overflow_block(&mut self, mfunc: &mut MFunction) -> MBlock {
        *self.overflow.get_or_insert_with(|| {
            let b = mfunc.create_block();
            mfunc.push(
                b,
                Inst::Bl {
                    target: TRAP_OVERFLOW_SYMBOL.to_string(),
                },
            );
            b
        })
    }

    pub fn divzero_block(&mut self, mfunc: &mut MFunction) -> MBlock {
        *self.divzero.get_or_insert_with(|| {
            let b = mfunc.create_block();
            mfunc.push(
                b,
                Inst::Bl {
                    target: TRAP_DIVZERO_SYMBOL.to_string(),
                },
            );
            b
        })
    }
}

/// Emits `adds`/`subs` into `rd` and a `b.vs` to the overflow trap,
/// returning `rd`.
fn lower_flagged(
    mfunc: &mut MFunction,
    block: MBlock,
    traps: &mut TrapBlocks,
    width: Width,
    rd: Reg,
    rn: Reg,
    rm: Reg,
    is_add: bool,
    cont: MBlock,
) {
    let inst = if is_add {
        Inst::AddsRRR { width, rd, rn, rm }
    } else {
        Inst::SubsRRR { width, rd, rn, rm }
    };
    mfunc.push(block, inst);
    let trap = traps.overflow_block(mfunc);
    mfunc.push(
        block,
        Inst::BCond {
            cond: Cond::Vs,
            target: trap,
        },
    );
    mfunc.push(block, Inst::Br { target: cont });
}

pub fn lower_add_ovf(
    mfunc: &mut MFunction,
    block: MBlock,
    traps: &mut TrapBlocks,
    width: Width,
    rd: Reg,
    rn: Reg,
    rm: Reg,
    cont: MBlock,
) {
    lower_flagged(mfunc, block, traps, width, rd, rn, rm, true, cont);
}

pub fn lower_sub_ovf(
    mfunc: &mut MFunction,
    block: MBlock,
    traps: &mut TrapBlocks,
    width: Width,
    rd: Reg,
    rn: Reg,
    rm: Reg,
    cont: MBlock,
) {
    lower_flagged(mfunc, block, traps, width, rd, rn, rm, false, cont);
}

/// `mul.ovf` has no flag-setting multiply on AArch64: compute the full
/// 128-bit product's high half with `smulh` and verify it is the sign
/// extension of the low half (the standard ARM overflow-checked-multiply
/// idiom), operating on the full 64-bit registers regardless of the IL
/// operand width (scope decision, see DESIGN.md). The low half alone
/// doesn't signal overflow (e.g. `2 * -3 = -6` has `smulh = -1`, not `0`):
/// the product only fits in 64 bits when `smulh` is the arithmetic sign
/// extension of the low word, i.e. equal to `rd >> 63`.
pub fn lower_mul_ovf(
    mfunc: &mut MFunction,
    block: MBlock,
    traps: &mut TrapBlocks,
    scratch_hi: Reg,
    scratch_sext: Reg,
    rd: Reg,
    rn: Reg,
    rm: Reg,
    cont: MBlock,
) {
    mfunc.push(
        block,
        Inst::MulRRR {
            width: Width::W64,
            rd,
            rn,
            rm,
        },
    );
    mfunc.push(
        block,
        Inst::SMulH {
            rd: scratch_hi,
            rn,
            rm,
        },
    );
    mfunc.push(
        block,
        Inst::AsrRI {
            width: Width::W64,
            rd: scratch_sext,
            rn: rd,
            amt: 63,
        },
    );
    mfunc.push(
        block,
        Inst::CmpRR {
            width: Width::W64,
            rn: scratch_hi,
            rm: scratch_sext,
        },
    );
    let trap = traps.overflow_block(mfunc);
    mfunc.push(
        block,
        Inst::BCond {
            cond: Cond::Ne,
            target: trap,
        },
    );
    mfunc.push(block, Inst::Br { target: cont });
}

/// `sdiv.chk0`: branch to the divide-by-zero trap if the divisor is zero,
/// otherwise a plain signed divide.
pub fn lower_sdiv_chk0(
    mfunc: &mut MFunction,
    block: MBlock,
    traps: &mut TrapBlocks,
    width: Width,
    rd: Reg,
    rn: Reg,
    rm: Reg,
    cont: MBlock,
) {
    let trap = traps.divzero_block(mfunc);
    mfunc.push(block, Inst::Cbz { rn: rm, target: trap });
    mfunc.push(block, Inst::SDivRRR { width, rd, rn, rm });
    mfunc.push(block, Inst::Br { target: cont });
}

/// `srem.chk0`: same zero-check, then `rd = rn - (rn / rm) * rm` via
/// `sdiv` + `msub` (there is no native remainder instruction).
pub fn lower_srem_chk0(
    mfunc: &mut MFunction,
    block: MBlock,
    traps: &mut TrapBlocks,
    width: Width,
    scratch: Reg,
    rd: Reg,
    rn: Reg,
    rm: Reg,
    cont: MBlock,
) {
    let trap = traps.divzero_block(mfunc);
    mfunc.push(block, Inst::Cbz { rn: rm, target: trap });
    mfunc.push(
        block,
        Inst::SDivRRR {
            width,
            rd: scratch,
            rn,
            rm,
        },
    );
    mfunc.push(
        block,
        Inst::MSubRRRR {
            width,
            rd,
            rn: scratch,
            rm,
            ra: rn,
        },
    );
    mfunc.push(block, Inst::Br { target: cont });
}
