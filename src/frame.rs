//! Frame building (spec §4.4): prologue/epilogue synthesis and final stack
//! slot layout.
//!
//! Runs after `crate::regalloc`, which has already decided which callee-
//! saved registers are live (`MFunction::save_set`) and created a stack
//! slot for every spilled vreg and `alloca`. This pass only has to lay
//! those slots out and patch the placeholder immediates regalloc and
//! lowering left behind (`crate::regalloc::SpillFixup` and `Inst::FrameAddr`
//! respectively) — it never changes what is spilled or where an `alloca`
//! lives relative to other slots, only their final addresses.

use crate::isa::aarch64::regs::{self, PReg, RegClass, STACK_ALIGN};
use crate::mir::{Inst, MFunction, Reg};
use crate::regalloc::SpillFixup;

fn align_up(n: u32, align: u32) -> u32 {
    (n + align - 1) / align * align
}

/// Lays out every stack slot below the saved FP/LR pair and callee-saved
/// area, patches spill fixups and `FrameAddr` placeholders, and sets
/// `MFunction::frame_size`.
///
/// `StackSlotData::fp_offset` is stored as a positive magnitude (distance
/// below the frame pointer); the frame pointer itself addresses downward,
/// so every consumer negates it to get the actual `[fp, #imm]` immediate.
pub fn build(mfunc: &mut MFunction, fixups: &[SpillFixup]) {
    log::debug!("frame: laying out `{}`", mfunc.name);

    let callee_gprs: Vec<PReg> = mfunc.save_set.iter().copied().filter(|r| r.class == RegClass::Gpr).collect();
    let callee_fprs: Vec<PReg> = mfunc.save_set.iter().copied().filter(|r| r.class == RegClass::Fpr).collect();
    let callee_area = pair_area(callee_gprs.len()) + pair_area(callee_fprs.len());

    let mut cursor = callee_area;
    for slot in mfunc.slots.keys() {
        let data = &mfunc.slots[slot];
        let align = data.align.max(1);
        cursor = align_up(cursor, align);
        cursor += data.size;
        mfunc.slots[slot].fp_offset = Some(cursor as i32);
    }

    mfunc.frame_size = align_up(cursor, STACK_ALIGN);

    for fixup in fixups {
        let offset = mfunc.slots[fixup.slot]
            .fp_offset
            .expect("every slot is laid out before fixups are applied");
        patch_imm(&mut mfunc.insts[fixup.inst], -offset);
    }

    for mi in mfunc.insts.keys().collect::<Vec<_>>() {
        let frame_addr = match &mfunc.insts[mi] {
            Inst::FrameAddr { rd, slot } => Some((*rd, *slot)),
            _ => None,
        };
        if let Some((rd, slot)) = frame_addr {
            let offset = mfunc.slots[slot]
                .fp_offset
                .expect("every slot is laid out before FrameAddr placeholders are resolved");
            mfunc.insts[mi] = Inst::AddRI {
                width: crate::mir::Width::W64,
                rd,
                rn: Reg::Physical(regs::fp_reg()),
                imm: -offset as i64,
            };
        }
    }

    splice_prologue_epilogue(mfunc, &callee_gprs, &callee_fprs);
}

/// Bytes occupied by `n` callee-saved registers of one class, saved/
/// restored in pairs (an odd count still reserves a full 16-byte pair,
/// leaving one half unused rather than breaking 16-byte alignment).
fn pair_area(n: usize) -> u32 {
    (((n + 1) / 2) * 16) as u32
}

fn patch_imm(inst: &mut Inst, offset: i32) {
    match inst {
        Inst::LdrRegFpImm { imm, .. } | Inst::StrRegFpImm { imm, .. } => *imm = offset,
        other => unreachable!("spill fixup target is not a frame-relative load/store: {other:?}"),
    }
}

/// Emits `stp x29,x30,[sp,#-16]!; mov x29,sp`, callee-saved pair saves, and
/// the `sub sp,sp,#frame_size` that reserves the spill/alloca area — then
/// the mirrored epilogue ending in `ret`. Inserted directly into the entry
/// and every block ending in `Ret` (spec §4.4); `crate::peephole` and
/// `crate::emit` are unaware of slots and only ever see these instructions.
fn splice_prologue_epilogue(mfunc: &mut MFunction, callee_gprs: &[PReg], callee_fprs: &[PReg]) {
    let entry = mfunc.entry;
    let mut prologue = Vec::new();
    prologue.push(Inst::StpRegFpImm {
        width: crate::mir::Width::W64,
        is_fpr: false,
        rd1: Reg::Physical(regs::fp_reg()),
        rd2: Reg::Physical(regs::link_reg()),
        imm: -16,
    });
    prologue.push(Inst::MovRR {
        width: crate::mir::Width::W64,
        rd: Reg::Physical(regs::fp_reg()),
        rm: Reg::Physical(regs::sp_reg()),
    });

    let mut save_offset: i32 = -16;
    for pair in callee_gprs.chunks(2) {
        save_offset -= 16;
        prologue.push(save_or_solo(pair, save_offset, false));
    }
    for pair in callee_fprs.chunks(2) {
        save_offset -= 16;
        prologue.push(save_or_solo(pair, save_offset, true));
    }

    if mfunc.frame_size > 0 {
        prologue.extend(chunked_sp_adjust(mfunc.frame_size, true));
    }

    let mut epilogue_tail = Vec::new();
    if mfunc.frame_size > 0 {
        epilogue_tail.extend(chunked_sp_adjust(mfunc.frame_size, false));
    }
    let mut restore_offset: i32 = -16;
    let mut restores = Vec::new();
    for pair in callee_gprs.chunks(2) {
        restore_offset -= 16;
        restores.push(restore_or_solo(pair, restore_offset, false));
    }
    for pair in callee_fprs.chunks(2) {
        restore_offset -= 16;
        restores.push(restore_or_solo(pair, restore_offset, true));
    }
    restores.reverse();
    epilogue_tail.extend(restores);
    epilogue_tail.push(Inst::LdpRegFpImm {
        width: crate::mir::Width::W64,
        is_fpr: false,
        rd1: Reg::Physical(regs::fp_reg()),
        rd2: Reg::Physical(regs::link_reg()),
        imm: -16,
    });

    let mut entry_insts = prologue;
    entry_insts.extend(mfunc.blocks[entry].insts.iter().map(|&mi| mfunc.insts[mi].clone()));
    mfunc.blocks[entry].insts.clear();
    for inst in entry_insts {
        mfunc.push(entry, inst);
    }

    for b in mfunc.block_order() {
        let has_ret = mfunc.blocks[b]
            .insts
            .last()
            .map(|&mi| matches!(mfunc.insts[mi], Inst::Ret))
            .unwrap_or(false);
        if !has_ret {
            continue;
        }
        let old = std::mem::take(&mut mfunc.blocks[b].insts);
        let mut rebuilt = Vec::with_capacity(old.len() - 1 + epilogue_tail.len() + 1);
        rebuilt.extend_from_slice(&old[..old.len() - 1]);
        mfunc.blocks[b].insts = rebuilt;
        for inst in epilogue_tail.clone() {
            mfunc.push(b, inst);
        }
        mfunc.push(b, Inst::Ret);
    }
}

fn save_or_solo(pair: &[PReg], offset: i32, is_fpr: bool) -> Inst {
    let width = crate::mir::Width::W64;
    if pair.len() == 2 {
        Inst::StpRegFpImm { width, is_fpr, rd1: Reg::Physical(pair[0]), rd2: Reg::Physical(pair[1]), imm: offset }
    } else {
        Inst::StrRegFpImm { width, is_fpr, rd: Reg::Physical(pair[0]), imm: offset }
    }
}

fn restore_or_solo(pair: &[PReg], offset: i32, is_fpr: bool) -> Inst {
    let width = crate::mir::Width::W64;
    if pair.len() == 2 {
        Inst::LdpRegFpImm { width, is_fpr, rd1: Reg::Physical(pair[0]), rd2: Reg::Physical(pair[1]), imm: offset }
    } else {
        Inst::LdrRegFpImm { width, is_fpr, rd: Reg::Physical(pair[0]), imm: offset }
    }
}

/// AArch64's `add`/`sub` (immediate) encodes a 12-bit unsigned immediate,
/// optionally shifted left by 12 — so the largest plain immediate is 4095,
/// and the largest 16-byte-aligned one is 4080. Frames larger than that
/// split the adjustment across as many chunks as needed (spec §4.4, §4.6).
pub const MAX_SP_IMM: u32 = 4080;

fn chunked_sp_adjust(total: u32, is_sub: bool) -> Vec<Inst> {
    let mut out = Vec::new();
    let mut remaining = total;
    while remaining > 0 {
        let chunk = remaining.min(MAX_SP_IMM);
        out.push(if is_sub {
            Inst::SubSpImm { imm: chunk as i32 }
        } else {
            Inst::AddSpImm { imm: chunk as i32 }
        });
        remaining -= chunk;
    }
    out
}
