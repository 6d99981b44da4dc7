//! Textual MIR dumps, used by the `--dump-mir-*` CLI flags (spec §6).
//!
//! Deliberately not the final assembly syntax (that's `crate::emit`): this
//! is a debugging aid, one operation per line, vregs shown as `%N` before
//! allocation and as register names after.

use super::{Inst, MFunction, Reg};
use std::fmt;

impl fmt::Display for Reg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reg::Virtual(v) => write!(f, "%{}", v.index()),
            Reg::Physical(p) => write!(f, "{}", p.name64()),
        }
    }
}

fn fmt_regs(rs: &[Reg]) -> String {
    rs.iter()
        .map(|r| r.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

impl fmt::Display for Inst {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use Inst::*;
        match self {
            AddRRR { rd, rn, rm, .. } => write!(f, "add {rd}, {rn}, {rm}"),
            AddRI { rd, rn, imm, .. } => write!(f, "add {rd}, {rn}, #{imm}"),
            SubRRR { rd, rn, rm, .. } => write!(f, "sub {rd}, {rn}, {rm}"),
            SubRI { rd, rn, imm, .. } => write!(f, "sub {rd}, {rn}, #{imm}"),
            AddsRRR { rd, rn, rm, .. } => write!(f, "adds {rd}, {rn}, {rm}"),
            SubsRRR { rd, rn, rm, .. } => write!(f, "subs {rd}, {rn}, {rm}"),
            MulRRR { rd, rn, rm, .. } => write!(f, "mul {rd}, {rn}, {rm}"),
            SDivRRR { rd, rn, rm, .. } => write!(f, "sdiv {rd}, {rn}, {rm}"),
            UDivRRR { rd, rn, rm, .. } => write!(f, "udiv {rd}, {rn}, {rm}"),
            SMulH { rd, rn, rm } => write!(f, "smulh {rd}, {rn}, {rm}"),
            MAddRRRR { rd, rn, rm, ra, .. } => write!(f, "madd {rd}, {rn}, {rm}, {ra}"),
            MSubRRRR { rd, rn, rm, ra, .. } => write!(f, "msub {rd}, {rn}, {rm}, {ra}"),
            AndRRR { rd, rn, rm, .. } => write!(f, "and {rd}, {rn}, {rm}"),
            OrRRR { rd, rn, rm, .. } => write!(f, "orr {rd}, {rn}, {rm}"),
            EorRRR { rd, rn, rm, .. } => write!(f, "eor {rd}, {rn}, {rm}"),
            AndRI { rd, rn, imm, .. } => write!(f, "and {rd}, {rn}, #{imm}"),
            OrRI { rd, rn, imm, .. } => write!(f, "orr {rd}, {rn}, #{imm}"),
            EorRI { rd, rn, imm, .. } => write!(f, "eor {rd}, {rn}, #{imm}"),
            AsrRI { rd, rn, amt, .. } => write!(f, "asr {rd}, {rn}, #{amt}"),
            LslRI { rd, rn, amt, .. } => write!(f, "lsl {rd}, {rn}, #{amt}"),
            LsrRI { rd, rn, amt, .. } => write!(f, "lsr {rd}, {rn}, #{amt}"),
            AsrRR { rd, rn, rm, .. } => write!(f, "asr {rd}, {rn}, {rm}"),
            LslRR { rd, rn, rm, .. } => write!(f, "lsl {rd}, {rn}, {rm}"),
            LsrRR { rd, rn, rm, .. } => write!(f, "lsr {rd}, {rn}, {rm}"),
            CmpRR { rn, rm, .. } => write!(f, "cmp {rn}, {rm}"),
            CmpRI { rn, imm, .. } => write!(f, "cmp {rn}, #{imm}"),
            Csel { rd, cond, rn, rm, .. } => {
                write!(f, "csel {rd}, {rn}, {rm}, {}", cond.mnemonic())
            }
            Cset { rd, cond } => write!(f, "cset {rd}, {}", cond.mnemonic()),
            MovRR { rd, rm, .. } => write!(f, "mov {rd}, {rm}"),
            MovRI { rd, imm, .. } => write!(f, "mov {rd}, #{imm}"),
            ExtendCheck {
                rd,
                rn,
                signed,
                from_bits,
            } => write!(
                f,
                "{}xt.chk{} {rd}, {rn}",
                if *signed { "s" } else { "u" },
                from_bits
            ),
            Extend {
                rd,
                rn,
                signed,
                from_bits,
                ..
            } => write!(f, "{}xt{} {rd}, {rn}", if *signed { "s" } else { "u" }, from_bits),
            FAddRRR { rd, rn, rm, .. } => write!(f, "fadd {rd}, {rn}, {rm}"),
            FSubRRR { rd, rn, rm, .. } => write!(f, "fsub {rd}, {rn}, {rm}"),
            FMulRRR { rd, rn, rm, .. } => write!(f, "fmul {rd}, {rn}, {rm}"),
            FDivRRR { rd, rn, rm, .. } => write!(f, "fdiv {rd}, {rn}, {rm}"),
            FCmpRR { rn, rm, .. } => write!(f, "fcmp {rn}, {rm}"),
            FMovRR { rd, rn, .. } => write!(f, "fmov {rd}, {rn}"),
            FMovRI { rd, bits, .. } => write!(f, "fmov {rd}, #0x{bits:x}"),
            FCvtZS { rd, rn, .. } => write!(f, "fcvtzs {rd}, {rn}"),
            FCvtZU { rd, rn, .. } => write!(f, "fcvtzu {rd}, {rn}"),
            SCvtF { rd, rn, .. } => write!(f, "scvtf {rd}, {rn}"),
            UCvtF { rd, rn, .. } => write!(f, "ucvtf {rd}, {rn}"),
            FRintZ { rd, rn, .. } => write!(f, "frintz {rd}, {rn}"),
            LdrRegFpImm { rd, imm, .. } => write!(f, "ldr {rd}, [fp, #{imm}]"),
            StrRegFpImm { rd, imm, .. } => write!(f, "str {rd}, [fp, #{imm}]"),
            LdpRegFpImm { rd1, rd2, imm, .. } => write!(f, "ldp {rd1}, {rd2}, [fp, #{imm}]"),
            StpRegFpImm { rd1, rd2, imm, .. } => write!(f, "stp {rd1}, {rd2}, [fp, #{imm}]"),
            LdrRegBaseImm { rd, mem, .. } => write!(f, "ldr {rd}, {}", fmt_mem(mem)),
            StrRegBaseImm { rd, mem, .. } => write!(f, "str {rd}, {}", fmt_mem(mem)),
            AddSpImm { imm } => write!(f, "add sp, sp, #{imm}"),
            SubSpImm { imm } => write!(f, "sub sp, sp, #{imm}"),
            FrameAddr { rd, slot } => write!(f, "frameaddr {rd}, {slot}"),
            BCond { cond, target } => write!(f, "b.{} {}", cond.mnemonic(), target),
            Bl { target } => write!(f, "bl {target}"),
            Blr { target } => write!(f, "blr {target}"),
            Br { target } => write!(f, "b {target}"),
            Cbz { rn, target } => write!(f, "cbz {rn}, {target}"),
            Cbnz { rn, target } => write!(f, "cbnz {rn}, {target}"),
            Ret => write!(f, "ret"),
            AdrPage { rd, symbol } => write!(f, "adrp {rd}, {symbol}"),
            AddPageOff { rd, rn, symbol } => write!(f, "add {rd}, {rn}, #:lo12:{symbol}"),
            ParallelCopy { dsts, srcs } => {
                write!(f, "parallel_copy ({}) <- ({})", fmt_regs(dsts), fmt_regs(srcs))
            }
            Nop => write!(f, "nop"),
        }
    }
}

fn fmt_mem(mem: &super::MemArg) -> String {
    match mem {
        super::MemArg::FpRel(off) => format!("[fp, #{off}]"),
        super::MemArg::SpRel(off) => format!("[sp, #{off}]"),
        super::MemArg::BaseImm { base, imm } => format!("[{base}, #{imm}]"),
    }
}

impl fmt::Display for MFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "function {}:", self.name)?;
        for block in self.block_order() {
            writeln!(f, "{}:", block)?;
            for &inst_ref in &self.blocks[block].insts {
                writeln!(f, "    {}", self.insts[inst_ref])?;
            }
        }
        Ok(())
    }
}
