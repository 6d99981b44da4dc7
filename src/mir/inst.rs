//! MIR instruction and operand types.

use crate::isa::aarch64::regs::PReg;
use crate::mir::{MBlock, VReg};
use smallvec::SmallVec;

/// A register operand: a vreg before allocation, a physical register after
/// (spec §3, §8 — "for every MIR instruction post-RA: all operands are
/// physical registers or immediates; no vreg remains").
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum Reg {
    Virtual(VReg),
    Physical(PReg),
}

impl Reg {
    pub fn as_vreg(self) -> Option<VReg> {
        match self {
            Reg::Virtual(v) => Some(v),
            Reg::Physical(_) => None,
        }
    }

    pub fn as_preg(self) -> Option<PReg> {
        match self {
            Reg::Physical(p) => Some(p),
            Reg::Virtual(_) => None,
        }
    }
}

/// A memory addressing mode: FP-relative, base register + immediate
/// offset, or SP-relative (spec §3).
#[derive(Copy, Clone, Debug)]
pub enum MemArg {
    FpRel(i32),
    BaseImm { base: Reg, imm: i32 },
    SpRel(i32),
}

impl MemArg {
    fn base_reg(&self) -> Option<Reg> {
        match self {
            MemArg::BaseImm { base, .. } => Some(*base),
            _ => None,
        }
    }

    fn base_reg_mut(&mut self) -> Option<&mut Reg> {
        match self {
            MemArg::BaseImm { base, .. } => Some(base),
            _ => None,
        }
    }
}

/// AArch64 condition codes used by `b.cond`, `csel`, and `cset`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Cond {
    Eq,
    Ne,
    Hs,
    Lo,
    Mi,
    Pl,
    Vs,
    Vc,
    Hi,
    Ls,
    Ge,
    Lt,
    Gt,
    Le,
    Al,
}

impl Cond {
    /// The condition such that `b.cond` and `b.cond.invert()` partition all
    /// outcomes — used by the peephole's branch-inversion pattern and by
    /// checked-arithmetic lowering for the "not taken" fallthrough path.
    pub fn invert(self) -> Cond {
        match self {
            Cond::Eq => Cond::Ne,
            Cond::Ne => Cond::Eq,
            Cond::Hs => Cond::Lo,
            Cond::Lo => Cond::Hs,
            Cond::Mi => Cond::Pl,
            Cond::Pl => Cond::Mi,
            Cond::Vs => Cond::Vc,
            Cond::Vc => Cond::Vs,
            Cond::Hi => Cond::Ls,
            Cond::Ls => Cond::Hi,
            Cond::Ge => Cond::Lt,
            Cond::Lt => Cond::Ge,
            Cond::Gt => Cond::Le,
            Cond::Le => Cond::Gt,
            Cond::Al => Cond::Al,
        }
    }

    pub fn mnemonic(self) -> &'static str {
        match self {
            Cond::Eq => "eq",
            Cond::Ne => "ne",
            Cond::Hs => "hs",
            Cond::Lo => "lo",
            Cond::Mi => "mi",
            Cond::Pl => "pl",
            Cond::Vs => "vs",
            Cond::Vc => "vc",
            Cond::Hi => "hi",
            Cond::Ls => "ls",
            Cond::Ge => "ge",
            Cond::Lt => "lt",
            Cond::Gt => "gt",
            Cond::Le => "le",
            Cond::Al => "al",
        }
    }
}

/// Operand width in bits: 32 or 64 for GPR ops, 32 or 64 for FPR ops
/// (single/double precision).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Width {
    W32,
    W64,
}

impl Width {
    pub fn from_bits(bits: u8) -> Width {
        if bits <= 32 {
            Width::W32
        } else {
            Width::W64
        }
    }
}

/// A shift/rotate amount that is either an immediate or held in a register
/// ("register-variable" shifts, spec §3).
#[derive(Copy, Clone, Debug)]
pub enum ShiftAmt {
    Imm(u8),
    Reg(Reg),
}

/// One MIR instruction. Variants correspond 1:1 with an AArch64 machine
/// instruction after allocation and peephole (spec §3's opcode list).
#[derive(Clone, Debug)]
pub enum Inst {
    // --- Integer ALU ---
    AddRRR { width: Width, rd: Reg, rn: Reg, rm: Reg },
    AddRI { width: Width, rd: Reg, rn: Reg, imm: i64 },
    SubRRR { width: Width, rd: Reg, rn: Reg, rm: Reg },
    SubRI { width: Width, rd: Reg, rn: Reg, imm: i64 },
    /// ALU op setting flags (`adds`/`subs`), used by checked-arithmetic
    /// lowering ahead of a `BCond` to the overflow trampoline.
    AddsRRR { width: Width, rd: Reg, rn: Reg, rm: Reg },
    SubsRRR { width: Width, rd: Reg, rn: Reg, rm: Reg },
    MulRRR { width: Width, rd: Reg, rn: Reg, rm: Reg },
    SDivRRR { width: Width, rd: Reg, rn: Reg, rm: Reg },
    UDivRRR { width: Width, rd: Reg, rn: Reg, rm: Reg },
    /// Signed multiply, high 64 bits of a 128-bit product — used by the
    /// `mul.ovf` overflow check.
    SMulH { rd: Reg, rn: Reg, rm: Reg },
    MAddRRRR { width: Width, rd: Reg, rn: Reg, rm: Reg, ra: Reg },
    MSubRRRR { width: Width, rd: Reg, rn: Reg, rm: Reg, ra: Reg },
    AndRRR { width: Width, rd: Reg, rn: Reg, rm: Reg },
    OrRRR { width: Width, rd: Reg, rn: Reg, rm: Reg },
    EorRRR { width: Width, rd: Reg, rn: Reg, rm: Reg },
    /// Logical ops with a bitmask-encodable immediate (spec §4.1): folded
    /// in directly by lowering instead of materializing the immediate
    /// through a scratch `MovRI` first.
    AndRI { width: Width, rd: Reg, rn: Reg, imm: i64 },
    OrRI { width: Width, rd: Reg, rn: Reg, imm: i64 },
    EorRI { width: Width, rd: Reg, rn: Reg, imm: i64 },
    AsrRI { width: Width, rd: Reg, rn: Reg, amt: u8 },
    LslRI { width: Width, rd: Reg, rn: Reg, amt: u8 },
    LsrRI { width: Width, rd: Reg, rn: Reg, amt: u8 },
    AsrRR { width: Width, rd: Reg, rn: Reg, rm: Reg },
    LslRR { width: Width, rd: Reg, rn: Reg, rm: Reg },
    LsrRR { width: Width, rd: Reg, rn: Reg, rm: Reg },
    CmpRR { width: Width, rn: Reg, rm: Reg },
    CmpRI { width: Width, rn: Reg, imm: i64 },
    Csel { width: Width, rd: Reg, cond: Cond, rn: Reg, rm: Reg },
    Cset { rd: Reg, cond: Cond },
    MovRR { width: Width, rd: Reg, rm: Reg },
    /// A materializable-immediate move (`movz`/`movk` sequence collapsed
    /// into one logical instruction); the sole rematerialization candidate
    /// (spec §4.3, §9).
    MovRI { width: Width, rd: Reg, imm: i64 },
    /// Sign- or zero-extend narrowing-cast check: `sxt{b,h,w}`/`uxt{b,h,w}`
    /// into a scratch for comparison against the source (checked narrowing
    /// casts, spec §4.1).
    ExtendCheck { rd: Reg, rn: Reg, signed: bool, from_bits: u8 },
    /// Plain (unchecked) sign/zero extend, used by `zext`/`sext`.
    Extend { rd: Reg, rn: Reg, signed: bool, from_bits: u8, to_bits: u8 },

    // --- FP ALU ---
    FAddRRR { width: Width, rd: Reg, rn: Reg, rm: Reg },
    FSubRRR { width: Width, rd: Reg, rn: Reg, rm: Reg },
    FMulRRR { width: Width, rd: Reg, rn: Reg, rm: Reg },
    FDivRRR { width: Width, rd: Reg, rn: Reg, rm: Reg },
    FCmpRR { width: Width, rn: Reg, rm: Reg },
    FMovRR { width: Width, rd: Reg, rn: Reg },
    /// Load a double/single-precision bit pattern directly into an FPR —
    /// used for small FP immediates that do not need a rodata entry.
    FMovRI { width: Width, rd: Reg, bits: u64 },
    FCvtZS { dst_width: Width, src_width: Width, rd: Reg, rn: Reg },
    FCvtZU { dst_width: Width, src_width: Width, rd: Reg, rn: Reg },
    SCvtF { dst_width: Width, src_width: Width, rd: Reg, rn: Reg },
    UCvtF { dst_width: Width, src_width: Width, rd: Reg, rn: Reg },
    /// Round to integral value toward zero — isolates the truncation
    /// `fptosi.chk` performs from the in-range/NaN check surrounding it, so
    /// the check doesn't confuse an ordinary fractional truncation with an
    /// overflowing one.
    FRintZ { width: Width, rd: Reg, rn: Reg },

    // --- Memory ---
    LdrRegFpImm { width: Width, is_fpr: bool, rd: Reg, imm: i32 },
    StrRegFpImm { width: Width, is_fpr: bool, rd: Reg, imm: i32 },
    LdpRegFpImm { width: Width, is_fpr: bool, rd1: Reg, rd2: Reg, imm: i32 },
    StpRegFpImm { width: Width, is_fpr: bool, rd1: Reg, rd2: Reg, imm: i32 },
    LdrRegBaseImm { width: Width, is_fpr: bool, rd: Reg, mem: MemArg },
    StrRegBaseImm { width: Width, is_fpr: bool, rd: Reg, mem: MemArg },

    // --- Stack ---
    AddSpImm { imm: i32 },
    SubSpImm { imm: i32 },
    /// The address of a stack slot relative to the frame pointer. A
    /// placeholder emitted by lowering for every `alloca`; `crate::frame`
    /// rewrites each occurrence into `AddRI { rd, rn: fp, imm: offset }`
    /// once the final slot layout is known (spec §4.4).
    FrameAddr { rd: Reg, slot: crate::mir::Slot },

    // --- Control ---
    BCond { cond: Cond, target: MBlock },
    Bl { target: String },
    Blr { target: Reg },
    Br { target: MBlock },
    Cbz { rn: Reg, target: MBlock },
    Cbnz { rn: Reg, target: MBlock },
    Ret,

    // --- Address materialization ---
    AdrPage { rd: Reg, symbol: String },
    AddPageOff { rd: Reg, rn: Reg, symbol: String },

    /// A pending parallel-copy move, inserted by lowering for block
    /// parameters and resolved into `MovRR`/`FMovRR` sequences by
    /// `crate::lower::parallel_copy` before this function leaves the
    /// lowerer (spec §4.1, §9).
    ParallelCopy { dsts: SmallVec<[Reg; 4]>, srcs: SmallVec<[Reg; 4]> },

    /// A debug/trace no-op the peephole's dead-code pass is expected to
    /// remove if its destination is never read; kept distinct from `MovRR`
    /// so lowering can emit a cheap placeholder without computing a real
    /// source yet.
    Nop,
}

impl Inst {
    /// Registers read by this instruction (excludes the destination of a
    /// pure write, includes a read-modify-write destination such as
    /// `StrRegBaseImm`'s base).
    pub fn uses(&self) -> SmallVec<[Reg; 4]> {
        use Inst::*;
        let mut u = SmallVec::new();
        match self {
            AddRRR { rn, rm, .. }
            | SubRRR { rn, rm, .. }
            | AddsRRR { rn, rm, .. }
            | SubsRRR { rn, rm, .. }
            | MulRRR { rn, rm, .. }
            | SDivRRR { rn, rm, .. }
            | UDivRRR { rn, rm, .. }
            | SMulH { rn, rm, .. }
            | AndRRR { rn, rm, .. }
            | OrRRR { rn, rm, .. }
            | EorRRR { rn, rm, .. }
            | AsrRR { rn, rm, .. }
            | LslRR { rn, rm, .. }
            | LsrRR { rn, rm, .. }
            | CmpRR { rn, rm, .. }
            | FAddRRR { rn, rm, .. }
            | FSubRRR { rn, rm, .. }
            | FMulRRR { rn, rm, .. }
            | FDivRRR { rn, rm, .. }
            | FCmpRR { rn, rm, .. } => {
                u.push(*rn);
                u.push(*rm);
            }
            MAddRRRR { rn, rm, ra, .. } | MSubRRRR { rn, rm, ra, .. } => {
                u.push(*rn);
                u.push(*rm);
                u.push(*ra);
            }
            AddRI { rn, .. } | SubRI { rn, .. } | CmpRI { rn, .. }
            | AndRI { rn, .. } | OrRI { rn, .. } | EorRI { rn, .. } => u.push(*rn),
            AsrRI { rn, .. } | LslRI { rn, .. } | LsrRI { rn, .. } => u.push(*rn),
            Csel { rn, rm, .. } => {
                u.push(*rn);
                u.push(*rm);
            }
            MovRR { rm, .. } | FMovRR { rn: rm, .. } => u.push(*rm),
            ExtendCheck { rn, .. } | Extend { rn, .. } => u.push(*rn),
            FCvtZS { rn, .. } | FCvtZU { rn, .. } | SCvtF { rn, .. } | UCvtF { rn, .. }
            | FRintZ { rn, .. } => u.push(*rn),
            StrRegFpImm { rd, .. } => u.push(*rd),
            StpRegFpImm { rd1, rd2, .. } => {
                u.push(*rd1);
                u.push(*rd2);
            }
            StrRegBaseImm { rd, mem, .. } => {
                u.push(*rd);
                if let Some(b) = mem.base_reg() {
                    u.push(b);
                }
            }
            LdrRegBaseImm { mem, .. } => {
                if let Some(b) = mem.base_reg() {
                    u.push(b);
                }
            }
            Blr { target } => u.push(*target),
            Cbz { rn, .. } | Cbnz { rn, .. } => u.push(*rn),
            AddPageOff { rn, .. } => u.push(*rn),
            ParallelCopy { srcs, .. } => u.extend(srcs.iter().copied()),
            Cset { .. } | MovRI { .. } | FMovRI { .. } | LdrRegFpImm { .. } | LdpRegFpImm { .. }
            | AddSpImm { .. } | SubSpImm { .. } | BCond { .. } | Bl { .. } | Br { .. }
            | Ret | AdrPage { .. } | FrameAddr { .. } | Nop => {}
        }
        u
    }

    /// Registers written by this instruction.
    pub fn defs(&self) -> SmallVec<[Reg; 2]> {
        use Inst::*;
        let mut d = SmallVec::new();
        match self {
            AddRRR { rd, .. }
            | SubRRR { rd, .. }
            | AddsRRR { rd, .. }
            | SubsRRR { rd, .. }
            | MulRRR { rd, .. }
            | SDivRRR { rd, .. }
            | UDivRRR { rd, .. }
            | SMulH { rd, .. }
            | MAddRRRR { rd, .. }
            | MSubRRRR { rd, .. }
            | AndRRR { rd, .. }
            | OrRRR { rd, .. }
            | EorRRR { rd, .. }
            | AsrRI { rd, .. }
            | LslRI { rd, .. }
            | LsrRI { rd, .. }
            | AsrRR { rd, .. }
            | LslRR { rd, .. }
            | LsrRR { rd, .. }
            | AddRI { rd, .. }
            | SubRI { rd, .. }
            | AndRI { rd, .. }
            | OrRI { rd, .. }
            | EorRI { rd, .. }
            | Csel { rd, .. }
            | Cset { rd, .. }
            | MovRR { rd, .. }
            | MovRI { rd, .. }
            | ExtendCheck { rd, .. }
            | Extend { rd, .. }
            | FAddRRR { rd, .. }
            | FSubRRR { rd, .. }
            | FMulRRR { rd, .. }
            | FDivRRR { rd, .. }
            | FMovRR { rd, .. }
            | FMovRI { rd, .. }
            | FCvtZS { rd, .. }
            | FCvtZU { rd, .. }
            | SCvtF { rd, .. }
            | UCvtF { rd, .. }
            | FRintZ { rd, .. }
            | AdrPage { rd, .. }
            | AddPageOff { rd, .. }
            | FrameAddr { rd, .. } => d.push(*rd),
            LdrRegFpImm { rd, .. } | LdrRegBaseImm { rd, .. } => d.push(*rd),
            LdpRegFpImm { rd1, rd2, .. } => {
                d.push(*rd1);
                d.push(*rd2);
            }
            ParallelCopy { dsts, .. } => d.extend(dsts.iter().copied()),
            CmpRR { .. } | CmpRI { .. } | FCmpRR { .. } | StrRegFpImm { .. }
            | StpRegFpImm { .. } | StrRegBaseImm { .. } | AddSpImm { .. } | SubSpImm { .. }
            | BCond { .. } | Bl { .. } | Blr { .. } | Br { .. } | Cbz { .. } | Cbnz { .. }
            | Ret | Nop => {}
        }
        d
    }

    /// Rewrites every register operand (use and def alike) through `f`.
    /// Called by `crate::regalloc` once with the final vreg→preg
    /// assignment, turning every `Reg::Virtual` into a `Reg::Physical`
    /// (spec §8's post-RA invariant).
    pub fn rewrite_regs(&mut self, f: &mut impl FnMut(Reg) -> Reg) {
        use Inst::*;
        macro_rules! rw {
            ($($r:expr),* $(,)?) => { $( *$r = f(*$r); )* };
        }
        match self {
            AddRRR { rd, rn, rm, .. }
            | SubRRR { rd, rn, rm, .. }
            | AddsRRR { rd, rn, rm, .. }
            | SubsRRR { rd, rn, rm, .. }
            | MulRRR { rd, rn, rm, .. }
            | SDivRRR { rd, rn, rm, .. }
            | UDivRRR { rd, rn, rm, .. }
            | SMulH { rd, rn, rm }
            | AndRRR { rd, rn, rm, .. }
            | OrRRR { rd, rn, rm, .. }
            | EorRRR { rd, rn, rm, .. }
            | AsrRR { rd, rn, rm, .. }
            | LslRR { rd, rn, rm, .. }
            | LsrRR { rd, rn, rm, .. }
            | FAddRRR { rd, rn, rm, .. }
            | FSubRRR { rd, rn, rm, .. }
            | FMulRRR { rd, rn, rm, .. }
            | FDivRRR { rd, rn, rm, .. } => rw!(rd, rn, rm),
            MAddRRRR { rd, rn, rm, ra, .. } | MSubRRRR { rd, rn, rm, ra, .. } => {
                rw!(rd, rn, rm, ra)
            }
            CmpRR { rn, rm, .. } | FCmpRR { rn, rm, .. } => rw!(rn, rm),
            Csel { rd, rn, rm, .. } => rw!(rd, rn, rm),
            AddRI { rd, rn, .. } | SubRI { rd, rn, .. }
            | AndRI { rd, rn, .. } | OrRI { rd, rn, .. } | EorRI { rd, rn, .. } => rw!(rd, rn),
            AsrRI { rd, rn, .. } | LslRI { rd, rn, .. } | LsrRI { rd, rn, .. } => rw!(rd, rn),
            CmpRI { rn, .. } => rw!(rn),
            Cset { rd, .. } => rw!(rd),
            MovRR { rd, rm, .. } | FMovRR { rd, rn: rm, .. } => rw!(rd, rm),
            MovRI { rd, .. } | FMovRI { rd, .. } => rw!(rd),
            ExtendCheck { rd, rn, .. } | Extend { rd, rn, .. } => rw!(rd, rn),
            FCvtZS { rd, rn, .. } | FCvtZU { rd, rn, .. } | SCvtF { rd, rn, .. }
            | UCvtF { rd, rn, .. } | FRintZ { rd, rn, .. } => rw!(rd, rn),
            LdrRegFpImm { rd, .. } => rw!(rd),
            StrRegFpImm { rd, .. } => rw!(rd),
            LdpRegFpImm { rd1, rd2, .. } => rw!(rd1, rd2),
            StpRegFpImm { rd1, rd2, .. } => rw!(rd1, rd2),
            LdrRegBaseImm { rd, mem, .. } => {
                rw!(rd);
                if let Some(b) = mem.base_reg_mut() {
                    *b = f(*b);
                }
            }
            StrRegBaseImm { rd, mem, .. } => {
                rw!(rd);
                if let Some(b) = mem.base_reg_mut() {
                    *b = f(*b);
                }
            }
            Blr { target } => rw!(target),
            Cbz { rn, .. } | Cbnz { rn, .. } => rw!(rn),
            AdrPage { rd, .. } => rw!(rd),
            AddPageOff { rd, rn, .. } => rw!(rd, rn),
            FrameAddr { rd, .. } => rw!(rd),
            ParallelCopy { dsts, srcs } => {
                for r in dsts.iter_mut() {
                    *r = f(*r);
                }
                for r in srcs.iter_mut() {
                    *r = f(*r);
                }
            }
            AddSpImm { .. } | SubSpImm { .. } | BCond { .. } | Bl { .. } | Br { .. } | Ret
            | Nop => {}
        }
    }

    /// `true` for instructions the peephole/DCE pass may remove outright
    /// when their destination is dead (spec §4.5's "dead cset/mov
    /// elimination").
    pub fn is_pure_def(&self) -> bool {
        matches!(
            self,
            Inst::Cset { .. } | Inst::MovRR { .. } | Inst::MovRI { .. }
        )
    }

    pub fn is_move(&self) -> Option<(Reg, Reg)> {
        match self {
            Inst::MovRR { rd, rm, .. } => Some((*rd, *rm)),
            Inst::FMovRR { rd, rn, .. } => Some((*rd, *rn)),
            _ => None,
        }
    }

    pub fn is_branch(&self) -> bool {
        matches!(
            self,
            Inst::BCond { .. } | Inst::Br { .. } | Inst::Cbz { .. } | Inst::Cbnz { .. }
        )
    }

    pub fn is_call(&self) -> bool {
        matches!(self, Inst::Bl { .. } | Inst::Blr { .. })
    }

    /// MIR block this instruction transfers control to, if it is an
    /// intra-function branch (excludes `Bl`, which targets a symbol).
    pub fn branch_target(&self) -> Option<MBlock> {
        match self {
            Inst::BCond { target, .. }
            | Inst::Br { target }
            | Inst::Cbz { target, .. }
            | Inst::Cbnz { target, .. } => Some(*target),
            _ => None,
        }
    }
}
