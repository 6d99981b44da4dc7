//! Physical registers, register classes, and ABI conventions.
//!
//! Grounded in the teacher's `isa/aarch64/inst/regs.rs`: a register is a
//! small `(class, encoding)` pair with free functions (`xreg`, `vreg`,
//! `writable_xreg`, ...) rather than an opaque newtype-per-register. We keep
//! that shape but drop the teacher's `regalloc`-crate-specific index space
//! (`XREG_INDICES`, pinned register, pre-RA `RealRegUniverse`) since this
//! backend's register allocator (`crate::regalloc`) is purpose-built and
//! does not need a third-party register-universe abstraction.

use std::fmt;

/// The pinned register on this architecture is not reserved: unlike the
/// teacher (which reserves X21 for an embedder heap pointer), this backend
/// makes all of X0-X28 available to the allocator except X18 (the platform
/// register, reserved by the AArch64 platform ABI on both Darwin and
/// Linux) and the two frame registers.
pub const PLATFORM_RESERVED: u8 = 18;
pub const FP_REG: u8 = 29;
pub const LR_REG: u8 = 30;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RegClass {
    Gpr,
    Fpr,
}

/// A physical AArch64 register: a 64-bit X-register (`Gpr`, encodings
/// 0..=30, 31 reserved for SP/XZR depending on context) or a 128-bit
/// V-register used here only through its lower 64 bits (`Fpr`,
/// encodings 0..=31).
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PReg {
    pub class: RegClass,
    pub enc: u8,
}

impl PReg {
    pub const fn gpr(enc: u8) -> PReg {
        PReg {
            class: RegClass::Gpr,
            enc,
        }
    }
    pub const fn fpr(enc: u8) -> PReg {
        PReg {
            class: RegClass::Fpr,
            enc,
        }
    }

    pub fn is_sp(self) -> bool {
        self.class == RegClass::Gpr && self.enc == 31
    }

    pub fn is_zero(self) -> bool {
        self.class == RegClass::Gpr && self.enc == 32
    }

    /// Name of this register at 64-bit (GPR) or double (FPR) width.
    pub fn name64(self) -> String {
        match self.class {
            RegClass::Gpr if self.enc == 31 => "sp".to_string(),
            RegClass::Gpr if self.enc == 32 => "xzr".to_string(),
            RegClass::Gpr => format!("x{}", self.enc),
            RegClass::Fpr => format!("d{}", self.enc),
        }
    }

    /// Name of this register at 32-bit (GPR) or single (FPR) width.
    pub fn name32(self) -> String {
        match self.class {
            RegClass::Gpr if self.enc == 31 => "wsp".to_string(),
            RegClass::Gpr if self.enc == 32 => "wzr".to_string(),
            RegClass::Gpr => format!("w{}", self.enc),
            RegClass::Fpr => format!("s{}", self.enc),
        }
    }

    pub fn name(self, bits: u8) -> String {
        if bits <= 32 {
            self.name32()
        } else {
            self.name64()
        }
    }
}

impl fmt::Debug for PReg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name64())
    }
}

pub const fn xreg(enc: u8) -> PReg {
    PReg::gpr(enc)
}
pub const fn dreg(enc: u8) -> PReg {
    PReg::fpr(enc)
}
pub fn sp_reg() -> PReg {
    PReg::gpr(31)
}
pub fn zero_reg() -> PReg {
    PReg::gpr(32)
}
pub fn fp_reg() -> PReg {
    xreg(FP_REG)
}
pub fn link_reg() -> PReg {
    xreg(LR_REG)
}

/// AAPCS64 integer argument registers, in order.
pub const ARG_GPRS: [PReg; 8] = [
    xreg(0),
    xreg(1),
    xreg(2),
    xreg(3),
    xreg(4),
    xreg(5),
    xreg(6),
    xreg(7),
];

/// AAPCS64 FP argument registers (lower 64 bits), in order.
pub const ARG_FPRS: [PReg; 8] = [
    dreg(0),
    dreg(1),
    dreg(2),
    dreg(3),
    dreg(4),
    dreg(5),
    dreg(6),
    dreg(7),
];

pub fn ret_gpr() -> PReg {
    xreg(0)
}
pub fn ret_fpr() -> PReg {
    dreg(0)
}

/// Callee-saved GPRs available to the allocator, excluding FP/LR (which the
/// frame builder always saves as a pair in the prologue and never hands to
/// the allocator as a general-purpose register).
pub const CALLEE_SAVED_GPRS: [PReg; 10] = [
    xreg(19),
    xreg(20),
    xreg(21),
    xreg(22),
    xreg(23),
    xreg(24),
    xreg(25),
    xreg(26),
    xreg(27),
    xreg(28),
];

/// Callee-saved FPRs (D8-D15; only the lower 64 bits are callee-saved per
/// AAPCS64).
pub const CALLEE_SAVED_FPRS: [PReg; 8] = [
    dreg(8),
    dreg(9),
    dreg(10),
    dreg(11),
    dreg(12),
    dreg(13),
    dreg(14),
    dreg(15),
];

/// Caller-saved (temporary) GPRs available to the allocator. X16/X17 (IP0/
/// IP1) are excluded: they are used as scratch by the linker/veneers and by
/// this backend's own address materialization.
pub const CALLER_SAVED_GPRS: [PReg; 13] = [
    xreg(0),
    xreg(1),
    xreg(2),
    xreg(3),
    xreg(4),
    xreg(5),
    xreg(6),
    xreg(7),
    xreg(8),
    xreg(9),
    xreg(10),
    xreg(11),
    xreg(12),
];

/// Caller-saved FPRs available to the allocator (D0-D7, D16-D26; D27-29 are
/// reload temporaries (see [`reload_fprs`]), D30 is [`scratch_fpr2`], and
/// D31 is [`scratch_fpr`]).
pub fn caller_saved_fprs() -> Vec<PReg> {
    let mut v: Vec<PReg> = (0..8).map(dreg).collect();
    v.extend((16..30).filter(|e| !(27..=29).contains(e)).map(dreg));
    v
}

/// A scratch GPR reserved per-function for parallel-copy cycle breaking and
/// large-immediate materialization. Never handed to the allocator.
pub fn scratch_gpr() -> PReg {
    xreg(16)
}

/// A scratch FPR reserved per-function for parallel-copy cycle breaking and
/// checked-conversion round-trip comparisons. Never handed to the
/// allocator.
pub fn scratch_fpr() -> PReg {
    dreg(31)
}

/// A second scratch GPR (X17/IP1), reserved alongside [`scratch_gpr`] for
/// sequences needing two temporaries in one instruction, such as
/// `mul.ovf`'s sign-extension comparison. Never handed to the allocator.
pub fn scratch_gpr2() -> PReg {
    xreg(17)
}

/// A second scratch FPR, reserved alongside [`scratch_fpr`] for sequences
/// needing two FP temporaries in one instruction, such as `fptosi.chk`'s
/// truncate-then-round-trip comparison. Never handed to the allocator.
pub fn scratch_fpr2() -> PReg {
    dreg(30)
}

/// GPR temporaries reserved for the register allocator's spill reload/store
/// rewrite (`crate::regalloc`), distinct from [`scratch_gpr`] so the two
/// passes never collide within one instruction. X13-X15 are otherwise
/// unused: excluded from both ABI register sets, not IP0/IP1, not FP/LR.
pub fn reload_gprs() -> [PReg; 3] {
    [xreg(13), xreg(14), xreg(15)]
}

/// FPR temporaries reserved for spill reload/store, carved out of the
/// caller-saved range (see [`caller_saved_fprs`]) so the allocator never
/// assigns a live vreg to one of these.
pub fn reload_fprs() -> [PReg; 3] {
    [dreg(27), dreg(28), dreg(29)]
}

/// Stack alignment required by AAPCS64, in bytes.
pub const STACK_ALIGN: u32 = 16;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_names() {
        assert_eq!(xreg(0).name64(), "x0");
        assert_eq!(xreg(0).name32(), "w0");
        assert_eq!(dreg(8).name64(), "d8");
        assert_eq!(sp_reg().name64(), "sp");
        assert_eq!(zero_reg().name64(), "xzr");
    }

    #[test]
    fn abi_sets_disjoint_from_reserved() {
        for r in CALLEE_SAVED_GPRS.iter().chain(CALLER_SAVED_GPRS.iter()) {
            assert_ne!(r.enc, PLATFORM_RESERVED);
            assert_ne!(r.enc, FP_REG);
            assert_ne!(r.enc, LR_REG);
        }
    }

    #[test]
    fn reload_temps_disjoint_from_allocatable_sets() {
        let reload: Vec<PReg> = reload_gprs().iter().copied().chain(reload_fprs()).collect();
        for r in &reload {
            assert!(!CALLEE_SAVED_GPRS.contains(r));
            assert!(!CALLER_SAVED_GPRS.contains(r));
            assert!(!CALLEE_SAVED_FPRS.contains(r));
            assert!(!caller_saved_fprs().contains(r));
            assert_ne!(*r, scratch_gpr());
            assert_ne!(*r, scratch_gpr2());
            assert_ne!(*r, scratch_fpr());
            assert_ne!(*r, scratch_fpr2());
        }
        assert!(!caller_saved_fprs().contains(&scratch_fpr2()));
        assert!(!CALLEE_SAVED_FPRS.contains(&scratch_fpr2()));
    }
}
