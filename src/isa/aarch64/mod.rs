//! AArch64 target description: physical registers, classes, and the ABI
//! register sets the rest of the pipeline is keyed off of (spec §2.2).

pub mod regs;

pub use regs::*;
