//! The machine IR (MIR): one-to-one with AArch64 machine instructions
//! after register allocation (spec §3).
//!
//! Shaped after the teacher's `isa/aarch64/inst/mod.rs` — a flat `Inst`
//! enum of explicit variants (`AluRRR`-style) rather than a generic
//! multi-operand instruction record — but without ISLE: every variant here
//! is built directly by `crate::lower`'s opcode-dispatch handlers, matching
//! spec §4.1 and §9's "table of small handler functions" note.

pub mod display;
pub mod inst;

pub use inst::*;

use cranelift_entity::{entity_impl, PrimaryMap, SecondaryMap};
use smallvec::SmallVec;

/// A basic block in a MIR function.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MBlock(u32);
entity_impl!(MBlock, "mblock");

/// An instruction in a MIR function.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MInst(u32);
entity_impl!(MInst, "minst");

/// A virtual register: a pre-RA placeholder for a physical register.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VReg(u32);
entity_impl!(VReg, "v");

/// A stack slot, owned by the MIR function that created it (spec §3).
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Slot(u32);
entity_impl!(Slot, "slot");

use crate::isa::aarch64::regs::RegClass;

#[derive(Copy, Clone, Debug)]
pub struct VRegData {
    pub class: RegClass,
    /// Value width in bits: 8, 16, 32, or 64 (spec §3).
    pub size: u8,
}

#[derive(Copy, Clone, Debug)]
pub struct StackSlotData {
    pub size: u32,
    pub align: u32,
    /// Set by `crate::frame` once the final frame layout is known;
    /// `None` beforehand. A positive displacement from the frame pointer
    /// into the stack area below the saved FP/LR pair (spec §4.4).
    pub fp_offset: Option<i32>,
}

#[derive(Default, Clone, Debug)]
pub struct MBlockData {
    pub insts: Vec<MInst>,
    pub preds: Vec<MBlock>,
}

/// A MIR function. Owns its blocks, instructions, vreg table, and stack
/// slots exclusively — no MIR is ever shared between functions (spec §9).
pub struct MFunction {
    pub name: String,
    pub blocks: PrimaryMap<MBlock, MBlockData>,
    pub insts: PrimaryMap<MInst, Inst>,
    pub vregs: PrimaryMap<VReg, VRegData>,
    pub slots: PrimaryMap<Slot, StackSlotData>,
    pub entry: MBlock,
    /// Filled in by `crate::regalloc`: the callee-saved physical registers
    /// actually used and therefore requiring a prologue save / epilogue
    /// restore.
    pub save_set: Vec<crate::isa::aarch64::regs::PReg>,
    /// Filled in by `crate::frame`: total frame size, 16-byte aligned.
    pub frame_size: u32,
    /// Per-vreg physical-register assignment, filled in by `crate::regalloc`.
    pub assignment: SecondaryMap<VReg, Option<crate::isa::aarch64::regs::PReg>>,
}

impl MFunction {
    pub fn new(name: impl Into<String>) -> Self {
        let mut blocks = PrimaryMap::new();
        let entry = blocks.push(MBlockData::default());
        MFunction {
            name: name.into(),
            blocks,
            insts: PrimaryMap::new(),
            vregs: PrimaryMap::new(),
            slots: PrimaryMap::new(),
            entry,
            save_set: Vec::new(),
            frame_size: 0,
            assignment: SecondaryMap::new(),
        }
    }

    pub fn create_block(&mut self) -> MBlock {
        self.blocks.push(MBlockData::default())
    }

    pub fn create_vreg(&mut self, class: RegClass, size: u8) -> VReg {
        self.vregs.push(VRegData { class, size })
    }

    pub fn create_slot(&mut self, size: u32, align: u32) -> Slot {
        self.slots.push(StackSlotData {
            size,
            align,
            fp_offset: None,
        })
    }

    pub fn push(&mut self, block: MBlock, inst: Inst) -> MInst {
        let mi = self.insts.push(inst);
        self.blocks[block].insts.push(mi);
        mi
    }

    /// Blocks in layout order. MIR blocks always mirror IL block order 1:1
    /// (spec §4.1's lowering contract), so layout order is simply creation
    /// order.
    pub fn block_order(&self) -> Vec<MBlock> {
        self.blocks.keys().collect()
    }

    pub fn reg_class_of(&self, r: Reg) -> RegClass {
        match r {
            Reg::Virtual(v) => self.vregs[v].class,
            Reg::Physical(p) => p.class,
        }
    }

    /// Successor blocks, derived from every branch target among this
    /// block's instructions. MIR blocks never fall through implicitly
    /// (lowering always terminates a block with an unconditional `Br` or
    /// `Ret` after any conditional branches), so this is exactly the set of
    /// `branch_target()`s in the block.
    pub fn successors(&self, block: MBlock) -> SmallVec<[MBlock; 2]> {
        let mut out = SmallVec::new();
        for &mi in &self.blocks[block].insts {
            if let Some(t) = self.insts[mi].branch_target() {
                out.push(t);
            }
        }
        out
    }

    /// Recomputes every block's predecessor list from current terminators.
    pub fn compute_preds(&mut self) {
        for b in self.blocks.keys() {
            self.blocks[b].preds.clear();
        }
        for b in self.block_order() {
            for succ in self.successors(b) {
                self.blocks[succ].preds.push(b);
            }
        }
    }

    /// Reverse postorder over the block list, using branch targets as
    /// edges. Used by `crate::regalloc::liveness` to assign global
    /// instruction positions (spec §4.2).
    pub fn rpo(&self) -> Vec<MBlock> {
        let mut visited: std::collections::HashSet<MBlock> = std::collections::HashSet::new();
        let mut postorder = Vec::new();
        self.dfs_postorder(self.entry, &mut visited, &mut postorder);
        for b in self.block_order() {
            if !visited.contains(&b) {
                self.dfs_postorder(b, &mut visited, &mut postorder);
            }
        }
        postorder.reverse();
        postorder
    }

    fn dfs_postorder(
        &self,
        b: MBlock,
        visited: &mut std::collections::HashSet<MBlock>,
        out: &mut Vec<MBlock>,
    ) {
        if !visited.insert(b) {
            return;
        }
        for s in self.successors(b) {
            self.dfs_postorder(s, visited, out);
        }
        out.push(b);
    }
}
