//! The input IL: a verified, SSA-style module with explicit block
//! parameters and checked arithmetic.
//!
//! This module owns only the *data model* the backend reads. Parsing,
//! verification, and IL-level optimization are other collaborators'
//! responsibility (spec §1) — by the time a [`Module`] reaches this crate
//! it is assumed to already satisfy SSA form, typed block parameters, and
//! well-formed terminators. Lowering (`crate::lower`) may still reject a
//! module that violates those invariants, surfacing `CodegenError::InvalidIl`,
//! but it does not attempt to repair or fully re-verify it.

pub mod text;
pub mod types;

pub use types::Type;

use cranelift_entity::{entity_impl, PrimaryMap, SecondaryMap};
use smallvec::SmallVec;
use std::fmt;

/// A basic block in an IL function.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Block(u32);
entity_impl!(Block, "block");

/// An SSA value: either a block parameter or the result of an instruction.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Value(u32);
entity_impl!(Value, "v");

/// An instruction in an IL function's body (not a terminator — see
/// [`Terminator`]).
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Inst(u32);
entity_impl!(Inst, "inst");

/// Source location carried by IL metadata, used only for diagnostics.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Location {
    pub file: &'static str,
    pub line: u32,
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

/// A 64-bit literal, reinterpreted according to the instruction's operand
/// type at lowering time.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Immediate {
    Int(i64),
    F64(f64),
    F32(f32),
}

/// An external symbol referenced by a call or a runtime helper.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ExternalName(pub String);

/// Opcode of a non-terminator instruction.
///
/// Grouped exactly per spec §3: checked and unchecked integer arithmetic,
/// integer compares, FP arithmetic and compares, conversions, and memory.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Opcode {
    // Unchecked integer arithmetic.
    Add,
    Sub,
    Mul,
    Shl,
    Shr,
    UShr,
    And,
    Or,
    Xor,

    // Checked integer arithmetic (trap on failure).
    AddOvf,
    SubOvf,
    MulOvf,
    SDivChk0,
    SRemChk0,

    // Integer compares (result is a 1-bit boolean value).
    IcmpEq,
    IcmpNe,
    ScmpLt,
    ScmpLe,
    ScmpGt,
    ScmpGe,
    UcmpLt,
    UcmpLe,
    UcmpGt,
    UcmpGe,

    // FP arithmetic and compares.
    FAdd,
    FSub,
    FMul,
    FDiv,
    FcmpEq,
    FcmpNe,
    FcmpLt,
    FcmpLe,
    FcmpGt,
    FcmpGe,

    // Conversions.
    Sitofp,
    FptosiChk,
    TruncChk,
    Zext,
    Sext,

    // Memory.
    Load,
    Store,
    Alloca,

    // Calls (direct and indirect), and runtime helper calls (a runtime
    // helper is simply a direct call to a well-known external name).
    Call,

    /// Materializes the address of a module-level constant (a string byte
    /// blob or a deduplicated float that did not fit a `fmov` immediate)
    /// as a pointer value. Carries no register operands; the referenced
    /// global is named by `InstData::global`.
    GlobalAddr,
}

/// A call target: direct (by symbol) or indirect (through a value).
#[derive(Clone, Debug)]
pub enum CallTarget {
    Direct(ExternalName),
    Indirect(Value),
}

/// The data carried by a single non-terminator instruction.
///
/// `Call` is a regular instruction here (spec §3 lists it alongside
/// arithmetic and memory ops, not under "control"): it does not end the
/// block, may appear any number of times in a block's body, and returns
/// control to the next instruction in the same block.
#[derive(Clone, Debug)]
pub struct InstData {
    pub opcode: Opcode,
    pub args: SmallVec<[Value; 2]>,
    pub imm: Option<Immediate>,
    /// Present for memory ops: the IL type of the value being loaded/stored,
    /// independent of the pointer's own type.
    pub mem_ty: Option<Type>,
    /// Present only for `Opcode::Call`.
    pub call: Option<CallTarget>,
    /// Present only for `Opcode::GlobalAddr`: the index into
    /// [`Module::globals`] being addressed.
    pub global: Option<u32>,
    pub result: Option<Value>,
    pub location: Option<Location>,
}

/// A terminator: the single instruction that ends every basic block.
/// Kept distinct from [`InstData`] because every block has exactly one,
/// and because the successor/argument structure it carries is what the
/// parallel-copy contract (spec §4.1) hangs off of.
#[derive(Clone, Debug)]
pub enum Terminator {
    Ret(Option<Value>),
    Br {
        target: Block,
        args: SmallVec<[Value; 4]>,
    },
    Cbr {
        cond: Value,
        then_block: Block,
        then_args: SmallVec<[Value; 4]>,
        else_block: Block,
        else_args: SmallVec<[Value; 4]>,
    },
    Switch {
        value: Value,
        cases: Vec<(i64, Block, SmallVec<[Value; 4]>)>,
        default: Block,
        default_args: SmallVec<[Value; 4]>,
    },
}

#[derive(Default, Clone, Debug)]
pub struct BlockData {
    pub params: SmallVec<[Value; 4]>,
    pub body: Vec<Inst>,
    pub term: Option<Terminator>,
}

/// One IL function.
#[derive(Clone)]
pub struct Function {
    pub name: String,
    pub param_types: Vec<Type>,
    pub ret_type: Option<Type>,
    pub entry: Block,
    pub blocks: PrimaryMap<Block, BlockData>,
    pub insts: PrimaryMap<Inst, InstData>,
    pub value_types: SecondaryMap<Value, Type>,
    next_value: u32,
}

impl Function {
    pub fn new(name: impl Into<String>) -> Self {
        let mut blocks = PrimaryMap::new();
        let entry = blocks.push(BlockData::default());
        Function {
            name: name.into(),
            param_types: Vec::new(),
            ret_type: None,
            entry,
            blocks,
            insts: PrimaryMap::new(),
            value_types: SecondaryMap::new(),
            next_value: 0,
        }
    }

    fn alloc_value(&mut self, ty: Type) -> Value {
        let v = Value::from_u32(self.next_value);
        self.next_value += 1;
        self.value_types[v] = ty;
        v
    }

    pub fn create_block(&mut self) -> Block {
        self.blocks.push(BlockData::default())
    }

    pub fn append_block_param(&mut self, block: Block, ty: Type) -> Value {
        let v = self.alloc_value(ty);
        self.blocks[block].params.push(v);
        v
    }

    /// Appends an instruction with a result to `block`'s body and returns
    /// the result value.
    pub fn push_inst(
        &mut self,
        block: Block,
        opcode: Opcode,
        args: &[Value],
        result_ty: Type,
    ) -> Value {
        let result = self.alloc_value(result_ty);
        let inst = self.insts.push(InstData {
            opcode,
            args: SmallVec::from_slice(args),
            imm: None,
            mem_ty: None,
            call: None,
            global: None,
            result: Some(result),
            location: None,
        });
        self.blocks[block].body.push(inst);
        result
    }

    pub fn push_inst_imm(
        &mut self,
        block: Block,
        opcode: Opcode,
        args: &[Value],
        imm: Immediate,
        result_ty: Type,
    ) -> Value {
        let result = self.alloc_value(result_ty);
        let inst = self.insts.push(InstData {
            opcode,
            args: SmallVec::from_slice(args),
            imm: Some(imm),
            mem_ty: None,
            call: None,
            global: None,
            result: Some(result),
            location: None,
        });
        self.blocks[block].body.push(inst);
        result
    }

    /// `alloca` has no operands and yields a pointer-typed value backed by
    /// `size` bytes of stack storage.
    pub fn push_alloca(&mut self, block: Block, size: u32, ptr_ty: Type) -> Value {
        let result = self.alloc_value(ptr_ty);
        let inst = self.insts.push(InstData {
            opcode: Opcode::Alloca,
            args: SmallVec::new(),
            imm: Some(Immediate::Int(size as i64)),
            mem_ty: None,
            call: None,
            global: None,
            result: Some(result),
            location: None,
        });
        self.blocks[block].body.push(inst);
        result
    }

    pub fn push_load(&mut self, block: Block, ptr: Value, mem_ty: Type) -> Value {
        let result = self.alloc_value(mem_ty);
        let inst = self.insts.push(InstData {
            opcode: Opcode::Load,
            args: SmallVec::from_slice(&[ptr]),
            imm: None,
            mem_ty: Some(mem_ty),
            call: None,
            global: None,
            result: Some(result),
            location: None,
        });
        self.blocks[block].body.push(inst);
        result
    }

    pub fn push_store(&mut self, block: Block, ptr: Value, value: Value, mem_ty: Type) {
        let inst = self.insts.push(InstData {
            opcode: Opcode::Store,
            args: SmallVec::from_slice(&[ptr, value]),
            imm: None,
            mem_ty: Some(mem_ty),
            call: None,
            global: None,
            result: None,
            location: None,
        });
        self.blocks[block].body.push(inst);
    }

    /// `call` may appear any number of times in a block's body; it does not
    /// end the block (spec §3 lists calls alongside arithmetic and memory
    /// ops, not under "control").
    pub fn push_call(
        &mut self,
        block: Block,
        target: CallTarget,
        args: &[Value],
        result_ty: Option<Type>,
    ) -> Option<Value> {
        let result = result_ty.map(|ty| self.alloc_value(ty));
        let inst = self.insts.push(InstData {
            opcode: Opcode::Call,
            args: SmallVec::from_slice(args),
            imm: None,
            mem_ty: None,
            call: Some(target),
            global: None,
            result,
            location: None,
        });
        self.blocks[block].body.push(inst);
        result
    }

    /// Materializes the address of `module.globals[global]` as a pointer
    /// value (spec §4.6's rodata pool feeds exactly these references).
    pub fn push_global_addr(&mut self, block: Block, global: u32, ptr_ty: Type) -> Value {
        let result = self.alloc_value(ptr_ty);
        let inst = self.insts.push(InstData {
            opcode: Opcode::GlobalAddr,
            args: SmallVec::new(),
            imm: None,
            mem_ty: None,
            call: None,
            global: Some(global),
            result: Some(result),
            location: None,
        });
        self.blocks[block].body.push(inst);
        result
    }

    pub fn set_terminator(&mut self, block: Block, term: Terminator) {
        self.blocks[block].term = Some(term);
    }

    pub fn value_type(&self, v: Value) -> Type {
        self.value_types[v]
    }

    /// Successor blocks of `block`'s terminator, in a fixed, predictable
    /// order. Used both by the IL→MIR lowerer (which must build MIR blocks
    /// with the same successor structure, spec §4.1) and by verification
    /// helpers.
    pub fn successors(&self, block: Block) -> SmallVec<[Block; 2]> {
        match self.blocks[block].term.as_ref() {
            Some(Terminator::Ret(_)) => SmallVec::new(),
            Some(Terminator::Br { target, .. }) => SmallVec::from_slice(&[*target]),
            Some(Terminator::Cbr {
                then_block,
                else_block,
                ..
            }) => SmallVec::from_slice(&[*then_block, *else_block]),
            Some(Terminator::Switch { cases, default, .. }) => {
                let mut s: SmallVec<[Block; 2]> = cases.iter().map(|(_, b, _)| *b).collect();
                s.push(*default);
                s
            }
            None => SmallVec::new(),
        }
    }
}

/// A module: a set of functions plus the globals (string/float constants)
/// that feed the rodata pool.
#[derive(Clone, Default)]
pub struct Module {
    pub functions: Vec<Function>,
    pub globals: Vec<Global>,
}

/// A module-level constant global. The lowerer looks these up by name when
/// an instruction references one (e.g. a string-literal address).
#[derive(Clone, Debug)]
pub enum Global {
    Bytes { name: String, bytes: Vec<u8> },
    F64 { name: String, bits: u64 },
    F32 { name: String, bits: u32 },
}

impl Module {
    pub fn new() -> Self {
        Module::default()
    }
}
