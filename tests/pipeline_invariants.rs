//! White-box checks against the pass objects directly (rather than through
//! the emitted text), covering the testable properties the emitted assembly
//! alone can't easily assert on: post-RA register shape, large-frame
//! chunking, and string-literal dedup.

use viper_codegen_aarch64::diag::Diagnostics;
use viper_codegen_aarch64::il::{Function, Global, Immediate, Module, Opcode, Terminator, Type};
use viper_codegen_aarch64::mir::Reg;
use viper_codegen_aarch64::rodata::RodataPool;
use viper_codegen_aarch64::{frame, lower, peephole, regalloc, settings};

fn big_frame_function() -> Function {
    let mut f = Function::new("big");
    f.param_types = vec![Type::I64];
    f.ret_type = Some(Type::I64);
    let entry = f.entry;
    let p = f.append_block_param(entry, Type::I64);

    let mut vals = Vec::with_capacity(600);
    for i in 0..600i64 {
        vals.push(f.push_inst_imm(entry, Opcode::Add, &[p], Immediate::Int(i), Type::I64));
    }
    let mut acc = vals[0];
    for v in &vals[1..] {
        acc = f.push_inst(entry, Opcode::Add, &[acc, *v], Type::I64);
    }
    f.set_terminator(entry, Terminator::Ret(Some(acc)));
    f
}

/// Every vreg is resolved to a physical register by the time RA, frame
/// building, and peephole have all run — no `Reg::Virtual` survives.
#[test]
fn post_ra_no_vreg_remains() {
    let mut diags = Diagnostics::new();
    let mut module = Module::default();
    module.functions.push(big_frame_function());

    let mut pool = RodataPool::build(&module);
    let mut mfunc = lower::lower_function(&module.functions[0], &module, &mut pool, &mut diags).unwrap();
    let fixups = regalloc::allocate(&mut mfunc, &mut diags).unwrap();
    frame::build(&mut mfunc, &fixups);
    peephole::run(&mut mfunc, &settings::PeepholeFlags::default());

    for mi in mfunc.insts.keys() {
        let inst = &mfunc.insts[mi];
        for r in inst.uses().iter().chain(inst.defs().iter()) {
            assert!(matches!(r, Reg::Physical(_)), "{inst:?} still references {r:?}");
        }
    }
}

/// 600 simultaneously-live values force a frame larger than the 4080-byte
/// single-immediate limit, so the prologue's `sub sp, sp, #imm` must be
/// chunked into more than one instruction.
#[test]
fn large_frame_chunks_the_stack_adjustment() {
    let mut diags = Diagnostics::new();
    let mut module = Module::default();
    module.functions.push(big_frame_function());

    let mut pool = RodataPool::build(&module);
    let mut mfunc = lower::lower_function(&module.functions[0], &module, &mut pool, &mut diags).unwrap();
    let fixups = regalloc::allocate(&mut mfunc, &mut diags).unwrap();
    frame::build(&mut mfunc, &fixups);

    assert!(mfunc.frame_size > frame::MAX_SP_IMM, "frame_size = {}", mfunc.frame_size);

    let sub_sp_count = mfunc.blocks[mfunc.entry]
        .insts
        .iter()
        .filter(|&&mi| matches!(mfunc.insts[mi], viper_codegen_aarch64::mir::Inst::SubSpImm { .. }))
        .count();
    assert!(sub_sp_count >= 2, "expected a chunked sp adjustment, got {sub_sp_count} sub instructions");
}

/// Peephole is idempotent: once a block's instruction count stops
/// shrinking, a further application changes nothing.
#[test]
fn peephole_is_idempotent() {
    let mut diags = Diagnostics::new();
    let mut module = Module::default();
    let mut f = Function::new("foldable");
    f.param_types = vec![Type::I64, Type::I64];
    f.ret_type = Some(Type::I64);
    let entry = f.entry;
    let a = f.append_block_param(entry, Type::I64);
    let b = f.append_block_param(entry, Type::I64);
    let r = f.push_inst(entry, Opcode::Add, &[a, b], Type::I64);
    let r2 = f.push_inst_imm(entry, Opcode::Add, &[r], Immediate::Int(4), Type::I64);
    f.set_terminator(entry, Terminator::Ret(Some(r2)));
    module.functions.push(f);

    let mut pool = RodataPool::build(&module);
    let mut mfunc = lower::lower_function(&module.functions[0], &module, &mut pool, &mut diags).unwrap();
    let fixups = regalloc::allocate(&mut mfunc, &mut diags).unwrap();
    frame::build(&mut mfunc, &fixups);

    let flags = settings::PeepholeFlags::default();
    peephole::run(&mut mfunc, &flags);
    let after_first: Vec<String> = mfunc.insts.values().map(|i| format!("{i:?}")).collect();

    peephole::run(&mut mfunc, &flags);
    let after_second: Vec<String> = mfunc.insts.values().map(|i| format!("{i:?}")).collect();

    assert_eq!(after_first, after_second);
}

/// `fadd %x, 3.14` has no `fmov` immediate encoding, so lowering must fall
/// back to interning the bit pattern into the rodata pool and loading it
/// through `adrp`/`add`/`ldr` rather than emitting an unassemblable
/// `fmov d_, #3.14`.
#[test]
fn non_encodable_float_immediate_falls_back_to_rodata() {
    let mut diags = Diagnostics::new();
    let mut module = Module::default();
    let mut f = Function::new("addpi");
    f.param_types = vec![Type::F64];
    f.ret_type = Some(Type::F64);
    let entry = f.entry;
    let x = f.append_block_param(entry, Type::F64);
    let r = f.push_inst_imm(entry, Opcode::FAdd, &[x], Immediate::F64(3.14), Type::F64);
    f.set_terminator(entry, Terminator::Ret(Some(r)));
    module.functions.push(f);

    let mut pool = RodataPool::build(&module);
    let mfunc = lower::lower_function(&module.functions[0], &module, &mut pool, &mut diags).unwrap();

    let dump = mfunc.to_string();
    assert!(dump.contains("adrp"), "{dump}");
    assert!(!dump.contains("#0x"), "no FMovRI (immediate form) expected: {dump}");
    assert_eq!(pool.floats().len(), 1, "the non-encodable immediate should be interned");
}

/// `fadd %x, 2.0` has an `fmov` immediate encoding and should be emitted
/// directly rather than routed through the rodata pool.
#[test]
fn encodable_float_immediate_uses_fmov_directly() {
    let mut diags = Diagnostics::new();
    let mut module = Module::default();
    let mut f = Function::new("addtwo");
    f.param_types = vec![Type::F64];
    f.ret_type = Some(Type::F64);
    let entry = f.entry;
    let x = f.append_block_param(entry, Type::F64);
    let r = f.push_inst_imm(entry, Opcode::FAdd, &[x], Immediate::F64(2.0), Type::F64);
    f.set_terminator(entry, Terminator::Ret(Some(r)));
    module.functions.push(f);

    let mut pool = RodataPool::build(&module);
    let mfunc = lower::lower_function(&module.functions[0], &module, &mut pool, &mut diags).unwrap();

    let dump = mfunc.to_string();
    assert!(dump.contains("#0x"), "expected a direct FMovRI: {dump}");
    assert!(pool.is_empty(), "an encodable immediate must not touch the rodata pool");
}

/// Three globals, two with identical content, collapse onto two rodata
/// entries with the duplicate pair sharing a label.
#[test]
fn string_literal_globals_dedup() {
    let module = Module {
        functions: Vec::new(),
        globals: vec![
            Global::Bytes { name: "g0".into(), bytes: b"Hello\0".to_vec() },
            Global::Bytes { name: "g1".into(), bytes: b"Hello\0".to_vec() },
            Global::Bytes { name: "g2".into(), bytes: b"World\0".to_vec() },
        ],
    };
    let pool = RodataPool::build(&module);
    assert_eq!(pool.strings().len(), 2);
    assert_eq!(pool.rewrite("g0"), pool.rewrite("g1"));
}
