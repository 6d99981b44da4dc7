//! AArch64 native code generator: lowers typed IL to MIR, allocates
//! registers, builds stack frames, runs a post-allocation peephole pass, and
//! emits AArch64 assembly text (spec §2's pipeline, §1's scope).
//!
//! [`compile_module`] is the single entry point the rest of this crate (and
//! `src/bin/codegen.rs`) drives; it wires the passes in the fixed order
//! spec §2 describes, the way the teacher's own `Context::compile` threads
//! one `CompiledCode` through a fixed sequence of owned passes rather than
//! leaving pass ordering to the caller.

pub mod diag;
pub mod emit;
pub mod error;
pub mod frame;
pub mod il;
pub mod isa;
pub mod lower;
pub mod mir;
pub mod peephole;
pub mod regalloc;
pub mod rodata;
pub mod settings;

use diag::Diagnostics;
use emit::RuntimeManifest;
use error::CodegenResult;
use settings::Flags;

/// Everything [`compile_module`] produces: the assembly text, the set of
/// external runtime symbols it references, and any non-fatal diagnostics
/// accumulated along the way.
pub struct CompileOutput {
    pub asm: String,
    pub manifest: RuntimeManifest,
    pub diagnostics: Diagnostics,
}

/// Runs the full pipeline over `module`: rodata interning, lowering (which
/// can itself intern non-`fmov`-encodable float immediates into the same
/// pool), register allocation, frame building, peephole, emission. Returns
/// the first fatal [`error::CodegenError`] encountered; nothing is written or
/// returned on failure (spec §7).
pub fn compile_module(module: &il::Module, flags: &Flags) -> CodegenResult<CompileOutput> {
    let mut diags = Diagnostics::new();

    let mut rodata_pool = rodata::RodataPool::build(module);

    log::debug!("compile_module: lowering {} function(s)", module.functions.len());
    let mut functions = lower::lower_module(module, &mut rodata_pool, &mut diags)?;

    for mfunc in &mut functions {
        rodata_pool.rewrite_function(mfunc);
    }

    for mfunc in &mut functions {
        dump(flags, flags.dump.full, "lowered", mfunc);
        dump(flags, flags.dump.before_ra, "before-ra", mfunc);

        log::debug!("compile_module: allocating registers for `{}`", mfunc.name);
        let fixups = regalloc::allocate(mfunc, &mut diags)?;

        dump(flags, flags.dump.after_ra, "after-ra", mfunc);
        dump(flags, flags.dump.full, "allocated", mfunc);

        log::debug!("compile_module: building frame for `{}`", mfunc.name);
        frame::build(mfunc, &fixups);

        dump(flags, flags.dump.full, "framed", mfunc);

        peephole::run(mfunc, &flags.peephole);

        dump(flags, flags.dump.full, "peephole", mfunc);
    }

    let (asm, manifest) = emit::emit_module(&functions, &rodata_pool, flags)?;

    if flags.verbosity == settings::Verbosity::Normal {
        for warning in &diags.warnings {
            log::warn!("{warning}");
        }
    }

    Ok(CompileOutput { asm, manifest, diagnostics: diags })
}

fn dump(flags: &Flags, enabled: bool, stage: &str, mfunc: &mir::MFunction) {
    if enabled {
        eprintln!("; --- {stage}: {} ---\n{mfunc}", mfunc.name);
    }
}
