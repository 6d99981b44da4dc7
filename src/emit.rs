//! AArch64 assembly text emission (spec §4.6).
//!
//! Runs last, after peephole has frozen the MIR (spec §3's "after Peephole,
//! MIR is frozen and read by the emitter"). Grounded in the shape of the
//! teacher's `binemit` — a final pass that walks already-allocated,
//! already-scheduled instructions and renders them, touching nothing about
//! register assignment or control flow — generalized from machine-code
//! bytes to AT&T-compatible assembly text, since this backend's output
//! contract (spec §6) is a `.s` file, not an object.

use crate::error::{CodegenError, CodegenResult};
use crate::isa::aarch64::regs::PReg;
use crate::mir::{Inst, MBlock, MFunction, MemArg, Reg, Width};
use crate::rodata::{RodataEntry, RodataPool};
use crate::settings::{Flags, Os};
use std::collections::HashSet;
use std::fmt::Write as _;

/// The deduplicated set of external runtime symbols the emitted functions
/// actually reference, in first-reference order (spec §4.9, §6's "manifest
/// of required runtime components"). Symbols defined by the module itself
/// (a function calling another function in the same module) are excluded.
#[derive(Default, Debug, Clone)]
pub struct RuntimeManifest {
    pub symbols: Vec<String>,
}

impl RuntimeManifest {
    fn record(&mut self, seen: &mut HashSet<String>, name: &str) {
        if seen.insert(name.to_string()) {
            self.symbols.push(name.to_string());
        }
    }
}

/// Emits every function in `functions` (input order) followed by the
/// constant pool, and collects the runtime manifest. Returns a fatal
/// [`CodegenError::Internal`] the moment an instruction violates the
/// emitter's invariants (an unresolved vreg, or a control construct that
/// should have been eliminated upstream) — spec §4.6's "failures are
/// programming errors... the pipeline halts without writing partial output".
pub fn emit_module(
    functions: &[MFunction],
    rodata: &RodataPool,
    flags: &Flags,
) -> CodegenResult<(String, RuntimeManifest)> {
    log::debug!("emit: rendering {} function(s)", functions.len());

    let defined: HashSet<&str> = functions.iter().map(|f| f.name.as_str()).collect();
    let mut manifest = RuntimeManifest::default();
    let mut seen = HashSet::new();
    let mut out = String::new();

    writeln!(out, "\t.text").unwrap();
    for mfunc in functions {
        emit_function(&mut out, mfunc, flags.os, &defined, &mut manifest, &mut seen)?;
    }

    if !rodata.is_empty() {
        writeln!(out, "\n\t{}", flags.os.rodata_section()).unwrap();
        for entry in rodata.strings() {
            emit_string_entry(&mut out, entry);
        }
        for entry in rodata.floats() {
            emit_float_entry(&mut out, entry);
        }
    }

    Ok((out, manifest))
}

fn mangle(os: Os, name: &str) -> String {
    format!("{}{name}", os.symbol_prefix())
}

fn sanitize(name: &str) -> String {
    name.chars().map(|c| if c == '-' { '_' } else { c }).collect()
}

fn block_label(fname_sanitized: &str, block_index: usize) -> String {
    format!(".L{fname_sanitized}_block_{block_index}")
}

fn emit_function(
    out: &mut String,
    mfunc: &MFunction,
    os: Os,
    defined: &HashSet<&str>,
    manifest: &mut RuntimeManifest,
    seen: &mut HashSet<String>,
) -> CodegenResult<()> {
    let mangled = mangle(os, &mfunc.name);
    let sanitized = sanitize(&mfunc.name);
    writeln!(out, "\n\t.globl {mangled}").unwrap();
    writeln!(out, "\t.p2align 2").unwrap();
    writeln!(out, "{mangled}:").unwrap();

    let order = mfunc.block_order();
    let index_of: std::collections::HashMap<MBlock, usize> =
        order.iter().enumerate().map(|(i, &b)| (b, i)).collect();
    let label_of = |b: MBlock| block_label(&sanitized, index_of[&b]);

    for (i, &b) in order.iter().enumerate() {
        if i > 0 {
            writeln!(out, "{}:", label_of(b)).unwrap();
        }
        for &mi in &mfunc.blocks[b].insts {
            let inst = &mfunc.insts[mi];
            if let Inst::Bl { target } = inst {
                if defined.contains(target.as_str()) {
                    manifest.record(seen, &mangle(os, target));
                } else {
                    manifest.record(seen, target);
                }
            }
            let line = render_inst(inst, mfunc, os, &label_of)?;
            writeln!(out, "\t{line}").unwrap();
        }
    }
    Ok(())
}

fn emit_string_entry(out: &mut String, entry: &RodataEntry) {
    if let RodataEntry::Bytes { label, bytes } = entry {
        writeln!(out, "{label}:").unwrap();
        let rendered: Vec<String> = bytes.iter().map(|b| format!("{b}")).collect();
        writeln!(out, "\t.byte {}", rendered.join(", ")).unwrap();
    }
}

fn emit_float_entry(out: &mut String, entry: &RodataEntry) {
    match entry {
        RodataEntry::F64 { label, bits } => {
            writeln!(out, "\t.p2align 3").unwrap();
            writeln!(out, "{label}:").unwrap();
            writeln!(out, "\t.quad {bits}").unwrap();
        }
        RodataEntry::F32 { label, bits } => {
            writeln!(out, "\t.p2align 3").unwrap();
            writeln!(out, "{label}:").unwrap();
            writeln!(out, "\t.quad {bits}").unwrap();
        }
        RodataEntry::Bytes { .. } => {}
    }
}

fn reg_text(mfunc: &MFunction, r: Reg, width: Width) -> CodegenResult<String> {
    match r {
        Reg::Physical(p) => Ok(preg_text(p, width)),
        Reg::Virtual(_) => Err(CodegenError::internal(
            "unresolved virtual register reached the emitter",
            mfunc,
        )),
    }
}

fn preg_text(p: PReg, width: Width) -> String {
    let bits = if width == Width::W32 { 32 } else { 64 };
    p.name(bits)
}

fn ext_suffix(bits: u8) -> &'static str {
    match bits {
        8 => "b",
        16 => "h",
        32 => "w",
        _ => "x",
    }
}

fn mem_text(mfunc: &MFunction, mem: &MemArg) -> CodegenResult<String> {
    match mem {
        MemArg::FpRel(off) => Ok(format!("[x29, #{off}]")),
        MemArg::SpRel(off) => Ok(format!("[sp, #{off}]")),
        MemArg::BaseImm { base, imm } => {
            Ok(format!("[{}, #{imm}]", reg_text(mfunc, *base, Width::W64)?))
        }
    }
}

/// Renders one instruction to its final AT&T-compatible text, keyed off
/// `(opcode, operand kinds)` via the match arm itself (spec §4.6's "a table
/// keyed by (opcode, operand count, operand kinds)" — here expressed
/// directly as Rust match arms rather than a literal lookup table, following
/// the same dispatch-by-pattern-match idiom `crate::lower` uses).
fn render_inst(
    inst: &Inst,
    mfunc: &MFunction,
    os: Os,
    label_of: &dyn Fn(MBlock) -> String,
) -> CodegenResult<String> {
    use Inst::*;
    let r = |reg: Reg, w: Width| reg_text(mfunc, reg, w);
    Ok(match inst {
        AddRRR { width, rd, rn, rm } => {
            format!("add {}, {}, {}", r(*rd, *width)?, r(*rn, *width)?, r(*rm, *width)?)
        }
        AddRI { width, rd, rn, imm } => format!("add {}, {}, #{imm}", r(*rd, *width)?, r(*rn, *width)?),
        SubRRR { width, rd, rn, rm } => {
            format!("sub {}, {}, {}", r(*rd, *width)?, r(*rn, *width)?, r(*rm, *width)?)
        }
        SubRI { width, rd, rn, imm } => format!("sub {}, {}, #{imm}", r(*rd, *width)?, r(*rn, *width)?),
        AddsRRR { width, rd, rn, rm } => {
            format!("adds {}, {}, {}", r(*rd, *width)?, r(*rn, *width)?, r(*rm, *width)?)
        }
        SubsRRR { width, rd, rn, rm } => {
            format!("subs {}, {}, {}", r(*rd, *width)?, r(*rn, *width)?, r(*rm, *width)?)
        }
        MulRRR { width, rd, rn, rm } => {
            format!("mul {}, {}, {}", r(*rd, *width)?, r(*rn, *width)?, r(*rm, *width)?)
        }
        SDivRRR { width, rd, rn, rm } => {
            format!("sdiv {}, {}, {}", r(*rd, *width)?, r(*rn, *width)?, r(*rm, *width)?)
        }
        UDivRRR { width, rd, rn, rm } => {
            format!("udiv {}, {}, {}", r(*rd, *width)?, r(*rn, *width)?, r(*rm, *width)?)
        }
        SMulH { rd, rn, rm } => {
            format!("smulh {}, {}, {}", r(*rd, Width::W64)?, r(*rn, Width::W64)?, r(*rm, Width::W64)?)
        }
        MAddRRRR { width, rd, rn, rm, ra } => format!(
            "madd {}, {}, {}, {}",
            r(*rd, *width)?,
            r(*rn, *width)?,
            r(*rm, *width)?,
            r(*ra, *width)?
        ),
        MSubRRRR { width, rd, rn, rm, ra } => format!(
            "msub {}, {}, {}, {}",
            r(*rd, *width)?,
            r(*rn, *width)?,
            r(*rm, *width)?,
            r(*ra, *width)?
        ),
        AndRRR { width, rd, rn, rm } => {
            format!("and {}, {}, {}", r(*rd, *width)?, r(*rn, *width)?, r(*rm, *width)?)
        }
        OrRRR { width, rd, rn, rm } => {
            format!("orr {}, {}, {}", r(*rd, *width)?, r(*rn, *width)?, r(*rm, *width)?)
        }
        EorRRR { width, rd, rn, rm } => {
            format!("eor {}, {}, {}", r(*rd, *width)?, r(*rn, *width)?, r(*rm, *width)?)
        }
        AndRI { width, rd, rn, imm } => format!("and {}, {}, #{imm}", r(*rd, *width)?, r(*rn, *width)?),
        OrRI { width, rd, rn, imm } => format!("orr {}, {}, #{imm}", r(*rd, *width)?, r(*rn, *width)?),
        EorRI { width, rd, rn, imm } => format!("eor {}, {}, #{imm}", r(*rd, *width)?, r(*rn, *width)?),
        AsrRI { width, rd, rn, amt } => format!("asr {}, {}, #{amt}", r(*rd, *width)?, r(*rn, *width)?),
        LslRI { width, rd, rn, amt } => format!("lsl {}, {}, #{amt}", r(*rd, *width)?, r(*rn, *width)?),
        LsrRI { width, rd, rn, amt } => format!("lsr {}, {}, #{amt}", r(*rd, *width)?, r(*rn, *width)?),
        AsrRR { width, rd, rn, rm } => {
            format!("asr {}, {}, {}", r(*rd, *width)?, r(*rn, *width)?, r(*rm, *width)?)
        }
        LslRR { width, rd, rn, rm } => {
            format!("lsl {}, {}, {}", r(*rd, *width)?, r(*rn, *width)?, r(*rm, *width)?)
        }
        LsrRR { width, rd, rn, rm } => {
            format!("lsr {}, {}, {}", r(*rd, *width)?, r(*rn, *width)?, r(*rm, *width)?)
        }
        CmpRR { width, rn, rm } => format!("cmp {}, {}", r(*rn, *width)?, r(*rm, *width)?),
        CmpRI { width, rn, imm } => format!("cmp {}, #{imm}", r(*rn, *width)?),
        Csel { width, rd, cond, rn, rm } => format!(
            "csel {}, {}, {}, {}",
            r(*rd, *width)?,
            r(*rn, *width)?,
            r(*rm, *width)?,
            cond.mnemonic()
        ),
        Cset { rd, cond } => format!("cset {}, {}", r(*rd, Width::W64)?, cond.mnemonic()),
        MovRR { width, rd, rm } => format!("mov {}, {}", r(*rd, *width)?, r(*rm, *width)?),
        MovRI { width, rd, imm } => format!("mov {}, #{imm}", r(*rd, *width)?),
        ExtendCheck { rd, rn, signed, from_bits } => {
            let src_w = if *from_bits <= 32 { Width::W32 } else { Width::W64 };
            format!(
                "{}xt{} {}, {}",
                if *signed { "s" } else { "u" },
                ext_suffix(*from_bits),
                r(*rd, Width::W64)?,
                r(*rn, src_w)?
            )
        }
        Extend { rd, rn, signed, from_bits, to_bits } => {
            let src_w = if *from_bits <= 32 { Width::W32 } else { Width::W64 };
            let dst_w = Width::from_bits(*to_bits);
            format!(
                "{}xt{} {}, {}",
                if *signed { "s" } else { "u" },
                ext_suffix(*from_bits),
                r(*rd, dst_w)?,
                r(*rn, src_w)?
            )
        }
        FAddRRR { width, rd, rn, rm } => {
            format!("fadd {}, {}, {}", r(*rd, *width)?, r(*rn, *width)?, r(*rm, *width)?)
        }
        FSubRRR { width, rd, rn, rm } => {
            format!("fsub {}, {}, {}", r(*rd, *width)?, r(*rn, *width)?, r(*rm, *width)?)
        }
        FMulRRR { width, rd, rn, rm } => {
            format!("fmul {}, {}, {}", r(*rd, *width)?, r(*rn, *width)?, r(*rm, *width)?)
        }
        FDivRRR { width, rd, rn, rm } => {
            format!("fdiv {}, {}, {}", r(*rd, *width)?, r(*rn, *width)?, r(*rm, *width)?)
        }
        FCmpRR { width, rn, rm } => format!("fcmp {}, {}", r(*rn, *width)?, r(*rm, *width)?),
        FMovRR { width, rd, rn } => format!("fmov {}, {}", r(*rd, *width)?, r(*rn, *width)?),
        FMovRI { width, rd, bits } => {
            // Lowering only ever constructs this with an `fmov`-encodable
            // bit pattern (see `lower::fastpath::fits_fmov64_imm`); anything
            // else goes through the rodata pool instead.
            let value = if *width == Width::W64 {
                f64::from_bits(*bits)
            } else {
                f32::from_bits(*bits as u32) as f64
            };
            format!("fmov {}, #{value}", r(*rd, *width)?)
        }
        FCvtZS { dst_width, src_width, rd, rn } => {
            format!("fcvtzs {}, {}", r(*rd, *dst_width)?, r(*rn, *src_width)?)
        }
        FCvtZU { dst_width, src_width, rd, rn } => {
            format!("fcvtzu {}, {}", r(*rd, *dst_width)?, r(*rn, *src_width)?)
        }
        SCvtF { dst_width, src_width, rd, rn } => {
            format!("scvtf {}, {}", r(*rd, *dst_width)?, r(*rn, *src_width)?)
        }
        UCvtF { dst_width, src_width, rd, rn } => {
            format!("ucvtf {}, {}", r(*rd, *dst_width)?, r(*rn, *src_width)?)
        }
        FRintZ { width, rd, rn } => format!("frintz {}, {}", r(*rd, *width)?, r(*rn, *width)?),
        LdrRegFpImm { width, rd, imm, .. } => format!("ldr {}, [x29, #{imm}]", r(*rd, *width)?),
        StrRegFpImm { width, rd, imm, .. } => format!("str {}, [x29, #{imm}]", r(*rd, *width)?),
        LdpRegFpImm { width, rd1, rd2, imm, .. } => {
            format!("ldp {}, {}, [x29, #{imm}]", r(*rd1, *width)?, r(*rd2, *width)?)
        }
        StpRegFpImm { width, rd1, rd2, imm, .. } => {
            format!("stp {}, {}, [x29, #{imm}]", r(*rd1, *width)?, r(*rd2, *width)?)
        }
        LdrRegBaseImm { width, rd, mem, .. } => format!("ldr {}, {}", r(*rd, *width)?, mem_text(mfunc, mem)?),
        StrRegBaseImm { width, rd, mem, .. } => format!("str {}, {}", r(*rd, *width)?, mem_text(mfunc, mem)?),
        AddSpImm { imm } => format!("add sp, sp, #{imm}"),
        SubSpImm { imm } => format!("sub sp, sp, #{imm}"),
        FrameAddr { .. } => {
            return Err(CodegenError::internal(
                "FrameAddr placeholder reached the emitter: crate::frame should have rewritten it",
                mfunc,
            ))
        }
        BCond { cond, target } => format!("b.{} {}", cond.mnemonic(), label_of(*target)),
        Bl { target } => format!("bl {}", mangle(os, target)),
        Blr { target } => format!("blr {}", r(*target, Width::W64)?),
        Br { target } => format!("b {}", label_of(*target)),
        Cbz { rn, target } => format!("cbz {}, {}", r(*rn, Width::W64)?, label_of(*target)),
        Cbnz { rn, target } => format!("cbnz {}, {}", r(*rn, Width::W64)?, label_of(*target)),
        Ret => "ret".to_string(),
        AdrPage { rd, symbol } => format!("adrp {}, {symbol}", r(*rd, Width::W64)?),
        AddPageOff { rd, rn, symbol } => {
            format!("add {}, {}, #:lo12:{symbol}", r(*rd, Width::W64)?, r(*rn, Width::W64)?)
        }
        ParallelCopy { .. } => {
            return Err(CodegenError::internal(
                "unresolved parallel copy reached the emitter: crate::lower::parallel_copy should have resolved it",
                mfunc,
            ))
        }
        Nop => "nop".to_string(),
    })
}
