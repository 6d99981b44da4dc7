//! IL-to-MIR lowering: one opcode-dispatch handler per IL instruction,
//! mirroring the teacher's `isa/aarch64/lower_inst.rs` shape (spec §4.1).
//!
//! A [`LowerCtx`] owns the per-function Value→vreg and Block→MBlock maps.
//! Lowering is a single linear pass over each IL block's body followed by
//! its terminator; block-parameter passing across edges with more than one
//! successor (`cbr`, `switch`) goes through a dedicated edge block so the
//! parallel copy for one arm never executes on the other (critical-edge
//! splitting). A handful of instructions (checked arithmetic, checked
//! conversions) themselves introduce a continuation block mid-lowering, so
//! every per-instruction handler returns the MIR block subsequent
//! instructions in the same IL block body should append to.

pub mod checked;
pub mod fastpath;
pub mod parallel_copy;

use crate::diag::Diagnostics;
use crate::error::{CodegenError, CodegenResult};
use crate::il::{
    Block as IlBlock, CallTarget, Function as IlFunction, Immediate, InstData,
    Module as IlModule, Opcode, Terminator, Type, Value,
};
use crate::isa::aarch64::regs::{self, RegClass};
use crate::mir::{Cond, Inst, MBlock, MFunction, MemArg, Reg, Width};
use crate::rodata::RodataPool;
use cranelift_entity::SecondaryMap;

fn op_width(ty: Type) -> Width {
    Width::from_bits(ty.reg_size())
}

pub fn lower_module(
    module: &IlModule,
    rodata: &mut RodataPool,
    diags: &mut Diagnostics,
) -> CodegenResult<Vec<MFunction>> {
    module
        .functions
        .iter()
        .map(|f| lower_function(f, module, rodata, diags))
        .collect()
}

pub fn lower_function(
    func: &IlFunction,
    module: &IlModule,
    rodata: &mut RodataPool,
    diags: &mut Diagnostics,
) -> CodegenResult<MFunction> {
    let mut mfunc = MFunction::new(func.name.clone());
    let mut ctx = LowerCtx::new(func, module, rodata);
    ctx.prepare_blocks(&mut mfunc);
    ctx.bind_entry_params(&mut mfunc);

    let il_blocks: Vec<IlBlock> = func.blocks.keys().collect();
    for b in il_blocks {
        let mut mb = ctx.block_of[b].expect("every IL block was pre-registered");
        for &inst_ref in &func.blocks[b].body {
            let data = func.insts[inst_ref].clone();
            mb = ctx.lower_inst(&mut mfunc, mb, &data, diags)?;
        }
        ctx.lower_terminator(&mut mfunc, b, mb)?;
    }
    Ok(mfunc)
}

struct LowerCtx<'f> {
    func: &'f IlFunction,
    module: &'f IlModule,
    rodata: &'f mut RodataPool,
    vreg_of: SecondaryMap<Value, Option<Reg>>,
    block_of: SecondaryMap<IlBlock, Option<MBlock>>,
    traps: checked::TrapBlocks,
}

impl<'f> LowerCtx<'f> {
    fn new(func: &'f IlFunction, module: &'f IlModule, rodata: &'f mut RodataPool) -> Self {
        LowerCtx {
            func,
            module,
            rodata,
            vreg_of: SecondaryMap::new(),
            block_of: SecondaryMap::new(),
            traps: checked::TrapBlocks::default(),
        }
    }

    /// MIR blocks always mirror IL block order 1:1 (spec §4.1): the first
    /// IL block reuses `MFunction`'s pre-existing entry block, every other
    /// IL block gets a freshly created MIR block.
    fn prepare_blocks(&mut self, mfunc: &mut MFunction) {
        for (i, b) in self.func.blocks.keys().enumerate() {
            let mb = if i == 0 { mfunc.entry } else { mfunc.create_block() };
            self.block_of[b] = Some(mb);
        }
    }

    fn vreg(&mut self, mfunc: &mut MFunction, v: Value) -> Reg {
        if let Some(r) = self.vreg_of[v] {
            return r;
        }
        let ty = self.func.value_type(v);
        let class = if ty.is_float() { RegClass::Fpr } else { RegClass::Gpr };
        let vr = mfunc.create_vreg(class, ty.reg_size());
        let r = Reg::Virtual(vr);
        self.vreg_of[v] = Some(r);
        r
    }

    /// Binds the entry block's parameters — which double as the function's
    /// formal parameters — from the AAPCS64 argument registers.
    fn bind_entry_params(&mut self, mfunc: &mut MFunction) {
        let entry_mb = mfunc.entry;
        let params = self.func.blocks[self.func.entry].params.clone();
        let mut gpr_idx = 0usize;
        let mut fpr_idx = 0usize;
        for p in params {
            let ty = self.func.value_type(p);
            let rd = self.vreg(mfunc, p);
            if ty.is_float() {
                let src = regs::ARG_FPRS[fpr_idx];
                fpr_idx += 1;
                mfunc.push(
                    entry_mb,
                    Inst::FMovRR {
                        width: op_width(ty),
                        rd,
                        rn: Reg::Physical(src),
                    },
                );
            } else {
                let src = regs::ARG_GPRS[gpr_idx];
                gpr_idx += 1;
                mfunc.push(
                    entry_mb,
                    Inst::MovRR {
                        width: op_width(ty),
                        rd,
                        rm: Reg::Physical(src),
                    },
                );
            }
        }
    }

    fn int_imm(data: &InstData, loc_msg: &str) -> CodegenResult<i64> {
        match data.imm {
            Some(Immediate::Int(n)) => Ok(n),
            _ => Err(CodegenError::invalid_il(format!(
                "expected an integer immediate for `{loc_msg}`"
            ))),
        }
    }

    /// Dispatches one IL instruction and returns the MIR block subsequent
    /// instructions in the same IL block body should append to (almost
    /// always `mb` itself; checked arithmetic and checked conversions are
    /// the exception, since they branch to a trap block and resume in a
    /// freshly created continuation).
    fn lower_inst(
        &mut self,
        mfunc: &mut MFunction,
        mb: MBlock,
        data: &InstData,
        diags: &mut Diagnostics,
    ) -> CodegenResult<MBlock> {
        use Opcode::*;
        let _ = diags;
        let next = match data.opcode {
            Add | Sub | And | Or | Xor => {
                self.lower_int_binop(mfunc, mb, data)?;
                mb
            }
            Shl | Shr | UShr => {
                self.lower_shift(mfunc, mb, data)?;
                mb
            }
            Mul => {
                self.lower_mul(mfunc, mb, data)?;
                mb
            }
            AddOvf | SubOvf | MulOvf | SDivChk0 | SRemChk0 => self.lower_checked(mfunc, mb, data)?,
            IcmpEq | IcmpNe | ScmpLt | ScmpLe | ScmpGt | ScmpGe | UcmpLt | UcmpLe | UcmpGt
            | UcmpGe => {
                self.lower_icompare(mfunc, mb, data)?;
                mb
            }
            FAdd | FSub | FMul | FDiv => {
                self.lower_fbinop(mfunc, mb, data)?;
                mb
            }
            FcmpEq | FcmpNe | FcmpLt | FcmpLe | FcmpGt | FcmpGe => {
                self.lower_fcompare(mfunc, mb, data)?;
                mb
            }
            Sitofp => {
                self.lower_sitofp(mfunc, mb, data)?;
                mb
            }
            FptosiChk => self.lower_fptosi_chk(mfunc, mb, data)?,
            TruncChk => self.lower_trunc_chk(mfunc, mb, data)?,
            Zext | Sext => {
                self.lower_extend(mfunc, mb, data)?;
                mb
            }
            Load => {
                self.lower_load(mfunc, mb, data)?;
                mb
            }
            Store => {
                self.lower_store(mfunc, mb, data)?;
                mb
            }
            Alloca => {
                self.lower_alloca(mfunc, mb, data)?;
                mb
            }
            Call => {
                self.lower_call(mfunc, mb, data)?;
                mb
            }
            GlobalAddr => {
                self.lower_global_addr(mfunc, mb, data)?;
                mb
            }
        };
        Ok(next)
    }

    fn arg_reg(&mut self, mfunc: &mut MFunction, data: &InstData, i: usize) -> Reg {
        self.vreg(mfunc, data.args[i])
    }

    fn result_reg(&mut self, mfunc: &mut MFunction, data: &InstData) -> Reg {
        self.vreg(mfunc, data.result.expect("instruction defines a result"))
    }

    fn result_width(&self, data: &InstData) -> Width {
        op_width(self.func.value_type(data.result.expect("result")))
    }

    /// Materializes an integer constant that did not fit an `*RI` encoding
    /// into a fresh vreg via `MovRI`, pushed into the instruction's own
    /// block (not the shared scratch register: the value may need to stay
    /// live past intervening instructions, so it must be something the
    /// allocator can track and spill like any other value).
    fn materialize_const(&mut self, mfunc: &mut MFunction, mb: MBlock, width: Width, imm: i64) -> Reg {
        let size = if width == Width::W32 { 32 } else { 64 };
        let vr = mfunc.create_vreg(RegClass::Gpr, size);
        let rd = Reg::Virtual(vr);
        mfunc.push(mb, Inst::MovRI { width, rd, imm });
        rd
    }

    /// Materializes a float immediate. Most floats (`3.14`, say) have no
    /// `fmov` immediate encoding (spec §4.1 notes this is a narrow format);
    /// those fall back to interning the bit pattern into the rodata pool and
    /// loading it through an `adrp`/`add`/`ldr` sequence, the same shape
    /// `lower_global_addr` uses for `GlobalAddr`.
    fn materialize_float(
        &mut self,
        mfunc: &mut MFunction,
        mb: MBlock,
        width: Width,
        imm: Immediate,
    ) -> CodegenResult<Reg> {
        let (bits, encodable) = match imm {
            Immediate::F64(v) => (v.to_bits(), fastpath::fits_fmov64_imm(v.to_bits())),
            Immediate::F32(v) => (v.to_bits() as u64, fastpath::fits_fmov32_imm(v.to_bits())),
            Immediate::Int(_) => {
                return Err(CodegenError::invalid_il("FP op with integer immediate"))
            }
        };
        let size = if width == Width::W32 { 32 } else { 64 };
        let vr = mfunc.create_vreg(RegClass::Fpr, size);
        let rd = Reg::Virtual(vr);
        if encodable {
            mfunc.push(mb, Inst::FMovRI { width, rd, bits });
        } else {
            let label = match imm {
                Immediate::F64(v) => self.rodata.intern_f64(v.to_bits()),
                Immediate::F32(v) => self.rodata.intern_f32(v.to_bits() as u32),
                Immediate::Int(_) => unreachable!("checked above"),
            };
            let addr_vr = mfunc.create_vreg(RegClass::Gpr, 64);
            let addr = Reg::Virtual(addr_vr);
            mfunc.push(mb, Inst::AdrPage { rd: addr, symbol: label.clone() });
            mfunc.push(mb, Inst::AddPageOff { rd: addr, rn: addr, symbol: label });
            mfunc.push(
                mb,
                Inst::LdrRegBaseImm {
                    width,
                    is_fpr: true,
                    rd,
                    mem: MemArg::BaseImm { base: addr, imm: 0 },
                },
            );
        }
        Ok(rd)
    }

    fn lower_int_binop(&mut self, mfunc: &mut MFunction, mb: MBlock, data: &InstData) -> CodegenResult<()> {
        let width = self.result_width(data);
        let rd = self.result_reg(mfunc, data);
        let rn = self.arg_reg(mfunc, data, 0);
        let inst = if let Some(imm) = data.imm {
            let imm = match imm {
                Immediate::Int(n) => n,
                _ => return Err(CodegenError::invalid_il("integer op with non-integer immediate")),
            };
            let width_bits = if width == Width::W32 { 32 } else { 64 };
            let add_sub_encodable =
                matches!(data.opcode, Opcode::Add | Opcode::Sub) && fastpath::fits_add_sub_imm(imm);
            let logical_encodable = matches!(data.opcode, Opcode::And | Opcode::Or | Opcode::Xor)
                && fastpath::fits_logical_imm(imm, width_bits);
            if add_sub_encodable {
                match data.opcode {
                    Opcode::Add => Inst::AddRI { width, rd, rn, imm },
                    Opcode::Sub => Inst::SubRI { width, rd, rn, imm },
                    _ => unreachable!(),
                }
            } else if logical_encodable {
                match data.opcode {
                    Opcode::And => Inst::AndRI { width, rd, rn, imm },
                    Opcode::Or => Inst::OrRI { width, rd, rn, imm },
                    Opcode::Xor => Inst::EorRI { width, rd, rn, imm },
                    _ => unreachable!(),
                }
            } else {
                let rm = self.materialize_const(mfunc, mb, width, imm);
                self.rrr_for(data.opcode, width, rd, rn, rm)
            }
        } else {
            let rm = self.arg_reg(mfunc, data, 1);
            self.rrr_for(data.opcode, width, rd, rn, rm)
        };
        mfunc.push(mb, inst);
        Ok(())
    }

    fn rrr_for(&self, op: Opcode, width: Width, rd: Reg, rn: Reg, rm: Reg) -> Inst {
        match op {
            Opcode::Add => Inst::AddRRR { width, rd, rn, rm },
            Opcode::Sub => Inst::SubRRR { width, rd, rn, rm },
            Opcode::And => Inst::AndRRR { width, rd, rn, rm },
            Opcode::Or => Inst::OrRRR { width, rd, rn, rm },
            Opcode::Xor => Inst::EorRRR { width, rd, rn, rm },
            other => unreachable!("{other:?} is not a plain RRR binop"),
        }
    }

    fn lower_shift(&mut self, mfunc: &mut MFunction, mb: MBlock, data: &InstData) -> CodegenResult<()> {
        let width = self.result_width(data);
        let rd = self.result_reg(mfunc, data);
        let rn = self.arg_reg(mfunc, data, 0);
        let width_bits = if width == Width::W32 { 32 } else { 64 };
        let inst = if let Some(Immediate::Int(amt)) = data.imm {
            if !fastpath::fits_shift_imm(amt, width_bits) {
                return Err(CodegenError::invalid_il("shift amount out of range"));
            }
            let amt = amt as u8;
            match data.opcode {
                Opcode::Shl => Inst::LslRI { width, rd, rn, amt },
                Opcode::Shr => Inst::AsrRI { width, rd, rn, amt },
                Opcode::UShr => Inst::LsrRI { width, rd, rn, amt },
                other => unreachable!("{other:?} is not a shift"),
            }
        } else {
            let rm = self.arg_reg(mfunc, data, 1);
            match data.opcode {
                Opcode::Shl => Inst::LslRR { width, rd, rn, rm },
                Opcode::Shr => Inst::AsrRR { width, rd, rn, rm },
                Opcode::UShr => Inst::LsrRR { width, rd, rn, rm },
                other => unreachable!("{other:?} is not a shift"),
            }
        };
        mfunc.push(mb, inst);
        Ok(())
    }

    fn lower_mul(&mut self, mfunc: &mut MFunction, mb: MBlock, data: &InstData) -> CodegenResult<()> {
        let width = self.result_width(data);
        let rd = self.result_reg(mfunc, data);
        let rn = self.arg_reg(mfunc, data, 0);
        let rm = if let Some(Immediate::Int(imm)) = data.imm {
            self.materialize_const(mfunc, mb, width, imm)
        } else {
            self.arg_reg(mfunc, data, 1)
        };
        mfunc.push(mb, Inst::MulRRR { width, rd, rn, rm });
        Ok(())
    }

    /// Checked arithmetic branches to a trap block and resumes lowering in
    /// a freshly created continuation — the returned `MBlock` is that
    /// continuation, not `mb`.
    fn lower_checked(&mut self, mfunc: &mut MFunction, mb: MBlock, data: &InstData) -> CodegenResult<MBlock> {
        let width = self.result_width(data);
        let rd = self.result_reg(mfunc, data);
        let rn = self.arg_reg(mfunc, data, 0);
        let rm = if let Some(Immediate::Int(imm)) = data.imm {
            self.materialize_const(mfunc, mb, width, imm)
        } else {
            self.arg_reg(mfunc, data, 1)
        };
        let cont = mfunc.create_block();
        match data.opcode {
            Opcode::AddOvf => checked::lower_add_ovf(mfunc, mb, &mut self.traps, width, rd, rn, rm, cont),
            Opcode::SubOvf => checked::lower_sub_ovf(mfunc, mb, &mut self.traps, width, rd, rn, rm, cont),
            Opcode::MulOvf => {
                let scratch_hi = Reg::Physical(regs::scratch_gpr());
                let scratch_sext = Reg::Physical(regs::scratch_gpr2());
                checked::lower_mul_ovf(mfunc, mb, &mut self.traps, scratch_hi, scratch_sext, rd, rn, rm, cont)
            }
            Opcode::SDivChk0 => {
                checked::lower_sdiv_chk0(mfunc, mb, &mut self.traps, width, rd, rn, rm, cont)
            }
            Opcode::SRemChk0 => {
                let scratch = Reg::Physical(regs::scratch_gpr());
                checked::lower_srem_chk0(mfunc, mb, &mut self.traps, width, scratch, rd, rn, rm, cont)
            }
            other => unreachable!("{other:?} is not checked arithmetic"),
        }
        Ok(cont)
    }

    fn lower_icompare(&mut self, mfunc: &mut MFunction, mb: MBlock, data: &InstData) -> CodegenResult<()> {
        let rn = self.arg_reg(mfunc, data, 0);
        let operand_width = op_width(self.func.value_type(data.args[0]));
        let rd = self.result_reg(mfunc, data);
        let cond = match data.opcode {
            Opcode::IcmpEq => Cond::Eq,
            Opcode::IcmpNe => Cond::Ne,
            Opcode::ScmpLt => Cond::Lt,
            Opcode::ScmpLe => Cond::Le,
            Opcode::ScmpGt => Cond::Gt,
            Opcode::ScmpGe => Cond::Ge,
            Opcode::UcmpLt => Cond::Lo,
            Opcode::UcmpLe => Cond::Ls,
            Opcode::UcmpGt => Cond::Hi,
            Opcode::UcmpGe => Cond::Hs,
            other => unreachable!("{other:?} is not an integer compare"),
        };
        if let Some(Immediate::Int(imm)) = data.imm {
            mfunc.push(mb, Inst::CmpRI { width: operand_width, rn, imm });
        } else {
            let rm = self.arg_reg(mfunc, data, 1);
            mfunc.push(mb, Inst::CmpRR { width: operand_width, rn, rm });
        }
        mfunc.push(mb, Inst::Cset { rd, cond });
        Ok(())
    }

    fn lower_fbinop(&mut self, mfunc: &mut MFunction, mb: MBlock, data: &InstData) -> CodegenResult<()> {
        let width = self.result_width(data);
        let rd = self.result_reg(mfunc, data);
        let rn = self.arg_reg(mfunc, data, 0);
        let rm = if let Some(imm) = data.imm {
            self.materialize_float(mfunc, mb, width, imm)?
        } else {
            self.arg_reg(mfunc, data, 1)
        };
        let inst = match data.opcode {
            Opcode::FAdd => Inst::FAddRRR { width, rd, rn, rm },
            Opcode::FSub => Inst::FSubRRR { width, rd, rn, rm },
            Opcode::FMul => Inst::FMulRRR { width, rd, rn, rm },
            Opcode::FDiv => Inst::FDivRRR { width, rd, rn, rm },
            other => unreachable!("{other:?} is not an FP binop"),
        };
        mfunc.push(mb, inst);
        Ok(())
    }

    fn lower_fcompare(&mut self, mfunc: &mut MFunction, mb: MBlock, data: &InstData) -> CodegenResult<()> {
        let width = op_width(self.func.value_type(data.args[0]));
        let rn = self.arg_reg(mfunc, data, 0);
        let rm = if let Some(imm) = data.imm {
            self.materialize_float(mfunc, mb, width, imm)?
        } else {
            self.arg_reg(mfunc, data, 1)
        };
        let rd = self.result_reg(mfunc, data);
        let cond = match data.opcode {
            Opcode::FcmpEq => Cond::Eq,
            Opcode::FcmpNe => Cond::Ne,
            Opcode::FcmpLt => Cond::Mi,
            Opcode::FcmpLe => Cond::Ls,
            Opcode::FcmpGt => Cond::Gt,
            Opcode::FcmpGe => Cond::Ge,
            other => unreachable!("{other:?} is not an FP compare"),
        };
        mfunc.push(mb, Inst::FCmpRR { width, rn, rm });
        mfunc.push(mb, Inst::Cset { rd, cond });
        Ok(())
    }

    fn lower_sitofp(&mut self, mfunc: &mut MFunction, mb: MBlock, data: &InstData) -> CodegenResult<()> {
        let src_width = op_width(self.func.value_type(data.args[0]));
        let dst_width = self.result_width(data);
        let rd = self.result_reg(mfunc, data);
        let rn = self.arg_reg(mfunc, data, 0);
        mfunc.push(mb, Inst::SCvtF { dst_width, src_width, rd, rn });
        Ok(())
    }

    /// Checked float-to-int truncation via the round-trip-compare idiom:
    /// truncate, convert back, and trap if the round trip doesn't recover
    /// the original value (covers both NaN and out-of-range inputs).
    /// Like other checked ops, returns a freshly created continuation.
    /// Checked float-to-int truncation: only NaN, infinities, and
    /// out-of-range magnitudes trap, never an ordinary fractional input
    /// (`2.7` truncates to `2`, it doesn't trap). The check compares the
    /// round-tripped conversion against `rn` truncated toward zero
    /// (`frintz`), not against `rn` itself — otherwise every non-integral
    /// input would falsely look like it overflowed.
    fn lower_fptosi_chk(&mut self, mfunc: &mut MFunction, mb: MBlock, data: &InstData) -> CodegenResult<MBlock> {
        let src_width = op_width(self.func.value_type(data.args[0]));
        let dst_width = self.result_width(data);
        let rd = self.result_reg(mfunc, data);
        let rn = self.arg_reg(mfunc, data, 0);
        let truncated = Reg::Physical(regs::scratch_fpr());
        let roundtrip = Reg::Physical(regs::scratch_fpr2());
        let cont = mfunc.create_block();

        mfunc.push(
            mb,
            Inst::FRintZ {
                width: src_width,
                rd: truncated,
                rn,
            },
        );
        mfunc.push(mb, Inst::FCvtZS { dst_width, src_width, rd, rn });
        mfunc.push(
            mb,
            Inst::SCvtF {
                dst_width: src_width,
                src_width: dst_width,
                rd: roundtrip,
                rn: rd,
            },
        );
        mfunc.push(mb, Inst::FCmpRR { width: src_width, rn: roundtrip, rm: truncated });
        let trap = self.traps.overflow_block(mfunc);
        mfunc.push(mb, Inst::BCond { cond: Cond::Ne, target: trap });
        mfunc.push(mb, Inst::Br { target: cont });
        Ok(cont)
    }

    /// Checked narrowing integer truncation: re-extend the truncated value
    /// and compare against the original, trapping on mismatch. Returns a
    /// freshly created continuation like the other checked ops.
    fn lower_trunc_chk(&mut self, mfunc: &mut MFunction, mb: MBlock, data: &InstData) -> CodegenResult<MBlock> {
        let src_ty = self.func.value_type(data.args[0]);
        let dst_ty = self.func.value_type(data.result.expect("result"));
        let rn = self.arg_reg(mfunc, data, 0);
        let rd = self.result_reg(mfunc, data);
        let width = op_width(src_ty);
        let scratch = Reg::Physical(regs::scratch_gpr());
        let cont = mfunc.create_block();

        mfunc.push(mb, Inst::MovRR { width, rd, rm: rn });
        mfunc.push(
            mb,
            Inst::ExtendCheck {
                rd: scratch,
                rn: rd,
                signed: true,
                from_bits: dst_ty.reg_size(),
            },
        );
        mfunc.push(mb, Inst::CmpRR { width, rn: scratch, rm: rn });
        let trap = self.traps.overflow_block(mfunc);
        mfunc.push(mb, Inst::BCond { cond: Cond::Ne, target: trap });
        mfunc.push(mb, Inst::Br { target: cont });
        Ok(cont)
    }

    fn lower_extend(&mut self, mfunc: &mut MFunction, mb: MBlock, data: &InstData) -> CodegenResult<()> {
        let src_ty = self.func.value_type(data.args[0]);
        let dst_ty = self.func.value_type(data.result.expect("result"));
        let rn = self.arg_reg(mfunc, data, 0);
        let rd = self.result_reg(mfunc, data);
        mfunc.push(
            mb,
            Inst::Extend {
                rd,
                rn,
                signed: data.opcode == Opcode::Sext,
                from_bits: src_ty.reg_size(),
                to_bits: dst_ty.reg_size(),
            },
        );
        Ok(())
    }

    fn lower_load(&mut self, mfunc: &mut MFunction, mb: MBlock, data: &InstData) -> CodegenResult<()> {
        let ty = data.mem_ty.ok_or_else(|| CodegenError::invalid_il("load without a memory type"))?;
        let ptr = self.arg_reg(mfunc, data, 0);
        let rd = self.result_reg(mfunc, data);
        mfunc.push(
            mb,
            Inst::LdrRegBaseImm {
                width: op_width(ty),
                is_fpr: ty.is_float(),
                rd,
                mem: MemArg::BaseImm { base: ptr, imm: 0 },
            },
        );
        Ok(())
    }

    fn lower_store(&mut self, mfunc: &mut MFunction, mb: MBlock, data: &InstData) -> CodegenResult<()> {
        let ty = data.mem_ty.ok_or_else(|| CodegenError::invalid_il("store without a memory type"))?;
        let ptr = self.arg_reg(mfunc, data, 0);
        let value = self.arg_reg(mfunc, data, 1);
        mfunc.push(
            mb,
            Inst::StrRegBaseImm {
                width: op_width(ty),
                is_fpr: ty.is_float(),
                rd: value,
                mem: MemArg::BaseImm { base: ptr, imm: 0 },
            },
        );
        Ok(())
    }

    fn lower_alloca(&mut self, mfunc: &mut MFunction, mb: MBlock, data: &InstData) -> CodegenResult<()> {
        let size = Self::int_imm(data, "alloca")?;
        let rd = self.result_reg(mfunc, data);
        let slot = mfunc.create_slot(size as u32, 8);
        mfunc.push(mb, Inst::FrameAddr { rd, slot });
        Ok(())
    }

    fn lower_call(&mut self, mfunc: &mut MFunction, mb: MBlock, data: &InstData) -> CodegenResult<()> {
        let mut gpr_idx = 0usize;
        let mut fpr_idx = 0usize;
        let mut pairs: Vec<(Reg, Reg)> = Vec::new();
        let args: Vec<Value> = data.args.iter().copied().collect();
        for arg in args {
            let ty = self.func.value_type(arg);
            let src = self.vreg(mfunc, arg);
            let dst = if ty.is_float() {
                if fpr_idx >= regs::ARG_FPRS.len() {
                    return Err(CodegenError::unsupported(
                        "calls with more than 8 floating-point arguments (stack-passed arguments are not implemented)",
                    ));
                }
                let d = Reg::Physical(regs::ARG_FPRS[fpr_idx]);
                fpr_idx += 1;
                d
            } else {
                if gpr_idx >= regs::ARG_GPRS.len() {
                    return Err(CodegenError::unsupported(
                        "calls with more than 8 integer arguments (stack-passed arguments are not implemented)",
                    ));
                }
                let d = Reg::Physical(regs::ARG_GPRS[gpr_idx]);
                gpr_idx += 1;
                d
            };
            pairs.push((dst, src));
        }
        let moves = parallel_copy::resolve(
            &pairs,
            Reg::Physical(regs::scratch_gpr()),
            Reg::Physical(regs::scratch_fpr()),
            |r| mfunc.reg_class_of(r),
        );
        for mv in moves {
            mfunc.push(mb, mv);
        }

        match &data.call {
            Some(CallTarget::Direct(name)) => {
                mfunc.push(mb, Inst::Bl { target: name.0.clone() });
            }
            Some(CallTarget::Indirect(v)) => {
                let r = self.vreg(mfunc, *v);
                mfunc.push(mb, Inst::Blr { target: r });
            }
            None => unreachable!("Opcode::Call always carries a CallTarget"),
        }

        if let Some(result) = data.result {
            let ty = self.func.value_type(result);
            let rd = self.vreg(mfunc, result);
            if ty.is_float() {
                mfunc.push(
                    mb,
                    Inst::FMovRR { width: op_width(ty), rd, rn: Reg::Physical(regs::ret_fpr()) },
                );
            } else {
                mfunc.push(
                    mb,
                    Inst::MovRR { width: op_width(ty), rd, rm: Reg::Physical(regs::ret_gpr()) },
                );
            }
        }
        Ok(())
    }

    fn lower_global_addr(&mut self, mfunc: &mut MFunction, mb: MBlock, data: &InstData) -> CodegenResult<()> {
        let idx = data
            .global
            .ok_or_else(|| CodegenError::invalid_il("global_addr without a global index"))?;
        let name = global_name(self.module, idx)?.clone();
        let rd = self.result_reg(mfunc, data);
        mfunc.push(mb, Inst::AdrPage { rd, symbol: name.clone() });
        mfunc.push(mb, Inst::AddPageOff { rd, rn: rd, symbol: name });
        Ok(())
    }

    /// Resolves a (possibly empty) edge's block-argument copies into a
    /// dedicated block so they cannot run on a sibling edge that shares
    /// the same origin block (`cbr`/`switch`'s critical-edge case).
    fn lower_edge(&mut self, mfunc: &mut MFunction, args: &[Value], target: IlBlock) -> MBlock {
        let target_mb = self.block_of[target].expect("every IL block was pre-registered");
        if args.is_empty() {
            return target_mb;
        }
        let params = self.func.blocks[target].params.clone();
        let pairs: Vec<(Reg, Reg)> = params
            .iter()
            .zip(args.iter())
            .map(|(&p, &a)| (self.vreg(mfunc, p), self.vreg(mfunc, a)))
            .collect();
        let edge = mfunc.create_block();
        let moves = parallel_copy::resolve(
            &pairs,
            Reg::Physical(regs::scratch_gpr()),
            Reg::Physical(regs::scratch_fpr()),
            |r| mfunc.reg_class_of(r),
        );
        for mv in moves {
            mfunc.push(edge, mv);
        }
        mfunc.push(edge, Inst::Br { target: target_mb });
        edge
    }

    fn lower_terminator(&mut self, mfunc: &mut MFunction, b: IlBlock, mb: MBlock) -> CodegenResult<()> {
        let term = self.func.blocks[b]
            .term
            .clone()
            .ok_or_else(|| CodegenError::invalid_il("block has no terminator"))?;
        match term {
            Terminator::Ret(v) => {
                if let Some(v) = v {
                    let ty = self.func.value_type(v);
                    let r = self.vreg(mfunc, v);
                    if ty.is_float() {
                        mfunc.push(
                            mb,
                            Inst::FMovRR { width: op_width(ty), rd: Reg::Physical(regs::ret_fpr()), rn: r },
                        );
                    } else {
                        mfunc.push(
                            mb,
                            Inst::MovRR { width: op_width(ty), rd: Reg::Physical(regs::ret_gpr()), rm: r },
                        );
                    }
                }
                mfunc.push(mb, Inst::Ret);
            }
            Terminator::Br { target, args } => {
                let args: Vec<Value> = args.iter().copied().collect();
                if args.is_empty() {
                    let target_mb = self.block_of[target].expect("pre-registered");
                    mfunc.push(mb, Inst::Br { target: target_mb });
                } else {
                    let params = self.func.blocks[target].params.clone();
                    let pairs: Vec<(Reg, Reg)> = params
                        .iter()
                        .zip(args.iter())
                        .map(|(&p, &a)| (self.vreg(mfunc, p), self.vreg(mfunc, a)))
                        .collect();
                    let moves = parallel_copy::resolve(
                        &pairs,
                        Reg::Physical(regs::scratch_gpr()),
                        Reg::Physical(regs::scratch_fpr()),
                        |r| mfunc.reg_class_of(r),
                    );
                    for mv in moves {
                        mfunc.push(mb, mv);
                    }
                    let target_mb = self.block_of[target].expect("pre-registered");
                    mfunc.push(mb, Inst::Br { target: target_mb });
                }
            }
            Terminator::Cbr {
                cond,
                then_block,
                then_args,
                else_block,
                else_args,
            } => {
                let then_args: Vec<Value> = then_args.iter().copied().collect();
                let else_args: Vec<Value> = else_args.iter().copied().collect();
                let then_mb = self.lower_edge(mfunc, &then_args, then_block);
                let else_mb = self.lower_edge(mfunc, &else_args, else_block);
                let cond_reg = self.vreg(mfunc, cond);
                mfunc.push(mb, Inst::Cbnz { rn: cond_reg, target: then_mb });
                mfunc.push(mb, Inst::Br { target: else_mb });
            }
            Terminator::Switch {
                value,
                cases,
                default,
                default_args,
            } => {
                let value_reg = self.vreg(mfunc, value);
                for (case_val, case_block, case_args) in &cases {
                    let case_args: Vec<Value> = case_args.iter().copied().collect();
                    let target = self.lower_edge(mfunc, &case_args, *case_block);
                    mfunc.push(mb, Inst::CmpRI { width: Width::W64, rn: value_reg, imm: *case_val });
                    mfunc.push(mb, Inst::BCond { cond: Cond::Eq, target });
                }
                let default_args: Vec<Value> = default_args.iter().copied().collect();
                let target = self.lower_edge(mfunc, &default_args, default);
                mfunc.push(mb, Inst::Br { target });
            }
        }
        Ok(())
    }
}

fn global_name(module: &IlModule, idx: u32) -> CodegenResult<&String> {
    match module.globals.get(idx as usize) {
        Some(crate::il::Global::Bytes { name, .. }) => Ok(name),
        Some(crate::il::Global::F64 { name, .. }) => Ok(name),
        Some(crate::il::Global::F32 { name, .. }) => Ok(name),
        None => Err(CodegenError::invalid_il(format!("global index {idx} out of range"))),
    }
}
