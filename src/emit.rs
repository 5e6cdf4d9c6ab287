//! Assembly emission for the soft GPU core. The output is line-oriented:
//! labels at column 0, instructions indented eight spaces with the mnemonic
//! field padded to 30 columns, optional `; comment` after.

use std::io::Write;

use log::warn;

use crate::compile::Compiler;
use crate::ir::{
    BinOp, BlockId, ConstantValue, Id, Op, TernOp, TypeId, UnOp,
};
use crate::phi;
use crate::spv::StorageClass;
use crate::types::TypeKind;
use crate::{Error, Result};

/// How a scalar ALU kind lowers: straight to one mnemonic, or via a call
/// into the math library appended after emission.
enum Lowering {
    Inline(&'static str),
    Call(&'static str),
}

fn unary_lowering(kind: UnOp) -> Option<Lowering> {
    use Lowering::*;
    Some(match kind {
        UnOp::FNegate => Inline("fneg.s"),
        UnOp::SNegate => Inline("neg"),
        UnOp::FAbs => Inline("fabs.s"),
        UnOp::Sqrt => Inline("fsqrt.s"),
        UnOp::CopyObject => Inline("mov"),
        UnOp::SAbs => Call("abs"),
        UnOp::FSign => Call("sign"),
        UnOp::Round => Call("round"),
        UnOp::Trunc => Call("trunc"),
        UnOp::Floor => Call("floor"),
        UnOp::Ceil => Call("ceil"),
        UnOp::Fract => Call("fract"),
        UnOp::Radians => Call("radians"),
        UnOp::Degrees => Call("degrees"),
        UnOp::Sin => Call("sin"),
        UnOp::Cos => Call("cos"),
        UnOp::Tan => Call("tan"),
        UnOp::Asin => Call("asin"),
        UnOp::Acos => Call("acos"),
        UnOp::Atan => Call("atan"),
        UnOp::Exp => Call("exp"),
        UnOp::Log => Call("log"),
        UnOp::Exp2 => Call("exp2"),
        UnOp::Log2 => Call("log2"),
        UnOp::InverseSqrt => Call("inversesqrt"),
        UnOp::LogicalNot
        | UnOp::ConvertFToS
        | UnOp::ConvertFToU
        | UnOp::ConvertSToF
        | UnOp::ConvertUToF
        | UnOp::Bitcast => return None,
    })
}

fn binary_lowering(kind: BinOp) -> Option<Lowering> {
    use Lowering::*;
    Some(match kind {
        BinOp::FAdd => Inline("fadd.s"),
        BinOp::FSub => Inline("fsub.s"),
        BinOp::FMul => Inline("fmul.s"),
        BinOp::FDiv => Inline("fdiv.s"),
        BinOp::FMin => Inline("fmin.s"),
        BinOp::FMax => Inline("fmax.s"),
        BinOp::IAdd => Inline("add"),
        BinOp::ISub => Inline("sub"),
        BinOp::IMul => Inline("mul"),
        BinOp::SDiv => Inline("div"),
        BinOp::UDiv => Inline("divu"),
        BinOp::SRem | BinOp::SMod => Inline("rem"),
        BinOp::UMod => Inline("remu"),
        BinOp::LogicalAnd => Inline("and"),
        BinOp::LogicalOr => Inline("or"),
        BinOp::FMod => Call("fmod"),
        BinOp::Atan2 => Call("atan2"),
        BinOp::Pow => Call("pow"),
        BinOp::Step => Call("step"),
        _ => return None,
    })
}

impl<'a> Compiler<'a> {
    fn emit(&self, out: &mut dyn Write, op: &str, comment: &str) -> Result<()> {
        if comment.is_empty() {
            writeln!(out, "        {}", op)?;
        } else {
            writeln!(out, "        {:<30}; {}", op, comment)?;
        }
        Ok(())
    }

    fn emit_label(&self, out: &mut dyn Write, label: &str) -> Result<()> {
        let label = if label.is_empty() { ".anonymous" } else { label };
        writeln!(out, "{}:", label)?;
        Ok(())
    }

    /// Render an operand: its physical register if it has one, a float
    /// literal for unpinned float constants, the variable's name, or the
    /// raw virtual register as a last resort.
    pub(crate) fn reg(&self, id: Id, lane: usize) -> String {
        if let Some(register) = self.registers.get(&id) {
            if let Some(&phy) = register.phy.get(lane) {
                return if phy < 32 {
                    format!("x{}", phy)
                } else {
                    format!("f{}", phy - 32)
                };
            }
        }
        if let Some(constant) = self.module.constants.get(&id) {
            if let ConstantValue::F32(value) = constant.value {
                return format!("{}", value);
            }
        }
        if let Some(name) = self.module.name_of(id) {
            return name.to_string();
        }
        format!("r{}", id)
    }

    fn same_physical_register(&self, a: Id, b: Id, lane: usize) -> bool {
        match (self.registers.get(&a), self.registers.get(&b)) {
            (Some(ra), Some(rb)) => match (ra.phy.get(lane), rb.phy.get(lane)) {
                (Some(pa), Some(pb)) => pa == pb,
                _ => false,
            },
            _ => false,
        }
    }

    /// Address expression for a memory operand: named module variables by
    /// label (plus byte displacement), everything else by absolute address.
    fn addr(&self, pointer: Id, extra: u32) -> String {
        if let Some(info) = self.module.pointers.get(&pointer) {
            if let Some(var) = self.module.variables.get(&info.variable) {
                let delta = info.offset + extra;
                if var.storage_class != StorageClass::Function {
                    if let Some(name) = self.module.name_of(info.variable) {
                        return if delta == 0 {
                            name.to_string()
                        } else {
                            format!("{}+{}", name, delta)
                        };
                    }
                }
                return format!("{}", var.address + delta);
            }
        }
        format!("r{}", pointer)
    }

    fn emit_not_implemented(&self, out: &mut dyn Write, what: &str) -> Result<()> {
        warn!("{} not implemented", what);
        self.emit(out, "#error#", &format!("{} not implemented", what))
    }

    /// The calling sequence for math library routines: arguments pushed
    /// right to left below the saved return address, results popped from
    /// the same slots.
    fn emit_call(
        &self,
        out: &mut dyn Write,
        name: &str,
        results: &[Id],
        operands: &[Id],
    ) -> Result<()> {
        self.emit(
            out,
            &format!("addi sp, sp, -{}", 4 * (operands.len() + 1)),
            "Make room on stack",
        )?;
        self.emit(
            out,
            &format!("sw ra, {}(sp)", 4 * operands.len()),
            "Save return address",
        )?;
        for (index, &operand) in operands.iter().enumerate().rev() {
            let float = self
                .module
                .type_id_of(operand)
                .and_then(|ty| self.module.types.is_float(ty).ok())
                .unwrap_or(true);
            let store = if float { "fsw" } else { "sw" };
            self.emit(
                out,
                &format!("{} {}, {}(sp)", store, self.reg(operand, 0), index * 4),
                "Push parameter",
            )?;
        }
        self.emit(out, &format!("jal ra, {}", name), "Call routine")?;
        for (index, &result) in results.iter().enumerate() {
            let float = self
                .is_reg_float(result)
                .unwrap_or(true);
            let load = if float { "flw" } else { "lw" };
            self.emit(
                out,
                &format!("{} {}, {}(sp)", load, self.reg(result, 0), index * 4),
                "Pop result",
            )?;
        }
        self.emit(
            out,
            &format!("lw ra, {}(sp)", 4 * results.len()),
            "Restore return address",
        )?;
        self.emit(
            out,
            &format!("addi sp, sp, {}", 4 * (results.len() + 1)),
            "Restore stack",
        )?;
        Ok(())
    }

    fn emit_uni_call(&self, out: &mut dyn Write, name: &str, result: Id, operand: Id) -> Result<()> {
        self.emit_call(out, name, &[result], &[operand])
    }

    fn emit_bin_call(
        &self,
        out: &mut dyn Write,
        name: &str,
        result: Id,
        lhs: Id,
        rhs: Id,
    ) -> Result<()> {
        self.emit_call(out, name, &[result], &[lhs, rhs])
    }

    /// Materialize the φ copies for the edge `pc's block -> target`,
    /// right before the branch. Copies that resolved to the same physical
    /// register are kept, commented out.
    fn emit_phi_copies(&self, out: &mut dyn Write, from: BlockId, target: BlockId) -> Result<()> {
        for (dst, src) in phi::copies_for_edge(self.module, from, target) {
            let mut text = String::new();
            if self.same_physical_register(dst, src, 0) {
                text.push_str("; ");
            }
            text.push_str(&format!("mov {}, {}", self.reg(dst, 0), self.reg(src, 0)));
            self.emit(out, &text, "phi elimination")?;
        }
        Ok(())
    }

    fn is_float_type(&self, type_id: Option<TypeId>) -> bool {
        type_id
            .and_then(|ty| self.module.types.is_float(ty).ok())
            .unwrap_or(false)
    }

    fn emit_insn(&mut self, out: &mut dyn Write, pc: usize) -> Result<()> {
        let node = self.module.linear[pc];
        let (result, result_type, op) = {
            let insn = &self.module.arena[node];
            (insn.result_id(), insn.result_type, insn.op.clone())
        };
        let block = self.block_of[pc];
        match op {
            // φ defs materialize on their incoming edges, nothing here.
            Op::Phi { .. } => Ok(()),

            Op::Branch { target } => {
                self.emit_phi_copies(out, block, target)?;
                self.emit(out, &format!("jal x0, label{}", target), "")
            }

            Op::BranchConditional {
                cond,
                true_target,
                false_target,
            } => {
                self.emit_phi_copies(out, block, true_target)?;
                self.emit_phi_copies(out, block, false_target)?;
                self.emit(
                    out,
                    &format!("bne {}, x0, label{}", self.reg(cond, 0), true_target),
                    &format!("branch on r{}", cond),
                )?;
                self.emit(out, &format!("jal x0, label{}", false_target), "")
            }

            Op::Return => self.emit(out, "jalr x0, ra, 0", ""),

            Op::ReturnValue { value } => {
                let float = self.is_float_type(self.module.type_id_of(value));
                let store = if float { "fsw" } else { "sw" };
                self.emit(
                    out,
                    &format!("{} {}, 0(sp)", store, self.reg(value, 0)),
                    "Return value",
                )?;
                self.emit(out, "jalr x0, ra, 0", "")
            }

            Op::Kill => self.emit(out, "ebreak", "kill"),
            Op::Unreachable => self.emit(out, "ebreak", "unreachable"),

            Op::Load { pointer, offset } => {
                let float = self.is_float_type(result_type);
                let mnemonic = if float { "flw" } else { "lw" };
                let result = result.unwrap_or(0);
                self.emit(
                    out,
                    &format!(
                        "{} {}, {}(x0)",
                        mnemonic,
                        self.reg(result, 0),
                        self.addr(pointer, offset)
                    ),
                    &format!("r{} = load", result),
                )
            }

            Op::Store { pointer, object, offset } => {
                let float = self.is_float_type(self.module.type_id_of(object));
                let mnemonic = if float { "fsw" } else { "sw" };
                self.emit(
                    out,
                    &format!(
                        "{} {}, {}(x0)",
                        mnemonic,
                        self.reg(object, 0),
                        self.addr(pointer, offset)
                    ),
                    &format!("store r{}", object),
                )
            }

            Op::AddImm { src, imm } => {
                let result = result.unwrap_or(0);
                self.emit(
                    out,
                    &format!("addi {}, {}, {}", self.reg(result, 0), self.reg(src, 0), imm),
                    &format!("r{} = r{} + {}", result, src, imm),
                )
            }

            Op::Unary { kind, src } => {
                let result = result.unwrap_or(0);
                match unary_lowering(kind) {
                    Some(Lowering::Inline(mnemonic)) => self.emit(
                        out,
                        &format!("{} {}, {}", mnemonic, self.reg(result, 0), self.reg(src, 0)),
                        &format!("r{} = {} r{}", result, kind.name(), src),
                    ),
                    Some(Lowering::Call(name)) => self.emit_uni_call(out, name, result, src),
                    None => self.emit_special_unary(out, kind, result, src),
                }
            }

            Op::Binary { kind, lhs, rhs } => {
                let result = result.unwrap_or(0);
                match binary_lowering(kind) {
                    Some(Lowering::Inline(mnemonic)) => self.emit(
                        out,
                        &format!(
                            "{} {}, {}, {}",
                            mnemonic,
                            self.reg(result, 0),
                            self.reg(lhs, 0),
                            self.reg(rhs, 0)
                        ),
                        &format!("r{} = {} r{} r{}", result, kind.name(), lhs, rhs),
                    ),
                    Some(Lowering::Call(name)) => self.emit_bin_call(out, name, result, lhs, rhs),
                    None => self.emit_comparison(out, kind, result, lhs, rhs),
                }
            }

            Op::Ternary { kind, a, b, c } => {
                let result = result.unwrap_or(0);
                match kind {
                    TernOp::FClamp => {
                        let rd = self.reg(result, 0);
                        self.emit(
                            out,
                            &format!("fmax.s {}, {}, {}", rd, self.reg(a, 0), self.reg(b, 0)),
                            &format!("r{} = clamp low", result),
                        )?;
                        self.emit(
                            out,
                            &format!("fmin.s {}, {}, {}", rd, rd, self.reg(c, 0)),
                            &format!("r{} = clamp high", result),
                        )
                    }
                    TernOp::FMix => self.emit_call(out, "mix", &[result], &[a, b, c]),
                    TernOp::SmoothStep => {
                        self.emit_call(out, "smoothstep", &[result], &[a, b, c])
                    }
                    TernOp::Select => {
                        let true_label = self.make_local_label();
                        let done_label = self.make_local_label();
                        let rd = self.reg(result, 0);
                        self.emit(
                            out,
                            &format!("bne {}, x0, {}", self.reg(a, 0), true_label),
                            &format!("r{} = select r{}", result, a),
                        )?;
                        self.emit(out, &format!("mov {}, {}", rd, self.reg(c, 0)), "select false")?;
                        self.emit(out, &format!("jal x0, {}", done_label), "")?;
                        self.emit_label(out, &true_label)?;
                        self.emit(out, &format!("mov {}, {}", rd, self.reg(b, 0)), "select true")?;
                        self.emit_label(out, &done_label)
                    }
                }
            }

            Op::FunctionCall { function, args } => {
                let name = self.module.clean_function_name(function);
                let void = result_type
                    .and_then(|ty| self.module.types.get(ty).ok())
                    .map(|ty| ty.kind == TypeKind::Void)
                    .unwrap_or(true);
                let results: Vec<Id> = if void {
                    Vec::new()
                } else {
                    result.into_iter().collect()
                };
                self.emit_call(out, &name, &results, &args)
            }

            Op::Unimplemented { opcode } => {
                self.emit_not_implemented(out, crate::spv::opcode_name(opcode))
            }

            // Wide forms never survive the expander; anything that does is
            // a placeholder for an extension point.
            other => self.emit_not_implemented(out, other.name()),
        }
    }

    fn emit_special_unary(
        &self,
        out: &mut dyn Write,
        kind: UnOp,
        result: Id,
        src: Id,
    ) -> Result<()> {
        let rd = self.reg(result, 0);
        let rs = self.reg(src, 0);
        match kind {
            UnOp::LogicalNot => self.emit(
                out,
                &format!("xori {}, {}, 1", rd, rs),
                &format!("r{} = not r{}", result, src),
            ),
            UnOp::ConvertFToS => self.emit(
                out,
                &format!("fcvt.w.s {}, {}, rtz", rd, rs),
                &format!("r{} = int(r{})", result, src),
            ),
            UnOp::ConvertFToU => self.emit(
                out,
                &format!("fcvt.wu.s {}, {}, rtz", rd, rs),
                &format!("r{} = uint(r{})", result, src),
            ),
            UnOp::ConvertSToF => self.emit(
                out,
                &format!("fcvt.s.w {}, {}", rd, rs),
                &format!("r{} = float(r{})", result, src),
            ),
            UnOp::ConvertUToF => self.emit(
                out,
                &format!("fcvt.s.wu {}, {}", rd, rs),
                &format!("r{} = float(r{})", result, src),
            ),
            UnOp::Bitcast => {
                let to_float = self
                    .is_reg_float(result)
                    .unwrap_or(false);
                let from_float = self
                    .module
                    .type_id_of(src)
                    .and_then(|ty| self.module.types.is_float(ty).ok())
                    .unwrap_or(false);
                let mnemonic = match (from_float, to_float) {
                    (true, false) => "fmv.x.w",
                    (false, true) => "fmv.w.x",
                    _ => "mov",
                };
                self.emit(
                    out,
                    &format!("{} {}, {}", mnemonic, rd, rs),
                    &format!("r{} = bitcast r{}", result, src),
                )
            }
            _ => unreachable!("{:?} has a table lowering", kind),
        }
    }

    /// Comparisons synthesize from the base set: `flt`/`fle`/`feq` for
    /// floats (swapped for greater-than), `slt`/`sltu`/`xor` for ints,
    /// with an `xori` to invert where needed.
    fn emit_comparison(
        &self,
        out: &mut dyn Write,
        kind: BinOp,
        result: Id,
        lhs: Id,
        rhs: Id,
    ) -> Result<()> {
        let rd = self.reg(result, 0);
        let a = self.reg(lhs, 0);
        let b = self.reg(rhs, 0);
        let comment = format!("r{} = {} r{} r{}", result, kind.name(), lhs, rhs);
        let invert = |this: &Self, out: &mut dyn Write| -> Result<()> {
            this.emit(out, &format!("xori {}, {}, 1", rd, rd), "")
        };
        match kind {
            BinOp::FOrdLessThan => self.emit(out, &format!("flt.s {}, {}, {}", rd, a, b), &comment),
            BinOp::FOrdGreaterThan => {
                self.emit(out, &format!("flt.s {}, {}, {}", rd, b, a), &comment)
            }
            BinOp::FOrdLessThanEqual => {
                self.emit(out, &format!("fle.s {}, {}, {}", rd, a, b), &comment)
            }
            BinOp::FOrdGreaterThanEqual => {
                self.emit(out, &format!("fle.s {}, {}, {}", rd, b, a), &comment)
            }
            BinOp::FOrdEqual => self.emit(out, &format!("feq.s {}, {}, {}", rd, a, b), &comment),
            BinOp::FOrdNotEqual => {
                self.emit(out, &format!("feq.s {}, {}, {}", rd, a, b), &comment)?;
                invert(self, out)
            }
            BinOp::SLessThan => self.emit(out, &format!("slt {}, {}, {}", rd, a, b), &comment),
            BinOp::SGreaterThan => self.emit(out, &format!("slt {}, {}, {}", rd, b, a), &comment),
            BinOp::ULessThan => self.emit(out, &format!("sltu {}, {}, {}", rd, a, b), &comment),
            BinOp::UGreaterThan => self.emit(out, &format!("sltu {}, {}, {}", rd, b, a), &comment),
            BinOp::SLessThanEqual => {
                self.emit(out, &format!("slt {}, {}, {}", rd, b, a), &comment)?;
                invert(self, out)
            }
            BinOp::SGreaterThanEqual => {
                self.emit(out, &format!("slt {}, {}, {}", rd, a, b), &comment)?;
                invert(self, out)
            }
            BinOp::ULessThanEqual => {
                self.emit(out, &format!("sltu {}, {}, {}", rd, b, a), &comment)?;
                invert(self, out)
            }
            BinOp::UGreaterThanEqual => {
                self.emit(out, &format!("sltu {}, {}, {}", rd, a, b), &comment)?;
                invert(self, out)
            }
            BinOp::IEqual => {
                self.emit(out, &format!("xor {}, {}, {}", rd, a, b), &comment)?;
                self.emit(out, &format!("sltiu {}, {}, 1", rd, rd), "")
            }
            BinOp::INotEqual => {
                self.emit(out, &format!("xor {}, {}, {}", rd, a, b), &comment)?;
                self.emit(out, &format!("sltu {}, x0, {}", rd, rd), "")
            }
            _ => unreachable!("{:?} has a table lowering", kind),
        }
    }

    /// One typed data word per scalar, recursing through composites
    fn emit_constant_data(
        &self,
        out: &mut dyn Write,
        id: Id,
        type_id: TypeId,
        value: &ConstantValue,
    ) -> Result<()> {
        match &self.module.types.get(type_id)?.kind {
            TypeKind::Int { .. } => {
                let word = value.to_word().unwrap_or(0);
                self.emit(out, &format!(".word {}", word), "")
            }
            TypeKind::Bool => {
                let word = value.to_word().unwrap_or(0);
                self.emit(out, &format!(".word {}", word), "")
            }
            TypeKind::Float { .. } => {
                let word = value.to_word().unwrap_or(0);
                let float = f32::from_bits(word);
                self.emit(out, &format!(".word {:#x}", word), &format!("Float {}", float))
            }
            TypeKind::Vector { .. } => match value {
                ConstantValue::Composite(subs) => {
                    for &sub in subs {
                        let constant = self.module.constants.get(&sub).ok_or_else(|| {
                            Error::Invariant(format!(
                                "composite constant {} references unknown constant {}",
                                id, sub
                            ))
                        })?;
                        self.emit_constant_data(out, sub, constant.type_id, &constant.value)?;
                    }
                    Ok(())
                }
                _ => Err(Error::Type(format!(
                    "vector constant {} has a non-composite value",
                    id
                ))),
            },
            _ => Err(Error::Type(format!(
                "unhandled type for constant {}",
                id
            ))),
        }
    }

    /// Emit the whole module: prologue, functions with their pinned
    /// constant loads and block labels, named variable storage, constant
    /// data, and finally the library text verbatim.
    pub fn emit_module(&mut self, out: &mut dyn Write, library: &str) -> Result<()> {
        let main = self.module.main_function_id.ok_or_else(|| {
            Error::Unsupported("no entry point for the Fragment execution model".to_string())
        })?;
        self.emit(out, &format!("jal ra, {}", self.module.clean_function_name(main)), "")?;
        self.emit(out, "ebreak", "")?;

        for pc in 0..self.module.linear.len() {
            let starting: Vec<Id> = self
                .module
                .functions
                .iter()
                .filter(|(_, function)| function.pc_start == pc)
                .map(|(&id, _)| id)
                .collect();
            for function_id in starting {
                let name = self.module.clean_function_name(function_id);
                writeln!(out, "; ---------------------------- function \"{}\"", name)?;
                self.emit_label(out, &name)?;

                // Fill the pinned constants.
                let live_in = self.module.arena[self.module.linear[pc]].livein_all();
                for id in live_in {
                    if !self.module.is_constant(id) {
                        continue;
                    }
                    let register = match self.registers.get(&id) {
                        Some(register) if !register.phy.is_empty() => register,
                        _ => continue,
                    };
                    let phy = register.phy[0];
                    let text = if phy >= 32 {
                        format!("flw f{}, .C{}(x0)", phy - 32, id)
                    } else {
                        format!("lw x{}, .C{}(x0)", phy, id)
                    };
                    self.emit(out, &text, "Load constant")?;
                }
            }

            let labels_here: Vec<BlockId> = self
                .module
                .labels
                .iter()
                .filter(|(_, &at)| at == pc)
                .map(|(&block_id, _)| block_id)
                .collect();
            for block_id in labels_here {
                self.emit_label(out, &format!("label{}", block_id))?;
            }

            self.emit_insn(out, pc)?;
        }

        // Zero-filled storage for every named module variable.
        for (&id, var) in self.module.variables.iter() {
            if var.storage_class == StorageClass::Function {
                continue;
            }
            match self.module.name_of(id) {
                Some(name) => {
                    let name = name.to_string();
                    self.emit_label(out, &name)?;
                    let size = self.module.types.size_of(var.type_id)?;
                    for _ in 0..size / 4 {
                        self.emit(out, ".word 0", "")?;
                    }
                    for _ in 0..size % 4 {
                        self.emit(out, ".byte 0", "")?;
                    }
                }
                None => warn!("name of variable {} not defined", id),
            }
        }

        // Constant pool; anonymous constants get `.C<id>` labels.
        for (&id, constant) in self.module.constants.iter() {
            let label = match self.module.name_of(id) {
                Some(name) => name.to_string(),
                None => format!(".C{}", id),
            };
            self.emit_label(out, &label)?;
            self.emit_constant_data(out, id, constant.type_id, &constant.value)?;
        }

        out.write_all(library.as_bytes())?;
        Ok(())
    }
}
