// BSD 3-Clause License
//
// Copyright © 2025-2026 The spirv-shade developers
// All rights reserved.
//
// Redistribution and use in source and binary forms, with or without
// modification, are permitted provided that the following conditions are met:
//
// 1. Redistributions of source code must retain the above copyright notice, this
//    list of conditions and the following disclaimer.
//
// 2. Redistributions in binary form must reproduce the above copyright notice,
//    this list of conditions and the following disclaimer in the documentation
//    and/or other materials provided with the distribution.
//
// 3. Neither the name of the copyright holder nor the names of its
//    contributors may be used to endorse or promote products derived from
//    this software without specific prior written permission.
//
// THIS SOFTWARE IS PROVIDED BY THE COPYRIGHT HOLDERS AND CONTRIBUTORS "AS IS"
// AND ANY EXPRESS OR IMPLIED WARRANTIES, INCLUDING, BUT NOT LIMITED TO, THE
// IMPLIED WARRANTIES OF MERCHANTABILITY AND FITNESS FOR A PARTICULAR PURPOSE ARE
// DISCLAIMED. IN NO EVENT SHALL THE COPYRIGHT HOLDER OR CONTRIBUTORS BE LIABLE
// FOR ANY DIRECT, INDIRECT, INCIDENTAL, SPECIAL, EXEMPLARY, OR CONSEQUENTIAL
// DAMAGES (INCLUDING, BUT NOT LIMITED TO, PROCUREMENT OF SUBSTITUTE GOODS OR
// SERVICES; LOSS OF USE, DATA, OR PROFITS; OR BUSINESS INTERRUPTION) HOWEVER
// CAUSED AND ON ANY THEORY OF LIABILITY, WHETHER IN CONTRACT, STRICT LIABILITY,
// OR TORT (INCLUDING NEGLIGENCE OR OTHERWISE) ARISING IN ANY WAY OUT OF THE USE
// OF THIS SOFTWARE, EVEN IF ADVISED OF THE POSSIBILITY OF SUCH DAMAGE.
//

//! A direct evaluator for the scalarized IR, used to pin down the meaning
//! of each opcode. It executes the linearized stream over a flat memory
//! image laid out by the module's storage regions; the embedding seeds the
//! input regions and reads colors back out of the output region.

use std::collections::BTreeMap;
use std::f32::consts::PI;

use crate::ir::{BinOp, BlockId, ConstantValue, Id, Op, TernOp, UnOp};
use crate::module::{Module, MEMORY_SIZE};
use crate::phi;
use crate::types::TypeKind;
use crate::{Error, Result};

/// A scalar runtime value
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Bool(bool),
    I32(i32),
    U32(u32),
    F32(f32),
}

impl Value {
    fn as_f32(self) -> Result<f32> {
        match self {
            Value::F32(v) => Ok(v),
            other => Err(Error::Type(format!("expected float, got {:?}", other))),
        }
    }

    fn as_i32(self) -> Result<i32> {
        match self {
            Value::I32(v) => Ok(v),
            Value::U32(v) => Ok(v as i32),
            other => Err(Error::Type(format!("expected int, got {:?}", other))),
        }
    }

    fn as_u32(self) -> Result<u32> {
        match self {
            Value::U32(v) => Ok(v),
            Value::I32(v) => Ok(v as u32),
            other => Err(Error::Type(format!("expected uint, got {:?}", other))),
        }
    }

    fn as_bool(self) -> Result<bool> {
        match self {
            Value::Bool(v) => Ok(v),
            other => Err(Error::Type(format!("expected bool, got {:?}", other))),
        }
    }
}

/// How a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Finished,
    /// The fragment was discarded
    Killed,
}

/// Walks the transformed instruction stream directly
pub struct Interpreter<'a> {
    module: &'a Module,
    values: BTreeMap<Id, Value>,
    /// The flat memory image all storage classes map into
    pub memory: Vec<u8>,
}

impl<'a> Interpreter<'a> {
    pub fn new(module: &'a Module) -> Interpreter<'a> {
        Interpreter {
            module,
            values: BTreeMap::new(),
            memory: vec![0; MEMORY_SIZE as usize],
        }
    }

    pub fn write_f32(&mut self, address: u32, value: f32) {
        self.memory[address as usize..address as usize + 4]
            .copy_from_slice(&value.to_bits().to_le_bytes());
    }

    pub fn read_f32(&self, address: u32) -> f32 {
        let mut bytes = [0; 4];
        bytes.copy_from_slice(&self.memory[address as usize..address as usize + 4]);
        f32::from_bits(u32::from_le_bytes(bytes))
    }

    pub fn write_i32(&mut self, address: u32, value: i32) {
        self.memory[address as usize..address as usize + 4]
            .copy_from_slice(&value.to_le_bytes());
    }

    pub fn read_i32(&self, address: u32) -> i32 {
        let mut bytes = [0; 4];
        bytes.copy_from_slice(&self.memory[address as usize..address as usize + 4]);
        i32::from_le_bytes(bytes)
    }

    fn value_of(&self, id: Id) -> Result<Value> {
        if let Some(&value) = self.values.get(&id) {
            return Ok(value);
        }
        if let Some(constant) = self.module.constants.get(&id) {
            return match constant.value {
                ConstantValue::Bool(v) => Ok(Value::Bool(v)),
                ConstantValue::I32(v) => Ok(Value::I32(v)),
                ConstantValue::U32(v) => Ok(Value::U32(v)),
                ConstantValue::F32(v) => Ok(Value::F32(v)),
                ConstantValue::Composite(_) => Err(Error::Type(format!(
                    "composite constant {} used as a scalar",
                    id
                ))),
            };
        }
        Err(Error::Invariant(format!("use of undefined register {}", id)))
    }

    fn set(&mut self, id: Id, value: Value) {
        self.values.insert(id, value);
    }

    /// The φ assignments for one edge happen in parallel: read all sources
    /// before writing any destination.
    fn run_edge_phis(&mut self, from: BlockId, to: BlockId) -> Result<()> {
        let copies = phi::copies_for_edge(self.module, from, to);
        let mut staged = Vec::with_capacity(copies.len());
        for (dst, src) in copies {
            staged.push((dst, self.value_of(src)?));
        }
        for (dst, value) in staged {
            self.set(dst, value);
        }
        Ok(())
    }

    /// Execute the entry function to completion
    pub fn run(&mut self) -> Result<Outcome> {
        let main = self.module.main_function_id.ok_or_else(|| {
            Error::Unsupported("no entry point for the Fragment execution model".to_string())
        })?;
        let mut block_of: Vec<BlockId> = vec![0; self.module.linear.len()];
        for (&block_id, block) in self.module.blocks.iter() {
            for pc in block.begin..block.end {
                block_of[pc] = block_id;
            }
        }

        let mut pc = self.module.functions[&main].pc_start;
        let mut steps = 0u32;
        loop {
            steps += 1;
            if steps > 1_000_000 {
                return Err(Error::Invariant(
                    "shader did not terminate".to_string(),
                ));
            }
            let node = self.module.linear[pc];
            let (op, result, result_type) = {
                let insn = &self.module.arena[node];
                (insn.op.clone(), insn.result_id(), insn.result_type)
            };
            match op {
                Op::Phi { .. } => {
                    // Assigned when the edge into this block was taken.
                    pc += 1;
                }
                Op::Branch { target } => {
                    self.run_edge_phis(block_of[pc], target)?;
                    pc = self.module.labels[&target];
                }
                Op::BranchConditional {
                    cond,
                    true_target,
                    false_target,
                } => {
                    let taken = if self.value_of(cond)?.as_bool()? {
                        true_target
                    } else {
                        false_target
                    };
                    self.run_edge_phis(block_of[pc], taken)?;
                    pc = self.module.labels[&taken];
                }
                Op::Return | Op::ReturnValue { .. } => return Ok(Outcome::Finished),
                Op::Kill => return Ok(Outcome::Killed),
                Op::Unreachable => {
                    return Err(Error::Invariant(
                        "reached an OpUnreachable".to_string(),
                    ))
                }
                Op::Load { pointer, offset } => {
                    let address = self.module.pointer_address(pointer).ok_or_else(|| {
                        Error::Type(format!("load through unresolved pointer r{}", pointer))
                    })? + offset;
                    let kind = result_type
                        .map(|ty| self.module.types.get(ty).map(|t| t.kind.clone()))
                        .transpose()?
                        .ok_or_else(|| Error::Type("untyped load".to_string()))?;
                    let value = match kind {
                        TypeKind::Float { .. } => Value::F32(self.read_f32(address)),
                        TypeKind::Int { signed: true, .. } => Value::I32(self.read_i32(address)),
                        TypeKind::Int { signed: false, .. } => {
                            Value::U32(self.read_i32(address) as u32)
                        }
                        TypeKind::Bool => Value::Bool(self.memory[address as usize] != 0),
                        other => {
                            return Err(Error::Type(format!(
                                "scalar load of {:?}",
                                other
                            )))
                        }
                    };
                    self.set(result.unwrap(), value);
                    pc += 1;
                }
                Op::Store { pointer, object, offset } => {
                    let address = self.module.pointer_address(pointer).ok_or_else(|| {
                        Error::Type(format!("store through unresolved pointer r{}", pointer))
                    })? + offset;
                    match self.value_of(object)? {
                        Value::F32(v) => self.write_f32(address, v),
                        Value::I32(v) => self.write_i32(address, v),
                        Value::U32(v) => self.write_i32(address, v as i32),
                        Value::Bool(v) => self.memory[address as usize] = v as u8,
                    }
                    pc += 1;
                }
                Op::AddImm { src, imm } => {
                    let value = self.value_of(src)?.as_i32()?;
                    self.set(result.unwrap(), Value::I32(value.wrapping_add(imm)));
                    pc += 1;
                }
                Op::Unary { kind, src } => {
                    let value = self.eval_unary(kind, self.value_of(src)?, result_type)?;
                    self.set(result.unwrap(), value);
                    pc += 1;
                }
                Op::Binary { kind, lhs, rhs } => {
                    let value =
                        self.eval_binary(kind, self.value_of(lhs)?, self.value_of(rhs)?)?;
                    self.set(result.unwrap(), value);
                    pc += 1;
                }
                Op::Ternary { kind, a, b, c } => {
                    let value = self.eval_ternary(
                        kind,
                        self.value_of(a)?,
                        self.value_of(b)?,
                        self.value_of(c)?,
                    )?;
                    self.set(result.unwrap(), value);
                    pc += 1;
                }
                other => {
                    return Err(Error::Unimplemented(format!(
                        "{} in the interpreter",
                        other.name()
                    )))
                }
            }
        }
    }

    fn eval_unary(&self, kind: UnOp, value: Value, result_type: Option<u32>) -> Result<Value> {
        Ok(match kind {
            UnOp::FNegate => Value::F32(-value.as_f32()?),
            UnOp::SNegate => Value::I32(value.as_i32()?.wrapping_neg()),
            UnOp::LogicalNot => Value::Bool(!value.as_bool()?),
            UnOp::ConvertFToS => Value::I32(value.as_f32()? as i32),
            UnOp::ConvertFToU => Value::U32(value.as_f32()? as u32),
            UnOp::ConvertSToF => Value::F32(value.as_i32()? as f32),
            UnOp::ConvertUToF => Value::F32(value.as_u32()? as f32),
            UnOp::Bitcast => {
                let float_result = result_type
                    .and_then(|ty| self.module.types.is_float(ty).ok())
                    .unwrap_or(false);
                match (value, float_result) {
                    (Value::F32(v), false) => Value::U32(v.to_bits()),
                    (Value::I32(v), true) => Value::F32(f32::from_bits(v as u32)),
                    (Value::U32(v), true) => Value::F32(f32::from_bits(v)),
                    (other, _) => other,
                }
            }
            UnOp::CopyObject => value,
            UnOp::Round => Value::F32(value.as_f32()?.round()),
            UnOp::Trunc => Value::F32(value.as_f32()?.trunc()),
            UnOp::FAbs => Value::F32(value.as_f32()?.abs()),
            UnOp::SAbs => Value::I32(value.as_i32()?.wrapping_abs()),
            UnOp::FSign => {
                let v = value.as_f32()?;
                Value::F32(if v > 0.0 {
                    1.0
                } else if v < 0.0 {
                    -1.0
                } else {
                    0.0
                })
            }
            UnOp::Floor => Value::F32(value.as_f32()?.floor()),
            UnOp::Ceil => Value::F32(value.as_f32()?.ceil()),
            UnOp::Fract => {
                let v = value.as_f32()?;
                Value::F32(v - v.floor())
            }
            UnOp::Radians => Value::F32(value.as_f32()? * PI / 180.0),
            UnOp::Degrees => Value::F32(value.as_f32()? * 180.0 / PI),
            UnOp::Sin => Value::F32(value.as_f32()?.sin()),
            UnOp::Cos => Value::F32(value.as_f32()?.cos()),
            UnOp::Tan => Value::F32(value.as_f32()?.tan()),
            UnOp::Asin => Value::F32(value.as_f32()?.asin()),
            UnOp::Acos => Value::F32(value.as_f32()?.acos()),
            UnOp::Atan => Value::F32(value.as_f32()?.atan()),
            UnOp::Exp => Value::F32(value.as_f32()?.exp()),
            UnOp::Log => Value::F32(value.as_f32()?.ln()),
            UnOp::Exp2 => Value::F32(value.as_f32()?.exp2()),
            UnOp::Log2 => Value::F32(value.as_f32()?.log2()),
            UnOp::Sqrt => Value::F32(value.as_f32()?.sqrt()),
            UnOp::InverseSqrt => Value::F32(1.0 / value.as_f32()?.sqrt()),
        })
    }

    fn eval_binary(&self, kind: BinOp, lhs: Value, rhs: Value) -> Result<Value> {
        let int_div = |a: i32, b: i32| -> Result<i32> {
            a.checked_div(b)
                .ok_or_else(|| Error::Invariant("integer division by zero".to_string()))
        };
        Ok(match kind {
            BinOp::FAdd => Value::F32(lhs.as_f32()? + rhs.as_f32()?),
            BinOp::FSub => Value::F32(lhs.as_f32()? - rhs.as_f32()?),
            BinOp::FMul => Value::F32(lhs.as_f32()? * rhs.as_f32()?),
            BinOp::FDiv => Value::F32(lhs.as_f32()? / rhs.as_f32()?),
            BinOp::FMod => {
                let (a, b) = (lhs.as_f32()?, rhs.as_f32()?);
                Value::F32(a - b * (a / b).trunc())
            }
            BinOp::IAdd => Value::I32(lhs.as_i32()?.wrapping_add(rhs.as_i32()?)),
            BinOp::ISub => Value::I32(lhs.as_i32()?.wrapping_sub(rhs.as_i32()?)),
            BinOp::IMul => Value::I32(lhs.as_i32()?.wrapping_mul(rhs.as_i32()?)),
            BinOp::SDiv => Value::I32(int_div(lhs.as_i32()?, rhs.as_i32()?)?),
            BinOp::SRem | BinOp::SMod => {
                let (a, b) = (lhs.as_i32()?, rhs.as_i32()?);
                if b == 0 {
                    return Err(Error::Invariant("integer division by zero".to_string()));
                }
                Value::I32(a.wrapping_rem(b))
            }
            BinOp::UDiv => {
                let (a, b) = (lhs.as_u32()?, rhs.as_u32()?);
                if b == 0 {
                    return Err(Error::Invariant("integer division by zero".to_string()));
                }
                Value::U32(a / b)
            }
            BinOp::UMod => {
                let (a, b) = (lhs.as_u32()?, rhs.as_u32()?);
                if b == 0 {
                    return Err(Error::Invariant("integer division by zero".to_string()));
                }
                Value::U32(a % b)
            }
            BinOp::LogicalAnd => Value::Bool(lhs.as_bool()? && rhs.as_bool()?),
            BinOp::LogicalOr => Value::Bool(lhs.as_bool()? || rhs.as_bool()?),
            BinOp::FOrdEqual => Value::Bool(lhs.as_f32()? == rhs.as_f32()?),
            BinOp::FOrdNotEqual => Value::Bool(lhs.as_f32()? != rhs.as_f32()?),
            BinOp::FOrdLessThan => Value::Bool(lhs.as_f32()? < rhs.as_f32()?),
            BinOp::FOrdGreaterThan => Value::Bool(lhs.as_f32()? > rhs.as_f32()?),
            BinOp::FOrdLessThanEqual => Value::Bool(lhs.as_f32()? <= rhs.as_f32()?),
            BinOp::FOrdGreaterThanEqual => Value::Bool(lhs.as_f32()? >= rhs.as_f32()?),
            BinOp::IEqual => Value::Bool(lhs.as_i32()? == rhs.as_i32()?),
            BinOp::INotEqual => Value::Bool(lhs.as_i32()? != rhs.as_i32()?),
            BinOp::SLessThan => Value::Bool(lhs.as_i32()? < rhs.as_i32()?),
            BinOp::SGreaterThan => Value::Bool(lhs.as_i32()? > rhs.as_i32()?),
            BinOp::SLessThanEqual => Value::Bool(lhs.as_i32()? <= rhs.as_i32()?),
            BinOp::SGreaterThanEqual => Value::Bool(lhs.as_i32()? >= rhs.as_i32()?),
            BinOp::ULessThan => Value::Bool(lhs.as_u32()? < rhs.as_u32()?),
            BinOp::UGreaterThan => Value::Bool(lhs.as_u32()? > rhs.as_u32()?),
            BinOp::ULessThanEqual => Value::Bool(lhs.as_u32()? <= rhs.as_u32()?),
            BinOp::UGreaterThanEqual => Value::Bool(lhs.as_u32()? >= rhs.as_u32()?),
            BinOp::Atan2 => Value::F32(lhs.as_f32()?.atan2(rhs.as_f32()?)),
            BinOp::Pow => Value::F32(lhs.as_f32()?.powf(rhs.as_f32()?)),
            BinOp::FMin => Value::F32(lhs.as_f32()?.min(rhs.as_f32()?)),
            BinOp::FMax => Value::F32(lhs.as_f32()?.max(rhs.as_f32()?)),
            BinOp::Step => {
                // step(edge, x)
                Value::F32(if rhs.as_f32()? < lhs.as_f32()? { 0.0 } else { 1.0 })
            }
        })
    }

    fn eval_ternary(&self, kind: TernOp, a: Value, b: Value, c: Value) -> Result<Value> {
        Ok(match kind {
            TernOp::Select => {
                if a.as_bool()? {
                    b
                } else {
                    c
                }
            }
            TernOp::FClamp => Value::F32(a.as_f32()?.max(b.as_f32()?).min(c.as_f32()?)),
            TernOp::FMix => {
                let (x, y, t) = (a.as_f32()?, b.as_f32()?, c.as_f32()?);
                Value::F32(x * (1.0 - t) + y * t)
            }
            TernOp::SmoothStep => {
                let (edge0, edge1, x) = (a.as_f32()?, b.as_f32()?, c.as_f32()?);
                let t = ((x - edge0) / (edge1 - edge0)).max(0.0).min(1.0);
                Value::F32(t * t * (3.0 - 2.0 * t))
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::{linearize, peephole};
    use crate::liveness::compute_liveness;
    use crate::parse::parse_words;
    use crate::spv::op;
    use crate::spvasm::ShaderBuilder;
    use crate::{cfg, phi, scalarize};

    fn prepare(words: &[u32]) -> Module {
        let mut module = parse_words(words, true).unwrap();
        cfg::compute_cfg(&mut module).unwrap();
        phi::validate_phis(&module).unwrap();
        scalarize::expand_vectors(&mut module).unwrap();
        linearize(&mut module);
        peephole(&mut module);
        compute_liveness(&mut module).unwrap();
        module
    }

    #[test]
    fn uv_shader_divides_coordinates() {
        let mut shader = ShaderBuilder::new();
        let half = shader.const_f32(0.5);
        let one = shader.const_f32(1.0);
        let coord = shader.variable(1, shader.ty_vec4, Some("gl_FragCoord"));
        let res = shader.variable(2, shader.ty_vec2, Some("iResolution"));
        let output = shader.variable(3, shader.ty_vec4, Some("gl_FragColor"));
        shader.begin_main();
        let coord_value = shader.load(shader.ty_vec4, coord);
        let xy = shader.emit(
            op::VECTOR_SHUFFLE,
            shader.ty_vec2,
            &[coord_value, coord_value, 0, 1],
        );
        let res_value = shader.load(shader.ty_vec2, res);
        let uv = shader.emit(op::F_DIV, shader.ty_vec2, &[xy, res_value]);
        let color = shader.emit(
            op::COMPOSITE_CONSTRUCT,
            shader.ty_vec4,
            &[uv, half, one],
        );
        shader.store(output, color);
        shader.ret();
        let module = prepare(&shader.finish());

        let mut interp = Interpreter::new(&module);
        let coord_addr = module.variables[&coord].address;
        let res_addr = module.variables[&res].address;
        interp.write_f32(coord_addr, 128.0);
        interp.write_f32(coord_addr + 4, 64.0);
        interp.write_f32(res_addr, 256.0);
        interp.write_f32(res_addr + 4, 256.0);
        assert_eq!(interp.run().unwrap(), Outcome::Finished);

        let out_addr = module.variables[&output].address;
        assert_eq!(interp.read_f32(out_addr), 0.5);
        assert_eq!(interp.read_f32(out_addr + 4), 0.25);
        assert_eq!(interp.read_f32(out_addr + 8), 0.5);
        assert_eq!(interp.read_f32(out_addr + 12), 1.0);
    }

    #[test]
    fn branchy_phi_picks_the_right_value() {
        let build = |seed: f32| {
            let mut shader = ShaderBuilder::new();
            let one = shader.const_f32(1.0);
            let two = shader.const_f32(2.0);
            let threshold = shader.const_f32(0.5);
            let input = shader.variable(1, shader.ty_float, Some("u"));
            let output = shader.variable(3, shader.ty_float, Some("result"));
            shader.begin_main();
            let u = shader.load(shader.ty_float, input);
            let cond = shader.emit(op::F_ORD_LESS_THAN, shader.ty_bool, &[u, threshold]);
            let (then_block, else_block, merge) = (shader.id(), shader.id(), shader.id());
            shader.branch_cond(cond, then_block, else_block);
            shader.label(then_block);
            shader.branch(merge);
            shader.label(else_block);
            shader.branch(merge);
            shader.label(merge);
            let merged = shader.phi(shader.ty_float, &[(one, then_block), (two, else_block)]);
            shader.store(output, merged);
            shader.ret();
            let module = prepare(&shader.finish());
            let input_addr = module.variables[&input].address;
            let output_addr = module.variables[&output].address;
            let mut interp = Interpreter::new(&module);
            interp.write_f32(input_addr, seed);
            interp.run().unwrap();
            interp.read_f32(output_addr)
        };
        assert_eq!(build(0.25), 1.0);
        assert_eq!(build(0.75), 2.0);
    }

    #[test]
    fn loop_counts_to_ten() {
        let mut shader = ShaderBuilder::new();
        let zero = shader.const_i32(0);
        let one = shader.const_i32(1);
        let ten = shader.const_i32(10);
        let entry = shader.begin_main();
        let (header, body, exit) = (shader.id(), shader.id(), shader.id());
        let next = shader.id();
        shader.branch(header);
        shader.label(header);
        let counter = shader.phi(shader.ty_int, &[(zero, entry), (next, body)]);
        let cond = shader.emit(op::S_LESS_THAN, shader.ty_bool, &[counter, ten]);
        shader.branch_cond(cond, body, exit);
        shader.label(body);
        shader.raw_op(op::I_ADD, &[shader.ty_int, next, counter, one]);
        shader.branch(header);
        shader.label(exit);
        shader.ret();
        let module = prepare(&shader.finish());

        let mut interp = Interpreter::new(&module);
        assert_eq!(interp.run().unwrap(), Outcome::Finished);
        // The loop-carried value settles at the bound.
        assert_eq!(interp.values[&counter], Value::I32(10));
    }

    #[test]
    fn folded_add_immediate_still_adds() {
        let mut shader = ShaderBuilder::new();
        let five = shader.const_i32(5);
        let input = shader.variable(2, shader.ty_int, Some("n"));
        let output = shader.variable(3, shader.ty_int, Some("result"));
        shader.begin_main();
        let n = shader.load(shader.ty_int, input);
        let sum = shader.emit(op::I_ADD, shader.ty_int, &[n, five]);
        shader.store(output, sum);
        shader.ret();
        let module = prepare(&shader.finish());

        // The peephole must have fired.
        assert!(module
            .linear
            .iter()
            .any(|&node| matches!(module.arena[node].op, Op::AddImm { imm: 5, .. })));

        let mut interp = Interpreter::new(&module);
        interp.write_i32(module.variables[&input].address, 37);
        interp.run().unwrap();
        assert_eq!(interp.read_i32(module.variables[&output].address), 42);
    }

    #[test]
    fn kill_discards_the_fragment() {
        let mut shader = ShaderBuilder::new();
        shader.begin_main();
        shader.raw_op(op::KILL, &[]);
        let module = prepare(&shader.finish());
        let mut interp = Interpreter::new(&module);
        assert_eq!(interp.run().unwrap(), Outcome::Killed);
    }
}
