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

//! The compilation driver: a strict pipeline from parsed module to emitted
//! assembly. Each stage consumes its predecessor's output to completion.

use std::collections::BTreeMap;
use std::io;
use std::mem;

use crate::ir::{BinOp, BlockId, Id, Instruction, Op, TypeId};
use crate::module::Module;
use crate::{cfg, liveness, phi, scalarize, Result};

/// One virtual register's placement: `lane_count` physical registers
/// pinned together, one per scalar lane
#[derive(Debug, Clone)]
pub struct CompilerRegister {
    pub type_id: TypeId,
    pub lane_count: u32,
    /// Physical register IDs, one per lane; integer file is 0..32,
    /// float file is 32..64
    pub phy: Vec<u32>,
}

/// Lowers a transformed [`Module`] to assembly text.
pub struct Compiler<'a> {
    pub(crate) module: &'a Module,
    /// Virtual register ID to placement
    pub(crate) registers: BTreeMap<Id, CompilerRegister>,
    /// Block each linear PC belongs to
    pub(crate) block_of: Vec<BlockId>,
    pub(crate) local_label_counter: u32,
}

impl<'a> Compiler<'a> {
    pub fn new(module: &'a Module) -> Compiler<'a> {
        let mut block_of = vec![0; module.linear.len()];
        for (&block_id, block) in module.blocks.iter() {
            for pc in block.begin..block.end {
                block_of[pc] = block_id;
            }
        }
        Compiler {
            module,
            registers: BTreeMap::new(),
            block_of,
            local_label_counter: 0,
        }
    }

    pub(crate) fn make_local_label(&mut self) -> String {
        let label = format!("local{}", self.local_label_counter);
        self.local_label_counter += 1;
        label
    }

    pub fn register(&self, id: Id) -> Option<&CompilerRegister> {
        self.registers.get(&id)
    }
}

/// Fix the flat PC order: functions in declaration order, blocks in
/// declaration order within each function. Fills block ranges, function
/// starts, and the label map.
pub fn linearize(module: &mut Module) {
    module.linear.clear();
    module.labels.clear();
    let function_ids: Vec<Id> = module.functions.keys().copied().collect();
    for function_id in function_ids {
        let block_ids = module.functions[&function_id].block_ids.clone();
        for &block_id in &block_ids {
            let begin = module.linear.len();
            let nodes = module.blocks[&block_id].instructions.refs(&module.arena);
            module.linear.extend(nodes);
            let end = module.linear.len();
            let block = module.blocks.get_mut(&block_id).unwrap();
            block.begin = begin;
            block.end = end;
            module.labels.insert(block_id, begin);
        }
        let entry = module.functions[&function_id].entry_block;
        let pc_start = module.blocks[&entry].begin;
        module.functions.get_mut(&function_id).unwrap().pc_start = pc_start;
    }
}

/// Fold integer adds with a small constant operand into add-immediate.
/// The immediate is normalized to the second operand; result, type, and
/// line info carry over. Idempotent: `AddImm` is never revisited.
pub fn peephole(module: &mut Module) {
    for pc in 0..module.linear.len() {
        let node = module.linear[pc];
        let (lhs, rhs) = match module.arena[node].op {
            Op::Binary {
                kind: BinOp::IAdd,
                lhs,
                rhs,
            } => (lhs, rhs),
            _ => continue,
        };
        let fits = |id: Id| {
            module
                .as_integer_constant(id)
                .map(|value| value as i32)
                .filter(|&value| (-2048..=2047).contains(&value))
        };
        let (src, imm) = match (fits(rhs), fits(lhs)) {
            (Some(imm), _) => (lhs, imm),
            (None, Some(imm)) => (rhs, imm),
            (None, None) => continue,
        };

        let line = module.arena[node].line;
        let result_type = module.arena[node].result_type;
        let result = module.arena[node].result_id();
        let replacement = module
            .arena
            .alloc(Instruction::new(line, result_type, result, Op::AddImm { src, imm }));

        let block_id = {
            // The owning block is the one whose range covers this pc.
            *module
                .blocks
                .iter()
                .find(|(_, block)| block.begin <= pc && pc < block.end)
                .map(|(id, _)| id)
                .unwrap()
        };
        let placeholder = module.arena.new_list();
        let mut list = mem::replace(
            &mut module.blocks.get_mut(&block_id).unwrap().instructions,
            placeholder,
        );
        list.insert_before(&mut module.arena, replacement, node);
        list.remove(&mut module.arena, node);
        module.blocks.get_mut(&block_id).unwrap().instructions = list;
        module.linear[pc] = replacement;
    }
}

/// Run the whole pipeline over a parsed module and write the assembly
/// listing to `out`. `library` is appended verbatim after the constant
/// sections.
pub fn compile_to(
    module: &mut Module,
    out: &mut dyn io::Write,
    library: &str,
) -> Result<()> {
    cfg::compute_cfg(module)?;
    phi::validate_phis(module)?;
    scalarize::expand_vectors(module)?;
    linearize(module);
    peephole(module);
    liveness::compute_liveness(module)?;

    let mut compiler = Compiler::new(module);
    compiler.assign_registers()?;
    compiler.emit_module(out, library)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::parse_words;
    use crate::spv::op;
    use crate::spvasm::ShaderBuilder;
    use crate::Error;

    fn compile(words: &[u32]) -> String {
        let mut module = parse_words(words, true).unwrap();
        let mut out = Vec::new();
        compile_to(&mut module, &mut out, "").unwrap();
        String::from_utf8(out).unwrap()
    }

    fn count_lines_with(text: &str, needle: &str) -> usize {
        text.lines().filter(|line| line.contains(needle)).count()
    }

    /// A mnemonic occurrence counter that ignores comments
    fn count_mnemonic(text: &str, mnemonic: &str) -> usize {
        text.lines()
            .filter(|line| {
                let code = line.split(';').next().unwrap_or("");
                code.trim_start().starts_with(mnemonic)
            })
            .count()
    }

    #[test]
    fn empty_shader_emits_prologue_label_and_return() {
        let mut shader = ShaderBuilder::new();
        shader.begin_main();
        shader.ret();
        let text = compile(&shader.finish());

        assert!(text.contains("jal ra, main"));
        assert!(text.contains("ebreak"));
        assert!(text.contains("main:"));
        assert_eq!(count_mnemonic(&text, "jalr"), 1);
        assert_eq!(count_lines_with(&text, ".word"), 0);
    }

    #[test]
    fn constant_color_shader_stores_four_lanes() {
        // gl_FragColor = vec4(0.0, 1.0, 0.0, 1.0);
        let mut shader = ShaderBuilder::new();
        let zero = shader.const_f32(0.0);
        let one = shader.const_f32(1.0);
        let color = shader.const_composite(shader.ty_vec4, &[zero, one, zero, one]);
        let output = shader.variable(3, shader.ty_vec4, Some("gl_FragColor"));
        shader.begin_main();
        shader.store(output, color);
        shader.ret();
        let text = compile(&shader.finish());

        // Four stores to the output, no adds, no phi copies.
        assert_eq!(count_mnemonic(&text, "fsw"), 4);
        assert!(text.contains("gl_FragColor"));
        assert_eq!(count_mnemonic(&text, "fadd.s"), 0);
        assert_eq!(count_mnemonic(&text, "add"), 0);
        assert_eq!(count_lines_with(&text, "phi elimination"), 0);
        // The composite unpacks to four data words: 0, 1, 0, 1.
        let composite_words: Vec<&str> = text
            .lines()
            .skip_while(|line| !line.starts_with(".C"))
            .filter(|line| line.contains(".word"))
            .collect();
        assert!(composite_words.len() >= 4);
        // Scalar constants loaded into float registers at function entry.
        assert_eq!(count_mnemonic(&text, "flw"), 2);
    }

    #[test]
    fn uv_shader_loads_divides_and_stores() {
        // gl_FragColor = vec4(coord.xy / res.xy, 0.5, 1.0)
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
        let text = compile(&shader.finish());

        assert_eq!(count_mnemonic(&text, "fdiv.s"), 2);
        assert_eq!(count_mnemonic(&text, "fsw"), 4);
        // Two pinned constants (0.5 and 1.0) loaded at entry, plus the
        // six input lane loads.
        assert_eq!(count_lines_with(&text, "Load constant"), 2);
        assert!(text.contains("gl_FragCoord"));
        assert!(text.contains("iResolution"));
    }

    #[test]
    fn if_else_phi_emits_movs_before_branches() {
        // a = cond ? 1.0 : 2.0, stored out through a phi at the merge.
        let mut shader = ShaderBuilder::new();
        let one = shader.const_f32(1.0);
        let two = shader.const_f32(2.0);
        let threshold = shader.const_f32(0.5);
        let coord = shader.variable(1, shader.ty_float, Some("u"));
        let output = shader.variable(3, shader.ty_float, Some("result"));
        shader.begin_main();
        let u = shader.load(shader.ty_float, coord);
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
        let text = compile(&shader.finish());

        assert_eq!(count_lines_with(&text, "phi elimination"), 2);
        assert!(text.contains("label"));
        assert_eq!(count_mnemonic(&text, "bne"), 1);
        // Both branch blocks jump to the merge label.
        assert!(count_mnemonic(&text, "jal") >= 3);
    }

    #[test]
    fn small_constant_add_folds_to_addi() {
        let mut shader = ShaderBuilder::new();
        let five = shader.const_i32(5);
        let ptr_int = shader.variable(2, shader.ty_int, Some("counter"));
        let output = shader.variable(3, shader.ty_int, Some("result"));
        shader.begin_main();
        let value = shader.load(shader.ty_int, ptr_int);
        let sum = shader.emit(op::I_ADD, shader.ty_int, &[value, five]);
        shader.store(output, sum);
        shader.ret();
        let text = compile(&shader.finish());

        assert_eq!(count_mnemonic(&text, "addi"), 1);
        assert!(text.contains(", 5"));
        // The folded constant is never loaded from the pool.
        assert_eq!(count_lines_with(&text, "Load constant"), 0);
        // And no plain add remains.
        assert_eq!(count_mnemonic(&text, "add "), 0);
    }

    #[test]
    fn constant_on_the_left_also_folds() {
        let mut shader = ShaderBuilder::new();
        let five = shader.const_i32(5);
        let input = shader.variable(2, shader.ty_int, Some("counter"));
        shader.begin_main();
        let value = shader.load(shader.ty_int, input);
        let _ = shader.emit(op::I_ADD, shader.ty_int, &[five, value]);
        shader.ret();
        let text = compile(&shader.finish());
        assert_eq!(count_mnemonic(&text, "addi"), 1);
    }

    #[test]
    fn large_constant_add_does_not_fold() {
        let mut shader = ShaderBuilder::new();
        let big = shader.const_i32(4096);
        let input = shader.variable(2, shader.ty_int, Some("counter"));
        let output = shader.variable(3, shader.ty_int, Some("result"));
        shader.begin_main();
        let value = shader.load(shader.ty_int, input);
        let sum = shader.emit(op::I_ADD, shader.ty_int, &[value, big]);
        shader.store(output, sum);
        shader.ret();
        let text = compile(&shader.finish());
        assert_eq!(count_mnemonic(&text, "addi"), 0);
        assert_eq!(count_mnemonic(&text, "add"), 1);
        // 4096 must come from the constant pool instead.
        assert_eq!(count_lines_with(&text, "Load constant"), 1);
    }

    #[test]
    fn peephole_is_idempotent() {
        let mut shader = ShaderBuilder::new();
        let five = shader.const_i32(5);
        let input = shader.variable(2, shader.ty_int, Some("counter"));
        shader.begin_main();
        let value = shader.load(shader.ty_int, input);
        let _ = shader.emit(op::I_ADD, shader.ty_int, &[value, five]);
        shader.ret();

        let mut module = parse_words(&shader.finish(), true).unwrap();
        cfg::compute_cfg(&mut module).unwrap();
        phi::validate_phis(&module).unwrap();
        scalarize::expand_vectors(&mut module).unwrap();
        linearize(&mut module);
        peephole(&mut module);
        let first: Vec<Op> = module
            .linear
            .iter()
            .map(|&node| module.arena[node].op.clone())
            .collect();
        peephole(&mut module);
        let second: Vec<Op> = module
            .linear
            .iter()
            .map(|&node| module.arena[node].op.clone())
            .collect();
        assert_eq!(first, second);
        assert!(first
            .iter()
            .any(|op| matches!(op, Op::AddImm { imm: 5, .. })));
    }

    #[test]
    fn vec4_scale_emits_four_muls_on_one_scalar() {
        let mut shader = ShaderBuilder::new();
        let scale = shader.const_f32(2.0);
        let input = shader.variable(1, shader.ty_vec4, Some("a"));
        let output = shader.variable(3, shader.ty_vec4, Some("color"));
        shader.begin_main();
        let value = shader.load(shader.ty_vec4, input);
        let scaled = shader.emit(
            op::VECTOR_TIMES_SCALAR,
            shader.ty_vec4,
            &[value, scale],
        );
        shader.store(output, scaled);
        shader.ret();
        let text = compile(&shader.finish());

        assert_eq!(count_mnemonic(&text, "fmul.s"), 4);
        // The scalar is pinned once and reused as the second operand of
        // every multiply.
        let mul_lines: Vec<&str> = text
            .lines()
            .filter(|line| line.trim_start().starts_with("fmul.s"))
            .collect();
        let last_operand = |line: &str| {
            line.split(';')
                .next()
                .unwrap()
                .trim()
                .rsplit(", ")
                .next()
                .unwrap()
                .to_string()
        };
        let first = last_operand(mul_lines[0]);
        assert!(mul_lines.iter().all(|line| last_operand(line) == first));
        // Four distinct destination registers.
        let destinations: std::collections::BTreeSet<String> = mul_lines
            .iter()
            .map(|line| {
                line.trim_start()
                    .trim_start_matches("fmul.s")
                    .trim()
                    .split(',')
                    .next()
                    .unwrap()
                    .to_string()
            })
            .collect();
        assert_eq!(destinations.len(), 4);
    }

    #[test]
    fn missing_fragment_entry_point_fails_before_emission() {
        let mut shader = ShaderBuilder::with_execution_model(0);
        shader.begin_main();
        shader.ret();
        let result = parse_words(&shader.finish(), true);
        assert!(matches!(result, Err(Error::Unsupported(_))));
    }

    #[test]
    fn library_text_is_appended_verbatim() {
        let mut shader = ShaderBuilder::new();
        shader.begin_main();
        shader.ret();
        let mut module = parse_words(&shader.finish(), true).unwrap();
        let mut out = Vec::new();
        compile_to(&mut module, &mut out, ".sin:\n        jalr x0, ra, 0\n").unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.ends_with(".sin:\n        jalr x0, ra, 0\n"));
    }

    #[test]
    fn emitted_lines_follow_the_column_contract() {
        let mut shader = ShaderBuilder::new();
        let zero = shader.const_f32(0.0);
        let output = shader.variable(3, shader.ty_float, Some("out"));
        shader.begin_main();
        shader.store(output, zero);
        shader.ret();
        let text = compile(&shader.finish());

        for line in text.lines() {
            if line.is_empty() || line.starts_with(';') {
                continue;
            }
            if line.ends_with(':') {
                // Labels sit at column 0.
                assert!(!line.starts_with(' '));
            } else {
                assert!(line.starts_with("        "), "bad indent: {:?}", line);
                if let Some(comment) = line.find(';') {
                    // Mnemonic field is padded to column 38.
                    assert!(comment >= 38, "comment before column 38: {:?}", line);
                }
            }
        }
    }
}
