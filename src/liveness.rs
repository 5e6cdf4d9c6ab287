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

//! Backward liveness over the linearized stream.
//!
//! Live-in sets are keyed by the block control came from: a φ files each
//! incoming value under its predecessor's key, everything else lands under
//! [`ANY_BLOCK`]. A terminator branching to block `b` collects, from `b`'s
//! head φ run, the values keyed by the terminator's own block plus the head's
//! any-predecessor set, so a value only stays live along the edges that
//! actually carry it.

use std::collections::{BTreeMap, BTreeSet};

use crate::ir::{BlockId, Id, Op, ANY_BLOCK};
use crate::module::Module;
use crate::{Error, Result};

/// Compute per-instruction live-in and live-out sets, to a fixed point.
pub fn compute_liveness(module: &mut Module) -> Result<()> {
    let count = module.linear.len();
    if count == 0 {
        return Ok(());
    }

    let mut block_of: Vec<BlockId> = vec![0; count];
    for (&block_id, block) in module.blocks.iter() {
        for pc in block.begin..block.end {
            block_of[pc] = block_id;
        }
    }

    for &node in &module.linear {
        let insn = &mut module.arena[node];
        insn.livein.clear();
        insn.liveout.clear();
        insn.dirty = true;
    }

    let max_sweeps = 4 * count + 32;
    let mut sweeps = 0;
    loop {
        let mut changed = false;
        for pc in (0..count).rev() {
            let node = module.linear[pc];
            if !module.arena[node].dirty {
                continue;
            }

            let liveout = compute_liveout(module, &block_of, pc);
            let livein = compute_livein(module, pc, &liveout);

            let insn = &module.arena[node];
            let unchanged = insn.liveout == liveout && insn.livein == livein;
            let insn = &mut module.arena[node];
            insn.dirty = false;
            if unchanged {
                continue;
            }
            insn.liveout = liveout;
            insn.livein = livein;
            changed = true;

            // Anything upstream of this instruction may now be stale.
            let block = &module.blocks[&block_of[pc]];
            if pc > block.begin {
                let prev = module.linear[pc - 1];
                module.arena[prev].dirty = true;
            } else {
                let pred_terminators: Vec<_> = block
                    .pred
                    .iter()
                    .map(|pred| module.linear[module.blocks[pred].end - 1])
                    .collect();
                for prev in pred_terminators {
                    module.arena[prev].dirty = true;
                }
            }
        }
        if !changed {
            break;
        }
        sweeps += 1;
        if sweeps > max_sweeps {
            return Err(Error::Invariant(
                "liveness did not converge".to_string(),
            ));
        }
    }
    Ok(())
}

/// What a branch from `from` into the block headed at `head_pc` carries:
/// the head's any-predecessor set plus every φ-run value keyed by `from`.
fn edge_livein(
    module: &Module,
    block_of: &[BlockId],
    head_pc: usize,
    from: BlockId,
) -> BTreeSet<Id> {
    let mut live = BTreeSet::new();
    let head = &module.arena[module.linear[head_pc]];
    if let Some(set) = head.livein.get(&ANY_BLOCK) {
        live.extend(set.iter().copied());
    }
    if let Some(set) = head.livein.get(&from) {
        live.extend(set.iter().copied());
    }
    if matches!(head.op, Op::Phi { .. }) {
        let mut pc = head_pc + 1;
        while pc < module.linear.len() && block_of[pc] == block_of[head_pc] {
            let insn = &module.arena[module.linear[pc]];
            if !matches!(insn.op, Op::Phi { .. }) {
                break;
            }
            if let Some(set) = insn.livein.get(&from) {
                live.extend(set.iter().copied());
            }
            pc += 1;
        }
    }
    live
}

fn compute_liveout(module: &Module, block_of: &[BlockId], pc: usize) -> BTreeSet<Id> {
    let insn = &module.arena[module.linear[pc]];
    let mut liveout = BTreeSet::new();
    if insn.op.is_terminator() {
        for &target in insn.targets.iter() {
            if let Some(&head_pc) = module.labels.get(&target) {
                liveout.extend(edge_livein(module, block_of, head_pc, block_of[pc]));
            }
        }
    } else {
        let next = &module.arena[module.linear[pc + 1]];
        if let Some(set) = next.livein.get(&ANY_BLOCK) {
            liveout.extend(set.iter().copied());
        }
        if let Some(set) = next.livein.get(&block_of[pc]) {
            liveout.extend(set.iter().copied());
        }
    }
    liveout
}

fn compute_livein(
    module: &Module,
    pc: usize,
    liveout: &BTreeSet<Id>,
) -> BTreeMap<BlockId, BTreeSet<Id>> {
    let insn = &module.arena[module.linear[pc]];
    let pass: BTreeSet<Id> = liveout
        .iter()
        .copied()
        .filter(|id| !insn.affects_register(*id))
        .collect();
    let mut livein = BTreeMap::new();
    match &insn.op {
        Op::Phi { pairs } => {
            livein.insert(ANY_BLOCK, pass);
            for &(value, pred) in pairs.iter() {
                livein
                    .entry(pred)
                    .or_insert_with(BTreeSet::new)
                    .insert(value);
            }
        }
        _ => {
            let mut any = pass;
            any.extend(insn.arg_set().iter().copied());
            livein.insert(ANY_BLOCK, any);
        }
    }
    livein
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::{linearize, peephole};
    use crate::parse::parse_words;
    use crate::spv::op;
    use crate::spvasm::ShaderBuilder;
    use crate::{cfg, phi, scalarize};

    fn pipeline(words: &[u32]) -> Module {
        let mut module = parse_words(words, true).unwrap();
        cfg::compute_cfg(&mut module).unwrap();
        phi::validate_phis(&module).unwrap();
        scalarize::expand_vectors(&mut module).unwrap();
        linearize(&mut module);
        peephole(&mut module);
        compute_liveness(&mut module).unwrap();
        module
    }

    fn pc_of_op(module: &Module, pred: impl Fn(&Op) -> bool) -> usize {
        module
            .linear
            .iter()
            .position(|&node| pred(&module.arena[node].op))
            .expect("no instruction matched")
    }

    #[test]
    fn straight_line_ranges() {
        let mut shader = ShaderBuilder::new();
        let input = shader.variable(1, shader.ty_float, Some("u"));
        let output = shader.variable(3, shader.ty_float, Some("result"));
        shader.begin_main();
        let value = shader.load(shader.ty_float, input);
        let doubled = shader.emit(op::F_ADD, shader.ty_float, &[value, value]);
        shader.store(output, doubled);
        shader.ret();
        let module = pipeline(&shader.finish());

        let load_pc = pc_of_op(&module, |op| matches!(op, Op::Load { .. }));
        let add_pc = pc_of_op(&module, |op| matches!(op, Op::Binary { .. }));
        let store_pc = pc_of_op(&module, |op| matches!(op, Op::Store { .. }));

        let load = &module.arena[module.linear[load_pc]];
        assert!(load.liveout.contains(&value));
        assert!(!load.liveout.contains(&doubled));

        let add = &module.arena[module.linear[add_pc]];
        assert!(add.livein_all().contains(&value));
        assert!(add.liveout.contains(&doubled));
        // The loaded value dies at the add.
        assert!(!add.liveout.contains(&value));

        let store = &module.arena[module.linear[store_pc]];
        assert!(store.livein_all().contains(&doubled));
        assert!(store.liveout.is_empty());
    }

    #[test]
    fn constants_are_live_into_the_function() {
        let mut shader = ShaderBuilder::new();
        let half = shader.const_f32(0.5);
        let output = shader.variable(3, shader.ty_float, Some("result"));
        shader.begin_main();
        shader.store(output, half);
        shader.ret();
        let module = pipeline(&shader.finish());

        let main = module.main_function_id.unwrap();
        let entry_pc = module.functions[&main].pc_start;
        let entry = &module.arena[module.linear[entry_pc]];
        assert!(entry.livein_all().contains(&half));
    }

    #[test]
    fn phi_values_live_only_on_their_edge() {
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
        let module = pipeline(&shader.finish());

        let then_term = &module.arena[module.linear[module.blocks[&then_block].end - 1]];
        assert!(then_term.liveout.contains(&one));
        assert!(!then_term.liveout.contains(&two));

        let else_term = &module.arena[module.linear[module.blocks[&else_block].end - 1]];
        assert!(else_term.liveout.contains(&two));
        assert!(!else_term.liveout.contains(&one));

        // Both values reach the entry block, each under its own edge.
        let main = module.main_function_id.unwrap();
        let entry_pc = module.functions[&main].pc_start;
        let entry_live = module.arena[module.linear[entry_pc]].livein_all();
        assert!(entry_live.contains(&one));
        assert!(entry_live.contains(&two));

        // The phi's keyed map records one value per predecessor.
        let phi_pc = pc_of_op(&module, |op| matches!(op, Op::Phi { .. }));
        let phi_insn = &module.arena[module.linear[phi_pc]];
        assert_eq!(
            phi_insn.livein.get(&then_block),
            Some(&[one].iter().copied().collect())
        );
        assert_eq!(
            phi_insn.livein.get(&else_block),
            Some(&[two].iter().copied().collect())
        );
    }

    #[test]
    fn loop_carried_value_stays_live_around_the_back_edge() {
        let mut shader = ShaderBuilder::new();
        let zero = shader.const_i32(0);
        let one = shader.const_i32(1);
        let ten = shader.const_i32(10);
        let entry = shader.begin_main();
        let (header, body, exit) = (shader.id(), shader.id(), shader.id());
        let next = shader.id(); // forward reference from the phi
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
        let module = pipeline(&shader.finish());

        // The incremented counter flows back into the header.
        let body_term = &module.arena[module.linear[module.blocks[&body].end - 1]];
        assert!(body_term.liveout.contains(&next));
        // The initial value only lives on the entry edge.
        let entry_term = &module.arena[module.linear[module.blocks[&entry].end - 1]];
        assert!(entry_term.liveout.contains(&zero));
        assert!(!entry_term.liveout.contains(&next));
        // The bound is needed every iteration: live across the whole loop.
        let phi_pc = pc_of_op(&module, |op| matches!(op, Op::Phi { .. }));
        assert!(module.arena[module.linear[phi_pc]].liveout.contains(&ten));
    }

    #[test]
    fn liveness_is_idempotent() {
        let mut shader = ShaderBuilder::new();
        let half = shader.const_f32(0.5);
        let input = shader.variable(1, shader.ty_vec2, Some("uv"));
        let output = shader.variable(3, shader.ty_vec2, Some("result"));
        shader.begin_main();
        let value = shader.load(shader.ty_vec2, input);
        let scaled = shader.emit(op::VECTOR_TIMES_SCALAR, shader.ty_vec2, &[value, half]);
        shader.store(output, scaled);
        shader.ret();
        let mut module = pipeline(&shader.finish());

        let snapshot: Vec<_> = module
            .linear
            .iter()
            .map(|&node| {
                let insn = &module.arena[node];
                (insn.livein.clone(), insn.liveout.clone())
            })
            .collect();
        compute_liveness(&mut module).unwrap();
        let again: Vec<_> = module
            .linear
            .iter()
            .map(|&node| {
                let insn = &module.arena[node];
                (insn.livein.clone(), insn.liveout.clone())
            })
            .collect();
        assert_eq!(snapshot, again);
    }
}
