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

//! Out-of-SSA handling for φ instructions.
//!
//! φs stay in the IR as instructions, but their meaning moves to the edges:
//! each predecessor's terminator is preceded, at emission time, by one copy
//! per φ at the head of the successor. This pass checks the structural
//! invariants that make the edge-copy reading sound.

use std::collections::BTreeSet;

use crate::ir::{BlockId, Id, Op};
use crate::module::Module;
use crate::{Error, Result};

/// Verify that every φ sits in the head run of its block and carries
/// exactly one incoming pair per predecessor.
pub fn validate_phis(module: &Module) -> Result<()> {
    for (&block_id, block) in module.blocks.iter() {
        let mut seen_non_phi = false;
        for node in block.instructions.refs(&module.arena) {
            let insn = &module.arena[node];
            let pairs = match &insn.op {
                Op::Phi { pairs } => pairs,
                _ => {
                    seen_non_phi = true;
                    continue;
                }
            };
            if seen_non_phi {
                return Err(Error::Invariant(format!(
                    "phi after a non-phi at the head of block {}",
                    block_id
                )));
            }
            let mut incoming = BTreeSet::new();
            for &(_, pred) in pairs.iter() {
                if !incoming.insert(pred) {
                    return Err(Error::Invariant(format!(
                        "phi r{} has two pairs for predecessor {}",
                        insn.result_id().unwrap_or(0),
                        pred
                    )));
                }
            }
            if incoming != block.pred {
                return Err(Error::Invariant(format!(
                    "phi r{} in block {} covers {:?} but the block's predecessors are {:?}",
                    insn.result_id().unwrap_or(0),
                    block_id,
                    incoming,
                    block.pred
                )));
            }
        }
    }
    Ok(())
}

/// The copies `(destination, source)` to materialize on the edge
/// `from -> to`, one per φ in `to`'s head run, in head-run order.
pub fn copies_for_edge(module: &Module, from: BlockId, to: BlockId) -> Vec<(Id, Id)> {
    let mut copies = Vec::new();
    let block = match module.blocks.get(&to) {
        Some(block) => block,
        None => return copies,
    };
    for node in block.instructions.refs(&module.arena) {
        let insn = &module.arena[node];
        let pairs = match &insn.op {
            Op::Phi { pairs } => pairs,
            _ => break,
        };
        if let Some(&(value, _)) = pairs.iter().find(|&&(_, pred)| pred == from) {
            if let Some(result) = insn.result_id() {
                copies.push((result, value));
            }
        }
    }
    copies
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfg::compute_cfg;
    use crate::parse::parse_words;
    use crate::spv::op;
    use crate::spvasm::ShaderBuilder;

    fn if_else_phi() -> (Module, BlockId, BlockId, BlockId, Id) {
        let mut shader = ShaderBuilder::new();
        let one = shader.const_f32(1.0);
        let two = shader.const_f32(2.0);
        let half = shader.const_f32(0.5);
        shader.begin_main();
        let cond = shader.emit(op::F_ORD_LESS_THAN, shader.ty_bool, &[half, one]);
        let (then_block, else_block, merge) = (shader.id(), shader.id(), shader.id());
        shader.branch_cond(cond, then_block, else_block);
        shader.label(then_block);
        shader.branch(merge);
        shader.label(else_block);
        shader.branch(merge);
        shader.label(merge);
        let merged = shader.phi(shader.ty_float, &[(one, then_block), (two, else_block)]);
        shader.ret();
        let mut module = parse_words(&shader.finish(), true).unwrap();
        compute_cfg(&mut module).unwrap();
        (module, then_block, else_block, merge, merged)
    }

    #[test]
    fn accepts_well_formed_phi() {
        let (module, ..) = if_else_phi();
        validate_phis(&module).unwrap();
    }

    #[test]
    fn edge_copies_pick_the_right_source() {
        let (module, then_block, else_block, merge, merged) = if_else_phi();
        let from_then = copies_for_edge(&module, then_block, merge);
        let from_else = copies_for_edge(&module, else_block, merge);
        assert_eq!(from_then.len(), 1);
        assert_eq!(from_else.len(), 1);
        assert_eq!(from_then[0].0, merged);
        assert_eq!(from_else[0].0, merged);
        assert_ne!(from_then[0].1, from_else[0].1);
    }

    #[test]
    fn rejects_phi_missing_a_predecessor() {
        let mut shader = ShaderBuilder::new();
        let one = shader.const_f32(1.0);
        let half = shader.const_f32(0.5);
        shader.begin_main();
        let cond = shader.emit(op::F_ORD_LESS_THAN, shader.ty_bool, &[half, one]);
        let (then_block, else_block, merge) = (shader.id(), shader.id(), shader.id());
        shader.branch_cond(cond, then_block, else_block);
        shader.label(then_block);
        shader.branch(merge);
        shader.label(else_block);
        shader.branch(merge);
        shader.label(merge);
        // Only one incoming pair for a two-predecessor block.
        let _ = shader.phi(shader.ty_float, &[(one, then_block)]);
        shader.ret();
        let mut module = parse_words(&shader.finish(), true).unwrap();
        compute_cfg(&mut module).unwrap();
        assert!(matches!(validate_phis(&module), Err(Error::Invariant(_))));
    }

    #[test]
    fn rejects_phi_after_non_phi() {
        let mut shader = ShaderBuilder::new();
        let one = shader.const_f32(1.0);
        let half = shader.const_f32(0.5);
        shader.begin_main();
        let cond = shader.emit(op::F_ORD_LESS_THAN, shader.ty_bool, &[half, one]);
        let (then_block, else_block, merge) = (shader.id(), shader.id(), shader.id());
        shader.branch_cond(cond, then_block, else_block);
        shader.label(then_block);
        shader.branch(merge);
        shader.label(else_block);
        shader.branch(merge);
        shader.label(merge);
        let _ = shader.emit(op::F_ADD, shader.ty_float, &[one, one]);
        let _ = shader.phi(shader.ty_float, &[(one, then_block), (half, else_block)]);
        shader.ret();
        let mut module = parse_words(&shader.finish(), true).unwrap();
        compute_cfg(&mut module).unwrap();
        assert!(matches!(validate_phis(&module), Err(Error::Invariant(_))));
    }
}
