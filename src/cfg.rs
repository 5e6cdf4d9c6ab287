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

use std::collections::{BTreeMap, BTreeSet};

use crate::ir::{BlockId, NO_BLOCK_ID};
use crate::module::Module;
use crate::{Error, Result};

/// Derive predecessors, successors, dominator sets and the immediate
/// dominator tree for every function in the module.
pub fn compute_cfg(module: &mut Module) -> Result<()> {
    let function_ids: Vec<_> = module.functions.keys().copied().collect();
    for function_id in function_ids {
        compute_function_cfg(module, function_id)?;
    }
    Ok(())
}

fn compute_function_cfg(module: &mut Module, function_id: u32) -> Result<()> {
    let block_ids = module.functions[&function_id].block_ids.clone();
    let entry = module.functions[&function_id].entry_block;
    if block_ids.is_empty() {
        return Err(Error::Invariant(format!(
            "function {} has no blocks",
            function_id
        )));
    }

    // Successors come straight off each block's terminator.
    let mut edges: Vec<(BlockId, BlockId)> = Vec::new();
    for &block_id in &block_ids {
        let block = &module.blocks[&block_id];
        let tail = block.instructions.tail().ok_or_else(|| {
            Error::Invariant(format!("block {} is empty", block_id))
        })?;
        let terminator = &module.arena[tail];
        if !terminator.op.is_terminator() {
            return Err(Error::Invariant(format!(
                "block {} does not end in a terminator",
                block_id
            )));
        }
        for &target in terminator.targets.iter() {
            if !module.blocks.contains_key(&target) {
                return Err(Error::Malformed(format!(
                    "branch to unknown label {}",
                    target
                )));
            }
            edges.push((block_id, target));
        }
    }

    for &block_id in &block_ids {
        let block = module.blocks.get_mut(&block_id).unwrap();
        block.pred.clear();
        block.succ.clear();
        block.dom.clear();
        block.idom = NO_BLOCK_ID;
        block.idom_children.clear();
    }
    for &(from, to) in &edges {
        module.blocks.get_mut(&from).unwrap().succ.insert(to);
        module.blocks.get_mut(&to).unwrap().pred.insert(from);
    }

    // Dominators, by iteration to a fixed point:
    //   Dom(entry) = {entry}
    //   Dom(b) = {b} | intersection of Dom(p) over preds(b)
    let all: BTreeSet<BlockId> = block_ids.iter().copied().collect();
    let mut dom: BTreeMap<BlockId, BTreeSet<BlockId>> = BTreeMap::new();
    for &block_id in &block_ids {
        if block_id == entry {
            let mut own = BTreeSet::new();
            own.insert(entry);
            dom.insert(block_id, own);
        } else {
            dom.insert(block_id, all.clone());
        }
    }
    let mut changed = true;
    while changed {
        changed = false;
        for &block_id in &block_ids {
            if block_id == entry {
                continue;
            }
            let preds = &module.blocks[&block_id].pred;
            let mut new_set: Option<BTreeSet<BlockId>> = None;
            for pred in preds.iter() {
                let pred_dom = &dom[pred];
                new_set = Some(match new_set {
                    None => pred_dom.clone(),
                    Some(acc) => acc.intersection(pred_dom).copied().collect(),
                });
            }
            let mut new_set = new_set.unwrap_or_default();
            new_set.insert(block_id);
            if new_set != dom[&block_id] {
                dom.insert(block_id, new_set);
                changed = true;
            }
        }
    }

    // idom(b) is the strict dominator dominated by every other strict
    // dominator: the one with the largest dominator set of its own.
    for &block_id in &block_ids {
        let own = &dom[&block_id];
        let mut idom = NO_BLOCK_ID;
        let mut best = 0;
        for candidate in own.iter().filter(|&&d| d != block_id) {
            let weight = dom[candidate].len();
            if weight > best {
                best = weight;
                idom = *candidate;
            }
        }
        let block = module.blocks.get_mut(&block_id).unwrap();
        block.dom = own.clone();
        block.idom = idom;
    }
    for &block_id in &block_ids {
        let idom = module.blocks[&block_id].idom;
        if idom != NO_BLOCK_ID {
            module
                .blocks
                .get_mut(&idom)
                .unwrap()
                .idom_children
                .push(block_id);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::parse_words;
    use crate::spvasm::ShaderBuilder;

    /// entry -> (then | otherwise) -> merge
    fn diamond() -> Module {
        let mut shader = ShaderBuilder::new();
        let half = shader.const_f32(0.5);
        shader.begin_main();
        let cond = shader.emit(
            crate::spv::op::F_ORD_LESS_THAN,
            shader.ty_bool,
            &[half, half],
        );
        let (then_block, else_block, merge) = (shader.id(), shader.id(), shader.id());
        shader.branch_cond(cond, then_block, else_block);
        shader.label(then_block);
        shader.branch(merge);
        shader.label(else_block);
        shader.branch(merge);
        shader.label(merge);
        shader.ret();
        let mut module = parse_words(&shader.finish(), true).unwrap();
        compute_cfg(&mut module).unwrap();
        module
    }

    #[test]
    fn diamond_edges() {
        let module = diamond();
        let main = module.main_function_id.unwrap();
        let ids = module.functions[&main].block_ids.clone();
        let (entry, then_block, else_block, merge) = (ids[0], ids[1], ids[2], ids[3]);

        let e = &module.blocks[&entry];
        assert!(e.pred.is_empty());
        assert_eq!(
            e.succ.iter().copied().collect::<Vec<_>>(),
            vec![then_block, else_block]
        );
        let m = &module.blocks[&merge];
        assert_eq!(
            m.pred.iter().copied().collect::<Vec<_>>(),
            vec![then_block, else_block]
        );
        assert!(m.succ.is_empty());
    }

    #[test]
    fn diamond_dominators() {
        let module = diamond();
        let main = module.main_function_id.unwrap();
        let ids = module.functions[&main].block_ids.clone();
        let (entry, then_block, else_block, merge) = (ids[0], ids[1], ids[2], ids[3]);

        // The merge is dominated by the entry alone; the branches by
        // themselves and the entry.
        let m = &module.blocks[&merge];
        assert!(m.is_dominated_by(entry));
        assert!(!m.is_dominated_by(then_block));
        assert!(!m.is_dominated_by(else_block));
        assert_eq!(m.idom, entry);
        assert_eq!(module.blocks[&then_block].idom, entry);
        assert_eq!(module.blocks[&else_block].idom, entry);

        let e = &module.blocks[&entry];
        assert_eq!(e.idom, NO_BLOCK_ID);
        assert_eq!(e.idom_children, vec![then_block, else_block, merge]);
    }

    #[test]
    fn loop_back_edge() {
        let mut shader = ShaderBuilder::new();
        shader.begin_main();
        let (header, exit) = (shader.id(), shader.id());
        shader.branch(header);
        shader.label(header);
        let cond = shader.emit(
            crate::spv::op::F_ORD_LESS_THAN,
            shader.ty_bool,
            &[1, 1], // operands unused by the CFG pass
        );
        shader.branch_cond(cond, header, exit);
        shader.label(exit);
        shader.ret();
        let mut module = parse_words(&shader.finish(), true).unwrap();
        compute_cfg(&mut module).unwrap();

        let main = module.main_function_id.unwrap();
        let ids = module.functions[&main].block_ids.clone();
        let (entry, header, exit) = (ids[0], ids[1], ids[2]);
        let h = &module.blocks[&header];
        // The header is its own predecessor through the back edge.
        assert!(h.pred.contains(&entry));
        assert!(h.pred.contains(&header));
        assert_eq!(h.idom, entry);
        assert_eq!(module.blocks[&exit].idom, header);
        assert!(module.blocks[&exit].is_dominated_by(header));
    }
}
