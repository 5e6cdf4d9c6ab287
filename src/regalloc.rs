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

//! Dominator-tree-guided register assignment.
//!
//! Two disjoint physical files: integer registers x3..x31 (x0 is wired to
//! zero, x1 holds the return address, x2 the stack pointer) and float
//! registers f0..f31, carried internally as 32..63. Constants live into a
//! function are pinned at its entry; each block starts from the occupancy
//! implied by its live-in set, so siblings in the dominator tree allocate
//! independently.

use std::collections::BTreeSet;

use log::{debug, warn};

use crate::compile::{Compiler, CompilerRegister};
use crate::ir::{BlockId, Id};
use crate::types::TypeKind;
use crate::{Error, Result};

/// Integer registers available for allocation
fn int_pool() -> BTreeSet<u32> {
    (3..32).collect()
}

/// Float registers available for allocation, offset by 32
fn float_pool() -> BTreeSet<u32> {
    (32..64).collect()
}

impl<'a> Compiler<'a> {
    /// Whether the value in this virtual register lives in the float file
    pub(crate) fn is_reg_float(&self, id: Id) -> Result<bool> {
        let register = self.registers.get(&id).ok_or_else(|| {
            Error::Invariant(format!("virtual register {} not found", id))
        })?;
        let type_id = register.type_id;
        let scalar = self
            .module
            .types
            .as_vector(type_id)
            .map(|(elem, _)| elem)
            .unwrap_or(type_id);
        self.module.types.is_float(scalar)
    }

    /// Assign physical registers to every virtual register in the module
    pub fn assign_registers(&mut self) -> Result<()> {
        // Every instruction result gets a virtual register up front.
        for (&id, &type_id) in self.module.result_types.iter() {
            let lane_count = self.module.types.lane_count(type_id);
            self.registers.insert(
                id,
                CompilerRegister {
                    type_id,
                    lane_count,
                    phy: Vec::new(),
                },
            );
        }

        let function_ids: Vec<Id> = self.module.functions.keys().copied().collect();
        for function_id in function_ids {
            self.pin_entry_constants(function_id)?;
            let entry_block = self.module.functions[&function_id].entry_block;
            self.assign_block(entry_block, &int_pool(), &float_pool())?;
        }
        Ok(())
    }

    /// Give every constant that is live into the function a physical
    /// register of its own; the emitter loads them once in the prologue.
    fn pin_entry_constants(&mut self, function_id: Id) -> Result<()> {
        let entry_pc = self.module.functions[&function_id].pc_start;
        if self.module.linear.is_empty() {
            return Ok(());
        }
        let mut free_int = int_pool();
        let mut free_float = float_pool();
        let live_in = self.module.arena[self.module.linear[entry_pc]].livein_all();
        for id in live_in {
            if !self.module.is_constant(id) {
                if !self.registers.contains_key(&id) {
                    warn!(
                        "initial virtual register {} not found at head of function {}",
                        id, function_id
                    );
                }
                continue;
            }
            if let Some(register) = self.registers.get(&id) {
                if !register.phy.is_empty() {
                    // Already pinned for an earlier function; reuse.
                    for &phy in &register.phy {
                        free_int.remove(&phy);
                        free_float.remove(&phy);
                    }
                    continue;
                }
            }
            let constant = &self.module.constants[&id];
            let pool = if self.module.types.is_float(constant.type_id)? {
                &mut free_float
            } else {
                &mut free_int
            };
            let phy = *pool.iter().next().ok_or(Error::AllocationFailure {
                reg: id,
                lane: 0,
                pc: entry_pc,
            })?;
            pool.remove(&phy);
            debug!("pinning constant {} to physical register {}", id, phy);
            self.registers.insert(
                id,
                CompilerRegister {
                    type_id: constant.type_id,
                    lane_count: 1,
                    phy: vec![phy],
                },
            );
        }
        Ok(())
    }

    /// Walk one block in linear order, then recurse into its children in
    /// the dominator tree. `assigned` is rebuilt from each block's live-in
    /// set, so sibling subtrees never see each other's choices.
    fn assign_block(
        &mut self,
        block_id: BlockId,
        all_int: &BTreeSet<u32>,
        all_float: &BTreeSet<u32>,
    ) -> Result<()> {
        debug!("assigning registers in block {}", block_id);
        let (begin, end, children) = {
            let block = &self.module.blocks[&block_id];
            (block.begin, block.end, block.idom_children.clone())
        };

        // Registers live into this block hold their assignments.
        let mut assigned = BTreeSet::new();
        for id in self.module.arena[self.module.linear[begin]].livein_all() {
            match self.registers.get(&id) {
                Some(register) if !register.phy.is_empty() => {
                    assigned.extend(register.phy.iter().copied());
                }
                Some(_) => warn!(
                    "expected an initial physical register for {} in block {}",
                    id, block_id
                ),
                None => warn!(
                    "initial virtual register {} not found in block {}",
                    id, block_id
                ),
            }
        }

        for pc in begin..end {
            let node = self.module.linear[pc];

            // A register whose last use is here frees up immediately.
            let args: Vec<Id> = self.module.arena[node].arg_set().iter().copied().collect();
            for arg in args {
                if !self.module.arena[node].liveout.contains(&arg) {
                    if let Some(register) = self.registers.get(&arg) {
                        for &phy in &register.phy {
                            assigned.remove(&phy);
                        }
                    }
                }
            }

            let results: Vec<Id> =
                self.module.arena[node].result_set().iter().copied().collect();
            for result in results {
                let (type_id, lane_count, occupied) = {
                    let register = self.registers.get(&result).ok_or_else(|| {
                        Error::Invariant(format!(
                            "virtual register {} not found in block {}",
                            result, block_id
                        ))
                    })?;
                    (register.type_id, register.lane_count, !register.phy.is_empty())
                };
                if occupied {
                    continue;
                }
                // Calls to void functions have a result ID but no value.
                if matches!(self.module.types.get(type_id).map(|ty| &ty.kind), Ok(TypeKind::Void)) {
                    continue;
                }
                let pool = if self.is_reg_float(result)? {
                    all_float
                } else {
                    all_int
                };
                let live_after = self.module.arena[node].liveout.contains(&result);
                let mut chosen: Vec<u32> = Vec::with_capacity(lane_count as usize);
                for lane in 0..lane_count {
                    let phy = pool
                        .iter()
                        .copied()
                        .find(|phy| !assigned.contains(phy) && !chosen.contains(phy))
                        .ok_or(Error::AllocationFailure {
                            reg: result,
                            lane: lane as usize,
                            pc,
                        })?;
                    if live_after {
                        assigned.insert(phy);
                    }
                    chosen.push(phy);
                }
                self.registers.get_mut(&result).unwrap().phy = chosen;
            }
        }

        for child in children {
            self.assign_block(child, all_int, all_float)?;
        }
        Ok(())
    }
}
