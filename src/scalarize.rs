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

//! The vector expander: rewrites every wide instruction into scalar lanes.
//!
//! Values get a `(vector id, lane) -> scalar id` mapping, filled on demand
//! from a fresh-ID counter; the mapping is order-independent, so a use may
//! mint the lane IDs before the defining instruction is reached. Instructions
//! that only rearrange data (construct, extract, shuffle, access chains)
//! leave no code behind: their lanes alias existing scalars and later uses
//! are redirected. Running the pass a second time is a no-op.

use std::collections::BTreeMap;
use std::mem;

use crate::ir::{
    BinOp, BlockId, Id, Instruction, InstructionList, LineInfo, Op, TypeId, UnOp,
};
use crate::module::{Module, PointerInfo};
use crate::types::TypeKind;
use crate::{Error, Result};

pub fn expand_vectors(module: &mut Module) -> Result<()> {
    let function_ids: Vec<Id> = module.functions.keys().copied().collect();
    for function_id in function_ids {
        let block_ids = module.functions[&function_id].block_ids.clone();
        let mut aliases = BTreeMap::new();
        for &block_id in &block_ids {
            expand_block(module, block_id, &mut aliases)?;
        }
        apply_aliases(module, &block_ids, &aliases);
    }
    Ok(())
}

/// Whether values of this type span more than one register lane (or are
/// wide types that must not survive expansion at all)
fn is_aggregate(module: &Module, type_id: TypeId) -> bool {
    match module.types.get(type_id).map(|ty| &ty.kind) {
        Ok(TypeKind::Vector { .. })
        | Ok(TypeKind::Matrix { .. })
        | Ok(TypeKind::Array { .. })
        | Ok(TypeKind::Struct { .. }) => true,
        _ => false,
    }
}

/// Scalar leaves of a type with their byte offsets, in flat lane order.
/// Matrices flatten column-major, matching `TypeRegistry::matrix_index`.
fn flatten_type(module: &Module, type_id: TypeId) -> Result<Vec<(TypeId, u32)>> {
    let count = match &module.types.get(type_id)?.kind {
        TypeKind::Vector { count, .. } | TypeKind::Array { count, .. } => *count,
        TypeKind::Matrix { columns, .. } => *columns,
        TypeKind::Struct { members, .. } => members.len() as u32,
        _ => return Ok(vec![(type_id, 0)]),
    };
    let mut leaves = Vec::new();
    for index in 0..count {
        let (sub, offset) = module.types.constituent_info(type_id, index)?;
        for (leaf, leaf_offset) in flatten_type(module, sub)? {
            leaves.push((leaf, offset + leaf_offset));
        }
    }
    Ok(leaves)
}

fn flat_lane_count(module: &Module, type_id: TypeId) -> Result<u32> {
    Ok(flatten_type(module, type_id)?.len() as u32)
}

/// The constant ID holding lane `lane` of constant `id`. Scalar constants
/// broadcast to every lane.
fn constant_lane(module: &Module, id: Id, lane: u32) -> Option<Id> {
    let constant = module.constants.get(&id)?;
    match &constant.value {
        crate::ir::ConstantValue::Composite(subs) => {
            let mut remaining = lane;
            for &sub in subs {
                let sub_type = module.constants.get(&sub)?.type_id;
                let lanes = flat_lane_count(module, sub_type).ok()?;
                if remaining < lanes {
                    return if lanes == 1 {
                        Some(sub)
                    } else {
                        constant_lane(module, sub, remaining)
                    };
                }
                remaining -= lanes;
            }
            None
        }
        _ => Some(id),
    }
}

/// The scalar ID standing for lane `lane` of `vreg`, minting a fresh one
/// of type `subtype` on first sight. Scalars broadcast unchanged.
fn scalar_lane(module: &mut Module, vreg: Id, lane: u32, subtype: TypeId) -> Id {
    if let Some(&scalar) = module.vec_lanes.get(&(vreg, lane)) {
        return scalar;
    }
    if module.is_constant(vreg) {
        if let Some(scalar) = constant_lane(module, vreg, lane) {
            if scalar != vreg {
                module.vec_lanes.insert((vreg, lane), scalar);
            }
            return scalar;
        }
    }
    let wide = module
        .type_id_of(vreg)
        .map(|ty| is_aggregate(module, ty))
        .unwrap_or(false);
    if !wide {
        return vreg;
    }
    let scalar = module.fresh_id();
    module.result_types.insert(scalar, subtype);
    module.vec_lanes.insert((vreg, lane), scalar);
    scalar
}

/// Scalarize an operand by its own element type, falling back to the
/// result's element type for freshly minted IDs whose type is unknown.
/// Boolean vectors (compare results, select conditions) keep their own
/// element type this way.
fn arg_lane(module: &mut Module, arg: Id, lane: u32, fallback: TypeId) -> Id {
    let subtype = module
        .type_id_of(arg)
        .and_then(|ty| module.types.as_vector(ty))
        .map(|(elem, _)| elem)
        .unwrap_or(fallback);
    scalar_lane(module, arg, lane, subtype)
}

/// Point lane `lane` of `result` at an existing scalar. If a use already
/// minted a fresh ID for the lane, that ID becomes an alias instead.
fn register_lane(
    module: &mut Module,
    aliases: &mut BTreeMap<Id, Id>,
    result: Id,
    lane: u32,
    scalar: Id,
) {
    match module.vec_lanes.get(&(result, lane)) {
        Some(&existing) if existing != scalar => {
            aliases.insert(existing, scalar);
        }
        Some(_) => {}
        None => {
            module.vec_lanes.insert((result, lane), scalar);
        }
    }
}

fn resolve_alias(aliases: &BTreeMap<Id, Id>, mut id: Id) -> Id {
    let mut hops = 0;
    while let Some(&next) = aliases.get(&id) {
        id = next;
        hops += 1;
        if hops > 64 {
            break;
        }
    }
    id
}

fn apply_aliases(module: &mut Module, block_ids: &[BlockId], aliases: &BTreeMap<Id, Id>) {
    if aliases.is_empty() {
        return;
    }
    for &block_id in block_ids {
        let nodes = module.blocks[&block_id].instructions.refs(&module.arena);
        for node in nodes {
            let olds: Vec<Id> = module.arena[node]
                .arg_set()
                .iter()
                .copied()
                .filter(|id| aliases.contains_key(id))
                .collect();
            for old in olds {
                let new = resolve_alias(aliases, old);
                if new != old {
                    module.arena[node].change_arg(old, new);
                }
            }
        }
    }
}

struct Expander {
    list: InstructionList,
    line: LineInfo,
}

impl Expander {
    /// Append a freshly built instruction, registering its result type
    fn push(&mut self, module: &mut Module, result_type: Option<TypeId>, result: Option<Id>, op: Op) {
        if let (Some(type_id), Some(id)) = (result_type, result) {
            module.result_types.insert(id, type_id);
        }
        let node = module
            .arena
            .alloc(Instruction::new(self.line, result_type, result, op));
        self.list.push_back(&mut module.arena, node);
    }

    /// Keep the original node (already detached from the old list)
    fn keep(&mut self, module: &mut Module, node: crate::ir::InsnRef) {
        self.list.push_back(&mut module.arena, node);
    }

    /// Sum `terms` with a chain of adds, writing the final sum to `result`
    fn sum(
        &mut self,
        module: &mut Module,
        kind: BinOp,
        scalar_type: TypeId,
        terms: &[Id],
        result: Id,
    ) {
        debug_assert!(terms.len() >= 2);
        let mut acc = terms[0];
        for (index, &term) in terms.iter().enumerate().skip(1) {
            let dst = if index == terms.len() - 1 {
                result
            } else {
                let fresh = module.fresh_id();
                module.result_types.insert(fresh, scalar_type);
                fresh
            };
            self.push(
                module,
                Some(scalar_type),
                Some(dst),
                Op::Binary {
                    kind,
                    lhs: acc,
                    rhs: term,
                },
            );
            acc = dst;
        }
    }

    /// Lane products of two equally wide vectors, as fresh scalars
    fn products(
        &mut self,
        module: &mut Module,
        lhs: Id,
        rhs: Id,
        elem: TypeId,
        lanes: u32,
    ) -> Vec<Id> {
        let mut terms = Vec::with_capacity(lanes as usize);
        for lane in 0..lanes {
            let a = scalar_lane(module, lhs, lane, elem);
            let b = scalar_lane(module, rhs, lane, elem);
            let product = module.fresh_id();
            module.result_types.insert(product, elem);
            self.push(
                module,
                Some(elem),
                Some(product),
                Op::Binary {
                    kind: BinOp::FMul,
                    lhs: a,
                    rhs: b,
                },
            );
            terms.push(product);
        }
        terms
    }

    /// dot(lhs, rhs) into `result`
    fn dot(
        &mut self,
        module: &mut Module,
        lhs: Id,
        rhs: Id,
        elem: TypeId,
        lanes: u32,
        result: Id,
    ) {
        if lanes == 1 {
            let a = scalar_lane(module, lhs, 0, elem);
            let b = scalar_lane(module, rhs, 0, elem);
            self.push(
                module,
                Some(elem),
                Some(result),
                Op::Binary {
                    kind: BinOp::FMul,
                    lhs: a,
                    rhs: b,
                },
            );
            return;
        }
        let terms = self.products(module, lhs, rhs, elem, lanes);
        self.sum(module, BinOp::FAdd, elem, &terms, result);
    }
}

/// The element type and width of an operand that must be a float vector
fn vector_of(module: &Module, id: Id) -> Result<(TypeId, u32)> {
    let type_id = module
        .type_id_of(id)
        .ok_or_else(|| Error::Type(format!("r{} has no known type", id)))?;
    module
        .types
        .as_vector(type_id)
        .ok_or_else(|| Error::Type(format!("r{} is not a vector", id)))
}

fn pointee_of(module: &Module, pointer: Id) -> Result<TypeId> {
    if let Some(var) = module.variables.get(&pointer) {
        return Ok(var.type_id);
    }
    let type_id = module
        .type_id_of(pointer)
        .ok_or_else(|| Error::Type(format!("r{} has no known type", pointer)))?;
    module
        .types
        .as_pointer(type_id)
        .map(|(pointee, _)| pointee)
        .ok_or_else(|| Error::Type(format!("r{} is not a pointer", pointer)))
}

/// Flat lane position of constituent `index` within `type_id`
fn lanes_before(module: &Module, type_id: TypeId, index: u32) -> Result<u32> {
    let mut lanes = 0;
    for i in 0..index {
        let (sub, _) = module.types.constituent_info(type_id, i)?;
        lanes += flat_lane_count(module, sub)?;
    }
    Ok(lanes)
}

fn expand_block(
    module: &mut Module,
    block_id: BlockId,
    aliases: &mut BTreeMap<Id, Id>,
) -> Result<()> {
    let placeholder = module.arena.new_list();
    let mut old = mem::replace(
        &mut module.blocks.get_mut(&block_id).unwrap().instructions,
        placeholder,
    );
    let mut out = Expander {
        list: module.arena.new_list(),
        line: LineInfo::default(),
    };

    for node in old.refs(&module.arena) {
        old.remove(&mut module.arena, node);
        let insn = &module.arena[node];
        out.line = insn.line;
        let result_type = insn.result_type;
        let result = insn.result_id();
        let op = insn.op.clone();

        match op {
            // The kind-parameterized family: one scalar instruction per
            // lane, operands scalarized by their own subtype, scalars
            // broadcast.
            Op::Unary { kind, src } => {
                match result_type.and_then(|ty| module.types.as_vector(ty)) {
                    Some((elem, count)) => {
                        let result = result.unwrap();
                        for lane in 0..count {
                            let dst = scalar_lane(module, result, lane, elem);
                            let src = arg_lane(module, src, lane, elem);
                            out.push(module, Some(elem), Some(dst), Op::Unary { kind, src });
                        }
                    }
                    None => out.keep(module, node),
                }
            }
            Op::Binary { kind, lhs, rhs } => {
                match result_type.and_then(|ty| module.types.as_vector(ty)) {
                    Some((elem, count)) => {
                        let result = result.unwrap();
                        for lane in 0..count {
                            let dst = scalar_lane(module, result, lane, elem);
                            let lhs = arg_lane(module, lhs, lane, elem);
                            let rhs = arg_lane(module, rhs, lane, elem);
                            out.push(
                                module,
                                Some(elem),
                                Some(dst),
                                Op::Binary { kind, lhs, rhs },
                            );
                        }
                    }
                    None => out.keep(module, node),
                }
            }
            Op::Ternary { kind, a, b, c } => {
                match result_type.and_then(|ty| module.types.as_vector(ty)) {
                    Some((elem, count)) => {
                        let result = result.unwrap();
                        for lane in 0..count {
                            let dst = scalar_lane(module, result, lane, elem);
                            let a = arg_lane(module, a, lane, elem);
                            let b = arg_lane(module, b, lane, elem);
                            let c = arg_lane(module, c, lane, elem);
                            out.push(
                                module,
                                Some(elem),
                                Some(dst),
                                Op::Ternary { kind, a, b, c },
                            );
                        }
                    }
                    None => out.keep(module, node),
                }
            }

            Op::Phi { ref pairs } => {
                match result_type.and_then(|ty| module.types.as_vector(ty)) {
                    Some((elem, count)) => {
                        let result = result.unwrap();
                        for lane in 0..count {
                            let dst = scalar_lane(module, result, lane, elem);
                            let lane_pairs = pairs
                                .iter()
                                .map(|&(value, pred)| {
                                    (arg_lane(module, value, lane, elem), pred)
                                })
                                .collect();
                            out.push(
                                module,
                                Some(elem),
                                Some(dst),
                                Op::Phi { pairs: lane_pairs },
                            );
                        }
                    }
                    None => out.keep(module, node),
                }
            }

            Op::Load { pointer, offset } => {
                let type_id = result_type.unwrap_or(0);
                if is_aggregate(module, type_id) {
                    let result = result.unwrap();
                    let leaves = flatten_type(module, type_id)?;
                    for (lane, (leaf, leaf_offset)) in leaves.into_iter().enumerate() {
                        let dst = scalar_lane(module, result, lane as u32, leaf);
                        out.push(
                            module,
                            Some(leaf),
                            Some(dst),
                            Op::Load {
                                pointer,
                                offset: offset + leaf_offset,
                            },
                        );
                    }
                } else {
                    out.keep(module, node);
                }
            }

            Op::Store { pointer, object, offset } => {
                let type_id = module.type_id_of(object).unwrap_or(0);
                if is_aggregate(module, type_id) {
                    let leaves = flatten_type(module, type_id)?;
                    for (lane, (leaf, leaf_offset)) in leaves.into_iter().enumerate() {
                        let src = scalar_lane(module, object, lane as u32, leaf);
                        out.push(
                            module,
                            None,
                            None,
                            Op::Store {
                                pointer,
                                object: src,
                                offset: offset + leaf_offset,
                            },
                        );
                    }
                } else {
                    out.keep(module, node);
                }
            }

            // Pure data-rearranging forms resolve to aliases and vanish.
            Op::AccessChain { base, indexes } => {
                let result = result.unwrap();
                let base_info = match module.pointers.get(&base) {
                    Some(&info) => info,
                    None => {
                        return Err(Error::Type(format!(
                            "access chain base r{} is not a resolvable pointer",
                            base
                        )))
                    }
                };
                let mut type_id = pointee_of(module, base)?;
                let mut offset = base_info.offset;
                let mut dynamic = false;
                for &index in &indexes {
                    match module.as_integer_constant(index) {
                        Some(value) => {
                            let (sub, delta) = module.types.constituent_info(type_id, value)?;
                            type_id = sub;
                            offset += delta;
                        }
                        None => {
                            dynamic = true;
                            break;
                        }
                    }
                }
                if dynamic {
                    if module.throw_on_unimplemented {
                        return Err(Error::Unimplemented(
                            "access chain with a dynamic index".to_string(),
                        ));
                    }
                    log::warn!("access chain r{} has a dynamic index", result);
                    module.has_unimplemented = true;
                    out.push(
                        module,
                        result_type,
                        Some(result),
                        Op::Unimplemented {
                            opcode: crate::spv::op::ACCESS_CHAIN,
                        },
                    );
                } else {
                    module.pointers.insert(
                        result,
                        PointerInfo {
                            variable: base_info.variable,
                            offset,
                        },
                    );
                }
            }

            Op::CompositeExtract { composite, indexes } => {
                let result = result.unwrap();
                let mut type_id = module.type_id_of(composite).ok_or_else(|| {
                    Error::Type(format!("r{} has no known type", composite))
                })?;
                let mut base_lane = 0;
                for &index in &indexes {
                    base_lane += lanes_before(module, type_id, index)?;
                    let (sub, _) = module.types.constituent_info(type_id, index)?;
                    type_id = sub;
                }
                if is_aggregate(module, type_id) {
                    let leaves = flatten_type(module, type_id)?;
                    for (lane, (leaf, _)) in leaves.into_iter().enumerate() {
                        let scalar =
                            scalar_lane(module, composite, base_lane + lane as u32, leaf);
                        register_lane(module, aliases, result, lane as u32, scalar);
                    }
                } else {
                    let scalar = scalar_lane(module, composite, base_lane, type_id);
                    aliases.insert(result, scalar);
                }
            }

            Op::VectorShuffle { v1, v2, components } => {
                let result = result.unwrap();
                let (elem, first_width) = vector_of(module, v1)?;
                for (lane, &component) in components.iter().enumerate() {
                    let scalar = if component < first_width {
                        scalar_lane(module, v1, component, elem)
                    } else {
                        scalar_lane(module, v2, component - first_width, elem)
                    };
                    register_lane(module, aliases, result, lane as u32, scalar);
                }
            }

            Op::CompositeConstruct { constituents } => {
                let result = result.unwrap();
                let mut lane = 0;
                for &constituent in &constituents {
                    let sub_type = module.type_id_of(constituent).ok_or_else(|| {
                        Error::Type(format!("r{} has no known type", constituent))
                    })?;
                    if is_aggregate(module, sub_type) {
                        for (sub_lane, (leaf, _)) in
                            flatten_type(module, sub_type)?.into_iter().enumerate()
                        {
                            let scalar =
                                scalar_lane(module, constituent, sub_lane as u32, leaf);
                            register_lane(module, aliases, result, lane, scalar);
                            lane += 1;
                        }
                    } else {
                        let scalar = resolve_alias(aliases, constituent);
                        register_lane(module, aliases, result, lane, scalar);
                        lane += 1;
                    }
                }
            }

            // Reductions and products decompose into mul/add(/sub) chains.
            Op::Dot { lhs, rhs } => {
                let (elem, lanes) = vector_of(module, lhs)?;
                out.dot(module, lhs, rhs, elem, lanes, result.unwrap());
            }

            Op::VectorTimesScalar { vector, scalar } => {
                let result = result.unwrap();
                let (elem, lanes) = vector_of(module, vector)?;
                for lane in 0..lanes {
                    let dst = scalar_lane(module, result, lane, elem);
                    let lhs = scalar_lane(module, vector, lane, elem);
                    out.push(
                        module,
                        Some(elem),
                        Some(dst),
                        Op::Binary {
                            kind: BinOp::FMul,
                            lhs,
                            rhs: scalar,
                        },
                    );
                }
            }

            Op::MatrixTimesVector { matrix, vector } => {
                let result = result.unwrap();
                let matrix_type = module.type_id_of(matrix).ok_or_else(|| {
                    Error::Type(format!("r{} has no known type", matrix))
                })?;
                let (_, elem, rows, columns) =
                    module.types.as_matrix(matrix_type).ok_or_else(|| {
                        Error::Type(format!("r{} is not a matrix", matrix))
                    })?;
                for row in 0..rows {
                    let dst = scalar_lane(module, result, row, elem);
                    let mut terms = Vec::with_capacity(columns as usize);
                    for col in 0..columns {
                        let flat = module.types.matrix_index(rows, row, col);
                        let m = scalar_lane(module, matrix, flat, elem);
                        let v = scalar_lane(module, vector, col, elem);
                        let product = if columns == 1 {
                            dst
                        } else {
                            let fresh = module.fresh_id();
                            module.result_types.insert(fresh, elem);
                            fresh
                        };
                        out.push(
                            module,
                            Some(elem),
                            Some(product),
                            Op::Binary {
                                kind: BinOp::FMul,
                                lhs: m,
                                rhs: v,
                            },
                        );
                        terms.push(product);
                    }
                    if columns > 1 {
                        out.sum(module, BinOp::FAdd, elem, &terms, dst);
                    }
                }
            }

            Op::Length { src } => {
                let (elem, lanes) = vector_of(module, src)?;
                let result = result.unwrap();
                let squared = module.fresh_id();
                module.result_types.insert(squared, elem);
                out.dot(module, src, src, elem, lanes, squared);
                out.push(
                    module,
                    Some(elem),
                    Some(result),
                    Op::Unary {
                        kind: UnOp::Sqrt,
                        src: squared,
                    },
                );
            }

            Op::Distance { lhs, rhs } => {
                let (elem, lanes) = vector_of(module, lhs)?;
                let result = result.unwrap();
                let mut squares = Vec::with_capacity(lanes as usize);
                for lane in 0..lanes {
                    let a = scalar_lane(module, lhs, lane, elem);
                    let b = scalar_lane(module, rhs, lane, elem);
                    let diff = module.fresh_id();
                    module.result_types.insert(diff, elem);
                    out.push(
                        module,
                        Some(elem),
                        Some(diff),
                        Op::Binary {
                            kind: BinOp::FSub,
                            lhs: a,
                            rhs: b,
                        },
                    );
                    let square = module.fresh_id();
                    module.result_types.insert(square, elem);
                    out.push(
                        module,
                        Some(elem),
                        Some(square),
                        Op::Binary {
                            kind: BinOp::FMul,
                            lhs: diff,
                            rhs: diff,
                        },
                    );
                    squares.push(square);
                }
                let src = if squares.len() == 1 {
                    squares[0]
                } else {
                    let squared = module.fresh_id();
                    module.result_types.insert(squared, elem);
                    out.sum(module, BinOp::FAdd, elem, &squares, squared);
                    squared
                };
                out.push(
                    module,
                    Some(elem),
                    Some(result),
                    Op::Unary {
                        kind: UnOp::Sqrt,
                        src,
                    },
                );
            }

            Op::Cross { lhs, rhs } => {
                let (elem, _) = vector_of(module, lhs)?;
                let result = result.unwrap();
                for (lane, (i, j)) in [(1u32, 2u32), (2, 0), (0, 1)].iter().enumerate() {
                    let dst = scalar_lane(module, result, lane as u32, elem);
                    let a_i = scalar_lane(module, lhs, *i, elem);
                    let b_j = scalar_lane(module, rhs, *j, elem);
                    let a_j = scalar_lane(module, lhs, *j, elem);
                    let b_i = scalar_lane(module, rhs, *i, elem);
                    let left = module.fresh_id();
                    module.result_types.insert(left, elem);
                    out.push(
                        module,
                        Some(elem),
                        Some(left),
                        Op::Binary {
                            kind: BinOp::FMul,
                            lhs: a_i,
                            rhs: b_j,
                        },
                    );
                    let right = module.fresh_id();
                    module.result_types.insert(right, elem);
                    out.push(
                        module,
                        Some(elem),
                        Some(right),
                        Op::Binary {
                            kind: BinOp::FMul,
                            lhs: a_j,
                            rhs: b_i,
                        },
                    );
                    out.push(
                        module,
                        Some(elem),
                        Some(dst),
                        Op::Binary {
                            kind: BinOp::FSub,
                            lhs: left,
                            rhs: right,
                        },
                    );
                }
            }

            Op::Normalize { src } => {
                let (elem, lanes) = vector_of(module, src)?;
                let result = result.unwrap();
                let squared = module.fresh_id();
                module.result_types.insert(squared, elem);
                out.dot(module, src, src, elem, lanes, squared);
                let length = module.fresh_id();
                module.result_types.insert(length, elem);
                out.push(
                    module,
                    Some(elem),
                    Some(length),
                    Op::Unary {
                        kind: UnOp::Sqrt,
                        src: squared,
                    },
                );
                for lane in 0..lanes {
                    let dst = scalar_lane(module, result, lane, elem);
                    let numerator = scalar_lane(module, src, lane, elem);
                    out.push(
                        module,
                        Some(elem),
                        Some(dst),
                        Op::Binary {
                            kind: BinOp::FDiv,
                            lhs: numerator,
                            rhs: length,
                        },
                    );
                }
            }

            Op::Reflect { incident, normal } => {
                let (elem, lanes) = vector_of(module, incident)?;
                let result = result.unwrap();
                let d = module.fresh_id();
                module.result_types.insert(d, elem);
                out.dot(module, normal, incident, elem, lanes, d);
                let two_d = module.fresh_id();
                module.result_types.insert(two_d, elem);
                out.push(
                    module,
                    Some(elem),
                    Some(two_d),
                    Op::Binary {
                        kind: BinOp::FAdd,
                        lhs: d,
                        rhs: d,
                    },
                );
                for lane in 0..lanes {
                    let dst = scalar_lane(module, result, lane, elem);
                    let n_lane = scalar_lane(module, normal, lane, elem);
                    let i_lane = scalar_lane(module, incident, lane, elem);
                    let scaled = module.fresh_id();
                    module.result_types.insert(scaled, elem);
                    out.push(
                        module,
                        Some(elem),
                        Some(scaled),
                        Op::Binary {
                            kind: BinOp::FMul,
                            lhs: two_d,
                            rhs: n_lane,
                        },
                    );
                    out.push(
                        module,
                        Some(elem),
                        Some(dst),
                        Op::Binary {
                            kind: BinOp::FSub,
                            lhs: i_lane,
                            rhs: scaled,
                        },
                    );
                }
            }

            Op::FunctionCall { function, args } => {
                let mut flattened = Vec::with_capacity(args.len());
                let mut changed = false;
                for &arg in &args {
                    let arg_type = module.type_id_of(arg);
                    match arg_type {
                        Some(ty) if is_aggregate(module, ty) => {
                            for (lane, (leaf, _)) in
                                flatten_type(module, ty)?.into_iter().enumerate()
                            {
                                flattened.push(scalar_lane(module, arg, lane as u32, leaf));
                            }
                            changed = true;
                        }
                        _ => flattened.push(arg),
                    }
                }
                if changed {
                    out.push(
                        module,
                        result_type,
                        result,
                        Op::FunctionCall {
                            function,
                            args: flattened,
                        },
                    );
                } else {
                    out.keep(module, node);
                }
            }

            // Everything else is already scalar or control flow.
            _ => out.keep(module, node),
        }
    }

    module.blocks.get_mut(&block_id).unwrap().instructions = out.list;
    Ok(())
}
