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
use std::ops::{Index, IndexMut};

use crate::spv::{FunctionControl, StorageClass};

/// SPIR-V result ID
pub type Id = u32;
/// ID of a type-declaring instruction
pub type TypeId = u32;
/// ID of the `OpLabel` opening a basic block
pub type BlockId = u32;

/// Sentinel for "no block" (entry blocks have no immediate dominator)
pub const NO_BLOCK_ID: BlockId = 0xffff_ffff;
/// Sentinel file/line/column for instructions with no source info
pub const NO_FILE: u32 = 0xffff_ffff;
pub const NO_LINE: u32 = 0xffff_ffff;
pub const NO_COLUMN: u32 = 0xffff_ffff;

/// Key in a keyed live-in map meaning "from any predecessor". Result IDs
/// start at 1, so 0 can never collide with a real block.
pub const ANY_BLOCK: BlockId = 0;

/// Which file, line, and column an instruction came from
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineInfo {
    pub file_id: u32,
    pub line: u32,
    pub column: u32,
}

impl Default for LineInfo {
    fn default() -> LineInfo {
        LineInfo {
            file_id: NO_FILE,
            line: NO_LINE,
            column: NO_COLUMN,
        }
    }
}

/// A variable in memory, either module-scope or within a function's frame
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone)]
pub struct Variable {
    /// Type of the variable itself (not the pointer to it)
    pub type_id: TypeId,
    /// Where the variable lives
    pub storage_class: StorageClass,
    /// Optional initializer constant
    pub initializer: Option<Id>,
    /// Address within the memory region of `storage_class`
    pub address: u32,
}

/// Flattened `name -> location` entry for a named variable or member
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy)]
pub struct VariableInfo {
    pub address: u32,
    pub size: u32,
}

/// Entry point for the shader; only the Fragment execution model is accepted
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone)]
pub struct EntryPoint {
    pub execution_model: u32,
    pub function_id: Id,
    pub name: String,
    pub interface_ids: Vec<Id>,
    pub execution_modes: BTreeMap<u32, Vec<u32>>,
}

/// Information about one source string of the shader
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone)]
pub struct SourceInfo {
    pub language: u32,
    pub version: u32,
    pub file_id: Option<Id>,
    pub text: Option<String>,
}

/// Typed value of a module-scope constant
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub enum ConstantValue {
    Bool(bool),
    I32(i32),
    U32(u32),
    F32(f32),
    /// Sub-element constant IDs, in order
    Composite(Vec<Id>),
}

impl ConstantValue {
    /// Raw 32-bit image of a scalar constant, as it goes into a `.word`
    pub fn to_word(&self) -> Option<u32> {
        match *self {
            ConstantValue::Bool(b) => Some(b as u32),
            ConstantValue::I32(v) => Some(v as u32),
            ConstantValue::U32(v) => Some(v),
            ConstantValue::F32(v) => Some(v.to_bits()),
            ConstantValue::Composite(_) => None,
        }
    }
}

/// A module-scope constant
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone)]
pub struct Constant {
    pub type_id: TypeId,
    pub value: ConstantValue,
}

/// Section of memory reserved for one storage class, bump-allocated
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy)]
pub struct MemoryRegion {
    /// Offset of the region within the flat memory array
    pub base: u32,
    /// Size of the region
    pub size: u32,
    /// Offset of the next allocation
    pub top: u32,
}

impl MemoryRegion {
    pub fn new(base: u32, size: u32) -> MemoryRegion {
        MemoryRegion {
            base,
            size,
            top: base,
        }
    }

    /// Reserve `size` bytes, returning their address
    pub fn allocate(&mut self, size: u32) -> Option<u32> {
        if self.top + size > self.base + self.size {
            return None;
        }
        let address = self.top;
        self.top += size;
        Some(address)
    }
}

/// Unary operators, including the one-argument GLSL.std.450 instructions
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    FNegate,
    SNegate,
    LogicalNot,
    ConvertFToS,
    ConvertFToU,
    ConvertSToF,
    ConvertUToF,
    Bitcast,
    CopyObject,
    Round,
    Trunc,
    FAbs,
    SAbs,
    FSign,
    Floor,
    Ceil,
    Fract,
    Radians,
    Degrees,
    Sin,
    Cos,
    Tan,
    Asin,
    Acos,
    Atan,
    Exp,
    Log,
    Exp2,
    Log2,
    Sqrt,
    InverseSqrt,
}

impl UnOp {
    pub fn name(self) -> &'static str {
        match self {
            UnOp::FNegate => "fnegate",
            UnOp::SNegate => "snegate",
            UnOp::LogicalNot => "lognot",
            UnOp::ConvertFToS => "ftos",
            UnOp::ConvertFToU => "ftou",
            UnOp::ConvertSToF => "stof",
            UnOp::ConvertUToF => "utof",
            UnOp::Bitcast => "bitcast",
            UnOp::CopyObject => "copy",
            UnOp::Round => "round",
            UnOp::Trunc => "trunc",
            UnOp::FAbs => "fabs",
            UnOp::SAbs => "sabs",
            UnOp::FSign => "fsign",
            UnOp::Floor => "floor",
            UnOp::Ceil => "ceil",
            UnOp::Fract => "fract",
            UnOp::Radians => "radians",
            UnOp::Degrees => "degrees",
            UnOp::Sin => "sin",
            UnOp::Cos => "cos",
            UnOp::Tan => "tan",
            UnOp::Asin => "asin",
            UnOp::Acos => "acos",
            UnOp::Atan => "atan",
            UnOp::Exp => "exp",
            UnOp::Log => "log",
            UnOp::Exp2 => "exp2",
            UnOp::Log2 => "log2",
            UnOp::Sqrt => "sqrt",
            UnOp::InverseSqrt => "inversesqrt",
        }
    }
}

/// Binary operators, including the two-argument GLSL.std.450 instructions
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    FAdd,
    FSub,
    FMul,
    FDiv,
    FMod,
    IAdd,
    ISub,
    IMul,
    SDiv,
    UDiv,
    SRem,
    SMod,
    UMod,
    LogicalAnd,
    LogicalOr,
    FOrdEqual,
    FOrdNotEqual,
    FOrdLessThan,
    FOrdGreaterThan,
    FOrdLessThanEqual,
    FOrdGreaterThanEqual,
    IEqual,
    INotEqual,
    SLessThan,
    SGreaterThan,
    SLessThanEqual,
    SGreaterThanEqual,
    ULessThan,
    UGreaterThan,
    ULessThanEqual,
    UGreaterThanEqual,
    Atan2,
    Pow,
    FMin,
    FMax,
    Step,
}

impl BinOp {
    pub fn name(self) -> &'static str {
        match self {
            BinOp::FAdd => "fadd",
            BinOp::FSub => "fsub",
            BinOp::FMul => "fmul",
            BinOp::FDiv => "fdiv",
            BinOp::FMod => "fmod",
            BinOp::IAdd => "add",
            BinOp::ISub => "sub",
            BinOp::IMul => "mul",
            BinOp::SDiv => "div",
            BinOp::UDiv => "divu",
            BinOp::SRem => "rem",
            BinOp::SMod => "smod",
            BinOp::UMod => "remu",
            BinOp::LogicalAnd => "and",
            BinOp::LogicalOr => "or",
            BinOp::FOrdEqual => "feq",
            BinOp::FOrdNotEqual => "fne",
            BinOp::FOrdLessThan => "flt",
            BinOp::FOrdGreaterThan => "fgt",
            BinOp::FOrdLessThanEqual => "fle",
            BinOp::FOrdGreaterThanEqual => "fge",
            BinOp::IEqual => "ieq",
            BinOp::INotEqual => "ine",
            BinOp::SLessThan => "slt",
            BinOp::SGreaterThan => "sgt",
            BinOp::SLessThanEqual => "sle",
            BinOp::SGreaterThanEqual => "sge",
            BinOp::ULessThan => "ult",
            BinOp::UGreaterThan => "ugt",
            BinOp::ULessThanEqual => "ule",
            BinOp::UGreaterThanEqual => "uge",
            BinOp::Atan2 => "atan2",
            BinOp::Pow => "pow",
            BinOp::FMin => "fmin",
            BinOp::FMax => "fmax",
            BinOp::Step => "step",
        }
    }
}

/// Ternary operators
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TernOp {
    /// `a ? b : c`, `a` of boolean type
    Select,
    /// `clamp(a, b, c)`
    FClamp,
    /// `a * (1 - c) + b * c`
    FMix,
    /// `smoothstep(a, b, c)`
    SmoothStep,
}

impl TernOp {
    pub fn name(self) -> &'static str {
        match self {
            TernOp::Select => "select",
            TernOp::FClamp => "fclamp",
            TernOp::FMix => "fmix",
            TernOp::SmoothStep => "smoothstep",
        }
    }
}

/// Instruction payload, tagged by opcode shape.
///
/// ALU opcodes collapse into the kind-parameterized `Unary`/`Binary`/
/// `Ternary` forms so the vector expander and the emitter can treat a whole
/// family with one arm. Pointer operands (`Load::pointer`, `Store::pointer`,
/// `AccessChain::base`) are not SSA registers and do not appear in the
/// argument lists.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    Unary { kind: UnOp, src: Id },
    Binary { kind: BinOp, lhs: Id, rhs: Id },
    Ternary { kind: TernOp, a: Id, b: Id, c: Id },
    /// Read through a pointer; `offset` is a byte displacement added by the
    /// vector expander when a wide load is split into lanes
    Load { pointer: Id, offset: u32 },
    /// Write through a pointer
    Store { pointer: Id, object: Id, offset: u32 },
    AccessChain { base: Id, indexes: Vec<Id> },
    CompositeConstruct { constituents: Vec<Id> },
    CompositeExtract { composite: Id, indexes: Vec<u32> },
    VectorShuffle { v1: Id, v2: Id, components: Vec<u32> },
    Dot { lhs: Id, rhs: Id },
    VectorTimesScalar { vector: Id, scalar: Id },
    MatrixTimesVector { matrix: Id, vector: Id },
    /// Vector-wide GLSL.std.450 forms, decomposed by the expander
    Length { src: Id },
    Distance { lhs: Id, rhs: Id },
    Cross { lhs: Id, rhs: Id },
    Normalize { src: Id },
    Reflect { incident: Id, normal: Id },
    FunctionCall { function: Id, args: Vec<Id> },
    Phi { pairs: Vec<(Id, BlockId)> },
    Branch { target: BlockId },
    BranchConditional { cond: Id, true_target: BlockId, false_target: BlockId },
    Return,
    ReturnValue { value: Id },
    Kill,
    Unreachable,
    /// Integer add with a small immediate, produced by the peephole
    AddImm { src: Id, imm: i32 },
    /// Parsed but not compilable; emits an `#error#` placeholder
    Unimplemented { opcode: u16 },
}

impl Op {
    /// Name of the operation, used in emitted comments and diagnostics
    pub fn name(&self) -> &'static str {
        match self {
            Op::Unary { kind, .. } => kind.name(),
            Op::Binary { kind, .. } => kind.name(),
            Op::Ternary { kind, .. } => kind.name(),
            Op::Load { .. } => "load",
            Op::Store { .. } => "store",
            Op::AccessChain { .. } => "accesschain",
            Op::CompositeConstruct { .. } => "construct",
            Op::CompositeExtract { .. } => "extract",
            Op::VectorShuffle { .. } => "shuffle",
            Op::Dot { .. } => "dot",
            Op::VectorTimesScalar { .. } => "vecscale",
            Op::MatrixTimesVector { .. } => "matvec",
            Op::Length { .. } => "length",
            Op::Distance { .. } => "distance",
            Op::Cross { .. } => "cross",
            Op::Normalize { .. } => "normalize",
            Op::Reflect { .. } => "reflect",
            Op::FunctionCall { .. } => "call",
            Op::Phi { .. } => "phi",
            Op::Branch { .. } => "branch",
            Op::BranchConditional { .. } => "branchcond",
            Op::Return => "return",
            Op::ReturnValue { .. } => "returnvalue",
            Op::Kill => "kill",
            Op::Unreachable => "unreachable",
            Op::AddImm { .. } => "addi",
            Op::Unimplemented { .. } => "unimplemented",
        }
    }

    /// SSA register IDs this operation reads, in operand order
    pub fn operand_ids(&self) -> Vec<Id> {
        match self {
            Op::Unary { src, .. }
            | Op::Length { src }
            | Op::Normalize { src }
            | Op::AddImm { src, .. }
            | Op::ReturnValue { value: src } => vec![*src],
            Op::Binary { lhs, rhs, .. }
            | Op::Dot { lhs, rhs }
            | Op::Distance { lhs, rhs }
            | Op::Cross { lhs, rhs } => vec![*lhs, *rhs],
            Op::Ternary { a, b, c, .. } => vec![*a, *b, *c],
            Op::Load { .. } => vec![],
            Op::Store { object, .. } => vec![*object],
            Op::AccessChain { indexes, .. } => indexes.clone(),
            Op::CompositeConstruct { constituents } => constituents.clone(),
            Op::CompositeExtract { composite, .. } => vec![*composite],
            Op::VectorShuffle { v1, v2, .. } => vec![*v1, *v2],
            Op::VectorTimesScalar { vector, scalar } => vec![*vector, *scalar],
            Op::MatrixTimesVector { matrix, vector } => vec![*matrix, *vector],
            Op::Reflect { incident, normal } => vec![*incident, *normal],
            Op::FunctionCall { args, .. } => args.clone(),
            Op::Phi { pairs } => pairs.iter().map(|&(value, _)| value).collect(),
            Op::BranchConditional { cond, .. } => vec![*cond],
            Op::Branch { .. }
            | Op::Return
            | Op::Kill
            | Op::Unreachable
            | Op::Unimplemented { .. } => vec![],
        }
    }

    /// Label IDs this operation may branch to
    pub fn branch_targets(&self) -> Vec<BlockId> {
        match self {
            Op::Branch { target } => vec![*target],
            Op::BranchConditional {
                true_target,
                false_target,
                ..
            } => vec![*true_target, *false_target],
            _ => vec![],
        }
    }

    /// Whether this is a branch (targets another block or leaves the
    /// function)
    pub fn is_branch(&self) -> bool {
        matches!(
            self,
            Op::Branch { .. }
                | Op::BranchConditional { .. }
                | Op::Return
                | Op::ReturnValue { .. }
        )
    }

    /// Whether this terminates a block (branch, kill, or unreachable)
    pub fn is_terminator(&self) -> bool {
        self.is_branch() || matches!(self, Op::Kill | Op::Unreachable)
    }

    /// Rewrite every read of `old` to `new`, preserving multiplicity.
    /// Returns the number of occurrences replaced.
    pub fn replace_id(&mut self, old: Id, new: Id) -> usize {
        let mut replace = |id: &mut Id| {
            if *id == old {
                *id = new;
                1
            } else {
                0
            }
        };
        match self {
            Op::Unary { src, .. }
            | Op::Length { src }
            | Op::Normalize { src }
            | Op::AddImm { src, .. }
            | Op::ReturnValue { value: src } => replace(src),
            Op::Binary { lhs, rhs, .. }
            | Op::Dot { lhs, rhs }
            | Op::Distance { lhs, rhs }
            | Op::Cross { lhs, rhs } => replace(lhs) + replace(rhs),
            Op::Ternary { a, b, c, .. } => replace(a) + replace(b) + replace(c),
            Op::Store { object, .. } => replace(object),
            Op::AccessChain { indexes, .. } => {
                indexes.iter_mut().map(replace).sum()
            }
            Op::CompositeConstruct { constituents } => {
                constituents.iter_mut().map(replace).sum()
            }
            Op::CompositeExtract { composite, .. } => replace(composite),
            Op::VectorShuffle { v1, v2, .. } => replace(v1) + replace(v2),
            Op::VectorTimesScalar { vector, scalar } => {
                replace(vector) + replace(scalar)
            }
            Op::MatrixTimesVector { matrix, vector } => {
                replace(matrix) + replace(vector)
            }
            Op::Reflect { incident, normal } => replace(incident) + replace(normal),
            Op::FunctionCall { args, .. } => args.iter_mut().map(replace).sum(),
            Op::Phi { pairs } => {
                pairs.iter_mut().map(|(value, _)| replace(value)).sum()
            }
            Op::BranchConditional { cond, .. } => replace(cond),
            Op::Load { .. }
            | Op::Branch { .. }
            | Op::Return
            | Op::Kill
            | Op::Unreachable
            | Op::Unimplemented { .. } => 0,
        }
    }
}

/// One IR instruction: a uniform header plus the per-opcode payload.
///
/// The argument and result IDs are kept both as ordered lists and as sets;
/// the sets must always equal the set of list elements.
#[derive(Debug, Clone)]
pub struct Instruction {
    /// Source line this instruction came from
    pub line: LineInfo,
    /// Type of the result, if the opcode produces one
    pub result_type: Option<TypeId>,
    pub op: Op,
    res_list: Vec<Id>,
    res_set: BTreeSet<Id>,
    arg_list: Vec<Id>,
    arg_set: BTreeSet<Id>,
    /// Label IDs this instruction may branch to
    pub targets: BTreeSet<BlockId>,
    /// Registers live going into this instruction, keyed by the block
    /// control came from ([`ANY_BLOCK`] for straight-line flow)
    pub livein: BTreeMap<BlockId, BTreeSet<Id>>,
    /// Registers live leaving this instruction
    pub liveout: BTreeSet<Id>,
    /// Whether liveness must be recomputed for this instruction
    pub dirty: bool,
    prev: Option<InsnRef>,
    next: Option<InsnRef>,
    owner: Option<u32>,
}

impl Instruction {
    pub fn new(line: LineInfo, result_type: Option<TypeId>, result: Option<Id>, op: Op) -> Instruction {
        let arg_list = op.operand_ids();
        let arg_set = arg_list.iter().copied().collect();
        let res_list: Vec<Id> = result.into_iter().collect();
        let res_set = res_list.iter().copied().collect();
        let targets = op.branch_targets().into_iter().collect();
        Instruction {
            line,
            result_type,
            op,
            res_list,
            res_set,
            arg_list,
            arg_set,
            targets,
            livein: BTreeMap::new(),
            liveout: BTreeSet::new(),
            dirty: false,
            prev: None,
            next: None,
            owner: None,
        }
    }

    /// The single result ID, if any
    pub fn result_id(&self) -> Option<Id> {
        self.res_list.first().copied()
    }

    pub fn results(&self) -> &[Id] {
        &self.res_list
    }

    pub fn result_set(&self) -> &BTreeSet<Id> {
        &self.res_set
    }

    pub fn args(&self) -> &[Id] {
        &self.arg_list
    }

    pub fn arg_set(&self) -> &BTreeSet<Id> {
        &self.arg_set
    }

    /// Whether the instruction writes the register
    pub fn affects_register(&self, id: Id) -> bool {
        self.res_set.contains(&id)
    }

    /// Whether the instruction reads the register
    pub fn uses_register(&self, id: Id) -> bool {
        self.arg_set.contains(&id)
    }

    /// Replace every use of `old` with `new` in the argument list, set, and
    /// payload. Panics if `old` is not currently used.
    pub fn change_arg(&mut self, old: Id, new: Id) {
        assert!(self.uses_register(old), "change_arg: r{} is not an argument", old);
        let mut found = 0;
        for arg in self.arg_list.iter_mut() {
            if *arg == old {
                *arg = new;
                found += 1;
            }
        }
        assert!(found > 0);
        let replaced = self.op.replace_id(old, new);
        assert_eq!(found, replaced);
        self.arg_set = self.arg_list.iter().copied().collect();
    }

    /// Union of the keyed live-in sets
    pub fn livein_all(&self) -> BTreeSet<Id> {
        let mut all = BTreeSet::new();
        for set in self.livein.values() {
            all.extend(set.iter().copied());
        }
        all
    }
}

/// Index of an instruction node in the [`InsnArena`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InsnRef(u32);

/// Owner of every instruction node. Lists refer to nodes by index, so
/// moving an instruction between lists never touches the node's storage.
#[derive(Debug, Default)]
pub struct InsnArena {
    nodes: Vec<Instruction>,
    next_list: u32,
}

impl InsnArena {
    pub fn new() -> InsnArena {
        InsnArena::default()
    }

    pub fn alloc(&mut self, insn: Instruction) -> InsnRef {
        let r = InsnRef(self.nodes.len() as u32);
        self.nodes.push(insn);
        r
    }

    /// A fresh, empty list with a unique owner ID
    pub fn new_list(&mut self) -> InstructionList {
        let id = self.next_list;
        self.next_list += 1;
        InstructionList {
            id,
            head: None,
            tail: None,
        }
    }
}

impl Index<InsnRef> for InsnArena {
    type Output = Instruction;

    fn index(&self, r: InsnRef) -> &Instruction {
        &self.nodes[r.0 as usize]
    }
}

impl IndexMut<InsnRef> for InsnArena {
    fn index_mut(&mut self, r: InsnRef) -> &mut Instruction {
        &mut self.nodes[r.0 as usize]
    }
}

/// A doubly-linked list of instructions, linked through the arena.
///
/// A node is in at most one list; it must be removed before it can be added
/// to another.
#[derive(Debug)]
pub struct InstructionList {
    id: u32,
    head: Option<InsnRef>,
    tail: Option<InsnRef>,
}

impl InstructionList {
    pub fn head(&self) -> Option<InsnRef> {
        self.head
    }

    pub fn tail(&self) -> Option<InsnRef> {
        self.tail
    }

    pub fn is_empty(&self) -> bool {
        debug_assert_eq!(self.head.is_none(), self.tail.is_none());
        self.head.is_none()
    }

    /// Whether this list owns the node
    pub fn owns(&self, arena: &InsnArena, r: InsnRef) -> bool {
        arena[r].owner == Some(self.id)
    }

    fn prepare_for_add(&self, arena: &mut InsnArena, r: InsnRef) {
        let node = &mut arena[r];
        assert!(node.owner.is_none(), "instruction is already in a list");
        assert!(node.prev.is_none());
        assert!(node.next.is_none());
        node.owner = Some(self.id);
    }

    /// Add an instruction to the end of this list
    pub fn push_back(&mut self, arena: &mut InsnArena, r: InsnRef) {
        self.prepare_for_add(arena, r);
        match self.tail {
            Some(tail) => {
                arena[tail].next = Some(r);
                arena[r].prev = Some(tail);
            }
            None => {
                self.head = Some(r);
            }
        }
        self.tail = Some(r);
    }

    /// Add an instruction before `before`
    pub fn insert_before(&mut self, arena: &mut InsnArena, r: InsnRef, before: InsnRef) {
        assert!(self.owns(arena, before), "insertion point is not in this list");
        self.prepare_for_add(arena, r);
        let prev = arena[before].prev;
        arena[before].prev = Some(r);
        arena[r].next = Some(before);
        arena[r].prev = prev;
        match prev {
            Some(prev) => arena[prev].next = Some(r),
            None => {
                assert_eq!(self.head, Some(before));
                self.head = Some(r);
            }
        }
    }

    /// Unlink an instruction from this list
    pub fn remove(&mut self, arena: &mut InsnArena, r: InsnRef) {
        assert!(self.owns(arena, r), "instruction is not in this list");
        let (prev, next) = (arena[r].prev, arena[r].next);
        match prev {
            Some(prev) => arena[prev].next = next,
            None => {
                assert_eq!(self.head, Some(r));
                self.head = next;
            }
        }
        match next {
            Some(next) => arena[next].prev = prev,
            None => {
                assert_eq!(self.tail, Some(r));
                self.tail = prev;
            }
        }
        let node = &mut arena[r];
        node.prev = None;
        node.next = None;
        node.owner = None;
    }

    /// The number of instructions in the list. Counts both directions and
    /// asserts they agree. Takes O(n).
    pub fn len(&self, arena: &InsnArena) -> usize {
        let mut forward = 0;
        let mut cursor = self.head;
        while let Some(r) = cursor {
            forward += 1;
            cursor = arena[r].next;
        }
        let mut backward = 0;
        let mut cursor = self.tail;
        while let Some(r) = cursor {
            backward += 1;
            cursor = arena[r].prev;
        }
        assert_eq!(forward, backward);
        forward
    }

    /// Node references in order, front to back
    pub fn refs(&self, arena: &InsnArena) -> Vec<InsnRef> {
        let mut out = Vec::new();
        let mut cursor = self.head;
        while let Some(r) = cursor {
            out.push(r);
            cursor = arena[r].next;
        }
        out
    }
}

/// A basic block: one entry (the first instruction), one exit (the last
/// instruction, which must be a terminator)
#[derive(Debug)]
pub struct Block {
    /// ID of the label that opens this block
    pub block_id: BlockId,
    pub instructions: InstructionList,
    /// Function this block belongs to
    pub function_id: Id,
    /// Predecessor block IDs; empty only for a function's entry block
    pub pred: BTreeSet<BlockId>,
    /// Successor block IDs
    pub succ: BTreeSet<BlockId>,
    /// Block IDs that dominate this block
    pub dom: BTreeSet<BlockId>,
    /// Immediate dominator, or [`NO_BLOCK_ID`] for the entry block
    pub idom: BlockId,
    /// Children in the immediate-dominator tree
    pub idom_children: Vec<BlockId>,
    /// First linear PC of this block, set by linearization
    pub begin: usize,
    /// One past the last linear PC of this block
    pub end: usize,
}

impl Block {
    pub fn new(block_id: BlockId, function_id: Id, instructions: InstructionList) -> Block {
        Block {
            block_id,
            instructions,
            function_id,
            pred: BTreeSet::new(),
            succ: BTreeSet::new(),
            dom: BTreeSet::new(),
            idom: NO_BLOCK_ID,
            idom_children: Vec::new(),
            begin: 0,
            end: 0,
        }
    }

    /// Whether this block is dominated by `other`
    pub fn is_dominated_by(&self, other: BlockId) -> bool {
        self.dom.contains(&other)
    }
}

/// A function: an entry block plus the blocks reachable from it
#[derive(Debug)]
pub struct Function {
    pub id: Id,
    /// The function's `OpTypeFunction`
    pub type_id: TypeId,
    pub result_type: TypeId,
    /// `OpFunction` control mask (inline hints and the like)
    pub control: FunctionControl,
    /// `(id, type)` of each `OpFunctionParameter`, in order
    pub parameters: Vec<(Id, TypeId)>,
    /// Label of the entry block
    pub entry_block: BlockId,
    /// Labels of all blocks, in declaration order
    pub block_ids: Vec<BlockId>,
    /// Linear PC of the first instruction, set by linearization
    pub pc_start: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dummy(op: Op) -> Instruction {
        Instruction::new(LineInfo::default(), None, None, op)
    }

    #[test]
    fn list_push_remove_counts() {
        let mut arena = InsnArena::new();
        let mut list = arena.new_list();
        let a = arena.alloc(dummy(Op::Return));
        let b = arena.alloc(dummy(Op::Kill));
        let c = arena.alloc(dummy(Op::Unreachable));
        list.push_back(&mut arena, a);
        list.push_back(&mut arena, b);
        list.push_back(&mut arena, c);
        assert_eq!(list.len(&arena), 3);
        assert_eq!(list.refs(&arena), vec![a, b, c]);

        list.remove(&mut arena, b);
        assert_eq!(list.len(&arena), 2);
        assert_eq!(list.refs(&arena), vec![a, c]);
        assert!(!list.owns(&arena, b));

        list.remove(&mut arena, a);
        list.remove(&mut arena, c);
        assert!(list.is_empty());
        assert_eq!(list.len(&arena), 0);
    }

    #[test]
    fn list_insert_before_head_and_middle() {
        let mut arena = InsnArena::new();
        let mut list = arena.new_list();
        let a = arena.alloc(dummy(Op::Return));
        let b = arena.alloc(dummy(Op::Kill));
        let c = arena.alloc(dummy(Op::Unreachable));
        list.push_back(&mut arena, b);
        list.insert_before(&mut arena, a, b);
        assert_eq!(list.refs(&arena), vec![a, b]);
        list.insert_before(&mut arena, c, b);
        assert_eq!(list.refs(&arena), vec![a, c, b]);
        assert_eq!(list.head(), Some(a));
        assert_eq!(list.tail(), Some(b));
        assert_eq!(list.len(&arena), 3);
    }

    #[test]
    fn node_moves_between_lists_only_after_removal() {
        let mut arena = InsnArena::new();
        let mut first = arena.new_list();
        let mut second = arena.new_list();
        let a = arena.alloc(dummy(Op::Return));
        first.push_back(&mut arena, a);
        assert!(first.owns(&arena, a));
        first.remove(&mut arena, a);
        second.push_back(&mut arena, a);
        assert!(second.owns(&arena, a));
        assert!(!first.owns(&arena, a));
    }

    #[test]
    #[should_panic(expected = "already in a list")]
    fn double_add_panics() {
        let mut arena = InsnArena::new();
        let mut first = arena.new_list();
        let mut second = arena.new_list();
        let a = arena.alloc(dummy(Op::Return));
        first.push_back(&mut arena, a);
        second.push_back(&mut arena, a);
    }

    #[test]
    fn change_arg_preserves_multiplicity() {
        let mut insn = dummy(Op::Binary {
            kind: BinOp::FMul,
            lhs: 7,
            rhs: 7,
        });
        assert_eq!(insn.args(), &[7, 7]);
        insn.change_arg(7, 9);
        assert_eq!(insn.args(), &[9, 9]);
        assert!(insn.uses_register(9));
        assert!(!insn.uses_register(7));
        assert_eq!(
            insn.op,
            Op::Binary {
                kind: BinOp::FMul,
                lhs: 9,
                rhs: 9,
            }
        );
    }

    #[test]
    fn arg_set_matches_arg_list() {
        let insn = dummy(Op::Phi {
            pairs: vec![(4, 10), (5, 11), (4, 12)],
        });
        assert_eq!(insn.args(), &[4, 5, 4]);
        let set: Vec<Id> = insn.arg_set().iter().copied().collect();
        assert_eq!(set, vec![4, 5]);
    }

    #[test]
    fn memory_region_bumps_and_overflows() {
        let mut region = MemoryRegion::new(0x100, 0x10);
        assert_eq!(region.allocate(8), Some(0x100));
        assert_eq!(region.allocate(8), Some(0x108));
        assert_eq!(region.allocate(1), None);
    }
}
