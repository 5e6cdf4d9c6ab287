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

use std::collections::BTreeMap;

use indexmap::IndexMap;
use log::warn;

use crate::ir::{
    Block, BlockId, Constant, ConstantValue, EntryPoint, Function, Id, InsnArena, InsnRef,
    MemoryRegion, SourceInfo, TypeId, Variable, VariableInfo,
};
use crate::spv::{self, StorageClass};
use crate::types::{TypeKind, TypeRegistry};
use crate::{Error, Result};

/// Decoration kind mapped to its operands. Almost every decoration carries
/// zero or one operand; `LinkageAttributes` carries two.
pub type Decorations = BTreeMap<u32, Vec<u32>>;

/// Fixed memory map of the soft GPU core, one region per storage class.
const MEMORY_MAP: &[(StorageClass, u32, u32)] = &[
    (StorageClass::UniformConstant, 0x0000, 0x1000),
    (StorageClass::Uniform, 0x1000, 0x1000),
    (StorageClass::Input, 0x2000, 0x1000),
    (StorageClass::Output, 0x3000, 0x1000),
    (StorageClass::Private, 0x4000, 0x1000),
    (StorageClass::Function, 0x5000, 0x2000),
    (StorageClass::PushConstant, 0x7000, 0x1000),
];

/// Total size of the memory image addressed by the map above
pub const MEMORY_SIZE: u32 = 0x8000;

/// What a pointer-valued ID resolves to: a byte offset inside a variable.
/// Pointers never escape their variable's storage class.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy)]
pub struct PointerInfo {
    pub variable: Id,
    pub offset: u32,
}

/// The static state of the program: every entity parsed from the binary,
/// mutated by the transform passes, read-only during emission.
#[derive(Debug)]
pub struct Module {
    /// Treat unimplemented opcodes as fatal instead of emitting `#error#`
    pub throw_on_unimplemented: bool,
    /// Set when an unimplemented opcode was skipped in lenient mode
    pub has_unimplemented: bool,

    /// SPIR-V version from the header, `(major, minor)`
    pub version: (u8, u8),
    /// Generator magic from the header
    pub generator: u32,
    /// Header-declared ID bound; all IDs in the module are below this
    pub bound: u32,

    pub capabilities: Vec<u32>,
    /// Imported extended instruction sets
    pub ext_inst_sets: IndexMap<Id, String>,
    /// Result ID of the GLSL.std.450 import, if present
    pub glsl_std_450: Option<Id>,
    pub addressing_model: u32,
    pub memory_model: u32,
    pub entry_points: IndexMap<Id, EntryPoint>,
    /// The Fragment entry function
    pub main_function_id: Option<Id>,

    pub names: IndexMap<Id, String>,
    pub member_names: IndexMap<TypeId, BTreeMap<u32, String>>,
    pub decorations: IndexMap<Id, Decorations>,
    pub member_decorations: IndexMap<Id, BTreeMap<u32, Decorations>>,
    pub sources: Vec<SourceInfo>,
    pub strings: IndexMap<Id, String>,

    pub types: TypeRegistry,
    pub variables: IndexMap<Id, Variable>,
    pub constants: IndexMap<Id, Constant>,
    pub functions: IndexMap<Id, Function>,
    /// All blocks of all functions, keyed by their label ID
    pub blocks: IndexMap<BlockId, Block>,
    /// Type of each instruction result
    pub result_types: IndexMap<Id, TypeId>,
    /// Flattened `name -> {address, size}` for named module variables
    pub named_variables: IndexMap<String, VariableInfo>,
    pub memory_regions: IndexMap<StorageClass, MemoryRegion>,

    /// Owner of every instruction node
    pub arena: InsnArena,
    /// What each pointer-valued ID resolves to (variables and folded
    /// access chains)
    pub pointers: BTreeMap<Id, PointerInfo>,
    /// `(vector id, lane) -> scalar id` mapping built by the expander
    pub vec_lanes: BTreeMap<(Id, u32), Id>,
    next_id: Id,

    /// Flat instruction order, built by linearization after the transforms
    pub linear: Vec<InsnRef>,
    /// Linear PC of each block's first instruction
    pub labels: IndexMap<BlockId, usize>,
}

impl Module {
    pub fn new(throw_on_unimplemented: bool) -> Module {
        let mut memory_regions = IndexMap::new();
        for &(class, base, size) in MEMORY_MAP {
            memory_regions.insert(class, MemoryRegion::new(base, size));
        }
        Module {
            throw_on_unimplemented,
            has_unimplemented: false,
            version: (1, 0),
            generator: 0,
            bound: 0,
            capabilities: Vec::new(),
            ext_inst_sets: IndexMap::new(),
            glsl_std_450: None,
            addressing_model: 0,
            memory_model: 0,
            entry_points: IndexMap::new(),
            main_function_id: None,
            names: IndexMap::new(),
            member_names: IndexMap::new(),
            decorations: IndexMap::new(),
            member_decorations: IndexMap::new(),
            sources: Vec::new(),
            strings: IndexMap::new(),
            types: TypeRegistry::new(),
            variables: IndexMap::new(),
            constants: IndexMap::new(),
            functions: IndexMap::new(),
            blocks: IndexMap::new(),
            result_types: IndexMap::new(),
            named_variables: IndexMap::new(),
            memory_regions,
            arena: InsnArena::new(),
            pointers: BTreeMap::new(),
            vec_lanes: BTreeMap::new(),
            next_id: 0,
            linear: Vec::new(),
            labels: IndexMap::new(),
        }
    }

    /// Seed the fresh-ID counter above every ID the binary can mention
    pub fn set_bound(&mut self, bound: u32) {
        self.bound = bound;
        self.next_id = bound;
    }

    /// A result ID no input instruction uses, for synthesized scalars
    pub fn fresh_id(&mut self) -> Id {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Reserve room for a value of `type_id` in the region of `class`
    pub fn allocate(&mut self, class: StorageClass, type_id: TypeId) -> Result<u32> {
        let size = self.types.size_of(type_id)?;
        let region = self
            .memory_regions
            .get_mut(&class)
            .ok_or_else(|| Error::Invariant(format!("no memory region for {:?}", class)))?;
        region.allocate(size).ok_or_else(|| {
            Error::Invariant(format!(
                "out of memory in {:?} region allocating {} bytes",
                class, size
            ))
        })
    }

    /// The type of the entity, looking through results and constants.
    /// Returns `None` for IDs with no register type (labels, variables).
    pub fn type_id_of(&self, id: Id) -> Option<TypeId> {
        if let Some(&type_id) = self.result_types.get(&id) {
            return Some(type_id);
        }
        self.constants.get(&id).map(|constant| constant.type_id)
    }

    /// Whether this register is a constant
    pub fn is_constant(&self, id: Id) -> bool {
        self.constants.contains_key(&id)
    }

    /// The value of `id` as an integer constant, if it is one
    pub fn as_integer_constant(&self, id: Id) -> Option<u32> {
        match self.constants.get(&id)?.value {
            ConstantValue::I32(v) => Some(v as u32),
            ConstantValue::U32(v) => Some(v),
            _ => None,
        }
    }

    /// The declared name of an entity
    pub fn name_of(&self, id: Id) -> Option<&str> {
        self.names.get(&id).map(String::as_str)
    }

    /// The `Offset` decoration of a struct member, if declared
    pub fn member_offset(&self, type_id: TypeId, member: u32) -> Option<u32> {
        self.member_decorations
            .get(&type_id)?
            .get(&member)?
            .get(&spv::dec::OFFSET)?
            .first()
            .copied()
    }

    /// Function names arrive mangled from the front end (`main(`,
    /// `length(vf3;`). Everything from the first `(` is dropped and the
    /// rest is made label-safe.
    pub fn clean_function_name(&self, id: Id) -> String {
        let raw = self.name_of(id).unwrap_or("");
        let stem: &str = raw.split('(').next().unwrap_or("");
        let cleaned: String = stem
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '.' { c } else { '_' })
            .collect();
        if cleaned.is_empty() {
            format!(".F{}", id)
        } else {
            cleaned
        }
    }

    /// Flatten a named variable into `name -> {address, size}` entries:
    /// structs recurse through member names and offsets, arrays through
    /// indexed elements, scalars and vectors land directly.
    pub fn store_named_variable_info(
        &mut self,
        name: &str,
        type_id: TypeId,
        address: u32,
    ) -> Result<()> {
        let kind = self.types.get(type_id)?.kind.clone();
        match kind {
            TypeKind::Struct { members, offsets } => {
                for (index, &member) in members.iter().enumerate() {
                    let member_name = self
                        .member_names
                        .get(&type_id)
                        .and_then(|names| names.get(&(index as u32)))
                        .cloned()
                        .unwrap_or_else(|| index.to_string());
                    let full = if name.is_empty() {
                        member_name
                    } else {
                        format!("{}.{}", name, member_name)
                    };
                    let offset = self
                        .member_offset(type_id, index as u32)
                        .unwrap_or(offsets[index]);
                    self.store_named_variable_info(&full, member, address + offset)?;
                }
            }
            TypeKind::Array { elem, count } => {
                let elem_size = self.types.size_of(elem)?;
                for index in 0..count {
                    let full = format!("{}[{}]", name, index);
                    self.store_named_variable_info(&full, elem, address + index * elem_size)?;
                }
            }
            TypeKind::Bool
            | TypeKind::Int { .. }
            | TypeKind::Float { .. }
            | TypeKind::Vector { .. }
            | TypeKind::Matrix { .. }
            | TypeKind::SampledImage { .. } => {
                let size = self.types.size_of(type_id)?;
                self.named_variables
                    .insert(name.to_string(), VariableInfo { address, size });
            }
            _ => {
                warn!("unhandled type for named variable {:?}", name);
            }
        }
        Ok(())
    }

    /// Absolute address a pointer ID refers to
    pub fn pointer_address(&self, id: Id) -> Option<u32> {
        let info = self.pointers.get(&id)?;
        let var = self.variables.get(&info.variable)?;
        Some(var.address + info.offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocation_bumps_per_class() {
        let mut module = Module::new(true);
        module.types.intern(1, TypeKind::Float { width: 32 }).unwrap();
        module
            .types
            .intern(2, TypeKind::Vector { elem: 1, count: 4 })
            .unwrap();
        let a = module.allocate(StorageClass::Input, 2).unwrap();
        let b = module.allocate(StorageClass::Input, 1).unwrap();
        let c = module.allocate(StorageClass::Output, 1).unwrap();
        assert_eq!(a, 0x2000);
        assert_eq!(b, 0x2010);
        assert_eq!(c, 0x3000);
    }

    #[test]
    fn fresh_ids_start_at_bound() {
        let mut module = Module::new(true);
        module.set_bound(100);
        assert_eq!(module.fresh_id(), 100);
        assert_eq!(module.fresh_id(), 101);
    }

    #[test]
    fn type_lookup_covers_results_and_constants() {
        let mut module = Module::new(true);
        module.types.intern(1, TypeKind::Float { width: 32 }).unwrap();
        module.result_types.insert(20, 1);
        module.constants.insert(
            21,
            Constant {
                type_id: 1,
                value: ConstantValue::F32(0.5),
            },
        );
        assert_eq!(module.type_id_of(20), Some(1));
        assert_eq!(module.type_id_of(21), Some(1));
        assert_eq!(module.type_id_of(22), None);
        assert!(module.is_constant(21));
        assert!(!module.is_constant(20));
    }

    #[test]
    fn function_names_are_cleaned() {
        let mut module = Module::new(true);
        module.names.insert(4, "main(".to_string());
        module.names.insert(5, "length(vf3;".to_string());
        assert_eq!(module.clean_function_name(4), "main");
        assert_eq!(module.clean_function_name(5), "length");
        assert_eq!(module.clean_function_name(9), ".F9");
    }

    #[test]
    fn named_struct_members_are_flattened() {
        let mut module = Module::new(true);
        module.types.intern(1, TypeKind::Float { width: 32 }).unwrap();
        module
            .types
            .intern(2, TypeKind::Vector { elem: 1, count: 2 })
            .unwrap();
        module
            .types
            .intern(
                3,
                TypeKind::Struct {
                    members: vec![1, 2],
                    offsets: vec![0, 4],
                },
            )
            .unwrap();
        let mut names = BTreeMap::new();
        names.insert(0, "iTime".to_string());
        names.insert(1, "iResolution".to_string());
        module.member_names.insert(3, names);
        module.store_named_variable_info("params", 3, 0x1000).unwrap();
        let time = module.named_variables.get("params.iTime").unwrap();
        assert_eq!((time.address, time.size), (0x1000, 4));
        let res = module.named_variables.get("params.iResolution").unwrap();
        assert_eq!((res.address, res.size), (0x1004, 8));
    }
}
