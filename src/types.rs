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

use indexmap::IndexMap;

use crate::ir::TypeId;
use crate::spv::StorageClass;
use crate::{Error, Result};

/// The kind of a SPIR-V type, with the IDs of its constituents
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeKind {
    Void,
    Bool,
    Int { width: u32, signed: bool },
    Float { width: u32 },
    /// `count` elements of `elem`, laid out flat
    Vector { elem: TypeId, count: u32 },
    /// Column-major matrix: `columns` column vectors of type `column`.
    /// The element at (row, col) sits at flat index `col * rows + row`.
    Matrix { column: TypeId, columns: u32 },
    Array { elem: TypeId, count: u32 },
    /// Member byte offsets are fixed at intern time, from member sizes or an
    /// explicit `Offset` decoration
    Struct { members: Vec<TypeId>, offsets: Vec<u32> },
    Pointer { pointee: TypeId, storage_class: StorageClass },
    Function { return_type: TypeId, parameters: Vec<TypeId> },
    Image { sampled_type: TypeId, dim: u32, depth: u32, arrayed: u32, ms: u32, sampled: u32, format: u32 },
    SampledImage { image: TypeId },
}

/// A SPIR-V type with its byte footprint
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Type {
    pub kind: TypeKind,
    /// Number of bytes an object of this type occupies
    pub size: u32,
}

/// Interns types keyed by their SPIR-V result ID, in declaration order
#[derive(Debug, Default)]
pub struct TypeRegistry {
    types: IndexMap<TypeId, Type>,
}

impl TypeRegistry {
    pub fn new() -> TypeRegistry {
        TypeRegistry::default()
    }

    /// Register a type under its result ID. Types are declared before use,
    /// so every constituent must already be present.
    pub fn intern(&mut self, id: TypeId, kind: TypeKind) -> Result<()> {
        let size = self.compute_size(&kind)?;
        self.types.insert(id, Type { kind, size });
        Ok(())
    }

    fn compute_size(&self, kind: &TypeKind) -> Result<u32> {
        Ok(match kind {
            TypeKind::Void => 0,
            TypeKind::Bool => 1,
            TypeKind::Int { .. } | TypeKind::Float { .. } => 4,
            TypeKind::Vector { elem, count } => self.size_of(*elem)? * count,
            TypeKind::Matrix { column, columns } => self.size_of(*column)? * columns,
            TypeKind::Array { elem, count } => self.size_of(*elem)? * count,
            TypeKind::Struct { members, offsets } => {
                match members.last() {
                    Some(&last) => offsets[members.len() - 1] + self.size_of(last)?,
                    None => 0,
                }
            }
            TypeKind::Pointer { .. } => 4,
            TypeKind::Function { .. } => 4,
            TypeKind::Image { .. } => 4,
            TypeKind::SampledImage { .. } => 4,
        })
    }

    pub fn get(&self, id: TypeId) -> Result<&Type> {
        self.types
            .get(&id)
            .ok_or_else(|| Error::Type(format!("unknown type {}", id)))
    }

    pub fn contains(&self, id: TypeId) -> bool {
        self.types.contains_key(&id)
    }

    /// Byte footprint of the type, used by allocation and register layout
    pub fn size_of(&self, id: TypeId) -> Result<u32> {
        Ok(self.get(id)?.size)
    }

    /// The type of and byte offset to constituent `index` of `id`
    pub fn constituent_info(&self, id: TypeId, index: u32) -> Result<(TypeId, u32)> {
        let ty = self.get(id)?;
        match &ty.kind {
            TypeKind::Vector { elem, count } | TypeKind::Array { elem, count } => {
                if index >= *count {
                    return Err(Error::Type(format!(
                        "constituent {} out of bounds for type {}",
                        index, id
                    )));
                }
                Ok((*elem, index * self.size_of(*elem)?))
            }
            TypeKind::Matrix { column, columns } => {
                if index >= *columns {
                    return Err(Error::Type(format!(
                        "column {} out of bounds for type {}",
                        index, id
                    )));
                }
                Ok((*column, index * self.size_of(*column)?))
            }
            TypeKind::Struct { members, offsets } => {
                let member = members.get(index as usize).ok_or_else(|| {
                    Error::Type(format!("member {} out of bounds for type {}", index, id))
                })?;
                Ok((*member, offsets[index as usize]))
            }
            _ => Err(Error::Type(format!(
                "type {} has no constituents",
                id
            ))),
        }
    }

    /// `(element type, count)` if `id` is a vector
    pub fn as_vector(&self, id: TypeId) -> Option<(TypeId, u32)> {
        match self.types.get(&id)?.kind {
            TypeKind::Vector { elem, count } => Some((elem, count)),
            _ => None,
        }
    }

    /// `(column type, element type, rows, columns)` if `id` is a matrix
    pub fn as_matrix(&self, id: TypeId) -> Option<(TypeId, TypeId, u32, u32)> {
        match self.types.get(&id)?.kind {
            TypeKind::Matrix { column, columns } => {
                let (elem, rows) = self.as_vector(column)?;
                Some((column, elem, rows, columns))
            }
            _ => None,
        }
    }

    /// `(pointee, storage class)` if `id` is a pointer
    pub fn as_pointer(&self, id: TypeId) -> Option<(TypeId, StorageClass)> {
        match self.types.get(&id)?.kind {
            TypeKind::Pointer { pointee, storage_class } => Some((pointee, storage_class)),
            _ => None,
        }
    }

    /// Number of scalar lanes a value of this type occupies in registers:
    /// 1 for scalars, N for vectors
    pub fn lane_count(&self, id: TypeId) -> u32 {
        self.as_vector(id).map(|(_, count)| count).unwrap_or(1)
    }

    /// True for floats, false for ints, bools, and pointers. Anything else
    /// has no place in a register file and is a type error.
    pub fn is_float(&self, id: TypeId) -> Result<bool> {
        match self.get(id)?.kind {
            TypeKind::Float { .. } => Ok(true),
            TypeKind::Int { .. } | TypeKind::Bool | TypeKind::Pointer { .. } => Ok(false),
            _ => Err(Error::Type(format!(
                "type {} is neither int nor float",
                id
            ))),
        }
    }

    /// Flat index of a matrix element, column-major
    pub fn matrix_index(&self, rows: u32, row: u32, col: u32) -> u32 {
        // Arbitrary but applied consistently everywhere.
        col * rows + row
    }

    pub fn iter(&self) -> impl Iterator<Item = (&TypeId, &Type)> {
        self.types.iter()
    }
}

/// Compute struct member offsets: each member follows the previous one,
/// unless an explicit `Offset` decoration places it.
pub fn struct_offsets(
    registry: &TypeRegistry,
    members: &[TypeId],
    explicit: &dyn Fn(u32) -> Option<u32>,
) -> Result<Vec<u32>> {
    let mut offsets = Vec::with_capacity(members.len());
    let mut next = 0u32;
    for (index, &member) in members.iter().enumerate() {
        let offset = explicit(index as u32).unwrap_or(next);
        offsets.push(offset);
        next = offset + registry.size_of(member)?;
    }
    Ok(offsets)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry_with_scalars() -> TypeRegistry {
        let mut reg = TypeRegistry::new();
        reg.intern(1, TypeKind::Float { width: 32 }).unwrap();
        reg.intern(2, TypeKind::Int { width: 32, signed: true }).unwrap();
        reg.intern(3, TypeKind::Bool).unwrap();
        reg
    }

    #[test]
    fn vector_size_and_constituents() {
        let mut reg = registry_with_scalars();
        reg.intern(10, TypeKind::Vector { elem: 1, count: 4 }).unwrap();
        assert_eq!(reg.size_of(10).unwrap(), 16);
        assert_eq!(reg.constituent_info(10, 2).unwrap(), (1, 8));
        assert!(reg.constituent_info(10, 4).is_err());
        assert_eq!(reg.lane_count(10), 4);
        assert_eq!(reg.lane_count(1), 1);
    }

    #[test]
    fn matrix_is_column_major() {
        let mut reg = registry_with_scalars();
        reg.intern(10, TypeKind::Vector { elem: 1, count: 3 }).unwrap();
        reg.intern(11, TypeKind::Matrix { column: 10, columns: 2 }).unwrap();
        assert_eq!(reg.size_of(11).unwrap(), 24);
        // Second column starts one column-size in.
        assert_eq!(reg.constituent_info(11, 1).unwrap(), (10, 12));
        // (row 2, col 1) of a 3-row matrix is flat index 5.
        assert_eq!(reg.matrix_index(3, 2, 1), 5);
        let (column, elem, rows, columns) = reg.as_matrix(11).unwrap();
        assert_eq!((column, elem, rows, columns), (10, 1, 3, 2));
    }

    #[test]
    fn struct_offsets_follow_sizes_unless_decorated() {
        let mut reg = registry_with_scalars();
        reg.intern(10, TypeKind::Vector { elem: 1, count: 2 }).unwrap();
        let members = vec![1, 10, 2];
        let offsets = struct_offsets(&reg, &members, &|_| None).unwrap();
        assert_eq!(offsets, vec![0, 4, 12]);

        // An Offset decoration on member 1 pushes everything after it.
        let offsets = struct_offsets(&reg, &members, &|i| if i == 1 { Some(16) } else { None }).unwrap();
        assert_eq!(offsets, vec![0, 16, 24]);

        reg.intern(20, TypeKind::Struct { members, offsets }).unwrap();
        assert_eq!(reg.size_of(20).unwrap(), 28);
        assert_eq!(reg.constituent_info(20, 1).unwrap(), (10, 16));
    }

    #[test]
    fn float_classification() {
        let mut reg = registry_with_scalars();
        reg.intern(4, TypeKind::Pointer { pointee: 1, storage_class: StorageClass::Function }).unwrap();
        reg.intern(10, TypeKind::Vector { elem: 1, count: 2 }).unwrap();
        assert!(reg.is_float(1).unwrap());
        assert!(!reg.is_float(2).unwrap());
        assert!(!reg.is_float(3).unwrap());
        assert!(!reg.is_float(4).unwrap());
        assert!(reg.is_float(10).is_err());
    }
}
