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

use log::{debug, warn};
use scroll::Pread;

use crate::ir::{
    BinOp, Block, Constant, ConstantValue, EntryPoint, Function, Id, Instruction,
    InstructionList, LineInfo, Op, SourceInfo, TernOp, TypeId, UnOp, Variable, NO_BLOCK_ID,
};
use crate::module::{Module, PointerInfo};
use crate::spv::{self, op, FunctionControl, LoopControl, SelectionControl, StorageClass};
use crate::types::{struct_offsets, TypeKind};
use crate::{Error, Result};

/// Lift a byte stream to little-endian words
pub fn words_from_bytes(bytes: &[u8]) -> Result<Vec<u32>> {
    if bytes.len() % 4 != 0 {
        return Err(Error::Malformed(format!(
            "binary length {} is not a multiple of 4",
            bytes.len()
        )));
    }
    let mut words = Vec::with_capacity(bytes.len() / 4);
    let offset = &mut 0;
    while *offset < bytes.len() {
        words.push(bytes.gread_with::<u32>(offset, scroll::LE)?);
    }
    Ok(words)
}

/// Parse a SPIR-V module from its word stream
pub fn parse_words(words: &[u32], throw_on_unimplemented: bool) -> Result<Module> {
    if words.len() < 5 {
        return Err(Error::Malformed("header is truncated".to_string()));
    }
    if words[0] != spv::MAGIC {
        return Err(Error::Malformed(format!(
            "SPIR-V magic is invalid: {:#x}",
            words[0]
        )));
    }
    let major = ((words[1] >> 16) & 0xff) as u8;
    let minor = ((words[1] >> 8) & 0xff) as u8;
    if major != 1 {
        return Err(Error::Unsupported(format!(
            "SPIR-V version {}.{}",
            major, minor
        )));
    }

    let mut builder = Builder {
        module: Module::new(throw_on_unimplemented),
        current_function: None,
        current_block: None,
        current_line: LineInfo::default(),
    };
    builder.module.version = (major, minor);
    builder.module.generator = words[2];
    builder.module.set_bound(words[3]);

    let mut pos = 5;
    while pos < words.len() {
        let first = words[pos];
        let word_count = (first >> 16) as usize;
        let opcode = (first & 0xffff) as u16;
        if word_count == 0 || pos + word_count > words.len() {
            return Err(Error::Malformed(format!(
                "instruction at word {} is truncated",
                pos
            )));
        }
        builder.handle(opcode, &words[pos + 1..pos + word_count])?;
        pos += word_count;
    }

    builder.finish()
}

/// Decode a nul-terminated UTF-8 string packed into words, returning the
/// string and the index of the first word after it
fn decode_string(operands: &[u32], start: usize) -> Result<(String, usize)> {
    let mut bytes = Vec::new();
    for (index, word) in operands.iter().enumerate().skip(start) {
        for &byte in word.to_le_bytes().iter() {
            if byte == 0 {
                let text = std::str::from_utf8(&bytes)?.to_string();
                return Ok((text, index + 1));
            }
            bytes.push(byte);
        }
    }
    Err(Error::Malformed("unterminated string literal".to_string()))
}

fn require(operands: &[u32], count: usize, opcode: u16) -> Result<()> {
    if operands.len() < count {
        return Err(Error::Malformed(format!(
            "{} expects at least {} operands, got {}",
            spv::opcode_name(opcode),
            count,
            operands.len()
        )));
    }
    Ok(())
}

struct PendingBlock {
    id: Id,
    list: InstructionList,
}

struct Builder {
    module: Module,
    current_function: Option<Id>,
    current_block: Option<PendingBlock>,
    current_line: LineInfo,
}

impl Builder {
    fn finish(mut self) -> Result<Module> {
        if self.current_function.is_some() || self.current_block.is_some() {
            return Err(Error::Malformed(
                "module ends inside a function body".to_string(),
            ));
        }
        if self.module.main_function_id.is_none() {
            return Err(Error::Unsupported(
                "no entry point for the Fragment execution model".to_string(),
            ));
        }

        // Flatten named module variables for the output sections.
        let named: Vec<(String, TypeId, u32)> = self
            .module
            .variables
            .iter()
            .filter(|(_, var)| var.storage_class != StorageClass::Function)
            .filter_map(|(&id, var)| {
                self.module
                    .name_of(id)
                    .map(|name| (name.to_string(), var.type_id, var.address))
            })
            .collect();
        for (name, type_id, address) in named {
            self.module
                .store_named_variable_info(&name, type_id, address)?;
        }
        Ok(self.module)
    }

    /// Append an executable instruction to the open block
    fn append(&mut self, result_type: Option<TypeId>, result: Option<Id>, op: Op) -> Result<()> {
        let block = self.current_block.as_mut().ok_or_else(|| {
            Error::Malformed(format!("{} outside of a block", op.name()))
        })?;
        if let (Some(type_id), Some(id)) = (result_type, result) {
            self.module.result_types.insert(id, type_id);
        }
        let terminates = op.is_terminator();
        let insn = Instruction::new(self.current_line, result_type, result, op);
        let node = self.module.arena.alloc(insn);
        block.list.push_back(&mut self.module.arena, node);
        if terminates {
            self.close_block();
        }
        Ok(())
    }

    fn close_block(&mut self) {
        let pending = self.current_block.take().expect("no block to close");
        let function_id = self.current_function.expect("block outside function");
        let block = Block::new(pending.id, function_id, pending.list);
        self.module.blocks.insert(pending.id, block);
    }

    /// Route an opcode we recognize but do not compile
    fn unimplemented(
        &mut self,
        opcode: u16,
        result_type: Option<TypeId>,
        result: Option<Id>,
    ) -> Result<()> {
        if self.module.throw_on_unimplemented {
            return Err(Error::Unimplemented(
                spv::opcode_name(opcode).to_string(),
            ));
        }
        warn!("{} not implemented", spv::opcode_name(opcode));
        self.module.has_unimplemented = true;
        if self.current_block.is_some() {
            self.append(result_type, result, Op::Unimplemented { opcode })?;
        }
        Ok(())
    }

    fn handle(&mut self, opcode: u16, operands: &[u32]) -> Result<()> {
        match opcode {
            op::NOP => {}

            op::CAPABILITY => {
                require(operands, 1, opcode)?;
                if operands[0] != spv::CAPABILITY_SHADER {
                    return Err(Error::Unsupported(format!(
                        "capability {}",
                        operands[0]
                    )));
                }
                self.module.capabilities.push(operands[0]);
            }

            op::EXT_INST_IMPORT => {
                require(operands, 2, opcode)?;
                let (name, _) = decode_string(operands, 1)?;
                if name != spv::GLSL_STD_450 {
                    return Err(Error::Unsupported(format!(
                        "extended instruction set {:?}",
                        name
                    )));
                }
                self.module.glsl_std_450 = Some(operands[0]);
                self.module.ext_inst_sets.insert(operands[0], name);
            }

            op::MEMORY_MODEL => {
                require(operands, 2, opcode)?;
                self.module.addressing_model = operands[0];
                self.module.memory_model = operands[1];
            }

            op::ENTRY_POINT => {
                require(operands, 3, opcode)?;
                let execution_model = operands[0];
                let function_id = operands[1];
                let (name, next) = decode_string(operands, 2)?;
                if execution_model != spv::EXECUTION_MODEL_FRAGMENT {
                    return Err(Error::Unsupported(format!(
                        "execution model {} (only Fragment is accepted)",
                        execution_model
                    )));
                }
                self.module.entry_points.insert(
                    function_id,
                    EntryPoint {
                        execution_model,
                        function_id,
                        name,
                        interface_ids: operands[next..].to_vec(),
                        execution_modes: BTreeMap::new(),
                    },
                );
                self.module.main_function_id = Some(function_id);
            }

            op::EXECUTION_MODE => {
                require(operands, 2, opcode)?;
                if let Some(entry) = self.module.entry_points.get_mut(&operands[0]) {
                    entry
                        .execution_modes
                        .insert(operands[1], operands[2..].to_vec());
                }
            }

            op::SOURCE => {
                require(operands, 2, opcode)?;
                let text = if operands.len() > 3 {
                    Some(decode_string(operands, 3)?.0)
                } else {
                    None
                };
                self.module.sources.push(SourceInfo {
                    language: operands[0],
                    version: operands[1],
                    file_id: operands.get(2).copied(),
                    text,
                });
            }
            op::SOURCE_CONTINUED | op::SOURCE_EXTENSION | op::EXTENSION => {}

            op::STRING => {
                require(operands, 2, opcode)?;
                let (text, _) = decode_string(operands, 1)?;
                self.module.strings.insert(operands[0], text);
            }

            op::NAME => {
                require(operands, 2, opcode)?;
                let (name, _) = decode_string(operands, 1)?;
                self.module.names.insert(operands[0], name);
            }

            op::MEMBER_NAME => {
                require(operands, 3, opcode)?;
                let (name, _) = decode_string(operands, 2)?;
                self.module
                    .member_names
                    .entry(operands[0])
                    .or_insert_with(BTreeMap::new)
                    .insert(operands[1], name);
            }

            op::LINE => {
                require(operands, 3, opcode)?;
                self.current_line = LineInfo {
                    file_id: operands[0],
                    line: operands[1],
                    column: operands[2],
                };
            }
            op::NO_LINE => {
                self.current_line = LineInfo::default();
            }

            op::DECORATE => {
                require(operands, 2, opcode)?;
                self.module
                    .decorations
                    .entry(operands[0])
                    .or_insert_with(BTreeMap::new)
                    .insert(operands[1], operands[2..].to_vec());
            }

            op::MEMBER_DECORATE => {
                require(operands, 3, opcode)?;
                self.module
                    .member_decorations
                    .entry(operands[0])
                    .or_insert_with(BTreeMap::new)
                    .entry(operands[1])
                    .or_insert_with(BTreeMap::new)
                    .insert(operands[2], operands[3..].to_vec());
            }

            // Types: declared before use, so constituent lookups are safe.
            op::TYPE_VOID => {
                require(operands, 1, opcode)?;
                self.module.types.intern(operands[0], TypeKind::Void)?;
            }
            op::TYPE_BOOL => {
                require(operands, 1, opcode)?;
                self.module.types.intern(operands[0], TypeKind::Bool)?;
            }
            op::TYPE_INT => {
                require(operands, 3, opcode)?;
                if operands[1] != 32 {
                    return Err(Error::Unsupported(format!(
                        "{}-bit integers",
                        operands[1]
                    )));
                }
                self.module.types.intern(
                    operands[0],
                    TypeKind::Int {
                        width: operands[1],
                        signed: operands[2] != 0,
                    },
                )?;
            }
            op::TYPE_FLOAT => {
                require(operands, 2, opcode)?;
                if operands[1] != 32 {
                    return Err(Error::Unsupported(format!(
                        "{}-bit floats",
                        operands[1]
                    )));
                }
                self.module
                    .types
                    .intern(operands[0], TypeKind::Float { width: operands[1] })?;
            }
            op::TYPE_VECTOR => {
                require(operands, 3, opcode)?;
                if operands[2] < 1 || operands[2] > 4 {
                    return Err(Error::Unsupported(format!(
                        "vector of {} components",
                        operands[2]
                    )));
                }
                self.module.types.intern(
                    operands[0],
                    TypeKind::Vector {
                        elem: operands[1],
                        count: operands[2],
                    },
                )?;
            }
            op::TYPE_MATRIX => {
                require(operands, 3, opcode)?;
                self.module.types.intern(
                    operands[0],
                    TypeKind::Matrix {
                        column: operands[1],
                        columns: operands[2],
                    },
                )?;
            }
            op::TYPE_ARRAY => {
                require(operands, 3, opcode)?;
                let count = self
                    .module
                    .as_integer_constant(operands[2])
                    .ok_or_else(|| {
                        Error::Malformed("array length is not an integer constant".to_string())
                    })?;
                self.module.types.intern(
                    operands[0],
                    TypeKind::Array {
                        elem: operands[1],
                        count,
                    },
                )?;
            }
            op::TYPE_STRUCT => {
                require(operands, 1, opcode)?;
                let id = operands[0];
                let members = operands[1..].to_vec();
                let module = &self.module;
                let offsets = struct_offsets(&module.types, &members, &|index| {
                    module.member_offset(id, index)
                })?;
                self.module
                    .types
                    .intern(id, TypeKind::Struct { members, offsets })?;
            }
            op::TYPE_POINTER => {
                require(operands, 3, opcode)?;
                self.module.types.intern(
                    operands[0],
                    TypeKind::Pointer {
                        storage_class: StorageClass::from_word(operands[1])?,
                        pointee: operands[2],
                    },
                )?;
            }
            op::TYPE_FUNCTION => {
                require(operands, 2, opcode)?;
                self.module.types.intern(
                    operands[0],
                    TypeKind::Function {
                        return_type: operands[1],
                        parameters: operands[2..].to_vec(),
                    },
                )?;
            }
            op::TYPE_IMAGE => {
                require(operands, 8, opcode)?;
                self.module.types.intern(
                    operands[0],
                    TypeKind::Image {
                        sampled_type: operands[1],
                        dim: operands[2],
                        depth: operands[3],
                        arrayed: operands[4],
                        ms: operands[5],
                        sampled: operands[6],
                        format: operands[7],
                    },
                )?;
            }
            op::TYPE_SAMPLED_IMAGE => {
                require(operands, 2, opcode)?;
                self.module
                    .types
                    .intern(operands[0], TypeKind::SampledImage { image: operands[1] })?;
            }

            op::CONSTANT_TRUE | op::CONSTANT_FALSE => {
                require(operands, 2, opcode)?;
                self.module.constants.insert(
                    operands[1],
                    Constant {
                        type_id: operands[0],
                        value: ConstantValue::Bool(opcode == op::CONSTANT_TRUE),
                    },
                );
            }
            op::CONSTANT => {
                require(operands, 3, opcode)?;
                if operands.len() != 3 {
                    return Err(Error::Unsupported(
                        "constants wider than 32 bits".to_string(),
                    ));
                }
                let value = match self.module.types.get(operands[0])?.kind {
                    TypeKind::Float { .. } => ConstantValue::F32(f32::from_bits(operands[2])),
                    TypeKind::Int { signed: true, .. } => {
                        ConstantValue::I32(operands[2] as i32)
                    }
                    TypeKind::Int { signed: false, .. } => ConstantValue::U32(operands[2]),
                    _ => {
                        return Err(Error::Type(format!(
                            "OpConstant of non-scalar type {}",
                            operands[0]
                        )))
                    }
                };
                self.module.constants.insert(
                    operands[1],
                    Constant {
                        type_id: operands[0],
                        value,
                    },
                );
            }
            op::CONSTANT_COMPOSITE => {
                require(operands, 2, opcode)?;
                self.module.constants.insert(
                    operands[1],
                    Constant {
                        type_id: operands[0],
                        value: ConstantValue::Composite(operands[2..].to_vec()),
                    },
                );
            }

            op::VARIABLE => {
                require(operands, 3, opcode)?;
                let pointer_type = operands[0];
                let id = operands[1];
                let storage_class = StorageClass::from_word(operands[2])?;
                let (pointee, declared_class) =
                    self.module.types.as_pointer(pointer_type).ok_or_else(|| {
                        Error::Type(format!(
                            "OpVariable result type {} is not a pointer",
                            pointer_type
                        ))
                    })?;
                if declared_class != storage_class {
                    return Err(Error::Malformed(format!(
                        "variable {} storage class disagrees with its pointer type",
                        id
                    )));
                }
                let address = self.module.allocate(storage_class, pointee)?;
                self.module.variables.insert(
                    id,
                    Variable {
                        type_id: pointee,
                        storage_class,
                        initializer: operands.get(3).copied(),
                        address,
                    },
                );
                self.module
                    .pointers
                    .insert(id, PointerInfo { variable: id, offset: 0 });
            }

            op::FUNCTION => {
                require(operands, 4, opcode)?;
                if self.current_function.is_some() {
                    return Err(Error::Malformed("nested OpFunction".to_string()));
                }
                let id = operands[1];
                self.module.functions.insert(
                    id,
                    Function {
                        id,
                        type_id: operands[3],
                        result_type: operands[0],
                        control: FunctionControl::from_bits_truncate(operands[2]),
                        parameters: Vec::new(),
                        entry_block: NO_BLOCK_ID,
                        block_ids: Vec::new(),
                        pc_start: 0,
                    },
                );
                self.current_function = Some(id);
            }

            op::FUNCTION_PARAMETER => {
                require(operands, 2, opcode)?;
                let function_id = self.current_function.ok_or_else(|| {
                    Error::Malformed("OpFunctionParameter outside a function".to_string())
                })?;
                self.module.result_types.insert(operands[1], operands[0]);
                let function = self.module.functions.get_mut(&function_id).unwrap();
                function.parameters.push((operands[1], operands[0]));
            }

            op::FUNCTION_END => {
                if self.current_block.is_some() {
                    return Err(Error::Malformed(
                        "OpFunctionEnd inside an unterminated block".to_string(),
                    ));
                }
                if self.current_function.take().is_none() {
                    return Err(Error::Malformed(
                        "OpFunctionEnd outside a function".to_string(),
                    ));
                }
            }

            op::LABEL => {
                require(operands, 1, opcode)?;
                let function_id = self.current_function.ok_or_else(|| {
                    Error::Malformed("OpLabel outside a function".to_string())
                })?;
                if self.current_block.is_some() {
                    return Err(Error::Malformed(
                        "OpLabel inside an unterminated block".to_string(),
                    ));
                }
                let id = operands[0];
                let list = self.module.arena.new_list();
                self.current_block = Some(PendingBlock { id, list });
                let function = self.module.functions.get_mut(&function_id).unwrap();
                if function.entry_block == NO_BLOCK_ID {
                    function.entry_block = id;
                }
                function.block_ids.push(id);
            }

            // Merge hints carry structured-control-flow metadata the
            // compiler derives itself from the CFG.
            op::SELECTION_MERGE => {
                require(operands, 2, opcode)?;
                let control = SelectionControl::from_bits_truncate(operands[1]);
                debug!("selection merge at {} ({:?})", operands[0], control);
            }
            op::LOOP_MERGE => {
                require(operands, 3, opcode)?;
                let control = LoopControl::from_bits_truncate(operands[2]);
                debug!("loop merge at {} ({:?})", operands[0], control);
            }

            op::BRANCH => {
                require(operands, 1, opcode)?;
                self.append(None, None, Op::Branch { target: operands[0] })?;
            }
            op::BRANCH_CONDITIONAL => {
                require(operands, 3, opcode)?;
                self.append(
                    None,
                    None,
                    Op::BranchConditional {
                        cond: operands[0],
                        true_target: operands[1],
                        false_target: operands[2],
                    },
                )?;
            }
            op::RETURN => self.append(None, None, Op::Return)?,
            op::RETURN_VALUE => {
                require(operands, 1, opcode)?;
                self.append(None, None, Op::ReturnValue { value: operands[0] })?;
            }
            op::KILL => self.append(None, None, Op::Kill)?,
            op::UNREACHABLE => self.append(None, None, Op::Unreachable)?,

            op::PHI => {
                require(operands, 4, opcode)?;
                if (operands.len() - 2) % 2 != 0 {
                    return Err(Error::Malformed(
                        "OpPhi has an odd operand list".to_string(),
                    ));
                }
                let pairs = operands[2..]
                    .chunks(2)
                    .map(|pair| (pair[0], pair[1]))
                    .collect();
                self.append(Some(operands[0]), Some(operands[1]), Op::Phi { pairs })?;
            }

            op::LOAD => {
                require(operands, 3, opcode)?;
                self.append(
                    Some(operands[0]),
                    Some(operands[1]),
                    Op::Load {
                        pointer: operands[2],
                        offset: 0,
                    },
                )?;
            }
            op::STORE => {
                require(operands, 2, opcode)?;
                self.append(
                    None,
                    None,
                    Op::Store {
                        pointer: operands[0],
                        object: operands[1],
                        offset: 0,
                    },
                )?;
            }
            op::ACCESS_CHAIN | op::IN_BOUNDS_ACCESS_CHAIN => {
                require(operands, 3, opcode)?;
                self.append(
                    Some(operands[0]),
                    Some(operands[1]),
                    Op::AccessChain {
                        base: operands[2],
                        indexes: operands[3..].to_vec(),
                    },
                )?;
            }

            op::COMPOSITE_CONSTRUCT => {
                require(operands, 3, opcode)?;
                self.append(
                    Some(operands[0]),
                    Some(operands[1]),
                    Op::CompositeConstruct {
                        constituents: operands[2..].to_vec(),
                    },
                )?;
            }
            op::COMPOSITE_EXTRACT => {
                require(operands, 4, opcode)?;
                self.append(
                    Some(operands[0]),
                    Some(operands[1]),
                    Op::CompositeExtract {
                        composite: operands[2],
                        indexes: operands[3..].to_vec(),
                    },
                )?;
            }
            op::VECTOR_SHUFFLE => {
                require(operands, 4, opcode)?;
                self.append(
                    Some(operands[0]),
                    Some(operands[1]),
                    Op::VectorShuffle {
                        v1: operands[2],
                        v2: operands[3],
                        components: operands[4..].to_vec(),
                    },
                )?;
            }

            op::DOT => {
                require(operands, 4, opcode)?;
                self.append(
                    Some(operands[0]),
                    Some(operands[1]),
                    Op::Dot {
                        lhs: operands[2],
                        rhs: operands[3],
                    },
                )?;
            }
            op::VECTOR_TIMES_SCALAR => {
                require(operands, 4, opcode)?;
                self.append(
                    Some(operands[0]),
                    Some(operands[1]),
                    Op::VectorTimesScalar {
                        vector: operands[2],
                        scalar: operands[3],
                    },
                )?;
            }
            op::MATRIX_TIMES_VECTOR => {
                require(operands, 4, opcode)?;
                self.append(
                    Some(operands[0]),
                    Some(operands[1]),
                    Op::MatrixTimesVector {
                        matrix: operands[2],
                        vector: operands[3],
                    },
                )?;
            }

            op::FUNCTION_CALL => {
                require(operands, 3, opcode)?;
                self.append(
                    Some(operands[0]),
                    Some(operands[1]),
                    Op::FunctionCall {
                        function: operands[2],
                        args: operands[3..].to_vec(),
                    },
                )?;
            }

            op::SELECT => {
                require(operands, 5, opcode)?;
                self.append(
                    Some(operands[0]),
                    Some(operands[1]),
                    Op::Ternary {
                        kind: TernOp::Select,
                        a: operands[2],
                        b: operands[3],
                        c: operands[4],
                    },
                )?;
            }

            op::EXT_INST => {
                require(operands, 4, opcode)?;
                if Some(operands[2]) != self.module.glsl_std_450 {
                    return Err(Error::Unsupported(format!(
                        "extended instruction set {}",
                        operands[2]
                    )));
                }
                match glsl_ext_op(operands[3], &operands[4..]) {
                    Some(ext) => {
                        self.append(Some(operands[0]), Some(operands[1]), ext)?
                    }
                    None => self.unimplemented(
                        opcode,
                        Some(operands[0]),
                        Some(operands[1]),
                    )?,
                }
            }

            _ => {
                if let Some((kind_op, result_type, result)) = core_alu_op(opcode, operands) {
                    self.append(Some(result_type), Some(result), kind_op)?;
                } else if matches!(
                    opcode,
                    op::SAMPLED_IMAGE
                        | op::IMAGE_SAMPLE_IMPLICIT_LOD
                        | op::IMAGE_SAMPLE_EXPLICIT_LOD
                ) {
                    require(operands, 2, opcode)?;
                    self.unimplemented(opcode, Some(operands[0]), Some(operands[1]))?;
                } else if self.module.throw_on_unimplemented {
                    return Err(Error::Malformed(format!(
                        "unknown opcode {} ({})",
                        opcode,
                        spv::opcode_name(opcode)
                    )));
                } else {
                    warn!("skipping unknown opcode {}", opcode);
                    self.module.has_unimplemented = true;
                }
            }
        }
        Ok(())
    }
}

/// Decode a core ALU opcode into its kind-parameterized form, returning
/// `(op, result type, result id)`
fn core_alu_op(opcode: u16, operands: &[u32]) -> Option<(Op, TypeId, Id)> {
    let unary = |kind: UnOp| -> Option<(Op, TypeId, Id)> {
        if operands.len() < 3 {
            return None;
        }
        Some((
            Op::Unary {
                kind,
                src: operands[2],
            },
            operands[0],
            operands[1],
        ))
    };
    let binary = |kind: BinOp| -> Option<(Op, TypeId, Id)> {
        if operands.len() < 4 {
            return None;
        }
        Some((
            Op::Binary {
                kind,
                lhs: operands[2],
                rhs: operands[3],
            },
            operands[0],
            operands[1],
        ))
    };
    match opcode {
        op::F_NEGATE => unary(UnOp::FNegate),
        op::S_NEGATE => unary(UnOp::SNegate),
        op::LOGICAL_NOT => unary(UnOp::LogicalNot),
        op::CONVERT_F_TO_S => unary(UnOp::ConvertFToS),
        op::CONVERT_F_TO_U => unary(UnOp::ConvertFToU),
        op::CONVERT_S_TO_F => unary(UnOp::ConvertSToF),
        op::CONVERT_U_TO_F => unary(UnOp::ConvertUToF),
        op::BITCAST => unary(UnOp::Bitcast),
        op::COPY_OBJECT => unary(UnOp::CopyObject),
        op::F_ADD => binary(BinOp::FAdd),
        op::F_SUB => binary(BinOp::FSub),
        op::F_MUL => binary(BinOp::FMul),
        op::F_DIV => binary(BinOp::FDiv),
        op::F_MOD => binary(BinOp::FMod),
        op::I_ADD => binary(BinOp::IAdd),
        op::I_SUB => binary(BinOp::ISub),
        op::I_MUL => binary(BinOp::IMul),
        op::S_DIV => binary(BinOp::SDiv),
        op::U_DIV => binary(BinOp::UDiv),
        op::S_REM => binary(BinOp::SRem),
        op::S_MOD => binary(BinOp::SMod),
        op::U_MOD => binary(BinOp::UMod),
        op::LOGICAL_AND => binary(BinOp::LogicalAnd),
        op::LOGICAL_OR => binary(BinOp::LogicalOr),
        op::F_ORD_EQUAL => binary(BinOp::FOrdEqual),
        op::F_ORD_NOT_EQUAL => binary(BinOp::FOrdNotEqual),
        op::F_ORD_LESS_THAN => binary(BinOp::FOrdLessThan),
        op::F_ORD_GREATER_THAN => binary(BinOp::FOrdGreaterThan),
        op::F_ORD_LESS_THAN_EQUAL => binary(BinOp::FOrdLessThanEqual),
        op::F_ORD_GREATER_THAN_EQUAL => binary(BinOp::FOrdGreaterThanEqual),
        op::I_EQUAL => binary(BinOp::IEqual),
        op::I_NOT_EQUAL => binary(BinOp::INotEqual),
        op::S_LESS_THAN => binary(BinOp::SLessThan),
        op::S_GREATER_THAN => binary(BinOp::SGreaterThan),
        op::S_LESS_THAN_EQUAL => binary(BinOp::SLessThanEqual),
        op::S_GREATER_THAN_EQUAL => binary(BinOp::SGreaterThanEqual),
        op::U_LESS_THAN => binary(BinOp::ULessThan),
        op::U_GREATER_THAN => binary(BinOp::UGreaterThan),
        op::U_LESS_THAN_EQUAL => binary(BinOp::ULessThanEqual),
        op::U_GREATER_THAN_EQUAL => binary(BinOp::UGreaterThanEqual),
        _ => None,
    }
}

/// Decode a GLSL.std.450 instruction number to its IR form
fn glsl_ext_op(number: u32, args: &[u32]) -> Option<Op> {
    use crate::spv::glsl;
    let unary = |kind: UnOp| {
        args.first().map(|&src| Op::Unary { kind, src })
    };
    let binary = |kind: BinOp| {
        if args.len() < 2 {
            return None;
        }
        Some(Op::Binary {
            kind,
            lhs: args[0],
            rhs: args[1],
        })
    };
    let ternary = |kind: TernOp| {
        if args.len() < 3 {
            return None;
        }
        Some(Op::Ternary {
            kind,
            a: args[0],
            b: args[1],
            c: args[2],
        })
    };
    match number {
        glsl::ROUND => unary(UnOp::Round),
        glsl::TRUNC => unary(UnOp::Trunc),
        glsl::F_ABS => unary(UnOp::FAbs),
        glsl::S_ABS => unary(UnOp::SAbs),
        glsl::F_SIGN => unary(UnOp::FSign),
        glsl::FLOOR => unary(UnOp::Floor),
        glsl::CEIL => unary(UnOp::Ceil),
        glsl::FRACT => unary(UnOp::Fract),
        glsl::RADIANS => unary(UnOp::Radians),
        glsl::DEGREES => unary(UnOp::Degrees),
        glsl::SIN => unary(UnOp::Sin),
        glsl::COS => unary(UnOp::Cos),
        glsl::TAN => unary(UnOp::Tan),
        glsl::ASIN => unary(UnOp::Asin),
        glsl::ACOS => unary(UnOp::Acos),
        glsl::ATAN => unary(UnOp::Atan),
        glsl::EXP => unary(UnOp::Exp),
        glsl::LOG => unary(UnOp::Log),
        glsl::EXP2 => unary(UnOp::Exp2),
        glsl::LOG2 => unary(UnOp::Log2),
        glsl::SQRT => unary(UnOp::Sqrt),
        glsl::INVERSE_SQRT => unary(UnOp::InverseSqrt),
        glsl::ATAN2 => binary(BinOp::Atan2),
        glsl::POW => binary(BinOp::Pow),
        glsl::F_MIN => binary(BinOp::FMin),
        glsl::F_MAX => binary(BinOp::FMax),
        glsl::STEP => binary(BinOp::Step),
        glsl::F_CLAMP => ternary(TernOp::FClamp),
        glsl::F_MIX => ternary(TernOp::FMix),
        glsl::SMOOTH_STEP => ternary(TernOp::SmoothStep),
        glsl::LENGTH => args.first().map(|&src| Op::Length { src }),
        glsl::NORMALIZE => args.first().map(|&src| Op::Normalize { src }),
        glsl::DISTANCE => {
            if args.len() < 2 {
                return None;
            }
            Some(Op::Distance {
                lhs: args[0],
                rhs: args[1],
            })
        }
        glsl::CROSS => {
            if args.len() < 2 {
                return None;
            }
            Some(Op::Cross {
                lhs: args[0],
                rhs: args[1],
            })
        }
        glsl::REFLECT => {
            if args.len() < 2 {
                return None;
            }
            Some(Op::Reflect {
                incident: args[0],
                normal: args[1],
            })
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spvasm::ShaderBuilder;

    #[test]
    fn rejects_bad_magic() {
        let words = vec![0xdead_beef, 0x0001_0300, 0, 10, 0];
        match parse_words(&words, true) {
            Err(Error::Malformed(msg)) => assert!(msg.contains("magic")),
            other => panic!("expected Malformed, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn rejects_truncated_instruction() {
        let mut words = vec![spv::MAGIC, 0x0001_0300, 0, 10, 0];
        // Claims five words but only one follows.
        words.push((5 << 16) | op::CAPABILITY as u32);
        words.push(spv::CAPABILITY_SHADER);
        assert!(matches!(
            parse_words(&words, true),
            Err(Error::Malformed(_))
        ));
    }

    #[test]
    fn rejects_vertex_entry_point() {
        let mut shader = ShaderBuilder::with_execution_model(0);
        shader.begin_main();
        shader.ret();
        let words = shader.finish();
        match parse_words(&words, true) {
            Err(Error::Unsupported(msg)) => assert!(msg.contains("execution model")),
            other => panic!("expected Unsupported, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn rejects_missing_entry_point() {
        let words = {
            let mut words = vec![spv::MAGIC, 0x0001_0300, 0, 10, 0];
            words.push((2 << 16) | op::CAPABILITY as u32);
            words.push(spv::CAPABILITY_SHADER);
            words.push((3 << 16) | op::MEMORY_MODEL as u32);
            words.push(0);
            words.push(1);
            words
        };
        match parse_words(&words, true) {
            Err(Error::Unsupported(msg)) => assert!(msg.contains("entry point")),
            other => panic!("expected Unsupported, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn parses_empty_fragment_shader() {
        let mut shader = ShaderBuilder::new();
        shader.begin_main();
        shader.ret();
        let module = parse_words(&shader.finish(), true).unwrap();
        let main = module.main_function_id.unwrap();
        let function = &module.functions[&main];
        assert_eq!(function.block_ids.len(), 1);
        let block = &module.blocks[&function.entry_block];
        assert_eq!(block.instructions.len(&module.arena), 1);
        let term = block.instructions.tail().unwrap();
        assert_eq!(module.arena[term].op, Op::Return);
    }

    #[test]
    fn variables_get_addresses_and_names() {
        let mut shader = ShaderBuilder::new();
        let color = shader.variable(3, shader.ty_vec4, Some("color"));
        let coord = shader.variable(1, shader.ty_vec4, Some("gl_FragCoord"));
        shader.begin_main();
        shader.ret();
        let module = parse_words(&shader.finish(), true).unwrap();

        let color_var = &module.variables[&color];
        assert_eq!(color_var.storage_class, StorageClass::Output);
        assert_eq!(color_var.address, 0x3000);
        let coord_var = &module.variables[&coord];
        assert_eq!(coord_var.storage_class, StorageClass::Input);
        assert_eq!(coord_var.address, 0x2000);

        let info = module.named_variables.get("color").unwrap();
        assert_eq!((info.address, info.size), (0x3000, 16));
    }

    #[test]
    fn constants_take_typed_values() {
        let mut shader = ShaderBuilder::new();
        let half = shader.const_f32(0.5);
        let five = shader.const_i32(5);
        let mask = shader.const_u32(7);
        let all = shader.const_composite(
            shader.ty_vec2,
            &[half, half],
        );
        shader.begin_main();
        shader.ret();
        let module = parse_words(&shader.finish(), true).unwrap();

        assert_eq!(module.constants[&half].value, ConstantValue::F32(0.5));
        assert_eq!(module.constants[&five].value, ConstantValue::I32(5));
        assert_eq!(module.constants[&mask].value, ConstantValue::U32(7));
        assert_eq!(
            module.constants[&all].value,
            ConstantValue::Composite(vec![half, half])
        );
    }

    #[test]
    fn unknown_opcode_is_fatal_in_strict_mode_only() {
        let build = || {
            let mut shader = ShaderBuilder::new();
            shader.begin_main();
            // Opcode 400 does not exist in our subset.
            shader.raw_op(400, &[]);
            shader.ret();
            shader.finish()
        };
        assert!(matches!(
            parse_words(&build(), true),
            Err(Error::Malformed(_))
        ));
        let module = parse_words(&build(), false).unwrap();
        assert!(module.has_unimplemented);
    }

    #[test]
    fn strings_decode_across_word_boundaries() {
        let operands = {
            // "gl_FragColor" plus terminator, little-endian packed.
            let mut shader = ShaderBuilder::new();
            let _ = shader.variable(3, shader.ty_vec4, Some("gl_FragColor"));
            shader.begin_main();
            shader.ret();
            shader.finish()
        };
        let module = parse_words(&operands, true).unwrap();
        assert!(module
            .names
            .values()
            .any(|name| name == "gl_FragColor"));
    }

    #[test]
    fn ext_inst_import_must_be_glsl() {
        let mut words = vec![spv::MAGIC, 0x0001_0300, 0, 10, 0];
        words.push((2 << 16) | op::CAPABILITY as u32);
        words.push(spv::CAPABILITY_SHADER);
        // "OpenCL.std" padded to words.
        let name = b"OpenCL.std\0\0";
        words.push(((2 + name.len() as u32 / 4) << 16) | op::EXT_INST_IMPORT as u32);
        words.push(1);
        for chunk in name.chunks(4) {
            words.push(u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]));
        }
        assert!(matches!(
            parse_words(&words, true),
            Err(Error::Unsupported(_))
        ));
    }
}
