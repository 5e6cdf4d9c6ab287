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

//! Numeric constants from the SPIR-V specification (unified 1.x), restricted
//! to the subset this compiler consumes.

use crate::{Error, Result};

/// First word of every SPIR-V module, in the module's own byte order.
pub const MAGIC: u32 = 0x0723_0203;

/// `OpSource` language identifier for GLSL.
pub const SOURCE_LANGUAGE_GLSL: u32 = 2;

/// The one capability the compiler accepts.
pub const CAPABILITY_SHADER: u32 = 1;

/// Execution model operand of `OpEntryPoint` for fragment shaders.
pub const EXECUTION_MODEL_FRAGMENT: u32 = 4;

/// The one extended instruction set the compiler accepts.
pub const GLSL_STD_450: &str = "GLSL.std.450";

/// Core opcodes (the `u16` low half of an instruction's first word).
pub mod op {
    pub const NOP: u16 = 0;
    pub const UNDEF: u16 = 1;
    pub const SOURCE_CONTINUED: u16 = 2;
    pub const SOURCE: u16 = 3;
    pub const SOURCE_EXTENSION: u16 = 4;
    pub const NAME: u16 = 5;
    pub const MEMBER_NAME: u16 = 6;
    pub const STRING: u16 = 7;
    pub const LINE: u16 = 8;
    pub const EXTENSION: u16 = 10;
    pub const EXT_INST_IMPORT: u16 = 11;
    pub const EXT_INST: u16 = 12;
    pub const MEMORY_MODEL: u16 = 14;
    pub const ENTRY_POINT: u16 = 15;
    pub const EXECUTION_MODE: u16 = 16;
    pub const CAPABILITY: u16 = 17;
    pub const TYPE_VOID: u16 = 19;
    pub const TYPE_BOOL: u16 = 20;
    pub const TYPE_INT: u16 = 21;
    pub const TYPE_FLOAT: u16 = 22;
    pub const TYPE_VECTOR: u16 = 23;
    pub const TYPE_MATRIX: u16 = 24;
    pub const TYPE_IMAGE: u16 = 25;
    pub const TYPE_SAMPLER: u16 = 26;
    pub const TYPE_SAMPLED_IMAGE: u16 = 27;
    pub const TYPE_ARRAY: u16 = 28;
    pub const TYPE_STRUCT: u16 = 30;
    pub const TYPE_POINTER: u16 = 32;
    pub const TYPE_FUNCTION: u16 = 33;
    pub const CONSTANT_TRUE: u16 = 41;
    pub const CONSTANT_FALSE: u16 = 42;
    pub const CONSTANT: u16 = 43;
    pub const CONSTANT_COMPOSITE: u16 = 44;
    pub const FUNCTION: u16 = 54;
    pub const FUNCTION_PARAMETER: u16 = 55;
    pub const FUNCTION_END: u16 = 56;
    pub const FUNCTION_CALL: u16 = 57;
    pub const VARIABLE: u16 = 59;
    pub const LOAD: u16 = 61;
    pub const STORE: u16 = 62;
    pub const ACCESS_CHAIN: u16 = 65;
    pub const IN_BOUNDS_ACCESS_CHAIN: u16 = 66;
    pub const DECORATE: u16 = 71;
    pub const MEMBER_DECORATE: u16 = 72;
    pub const VECTOR_SHUFFLE: u16 = 79;
    pub const COMPOSITE_CONSTRUCT: u16 = 80;
    pub const COMPOSITE_EXTRACT: u16 = 81;
    pub const COPY_OBJECT: u16 = 83;
    pub const SAMPLED_IMAGE: u16 = 86;
    pub const IMAGE_SAMPLE_IMPLICIT_LOD: u16 = 87;
    pub const IMAGE_SAMPLE_EXPLICIT_LOD: u16 = 88;
    pub const CONVERT_F_TO_U: u16 = 109;
    pub const CONVERT_F_TO_S: u16 = 110;
    pub const CONVERT_S_TO_F: u16 = 111;
    pub const CONVERT_U_TO_F: u16 = 112;
    pub const BITCAST: u16 = 124;
    pub const S_NEGATE: u16 = 126;
    pub const F_NEGATE: u16 = 127;
    pub const I_ADD: u16 = 128;
    pub const F_ADD: u16 = 129;
    pub const I_SUB: u16 = 130;
    pub const F_SUB: u16 = 131;
    pub const I_MUL: u16 = 132;
    pub const F_MUL: u16 = 133;
    pub const U_DIV: u16 = 134;
    pub const S_DIV: u16 = 135;
    pub const F_DIV: u16 = 136;
    pub const U_MOD: u16 = 137;
    pub const S_REM: u16 = 138;
    pub const S_MOD: u16 = 139;
    pub const F_MOD: u16 = 141;
    pub const VECTOR_TIMES_SCALAR: u16 = 142;
    pub const MATRIX_TIMES_VECTOR: u16 = 145;
    pub const DOT: u16 = 148;
    pub const LOGICAL_OR: u16 = 166;
    pub const LOGICAL_AND: u16 = 167;
    pub const LOGICAL_NOT: u16 = 168;
    pub const SELECT: u16 = 169;
    pub const I_EQUAL: u16 = 170;
    pub const I_NOT_EQUAL: u16 = 171;
    pub const U_GREATER_THAN: u16 = 172;
    pub const S_GREATER_THAN: u16 = 173;
    pub const U_GREATER_THAN_EQUAL: u16 = 174;
    pub const S_GREATER_THAN_EQUAL: u16 = 175;
    pub const U_LESS_THAN: u16 = 176;
    pub const S_LESS_THAN: u16 = 177;
    pub const U_LESS_THAN_EQUAL: u16 = 178;
    pub const S_LESS_THAN_EQUAL: u16 = 179;
    pub const F_ORD_EQUAL: u16 = 180;
    pub const F_ORD_NOT_EQUAL: u16 = 182;
    pub const F_ORD_LESS_THAN: u16 = 184;
    pub const F_ORD_GREATER_THAN: u16 = 186;
    pub const F_ORD_LESS_THAN_EQUAL: u16 = 188;
    pub const F_ORD_GREATER_THAN_EQUAL: u16 = 190;
    pub const PHI: u16 = 245;
    pub const LOOP_MERGE: u16 = 246;
    pub const SELECTION_MERGE: u16 = 247;
    pub const LABEL: u16 = 248;
    pub const BRANCH: u16 = 249;
    pub const BRANCH_CONDITIONAL: u16 = 250;
    pub const KILL: u16 = 252;
    pub const RETURN: u16 = 253;
    pub const RETURN_VALUE: u16 = 254;
    pub const UNREACHABLE: u16 = 255;
    pub const NO_LINE: u16 = 317;
}

/// GLSL.std.450 extended instruction numbers (`OpExtInst` operand 4).
pub mod glsl {
    pub const ROUND: u32 = 1;
    pub const TRUNC: u32 = 3;
    pub const F_ABS: u32 = 4;
    pub const S_ABS: u32 = 5;
    pub const F_SIGN: u32 = 6;
    pub const FLOOR: u32 = 8;
    pub const CEIL: u32 = 9;
    pub const FRACT: u32 = 10;
    pub const RADIANS: u32 = 11;
    pub const DEGREES: u32 = 12;
    pub const SIN: u32 = 13;
    pub const COS: u32 = 14;
    pub const TAN: u32 = 15;
    pub const ASIN: u32 = 16;
    pub const ACOS: u32 = 17;
    pub const ATAN: u32 = 18;
    pub const ATAN2: u32 = 25;
    pub const POW: u32 = 26;
    pub const EXP: u32 = 27;
    pub const LOG: u32 = 28;
    pub const EXP2: u32 = 29;
    pub const LOG2: u32 = 30;
    pub const SQRT: u32 = 31;
    pub const INVERSE_SQRT: u32 = 32;
    pub const F_MIN: u32 = 37;
    pub const F_MAX: u32 = 40;
    pub const F_CLAMP: u32 = 43;
    pub const F_MIX: u32 = 46;
    pub const STEP: u32 = 48;
    pub const SMOOTH_STEP: u32 = 49;
    pub const LENGTH: u32 = 66;
    pub const DISTANCE: u32 = 67;
    pub const CROSS: u32 = 68;
    pub const NORMALIZE: u32 = 69;
    pub const REFLECT: u32 = 71;
}

/// Decoration kinds the compiler reads.
pub mod dec {
    pub const RELAXED_PRECISION: u32 = 0;
    pub const BLOCK: u32 = 2;
    pub const ARRAY_STRIDE: u32 = 6;
    pub const BUILT_IN: u32 = 11;
    pub const LOCATION: u32 = 30;
    pub const BINDING: u32 = 33;
    pub const DESCRIPTOR_SET: u32 = 34;
    pub const OFFSET: u32 = 35;
    pub const LINKAGE_ATTRIBUTES: u32 = 41;
}

bitflags! {
    /// `OpFunction` function control mask
    pub struct FunctionControl: u32 {
        const NONE = 0;
        const INLINE = 1 << 0;
        const DONT_INLINE = 1 << 1;
        const PURE = 1 << 2;
        const CONST = 1 << 3;
    }
}

bitflags! {
    /// `OpSelectionMerge` selection control mask
    pub struct SelectionControl: u32 {
        const NONE = 0;
        const FLATTEN = 1 << 0;
        const DONT_FLATTEN = 1 << 1;
    }
}

bitflags! {
    /// `OpLoopMerge` loop control mask
    pub struct LoopControl: u32 {
        const NONE = 0;
        const UNROLL = 1 << 0;
        const DONT_UNROLL = 1 << 1;
    }
}

/// Where a variable lives (`OpVariable` / `OpTypePointer` operand)
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StorageClass {
    /// Read-only module-scope storage (samplers, images)
    UniformConstant,
    /// Per-fragment inputs (e.g. `gl_FragCoord`)
    Input,
    /// Uniform buffer contents
    Uniform,
    /// Per-fragment outputs (e.g. `gl_FragColor`)
    Output,
    /// Module-scope read/write storage
    Private,
    /// Function-frame storage
    Function,
    /// Push constant block
    PushConstant,
}

impl StorageClass {
    /// Decode an `OpVariable`/`OpTypePointer` storage class operand
    pub fn from_word(word: u32) -> Result<StorageClass> {
        Ok(match word {
            0 => StorageClass::UniformConstant,
            1 => StorageClass::Input,
            2 => StorageClass::Uniform,
            3 => StorageClass::Output,
            6 => StorageClass::Private,
            7 => StorageClass::Function,
            9 => StorageClass::PushConstant,
            other => {
                return Err(Error::Unsupported(format!(
                    "storage class {} is not supported",
                    other
                )))
            }
        })
    }
}

/// The name of a core opcode, for diagnostics. Covers the subset above plus
/// a handful of opcodes we recognize only to reject or skip.
pub fn opcode_name(opcode: u16) -> &'static str {
    match opcode {
        op::NOP => "OpNop",
        op::UNDEF => "OpUndef",
        op::SOURCE => "OpSource",
        op::NAME => "OpName",
        op::MEMBER_NAME => "OpMemberName",
        op::STRING => "OpString",
        op::LINE => "OpLine",
        op::EXT_INST_IMPORT => "OpExtInstImport",
        op::EXT_INST => "OpExtInst",
        op::MEMORY_MODEL => "OpMemoryModel",
        op::ENTRY_POINT => "OpEntryPoint",
        op::EXECUTION_MODE => "OpExecutionMode",
        op::CAPABILITY => "OpCapability",
        op::TYPE_VOID => "OpTypeVoid",
        op::TYPE_BOOL => "OpTypeBool",
        op::TYPE_INT => "OpTypeInt",
        op::TYPE_FLOAT => "OpTypeFloat",
        op::TYPE_VECTOR => "OpTypeVector",
        op::TYPE_MATRIX => "OpTypeMatrix",
        op::TYPE_IMAGE => "OpTypeImage",
        op::TYPE_SAMPLER => "OpTypeSampler",
        op::TYPE_SAMPLED_IMAGE => "OpTypeSampledImage",
        op::TYPE_ARRAY => "OpTypeArray",
        op::TYPE_STRUCT => "OpTypeStruct",
        op::TYPE_POINTER => "OpTypePointer",
        op::TYPE_FUNCTION => "OpTypeFunction",
        op::CONSTANT_TRUE => "OpConstantTrue",
        op::CONSTANT_FALSE => "OpConstantFalse",
        op::CONSTANT => "OpConstant",
        op::CONSTANT_COMPOSITE => "OpConstantComposite",
        op::FUNCTION => "OpFunction",
        op::FUNCTION_PARAMETER => "OpFunctionParameter",
        op::FUNCTION_END => "OpFunctionEnd",
        op::FUNCTION_CALL => "OpFunctionCall",
        op::VARIABLE => "OpVariable",
        op::LOAD => "OpLoad",
        op::STORE => "OpStore",
        op::ACCESS_CHAIN => "OpAccessChain",
        op::IN_BOUNDS_ACCESS_CHAIN => "OpInBoundsAccessChain",
        op::DECORATE => "OpDecorate",
        op::MEMBER_DECORATE => "OpMemberDecorate",
        op::VECTOR_SHUFFLE => "OpVectorShuffle",
        op::COMPOSITE_CONSTRUCT => "OpCompositeConstruct",
        op::COMPOSITE_EXTRACT => "OpCompositeExtract",
        op::COPY_OBJECT => "OpCopyObject",
        op::SAMPLED_IMAGE => "OpSampledImage",
        op::IMAGE_SAMPLE_IMPLICIT_LOD => "OpImageSampleImplicitLod",
        op::IMAGE_SAMPLE_EXPLICIT_LOD => "OpImageSampleExplicitLod",
        op::CONVERT_F_TO_U => "OpConvertFToU",
        op::CONVERT_F_TO_S => "OpConvertFToS",
        op::CONVERT_S_TO_F => "OpConvertSToF",
        op::CONVERT_U_TO_F => "OpConvertUToF",
        op::BITCAST => "OpBitcast",
        op::S_NEGATE => "OpSNegate",
        op::F_NEGATE => "OpFNegate",
        op::I_ADD => "OpIAdd",
        op::F_ADD => "OpFAdd",
        op::I_SUB => "OpISub",
        op::F_SUB => "OpFSub",
        op::I_MUL => "OpIMul",
        op::F_MUL => "OpFMul",
        op::U_DIV => "OpUDiv",
        op::S_DIV => "OpSDiv",
        op::F_DIV => "OpFDiv",
        op::U_MOD => "OpUMod",
        op::S_REM => "OpSRem",
        op::S_MOD => "OpSMod",
        op::F_MOD => "OpFMod",
        op::VECTOR_TIMES_SCALAR => "OpVectorTimesScalar",
        op::MATRIX_TIMES_VECTOR => "OpMatrixTimesVector",
        op::DOT => "OpDot",
        op::LOGICAL_OR => "OpLogicalOr",
        op::LOGICAL_AND => "OpLogicalAnd",
        op::LOGICAL_NOT => "OpLogicalNot",
        op::SELECT => "OpSelect",
        op::I_EQUAL => "OpIEqual",
        op::I_NOT_EQUAL => "OpINotEqual",
        op::U_GREATER_THAN => "OpUGreaterThan",
        op::S_GREATER_THAN => "OpSGreaterThan",
        op::U_GREATER_THAN_EQUAL => "OpUGreaterThanEqual",
        op::S_GREATER_THAN_EQUAL => "OpSGreaterThanEqual",
        op::U_LESS_THAN => "OpULessThan",
        op::S_LESS_THAN => "OpSLessThan",
        op::U_LESS_THAN_EQUAL => "OpULessThanEqual",
        op::S_LESS_THAN_EQUAL => "OpSLessThanEqual",
        op::F_ORD_EQUAL => "OpFOrdEqual",
        op::F_ORD_NOT_EQUAL => "OpFOrdNotEqual",
        op::F_ORD_LESS_THAN => "OpFOrdLessThan",
        op::F_ORD_GREATER_THAN => "OpFOrdGreaterThan",
        op::F_ORD_LESS_THAN_EQUAL => "OpFOrdLessThanEqual",
        op::F_ORD_GREATER_THAN_EQUAL => "OpFOrdGreaterThanEqual",
        op::PHI => "OpPhi",
        op::LOOP_MERGE => "OpLoopMerge",
        op::SELECTION_MERGE => "OpSelectionMerge",
        op::LABEL => "OpLabel",
        op::BRANCH => "OpBranch",
        op::BRANCH_CONDITIONAL => "OpBranchConditional",
        op::KILL => "OpKill",
        op::RETURN => "OpReturn",
        op::RETURN_VALUE => "OpReturnValue",
        op::UNREACHABLE => "OpUnreachable",
        op::NO_LINE => "OpNoLine",
        _ => "Op?",
    }
}
