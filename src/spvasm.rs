//! Test support: assemble small SPIR-V word streams in memory so tests can
//! drive the parser and compiler without external files.

use std::collections::HashMap;

use crate::ir::{Id, TypeId};
use crate::spv::{self, op};

fn string_words(text: &str) -> Vec<u32> {
    let mut bytes: Vec<u8> = text.as_bytes().to_vec();
    bytes.push(0);
    while bytes.len() % 4 != 0 {
        bytes.push(0);
    }
    bytes
        .chunks(4)
        .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Builds a single-entry-point fragment shader module word by word.
pub struct ShaderBuilder {
    words: Vec<u32>,
    next_id: u32,
    in_function: bool,
    float_consts: HashMap<u32, Id>,
    int_consts: HashMap<i32, Id>,
    uint_consts: HashMap<u32, Id>,
    pointer_types: HashMap<(u32, TypeId), TypeId>,
    pub main: Id,
    pub glsl: Id,
    pub ty_void: TypeId,
    pub ty_fn_void: TypeId,
    pub ty_bool: TypeId,
    pub ty_float: TypeId,
    pub ty_int: TypeId,
    pub ty_uint: TypeId,
    pub ty_vec2: TypeId,
    pub ty_vec3: TypeId,
    pub ty_vec4: TypeId,
}

impl ShaderBuilder {
    pub fn new() -> ShaderBuilder {
        ShaderBuilder::with_execution_model(spv::EXECUTION_MODEL_FRAGMENT)
    }

    pub fn with_execution_model(model: u32) -> ShaderBuilder {
        let mut shader = ShaderBuilder {
            words: vec![spv::MAGIC, 0x0001_0300, 0, 0, 0],
            next_id: 1,
            in_function: false,
            float_consts: HashMap::new(),
            int_consts: HashMap::new(),
            uint_consts: HashMap::new(),
            pointer_types: HashMap::new(),
            main: 0,
            glsl: 0,
            ty_void: 0,
            ty_fn_void: 0,
            ty_bool: 0,
            ty_float: 0,
            ty_int: 0,
            ty_uint: 0,
            ty_vec2: 0,
            ty_vec3: 0,
            ty_vec4: 0,
        };
        shader.main = shader.id();
        shader.glsl = shader.id();
        shader.push_op(op::CAPABILITY, &[spv::CAPABILITY_SHADER]);
        shader.push_op_string(op::EXT_INST_IMPORT, &[shader.glsl], spv::GLSL_STD_450, &[]);
        // Logical addressing, GLSL450 memory model.
        shader.push_op(op::MEMORY_MODEL, &[0, 1]);
        let main = shader.main;
        shader.push_op_string(op::ENTRY_POINT, &[model, main], "main", &[]);
        shader.push_op_string(op::NAME, &[main], "main(", &[]);

        shader.ty_void = shader.id();
        let (void, fn_void, boolean, float, int, uint) = (
            shader.ty_void,
            shader.id(),
            shader.id(),
            shader.id(),
            shader.id(),
            shader.id(),
        );
        shader.ty_fn_void = fn_void;
        shader.ty_bool = boolean;
        shader.ty_float = float;
        shader.ty_int = int;
        shader.ty_uint = uint;
        shader.push_op(op::TYPE_VOID, &[void]);
        shader.push_op(op::TYPE_FUNCTION, &[fn_void, void]);
        shader.push_op(op::TYPE_BOOL, &[boolean]);
        shader.push_op(op::TYPE_FLOAT, &[float, 32]);
        shader.push_op(op::TYPE_INT, &[int, 32, 1]);
        shader.push_op(op::TYPE_INT, &[uint, 32, 0]);
        shader.ty_vec2 = shader.vector_type(float, 2);
        shader.ty_vec3 = shader.vector_type(float, 3);
        shader.ty_vec4 = shader.vector_type(float, 4);
        shader
    }

    /// Allocate a fresh result ID
    pub fn id(&mut self) -> Id {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn push_op(&mut self, opcode: u16, operands: &[u32]) {
        self.words
            .push((((operands.len() + 1) as u32) << 16) | opcode as u32);
        self.words.extend_from_slice(operands);
    }

    fn push_op_string(&mut self, opcode: u16, pre: &[u32], text: &str, post: &[u32]) {
        let string = string_words(text);
        let count = 1 + pre.len() + string.len() + post.len();
        self.words.push(((count as u32) << 16) | opcode as u32);
        self.words.extend_from_slice(pre);
        self.words.extend_from_slice(&string);
        self.words.extend_from_slice(post);
    }

    /// Emit any opcode verbatim
    pub fn raw_op(&mut self, opcode: u16, operands: &[u32]) {
        self.push_op(opcode, operands);
    }

    pub fn vector_type(&mut self, elem: TypeId, count: u32) -> TypeId {
        let id = self.id();
        self.push_op(op::TYPE_VECTOR, &[id, elem, count]);
        id
    }

    pub fn matrix_type(&mut self, column: TypeId, columns: u32) -> TypeId {
        let id = self.id();
        self.push_op(op::TYPE_MATRIX, &[id, column, columns]);
        id
    }

    fn pointer_type(&mut self, storage_class: u32, pointee: TypeId) -> TypeId {
        if let Some(&id) = self.pointer_types.get(&(storage_class, pointee)) {
            return id;
        }
        let id = self.id();
        self.push_op(op::TYPE_POINTER, &[id, storage_class, pointee]);
        self.pointer_types.insert((storage_class, pointee), id);
        id
    }

    pub fn const_f32(&mut self, value: f32) -> Id {
        let bits = value.to_bits();
        if let Some(&id) = self.float_consts.get(&bits) {
            return id;
        }
        let id = self.id();
        let ty = self.ty_float;
        self.push_op(op::CONSTANT, &[ty, id, bits]);
        self.float_consts.insert(bits, id);
        id
    }

    pub fn const_i32(&mut self, value: i32) -> Id {
        if let Some(&id) = self.int_consts.get(&value) {
            return id;
        }
        let id = self.id();
        let ty = self.ty_int;
        self.push_op(op::CONSTANT, &[ty, id, value as u32]);
        self.int_consts.insert(value, id);
        id
    }

    pub fn const_u32(&mut self, value: u32) -> Id {
        if let Some(&id) = self.uint_consts.get(&value) {
            return id;
        }
        let id = self.id();
        let ty = self.ty_uint;
        self.push_op(op::CONSTANT, &[ty, id, value]);
        self.uint_consts.insert(value, id);
        id
    }

    pub fn const_composite(&mut self, type_id: TypeId, members: &[Id]) -> Id {
        let id = self.id();
        let mut operands = vec![type_id, id];
        operands.extend_from_slice(members);
        self.push_op(op::CONSTANT_COMPOSITE, &operands);
        id
    }

    /// Declare a variable; `storage_class` is the raw SPIR-V value
    /// (1 = Input, 3 = Output, 7 = Function)
    pub fn variable(&mut self, storage_class: u32, pointee: TypeId, name: Option<&str>) -> Id {
        let pointer = self.pointer_type(storage_class, pointee);
        let id = self.id();
        if let Some(name) = name {
            self.push_op_string(op::NAME, &[id], name, &[]);
        }
        self.push_op(op::VARIABLE, &[pointer, id, storage_class]);
        id
    }

    /// Open `main` and its entry block, returning the entry label ID
    pub fn begin_main(&mut self) -> Id {
        let (ty_void, ty_fn_void, main) = (self.ty_void, self.ty_fn_void, self.main);
        self.push_op(op::FUNCTION, &[ty_void, main, 0, ty_fn_void]);
        let entry = self.id();
        self.push_op(op::LABEL, &[entry]);
        self.in_function = true;
        entry
    }

    /// Open a block with a pre-allocated label ID
    pub fn label(&mut self, id: Id) {
        self.push_op(op::LABEL, &[id]);
    }

    pub fn ret(&mut self) {
        self.push_op(op::RETURN, &[]);
    }

    pub fn branch(&mut self, target: Id) {
        self.push_op(op::BRANCH, &[target]);
    }

    pub fn branch_cond(&mut self, cond: Id, true_target: Id, false_target: Id) {
        self.push_op(op::BRANCH_CONDITIONAL, &[cond, true_target, false_target]);
    }

    /// Emit an instruction with a result, returning the result ID.
    /// `operands` follow the result ID.
    pub fn emit(&mut self, opcode: u16, result_type: TypeId, operands: &[u32]) -> Id {
        let id = self.id();
        let mut words = vec![result_type, id];
        words.extend_from_slice(operands);
        self.push_op(opcode, &words);
        id
    }

    pub fn load(&mut self, result_type: TypeId, pointer: Id) -> Id {
        self.emit(op::LOAD, result_type, &[pointer])
    }

    pub fn store(&mut self, pointer: Id, object: Id) {
        self.push_op(op::STORE, &[pointer, object]);
    }

    pub fn access_chain(&mut self, result_type: TypeId, storage_class: u32, base: Id, indexes: &[Id]) -> Id {
        let pointer = self.pointer_type(storage_class, result_type);
        let id = self.id();
        let mut words = vec![pointer, id, base];
        words.extend_from_slice(indexes);
        self.push_op(op::ACCESS_CHAIN, &words);
        id
    }

    pub fn phi(&mut self, result_type: TypeId, pairs: &[(Id, Id)]) -> Id {
        let id = self.id();
        let mut words = vec![result_type, id];
        for &(value, block) in pairs {
            words.push(value);
            words.push(block);
        }
        self.push_op(op::PHI, &words);
        id
    }

    /// GLSL.std.450 instruction
    pub fn ext(&mut self, result_type: TypeId, number: u32, args: &[Id]) -> Id {
        let id = self.id();
        let glsl = self.glsl;
        let mut words = vec![result_type, id, glsl, number];
        words.extend_from_slice(args);
        self.push_op(op::EXT_INST, &words);
        id
    }

    /// Close the function and return the finished word stream
    pub fn finish(mut self) -> Vec<u32> {
        if self.in_function {
            self.push_op(op::FUNCTION_END, &[]);
        }
        self.words[3] = self.next_id;
        self.words
    }
}
