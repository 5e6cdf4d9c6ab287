//! Compile SPIR-V fragment shaders to scalar RISC-V-style assembly for a
//! soft GPU core.
//!
//! The pipeline is strict and single-threaded: the binary reader builds a
//! typed SSA [`Module`], the control-flow graph and dominator tree are
//! derived, φ instructions are checked and given edge-copy semantics,
//! vector instructions are expanded to scalar lanes, liveness is computed,
//! an add-immediate peephole runs, registers are assigned down the
//! dominator tree, and the assembly listing is written out.
//!
//! ```no_run
//! use spirv_shade::{compile_to, SpirvReader};
//!
//! # fn main() -> spirv_shade::Result<()> {
//! let mut module = SpirvReader::from_path("shader.spv", true)?;
//! let library = std::fs::read_to_string("library.s")?;
//! let mut out = Vec::new();
//! compile_to(&mut module, &mut out, &library)?;
//! print!("{}", String::from_utf8_lossy(&out));
//! # Ok(())
//! # }
//! ```

use memmap::MmapOptions;
use std::fs::File;
use std::path::Path;

#[macro_use]
extern crate bitflags;

mod cfg;
mod compile;
mod emit;
mod error;
mod interp;
mod ir;
mod liveness;
mod module;
mod parse;
mod phi;
mod regalloc;
mod scalarize;
pub mod spv;
#[cfg(test)]
mod spvasm;
mod types;

pub use compile::{compile_to, linearize, peephole, Compiler, CompilerRegister};
pub use error::Error;
pub use interp::{Interpreter, Outcome, Value};
pub use ir::{
    BinOp, Block, BlockId, Constant, ConstantValue, EntryPoint, Function, Id, Instruction,
    InstructionList, LineInfo, MemoryRegion, Op, SourceInfo, TernOp, TypeId, UnOp, Variable,
    VariableInfo, ANY_BLOCK, NO_BLOCK_ID,
};
pub use module::{Decorations, Module, PointerInfo, MEMORY_SIZE};
pub use parse::parse_words;
pub use spv::StorageClass;
pub use types::{Type, TypeKind, TypeRegistry};

pub use cfg::compute_cfg;
pub use liveness::compute_liveness;
pub use phi::validate_phis;
pub use scalarize::expand_vectors;

pub type Result<T> = std::result::Result<T, error::Error>;

/// Reader for SPIR-V binaries
pub struct SpirvReader;

impl SpirvReader {
    /// Tries to load a SPIR-V module from the given path
    pub fn from_path<P: AsRef<Path>>(path: P, throw_on_unimplemented: bool) -> Result<Module> {
        let source = unsafe { MmapOptions::new().map(&File::open(path.as_ref())?)? };
        SpirvReader::from_vec(&source, throw_on_unimplemented)
    }

    /// Loads a SPIR-V module from a byte buffer of little-endian words
    pub fn from_vec<B: AsRef<[u8]>>(source: B, throw_on_unimplemented: bool) -> Result<Module> {
        let words = parse::words_from_bytes(source.as_ref())?;
        parse::parse_words(&words, throw_on_unimplemented)
    }

    /// Loads a SPIR-V module from its words
    pub fn from_words(words: &[u32], throw_on_unimplemented: bool) -> Result<Module> {
        parse::parse_words(words, throw_on_unimplemented)
    }
}
