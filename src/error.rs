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

use std::{io, str};
use thiserror::Error;

/// Custom `Error` for SPIR-V parsing and compilation
#[derive(Debug, Error)]
pub enum Error {
    /// The binary is not a SPIR-V module this crate can decode
    #[error("malformed SPIR-V: {0}")]
    Malformed(String),
    /// Valid SPIR-V, but outside the supported subset (execution model,
    /// capability, extended instruction set)
    #[error("unsupported feature: {0}")]
    Unsupported(String),
    /// An ID was used where its type does not fit
    #[error("type error: {0}")]
    Type(String),
    /// The register allocator ran out of physical registers
    #[error("no physical register available for r{reg}[{lane}] at pc {pc}")]
    AllocationFailure {
        /// Virtual register that could not be placed
        reg: u32,
        /// Lane of the virtual register
        lane: usize,
        /// Linear program counter of the defining instruction
        pc: usize,
    },
    /// An internal IR invariant did not hold
    #[error("invariant violated: {0}")]
    Invariant(String),
    /// An opcode this compiler does not implement, under strict mode
    #[error("unimplemented: {0}")]
    Unimplemented(String),
    /// An I/O error occured
    #[error(transparent)]
    Io(#[from] io::Error),
    /// Error inside of [Scroll](https://docs.rs/scroll) occured
    #[error("error while reading: {0}")]
    Scroll(#[from] scroll::Error),
}

impl From<str::Utf8Error> for Error {
    fn from(err: str::Utf8Error) -> Error {
        Error::Malformed(err.to_string())
    }
}
