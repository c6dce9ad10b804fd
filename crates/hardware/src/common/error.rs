//! Error definitions.
//!
//! This module defines two distinct error families:
//! 1. **Host errors:** [`SimError`] covers failures of the simulator itself (bad
//!    configuration, unreadable programs) and is propagated with `?`.
//! 2. **Instruction exceptions:** [`InstructionException`] describes a fault raised by a
//!    simulated instruction. It is attached to the micro-op and resolved by the
//!    architecture's exception handler, never returned as a host error.

use std::path::PathBuf;

use thiserror::Error;

/// Failures of the simulator host process.
#[derive(Debug, Error)]
pub enum SimError {
    /// A file could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        /// Path that was being read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid JSON for [`crate::Config`].
    #[error("failed to parse configuration: {0}")]
    ConfigParse(#[from] serde_json::Error),

    /// The configuration parsed but describes an impossible machine.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The program image could not be interpreted.
    #[error("failed to load program: {0}")]
    Load(String),

    /// The program image does not fit in simulated memory.
    #[error("program of {size} bytes does not fit in {memory} bytes of memory")]
    ProgramTooLarge {
        /// Size of the loaded image in bytes.
        size: u64,
        /// Configured memory size in bytes.
        memory: u64,
    },
}

/// Result alias for host-level operations.
pub type Result<T> = std::result::Result<T, SimError>;

/// Exceptions raised by a simulated instruction.
///
/// Decode-time kinds are attached during predecode, execute-time kinds when the
/// micro-op generates addresses, receives data or executes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Error)]
pub enum InstructionException {
    /// The instruction word does not decode to a supported instruction.
    #[error("encoding unallocated")]
    EncodingUnallocated,

    /// The program counter is not aligned to the minimum instruction size.
    #[error("misaligned program counter")]
    MisalignedPc,

    /// A memory access targeted an address outside simulated memory.
    #[error("data abort")]
    DataAbort,

    /// An atomic access was not naturally aligned.
    #[error("misaligned atomic access")]
    AlignmentFault,

    /// A supervisor call (`ecall` / `svc`).
    #[error("supervisor call")]
    SupervisorCall,

    /// A breakpoint instruction (`ebreak` / `brk`).
    #[error("breakpoint")]
    Breakpoint,

    /// No configured execution port accepts the instruction.
    #[error("no available execution port")]
    NoAvailablePort,

    /// A system register access named a register the model does not implement.
    #[error("unmapped system register")]
    UnmappedSystemRegister,
}

impl InstructionException {
    /// Returns `true` for exceptions detected while decoding.
    pub const fn is_decode_time(self) -> bool {
        matches!(
            self,
            Self::EncodingUnallocated | Self::MisalignedPc | Self::UnmappedSystemRegister
        )
    }
}
