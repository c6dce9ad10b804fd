//! Instruction set architectures.
//!
//! This module contains everything between raw instruction bytes and executable
//! micro-ops. It provides:
//! 1. **Architecture trait:** [`Architecture`], the predecode / exception-handler /
//!    initial-state boundary a core talks to.
//! 2. **Micro-ops:** [`instruction::Instruction`] and its operand/result state machine.
//! 3. **Classification:** Instruction groups and execution-info lookup ([`group`]).
//! 4. **Caches:** The decode cache and the metadata arena ([`cache`]).
//! 5. **Backends:** [`riscv`] (RV64IMAC) and [`aarch64`] (integer subset).

/// AArch64 integer subset.
pub mod aarch64;
/// Decode cache, metadata arena and the shared predecode driver.
pub mod cache;
/// Exception handler protocol and the per-architecture handler wrapper.
pub mod exception;
/// Instruction flags, groups and execution-info lookup.
pub mod group;
/// The micro-op representation.
pub mod instruction;
/// RV64IMAC.
pub mod riscv;

use crate::common::reg::{RegisterFileSet, RegisterFileStructure};
use crate::config::{Config, Isa};
use crate::os::process::Process;

use self::cache::{InstructionMetadata, MetadataId};
use self::exception::{ExceptionHandler, ProcessStateChange};
use self::instruction::Instruction;
use self::{aarch64::Aarch64, riscv::Riscv};

/// The micro-ops decoded from one instruction word, in program order.
pub type MacroOp = Vec<Instruction>;

/// Outcome of predecoding the bytes at an address.
#[derive(Clone, Debug, PartialEq)]
pub enum Predecode {
    /// Too few bytes were available; retry once more bytes are present.
    NeedMoreBytes,
    /// The word at this address is padding; advance the PC by four bytes.
    Skip,
    /// A macro-op was produced from `length` bytes.
    Decoded {
        /// Bytes consumed.
        length: u8,
        /// Micro-ops in program order (never empty).
        macro_op: MacroOp,
    },
}

/// Bytes skipped when predecode reports [`Predecode::Skip`].
pub const SKIP_BYTES: u64 = 4;

/// The decoder backend and architectural conventions of an ISA.
pub trait Architecture {
    /// Predecodes one macro-op from `bytes`, which start at `address`.
    ///
    /// # Arguments
    ///
    /// * `bytes` - Available instruction bytes; may be shorter than an instruction.
    /// * `address` - Address of `bytes[0]`.
    ///
    /// # Returns
    ///
    /// [`Predecode::NeedMoreBytes`] if `bytes` is too short, [`Predecode::Skip`] for
    /// padding words, otherwise the decoded macro-op with fresh sequence and
    /// instruction ids.
    fn predecode(&mut self, bytes: &[u8], address: u64) -> Predecode;

    /// Creates the handler for the exception carried by `instruction`.
    fn handle_exception(
        &self,
        instruction: &Instruction,
        registers: &RegisterFileSet,
    ) -> ExceptionHandler;

    /// Register writes that establish the process's initial state (stack pointer etc).
    fn initial_state(&self, process: &Process) -> ProcessStateChange;

    /// Refreshes architecture-visible counter registers.
    fn update_system_timer_registers(&self, registers: &mut RegisterFileSet, ticks: u64);

    /// Refreshes the retired-instruction counter register, if the ISA has one.
    fn update_retired_counter(&self, _registers: &mut RegisterFileSet, _retired: u64) {}

    /// Shape of the register banks, in [`crate::common::RegisterType::index`] order.
    fn register_file_structure(&self) -> Vec<RegisterFileStructure>;

    /// Longest instruction in bytes.
    fn max_instruction_size(&self) -> u8;

    /// Shortest instruction in bytes (also the PC alignment).
    fn min_instruction_size(&self) -> u8;

    /// Metadata record behind a micro-op.
    fn metadata(&self, id: MetadataId) -> &InstructionMetadata;

    /// Number of distinct instruction words decoded so far.
    fn decode_cache_len(&self) -> usize;
}

/// Enum wrapper for static dispatch of architectures.
/// This avoids vtable lookups in the predecode path.
#[derive(Clone, Debug)]
pub enum ArchitectureWrapper {
    /// RV64IMAC.
    Riscv(Riscv),
    /// AArch64 integer subset.
    Aarch64(Aarch64),
}

impl ArchitectureWrapper {
    /// Creates the architecture selected by `config.core.isa`.
    pub fn new(config: &Config) -> Self {
        match config.core.isa {
            Isa::Riscv => Self::Riscv(Riscv::new(config)),
            Isa::Aarch64 => Self::Aarch64(Aarch64::new(config)),
        }
    }
}

macro_rules! dispatch {
    ($self:ident, $isa:ident => $body:expr) => {
        match $self {
            Self::Riscv($isa) => $body,
            Self::Aarch64($isa) => $body,
        }
    };
}

impl Architecture for ArchitectureWrapper {
    #[inline(always)]
    fn predecode(&mut self, bytes: &[u8], address: u64) -> Predecode {
        dispatch!(self, isa => isa.predecode(bytes, address))
    }

    fn handle_exception(
        &self,
        instruction: &Instruction,
        registers: &RegisterFileSet,
    ) -> ExceptionHandler {
        dispatch!(self, isa => isa.handle_exception(instruction, registers))
    }

    fn initial_state(&self, process: &Process) -> ProcessStateChange {
        dispatch!(self, isa => isa.initial_state(process))
    }

    #[inline(always)]
    fn update_system_timer_registers(&self, registers: &mut RegisterFileSet, ticks: u64) {
        dispatch!(self, isa => isa.update_system_timer_registers(registers, ticks));
    }

    #[inline(always)]
    fn update_retired_counter(&self, registers: &mut RegisterFileSet, retired: u64) {
        dispatch!(self, isa => isa.update_retired_counter(registers, retired));
    }

    fn register_file_structure(&self) -> Vec<RegisterFileStructure> {
        dispatch!(self, isa => isa.register_file_structure())
    }

    fn max_instruction_size(&self) -> u8 {
        dispatch!(self, isa => isa.max_instruction_size())
    }

    fn min_instruction_size(&self) -> u8 {
        dispatch!(self, isa => isa.min_instruction_size())
    }

    fn metadata(&self, id: MetadataId) -> &InstructionMetadata {
        dispatch!(self, isa => isa.metadata(id))
    }

    fn decode_cache_len(&self) -> usize {
        dispatch!(self, isa => isa.decode_cache_len())
    }
}
