//! AArch64 integer subset.
//!
//! Fixed 4-byte instructions covering integer arithmetic and logic, wide moves,
//! multiply/divide, unsigned-offset loads and stores, compare-and-swap and the
//! branch family. Stores are split into address and data micro-ops.

/// Instruction decoding.
pub mod decode;
/// Micro-op semantics.
pub mod execute;
/// Exception and syscall handling.
pub mod exception;
/// Operations.
pub mod opcode;

pub use opcode::Opcode;

use crate::common::error::InstructionException;
use crate::common::reg::{Register, RegisterFileSet, RegisterFileStructure, RegisterValue};
use crate::config::Config;
use crate::isa::cache::{Decoder, InstructionMetadata, MetadataId};
use crate::isa::exception::{ExceptionHandler, ProcessStateChange};
use crate::isa::group::ExecutionInfoTable;
use crate::isa::instruction::{Instruction, Opcode as MicroOpcode};
use crate::isa::{Architecture, Predecode};
use crate::os::Process;

/// Stack pointer (general register tag 31).
pub const SP: Register = Register::general(31);

/// Link register `x30`.
pub const LINK_REGISTER: Register = Register::general(30);

/// Zero register; always pre-supplied, never written.
pub const ZERO_REGISTER: Register = Register::general(32);

/// Virtual counter `CNTVCT_EL0`.
pub const COUNTER: Register = Register::system(0);

/// The AArch64 architecture.
#[derive(Clone, Debug)]
pub struct Aarch64 {
    decoder: Decoder,
}

impl Aarch64 {
    /// Creates the architecture with timing from `config`.
    pub fn new(config: &Config) -> Self {
        Self {
            decoder: Decoder::new(ExecutionInfoTable::new(&config.latencies, &config.ports)),
        }
    }
}

impl Architecture for Aarch64 {
    fn predecode(&mut self, bytes: &[u8], address: u64) -> Predecode {
        if address & 0x3 != 0 {
            let macro_op = self.decoder.faulted(
                MicroOpcode::Aarch64(Opcode::Unallocated),
                4,
                address,
                InstructionException::MisalignedPc,
            );
            return Predecode::Decoded {
                length: 4,
                macro_op,
            };
        }
        let [b0, b1, b2, b3, ..] = bytes else {
            return Predecode::NeedMoreBytes;
        };
        let word = u32::from_le_bytes([*b0, *b1, *b2, *b3]);
        if word == 0 {
            return Predecode::Skip;
        }
        let macro_op = self.decoder.macro_op(word, 4, address, decode::decode);
        Predecode::Decoded {
            length: 4,
            macro_op,
        }
    }

    fn handle_exception(
        &self,
        instruction: &Instruction,
        registers: &RegisterFileSet,
    ) -> ExceptionHandler {
        ExceptionHandler::Aarch64(exception::Aarch64ExceptionHandler::new(instruction, registers))
    }

    fn initial_state(&self, process: &Process) -> ProcessStateChange {
        ProcessStateChange {
            registers: vec![(SP, RegisterValue::from(process.stack_pointer()))],
            memory_writes: Vec::new(),
        }
    }

    fn update_system_timer_registers(&self, registers: &mut RegisterFileSet, ticks: u64) {
        registers.set(COUNTER, RegisterValue::from(ticks));
    }

    fn register_file_structure(&self) -> Vec<RegisterFileStructure> {
        vec![
            // x0-x30, sp and the zero register.
            RegisterFileStructure {
                bytes: 8,
                quantity: 33,
            },
            RegisterFileStructure {
                bytes: 8,
                quantity: 32,
            },
            RegisterFileStructure {
                bytes: 1,
                quantity: 1,
            },
            RegisterFileStructure {
                bytes: 8,
                quantity: 1,
            },
        ]
    }

    fn max_instruction_size(&self) -> u8 {
        4
    }

    fn min_instruction_size(&self) -> u8 {
        4
    }

    fn metadata(&self, id: MetadataId) -> &InstructionMetadata {
        self.decoder.metadata(id)
    }

    fn decode_cache_len(&self) -> usize {
        self.decoder.cache_len()
    }
}
