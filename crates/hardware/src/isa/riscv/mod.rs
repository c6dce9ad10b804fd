//! RV64IMAC.
//!
//! The RISC-V backend decodes the base integer ISA with the M and A extensions,
//! compressed instructions, and CSR access to the user counters. It provides:
//! 1. **Opcodes:** [`Opcode`] and the major-opcode constants ([`opcode`]).
//! 2. **Decoding:** 32-bit decoding ([`decode`]) and compressed expansion ([`rvc`]).
//! 3. **Semantics:** Address generation and execution ([`execute`]).
//! 4. **Architecture:** [`Riscv`], the [`Architecture`] implementation.

/// Modelled control and status registers.
pub mod csr;
/// 32-bit instruction decoding.
pub mod decode;
/// Micro-op semantics.
pub mod execute;
/// Trap and syscall handling.
pub mod exception;
/// Operations and encoding constants.
pub mod opcode;
/// Compressed instruction expansion.
pub mod rvc;

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

/// Stack pointer (`x2`).
pub const SP: Register = Register::general(2);

/// The RISC-V architecture.
#[derive(Clone, Debug)]
pub struct Riscv {
    decoder: Decoder,
}

impl Riscv {
    /// Creates the architecture with timing from `config`.
    pub fn new(config: &Config) -> Self {
        Self {
            decoder: Decoder::new(ExecutionInfoTable::new(&config.latencies, &config.ports)),
        }
    }
}

impl Architecture for Riscv {
    fn predecode(&mut self, bytes: &[u8], address: u64) -> Predecode {
        if address & 1 != 0 {
            let macro_op = self.decoder.faulted(
                MicroOpcode::Riscv(Opcode::Unallocated),
                1,
                address,
                InstructionException::MisalignedPc,
            );
            return Predecode::Decoded {
                length: 1,
                macro_op,
            };
        }
        let [b0, b1, rest @ ..] = bytes else {
            return Predecode::NeedMoreBytes;
        };
        let low = u16::from_le_bytes([*b0, *b1]);

        if low & 0b11 != 0b11 {
            if low == 0 {
                match rest {
                    [0, 0, ..] => return Predecode::Skip,
                    [_, _, ..] => {}
                    _ => return Predecode::NeedMoreBytes,
                }
            }
            let macro_op = self.decoder.macro_op(u32::from(low), 2, address, |raw| {
                rvc::expand(raw as u16).map_or_else(decode::unallocated, decode::decode)
            });
            return Predecode::Decoded {
                length: 2,
                macro_op,
            };
        }

        let [b2, b3, ..] = rest else {
            return Predecode::NeedMoreBytes;
        };
        let word = u32::from_le_bytes([*b0, *b1, *b2, *b3]);
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
        ExceptionHandler::Riscv(exception::RiscvExceptionHandler::new(instruction, registers))
    }

    fn initial_state(&self, process: &Process) -> ProcessStateChange {
        ProcessStateChange {
            registers: vec![(SP, RegisterValue::from(process.stack_pointer()))],
            memory_writes: Vec::new(),
        }
    }

    fn update_system_timer_registers(&self, registers: &mut RegisterFileSet, ticks: u64) {
        for csr in [csr::CYCLE, csr::TIME] {
            if let Some(reg) = csr::register(csr) {
                registers.set(reg, RegisterValue::from(ticks));
            }
        }
    }

    fn update_retired_counter(&self, registers: &mut RegisterFileSet, retired: u64) {
        if let Some(reg) = csr::register(csr::INSTRET) {
            registers.set(reg, RegisterValue::from(retired));
        }
    }

    fn register_file_structure(&self) -> Vec<RegisterFileStructure> {
        vec![
            RegisterFileStructure {
                bytes: 8,
                quantity: 32,
            },
            RegisterFileStructure {
                bytes: 8,
                quantity: 32,
            },
            RegisterFileStructure {
                bytes: 1,
                quantity: 0,
            },
            RegisterFileStructure {
                bytes: 8,
                quantity: csr::COUNT,
            },
        ]
    }

    fn max_instruction_size(&self) -> u8 {
        4
    }

    fn min_instruction_size(&self) -> u8 {
        2
    }

    fn metadata(&self, id: MetadataId) -> &InstructionMetadata {
        self.decoder.metadata(id)
    }

    fn decode_cache_len(&self) -> usize {
        self.decoder.cache_len()
    }
}
