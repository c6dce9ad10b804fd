//! Emulation core.
//!
//! The reference model: one macro-op per tick with no timing. Each tick it:
//! 1. **Fetches:** Reads the longest possible instruction at the PC and predecodes it.
//! 2. **Executes:** Runs every micro-op of the macro-op to completion in order,
//!    reading operands from the register file and accessing memory directly.
//! 3. **Retires:** Writes results back and moves the PC to the next instruction or
//!    the resolved branch target.
//!
//! A micro-op carrying an exception stops the macro-op; its exception handler is
//! ticked to completion within the same core tick.

use std::collections::BTreeMap;

use tracing::{debug, trace, warn};

use crate::common::reg::RegisterFileSet;
use crate::core::Core;
use crate::core::system::System;
use crate::core::units::lsu::Lsu;
use crate::isa::instruction::Instruction;
use crate::isa::{Architecture, ArchitectureWrapper, Predecode, SKIP_BYTES};
use crate::memory::MemoryAccessTarget;
use crate::os::Process;

/// Functional reference core.
#[derive(Debug)]
pub struct EmulationCore {
    isa: ArchitectureWrapper,
    registers: RegisterFileSet,
    lsu: Lsu,

    pc: u64,
    program_length: u64,
    halted: bool,

    ticks: u64,
    retired: u64,
    branches_executed: u64,
}

impl EmulationCore {
    /// Creates a core at the entry point of `process`.
    ///
    /// # Arguments
    ///
    /// * `isa` - Architecture to decode and execute with.
    /// * `process` - Program whose initial register and stack state is applied.
    /// * `system` - Memory the initial stack contents are written to.
    pub fn new(isa: ArchitectureWrapper, process: &Process, system: &mut System) -> Self {
        let mut registers = RegisterFileSet::new(&isa.register_file_structure());
        let initial = isa.initial_state(process);
        initial.apply_registers(&mut registers);
        initial.apply_memory(system.data_memory.as_mut());
        Self {
            isa,
            registers,
            lsu: Lsu::new(),
            pc: process.entry(),
            program_length: process.program_byte_length(),
            halted: process.entry() >= process.program_byte_length(),
            ticks: 0,
            retired: 0,
            branches_executed: 0,
        }
    }

    /// Address of the next instruction.
    pub const fn pc(&self) -> u64 {
        self.pc
    }

    fn fetch(&mut self, system: &mut System) -> Option<(u8, Vec<Instruction>)> {
        let size = self.isa.max_instruction_size();
        let memory = system.instruction_memory.as_mut();
        memory.request_read(MemoryAccessTarget::new(self.pc, u16::from(size)), self.pc);
        let bytes = memory
            .completed_reads()
            .iter()
            .find(|read| read.request_id == self.pc)
            .and_then(|read| read.data.clone());
        memory.clear_completed_reads();

        let Some(bytes) = bytes else {
            warn!(pc = format_args!("{:#x}", self.pc), "instruction fetch outside memory");
            self.halted = true;
            return None;
        };
        match self.isa.predecode(&bytes, self.pc) {
            Predecode::Decoded { length, macro_op } => Some((length, macro_op)),
            Predecode::Skip => {
                self.pc += SKIP_BYTES;
                self.halted = self.pc >= self.program_length;
                None
            }
            Predecode::NeedMoreBytes => {
                warn!(pc = format_args!("{:#x}", self.pc), "truncated instruction");
                self.halted = true;
                None
            }
        }
    }

    /// Runs one micro-op to completion.
    ///
    /// # Returns
    ///
    /// `false` if the micro-op raised an exception and the macro-op must stop.
    fn execute(&mut self, mut uop: Instruction, system: &mut System) -> bool {
        if uop.exception_encountered() {
            self.raise(&uop, system);
            return false;
        }

        let sources = uop.source_registers().to_vec();
        for (i, reg) in sources.into_iter().enumerate() {
            if !uop.is_operand_ready(i) {
                uop.supply_operand(i, self.registers.get(reg));
            }
        }

        if uop.is_load() || uop.is_store_address() {
            let targets = uop.generate_addresses().to_vec();
            if uop.exception_encountered() {
                self.raise(&uop, system);
                return false;
            }
            if uop.is_load() {
                let memory = system.data_memory.as_mut();
                for target in targets {
                    memory.request_read(target, uop.sequence_id());
                }
                let reads: Vec<_> = memory
                    .completed_reads()
                    .iter()
                    .filter(|read| read.request_id == uop.sequence_id())
                    .map(|read| (read.target.address, read.value()))
                    .collect();
                memory.clear_completed_reads();
                for (address, value) in reads {
                    uop.supply_data(address, value);
                }
                if uop.exception_encountered() {
                    self.raise(&uop, system);
                    return false;
                }
            } else if !uop.is_store_data() {
                self.lsu.commit(&mut uop, system.data_memory.as_mut());
                return true;
            }
        }

        uop.execute();
        if uop.exception_encountered() {
            self.raise(&uop, system);
            return false;
        }
        self.lsu.commit(&mut uop, system.data_memory.as_mut());

        if uop.is_branch() {
            self.branches_executed += 1;
            self.pc = uop.branch_address();
        }
        for (&reg, &value) in uop.destination_registers().iter().zip(uop.results()) {
            self.registers.set(reg, value);
        }
        trace!(
            target: "commit",
            address = format_args!("{:#x}", uop.instruction_address()),
            op = uop.opcode().mnemonic(),
            "retired"
        );
        true
    }

    /// Runs the exception handler for `uop` to completion and applies its result.
    fn raise(&mut self, uop: &Instruction, system: &mut System) {
        debug!(
            address = format_args!("{:#x}", uop.instruction_address()),
            exception = ?uop.exception(),
            "exception raised"
        );
        let mut handler = self.isa.handle_exception(uop, &self.registers);
        while !handler.tick(&mut system.handler_context()) {
            system.data_memory.tick();
        }
        let Some(result) = handler.result() else {
            return;
        };

        if result.fatal {
            self.pc = self.program_length;
            self.halted = true;
            return;
        }
        self.pc = result.instruction_address;
        result.state_change.apply_registers(&mut self.registers);
        result.state_change.apply_memory(system.data_memory.as_mut());
        self.retired += 1;
        self.isa.update_retired_counter(&mut self.registers, self.retired);
        self.halted = self.pc >= self.program_length;
    }
}

impl Core for EmulationCore {
    fn tick(&mut self, system: &mut System) {
        if self.halted {
            return;
        }
        self.ticks += 1;
        self.isa
            .update_system_timer_registers(&mut self.registers, self.ticks);

        let Some((length, macro_op)) = self.fetch(system) else {
            return;
        };
        self.pc += u64::from(length);
        for uop in macro_op {
            if !self.execute(uop, system) {
                return;
            }
        }
        self.retired += 1;
        self.isa.update_retired_counter(&mut self.registers, self.retired);
        if self.pc >= self.program_length {
            self.halted = true;
        }
    }

    fn has_halted(&self) -> bool {
        self.halted
    }

    fn register_file(&self) -> &RegisterFileSet {
        &self.registers
    }

    fn instructions_retired(&self) -> u64 {
        self.retired
    }

    fn stats(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("cycles".to_owned(), self.ticks.to_string()),
            ("retired".to_owned(), self.retired.to_string()),
            ("branch.executed".to_owned(), self.branches_executed.to_string()),
        ])
    }
}
