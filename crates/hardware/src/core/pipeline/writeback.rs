//! Writeback unit.
//!
//! Commits completed micro-ops in program order: stores reach memory through the
//! LSU, results are written to the register file, and the micro-op stops being an
//! in-flight writer. A micro-op carrying an exception is handed back to the core
//! instead of committing.

use tracing::trace;

use crate::common::reg::RegisterFileSet;
use crate::core::pipeline::buffer::PipelineBuffer;
use crate::core::pipeline::reg_dep::RegDepMap;
use crate::core::units::lsu::Lsu;
use crate::isa::instruction::Instruction;
use crate::memory::MemoryInterface;

/// Core state written by the writeback unit.
#[derive(Debug)]
pub struct WritebackContext<'a> {
    /// Architectural registers.
    pub registers: &'a mut RegisterFileSet,
    /// In-flight writers.
    pub reg_dep: &'a mut RegDepMap,
    /// Store commit and reservations.
    pub lsu: &'a mut Lsu,
    /// Data memory interface.
    pub memory: &'a mut dyn MemoryInterface,
}

/// Writeback stage.
#[derive(Clone, Debug, Default)]
pub struct WritebackUnit {
    retired: u64,
}

impl WritebackUnit {
    /// Creates a writeback unit.
    pub fn new() -> Self {
        Self::default()
    }

    /// Commits the head row of `input`.
    ///
    /// # Returns
    ///
    /// The first micro-op carrying an exception, if any. Micro-ops behind it stay
    /// in the buffer and are discarded by the flush that follows.
    pub fn tick(
        &mut self,
        input: &mut PipelineBuffer<Instruction>,
        ctx: &mut WritebackContext<'_>,
    ) -> Option<Instruction> {
        for slot in input.head_slots_mut() {
            let Some(mut uop) = slot.take() else {
                continue;
            };
            if uop.exception_encountered() {
                return Some(uop);
            }

            ctx.lsu.commit(&mut uop, ctx.memory);
            for (&reg, &value) in uop.destination_registers().iter().zip(uop.results()) {
                ctx.registers.set(reg, value);
            }
            ctx.reg_dep.remove(&uop);

            if uop.is_last_micro_op() {
                self.retired += 1;
            }
            trace!(
                target: "commit",
                address = format_args!("{:#x}", uop.instruction_address()),
                op = uop.opcode().mnemonic(),
                "retired"
            );
        }
        None
    }

    /// Counts an instruction retired outside the normal path (a handled exception).
    pub fn count_retired(&mut self) {
        self.retired += 1;
    }

    /// Instructions retired.
    pub const fn retired(&self) -> u64 {
        self.retired
    }
}
