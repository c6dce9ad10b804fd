//! Rename unit of the out-of-order pipeline.
//!
//! Takes decoded micro-ops in program order, maps their source registers to the
//! physical registers holding the youngest values and gives each destination a
//! fresh physical register. Renamed micro-ops are reserved in the reorder buffer
//! and the load/store queue before moving on to dispatch.
//!
//! Rename stalls, keeping the rest of its input for the next cycle, when the
//! reorder buffer, the needed queue, or a needed register bank is full. A
//! micro-op that already carries an exception is placed in the reorder buffer
//! ready to commit and goes no further.

use crate::common::reg::RegisterType;
use crate::core::pipeline::buffer::PipelineBuffer;
use crate::core::pipeline::lsq::LoadStoreQueue;
use crate::core::pipeline::rat::RegisterAliasTable;
use crate::core::pipeline::rob::ReorderBuffer;
use crate::isa::instruction::Instruction;

/// Structures rename allocates from.
#[derive(Debug)]
pub struct RenameContext<'a> {
    /// Register alias table.
    pub rat: &'a mut RegisterAliasTable,
    /// Reorder buffer.
    pub rob: &'a mut ReorderBuffer,
    /// Load/store queue.
    pub lsq: &'a mut LoadStoreQueue,
}

/// Why a micro-op could not be renamed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Blocked {
    Rob,
    LoadQueue,
    StoreQueue,
    Registers,
}

/// Rename stage.
#[derive(Clone, Debug, Default)]
pub struct RenameUnit {
    rob_stalls: u64,
    load_queue_stalls: u64,
    store_queue_stalls: u64,
    allocation_stalls: u64,
}

impl RenameUnit {
    /// Creates a rename unit.
    pub fn new() -> Self {
        Self::default()
    }

    /// Renames the head row of `input` into `output`.
    pub fn tick(
        &mut self,
        input: &mut PipelineBuffer<Instruction>,
        output: &mut PipelineBuffer<Instruction>,
        ctx: &mut RenameContext<'_>,
    ) {
        if output.is_stalled() {
            input.stall(true);
            return;
        }

        let mut free = output.tail_slots_mut().iter_mut().filter(|s| s.is_none());
        for slot in input.head_slots_mut() {
            let Some(uop) = slot.as_ref() else {
                continue;
            };
            if let Some(blocked) = Self::check(uop, ctx) {
                self.count(blocked);
                break;
            }
            let Some(mut uop) = slot.take() else {
                continue;
            };
            if uop.exception_encountered() {
                uop.set_commit_ready();
                ctx.rob.reserve(uop);
                continue;
            }
            let Some(out) = free.next() else {
                *slot = Some(uop);
                break;
            };

            let sources = uop.source_registers().to_vec();
            for (i, reg) in sources.into_iter().enumerate() {
                if !uop.is_operand_ready(i) {
                    uop.rename_source(i, ctx.rat.map(reg));
                }
            }
            let destinations = uop.destination_registers().to_vec();
            for (i, reg) in destinations.into_iter().enumerate() {
                if let Some(physical) = ctx.rat.allocate(reg) {
                    uop.rename_destination(i, physical);
                }
            }
            ctx.rob.reserve(uop.clone());
            ctx.lsq.reserve(&uop);
            *out = Some(uop);
        }

        let waiting = input.head_slots().iter().any(Option::is_some);
        input.stall(waiting);
    }

    /// Finds the first structure too full to take `uop`.
    fn check(uop: &Instruction, ctx: &RenameContext<'_>) -> Option<Blocked> {
        if ctx.rob.free_space() == 0 {
            return Some(Blocked::Rob);
        }
        if uop.exception_encountered() {
            return None;
        }
        if uop.is_load() && ctx.lsq.load_space() == 0 {
            return Some(Blocked::LoadQueue);
        }
        if uop.is_store_address() && ctx.lsq.store_space() == 0 {
            return Some(Blocked::StoreQueue);
        }
        let mut needed = [0usize; RegisterType::COUNT];
        for reg in uop.destination_registers() {
            needed[reg.kind.index()] += 1;
        }
        let short = [
            RegisterType::General,
            RegisterType::Float,
            RegisterType::Flags,
            RegisterType::System,
        ]
        .into_iter()
        .any(|kind| ctx.rat.free_registers(kind) < needed[kind.index()]);
        short.then_some(Blocked::Registers)
    }

    fn count(&mut self, blocked: Blocked) {
        let counter = match blocked {
            Blocked::Rob => &mut self.rob_stalls,
            Blocked::LoadQueue => &mut self.load_queue_stalls,
            Blocked::StoreQueue => &mut self.store_queue_stalls,
            Blocked::Registers => &mut self.allocation_stalls,
        };
        *counter += 1;
    }

    /// Cycles stalled on a full reorder buffer.
    pub const fn rob_stalls(&self) -> u64 {
        self.rob_stalls
    }

    /// Cycles stalled on a full load queue.
    pub const fn load_queue_stalls(&self) -> u64 {
        self.load_queue_stalls
    }

    /// Cycles stalled on a full store queue.
    pub const fn store_queue_stalls(&self) -> u64 {
        self.store_queue_stalls
    }

    /// Cycles stalled waiting for free physical registers.
    pub const fn allocation_stalls(&self) -> u64 {
        self.allocation_stalls
    }
}
