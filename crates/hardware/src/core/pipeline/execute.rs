//! Execute unit of the in-order pipeline.
//!
//! The unit issues at most one micro-op per cycle from the head of its input buffer
//! and completes micro-ops strictly in program order. It performs:
//! 1. **Issue:** Source operands come from the register file or are forwarded by
//!    the [`RegDepMap`]; a pending writer, a busy port, or (for loads) an
//!    uncommitted older store stalls the input buffer.
//! 2. **Memory:** Loads and stores generate their addresses at issue; load reads are
//!    requested with the micro-op's sequence id and polled until their data arrives.
//! 3. **Completion:** A micro-op executes once its latency has elapsed and its data
//!    is present, then moves to the completion buffer.
//! 4. **Branches:** Resolved branches train the predictor; a misprediction raises a
//!    flush and discards every younger micro-op still in flight.

use std::collections::VecDeque;

use tracing::debug;

use crate::common::reg::RegisterFileSet;
use crate::core::pipeline::buffer::PipelineBuffer;
use crate::core::pipeline::reg_dep::{Dependency, RegDepMap};
use crate::core::units::bru::BranchPredictor;
use crate::core::units::lsu::Lsu;
use crate::isa::instruction::Instruction;
use crate::memory::MemoryInterface;

/// Core state the execute unit reads and updates.
#[derive(Debug)]
pub struct ExecuteContext<'a, P> {
    /// Architectural registers (read only; writeback owns updates).
    pub registers: &'a RegisterFileSet,
    /// In-flight writers and forwarded results.
    pub reg_dep: &'a mut RegDepMap,
    /// Store tracking for load ordering.
    pub lsu: &'a mut Lsu,
    /// Data memory interface.
    pub memory: &'a mut dyn MemoryInterface,
    /// Branch predictor.
    pub predictor: &'a mut P,
}

#[derive(Clone, Debug)]
struct InFlight {
    uop: Instruction,
    remaining: u16,
}

/// Execute stage.
#[derive(Clone, Debug)]
pub struct ExecuteUnit {
    in_flight: VecDeque<InFlight>,
    port_busy: Vec<u16>,

    should_flush: bool,
    flush_address: u64,
    flush_sequence_id: u64,

    branches_executed: u64,
    branch_mispredicts: u64,
    dependency_stalls: u64,
    port_busy_stalls: u64,
    memory_order_stalls: u64,
}

impl ExecuteUnit {
    /// Creates a unit with `ports` execution ports.
    pub fn new(ports: usize) -> Self {
        Self {
            in_flight: VecDeque::new(),
            port_busy: vec![0; ports],
            should_flush: false,
            flush_address: 0,
            flush_sequence_id: 0,
            branches_executed: 0,
            branch_mispredicts: 0,
            dependency_stalls: 0,
            port_busy_stalls: 0,
            memory_order_stalls: 0,
        }
    }

    /// Runs one execute cycle.
    ///
    /// # Arguments
    ///
    /// * `input` - Decode-to-execute buffer; stalled while its head cannot issue.
    /// * `output` - Completion buffer read by writeback.
    /// * `ctx` - Registers, dependency map, LSU, data memory and predictor.
    pub fn tick<P: BranchPredictor>(
        &mut self,
        input: &mut PipelineBuffer<Instruction>,
        output: &mut PipelineBuffer<Instruction>,
        ctx: &mut ExecuteContext<'_, P>,
    ) {
        self.should_flush = false;
        for busy in &mut self.port_busy {
            *busy = busy.saturating_sub(1);
        }
        self.collect_load_data(ctx.memory);
        for entry in &mut self.in_flight {
            entry.remaining = entry.remaining.saturating_sub(1);
        }

        self.complete(output, ctx);
        if self.should_flush {
            return;
        }
        self.issue(input, ctx);
    }

    fn collect_load_data(&mut self, memory: &mut dyn MemoryInterface) {
        for read in memory.completed_reads() {
            if let Some(entry) = self
                .in_flight
                .iter_mut()
                .find(|e| e.uop.sequence_id() == read.request_id && e.uop.is_load())
            {
                entry.uop.supply_data(read.target.address, read.value());
            }
        }
        memory.clear_completed_reads();
    }

    fn complete<P: BranchPredictor>(
        &mut self,
        output: &mut PipelineBuffer<Instruction>,
        ctx: &mut ExecuteContext<'_, P>,
    ) {
        for slot in output.tail_slots_mut() {
            if slot.is_some() {
                continue;
            }
            let ready = self.in_flight.front().is_some_and(|e| {
                e.remaining == 0 && (e.uop.data_pending() == 0 || e.uop.exception_encountered())
            });
            if !ready {
                break;
            }
            let Some(InFlight { mut uop, .. }) = self.in_flight.pop_front() else {
                break;
            };

            if !uop.exception_encountered() {
                uop.execute();
            }
            if !uop.exception_encountered() {
                // Store-conditional results are only known at commit.
                if !uop.is_store_conditional() {
                    ctx.reg_dep.forward(&uop);
                }
                if uop.is_branch() {
                    self.resolve_branch(&uop, ctx.predictor);
                }
            }
            *slot = Some(uop);

            if self.should_flush {
                self.discard_in_flight(ctx);
                break;
            }
        }
    }

    fn resolve_branch(&mut self, uop: &Instruction, predictor: &mut impl BranchPredictor) {
        self.branches_executed += 1;
        predictor.update(
            uop.instruction_address(),
            uop.was_branch_taken(),
            uop.branch_address(),
            uop.branch_type(),
            uop.instruction_id(),
        );
        if uop.was_branch_mispredicted() {
            self.branch_mispredicts += 1;
            self.should_flush = true;
            self.flush_address = uop.branch_address();
            self.flush_sequence_id = uop.sequence_id();
            debug!(
                address = format_args!("{:#x}", uop.instruction_address()),
                target = format_args!("{:#x}", uop.branch_address()),
                "branch mispredicted"
            );
        }
    }

    /// Discards every in-flight micro-op; all are younger than the flushing branch.
    fn discard_in_flight<P: BranchPredictor>(&mut self, ctx: &mut ExecuteContext<'_, P>) {
        for entry in self.in_flight.drain(..).rev() {
            if entry.uop.is_branch() {
                ctx.predictor.flush(entry.uop.instruction_address());
            }
        }
        ctx.reg_dep.flush_younger(self.flush_sequence_id);
        ctx.lsu.flush_younger(self.flush_sequence_id);
    }

    fn issue<P: BranchPredictor>(
        &mut self,
        input: &mut PipelineBuffer<Instruction>,
        ctx: &mut ExecuteContext<'_, P>,
    ) {
        let slots = input.head_slots_mut();
        if let Some(slot) = slots.iter_mut().find(|slot| slot.is_some()) {
            let port = slot.as_mut().and_then(|uop| self.ready_port(uop, ctx));
            if let Some(port) = port {
                if let Some(uop) = slot.take() {
                    self.dispatch(uop, port, ctx);
                }
            }
        }
        let waiting = input.head_slots().iter().any(Option::is_some);
        input.stall(waiting);
    }

    /// Checks whether `uop` can issue this cycle, supplying any available operands.
    ///
    /// # Returns
    ///
    /// `None` if it must wait, otherwise the port it issues to (`Some(None)` for a
    /// micro-op that carries an exception and occupies no port).
    fn ready_port<P>(
        &mut self,
        uop: &mut Instruction,
        ctx: &mut ExecuteContext<'_, P>,
    ) -> Option<Option<usize>> {
        // An empty port list raises NoAvailablePort inside `supported_ports`.
        if uop.exception_encountered() || uop.supported_ports().is_empty() {
            return Some(None);
        }
        let Some(port) = uop
            .execution_info()
            .ports
            .iter()
            .map(|&p| usize::from(p))
            .find(|&p| self.port_busy.get(p).is_none_or(|&busy| busy == 0))
        else {
            self.port_busy_stalls += 1;
            return None;
        };

        let sources = uop.source_registers().to_vec();
        for (i, reg) in sources.into_iter().enumerate() {
            if uop.is_operand_ready(i) {
                continue;
            }
            match ctx.reg_dep.lookup(reg) {
                Dependency::Clear => uop.supply_operand(i, ctx.registers.get(reg)),
                Dependency::Forwarded(value) => uop.supply_operand(i, value),
                Dependency::Pending => {
                    self.dependency_stalls += 1;
                    return None;
                }
            }
        }

        if uop.is_load() && ctx.lsu.has_uncommitted_stores() {
            self.memory_order_stalls += 1;
            return None;
        }
        Some(Some(port))
    }

    fn dispatch<P>(&mut self, mut uop: Instruction, port: Option<usize>, ctx: &mut ExecuteContext<'_, P>) {
        ctx.reg_dep.insert(&uop);
        ctx.lsu.track_store(&uop);

        if !uop.exception_encountered() && (uop.is_load() || uop.is_store_address()) {
            let targets = uop.generate_addresses().to_vec();
            if uop.is_load() && !uop.exception_encountered() {
                for target in targets {
                    ctx.memory.request_read(target, uop.sequence_id());
                }
            }
        }

        if let Some(busy) = port.and_then(|p| self.port_busy.get_mut(p)) {
            *busy = uop.stall_cycles();
        }
        self.in_flight.push_back(InFlight {
            remaining: uop.latency(),
            uop,
        });
    }

    /// Discards everything in flight after an exception.
    pub fn flush(&mut self, predictor: &mut impl BranchPredictor) {
        for entry in self.in_flight.drain(..).rev() {
            if entry.uop.is_branch() {
                predictor.flush(entry.uop.instruction_address());
            }
        }
        self.should_flush = false;
    }

    /// Returns `true` if the last cycle resolved a mispredicted branch.
    pub const fn should_flush(&self) -> bool {
        self.should_flush
    }

    /// Address fetch must resume at after a misprediction.
    pub const fn flush_address(&self) -> u64 {
        self.flush_address
    }

    /// Returns `true` if nothing is in flight.
    pub fn is_empty(&self) -> bool {
        self.in_flight.is_empty()
    }

    /// Branches resolved.
    pub const fn branches_executed(&self) -> u64 {
        self.branches_executed
    }

    /// Branches resolved against their prediction.
    pub const fn branch_mispredicts(&self) -> u64 {
        self.branch_mispredicts
    }

    /// Cycles the head waited for an operand.
    pub const fn dependency_stalls(&self) -> u64 {
        self.dependency_stalls
    }

    /// Cycles the head waited for a free port.
    pub const fn port_busy_stalls(&self) -> u64 {
        self.port_busy_stalls
    }

    /// Cycles a load waited for older stores to commit.
    pub const fn memory_order_stalls(&self) -> u64 {
        self.memory_order_stalls
    }
}
