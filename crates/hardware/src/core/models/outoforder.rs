//! Out-of-order core.
//!
//! Shares the in-order core's front end (fetch with its loop buffer, and decode)
//! and replaces its back end with renaming, reservation stations, one execution
//! unit per port, a load/store queue and a reorder buffer. One tick proceeds as
//! follows:
//! 1. **Writeback:** Completed micro-ops write their physical registers and are
//!    marked written back in the reorder buffer.
//! 2. **Front end:** Fetch, decode, rename and dispatch run against last cycle's
//!    buffer contents.
//! 3. **Execution:** Every execution unit, then the load/store queue, runs; the
//!    dispatch unit issues ready micro-ops to free ports.
//! 4. **Buffers:** Every buffer moves its tail row to its head row unless stalled.
//! 5. **Commit:** The reorder buffer retires from its head. An excepting head
//!    flushes everything and starts its exception handler.
//! 6. **Flushes:** The oldest mispredicted branch resolved this cycle outranks an
//!    early misprediction in decode; either redirects fetch and discards younger
//!    work.
//!
//! Results live in a physical register file. The architectural file is written at
//! commit and is what exception handlers and the simulator see.

use std::collections::BTreeMap;

use tracing::debug;

use crate::common::error::{Result, SimError};
use crate::common::reg::{Register, RegisterFileSet, RegisterFileStructure, RegisterType};
use crate::config::Config;
use crate::core::Core;
use crate::core::pipeline::buffer::PipelineBuffer;
use crate::core::pipeline::decode::DecodeUnit;
use crate::core::pipeline::dispatch::DispatchIssueUnit;
use crate::core::pipeline::execution_unit::{ExecutionContext, ExecutionUnit};
use crate::core::pipeline::fetch::FetchUnit;
use crate::core::pipeline::lsq::{LoadStoreQueue, LsqContext};
use crate::core::pipeline::rat::RegisterAliasTable;
use crate::core::pipeline::rename::{RenameContext, RenameUnit};
use crate::core::pipeline::rob::{CommitContext, ReorderBuffer};
use crate::core::system::System;
use crate::core::units::bru::{BranchPredictor, BranchPredictorWrapper};
use crate::core::units::lsu::Lsu;
use crate::isa::exception::ExceptionHandler;
use crate::isa::instruction::Instruction;
use crate::isa::{Architecture, ArchitectureWrapper, MacroOp};
use crate::os::Process;

const REGISTER_TYPES: [RegisterType; RegisterType::COUNT] = [
    RegisterType::General,
    RegisterType::Float,
    RegisterType::Flags,
    RegisterType::System,
];

/// Cycle-level out-of-order core.
#[derive(Debug)]
pub struct OutOfOrderCore {
    isa: ArchitectureWrapper,
    predictor: BranchPredictorWrapper,
    /// Committed state.
    registers: RegisterFileSet,
    /// Renamed state.
    physical: RegisterFileSet,
    rat: RegisterAliasTable,

    fetch: FetchUnit,
    fetch_to_decode: PipelineBuffer<MacroOp>,
    decode: DecodeUnit,
    decode_to_rename: PipelineBuffer<Instruction>,
    rename: RenameUnit,
    rename_to_dispatch: PipelineBuffer<Instruction>,
    dispatch: DispatchIssueUnit,
    issue_ports: Vec<PipelineBuffer<Instruction>>,
    units: Vec<ExecutionUnit>,
    completion: Vec<PipelineBuffer<Instruction>>,
    lsq: LoadStoreQueue,
    lsq_completion: PipelineBuffer<Instruction>,
    rob: ReorderBuffer,
    commit_width: usize,

    lsu: Lsu,
    handler: Option<ExceptionHandler>,

    ticks: u64,
    flushes: u64,
    halted: bool,
}

impl OutOfOrderCore {
    /// Creates a core at the entry point of `process`.
    ///
    /// # Arguments
    ///
    /// * `config` - Front end, predictor, port and out-of-order resource parameters.
    /// * `isa` - Architecture to decode and execute with.
    /// * `process` - Program whose initial register and stack state is applied.
    /// * `system` - Memory the initial stack contents are written to.
    ///
    /// # Errors
    ///
    /// [`SimError::Config`] if a physical register bank is not larger than the
    /// architectural bank it renames.
    pub fn new(
        config: &Config,
        isa: ArchitectureWrapper,
        process: &Process,
        system: &mut System,
    ) -> Result<Self> {
        let ooo = &config.out_of_order;
        let structure = isa.register_file_structure();
        let quantities = ooo.physical_registers.quantities();
        for (kind, (bank, &physical)) in REGISTER_TYPES.iter().zip(structure.iter().zip(&quantities)) {
            if bank.quantity > 0 && physical <= bank.quantity {
                return Err(SimError::Config(format!(
                    "{kind:?} physical registers ({physical}) must exceed the {} architectural ones",
                    bank.quantity
                )));
            }
        }
        let physical_structure: Vec<RegisterFileStructure> = structure
            .iter()
            .zip(quantities)
            .map(|(bank, quantity)| RegisterFileStructure {
                bytes: bank.bytes,
                quantity,
            })
            .collect();

        let mut registers = RegisterFileSet::new(&structure);
        let initial = isa.initial_state(process);
        initial.apply_registers(&mut registers);
        initial.apply_memory(system.data_memory.as_mut());

        let fetch = FetchUnit::new(
            process.entry(),
            process.program_byte_length(),
            config.fetch.block_size,
            config.fetch.block_cache_entries,
            config.pipeline.fetch_width,
        )
        .with_loop_buffer(config.fetch.loop_buffer_size);
        let halted = fetch.has_halted();
        let ports = config.ports.len();

        let mut core = Self {
            isa,
            predictor: BranchPredictorWrapper::new(&config.branch_predictor),
            physical: RegisterFileSet::new(&physical_structure),
            rat: RegisterAliasTable::new(&structure, &quantities),
            registers,
            fetch,
            fetch_to_decode: PipelineBuffer::new(config.pipeline.fetch_width),
            decode: DecodeUnit::new(),
            decode_to_rename: PipelineBuffer::new(config.pipeline.decode_width),
            rename: RenameUnit::new(),
            rename_to_dispatch: PipelineBuffer::new(config.pipeline.decode_width),
            dispatch: DispatchIssueUnit::new(ooo, ports, &physical_structure),
            issue_ports: (0..ports).map(|_| PipelineBuffer::new(1)).collect(),
            units: vec![ExecutionUnit::new(); ports],
            completion: (0..ports).map(|_| PipelineBuffer::new(1)).collect(),
            lsq: LoadStoreQueue::new(
                ooo.load_queue_size,
                ooo.store_queue_size,
                ooo.lsq_completion_width,
            ),
            lsq_completion: PipelineBuffer::new(ooo.lsq_completion_width),
            rob: ReorderBuffer::new(
                ooo.rob_size,
                config.fetch.loop_buffer_size,
                config.fetch.loop_detection_threshold,
            ),
            commit_width: ooo.commit_width,
            lsu: Lsu::new(),
            handler: None,
            ticks: 0,
            flushes: 0,
            halted,
        };
        core.sync_physical();
        Ok(core)
    }

    /// Address fetch will read next.
    pub const fn fetch_pc(&self) -> u64 {
        self.fetch.pc()
    }

    /// The fetch unit.
    pub const fn fetch(&self) -> &FetchUnit {
        &self.fetch
    }

    /// Returns `true` while an exception handler is running.
    pub const fn is_handling_exception(&self) -> bool {
        self.handler.is_some()
    }

    /// Returns `true` if no micro-op is in flight anywhere in the core.
    pub fn is_pipeline_empty(&self) -> bool {
        self.fetch.is_empty()
            && self.fetch_to_decode.is_empty()
            && self.decode.is_empty()
            && self.decode_to_rename.is_empty()
            && self.rename_to_dispatch.is_empty()
            && self.dispatch.is_empty()
            && self.issue_ports.iter().all(PipelineBuffer::is_empty)
            && self.units.iter().all(ExecutionUnit::is_empty)
            && self.completion.iter().all(PipelineBuffer::is_empty)
            && self.lsq.is_empty()
            && self.lsq_completion.is_empty()
            && self.rob.is_empty()
    }

    /// Copies every architectural register to the physical register it maps to.
    fn sync_physical(&mut self) {
        for kind in REGISTER_TYPES {
            for tag in 0..self.registers.bank_len(kind) {
                let reg = Register {
                    kind,
                    tag: tag as u16,
                };
                self.physical.set(self.rat.map(reg), self.registers.get(reg));
            }
        }
    }

    /// Mirrors system registers the ISA updated outside the pipeline, unless a
    /// renamed writer is in flight.
    fn refresh_system_registers(&mut self) {
        for tag in 0..self.registers.bank_len(RegisterType::System) {
            let reg = Register::system(tag as u16);
            if self.rat.is_committed(reg) {
                self.physical.set(self.rat.map(reg), self.registers.get(reg));
            }
        }
    }

    /// Moves completed micro-ops into the reorder buffer.
    fn writeback(&mut self) {
        let buffers = self.completion.iter_mut().chain(std::iter::once(&mut self.lsq_completion));
        for buffer in buffers {
            for slot in buffer.head_slots_mut() {
                let Some(uop) = slot.take() else {
                    continue;
                };
                if !uop.exception_encountered() && !uop.is_store_conditional() {
                    for (&reg, &value) in uop.destination_registers().iter().zip(uop.results()) {
                        self.physical.set(reg, value);
                    }
                }
                let _ = self.rob.writeback(uop);
            }
        }
    }

    fn commit(&mut self, system: &mut System) -> Option<Instruction> {
        let outcome = self.rob.commit(
            self.commit_width,
            &mut CommitContext {
                rat: &mut self.rat,
                registers: &mut self.registers,
                lsu: &mut self.lsu,
                lsq: &mut self.lsq,
                memory: system.data_memory.as_mut(),
            },
        );
        for uop in &outcome.conditional_stores {
            for (&reg, &value) in uop.destination_registers().iter().zip(uop.results()) {
                self.physical.set(reg, value);
            }
            self.dispatch.forward_operands(uop);
        }
        if let Some(boundary) = outcome.loop_boundary {
            self.fetch.register_loop_boundary(boundary);
        }
        if outcome.committed > 0 {
            self.isa
                .update_retired_counter(&mut self.registers, self.rob.retired());
            self.refresh_system_registers();
        }
        outcome.exception
    }

    /// Discards every in-flight micro-op after an exception.
    fn flush_all(&mut self) {
        let predictor = &mut self.predictor;
        self.rob.flush_all(&mut self.rat, predictor);
        for buffer in self
            .completion
            .iter_mut()
            .chain(self.issue_ports.iter_mut())
            .chain([&mut self.lsq_completion, &mut self.rename_to_dispatch, &mut self.decode_to_rename])
        {
            let _ = buffer.drain();
        }
        for unit in &mut self.units {
            unit.flush(predictor);
        }
        self.dispatch.flush();
        self.lsq.flush();
        self.decode.purge_flushed(predictor);
        flush_macro_ops(self.fetch_to_decode.drain(), predictor);
        self.fetch.flush(predictor);
        self.lsu.flush();
    }

    fn raise(&mut self, uop: &Instruction, system: &mut System) {
        debug!(
            address = format_args!("{:#x}", uop.instruction_address()),
            exception = ?uop.exception(),
            "exception raised"
        );
        self.flush_all();
        self.handler = Some(self.isa.handle_exception(uop, &self.registers));
        self.process_exception(system);
    }

    fn process_exception(&mut self, system: &mut System) {
        let Some(handler) = &mut self.handler else {
            return;
        };
        if !handler.tick(&mut system.handler_context()) {
            return;
        }
        let Some(result) = handler.result().cloned() else {
            return;
        };
        self.handler = None;

        if result.fatal {
            self.halted = true;
            return;
        }
        self.fetch
            .update_pc(result.instruction_address, &mut self.predictor);
        result.state_change.apply_registers(&mut self.registers);
        result.state_change.apply_memory(system.data_memory.as_mut());
        self.rob.count_retired();
        self.isa
            .update_retired_counter(&mut self.registers, self.rob.retired());
        self.sync_physical();
    }

    fn flush_if_needed(&mut self) {
        let request = self
            .units
            .iter()
            .filter_map(ExecutionUnit::flush_request)
            .min_by_key(|r| r.instruction_id);
        if let Some(request) = request {
            let after = request.instruction_id;
            let predictor = &mut self.predictor;
            self.fetch.update_pc(request.address, predictor);
            flush_macro_ops(self.fetch_to_decode.drain(), predictor);
            self.decode.purge_flushed(predictor);
            for uop in self.decode_to_rename.drain().into_iter().rev() {
                if uop.is_branch() {
                    predictor.flush(uop.instruction_address());
                }
            }
            for buffer in self
                .completion
                .iter_mut()
                .chain(self.issue_ports.iter_mut())
                .chain([&mut self.lsq_completion, &mut self.rename_to_dispatch])
            {
                buffer.retain(|uop| uop.instruction_id() <= after);
            }
            self.rob.flush(after, &mut self.rat, predictor);
            self.dispatch.purge_flushed(after);
            self.lsq.purge_flushed(after);
            for unit in &mut self.units {
                unit.purge_flushed(after, predictor);
            }
        } else if self.decode.should_flush() {
            let address = self.decode.flush_address();
            self.fetch.update_pc(address, &mut self.predictor);
            flush_macro_ops(self.fetch_to_decode.drain(), &mut self.predictor);
        } else {
            return;
        }
        self.flushes += 1;
        debug!(
            pc = format_args!("{:#x}", self.fetch.pc()),
            flushes = self.flushes,
            "pipeline flushed"
        );
    }
}

/// Flushes the branches of discarded macro-ops from the predictor, youngest first.
fn flush_macro_ops(macro_ops: Vec<MacroOp>, predictor: &mut impl BranchPredictor) {
    for uop in macro_ops.iter().rev().flat_map(|m| m.iter().rev()) {
        if uop.is_branch() {
            predictor.flush(uop.instruction_address());
        }
    }
}

impl Core for OutOfOrderCore {
    fn tick(&mut self, system: &mut System) {
        if self.halted {
            return;
        }
        self.ticks += 1;
        self.isa
            .update_system_timer_registers(&mut self.registers, self.ticks);
        self.refresh_system_registers();

        if self.handler.is_some() {
            self.process_exception(system);
            return;
        }

        self.writeback();

        self.fetch.tick(
            &mut self.fetch_to_decode,
            system.instruction_memory.as_mut(),
            &mut self.isa,
            &mut self.predictor,
        );
        self.decode.tick(
            &mut self.fetch_to_decode,
            &mut self.decode_to_rename,
            &mut self.predictor,
        );
        self.rename.tick(
            &mut self.decode_to_rename,
            &mut self.rename_to_dispatch,
            &mut RenameContext {
                rat: &mut self.rat,
                rob: &mut self.rob,
                lsq: &mut self.lsq,
            },
        );
        self.dispatch
            .tick(&mut self.rename_to_dispatch, &self.physical, &mut self.rob);

        for ((unit, input), output) in self
            .units
            .iter_mut()
            .zip(&mut self.issue_ports)
            .zip(&mut self.completion)
        {
            unit.tick(
                input,
                output,
                &mut ExecutionContext {
                    dispatch: &mut self.dispatch,
                    lsq: &mut self.lsq,
                    predictor: &mut self.predictor,
                },
            );
        }
        self.lsq.tick(
            &mut self.lsq_completion,
            &mut LsqContext {
                memory: system.data_memory.as_mut(),
                dispatch: &mut self.dispatch,
                rob_head: self.rob.head_sequence_id(),
            },
        );
        self.dispatch.issue(&mut self.issue_ports);

        self.fetch_to_decode.tick();
        self.decode_to_rename.tick();
        self.rename_to_dispatch.tick();
        for buffer in self
            .issue_ports
            .iter_mut()
            .chain(self.completion.iter_mut())
            .chain(std::iter::once(&mut self.lsq_completion))
        {
            buffer.tick();
        }

        if let Some(uop) = self.commit(system) {
            self.raise(&uop, system);
            return;
        }

        self.flush_if_needed();

        if self.fetch.has_halted() && self.is_pipeline_empty() {
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
        self.rob.retired()
    }

    fn stats(&self) -> BTreeMap<String, String> {
        let retired = self.rob.retired();
        let ipc = retired as f64 / self.ticks.max(1) as f64;
        let branches: u64 = self.units.iter().map(ExecutionUnit::branches_executed).sum();
        let mispredicts: u64 = self.units.iter().map(ExecutionUnit::branch_mispredicts).sum();
        let missrate = if branches == 0 {
            0.0
        } else {
            mispredicts as f64 / branches as f64 * 100.0
        };
        BTreeMap::from([
            ("cycles".to_owned(), self.ticks.to_string()),
            ("retired".to_owned(), retired.to_string()),
            ("ipc".to_owned(), format!("{ipc:.2}")),
            ("flushes".to_owned(), self.flushes.to_string()),
            (
                "fetch.branchStalls".to_owned(),
                self.fetch.branch_stalls().to_string(),
            ),
            (
                "fetch.blockRequests".to_owned(),
                self.fetch.block_requests().to_string(),
            ),
            (
                "fetch.loopSupplied".to_owned(),
                self.fetch.loop_supplied().to_string(),
            ),
            (
                "decode.earlyFlushes".to_owned(),
                self.decode.early_flushes().to_string(),
            ),
            (
                "rename.robStalls".to_owned(),
                self.rename.rob_stalls().to_string(),
            ),
            (
                "rename.loadQueueStalls".to_owned(),
                self.rename.load_queue_stalls().to_string(),
            ),
            (
                "rename.storeQueueStalls".to_owned(),
                self.rename.store_queue_stalls().to_string(),
            ),
            (
                "rename.allocationStalls".to_owned(),
                self.rename.allocation_stalls().to_string(),
            ),
            (
                "dispatch.stationFullStalls".to_owned(),
                self.dispatch.station_full_stalls().to_string(),
            ),
            (
                "dispatch.frontendStalls".to_owned(),
                self.dispatch.frontend_stalls().to_string(),
            ),
            (
                "issue.portBusyStalls".to_owned(),
                self.dispatch.port_busy_stalls().to_string(),
            ),
            (
                "lsq.orderStalls".to_owned(),
                self.lsq.order_stalls().to_string(),
            ),
            ("rob.committed".to_owned(), self.rob.committed().to_string()),
            ("rob.flushed".to_owned(), self.rob.flushed().to_string()),
            ("branch.executed".to_owned(), branches.to_string()),
            ("branch.mispredict".to_owned(), mispredicts.to_string()),
            ("branch.missrate".to_owned(), format!("{missrate:.2}%")),
            (
                "lsu.loadsCommitted".to_owned(),
                self.lsu.loads_committed().to_string(),
            ),
            (
                "lsu.storesCommitted".to_owned(),
                self.lsu.stores_committed().to_string(),
            ),
            (
                "lsu.conditionalFailures".to_owned(),
                self.lsu.conditional_failures().to_string(),
            ),
        ])
    }
}
