//! In-order pipelined core.
//!
//! Four units connected by pipeline buffers: fetch, decode, execute and
//! writeback. One tick proceeds as follows:
//! 1. **Writeback:** Commits the completion buffer. An excepting micro-op flushes the
//!    whole pipeline and starts its exception handler.
//! 2. **Units:** Fetch, decode and execute run against last cycle's buffer contents.
//! 3. **Buffers:** Every buffer moves its tail row to its head row unless stalled.
//! 4. **Flushes:** A mispredicted branch in execute outranks an early misprediction
//!    in decode; either redirects fetch and empties the buffers in front of the
//!    stage that raised it.
//!
//! While a handler runs, the pipeline is empty and only the handler is ticked.

use std::collections::BTreeMap;

use tracing::debug;

use crate::common::reg::RegisterFileSet;
use crate::config::Config;
use crate::core::Core;
use crate::core::pipeline::buffer::PipelineBuffer;
use crate::core::pipeline::decode::DecodeUnit;
use crate::core::pipeline::execute::{ExecuteContext, ExecuteUnit};
use crate::core::pipeline::fetch::FetchUnit;
use crate::core::pipeline::reg_dep::RegDepMap;
use crate::core::pipeline::writeback::{WritebackContext, WritebackUnit};
use crate::core::system::System;
use crate::core::units::bru::{BranchPredictor, BranchPredictorWrapper};
use crate::core::units::lsu::Lsu;
use crate::isa::exception::ExceptionHandler;
use crate::isa::instruction::Instruction;
use crate::isa::{Architecture, ArchitectureWrapper, MacroOp};
use crate::os::Process;

/// Cycle-level in-order core.
#[derive(Debug)]
pub struct InOrderCore {
    isa: ArchitectureWrapper,
    predictor: BranchPredictorWrapper,
    registers: RegisterFileSet,

    fetch: FetchUnit,
    fetch_to_decode: PipelineBuffer<MacroOp>,
    decode: DecodeUnit,
    decode_to_execute: PipelineBuffer<Instruction>,
    execute: ExecuteUnit,
    completion: PipelineBuffer<Instruction>,
    writeback: WritebackUnit,

    reg_dep: RegDepMap,
    lsu: Lsu,
    handler: Option<ExceptionHandler>,

    ticks: u64,
    flushes: u64,
    halted: bool,
}

impl InOrderCore {
    /// Creates a core at the entry point of `process`.
    ///
    /// # Arguments
    ///
    /// * `config` - Fetch, pipeline, predictor and port parameters.
    /// * `isa` - Architecture to decode and execute with.
    /// * `process` - Program whose initial register and stack state is applied.
    /// * `system` - Memory the initial stack contents are written to.
    pub fn new(
        config: &Config,
        isa: ArchitectureWrapper,
        process: &Process,
        system: &mut System,
    ) -> Self {
        let structure = isa.register_file_structure();
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
        );
        let halted = fetch.has_halted();
        Self {
            isa,
            predictor: BranchPredictorWrapper::new(&config.branch_predictor),
            registers,
            fetch,
            fetch_to_decode: PipelineBuffer::new(config.pipeline.fetch_width),
            decode: DecodeUnit::new(),
            decode_to_execute: PipelineBuffer::new(config.pipeline.decode_width),
            execute: ExecuteUnit::new(config.ports.len()),
            completion: PipelineBuffer::new(1),
            writeback: WritebackUnit::new(),
            reg_dep: RegDepMap::new(&structure),
            lsu: Lsu::new(),
            handler: None,
            ticks: 0,
            flushes: 0,
            halted,
        }
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

    /// Returns `true` if no micro-op is in flight anywhere in the pipeline.
    pub fn is_pipeline_empty(&self) -> bool {
        self.fetch.is_empty()
            && self.fetch_to_decode.is_empty()
            && self.decode.is_empty()
            && self.decode_to_execute.is_empty()
            && self.execute.is_empty()
            && self.completion.is_empty()
    }

    /// Discards every in-flight micro-op after an exception.
    fn flush_all(&mut self) {
        let predictor = &mut self.predictor;
        for uop in self.completion.drain().into_iter().rev() {
            if uop.is_branch() {
                predictor.flush(uop.instruction_address());
            }
        }
        self.execute.flush(predictor);
        for uop in self.decode_to_execute.drain().into_iter().rev() {
            if uop.is_branch() {
                predictor.flush(uop.instruction_address());
            }
        }
        self.decode.purge_flushed(predictor);
        flush_macro_ops(self.fetch_to_decode.drain(), predictor);
        self.fetch.flush(predictor);
        self.reg_dep.clear();
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
        self.writeback.count_retired();
        self.isa
            .update_retired_counter(&mut self.registers, self.writeback.retired());
    }

    fn flush_if_needed(&mut self) {
        if self.execute.should_flush() {
            let address = self.execute.flush_address();
            self.fetch.update_pc(address, &mut self.predictor);
            flush_macro_ops(self.fetch_to_decode.drain(), &mut self.predictor);
            for uop in self.decode_to_execute.drain().into_iter().rev() {
                if uop.is_branch() {
                    self.predictor.flush(uop.instruction_address());
                }
            }
            self.decode.purge_flushed(&mut self.predictor);
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

impl Core for InOrderCore {
    fn tick(&mut self, system: &mut System) {
        if self.halted {
            return;
        }
        self.ticks += 1;
        self.isa
            .update_system_timer_registers(&mut self.registers, self.ticks);

        if self.handler.is_some() {
            self.process_exception(system);
            return;
        }

        let excepting = self.writeback.tick(
            &mut self.completion,
            &mut WritebackContext {
                registers: &mut self.registers,
                reg_dep: &mut self.reg_dep,
                lsu: &mut self.lsu,
                memory: system.data_memory.as_mut(),
            },
        );
        if let Some(uop) = excepting {
            self.raise(&uop, system);
            return;
        }
        self.isa
            .update_retired_counter(&mut self.registers, self.writeback.retired());

        self.fetch.tick(
            &mut self.fetch_to_decode,
            system.instruction_memory.as_mut(),
            &mut self.isa,
            &mut self.predictor,
        );
        self.decode.tick(
            &mut self.fetch_to_decode,
            &mut self.decode_to_execute,
            &mut self.predictor,
        );
        self.execute.tick(
            &mut self.decode_to_execute,
            &mut self.completion,
            &mut ExecuteContext {
                registers: &self.registers,
                reg_dep: &mut self.reg_dep,
                lsu: &mut self.lsu,
                memory: system.data_memory.as_mut(),
                predictor: &mut self.predictor,
            },
        );

        self.fetch_to_decode.tick();
        self.decode_to_execute.tick();
        self.completion.tick();

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
        self.writeback.retired()
    }

    fn stats(&self) -> BTreeMap<String, String> {
        let retired = self.writeback.retired();
        let ipc = retired as f64 / self.ticks.max(1) as f64;
        let branches = self.execute.branches_executed();
        let missrate = if branches == 0 {
            0.0
        } else {
            self.execute.branch_mispredicts() as f64 / branches as f64 * 100.0
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
                "decode.earlyFlushes".to_owned(),
                self.decode.early_flushes().to_string(),
            ),
            ("branch.executed".to_owned(), branches.to_string()),
            (
                "branch.mispredict".to_owned(),
                self.execute.branch_mispredicts().to_string(),
            ),
            ("branch.missrate".to_owned(), format!("{missrate:.2}%")),
            (
                "issue.dependencyStalls".to_owned(),
                self.execute.dependency_stalls().to_string(),
            ),
            (
                "issue.portBusyStalls".to_owned(),
                self.execute.port_busy_stalls().to_string(),
            ),
            (
                "issue.memoryOrderStalls".to_owned(),
                self.execute.memory_order_stalls().to_string(),
            ),
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
