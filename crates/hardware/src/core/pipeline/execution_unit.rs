//! Execution unit of one out-of-order issue port.
//!
//! Micro-ops issued to the port move through a latency pipeline and leave it in
//! issue order, one per cycle:
//! - loads generate their addresses and move to the load/store queue,
//! - stores generate their addresses, hand them to the load/store queue and
//!   compute their data,
//! - everything else executes and forwards its results to the dispatch unit.
//!
//! A micro-op that blocks the port (a divide) keeps the input buffer stalled for
//! its stall cycles. A resolved branch trains the predictor; a misprediction
//! raises a flush request naming the branch.

use std::collections::VecDeque;

use tracing::debug;

use crate::core::pipeline::buffer::PipelineBuffer;
use crate::core::pipeline::dispatch::DispatchIssueUnit;
use crate::core::pipeline::lsq::LoadStoreQueue;
use crate::core::units::bru::BranchPredictor;
use crate::isa::instruction::Instruction;

/// Core state an execution unit updates.
#[derive(Debug)]
pub struct ExecutionContext<'a, P> {
    /// Receives forwarded results.
    pub dispatch: &'a mut DispatchIssueUnit,
    /// Receives loads and store addresses.
    pub lsq: &'a mut LoadStoreQueue,
    /// Branch predictor.
    pub predictor: &'a mut P,
}

/// A mispredicted branch and where fetch must resume.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FlushRequest {
    /// Instruction id of the branch; younger instructions are discarded.
    pub instruction_id: u64,
    /// Correct next address.
    pub address: u64,
}

#[derive(Clone, Debug)]
struct InFlight {
    uop: Instruction,
    remaining: u16,
}

/// Latency pipeline behind one issue port.
#[derive(Clone, Debug, Default)]
pub struct ExecutionUnit {
    pipeline: VecDeque<InFlight>,
    blocked: u16,
    flush: Option<FlushRequest>,

    executed: u64,
    branches_executed: u64,
    branch_mispredicts: u64,
}

impl ExecutionUnit {
    /// Creates an idle unit.
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs one cycle.
    ///
    /// # Arguments
    ///
    /// * `input` - The port's issue buffer.
    /// * `output` - Completion buffer read by writeback.
    /// * `ctx` - Dispatch unit, load/store queue and predictor.
    pub fn tick<P: BranchPredictor>(
        &mut self,
        input: &mut PipelineBuffer<Instruction>,
        output: &mut PipelineBuffer<Instruction>,
        ctx: &mut ExecutionContext<'_, P>,
    ) {
        self.flush = None;
        self.blocked = self.blocked.saturating_sub(1);
        for entry in &mut self.pipeline {
            entry.remaining = entry.remaining.saturating_sub(1);
        }

        if self.pipeline.front().is_some_and(|e| e.remaining == 0) {
            if let Some(slot) = output.tail_slots_mut().first_mut().filter(|s| s.is_none()) {
                if let Some(InFlight { uop, .. }) = self.pipeline.pop_front() {
                    *slot = self.complete(uop, ctx);
                }
            }
        }

        if self.blocked > 0 {
            input.stall(true);
            return;
        }
        input.stall(false);
        if let Some(uop) = input.head_slots_mut().first_mut().and_then(Option::take) {
            self.blocked = uop.stall_cycles();
            self.pipeline.push_back(InFlight {
                remaining: uop.latency(),
                uop,
            });
        }
    }

    /// Finishes `uop`, returning it if it goes straight to writeback.
    fn complete<P: BranchPredictor>(
        &mut self,
        mut uop: Instruction,
        ctx: &mut ExecutionContext<'_, P>,
    ) -> Option<Instruction> {
        self.executed += 1;
        if uop.is_load() || uop.is_store_address() {
            let _ = uop.generate_addresses();
            if uop.exception_encountered() {
                return Some(uop);
            }
            if uop.is_store_address() {
                ctx.lsq.supply_store_address(&uop);
            }
            if uop.is_load() {
                ctx.lsq.start_load(uop);
                return None;
            }
        }

        uop.execute();
        if uop.exception_encountered() {
            return Some(uop);
        }
        // Store-conditional results are only known at commit.
        if !uop.is_store_conditional() {
            ctx.dispatch.forward_operands(&uop);
        }
        if uop.is_branch() {
            self.resolve_branch(&uop, ctx.predictor);
        }
        Some(uop)
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
            self.flush = Some(FlushRequest {
                instruction_id: uop.instruction_id(),
                address: uop.branch_address(),
            });
            debug!(
                address = format_args!("{:#x}", uop.instruction_address()),
                target = format_args!("{:#x}", uop.branch_address()),
                "branch mispredicted"
            );
        }
    }

    /// Drops in-flight micro-ops younger than instruction `after`, flushing their
    /// branches from the predictor. Issue order is not program order, so the
    /// whole pipeline is searched.
    pub fn purge_flushed(&mut self, after: u64, predictor: &mut impl BranchPredictor) {
        self.discard(predictor, |uop| uop.instruction_id() > after);
    }

    /// Drops everything in flight.
    pub fn flush(&mut self, predictor: &mut impl BranchPredictor) {
        self.discard(predictor, |_| true);
        self.blocked = 0;
        self.flush = None;
    }

    fn discard(
        &mut self,
        predictor: &mut impl BranchPredictor,
        mut flushed: impl FnMut(&Instruction) -> bool,
    ) {
        let mut discarded: Vec<Instruction> = Vec::new();
        self.pipeline.retain(|entry| {
            if flushed(&entry.uop) {
                discarded.push(entry.uop.clone());
                return false;
            }
            true
        });
        discarded.sort_by_key(Instruction::sequence_id);
        for uop in discarded.iter().rev().filter(|uop| uop.is_branch()) {
            predictor.flush(uop.instruction_address());
        }
    }

    /// Misprediction resolved this cycle.
    pub const fn flush_request(&self) -> Option<FlushRequest> {
        self.flush
    }

    /// Returns `true` if nothing is in flight.
    pub fn is_empty(&self) -> bool {
        self.pipeline.is_empty()
    }

    /// Micro-ops that left the pipeline.
    pub const fn executed(&self) -> u64 {
        self.executed
    }

    /// Branches resolved.
    pub const fn branches_executed(&self) -> u64 {
        self.branches_executed
    }

    /// Branches resolved against their prediction.
    pub const fn branch_mispredicts(&self) -> u64 {
        self.branch_mispredicts
    }
}
