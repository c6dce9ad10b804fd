//! Decode unit.
//!
//! Splits macro-ops into micro-ops and checks fetch-time predictions against what
//! the decoded micro-op reveals. A non-branch predicted taken, or a direct branch
//! predicted to the wrong target, triggers an early flush: the micro-op and the
//! rest of its macro-op continue with a corrected prediction, everything queued
//! behind them is discarded and fetch is redirected.

use std::collections::VecDeque;

use tracing::debug;

use crate::core::pipeline::buffer::PipelineBuffer;
use crate::core::units::bru::{BranchPrediction, BranchPredictor};
use crate::isa::MacroOp;
use crate::isa::instruction::Instruction;

/// Decode stage.
#[derive(Clone, Debug, Default)]
pub struct DecodeUnit {
    queue: VecDeque<Instruction>,
    should_flush: bool,
    flush_address: u64,
    early_flushes: u64,
}

impl DecodeUnit {
    /// Creates an empty decode unit.
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs one decode cycle.
    ///
    /// # Arguments
    ///
    /// * `input` - Fetch-to-decode buffer.
    /// * `output` - Decode-to-execute buffer.
    /// * `predictor` - Told about false branches and discarded branches.
    pub fn tick(
        &mut self,
        input: &mut PipelineBuffer<MacroOp>,
        output: &mut PipelineBuffer<Instruction>,
        predictor: &mut impl BranchPredictor,
    ) {
        self.should_flush = false;
        if output.is_stalled() {
            input.stall(true);
            return;
        }
        input.stall(false);

        if self.queue.len() >= output.width() {
            input.stall(true);
        } else {
            for slot in input.head_slots_mut() {
                if let Some(macro_op) = slot.take() {
                    self.queue.extend(macro_op);
                }
            }
        }

        for slot in output.tail_slots_mut() {
            let Some(mut uop) = self.queue.pop_front() else {
                break;
            };
            let (mispredicted, redirect) = uop.check_early_branch_misprediction();
            if mispredicted {
                self.early_flushes += 1;
                self.should_flush = true;
                self.flush_address = redirect;
                if uop.is_branch() {
                    uop.set_branch_prediction(BranchPrediction::taken(redirect));
                } else {
                    predictor.update(
                        uop.instruction_address(),
                        false,
                        redirect,
                        uop.branch_type(),
                        uop.instruction_id(),
                    );
                    uop.set_branch_prediction(BranchPrediction::not_taken(redirect));
                }
                debug!(
                    address = format_args!("{:#x}", uop.instruction_address()),
                    redirect = format_args!("{redirect:#x}"),
                    "early misprediction"
                );
                let address = uop.instruction_address();
                *slot = Some(uop);
                self.discard_after(address, predictor);
                break;
            }
            *slot = Some(uop);
        }
    }

    /// Drops every queued micro-op after an externally triggered flush.
    pub fn purge_flushed(&mut self, predictor: &mut impl BranchPredictor) {
        self.discard_from(0, predictor);
    }

    /// Keeps the remaining micro-ops of the macro-op at `address` and drops the
    /// wrong-path micro-ops queued behind them.
    fn discard_after(&mut self, address: u64, predictor: &mut impl BranchPredictor) {
        let keep = self
            .queue
            .iter()
            .take_while(|uop| uop.instruction_address() == address)
            .count();
        self.discard_from(keep, predictor);
    }

    fn discard_from(&mut self, start: usize, predictor: &mut impl BranchPredictor) {
        for uop in self.queue.drain(start..).rev() {
            if uop.is_branch() {
                predictor.flush(uop.instruction_address());
            }
        }
    }

    /// Returns `true` if the last cycle detected an early misprediction.
    pub const fn should_flush(&self) -> bool {
        self.should_flush
    }

    /// Address fetch must resume at after an early misprediction.
    pub const fn flush_address(&self) -> u64 {
        self.flush_address
    }

    /// Early mispredictions detected so far.
    pub const fn early_flushes(&self) -> u64 {
        self.early_flushes
    }

    /// Returns `true` if no micro-op is queued.
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Micro-ops waiting for an output slot.
    pub fn queued(&self) -> usize {
        self.queue.len()
    }
}
