//! Reorder buffer.
//!
//! Holds every renamed micro-op in program order until it commits. A micro-op
//! written back waits for the rest of its macro-op; once every micro-op of the
//! macro-op (including the last) has written back, all of them become ready to
//! commit. Commit then retires ready micro-ops from the head:
//! 1. **Memory:** Stores reach memory and reservations change through the
//!    [`Lsu`]; the load/store queue releases the micro-op's entries.
//! 2. **Registers:** Each result is copied to the architectural register its
//!    physical register was renamed from, and the previous mapping is freed.
//! 3. **Loops:** A branch retired with the same prediction more than the
//!    detection threshold times in a row, with a body that fits the loop buffer,
//!    is reported as a loop boundary.
//!
//! A micro-op carrying an exception stops commit at the head and is handed to the
//! core. A flush removes micro-ops from the tail, rewinding their renames youngest
//! first.

use std::collections::VecDeque;

use tracing::{debug, trace};

use crate::common::reg::RegisterFileSet;
use crate::core::pipeline::lsq::LoadStoreQueue;
use crate::core::pipeline::rat::RegisterAliasTable;
use crate::core::units::bru::{BranchPrediction, BranchPredictor};
use crate::core::units::lsu::Lsu;
use crate::isa::instruction::Instruction;
use crate::memory::MemoryInterface;

/// Core state updated by commit.
#[derive(Debug)]
pub struct CommitContext<'a> {
    /// Register alias table.
    pub rat: &'a mut RegisterAliasTable,
    /// Architectural registers.
    pub registers: &'a mut RegisterFileSet,
    /// Store commit and reservations.
    pub lsu: &'a mut Lsu,
    /// Load/store queue entries to release.
    pub lsq: &'a mut LoadStoreQueue,
    /// Data memory interface.
    pub memory: &'a mut dyn MemoryInterface,
}

/// What one commit cycle produced.
#[derive(Debug, Default)]
pub struct CommitOutcome {
    /// Micro-ops committed.
    pub committed: usize,
    /// A copy of the excepting micro-op at the head; it stays in the buffer.
    pub exception: Option<Instruction>,
    /// Address of a newly detected loop-closing branch.
    pub loop_boundary: Option<u64>,
    /// Committed store-conditionals, whose results are only known now.
    pub conditional_stores: Vec<Instruction>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct LoopCandidate {
    address: u64,
    prediction: BranchPrediction,
    retired_at: u64,
}

/// In-order retirement buffer.
#[derive(Clone, Debug)]
pub struct ReorderBuffer {
    entries: VecDeque<Instruction>,
    capacity: usize,

    loop_buffer_size: usize,
    loop_detection_threshold: u16,
    candidate: Option<LoopCandidate>,
    repeats: u16,
    loop_detected: bool,

    retired: u64,
    committed: u64,
    flushed: u64,
}

impl ReorderBuffer {
    /// Creates an empty buffer.
    ///
    /// # Arguments
    ///
    /// * `capacity` - Entries.
    /// * `loop_buffer_size` - Largest loop body (in instructions) worth reporting;
    ///   zero disables loop detection.
    /// * `loop_detection_threshold` - Repeats of a branch that identify a loop.
    pub fn new(capacity: usize, loop_buffer_size: usize, loop_detection_threshold: u16) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
            loop_buffer_size,
            loop_detection_threshold,
            candidate: None,
            repeats: 0,
            loop_detected: false,
            retired: 0,
            committed: 0,
            flushed: 0,
        }
    }

    /// Appends a renamed micro-op.
    pub fn reserve(&mut self, uop: Instruction) {
        debug_assert!(self.entries.len() < self.capacity, "reorder buffer overrun");
        self.entries.push_back(uop);
    }

    /// Replaces the entry of a written-back micro-op with its executed copy.
    ///
    /// # Returns
    ///
    /// `false` if the micro-op is not in the buffer (it was flushed).
    pub fn writeback(&mut self, uop: Instruction) -> bool {
        debug_assert!(
            uop.has_executed() || uop.exception_encountered(),
            "micro-op written back before executing"
        );
        let Ok(index) = self
            .entries
            .binary_search_by_key(&uop.sequence_id(), Instruction::sequence_id)
        else {
            return false;
        };
        let instruction_id = uop.instruction_id();
        let entry = &mut self.entries[index];
        *entry = uop;
        entry.set_waiting_commit();
        self.commit_micro_ops(instruction_id, index);
        true
    }

    /// Marks every micro-op of instruction `instruction_id` ready to commit once
    /// all of them, the last included, wait for commit.
    fn commit_micro_ops(&mut self, instruction_id: u64, hint: usize) {
        if !self.entries[hint].is_micro_op() {
            self.entries[hint].set_commit_ready();
            return;
        }
        let first = self
            .entries
            .iter()
            .position(|e| e.instruction_id() == instruction_id)
            .unwrap_or(hint);
        let siblings = self
            .entries
            .iter()
            .skip(first)
            .take_while(|e| e.instruction_id() == instruction_id);
        let mut complete = false;
        for uop in siblings {
            if !uop.is_waiting_commit() {
                return;
            }
            complete |= uop.is_last_micro_op();
        }
        if !complete {
            return;
        }
        for uop in self
            .entries
            .iter_mut()
            .skip(first)
            .take_while(|e| e.instruction_id() == instruction_id)
        {
            uop.set_commit_ready();
        }
    }

    /// Commits up to `max` ready micro-ops from the head.
    pub fn commit(&mut self, max: usize, ctx: &mut CommitContext<'_>) -> CommitOutcome {
        let mut outcome = CommitOutcome::default();
        while outcome.committed < max {
            let Some(head) = self.entries.front() else {
                break;
            };
            if head.exception_encountered() {
                outcome.exception = Some(head.clone());
                break;
            }
            if !head.can_commit() {
                break;
            }
            let Some(mut uop) = self.entries.pop_front() else {
                break;
            };

            ctx.lsu.commit(&mut uop, ctx.memory);
            for (&physical, &value) in uop.destination_registers().iter().zip(uop.results()) {
                ctx.registers.set(ctx.rat.architectural(physical), value);
                ctx.rat.commit(physical);
            }
            if uop.is_load() {
                ctx.lsq.commit_load(&uop);
            }
            if uop.is_store_address() {
                ctx.lsq.commit_store(&uop);
            }
            if uop.is_last_micro_op() {
                self.retired += 1;
            }
            if uop.is_branch() {
                if let Some(boundary) = self.detect_loop(&uop) {
                    outcome.loop_boundary = Some(boundary);
                }
            }
            trace!(
                target: "commit",
                address = format_args!("{:#x}", uop.instruction_address()),
                op = uop.opcode().mnemonic(),
                micro_op = uop.micro_op_index(),
                "retired"
            );

            self.committed += 1;
            outcome.committed += 1;
            if uop.is_store_conditional() {
                outcome.conditional_stores.push(uop);
            }
        }
        outcome
    }

    /// Tracks consecutive retirements of the same branch with the same prediction.
    fn detect_loop(&mut self, uop: &Instruction) -> Option<u64> {
        if self.loop_detected || self.loop_buffer_size == 0 {
            return None;
        }
        let address = uop.instruction_address();
        let prediction = uop.branch_prediction();
        let repeat = self.candidate.is_some_and(|c| {
            c.address == address
                && c.prediction == prediction
                && self.retired - c.retired_at <= self.loop_buffer_size as u64
        });
        if !repeat {
            self.candidate = Some(LoopCandidate {
                address,
                prediction,
                retired_at: self.retired,
            });
            self.repeats = 0;
            return None;
        }

        if let Some(candidate) = &mut self.candidate {
            candidate.retired_at = self.retired;
        }
        self.repeats += 1;
        if self.repeats <= self.loop_detection_threshold {
            return None;
        }
        self.loop_detected = true;
        debug!(
            boundary = format_args!("{address:#x}"),
            repeats = self.repeats,
            "loop detected"
        );
        Some(address)
    }

    fn reset_loop_detection(&mut self) {
        self.candidate = None;
        self.repeats = 0;
        self.loop_detected = false;
    }

    /// Removes micro-ops younger than instruction `after`, youngest first,
    /// rewinding their renames and flushing their branches from the predictor.
    pub fn flush(
        &mut self,
        after: u64,
        rat: &mut RegisterAliasTable,
        predictor: &mut impl BranchPredictor,
    ) {
        while self
            .entries
            .back()
            .is_some_and(|uop| uop.instruction_id() > after)
        {
            if let Some(uop) = self.entries.pop_back() {
                Self::discard(&uop, rat, predictor);
                self.flushed += 1;
            }
        }
        self.reset_loop_detection();
    }

    /// Removes every micro-op after an exception.
    pub fn flush_all(&mut self, rat: &mut RegisterAliasTable, predictor: &mut impl BranchPredictor) {
        while let Some(uop) = self.entries.pop_back() {
            Self::discard(&uop, rat, predictor);
            self.flushed += 1;
        }
        self.reset_loop_detection();
    }

    fn discard(uop: &Instruction, rat: &mut RegisterAliasTable, predictor: &mut impl BranchPredictor) {
        for &physical in uop.destination_registers().iter().rev() {
            rat.rewind(physical);
        }
        if uop.is_branch() {
            predictor.flush(uop.instruction_address());
        }
    }

    /// Oldest micro-op.
    pub fn head(&self) -> Option<&Instruction> {
        self.entries.front()
    }

    /// Sequence id of the oldest micro-op.
    pub fn head_sequence_id(&self) -> Option<u64> {
        self.head().map(Instruction::sequence_id)
    }

    /// Free entries.
    pub fn free_space(&self) -> usize {
        self.capacity.saturating_sub(self.entries.len())
    }

    /// Micro-ops held.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing is held.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Counts an instruction retired by an exception handler.
    pub fn count_retired(&mut self) {
        self.retired += 1;
    }

    /// Instructions retired.
    pub const fn retired(&self) -> u64 {
        self.retired
    }

    /// Micro-ops committed.
    pub const fn committed(&self) -> u64 {
        self.committed
    }

    /// Micro-ops removed by flushes.
    pub const fn flushed(&self) -> u64 {
        self.flushed
    }
}
