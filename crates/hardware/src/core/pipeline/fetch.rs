//! Fetch unit.
//!
//! The fetch unit turns instruction memory into macro-ops. Each cycle it:
//! 1. **Harvests:** Stores completed block reads in a direct-mapped block cache
//!    indexed by the low bits of the block address. A slot whose tag differs from
//!    the wanted block counts as a miss, so entries are replaced, never evicted.
//! 2. **Predecodes:** While the macro-op queue has room, predecodes one macro-op at
//!    the PC. An instruction that straddles two blocks needs both cached; if the
//!    second is missing it is requested once and fetch stops for the cycle.
//! 3. **Predicts:** Consults the branch predictor for branch macro-ops and follows
//!    the predicted path. Fetch stops for the cycle after a predicted-taken branch.
//! 4. **Drains:** Moves queued macro-ops into the output buffer in order.
//!
//! A loop buffer can replace steps 1-3. Once commit reports a loop boundary (a
//! branch retired repeatedly with the same prediction), the unit waits for that
//! branch to be fetched again, records the loop body up to the next fetch of the
//! branch, and then supplies macro-ops from the recording until a flush.

use std::collections::VecDeque;

use tracing::{debug, warn};

use crate::core::pipeline::buffer::PipelineBuffer;
use crate::core::units::bru::{BranchPrediction, BranchPredictor};
use crate::isa::{Architecture, MacroOp, Predecode, SKIP_BYTES};
use crate::memory::{MemoryAccessTarget, MemoryInterface};

/// Largest instruction window assembled for predecode.
const MAX_WINDOW: usize = 16;

/// A cached fetch block.
#[derive(Clone, Debug, PartialEq, Eq)]
struct FetchBlock {
    tag: u64,
    bytes: Vec<u8>,
}

/// Bytes gathered at the PC.
enum Window {
    /// The block holding the PC is not cached.
    Missing(u64),
    /// `usize` bytes are available, as many as the longest instruction.
    Ready(usize),
    /// The PC block ends early and the following block is not cached.
    Crossing { len: usize, next_block: u64 },
}

/// Loop buffer state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LoopBufferState {
    /// No loop is known.
    #[default]
    Idle,
    /// A boundary was registered; waiting for the branch to be fetched.
    Waiting,
    /// Recording the loop body.
    Filling,
    /// Replaying the recorded body.
    Supplying,
}

/// One macro-op recorded in the loop buffer.
#[derive(Clone, Debug, PartialEq, Eq)]
struct LoopEntry {
    bytes: Vec<u8>,
    address: u64,
    prediction: BranchPrediction,
}

/// Fetch stage.
#[derive(Clone, Debug)]
pub struct FetchUnit {
    pc: u64,
    program_length: u64,
    halted: bool,

    block_size: u64,
    blocks: Vec<Option<FetchBlock>>,
    pending: Vec<u64>,

    queue: VecDeque<MacroOp>,
    queue_capacity: usize,

    loop_buffer: VecDeque<LoopEntry>,
    loop_capacity: usize,
    loop_state: LoopBufferState,
    loop_boundary: u64,

    branches_fetched: u64,
    branch_stalls: u64,
    block_requests: u64,
    loop_supplied: u64,
}

impl FetchUnit {
    /// Creates a fetch unit starting at `entry`.
    ///
    /// # Arguments
    ///
    /// * `entry` - First PC.
    /// * `program_length` - Fetch halts once the PC reaches this address.
    /// * `block_size` - Bytes per block request (power of two).
    /// * `block_cache_entries` - Slots in the block cache.
    /// * `width` - Macro-ops fetched per cycle.
    pub fn new(
        entry: u64,
        program_length: u64,
        block_size: u64,
        block_cache_entries: usize,
        width: usize,
    ) -> Self {
        Self {
            pc: entry,
            program_length,
            halted: entry >= program_length,
            block_size,
            blocks: vec![None; block_cache_entries.max(1)],
            pending: Vec::new(),
            queue: VecDeque::with_capacity(width),
            queue_capacity: width.max(1),
            loop_buffer: VecDeque::new(),
            loop_capacity: 0,
            loop_state: LoopBufferState::Idle,
            loop_boundary: 0,
            branches_fetched: 0,
            branch_stalls: 0,
            block_requests: 0,
            loop_supplied: 0,
        }
    }

    /// Enables a loop buffer of `entries` macro-ops.
    #[must_use]
    pub const fn with_loop_buffer(mut self, entries: usize) -> Self {
        self.loop_capacity = entries;
        self
    }

    /// Runs one fetch cycle.
    ///
    /// # Arguments
    ///
    /// * `output` - Fetch-to-decode buffer.
    /// * `memory` - Instruction memory interface; completed reads are consumed.
    /// * `isa` - Predecoder.
    /// * `predictor` - Branch predictor consulted for branch macro-ops.
    pub fn tick(
        &mut self,
        output: &mut PipelineBuffer<MacroOp>,
        memory: &mut dyn MemoryInterface,
        isa: &mut impl Architecture,
        predictor: &mut impl BranchPredictor,
    ) {
        self.harvest(memory);

        if output.is_stalled() {
            return;
        }

        if self.loop_state == LoopBufferState::Supplying {
            self.supply_loop(isa, predictor);
        } else if !self.halted {
            self.fill_queue(memory, isa, predictor);
        }

        for slot in output.tail_slots_mut() {
            if slot.is_some() {
                continue;
            }
            match self.queue.pop_front() {
                Some(macro_op) => *slot = Some(macro_op),
                None => break,
            }
        }
    }

    fn harvest(&mut self, memory: &mut dyn MemoryInterface) {
        for read in memory.completed_reads() {
            let address = read.target.address;
            let requested = self.pending.contains(&address);
            self.pending.retain(|&a| a != address);
            match &read.data {
                // Faults on a path abandoned by a redirect are ignored.
                None if !requested => {}
                Some(bytes) => {
                    let slot = self.slot(address);
                    self.blocks[slot] = Some(FetchBlock {
                        tag: address,
                        bytes: bytes.clone(),
                    });
                }
                None => {
                    warn!(
                        address = format_args!("{address:#x}"),
                        "instruction fetch outside memory"
                    );
                    self.halted = true;
                }
            }
        }
        memory.clear_completed_reads();
    }

    fn fill_queue(
        &mut self,
        memory: &mut dyn MemoryInterface,
        isa: &mut impl Architecture,
        predictor: &mut impl BranchPredictor,
    ) {
        let want = usize::from(isa.max_instruction_size()).min(MAX_WINDOW);
        let mut buffer = [0u8; MAX_WINDOW];

        while self.queue.len() < self.queue_capacity {
            let (len, next_block) = match self.window(&mut buffer[..want]) {
                Window::Missing(block) => {
                    self.request_block(block, memory);
                    break;
                }
                Window::Ready(len) => (len, None),
                Window::Crossing { len, next_block } => (len, Some(next_block)),
            };

            let (length, mut macro_op) = match isa.predecode(&buffer[..len], self.pc) {
                Predecode::NeedMoreBytes => {
                    if let Some(block) = next_block {
                        self.request_block(block, memory);
                    }
                    break;
                }
                Predecode::Skip => {
                    self.pc += SKIP_BYTES;
                    if self.pc >= self.program_length {
                        self.halted = true;
                        break;
                    }
                    continue;
                }
                Predecode::Decoded { length, macro_op } => (length, macro_op),
            };

            let mut prediction = BranchPrediction::not_taken(self.pc + u64::from(length));
            let is_branch = macro_op.first().is_some_and(|uop| uop.is_branch());
            if let Some(uop) = macro_op.first_mut().filter(|uop| uop.is_branch()) {
                prediction = predictor.predict(
                    self.pc,
                    uop.branch_type(),
                    uop.known_offset(),
                    length,
                );
                uop.set_branch_prediction(prediction);
                self.branches_fetched += 1;
            }

            self.queue.push_back(macro_op);
            let start_supplying =
                self.record_loop(&buffer[..usize::from(length).min(len)], is_branch, prediction);
            self.pc = if prediction.is_taken {
                prediction.target
            } else {
                self.pc + u64::from(length)
            };

            if start_supplying {
                break;
            }
            if self.pc >= self.program_length {
                self.halted = true;
                break;
            }
            if prediction.is_taken {
                if self.queue.len() < self.queue_capacity {
                    self.branch_stalls += 1;
                }
                break;
            }
        }
    }

    /// Advances the loop buffer state for the macro-op just fetched at the PC.
    ///
    /// # Returns
    ///
    /// `true` when the recording is complete and supplying starts next cycle.
    fn record_loop(&mut self, bytes: &[u8], is_branch: bool, prediction: BranchPrediction) -> bool {
        let at_boundary = self.pc == self.loop_boundary;
        let leaves_loop = is_branch && !prediction.is_taken;
        match self.loop_state {
            LoopBufferState::Waiting if at_boundary => {
                self.loop_state = if leaves_loop {
                    LoopBufferState::Idle
                } else {
                    LoopBufferState::Filling
                };
                false
            }
            LoopBufferState::Filling => {
                self.loop_buffer.push_back(LoopEntry {
                    bytes: bytes.to_vec(),
                    address: self.pc,
                    prediction,
                });
                if at_boundary && !leaves_loop {
                    self.loop_state = LoopBufferState::Supplying;
                    debug!(
                        boundary = format_args!("{:#x}", self.loop_boundary),
                        entries = self.loop_buffer.len(),
                        "loop buffer supplying"
                    );
                    return true;
                }
                if at_boundary || self.loop_buffer.len() > self.loop_capacity {
                    self.flush_loop_buffer();
                }
                false
            }
            _ => false,
        }
    }

    /// Replays recorded macro-ops, reapplying their recorded predictions.
    fn supply_loop(&mut self, isa: &mut impl Architecture, predictor: &mut impl BranchPredictor) {
        while self.queue.len() < self.queue_capacity {
            let Some(entry) = self.loop_buffer.pop_front() else {
                self.flush_loop_buffer();
                return;
            };
            if let Predecode::Decoded { mut macro_op, .. } = isa.predecode(&entry.bytes, entry.address)
            {
                if let Some(uop) = macro_op.first_mut().filter(|uop| uop.is_branch()) {
                    // Registers the branch with the predictor; the recorded
                    // prediction stands.
                    let _ = predictor.predict(
                        entry.address,
                        uop.branch_type(),
                        uop.known_offset(),
                        uop.size(),
                    );
                    uop.set_branch_prediction(entry.prediction);
                    self.branches_fetched += 1;
                }
                self.queue.push_back(macro_op);
                self.loop_supplied += 1;
            }
            self.loop_buffer.push_back(entry);
        }
    }

    /// Copies up to `buffer.len()` bytes starting at the PC out of the block cache.
    fn window(&self, buffer: &mut [u8]) -> Window {
        let block_address = self.pc & !(self.block_size - 1);
        let Some(block) = self.lookup(block_address) else {
            return Window::Missing(block_address);
        };
        let offset = (self.pc - block_address) as usize;
        let first = block.len().saturating_sub(offset).min(buffer.len());
        buffer[..first].copy_from_slice(&block[offset..offset + first]);
        if first == buffer.len() {
            return Window::Ready(first);
        }

        let next_block = block_address + self.block_size;
        match self.lookup(next_block) {
            Some(next) => {
                let rest = (buffer.len() - first).min(next.len());
                buffer[first..first + rest].copy_from_slice(&next[..rest]);
                Window::Ready(first + rest)
            }
            None => Window::Crossing {
                len: first,
                next_block,
            },
        }
    }

    fn slot(&self, block_address: u64) -> usize {
        ((block_address / self.block_size) as usize) % self.blocks.len()
    }

    fn lookup(&self, block_address: u64) -> Option<&[u8]> {
        self.blocks[self.slot(block_address)]
            .as_ref()
            .filter(|block| block.tag == block_address)
            .map(|block| block.bytes.as_slice())
    }

    fn request_block(&mut self, block_address: u64, memory: &mut dyn MemoryInterface) {
        if self.pending.contains(&block_address) {
            return;
        }
        self.pending.push(block_address);
        self.block_requests += 1;
        memory.request_read(
            MemoryAccessTarget::new(block_address, self.block_size as u16),
            block_address,
        );
    }

    /// Redirects fetch to `address`.
    ///
    /// Queued macro-ops, outstanding block requests and the loop buffer are
    /// discarded; every discarded branch is flushed from the predictor, youngest
    /// first.
    pub fn update_pc(&mut self, address: u64, predictor: &mut impl BranchPredictor) {
        self.flush(predictor);
        self.pc = address;
        self.halted = self.pc >= self.program_length;
        debug!(pc = format_args!("{address:#x}"), "fetch redirected");
    }

    /// Discards queued macro-ops, outstanding block requests and the loop buffer
    /// without moving the PC; the PC is set once the exception is handled.
    pub fn flush(&mut self, predictor: &mut impl BranchPredictor) {
        for macro_op in self.queue.drain(..).rev() {
            for uop in macro_op.iter().rev().filter(|uop| uop.is_branch()) {
                predictor.flush(uop.instruction_address());
            }
        }
        self.pending.clear();
        self.flush_loop_buffer();
    }

    /// Marks the branch at `branch_address` as the boundary of a hot loop.
    ///
    /// Ignored while the loop buffer is disabled or already busy with a loop.
    pub fn register_loop_boundary(&mut self, branch_address: u64) {
        if self.loop_capacity == 0 || self.loop_state != LoopBufferState::Idle {
            return;
        }
        self.loop_state = LoopBufferState::Waiting;
        self.loop_boundary = branch_address;
        debug!(
            boundary = format_args!("{branch_address:#x}"),
            "loop boundary registered"
        );
    }

    /// Empties the loop buffer and returns it to idle.
    pub fn flush_loop_buffer(&mut self) {
        self.loop_buffer.clear();
        self.loop_state = LoopBufferState::Idle;
        self.loop_boundary = 0;
    }

    /// Current loop buffer state.
    pub const fn loop_buffer_state(&self) -> LoopBufferState {
        self.loop_state
    }

    /// Macro-ops recorded in the loop buffer.
    pub fn loop_buffer_len(&self) -> usize {
        self.loop_buffer.len()
    }

    /// Macro-ops supplied from the loop buffer so far.
    pub const fn loop_supplied(&self) -> u64 {
        self.loop_supplied
    }

    /// Next address to fetch.
    pub const fn pc(&self) -> u64 {
        self.pc
    }

    /// Returns `true` once the PC left the program.
    pub const fn has_halted(&self) -> bool {
        self.halted
    }

    /// Returns `true` if no macro-op is waiting to enter the output buffer.
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Block addresses requested and not yet received.
    pub fn pending_requests(&self) -> &[u64] {
        &self.pending
    }

    /// Returns `true` if the block at `block_address` is cached.
    pub fn is_cached(&self, block_address: u64) -> bool {
        self.lookup(block_address).is_some()
    }

    /// Branch macro-ops fetched.
    pub const fn branches_fetched(&self) -> u64 {
        self.branches_fetched
    }

    /// Cycles in which a predicted-taken branch ended fetch with slots unused.
    pub const fn branch_stalls(&self) -> u64 {
        self.branch_stalls
    }

    /// Block reads issued.
    pub const fn block_requests(&self) -> u64 {
        self.block_requests
    }
}
