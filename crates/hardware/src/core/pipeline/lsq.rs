//! Load/store queue of the out-of-order pipeline.
//!
//! Entries are reserved at rename, in program order, and released at commit.
//! Ordering is conservative:
//! - a load reads memory only once every older store has generated its
//!   addresses and none of them overlaps the load,
//! - an overlapping older store holds the load until the store commits and its
//!   write is queued ahead of the read,
//! - atomics and load-reserved wait until they reach the head of the reorder
//!   buffer.
//!
//! Stores write memory through the [`Lsu`](crate::core::units::lsu::Lsu) when
//! they commit, so no load can observe a speculative store.

use std::collections::VecDeque;

use tracing::trace;

use crate::core::pipeline::buffer::PipelineBuffer;
use crate::core::pipeline::dispatch::DispatchIssueUnit;
use crate::isa::instruction::Instruction;
use crate::memory::{MemoryAccessTarget, MemoryInterface};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum LoadState {
    /// Waiting for address generation.
    Reserved,
    /// Addresses known; waiting for older stores.
    Ready,
    /// Reads issued.
    Requested,
    /// Executed and handed to writeback.
    Done,
}

#[derive(Clone, Debug)]
struct LoadEntry {
    sequence_id: u64,
    instruction_id: u64,
    state: LoadState,
    uop: Option<Instruction>,
}

#[derive(Clone, Debug)]
struct StoreEntry {
    sequence_id: u64,
    instruction_id: u64,
    targets: Option<Vec<MemoryAccessTarget>>,
}

/// Core state the queue reads and updates each cycle.
#[derive(Debug)]
pub struct LsqContext<'a> {
    /// Data memory interface.
    pub memory: &'a mut dyn MemoryInterface,
    /// Receives executed loads for forwarding.
    pub dispatch: &'a mut DispatchIssueUnit,
    /// Sequence id at the head of the reorder buffer.
    pub rob_head: Option<u64>,
}

/// Load and store queues.
#[derive(Clone, Debug)]
pub struct LoadStoreQueue {
    loads: VecDeque<LoadEntry>,
    stores: VecDeque<StoreEntry>,
    load_capacity: usize,
    store_capacity: usize,
    completion_width: usize,

    order_stalls: u64,
}

impl LoadStoreQueue {
    /// Creates empty queues.
    ///
    /// # Arguments
    ///
    /// * `load_capacity` - Load queue entries.
    /// * `store_capacity` - Store queue entries.
    /// * `completion_width` - Loads executed per cycle.
    pub fn new(load_capacity: usize, store_capacity: usize, completion_width: usize) -> Self {
        Self {
            loads: VecDeque::with_capacity(load_capacity),
            stores: VecDeque::with_capacity(store_capacity),
            load_capacity,
            store_capacity,
            completion_width: completion_width.max(1),
            order_stalls: 0,
        }
    }

    /// Free load queue entries.
    pub fn load_space(&self) -> usize {
        self.load_capacity.saturating_sub(self.loads.len())
    }

    /// Free store queue entries.
    pub fn store_space(&self) -> usize {
        self.store_capacity.saturating_sub(self.stores.len())
    }

    /// Reserves the entries `uop` needs; the caller checked the space.
    pub fn reserve(&mut self, uop: &Instruction) {
        if uop.is_load() {
            self.loads.push_back(LoadEntry {
                sequence_id: uop.sequence_id(),
                instruction_id: uop.instruction_id(),
                state: LoadState::Reserved,
                uop: None,
            });
        }
        if uop.is_store_address() {
            self.stores.push_back(StoreEntry {
                sequence_id: uop.sequence_id(),
                instruction_id: uop.instruction_id(),
                targets: None,
            });
        }
    }

    /// Takes a load whose addresses were generated.
    pub fn start_load(&mut self, uop: Instruction) {
        if let Some(entry) = self
            .loads
            .iter_mut()
            .find(|e| e.sequence_id == uop.sequence_id())
        {
            entry.state = LoadState::Ready;
            entry.uop = Some(uop);
        }
    }

    /// Records the targets of a store-address micro-op.
    pub fn supply_store_address(&mut self, uop: &Instruction) {
        if let Some(entry) = self
            .stores
            .iter_mut()
            .find(|e| e.sequence_id == uop.sequence_id())
        {
            entry.targets = Some(uop.memory_addresses().to_vec());
        }
    }

    /// Runs one cycle: collects read data, issues the loads whose ordering allows
    /// it and completes loads whose data has arrived.
    ///
    /// # Arguments
    ///
    /// * `output` - Completion buffer read by writeback.
    /// * `ctx` - Data memory, dispatch unit and reorder buffer head.
    pub fn tick(&mut self, output: &mut PipelineBuffer<Instruction>, ctx: &mut LsqContext<'_>) {
        for read in ctx.memory.completed_reads() {
            if let Some(uop) = self
                .loads
                .iter_mut()
                .filter(|e| e.state == LoadState::Requested)
                .find(|e| e.sequence_id == read.request_id)
                .and_then(|e| e.uop.as_mut())
            {
                uop.supply_data(read.target.address, read.value());
            }
        }
        ctx.memory.clear_completed_reads();

        for index in 0..self.loads.len() {
            if self.loads[index].state != LoadState::Ready {
                continue;
            }
            if !self.may_issue(index, ctx.rob_head) {
                self.order_stalls += 1;
                continue;
            }
            let entry = &mut self.loads[index];
            entry.state = LoadState::Requested;
            if let Some(uop) = &entry.uop {
                for &target in uop.memory_addresses() {
                    ctx.memory.request_read(target, entry.sequence_id);
                }
            }
        }

        let mut free = output
            .tail_slots_mut()
            .iter_mut()
            .filter(|slot| slot.is_none())
            .take(self.completion_width);
        for entry in &mut self.loads {
            let complete = entry.state == LoadState::Requested
                && entry
                    .uop
                    .as_ref()
                    .is_some_and(|u| u.data_pending() == 0 || u.exception_encountered());
            if !complete {
                continue;
            }
            let Some(slot) = free.next() else {
                break;
            };
            let Some(mut uop) = entry.uop.take() else {
                continue;
            };
            entry.state = LoadState::Done;
            if !uop.exception_encountered() {
                uop.execute();
            }
            if !uop.exception_encountered() {
                ctx.dispatch.forward_operands(&uop);
            }
            trace!(
                address = format_args!("{:#x}", uop.instruction_address()),
                "load completed"
            );
            *slot = Some(uop);
        }
    }

    fn may_issue(&self, index: usize, rob_head: Option<u64>) -> bool {
        let load = &self.loads[index];
        let Some(uop) = &load.uop else {
            return false;
        };
        if uop.is_atomic() || uop.is_load_reserved() {
            return rob_head == Some(load.sequence_id);
        }
        self.stores
            .iter()
            .take_while(|s| s.sequence_id < load.sequence_id)
            .all(|store| {
                store.targets.as_ref().is_some_and(|targets| {
                    !targets
                        .iter()
                        .any(|t| uop.memory_addresses().iter().any(|l| l.overlaps(t)))
                })
            })
    }

    /// Releases the entry of a committed load.
    pub fn commit_load(&mut self, uop: &Instruction) {
        self.loads.retain(|e| e.sequence_id != uop.sequence_id());
    }

    /// Releases the entry of a committed store; its write is already queued.
    pub fn commit_store(&mut self, uop: &Instruction) {
        self.stores.retain(|e| e.sequence_id != uop.sequence_id());
    }

    /// Drops entries younger than instruction `after`.
    pub fn purge_flushed(&mut self, after: u64) {
        self.loads.retain(|e| e.instruction_id <= after);
        self.stores.retain(|e| e.instruction_id <= after);
    }

    /// Drops every entry.
    pub fn flush(&mut self) {
        self.loads.clear();
        self.stores.clear();
    }

    /// Returns `true` if no entry is reserved.
    pub fn is_empty(&self) -> bool {
        self.loads.is_empty() && self.stores.is_empty()
    }

    /// Load-cycles spent waiting on older stores or the reorder buffer head.
    pub const fn order_stalls(&self) -> u64 {
        self.order_stalls
    }
}
