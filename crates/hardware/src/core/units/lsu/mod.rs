//! Load/Store Unit (LSU).
//!
//! This module provides the memory side of micro-op commit, shared by both core
//! models. It includes:
//! - [`atomic`]: Read-modify-write arithmetic for the RISC-V A extension.
//! - [`ReservationMonitor`]: The load-reserved / store-conditional reservation.
//! - [`Lsu`]: Store commit (pairing split store-address and store-data micro-ops),
//!   reservation bookkeeping and tracking of stores that have not committed yet.

/// Atomic memory operation ALU (RISC-V A extension).
pub mod atomic;

use std::collections::{BTreeSet, VecDeque};

use tracing::warn;

use crate::isa::instruction::Instruction;
use crate::memory::{MemoryAccessTarget, MemoryInterface};

/// Single-hart reservation set for LR/SC.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReservationMonitor {
    reservation: Option<MemoryAccessTarget>,
}

impl ReservationMonitor {
    /// Registers a reservation on `target`, replacing any previous one.
    pub fn reserve(&mut self, target: MemoryAccessTarget) {
        self.reservation = Some(target);
    }

    /// Consumes the reservation.
    ///
    /// # Returns
    ///
    /// `true` if a reservation covering exactly `target` was held.
    pub fn take(&mut self, target: MemoryAccessTarget) -> bool {
        self.reservation.take() == Some(target)
    }

    /// Drops the reservation if a store to `target` touches it.
    pub fn invalidate(&mut self, target: MemoryAccessTarget) {
        if self.reservation.is_some_and(|r| r.overlaps(&target)) {
            self.reservation = None;
        }
    }

    /// Currently reserved range.
    pub const fn reservation(&self) -> Option<MemoryAccessTarget> {
        self.reservation
    }
}

/// Load/Store Unit for memory commit.
///
/// Loads read memory when they issue; everything that changes memory happens in
/// [`Lsu::commit`], in program order.
#[derive(Clone, Debug, Default)]
pub struct Lsu {
    monitor: ReservationMonitor,
    /// Addresses of committed store-address micro-ops awaiting their data half.
    store_addresses: VecDeque<(u64, Vec<MemoryAccessTarget>)>,
    /// Sequence ids of store-data micro-ops issued but not yet committed.
    uncommitted: BTreeSet<u64>,
    loads_committed: u64,
    stores_committed: u64,
    conditional_failures: u64,
}

impl Lsu {
    /// Creates an idle unit.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that a store-data micro-op has issued.
    pub fn track_store(&mut self, uop: &Instruction) {
        if uop.is_store_data() {
            let _ = self.uncommitted.insert(uop.sequence_id());
        }
    }

    /// Returns `true` while an issued store has not written memory.
    pub fn has_uncommitted_stores(&self) -> bool {
        !self.uncommitted.is_empty()
    }

    /// Performs the memory side of committing `uop`.
    ///
    /// Load-reserved micro-ops set the reservation. A store-address micro-op without
    /// data keeps its targets until the paired data micro-op commits. Store data is
    /// written target by target; a store-conditional first checks the reservation
    /// and writes nothing on failure.
    ///
    /// # Arguments
    ///
    /// * `uop` - The executed micro-op; store-conditional results are updated here.
    /// * `memory` - Data memory interface.
    pub fn commit(&mut self, uop: &mut Instruction, memory: &mut dyn MemoryInterface) {
        if uop.is_load() {
            self.loads_committed += 1;
            if uop.is_load_reserved() {
                if let Some(&target) = uop.memory_addresses().first() {
                    self.monitor.reserve(target);
                }
            }
        }

        if uop.is_store_address() && !uop.is_store_data() {
            self.store_addresses
                .push_back((uop.instruction_id(), uop.memory_addresses().to_vec()));
            return;
        }
        if !uop.is_store_data() {
            return;
        }

        let _ = self.uncommitted.remove(&uop.sequence_id());
        let targets = if uop.is_store_address() {
            uop.memory_addresses().to_vec()
        } else {
            match self.store_addresses.pop_front() {
                Some((id, targets)) if id == uop.instruction_id() => targets,
                other => {
                    warn!(
                        address = format_args!("{:#x}", uop.instruction_address()),
                        "store data without matching store address"
                    );
                    if let Some(entry) = other {
                        self.store_addresses.push_front(entry);
                    }
                    return;
                }
            }
        };

        if uop.is_store_conditional() {
            let success = targets
                .first()
                .is_some_and(|&target| self.monitor.take(target));
            if !success {
                self.conditional_failures += 1;
            }
            uop.update_cond_store_result(success);
        }

        for (&target, &value) in targets.iter().zip(uop.store_data()) {
            self.monitor.invalidate(target);
            memory.request_write(target, value);
        }
        if !uop.store_data().is_empty() {
            self.stores_committed += 1;
        }
    }

    /// Forgets stores younger than `sequence_id` that were discarded by a flush.
    pub fn flush_younger(&mut self, sequence_id: u64) {
        let _ = self.uncommitted.split_off(&(sequence_id + 1));
    }

    /// Forgets every in-flight store.
    pub fn flush(&mut self) {
        self.store_addresses.clear();
        self.uncommitted.clear();
    }

    /// Loads committed so far.
    pub const fn loads_committed(&self) -> u64 {
        self.loads_committed
    }

    /// Stores that wrote memory so far.
    pub const fn stores_committed(&self) -> u64 {
        self.stores_committed
    }

    /// Store-conditionals that failed.
    pub const fn conditional_failures(&self) -> u64 {
        self.conditional_failures
    }
}
