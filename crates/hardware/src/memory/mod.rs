//! Memory system.
//!
//! This module provides the memory seen by the cores. It includes:
//! 1. **Store:** [`SimpleMemory`], a flat little-endian byte array shared by the
//!    instruction and data sides.
//! 2. **Interface:** [`MemoryInterface`], the request/poll protocol cores use.
//! 3. **Timing models:** [`FlatMemoryInterface`] (same-call completion) and
//!    [`FixedLatencyMemoryInterface`] (completion after N ticks).

/// Fixed-latency interface.
pub mod fixed_latency;
/// Zero-latency interface.
pub mod flat;
/// Backing byte store.
pub mod simple;

pub use fixed_latency::FixedLatencyMemoryInterface;
pub use flat::FlatMemoryInterface;
pub use simple::{SharedMemory, SimpleMemory};

use std::fmt;

use crate::common::reg::RegisterValue;

/// An address and access size in bytes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct MemoryAccessTarget {
    /// First byte accessed.
    pub address: u64,
    /// Bytes accessed.
    pub size: u16,
}

impl MemoryAccessTarget {
    /// Creates a target.
    pub const fn new(address: u64, size: u16) -> Self {
        Self { address, size }
    }

    /// Returns `true` if the two byte ranges share at least one byte.
    pub const fn overlaps(&self, other: &Self) -> bool {
        self.address < other.address.wrapping_add(other.size as u64)
            && other.address < self.address.wrapping_add(self.size as u64)
    }
}

/// A completed read.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MemoryReadResult {
    /// What was read.
    pub target: MemoryAccessTarget,
    /// Bytes read, or `None` if the access faulted.
    pub data: Option<Vec<u8>>,
    /// Identifier supplied with the request.
    pub request_id: u64,
}

impl MemoryReadResult {
    /// The read bytes as a register value (reads of at most eight bytes).
    pub fn value(&self) -> Option<RegisterValue> {
        self.data.as_deref().map(RegisterValue::from_le_bytes)
    }
}

/// Request/poll access to memory.
///
/// Requests never block: completed reads appear in [`MemoryInterface::completed_reads`]
/// on the call or tick in which they finish and stay there until cleared.
pub trait MemoryInterface: fmt::Debug {
    /// Requests a read; the result carries `request_id`.
    fn request_read(&mut self, target: MemoryAccessTarget, request_id: u64);

    /// Requests a write of `data` (truncated to `target.size`).
    fn request_write(&mut self, target: MemoryAccessTarget, data: RegisterValue);

    /// Reads completed since the last clear, in completion order.
    fn completed_reads(&self) -> &[MemoryReadResult];

    /// Drops all completed reads.
    fn clear_completed_reads(&mut self);

    /// Returns `true` while any request has not completed.
    fn has_pending_requests(&self) -> bool;

    /// Advances the interface by one cycle.
    fn tick(&mut self);
}
