//! Zero-latency memory interface.

use tracing::warn;

use super::{MemoryAccessTarget, MemoryInterface, MemoryReadResult, SharedMemory};
use crate::common::reg::RegisterValue;

/// Completes every request inside the request call.
#[derive(Debug)]
pub struct FlatMemoryInterface {
    memory: SharedMemory,
    completed: Vec<MemoryReadResult>,
}

impl FlatMemoryInterface {
    /// Creates an interface over `memory`.
    pub fn new(memory: SharedMemory) -> Self {
        Self {
            memory,
            completed: Vec::new(),
        }
    }
}

impl MemoryInterface for FlatMemoryInterface {
    fn request_read(&mut self, target: MemoryAccessTarget, request_id: u64) {
        let data = self.memory.borrow().read(target);
        if data.is_none() {
            warn!(address = target.address, size = target.size, "read outside memory");
        }
        self.completed.push(MemoryReadResult {
            target,
            data,
            request_id,
        });
    }

    fn request_write(&mut self, target: MemoryAccessTarget, data: RegisterValue) {
        if !self.memory.borrow_mut().write(target, data) {
            warn!(address = target.address, size = target.size, "write outside memory");
        }
    }

    fn completed_reads(&self) -> &[MemoryReadResult] {
        &self.completed
    }

    fn clear_completed_reads(&mut self) {
        self.completed.clear();
    }

    fn has_pending_requests(&self) -> bool {
        false
    }

    fn tick(&mut self) {}
}
