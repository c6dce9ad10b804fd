//! Fixed-latency memory interface.
//!
//! Requests are queued and complete, in the order they were made, a fixed number of
//! ticks later. Writes are applied to memory when they complete, so a read issued
//! after a write to the same address observes the written value.

use std::collections::VecDeque;

use tracing::warn;

use super::{MemoryAccessTarget, MemoryInterface, MemoryReadResult, SharedMemory};
use crate::common::reg::RegisterValue;

#[derive(Clone, Copy, Debug)]
enum Request {
    Read { request_id: u64 },
    Write { data: RegisterValue },
}

#[derive(Clone, Copy, Debug)]
struct Pending {
    target: MemoryAccessTarget,
    request: Request,
    ready_at: u64,
}

/// Completes requests `latency` ticks after they are made.
#[derive(Debug)]
pub struct FixedLatencyMemoryInterface {
    memory: SharedMemory,
    latency: u64,
    ticks: u64,
    pending: VecDeque<Pending>,
    completed: Vec<MemoryReadResult>,
}

impl FixedLatencyMemoryInterface {
    /// Creates an interface over `memory` with `latency` ticks per request.
    pub fn new(memory: SharedMemory, latency: u64) -> Self {
        Self {
            memory,
            latency: latency.max(1),
            ticks: 0,
            pending: VecDeque::new(),
            completed: Vec::new(),
        }
    }

    fn enqueue(&mut self, target: MemoryAccessTarget, request: Request) {
        self.pending.push_back(Pending {
            target,
            request,
            ready_at: self.ticks + self.latency,
        });
    }
}

impl MemoryInterface for FixedLatencyMemoryInterface {
    fn request_read(&mut self, target: MemoryAccessTarget, request_id: u64) {
        self.enqueue(target, Request::Read { request_id });
    }

    fn request_write(&mut self, target: MemoryAccessTarget, data: RegisterValue) {
        self.enqueue(target, Request::Write { data });
    }

    fn completed_reads(&self) -> &[MemoryReadResult] {
        &self.completed
    }

    fn clear_completed_reads(&mut self) {
        self.completed.clear();
    }

    fn has_pending_requests(&self) -> bool {
        !self.pending.is_empty()
    }

    fn tick(&mut self) {
        self.ticks += 1;
        while self.pending.front().is_some_and(|p| p.ready_at <= self.ticks) {
            let Some(Pending { target, request, .. }) = self.pending.pop_front() else {
                break;
            };
            match request {
                Request::Read { request_id } => {
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
                Request::Write { data } => {
                    if !self.memory.borrow_mut().write(target, data) {
                        warn!(address = target.address, size = target.size, "write outside memory");
                    }
                }
            }
        }
    }
}
