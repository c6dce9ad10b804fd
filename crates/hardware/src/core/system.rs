//! Everything outside the core: memory interfaces and the emulated kernel.

use crate::isa::exception::HandlerContext;
use crate::memory::MemoryInterface;
use crate::os::Kernel;

/// Memory interfaces and OS state shared with a core.
#[derive(Debug)]
pub struct System {
    /// Interface fetch reads instructions through.
    pub instruction_memory: Box<dyn MemoryInterface>,
    /// Interface loads, stores and syscalls use.
    pub data_memory: Box<dyn MemoryInterface>,
    /// Emulated kernel.
    pub kernel: Kernel,
}

impl System {
    /// Bundles the two interfaces with the kernel.
    pub fn new(
        instruction_memory: Box<dyn MemoryInterface>,
        data_memory: Box<dyn MemoryInterface>,
        kernel: Kernel,
    ) -> Self {
        Self {
            instruction_memory,
            data_memory,
            kernel,
        }
    }

    /// Advances both memory interfaces by one tick.
    pub fn tick(&mut self) {
        self.instruction_memory.tick();
        self.data_memory.tick();
    }

    /// Returns `true` while either interface has requests in flight.
    pub fn has_pending_requests(&self) -> bool {
        self.instruction_memory.has_pending_requests() || self.data_memory.has_pending_requests()
    }

    /// Context an exception handler runs in.
    pub fn handler_context(&mut self) -> HandlerContext<'_> {
        HandlerContext {
            memory: self.data_memory.as_mut(),
            kernel: &mut self.kernel,
        }
    }
}
