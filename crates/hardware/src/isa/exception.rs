//! Exception handling protocol.
//!
//! When a micro-op carrying an exception reaches the point where it would commit,
//! the core asks its architecture for an [`ExceptionHandler`] and ticks it until it
//! reports completion. The handler then exposes an [`ExceptionResult`]:
//! 1. **Fatal:** the core halts.
//! 2. **Recoverable:** the core applies the [`ProcessStateChange`] and resumes at
//!    `instruction_address`.
//!
//! Each architecture supplies its own handler ([`RiscvExceptionHandler`],
//! [`Aarch64ExceptionHandler`]); this module holds the shared result types and the
//! syscall driver both of them use.

use tracing::debug;

use crate::common::error::InstructionException;
use crate::common::reg::{Register, RegisterFileSet, RegisterValue};
use crate::isa::aarch64::exception::Aarch64ExceptionHandler;
use crate::isa::riscv::exception::RiscvExceptionHandler;
use crate::memory::{MemoryAccessTarget, MemoryInterface};
use crate::os::{Kernel, Syscall, SyscallOutcome};

/// Register and memory updates a handler asks the core to perform.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProcessStateChange {
    /// Registers to overwrite, with their new values.
    pub registers: Vec<(Register, RegisterValue)>,
    /// Memory writes to issue through the data interface.
    pub memory_writes: Vec<(MemoryAccessTarget, RegisterValue)>,
}

impl ProcessStateChange {
    /// Applies the register part of the change.
    pub fn apply_registers(&self, registers: &mut RegisterFileSet) {
        for &(reg, value) in &self.registers {
            registers.set(reg, value);
        }
    }

    /// Issues the memory part of the change.
    pub fn apply_memory(&self, memory: &mut dyn MemoryInterface) {
        for &(target, value) in &self.memory_writes {
            memory.request_write(target, value);
        }
    }
}

/// Outcome of a completed exception handler.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExceptionResult {
    /// The program cannot continue.
    pub fatal: bool,
    /// Address to resume at (the faulting address when fatal).
    pub instruction_address: u64,
    /// State updates to apply before resuming.
    pub state_change: ProcessStateChange,
}

impl ExceptionResult {
    /// A fatal result for the instruction at `address`.
    pub fn fatal(address: u64) -> Self {
        Self {
            fatal: true,
            instruction_address: address,
            state_change: ProcessStateChange::default(),
        }
    }
}

/// What a handler needs from the core while it runs.
#[derive(Debug)]
pub struct HandlerContext<'a> {
    /// Data memory interface.
    pub memory: &'a mut dyn MemoryInterface,
    /// OS state.
    pub kernel: &'a mut Kernel,
}

/// A supervisor call in progress, with where its result goes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct PendingSyscall {
    syscall: Syscall,
    result_register: Register,
    address: u64,
    resume_address: u64,
}

impl PendingSyscall {
    pub(crate) const fn new(
        syscall: Syscall,
        result_register: Register,
        address: u64,
        resume_address: u64,
    ) -> Self {
        Self {
            syscall,
            result_register,
            address,
            resume_address,
        }
    }

    /// Ticks the call; `None` while it still waits on memory.
    pub(crate) fn tick(&mut self, ctx: &mut HandlerContext<'_>) -> Option<ExceptionResult> {
        let number = self.syscall.number();
        let outcome = self.syscall.tick(ctx.memory, ctx.kernel)?;
        let result = match outcome {
            SyscallOutcome::Return(value) => ExceptionResult {
                fatal: false,
                instruction_address: self.resume_address,
                state_change: ProcessStateChange {
                    registers: vec![(self.result_register, RegisterValue::from(value as u64))],
                    memory_writes: Vec::new(),
                },
            },
            SyscallOutcome::Exit(_) | SyscallOutcome::Unsupported(_) => {
                ExceptionResult::fatal(self.address)
            }
        };
        debug!(
            syscall = number,
            fatal = result.fatal,
            resume = format_args!("{:#x}", result.instruction_address),
            "exception handled"
        );
        Some(result)
    }
}

/// Tick-driven handler for one excepting micro-op, per architecture.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExceptionHandler {
    /// RISC-V trap handling.
    Riscv(RiscvExceptionHandler),
    /// AArch64 exception handling.
    Aarch64(Aarch64ExceptionHandler),
}

macro_rules! dispatch {
    ($self:ident, $handler:ident => $body:expr) => {
        match $self {
            Self::Riscv($handler) => $body,
            Self::Aarch64($handler) => $body,
        }
    };
}

impl ExceptionHandler {
    /// Exception being handled.
    pub const fn exception(&self) -> InstructionException {
        match self {
            Self::Riscv(handler) => handler.exception(),
            Self::Aarch64(handler) => handler.exception(),
        }
    }

    /// Advances the handler by one tick.
    ///
    /// # Returns
    ///
    /// `true` once the handler has finished and [`Self::result`] is available.
    pub fn tick(&mut self, ctx: &mut HandlerContext<'_>) -> bool {
        dispatch!(self, handler => handler.tick(ctx))
    }

    /// Result of a finished handler.
    pub const fn result(&self) -> Option<&ExceptionResult> {
        match self {
            Self::Riscv(handler) => handler.result(),
            Self::Aarch64(handler) => handler.result(),
        }
    }
}
