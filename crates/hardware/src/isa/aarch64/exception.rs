//! AArch64 exception handling.
//!
//! `svc` follows the Linux convention: number in `x8`, arguments in `x0`-`x5`,
//! result in `x0`. Every other exception is fatal and is reported with the
//! `ESR_EL1` exception class it would be taken with.

use tracing::error;

use crate::common::error::InstructionException;
use crate::common::reg::{Register, RegisterFileSet};
use crate::isa::exception::{ExceptionResult, HandlerContext, PendingSyscall};
use crate::isa::instruction::Instruction;
use crate::os::Syscall;

/// `x8`, the syscall number register.
const SYSCALL_NUMBER: Register = Register::general(8);

/// Exception class (`ESR_ELx.EC`) of an exception.
pub const fn exception_class(exception: InstructionException) -> u8 {
    match exception {
        InstructionException::EncodingUnallocated
        | InstructionException::UnmappedSystemRegister
        | InstructionException::NoAvailablePort => 0x00,
        InstructionException::SupervisorCall => 0x15,
        InstructionException::MisalignedPc => 0x22,
        InstructionException::DataAbort | InstructionException::AlignmentFault => 0x24,
        InstructionException::Breakpoint => 0x3C,
    }
}

/// Handler for one AArch64 exception.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Aarch64ExceptionHandler {
    exception: InstructionException,
    address: u64,
    syscall: Option<PendingSyscall>,
    result: Option<ExceptionResult>,
}

impl Aarch64ExceptionHandler {
    /// Creates the handler for the exception carried by `instruction`.
    pub fn new(instruction: &Instruction, registers: &RegisterFileSet) -> Self {
        let exception = instruction
            .exception()
            .unwrap_or(InstructionException::EncodingUnallocated);
        let syscall = (exception == InstructionException::SupervisorCall).then(|| {
            let args: [u64; 6] =
                std::array::from_fn(|i| registers.get(Register::general(i as u16)).get());
            PendingSyscall::new(
                Syscall::new(registers.get(SYSCALL_NUMBER).get(), args),
                Register::general(0),
                instruction.instruction_address(),
                instruction.next_address(),
            )
        });
        Self {
            exception,
            address: instruction.instruction_address(),
            syscall,
            result: None,
        }
    }

    /// Exception being handled.
    pub const fn exception(&self) -> InstructionException {
        self.exception
    }

    /// Advances the handler; `true` once the result is available.
    pub fn tick(&mut self, ctx: &mut HandlerContext<'_>) -> bool {
        if self.result.is_some() {
            return true;
        }
        let Some(syscall) = &mut self.syscall else {
            error!(
                exception = %self.exception,
                class = format_args!("{:#04x}", exception_class(self.exception)),
                address = format_args!("{:#x}", self.address),
                "fatal exception"
            );
            self.result = Some(ExceptionResult::fatal(self.address));
            return true;
        };
        self.result = syscall.tick(ctx);
        self.result.is_some()
    }

    /// Result of a finished handler.
    pub const fn result(&self) -> Option<&ExceptionResult> {
        self.result.as_ref()
    }
}
