//! RISC-V trap handling.
//!
//! `ecall` follows the Linux convention: number in `a7`, arguments in `a0`-`a5`,
//! result in `a0`. Every other trap is fatal and is reported with its `mcause`
//! code.

use tracing::error;

use crate::common::error::InstructionException;
use crate::common::reg::{Register, RegisterFileSet};
use crate::isa::exception::{ExceptionResult, HandlerContext, PendingSyscall};
use crate::isa::instruction::Instruction;
use crate::os::Syscall;

/// `a7`, the syscall number register.
const SYSCALL_NUMBER: Register = Register::general(17);

/// `a0`, the first argument and the result register.
const A0: u16 = 10;

/// `mcause` exception code of a trap.
pub const fn cause(exception: InstructionException) -> u64 {
    match exception {
        InstructionException::MisalignedPc => 0,
        InstructionException::EncodingUnallocated
        | InstructionException::UnmappedSystemRegister
        | InstructionException::NoAvailablePort => 2,
        InstructionException::Breakpoint => 3,
        InstructionException::AlignmentFault => 6,
        InstructionException::DataAbort => 7,
        InstructionException::SupervisorCall => 8,
    }
}

/// Handler for one RISC-V trap.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RiscvExceptionHandler {
    exception: InstructionException,
    address: u64,
    syscall: Option<PendingSyscall>,
    result: Option<ExceptionResult>,
}

impl RiscvExceptionHandler {
    /// Creates the handler for the trap carried by `instruction`.
    pub fn new(instruction: &Instruction, registers: &RegisterFileSet) -> Self {
        let exception = instruction
            .exception()
            .unwrap_or(InstructionException::EncodingUnallocated);
        let syscall = (exception == InstructionException::SupervisorCall).then(|| {
            let args: [u64; 6] =
                std::array::from_fn(|i| registers.get(Register::general(A0 + i as u16)).get());
            PendingSyscall::new(
                Syscall::new(registers.get(SYSCALL_NUMBER).get(), args),
                Register::general(A0),
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

    /// Trap being handled.
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
                mcause = cause(self.exception),
                address = format_args!("{:#x}", self.address),
                "fatal trap"
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn causes_follow_the_privileged_encoding() {
        assert_eq!(cause(InstructionException::MisalignedPc), 0);
        assert_eq!(cause(InstructionException::EncodingUnallocated), 2);
        assert_eq!(cause(InstructionException::SupervisorCall), 8);
    }
}
