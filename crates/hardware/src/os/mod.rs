//! Process layout and syscall emulation.
//!
//! The simulated program runs without an operating system underneath it. This
//! module stands in for one:
//! 1. **Process:** [`Process`], the program image plus its heap and stack layout.
//! 2. **Kernel:** [`Kernel`], the process state syscalls act on (program break,
//!    captured output, exit code).
//! 3. **Syscalls:** [`Syscall`], a tick-driven state machine for one system call.

/// Kernel state.
pub mod kernel;
/// Program image and memory layout.
pub mod process;
/// Syscall state machine.
pub mod syscall;

pub use kernel::Kernel;
pub use process::Process;
pub use syscall::{Syscall, SyscallOutcome};
