//! Kernel state shared by every system call of a process.

use tracing::debug;

use super::process::Process;

/// Process id reported by `getpid`.
pub const PID: i64 = 0;

/// `EBADF`.
pub const EBADF: i64 = 9;
/// `EFAULT`.
pub const EFAULT: i64 = 14;

/// State of the emulated kernel for a single process.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Kernel {
    start_break: u64,
    program_break: u64,
    break_limit: u64,
    stdout: Vec<u8>,
    stderr: Vec<u8>,
    exit_code: Option<i64>,
}

impl Kernel {
    /// Creates the kernel state for `process`.
    ///
    /// The program break starts just past the initial heap data and may grow up to
    /// the stack reserve.
    pub fn new(process: &Process) -> Self {
        let start = process.heap_start() + process.heap_data().len() as u64;
        Self {
            start_break: start,
            program_break: start,
            break_limit: process.stack_limit(),
            ..Self::default()
        }
    }

    /// `brk`: moves the program break if `address` lies inside the heap.
    ///
    /// # Returns
    ///
    /// The program break after the call.
    pub fn brk(&mut self, address: u64) -> u64 {
        if address > self.start_break && address <= self.break_limit {
            self.program_break = address;
        }
        self.program_break
    }

    /// Current program break.
    pub const fn program_break(&self) -> u64 {
        self.program_break
    }

    /// `write` to a standard stream.
    ///
    /// # Returns
    ///
    /// Bytes written, or `-EBADF` for descriptors other than 1 and 2.
    pub fn write(&mut self, fd: u64, bytes: &[u8]) -> i64 {
        let stream = match fd {
            1 => &mut self.stdout,
            2 => &mut self.stderr,
            _ => return -EBADF,
        };
        stream.extend_from_slice(bytes);
        bytes.len() as i64
    }

    /// Records the exit code of the process.
    pub fn exit(&mut self, code: i64) {
        debug!(code, "process exited");
        self.exit_code = Some(code);
    }

    /// Exit code, once the process has exited.
    pub const fn exit_code(&self) -> Option<i64> {
        self.exit_code
    }

    /// Bytes written to standard output.
    pub fn stdout(&self) -> &[u8] {
        &self.stdout
    }

    /// Bytes written to standard error.
    pub fn stderr(&self) -> &[u8] {
        &self.stderr
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kernel() -> Kernel {
        Kernel::new(&Process::new(vec![0; 100], 0, 1 << 20).unwrap())
    }

    #[test]
    fn brk_zero_queries_the_break() {
        let mut kernel = kernel();
        assert_eq!(kernel.brk(0), 4096);
        assert_eq!(kernel.brk(8192), 8192);
        assert_eq!(kernel.brk(0), 8192);
    }

    #[test]
    fn brk_never_reaches_the_stack() {
        let mut kernel = kernel();
        assert_eq!(kernel.brk(1 << 20), 4096);
    }

    #[test]
    fn write_to_unknown_descriptor_fails() {
        let mut kernel = kernel();
        assert_eq!(kernel.write(7, b"x"), -EBADF);
        assert_eq!(kernel.write(1, b"hi"), 2);
        assert_eq!(kernel.stdout(), b"hi");
    }
}
