//! System call emulation.
//!
//! A [`Syscall`] is created from the syscall number and argument registers and
//! ticked until it produces an outcome. Calls that touch simulated memory issue
//! their reads through the data memory interface and may take several ticks.
//!
//! Supported calls use the Linux generic numbering:
//! 1. **I/O:** `write` to stdout and stderr.
//! 2. **Process:** `exit`, `exit_group`, `getpid`, `gettid` and the uid/gid queries.
//! 3. **Memory:** `brk`.

use tracing::{trace, warn};

use crate::memory::{MemoryAccessTarget, MemoryInterface};

use super::kernel::{EFAULT, Kernel, PID};

/// `write(fd, buf, count)`.
pub const WRITE: u64 = 64;
/// `exit(code)`.
pub const EXIT: u64 = 93;
/// `exit_group(code)`.
pub const EXIT_GROUP: u64 = 94;
/// `getpid()`.
pub const GETPID: u64 = 172;
/// `getuid()`.
pub const GETUID: u64 = 174;
/// `geteuid()`.
pub const GETEUID: u64 = 175;
/// `getgid()`.
pub const GETGID: u64 = 176;
/// `getegid()`.
pub const GETEGID: u64 = 177;
/// `gettid()`.
pub const GETTID: u64 = 178;
/// `brk(address)`.
pub const BRK: u64 = 214;

/// Largest read issued for a `write` buffer.
const CHUNK_SIZE: u64 = 128;

/// Longest buffer a single `write` transfers; longer writes are partial.
const MAX_WRITE: u64 = 1 << 20;

/// Request ids at the top of the id space, clear of micro-op sequence ids.
const REQUEST_ID_BASE: u64 = u64::MAX - (MAX_WRITE / CHUNK_SIZE);

/// How a finished system call ends.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyscallOutcome {
    /// Resume the program with this value in the return register.
    Return(i64),
    /// The process exited with this code.
    Exit(i64),
    /// The call is not implemented.
    Unsupported(u64),
}

/// Buffer transfer of an in-progress `write`.
#[derive(Clone, Debug, PartialEq, Eq)]
struct Transfer {
    fd: u64,
    chunks: Vec<MemoryAccessTarget>,
    data: Vec<Option<Vec<u8>>>,
    faulted: bool,
    requested: bool,
}

impl Transfer {
    fn new(fd: u64, address: u64, count: u64) -> Self {
        let count = count.min(MAX_WRITE);
        let chunks: Vec<_> = (0..count)
            .step_by(CHUNK_SIZE as usize)
            .map(|offset| {
                let size = (count - offset).min(CHUNK_SIZE) as u16;
                MemoryAccessTarget::new(address.wrapping_add(offset), size)
            })
            .collect();
        let data = vec![None; chunks.len()];
        Self {
            fd,
            chunks,
            data,
            faulted: false,
            requested: false,
        }
    }

    /// Issues the reads on the first tick and collects completions after that.
    ///
    /// # Returns
    ///
    /// `true` once every chunk has arrived.
    fn tick(&mut self, memory: &mut dyn MemoryInterface) -> bool {
        if !self.requested {
            for (i, chunk) in self.chunks.iter().enumerate() {
                memory.request_read(*chunk, REQUEST_ID_BASE + i as u64);
            }
            self.requested = true;
        }

        for read in memory.completed_reads() {
            let Some(index) = read.request_id.checked_sub(REQUEST_ID_BASE) else {
                continue;
            };
            let Some(slot) = self.data.get_mut(index as usize) else {
                continue;
            };
            match &read.data {
                Some(bytes) => *slot = Some(bytes.clone()),
                None => {
                    self.faulted = true;
                    *slot = Some(Vec::new());
                }
            }
        }
        memory.clear_completed_reads();

        self.data.iter().all(Option::is_some)
    }

    fn bytes(&self) -> Vec<u8> {
        self.data.iter().flatten().flatten().copied().collect()
    }
}

/// One system call in progress.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Syscall {
    number: u64,
    args: [u64; 6],
    transfer: Option<Transfer>,
}

impl Syscall {
    /// Creates the call from its number and the six argument registers.
    pub fn new(number: u64, args: [u64; 6]) -> Self {
        let transfer = (number == WRITE && args[2] > 0)
            .then(|| Transfer::new(args[0], args[1], args[2]));
        Self {
            number,
            args,
            transfer,
        }
    }

    /// Syscall number.
    pub const fn number(&self) -> u64 {
        self.number
    }

    /// Advances the call by one tick.
    ///
    /// # Arguments
    ///
    /// * `memory` - Data memory interface used to read user buffers.
    /// * `kernel` - Kernel state the call acts on.
    ///
    /// # Returns
    ///
    /// `None` while memory accesses are outstanding, otherwise the outcome.
    pub fn tick(
        &mut self,
        memory: &mut dyn MemoryInterface,
        kernel: &mut Kernel,
    ) -> Option<SyscallOutcome> {
        let [a0, ..] = self.args;
        let outcome = match self.number {
            WRITE => match &mut self.transfer {
                None => SyscallOutcome::Return(0),
                Some(transfer) => {
                    if !transfer.tick(memory) {
                        return None;
                    }
                    if transfer.faulted {
                        warn!(fd = transfer.fd, "write from unmapped buffer");
                        SyscallOutcome::Return(-EFAULT)
                    } else {
                        SyscallOutcome::Return(kernel.write(transfer.fd, &transfer.bytes()))
                    }
                }
            },
            EXIT | EXIT_GROUP => {
                let code = a0 as i64;
                kernel.exit(code);
                SyscallOutcome::Exit(code)
            }
            BRK => SyscallOutcome::Return(kernel.brk(a0) as i64),
            GETPID => SyscallOutcome::Return(PID),
            GETTID | GETUID | GETEUID | GETGID | GETEGID => SyscallOutcome::Return(0),
            number => {
                warn!(number, "unsupported syscall");
                SyscallOutcome::Unsupported(number)
            }
        };
        trace!(number = self.number, ?outcome, "syscall");
        Some(outcome)
    }
}
