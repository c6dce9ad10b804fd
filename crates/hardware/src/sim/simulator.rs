//! Simulator: owns the core and everything it runs against.
//!
//! The simulator builds the machine described by a [`Config`] around a loaded
//! [`Process`] and drives it:
//! 1. **Construction:** Memory, memory interfaces, kernel, architecture and the
//!    configured core model.
//! 2. **Ticking:** Memory interfaces first, then the core.
//! 3. **Running:** Until the core halts or the tick limit is reached, then drains
//!    outstanding memory requests and reports.

use std::fmt;
use std::rc::Rc;

use tracing::{info, warn};

use crate::common::error::{Result, SimError};
use crate::common::reg::RegisterFileSet;
use crate::config::{Config, CoreModel, MemoryInterfaceKind};
use crate::core::{Core, CoreDispatch, EmulationCore, InOrderCore, OutOfOrderCore, System};
use crate::isa::ArchitectureWrapper;
use crate::memory::{
    FixedLatencyMemoryInterface, FlatMemoryInterface, MemoryAccessTarget, MemoryInterface,
    SharedMemory, SimpleMemory,
};
use crate::os::{Kernel, Process};
use crate::stats::SimStats;

/// Outcome of [`Simulator::run`].
#[derive(Clone, Debug)]
pub struct RunReport {
    /// Ticks, retired instructions, exit code and core counters.
    pub stats: SimStats,
    /// Bytes the program wrote to stdout.
    pub stdout: Vec<u8>,
    /// Bytes the program wrote to stderr.
    pub stderr: Vec<u8>,
    /// `false` if the run stopped at the tick limit.
    pub halted: bool,
}

impl RunReport {
    /// Ticks simulated.
    pub const fn ticks(&self) -> u64 {
        self.stats.ticks
    }

    /// Instructions retired.
    pub const fn retired(&self) -> u64 {
        self.stats.instructions_retired
    }

    /// Retired instructions per tick.
    pub fn ipc(&self) -> f64 {
        self.stats.ipc()
    }

    /// Exit code passed to `exit`, if the program exited.
    pub const fn exit_code(&self) -> Option<i64> {
        self.stats.exit_code
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.halted {
            writeln!(f, "stopped at tick limit")?;
        }
        write!(f, "{}", self.stats)
    }
}

/// Top-level simulator.
#[derive(Debug)]
pub struct Simulator {
    memory: SharedMemory,
    system: System,
    core: CoreDispatch,
    ticks: u64,
    max_ticks: Option<u64>,
}

impl Simulator {
    /// Builds the machine described by `config` and loads `process` into it.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::Config`] for an invalid configuration and
    /// [`SimError::ProgramTooLarge`] if the process does not fit in memory.
    pub fn new(config: &Config, process: &Process) -> Result<Self> {
        config.validate()?;
        if process.memory_size() > config.memory.size {
            return Err(SimError::Config(format!(
                "process laid out for {} bytes but memory has {}",
                process.memory_size(),
                config.memory.size
            )));
        }

        let mut memory = SimpleMemory::new(config.memory.size as usize);
        process.load_into(&mut memory)?;
        let memory = memory.shared();

        let interface = |kind: MemoryInterfaceKind| -> Box<dyn MemoryInterface> {
            match kind {
                MemoryInterfaceKind::Flat => Box::new(FlatMemoryInterface::new(Rc::clone(&memory))),
                MemoryInterfaceKind::FixedLatency => Box::new(FixedLatencyMemoryInterface::new(
                    Rc::clone(&memory),
                    config.memory.latency,
                )),
            }
        };
        let mut system = System::new(
            interface(config.memory.instruction_interface),
            interface(config.memory.data_interface),
            Kernel::new(process),
        );

        let isa = ArchitectureWrapper::new(config);
        let core = match config.core.model {
            CoreModel::Emulation => {
                CoreDispatch::Emulation(Box::new(EmulationCore::new(isa, process, &mut system)))
            }
            CoreModel::InOrder => CoreDispatch::InOrder(Box::new(InOrderCore::new(
                config,
                isa,
                process,
                &mut system,
            ))),
            CoreModel::OutOfOrder => CoreDispatch::OutOfOrder(Box::new(OutOfOrderCore::new(
                config,
                isa,
                process,
                &mut system,
            )?)),
        };
        info!(
            isa = ?config.core.isa,
            model = ?config.core.model,
            entry = format_args!("{:#x}", process.entry()),
            "simulator ready"
        );

        Ok(Self {
            memory,
            system,
            core,
            ticks: 0,
            max_ticks: config.core.max_ticks,
        })
    }

    /// Advances the machine by one tick.
    pub fn tick(&mut self) {
        self.system.tick();
        self.core.tick(&mut self.system);
        self.ticks += 1;
    }

    /// Runs until the core halts or the tick limit is reached.
    pub fn run(&mut self) -> RunReport {
        let mut stats = SimStats::new();
        while !self.core.has_halted() {
            if self.max_ticks.is_some_and(|max| self.ticks >= max) {
                warn!(ticks = self.ticks, "tick limit reached");
                break;
            }
            self.tick();
        }
        while self.system.has_pending_requests() {
            self.system.tick();
        }
        stats.finish();

        let kernel = &self.system.kernel;
        stats.ticks = self.ticks;
        stats.instructions_retired = self.core.instructions_retired();
        stats.core = self.core.stats();
        stats.exit_code = kernel.exit_code();
        stats.stdout_bytes = kernel.stdout().len();
        stats.stderr_bytes = kernel.stderr().len();
        info!(
            ticks = stats.ticks,
            retired = stats.instructions_retired,
            "simulation finished"
        );

        RunReport {
            stats,
            stdout: kernel.stdout().to_vec(),
            stderr: kernel.stderr().to_vec(),
            halted: self.core.has_halted(),
        }
    }

    /// Ticks simulated so far.
    pub const fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Returns `true` once the core has halted.
    pub fn has_halted(&self) -> bool {
        self.core.has_halted()
    }

    /// The core being simulated.
    pub const fn core(&self) -> &CoreDispatch {
        &self.core
    }

    /// Architectural registers of the core.
    pub fn registers(&self) -> &RegisterFileSet {
        self.core.register_file()
    }

    /// Memory, kernel and interfaces.
    pub const fn system(&self) -> &System {
        &self.system
    }

    /// Reads `size` bytes of simulated memory at `address`.
    pub fn read_memory(&self, address: u64, size: u16) -> Option<Vec<u8>> {
        self.memory
            .borrow()
            .read(MemoryAccessTarget::new(address, size))
    }
}
