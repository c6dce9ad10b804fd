//! Program loading and the simulation driver.
//!
//! Provides the loader that turns a file into a process and the [`Simulator`]
//! that builds a machine around it and runs it.

/// ELF and flat-binary loading.
pub mod loader;

/// Simulation driver and run report.
pub mod simulator;

pub use loader::load_program;
pub use simulator::{RunReport, Simulator};
