//! Pipelined processor simulator library.
//!
//! This crate implements a cycle-approximate simulator for RISC-V (RV64IMAC) and an
//! integer subset of AArch64 with the following:
//! 1. **Core:** Fetch unit with a block cache, decode unit with early misprediction
//!    detection, an in-order execute/writeback pipeline and an emulation reference core.
//! 2. **Branch prediction:** Static and gshare predictors with a return-address stack.
//! 3. **ISA:** Predecode, micro-op representation, group classification and
//!    execution-info lookup for both architectures.
//! 4. **Memory:** Flat and fixed-latency memory interfaces over a simple byte store.
//! 5. **OS:** Process layout and a small Linux syscall layer driven by exception handlers.
//! 6. **Simulation:** Loader, configuration, driver loop and statistics reporting.

/// Common types (registers, register values, errors).
pub mod common;
/// Simulator configuration (defaults, enums, hierarchical config structures).
pub mod config;
/// Cores, pipeline stages and functional units.
pub mod core;
/// Instruction sets (architecture trait, micro-ops, RISC-V, AArch64).
pub mod isa;
/// Memory store and memory interfaces.
pub mod memory;
/// Process layout and syscall emulation.
pub mod os;
/// Program loader and simulation driver.
pub mod sim;
/// Simulation statistics collection and reporting.
pub mod stats;

/// Root configuration type; use `Config::default()` or deserialize from JSON.
pub use crate::config::Config;
/// Core abstraction shared by the emulation and in-order models.
pub use crate::core::Core;
/// Simulation driver; construct with `Simulator::new`.
pub use crate::sim::Simulator;
