//! # Unit and Program Tests
//!
//! Component tests drive a single unit through its public interface; program
//! tests assemble a few instructions and run them on every core model.

/// AArch64 programs on every core.
pub mod aarch64_programs;

/// Configuration parsing and validation.
pub mod config;

/// Core internals: exception flushes, port faults, loop buffer.
pub mod cores;

/// Decode cache, group classification and the decode unit.
pub mod decode;

/// Fetch unit: block cache, boundary crossing, redirects and the loop buffer.
pub mod fetch;

/// Memory interfaces.
pub mod memory;

/// Every core model agrees on architectural results.
pub mod parity;

/// Static and gshare predictors through the configured wrapper.
pub mod predictors;

/// RISC-V programs on every core.
pub mod riscv_programs;

/// System calls and exceptions.
pub mod syscalls;
