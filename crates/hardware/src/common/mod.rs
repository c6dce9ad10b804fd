//! Common utilities and types used throughout the simulator.
//!
//! This module provides fundamental building blocks that are shared across all components
//! of the simulator. It includes:
//! 1. **Error Handling:** Host-level errors and per-instruction exception kinds.
//! 2. **Register Management:** Register identifiers, values and banked register files.

/// Error types and instruction exception kinds.
pub mod error;

/// Register identifiers, values and the register file set.
pub mod reg;

pub use error::{InstructionException, Result, SimError};
pub use reg::{Register, RegisterFileSet, RegisterFileStructure, RegisterType, RegisterValue};
