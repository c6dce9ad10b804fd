//! # Common Test Utilities
//!
//! Shared helpers for the simulator test suite.

/// Instruction word encoders for both architectures.
pub mod encode;

/// Configuration builders and program runners.
pub mod harness;
