//! Functional units shared by the cores.
//!
//! This module contains the branch prediction unit and the load/store unit.

/// Branch predictors, BTB and return-address stack.
pub mod bru;

/// Load/store unit: store commit and load-reserved/store-conditional monitoring.
pub mod lsu;
