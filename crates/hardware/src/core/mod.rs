//! Processor cores.
//!
//! This module contains the core models and the pieces they are built from:
//! 1. **Core trait:** [`Core`], the tick interface the simulator drives.
//! 2. **Models:** The emulation, in-order and out-of-order cores, plus
//!    [`CoreDispatch`] to hold any one of them without dynamic dispatch.
//! 3. **Pipeline:** The units both timing cores are built from, with their buffers.
//! 4. **Units:** Branch prediction and the load/store unit.
//! 5. **System:** Memory interfaces and kernel state a core runs against.

use std::collections::BTreeMap;

use crate::common::reg::RegisterFileSet;

/// Emulation, in-order and out-of-order core models.
pub mod models;

/// Pipeline units and buffers.
pub mod pipeline;

/// Memory interfaces and kernel state shared with a core.
pub mod system;

/// Branch prediction and load/store units.
pub mod units;

pub use self::models::{EmulationCore, InOrderCore, OutOfOrderCore};
pub use self::system::System;

/// A simulated processor core.
pub trait Core {
    /// Advances the core by one clock cycle.
    fn tick(&mut self, system: &mut System);

    /// Returns `true` once the core will do no more work.
    fn has_halted(&self) -> bool;

    /// Architectural register state.
    fn register_file(&self) -> &RegisterFileSet;

    /// Instructions retired so far.
    fn instructions_retired(&self) -> u64;

    /// Named statistics for reporting.
    fn stats(&self) -> BTreeMap<String, String>;
}

/// Enum wrapper for static dispatch of core models.
#[derive(Debug)]
pub enum CoreDispatch {
    /// Functional reference core.
    Emulation(Box<EmulationCore>),
    /// Pipelined in-order core.
    InOrder(Box<InOrderCore>),
    /// Renaming out-of-order core.
    OutOfOrder(Box<OutOfOrderCore>),
}

macro_rules! dispatch {
    ($self:ident, $core:ident => $body:expr) => {
        match $self {
            Self::Emulation($core) => $body,
            Self::InOrder($core) => $body,
            Self::OutOfOrder($core) => $body,
        }
    };
}

impl Core for CoreDispatch {
    #[inline(always)]
    fn tick(&mut self, system: &mut System) {
        dispatch!(self, core => core.tick(system));
    }

    #[inline(always)]
    fn has_halted(&self) -> bool {
        dispatch!(self, core => core.has_halted())
    }

    fn register_file(&self) -> &RegisterFileSet {
        dispatch!(self, core => core.register_file())
    }

    fn instructions_retired(&self) -> u64 {
        dispatch!(self, core => core.instructions_retired())
    }

    fn stats(&self) -> BTreeMap<String, String> {
        dispatch!(self, core => core.stats())
    }
}
