//! Static Branch Predictor.
//!
//! Predicts conditional branches with a fixed direction policy (always taken,
//! always not taken, backward-taken/forward-not-taken or the reverse). Unconditional
//! branches with an encoded offset are always taken, calls and returns use the
//! return address stack, and nothing is learned from outcomes.

use super::{BranchPrediction, BranchPredictor, BranchType, ras::Ras};
use crate::config::StaticPolicy;

/// Static Branch Predictor structure.
#[derive(Clone, Debug)]
pub struct StaticPredictor {
    /// Direction policy for conditional branches.
    policy: StaticPolicy,
    /// Return Address Stack for function returns.
    ras: Ras,
}

impl StaticPredictor {
    /// Creates a new Static Predictor.
    ///
    /// # Arguments
    ///
    /// * `policy` - Direction policy for conditional branches.
    /// * `ras_size` - Capacity of the RAS.
    pub fn new(policy: StaticPolicy, ras_size: usize) -> Self {
        Self {
            policy,
            ras: Ras::new(ras_size),
        }
    }

    /// Return address stack, for inspection.
    pub const fn ras(&self) -> &Ras {
        &self.ras
    }

    const fn conditional_taken(&self, offset: i64) -> bool {
        match self.policy {
            StaticPolicy::AlwaysTaken => true,
            StaticPolicy::AlwaysNotTaken => false,
            StaticPolicy::BackwardTakenForwardNotTaken => offset < 0,
            StaticPolicy::ForwardTakenBackwardNotTaken => offset > 0,
        }
    }
}

impl BranchPredictor for StaticPredictor {
    fn predict(
        &mut self,
        address: u64,
        branch_type: BranchType,
        known_offset: Option<i64>,
        instruction_size: u8,
    ) -> BranchPrediction {
        let fall_through = address.wrapping_add(u64::from(instruction_size));
        let target = known_offset.map(|offset| address.wrapping_add_signed(offset));

        match branch_type {
            BranchType::Return => self
                .ras
                .ret(address)
                .map_or(BranchPrediction::not_taken(fall_through), BranchPrediction::taken),
            BranchType::SubroutineCall => {
                self.ras.call(address, fall_through);
                target.map_or(BranchPrediction::not_taken(fall_through), BranchPrediction::taken)
            }
            BranchType::Unconditional => {
                target.map_or(BranchPrediction::not_taken(fall_through), BranchPrediction::taken)
            }
            BranchType::Conditional | BranchType::LoopClosing => match (known_offset, target) {
                (Some(offset), Some(target)) if self.conditional_taken(offset) => {
                    BranchPrediction::taken(target)
                }
                _ => BranchPrediction::not_taken(fall_through),
            },
            BranchType::Unknown => BranchPrediction::not_taken(fall_through),
        }
    }

    fn update(
        &mut self,
        address: u64,
        _taken: bool,
        _target: u64,
        branch_type: BranchType,
        _instruction_id: u64,
    ) {
        if matches!(branch_type, BranchType::Return | BranchType::SubroutineCall) {
            self.ras.retire(address);
        }
    }

    fn flush(&mut self, address: u64) {
        self.ras.rewind(address);
    }
}
