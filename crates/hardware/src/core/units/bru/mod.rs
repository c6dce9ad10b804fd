//! Branch prediction unit (BRU) implementations.
//!
//! This module contains the branch predictor interface, a static predictor, a
//! gshare predictor, the branch target buffer (BTB) and the return address
//! stack (RAS).

pub use self::branch_predictor::{BranchPrediction, BranchPredictor, BranchType};

/// Branch predictor trait and the prediction record.
pub mod branch_predictor;

/// Branch Target Buffer for storing predicted branch targets.
pub mod btb;

/// Global history branch predictor (gshare algorithm).
pub mod gshare;

/// Return Address Stack for predicting return addresses.
pub mod ras;

/// Static branch predictor with a configurable direction policy.
pub mod static_bp;

use self::{gshare::GSharePredictor, static_bp::StaticPredictor};
use crate::config::{BranchPredictorConfig, PredictorKind};

/// Enum wrapper for static dispatch of Branch Predictors.
/// This avoids vtable lookups in the fetch loop.
#[derive(Clone, Debug)]
pub enum BranchPredictorWrapper {
    /// Fixed-policy predictor.
    Static(StaticPredictor),
    /// Global-history predictor.
    GShare(GSharePredictor),
}

impl BranchPredictorWrapper {
    /// Creates a new branch predictor wrapper based on configuration.
    pub fn new(config: &BranchPredictorConfig) -> Self {
        match config.kind {
            PredictorKind::Static => {
                Self::Static(StaticPredictor::new(config.static_policy, config.ras_size))
            }
            PredictorKind::GShare => Self::GShare(GSharePredictor::new(
                config.history_bits,
                config.btb_size,
                config.ras_size,
            )),
        }
    }
}

impl BranchPredictor for BranchPredictorWrapper {
    #[inline(always)]
    fn predict(
        &mut self,
        address: u64,
        branch_type: BranchType,
        known_offset: Option<i64>,
        instruction_size: u8,
    ) -> BranchPrediction {
        match self {
            Self::Static(bp) => bp.predict(address, branch_type, known_offset, instruction_size),
            Self::GShare(bp) => bp.predict(address, branch_type, known_offset, instruction_size),
        }
    }

    #[inline(always)]
    fn update(
        &mut self,
        address: u64,
        taken: bool,
        target: u64,
        branch_type: BranchType,
        instruction_id: u64,
    ) {
        match self {
            Self::Static(bp) => bp.update(address, taken, target, branch_type, instruction_id),
            Self::GShare(bp) => bp.update(address, taken, target, branch_type, instruction_id),
        }
    }

    #[inline(always)]
    fn flush(&mut self, address: u64) {
        match self {
            Self::Static(bp) => bp.flush(address),
            Self::GShare(bp) => bp.flush(address),
        }
    }
}
