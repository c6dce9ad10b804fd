//! Branch Predictor Interface.
//!
//! This module defines the `BranchPredictor` trait that all branch prediction
//! implementations must adhere to, together with the branch classification and
//! prediction record exchanged between fetch, decode and execute.

/// Control-flow class of a branch micro-op, decided by the decoder.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum BranchType {
    /// Direction depends on a condition.
    Conditional,
    /// Conditional branch that closes a loop.
    LoopClosing,
    /// Function return (target on the return-address stack).
    Return,
    /// Function call (pushes the return address).
    SubroutineCall,
    /// Always taken.
    Unconditional,
    /// Not a branch.
    #[default]
    Unknown,
}

/// Direction and target predicted for a micro-op at fetch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct BranchPrediction {
    /// Predicted taken.
    pub is_taken: bool,
    /// Predicted target when taken.
    pub target: u64,
}

impl BranchPrediction {
    /// A taken prediction to `target`.
    pub const fn taken(target: u64) -> Self {
        Self {
            is_taken: true,
            target,
        }
    }

    /// A not-taken prediction; `fall_through` is recorded as the target.
    pub const fn not_taken(fall_through: u64) -> Self {
        Self {
            is_taken: false,
            target: fall_through,
        }
    }
}

/// Trait for branch prediction algorithms.
///
/// Predictions are made at fetch and are speculative; `update` is called once per
/// resolved branch and `flush` once per branch that is discarded, youngest first.
/// The in-order core resolves branches in program order; the out-of-order core
/// resolves them as they execute, so updates may arrive out of order.
pub trait BranchPredictor {
    /// Predicts whether a branch instruction will be taken and its target address.
    ///
    /// # Arguments
    ///
    /// * `address` - Address of the branch instruction
    /// * `branch_type` - Class of the branch
    /// * `known_offset` - PC-relative offset when the target is encoded in the instruction
    /// * `instruction_size` - Size of the branch in bytes (for return addresses)
    fn predict(
        &mut self,
        address: u64,
        branch_type: BranchType,
        known_offset: Option<i64>,
        instruction_size: u8,
    ) -> BranchPrediction;

    /// Trains the predictor with a resolved outcome.
    ///
    /// # Arguments
    ///
    /// * `address` - Address of the branch instruction
    /// * `taken` - Whether the branch was actually taken
    /// * `target` - The resolved target (or redirect) address
    /// * `branch_type` - Class of the branch
    /// * `instruction_id` - Id of the owning macro-op
    fn update(
        &mut self,
        address: u64,
        taken: bool,
        target: u64,
        branch_type: BranchType,
        instruction_id: u64,
    );

    /// Discards speculative state created when predicting the branch at `address`.
    fn flush(&mut self, address: u64);
}
