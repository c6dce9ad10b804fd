//! GShare Branch Predictor.
//!
//! GShare correlates global branch history with the program counter using an XOR
//! hash. This allows the predictor to distinguish the same branch instruction
//! in different execution contexts. Targets of register-indirect branches come from
//! a BTB and returns use the return address stack.
//!
//! # Performance
//!
//! - **Time Complexity:** `predict()` and `update()` are O(1)
//! - **Space Complexity:** O(2^N) 2-bit counters where N is the history length

use super::{BranchPrediction, BranchPredictor, BranchType, btb::Btb, ras::Ras};

/// GShare Predictor structure.
#[derive(Clone, Debug)]
pub struct GSharePredictor {
    /// Global History Register storing resolved branch outcomes.
    ghr: u64,
    /// Index mask (table size - 1).
    mask: u64,
    /// Pattern History Table containing 2-bit saturating counters.
    pht: Vec<u8>,
    /// Branch Target Buffer.
    btb: Btb,
    /// Return Address Stack.
    ras: Ras,
}

impl GSharePredictor {
    /// Creates a new GShare Predictor.
    ///
    /// # Arguments
    ///
    /// * `history_bits` - Global history length; the PHT has `2^history_bits` counters.
    /// * `btb_size` - Number of entries in the BTB.
    /// * `ras_size` - Capacity of the RAS.
    pub fn new(history_bits: u32, btb_size: usize, ras_size: usize) -> Self {
        let size = 1usize << history_bits;
        Self {
            ghr: 0,
            mask: (size as u64) - 1,
            pht: vec![1; size],
            btb: Btb::new(btb_size),
            ras: Ras::new(ras_size),
        }
    }

    /// Calculates the index into the Pattern History Table.
    ///
    /// Computes the XOR of the PC (shifted) and the Global History Register.
    const fn index(&self, pc: u64) -> usize {
        (((pc >> 1) ^ self.ghr) & self.mask) as usize
    }

    /// Counter value used for the branch at `pc` under the current history.
    pub fn counter(&self, pc: u64) -> u8 {
        self.pht[self.index(pc)]
    }
}

impl BranchPredictor for GSharePredictor {
    fn predict(
        &mut self,
        address: u64,
        branch_type: BranchType,
        known_offset: Option<i64>,
        instruction_size: u8,
    ) -> BranchPrediction {
        let fall_through = address.wrapping_add(u64::from(instruction_size));
        let target = known_offset
            .map(|offset| address.wrapping_add_signed(offset))
            .or_else(|| self.btb.lookup(address));

        match branch_type {
            BranchType::Return => self
                .ras
                .ret(address)
                .or(target)
                .map_or(BranchPrediction::not_taken(fall_through), BranchPrediction::taken),
            BranchType::SubroutineCall => {
                self.ras.call(address, fall_through);
                target.map_or(BranchPrediction::not_taken(fall_through), BranchPrediction::taken)
            }
            BranchType::Unconditional => {
                target.map_or(BranchPrediction::not_taken(fall_through), BranchPrediction::taken)
            }
            BranchType::Conditional | BranchType::LoopClosing => match target {
                Some(target) if self.counter(address) >= 2 => BranchPrediction::taken(target),
                _ => BranchPrediction::not_taken(fall_through),
            },
            BranchType::Unknown => BranchPrediction::not_taken(fall_through),
        }
    }

    /// Updates the 2-bit saturating counter in the PHT, shifts the outcome into the
    /// Global History Register and records taken targets in the BTB.
    fn update(
        &mut self,
        address: u64,
        taken: bool,
        target: u64,
        branch_type: BranchType,
        _instruction_id: u64,
    ) {
        if matches!(branch_type, BranchType::Return | BranchType::SubroutineCall) {
            self.ras.retire(address);
        }

        let idx = self.index(address);
        let counter = self.pht[idx];
        if taken && counter < 3 {
            self.pht[idx] += 1;
        } else if !taken && counter > 0 {
            self.pht[idx] -= 1;
        }
        self.ghr = ((self.ghr << 1) | u64::from(taken)) & self.mask;

        if taken {
            self.btb.update(address, target);
        }
    }

    fn flush(&mut self, address: u64) {
        self.ras.rewind(address);
    }
}
