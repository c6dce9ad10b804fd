//! Branch Target Buffer (BTB).
//!
//! The BTB is a direct-mapped cache that stores target addresses for control flow
//! instructions whose target is not known at fetch (register-indirect jumps), so the
//! fetch stage can redirect before the target register is read.

/// An entry in the Branch Target Buffer.
#[derive(Clone, Copy, Debug, Default)]
struct BtbEntry {
    /// The full branch address, used to verify a hit.
    tag: u64,
    /// The predicted target address.
    target: u64,
    /// Indicates if this entry contains valid data.
    valid: bool,
}

/// Branch Target Buffer structure.
#[derive(Clone, Debug)]
pub struct Btb {
    /// The table of BTB entries.
    table: Vec<BtbEntry>,
    /// Index mask (entries - 1).
    mask: usize,
}

impl Btb {
    /// Creates a BTB with `size` entries, rounded up to a power of two.
    pub fn new(size: usize) -> Self {
        let size = size.max(1).next_power_of_two();
        Self {
            table: vec![BtbEntry::default(); size],
            mask: size - 1,
        }
    }

    /// Index for a branch address. Instructions are at least two bytes apart.
    const fn index(&self, pc: u64) -> usize {
        ((pc >> 1) as usize) & self.mask
    }

    /// Looks up a target address for the given program counter.
    ///
    /// # Returns
    ///
    /// The predicted target address if a valid entry exists and the tag matches,
    /// otherwise `None`.
    pub fn lookup(&self, pc: u64) -> Option<u64> {
        let e = self.table[self.index(pc)];
        (e.valid && e.tag == pc).then_some(e.target)
    }

    /// Updates the BTB with a new target address for a specific program counter.
    pub fn update(&mut self, pc: u64, target: u64) {
        let idx = self.index(pc);
        self.table[idx] = BtbEntry {
            tag: pc,
            target,
            valid: true,
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aliasing_entry_misses_on_tag() {
        let mut btb = Btb::new(4);
        btb.update(0x10, 0x80);
        assert_eq!(btb.lookup(0x10), Some(0x80));
        // 0x18 maps to the same slot as 0x10 in a four-entry table.
        assert_eq!(btb.lookup(0x18), None);
        btb.update(0x18, 0x90);
        assert_eq!(btb.lookup(0x10), None);
    }
}
