//! Register alias table.
//!
//! Maps every architectural register to the physical register holding its
//! youngest value. Renaming a destination takes a register off the bank's free
//! list and remembers the mapping it replaced:
//! - commit frees the replaced register, which no later reader can name,
//! - rewind (a flush, youngest first) restores the replaced mapping and frees the
//!   renamed register.
//!
//! The committed mapping is tracked as well, so the core can tell whether an
//! architectural register has a renamed writer in flight.

use std::collections::VecDeque;

use crate::common::reg::{Register, RegisterFileStructure, RegisterType};

#[derive(Clone, Debug, Default)]
struct Bank {
    mapping: Vec<u16>,
    committed: Vec<u16>,
    /// Physical register to the mapping it replaced.
    history: Vec<u16>,
    /// Physical register to the architectural tag it holds.
    owner: Vec<u16>,
    free: VecDeque<u16>,
}

impl Bank {
    fn new(architectural: u16, physical: u16) -> Self {
        let mut bank = Self {
            mapping: Vec::new(),
            committed: Vec::new(),
            history: vec![0; usize::from(physical)],
            owner: vec![0; usize::from(physical)],
            free: VecDeque::new(),
        };
        bank.reset(architectural, physical);
        bank
    }

    fn reset(&mut self, architectural: u16, physical: u16) {
        self.mapping = (0..architectural).collect();
        self.committed = self.mapping.clone();
        for (tag, owner) in self.owner.iter_mut().enumerate().take(usize::from(architectural)) {
            *owner = tag as u16;
        }
        self.free = (architectural..physical).collect();
    }
}

/// Architectural-to-physical register mapping with a free list per bank.
#[derive(Clone, Debug)]
pub struct RegisterAliasTable {
    banks: Vec<Bank>,
}

impl RegisterAliasTable {
    /// Creates an identity mapping.
    ///
    /// # Arguments
    ///
    /// * `architectural` - Architectural bank shapes, in [`RegisterType::index`] order.
    /// * `physical` - Physical registers per bank; each must exceed the
    ///   architectural count of a non-empty bank.
    pub fn new(architectural: &[RegisterFileStructure], physical: &[u16]) -> Self {
        Self {
            banks: architectural
                .iter()
                .zip(physical)
                .map(|(arch, &phys)| Bank::new(arch.quantity, phys.max(arch.quantity)))
                .collect(),
        }
    }

    fn bank(&self, kind: RegisterType) -> Option<&Bank> {
        self.banks.get(kind.index())
    }

    /// Physical register currently holding `reg`.
    pub fn map(&self, reg: Register) -> Register {
        let tag = self
            .bank(reg.kind)
            .and_then(|bank| bank.mapping.get(usize::from(reg.tag)))
            .copied()
            .unwrap_or(reg.tag);
        Register { kind: reg.kind, tag }
    }

    /// Architectural register a physical register was allocated for.
    pub fn architectural(&self, physical: Register) -> Register {
        let tag = self
            .bank(physical.kind)
            .and_then(|bank| bank.owner.get(usize::from(physical.tag)))
            .copied()
            .unwrap_or(physical.tag);
        Register {
            kind: physical.kind,
            tag,
        }
    }

    /// Free physical registers of `kind`.
    pub fn free_registers(&self, kind: RegisterType) -> usize {
        self.bank(kind).map_or(0, |bank| bank.free.len())
    }

    /// Returns `true` if `reg` has no renamed writer in flight.
    pub fn is_committed(&self, reg: Register) -> bool {
        self.bank(reg.kind).is_none_or(|bank| {
            bank.mapping.get(usize::from(reg.tag)) == bank.committed.get(usize::from(reg.tag))
        })
    }

    /// Allocates a fresh physical register for a write to `reg`.
    ///
    /// # Returns
    ///
    /// The physical register, or `None` if the bank's free list is empty.
    pub fn allocate(&mut self, reg: Register) -> Option<Register> {
        let bank = self.banks.get_mut(reg.kind.index())?;
        let arch = usize::from(reg.tag);
        let previous = *bank.mapping.get(arch)?;
        let physical = bank.free.pop_front()?;
        bank.history[usize::from(physical)] = previous;
        bank.owner[usize::from(physical)] = reg.tag;
        bank.mapping[arch] = physical;
        Some(Register {
            kind: reg.kind,
            tag: physical,
        })
    }

    /// Commits the rename to `physical`, freeing the register it replaced.
    pub fn commit(&mut self, physical: Register) {
        let Some(bank) = self.banks.get_mut(physical.kind.index()) else {
            return;
        };
        let phys = usize::from(physical.tag);
        let arch = usize::from(bank.owner[phys]);
        bank.free.push_back(bank.history[phys]);
        bank.committed[arch] = physical.tag;
    }

    /// Undoes the rename to `physical`; flushed writers are rewound youngest first.
    pub fn rewind(&mut self, physical: Register) {
        let Some(bank) = self.banks.get_mut(physical.kind.index()) else {
            return;
        };
        let phys = usize::from(physical.tag);
        let arch = usize::from(bank.owner[phys]);
        bank.mapping[arch] = bank.history[phys];
        bank.free.push_front(physical.tag);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> RegisterAliasTable {
        RegisterAliasTable::new(
            &[RegisterFileStructure {
                bytes: 8,
                quantity: 4,
            }],
            &[6],
        )
    }

    #[test]
    fn rename_then_commit_frees_previous_mapping() {
        let mut rat = table();
        let r1 = Register::general(1);
        assert_eq!(rat.free_registers(RegisterType::General), 2);

        let p = rat.allocate(r1).unwrap();
        assert_eq!(p, Register::general(4));
        assert_eq!(rat.map(r1), p);
        assert_eq!(rat.architectural(p), r1);
        assert!(!rat.is_committed(r1));

        rat.commit(p);
        assert!(rat.is_committed(r1));
        assert_eq!(rat.free_registers(RegisterType::General), 2);
        assert_eq!(rat.allocate(Register::general(2)), Some(Register::general(5)));
        assert_eq!(rat.allocate(Register::general(3)), Some(Register::general(1)));
    }

    #[test]
    fn rewind_restores_mappings_youngest_first() {
        let mut rat = table();
        let r2 = Register::general(2);
        let first = rat.allocate(r2).unwrap();
        let second = rat.allocate(r2).unwrap();
        assert_eq!(rat.allocate(r2), None);

        rat.rewind(second);
        assert_eq!(rat.map(r2), first);
        rat.rewind(first);
        assert_eq!(rat.map(r2), r2);
        assert!(rat.is_committed(r2));
        assert_eq!(rat.free_registers(RegisterType::General), 2);
    }
}
