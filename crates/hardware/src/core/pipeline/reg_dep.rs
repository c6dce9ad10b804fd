//! Register dependency map.
//!
//! Tracks, for every architectural register, the in-flight micro-ops that will
//! write it, oldest first. Issue asks for the youngest writer of each source:
//! - no writer: the register file holds the value,
//! - a writer that has executed: its result is forwarded,
//! - a writer that has not executed: the consumer must wait.
//!
//! Writers are removed when they write back, or by a flush.

use crate::common::reg::{Register, RegisterFileStructure, RegisterType, RegisterValue};
use crate::isa::instruction::Instruction;

/// State of a source register at issue.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Dependency {
    /// No in-flight writer; read the register file.
    Clear,
    /// The youngest writer has executed and produced this value.
    Forwarded(RegisterValue),
    /// The youngest writer has not produced its value yet.
    Pending,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Writer {
    sequence_id: u64,
    value: Option<RegisterValue>,
}

/// Scoreboard with result forwarding.
#[derive(Clone, Debug)]
pub struct RegDepMap {
    banks: Vec<Vec<Vec<Writer>>>,
}

impl RegDepMap {
    /// Creates an empty map shaped like the register file.
    pub fn new(structure: &[RegisterFileStructure]) -> Self {
        Self {
            banks: structure
                .iter()
                .map(|bank| vec![Vec::new(); usize::from(bank.quantity)])
                .collect(),
        }
    }

    fn writers(&self, reg: Register) -> Option<&Vec<Writer>> {
        self.banks
            .get(reg.kind.index())
            .and_then(|bank| bank.get(usize::from(reg.tag)))
    }

    fn writers_mut(&mut self, reg: Register) -> Option<&mut Vec<Writer>> {
        self.banks
            .get_mut(reg.kind.index())
            .and_then(|bank| bank.get_mut(usize::from(reg.tag)))
    }

    /// Registers `uop` as the youngest writer of its destinations.
    pub fn insert(&mut self, uop: &Instruction) {
        for &reg in uop.destination_registers() {
            if let Some(writers) = self.writers_mut(reg) {
                writers.push(Writer {
                    sequence_id: uop.sequence_id(),
                    value: None,
                });
            }
        }
    }

    /// Publishes the results of an executed `uop` for forwarding.
    pub fn forward(&mut self, uop: &Instruction) {
        let sequence_id = uop.sequence_id();
        for (&reg, &value) in uop.destination_registers().iter().zip(uop.results()) {
            if let Some(writer) = self
                .writers_mut(reg)
                .and_then(|w| w.iter_mut().find(|w| w.sequence_id == sequence_id))
            {
                writer.value = Some(value);
            }
        }
    }

    /// Removes `uop` as a writer once its results are in the register file.
    pub fn remove(&mut self, uop: &Instruction) {
        let sequence_id = uop.sequence_id();
        for &reg in uop.destination_registers() {
            if let Some(writers) = self.writers_mut(reg) {
                writers.retain(|w| w.sequence_id != sequence_id);
            }
        }
    }

    /// Dependency of a consumer reading `reg`.
    pub fn lookup(&self, reg: Register) -> Dependency {
        match self.writers(reg).and_then(|w| w.last()) {
            None => Dependency::Clear,
            Some(Writer {
                value: Some(value), ..
            }) => Dependency::Forwarded(*value),
            Some(_) => Dependency::Pending,
        }
    }

    /// Drops writers younger than `sequence_id`.
    pub fn flush_younger(&mut self, sequence_id: u64) {
        for writers in self.banks.iter_mut().flatten() {
            writers.retain(|w| w.sequence_id <= sequence_id);
        }
    }

    /// Drops every writer.
    pub fn clear(&mut self) {
        for writers in self.banks.iter_mut().flatten() {
            writers.clear();
        }
    }

    /// Returns `true` if no writer is in flight.
    pub fn is_empty(&self) -> bool {
        self.banks.iter().flatten().all(Vec::is_empty)
    }

    /// In-flight writers of registers of `kind`.
    pub fn pending_writes(&self, kind: RegisterType) -> usize {
        self.banks
            .get(kind.index())
            .map_or(0, |bank| bank.iter().map(Vec::len).sum())
    }
}
