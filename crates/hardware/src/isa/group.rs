//! Instruction classification and execution-info lookup.
//!
//! This module turns a micro-op's class flags into timing information. It provides:
//! 1. **Flags:** [`InstructionFlags`], the explicit set of class predicates a decoder
//!    attaches to every micro-op.
//! 2. **Groups:** [`InstructionGroup`] and the fixed-priority decision list that maps
//!    flags to exactly one group.
//! 3. **Execution info:** [`ExecutionInfoTable`], which resolves latency, throughput
//!    and port support per group (through the group inheritance tree) with optional
//!    per-opcode overrides.

use std::collections::{HashMap, VecDeque};

use serde::Deserialize;
use strum::IntoStaticStr;

use crate::config::{LatencyConfig, PortConfig};

/// Class predicates of a micro-op.
///
/// A store that is not split into separate micro-ops sets both `is_store_address`
/// and `is_store_data`; an atomic read-modify-write additionally sets `is_load`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct InstructionFlags {
    /// Reads memory.
    pub is_load: bool,
    /// Generates store addresses.
    pub is_store_address: bool,
    /// Produces data to be stored.
    pub is_store_data: bool,
    /// Can redirect control flow.
    pub is_branch: bool,
    /// Atomic memory access.
    pub is_atomic: bool,
    /// Acquire ordering semantics.
    pub is_acquire: bool,
    /// Release ordering semantics.
    pub is_release: bool,
    /// Load-reserved (sets a reservation).
    pub is_load_reserved: bool,
    /// Store-conditional (succeeds only with a valid reservation).
    pub is_store_conditional: bool,
    /// Integer divide or remainder.
    pub is_divide: bool,
    /// Integer multiply.
    pub is_multiply: bool,
    /// Shift.
    pub is_shift: bool,
    /// Bitwise logical operation.
    pub is_logical: bool,
    /// Comparison.
    pub is_compare: bool,
}

impl InstructionFlags {
    /// Classifies the micro-op into exactly one group.
    ///
    /// Priority: branch, load, store-address, divide, multiply, shift, logical,
    /// compare, and finally simple arithmetic.
    pub const fn group(&self) -> InstructionGroup {
        if self.is_branch {
            InstructionGroup::Branch
        } else if self.is_load {
            InstructionGroup::LoadInt
        } else if self.is_store_address {
            InstructionGroup::StoreInt
        } else if self.is_divide {
            InstructionGroup::IntDiv
        } else if self.is_multiply {
            InstructionGroup::IntMul
        } else if self.is_shift {
            InstructionGroup::IntSimpleShift
        } else if self.is_logical {
            InstructionGroup::IntSimpleLogical
        } else if self.is_compare {
            InstructionGroup::IntSimpleCompare
        } else {
            InstructionGroup::IntSimpleArithmetic
        }
    }
}

/// Coarse instruction groups used for timing and statistics.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, IntoStaticStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum InstructionGroup {
    /// All integer operations.
    Int,
    /// Single-cycle integer operations.
    IntSimple,
    /// Add/subtract/move.
    #[serde(alias = "INT_SIMPLE_ARTH")]
    IntSimpleArithmetic,
    /// Comparisons.
    #[serde(alias = "INT_SIMPLE_CMP")]
    IntSimpleCompare,
    /// Bitwise logic.
    IntSimpleLogical,
    /// Shifts.
    IntSimpleShift,
    /// Multiplies.
    IntMul,
    /// Divides and remainders.
    #[serde(alias = "INT_DIV_OR_SQRT")]
    IntDiv,
    /// Integer loads.
    LoadInt,
    /// Integer stores.
    StoreInt,
    /// All loads.
    Load,
    /// All stores.
    Store,
    /// Control flow.
    Branch,
}

impl InstructionGroup {
    /// Every group.
    pub const ALL: [Self; 13] = [
        Self::Int,
        Self::IntSimple,
        Self::IntSimpleArithmetic,
        Self::IntSimpleCompare,
        Self::IntSimpleLogical,
        Self::IntSimpleShift,
        Self::IntMul,
        Self::IntDiv,
        Self::LoadInt,
        Self::StoreInt,
        Self::Load,
        Self::Store,
        Self::Branch,
    ];

    /// Groups that inherit this group's timing unless configured themselves.
    pub const fn children(self) -> &'static [Self] {
        match self {
            Self::Int => &[Self::IntSimple, Self::IntMul, Self::IntDiv],
            Self::IntSimple => &[
                Self::IntSimpleArithmetic,
                Self::IntSimpleCompare,
                Self::IntSimpleLogical,
                Self::IntSimpleShift,
            ],
            Self::Load => &[Self::LoadInt],
            Self::Store => &[Self::StoreInt],
            _ => &[],
        }
    }

    /// Short upper-case name, as used in configuration files.
    pub fn name(self) -> &'static str {
        self.into()
    }
}

/// Timing and port information attached to a micro-op.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ExecutionInfo {
    /// Cycles from issue until the result is available.
    pub latency: u16,
    /// Cycles the execution unit is blocked after issue.
    pub stall_cycles: u16,
    /// Indices of ports able to execute the micro-op.
    pub ports: Vec<u16>,
}

impl Default for ExecutionInfo {
    fn default() -> Self {
        Self {
            latency: 1,
            stall_cycles: 1,
            ports: Vec::new(),
        }
    }
}

impl ExecutionInfo {
    /// Placeholder for opcode overrides; zero fields defer to the group value.
    const fn unset() -> Self {
        Self {
            latency: 0,
            stall_cycles: 0,
            ports: Vec::new(),
        }
    }
}

/// Resolved execution info for every group plus per-opcode overrides.
#[derive(Clone, Debug, Default)]
pub struct ExecutionInfoTable {
    groups: HashMap<InstructionGroup, ExecutionInfo>,
    opcodes: HashMap<u16, ExecutionInfo>,
}

impl ExecutionInfoTable {
    /// Builds the table from latency and port configuration.
    ///
    /// A configured group passes its latency to its descendants breadth-first; a
    /// descendant keeps the value from the closest configured ancestor, and its own
    /// entry always wins. Ports propagate the same way but accumulate.
    pub fn new(latencies: &[LatencyConfig], ports: &[PortConfig]) -> Self {
        let mut groups: HashMap<InstructionGroup, ExecutionInfo> = InstructionGroup::ALL
            .iter()
            .map(|&g| (g, ExecutionInfo::default()))
            .collect();
        let mut opcodes: HashMap<u16, ExecutionInfo> = HashMap::new();

        // Distance from the configured ancestor that set each group's latency.
        let mut distance: HashMap<InstructionGroup, usize> = HashMap::new();
        for entry in latencies {
            for &group in &entry.groups {
                let mut frontier = VecDeque::from([(group, 0usize)]);
                while let Some((current, depth)) = frontier.pop_front() {
                    let closer = distance.get(&current).is_some_and(|&d| d < depth);
                    if !closer {
                        let _ = distance.insert(current, depth);
                        if let Some(info) = groups.get_mut(&current) {
                            info.latency = entry.execution_latency;
                            info.stall_cycles = entry.execution_throughput;
                        }
                    }
                    frontier.extend(current.children().iter().map(|&c| (c, depth + 1)));
                }
            }
            for &opcode in &entry.opcodes {
                let info = opcodes.entry(opcode).or_insert_with(ExecutionInfo::unset);
                info.latency = entry.execution_latency;
                info.stall_cycles = entry.execution_throughput;
            }
        }

        for (index, port) in ports.iter().enumerate() {
            let index = index as u16;
            for &group in &port.groups {
                let mut frontier = VecDeque::from([group]);
                while let Some(current) = frontier.pop_front() {
                    if let Some(info) = groups.get_mut(&current) {
                        if !info.ports.contains(&index) {
                            info.ports.push(index);
                        }
                    }
                    frontier.extend(current.children().iter().copied());
                }
            }
            for &opcode in &port.opcodes {
                let info = opcodes.entry(opcode).or_insert_with(ExecutionInfo::unset);
                if !info.ports.contains(&index) {
                    info.ports.push(index);
                }
            }
        }

        Self { groups, opcodes }
    }

    /// Execution info for a micro-op of `group` with architecture opcode `opcode`.
    ///
    /// Opcode entries override the group value field by field: a latency of zero or
    /// an empty port list in the override falls back to the group.
    pub fn lookup(&self, group: InstructionGroup, opcode: u16) -> ExecutionInfo {
        let mut info = self.groups.get(&group).cloned().unwrap_or_default();
        if let Some(over) = self.opcodes.get(&opcode) {
            if over.latency != 0 {
                info.latency = over.latency;
            }
            if over.stall_cycles != 0 {
                info.stall_cycles = over.stall_cycles;
            }
            if !over.ports.is_empty() {
                info.ports.clone_from(&over.ports);
            }
        }
        info
    }
}
