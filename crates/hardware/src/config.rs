//! Configuration system for the simulator.
//!
//! This module defines all configuration structures and enums used to parameterize
//! the simulator. It provides:
//! 1. **Defaults:** Baseline machine constants (memory size, fetch geometry, predictor sizes).
//! 2. **Structures:** Hierarchical config for the core, fetch, pipeline, branch
//!    predictor, memory, latencies and execution ports.
//! 3. **Enums:** ISA, core model, predictor kind/policy and memory interface kind.
//! 4. **Out-of-order resources:** Reorder buffer, load/store queue, physical
//!    register and reservation station sizing ([`OutOfOrderConfig`]).
//!
//! Configuration is supplied as JSON (`Config::from_json` / `Config::from_file`);
//! every section and field is optional and falls back to `Config::default()`.

use std::path::Path;

use serde::Deserialize;

use crate::common::error::{Result, SimError};
use crate::isa::group::InstructionGroup;

/// Default configuration constants for the simulator.
mod defaults {
    /// Simulated memory size (4 MiB).
    pub const MEMORY_SIZE: u64 = 4 * 1024 * 1024;

    /// Fixed memory interface latency in cycles.
    pub const MEMORY_LATENCY: u64 = 4;

    /// Fetch block size in bytes.
    pub const FETCH_BLOCK_SIZE: u64 = 32;

    /// Number of direct-mapped fetch block cache entries.
    pub const FETCH_BLOCK_ENTRIES: usize = 64;

    /// Default pipeline width (1 macro-op per cycle).
    pub const PIPELINE_WIDTH: usize = 1;

    /// Default Branch Target Buffer size (256 entries).
    pub const BTB_SIZE: usize = 256;

    /// Default Return Address Stack size (8 entries).
    pub const RAS_SIZE: usize = 8;

    /// Default global history length (12 bits, 4096 counters).
    pub const HISTORY_BITS: u32 = 12;

    /// Multiply latency in cycles.
    pub const MUL_LATENCY: u16 = 3;

    /// Divide latency (and issue blocking) in cycles.
    pub const DIV_LATENCY: u16 = 12;

    /// Loop buffer capacity in macro-ops.
    pub const LOOP_BUFFER_SIZE: usize = 32;

    /// Consecutive retirements of the same branch that identify a loop.
    pub const LOOP_DETECTION_THRESHOLD: u16 = 5;

    /// Reorder buffer entries.
    pub const ROB_SIZE: usize = 64;

    /// Load queue entries.
    pub const LOAD_QUEUE_SIZE: usize = 16;

    /// Store queue entries.
    pub const STORE_QUEUE_SIZE: usize = 16;

    /// Micro-ops committed per cycle.
    pub const COMMIT_WIDTH: usize = 4;

    /// Loads the load/store queue completes per cycle.
    pub const LSQ_COMPLETION_WIDTH: usize = 1;

    /// Physical general-purpose registers.
    pub const PHYSICAL_GENERAL: u16 = 96;

    /// Physical floating-point registers.
    pub const PHYSICAL_FLOAT: u16 = 64;

    /// Physical condition-flag registers.
    pub const PHYSICAL_FLAGS: u16 = 32;

    /// Physical system registers.
    pub const PHYSICAL_SYSTEM: u16 = 16;

    /// Reservation station entries.
    pub const RS_SIZE: usize = 32;

    /// Micro-ops a reservation station accepts per cycle.
    pub const RS_DISPATCH_RATE: usize = 4;
}

/// Instruction set simulated by the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum Isa {
    /// RV64IMAC with the counter CSRs.
    #[default]
    #[serde(alias = "RISCV", alias = "rv64")]
    Riscv,
    /// AArch64 integer subset.
    #[serde(alias = "AArch64", alias = "ARM64")]
    Aarch64,
}

/// Core timing model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum CoreModel {
    /// One macro-op per cycle, zero-latency memory; the reference model.
    Emulation,
    /// Fetch/decode/execute/writeback pipeline.
    #[default]
    InOrder,
    /// Renaming, reservation stations, out-of-order issue and a reorder buffer.
    #[serde(alias = "OoO")]
    OutOfOrder,
}

/// Branch predictor implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum PredictorKind {
    /// Fixed direction policy plus a return-address stack.
    #[default]
    Static,
    /// Global-history indexed 2-bit counters with a BTB.
    #[serde(alias = "Gshare")]
    GShare,
}

/// Direction policy of the static predictor for conditional branches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum StaticPolicy {
    /// Predict every conditional branch taken.
    AlwaysTaken,
    /// Predict every conditional branch not taken.
    #[default]
    AlwaysNotTaken,
    /// Backward branches taken, forward branches not taken.
    #[serde(alias = "BTFN")]
    BackwardTakenForwardNotTaken,
    /// Forward branches taken, backward branches not taken.
    #[serde(alias = "FTBN")]
    ForwardTakenBackwardNotTaken,
}

/// Timing behaviour of a memory interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum MemoryInterfaceKind {
    /// Requests complete inside the request call.
    #[default]
    Flat,
    /// Requests complete `memory.latency` ticks after they are made.
    FixedLatency,
}

/// Root configuration structure.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// ISA and core model selection.
    pub core: CoreConfig,
    /// Fetch block geometry.
    pub fetch: FetchConfig,
    /// Stage widths.
    pub pipeline: PipelineConfig,
    /// Branch predictor selection and sizing.
    pub branch_predictor: BranchPredictorConfig,
    /// Memory size and interface timing.
    pub memory: MemoryConfig,
    /// Per-group and per-opcode execution latencies.
    #[serde(default = "Config::default_latencies")]
    pub latencies: Vec<LatencyConfig>,
    /// Execution ports and the groups/opcodes they accept.
    #[serde(default = "Config::default_ports")]
    pub ports: Vec<PortConfig>,
    /// Out-of-order core resources.
    pub out_of_order: OutOfOrderConfig,
}

/// Core selection.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// Instruction set.
    pub isa: Isa,
    /// Timing model.
    pub model: CoreModel,
    /// Stop the run after this many ticks even if the core has not halted.
    pub max_ticks: Option<u64>,
}

/// Fetch unit geometry.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Bytes per fetch block (power of two).
    pub block_size: u64,
    /// Direct-mapped block cache entries.
    pub block_cache_entries: usize,
    /// Macro-ops the loop buffer holds; zero disables it.
    pub loop_buffer_size: usize,
    /// Retirements of the same branch with the same prediction that mark a loop.
    pub loop_detection_threshold: u16,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            block_size: defaults::FETCH_BLOCK_SIZE,
            block_cache_entries: defaults::FETCH_BLOCK_ENTRIES,
            loop_buffer_size: defaults::LOOP_BUFFER_SIZE,
            loop_detection_threshold: defaults::LOOP_DETECTION_THRESHOLD,
        }
    }
}

/// Pipeline buffer widths.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Macro-ops fetched per cycle.
    pub fetch_width: usize,
    /// Micro-ops decoded per cycle.
    pub decode_width: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            fetch_width: defaults::PIPELINE_WIDTH,
            decode_width: defaults::PIPELINE_WIDTH,
        }
    }
}

/// Branch predictor configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BranchPredictorConfig {
    /// Predictor implementation.
    pub kind: PredictorKind,
    /// Conditional-branch policy of the static predictor.
    pub static_policy: StaticPolicy,
    /// Return address stack depth.
    pub ras_size: usize,
    /// Branch target buffer entries (power of two).
    pub btb_size: usize,
    /// Global history length in bits for the gshare predictor.
    pub history_bits: u32,
}

impl Default for BranchPredictorConfig {
    fn default() -> Self {
        Self {
            kind: PredictorKind::default(),
            static_policy: StaticPolicy::default(),
            ras_size: defaults::RAS_SIZE,
            btb_size: defaults::BTB_SIZE,
            history_bits: defaults::HISTORY_BITS,
        }
    }
}

/// Memory configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Simulated memory size in bytes.
    pub size: u64,
    /// Instruction-side interface.
    pub instruction_interface: MemoryInterfaceKind,
    /// Data-side interface.
    pub data_interface: MemoryInterfaceKind,
    /// Latency of fixed-latency interfaces in ticks.
    pub latency: u64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            size: defaults::MEMORY_SIZE,
            instruction_interface: MemoryInterfaceKind::Flat,
            data_interface: MemoryInterfaceKind::Flat,
            latency: defaults::MEMORY_LATENCY,
        }
    }
}

/// Latency/throughput entry applying to groups and/or individual opcodes.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LatencyConfig {
    /// Instruction groups covered by this entry.
    #[serde(default)]
    pub groups: Vec<InstructionGroup>,
    /// Architecture opcode ids covered by this entry.
    #[serde(default)]
    pub opcodes: Vec<u16>,
    /// Cycles from issue to result.
    pub execution_latency: u16,
    /// Cycles the unit stays blocked before the next issue.
    #[serde(default = "LatencyConfig::default_throughput")]
    pub execution_throughput: u16,
}

impl LatencyConfig {
    fn default_throughput() -> u16 {
        1
    }
}

/// Execution port accepting a set of groups and/or opcodes.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PortConfig {
    /// Port name, for reports.
    pub name: String,
    /// Instruction groups the port accepts.
    #[serde(default)]
    pub groups: Vec<InstructionGroup>,
    /// Architecture opcode ids the port accepts.
    #[serde(default)]
    pub opcodes: Vec<u16>,
}

/// Physical register counts per bank of the out-of-order core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PhysicalRegisterConfig {
    /// General-purpose registers.
    pub general: u16,
    /// Floating-point registers.
    pub float: u16,
    /// Condition-flag registers.
    pub flags: u16,
    /// System registers.
    pub system: u16,
}

impl Default for PhysicalRegisterConfig {
    fn default() -> Self {
        Self {
            general: defaults::PHYSICAL_GENERAL,
            float: defaults::PHYSICAL_FLOAT,
            flags: defaults::PHYSICAL_FLAGS,
            system: defaults::PHYSICAL_SYSTEM,
        }
    }
}

impl PhysicalRegisterConfig {
    /// Counts in [`crate::common::RegisterType::index`] order.
    pub const fn quantities(&self) -> [u16; 4] {
        [self.general, self.float, self.flags, self.system]
    }
}

/// How the out-of-order core picks an issue port at dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum PortAllocatorKind {
    /// Least-loaded supported port.
    #[default]
    Balanced,
    /// Prefers stations with the fewest blocked cycles, then the most free entries.
    CapacityAware,
}

/// A reservation station and the ports it feeds.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ReservationStationConfig {
    /// Micro-ops the station holds.
    pub size: usize,
    /// Micro-ops it accepts per cycle.
    #[serde(default = "ReservationStationConfig::default_dispatch_rate")]
    pub dispatch_rate: usize,
    /// Indices into `ports`; empty means every port.
    #[serde(default)]
    pub ports: Vec<u16>,
}

impl ReservationStationConfig {
    fn default_dispatch_rate() -> usize {
        defaults::RS_DISPATCH_RATE
    }
}

/// Queue sizes and widths of the out-of-order core.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutOfOrderConfig {
    /// Reorder buffer entries.
    pub rob_size: usize,
    /// Load queue entries.
    pub load_queue_size: usize,
    /// Store queue entries.
    pub store_queue_size: usize,
    /// Micro-ops committed per cycle.
    pub commit_width: usize,
    /// Loads completed by the load/store queue per cycle.
    pub lsq_completion_width: usize,
    /// Physical register file sizes.
    pub physical_registers: PhysicalRegisterConfig,
    /// Reservation stations.
    pub reservation_stations: Vec<ReservationStationConfig>,
    /// Port selection policy.
    pub port_allocator: PortAllocatorKind,
}

impl Default for OutOfOrderConfig {
    fn default() -> Self {
        Self {
            rob_size: defaults::ROB_SIZE,
            load_queue_size: defaults::LOAD_QUEUE_SIZE,
            store_queue_size: defaults::STORE_QUEUE_SIZE,
            commit_width: defaults::COMMIT_WIDTH,
            lsq_completion_width: defaults::LSQ_COMPLETION_WIDTH,
            physical_registers: PhysicalRegisterConfig::default(),
            reservation_stations: vec![ReservationStationConfig {
                size: defaults::RS_SIZE,
                dispatch_rate: defaults::RS_DISPATCH_RATE,
                ports: Vec::new(),
            }],
            port_allocator: PortAllocatorKind::default(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            core: CoreConfig::default(),
            fetch: FetchConfig::default(),
            pipeline: PipelineConfig::default(),
            branch_predictor: BranchPredictorConfig::default(),
            memory: MemoryConfig::default(),
            latencies: Self::default_latencies(),
            ports: Self::default_ports(),
            out_of_order: OutOfOrderConfig::default(),
        }
    }
}

impl Config {
    fn default_latencies() -> Vec<LatencyConfig> {
        let entry = |groups: Vec<InstructionGroup>, latency: u16, throughput: u16| LatencyConfig {
            groups,
            opcodes: Vec::new(),
            execution_latency: latency,
            execution_throughput: throughput,
        };
        vec![
            entry(
                vec![
                    InstructionGroup::Int,
                    InstructionGroup::Load,
                    InstructionGroup::Store,
                    InstructionGroup::Branch,
                ],
                1,
                1,
            ),
            entry(vec![InstructionGroup::IntMul], defaults::MUL_LATENCY, 1),
            entry(
                vec![InstructionGroup::IntDiv],
                defaults::DIV_LATENCY,
                defaults::DIV_LATENCY,
            ),
        ]
    }

    fn default_ports() -> Vec<PortConfig> {
        vec![PortConfig {
            name: "Port 0".to_string(),
            groups: vec![
                InstructionGroup::Int,
                InstructionGroup::Load,
                InstructionGroup::Store,
                InstructionGroup::Branch,
            ],
            opcodes: Vec::new(),
        }]
    }

    /// Parses a configuration from JSON and validates it.
    ///
    /// # Arguments
    ///
    /// * `json` - JSON text; absent sections take their defaults.
    ///
    /// # Returns
    ///
    /// The validated configuration, or the parse/validation error.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| SimError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text)
    }

    /// Checks cross-field constraints that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(SimError::Config(msg));

        if !self.fetch.block_size.is_power_of_two() || self.fetch.block_size < 4 {
            return invalid(format!(
                "fetch.block_size must be a power of two of at least 4, got {}",
                self.fetch.block_size
            ));
        }
        if self.fetch.block_size > u64::from(u16::MAX) {
            return invalid(format!(
                "fetch.block_size {} exceeds the largest memory request",
                self.fetch.block_size
            ));
        }
        if self.fetch.block_cache_entries == 0 {
            return invalid("fetch.block_cache_entries must be non-zero".to_string());
        }
        if self.pipeline.fetch_width == 0 || self.pipeline.decode_width == 0 {
            return invalid("pipeline widths must be non-zero".to_string());
        }
        if self.branch_predictor.ras_size == 0 {
            return invalid("branch_predictor.ras_size must be non-zero".to_string());
        }
        if !self.branch_predictor.btb_size.is_power_of_two() {
            return invalid(format!(
                "branch_predictor.btb_size must be a power of two, got {}",
                self.branch_predictor.btb_size
            ));
        }
        if !(1..=24).contains(&self.branch_predictor.history_bits) {
            return invalid(format!(
                "branch_predictor.history_bits must be between 1 and 24, got {}",
                self.branch_predictor.history_bits
            ));
        }
        if self.memory.size < 4096 {
            return invalid(format!(
                "memory.size must be at least 4096 bytes, got {}",
                self.memory.size
            ));
        }
        let fixed = [self.memory.instruction_interface, self.memory.data_interface]
            .contains(&MemoryInterfaceKind::FixedLatency);
        if fixed && self.memory.latency == 0 {
            return invalid("memory.latency must be non-zero for FixedLatency interfaces".to_string());
        }
        if fixed && self.core.model == CoreModel::Emulation {
            return invalid("the Emulation core model requires Flat memory interfaces".to_string());
        }
        for entry in &self.latencies {
            if entry.execution_latency == 0 || entry.execution_throughput == 0 {
                return invalid("execution latencies and throughputs must be non-zero".to_string());
            }
        }
        if self.core.model == CoreModel::OutOfOrder {
            self.validate_out_of_order()?;
        }
        Ok(())
    }

    fn validate_out_of_order(&self) -> Result<()> {
        let invalid = |msg: String| Err(SimError::Config(msg));
        let ooo = &self.out_of_order;

        if ooo.rob_size == 0 || ooo.load_queue_size == 0 || ooo.store_queue_size == 0 {
            return invalid("out_of_order queue sizes must be non-zero".to_string());
        }
        if ooo.commit_width == 0 || ooo.lsq_completion_width == 0 {
            return invalid("out_of_order widths must be non-zero".to_string());
        }
        if self.ports.is_empty() {
            return invalid("the OutOfOrder core model needs at least one port".to_string());
        }
        if ooo.reservation_stations.is_empty() {
            return invalid("out_of_order.reservation_stations must not be empty".to_string());
        }
        let mut owner = vec![None; self.ports.len()];
        for (index, station) in ooo.reservation_stations.iter().enumerate() {
            if station.size == 0 || station.dispatch_rate == 0 {
                return invalid(format!(
                    "reservation station {index} needs a non-zero size and dispatch rate"
                ));
            }
            let ports: Vec<usize> = if station.ports.is_empty() {
                (0..self.ports.len()).collect()
            } else {
                station.ports.iter().map(|&p| usize::from(p)).collect()
            };
            for port in ports {
                match owner.get_mut(port) {
                    None => {
                        return invalid(format!(
                            "reservation station {index} names port {port}, which does not exist"
                        ));
                    }
                    Some(Some(other)) => {
                        return invalid(format!(
                            "port {port} is fed by reservation stations {other} and {index}"
                        ));
                    }
                    Some(slot) => *slot = Some(index),
                }
            }
        }
        if let Some(port) = owner.iter().position(Option::is_none) {
            return invalid(format!("port {port} is not fed by any reservation station"));
        }
        Ok(())
    }
}
