//! # Test Harness
//!
//! Builds machines from hand-assembled programs and runs them to completion.

use pipesim_core::Simulator;
use pipesim_core::common::error::Result;
use pipesim_core::common::reg::Register;
use pipesim_core::config::{Config, CoreModel, Isa, MemoryInterfaceKind};
use pipesim_core::os::Process;
use pipesim_core::sim::RunReport;

use super::encode::assemble;

/// Memory size used by test machines.
pub const TEST_MEMORY: u64 = 1024 * 1024;

/// Tick limit that stops a runaway test program.
pub const TEST_MAX_TICKS: u64 = 200_000;

/// Address of the first heap byte for programs shorter than one page.
pub const HEAP: u64 = 0x1000;

/// A configuration for `isa` and `model` with test-sized memory.
pub fn config(isa: Isa, model: CoreModel) -> Config {
    let mut config = Config::default();
    config.core.isa = isa;
    config.core.model = model;
    config.core.max_ticks = Some(TEST_MAX_TICKS);
    config.memory.size = TEST_MEMORY;
    config
}

/// An in-order configuration whose memory interfaces take `latency` ticks.
pub fn slow_memory(isa: Isa, latency: u64) -> Config {
    let mut config = config(isa, CoreModel::InOrder);
    config.memory.instruction_interface = MemoryInterfaceKind::FixedLatency;
    config.memory.data_interface = MemoryInterfaceKind::FixedLatency;
    config.memory.latency = latency;
    config
}

/// A finished run.
pub struct Run {
    /// The simulator after the run.
    pub sim: Simulator,
    /// Statistics and program output.
    pub report: RunReport,
}

impl Run {
    /// Value of general-purpose register `tag`.
    pub fn reg(&self, tag: u32) -> u64 {
        self.sim.registers().get(Register::general(tag as u16)).get()
    }

    /// Eight bytes of memory at `address`, little-endian.
    pub fn mem64(&self, address: u64) -> u64 {
        let bytes = self.sim.read_memory(address, 8).unwrap();
        u64::from_le_bytes(bytes.try_into().unwrap())
    }

    /// Named core counter parsed as an integer.
    pub fn counter(&self, name: &str) -> u64 {
        self.report.stats.core[name].parse().unwrap()
    }
}

/// Runs `words` with `heap` placed at [`HEAP`].
pub fn run_with_heap(config: &Config, words: &[u32], heap: &[u8]) -> Run {
    run_bytes(config, assemble(words), heap)
}

/// Runs `words` with an empty heap.
pub fn run(config: &Config, words: &[u32]) -> Run {
    run_with_heap(config, words, &[])
}

/// Builds a machine for `words` with `heap` placed at [`HEAP`], without running it.
pub fn simulator(config: &Config, words: &[u32], heap: &[u8]) -> Result<Simulator> {
    let process = Process::new(assemble(words), 0, config.memory.size)
        .unwrap()
        .with_heap_data(heap.to_vec())
        .unwrap();
    assert_eq!(process.heap_start(), HEAP);
    Simulator::new(config, &process)
}

/// Runs an already assembled image.
pub fn run_bytes(config: &Config, image: Vec<u8>, heap: &[u8]) -> Run {
    let process = Process::new(image, 0, config.memory.size)
        .unwrap()
        .with_heap_data(heap.to_vec())
        .unwrap();
    assert_eq!(process.heap_start(), HEAP);
    let mut sim = Simulator::new(config, &process).unwrap();
    let report = sim.run();
    assert!(report.halted, "program did not halt within the tick limit");
    Run { sim, report }
}

/// An out-of-order configuration with two ports: one for integer work and
/// branches, one for memory and everything else.
pub fn out_of_order(isa: Isa) -> Config {
    let mut config = config(isa, CoreModel::OutOfOrder);
    config.pipeline.fetch_width = 2;
    config.pipeline.decode_width = 2;
    config.ports = serde_json::from_str(
        r#"[
            { "name": "ALU", "groups": ["INT", "BRANCH"] },
            { "name": "MEM", "groups": ["INT", "LOAD", "STORE"] }
        ]"#,
    )
    .unwrap();
    config.out_of_order.reservation_stations = serde_json::from_str(
        r#"[{ "size": 8, "ports": [0] }, { "size": 8, "ports": [1] }]"#,
    )
    .unwrap();
    config
}

/// The configurations every program test runs under: every core model, plus the
/// in-order core over slow memory.
pub fn all_models(isa: Isa) -> Vec<Config> {
    vec![
        config(isa, CoreModel::Emulation),
        config(isa, CoreModel::InOrder),
        slow_memory(isa, 3),
        out_of_order(isa),
    ]
}
