//! # Configuration Tests
//!
//! Tests for configuration defaults, JSON deserialization and validation.

use pipesim_core::common::error::SimError;
use pipesim_core::config::*;
use pipesim_core::isa::group::InstructionGroup;
use rstest::rstest;

#[test]
fn test_config_default() {
    let config = Config::default();
    assert_eq!(config.core.isa, Isa::Riscv);
    assert_eq!(config.core.model, CoreModel::InOrder);
    assert_eq!(config.core.max_ticks, None);
    assert_eq!(config.fetch.block_size, 32);
    assert_eq!(config.pipeline.fetch_width, 1);
    assert_eq!(config.branch_predictor.kind, PredictorKind::Static);
    assert_eq!(config.memory.instruction_interface, MemoryInterfaceKind::Flat);
    assert_eq!(config.ports.len(), 1);
    assert!(config.validate().is_ok());
}

#[test]
fn test_empty_json_is_the_default() {
    let config = Config::from_json("{}").unwrap();
    assert_eq!(config.memory.size, Config::default().memory.size);
    assert_eq!(config.latencies, Config::default().latencies);
}

#[test]
fn test_partial_sections_keep_other_defaults() {
    let json = r#"{
        "core": { "isa": "Aarch64", "model": "Emulation" },
        "branch_predictor": { "kind": "GShare", "history_bits": 10 },
        "memory": { "size": 65536 }
    }"#;
    let config = Config::from_json(json).unwrap();
    assert_eq!(config.core.isa, Isa::Aarch64);
    assert_eq!(config.core.model, CoreModel::Emulation);
    assert_eq!(config.branch_predictor.kind, PredictorKind::GShare);
    assert_eq!(config.branch_predictor.history_bits, 10);
    assert_eq!(config.branch_predictor.ras_size, 8);
    assert_eq!(config.memory.size, 65536);
    assert_eq!(config.memory.latency, 4);
}

#[test]
fn test_latencies_and_ports_parse() {
    let json = r#"{
        "latencies": [
            { "groups": ["INT_MUL"], "execution_latency": 5 },
            { "opcodes": [7], "execution_latency": 2, "execution_throughput": 2 }
        ],
        "ports": [
            { "name": "alu", "groups": ["INT", "BRANCH"] },
            { "name": "mem", "groups": ["LOAD", "STORE"] }
        ]
    }"#;
    let config = Config::from_json(json).unwrap();
    assert_eq!(config.latencies.len(), 2);
    assert_eq!(config.latencies[0].groups, vec![InstructionGroup::IntMul]);
    assert_eq!(config.latencies[0].execution_throughput, 1);
    assert_eq!(config.latencies[1].opcodes, vec![7]);
    assert_eq!(config.ports[1].name, "mem");
}

#[test]
fn test_unknown_enum_value_is_rejected() {
    let err = Config::from_json(r#"{ "core": { "isa": "Mips" } }"#).unwrap_err();
    assert!(matches!(err, SimError::ConfigParse(_)), "{err}");
}

#[rstest]
#[case::block_not_power_of_two(r#"{ "fetch": { "block_size": 24 } }"#)]
#[case::block_too_small(r#"{ "fetch": { "block_size": 2 } }"#)]
#[case::no_block_cache(r#"{ "fetch": { "block_cache_entries": 0 } }"#)]
#[case::zero_width(r#"{ "pipeline": { "decode_width": 0 } }"#)]
#[case::no_ras(r#"{ "branch_predictor": { "ras_size": 0 } }"#)]
#[case::btb_not_power_of_two(r#"{ "branch_predictor": { "btb_size": 100 } }"#)]
#[case::history_too_long(r#"{ "branch_predictor": { "history_bits": 30 } }"#)]
#[case::tiny_memory(r#"{ "memory": { "size": 1024 } }"#)]
#[case::zero_latency_memory(r#"{ "memory": { "data_interface": "FixedLatency", "latency": 0 } }"#)]
#[case::slow_memory_under_emulation(
    r#"{ "core": { "model": "Emulation" }, "memory": { "data_interface": "FixedLatency" } }"#
)]
#[case::zero_execution_latency(r#"{ "latencies": [ { "groups": ["INT"], "execution_latency": 0 } ] }"#)]
fn test_invalid_configurations(#[case] json: &str) {
    let err = Config::from_json(json).unwrap_err();
    assert!(matches!(err, SimError::Config(_)), "{err}");
}

#[test]
fn test_from_file_reads_json() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("core.json");
    std::fs::write(&path, r#"{ "core": { "max_ticks": 500 } }"#).unwrap();
    let config = Config::from_file(&path).unwrap();
    assert_eq!(config.core.max_ticks, Some(500));
}

#[test]
fn test_from_file_missing_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = Config::from_file(dir.path().join("absent.json")).unwrap_err();
    assert!(matches!(err, SimError::Io { .. }), "{err}");
}
