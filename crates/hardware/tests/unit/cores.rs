//! # Core Model Tests
//!
//! Looks inside a running core: the state its pipeline is left in by an
//! exception, resource checks at construction, port coverage faults and the
//! loop buffer of the out-of-order core.

use pipesim_core::Simulator;
use pipesim_core::common::error::SimError;
use pipesim_core::common::reg::Register;
use pipesim_core::config::{Config, CoreModel, Isa, MemoryInterfaceKind, StaticPolicy};
use pipesim_core::core::CoreDispatch;
use pretty_assertions::assert_eq;

use crate::common::encode::rv;
use crate::common::harness::{Run, TEST_MAX_TICKS, config, out_of_order, run, simulator, slow_memory};

const SYS_WRITE: i32 = 64;

/// Writes 16 heap bytes to stdout, then keeps computing.
fn write_program() -> Vec<u32> {
    vec![
        rv::li(rv::A0, 1),
        rv::lui(rv::A1, 1),
        rv::li(rv::A2, 16),
        rv::li(rv::A7, SYS_WRITE),
        rv::ECALL,
        rv::li(5, 1),
        rv::li(6, 2),
        rv::add(7, 5, 6),
    ]
}

/// Ticks `sim` to completion, passing the core to `inspect` after every tick.
fn tick_to_halt(sim: &mut Simulator, mut inspect: impl FnMut(&CoreDispatch)) {
    for _ in 0..TEST_MAX_TICKS {
        if sim.has_halted() {
            return;
        }
        sim.tick();
        inspect(sim.core());
    }
    panic!("program did not halt within the tick limit");
}

#[test]
fn test_exception_leaves_the_in_order_pipeline_empty() {
    let config = slow_memory(Isa::Riscv, 4);
    let mut sim = simulator(&config, &write_program(), b"0123456789abcdef").unwrap();
    let mut handling = 0;
    tick_to_halt(&mut sim, |core| {
        let CoreDispatch::InOrder(core) = core else {
            panic!("expected the in-order core");
        };
        if core.is_handling_exception() {
            handling += 1;
            assert!(core.is_pipeline_empty());
            assert!(core.fetch().is_empty());
            assert!(core.fetch().pending_requests().is_empty());
        }
    });
    assert!(handling > 0, "the write handler never waited on memory");
    assert_eq!(sim.registers().get(Register::general(7)).get(), 3);
}

#[test]
fn test_exception_leaves_the_out_of_order_pipeline_empty() {
    let mut config = out_of_order(Isa::Riscv);
    config.memory.instruction_interface = MemoryInterfaceKind::FixedLatency;
    config.memory.data_interface = MemoryInterfaceKind::FixedLatency;
    config.memory.latency = 4;
    let mut sim = simulator(&config, &write_program(), b"0123456789abcdef").unwrap();
    let mut handling = 0;
    tick_to_halt(&mut sim, |core| {
        let CoreDispatch::OutOfOrder(core) = core else {
            panic!("expected the out-of-order core");
        };
        if core.is_handling_exception() {
            handling += 1;
            assert!(core.is_pipeline_empty());
            assert!(core.fetch().pending_requests().is_empty());
        }
    });
    assert!(handling > 0, "the write handler never waited on memory");
    assert_eq!(sim.registers().get(Register::general(7)).get(), 3);
}

#[test]
fn test_micro_op_without_a_port_halts_the_core() {
    // No port accepts branches.
    let ports = r#"[{ "name": "ALU", "groups": ["INT", "LOAD", "STORE"] }]"#;
    let program = [rv::li(5, 1), rv::jal(0, 4), rv::li(6, 1)];
    for mut config in [config(Isa::Riscv, CoreModel::InOrder), out_of_order(Isa::Riscv)] {
        config.ports = serde_json::from_str(ports).unwrap();
        config.out_of_order.reservation_stations =
            serde_json::from_str(r#"[{ "size": 8 }]"#).unwrap();
        let run = run(&config, &program);
        assert_eq!(run.reg(5), 1);
        assert_eq!(run.reg(6), 0);
        assert_eq!(run.report.retired(), 1);
        assert_eq!(run.report.exit_code(), None);
    }
}

#[test]
fn test_too_few_physical_registers_is_a_config_error() {
    let mut config = out_of_order(Isa::Riscv);
    config.out_of_order.physical_registers.general = 32;
    let err = simulator(&config, &[rv::NOP], &[]).err().unwrap();
    assert!(matches!(err, SimError::Config(_)), "{err}");
}

fn counting_loop(config: &Config) -> Run {
    run(
        config,
        &[
            rv::li(5, 100),
            rv::li(6, 0),
            // loop:
            rv::addi(6, 6, 1),
            rv::addi(5, 5, -1),
            rv::bne(5, 0, -8),
        ],
    )
}

#[test]
fn test_hot_loop_is_supplied_by_the_loop_buffer() {
    let mut config = out_of_order(Isa::Riscv);
    config.branch_predictor.static_policy = StaticPolicy::BackwardTakenForwardNotTaken;
    let run = counting_loop(&config);
    assert_eq!(run.reg(6), 100);
    assert_eq!(run.reg(5), 0);
    assert!(run.counter("fetch.loopSupplied") > 0);
    // Replayed branches keep their recorded prediction; only the exit mispredicts.
    assert!(run.counter("branch.mispredict") <= 2);

    config.fetch.loop_buffer_size = 0;
    let run = counting_loop(&config);
    assert_eq!(run.reg(6), 100);
    assert_eq!(run.counter("fetch.loopSupplied"), 0);
}

#[test]
fn test_out_of_order_core_commits_every_load_and_store() {
    let program = [
        rv::lui(10, 1),
        rv::li(5, 4),
        // fill:
        rv::sd(5, 10, 0),
        rv::ld(6, 10, 0),
        rv::addi(10, 10, 8),
        rv::addi(5, 5, -1),
        rv::bne(5, 0, -16),
    ];
    for config in [config(Isa::Riscv, CoreModel::InOrder), out_of_order(Isa::Riscv)] {
        let run = run(&config, &program);
        assert_eq!(run.reg(6), 1);
        assert_eq!(run.mem64(0x1018), 1);
        assert_eq!(run.counter("lsu.loadsCommitted"), 4);
        assert_eq!(run.counter("lsu.storesCommitted"), 4);
    }
}
