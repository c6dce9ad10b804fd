//! # Core Parity Tests
//!
//! Both timing cores must reach the same architectural state as the emulation
//! core for any program; only timing may differ. Programs here are generated from
//! random straight-line arithmetic and a few fixed control-flow kernels.

use pipesim_core::common::reg::Register;
use pipesim_core::config::{CoreModel, Isa, MemoryInterfaceKind, PredictorKind, StaticPolicy};
use pretty_assertions::assert_eq;
use proptest::prelude::*;

use crate::common::encode::rv;
use crate::common::harness::{Run, config, out_of_order, run, slow_memory};

fn general_registers(run: &Run) -> Vec<u64> {
    (0..32)
        .map(|tag| run.sim.registers().get(Register::general(tag)).get())
        .collect()
}

fn assert_parity(words: &[u32]) {
    let reference = run(&config(Isa::Riscv, CoreModel::Emulation), words);
    let expected = general_registers(&reference);

    let mut gshare = config(Isa::Riscv, CoreModel::InOrder);
    gshare.branch_predictor.kind = PredictorKind::GShare;
    let mut taken = config(Isa::Riscv, CoreModel::InOrder);
    taken.branch_predictor.static_policy = StaticPolicy::AlwaysTaken;
    let mut ooo_gshare = out_of_order(Isa::Riscv);
    ooo_gshare.branch_predictor.kind = PredictorKind::GShare;
    let mut ooo_slow = out_of_order(Isa::Riscv);
    ooo_slow.memory.instruction_interface = MemoryInterfaceKind::FixedLatency;
    ooo_slow.memory.data_interface = MemoryInterfaceKind::FixedLatency;
    ooo_slow.memory.latency = 4;

    for config in [
        config(Isa::Riscv, CoreModel::InOrder),
        slow_memory(Isa::Riscv, 5),
        gshare,
        taken,
        out_of_order(Isa::Riscv),
        ooo_gshare,
        ooo_slow,
    ] {
        let pipelined = run(&config, words);
        assert_eq!(general_registers(&pipelined), expected);
        assert_eq!(pipelined.report.retired(), reference.report.retired());
        // Only the single-issue core is bounded by one macro-op per tick.
        if config.core.model == CoreModel::InOrder {
            assert!(pipelined.report.ticks() >= reference.report.ticks());
        }
    }
}

/// Register-to-register and immediate operations over x5..x12.
fn arithmetic() -> impl Strategy<Value = u32> {
    let reg = 5u32..13;
    prop_oneof![
        (reg.clone(), reg.clone(), -64i32..64).prop_map(|(d, s, imm)| rv::addi(d, s, imm)),
        (reg.clone(), reg.clone(), reg.clone()).prop_map(|(d, a, b)| rv::add(d, a, b)),
        (reg.clone(), reg.clone(), reg.clone()).prop_map(|(d, a, b)| rv::sub(d, a, b)),
        (reg.clone(), reg.clone(), reg.clone()).prop_map(|(d, a, b)| rv::mul(d, a, b)),
        (reg.clone(), reg.clone(), reg.clone()).prop_map(|(d, a, b)| rv::div(d, a, b)),
        (reg.clone(), reg, 0u32..8).prop_map(|(d, s, sh)| rv::slli(d, s, sh)),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn test_random_arithmetic_matches_emulation(body in prop::collection::vec(arithmetic(), 1..24)) {
        let mut words = vec![rv::li(5, 3), rv::li(6, -7), rv::li(7, 11)];
        words.extend(body);
        assert_parity(&words);
    }
}

#[test]
fn test_memory_kernel_matches_emulation() {
    // Fill eight doublewords, then sum them back.
    assert_parity(&[
        rv::lui(10, 1),
        rv::li(5, 8),
        rv::addi(11, 10, 0),
        // fill:
        rv::sd(5, 11, 0),
        rv::addi(11, 11, 8),
        rv::addi(5, 5, -1),
        rv::bne(5, 0, -12),
        rv::li(5, 8),
        rv::li(6, 0),
        // sum:
        rv::ld(7, 10, 0),
        rv::add(6, 6, 7),
        rv::addi(10, 10, 8),
        rv::addi(5, 5, -1),
        rv::bne(5, 0, -16),
    ]);
}

#[test]
fn test_nested_calls_match_emulation() {
    assert_parity(&[
        rv::li(10, 1),
        rv::li(12, 5),
        // loop:
        rv::jal(rv::RA, 20),
        rv::addi(12, 12, -1),
        rv::bne(12, 0, -8),
        rv::jal(0, 24),
        rv::NOP,
        // double (at 28):
        rv::add(10, 10, 10),
        rv::blt(10, 0, 8),
        rv::addi(13, 13, 1),
        rv::ret(),
        // end:
        rv::NOP,
    ]);
}

#[test]
fn test_dependent_load_chain_matches_emulation() {
    // Each doubleword holds the address of the next.
    let mut heap = Vec::new();
    for i in 1..=4u64 {
        heap.extend((0x1000 + 8 * i).to_le_bytes());
    }
    let words = [rv::lui(10, 1), rv::ld(10, 10, 0), rv::ld(10, 10, 0), rv::ld(10, 10, 0)];

    let reference =
        crate::common::harness::run_with_heap(&config(Isa::Riscv, CoreModel::Emulation), &words, &heap);
    let pipelined = crate::common::harness::run_with_heap(&slow_memory(Isa::Riscv, 4), &words, &heap);
    let reordered = crate::common::harness::run_with_heap(&out_of_order(Isa::Riscv), &words, &heap);
    assert_eq!(reference.reg(10), 0x1018);
    assert_eq!(pipelined.reg(10), 0x1018);
    assert_eq!(reordered.reg(10), 0x1018);
}
