//! # AArch64 Program Tests
//!
//! Small AArch64 programs run on every core configuration, covering flag-setting
//! arithmetic, carries, compare-and-swap, loads, stores and calls.

use pipesim_core::config::{CoreModel, Isa};
use pretty_assertions::assert_eq;

use crate::common::encode::a64::*;
use crate::common::harness::{HEAP, all_models, config, run, run_with_heap};

#[test]
fn test_add_with_carry_consumes_the_carry_flag() {
    // 1 - 0 borrows nothing, so C is set: 5 + 9 + 1.
    let program = [
        movz(1, 5),
        movz(2, 9),
        movz(3, 1),
        subs_imm(4, 3, 0),
        adc(0, 1, 2),
    ];
    for config in all_models(Isa::Aarch64) {
        let run = run(&config, &program);
        assert_eq!(run.reg(4), 1);
        assert_eq!(run.reg(0), 15);
    }
}

#[test]
fn test_add_with_carry_after_borrow() {
    // 1 - 2 borrows, so C is clear.
    let program = [
        movz(1, 5),
        movz(2, 9),
        movz(3, 1),
        subs_imm(4, 3, 2),
        adc(0, 1, 2),
    ];
    for config in all_models(Isa::Aarch64) {
        let run = run(&config, &program);
        assert_eq!(run.reg(4), u64::MAX);
        assert_eq!(run.reg(0), 14);
    }
}

#[test]
fn test_compare_and_swap_on_match() {
    let program = [movz(1, HEAP as u32), movz(2, 7), movz(3, 9), cas(2, 3, 1)];
    let heap = 7u64.to_le_bytes();
    for config in all_models(Isa::Aarch64) {
        let run = run_with_heap(&config, &program, &heap);
        assert_eq!(run.reg(2), 7, "old value returned");
        assert_eq!(run.mem64(HEAP), 9, "new value stored");
    }
}

#[test]
fn test_compare_and_swap_on_mismatch() {
    let program = [movz(1, HEAP as u32), movz(2, 7), movz(3, 9), cas(2, 3, 1)];
    let heap = 5u64.to_le_bytes();
    for config in all_models(Isa::Aarch64) {
        let run = run_with_heap(&config, &program, &heap);
        assert_eq!(run.reg(2), 5, "old value returned");
        assert_eq!(run.mem64(HEAP), 5, "memory untouched");
    }
}

#[test]
fn test_store_and_load_through_base_register() {
    let program = [
        movz(1, HEAP as u32),
        movz(2, 77),
        str(2, 1, 8),
        ldr(3, 1, 8),
        ldrb(4, 1, 0),
        ldrsb(5, 1, 0),
    ];
    let heap = [0xEF];
    for config in all_models(Isa::Aarch64) {
        let run = run_with_heap(&config, &program, &heap);
        assert_eq!(run.reg(3), 77);
        assert_eq!(run.reg(4), 0xEF);
        assert_eq!(run.reg(5), 0xFFFF_FFFF_FFFF_FFEF);
        assert_eq!(run.mem64(HEAP + 8), 77);
    }
}

#[test]
fn test_compare_and_branch_loop() {
    let program = [
        movz(1, 10),
        movz(0, 0),
        add(0, 0, 1),
        sub_imm(1, 1, 1),
        cbnz(1, -8),
    ];
    for config in all_models(Isa::Aarch64) {
        let run = run(&config, &program);
        assert_eq!(run.reg(0), 55);
        assert_eq!(run.report.retired(), 2 + 3 * 10);
    }
}

#[test]
fn test_conditional_branch_on_flags() {
    let program = [
        movz(1, 3),
        movz(0, 0),
        add_imm(0, 0, 2),
        subs_imm(1, 1, 1),
        b_ne(-8),
    ];
    for config in all_models(Isa::Aarch64) {
        let run = run(&config, &program);
        assert_eq!(run.reg(0), 6);
        assert_eq!(run.reg(1), 0);
    }
}

#[test]
fn test_branch_with_link_and_return() {
    let program = [
        movz(0, 4),
        bl(12),
        add_imm(0, 0, 100),
        b(12),
        // double:
        add(0, 0, 0),
        RET,
        // end:
        NOP,
    ];
    for config in all_models(Isa::Aarch64) {
        let run = run(&config, &program);
        assert_eq!(run.reg(0), 108);
        assert_eq!(run.reg(30), 8);
    }
}

#[test]
fn test_in_order_loop_trains_the_predictor() {
    let program = [
        movz(1, 50),
        movz(0, 0),
        add(0, 0, 1),
        sub_imm(1, 1, 1),
        cbnz(1, -8),
    ];
    let mut config = config(Isa::Aarch64, CoreModel::InOrder);
    config.branch_predictor.kind = pipesim_core::config::PredictorKind::GShare;
    let run = run(&config, &program);
    assert_eq!(run.reg(0), 1275);
    assert_eq!(run.counter("branch.executed"), 50);
    // Warm-up mispredicts while the global history fills, then the loop is learnt.
    assert!(run.counter("branch.mispredict") < 25);
}
