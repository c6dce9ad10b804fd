//! # RISC-V Program Tests
//!
//! Small RV64 programs run on the emulation core, the in-order core and the
//! in-order core over fixed-latency memory. Every configuration must produce the
//! same architectural state.

use pipesim_core::config::{CoreModel, Isa};
use pretty_assertions::assert_eq;

use crate::common::encode::rv::{self, *};
use crate::common::harness::{HEAP, all_models, config, run, run_with_heap};

#[test]
fn test_straight_line_arithmetic() {
    let program = [
        li(5, 40),
        li(6, 2),
        add(7, 5, 6),
        sub(8, 5, 6),
        mul(9, 5, 6),
        div(28, 5, 6),
        slli(29, 6, 10),
    ];
    for config in all_models(Isa::Riscv) {
        let run = run(&config, &program);
        assert_eq!(run.reg(7), 42);
        assert_eq!(run.reg(8), 38);
        assert_eq!(run.reg(9), 80);
        assert_eq!(run.reg(28), 20);
        assert_eq!(run.reg(29), 2048);
        assert_eq!(run.report.retired(), 7);
    }
}

#[test]
fn test_writes_to_zero_register_are_discarded() {
    let program = [li(0, 7), add(5, 0, 0)];
    for config in all_models(Isa::Riscv) {
        let run = run(&config, &program);
        assert_eq!(run.reg(0), 0);
        assert_eq!(run.reg(5), 0);
    }
}

#[test]
fn test_byte_loads_sign_and_zero_extend() {
    let program = [
        lui(10, 1),
        lb(11, 10, 3),
        lbu(12, 10, 3),
        lw(13, 10, 0),
        lwu(14, 10, 0),
        ld(15, 10, 0),
    ];
    let heap = 0xDEAD_BEEFu32.to_le_bytes();
    for config in all_models(Isa::Riscv) {
        let run = run_with_heap(&config, &program, &heap);
        assert_eq!(run.reg(10), HEAP);
        assert_eq!(run.reg(11), 0xFFFF_FFFF_FFFF_FFDE);
        assert_eq!(run.reg(12), 0xDE);
        assert_eq!(run.reg(13), 0xFFFF_FFFF_DEAD_BEEF);
        assert_eq!(run.reg(14), 0xDEAD_BEEF);
        assert_eq!(run.reg(15), 0xDEAD_BEEF);
    }
}

#[test]
fn test_store_then_load_observes_the_store() {
    let program = [
        lui(10, 1),
        li(5, -3),
        sd(5, 10, 16),
        ld(6, 10, 16),
        sb(0, 10, 16),
        ld(7, 10, 16),
    ];
    for config in all_models(Isa::Riscv) {
        let run = run(&config, &program);
        assert_eq!(run.reg(6), (-3i64) as u64);
        assert_eq!(run.reg(7), 0xFFFF_FFFF_FFFF_FF00);
        assert_eq!(run.mem64(HEAP + 16), 0xFFFF_FFFF_FFFF_FF00);
    }
}

#[test]
fn test_counted_loop() {
    // sum = 10 + 9 + ... + 1
    let program = [
        li(5, 10),
        li(6, 0),
        add(6, 6, 5),
        addi(5, 5, -1),
        bne(5, 0, -8),
    ];
    for config in all_models(Isa::Riscv) {
        let run = run(&config, &program);
        assert_eq!(run.reg(6), 55);
        assert_eq!(run.reg(5), 0);
        assert_eq!(run.report.retired(), 2 + 3 * 10);
    }
}

#[test]
fn test_call_and_return() {
    let program = [
        li(10, 4),
        jal(RA, 12),
        addi(10, 10, 100),
        jal(0, 12),
        // double:
        add(10, 10, 10),
        rv::ret(),
        // end:
        rv::NOP,
    ];
    for config in all_models(Isa::Riscv) {
        let run = run(&config, &program);
        assert_eq!(run.reg(10), 108);
        assert_eq!(run.reg(RA), 8);
    }
}

#[test]
fn test_mispredicted_path_leaves_no_trace() {
    let program = [
        li(5, 1),
        bne(5, 0, 12),
        li(6, 99),
        li(7, 99),
        li(8, 3),
    ];
    for config in all_models(Isa::Riscv) {
        let run = run(&config, &program);
        assert_eq!(run.reg(6), 0);
        assert_eq!(run.reg(7), 0);
        assert_eq!(run.reg(8), 3);
        assert_eq!(run.report.retired(), 3);
    }

    let run = run(&config(Isa::Riscv, CoreModel::InOrder), &program);
    assert_eq!(run.counter("branch.mispredict"), 1);
    assert!(run.counter("flushes") >= 1);
}

#[test]
fn test_load_reserved_store_conditional() {
    let program = [
        lui(10, 1),
        lr_d(5, 10),
        addi(5, 5, 1),
        sc_d(6, 5, 10),
        // No reservation is held any more, so this one fails.
        sc_d(7, 0, 10),
        ld(8, 10, 0),
    ];
    let heap = 41u64.to_le_bytes();
    for config in all_models(Isa::Riscv) {
        let run = run_with_heap(&config, &program, &heap);
        assert_eq!(run.reg(6), 0, "first store-conditional succeeds");
        assert_eq!(run.reg(7), 1, "second store-conditional fails");
        assert_eq!(run.reg(8), 42);
    }

    let run = run_with_heap(&config(Isa::Riscv, CoreModel::InOrder), &program, &heap);
    assert_eq!(run.counter("lsu.conditionalFailures"), 1);
}

#[test]
fn test_atomic_add_returns_old_value() {
    let program = [lui(10, 1), li(5, 5), amoadd_d(6, 5, 10), ld(7, 10, 0)];
    let heap = 100u64.to_le_bytes();
    for config in all_models(Isa::Riscv) {
        let run = run_with_heap(&config, &program, &heap);
        assert_eq!(run.reg(6), 100);
        assert_eq!(run.reg(7), 105);
    }
}

#[test]
fn test_compressed_and_full_instructions_mix() {
    // c.nop, then addi x5, x0, 9 at a halfword boundary.
    let mut image = C_NOP.to_le_bytes().to_vec();
    image.extend(li(5, 9).to_le_bytes());
    image.extend(C_NOP.to_le_bytes());
    for config in all_models(Isa::Riscv) {
        let run = crate::common::harness::run_bytes(&config, image.clone(), &[]);
        assert_eq!(run.reg(5), 9);
        assert_eq!(run.report.retired(), 3);
    }
}

#[test]
fn test_zero_words_are_skipped() {
    let program = [li(5, 1), 0, 0, li(6, 2)];
    for config in all_models(Isa::Riscv) {
        let run = run(&config, &program);
        assert_eq!(run.reg(5), 1);
        assert_eq!(run.reg(6), 2);
        assert_eq!(run.report.retired(), 2);
    }
}

#[test]
fn test_stack_pointer_starts_aligned_near_the_top() {
    let program = [addi(5, SP, 0)];
    let run = run(&config(Isa::Riscv, CoreModel::Emulation), &program);
    assert_eq!(run.reg(5) % 16, 0);
    assert!(run.reg(5) > HEAP);
}

#[test]
fn test_in_order_core_takes_more_ticks_over_slow_memory() {
    let program = [li(5, 3), lui(10, 1), ld(6, 10, 0), add(7, 6, 5)];
    let fast = run(&config(Isa::Riscv, CoreModel::InOrder), &program);
    let slow = run(&crate::common::harness::slow_memory(Isa::Riscv, 8), &program);
    assert_eq!(fast.reg(7), slow.reg(7));
    assert!(slow.report.ticks() > fast.report.ticks());
    assert!(fast.report.ipc() <= 1.0);
}
