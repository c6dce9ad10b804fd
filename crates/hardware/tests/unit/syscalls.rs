//! # System Call and Exception Tests
//!
//! Exercises the exception path end to end: a syscall micro-op reaches commit,
//! its handler runs against the kernel and the core resumes or halts.

use pipesim_core::config::{CoreModel, Isa};
use pretty_assertions::assert_eq;

use crate::common::encode::{a64, rv};
use crate::common::harness::{HEAP, all_models, config, run, run_with_heap};

const SYS_WRITE: i32 = 64;
const SYS_EXIT: i32 = 93;
const SYS_BRK: i32 = 214;
const SYS_GETPID: i32 = 172;

#[test]
fn test_riscv_write_then_exit() {
    let program = [
        rv::li(rv::A0, 1),
        rv::lui(rv::A1, 1),
        rv::li(rv::A2, 3),
        rv::li(rv::A7, SYS_WRITE),
        rv::ECALL,
        rv::addi(5, rv::A0, 0),
        rv::li(rv::A0, 7),
        rv::li(rv::A7, SYS_EXIT),
        rv::ECALL,
        // Never reached.
        rv::li(6, 1),
    ];
    for config in all_models(Isa::Riscv) {
        let run = run_with_heap(&config, &program, b"hi\n");
        assert_eq!(run.report.stdout, b"hi\n");
        assert_eq!(run.report.exit_code(), Some(7));
        assert_eq!(run.reg(5), 3, "write returns the byte count");
        assert_eq!(run.reg(6), 0);
    }
}

#[test]
fn test_riscv_write_to_stderr() {
    let program = [
        rv::li(rv::A0, 2),
        rv::lui(rv::A1, 1),
        rv::li(rv::A2, 4),
        rv::li(rv::A7, SYS_WRITE),
        rv::ECALL,
    ];
    let run = run_with_heap(
        &config(Isa::Riscv, CoreModel::InOrder),
        &program,
        b"oops",
    );
    assert_eq!(run.report.stderr, b"oops");
    assert!(run.report.stdout.is_empty());
    assert_eq!(run.report.stats.stderr_bytes, 4);
}

#[test]
fn test_riscv_getpid_and_brk() {
    let program = [
        rv::li(rv::A7, SYS_GETPID),
        rv::ECALL,
        rv::addi(5, rv::A0, 0),
        rv::li(rv::A0, 0),
        rv::li(rv::A7, SYS_BRK),
        rv::ECALL,
        rv::addi(6, rv::A0, 0),
    ];
    for config in all_models(Isa::Riscv) {
        let run = run(&config, &program);
        assert_eq!(run.reg(5), 0);
        assert_eq!(run.reg(6), HEAP, "brk(0) reports the initial break");
        assert_eq!(run.report.retired(), 7);
    }
}

#[test]
fn test_aarch64_write_then_exit() {
    let program = [
        a64::movz(0, 1),
        a64::movz(1, HEAP as u32),
        a64::movz(2, 2),
        a64::movz(a64::X8, SYS_WRITE as u32),
        a64::SVC,
        a64::movz(0, 3),
        a64::movz(a64::X8, SYS_EXIT as u32),
        a64::SVC,
    ];
    for config in all_models(Isa::Aarch64) {
        let run = run_with_heap(&config, &program, b"ok");
        assert_eq!(run.report.stdout, b"ok");
        assert_eq!(run.report.exit_code(), Some(3));
    }
}

#[test]
fn test_unknown_syscall_halts() {
    let program = [rv::li(rv::A7, 999), rv::ECALL, rv::li(5, 1)];
    for config in all_models(Isa::Riscv) {
        let run = run(&config, &program);
        assert_eq!(run.reg(5), 0);
        assert_eq!(run.report.exit_code(), None);
    }
}

#[test]
fn test_unallocated_encoding_halts_at_commit() {
    // custom-0 major opcode; nothing decodes it.
    let program = [rv::li(5, 1), 0x0000_000B, rv::li(6, 1)];
    for config in all_models(Isa::Riscv) {
        let run = run(&config, &program);
        assert_eq!(run.reg(5), 1, "older instruction still commits");
        assert_eq!(run.reg(6), 0, "younger instruction never commits");
        assert_eq!(run.report.retired(), 1);
    }
}

#[test]
fn test_exception_on_wrong_path_is_discarded() {
    // The faulting word sits on the not-taken side of a taken branch.
    let program = [
        rv::li(5, 1),
        rv::bne(5, 0, 8),
        0x0000_000B,
        rv::li(6, 2),
    ];
    for config in all_models(Isa::Riscv) {
        let run = run(&config, &program);
        assert_eq!(run.reg(6), 2);
        assert_eq!(run.report.retired(), 3);
    }
}

#[test]
fn test_retired_counter_register_follows_commits() {
    // rdinstret a0 (csrrs a0, instret, x0)
    let rdinstret = (0xC02 << 20) | (0b010 << 12) | (rv::A0 << 7) | 0x73;
    let program = [rv::li(5, 1), rv::li(6, 2), rdinstret];
    let run = run(&config(Isa::Riscv, CoreModel::Emulation), &program);
    assert_eq!(run.reg(rv::A0), 2);
}
