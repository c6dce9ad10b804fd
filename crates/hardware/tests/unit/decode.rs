//! # Decode Tests
//!
//! Covers the decode cache, micro-op group classification and the decode unit's
//! early misprediction handling.

use pipesim_core::config::{Config, Isa};
use pipesim_core::core::pipeline::buffer::PipelineBuffer;
use pipesim_core::core::pipeline::decode::DecodeUnit;
use pipesim_core::core::units::bru::{BranchPrediction, BranchPredictorWrapper};
use pipesim_core::isa::group::{InstructionFlags, InstructionGroup};
use pipesim_core::isa::instruction::Instruction;
use pipesim_core::isa::{Architecture, ArchitectureWrapper, MacroOp, Predecode};
use pretty_assertions::assert_eq;
use proptest::prelude::*;

use crate::common::encode::{a64, rv};

fn architecture(isa: Isa) -> ArchitectureWrapper {
    let mut config = Config::default();
    config.core.isa = isa;
    ArchitectureWrapper::new(&config)
}

fn macro_op(isa: &mut ArchitectureWrapper, word: u32, address: u64) -> MacroOp {
    match isa.predecode(&word.to_le_bytes(), address) {
        Predecode::Decoded { macro_op, .. } => macro_op,
        other => panic!("{word:#010x} did not decode: {other:?}"),
    }
}

fn first(isa: &mut ArchitectureWrapper, word: u32, address: u64) -> Instruction {
    macro_op(isa, word, address).remove(0)
}

// ══════════════════════════════════════════════════════════
// Decode cache
// ══════════════════════════════════════════════════════════

fn assert_same_decode(a: &[Instruction], b: &[Instruction]) {
    assert_eq!(a.len(), b.len());
    for (x, y) in a.iter().zip(b) {
        assert_eq!(x.opcode(), y.opcode());
        assert_eq!(x.metadata_id(), y.metadata_id());
        assert_eq!(x.group(), y.group());
        assert_eq!(x.source_registers(), y.source_registers());
        assert_eq!(x.destination_registers(), y.destination_registers());
        assert_eq!(x.exception(), y.exception());
        assert_eq!(x.execution_info(), y.execution_info());
    }
}

proptest! {
    #[test]
    fn test_riscv_decode_is_cached_and_repeatable(word in any::<u32>()) {
        let word = word | 0b11;
        let mut isa = architecture(Isa::Riscv);
        let a = macro_op(&mut isa, word, 0x100);
        let cached = isa.decode_cache_len();
        let b = macro_op(&mut isa, word, 0x2000);

        prop_assert_eq!(isa.decode_cache_len(), cached);
        assert_same_decode(&a, &b);
        prop_assert!(b.iter().all(|uop| uop.instruction_address() == 0x2000));
        prop_assert!(a[0].sequence_id() != b[0].sequence_id());
    }

    #[test]
    fn test_aarch64_decode_is_cached_and_repeatable(word in 1u32..) {
        let mut isa = architecture(Isa::Aarch64);
        let a = macro_op(&mut isa, word, 0x100);
        let b = macro_op(&mut isa, word, 0x104);
        prop_assert_eq!(isa.decode_cache_len(), 1);
        assert_same_decode(&a, &b);
        prop_assert!(a.last().is_some_and(Instruction::is_last_micro_op));
    }
}

#[test]
fn test_each_encoding_is_cached_once() {
    let mut isa = architecture(Isa::Riscv);
    for address in (0..64).step_by(4) {
        let _ = macro_op(&mut isa, rv::add(5, 6, 7), address);
        let _ = macro_op(&mut isa, rv::NOP, address);
    }
    assert_eq!(isa.decode_cache_len(), 2);
}

#[test]
fn test_split_store_shares_one_instruction_id() {
    let mut isa = architecture(Isa::Aarch64);
    let uops = macro_op(&mut isa, a64::str(2, 1, 8), 0x40);
    assert_eq!(uops.len(), 2);
    assert_eq!(uops[0].instruction_id(), uops[1].instruction_id());
    assert!(uops[0].sequence_id() < uops[1].sequence_id());
    assert!(!uops[0].is_last_micro_op());
    assert!(uops[1].is_last_micro_op());
}

#[test]
fn test_misaligned_pc_faults_at_decode() {
    let mut isa = architecture(Isa::Aarch64);
    let uop = first(&mut isa, a64::NOP, 0x42);
    assert!(uop.exception_encountered());
}

#[test]
fn test_all_zero_word_is_skipped() {
    let mut riscv = architecture(Isa::Riscv);
    assert_eq!(riscv.predecode(&[0; 4], 0), Predecode::Skip);
    let mut arm = architecture(Isa::Aarch64);
    assert_eq!(arm.predecode(&[0; 4], 0), Predecode::Skip);
}

#[test]
fn test_short_window_needs_more_bytes() {
    let mut isa = architecture(Isa::Riscv);
    let bytes = rv::add(5, 6, 7).to_le_bytes();
    assert_eq!(isa.predecode(&bytes[..2], 0), Predecode::NeedMoreBytes);
    let mut isa = architecture(Isa::Aarch64);
    assert_eq!(isa.predecode(&bytes[..3], 0), Predecode::NeedMoreBytes);
}

// ══════════════════════════════════════════════════════════
// Group classification
// ══════════════════════════════════════════════════════════

#[test]
fn test_group_priority() {
    let f = InstructionFlags::default;
    let cases = [
        (
            InstructionFlags {
                is_branch: true,
                is_load: true,
                ..f()
            },
            InstructionGroup::Branch,
        ),
        (
            InstructionFlags {
                is_load: true,
                is_store_address: true,
                ..f()
            },
            InstructionGroup::LoadInt,
        ),
        (
            InstructionFlags {
                is_store_address: true,
                is_divide: true,
                ..f()
            },
            InstructionGroup::StoreInt,
        ),
        (
            InstructionFlags {
                is_divide: true,
                is_multiply: true,
                ..f()
            },
            InstructionGroup::IntDiv,
        ),
        (
            InstructionFlags {
                is_multiply: true,
                is_shift: true,
                ..f()
            },
            InstructionGroup::IntMul,
        ),
        (
            InstructionFlags {
                is_shift: true,
                is_logical: true,
                ..f()
            },
            InstructionGroup::IntSimpleShift,
        ),
        (
            InstructionFlags {
                is_logical: true,
                is_compare: true,
                ..f()
            },
            InstructionGroup::IntSimpleLogical,
        ),
        (
            InstructionFlags {
                is_compare: true,
                ..f()
            },
            InstructionGroup::IntSimpleCompare,
        ),
        (f(), InstructionGroup::IntSimpleArithmetic),
    ];
    for (flags, group) in cases {
        assert_eq!(flags.group(), group, "{flags:?}");
    }
}

#[test]
fn test_decoded_groups() {
    let mut isa = architecture(Isa::Riscv);
    assert_eq!(first(&mut isa, rv::add(5, 6, 7), 0).group(), InstructionGroup::IntSimpleArithmetic);
    assert_eq!(first(&mut isa, rv::mul(5, 6, 7), 0).group(), InstructionGroup::IntMul);
    assert_eq!(first(&mut isa, rv::div(5, 6, 7), 0).group(), InstructionGroup::IntDiv);
    assert_eq!(first(&mut isa, rv::ld(5, 6, 0), 0).group(), InstructionGroup::LoadInt);
    assert_eq!(first(&mut isa, rv::sd(5, 6, 0), 0).group(), InstructionGroup::StoreInt);
    assert_eq!(first(&mut isa, rv::beq(5, 6, 8), 0).group(), InstructionGroup::Branch);
    assert_eq!(first(&mut isa, rv::amoadd_d(5, 6, 7), 0).group(), InstructionGroup::LoadInt);
}

#[test]
fn test_default_timing_reaches_decoded_micro_ops() {
    let mut isa = architecture(Isa::Riscv);
    let mul = first(&mut isa, rv::mul(5, 6, 7), 0);
    assert_eq!(mul.latency(), 3);
    let div = first(&mut isa, rv::div(5, 6, 7), 0);
    assert_eq!(div.latency(), 12);
    assert_eq!(div.stall_cycles(), 12);
    let add = first(&mut isa, rv::add(5, 6, 7), 0);
    assert_eq!(add.latency(), 1);
    assert_eq!(add.execution_info().ports, vec![0]);
}

// ══════════════════════════════════════════════════════════
// Early misprediction
// ══════════════════════════════════════════════════════════

#[test]
fn test_non_branch_predicted_taken_is_caught_early() {
    let mut isa = architecture(Isa::Riscv);
    let mut nop = first(&mut isa, rv::NOP, 0x10);
    nop.set_branch_prediction(BranchPrediction::taken(0x80));
    assert_eq!(nop.check_early_branch_misprediction(), (true, 0x14));

    nop.set_branch_prediction(BranchPrediction::not_taken(0x14));
    assert!(!nop.check_early_branch_misprediction().0);
}

#[test]
fn test_direct_branch_to_wrong_target_is_caught_early() {
    let mut isa = architecture(Isa::Riscv);
    let mut jump = first(&mut isa, rv::jal(0, 0x40), 0x10);
    jump.set_branch_prediction(BranchPrediction::taken(0x30));
    assert_eq!(jump.check_early_branch_misprediction(), (true, 0x50));

    jump.set_branch_prediction(BranchPrediction::taken(0x50));
    assert!(!jump.check_early_branch_misprediction().0);
}

#[test]
fn test_indirect_branch_cannot_be_checked_early() {
    let mut isa = architecture(Isa::Riscv);
    let mut ret = first(&mut isa, rv::ret(), 0x10);
    ret.set_branch_prediction(BranchPrediction::taken(0x1234));
    assert!(!ret.check_early_branch_misprediction().0);
}

#[test]
fn test_decode_unit_flushes_behind_an_early_misprediction() {
    let mut isa = architecture(Isa::Riscv);
    let mut bp = BranchPredictorWrapper::new(&Config::default().branch_predictor);
    let mut decode = DecodeUnit::new();
    let mut input: PipelineBuffer<MacroOp> = PipelineBuffer::new(2);
    let mut output: PipelineBuffer<Instruction> = PipelineBuffer::new(1);

    let mut wrong = macro_op(&mut isa, rv::NOP, 0);
    wrong[0].set_branch_prediction(BranchPrediction::taken(0x40));
    let younger = macro_op(&mut isa, rv::add(5, 6, 7), 0x40);
    input.tail_slots_mut()[0] = Some(wrong);
    input.tail_slots_mut()[1] = Some(younger);
    input.tick();

    decode.tick(&mut input, &mut output, &mut bp);

    assert!(decode.should_flush());
    assert_eq!(decode.flush_address(), 4);
    assert_eq!(decode.early_flushes(), 1);
    assert!(decode.is_empty(), "younger micro-ops are discarded");

    let kept = output.tail_slots()[0].as_ref().unwrap();
    assert_eq!(kept.instruction_address(), 0);
    assert!(!kept.branch_prediction().is_taken);
}

#[test]
fn test_decode_unit_keeps_rest_of_macro_op_on_early_flush() {
    let mut isa = architecture(Isa::Aarch64);
    let mut bp = BranchPredictorWrapper::new(&Config::default().branch_predictor);
    let mut decode = DecodeUnit::new();
    let mut input: PipelineBuffer<MacroOp> = PipelineBuffer::new(2);
    let mut output: PipelineBuffer<Instruction> = PipelineBuffer::new(1);

    // A split store wrongly predicted taken: both halves survive the flush.
    let mut store = macro_op(&mut isa, a64::str(2, 1, 8), 0);
    store[0].set_branch_prediction(BranchPrediction::taken(0x40));
    input.tail_slots_mut()[0] = Some(store);
    input.tail_slots_mut()[1] = Some(macro_op(&mut isa, a64::NOP, 0x40));
    input.tick();

    decode.tick(&mut input, &mut output, &mut bp);

    assert!(decode.should_flush());
    assert_eq!(decode.flush_address(), 4);
    assert_eq!(decode.queued(), 1);

    // The data half follows on the next cycle without another flush.
    let _ = output.drain();
    decode.tick(&mut input, &mut output, &mut bp);
    assert!(!decode.should_flush());
    let data = output.tail_slots()[0].as_ref().unwrap();
    assert!(data.is_store_data());
    assert!(decode.is_empty());
}
