//! # Branch Predictor Tests
//!
//! Drives the predictors through [`BranchPredictorWrapper`] exactly as fetch,
//! decode and execute do: predict at fetch, update on resolution, flush on discard.

use pipesim_core::config::{BranchPredictorConfig, PredictorKind, StaticPolicy};
use pipesim_core::core::units::bru::{
    BranchPrediction, BranchPredictor, BranchPredictorWrapper, BranchType,
};
use pretty_assertions::assert_eq;
use rstest::rstest;

fn predictor(kind: PredictorKind, policy: StaticPolicy) -> BranchPredictorWrapper {
    BranchPredictorWrapper::new(&BranchPredictorConfig {
        kind,
        static_policy: policy,
        ras_size: 4,
        btb_size: 16,
        history_bits: 4,
    })
}

#[rstest]
#[case(StaticPolicy::AlwaysTaken, -16, true)]
#[case(StaticPolicy::AlwaysTaken, 16, true)]
#[case(StaticPolicy::AlwaysNotTaken, -16, false)]
#[case(StaticPolicy::BackwardTakenForwardNotTaken, -16, true)]
#[case(StaticPolicy::BackwardTakenForwardNotTaken, 16, false)]
#[case(StaticPolicy::ForwardTakenBackwardNotTaken, 16, true)]
#[case(StaticPolicy::ForwardTakenBackwardNotTaken, -16, false)]
fn test_static_conditional_policy(
    #[case] policy: StaticPolicy,
    #[case] offset: i64,
    #[case] taken: bool,
) {
    let mut bp = predictor(PredictorKind::Static, policy);
    let prediction = bp.predict(0x100, BranchType::Conditional, Some(offset), 4);
    if taken {
        assert_eq!(prediction, BranchPrediction::taken(0x100u64.wrapping_add_signed(offset)));
    } else {
        assert_eq!(prediction, BranchPrediction::not_taken(0x104));
    }
}

#[rstest]
#[case(PredictorKind::Static)]
#[case(PredictorKind::GShare)]
fn test_direct_jumps_are_taken(#[case] kind: PredictorKind) {
    let mut bp = predictor(kind, StaticPolicy::AlwaysNotTaken);
    assert_eq!(
        bp.predict(0x40, BranchType::Unconditional, Some(0x20), 4),
        BranchPrediction::taken(0x60)
    );
    // An indirect jump with no history falls through.
    assert_eq!(
        bp.predict(0x40, BranchType::Unconditional, None, 4),
        BranchPrediction::not_taken(0x44)
    );
}

#[rstest]
#[case(PredictorKind::Static)]
#[case(PredictorKind::GShare)]
fn test_return_uses_the_call_site(#[case] kind: PredictorKind) {
    let mut bp = predictor(kind, StaticPolicy::AlwaysNotTaken);
    let _ = bp.predict(0x100, BranchType::SubroutineCall, Some(0x100), 4);
    let _ = bp.predict(0x200, BranchType::SubroutineCall, Some(0x100), 2);
    assert_eq!(
        bp.predict(0x300, BranchType::Return, None, 4),
        BranchPrediction::taken(0x202)
    );
    assert_eq!(
        bp.predict(0x304, BranchType::Return, None, 4),
        BranchPrediction::taken(0x104)
    );
}

#[test]
fn test_flush_undoes_speculative_return_stack_changes() {
    let mut bp = predictor(PredictorKind::Static, StaticPolicy::AlwaysNotTaken);
    let _ = bp.predict(0x100, BranchType::SubroutineCall, Some(0x100), 4);
    bp.update(0x100, true, 0x200, BranchType::SubroutineCall, 1);

    // A return and a nested call fetched down a wrong path, then flushed youngest first.
    let _ = bp.predict(0x300, BranchType::Return, None, 4);
    let _ = bp.predict(0x400, BranchType::SubroutineCall, Some(0x40), 4);
    bp.flush(0x400);
    bp.flush(0x300);

    assert_eq!(
        bp.predict(0x300, BranchType::Return, None, 4),
        BranchPrediction::taken(0x104)
    );
}

#[test]
fn test_flushed_call_leaves_the_stack_empty() {
    let mut bp = predictor(PredictorKind::GShare, StaticPolicy::AlwaysNotTaken);
    let _ = bp.predict(0x100, BranchType::SubroutineCall, Some(0x100), 4);
    bp.flush(0x100);
    assert_eq!(
        bp.predict(0x300, BranchType::Return, None, 4),
        BranchPrediction::not_taken(0x304)
    );
}

#[test]
fn test_gshare_learns_a_taken_branch() {
    let mut bp = predictor(PredictorKind::GShare, StaticPolicy::AlwaysNotTaken);
    // Fill the history with taken outcomes so the index settles, then train.
    for _ in 0..8 {
        let _ = bp.predict(0x80, BranchType::Conditional, Some(-0x20), 4);
        bp.update(0x80, true, 0x60, BranchType::Conditional, 0);
    }
    assert_eq!(
        bp.predict(0x80, BranchType::Conditional, Some(-0x20), 4),
        BranchPrediction::taken(0x60)
    );
}

#[test]
fn test_gshare_learns_an_indirect_target() {
    let mut bp = predictor(PredictorKind::GShare, StaticPolicy::AlwaysNotTaken);
    bp.update(0x80, true, 0x1234, BranchType::Unconditional, 0);
    assert_eq!(
        bp.predict(0x80, BranchType::Unconditional, None, 4),
        BranchPrediction::taken(0x1234)
    );
}

#[test]
fn test_gshare_unlearns_after_not_taken_outcomes() {
    let mut bp = predictor(PredictorKind::GShare, StaticPolicy::AlwaysNotTaken);
    for _ in 0..8 {
        bp.update(0x80, false, 0x84, BranchType::Conditional, 0);
    }
    assert_eq!(
        bp.predict(0x80, BranchType::Conditional, Some(-0x20), 4),
        BranchPrediction::not_taken(0x84)
    );
}
