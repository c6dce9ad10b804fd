//! # Memory Interface Tests
//!
//! Verifies the completion timing and data of the flat and fixed-latency
//! interfaces over a shared backing store.

use std::rc::Rc;

use pipesim_core::common::reg::RegisterValue;
use pipesim_core::memory::*;
use pretty_assertions::assert_eq;

fn backing() -> SharedMemory {
    let mut memory = SimpleMemory::new(256);
    assert!(memory.load(0x10, &[0xEF, 0xBE, 0xAD, 0xDE]));
    memory.shared()
}

#[test]
fn test_flat_read_completes_in_the_request_call() {
    let mut flat = FlatMemoryInterface::new(backing());
    flat.request_read(MemoryAccessTarget::new(0x10, 4), 9);
    assert!(!flat.has_pending_requests());

    let reads = flat.completed_reads();
    assert_eq!(reads.len(), 1);
    assert_eq!(reads[0].request_id, 9);
    assert_eq!(reads[0].value(), Some(RegisterValue::new(0xDEAD_BEEF, 4)));

    flat.clear_completed_reads();
    assert!(flat.completed_reads().is_empty());
}

#[test]
fn test_flat_out_of_range_read_faults() {
    let mut flat = FlatMemoryInterface::new(backing());
    flat.request_read(MemoryAccessTarget::new(254, 4), 1);
    assert_eq!(flat.completed_reads()[0].data, None);
    assert_eq!(flat.completed_reads()[0].value(), None);
}

#[test]
fn test_flat_write_is_visible_immediately() {
    let memory = backing();
    let mut flat = FlatMemoryInterface::new(Rc::clone(&memory));
    flat.request_write(MemoryAccessTarget::new(0x20, 2), RegisterValue::new(0xABCD, 8));
    assert_eq!(
        memory.borrow().read(MemoryAccessTarget::new(0x20, 3)),
        Some(vec![0xCD, 0xAB, 0x00])
    );
}

#[test]
fn test_fixed_latency_read_completes_after_latency_ticks() {
    let mut slow = FixedLatencyMemoryInterface::new(backing(), 3);
    slow.request_read(MemoryAccessTarget::new(0x10, 1), 4);
    assert!(slow.has_pending_requests());

    slow.tick();
    slow.tick();
    assert!(slow.completed_reads().is_empty());
    slow.tick();

    assert!(!slow.has_pending_requests());
    assert_eq!(slow.completed_reads()[0].data, Some(vec![0xEF]));
}

#[test]
fn test_fixed_latency_preserves_request_order() {
    let memory = backing();
    let mut slow = FixedLatencyMemoryInterface::new(Rc::clone(&memory), 2);
    slow.request_write(MemoryAccessTarget::new(0x10, 1), RegisterValue::new(0x11, 1));
    slow.request_read(MemoryAccessTarget::new(0x10, 1), 1);
    slow.tick();
    slow.request_read(MemoryAccessTarget::new(0x11, 1), 2);
    slow.tick();

    // The write lands before the read queued behind it.
    let reads = slow.completed_reads();
    assert_eq!(reads.len(), 1);
    assert_eq!(reads[0].data, Some(vec![0x11]));
    assert_eq!(memory.borrow().read(MemoryAccessTarget::new(0x10, 1)), Some(vec![0x11]));

    slow.tick();
    let ids: Vec<u64> = slow.completed_reads().iter().map(|r| r.request_id).collect();
    assert_eq!(ids, vec![1, 2]);
}

#[test]
fn test_targets_overlap() {
    let a = MemoryAccessTarget::new(0x100, 8);
    assert!(a.overlaps(&MemoryAccessTarget::new(0x107, 1)));
    assert!(a.overlaps(&MemoryAccessTarget::new(0xFC, 8)));
    assert!(!a.overlaps(&MemoryAccessTarget::new(0x108, 4)));
    assert!(!a.overlaps(&MemoryAccessTarget::new(0xF8, 8)));
}
