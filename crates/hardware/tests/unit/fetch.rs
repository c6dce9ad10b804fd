//! # Fetch Unit Tests
//!
//! Drives the fetch unit cycle by cycle against real memory interfaces and
//! collects the macro-ops it delivers.

use pipesim_core::config::{BranchPredictorConfig, Config};
use pipesim_core::core::pipeline::buffer::PipelineBuffer;
use pipesim_core::core::pipeline::fetch::{FetchUnit, LoopBufferState};
use pipesim_core::core::units::bru::BranchPredictorWrapper;
use pipesim_core::isa::{ArchitectureWrapper, MacroOp};
use pipesim_core::memory::{
    FixedLatencyMemoryInterface, FlatMemoryInterface, MemoryInterface, SimpleMemory,
};
use pretty_assertions::assert_eq;

use crate::common::encode::{assemble, rv};

const BLOCK: u64 = 32;

struct Bench<M: MemoryInterface> {
    fetch: FetchUnit,
    output: PipelineBuffer<MacroOp>,
    memory: M,
    isa: ArchitectureWrapper,
    predictor: BranchPredictorWrapper,
    delivered: Vec<u64>,
}

impl<M: MemoryInterface> Bench<M> {
    fn new(image: &[u8], width: usize, memory: impl FnOnce(SimpleMemory) -> M) -> Self {
        let mut store = SimpleMemory::new(4096);
        assert!(store.load(0, image));
        Self {
            fetch: FetchUnit::new(0, image.len() as u64, BLOCK, 8, width),
            output: PipelineBuffer::new(width),
            memory: memory(store),
            isa: ArchitectureWrapper::new(&Config::default()),
            predictor: BranchPredictorWrapper::new(&BranchPredictorConfig::default()),
            delivered: Vec::new(),
        }
    }

    /// One cycle: memory, fetch, then the consumer drains the buffer.
    fn cycle(&mut self) {
        self.memory.tick();
        self.fetch.tick(
            &mut self.output,
            &mut self.memory,
            &mut self.isa,
            &mut self.predictor,
        );
        self.output.tick();
        for slot in self.output.head_slots_mut() {
            if let Some(macro_op) = slot.take() {
                self.delivered.push(macro_op[0].instruction_address());
            }
        }
    }

    fn run(&mut self, cycles: usize) {
        for _ in 0..cycles {
            self.cycle();
        }
    }
}

fn flat(store: SimpleMemory) -> FlatMemoryInterface {
    FlatMemoryInterface::new(store.shared())
}

fn slow(store: SimpleMemory) -> FixedLatencyMemoryInterface {
    FixedLatencyMemoryInterface::new(store.shared(), 3)
}

/// Seven NOPs, a compressed NOP, then a 4-byte instruction straddling the first
/// block boundary at 30..34, followed by two more NOPs.
fn straddling_image() -> Vec<u8> {
    let mut image = assemble(&[rv::NOP; 7]);
    image.extend(rv::C_NOP.to_le_bytes());
    image.extend(assemble(&[rv::li(5, 1), rv::NOP, rv::NOP]));
    image
}

#[test]
fn test_sequential_fetch_over_flat_memory() {
    let image = assemble(&[rv::NOP; 4]);
    let mut bench = Bench::new(&image, 1, flat);
    bench.run(8);
    assert_eq!(bench.delivered, vec![0, 4, 8, 12]);
    assert!(bench.fetch.has_halted());
    assert_eq!(bench.fetch.block_requests(), 1);
}

#[test]
fn test_boundary_crossing_requests_the_next_block_once() {
    let image = straddling_image();
    let mut bench = Bench::new(&image, 16, slow);

    // Run until fetch stops at the straddling instruction.
    for _ in 0..20 {
        bench.cycle();
        if bench.fetch.pc() == 30 {
            break;
        }
    }
    assert_eq!(bench.fetch.pc(), 30);
    assert_eq!(bench.fetch.pending_requests(), &[BLOCK]);
    assert!(bench.fetch.is_cached(0));
    assert!(!bench.fetch.is_cached(BLOCK));

    // Stalled cycles while the second block is in flight issue no new requests.
    bench.cycle();
    assert_eq!(bench.fetch.pc(), 30);
    assert_eq!(bench.fetch.block_requests(), 2);

    bench.run(10);
    assert_eq!(bench.fetch.block_requests(), 2);
    assert!(bench.fetch.is_cached(BLOCK));
    assert_eq!(
        bench.delivered,
        vec![0, 4, 8, 12, 16, 20, 24, 28, 30, 34, 38]
    );
    assert!(bench.fetch.has_halted());
}

#[test]
fn test_predicted_taken_branch_ends_the_fetch_cycle() {
    let image = assemble(&[rv::jal(0, 8), rv::NOP, rv::NOP, rv::NOP]);
    let mut bench = Bench::new(&image, 4, flat);

    bench.run(2);
    assert_eq!(bench.delivered, vec![0]);
    assert_eq!(bench.fetch.pc(), 8);
    assert_eq!(bench.fetch.branch_stalls(), 1);
    assert_eq!(bench.fetch.branches_fetched(), 1);

    bench.run(2);
    assert_eq!(bench.delivered, vec![0, 8, 12]);
}

#[test]
fn test_redirect_discards_queued_work() {
    let image = assemble(&[rv::NOP; 16]);
    let mut bench = Bench::new(&image, 2, slow);
    bench.run(2);
    assert!(!bench.fetch.pending_requests().is_empty());

    bench.fetch.update_pc(0x24, &mut bench.predictor);
    assert_eq!(bench.fetch.pc(), 0x24);
    assert!(bench.fetch.is_empty());
    assert!(bench.fetch.pending_requests().is_empty());

    bench.run(12);
    assert_eq!(bench.delivered.first(), Some(&0x24));
    assert!(bench.delivered.windows(2).all(|w| w[1] == w[0] + 4));
    assert_eq!(bench.delivered.last(), Some(&0x3C));
}

#[test]
fn test_redirect_past_the_program_halts_fetch() {
    let image = assemble(&[rv::NOP; 4]);
    let mut bench = Bench::new(&image, 1, flat);
    bench.fetch.update_pc(0x100, &mut bench.predictor);
    assert!(bench.fetch.has_halted());
    bench.run(4);
    assert!(bench.delivered.is_empty());
}

#[test]
fn test_fetch_past_the_end_of_memory_halts() {
    let image = assemble(&[rv::NOP; 2]);
    let mut store = SimpleMemory::new(64);
    assert!(store.load(0, &image));
    let mut fetch = FetchUnit::new(0x40, 0x80, BLOCK, 8, 1);
    let mut output = PipelineBuffer::new(1);
    let mut memory = FlatMemoryInterface::new(store.shared());
    let mut isa = ArchitectureWrapper::new(&Config::default());
    let mut predictor = BranchPredictorWrapper::new(&BranchPredictorConfig::default());

    for _ in 0..3 {
        fetch.tick(&mut output, &mut memory, &mut isa, &mut predictor);
    }
    assert!(fetch.has_halted());
}

#[test]
fn test_loop_buffer_records_then_replays_the_body() {
    let image = assemble(&[rv::NOP, rv::NOP, rv::jal(0, -8)]);
    let mut bench = Bench::new(&image, 1, flat);
    bench.fetch = FetchUnit::new(0, image.len() as u64, BLOCK, 8, 1).with_loop_buffer(8);
    bench.fetch.register_loop_boundary(8);
    assert_eq!(bench.fetch.loop_buffer_state(), LoopBufferState::Waiting);

    bench.run(12);
    assert_eq!(bench.fetch.loop_buffer_state(), LoopBufferState::Supplying);
    assert_eq!(bench.fetch.loop_buffer_len(), 3);
    assert!(bench.fetch.loop_supplied() > 0);
    let requests = bench.fetch.block_requests();

    bench.run(9);
    assert_eq!(bench.fetch.block_requests(), requests);
    let tail = &bench.delivered[bench.delivered.len() - 9..];
    for window in tail.windows(2) {
        assert_eq!(window[1], (window[0] + 4) % 12);
    }

    bench.fetch.update_pc(4, &mut bench.predictor);
    assert_eq!(bench.fetch.loop_buffer_state(), LoopBufferState::Idle);
    assert_eq!(bench.fetch.loop_buffer_len(), 0);
}

#[test]
fn test_loop_larger_than_the_buffer_is_abandoned() {
    let image = assemble(&[rv::NOP, rv::NOP, rv::NOP, rv::jal(0, -12)]);
    let mut bench = Bench::new(&image, 1, flat);
    bench.fetch = FetchUnit::new(0, image.len() as u64, BLOCK, 8, 1).with_loop_buffer(2);
    bench.fetch.register_loop_boundary(12);

    bench.run(16);
    assert_eq!(bench.fetch.loop_buffer_state(), LoopBufferState::Idle);
    assert_eq!(bench.fetch.loop_supplied(), 0);
}

#[test]
fn test_boundary_is_ignored_without_a_loop_buffer() {
    let image = assemble(&[rv::NOP, rv::jal(0, -4)]);
    let mut bench = Bench::new(&image, 1, flat);
    bench.fetch.register_loop_boundary(4);
    assert_eq!(bench.fetch.loop_buffer_state(), LoopBufferState::Idle);
    bench.run(8);
    assert_eq!(bench.fetch.loop_supplied(), 0);
}
