//! Inter-stage pipeline buffer.
//!
//! A buffer has two rows of `width` slots. The producing stage writes the tail row
//! and the consuming stage reads (and empties) the head row during a cycle; `tick`
//! then swaps the rows so the tail becomes the next head. A stalled buffer does not
//! swap, which holds its contents in place:
//! 1. **Stall:** set by the consumer when it could not drain the head row.
//! 2. **Flush:** empties both rows when a flush discards the wrong path, or only
//!    the entries younger than the flush point.

/// Fixed-width double-row latch between two pipeline stages.
#[derive(Clone, Debug)]
pub struct PipelineBuffer<T> {
    head: Vec<Option<T>>,
    tail: Vec<Option<T>>,
    stalled: bool,
}

impl<T> PipelineBuffer<T> {
    /// Creates an empty buffer with `width` slots per row.
    pub fn new(width: usize) -> Self {
        Self {
            head: std::iter::repeat_with(|| None).take(width).collect(),
            tail: std::iter::repeat_with(|| None).take(width).collect(),
            stalled: false,
        }
    }

    /// Slots per row.
    pub fn width(&self) -> usize {
        self.head.len()
    }

    /// Moves the tail row to the head unless stalled.
    pub fn tick(&mut self) {
        if self.stalled {
            return;
        }
        std::mem::swap(&mut self.head, &mut self.tail);
    }

    /// Sets or clears the stall signal.
    pub fn stall(&mut self, stalled: bool) {
        self.stalled = stalled;
    }

    /// Returns `true` while stalled.
    pub const fn is_stalled(&self) -> bool {
        self.stalled
    }

    /// Slots the consumer reads this cycle.
    pub fn head_slots(&self) -> &[Option<T>] {
        &self.head
    }

    /// Mutable head slots; the consumer takes entries out of them.
    pub fn head_slots_mut(&mut self) -> &mut [Option<T>] {
        &mut self.head
    }

    /// Slots the producer writes this cycle.
    pub fn tail_slots(&self) -> &[Option<T>] {
        &self.tail
    }

    /// Mutable tail slots.
    pub fn tail_slots_mut(&mut self) -> &mut [Option<T>] {
        &mut self.tail
    }

    /// Returns `true` if no slot in either row is occupied.
    pub fn is_empty(&self) -> bool {
        self.head.iter().chain(&self.tail).all(Option::is_none)
    }

    /// Takes every entry out of the buffer, head row first, and clears the stall.
    pub fn drain(&mut self) -> Vec<T> {
        self.stalled = false;
        self.head
            .iter_mut()
            .chain(self.tail.iter_mut())
            .filter_map(Option::take)
            .collect()
    }

    /// Empties every slot whose entry `keep` rejects, in both rows.
    pub fn retain(&mut self, mut keep: impl FnMut(&T) -> bool) {
        for slot in self.head.iter_mut().chain(self.tail.iter_mut()) {
            if slot.as_ref().is_some_and(|entry| !keep(entry)) {
                *slot = None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tail_moves_to_head_on_tick() {
        let mut buffer = PipelineBuffer::new(2);
        buffer.tail_slots_mut()[0] = Some(7);
        buffer.tick();
        assert_eq!(buffer.head_slots(), &[Some(7), None]);
        assert_eq!(buffer.tail_slots(), &[None, None]);
    }

    #[test]
    fn stalled_buffer_holds_contents() {
        let mut buffer = PipelineBuffer::new(1);
        buffer.tail_slots_mut()[0] = Some(1);
        buffer.tick();
        buffer.tail_slots_mut()[0] = Some(2);
        buffer.stall(true);
        buffer.tick();
        assert_eq!(buffer.head_slots(), &[Some(1)]);
        assert_eq!(buffer.tail_slots(), &[Some(2)]);
    }

    #[test]
    fn drain_empties_both_rows() {
        let mut buffer = PipelineBuffer::new(1);
        buffer.tail_slots_mut()[0] = Some(1);
        buffer.tick();
        buffer.tail_slots_mut()[0] = Some(2);
        buffer.stall(true);
        assert_eq!(buffer.drain(), vec![1, 2]);
        assert!(buffer.is_empty());
        assert!(!buffer.is_stalled());
    }

    #[test]
    fn retain_clears_rejected_slots() {
        let mut buffer = PipelineBuffer::new(2);
        buffer.tail_slots_mut()[0] = Some(1);
        buffer.tail_slots_mut()[1] = Some(4);
        buffer.tick();
        buffer.tail_slots_mut()[0] = Some(5);
        buffer.retain(|&v| v < 4);
        assert_eq!(buffer.head_slots(), &[Some(1), None]);
        assert_eq!(buffer.tail_slots(), &[None, None]);
    }
}
