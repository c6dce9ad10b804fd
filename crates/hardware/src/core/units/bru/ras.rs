//! Return Address Stack (RAS).
//!
//! The RAS predicts function return addresses: calls push the address of the
//! instruction after the call and returns pop it. Because predictions are made at
//! fetch, every push and pop is speculative. The stack records the action taken for
//! each in-flight branch address so that a flush can undo it and a retirement can
//! forget it.

use std::collections::{HashMap, VecDeque};

/// Speculative stack action recorded for an in-flight call or return.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum RasAction {
    /// A call pushed an entry.
    Pushed,
    /// A return popped this entry (`None` if the stack was empty).
    Popped(Option<u64>),
}

/// Return Address Stack structure.
#[derive(Clone, Debug)]
pub struct Ras {
    /// The stack storage, oldest entry at the front.
    stack: VecDeque<u64>,
    /// Maximum capacity of the stack.
    capacity: usize,
    /// In-flight actions per branch address, oldest first.
    history: HashMap<u64, VecDeque<RasAction>>,
}

impl Ras {
    /// Creates a new Return Address Stack with the specified capacity.
    pub fn new(capacity: usize) -> Self {
        Self {
            stack: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
            history: HashMap::new(),
        }
    }

    /// Pushes a return address onto the stack.
    ///
    /// If the stack is full, the oldest entry is dropped to keep the most recent
    /// call history.
    pub fn push(&mut self, addr: u64) {
        if self.stack.len() == self.capacity {
            let _ = self.stack.pop_front();
        }
        self.stack.push_back(addr);
    }

    /// Pops a return address from the stack.
    ///
    /// # Returns
    ///
    /// The popped return address, or `None` if the stack is empty.
    pub fn pop(&mut self) -> Option<u64> {
        self.stack.pop_back()
    }

    /// Peeks at the top of the stack without removing the entry.
    pub fn top(&self) -> Option<u64> {
        self.stack.back().copied()
    }

    /// Number of valid entries.
    pub fn len(&self) -> usize {
        self.stack.len()
    }

    /// Returns `true` if the stack holds no entries.
    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    /// Speculatively pushes the return address of a call at `branch_addr`.
    pub fn call(&mut self, branch_addr: u64, return_addr: u64) {
        self.push(return_addr);
        self.history
            .entry(branch_addr)
            .or_default()
            .push_back(RasAction::Pushed);
    }

    /// Speculatively pops the return target for a return at `branch_addr`.
    pub fn ret(&mut self, branch_addr: u64) -> Option<u64> {
        let target = self.pop();
        self.history
            .entry(branch_addr)
            .or_default()
            .push_back(RasAction::Popped(target));
        target
    }

    /// Undoes the youngest in-flight action recorded for `branch_addr`.
    ///
    /// Flushes arrive youngest first, so undoing from the back restores the stack
    /// to its state before the discarded predictions.
    pub fn rewind(&mut self, branch_addr: u64) {
        let action = {
            let Some(actions) = self.history.get_mut(&branch_addr) else {
                return;
            };
            let action = actions.pop_back();
            if actions.is_empty() {
                let _ = self.history.remove(&branch_addr);
            }
            action
        };
        match action {
            Some(RasAction::Pushed) => {
                let _ = self.stack.pop_back();
            }
            Some(RasAction::Popped(Some(target))) => self.push(target),
            Some(RasAction::Popped(None)) | None => {}
        }
    }

    /// Forgets the oldest in-flight action for `branch_addr` once it has resolved.
    pub fn retire(&mut self, branch_addr: u64) {
        if let Some(actions) = self.history.get_mut(&branch_addr) {
            let _ = actions.pop_front();
            if actions.is_empty() {
                let _ = self.history.remove(&branch_addr);
            }
        }
    }

    /// Number of in-flight actions still recorded.
    pub fn in_flight(&self) -> usize {
        self.history.values().map(VecDeque::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_stack_drops_oldest() {
        let mut ras = Ras::new(2);
        ras.push(1);
        ras.push(2);
        ras.push(3);
        assert_eq!(ras.pop(), Some(3));
        assert_eq!(ras.pop(), Some(2));
        assert_eq!(ras.pop(), None);
    }

    #[test]
    fn rewind_restores_popped_target() {
        let mut ras = Ras::new(4);
        ras.call(0x100, 0x104);
        assert_eq!(ras.ret(0x200), Some(0x104));
        assert!(ras.is_empty());
        ras.rewind(0x200);
        assert_eq!(ras.top(), Some(0x104));
        ras.rewind(0x100);
        assert!(ras.is_empty());
        assert_eq!(ras.in_flight(), 0);
    }

    #[test]
    fn rewind_unwinds_nested_calls_youngest_first() {
        let mut ras = Ras::new(4);
        ras.push(0x10);
        ras.call(0x100, 0x104);
        ras.call(0x200, 0x204);
        assert_eq!(ras.ret(0x300), Some(0x204));
        assert_eq!(ras.ret(0x300), Some(0x104));
        assert_eq!(ras.in_flight(), 4);

        ras.rewind(0x300);
        assert_eq!(ras.top(), Some(0x104));
        ras.rewind(0x300);
        assert_eq!(ras.top(), Some(0x204));
        ras.rewind(0x200);
        ras.rewind(0x100);
        assert_eq!(ras.len(), 1);
        assert_eq!(ras.top(), Some(0x10));
        assert_eq!(ras.in_flight(), 0);

        ras.rewind(0x100);
        assert_eq!(ras.top(), Some(0x10));
    }
}
