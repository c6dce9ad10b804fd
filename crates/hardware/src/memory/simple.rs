//! Flat byte-addressed memory.

use std::cell::RefCell;
use std::rc::Rc;

use super::MemoryAccessTarget;
use crate::common::reg::RegisterValue;

/// Memory shared by the instruction and data interfaces of a core.
pub type SharedMemory = Rc<RefCell<SimpleMemory>>;

/// Little-endian memory starting at address zero.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SimpleMemory {
    bytes: Vec<u8>,
}

impl SimpleMemory {
    /// Creates `size` bytes of zeroed memory.
    pub fn new(size: usize) -> Self {
        Self {
            bytes: vec![0; size],
        }
    }

    /// Wraps the memory for sharing between interfaces.
    pub fn shared(self) -> SharedMemory {
        Rc::new(RefCell::new(self))
    }

    /// Memory size in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Returns `true` for zero-sized memory.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    fn range(&self, target: MemoryAccessTarget) -> Option<std::ops::Range<usize>> {
        let start = usize::try_from(target.address).ok()?;
        let end = start.checked_add(usize::from(target.size))?;
        (end <= self.bytes.len()).then_some(start..end)
    }

    /// Reads `target.size` bytes, or `None` if any byte is out of range.
    pub fn read(&self, target: MemoryAccessTarget) -> Option<Vec<u8>> {
        self.range(target).map(|r| self.bytes[r].to_vec())
    }

    /// Writes the low `target.size` bytes of `value`; `false` if out of range.
    pub fn write(&mut self, target: MemoryAccessTarget, value: RegisterValue) -> bool {
        let bytes = value.get().to_le_bytes();
        let size = usize::from(target.size).min(bytes.len());
        let Some(range) = self.range(MemoryAccessTarget::new(target.address, size as u16)) else {
            return false;
        };
        self.bytes[range].copy_from_slice(&bytes[..size]);
        true
    }

    /// Copies `data` in at `address`; `false` if it does not fit.
    pub fn load(&mut self, address: u64, data: &[u8]) -> bool {
        let Ok(start) = usize::try_from(address) else {
            return false;
        };
        match start.checked_add(data.len()) {
            Some(end) if end <= self.bytes.len() => {
                self.bytes[start..end].copy_from_slice(data);
                true
            }
            _ => false,
        }
    }
}
