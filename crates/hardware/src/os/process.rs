//! Program image and memory layout.
//!
//! Layout from low to high addresses: the program image at address zero, the heap
//! starting at the first page boundary after the image, and the stack growing down
//! from the top of memory.

use crate::common::error::{Result, SimError};
use crate::memory::SimpleMemory;

/// Page size used to align the heap.
pub const PAGE_SIZE: u64 = 4096;

/// Bytes reserved for the stack below the top of memory.
pub const STACK_SIZE: u64 = 64 * 1024;

/// A loaded program and its memory layout.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Process {
    image: Vec<u8>,
    entry: u64,
    memory_size: u64,
    heap_start: u64,
    heap_data: Vec<u8>,
}

impl Process {
    /// Lays out `image` in a memory of `memory_size` bytes.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::ProgramTooLarge`] if the image and the stack reserve do
    /// not both fit.
    pub fn new(image: Vec<u8>, entry: u64, memory_size: u64) -> Result<Self> {
        let heap_start = (image.len() as u64).div_ceil(PAGE_SIZE) * PAGE_SIZE;
        if heap_start + STACK_SIZE > memory_size {
            return Err(SimError::ProgramTooLarge {
                size: image.len() as u64,
                memory: memory_size,
            });
        }
        Ok(Self {
            image,
            entry,
            memory_size,
            heap_start,
            heap_data: Vec::new(),
        })
    }

    /// Places `data` at the start of the heap.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::ProgramTooLarge`] if the data would run into the stack.
    pub fn with_heap_data(mut self, data: Vec<u8>) -> Result<Self> {
        if self.heap_start + data.len() as u64 > self.stack_limit() {
            return Err(SimError::ProgramTooLarge {
                size: self.heap_start + data.len() as u64,
                memory: self.memory_size,
            });
        }
        self.heap_data = data;
        Ok(self)
    }

    /// Program bytes, loaded at address zero.
    pub fn image(&self) -> &[u8] {
        &self.image
    }

    /// Address of the first instruction.
    pub const fn entry(&self) -> u64 {
        self.entry
    }

    /// Length of the program image; fetch halts at this address.
    pub fn program_byte_length(&self) -> u64 {
        self.image.len() as u64
    }

    /// First heap address (page aligned).
    pub const fn heap_start(&self) -> u64 {
        self.heap_start
    }

    /// Bytes placed at the start of the heap.
    pub fn heap_data(&self) -> &[u8] {
        &self.heap_data
    }

    /// Lowest address the stack may grow to; the heap never extends past it.
    pub const fn stack_limit(&self) -> u64 {
        self.memory_size - STACK_SIZE
    }

    /// Initial stack pointer, 16-byte aligned just below the top of memory.
    pub const fn stack_pointer(&self) -> u64 {
        (self.memory_size - 16) & !0xF
    }

    /// Size of simulated memory.
    pub const fn memory_size(&self) -> u64 {
        self.memory_size
    }

    /// Copies the image and the initial heap into `memory`.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::ProgramTooLarge`] if `memory` is smaller than the layout.
    pub fn load_into(&self, memory: &mut SimpleMemory) -> Result<()> {
        let capacity = memory.len() as u64;
        let too_large = || SimError::ProgramTooLarge {
            size: self.program_byte_length(),
            memory: capacity,
        };
        if !memory.load(0, &self.image) {
            return Err(too_large());
        }
        if !memory.load(self.heap_start, &self.heap_data) {
            return Err(too_large());
        }
        Ok(())
    }
}
