//! Decode cache and metadata arena.
//!
//! Decoding the same instruction word twice must produce the same micro-op template,
//! so each architecture keeps:
//! 1. **Metadata arena:** [`MetadataArena`], an append-only store of
//!    [`InstructionMetadata`] addressed by [`MetadataId`]. Ids are indices and stay
//!    valid for the arena's lifetime however many records are added.
//! 2. **Decode cache:** [`DecodeCache`], mapping a raw instruction word to its
//!    decoded micro-op templates.
//! 3. **Id counter:** [`IdCounter`], the monotonic sequence and instruction ids.
//! 4. **Driver:** [`Decoder`], which combines the three for predecode.

use std::collections::HashMap;

use crate::common::error::InstructionException;
use crate::isa::MacroOp;
use crate::isa::group::{ExecutionInfoTable, InstructionFlags};
use crate::isa::instruction::{Instruction, Opcode};

/// Per-encoding information shared by every micro-op decoded from it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InstructionMetadata {
    /// Raw instruction word (compressed encodings are stored unexpanded).
    pub encoding: u32,
    /// Instruction length in bytes.
    pub length: u8,
    /// Mnemonic of the first micro-op.
    pub mnemonic: &'static str,
}

/// Stable handle to a metadata record.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MetadataId(u32);

impl MetadataId {
    /// Position of the record in its arena.
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Append-only metadata store.
#[derive(Clone, Debug, Default)]
pub struct MetadataArena {
    records: Vec<InstructionMetadata>,
}

impl MetadataArena {
    /// Adds a record and returns its id.
    pub fn insert(&mut self, record: InstructionMetadata) -> MetadataId {
        let id = MetadataId(self.records.len() as u32);
        self.records.push(record);
        id
    }

    /// Record behind `id`.
    ///
    /// # Panics
    ///
    /// Panics if `id` came from a different arena.
    pub fn get(&self, id: MetadataId) -> &InstructionMetadata {
        &self.records[id.index()]
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns `true` if no record was added yet.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Instruction word to decoded micro-op templates.
#[derive(Clone, Debug, Default)]
pub struct DecodeCache {
    templates: HashMap<u32, MacroOp>,
}

impl DecodeCache {
    /// Templates for `encoding`, if decoded before.
    pub fn get(&self, encoding: u32) -> Option<&MacroOp> {
        self.templates.get(&encoding)
    }

    /// Stores the templates for `encoding`.
    pub fn insert(&mut self, encoding: u32, templates: MacroOp) {
        let _ = self.templates.insert(encoding, templates);
    }

    /// Number of cached encodings.
    pub fn len(&self) -> usize {
        self.templates.len()
    }

    /// Returns `true` if nothing was decoded yet.
    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

/// Monotonic id source owned by an architecture.
///
/// Every micro-op gets a fresh sequence id; all micro-ops of one macro-op share
/// an instruction id.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct IdCounter {
    next_sequence_id: u64,
    next_instruction_id: u64,
}

impl IdCounter {
    /// Takes the next micro-op sequence id.
    pub fn next_sequence_id(&mut self) -> u64 {
        let id = self.next_sequence_id;
        self.next_sequence_id += 1;
        id
    }

    /// Takes the next macro-op instruction id.
    pub fn next_instruction_id(&mut self) -> u64 {
        let id = self.next_instruction_id;
        self.next_instruction_id += 1;
        id
    }
}

/// Cache-backed predecode driver shared by the architectures.
#[derive(Clone, Debug)]
pub struct Decoder {
    cache: DecodeCache,
    metadata: MetadataArena,
    execution_info: ExecutionInfoTable,
    ids: IdCounter,
    faults: HashMap<(u64, InstructionException), Instruction>,
}

impl Decoder {
    /// Creates a decoder resolving timing from `execution_info`.
    pub fn new(execution_info: ExecutionInfoTable) -> Self {
        Self {
            cache: DecodeCache::default(),
            metadata: MetadataArena::default(),
            execution_info,
            ids: IdCounter::default(),
            faults: HashMap::new(),
        }
    }

    /// Produces the macro-op for `encoding` at `address`.
    ///
    /// On a cache miss `decode` builds the templates, which are then bound to a new
    /// metadata record, given their execution info and cached. The returned micro-ops
    /// are clones of the cached templates with fresh ids.
    ///
    /// # Arguments
    ///
    /// * `encoding` - Raw instruction word, used as the cache key.
    /// * `length` - Instruction length in bytes.
    /// * `address` - Address of the instruction.
    /// * `decode` - Architecture decoder for a cache miss.
    pub fn macro_op(
        &mut self,
        encoding: u32,
        length: u8,
        address: u64,
        decode: impl FnOnce(u32) -> MacroOp,
    ) -> MacroOp {
        if self.cache.get(encoding).is_none() {
            let mut templates = decode(encoding);
            let mnemonic = templates
                .first()
                .map_or("unknown", |t| t.opcode().mnemonic());
            let id = self.metadata.insert(InstructionMetadata {
                encoding,
                length,
                mnemonic,
            });
            for template in &mut templates {
                template.bind_metadata(id);
                let info = self
                    .execution_info
                    .lookup(template.group(), template.opcode().id());
                template.set_execution_info(info);
            }
            self.cache.insert(encoding, templates);
        }

        let Some(templates) = self.cache.get(encoding) else {
            return MacroOp::new();
        };
        let instruction_id = self.ids.next_instruction_id();
        let count = templates.len();
        templates
            .iter()
            .enumerate()
            .map(|(index, template)| {
                let mut uop = template.clone();
                uop.assign_identity(
                    address,
                    length,
                    self.ids.next_sequence_id(),
                    instruction_id,
                    index,
                    count,
                );
                uop
            })
            .collect()
    }

    /// Produces a single micro-op carrying a decode-time exception.
    ///
    /// The faulting template is cached per address and exception, so refetching
    /// the same bad PC reuses its metadata record.
    pub fn faulted(
        &mut self,
        opcode: Opcode,
        length: u8,
        address: u64,
        exception: InstructionException,
    ) -> MacroOp {
        let metadata = &mut self.metadata;
        let template = self.faults.entry((address, exception)).or_insert_with(|| {
            let id = metadata.insert(InstructionMetadata {
                encoding: 0,
                length,
                mnemonic: opcode.mnemonic(),
            });
            let mut uop = Instruction::new(opcode, InstructionFlags::default());
            uop.bind_metadata(id);
            uop.raise(exception);
            uop
        });
        let mut uop = template.clone();
        let instruction_id = self.ids.next_instruction_id();
        uop.assign_identity(address, length, self.ids.next_sequence_id(), instruction_id, 0, 1);
        vec![uop]
    }

    /// Metadata record behind `id`.
    pub fn metadata(&self, id: MetadataId) -> &InstructionMetadata {
        self.metadata.get(id)
    }

    /// Number of cached encodings.
    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isa::riscv;

    #[test]
    fn refetched_fault_reuses_its_metadata() {
        let mut decoder = Decoder::new(ExecutionInfoTable::new(&[], &[]));
        let opcode = Opcode::Riscv(riscv::Opcode::Unallocated);
        let first = decoder.faulted(opcode, 1, 0x1001, InstructionException::MisalignedPc);
        let second = decoder.faulted(opcode, 1, 0x1001, InstructionException::MisalignedPc);
        assert_eq!(decoder.metadata.len(), 1);
        assert_eq!(first[0].metadata_id(), second[0].metadata_id());
        assert!(second[0].sequence_id() > first[0].sequence_id());
        assert_eq!(second[0].exception(), Some(InstructionException::MisalignedPc));

        let _ = decoder.faulted(opcode, 1, 0x1003, InstructionException::MisalignedPc);
        assert_eq!(decoder.metadata.len(), 2);
    }
}
