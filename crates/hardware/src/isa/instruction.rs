//! The micro-op representation.
//!
//! An [`Instruction`] is one micro-op. It is created by predecode as a clone of a
//! cached template and then moves through a small state machine:
//! 1. **Operands:** source values are supplied one by one; the micro-op can execute
//!    once no operand is pending.
//! 2. **Memory:** loads and stores generate their access targets, loads then receive
//!    one data value per target.
//! 3. **Execution:** `execute` computes results, the resolved branch outcome, store
//!    data, or attaches an exception.
//! 4. **Commit:** results are written back and the micro-op retires, unless it
//!    carries an exception, in which case it never writes back.

use crate::common::error::InstructionException;
use crate::common::reg::{Register, RegisterValue};
use crate::core::units::bru::{BranchPrediction, BranchType};
use crate::isa::cache::MetadataId;
use crate::isa::group::{ExecutionInfo, InstructionFlags, InstructionGroup};
use crate::isa::{aarch64, riscv};
use crate::memory::MemoryAccessTarget;

/// Most source registers a micro-op reads.
pub const MAX_SOURCES: usize = 4;

/// Most destination registers a micro-op writes.
pub const MAX_DESTINATIONS: usize = 2;

/// Architecture-specific operation of a micro-op.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Opcode {
    /// RISC-V operation.
    Riscv(riscv::Opcode),
    /// AArch64 operation.
    Aarch64(aarch64::Opcode),
}

impl Opcode {
    /// Numeric id used for per-opcode configuration overrides.
    pub fn id(self) -> u16 {
        match self {
            Self::Riscv(op) => op as u16,
            Self::Aarch64(op) => op as u16,
        }
    }

    /// Assembly mnemonic.
    pub fn mnemonic(self) -> &'static str {
        match self {
            Self::Riscv(op) => op.into(),
            Self::Aarch64(op) => op.into(),
        }
    }
}

/// A single micro-op.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Instruction {
    opcode: Opcode,
    metadata: MetadataId,
    flags: InstructionFlags,
    group: InstructionGroup,

    address: u64,
    size: u8,
    sequence_id: u64,
    instruction_id: u64,
    micro_op_index: u8,
    is_micro_op: bool,
    is_last_micro_op: bool,

    /// Decoded immediate.
    pub(crate) imm: i64,
    /// Shift type of a shifted-register operand (0 LSL, 1 LSR, 2 ASR, 3 ROR).
    pub(crate) shift_type: u8,
    /// Shift amount of a shifted-register operand.
    pub(crate) shift_amount: u8,
    /// Condition code of a conditional branch.
    pub(crate) condition: u8,
    /// Operand width in bytes (4 or 8).
    pub(crate) width: u8,
    /// Invert the second operand (BIC/ORN/EON).
    pub(crate) invert: bool,

    sources: [Register; MAX_SOURCES],
    source_count: u8,
    operands: [Option<RegisterValue>; MAX_SOURCES],
    operands_pending: u8,

    destinations: [Register; MAX_DESTINATIONS],
    destination_count: u8,
    results: [RegisterValue; MAX_DESTINATIONS],

    memory_addresses: Vec<MemoryAccessTarget>,
    memory_data: Vec<Option<RegisterValue>>,
    data_pending: u8,
    store_data: Vec<RegisterValue>,

    exception: Option<InstructionException>,

    branch_type: BranchType,
    known_offset: Option<i64>,
    prediction: BranchPrediction,
    branch_taken: bool,
    branch_address: u64,

    execution_info: ExecutionInfo,

    executed: bool,
    commit_ready: bool,
    waiting_commit: bool,
}

impl Instruction {
    // ══════════════════════════════════════════════════════════
    // Construction (decoders)
    // ══════════════════════════════════════════════════════════

    /// Creates an empty template for `opcode`.
    pub fn new(opcode: Opcode, flags: InstructionFlags) -> Self {
        Self {
            opcode,
            metadata: MetadataId::default(),
            flags,
            group: flags.group(),
            address: 0,
            size: 0,
            sequence_id: 0,
            instruction_id: 0,
            micro_op_index: 0,
            is_micro_op: false,
            is_last_micro_op: true,
            imm: 0,
            shift_type: 0,
            shift_amount: 0,
            condition: 0,
            width: 8,
            invert: false,
            sources: [Register::default(); MAX_SOURCES],
            source_count: 0,
            operands: [None; MAX_SOURCES],
            operands_pending: 0,
            destinations: [Register::default(); MAX_DESTINATIONS],
            destination_count: 0,
            results: [RegisterValue::default(); MAX_DESTINATIONS],
            memory_addresses: Vec::new(),
            memory_data: Vec::new(),
            data_pending: 0,
            store_data: Vec::new(),
            exception: None,
            branch_type: BranchType::Unknown,
            known_offset: None,
            prediction: BranchPrediction::default(),
            branch_taken: false,
            branch_address: 0,
            execution_info: ExecutionInfo::default(),
            executed: false,
            commit_ready: false,
            waiting_commit: false,
        }
    }

    /// Adds a source register whose value must be supplied before execution.
    pub(crate) fn push_source(&mut self, reg: Register) {
        let i = self.source_count as usize;
        self.sources[i] = reg;
        self.operands[i] = None;
        self.source_count += 1;
        self.operands_pending += 1;
    }

    /// Adds a source whose value is already known (hard-wired zero registers).
    pub(crate) fn push_supplied_source(&mut self, reg: Register, value: RegisterValue) {
        let i = self.source_count as usize;
        self.sources[i] = reg;
        self.operands[i] = Some(value);
        self.source_count += 1;
    }

    /// Adds a destination register.
    pub(crate) fn push_destination(&mut self, reg: Register) {
        self.destinations[self.destination_count as usize] = reg;
        self.destination_count += 1;
    }

    /// Records the branch class and statically known PC-relative offset.
    pub(crate) fn set_branch_info(&mut self, branch_type: BranchType, known_offset: Option<i64>) {
        self.branch_type = branch_type;
        self.known_offset = known_offset;
    }

    pub(crate) fn bind_metadata(&mut self, id: MetadataId) {
        self.metadata = id;
    }

    /// Attaches resolved latency/throughput/port information.
    pub fn set_execution_info(&mut self, info: ExecutionInfo) {
        self.execution_info = info;
    }

    pub(crate) fn assign_identity(
        &mut self,
        address: u64,
        size: u8,
        sequence_id: u64,
        instruction_id: u64,
        index: usize,
        count: usize,
    ) {
        self.address = address;
        self.size = size;
        self.sequence_id = sequence_id;
        self.instruction_id = instruction_id;
        self.micro_op_index = index as u8;
        self.is_micro_op = count > 1;
        self.is_last_micro_op = index + 1 == count;
    }

    // ══════════════════════════════════════════════════════════
    // Identity and classification
    // ══════════════════════════════════════════════════════════

    /// Architecture operation.
    pub const fn opcode(&self) -> Opcode {
        self.opcode
    }

    /// Metadata record in the owning architecture's arena.
    pub const fn metadata_id(&self) -> MetadataId {
        self.metadata
    }

    /// Class predicates.
    pub const fn flags(&self) -> &InstructionFlags {
        &self.flags
    }

    /// Instruction group (see [`InstructionFlags::group`]).
    pub const fn group(&self) -> InstructionGroup {
        self.group
    }

    /// Address of the instruction this micro-op was decoded from.
    pub const fn instruction_address(&self) -> u64 {
        self.address
    }

    /// Size of that instruction in bytes.
    pub const fn size(&self) -> u8 {
        self.size
    }

    /// Address of the next sequential instruction.
    pub const fn next_address(&self) -> u64 {
        self.address.wrapping_add(self.size as u64)
    }

    /// Unique, monotonically increasing micro-op id.
    pub const fn sequence_id(&self) -> u64 {
        self.sequence_id
    }

    /// Id shared by all micro-ops of the macro-op.
    pub const fn instruction_id(&self) -> u64 {
        self.instruction_id
    }

    /// Position inside the macro-op.
    pub const fn micro_op_index(&self) -> u8 {
        self.micro_op_index
    }

    /// Returns `true` if the macro-op was split into several micro-ops.
    pub const fn is_micro_op(&self) -> bool {
        self.is_micro_op
    }

    /// Returns `true` for the final micro-op of its macro-op.
    pub const fn is_last_micro_op(&self) -> bool {
        self.is_last_micro_op
    }

    /// Reads memory.
    pub const fn is_load(&self) -> bool {
        self.flags.is_load
    }

    /// Generates store addresses.
    pub const fn is_store_address(&self) -> bool {
        self.flags.is_store_address
    }

    /// Produces store data.
    pub const fn is_store_data(&self) -> bool {
        self.flags.is_store_data
    }

    /// Can redirect control flow.
    pub const fn is_branch(&self) -> bool {
        self.flags.is_branch
    }

    /// Atomic memory access.
    pub const fn is_atomic(&self) -> bool {
        self.flags.is_atomic
    }

    /// Acquire semantics.
    pub const fn is_acquire(&self) -> bool {
        self.flags.is_acquire
    }

    /// Release semantics.
    pub const fn is_release(&self) -> bool {
        self.flags.is_release
    }

    /// Load-reserved.
    pub const fn is_load_reserved(&self) -> bool {
        self.flags.is_load_reserved
    }

    /// Store-conditional.
    pub const fn is_store_conditional(&self) -> bool {
        self.flags.is_store_conditional
    }

    // ══════════════════════════════════════════════════════════
    // Operands
    // ══════════════════════════════════════════════════════════

    /// Source registers, in operand order.
    pub fn source_registers(&self) -> &[Register] {
        &self.sources[..self.source_count as usize]
    }

    /// Destination registers, in result order.
    pub fn destination_registers(&self) -> &[Register] {
        &self.destinations[..self.destination_count as usize]
    }

    /// Replaces a source register (register renaming).
    pub fn rename_source(&mut self, i: usize, reg: Register) {
        self.sources[i] = reg;
    }

    /// Replaces a destination register (register renaming).
    pub fn rename_destination(&mut self, i: usize, reg: Register) {
        self.destinations[i] = reg;
    }

    /// Returns `true` once operand `i` has a value.
    pub fn is_operand_ready(&self, i: usize) -> bool {
        self.operands[i].is_some()
    }

    /// Supplies the value of operand `i`.
    ///
    /// # Panics
    ///
    /// Panics if the micro-op can already execute or the operand was supplied
    /// before; both are pipeline bugs.
    pub fn supply_operand(&mut self, i: usize, value: RegisterValue) {
        assert!(
            !self.can_execute(),
            "operand supplied to a micro-op that can already execute"
        );
        assert!(self.operands[i].is_none(), "operand {i} supplied twice");
        self.operands[i] = Some(value);
        self.operands_pending -= 1;
    }

    /// Operands still missing.
    pub const fn operands_pending(&self) -> u8 {
        self.operands_pending
    }

    /// Returns `true` when every operand has been supplied.
    pub const fn can_execute(&self) -> bool {
        self.operands_pending == 0
    }

    pub(crate) fn operand_value(&self, i: usize) -> RegisterValue {
        self.operands[i].unwrap_or_default()
    }

    pub(crate) fn operand(&self, i: usize) -> u64 {
        self.operand_value(i).get()
    }

    // ══════════════════════════════════════════════════════════
    // Execution
    // ══════════════════════════════════════════════════════════

    /// Executes the micro-op.
    ///
    /// # Panics
    ///
    /// Panics if operands or load data are still pending.
    pub fn execute(&mut self) {
        assert!(self.can_execute(), "executed with operands pending");
        assert!(self.data_pending == 0, "executed with load data pending");
        self.executed = true;
        if self.exception.is_some() {
            return;
        }
        match self.opcode {
            Opcode::Riscv(op) => riscv::execute::execute(self, op),
            Opcode::Aarch64(op) => aarch64::execute::execute(self, op),
        }
    }

    /// Returns `true` once `execute` has run.
    pub const fn has_executed(&self) -> bool {
        self.executed
    }

    /// Results, in destination order.
    pub fn results(&self) -> &[RegisterValue] {
        &self.results[..self.destination_count as usize]
    }

    pub(crate) fn set_result(&mut self, i: usize, value: u64) {
        self.results[i] = RegisterValue::from(value);
    }

    pub(crate) fn raise(&mut self, exception: InstructionException) {
        self.exception = Some(exception);
    }

    /// Exception attached to the micro-op.
    pub const fn exception(&self) -> Option<InstructionException> {
        self.exception
    }

    /// Returns `true` if an exception is attached.
    pub const fn exception_encountered(&self) -> bool {
        self.exception.is_some()
    }

    /// Latency, throughput and port information.
    pub const fn execution_info(&self) -> &ExecutionInfo {
        &self.execution_info
    }

    /// Cycles from issue until results are available.
    pub const fn latency(&self) -> u16 {
        self.execution_info.latency
    }

    /// Cycles the execution unit stays blocked after issue.
    pub const fn stall_cycles(&self) -> u16 {
        self.execution_info.stall_cycles
    }

    /// Ports able to execute the micro-op; raises `NoAvailablePort` when empty.
    pub fn supported_ports(&mut self) -> &[u16] {
        if self.execution_info.ports.is_empty() {
            self.raise(InstructionException::NoAvailablePort);
        }
        &self.execution_info.ports
    }

    // ══════════════════════════════════════════════════════════
    // Memory
    // ══════════════════════════════════════════════════════════

    /// Computes the memory targets of a load or store.
    ///
    /// Requires the address operands. A misaligned atomic raises `AlignmentFault`
    /// and produces no targets.
    pub fn generate_addresses(&mut self) -> &[MemoryAccessTarget] {
        let generated = match self.opcode {
            Opcode::Riscv(op) => riscv::execute::generate_addresses(self, op),
            Opcode::Aarch64(op) => aarch64::execute::generate_addresses(self, op),
        };
        match generated {
            Ok(targets) => self.set_memory_addresses(targets),
            Err(exception) => {
                self.raise(exception);
                self.set_memory_addresses(Vec::new());
            }
        }
        &self.memory_addresses
    }

    fn set_memory_addresses(&mut self, targets: Vec<MemoryAccessTarget>) {
        self.data_pending = if self.flags.is_load {
            targets.len() as u8
        } else {
            0
        };
        self.memory_data = vec![None; targets.len()];
        self.memory_addresses = targets;
    }

    /// Targets produced by `generate_addresses`.
    pub fn memory_addresses(&self) -> &[MemoryAccessTarget] {
        &self.memory_addresses
    }

    /// Supplies the data read for the target at `address`.
    ///
    /// `None` means the read faulted and raises `DataAbort`.
    pub fn supply_data(&mut self, address: u64, data: Option<RegisterValue>) {
        let Some(i) = self
            .memory_addresses
            .iter()
            .zip(&self.memory_data)
            .position(|(target, slot)| target.address == address && slot.is_none())
        else {
            return;
        };
        let Some(value) = data else {
            self.raise(InstructionException::DataAbort);
            return;
        };
        let size = self.memory_addresses[i].size.min(8) as u8;
        self.memory_data[i] = Some(RegisterValue::new(value.get(), size));
        self.data_pending -= 1;
    }

    /// Load targets still waiting for data.
    pub const fn data_pending(&self) -> u8 {
        self.data_pending
    }

    pub(crate) fn loaded(&self, i: usize) -> RegisterValue {
        self.memory_data
            .get(i)
            .copied()
            .flatten()
            .unwrap_or_default()
    }

    /// Data to store, one value per store target (empty if nothing is written).
    pub fn store_data(&self) -> &[RegisterValue] {
        &self.store_data
    }

    pub(crate) fn push_store_data(&mut self, value: RegisterValue) {
        self.store_data.push(value);
    }

    /// Records whether a store-conditional succeeded; the destination receives 0 on
    /// success and 1 on failure, and failed stores write nothing.
    pub fn update_cond_store_result(&mut self, success: bool) {
        if self.destination_count > 0 {
            self.set_result(0, u64::from(!success));
        }
        if !success {
            self.store_data.clear();
        }
    }

    // ══════════════════════════════════════════════════════════
    // Branches
    // ══════════════════════════════════════════════════════════

    /// Branch class.
    pub const fn branch_type(&self) -> BranchType {
        self.branch_type
    }

    /// PC-relative offset encoded in the instruction, if any.
    pub const fn known_offset(&self) -> Option<i64> {
        self.known_offset
    }

    /// Attaches the fetch-time prediction.
    pub fn set_branch_prediction(&mut self, prediction: BranchPrediction) {
        self.prediction = prediction;
    }

    /// Fetch-time prediction.
    pub const fn branch_prediction(&self) -> BranchPrediction {
        self.prediction
    }

    pub(crate) fn set_branch_outcome(&mut self, taken: bool, target: u64) {
        self.branch_taken = taken;
        self.branch_address = if taken { target } else { self.next_address() };
    }

    /// Returns `true` if the executed branch was taken.
    pub const fn was_branch_taken(&self) -> bool {
        self.branch_taken
    }

    /// Address execution continues at after this micro-op.
    pub const fn branch_address(&self) -> u64 {
        self.branch_address
    }

    /// Returns `true` if the executed branch disagrees with its prediction.
    pub const fn was_branch_mispredicted(&self) -> bool {
        self.branch_taken != self.prediction.is_taken
            || (self.branch_taken && self.branch_address != self.prediction.target)
    }

    /// Checks the prediction against what decode alone can tell.
    ///
    /// A non-branch predicted taken, or a direct branch predicted taken to a target
    /// other than its encoded one, is mispredicted.
    ///
    /// # Returns
    ///
    /// `(mispredicted, redirect_address)`; the address is meaningful only when
    /// mispredicted.
    ///
    /// # Panics
    ///
    /// Panics if the micro-op has executed; execution supersedes this check.
    pub fn check_early_branch_misprediction(&self) -> (bool, u64) {
        assert!(
            !self.executed,
            "early misprediction check on an executed micro-op"
        );
        if !self.prediction.is_taken {
            return (false, 0);
        }
        if !self.flags.is_branch {
            return (true, self.next_address());
        }
        match self.known_offset {
            Some(offset) => {
                let target = self.address.wrapping_add_signed(offset);
                (target != self.prediction.target, target)
            }
            None => (false, 0),
        }
    }

    // ══════════════════════════════════════════════════════════
    // Pipeline bookkeeping
    // ══════════════════════════════════════════════════════════

    /// Marks a micro-op of a split macro-op as written back but not committed.
    pub fn set_waiting_commit(&mut self) {
        self.waiting_commit = true;
    }

    /// Returns `true` while waiting for sibling micro-ops.
    pub const fn is_waiting_commit(&self) -> bool {
        self.waiting_commit
    }

    /// Marks the micro-op ready to commit.
    pub fn set_commit_ready(&mut self) {
        self.commit_ready = true;
    }

    /// Returns `true` once ready to commit.
    pub const fn can_commit(&self) -> bool {
        self.commit_ready
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addi(index: usize, count: usize) -> Instruction {
        let mut uop = Instruction::new(
            Opcode::Riscv(riscv::Opcode::Addi),
            InstructionFlags::default(),
        );
        uop.push_destination(Register::general(5));
        uop.imm = 9;
        uop.assign_identity(0x40, 4, 1, 1, index, count);
        uop
    }

    #[test]
    fn micro_op_identity_tracks_position_in_macro_op() {
        let first = addi(0, 2);
        assert!(first.is_micro_op());
        assert_eq!(first.micro_op_index(), 0);
        assert!(!first.is_last_micro_op());

        let whole = addi(0, 1);
        assert!(!whole.is_micro_op());
        assert!(whole.is_last_micro_op());
    }

    #[test]
    fn non_branch_predicted_taken_is_an_early_misprediction() {
        let mut uop = addi(0, 1);
        uop.set_branch_prediction(BranchPrediction::taken(0x100));
        assert_eq!(uop.check_early_branch_misprediction(), (true, 0x44));
    }

    #[test]
    #[should_panic(expected = "early misprediction check on an executed micro-op")]
    fn early_misprediction_check_rejects_executed_micro_op() {
        let mut uop = addi(0, 1);
        uop.execute();
        assert!(uop.has_executed());
        let _ = uop.check_early_branch_misprediction();
    }
}
