//! Read-modify-write arithmetic for atomic memory operations.
//!
//! Combines the value read from memory with a register operand to produce the
//! value written back. Word-sized operations work on the low 32 bits and their
//! results are sign-extended to 64 bits.

/// Combining operation of an atomic read-modify-write.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AmoOp {
    /// Store the register value.
    Swap,
    /// Wrapping add.
    Add,
    /// Bitwise exclusive or.
    Xor,
    /// Bitwise and.
    And,
    /// Bitwise or.
    Or,
    /// Signed minimum.
    Min,
    /// Signed maximum.
    Max,
    /// Unsigned minimum.
    MinU,
    /// Unsigned maximum.
    MaxU,
}

/// Computes the value an atomic operation writes back to memory.
///
/// # Arguments
///
/// * `op` - Combining operation.
/// * `memory` - Value read from memory.
/// * `register` - Register operand.
/// * `word` - Operate on 32-bit values instead of 64-bit ones.
///
/// # Returns
///
/// The new memory value, sign-extended from bit 31 for word operations.
pub fn amo_result(op: AmoOp, memory: u64, register: u64, word: bool) -> u64 {
    if word {
        let (a, b) = (memory as i32, register as i32);
        let value = match op {
            AmoOp::Swap => b,
            AmoOp::Add => a.wrapping_add(b),
            AmoOp::Xor => a ^ b,
            AmoOp::And => a & b,
            AmoOp::Or => a | b,
            AmoOp::Min => a.min(b),
            AmoOp::Max => a.max(b),
            AmoOp::MinU => (a as u32).min(b as u32) as i32,
            AmoOp::MaxU => (a as u32).max(b as u32) as i32,
        };
        value as i64 as u64
    } else {
        let (a, b) = (memory as i64, register as i64);
        match op {
            AmoOp::Swap => register,
            AmoOp::Add => memory.wrapping_add(register),
            AmoOp::Xor => memory ^ register,
            AmoOp::And => memory & register,
            AmoOp::Or => memory | register,
            AmoOp::Min => a.min(b) as u64,
            AmoOp::Max => a.max(b) as u64,
            AmoOp::MinU => memory.min(register),
            AmoOp::MaxU => memory.max(register),
        }
    }
}
