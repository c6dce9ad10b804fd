//! RV64 micro-op semantics.
//!
//! Operands arrive in decode order: `rs1` first, then `rs2` (or the CSR value for
//! CSR accesses). Results follow destination order.

use crate::common::error::InstructionException;
use crate::common::reg::{RegisterType, RegisterValue};
use crate::core::units::lsu::atomic::{AmoOp, amo_result};
use crate::isa::instruction::Instruction;
use crate::memory::MemoryAccessTarget;

use super::opcode::Opcode;

/// Computes the memory targets of a load, store or atomic.
///
/// # Returns
///
/// One target per access, or `AlignmentFault` for a misaligned atomic.
pub fn generate_addresses(
    uop: &Instruction,
    op: Opcode,
) -> Result<Vec<MemoryAccessTarget>, InstructionException> {
    let size = op.access_size();
    if size == 0 {
        return Ok(Vec::new());
    }
    let address = uop.operand(0).wrapping_add_signed(uop.imm);
    if uop.is_atomic() && address % u64::from(size) != 0 {
        return Err(InstructionException::AlignmentFault);
    }
    Ok(vec![MemoryAccessTarget::new(address, size)])
}

/// Executes `uop`, writing its results, branch outcome, store data or exception.
pub fn execute(uop: &mut Instruction, op: Opcode) {
    use Opcode::*;

    let a = uop.operand(0);
    let b = uop.operand(1);
    let imm = uop.imm as u64;
    let shamt = (uop.imm & 0x3F) as u32;

    let value = match op {
        Unallocated => {
            uop.raise(InstructionException::EncodingUnallocated);
            return;
        }
        Ecall => {
            uop.raise(InstructionException::SupervisorCall);
            return;
        }
        Ebreak => {
            uop.raise(InstructionException::Breakpoint);
            return;
        }
        Fence => return,

        Lui => imm,
        Auipc => uop.instruction_address().wrapping_add(imm),
        Jal => {
            let target = uop.instruction_address().wrapping_add(imm);
            uop.set_branch_outcome(true, target);
            uop.next_address()
        }
        Jalr => {
            uop.set_branch_outcome(true, a.wrapping_add(imm) & !1);
            uop.next_address()
        }
        Beq | Bne | Blt | Bge | Bltu | Bgeu => {
            let taken = match op {
                Beq => a == b,
                Bne => a != b,
                Blt => (a as i64) < (b as i64),
                Bge => (a as i64) >= (b as i64),
                Bltu => a < b,
                _ => a >= b,
            };
            let target = uop.instruction_address().wrapping_add(imm);
            uop.set_branch_outcome(taken, target);
            return;
        }

        Lb | Lh | Lw | Ld | LrW | LrD => uop.loaded(0).sign_extended(),
        Lbu | Lhu | Lwu => uop.loaded(0).get(),
        Sb | Sh | Sw | Sd => {
            uop.push_store_data(RegisterValue::new(b, op.access_size() as u8));
            return;
        }
        ScW | ScD => {
            uop.push_store_data(RegisterValue::new(b, op.access_size() as u8));
            // Overwritten with the outcome when the store commits.
            0
        }
        AmoswapW | AmoaddW | AmoxorW | AmoandW | AmoorW | AmominW | AmomaxW | AmominuW
        | AmomaxuW | AmoswapD | AmoaddD | AmoxorD | AmoandD | AmoorD | AmominD | AmomaxD
        | AmominuD | AmomaxuD => {
            let is_word = op.access_size() == 4;
            let loaded = uop.loaded(0);
            let old = loaded.sign_extended();
            let new = amo_result(amo_kind(op), loaded.get(), b, is_word);
            uop.push_store_data(RegisterValue::new(new, op.access_size() as u8));
            old
        }

        Addi => a.wrapping_add(imm),
        Slti => u64::from((a as i64) < uop.imm),
        Sltiu => u64::from(a < imm),
        Xori => a ^ imm,
        Ori => a | imm,
        Andi => a & imm,
        Slli => a << shamt,
        Srli => a >> shamt,
        Srai => ((a as i64) >> shamt) as u64,
        Add => a.wrapping_add(b),
        Sub => a.wrapping_sub(b),
        Sll => a << (b & 0x3F),
        Slt => u64::from((a as i64) < (b as i64)),
        Sltu => u64::from(a < b),
        Xor => a ^ b,
        Srl => a >> (b & 0x3F),
        Sra => ((a as i64) >> (b & 0x3F)) as u64,
        Or => a | b,
        And => a & b,

        Addiw => word(a.wrapping_add(imm)),
        Slliw => word(a << (shamt & 0x1F)),
        Srliw => word(u64::from((a as u32) >> (shamt & 0x1F))),
        Sraiw => ((a as i32) >> (shamt & 0x1F)) as i64 as u64,
        Addw => word(a.wrapping_add(b)),
        Subw => word(a.wrapping_sub(b)),
        Sllw => word(a << (b & 0x1F)),
        Srlw => word(u64::from((a as u32) >> (b & 0x1F))),
        Sraw => ((a as i32) >> (b & 0x1F)) as i64 as u64,

        Mul => a.wrapping_mul(b),
        Mulh => ((i128::from(a as i64) * i128::from(b as i64)) >> 64) as u64,
        Mulhsu => ((i128::from(a as i64) * i128::from(b)) >> 64) as u64,
        Mulhu => ((u128::from(a) * u128::from(b)) >> 64) as u64,
        Div => divide(a as i64, b as i64) as u64,
        Divu => a.checked_div(b).unwrap_or(u64::MAX),
        Rem => remainder(a as i64, b as i64) as u64,
        Remu => a.checked_rem(b).unwrap_or(a),
        Mulw => word(a.wrapping_mul(b)),
        Divw => i64::from(divide32(a as i32, b as i32)) as u64,
        Divuw => word(u64::from((a as u32).checked_div(b as u32).unwrap_or(u32::MAX))),
        Remw => i64::from(remainder32(a as i32, b as i32)) as u64,
        Remuw => word(u64::from((a as u32).checked_rem(b as u32).unwrap_or(a as u32))),

        Csrrw | Csrrs | Csrrc | Csrrwi | Csrrsi | Csrrci => {
            csr_access(uop, op, a, b);
            return;
        }
    };
    uop.set_result(0, value);
}

/// Sign-extends the low 32 bits.
const fn word(value: u64) -> u64 {
    value as i32 as i64 as u64
}

const fn divide(a: i64, b: i64) -> i64 {
    if b == 0 { -1 } else { a.wrapping_div(b) }
}

const fn remainder(a: i64, b: i64) -> i64 {
    if b == 0 { a } else { a.wrapping_rem(b) }
}

const fn divide32(a: i32, b: i32) -> i32 {
    if b == 0 { -1 } else { a.wrapping_div(b) }
}

const fn remainder32(a: i32, b: i32) -> i32 {
    if b == 0 { a } else { a.wrapping_rem(b) }
}

const fn amo_kind(op: Opcode) -> AmoOp {
    use Opcode::*;
    match op {
        AmoaddW | AmoaddD => AmoOp::Add,
        AmoxorW | AmoxorD => AmoOp::Xor,
        AmoandW | AmoandD => AmoOp::And,
        AmoorW | AmoorD => AmoOp::Or,
        AmominW | AmominD => AmoOp::Min,
        AmomaxW | AmomaxD => AmoOp::Max,
        AmominuW | AmominuD => AmoOp::MinU,
        AmomaxuW | AmomaxuD => AmoOp::MaxU,
        _ => AmoOp::Swap,
    }
}

/// The old CSR value goes to `rd`, the updated value back to the CSR.
fn csr_access(uop: &mut Instruction, op: Opcode, source: u64, old: u64) {
    let new = match op {
        Opcode::Csrrw | Opcode::Csrrwi => source,
        Opcode::Csrrs | Opcode::Csrrsi => old | source,
        _ => old & !source,
    };
    let kinds: Vec<RegisterType> = uop
        .destination_registers()
        .iter()
        .map(|reg| reg.kind)
        .collect();
    for (i, kind) in kinds.into_iter().enumerate() {
        let value = if kind == RegisterType::System { new } else { old };
        uop.set_result(i, value);
    }
}
