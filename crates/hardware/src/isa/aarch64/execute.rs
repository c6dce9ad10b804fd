//! AArch64 micro-op semantics.
//!
//! Operand order follows decode: `Rn` then `Rm` (then `Ra` or NZCV). 32-bit forms
//! compute on the low word and zero the upper half of their result. NZCV is held
//! as a 4-bit value with N in bit 3 and V in bit 0.

use crate::common::error::InstructionException;
use crate::common::reg::{RegisterType, RegisterValue};
use crate::isa::instruction::Instruction;
use crate::memory::MemoryAccessTarget;

use super::opcode::Opcode;

const N: u8 = 0b1000;
const Z: u8 = 0b0100;
const C: u8 = 0b0010;
const V: u8 = 0b0001;

/// Computes the memory targets of a load, store-address or compare-and-swap.
///
/// # Returns
///
/// One target per access, or `AlignmentFault` for a misaligned compare-and-swap.
pub fn generate_addresses(
    uop: &Instruction,
    op: Opcode,
) -> Result<Vec<MemoryAccessTarget>, InstructionException> {
    if uop.is_atomic() {
        let size = u16::from(uop.width);
        let address = uop.operand(2);
        if address % u64::from(size) != 0 {
            return Err(InstructionException::AlignmentFault);
        }
        return Ok(vec![MemoryAccessTarget::new(address, size)]);
    }
    let size = op.access_size();
    if size == 0 || !(uop.is_load() || uop.is_store_address()) {
        return Ok(Vec::new());
    }
    let address = uop.operand(0).wrapping_add_signed(uop.imm);
    Ok(vec![MemoryAccessTarget::new(address, size)])
}

/// Executes `uop`, writing its results, branch outcome, store data or exception.
pub fn execute(uop: &mut Instruction, op: Opcode) {
    use Opcode::*;

    let width = uop.width;
    let mask = width_mask(width);
    let a = uop.operand(0) & mask;
    let b = uop.operand(1) & mask;
    let imm = uop.imm as u64;

    let (value, nzcv) = match op {
        Unallocated => {
            uop.raise(InstructionException::EncodingUnallocated);
            return;
        }
        Svc => {
            uop.raise(InstructionException::SupervisorCall);
            return;
        }
        Brk => {
            uop.raise(InstructionException::Breakpoint);
            return;
        }
        Nop => return,

        AddImm => (a.wrapping_add(imm), 0),
        SubImm => (a.wrapping_sub(imm), 0),
        AddsImm => add_with_carry(a, imm, false, width),
        SubsImm => add_with_carry(a, !imm, true, width),
        AddReg | AddsReg | SubReg | SubsReg => {
            let b = shifted(uop, b);
            match op {
                AddReg => (a.wrapping_add(b), 0),
                SubReg => (a.wrapping_sub(b), 0),
                AddsReg => add_with_carry(a, b, false, width),
                _ => add_with_carry(a, !b, true, width),
            }
        }
        Adc | Adcs | Sbc | Sbcs => {
            let carry = uop.operand(2) as u8 & C != 0;
            match op {
                Adc | Adcs => add_with_carry(a, b, carry, width),
                _ => add_with_carry(a, !b, carry, width),
            }
        }

        And | Ands | Orr | Eor | Bic | Bics | Orn | Eon => {
            let mut b = shifted(uop, b);
            if uop.invert {
                b = !b;
            }
            let value = match op {
                And | Ands | Bic | Bics => a & b,
                Orr | Orn => a | b,
                _ => a ^ b,
            } & mask;
            (value, logic_flags(value, width))
        }

        Movz => (imm << uop.shift_amount, 0),
        Movn => (!(imm << uop.shift_amount), 0),
        Movk => {
            let shift = uop.shift_amount;
            let old = uop.operand(0);
            ((old & !(0xFFFF << shift)) | (imm << shift), 0)
        }

        Madd => (uop.operand(2).wrapping_add(a.wrapping_mul(b)), 0),
        Msub => (uop.operand(2).wrapping_sub(a.wrapping_mul(b)), 0),
        Udiv => (a.checked_div(b).unwrap_or(0), 0),
        Sdiv => (signed_divide(a, b, width), 0),
        Lslv => (a << (b % bits(width)), 0),
        Lsrv => (a >> (b % bits(width)), 0),
        Asrv => (arithmetic_shift_right(a, (b % bits(width)) as u32, width), 0),

        Ldrb | Ldrh | LdrW | LdrX => (uop.loaded(0).get(), 0),
        Ldrsb | Ldrsh | Ldrsw => (uop.loaded(0).sign_extended(), 0),
        Strb | Strh | StrW | StrX => {
            if uop.is_store_data() {
                let size = op.access_size() as u8;
                uop.push_store_data(RegisterValue::new(uop.operand(0), size));
            }
            return;
        }
        Cas | Casa | Casl | Casal => {
            let size = uop.width;
            let compare = RegisterValue::new(uop.operand(0), size);
            let old = uop.loaded(0);
            if old.get() == compare.get() {
                uop.push_store_data(RegisterValue::new(uop.operand(1), size));
            }
            // The register result uses the register width, not the access size.
            uop.width = if size == 8 { 8 } else { 4 };
            (old.get(), 0)
        }

        B | Bl => {
            let target = uop.instruction_address().wrapping_add(imm);
            uop.set_branch_outcome(true, target);
            (uop.next_address(), 0)
        }
        BCond => {
            let taken = condition_holds(uop.condition, a as u8);
            let target = uop.instruction_address().wrapping_add(imm);
            uop.set_branch_outcome(taken, target);
            return;
        }
        Cbz | Cbnz => {
            let taken = (a == 0) == (op == Cbz);
            let target = uop.instruction_address().wrapping_add(imm);
            uop.set_branch_outcome(taken, target);
            return;
        }
        Br | Blr | Ret => {
            uop.set_branch_outcome(true, a);
            (uop.next_address(), 0)
        }
    };
    write_results(uop, value, nzcv);
}

/// Writes `value` to general destinations and `nzcv` to the flags destination.
fn write_results(uop: &mut Instruction, value: u64, nzcv: u8) {
    let mask = width_mask(uop.width);
    let kinds: Vec<RegisterType> = uop
        .destination_registers()
        .iter()
        .map(|reg| reg.kind)
        .collect();
    for (i, kind) in kinds.into_iter().enumerate() {
        let result = if kind == RegisterType::Flags {
            u64::from(nzcv)
        } else {
            value & mask
        };
        uop.set_result(i, result);
    }
}

const fn width_mask(width: u8) -> u64 {
    if width >= 8 { u64::MAX } else { 0xFFFF_FFFF }
}

const fn bits(width: u8) -> u64 {
    if width >= 8 { 64 } else { 32 }
}

fn shifted(uop: &Instruction, value: u64) -> u64 {
    let amount = u32::from(uop.shift_amount);
    let width = uop.width;
    let value = match uop.shift_type {
        0 => value << amount,
        1 => value >> amount,
        2 => arithmetic_shift_right(value, amount, width),
        _ if width >= 8 => value.rotate_right(amount),
        _ => u64::from((value as u32).rotate_right(amount)),
    };
    value & width_mask(width)
}

fn arithmetic_shift_right(value: u64, amount: u32, width: u8) -> u64 {
    if width >= 8 {
        ((value as i64) >> amount) as u64
    } else {
        u64::from(((value as i32) >> amount) as u32)
    }
}

fn signed_divide(a: u64, b: u64, width: u8) -> u64 {
    if b == 0 {
        return 0;
    }
    if width >= 8 {
        (a as i64).wrapping_div(b as i64) as u64
    } else {
        u64::from((a as i32).wrapping_div(b as i32) as u32)
    }
}

/// `AddWithCarry` of the architecture manual.
///
/// # Returns
///
/// The truncated sum and the NZCV flags it produces.
pub fn add_with_carry(a: u64, b: u64, carry: bool, width: u8) -> (u64, u8) {
    let mask = width_mask(width);
    let (a, b) = (a & mask, b & mask);
    let carry_in = u128::from(carry);
    let unsigned = u128::from(a) + u128::from(b) + carry_in;
    let result = (unsigned as u64) & mask;

    let (signed, signed_result) = if width >= 8 {
        (
            i128::from(a as i64) + i128::from(b as i64) + carry_in as i128,
            i128::from(result as i64),
        )
    } else {
        (
            i128::from(a as u32 as i32) + i128::from(b as u32 as i32) + carry_in as i128,
            i128::from(result as u32 as i32),
        )
    };

    let sign_bit = bits(width) - 1;
    let mut nzcv = 0;
    if (result >> sign_bit) & 1 == 1 {
        nzcv |= N;
    }
    if result == 0 {
        nzcv |= Z;
    }
    if u128::from(result) != unsigned {
        nzcv |= C;
    }
    if signed_result != signed {
        nzcv |= V;
    }
    (result, nzcv)
}

fn logic_flags(value: u64, width: u8) -> u8 {
    let mut nzcv = 0;
    if (value >> (bits(width) - 1)) & 1 == 1 {
        nzcv |= N;
    }
    if value == 0 {
        nzcv |= Z;
    }
    nzcv
}

/// Evaluates condition code `cond` against `nzcv`.
pub const fn condition_holds(cond: u8, nzcv: u8) -> bool {
    let (n, z, c, v) = (nzcv & N != 0, nzcv & Z != 0, nzcv & C != 0, nzcv & V != 0);
    let base = match (cond >> 1) & 0b111 {
        0b000 => z,
        0b001 => c,
        0b010 => n,
        0b011 => v,
        0b100 => c && !z,
        0b101 => n == v,
        0b110 => !z && n == v,
        _ => true,
    };
    if cond & 1 == 1 && cond != 0b1111 {
        !base
    } else {
        base
    }
}
