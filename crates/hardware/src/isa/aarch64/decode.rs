//! AArch64 instruction decoding.
//!
//! Register tag 31 names either the stack pointer or the zero register depending
//! on the operand. Zero-register sources are supplied at decode time and
//! zero-register destinations are dropped, so neither ever reaches the register
//! file. Stores decode into two micro-ops: a store-address micro-op reading the
//! base register and a store-data micro-op reading the value.

use crate::common::error::InstructionException;
use crate::common::reg::{Register, RegisterValue};
use crate::core::units::bru::BranchType;
use crate::isa::MacroOp;
use crate::isa::group::InstructionFlags;
use crate::isa::instruction::{Instruction, Opcode as MicroOpcode};

use super::opcode::Opcode;
use super::{LINK_REGISTER, ZERO_REGISTER};

const NOP: u32 = 0xD503_201F;

/// Decodes a 32-bit instruction word into its micro-op templates.
pub fn decode(word: u32) -> MacroOp {
    decode_word(word).unwrap_or_else(|exception| {
        let mut uop = build(Opcode::Unallocated, flags(), word);
        uop.raise(exception);
        vec![uop]
    })
}

type Decoded = Result<MacroOp, InstructionException>;

fn decode_word(w: u32) -> Decoded {
    if w == NOP {
        return Ok(vec![build(Opcode::Nop, flags(), w)]);
    }
    match w {
        _ if w & 0xFFE0_001F == 0xD400_0001 => Ok(vec![build(Opcode::Svc, flags(), w)]),
        _ if w & 0xFFE0_001F == 0xD420_0000 => Ok(vec![build(Opcode::Brk, flags(), w)]),
        _ if w & 0xFF9F_FC1F == 0xD61F_0000 => indirect_branch(w),
        _ if w & 0x7C00_0000 == 0x1400_0000 => Ok(vec![immediate_branch(w)]),
        _ if w & 0xFF00_0010 == 0x5400_0000 => Ok(vec![conditional_branch(w)]),
        _ if w & 0x7E00_0000 == 0x3400_0000 => Ok(vec![compare_branch(w)]),
        _ if w & 0x3FA0_7C00 == 0x08A0_7C00 => Ok(vec![compare_and_swap(w)]),
        _ if w & 0x3F00_0000 == 0x3900_0000 => load_store(w),
        _ if w & 0x1F80_0000 == 0x1100_0000 => Ok(vec![add_sub_immediate(w)]),
        _ if w & 0x1F80_0000 == 0x1280_0000 => move_wide(w).map(|uop| vec![uop]),
        _ if w & 0x1F20_0000 == 0x0B00_0000 => add_sub_register(w).map(|uop| vec![uop]),
        _ if w & 0x1FE0_FC00 == 0x1A00_0000 => Ok(vec![add_sub_carry(w)]),
        _ if w & 0x1F00_0000 == 0x0A00_0000 => logical_register(w).map(|uop| vec![uop]),
        _ if w & 0x7FE0_0000 == 0x1B00_0000 => Ok(vec![multiply_add(w)]),
        _ if w & 0x7FE0_0000 == 0x1AC0_0000 => two_source(w).map(|uop| vec![uop]),
        _ => Err(InstructionException::EncodingUnallocated),
    }
}

// ══════════════════════════════════════════════════════════
// Fields and template helpers
// ══════════════════════════════════════════════════════════

const fn rd(w: u32) -> u16 {
    (w & 0x1F) as u16
}

const fn rn(w: u32) -> u16 {
    ((w >> 5) & 0x1F) as u16
}

const fn rm(w: u32) -> u16 {
    ((w >> 16) & 0x1F) as u16
}

const fn is_64bit(w: u32) -> bool {
    w >> 31 == 1
}

/// Sign-extends the `width`-bit field at `lo` and scales it by four.
const fn branch_offset(w: u32, lo: u32, width: u32) -> i64 {
    let field = (w >> lo) & ((1 << width) - 1);
    let shift = 32 - width;
    (((field << shift) as i32 >> shift) as i64) * 4
}

fn flags() -> InstructionFlags {
    InstructionFlags::default()
}

fn build(op: Opcode, flags: InstructionFlags, w: u32) -> Instruction {
    let mut uop = Instruction::new(MicroOpcode::Aarch64(op), flags);
    uop.width = if is_64bit(w) { 8 } else { 4 };
    uop
}

/// Adds general register `tag` as a source; tag 31 is the stack pointer when
/// `sp` is set and the zero register otherwise.
fn read(uop: &mut Instruction, tag: u16, sp: bool) {
    if tag == 31 && !sp {
        uop.push_supplied_source(ZERO_REGISTER, RegisterValue::from(0));
    } else {
        uop.push_source(Register::general(tag));
    }
}

/// Adds general register `tag` as a destination, with the same tag 31 rule.
fn write(uop: &mut Instruction, tag: u16, sp: bool) {
    if tag != 31 || sp {
        uop.push_destination(Register::general(tag));
    }
}

// ══════════════════════════════════════════════════════════
// Branches
// ══════════════════════════════════════════════════════════

fn branch_flags() -> InstructionFlags {
    InstructionFlags {
        is_branch: true,
        ..flags()
    }
}

fn immediate_branch(w: u32) -> Instruction {
    let offset = branch_offset(w, 0, 26);
    if w >> 31 == 1 {
        let mut uop = build(Opcode::Bl, branch_flags(), w);
        uop.push_destination(LINK_REGISTER);
        uop.set_branch_info(BranchType::SubroutineCall, Some(offset));
        uop.imm = offset;
        uop
    } else {
        let mut uop = build(Opcode::B, branch_flags(), w);
        uop.set_branch_info(BranchType::Unconditional, Some(offset));
        uop.imm = offset;
        uop
    }
}

fn conditional_branch(w: u32) -> Instruction {
    let offset = branch_offset(w, 5, 19);
    let mut uop = build(Opcode::BCond, branch_flags(), w);
    uop.push_source(Register::flags());
    uop.condition = (w & 0xF) as u8;
    uop.imm = offset;
    uop.set_branch_info(BranchType::Conditional, Some(offset));
    uop
}

fn compare_branch(w: u32) -> Instruction {
    let offset = branch_offset(w, 5, 19);
    let op = if (w >> 24) & 1 == 1 {
        Opcode::Cbnz
    } else {
        Opcode::Cbz
    };
    let mut uop = build(op, branch_flags(), w);
    read(&mut uop, rd(w), false);
    uop.imm = offset;
    uop.set_branch_info(BranchType::Conditional, Some(offset));
    uop
}

fn indirect_branch(w: u32) -> Decoded {
    let (op, kind) = match (w >> 21) & 0x3 {
        0b00 => (Opcode::Br, BranchType::Unconditional),
        0b01 => (Opcode::Blr, BranchType::SubroutineCall),
        0b10 => (Opcode::Ret, BranchType::Return),
        _ => return Err(InstructionException::EncodingUnallocated),
    };
    let mut uop = build(op, branch_flags(), w);
    read(&mut uop, rn(w), false);
    if op == Opcode::Blr {
        uop.push_destination(LINK_REGISTER);
    }
    uop.set_branch_info(kind, None);
    uop.width = 8;
    Ok(vec![uop])
}

// ══════════════════════════════════════════════════════════
// Data processing
// ══════════════════════════════════════════════════════════

fn add_sub_immediate(w: u32) -> Instruction {
    let setflags = (w >> 29) & 1 == 1;
    let op = match ((w >> 30) & 1, setflags) {
        (0, false) => Opcode::AddImm,
        (0, true) => Opcode::AddsImm,
        (_, false) => Opcode::SubImm,
        (_, true) => Opcode::SubsImm,
    };
    let mut uop = build(op, flags(), w);
    read(&mut uop, rn(w), true);
    // The non-flag-setting forms may write the stack pointer.
    write(&mut uop, rd(w), !setflags);
    if setflags {
        uop.push_destination(Register::flags());
    }
    let imm12 = i64::from((w >> 10) & 0xFFF);
    uop.imm = if (w >> 22) & 1 == 1 { imm12 << 12 } else { imm12 };
    uop
}

fn add_sub_register(w: u32) -> Result<Instruction, InstructionException> {
    let shift_type = ((w >> 22) & 0x3) as u8;
    let amount = ((w >> 10) & 0x3F) as u8;
    if shift_type == 0b11 || (!is_64bit(w) && amount >= 32) {
        return Err(InstructionException::EncodingUnallocated);
    }
    let setflags = (w >> 29) & 1 == 1;
    let op = match ((w >> 30) & 1, setflags) {
        (0, false) => Opcode::AddReg,
        (0, true) => Opcode::AddsReg,
        (_, false) => Opcode::SubReg,
        (_, true) => Opcode::SubsReg,
    };
    let mut uop = build(op, flags(), w);
    read(&mut uop, rn(w), false);
    read(&mut uop, rm(w), false);
    write(&mut uop, rd(w), false);
    if setflags {
        uop.push_destination(Register::flags());
    }
    uop.shift_type = shift_type;
    uop.shift_amount = amount;
    Ok(uop)
}

fn add_sub_carry(w: u32) -> Instruction {
    let setflags = (w >> 29) & 1 == 1;
    let op = match ((w >> 30) & 1, setflags) {
        (0, false) => Opcode::Adc,
        (0, true) => Opcode::Adcs,
        (_, false) => Opcode::Sbc,
        (_, true) => Opcode::Sbcs,
    };
    let mut uop = build(op, flags(), w);
    read(&mut uop, rn(w), false);
    read(&mut uop, rm(w), false);
    uop.push_source(Register::flags());
    write(&mut uop, rd(w), false);
    if setflags {
        uop.push_destination(Register::flags());
    }
    uop
}

fn logical_register(w: u32) -> Result<Instruction, InstructionException> {
    let amount = ((w >> 10) & 0x3F) as u8;
    if !is_64bit(w) && amount >= 32 {
        return Err(InstructionException::EncodingUnallocated);
    }
    let invert = (w >> 21) & 1 == 1;
    let op = match ((w >> 29) & 0x3, invert) {
        (0b00, false) => Opcode::And,
        (0b00, true) => Opcode::Bic,
        (0b01, false) => Opcode::Orr,
        (0b01, true) => Opcode::Orn,
        (0b10, false) => Opcode::Eor,
        (0b10, true) => Opcode::Eon,
        (_, false) => Opcode::Ands,
        (_, true) => Opcode::Bics,
    };
    let mut uop = build(
        op,
        InstructionFlags {
            is_logical: true,
            ..flags()
        },
        w,
    );
    read(&mut uop, rn(w), false);
    read(&mut uop, rm(w), false);
    write(&mut uop, rd(w), false);
    if matches!(op, Opcode::Ands | Opcode::Bics) {
        uop.push_destination(Register::flags());
    }
    uop.shift_type = ((w >> 22) & 0x3) as u8;
    uop.shift_amount = amount;
    uop.invert = invert;
    Ok(uop)
}

fn move_wide(w: u32) -> Result<Instruction, InstructionException> {
    let hw = (w >> 21) & 0x3;
    if !is_64bit(w) && hw >= 2 {
        return Err(InstructionException::EncodingUnallocated);
    }
    let op = match (w >> 29) & 0x3 {
        0b00 => Opcode::Movn,
        0b10 => Opcode::Movz,
        0b11 => Opcode::Movk,
        _ => return Err(InstructionException::EncodingUnallocated),
    };
    let mut uop = build(op, flags(), w);
    if op == Opcode::Movk {
        read(&mut uop, rd(w), false);
    }
    write(&mut uop, rd(w), false);
    uop.imm = i64::from((w >> 5) & 0xFFFF);
    uop.shift_amount = (hw * 16) as u8;
    Ok(uop)
}

fn multiply_add(w: u32) -> Instruction {
    let op = if (w >> 15) & 1 == 1 {
        Opcode::Msub
    } else {
        Opcode::Madd
    };
    let mut uop = build(
        op,
        InstructionFlags {
            is_multiply: true,
            ..flags()
        },
        w,
    );
    read(&mut uop, rn(w), false);
    read(&mut uop, rm(w), false);
    read(&mut uop, ((w >> 10) & 0x1F) as u16, false);
    write(&mut uop, rd(w), false);
    uop
}

fn two_source(w: u32) -> Result<Instruction, InstructionException> {
    let (op, class) = match (w >> 10) & 0x3F {
        0b00_0010 => (
            Opcode::Udiv,
            InstructionFlags {
                is_divide: true,
                ..flags()
            },
        ),
        0b00_0011 => (
            Opcode::Sdiv,
            InstructionFlags {
                is_divide: true,
                ..flags()
            },
        ),
        0b00_1000 => (Opcode::Lslv, shift()),
        0b00_1001 => (Opcode::Lsrv, shift()),
        0b00_1010 => (Opcode::Asrv, shift()),
        _ => return Err(InstructionException::EncodingUnallocated),
    };
    let mut uop = build(op, class, w);
    read(&mut uop, rn(w), false);
    read(&mut uop, rm(w), false);
    write(&mut uop, rd(w), false);
    Ok(uop)
}

fn shift() -> InstructionFlags {
    InstructionFlags {
        is_shift: true,
        ..flags()
    }
}

// ══════════════════════════════════════════════════════════
// Memory
// ══════════════════════════════════════════════════════════

fn load_store(w: u32) -> Decoded {
    let size = w >> 30;
    let opc = (w >> 22) & 0x3;
    let offset = i64::from((w >> 10) & 0xFFF) << size;

    let (op, width) = match (opc, size) {
        (0b00, 0) => return Ok(store(Opcode::Strb, w, offset)),
        (0b00, 1) => return Ok(store(Opcode::Strh, w, offset)),
        (0b00, 2) => return Ok(store(Opcode::StrW, w, offset)),
        (0b00, _) => return Ok(store(Opcode::StrX, w, offset)),
        (0b01, 0) => (Opcode::Ldrb, 4),
        (0b01, 1) => (Opcode::Ldrh, 4),
        (0b01, 2) => (Opcode::LdrW, 4),
        (0b01, _) => (Opcode::LdrX, 8),
        (0b10, 0) => (Opcode::Ldrsb, 8),
        (0b10, 1) => (Opcode::Ldrsh, 8),
        (0b10, 2) => (Opcode::Ldrsw, 8),
        (0b11, 0) => (Opcode::Ldrsb, 4),
        (0b11, 1) => (Opcode::Ldrsh, 4),
        _ => return Err(InstructionException::EncodingUnallocated),
    };
    let mut uop = build(
        op,
        InstructionFlags {
            is_load: true,
            ..flags()
        },
        w,
    );
    read(&mut uop, rn(w), true);
    write(&mut uop, rd(w), false);
    uop.imm = offset;
    uop.width = width;
    Ok(vec![uop])
}

fn store(op: Opcode, w: u32, offset: i64) -> MacroOp {
    let mut address = build(
        op,
        InstructionFlags {
            is_store_address: true,
            ..flags()
        },
        w,
    );
    read(&mut address, rn(w), true);
    address.imm = offset;

    let mut data = build(
        op,
        InstructionFlags {
            is_store_data: true,
            ..flags()
        },
        w,
    );
    read(&mut data, rd(w), false);
    vec![address, data]
}

fn compare_and_swap(w: u32) -> Instruction {
    let acquire = (w >> 22) & 1 == 1;
    let release = (w >> 15) & 1 == 1;
    let op = match (acquire, release) {
        (false, false) => Opcode::Cas,
        (true, false) => Opcode::Casa,
        (false, true) => Opcode::Casl,
        (true, true) => Opcode::Casal,
    };
    let mut uop = build(
        op,
        InstructionFlags {
            is_load: true,
            is_store_address: true,
            is_store_data: true,
            is_atomic: true,
            is_acquire: acquire,
            is_release: release,
            ..flags()
        },
        w,
    );
    read(&mut uop, rm(w), false);
    read(&mut uop, rd(w), false);
    read(&mut uop, rn(w), true);
    write(&mut uop, rm(w), false);
    uop.width = 1 << (w >> 30);
    uop
}
